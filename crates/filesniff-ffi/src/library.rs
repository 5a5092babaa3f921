//! Locating libmagic at runtime and resolving its entry points.

use std::ffi::{OsStr, OsString, c_char, c_int, c_void};

use libloading::Library;
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::{FfiError, Result};

/// Environment variable naming an exact libmagic file to load instead of
/// searching the default candidates.
pub const LIBRARY_ENV: &str = "FILESNIFF_LIBMAGIC";

/// Opaque `struct magic_set`.
#[repr(C)]
pub struct MagicSet {
    _private: [u8; 0],
}

/// `magic_t` from `<magic.h>`.
pub type MagicT = *mut MagicSet;

pub type MagicOpenFn = unsafe extern "C" fn(flags: c_int) -> MagicT;
pub type MagicLoadFn = unsafe extern "C" fn(cookie: MagicT, filename: *const c_char) -> c_int;
pub type MagicFileFn = unsafe extern "C" fn(cookie: MagicT, filename: *const c_char) -> *const c_char;
pub type MagicBufferFn =
    unsafe extern "C" fn(cookie: MagicT, buffer: *const c_void, length: usize) -> *const c_char;
pub type MagicErrorFn = unsafe extern "C" fn(cookie: MagicT) -> *const c_char;
pub type MagicCloseFn = unsafe extern "C" fn(cookie: MagicT);
pub type MagicVersionFn = unsafe extern "C" fn() -> c_int;

#[cfg(target_os = "macos")]
const DEFAULT_CANDIDATES: &[&str] = &[
    "libmagic.1.dylib",
    "libmagic.dylib",
    "/opt/homebrew/lib/libmagic.1.dylib",
    "/usr/local/lib/libmagic.1.dylib",
    "/opt/local/lib/libmagic.1.dylib",
];

#[cfg(windows)]
const DEFAULT_CANDIDATES: &[&str] = &["libmagic-1.dll", "magic1.dll", "libmagic.dll"];

#[cfg(not(any(target_os = "macos", windows)))]
const DEFAULT_CANDIDATES: &[&str] = &["libmagic.so.1", "libmagic.so"];

static GLOBAL: OnceCell<Result<LibMagic>> = OnceCell::new();

/// A loaded libmagic with its entry points resolved.
///
/// The function pointers stay valid for as long as `_library` is alive; the
/// process-wide instance from [`LibMagic::global`] is never unloaded.
pub struct LibMagic {
    _library: Library,
    location: String,
    pub(crate) open: MagicOpenFn,
    pub(crate) load: MagicLoadFn,
    pub(crate) file: MagicFileFn,
    pub(crate) buffer: MagicBufferFn,
    pub(crate) error: MagicErrorFn,
    pub(crate) close: MagicCloseFn,
    version: Option<MagicVersionFn>,
}

impl std::fmt::Debug for LibMagic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibMagic")
            .field("location", &self.location)
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

impl LibMagic {
    /// The process-wide libmagic, discovered on first call.
    ///
    /// Discovery runs once. A failure is remembered and returned to every
    /// later caller.
    pub fn global() -> Result<&'static LibMagic> {
        Self::global_with(None)
    }

    /// Like [`LibMagic::global`], with a preferred library file.
    ///
    /// `FILESNIFF_LIBMAGIC` still wins over `preferred`. Only the first call
    /// in the process decides which library is loaded.
    pub fn global_with(preferred: Option<&OsStr>) -> Result<&'static LibMagic> {
        let lib = GLOBAL
            .get_or_init(|| {
                let chosen = std::env::var_os(LIBRARY_ENV)
                    .filter(|p| !p.is_empty())
                    .or_else(|| preferred.map(OsString::from));
                Self::discover(chosen)
            })
            .as_ref()
            .map_err(Clone::clone)?;

        if let Some(wanted) = preferred {
            if wanted.to_string_lossy() != lib.location() {
                debug!(
                    wanted = %wanted.to_string_lossy(),
                    loaded = %lib.location(),
                    "libmagic already loaded, ignoring preferred path"
                );
            }
        }
        Ok(lib)
    }

    /// Search for libmagic. With `override_path` set (and non-empty) only that
    /// file is tried.
    pub fn discover(override_path: Option<OsString>) -> Result<LibMagic> {
        let candidates: Vec<OsString> = match override_path {
            Some(path) if !path.is_empty() => vec![path],
            _ => DEFAULT_CANDIDATES.iter().map(OsString::from).collect(),
        };

        let mut attempts = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            match Self::load_from(candidate) {
                Ok(lib) => {
                    debug!(location = %lib.location, version = ?lib.version(), "loaded libmagic");
                    return Ok(lib);
                }
                Err(e) => {
                    debug!(candidate = %candidate.to_string_lossy(), error = %e, "libmagic candidate rejected");
                    attempts.push(format!("{}: {e}", candidate.to_string_lossy()));
                }
            }
        }

        warn!("libmagic could not be located");
        Err(FfiError::LibraryNotFound { attempts })
    }

    /// Load libmagic from one path or loader-searchable file name.
    pub fn load_from(path: impl AsRef<OsStr>) -> Result<LibMagic> {
        let path = path.as_ref();
        let location = path.to_string_lossy().into_owned();

        // SAFETY: libmagic has no load-time initializers with preconditions.
        let library = unsafe { Library::new(path) }.map_err(|e| FfiError::Native(e.to_string()))?;

        Ok(Self {
            open: symbol(&library, &location, "magic_open")?,
            load: symbol(&library, &location, "magic_load")?,
            file: symbol(&library, &location, "magic_file")?,
            buffer: symbol(&library, &location, "magic_buffer")?,
            error: symbol(&library, &location, "magic_error")?,
            close: symbol(&library, &location, "magic_close")?,
            version: symbol(&library, &location, "magic_version").ok(),
            _library: library,
            location,
        })
    }

    /// The path or file name the library was loaded from.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// `magic_version()`, e.g. `545` for 5.45. `None` on libraries that
    /// predate the call.
    pub fn version(&self) -> Option<i32> {
        // SAFETY: magic_version takes no arguments and reads a constant.
        self.version.map(|f| unsafe { f() })
    }
}

/// Render a `magic_version()` value as `major.minor`.
pub fn format_version(version: i32) -> String {
    format!("{}.{:02}", version / 100, version % 100)
}

fn symbol<T: Copy>(library: &Library, location: &str, name: &str) -> Result<T> {
    // SAFETY: every `T` used here is the prototype declared in <magic.h>.
    unsafe { library.get::<T>(name.as_bytes()) }
        .map(|sym| *sym)
        .map_err(|_| FfiError::MissingSymbol {
            library: location.to_string(),
            symbol: name.to_string(),
        })
}
