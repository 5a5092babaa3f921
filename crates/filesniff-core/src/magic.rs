//! The libmagic binding: two lazily opened detectors, one per output mode.
//!
//! Output mode is fixed when a libmagic handle is opened, so a [`Magic`]
//! keeps a description-mode and a MIME-mode detector side by side and opens
//! each one only when a query first needs it. Each detector goes through
//! `Unopened → Opened(flags) → Loaded(database) → [query]* → Closed`, with
//! the load happening exactly once, before its first query.
//!
//! Every detector sits behind its own mutex, so a `Magic` can be shared
//! between threads; queries on the same detector are serialized.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use filesniff_ffi::MagicFlags;
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::backend::{Backend, LibMagicBackend};
use crate::config::SniffConfig;
use crate::error::{Result, SniffError};

/// Which kind of answer a detector gives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorMode {
    /// Human readable, e.g. `ASCII text`.
    Description,
    /// MIME type and charset, e.g. `text/plain; charset=us-ascii`.
    Mime,
}

impl DetectorMode {
    /// Flags the detector is opened with before [`Options`] are added.
    ///
    /// `ERROR` makes libmagic report unreadable files as failures instead of
    /// describing the OS error as if it were the file type.
    pub fn base_flags(self) -> MagicFlags {
        match self {
            DetectorMode::Description => MagicFlags::ERROR,
            DetectorMode::Mime => MagicFlags::MIME | MagicFlags::ERROR,
        }
    }
}

impl fmt::Display for DetectorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorMode::Description => write!(f, "description"),
            DetectorMode::Mime => write!(f, "mime"),
        }
    }
}

/// Extra libmagic behaviour applied to both detectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    pub follow_symlinks: bool,
    pub decompress: bool,
    pub preserve_atime: bool,
    pub raw: bool,
}

impl Options {
    pub fn flags(&self) -> MagicFlags {
        let mut flags = MagicFlags::NONE;
        if self.follow_symlinks {
            flags |= MagicFlags::SYMLINK;
        }
        if self.decompress {
            flags |= MagicFlags::COMPRESS;
        }
        if self.preserve_atime {
            flags |= MagicFlags::PRESERVE_ATIME;
        }
        if self.raw {
            flags |= MagicFlags::RAW;
        }
        flags
    }
}

/// A libmagic binding instance.
///
/// Dropping it (or calling [`Magic::close`]) closes whichever detectors were
/// opened, each exactly once.
pub struct Magic<B: Backend = LibMagicBackend> {
    backend: B,
    database: Option<PathBuf>,
    options: Options,
    description: OnceCell<Mutex<B::Handle>>,
    mime: OnceCell<Mutex<B::Handle>>,
}

impl Magic<LibMagicBackend> {
    /// Bind to the system libmagic. `database` of `None` (or an empty path)
    /// uses libmagic's default database.
    pub fn new(database: Option<&Path>) -> Result<Self> {
        Self::with_options(database, Options::default())
    }

    pub fn with_options(database: Option<&Path>, options: Options) -> Result<Self> {
        let database = resolve_database(database)?;
        let backend = LibMagicBackend::locate(None)?;
        Ok(Self::assemble(backend, database, options))
    }

    pub fn from_config(config: &SniffConfig) -> Result<Self> {
        let database = resolve_database(config.database_path().as_deref())?;
        let backend = LibMagicBackend::locate(config.magic.library_path.as_deref())?;
        Ok(Self::assemble(backend, database, config.options()))
    }
}

impl<B: Backend> Magic<B> {
    /// Bind to an arbitrary [`Backend`].
    pub fn with_backend(backend: B, database: Option<&Path>, options: Options) -> Result<Self> {
        let database = resolve_database(database)?;
        Ok(Self::assemble(backend, database, options))
    }

    fn assemble(backend: B, database: Option<PathBuf>, options: Options) -> Self {
        debug!(database = ?database, ?options, "magic binding created");
        Self {
            backend,
            database,
            options,
            description: OnceCell::new(),
            mime: OnceCell::new(),
        }
    }

    // ─── Queries ───────────────────────────────────────────

    /// Describe in-memory content, e.g. `ASCII text`.
    pub fn describe_contents(&self, bytes: &[u8]) -> Result<String> {
        self.query_buffer(DetectorMode::Description, bytes)
    }

    /// Describe a file; libmagic opens and reads it.
    pub fn describe_filename(&self, path: &Path) -> Result<String> {
        self.query_file(DetectorMode::Description, path)
    }

    /// MIME type of in-memory content, e.g. `text/plain; charset=us-ascii`.
    pub fn checktype_contents(&self, bytes: &[u8]) -> Result<String> {
        self.query_buffer(DetectorMode::Mime, bytes)
    }

    /// MIME type of a file; libmagic opens and reads it.
    pub fn checktype_filename(&self, path: &Path) -> Result<String> {
        self.query_file(DetectorMode::Mime, path)
    }

    fn query_buffer(&self, mode: DetectorMode, bytes: &[u8]) -> Result<String> {
        let mut handle = self.detector(mode)?;
        self.backend
            .classify_buffer(&mut *handle, bytes)
            .map_err(|e| SniffError::Detection(e.to_string()))
    }

    fn query_file(&self, mode: DetectorMode, path: &Path) -> Result<String> {
        let mut handle = self.detector(mode)?;
        self.backend
            .classify_file(&mut *handle, path)
            .map_err(|e| SniffError::Detection(format!("{}: {e}", path.display())))
    }

    // ─── Detector lifecycle ────────────────────────────────

    fn slot(&self, mode: DetectorMode) -> &OnceCell<Mutex<B::Handle>> {
        match mode {
            DetectorMode::Description => &self.description,
            DetectorMode::Mime => &self.mime,
        }
    }

    /// Get-or-create the detector for `mode` and lock it.
    fn detector(&self, mode: DetectorMode) -> Result<MutexGuard<'_, B::Handle>> {
        let cell = self
            .slot(mode)
            .get_or_try_init(|| self.open_detector(mode).map(Mutex::new))?;
        // poisoning carries no meaning for a cookie
        Ok(cell.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn open_detector(&self, mode: DetectorMode) -> Result<B::Handle> {
        let flags = mode.base_flags() | self.options.flags();
        let mut handle = self.backend.open(flags).map_err(SniffError::from_setup)?;

        // On failure `handle` is dropped here, closing the half-built detector.
        if let Err(e) = self.backend.load(&mut handle, self.database.as_deref()) {
            warn!(%mode, database = ?self.database, error = %e, "failed to load magic database");
            return Err(SniffError::Initialization(e.to_string()));
        }

        debug!(%mode, %flags, "detector ready");
        Ok(handle)
    }

    /// Close both detectors. Safe to call on a binding that never queried.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        for (mode, slot) in [
            (DetectorMode::Description, &mut self.description),
            (DetectorMode::Mime, &mut self.mime),
        ] {
            if let Some(handle) = slot.take() {
                drop(handle);
                debug!(%mode, "detector released");
            }
        }
    }

    // ─── Introspection ─────────────────────────────────────

    /// Whether the detector for `mode` has been opened and loaded.
    pub fn is_open(&self, mode: DetectorMode) -> bool {
        self.slot(mode).get().is_some()
    }

    pub fn database_path(&self) -> Option<&Path> {
        self.database.as_deref()
    }

    pub fn options(&self) -> Options {
        self.options
    }

    pub fn native_version(&self) -> Option<i32> {
        self.backend.version()
    }

    pub fn library_location(&self) -> Option<&str> {
        self.backend.location()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: Backend> Drop for Magic<B> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<B: Backend> fmt::Debug for Magic<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Magic")
            .field("database", &self.database)
            .field("options", &self.options)
            .field("description_open", &self.is_open(DetectorMode::Description))
            .field("mime_open", &self.is_open(DetectorMode::Mime))
            .finish()
    }
}

/// Empty paths mean "use the default"; anything else must exist.
fn resolve_database(database: Option<&Path>) -> Result<Option<PathBuf>> {
    match database {
        Some(path) if !path.as_os_str().is_empty() => {
            if !path.exists() {
                return Err(SniffError::Initialization(format!(
                    "magic database not found: {}",
                    path.display()
                )));
            }
            Ok(Some(path.to_path_buf()))
        }
        _ => Ok(None),
    }
}


/// Against the system libmagic; each test returns early when the library or
/// its default database is not installed.
#[cfg(test)]
mod live_tests {
    use super::*;
    use filesniff_ffi::{Cookie, LibMagic};
    use tempfile::TempDir;

    /// Decided through the raw ffi layer so that a regression in `Magic`
    /// fails the tests below instead of skipping them.
    fn default_database_installed() -> bool {
        let Ok(lib) = LibMagic::global() else {
            return false;
        };
        let mut cookie = Cookie::open(lib, MagicFlags::NONE).expect("magic_open on a loaded libmagic");
        cookie.load(None).is_ok()
    }

    fn live() -> Option<Magic> {
        if !default_database_installed() {
            return None;
        }
        Some(Magic::new(None).expect("construction without a database path"))
    }

    #[test]
    fn test_construct_without_database_when_default_installed() {
        if !default_database_installed() {
            return;
        }
        let magic = Magic::new(None).unwrap();
        assert!(magic.database_path().is_none());
        let answer = magic.describe_contents(b"hello world\n").unwrap();
        assert!(!answer.is_empty());
        assert!(magic.is_open(DetectorMode::Description));
        assert!(!magic.is_open(DetectorMode::Mime));
    }

    #[test]
    fn test_plain_text_mime() {
        let Some(magic) = live() else { return };
        let mime = magic.checktype_contents(b"hello world\n").unwrap();
        assert!(mime.starts_with("text/plain"), "got {mime}");
    }

    #[test]
    fn test_describe_non_empty_buffers() {
        let Some(magic) = live() else { return };
        for sample in [&b"hello world\n"[..], b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR", b"%PDF-1.4\n", b"\x00\x01\x02\x03"] {
            assert!(!magic.describe_contents(sample).unwrap().is_empty());
            assert!(!magic.checktype_contents(sample).unwrap().is_empty());
        }
    }

    #[test]
    fn test_empty_buffer() {
        let Some(magic) = live() else { return };
        let description = magic.describe_contents(b"").unwrap();
        assert!(description.contains("empty"), "got {description}");
    }

    #[test]
    fn test_filename_matches_contents() {
        let Some(magic) = live() else { return };
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello world\n").unwrap();

        assert_eq!(
            magic.checktype_filename(&path).unwrap(),
            magic.checktype_contents(b"hello world\n").unwrap()
        );
        assert!(!magic.describe_filename(&path).unwrap().is_empty());
    }

    // libmagic itself answers differently for an empty file (it sees the
    // inode first) and an empty buffer; the binding passes both through.
    #[test]
    fn test_empty_file_and_empty_buffer_differ_in_libmagic() {
        let Some(magic) = live() else { return };
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();

        let from_file = magic.checktype_filename(&path).unwrap();
        let from_buffer = magic.checktype_contents(b"").unwrap();
        assert!(from_file.contains("x-empty"), "got {from_file}");
        assert!(from_buffer.contains("x-empty"), "got {from_buffer}");
        assert!(from_file.starts_with("inode/"), "got {from_file}");
        assert!(from_buffer.starts_with("application/"), "got {from_buffer}");
    }

    #[test]
    fn test_missing_file_is_detection_error() {
        let Some(magic) = live() else { return };
        let err = magic
            .describe_filename(Path::new("/nonexistent/filesniff/input.txt"))
            .unwrap_err();
        assert!(matches!(err, SniffError::Detection(_)), "got {err:?}");
        // the detector is still usable
        assert!(magic.describe_contents(b"hello").is_ok());
    }

    #[test]
    fn test_bad_database_fails_on_first_query() {
        if live().is_none() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let bogus = dir.path().join("bogus.mgc");
        std::fs::write(&bogus, b"definitely not a compiled magic file").unwrap();

        let magic = Magic::new(Some(bogus.as_path())).unwrap();
        let err = magic.describe_contents(b"hello").unwrap_err();
        assert!(matches!(err, SniffError::Initialization(_)), "got {err:?}");
    }

    #[test]
    fn test_native_version_reported() {
        let Some(magic) = live() else { return };
        assert!(magic.library_location().is_some());
        if let Some(v) = magic.native_version() {
            assert!(v >= 400, "implausible libmagic version {v}");
        }
    }
}
