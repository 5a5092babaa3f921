use std::ffi::{CStr, CString, c_char};
use std::path::Path;
use std::ptr;

use tracing::{debug, warn};

use crate::error::{FfiError, Result};
use crate::flags::MagicFlags;
use crate::library::{LibMagic, MagicT};

/// One open libmagic handle.
///
/// Closed exactly once, on drop. Queries take `&mut self` because libmagic
/// reuses a per-cookie buffer for results and a cookie must not be used from
/// two threads at once.
pub struct Cookie<'lib> {
    lib: &'lib LibMagic,
    raw: MagicT,
    flags: MagicFlags,
}

// SAFETY: a cookie may move between threads; `&mut self` on every call keeps
// use exclusive.
unsafe impl Send for Cookie<'_> {}

impl std::fmt::Debug for Cookie<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cookie")
            .field("flags", &self.flags)
            .field("library", &self.lib.location())
            .finish()
    }
}

impl<'lib> Cookie<'lib> {
    /// `magic_open(flags)`.
    pub fn open(lib: &'lib LibMagic, flags: MagicFlags) -> Result<Self> {
        // SAFETY: magic_open accepts any flag value and returns NULL on failure.
        let raw = unsafe { (lib.open)(flags.bits()) };
        if raw.is_null() {
            let reason = std::io::Error::last_os_error().to_string();
            warn!(%flags, %reason, "magic_open failed");
            return Err(FfiError::Open {
                flags: flags.bits(),
                reason,
            });
        }
        debug!(%flags, "magic cookie opened");
        Ok(Self { lib, raw, flags })
    }

    pub fn flags(&self) -> MagicFlags {
        self.flags
    }

    /// `magic_load`. `None` loads the library's compiled-in default database.
    pub fn load(&mut self, database: Option<&Path>) -> Result<()> {
        let database = database.map(path_to_cstring).transpose()?;
        let db_ptr = database.as_ref().map_or(ptr::null(), |c| c.as_ptr());

        // SAFETY: `raw` is a live cookie; `db_ptr` is NULL or a NUL-terminated
        // string that outlives the call.
        let status = unsafe { (self.lib.load)(self.raw, db_ptr) };
        if status != 0 {
            let message = self
                .last_error()
                .unwrap_or_else(|| format!("magic_load returned {status}"));
            warn!(flags = %self.flags, %message, "magic_load failed");
            return Err(FfiError::Native(message));
        }
        debug!(flags = %self.flags, database = ?database, "magic database loaded");
        Ok(())
    }

    /// `magic_file`: libmagic opens and reads `path` itself.
    pub fn file(&mut self, path: &Path) -> Result<String> {
        let c_path = path_to_cstring(path)?;
        // SAFETY: `raw` is a live cookie and `c_path` outlives the call.
        let out = unsafe { (self.lib.file)(self.raw, c_path.as_ptr()) };
        self.copy_result(out, "magic_file")
    }

    /// `magic_buffer` with an explicit length; `bytes` need not be
    /// NUL-terminated.
    pub fn buffer(&mut self, bytes: &[u8]) -> Result<String> {
        // SAFETY: `bytes` is valid for `bytes.len()` reads for the duration of
        // the call; libmagic does not retain the pointer.
        let out = unsafe { (self.lib.buffer)(self.raw, bytes.as_ptr().cast(), bytes.len()) };
        self.copy_result(out, "magic_buffer")
    }

    /// `magic_error`: text of the last failure on this cookie, if any.
    pub fn last_error(&self) -> Option<String> {
        // SAFETY: `raw` is a live cookie.
        let err = unsafe { (self.lib.error)(self.raw) };
        if err.is_null() {
            return None;
        }
        // SAFETY: non-NULL magic_error results are NUL-terminated.
        Some(unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned())
    }

    // The returned pointer is only stable until the next call on this cookie,
    // so it is copied before `&mut self` is released.
    fn copy_result(&self, out: *const c_char, call: &str) -> Result<String> {
        if out.is_null() {
            let message = self
                .last_error()
                .unwrap_or_else(|| format!("{call} failed without an error message"));
            debug!(flags = %self.flags, %message, "{call} failed");
            return Err(FfiError::Native(message));
        }
        // SAFETY: non-NULL results are NUL-terminated and owned by the cookie.
        Ok(unsafe { CStr::from_ptr(out) }.to_string_lossy().into_owned())
    }
}

impl Drop for Cookie<'_> {
    fn drop(&mut self) {
        // SAFETY: `raw` came from magic_open and is closed only here.
        unsafe { (self.lib.close)(self.raw) };
        debug!(flags = %self.flags, "magic cookie closed");
    }
}

#[cfg(unix)]
fn path_to_cstring(path: &Path) -> Result<CString> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| FfiError::Native(format!("path contains a NUL byte: {}", path.display())))
}

#[cfg(not(unix))]
fn path_to_cstring(path: &Path) -> Result<CString> {
    let s = path
        .to_str()
        .ok_or_else(|| FfiError::Native(format!("path is not valid UTF-8: {}", path.display())))?;
    CString::new(s).map_err(|_| FfiError::Native(format!("path contains a NUL byte: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// libmagic with a loadable default database, or `None` to skip.
    ///
    /// Only a missing library or a missing default database skips; once the
    /// library is present, opening a cookie must work.
    fn live() -> Option<&'static LibMagic> {
        let lib = LibMagic::global().ok()?;
        let mut cookie = Cookie::open(lib, MagicFlags::NONE).expect("magic_open on a loaded libmagic");
        cookie.load(None).ok()?;
        Some(lib)
    }

    #[test]
    fn test_path_with_nul_is_rejected() {
        let err = path_to_cstring(Path::new("bad\0path")).unwrap_err();
        assert!(err.to_string().contains("NUL"));
    }

    #[test]
    fn test_buffer_plain_text_mime() {
        let Some(lib) = live() else { return };
        let mut cookie = Cookie::open(lib, MagicFlags::MIME).unwrap();
        cookie.load(None).unwrap();
        let mime = cookie.buffer(b"hello world\n").unwrap();
        assert!(mime.starts_with("text/plain"), "got {mime}");
    }

    #[test]
    fn test_missing_file_reports_native_error() {
        let Some(lib) = live() else { return };
        let mut cookie = Cookie::open(lib, MagicFlags::ERROR).unwrap();
        cookie.load(None).unwrap();
        let err = cookie.file(Path::new("/nonexistent/filesniff/input.bin")).unwrap_err();
        assert!(matches!(err, FfiError::Native(_)));
        // the cookie is still usable after a failed query
        assert!(cookie.buffer(b"hello world\n").is_ok());
    }

    #[test]
    fn test_load_bad_database_fails() {
        let Some(lib) = live() else { return };
        let dir = tempfile::TempDir::new().unwrap();
        let bogus = dir.path().join("bogus.mgc");
        std::fs::write(&bogus, b"definitely not a compiled magic file").unwrap();

        let mut cookie = Cookie::open(lib, MagicFlags::NONE).unwrap();
        assert!(cookie.load(Some(&bogus)).is_err());
    }
}
