use std::ffi::OsStr;
use std::path::Path;

use filesniff_ffi::{Cookie, FfiError, LibMagic, MagicFlags};

use crate::error::{Result, SniffError};

/// The native call surface a [`crate::Magic`] drives.
///
/// A `Handle` is one open detector and must release its native resources
/// when dropped.
pub trait Backend: Send + Sync {
    type Handle: Send;

    fn open(&self, flags: MagicFlags) -> std::result::Result<Self::Handle, FfiError>;

    fn load(
        &self,
        handle: &mut Self::Handle,
        database: Option<&Path>,
    ) -> std::result::Result<(), FfiError>;

    fn classify_file(
        &self,
        handle: &mut Self::Handle,
        path: &Path,
    ) -> std::result::Result<String, FfiError>;

    fn classify_buffer(
        &self,
        handle: &mut Self::Handle,
        bytes: &[u8],
    ) -> std::result::Result<String, FfiError>;

    /// Where the native library came from, for diagnostics.
    fn location(&self) -> Option<&str> {
        None
    }

    /// Native library version as reported by `magic_version()`.
    fn version(&self) -> Option<i32> {
        None
    }
}

/// [`Backend`] over the process-wide libmagic.
#[derive(Debug, Clone, Copy)]
pub struct LibMagicBackend {
    lib: &'static LibMagic,
}

impl LibMagicBackend {
    /// Locate libmagic, preferring `library_path` when given.
    pub fn locate(library_path: Option<&str>) -> Result<Self> {
        let lib = LibMagic::global_with(library_path.filter(|p| !p.is_empty()).map(OsStr::new))
            .map_err(|e| SniffError::LibraryNotFound(e.to_string()))?;
        Ok(Self { lib })
    }
}

impl Backend for LibMagicBackend {
    type Handle = Cookie<'static>;

    fn open(&self, flags: MagicFlags) -> std::result::Result<Self::Handle, FfiError> {
        Cookie::open(self.lib, flags)
    }

    fn load(
        &self,
        handle: &mut Self::Handle,
        database: Option<&Path>,
    ) -> std::result::Result<(), FfiError> {
        handle.load(database)
    }

    fn classify_file(
        &self,
        handle: &mut Self::Handle,
        path: &Path,
    ) -> std::result::Result<String, FfiError> {
        handle.file(path)
    }

    fn classify_buffer(
        &self,
        handle: &mut Self::Handle,
        bytes: &[u8],
    ) -> std::result::Result<String, FfiError> {
        handle.buffer(bytes)
    }

    fn location(&self) -> Option<&str> {
        Some(self.lib.location())
    }

    fn version(&self) -> Option<i32> {
        self.lib.version()
    }
}
