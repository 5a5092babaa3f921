//! filesniff FFI — runtime bindings to libmagic.
//!
//! libmagic is located with `libloading` at first use rather than linked at
//! build time, so a missing library is an ordinary error instead of a loader
//! failure at process start.
//!
//! - [`LibMagic`] resolves `magic_open`, `magic_load`, `magic_file`,
//!   `magic_buffer`, `magic_error`, `magic_close` and, when present,
//!   `magic_version`.
//! - [`Cookie`] owns one `magic_t` and closes it on drop.

pub mod cookie;
pub mod error;
pub mod flags;
pub mod library;

pub use cookie::Cookie;
pub use error::{FfiError, Result};
pub use flags::MagicFlags;
pub use library::{LIBRARY_ENV, LibMagic, format_version};
