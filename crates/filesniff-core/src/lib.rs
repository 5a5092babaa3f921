//! filesniff core — a thin, safe binding over libmagic.
//!
//! [`Magic`] answers four questions about content, routed to one of two
//! lazily opened libmagic detectors:
//!
//! | query                          | detector    | example answer                  |
//! |--------------------------------|-------------|---------------------------------|
//! | [`Magic::describe_contents`]   | description | `ASCII text`                    |
//! | [`Magic::describe_filename`]   | description | `PNG image data, 1 x 1, ...`    |
//! | [`Magic::checktype_contents`]  | MIME        | `text/plain; charset=us-ascii`  |
//! | [`Magic::checktype_filename`]  | MIME        | `image/png; charset=binary`     |
//!
//! All detection happens inside libmagic; results are copied into owned
//! `String`s before the call returns.

pub mod backend;
pub mod config;
pub mod error;
pub mod magic;

pub use backend::{Backend, LibMagicBackend};
pub use config::{DetectionConfig, MagicConfig, SniffConfig};
pub use error::{ExitCode, Result, SniffError};
pub use magic::{DetectorMode, Magic, Options};

pub use filesniff_ffi::{FfiError, MagicFlags, format_version};
