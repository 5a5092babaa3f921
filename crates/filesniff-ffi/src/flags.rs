use std::ffi::c_int;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Flag set passed to `magic_open`. Values match `<magic.h>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MagicFlags(c_int);

impl MagicFlags {
    pub const NONE: Self = Self(0x0000_0000);
    /// Print debugging messages to stderr.
    pub const DEBUG: Self = Self(0x0000_0001);
    /// Follow symlinks.
    pub const SYMLINK: Self = Self(0x0000_0002);
    /// Look inside compressed files.
    pub const COMPRESS: Self = Self(0x0000_0004);
    /// Look at the contents of devices.
    pub const DEVICES: Self = Self(0x0000_0008);
    /// Return the MIME type.
    pub const MIME_TYPE: Self = Self(0x0000_0010);
    /// Return all matches, not just the first.
    pub const CONTINUE: Self = Self(0x0000_0020);
    /// Print warnings to stderr.
    pub const CHECK: Self = Self(0x0000_0040);
    /// Restore access time on exit.
    pub const PRESERVE_ATIME: Self = Self(0x0000_0080);
    /// Don't convert unprintable characters.
    pub const RAW: Self = Self(0x0000_0100);
    /// Handle ENOENT etc as real errors.
    pub const ERROR: Self = Self(0x0000_0200);
    /// Return the MIME encoding.
    pub const MIME_ENCODING: Self = Self(0x0000_0400);
    pub const MIME: Self = Self(Self::MIME_TYPE.0 | Self::MIME_ENCODING.0);

    pub const fn from_bits(bits: c_int) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> c_int {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for MagicFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MagicFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for MagicFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_is_type_plus_encoding() {
        assert_eq!(MagicFlags::MIME, MagicFlags::MIME_TYPE | MagicFlags::MIME_ENCODING);
        assert_eq!(MagicFlags::MIME.bits(), 0x410);
    }

    #[test]
    fn test_contains() {
        let flags = MagicFlags::MIME | MagicFlags::SYMLINK;
        assert!(flags.contains(MagicFlags::MIME_TYPE));
        assert!(flags.contains(MagicFlags::SYMLINK));
        assert!(!flags.contains(MagicFlags::COMPRESS));
        assert!(MagicFlags::NONE.is_empty());
    }

    #[test]
    fn test_bitor_assign_and_display() {
        let mut flags = MagicFlags::NONE;
        flags |= MagicFlags::RAW;
        assert_eq!(flags, MagicFlags::from_bits(0x100));
        assert_eq!(flags.to_string(), "0x0100");
    }
}
