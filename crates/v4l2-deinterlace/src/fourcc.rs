// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

#![forbid(unsafe_code)]

use core::fmt;

/// Four-character pixel format code.
///
/// V4L2 encodes fourcc codes as a little-endian `u32` regardless of host
/// byte order, which is what [`FourCC::code`] produces.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// The device-facing `u32` format code.
    pub const fn code(self) -> u32 {
        u32::from_le_bytes(self.0)
    }
}

impl From<u32> for FourCC {
    fn from(val: u32) -> FourCC {
        FourCC(val.to_le_bytes())
    }
}

impl From<FourCC> for u32 {
    fn from(val: FourCC) -> u32 {
        val.code()
    }
}

impl From<&[u8; 4]> for FourCC {
    fn from(buf: &[u8; 4]) -> FourCC {
        FourCC(*buf)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match core::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => {
                // Fall back to escaped bytes rather than erroring out, so
                // format!() never panics on a garbage code from a driver.
                let b = &self.0;
                f.write_fmt(format_args!(
                    "{}{}{}{}",
                    core::ascii::escape_default(b[0]),
                    core::ascii::escape_default(b[1]),
                    core::ascii::escape_default(b[2]),
                    core::ascii::escape_default(b[3])
                ))
            }
        }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FourCC").field(&format_args!("{}", self)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_matches_v4l2_encoding() {
        assert_eq!(FourCC(*b"YU12").code(), 0x3231_5559);
        assert_eq!(FourCC(*b"YUYV").code(), 0x5659_5559);
    }

    #[test]
    fn test_roundtrip() {
        let fourcc = FourCC(*b"NV12");
        assert_eq!(FourCC::from(fourcc.code()), fourcc);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", FourCC(*b"YU12")), "YU12");
        assert_eq!(format!("{}", FourCC([0x59, 0x55, 0x00, 0xff])), "YU\\x00\\xff");
    }
}
