//! Machine stamp and byte order handling.
//!
//! Bytes 8..12 of a file record the number formats it was written with:
//! the high nibble of byte 0 is the real format and the high nibble of
//! byte 1 the integer format. Only IEEE reals are supported.

use mtzkit_core::Context;

use crate::error::{Error, Result};

/// Byte offset of the machine stamp.
pub const STAMP_OFFSET: usize = 8;

const BIG_ENDIAN_CODE: u8 = 1;
const VAX_CODE: u8 = 2;
const LITTLE_ENDIAN_CODE: u8 = 4;
const CONVEX_CODE: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    /// Byte order of the running machine.
    #[must_use]
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }

    fn code(self) -> u8 {
        match self {
            Self::Big => BIG_ENDIAN_CODE,
            Self::Little => LITTLE_ENDIAN_CODE,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            BIG_ENDIAN_CODE => Some(Self::Big),
            LITTLE_ENDIAN_CODE => Some(Self::Little),
            _ => None,
        }
    }
}

/// Number formats of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineStamp {
    pub float_order: ByteOrder,
    pub int_order: ByteOrder,
}

impl Default for MachineStamp {
    fn default() -> Self {
        Self::native()
    }
}

impl MachineStamp {
    /// Stamp for files written on the running machine.
    #[must_use]
    pub fn native() -> Self {
        let order = ByteOrder::native();
        Self {
            float_order: order,
            int_order: order,
        }
    }

    /// Encodes the stamp as written to files.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 4] {
        let ft = self.float_order.code();
        let it = self.int_order.code();
        [ft | (ft << 4), 1 | (it << 4), 0, 0]
    }

    /// Decodes a stamp read from a file. A missing or unknown code is
    /// reported and the native order assumed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for VAX or Convex reals.
    pub fn from_bytes(ctx: &Context, bytes: [u8; 4]) -> Result<Self> {
        let float_code = bytes[0] >> 4;
        let int_code = bytes[1] >> 4;
        if matches!(float_code, VAX_CODE | CONVEX_CODE) {
            return Err(Error::UnsupportedFormat(float_code));
        }
        if float_code == 0 || int_code == 0 {
            ctx.warn("MachineStamp", "no machine stamp in file, assuming native byte order");
            return Ok(Self::native());
        }
        let native = ByteOrder::native();
        let float_order = ByteOrder::from_code(float_code).unwrap_or_else(|| {
            ctx.warn("MachineStamp", &format!("unknown real format code {float_code}"));
            native
        });
        let int_order = ByteOrder::from_code(int_code).unwrap_or_else(|| {
            ctx.warn("MachineStamp", &format!("unknown integer format code {int_code}"));
            native
        });
        Ok(Self {
            float_order,
            int_order,
        })
    }

    /// Reads an integer in the file's integer byte order.
    #[must_use]
    pub fn read_i32(self, bytes: [u8; 4]) -> i32 {
        match self.int_order {
            ByteOrder::Big => i32::from_be_bytes(bytes),
            ByteOrder::Little => i32::from_le_bytes(bytes),
        }
    }

    #[must_use]
    pub fn read_f32(self, bytes: [u8; 4]) -> f32 {
        match self.float_order {
            ByteOrder::Big => f32::from_be_bytes(bytes),
            ByteOrder::Little => f32::from_le_bytes(bytes),
        }
    }
}

/// Copies the four bytes at `offset`, if present.
pub(crate) fn word_at(data: &[u8], offset: usize) -> Option<[u8; 4]> {
    data.get(offset..offset + 4)?.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> Context {
        Context::new("stamp").with_verbosity(0)
    }

    #[test]
    fn test_stamp_bytes() {
        let le = MachineStamp {
            float_order: ByteOrder::Little,
            int_order: ByteOrder::Little,
        };
        assert_eq!(le.to_bytes(), [0x44, 0x41, 0, 0]);
        let be = MachineStamp {
            float_order: ByteOrder::Big,
            int_order: ByteOrder::Big,
        };
        assert_eq!(be.to_bytes(), [0x11, 0x11, 0, 0]);
        assert_eq!(MachineStamp::from_bytes(&quiet(), [0x11, 0x11, 0, 0]).unwrap(), be);
    }

    #[test]
    fn test_missing_stamp_is_native() {
        let stamp = MachineStamp::from_bytes(&quiet(), [0, 0, 0, 0]).unwrap();
        assert_eq!(stamp, MachineStamp::native());
    }

    #[test]
    fn test_vax_rejected() {
        assert!(matches!(
            MachineStamp::from_bytes(&quiet(), [0x22, 0x41, 0, 0]),
            Err(Error::UnsupportedFormat(2))
        ));
    }

    #[test]
    fn test_read_words() {
        let be = MachineStamp {
            float_order: ByteOrder::Big,
            int_order: ByteOrder::Big,
        };
        assert_eq!(be.read_i32([0, 0, 0, 21]), 21);
        assert!((be.read_f32(1.5f32.to_be_bytes()) - 1.5).abs() < f32::EPSILON);
        assert_eq!(word_at(&[1, 2, 3, 4, 5], 1), Some([2, 3, 4, 5]));
        assert_eq!(word_at(&[1, 2, 3], 0), None);
    }
}
