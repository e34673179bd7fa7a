//! Internal module providing handy functions

use byteorder::{ByteOrder, LittleEndian};

macro_rules! from_err {
    ($from:ty, $to:tt, $var:tt) => {
        impl From<$from> for $to {
            fn from(e: $from) -> $to {
                $to::$var(e)
            }
        }
    };
}

/// Callers must check that `s` holds at least 2 bytes
pub(crate) fn read_u16(s: &[u8]) -> u16 {
    LittleEndian::read_u16(s)
}

/// Callers must check that `s` holds at least 4 bytes
pub(crate) fn read_u32(s: &[u8]) -> u32 {
    LittleEndian::read_u32(s)
}

pub(crate) fn read_usize(s: &[u8]) -> usize {
    read_u32(s) as usize
}

pub(crate) fn read_f64(s: &[u8]) -> f64 {
    LittleEndian::read_f64(s)
}

/// Decodes an RK number (MS-XLS 2.5.218, MS-XLSB 2.5.122)
///
/// Bit 0 asks for a division by 100, bit 1 marks a 30-bit signed integer,
/// otherwise the remaining bits are the most significant 30 bits of an IEEE
/// double.
pub(crate) fn rk_number(rk: u32) -> f64 {
    let d100 = rk & 1 != 0;
    let v = if rk & 2 != 0 {
        ((rk as i32) >> 2) as f64
    } else {
        f64::from_bits(((rk & 0xFFFF_FFFC) as u64) << 32)
    };
    if d100 {
        v / 100.0
    } else {
        v
    }
}
