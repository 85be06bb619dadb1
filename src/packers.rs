/*
===============================================================================

  PROGRAMMERS:

    martin.isenburg@rapidlasso.com  -  http://rapidlasso.com
    uday.karan@gmail.com - Hobu, Inc.

  COPYRIGHT:

    (c) 2007-2014, martin isenburg, rapidlasso - tools to catch reality
    (c) 2014, Uday Verma, Hobu, Inc.
    (c) 2019, Thomas Montaigu

    This is free software; you can redistribute and/or modify it under the
    terms of the Apache Public License 2.0 published by the Apache Software
    Foundation. See the COPYING file for more information.

    This software is distributed WITHOUT ANY WARRANTY and without even the
    implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.

  CHANGE HISTORY:
    6 June 2019: Translated to Rust
===============================================================================
*/

//! Little-endian (un)packing of the values found in LAS point records

use byteorder::{ByteOrder, LittleEndian};

pub trait Packable {
    type Type;

    /// Reads the value from the start of `input`, panics if it is too short
    fn unpack_from(input: &[u8]) -> Self::Type;
    /// Writes the value at the start of `output`, panics if it is too short
    fn pack_into(&self, output: &mut [u8]);
}

macro_rules! impl_packable_le {
    ($($ty:ty => $read:ident, $write:ident);+ $(;)?) => {
        $(
            impl Packable for $ty {
                type Type = $ty;

                fn unpack_from(input: &[u8]) -> Self::Type {
                    LittleEndian::$read(input)
                }

                fn pack_into(&self, output: &mut [u8]) {
                    LittleEndian::$write(output, *self)
                }
            }
        )+
    };
}

impl_packable_le!(
    u16 => read_u16, write_u16;
    i16 => read_i16, write_i16;
    u32 => read_u32, write_u32;
    i32 => read_i32, write_i32;
    f64 => read_f64, write_f64;
);

impl Packable for u8 {
    type Type = u8;

    fn unpack_from(input: &[u8]) -> Self::Type {
        input[0]
    }

    fn pack_into(&self, output: &mut [u8]) {
        output[0] = *self;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_packer() {
        let mut buf = [0u8; 4];
        (-25i32).pack_into(&mut buf);
        assert_eq!(i32::unpack_from(&buf), -25);
        assert_eq!(buf, [0xE7, 0xFF, 0xFF, 0xFF]);

        0x0A0B_0C0Du32.pack_into(&mut buf);
        assert_eq!(buf, [0x0D, 0x0C, 0x0B, 0x0A]);
    }

    #[test]
    fn doubles_keep_their_bits() {
        let mut buf = [0u8; 8];
        let value = f64::from_bits(0x7FF8_0000_0000_0001);
        value.pack_into(&mut buf);
        assert_eq!(f64::unpack_from(&buf).to_bits(), value.to_bits());
    }
}
