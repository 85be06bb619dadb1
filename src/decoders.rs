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

//! Arithmetic decoder matching [`ArithmeticEncoder`](crate::encoders::ArithmeticEncoder),
//! see encoders.rs for the notice of the original arithmetic coding implementation.

use std::io::{Error, ErrorKind, Read};

use byteorder::ReadBytesExt;

use crate::encoders::{AC_MAX_LENGTH, AC_MIN_LENGTH};
use crate::models::{ArithmeticBitModel, ArithmeticModel, BM_LENGTH_SHIFT, DM_LENGTH_SHIFT};

pub struct ArithmeticDecoder<T: Read> {
    in_stream: T,
    value: u32,
    length: u32,
}

impl<T: Read> ArithmeticDecoder<T> {
    pub fn new(in_stream: T) -> Self {
        Self {
            in_stream,
            value: 0,
            length: AC_MAX_LENGTH,
        }
    }

    pub fn reset(&mut self) {
        self.value = 0;
        self.length = AC_MAX_LENGTH;
    }

    pub fn read_init_bytes(&mut self) -> std::io::Result<()> {
        let mut v = [0u8; 4];
        self.in_stream.read_exact(&mut v)?;
        self.value = u32::from_be_bytes(v);
        self.length = AC_MAX_LENGTH;
        Ok(())
    }

    pub fn decode_bit(&mut self, model: &mut ArithmeticBitModel) -> std::io::Result<u32> {
        let x = model.bit_0_prob * (self.length >> BM_LENGTH_SHIFT);
        let sym = self.value >= x;

        if sym {
            self.value -= x;
            self.length -= x;
        } else {
            self.length = x;
            model.bit_0_count += 1;
        }

        if self.length < AC_MIN_LENGTH {
            self.renorm_dec_interval()?;
        }
        model.bits_until_update -= 1;
        if model.bits_until_update == 0 {
            model.update();
        }
        Ok(sym as u32)
    }

    pub fn decode_symbol(&mut self, model: &mut ArithmeticModel) -> std::io::Result<u32> {
        let mut sym;
        let x;
        let mut y = self.length;

        if !model.decoder_table.is_empty() {
            self.length >>= DM_LENGTH_SHIFT;
            let dv = self.value / self.length;
            let t = (dv >> model.table_shift) as usize;
            if t + 1 >= model.decoder_table.len() {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    "arithmetic decoder interval out of the model's range",
                ));
            }

            // initial decision based on table look-up, finish with bisection
            sym = model.decoder_table[t];
            let mut n = model.decoder_table[t + 1] + 1;
            while n > sym + 1 {
                let k = (sym + n) >> 1;
                if model.distribution[k as usize] > dv {
                    n = k;
                } else {
                    sym = k;
                }
            }

            x = model.distribution[sym as usize] * self.length;
            if sym != model.last_symbol {
                y = model.distribution[sym as usize + 1] * self.length;
            }
        } else {
            // bisection with multiplications only
            let mut lower = 0u32;
            sym = 0;
            self.length >>= DM_LENGTH_SHIFT;
            let mut n = model.symbols;
            let mut k = n >> 1;
            loop {
                let z = self.length * model.distribution[k as usize];
                if z > self.value {
                    n = k;
                    y = z;
                } else {
                    sym = k;
                    lower = z;
                }
                k = (sym + n) >> 1;
                if k == sym {
                    break;
                }
            }
            x = lower;
        }

        self.value -= x;
        self.length = y - x;
        if self.length < AC_MIN_LENGTH {
            self.renorm_dec_interval()?;
        }

        model.symbol_count[sym as usize] += 1;
        model.symbols_until_update -= 1;
        if model.symbols_until_update == 0 {
            model.update();
        }
        Ok(sym)
    }

    pub fn read_bits(&mut self, mut bits: u32) -> std::io::Result<u32> {
        debug_assert!(bits > 0 && bits <= 32);
        if bits > 19 {
            let low = u32::from(self.read_short()?);
            bits -= 16;
            let high = self.read_bits(bits)? << 16;
            Ok(high | low)
        } else {
            self.decode_uniform(bits)
        }
    }

    pub fn read_short(&mut self) -> std::io::Result<u16> {
        Ok(self.decode_uniform(16)? as u16)
    }

    /// Reads 32 raw bits, low half first
    pub fn read_int(&mut self) -> std::io::Result<u32> {
        let low = u32::from(self.read_short()?);
        let high = u32::from(self.read_short()?);
        Ok(high << 16 | low)
    }

    pub fn in_stream(&mut self) -> &mut T {
        &mut self.in_stream
    }

    pub fn into_stream(self) -> T {
        self.in_stream
    }

    fn decode_uniform(&mut self, bits: u32) -> std::io::Result<u32> {
        self.length >>= bits;
        let sym = self.value / self.length;
        self.value -= self.length * sym;
        if self.length < AC_MIN_LENGTH {
            self.renorm_dec_interval()?;
        }
        Ok(sym)
    }

    fn renorm_dec_interval(&mut self) -> std::io::Result<()> {
        loop {
            self.value = (self.value << 8) | u32::from(self.in_stream.read_u8()?);
            self.length <<= 8;
            if self.length >= AC_MIN_LENGTH {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::models::ArithmeticModelBuilder;

    #[test]
    fn truncated_input_is_an_error() {
        let mut decoder = ArithmeticDecoder::new(Cursor::new(vec![0u8, 1]));
        let err = decoder.read_init_bytes().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);

        let mut decoder = ArithmeticDecoder::new(Cursor::new(vec![0x12u8, 0x34, 0x56, 0x78]));
        decoder.read_init_bytes().unwrap();
        let mut model = ArithmeticModelBuilder::new(8).build();
        let result: std::io::Result<Vec<u32>> =
            (0..64).map(|_| decoder.decode_symbol(&mut model)).collect();
        assert!(result.is_err());
    }
}
