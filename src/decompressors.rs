/*
===============================================================================

  CONTENTS:
    Integer decompressor

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


use std::io::Read;

use crate::compressors::{CorrectorRange, IntegerModels, DEFAULT_BITS, DEFAULT_BITS_HIGH, DEFAULT_CONTEXTS};
use crate::decoders::ArithmeticDecoder;

#[derive(Debug, Clone)]
pub struct IntegerDecompressor {
    k: u32,
    bits_high: u32,
    range: CorrectorRange,
    models: IntegerModels,
}

impl IntegerDecompressor {
    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn reset(&mut self) {
        self.k = 0;
        self.models.reset();
    }

    pub fn decompress<T: Read>(
        &mut self,
        decoder: &mut ArithmeticDecoder<T>,
        pred: i32,
        context: u32,
    ) -> std::io::Result<i32> {
        let corr = self.read_corrector(decoder, context as usize)?;
        let mut real = pred.wrapping_add(corr);
        if real < 0 {
            real = real.wrapping_add(self.range.range as i32);
        } else if self.range.range != 0 && (real as u32) >= self.range.range {
            real = real.wrapping_sub(self.range.range as i32);
        }
        Ok(real)
    }

    fn read_corrector<T: Read>(
        &mut self,
        decoder: &mut ArithmeticDecoder<T>,
        context: usize,
    ) -> std::io::Result<i32> {
        self.k = decoder.decode_symbol(&mut self.models.bits[context])?;
        if self.k == 0 {
            return Ok(decoder.decode_bit(&mut self.models.corrector_0)? as i32);
        }
        if self.k >= 32 {
            return Ok(self.range.min);
        }

        let model = &mut self.models.corrector[(self.k - 1) as usize];
        let mut c = if self.k <= self.bits_high {
            decoder.decode_symbol(model)? as i32
        } else {
            let k1 = self.k - self.bits_high;
            let high = decoder.decode_symbol(model)? as i32;
            let low = decoder.read_bits(k1)? as i32;
            (high << k1) | low
        };

        // translate c back into its interval
        if c >= (1i32 << (self.k - 1)) {
            c += 1;
        } else {
            c -= ((1u32 << self.k) - 1) as i32;
        }
        Ok(c)
    }
}

pub struct IntegerDecompressorBuilder {
    bits: u32,
    contexts: u32,
    bits_high: u32,
}

impl IntegerDecompressorBuilder {
    pub fn new() -> Self {
        Self {
            bits: DEFAULT_BITS,
            contexts: DEFAULT_CONTEXTS,
            bits_high: DEFAULT_BITS_HIGH,
        }
    }

    pub fn bits(&mut self, bits: u32) -> &mut Self {
        self.bits = bits;
        self
    }

    pub fn contexts(&mut self, contexts: u32) -> &mut Self {
        self.contexts = contexts;
        self
    }

    pub fn build(&self) -> IntegerDecompressor {
        let range = CorrectorRange::from_bits(self.bits);
        IntegerDecompressor {
            k: 0,
            bits_high: self.bits_high,
            range,
            models: IntegerModels::new(self.contexts, &range, self.bits_high, false),
        }
    }
}

impl Default for IntegerDecompressorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::compressors::IntegerCompressorBuilder;
    use crate::encoders::ArithmeticEncoder;

    #[test]
    fn predictions_and_extremes_survive() {
        let cases: Vec<(i32, i32)> = vec![
            (0, 0),
            (0, 1),
            (10, -10),
            (i32::MAX, i32::MIN),
            (i32::MIN, i32::MAX),
            (-5, 1 << 20),
            (1 << 30, -(1 << 30)),
            (7, 7),
        ];

        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        let mut ic = IntegerCompressorBuilder::new().bits(32).contexts(2).build();
        for (i, (pred, real)) in cases.iter().enumerate() {
            ic.compress(&mut encoder, *pred, *real, (i % 2) as u32).unwrap();
        }
        encoder.done().unwrap();

        let mut decoder = ArithmeticDecoder::new(Cursor::new(encoder.into_stream().into_inner()));
        decoder.read_init_bytes().unwrap();
        let mut id = IntegerDecompressorBuilder::new().bits(32).contexts(2).build();
        for (i, (pred, real)) in cases.iter().enumerate() {
            assert_eq!(id.decompress(&mut decoder, *pred, (i % 2) as u32).unwrap(), *real);
        }
    }

    #[test]
    fn sixteen_bit_values_wrap_around() {
        let cases: Vec<(i32, i32)> = vec![(0, 65535), (65535, 0), (100, 40000), (-3, 65533)];

        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        let mut ic = IntegerCompressorBuilder::new().bits(16).build();
        for (pred, real) in &cases {
            ic.compress(&mut encoder, *pred, *real, 0).unwrap();
        }
        encoder.done().unwrap();

        let mut decoder = ArithmeticDecoder::new(Cursor::new(encoder.into_stream().into_inner()));
        decoder.read_init_bytes().unwrap();
        let mut id = IntegerDecompressorBuilder::new().bits(16).build();
        for (pred, real) in &cases {
            let value = id.decompress(&mut decoder, *pred, 0).unwrap();
            assert_eq!(value as u16, *real as u16);
        }
    }
}
