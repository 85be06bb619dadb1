/*
===============================================================================

  CONTENTS:
    Integer compressor and the state it shares with the decompressor

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


use std::io::Write;

use crate::encoders::ArithmeticEncoder;
use crate::models::{ArithmeticBitModel, ArithmeticModel, ArithmeticModelBuilder};

pub const DEFAULT_BITS: u32 = 16;
pub const DEFAULT_CONTEXTS: u32 = 1;
pub const DEFAULT_BITS_HIGH: u32 = 8;

/// Interval the corrector `real - pred` is folded into.
#[derive(Debug, Copy, Clone)]
pub(crate) struct CorrectorRange {
    pub(crate) bits: u32,
    /// 0 stands for the full 32 bit range
    pub(crate) range: u32,
    pub(crate) min: i32,
    pub(crate) max: i32,
}

impl CorrectorRange {
    pub(crate) fn from_bits(bits: u32) -> Self {
        if bits >= 1 && bits < 32 {
            let range = 1u32 << bits;
            let min = -((range / 2) as i32);
            Self {
                bits,
                range,
                min,
                max: min + (range - 1) as i32,
            }
        } else {
            Self {
                bits: 32,
                range: 0,
                min: i32::MIN,
                max: i32::MAX,
            }
        }
    }

    pub(crate) fn fold(&self, corr: i32) -> i32 {
        if corr < self.min {
            corr.wrapping_add(self.range as i32)
        } else if corr > self.max {
            corr.wrapping_sub(self.range as i32)
        } else {
            corr
        }
    }
}

/// Models of an integer compressor or decompressor.
///
/// `bits[ctx]` codes `k`, the number of bits of the corrector,
/// `corrector[k - 1]` codes the (high bits of the) corrector itself.
#[derive(Debug, Clone)]
pub(crate) struct IntegerModels {
    pub(crate) bits: Vec<ArithmeticModel>,
    pub(crate) corrector_0: ArithmeticBitModel,
    pub(crate) corrector: Vec<ArithmeticModel>,
}

impl IntegerModels {
    pub(crate) fn new(contexts: u32, range: &CorrectorRange, bits_high: u32, compress: bool) -> Self {
        let build = |symbols: u32| {
            let builder = ArithmeticModelBuilder::new(symbols);
            if compress {
                builder.compressing().build()
            } else {
                builder.build()
            }
        };
        Self {
            bits: (0..contexts).map(|_| build(range.bits + 1)).collect(),
            corrector_0: ArithmeticBitModel::new(),
            corrector: (1..=range.bits)
                .map(|i| build(1u32 << i.min(bits_high)))
                .collect(),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.bits.iter_mut().for_each(ArithmeticModel::reset);
        self.corrector_0.reset();
        self.corrector.iter_mut().for_each(ArithmeticModel::reset);
    }
}

/// Compresses integers as a correction of a prediction.
#[derive(Debug, Clone)]
pub struct IntegerCompressor {
    k: u32,
    bits_high: u32,
    range: CorrectorRange,
    models: IntegerModels,
}

impl IntegerCompressor {
    /// Number of bits of the last compressed corrector
    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn reset(&mut self) {
        self.k = 0;
        self.models.reset();
    }

    pub fn compress<T: Write>(
        &mut self,
        encoder: &mut ArithmeticEncoder<T>,
        pred: i32,
        real: i32,
        context: u32,
    ) -> std::io::Result<()> {
        let corr = self.range.fold(real.wrapping_sub(pred));
        self.write_corrector(encoder, corr, context as usize)
    }

    fn write_corrector<T: Write>(
        &mut self,
        encoder: &mut ArithmeticEncoder<T>,
        mut c: i32,
        context: usize,
    ) -> std::io::Result<()> {
        // tightest interval [ - (2^k - 1)  ...  + (2^k) ] that contains c
        let magnitude = if c <= 0 {
            c.wrapping_neg() as u32
        } else {
            (c - 1) as u32
        };
        self.k = 32 - magnitude.leading_zeros();

        encoder.encode_symbol(&mut self.models.bits[context], self.k)?;
        if self.k == 0 {
            // c is 0 or 1
            debug_assert!(c == 0 || c == 1);
            return encoder.encode_bit(&mut self.models.corrector_0, c as u32);
        }
        if self.k < 32 {
            // translate c into the k-bit interval [ 0 ... 2^k - 1 ]
            if c >= 0 {
                c -= 1;
            } else {
                c += ((1u32 << self.k) - 1) as i32;
            }

            let model = &mut self.models.corrector[(self.k - 1) as usize];
            if self.k <= self.bits_high {
                encoder.encode_symbol(model, c as u32)?;
            } else {
                // the high bits with the model, the k1 low bits raw
                let k1 = self.k - self.bits_high;
                let low = (c as u32) & ((1u32 << k1) - 1);
                encoder.encode_symbol(model, (c >> k1) as u32)?;
                encoder.write_bits(k1, low)?;
            }
        }
        Ok(())
    }
}

pub struct IntegerCompressorBuilder {
    bits: u32,
    contexts: u32,
    bits_high: u32,
}

impl IntegerCompressorBuilder {
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

    pub fn build(&self) -> IntegerCompressor {
        let range = CorrectorRange::from_bits(self.bits);
        IntegerCompressor {
            k: 0,
            bits_high: self.bits_high,
            range,
            models: IntegerModels::new(self.contexts, &range, self.bits_high, true),
        }
    }
}

impl Default for IntegerCompressorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrector_is_folded_into_range() {
        let range = CorrectorRange::from_bits(16);
        assert_eq!(range.min, -32768);
        assert_eq!(range.max, 32767);
        assert_eq!(range.fold(65535), -1);
        assert_eq!(range.fold(-65535), 1);
        assert_eq!(range.fold(12), 12);

        let full = CorrectorRange::from_bits(32);
        assert_eq!(full.range, 0);
        assert_eq!(full.fold(i32::MIN), i32::MIN);
    }

    #[test]
    fn corrector_models_are_capped_at_bits_high() {
        let ic = IntegerCompressorBuilder::new().bits(32).contexts(3).build();
        assert_eq!(ic.models.bits.len(), 3);
        assert_eq!(ic.models.bits[0].symbols, 33);
        assert_eq!(ic.models.corrector.len(), 32);
        assert_eq!(ic.models.corrector[0].symbols, 2);
        assert_eq!(ic.models.corrector[7].symbols, 256);
        assert_eq!(ic.models.corrector[20].symbols, 256);
    }
}
