/*
===============================================================================

  CONTENTS:
    Adaptive probability models used by the arithmetic coder

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
    Models can be reset in place between chunks

===============================================================================
*/

// length bits discarded before mult.
pub(crate) const DM_LENGTH_SHIFT: u32 = 15;
// for adaptive models
pub(crate) const DM_MAX_COUNT: u32 = 1 << DM_LENGTH_SHIFT;

// length bits discarded before mult.
pub(crate) const BM_LENGTH_SHIFT: u32 = 13;
// for adaptive models
pub(crate) const BM_MAX_COUNT: u32 = 1 << BM_LENGTH_SHIFT;

const MAX_SYMBOLS: u32 = 1 << 11;

/// Adaptive model of a `symbols`-ary alphabet.
///
/// Models built for decoding with more than 16 symbols carry a look-up
/// table that speeds up the symbol search, encoding models never need it.
#[derive(Debug, Clone)]
pub struct ArithmeticModel {
    pub(crate) symbols: u32,
    pub(crate) compress: bool,

    pub(crate) distribution: Vec<u32>,
    pub(crate) symbol_count: Vec<u32>,
    pub(crate) decoder_table: Vec<u32>,

    pub(crate) total_count: u32,
    pub(crate) update_cycle: u32,
    pub(crate) symbols_until_update: u32,
    pub(crate) last_symbol: u32,
    pub(crate) table_size: u32,
    pub(crate) table_shift: u32,
}

impl ArithmeticModel {
    pub fn new(symbols: u32, compress: bool) -> Self {
        assert!(
            symbols >= 2 && symbols <= MAX_SYMBOLS,
            "invalid number of symbols: {}",
            symbols
        );

        let (table_size, table_shift) = if !compress && symbols > 16 {
            let mut table_bits = 3u32;
            while symbols > (1u32 << (table_bits + 2)) {
                table_bits += 1;
            }
            (1u32 << table_bits, DM_LENGTH_SHIFT - table_bits)
        } else {
            (0, 0)
        };

        let decoder_table = if table_size > 0 {
            vec![0u32; (table_size + 2) as usize]
        } else {
            Vec::new()
        };

        let mut model = Self {
            symbols,
            compress,
            distribution: vec![0u32; symbols as usize],
            symbol_count: vec![0u32; symbols as usize],
            decoder_table,
            total_count: 0,
            update_cycle: 0,
            symbols_until_update: 0,
            last_symbol: symbols - 1,
            table_size,
            table_shift,
        };
        model.reset();
        model
    }

    /// Brings the model back to its equiprobable initial state,
    /// keeping its allocations.
    pub fn reset(&mut self) {
        self.total_count = 0;
        self.update_cycle = self.symbols;
        for count in self.symbol_count.iter_mut() {
            *count = 1;
        }
        self.update();
        self.update_cycle = (self.symbols + 6) >> 1;
        self.symbols_until_update = self.update_cycle;
    }

    pub fn update(&mut self) {
        // halve counts when a threshold is reached
        self.total_count += self.update_cycle;
        if self.total_count > DM_MAX_COUNT {
            self.total_count = 0;
            for count in self.symbol_count.iter_mut() {
                *count = (*count + 1) >> 1;
                self.total_count += *count;
            }
        }

        // compute cumulative distribution, decoder table
        let scale = 0x8000_0000u32 / self.total_count;
        let mut sum = 0u32;

        if self.compress || self.table_size == 0 {
            for (distribution, count) in self.distribution.iter_mut().zip(&self.symbol_count) {
                *distribution = (scale * sum) >> (31 - DM_LENGTH_SHIFT);
                sum += *count;
            }
        } else {
            let mut s = 0usize;
            for (k, (distribution, count)) in self
                .distribution
                .iter_mut()
                .zip(&self.symbol_count)
                .enumerate()
            {
                *distribution = (scale * sum) >> (31 - DM_LENGTH_SHIFT);
                sum += *count;
                let w = (*distribution >> self.table_shift) as usize;
                while s < w {
                    s += 1;
                    self.decoder_table[s] = k as u32 - 1;
                }
            }
            self.decoder_table[0] = 0;
            while s <= self.table_size as usize {
                s += 1;
                self.decoder_table[s] = self.symbols - 1;
            }
        }

        // set frequency of model updates
        self.update_cycle = (5 * self.update_cycle) >> 2;
        let max_cycle = (self.symbols + 6) << 3;
        if self.update_cycle > max_cycle {
            self.update_cycle = max_cycle;
        }
        self.symbols_until_update = self.update_cycle;
    }
}

#[derive(Debug, Clone)]
pub struct ArithmeticBitModel {
    pub(crate) bit_0_count: u32,
    pub(crate) bit_count: u32,
    pub(crate) bit_0_prob: u32,
    pub(crate) bits_until_update: u32,
    pub(crate) update_cycle: u32,
}

impl ArithmeticBitModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn update(&mut self) {
        // halve counts when a threshold is reached
        self.bit_count += self.update_cycle;
        if self.bit_count > BM_MAX_COUNT {
            self.bit_count = (self.bit_count + 1) >> 1;
            self.bit_0_count = (self.bit_0_count + 1) >> 1;
            if self.bit_0_count == self.bit_count {
                self.bit_count += 1;
            }
        }

        // compute scaled bit 0 probability
        let scale = 0x8000_0000u32 / self.bit_count;
        self.bit_0_prob = (self.bit_0_count * scale) >> (31 - BM_LENGTH_SHIFT);

        // set frequency of model updates
        self.update_cycle = (5 * self.update_cycle) >> 2;
        if self.update_cycle > 64 {
            self.update_cycle = 64;
        }
        self.bits_until_update = self.update_cycle;
    }
}

impl Default for ArithmeticBitModel {
    fn default() -> Self {
        // equiprobable, with frequent updates at the start
        Self {
            bit_0_count: 1,
            bit_count: 2,
            bit_0_prob: 1u32 << (BM_LENGTH_SHIFT - 1),
            bits_until_update: 4,
            update_cycle: 4,
        }
    }
}

pub struct ArithmeticModelBuilder {
    symbols: u32,
    compress: bool,
}

impl ArithmeticModelBuilder {
    pub fn new(symbols: u32) -> Self {
        Self {
            symbols,
            compress: false,
        }
    }

    /// The model will only be used for encoding and does not need a decoder table
    pub fn compressing(mut self) -> Self {
        self.compress = true;
        self
    }

    pub fn build(self) -> ArithmeticModel {
        ArithmeticModel::new(self.symbols, self.compress)
    }
}

/// Resets the models of a lazily populated table, the ones never used stay absent.
pub(crate) fn reset_created(models: &mut [Option<ArithmeticModel>]) {
    for model in models.iter_mut().flatten() {
        model.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_model_is_uniform() {
        let model = ArithmeticModelBuilder::new(4).build();
        let steps: Vec<u32> = model
            .distribution
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect();
        assert!(steps.iter().all(|s| *s == steps[0]));
        assert_eq!(model.distribution[0], 0);
    }

    #[test]
    fn decoder_table_only_for_large_decoding_models() {
        assert!(ArithmeticModelBuilder::new(16).build().decoder_table.is_empty());
        assert!(!ArithmeticModelBuilder::new(17).build().decoder_table.is_empty());
        assert!(ArithmeticModelBuilder::new(256)
            .compressing()
            .build()
            .decoder_table
            .is_empty());
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut model = ArithmeticModelBuilder::new(64).build();
        let initial = model.clone();
        for _ in 0..10 {
            model.symbol_count[3] += 7;
            model.update();
        }
        assert_ne!(model.distribution, initial.distribution);

        model.reset();
        assert_eq!(model.distribution, initial.distribution);
        assert_eq!(model.decoder_table, initial.decoder_table);
        assert_eq!(model.symbols_until_update, initial.symbols_until_update);
        assert_eq!(model.total_count, initial.total_count);
    }
}
