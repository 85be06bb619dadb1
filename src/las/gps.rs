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
//! GPS time of the point14 records and its multi sequence predictor.
//!
//! Each scanner channel context tracks up to 4 sequences of time stamps,
//! (the pulses of a scanner usually interleave a few of them).
//! A time is coded relatively to the last time of one of the sequences,
//! as a multiple of the sequence's last time difference plus a correction.

use std::io::{Error, ErrorKind, Read, Write};

use log::trace;

use crate::compressors::{IntegerCompressor, IntegerCompressorBuilder};
use crate::decoders::ArithmeticDecoder;
use crate::decompressors::{IntegerDecompressor, IntegerDecompressorBuilder};
use crate::encoders::ArithmeticEncoder;
use crate::las::utils::i32_quantize;
use crate::models::{ArithmeticModel, ArithmeticModelBuilder};

pub(crate) const LASZIP_GPS_TIME_MULTI: i32 = 500;
pub(crate) const LASZIP_GPS_TIME_MULTI_MINUS: i32 = -10;
pub(crate) const LASZIP_GPS_TIME_MULTI_CODE_FULL: u32 =
    (LASZIP_GPS_TIME_MULTI - LASZIP_GPS_TIME_MULTI_MINUS + 1) as u32;
pub(crate) const LASZIP_GPS_TIME_MULTI_TOTAL: u32 =
    (LASZIP_GPS_TIME_MULTI - LASZIP_GPS_TIME_MULTI_MINUS + 5) as u32;

/// Symbols of the zero diff model
const ZERO_DIFF_DELTA: u32 = 0;
const ZERO_DIFF_NEW_SEQUENCE: u32 = 1;
const ZERO_DIFF_SYMBOLS: u32 = 5;

const NUM_SEQUENCES: usize = 4;

/// Struct to store GpsTime
///
/// As the value (f64 as per LAS spec) needs to be reinterpreted
/// (not simply converted with 'as') to i64 (or u64)
/// during compression / decompression this struct provides a convenient wrapper
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub struct GpsTime {
    pub value: i64,
}

impl GpsTime {
    #[inline]
    pub(crate) fn high(self) -> i32 {
        (self.value >> 32) as i32
    }

    #[inline]
    pub(crate) fn low(self) -> u32 {
        (self.value & 0xFFFF_FFFF) as u32
    }

    #[inline]
    pub(crate) fn from_parts(high: i32, low: u32) -> Self {
        Self {
            value: (i64::from(high) << 32) | i64::from(low),
        }
    }

    /// Difference with `other` if it fits in 32 bits
    #[inline]
    pub(crate) fn delta_from(self, other: GpsTime) -> Option<i32> {
        let diff = self.value.wrapping_sub(other.value);
        if diff == i64::from(diff as i32) {
            Some(diff as i32)
        } else {
            None
        }
    }
}

impl From<f64> for GpsTime {
    fn from(v: f64) -> Self {
        Self {
            value: v.to_bits() as i64,
        }
    }
}

impl From<GpsTime> for f64 {
    fn from(gps: GpsTime) -> Self {
        f64::from_bits(gps.value as u64)
    }
}

/// How a (32 bit) time difference relates to the last difference of its sequence
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Multiplier {
    /// Same difference as last time, by far the most frequent case
    Unit,
    /// Multiplier in (1, MULTI)
    Positive(i32),
    /// Multiplier >= MULTI
    PositiveCapped,
    /// Multiplier in (MULTI_MINUS, 0)
    Negative(i32),
    /// Multiplier <= MULTI_MINUS
    NegativeCapped,
    Zero,
}

impl Multiplier {
    pub(crate) fn from_quantized(multi: i32) -> Self {
        if multi == 1 {
            Multiplier::Unit
        } else if multi > 0 {
            if multi < LASZIP_GPS_TIME_MULTI {
                Multiplier::Positive(multi)
            } else {
                Multiplier::PositiveCapped
            }
        } else if multi < 0 {
            if multi > LASZIP_GPS_TIME_MULTI_MINUS {
                Multiplier::Negative(multi)
            } else {
                Multiplier::NegativeCapped
            }
        } else {
            Multiplier::Zero
        }
    }

    /// The symbol must be lower than MULTI_CODE_FULL
    pub(crate) fn from_symbol(sym: u32) -> Self {
        let sym = sym as i32;
        if sym == 0 {
            Multiplier::Zero
        } else if sym <= LASZIP_GPS_TIME_MULTI {
            Self::from_quantized(sym)
        } else {
            Self::from_quantized(LASZIP_GPS_TIME_MULTI - sym)
        }
    }

    pub(crate) fn symbol(self) -> u32 {
        let sym = match self {
            Multiplier::Unit => 1,
            Multiplier::Positive(m) => m,
            Multiplier::PositiveCapped => LASZIP_GPS_TIME_MULTI,
            Multiplier::Negative(m) => LASZIP_GPS_TIME_MULTI - m,
            Multiplier::NegativeCapped => LASZIP_GPS_TIME_MULTI - LASZIP_GPS_TIME_MULTI_MINUS,
            Multiplier::Zero => 0,
        };
        sym as u32
    }

    /// Context of the integer compressor used for the correction
    pub(crate) fn context(self) -> u32 {
        match self {
            Multiplier::Unit => 1,
            Multiplier::Positive(m) if m < 10 => 2,
            Multiplier::Positive(_) => 3,
            Multiplier::PositiveCapped => 4,
            Multiplier::Negative(_) => 5,
            Multiplier::NegativeCapped => 6,
            Multiplier::Zero => 7,
        }
    }

    pub(crate) fn prediction(self, last_diff: i32) -> i32 {
        match self {
            Multiplier::Unit => last_diff,
            Multiplier::Positive(m) | Multiplier::Negative(m) => m.wrapping_mul(last_diff),
            Multiplier::PositiveCapped => LASZIP_GPS_TIME_MULTI.wrapping_mul(last_diff),
            Multiplier::NegativeCapped => LASZIP_GPS_TIME_MULTI_MINUS.wrapping_mul(last_diff),
            Multiplier::Zero => 0,
        }
    }

    fn is_extreme(self) -> bool {
        matches!(
            self,
            Multiplier::PositiveCapped | Multiplier::NegativeCapped | Multiplier::Zero
        )
    }
}

/// The 4 time sequences tracked by a context
#[derive(Debug, Copy, Clone, Default)]
pub(crate) struct GpsTimeSequences {
    pub(crate) last: usize,
    pub(crate) next: usize,
    pub(crate) last_gps_times: [GpsTime; NUM_SEQUENCES],
    pub(crate) last_gps_diffs: [i32; NUM_SEQUENCES],
    pub(crate) multi_extreme_counters: [i32; NUM_SEQUENCES],
}

impl GpsTimeSequences {
    pub(crate) fn reset(&mut self, first: GpsTime) {
        *self = Self::default();
        self.last_gps_times[0] = first;
    }

    #[inline]
    pub(crate) fn last_time(&self) -> GpsTime {
        self.last_gps_times[self.last]
    }

    #[inline]
    pub(crate) fn last_diff(&self) -> i32 {
        self.last_gps_diffs[self.last]
    }

    /// Offset (1 to 3) of the first other sequence from which `time`
    /// is a 32 bit difference away, with that difference
    pub(crate) fn find_other_sequence(&self, time: GpsTime) -> Option<(usize, i32)> {
        (1..NUM_SEQUENCES).find_map(|offset| {
            let other = (self.last + offset) & 3;
            time.delta_from(self.last_gps_times[other])
                .map(|diff| (offset, diff))
        })
    }

    pub(crate) fn switch_sequence(&mut self, offset: usize) {
        self.last = (self.last + offset) & 3;
    }

    pub(crate) fn start_new_sequence(&mut self, time: GpsTime) {
        self.next = (self.next + 1) & 3;
        self.last = self.next;
        self.last_gps_diffs[self.last] = 0;
        self.multi_extreme_counters[self.last] = 0;
        self.last_gps_times[self.last] = time;
        trace!("gps time {} starts sequence {}", time.value, self.last);
    }

    /// First difference of a sequence whose last difference was 0
    pub(crate) fn set_first_diff(&mut self, diff: i32) {
        self.last_gps_times[self.last].value =
            self.last_gps_times[self.last].value.wrapping_add(i64::from(diff));
        self.last_gps_diffs[self.last] = diff;
        self.multi_extreme_counters[self.last] = 0;
    }

    pub(crate) fn add_diff(&mut self, multiplier: Multiplier, diff: i32) {
        let last = self.last;
        if multiplier == Multiplier::Unit {
            self.multi_extreme_counters[last] = 0;
        } else if multiplier.is_extreme() {
            self.multi_extreme_counters[last] += 1;
            if self.multi_extreme_counters[last] > 3 {
                self.last_gps_diffs[last] = diff;
                self.multi_extreme_counters[last] = 0;
            }
        }
        self.last_gps_times[last].value = self.last_gps_times[last].value.wrapping_add(i64::from(diff));
    }
}

/// Compresses the gps times of one context
#[derive(Debug, Clone)]
pub(crate) struct GpsTimeCompressor {
    multi: ArithmeticModel,
    zero_diff: ArithmeticModel,
    ic_gps_time: IntegerCompressor,
    pub(crate) sequences: GpsTimeSequences,
}

impl GpsTimeCompressor {
    pub(crate) fn new() -> Self {
        Self {
            multi: ArithmeticModelBuilder::new(LASZIP_GPS_TIME_MULTI_TOTAL)
                .compressing()
                .build(),
            zero_diff: ArithmeticModelBuilder::new(ZERO_DIFF_SYMBOLS)
                .compressing()
                .build(),
            ic_gps_time: IntegerCompressorBuilder::new().bits(32).contexts(9).build(),
            sequences: GpsTimeSequences::default(),
        }
    }

    pub(crate) fn reset(&mut self, first: GpsTime) {
        self.multi.reset();
        self.zero_diff.reset();
        self.ic_gps_time.reset();
        self.sequences.reset(first);
    }

    pub(crate) fn compress<W: Write>(
        &mut self,
        encoder: &mut ArithmeticEncoder<W>,
        time: GpsTime,
    ) -> std::io::Result<()> {
        let last_time = self.sequences.last_time();
        if let Some(diff) = time.delta_from(last_time) {
            return self.compress_diff(encoder, diff);
        }

        let zero_diff_regime = self.sequences.last_diff() == 0;
        if let Some((offset, diff)) = self.sequences.find_other_sequence(time) {
            if zero_diff_regime {
                encoder.encode_symbol(&mut self.zero_diff, offset as u32 + 1)?;
            } else {
                encoder.encode_symbol(
                    &mut self.multi,
                    LASZIP_GPS_TIME_MULTI_CODE_FULL + offset as u32,
                )?;
            }
            self.sequences.switch_sequence(offset);
            return self.compress_diff(encoder, diff);
        }

        if zero_diff_regime {
            encoder.encode_symbol(&mut self.zero_diff, ZERO_DIFF_NEW_SEQUENCE)?;
        } else {
            encoder.encode_symbol(&mut self.multi, LASZIP_GPS_TIME_MULTI_CODE_FULL)?;
        }
        self.ic_gps_time
            .compress(encoder, last_time.high(), time.high(), 8)?;
        encoder.write_int(time.low())?;
        self.sequences.start_new_sequence(time);
        Ok(())
    }

    /// Codes a difference with the last time of the current sequence
    fn compress_diff<W: Write>(
        &mut self,
        encoder: &mut ArithmeticEncoder<W>,
        diff: i32,
    ) -> std::io::Result<()> {
        let last_diff = self.sequences.last_diff();
        if last_diff == 0 {
            encoder.encode_symbol(&mut self.zero_diff, ZERO_DIFF_DELTA)?;
            self.ic_gps_time.compress(encoder, 0, diff, 0)?;
            self.sequences.set_first_diff(diff);
        } else {
            let multi = i32_quantize(diff as f32 / last_diff as f32);
            let multiplier = Multiplier::from_quantized(multi);
            encoder.encode_symbol(&mut self.multi, multiplier.symbol())?;
            self.ic_gps_time.compress(
                encoder,
                multiplier.prediction(last_diff),
                diff,
                multiplier.context(),
            )?;
            self.sequences.add_diff(multiplier, diff);
        }
        Ok(())
    }
}
/// Decompresses the gps times of one context
#[derive(Debug, Clone)]
pub(crate) struct GpsTimeDecompressor {
    multi: ArithmeticModel,
    zero_diff: ArithmeticModel,
    ic_gps_time: IntegerDecompressor,
    pub(crate) sequences: GpsTimeSequences,
}

impl GpsTimeDecompressor {
    pub(crate) fn new() -> Self {
        Self {
            multi: ArithmeticModelBuilder::new(LASZIP_GPS_TIME_MULTI_TOTAL).build(),
            zero_diff: ArithmeticModelBuilder::new(ZERO_DIFF_SYMBOLS).build(),
            ic_gps_time: IntegerDecompressorBuilder::new().bits(32).contexts(9).build(),
            sequences: GpsTimeSequences::default(),
        }
    }

    pub(crate) fn reset(&mut self, first: GpsTime) {
        self.multi.reset();
        self.zero_diff.reset();
        self.ic_gps_time.reset();
        self.sequences.reset(first);
    }

    /// Returns the decoded time, which is also the new last time of the current sequence
    pub(crate) fn decompress<R: Read>(
        &mut self,
        decoder: &mut ArithmeticDecoder<R>,
    ) -> std::io::Result<GpsTime> {
        for _ in 0..2 {
            if self.sequences.last_diff() == 0 {
                let sym = decoder.decode_symbol(&mut self.zero_diff)?;
                match sym {
                    ZERO_DIFF_DELTA => {
                        let diff = self.ic_gps_time.decompress(decoder, 0, 0)?;
                        self.sequences.set_first_diff(diff);
                        return Ok(self.sequences.last_time());
                    }
                    ZERO_DIFF_NEW_SEQUENCE => return self.decompress_full(decoder),
                    offset => self.sequences.switch_sequence((offset - 1) as usize),
                }
            } else {
                let sym = decoder.decode_symbol(&mut self.multi)?;
                if sym < LASZIP_GPS_TIME_MULTI_CODE_FULL {
                    let multiplier = Multiplier::from_symbol(sym);
                    let last_diff = self.sequences.last_diff();
                    let diff = self.ic_gps_time.decompress(
                        decoder,
                        multiplier.prediction(last_diff),
                        multiplier.context(),
                    )?;
                    self.sequences.add_diff(multiplier, diff);
                    return Ok(self.sequences.last_time());
                } else if sym == LASZIP_GPS_TIME_MULTI_CODE_FULL {
                    return self.decompress_full(decoder);
                } else {
                    self.sequences
                        .switch_sequence((sym - LASZIP_GPS_TIME_MULTI_CODE_FULL) as usize);
                }
            }
        }
        Err(Error::new(
            ErrorKind::InvalidData,
            "gps time does not belong to any of the tracked sequences",
        ))
    }

    fn decompress_full<R: Read>(&mut self, decoder: &mut ArithmeticDecoder<R>) -> std::io::Result<GpsTime> {
        let high = self
            .ic_gps_time
            .decompress(decoder, self.sequences.last_time().high(), 8)?;
        let low = decoder.read_int()?;
        let time = GpsTime::from_parts(high, low);
        self.sequences.start_new_sequence(time);
        Ok(time)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn multiplier_symbols_partition_the_alphabet() {
        for sym in 0..LASZIP_GPS_TIME_MULTI_CODE_FULL {
            assert_eq!(Multiplier::from_symbol(sym).symbol(), sym);
        }
        assert_eq!(Multiplier::from_quantized(1), Multiplier::Unit);
        assert_eq!(Multiplier::from_quantized(9).context(), 2);
        assert_eq!(Multiplier::from_quantized(10).context(), 3);
        assert_eq!(Multiplier::from_quantized(5000), Multiplier::PositiveCapped);
        assert_eq!(Multiplier::from_quantized(-9).symbol(), 509);
        assert_eq!(Multiplier::from_quantized(-10), Multiplier::NegativeCapped);
        assert_eq!(Multiplier::NegativeCapped.symbol(), 510);
        assert_eq!(LASZIP_GPS_TIME_MULTI_CODE_FULL, 511);
        assert_eq!(LASZIP_GPS_TIME_MULTI_TOTAL, 515);
    }

    #[test]
    fn extreme_multipliers_eventually_replace_the_diff() {
        let mut sequences = GpsTimeSequences::default();
        sequences.reset(GpsTime { value: 0 });
        sequences.set_first_diff(10);
        for _ in 0..3 {
            sequences.add_diff(Multiplier::PositiveCapped, 100_000);
            assert_eq!(sequences.last_diff(), 10);
        }
        sequences.add_diff(Multiplier::PositiveCapped, 100_000);
        assert_eq!(sequences.last_diff(), 100_000);
        assert_eq!(sequences.multi_extreme_counters[0], 0);
    }

    #[test]
    fn new_sequences_rotate_through_the_slots() {
        let mut sequences = GpsTimeSequences::default();
        sequences.reset(GpsTime { value: 5 });
        for i in 1..=5 {
            sequences.start_new_sequence(GpsTime { value: i << 40 });
            assert_eq!(sequences.last, (i & 3) as usize);
        }
        let candidate = GpsTime { value: (4 << 40) + 7 };
        // slot 0 now holds 4 << 40, slot 1 holds 5 << 40 and is the last one
        assert_eq!(sequences.find_other_sequence(candidate), Some((3, 7)));
    }

    #[test]
    fn interleaved_sequences_round_trip() {
        let base = [0i64, 1 << 35, 3 << 40, -(1 << 45)];
        let mut times = Vec::new();
        for i in 0..400i64 {
            let seq = (i % 7 % 4) as usize;
            let jitter = if i % 13 == 0 { 1_000_003 } else { 0 };
            times.push(GpsTime {
                value: base[seq] + i * 2_500 + jitter,
            });
        }

        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        let mut compressor = GpsTimeCompressor::new();
        compressor.reset(times[0]);
        for time in &times[1..] {
            compressor.compress(&mut encoder, *time).unwrap();
        }
        encoder.done().unwrap();

        let mut decoder = ArithmeticDecoder::new(Cursor::new(encoder.into_stream().into_inner()));
        decoder.read_init_bytes().unwrap();
        let mut decompressor = GpsTimeDecompressor::new();
        decompressor.reset(times[0]);
        for time in &times[1..] {
            assert_eq!(decompressor.decompress(&mut decoder).unwrap(), *time);
        }
    }
}
