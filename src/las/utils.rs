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


use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use num_traits::Zero;

use crate::decoders::ArithmeticDecoder;
use crate::encoders::ArithmeticEncoder;

/// Encoder of one layer, its bytes stay in memory until the chunk is done
pub(crate) type LayerEncoder = ArithmeticEncoder<Cursor<Vec<u8>>>;
/// Decoder of one layer, reads from the layer bytes loaded in memory
pub(crate) type LayerDecoder = ArithmeticDecoder<Cursor<Vec<u8>>>;

/// Median of the last 5 values added
#[derive(Debug, Copy, Clone)]
pub struct StreamingMedian<T: Zero + Copy + PartialOrd> {
    values: [T; 5],
    high: bool,
}

impl<T: Zero + Copy + PartialOrd> StreamingMedian<T> {
    pub fn new() -> Self {
        Self {
            values: [T::zero(); 5],
            high: true,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn add(&mut self, v: T) {
        let values = &mut self.values;
        if self.high {
            if v < values[2] {
                values[4] = values[3];
                values[3] = values[2];
                if v < values[0] {
                    values[2] = values[1];
                    values[1] = values[0];
                    values[0] = v;
                } else if v < values[1] {
                    values[2] = values[1];
                    values[1] = v;
                } else {
                    values[2] = v;
                }
            } else {
                if v < values[3] {
                    values[4] = values[3];
                    values[3] = v;
                } else {
                    values[4] = v;
                }
                self.high = false;
            }
        } else if values[2] < v {
            values[0] = values[1];
            values[1] = values[2];
            if values[4] < v {
                values[2] = values[3];
                values[3] = values[4];
                values[4] = v;
            } else if values[3] < v {
                values[2] = values[3];
                values[3] = v;
            } else {
                values[2] = v;
            }
        } else {
            if values[1] < v {
                values[0] = values[1];
                values[1] = v;
            } else {
                values[0] = v;
            }
            self.high = true;
        }
    }

    pub fn get(&self) -> T {
        self.values[2]
    }
}

impl<T: Zero + Copy + PartialOrd> Default for StreamingMedian<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
pub(crate) fn u32_zero_bit(n: u32) -> u32 {
    n & 0xFF_FF_FF_FEu32
}

#[inline]
pub(crate) fn u8_clamp(n: i32) -> u8 {
    num_traits::clamp(n, i32::from(u8::MIN), i32::from(u8::MAX)) as u8
}

#[inline(always)]
pub(crate) fn lower_byte(n: u16) -> u8 {
    (n & 0x00_FF) as u8
}

#[inline(always)]
pub(crate) fn upper_byte(n: u16) -> u8 {
    (n >> 8) as u8
}

#[inline]
pub fn i32_quantize(n: f32) -> i32 {
    if n >= 0.0f32 {
        (n + 0.5f32) as i32
    } else {
        (n - 0.5f32) as i32
    }
}

pub(crate) fn new_layer_encoder() -> LayerEncoder {
    ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()))
}

pub(crate) fn new_layer_decoder() -> LayerDecoder {
    ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new()))
}

/// Drops the bytes of the previous chunk
pub(crate) fn reset_layer_encoder(encoder: &mut LayerEncoder) {
    encoder.reset();
    let stream = encoder.out_stream();
    stream.get_mut().clear();
    stream.set_position(0);
}

pub(crate) fn layer_len_of(encoder: &mut LayerEncoder) -> u32 {
    encoder.out_stream().get_ref().len() as u32
}

#[inline]
pub(crate) fn copy_encoder_content_to<W: Write>(
    encoder: &mut LayerEncoder,
    dst: &mut W,
) -> std::io::Result<()> {
    dst.write_all(encoder.out_stream().get_ref())
}

/// Loads the `num_bytes` of a layer into the decoder if the layer is requested,
/// skips them otherwise.
///
/// Returns whether the layer can be decoded.
pub(crate) fn copy_bytes_into_decoder<R: Read + Seek>(
    is_requested: bool,
    num_bytes: usize,
    decoder: &mut LayerDecoder,
    src: &mut R,
) -> std::io::Result<bool> {
    decoder.reset();
    let stream = decoder.in_stream();
    stream.set_position(0);
    let inner_vec = stream.get_mut();
    if is_requested && num_bytes > 0 {
        inner_vec.resize(num_bytes, 0);
        src.read_exact(&mut inner_vec[..num_bytes])?;
        decoder.read_init_bytes()?;
        Ok(true)
    } else {
        inner_vec.clear();
        if num_bytes > 0 {
            src.seek(SeekFrom::Current(num_bytes as i64))?;
        }
        Ok(false)
    }
}

// Maps (number of returns, return number) to 6 contexts ("m").
// The incorrect combinations (r > n, or n or r being 0) are also mapped,
// as files sometimes number returns from 0 or swap r and n.
pub const NUMBER_RETURN_MAP_6CTX: [[u8; 16]; 16] = [
    [0, 1, 2, 3, 4, 5, 3, 4, 4, 5, 5, 5, 5, 5, 5, 5],
    [1, 0, 1, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3],
    [2, 1, 2, 4, 4, 4, 4, 4, 4, 4, 4, 3, 3, 3, 3, 3],
    [3, 3, 4, 5, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4],
    [4, 3, 4, 4, 5, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4],
    [5, 3, 4, 4, 4, 5, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4],
    [3, 3, 4, 4, 4, 4, 5, 4, 4, 4, 4, 4, 4, 4, 4, 4],
    [4, 3, 4, 4, 4, 4, 4, 5, 4, 4, 4, 4, 4, 4, 4, 4],
    [4, 3, 4, 4, 4, 4, 4, 4, 5, 4, 4, 4, 4, 4, 4, 4],
    [5, 3, 4, 4, 4, 4, 4, 4, 4, 5, 4, 4, 4, 4, 4, 4],
    [5, 3, 4, 4, 4, 4, 4, 4, 4, 4, 5, 4, 4, 4, 4, 4],
    [5, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 4, 4, 4],
    [5, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5, 4, 4],
    [5, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5, 4],
    [5, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5],
    [5, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5],
];

// Level of penetration (n - r) of a return, stopped at 7 ("l").
// The incorrect combinations are mapped to other levels as well.
pub const NUMBER_RETURN_LEVEL_8CT: [[u8; 16]; 16] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7, 7, 7, 7, 7],
    [1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7, 7, 7, 7],
    [2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7, 7, 7],
    [3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7, 7],
    [4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7],
    [5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7],
    [6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7],
    [7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7],
    [7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7],
    [7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6],
    [7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5],
    [7, 7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4],
    [7, 7, 7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3],
    [7, 7, 7, 7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2],
    [7, 7, 7, 7, 7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1],
    [7, 7, 7, 7, 7, 7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0],
];
