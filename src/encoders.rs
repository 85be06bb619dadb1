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

// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
//                                                                           -
//                       ****************************                        -
//                        ARITHMETIC CODING EXAMPLES                         -
//                       ****************************                        -
//                                                                           -
// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
//                                                                           -
// Fast arithmetic coding implementation                                     -
// -> 32-bit variables, 32-bit product, periodic updates, table decoding     -
//                                                                           -
// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
//                                                                           -
// Version 1.00  -  April 25, 2004                                           -
//                                                                           -
// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
//                                                                           -
//                                  WARNING                                  -
//                                 =========                                 -
//                                                                           -
// The only purpose of this program is to demonstrate the basic principles   -
// of arithmetic coding. The original version of this code can be found in   -
// Digital Signal Compression: Principles and Practice                       -
// (Cambridge University Press, 2011, ISBN: 9780511984655)                   -
//                                                                           -
// Copyright (c) 2019 by Amir Said (said@ieee.org) &                         -
//                       William A. Pearlman (pearlw@ecse.rpi.edu)           -
//                                                                           -
// Redistribution and use in source and binary forms, with or without        -
// modification, are permitted provided that the following conditions are    -
// met:                                                                      -
//                                                                           -
// 1. Redistributions of source code must retain the above copyright notice, -
// this list of conditions and the following disclaimer.                     -
//                                                                           -
// 2. Redistributions in binary form must reproduce the above copyright      -
// notice, this list of conditions and the following disclaimer in the       -
// documentation and/or other materials provided with the distribution.      -
//                                                                           -
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS       -
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED -
// TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A           -
// PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER -
// OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL,  -
// EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO,       -
// PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR        -
// PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF    -
// LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING      -
// NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS        -
// SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.              -
//                                                                           -
// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
//                                                                           -
// A description of the arithmetic coding method used here is available in   -
//                                                                           -
// Lossless Compression Handbook, ed. K. Sayood                              -
// Chapter 5: Arithmetic Coding (A. Said), pp. 101-152, Academic Press, 2003 -
//                                                                           -
// A. Said, Introduction to Arithetic Coding Theory and Practice             -
// HP Labs report HPL-2004-76  -  http://www.hpl.hp.com/techreports/         -
//                                                                           -

use std::io::Write;

use crate::models::{ArithmeticBitModel, ArithmeticModel, BM_LENGTH_SHIFT, DM_LENGTH_SHIFT};

pub(crate) const AC_MIN_LENGTH: u32 = 0x0100_0000; // threshold for renormalization
pub(crate) const AC_MAX_LENGTH: u32 = 0xFFFF_FFFF; // maximum AC interval length

const AC_BUFFER_SIZE: usize = 1024;

/// Arithmetic encoder writing to `out_stream`.
///
/// Output bytes go through a circular buffer made of two halves so that a
/// carry can still be propagated into bytes not yet flushed.
/// [`done`](ArithmeticEncoder::done) must be called to flush the last bytes.
pub struct ArithmeticEncoder<T: Write> {
    out_buffer: Box<[u8]>,
    out_byte: usize,
    end_byte: usize,

    base: u32,
    length: u32,

    out_stream: T,
}

impl<T: Write> ArithmeticEncoder<T> {
    pub fn new(out_stream: T) -> Self {
        Self {
            out_buffer: vec![0u8; 2 * AC_BUFFER_SIZE].into_boxed_slice(),
            out_byte: 0,
            end_byte: 2 * AC_BUFFER_SIZE,
            base: 0,
            length: AC_MAX_LENGTH,
            out_stream,
        }
    }

    /// Forgets everything encoded so far, the output stream is left as is.
    pub fn reset(&mut self) {
        self.base = 0;
        self.length = AC_MAX_LENGTH;
        self.out_byte = 0;
        self.end_byte = 2 * AC_BUFFER_SIZE;
    }

    pub fn done(&mut self) -> std::io::Result<()> {
        let init_base = self.base;
        let another_byte = if self.length > 2 * AC_MIN_LENGTH {
            self.base = self.base.wrapping_add(AC_MIN_LENGTH);
            self.length = AC_MIN_LENGTH >> 1;
            true
        } else {
            self.base = self.base.wrapping_add(AC_MIN_LENGTH >> 1);
            self.length = AC_MIN_LENGTH >> 9;
            false
        };

        if init_base > self.base {
            self.propagate_carry();
        }
        self.renorm_enc_interval()?;

        if self.end_byte != 2 * AC_BUFFER_SIZE {
            debug_assert!(self.out_byte < AC_BUFFER_SIZE);
            self.out_stream
                .write_all(&self.out_buffer[AC_BUFFER_SIZE..2 * AC_BUFFER_SIZE])?;
        }
        if self.out_byte > 0 {
            self.out_stream.write_all(&self.out_buffer[..self.out_byte])?;
        }

        // two or three zero bytes keep the decoder's reads inside the data
        self.out_stream.write_all(&[0u8, 0u8])?;
        if another_byte {
            self.out_stream.write_all(&[0u8])?;
        }
        self.reset();
        Ok(())
    }

    pub fn encode_bit(&mut self, model: &mut ArithmeticBitModel, sym: u32) -> std::io::Result<()> {
        debug_assert!(sym <= 1);
        let x = model.bit_0_prob * (self.length >> BM_LENGTH_SHIFT);
        if sym == 0 {
            self.length = x;
            model.bit_0_count += 1;
        } else {
            let init_base = self.base;
            self.base = self.base.wrapping_add(x);
            self.length -= x;
            if init_base > self.base {
                self.propagate_carry();
            }
        }

        if self.length < AC_MIN_LENGTH {
            self.renorm_enc_interval()?;
        }
        model.bits_until_update -= 1;
        if model.bits_until_update == 0 {
            model.update();
        }
        Ok(())
    }

    pub fn encode_symbol(&mut self, model: &mut ArithmeticModel, sym: u32) -> std::io::Result<()> {
        debug_assert!(sym <= model.last_symbol);
        let init_base = self.base;
        let s = sym as usize;

        if sym == model.last_symbol {
            let x = model.distribution[s] * (self.length >> DM_LENGTH_SHIFT);
            self.base = self.base.wrapping_add(x);
            self.length -= x;
        } else {
            self.length >>= DM_LENGTH_SHIFT;
            let x = model.distribution[s] * self.length;
            self.base = self.base.wrapping_add(x);
            self.length = model.distribution[s + 1] * self.length - x;
        }

        if init_base > self.base {
            self.propagate_carry();
        }
        if self.length < AC_MIN_LENGTH {
            self.renorm_enc_interval()?;
        }

        model.symbol_count[s] += 1;
        model.symbols_until_update -= 1;
        if model.symbols_until_update == 0 {
            model.update();
        }
        Ok(())
    }

    pub fn write_bits(&mut self, mut bits: u32, mut sym: u32) -> std::io::Result<()> {
        debug_assert!(bits > 0 && bits <= 32);
        if bits > 19 {
            self.write_short((sym & u32::from(u16::MAX)) as u16)?;
            sym >>= 16;
            bits -= 16;
        }
        debug_assert!(sym < (1u32 << bits));
        self.encode_uniform(bits, sym)
    }

    pub fn write_short(&mut self, sym: u16) -> std::io::Result<()> {
        self.encode_uniform(16, u32::from(sym))
    }

    /// Writes the 32 bits of `sym`, low half first
    pub fn write_int(&mut self, sym: u32) -> std::io::Result<()> {
        self.write_short((sym & 0xFFFF) as u16)?;
        self.write_short((sym >> 16) as u16)
    }

    pub fn out_stream(&mut self) -> &mut T {
        &mut self.out_stream
    }

    pub fn into_stream(self) -> T {
        self.out_stream
    }

    fn encode_uniform(&mut self, bits: u32, sym: u32) -> std::io::Result<()> {
        let init_base = self.base;
        self.length >>= bits;
        self.base = self.base.wrapping_add(sym * self.length);
        if init_base > self.base {
            self.propagate_carry();
        }
        if self.length < AC_MIN_LENGTH {
            self.renorm_enc_interval()?;
        }
        Ok(())
    }

    fn propagate_carry(&mut self) {
        let last = self.out_buffer.len() - 1;
        let mut p = if self.out_byte == 0 {
            last
        } else {
            self.out_byte - 1
        };
        while self.out_buffer[p] == 0xFF {
            self.out_buffer[p] = 0;
            p = if p == 0 { last } else { p - 1 };
        }
        self.out_buffer[p] += 1;
    }

    fn renorm_enc_interval(&mut self) -> std::io::Result<()> {
        loop {
            self.out_buffer[self.out_byte] = (self.base >> 24) as u8;
            self.out_byte += 1;
            if self.out_byte == self.end_byte {
                self.manage_out_buffer()?;
            }
            self.base <<= 8;
            self.length <<= 8;
            if self.length >= AC_MIN_LENGTH {
                break;
            }
        }
        Ok(())
    }

    fn manage_out_buffer(&mut self) -> std::io::Result<()> {
        if self.out_byte == self.out_buffer.len() {
            self.out_byte = 0;
        }
        self.out_stream
            .write_all(&self.out_buffer[self.out_byte..self.out_byte + AC_BUFFER_SIZE])?;
        self.end_byte = self.out_byte + AC_BUFFER_SIZE;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::decoders::ArithmeticDecoder;
    use crate::models::ArithmeticModelBuilder;

    #[test]
    fn symbols_bits_and_raw_values_are_decoded_back() {
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        let mut model = ArithmeticModelBuilder::new(256).compressing().build();
        let mut bit_model = ArithmeticBitModel::new();

        for i in 0..5_000u32 {
            encoder.encode_symbol(&mut model, (i * 7) % 256).unwrap();
            encoder.encode_bit(&mut bit_model, i % 3 / 2).unwrap();
            encoder.write_bits(23, (i * 4099) & 0x7F_FFFF).unwrap();
            encoder.write_int(i.wrapping_mul(0x9E37_79B9)).unwrap();
        }
        encoder.done().unwrap();

        let data = encoder.into_stream().into_inner();
        let mut decoder = ArithmeticDecoder::new(Cursor::new(data));
        decoder.read_init_bytes().unwrap();
        let mut model = ArithmeticModelBuilder::new(256).build();
        let mut bit_model = ArithmeticBitModel::new();
        for i in 0..5_000u32 {
            assert_eq!(decoder.decode_symbol(&mut model).unwrap(), (i * 7) % 256);
            assert_eq!(decoder.decode_bit(&mut bit_model).unwrap(), i % 3 / 2);
            assert_eq!(decoder.read_bits(23).unwrap(), (i * 4099) & 0x7F_FFFF);
            assert_eq!(decoder.read_int().unwrap(), i.wrapping_mul(0x9E37_79B9));
        }
    }

    #[test]
    fn done_pads_an_empty_stream() {
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        encoder.done().unwrap();
        let data = encoder.into_stream().into_inner();
        // renormalization byte plus the padding
        assert_eq!(data.len(), 4);
    }
}
