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
    Only the layered (version 3) coding of the RGB14 item is kept
===============================================================================
*/

//! Module with the definition of a RGB struct and implementations of
//! the layered Compressor and Decompressor

use crate::packers::Packable;

/// Struct representing a RGB component of a point, in compliance with
/// the LAS spec
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub struct RGB {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
}

impl RGB {
    pub const SIZE: usize = 6;
}

#[inline]
fn byte_differs(a: u16, b: u16, mask: u16) -> bool {
    (a & mask) != (b & mask)
}

/// The "bytes used" symbol: which of the 6 bytes changed since the last color,
/// and (bit 6) whether green or blue differ from red.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct ColorDiff(u8);

impl ColorDiff {
    pub(crate) fn from_points(current: &RGB, last: &RGB) -> Self {
        let v = (byte_differs(last.red, current.red, 0x00FF) as u8)
            | (byte_differs(last.red, current.red, 0xFF00) as u8) << 1
            | (byte_differs(last.green, current.green, 0x00FF) as u8) << 2
            | (byte_differs(last.green, current.green, 0xFF00) as u8) << 3
            | (byte_differs(last.blue, current.blue, 0x00FF) as u8) << 4
            | (byte_differs(last.blue, current.blue, 0xFF00) as u8) << 5
            | ((byte_differs(current.red, current.green, 0x00FF)
                || byte_differs(current.red, current.blue, 0x00FF)
                || byte_differs(current.red, current.green, 0xFF00)
                || byte_differs(current.red, current.blue, 0xFF00)) as u8)
                << 6;
        Self(v)
    }

    fn lower_red_byte_changed(self) -> bool {
        self.0 & (1 << 0) != 0
    }

    fn upper_red_byte_changed(self) -> bool {
        self.0 & (1 << 1) != 0
    }

    fn lower_green_byte_changed(self) -> bool {
        self.0 & (1 << 2) != 0
    }

    fn upper_green_byte_changed(self) -> bool {
        self.0 & (1 << 3) != 0
    }

    fn lower_blue_byte_changed(self) -> bool {
        self.0 & (1 << 4) != 0
    }

    fn upper_blue_byte_changed(self) -> bool {
        self.0 & (1 << 5) != 0
    }

    fn green_or_blue_differ_from_red(self) -> bool {
        self.0 & (1 << 6) != 0
    }
}

impl Packable for RGB {
    type Type = RGB;

    fn unpack_from(input: &[u8]) -> Self::Type {
        Self {
            red: u16::unpack_from(&input[0..2]),
            green: u16::unpack_from(&input[2..4]),
            blue: u16::unpack_from(&input[4..6]),
        }
    }

    fn pack_into(&self, output: &mut [u8]) {
        self.red.pack_into(&mut output[0..2]);
        self.green.pack_into(&mut output[2..4]);
        self.blue.pack_into(&mut output[4..6]);
    }
}

pub mod v3 {
    //! Contains the implementation for the Version 3 of the RGB Compression / Decompression
    //!
    //! Each byte of the color is coded separately, the red bytes as differences with
    //! the last color, green and blue as corrections of a prediction made from the
    //! red (and green) differences.
    //!
    //! A V3 decompressor / compressor owns 4 contexts, the one in use is chosen
    //! by the point14 codec.
    use std::io::{Read, Seek, Write};

    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
    use log::debug;

    use crate::decoders::ArithmeticDecoder;
    use crate::encoders::ArithmeticEncoder;
    use crate::errors::{LasZipError, Layer};
    use crate::las::selective::DecompressionSelection;
    use crate::las::utils::{
        copy_bytes_into_decoder, copy_encoder_content_to, layer_len_of, lower_byte,
        new_layer_decoder, new_layer_encoder, reset_layer_encoder, u8_clamp, upper_byte,
        LayerDecoder, LayerEncoder,
    };
    use crate::models::{ArithmeticModel, ArithmeticModelBuilder};
    use crate::packers::Packable;
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};

    use super::{ColorDiff, RGB};

    #[derive(Debug, Clone)]
    pub(crate) struct RGBModels {
        byte_used: ArithmeticModel,
        lower_red_byte: ArithmeticModel,
        upper_red_byte: ArithmeticModel,
        lower_green_byte: ArithmeticModel,
        upper_green_byte: ArithmeticModel,
        lower_blue_byte: ArithmeticModel,
        upper_blue_byte: ArithmeticModel,
    }

    impl RGBModels {
        pub(crate) fn new(compress: bool) -> Self {
            let model = |symbols: u32| {
                let builder = ArithmeticModelBuilder::new(symbols);
                if compress {
                    builder.compressing().build()
                } else {
                    builder.build()
                }
            };
            Self {
                byte_used: model(128),
                lower_red_byte: model(256),
                upper_red_byte: model(256),
                lower_green_byte: model(256),
                upper_green_byte: model(256),
                lower_blue_byte: model(256),
                upper_blue_byte: model(256),
            }
        }

        pub(crate) fn reset(&mut self) {
            self.byte_used.reset();
            self.lower_red_byte.reset();
            self.upper_red_byte.reset();
            self.lower_green_byte.reset();
            self.upper_green_byte.reset();
            self.lower_blue_byte.reset();
            self.upper_blue_byte.reset();
        }
    }

    /// Returns whether the color differs from the last one
    pub(crate) fn compress_rgb_using<W: Write>(
        encoder: &mut ArithmeticEncoder<W>,
        models: &mut RGBModels,
        current_rgb: &RGB,
        last_rgb: &RGB,
    ) -> std::io::Result<bool> {
        let mut diff_l = 0i32;
        let mut diff_h = 0i32;
        let mut corr;

        let color_diff = ColorDiff::from_points(current_rgb, last_rgb);
        encoder.encode_symbol(&mut models.byte_used, u32::from(color_diff.0))?;

        if color_diff.lower_red_byte_changed() {
            diff_l = i32::from(lower_byte(current_rgb.red)) - i32::from(lower_byte(last_rgb.red));
            encoder.encode_symbol(&mut models.lower_red_byte, u32::from(diff_l as u8))?;
        }

        if color_diff.upper_red_byte_changed() {
            diff_h = i32::from(upper_byte(current_rgb.red)) - i32::from(upper_byte(last_rgb.red));
            encoder.encode_symbol(&mut models.upper_red_byte, u32::from(diff_h as u8))?;
        }

        if color_diff.green_or_blue_differ_from_red() {
            if color_diff.lower_green_byte_changed() {
                corr = i32::from(lower_byte(current_rgb.green))
                    - i32::from(u8_clamp(diff_l + i32::from(lower_byte(last_rgb.green))));
                encoder.encode_symbol(&mut models.lower_green_byte, u32::from(corr as u8))?;
            }

            if color_diff.lower_blue_byte_changed() {
                diff_l = (diff_l + i32::from(lower_byte(current_rgb.green))
                    - i32::from(lower_byte(last_rgb.green)))
                    / 2;
                corr = i32::from(lower_byte(current_rgb.blue))
                    - i32::from(u8_clamp(diff_l + i32::from(lower_byte(last_rgb.blue))));
                encoder.encode_symbol(&mut models.lower_blue_byte, u32::from(corr as u8))?;
            }

            if color_diff.upper_green_byte_changed() {
                corr = i32::from(upper_byte(current_rgb.green))
                    - i32::from(u8_clamp(diff_h + i32::from(upper_byte(last_rgb.green))));
                encoder.encode_symbol(&mut models.upper_green_byte, u32::from(corr as u8))?;
            }

            if color_diff.upper_blue_byte_changed() {
                diff_h = (diff_h + i32::from(upper_byte(current_rgb.green))
                    - i32::from(upper_byte(last_rgb.green)))
                    / 2;
                corr = i32::from(upper_byte(current_rgb.blue))
                    - i32::from(u8_clamp(diff_h + i32::from(upper_byte(last_rgb.blue))));
                encoder.encode_symbol(&mut models.upper_blue_byte, u32::from(corr as u8))?;
            }
        }
        Ok(color_diff.0 != 0)
    }

    pub(crate) fn decompress_rgb_using<R: Read>(
        decoder: &mut ArithmeticDecoder<R>,
        models: &mut RGBModels,
        last: &RGB,
    ) -> std::io::Result<RGB> {
        let color_diff = ColorDiff(decoder.decode_symbol(&mut models.byte_used)? as u8);

        let mut this_val = RGB::default();
        let mut corr;
        let mut diff;

        if color_diff.lower_red_byte_changed() {
            corr = decoder.decode_symbol(&mut models.lower_red_byte)? as u8;
            this_val.red = u16::from(corr.wrapping_add(lower_byte(last.red)));
        } else {
            this_val.red = last.red & 0x00FF;
        }

        if color_diff.upper_red_byte_changed() {
            corr = decoder.decode_symbol(&mut models.upper_red_byte)? as u8;
            this_val.red |= u16::from(corr.wrapping_add(upper_byte(last.red))) << 8;
        } else {
            this_val.red |= last.red & 0xFF00;
        }

        if color_diff.green_or_blue_differ_from_red() {
            diff = i32::from(lower_byte(this_val.red)) - i32::from(lower_byte(last.red));

            if color_diff.lower_green_byte_changed() {
                corr = decoder.decode_symbol(&mut models.lower_green_byte)? as u8;
                this_val.green = u16::from(
                    corr.wrapping_add(u8_clamp(diff + i32::from(lower_byte(last.green)))),
                );
            } else {
                this_val.green = last.green & 0x00FF;
            }

            if color_diff.lower_blue_byte_changed() {
                corr = decoder.decode_symbol(&mut models.lower_blue_byte)? as u8;
                diff = (diff + i32::from(lower_byte(this_val.green))
                    - i32::from(lower_byte(last.green)))
                    / 2;
                this_val.blue = u16::from(
                    corr.wrapping_add(u8_clamp(diff + i32::from(lower_byte(last.blue)))),
                );
            } else {
                this_val.blue = last.blue & 0x00FF;
            }

            diff = i32::from(upper_byte(this_val.red)) - i32::from(upper_byte(last.red));
            if color_diff.upper_green_byte_changed() {
                corr = decoder.decode_symbol(&mut models.upper_green_byte)? as u8;
                this_val.green |= u16::from(
                    corr.wrapping_add(u8_clamp(diff + i32::from(upper_byte(last.green)))),
                ) << 8;
            } else {
                this_val.green |= last.green & 0xFF00;
            }

            if color_diff.upper_blue_byte_changed() {
                corr = decoder.decode_symbol(&mut models.upper_blue_byte)? as u8;
                diff = (diff + i32::from(upper_byte(this_val.green))
                    - i32::from(upper_byte(last.green)))
                    / 2;
                this_val.blue |= u16::from(
                    corr.wrapping_add(u8_clamp(diff + i32::from(upper_byte(last.blue)))),
                ) << 8;
            } else {
                this_val.blue |= last.blue & 0xFF00;
            }
        } else {
            this_val.green = this_val.red;
            this_val.blue = this_val.red;
        }
        Ok(this_val)
    }

    struct RGBContext {
        unused: bool,
        last: RGB,
        models: RGBModels,
    }

    impl RGBContext {
        fn new(compress: bool) -> Self {
            Self {
                unused: true,
                last: RGB::default(),
                models: RGBModels::new(compress),
            }
        }

        fn init_from(&mut self, rgb: &RGB) {
            self.unused = false;
            self.last = *rgb;
            self.models.reset();
        }

        fn bank(compress: bool) -> [Self; 4] {
            [
                Self::new(compress),
                Self::new(compress),
                Self::new(compress),
                Self::new(compress),
            ]
        }
    }

    /// Makes `context` the current one, an unused context is initialized with
    /// the last color of the current context.
    fn switch_to(contexts: &mut [RGBContext; 4], current: &mut usize, context: usize) {
        if *current != context {
            if contexts[context].unused {
                let seed = contexts[*current].last;
                debug!("Initializing RGB context {} from context {}", context, *current);
                contexts[context].init_from(&seed);
            }
            *current = context;
        }
    }

    pub struct LasRGBCompressor {
        encoder: LayerEncoder,
        changed_rgb: bool,
        current_context: usize,
        contexts: [RGBContext; 4],
    }

    impl Default for LasRGBCompressor {
        fn default() -> Self {
            Self {
                encoder: new_layer_encoder(),
                changed_rgb: false,
                current_context: 0,
                contexts: RGBContext::bank(true),
            }
        }
    }

    impl LasRGBCompressor {
        pub fn init_with_first_point(&mut self, first: &RGB, context: usize) {
            reset_layer_encoder(&mut self.encoder);
            self.changed_rgb = false;
            for rgb_context in &mut self.contexts {
                rgb_context.unused = true;
            }
            self.current_context = context;
            self.contexts[context].init_from(first);
        }

        /// Compresses the color of a point coded with the given (point14) context
        pub fn compress_rgb(&mut self, rgb: &RGB, context: usize) -> std::io::Result<()> {
            switch_to(&mut self.contexts, &mut self.current_context, context);
            let the_context = &mut self.contexts[self.current_context];
            self.changed_rgb |=
                compress_rgb_using(&mut self.encoder, &mut the_context.models, rgb, &the_context.last)?;
            the_context.last = *rgb;
            Ok(())
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for LasRGBCompressor {
        fn size_of_field(&self) -> usize {
            RGB::SIZE
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first_point: &[u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            dst.write_all(&first_point[..RGB::SIZE])?;
            self.init_with_first_point(&RGB::unpack_from(first_point), *context);
            Ok(())
        }

        fn compress_field_with(&mut self, buf: &[u8], context: &mut usize) -> crate::Result<()> {
            self.compress_rgb(&RGB::unpack_from(buf), *context)?;
            Ok(())
        }

        fn write_layers_sizes(&mut self, dst: &mut W) -> crate::Result<()> {
            let size = if self.changed_rgb {
                self.encoder.done()?;
                layer_len_of(&mut self.encoder)
            } else {
                0
            };
            debug!("RGB layer size: {}", size);
            dst.write_u32::<LittleEndian>(size)?;
            Ok(())
        }

        fn write_layers(&mut self, dst: &mut W) -> crate::Result<()> {
            if self.changed_rgb {
                copy_encoder_content_to(&mut self.encoder, dst)?;
            }
            Ok(())
        }
    }

    pub struct LasRGBDecompressor {
        decoder: LayerDecoder,
        decodable: bool,
        requested: bool,
        layer_size: u32,
        point_index: u64,
        current_context: usize,
        contexts: [RGBContext; 4],
    }

    impl Default for LasRGBDecompressor {
        fn default() -> Self {
            Self {
                decoder: new_layer_decoder(),
                decodable: false,
                requested: true,
                layer_size: 0,
                point_index: 0,
                current_context: 0,
                contexts: RGBContext::bank(false),
            }
        }
    }

    impl LasRGBDecompressor {
        pub fn init_with_first_point(&mut self, first: &RGB, context: usize) {
            for rgb_context in &mut self.contexts {
                rgb_context.unused = true;
            }
            self.point_index = 0;
            self.current_context = context;
            self.contexts[context].init_from(first);
        }

        /// Decompresses the color of a point decoded with the given (point14) context.
        ///
        /// When the layer is skipped or unchanged the last color is repeated.
        pub fn decompress_rgb(&mut self, context: usize) -> crate::Result<RGB> {
            self.point_index += 1;
            switch_to(&mut self.contexts, &mut self.current_context, context);
            let the_context = &mut self.contexts[self.current_context];
            if self.decodable {
                let point_index = self.point_index;
                let rgb =
                    decompress_rgb_using(&mut self.decoder, &mut the_context.models, &the_context.last)
                        .map_err(|e| LasZipError::corrupt(Layer::Rgb, point_index, e))?;
                the_context.last = rgb;
            }
            Ok(the_context.last)
        }
    }

    impl<R: Read + Seek> LayeredFieldDecompressor<R> for LasRGBDecompressor {
        fn size_of_field(&self) -> usize {
            RGB::SIZE
        }

        fn set_selection(&mut self, selection: DecompressionSelection) {
            self.requested = selection.should_decompress_rgb();
        }

        fn init_first_point(
            &mut self,
            src: &mut R,
            first_point: &mut [u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            src.read_exact(&mut first_point[..RGB::SIZE])?;
            self.init_with_first_point(&RGB::unpack_from(first_point), *context);
            Ok(())
        }

        fn decompress_field_with(
            &mut self,
            current_point: &mut [u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            self.decompress_rgb(*context)?.pack_into(current_point);
            Ok(())
        }

        fn read_layers_sizes(&mut self, src: &mut R) -> crate::Result<()> {
            self.layer_size = src
                .read_u32::<LittleEndian>()
                .map_err(|e| LasZipError::corrupt(Layer::ChunkHeader, 0, e))?;
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> crate::Result<()> {
            self.decodable = copy_bytes_into_decoder(
                self.requested,
                self.layer_size as usize,
                &mut self.decoder,
                src,
            )
            .map_err(|e| LasZipError::corrupt(Layer::Rgb, 0, e))?;
            if !self.requested && self.layer_size > 0 {
                debug!("Skipping the RGB layer ({} bytes)", self.layer_size);
            }
            Ok(())
        }
    }

}

#[cfg(test)]
mod test {
    use super::*;

    fn rgb(red: u16, green: u16, blue: u16) -> RGB {
        RGB { red, green, blue }
    }

    #[test]
    fn each_byte_has_its_bit() {
        let zero = RGB::default();
        let cases = [
            (rgb(1, 0, 0), 0b0000_0001),
            (rgb(256, 0, 0), 0b0000_0010),
            (rgb(0, 1, 0), 0b0000_0100),
            (rgb(0, 256, 0), 0b0000_1000),
            (rgb(0, 0, 1), 0b0001_0000),
            (rgb(0, 0, 256), 0b0010_0000),
        ];
        for (color, bits) in &cases {
            assert_eq!(ColorDiff::from_points(&zero, color).0, *bits);
            // the color itself has green or blue different from red
            assert_eq!(ColorDiff::from_points(color, &zero).0, *bits | 0b0100_0000);
        }
    }

    #[test]
    fn gray_colors_do_not_set_the_green_blue_bit() {
        let gray = rgb(0x1234, 0x1234, 0x1234);
        assert_eq!(ColorDiff::from_points(&gray, &RGB::default()).0, 0b0011_1111);
        assert_eq!(ColorDiff::from_points(&gray, &gray).0, 0);
    }
}
