//! Colors with near infrared (LAS point formats 8 and 10)

use crate::las::nir::Nir;
use crate::las::rgb::RGB;
use crate::packers::Packable;

#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub struct RGBNIR {
    pub rgb: RGB,
    pub nir: Nir,
}

impl RGBNIR {
    pub const SIZE: usize = RGB::SIZE + Nir::SIZE;
}

impl Packable for RGBNIR {
    type Type = RGBNIR;

    fn unpack_from(input: &[u8]) -> Self::Type {
        Self {
            rgb: RGB::unpack_from(&input[..RGB::SIZE]),
            nir: Nir::unpack_from(&input[RGB::SIZE..Self::SIZE]),
        }
    }

    fn pack_into(&self, output: &mut [u8]) {
        self.rgb.pack_into(&mut output[..RGB::SIZE]);
        self.nir.pack_into(&mut output[RGB::SIZE..Self::SIZE]);
    }
}

pub mod v3 {
    //! The RGB and the NIR are coded in two layers, with the models of both
    //! in the same context.
    use std::io::{Read, Seek, Write};

    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
    use log::debug;

    use crate::errors::{LasZipError, Layer};
    use crate::las::nir::v3::{compress_nir_using, decompress_nir_using, NirModels};
    use crate::las::nir::Nir;
    use crate::las::rgb::v3::{compress_rgb_using, decompress_rgb_using, RGBModels};
    use crate::las::selective::DecompressionSelection;
    use crate::las::utils::{
        copy_bytes_into_decoder, copy_encoder_content_to, layer_len_of, new_layer_decoder,
        new_layer_encoder, reset_layer_encoder, LayerDecoder, LayerEncoder,
    };
    use crate::packers::Packable;
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};

    use super::RGBNIR;

    struct RGBNIRContext {
        unused: bool,
        last: RGBNIR,
        rgb_models: RGBModels,
        nir_models: NirModels,
    }

    impl RGBNIRContext {
        fn new(compress: bool) -> Self {
            Self {
                unused: true,
                last: RGBNIR::default(),
                rgb_models: RGBModels::new(compress),
                nir_models: NirModels::new(compress),
            }
        }

        fn init_from(&mut self, value: &RGBNIR) {
            self.unused = false;
            self.last = *value;
            self.rgb_models.reset();
            self.nir_models.reset();
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

    fn switch_to(contexts: &mut [RGBNIRContext; 4], current: &mut usize, context: usize) {
        if *current != context {
            if contexts[context].unused {
                let seed = contexts[*current].last;
                debug!("Initializing RGBNIR context {} from context {}", context, *current);
                contexts[context].init_from(&seed);
            }
            *current = context;
        }
    }

    pub struct LasRGBNIRCompressor {
        rgb_encoder: LayerEncoder,
        nir_encoder: LayerEncoder,
        changed_rgb: bool,
        changed_nir: bool,
        current_context: usize,
        contexts: [RGBNIRContext; 4],
    }

    impl Default for LasRGBNIRCompressor {
        fn default() -> Self {
            Self {
                rgb_encoder: new_layer_encoder(),
                nir_encoder: new_layer_encoder(),
                changed_rgb: false,
                changed_nir: false,
                current_context: 0,
                contexts: RGBNIRContext::bank(true),
            }
        }
    }

    impl LasRGBNIRCompressor {
        pub fn init_with_first_point(&mut self, first: &RGBNIR, context: usize) {
            reset_layer_encoder(&mut self.rgb_encoder);
            reset_layer_encoder(&mut self.nir_encoder);
            self.changed_rgb = false;
            self.changed_nir = false;
            for the_context in &mut self.contexts {
                the_context.unused = true;
            }
            self.current_context = context;
            self.contexts[context].init_from(first);
        }

        pub fn compress_rgbnir(&mut self, value: &RGBNIR, context: usize) -> std::io::Result<()> {
            switch_to(&mut self.contexts, &mut self.current_context, context);
            let the_context = &mut self.contexts[self.current_context];
            self.changed_rgb |= compress_rgb_using(
                &mut self.rgb_encoder,
                &mut the_context.rgb_models,
                &value.rgb,
                &the_context.last.rgb,
            )?;
            self.changed_nir |= compress_nir_using(
                &mut self.nir_encoder,
                &mut the_context.nir_models,
                value.nir.0,
                the_context.last.nir.0,
            )?;
            the_context.last = *value;
            Ok(())
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for LasRGBNIRCompressor {
        fn size_of_field(&self) -> usize {
            RGBNIR::SIZE
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first_point: &[u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            dst.write_all(&first_point[..RGBNIR::SIZE])?;
            self.init_with_first_point(&RGBNIR::unpack_from(first_point), *context);
            Ok(())
        }

        fn compress_field_with(&mut self, buf: &[u8], context: &mut usize) -> crate::Result<()> {
            self.compress_rgbnir(&RGBNIR::unpack_from(buf), *context)?;
            Ok(())
        }

        fn write_layers_sizes(&mut self, dst: &mut W) -> crate::Result<()> {
            let rgb_size = if self.changed_rgb {
                self.rgb_encoder.done()?;
                layer_len_of(&mut self.rgb_encoder)
            } else {
                0
            };
            let nir_size = if self.changed_nir {
                self.nir_encoder.done()?;
                layer_len_of(&mut self.nir_encoder)
            } else {
                0
            };
            debug!("RGB layer size: {}, NIR layer size: {}", rgb_size, nir_size);
            dst.write_u32::<LittleEndian>(rgb_size)?;
            dst.write_u32::<LittleEndian>(nir_size)?;
            Ok(())
        }

        fn write_layers(&mut self, dst: &mut W) -> crate::Result<()> {
            if self.changed_rgb {
                copy_encoder_content_to(&mut self.rgb_encoder, dst)?;
            }
            if self.changed_nir {
                copy_encoder_content_to(&mut self.nir_encoder, dst)?;
            }
            Ok(())
        }
    }

    pub struct LasRGBNIRDecompressor {
        rgb_decoder: LayerDecoder,
        nir_decoder: LayerDecoder,
        decodable_rgb: bool,
        decodable_nir: bool,
        selection: DecompressionSelection,
        rgb_layer_size: u32,
        nir_layer_size: u32,
        point_index: u64,
        current_context: usize,
        contexts: [RGBNIRContext; 4],
    }

    impl Default for LasRGBNIRDecompressor {
        fn default() -> Self {
            Self {
                rgb_decoder: new_layer_decoder(),
                nir_decoder: new_layer_decoder(),
                decodable_rgb: false,
                decodable_nir: false,
                selection: DecompressionSelection::all(),
                rgb_layer_size: 0,
                nir_layer_size: 0,
                point_index: 0,
                current_context: 0,
                contexts: RGBNIRContext::bank(false),
            }
        }
    }

    impl LasRGBNIRDecompressor {
        pub fn init_with_first_point(&mut self, first: &RGBNIR, context: usize) {
            for the_context in &mut self.contexts {
                the_context.unused = true;
            }
            self.point_index = 0;
            self.current_context = context;
            self.contexts[context].init_from(first);
        }

        pub fn decompress_rgbnir(&mut self, context: usize) -> crate::Result<RGBNIR> {
            self.point_index += 1;
            let point_index = self.point_index;
            switch_to(&mut self.contexts, &mut self.current_context, context);
            let the_context = &mut self.contexts[self.current_context];

            let mut value = the_context.last;
            if self.decodable_rgb {
                value.rgb = decompress_rgb_using(
                    &mut self.rgb_decoder,
                    &mut the_context.rgb_models,
                    &the_context.last.rgb,
                )
                .map_err(|e| LasZipError::corrupt(Layer::Rgb, point_index, e))?;
            }
            if self.decodable_nir {
                value.nir = Nir(decompress_nir_using(
                    &mut self.nir_decoder,
                    &mut the_context.nir_models,
                    the_context.last.nir.0,
                )
                .map_err(|e| LasZipError::corrupt(Layer::Nir, point_index, e))?);
            }
            the_context.last = value;
            Ok(value)
        }
    }

    impl<R: Read + Seek> LayeredFieldDecompressor<R> for LasRGBNIRDecompressor {
        fn size_of_field(&self) -> usize {
            RGBNIR::SIZE
        }

        fn set_selection(&mut self, selection: DecompressionSelection) {
            self.selection = selection;
        }

        fn init_first_point(
            &mut self,
            src: &mut R,
            first_point: &mut [u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            src.read_exact(&mut first_point[..RGBNIR::SIZE])?;
            self.init_with_first_point(&RGBNIR::unpack_from(first_point), *context);
            Ok(())
        }

        fn decompress_field_with(
            &mut self,
            current_point: &mut [u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            self.decompress_rgbnir(*context)?.pack_into(current_point);
            Ok(())
        }

        fn read_layers_sizes(&mut self, src: &mut R) -> crate::Result<()> {
            let mut read_size = || {
                src.read_u32::<LittleEndian>()
                    .map_err(|e| LasZipError::corrupt(Layer::ChunkHeader, 0, e))
            };
            self.rgb_layer_size = read_size()?;
            self.nir_layer_size = read_size()?;
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> crate::Result<()> {
            let rgb_requested = self.selection.should_decompress_rgb();
            let nir_requested = self.selection.should_decompress_nir();
            self.decodable_rgb = copy_bytes_into_decoder(
                rgb_requested,
                self.rgb_layer_size as usize,
                &mut self.rgb_decoder,
                src,
            )
            .map_err(|e| LasZipError::corrupt(Layer::Rgb, 0, e))?;
            self.decodable_nir = copy_bytes_into_decoder(
                nir_requested,
                self.nir_layer_size as usize,
                &mut self.nir_decoder,
                src,
            )
            .map_err(|e| LasZipError::corrupt(Layer::Nir, 0, e))?;
            if !rgb_requested && self.rgb_layer_size > 0 {
                debug!("Skipping the RGB layer ({} bytes)", self.rgb_layer_size);
            }
            if !nir_requested && self.nir_layer_size > 0 {
                debug!("Skipping the NIR layer ({} bytes)", self.nir_layer_size);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nir_follows_the_color() {
        let value = RGBNIR {
            rgb: RGB {
                red: 0x0102,
                green: 0x0304,
                blue: 0x0506,
            },
            nir: Nir(0x0708),
        };
        let mut bytes = [0u8; RGBNIR::SIZE];
        value.pack_into(&mut bytes);
        assert_eq!(bytes, [2, 1, 4, 3, 6, 5, 8, 7]);
        assert_eq!(RGBNIR::unpack_from(&bytes), value);
    }
}
