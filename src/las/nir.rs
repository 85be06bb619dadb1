//! Near infrared component of the points of the LAS point formats 8 and 10

use crate::packers::Packable;

#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Nir(pub u16);

impl Nir {
    pub const SIZE: usize = 2;
}

impl Packable for Nir {
    type Type = Nir;

    fn unpack_from(input: &[u8]) -> Self::Type {
        Nir(u16::unpack_from(input))
    }

    fn pack_into(&self, output: &mut [u8]) {
        self.0.pack_into(output)
    }
}

pub mod v3 {
    use std::io::{Read, Write};

    use crate::decoders::ArithmeticDecoder;
    use crate::encoders::ArithmeticEncoder;
    use crate::las::utils::{lower_byte, upper_byte};
    use crate::models::{ArithmeticModel, ArithmeticModelBuilder};

    #[derive(Debug, Clone)]
    pub(crate) struct NirModels {
        bytes_used: ArithmeticModel,
        diff_0: ArithmeticModel,
        diff_1: ArithmeticModel,
    }

    impl NirModels {
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
                bytes_used: model(4),
                diff_0: model(256),
                diff_1: model(256),
            }
        }

        pub(crate) fn reset(&mut self) {
            self.bytes_used.reset();
            self.diff_0.reset();
            self.diff_1.reset();
        }
    }

    /// Returns whether the value differs from the last one
    pub(crate) fn compress_nir_using<W: Write>(
        encoder: &mut ArithmeticEncoder<W>,
        models: &mut NirModels,
        current: u16,
        last: u16,
    ) -> std::io::Result<bool> {
        let sym = u32::from(lower_byte(current) != lower_byte(last))
            | u32::from(upper_byte(current) != upper_byte(last)) << 1;
        encoder.encode_symbol(&mut models.bytes_used, sym)?;

        if sym & (1 << 0) != 0 {
            let diff = lower_byte(current).wrapping_sub(lower_byte(last));
            encoder.encode_symbol(&mut models.diff_0, u32::from(diff))?;
        }
        if sym & (1 << 1) != 0 {
            let diff = upper_byte(current).wrapping_sub(upper_byte(last));
            encoder.encode_symbol(&mut models.diff_1, u32::from(diff))?;
        }
        Ok(sym != 0)
    }

    pub(crate) fn decompress_nir_using<R: Read>(
        decoder: &mut ArithmeticDecoder<R>,
        models: &mut NirModels,
        last: u16,
    ) -> std::io::Result<u16> {
        let sym = decoder.decode_symbol(&mut models.bytes_used)?;

        let lower = if sym & (1 << 0) != 0 {
            let corr = decoder.decode_symbol(&mut models.diff_0)? as u8;
            corr.wrapping_add(lower_byte(last))
        } else {
            lower_byte(last)
        };

        let upper = if sym & (1 << 1) != 0 {
            let corr = decoder.decode_symbol(&mut models.diff_1)? as u8;
            corr.wrapping_add(upper_byte(last))
        } else {
            upper_byte(last)
        };
        Ok(u16::from(upper) << 8 | u16::from(lower))
    }

    #[cfg(test)]
    mod tests {
        use std::io::Cursor;

        use super::*;

        #[test]
        fn byte_differences_wrap_around() {
            let values = [0u16, 0x00FF, 0xFF00, 0x0100, 0xFFFF, 0x0001, 0x0001, 0x8000];
            let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
            let mut models = NirModels::new(true);
            let mut last = 0u16;
            let mut changes = Vec::new();
            for value in &values {
                changes.push(compress_nir_using(&mut encoder, &mut models, *value, last).unwrap());
                last = *value;
            }
            encoder.done().unwrap();
            assert_eq!(
                changes,
                vec![false, true, true, true, true, true, false, true]
            );

            let mut decoder = ArithmeticDecoder::new(encoder.into_stream());
            decoder.in_stream().set_position(0);
            decoder.read_init_bytes().unwrap();
            let mut models = NirModels::new(false);
            let mut last = 0u16;
            for value in &values {
                last = decompress_nir_using(&mut decoder, &mut models, last).unwrap();
                assert_eq!(last, *value);
            }
        }
    }
}
