/*
===============================================================================

  CONTENTS:
    Point of the LAS point formats 6 to 10 and its layered compression

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
    Point values are typed, decoding commits a point only once fully decoded
===============================================================================
*/

//! Extended point (the "point14" of LASzip) shared by the point formats 6 to 10.

use crate::packers::Packable;

/// The fields of a point of the LAS point formats 6 to 10.
///
/// The return numbers, classification flags and scanner channel are packed in two bytes
/// exactly like in the LAS record and are only reachable through accessors.
#[derive(Default, Copy, Clone, Debug, PartialEq)]
pub struct Point14 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub intensity: u16,
    // return number (4 bits) | number of returns (4 bits)
    returns: u8,
    // classification flags (4 bits) | scanner channel (2 bits) | scan direction | edge
    flags: u8,
    pub classification: u8,
    pub user_data: u8,
    pub scan_angle: i16,
    pub point_source_id: u16,
    pub gps_time: f64,
}

impl Point14 {
    pub const SIZE: usize = 30;

    pub fn return_number(&self) -> u8 {
        self.returns & 0x0F
    }

    pub fn number_of_returns(&self) -> u8 {
        self.returns >> 4
    }

    pub fn classification_flags(&self) -> u8 {
        self.flags & 0x0F
    }

    pub fn scanner_channel(&self) -> u8 {
        (self.flags >> 4) & 0x03
    }

    pub fn scan_direction_flag(&self) -> bool {
        self.flags & 0x40 != 0
    }

    pub fn edge_of_flight_line(&self) -> bool {
        self.flags & 0x80 != 0
    }

    /// Only the 4 lowest bits are kept
    pub fn set_return_number(&mut self, value: u8) {
        self.returns = (self.returns & 0xF0) | (value & 0x0F);
    }

    /// Only the 4 lowest bits are kept
    pub fn set_number_of_returns(&mut self, value: u8) {
        self.returns = (self.returns & 0x0F) | ((value & 0x0F) << 4);
    }

    /// Only the 4 lowest bits are kept
    pub fn set_classification_flags(&mut self, value: u8) {
        self.flags = (self.flags & 0xF0) | (value & 0x0F);
    }

    /// Only the 2 lowest bits are kept
    pub fn set_scanner_channel(&mut self, value: u8) {
        self.flags = (self.flags & 0xCF) | ((value & 0x03) << 4);
    }

    pub fn set_scan_direction_flag(&mut self, value: bool) {
        self.set_flag_bit(0x40, value);
    }

    pub fn set_edge_of_flight_line(&mut self, value: bool) {
        self.set_flag_bit(0x80, value);
    }

    fn set_flag_bit(&mut self, mask: u8, value: bool) {
        if value {
            self.flags |= mask;
        } else {
            self.flags &= !mask;
        }
    }

    /// Edge of flight line, scan direction and classification flags
    /// as the 6 bits symbol of the flags layer.
    pub(crate) fn flags_symbol(&self) -> u32 {
        (u32::from(self.edge_of_flight_line()) << 5)
            | (u32::from(self.scan_direction_flag()) << 4)
            | u32::from(self.classification_flags())
    }

    pub(crate) fn set_flags_from_symbol(&mut self, symbol: u32) {
        self.set_edge_of_flight_line(symbol & (1 << 5) != 0);
        self.set_scan_direction_flag(symbol & (1 << 4) != 0);
        self.set_classification_flags((symbol & 0x0F) as u8);
    }
}

impl Packable for Point14 {
    type Type = Point14;

    fn unpack_from(input: &[u8]) -> Self::Type {
        assert!(
            input.len() >= Self::SIZE,
            "Point14::unpack_from expected a buffer of {} bytes",
            Self::SIZE
        );
        Self {
            x: i32::unpack_from(&input[0..4]),
            y: i32::unpack_from(&input[4..8]),
            z: i32::unpack_from(&input[8..12]),
            intensity: u16::unpack_from(&input[12..14]),
            returns: input[14],
            flags: input[15],
            classification: input[16],
            user_data: input[17],
            scan_angle: i16::unpack_from(&input[18..20]),
            point_source_id: u16::unpack_from(&input[20..22]),
            gps_time: f64::unpack_from(&input[22..30]),
        }
    }

    fn pack_into(&self, output: &mut [u8]) {
        assert!(
            output.len() >= Self::SIZE,
            "Point14::pack_into expected a buffer of {} bytes",
            Self::SIZE
        );
        self.x.pack_into(&mut output[0..4]);
        self.y.pack_into(&mut output[4..8]);
        self.z.pack_into(&mut output[8..12]);
        self.intensity.pack_into(&mut output[12..14]);
        output[14] = self.returns;
        output[15] = self.flags;
        output[16] = self.classification;
        output[17] = self.user_data;
        self.scan_angle.pack_into(&mut output[18..20]);
        self.point_source_id.pack_into(&mut output[20..22]);
        self.gps_time.pack_into(&mut output[22..30]);
    }
}

pub mod v3 {
    //! Layered compression of the point14, one arithmetic coded layer per group of fields,
    //! one set of models per scanner channel.

    use std::io::{Read, Seek, Write};

    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
    use log::debug;

    use crate::compressors::{IntegerCompressor, IntegerCompressorBuilder};
    use crate::decompressors::{IntegerDecompressor, IntegerDecompressorBuilder};
    use crate::errors::{LasZipError, Layer};
    use crate::las::gps::{GpsTime, GpsTimeCompressor, GpsTimeDecompressor};
    use crate::las::selective::DecompressionSelection;
    use crate::las::utils::{
        copy_bytes_into_decoder, copy_encoder_content_to, layer_len_of, new_layer_decoder,
        new_layer_encoder, reset_layer_encoder, u32_zero_bit, LayerDecoder, LayerEncoder,
        StreamingMedian, NUMBER_RETURN_LEVEL_8CT, NUMBER_RETURN_MAP_6CTX,
    };
    use crate::models::{reset_created, ArithmeticModel, ArithmeticModelBuilder};
    use crate::packers::Packable;
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};

    use super::Point14;

    const NUM_CONTEXTS: usize = 4;

    /// Context of the changed values model: first return, last return
    /// and whether the gps time changed, all of the last point.
    #[inline]
    pub(crate) fn last_point_return_context(last: &Point14, gps_time_change: bool) -> usize {
        let r = last.return_number();
        let n = last.number_of_returns();
        usize::from(r == 1) + (usize::from(r >= n) << 1) + (usize::from(gps_time_change) << 2)
    }

    /// The per point symbol telling which values differ from the previous point
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub(crate) struct ChangedValues(u32);

    impl ChangedValues {
        const SCANNER_CHANNEL: u32 = 1 << 6;
        const POINT_SOURCE: u32 = 1 << 5;
        const GPS_TIME: u32 = 1 << 4;
        const SCAN_ANGLE: u32 = 1 << 3;
        const NUMBER_OF_RETURNS: u32 = 1 << 2;

        pub(crate) fn from_points(current: &Point14, last: &Point14, channel_changed: bool) -> Self {
            let mut bits = 0u32;
            if channel_changed {
                bits |= Self::SCANNER_CHANNEL;
            }
            if current.point_source_id != last.point_source_id {
                bits |= Self::POINT_SOURCE;
            }
            if current.gps_time.to_bits() != last.gps_time.to_bits() {
                bits |= Self::GPS_TIME;
            }
            if current.scan_angle != last.scan_angle {
                bits |= Self::SCAN_ANGLE;
            }
            if current.number_of_returns() != last.number_of_returns() {
                bits |= Self::NUMBER_OF_RETURNS;
            }

            let r = current.return_number();
            let last_r = last.return_number();
            if r != last_r {
                if r == (last_r + 1) % 16 {
                    bits |= 1;
                } else if r == (last_r + 15) % 16 {
                    bits |= 2;
                } else {
                    bits |= 3;
                }
            }
            Self(bits)
        }

        fn scanner_channel_changed(self) -> bool {
            self.0 & Self::SCANNER_CHANNEL != 0
        }

        fn point_source_changed(self) -> bool {
            self.0 & Self::POINT_SOURCE != 0
        }

        fn gps_time_changed(self) -> bool {
            self.0 & Self::GPS_TIME != 0
        }

        fn scan_angle_changed(self) -> bool {
            self.0 & Self::SCAN_ANGLE != 0
        }

        fn number_of_returns_changed(self) -> bool {
            self.0 & Self::NUMBER_OF_RETURNS != 0
        }

        fn return_number_code(self) -> u32 {
            self.0 & 3
        }
    }

    /// Buckets derived from the number of returns and return number of a point
    #[derive(Copy, Clone, Debug)]
    struct ReturnBuckets {
        single: bool,
        m: usize,
        l: usize,
        // single (3) / first (2) / last (1) / intermediate (0)
        cpr: usize,
    }

    impl ReturnBuckets {
        fn new(n: u8, r: u8) -> Self {
            let (n, r) = (n as usize, r as usize);
            Self {
                single: n == 1,
                m: NUMBER_RETURN_MAP_6CTX[n][r] as usize,
                l: NUMBER_RETURN_LEVEL_8CT[n][r] as usize,
                cpr: (usize::from(r == 1) << 1) + usize::from(r >= n),
            }
        }

        fn x_context(self) -> u32 {
            u32::from(self.single)
        }

        fn y_context(self, k_bits: u32) -> u32 {
            u32::from(self.single) + if k_bits < 20 { u32_zero_bit(k_bits) } else { 20 }
        }

        fn z_context(self, k_bits: u32) -> u32 {
            u32::from(self.single) + if k_bits < 18 { u32_zero_bit(k_bits) } else { 18 }
        }

        fn classification_model(self, last_classification: u8) -> usize {
            (((last_classification & 0x1F) as usize) << 1) + usize::from(self.cpr == 3)
        }
    }

    /// Symbol of a return number that differs from the last one
    /// by something else than +1 / -1 while the gps time stayed the same.
    #[inline]
    fn return_number_gps_same_symbol(r: u8, last_r: u8) -> u32 {
        let diff = i32::from(r) - i32::from(last_r);
        if diff > 1 {
            (diff - 2) as u32
        } else {
            (diff + 16 - 2) as u32
        }
    }

    #[inline]
    fn return_number_from_gps_same_symbol(symbol: u32, last_r: u8) -> u8 {
        ((u32::from(last_r) + symbol + 2) % 16) as u8
    }

    /// What the next point is predicted from
    #[derive(Clone, Debug)]
    struct Point14History {
        unused: bool,
        last_point: Point14,
        gps_time_change: bool,

        last_x_diff_median5: [StreamingMedian<i32>; 12],
        last_y_diff_median5: [StreamingMedian<i32>; 12],
        last_z: [i32; 8],
        last_intensity: [u16; 8],
    }

    impl Default for Point14History {
        fn default() -> Self {
            Self {
                unused: true,
                last_point: Point14::default(),
                gps_time_change: false,
                last_x_diff_median5: [StreamingMedian::new(); 12],
                last_y_diff_median5: [StreamingMedian::new(); 12],
                last_z: [0; 8],
                last_intensity: [0; 8],
            }
        }
    }

    impl Point14History {
        fn seed(&mut self, point: &Point14) {
            self.unused = false;
            self.last_point = *point;
            self.gps_time_change = false;
            for median in self
                .last_x_diff_median5
                .iter_mut()
                .chain(self.last_y_diff_median5.iter_mut())
            {
                median.reset();
            }
            self.last_z = [point.z; 8];
            self.last_intensity = [point.intensity; 8];
        }
    }

    /// The symbol models of one context, the same for encoding and decoding
    #[derive(Clone, Debug)]
    struct Point14Models {
        compress: bool,
        changed_values: Vec<ArithmeticModel>,
        scanner_channel: ArithmeticModel,
        number_of_returns: Vec<Option<ArithmeticModel>>,
        return_number: Vec<Option<ArithmeticModel>>,
        return_number_gps_same: ArithmeticModel,
        classification: Vec<Option<ArithmeticModel>>,
        flags: Vec<Option<ArithmeticModel>>,
        user_data: Vec<Option<ArithmeticModel>>,
    }

    fn build_model(symbols: u32, compress: bool) -> ArithmeticModel {
        let builder = ArithmeticModelBuilder::new(symbols);
        if compress {
            builder.compressing().build()
        } else {
            builder.build()
        }
    }

    #[inline]
    fn lazy_model(
        slot: &mut Option<ArithmeticModel>,
        symbols: u32,
        compress: bool,
    ) -> &mut ArithmeticModel {
        slot.get_or_insert_with(|| build_model(symbols, compress))
    }

    impl Point14Models {
        fn new(compress: bool) -> Self {
            Self {
                compress,
                changed_values: (0..8).map(|_| build_model(128, compress)).collect(),
                scanner_channel: build_model(3, compress),
                number_of_returns: vec![None; 16],
                return_number: vec![None; 16],
                return_number_gps_same: build_model(13, compress),
                classification: vec![None; 64],
                flags: vec![None; 64],
                user_data: vec![None; 64],
            }
        }

        fn reset(&mut self) {
            for model in &mut self.changed_values {
                model.reset();
            }
            self.scanner_channel.reset();
            self.return_number_gps_same.reset();
            reset_created(&mut self.number_of_returns);
            reset_created(&mut self.return_number);
            reset_created(&mut self.classification);
            reset_created(&mut self.flags);
            reset_created(&mut self.user_data);
        }

        fn number_of_returns(&mut self, last_n: u8) -> &mut ArithmeticModel {
            lazy_model(&mut self.number_of_returns[last_n as usize], 16, self.compress)
        }

        fn return_number(&mut self, last_r: u8) -> &mut ArithmeticModel {
            lazy_model(&mut self.return_number[last_r as usize], 16, self.compress)
        }

        fn classification(&mut self, index: usize) -> &mut ArithmeticModel {
            lazy_model(&mut self.classification[index], 256, self.compress)
        }

        fn flags(&mut self, last_flags: u32) -> &mut ArithmeticModel {
            lazy_model(&mut self.flags[last_flags as usize], 64, self.compress)
        }

        fn user_data(&mut self, last_user_data: u8) -> &mut ArithmeticModel {
            lazy_model(
                &mut self.user_data[(last_user_data / 4) as usize],
                256,
                self.compress,
            )
        }
    }

    /// Size of each layers of a chunk, in their order on disk
    #[derive(Copy, Clone, Default, Debug)]
    struct LayerSizes {
        channel_returns_xy: u32,
        z: u32,
        classification: u32,
        flags: u32,
        intensity: u32,
        scan_angle: u32,
        user_data: u32,
        point_source: u32,
        gps_time: u32,
    }

    impl LayerSizes {
        fn read_from<R: Read>(src: &mut R) -> std::io::Result<Self> {
            Ok(Self {
                channel_returns_xy: src.read_u32::<LittleEndian>()?,
                z: src.read_u32::<LittleEndian>()?,
                classification: src.read_u32::<LittleEndian>()?,
                flags: src.read_u32::<LittleEndian>()?,
                intensity: src.read_u32::<LittleEndian>()?,
                scan_angle: src.read_u32::<LittleEndian>()?,
                user_data: src.read_u32::<LittleEndian>()?,
                point_source: src.read_u32::<LittleEndian>()?,
                gps_time: src.read_u32::<LittleEndian>()?,
            })
        }

        fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
            for size in &[
                self.channel_returns_xy,
                self.z,
                self.classification,
                self.flags,
                self.intensity,
                self.scan_angle,
                self.user_data,
                self.point_source,
                self.gps_time,
            ] {
                dst.write_u32::<LittleEndian>(*size)?;
            }
            Ok(())
        }
    }

    /// Which of the optional layers were changed by at least one point of the chunk
    /// (compression) or can be decoded (decompression).
    #[derive(Copy, Clone, Default, Debug)]
    struct ChangedLayers {
        z: bool,
        classification: bool,
        flags: bool,
        intensity: bool,
        scan_angle: bool,
        user_data: bool,
        point_source: bool,
        gps_time: bool,
    }

    struct Point14Encoders {
        channel_returns_xy: LayerEncoder,
        z: LayerEncoder,
        classification: LayerEncoder,
        flags: LayerEncoder,
        intensity: LayerEncoder,
        scan_angle: LayerEncoder,
        user_data: LayerEncoder,
        point_source: LayerEncoder,
        gps_time: LayerEncoder,
    }

    impl Default for Point14Encoders {
        fn default() -> Self {
            Self {
                channel_returns_xy: new_layer_encoder(),
                z: new_layer_encoder(),
                classification: new_layer_encoder(),
                flags: new_layer_encoder(),
                intensity: new_layer_encoder(),
                scan_angle: new_layer_encoder(),
                user_data: new_layer_encoder(),
                point_source: new_layer_encoder(),
                gps_time: new_layer_encoder(),
            }
        }
    }

    impl Point14Encoders {
        fn iter_mut(&mut self) -> impl Iterator<Item = &mut LayerEncoder> {
            vec![
                &mut self.channel_returns_xy,
                &mut self.z,
                &mut self.classification,
                &mut self.flags,
                &mut self.intensity,
                &mut self.scan_angle,
                &mut self.user_data,
                &mut self.point_source,
                &mut self.gps_time,
            ]
            .into_iter()
        }
    }

    struct Point14Decoders {
        channel_returns_xy: LayerDecoder,
        z: LayerDecoder,
        classification: LayerDecoder,
        flags: LayerDecoder,
        intensity: LayerDecoder,
        scan_angle: LayerDecoder,
        user_data: LayerDecoder,
        point_source: LayerDecoder,
        gps_time: LayerDecoder,
    }

    impl Default for Point14Decoders {
        fn default() -> Self {
            Self {
                channel_returns_xy: new_layer_decoder(),
                z: new_layer_decoder(),
                classification: new_layer_decoder(),
                flags: new_layer_decoder(),
                intensity: new_layer_decoder(),
                scan_angle: new_layer_decoder(),
                user_data: new_layer_decoder(),
                point_source: new_layer_decoder(),
                gps_time: new_layer_decoder(),
            }
        }
    }

    struct Point14CompressionContext {
        history: Point14History,
        models: Point14Models,

        ic_dx: IntegerCompressor,
        ic_dy: IntegerCompressor,
        ic_z: IntegerCompressor,
        ic_intensity: IntegerCompressor,
        ic_scan_angle: IntegerCompressor,
        ic_point_source_id: IntegerCompressor,
        gps: GpsTimeCompressor,
    }

    impl Point14CompressionContext {
        fn new() -> Self {
            Self {
                history: Point14History::default(),
                models: Point14Models::new(true),
                ic_dx: IntegerCompressorBuilder::new().bits(32).contexts(2).build(),
                ic_dy: IntegerCompressorBuilder::new().bits(32).contexts(22).build(),
                ic_z: IntegerCompressorBuilder::new().bits(32).contexts(20).build(),
                ic_intensity: IntegerCompressorBuilder::new().bits(16).contexts(4).build(),
                ic_scan_angle: IntegerCompressorBuilder::new().bits(16).contexts(2).build(),
                ic_point_source_id: IntegerCompressorBuilder::new().bits(16).build(),
                gps: GpsTimeCompressor::new(),
            }
        }

        fn init_from(&mut self, point: &Point14) {
            self.models.reset();
            self.ic_dx.reset();
            self.ic_dy.reset();
            self.ic_z.reset();
            self.ic_intensity.reset();
            self.ic_scan_angle.reset();
            self.ic_point_source_id.reset();
            self.gps.reset(GpsTime::from(point.gps_time));
            self.history.seed(point);
        }
    }

    /// Compressor of the point14 fields, version 3 (layered)
    pub struct LasPoint14Compressor {
        encoders: Point14Encoders,
        changed: ChangedLayers,
        current_context: usize,
        contexts: [Point14CompressionContext; NUM_CONTEXTS],
    }

    impl Default for LasPoint14Compressor {
        fn default() -> Self {
            Self {
                encoders: Point14Encoders::default(),
                changed: ChangedLayers::default(),
                current_context: 0,
                contexts: [
                    Point14CompressionContext::new(),
                    Point14CompressionContext::new(),
                    Point14CompressionContext::new(),
                    Point14CompressionContext::new(),
                ],
            }
        }
    }

    impl LasPoint14Compressor {
        /// Starts a new stream from its first point, which is not coded.
        ///
        /// Returns the context of the point, its scanner channel.
        pub fn init_with_first_point(&mut self, first_point: &Point14) -> usize {
            for encoder in self.encoders.iter_mut() {
                reset_layer_encoder(encoder);
            }
            self.changed = ChangedLayers::default();
            for context in &mut self.contexts {
                context.history.unused = true;
            }
            self.current_context = first_point.scanner_channel() as usize;
            self.contexts[self.current_context].init_from(first_point);
            self.current_context
        }

        /// Compresses a point, returns the context it was compressed with
        pub fn compress_point(&mut self, point: &Point14) -> std::io::Result<usize> {
            let point_channel = point.scanner_channel() as usize;
            let channel_changed = point_channel != self.current_context;

            let (lpr, baseline) = {
                let current = &self.contexts[self.current_context].history;
                let lpr = last_point_return_context(&current.last_point, current.gps_time_change);
                let target = &self.contexts[point_channel].history;
                if channel_changed && !target.unused {
                    (lpr, target.last_point)
                } else {
                    (lpr, current.last_point)
                }
            };
            let changed_values = ChangedValues::from_points(point, &baseline, channel_changed);

            let encoder = &mut self.encoders.channel_returns_xy;
            let context = &mut self.contexts[self.current_context];
            encoder.encode_symbol(&mut context.models.changed_values[lpr], changed_values.0)?;

            if channel_changed {
                let diff = (point_channel + NUM_CONTEXTS - self.current_context) % NUM_CONTEXTS;
                encoder.encode_symbol(&mut context.models.scanner_channel, (diff - 1) as u32)?;
                if self.contexts[point_channel].history.unused {
                    let seed = self.contexts[self.current_context].history.last_point;
                    debug!(
                        "Initializing context {} from context {}",
                        point_channel, self.current_context
                    );
                    self.contexts[point_channel].init_from(&seed);
                }
                self.current_context = point_channel;
            }

            let encoders = &mut self.encoders;
            let changed = &mut self.changed;
            let context = &mut self.contexts[self.current_context];
            let last = context.history.last_point;
            let gps_time_change = changed_values.gps_time_changed();

            let n = point.number_of_returns();
            let r = point.return_number();
            let last_n = last.number_of_returns();
            let last_r = last.return_number();

            if changed_values.number_of_returns_changed() {
                encoders
                    .channel_returns_xy
                    .encode_symbol(context.models.number_of_returns(last_n), u32::from(n))?;
            }

            if changed_values.return_number_code() == 3 {
                if gps_time_change {
                    encoders
                        .channel_returns_xy
                        .encode_symbol(context.models.return_number(last_r), u32::from(r))?;
                } else {
                    encoders.channel_returns_xy.encode_symbol(
                        &mut context.models.return_number_gps_same,
                        return_number_gps_same_symbol(r, last_r),
                    )?;
                }
            }

            let buckets = ReturnBuckets::new(n, r);
            let median_index = (buckets.m << 1) | usize::from(gps_time_change);

            let median = context.history.last_x_diff_median5[median_index].get();
            let diff = point.x.wrapping_sub(last.x);
            context.ic_dx.compress(
                &mut encoders.channel_returns_xy,
                median,
                diff,
                buckets.x_context(),
            )?;
            context.history.last_x_diff_median5[median_index].add(diff);

            let median = context.history.last_y_diff_median5[median_index].get();
            let diff = point.y.wrapping_sub(last.y);
            let k_bits = context.ic_dx.k();
            context.ic_dy.compress(
                &mut encoders.channel_returns_xy,
                median,
                diff,
                buckets.y_context(k_bits),
            )?;
            context.history.last_y_diff_median5[median_index].add(diff);

            let k_bits = (context.ic_dx.k() + context.ic_dy.k()) / 2;
            context.ic_z.compress(
                &mut encoders.z,
                context.history.last_z[buckets.l],
                point.z,
                buckets.z_context(k_bits),
            )?;
            context.history.last_z[buckets.l] = point.z;

            changed.classification |= point.classification != last.classification;
            let model_index = buckets.classification_model(last.classification);
            encoders.classification.encode_symbol(
                context.models.classification(model_index),
                u32::from(point.classification),
            )?;

            let last_flags = last.flags_symbol();
            let flags = point.flags_symbol();
            changed.flags |= flags != last_flags;
            encoders
                .flags
                .encode_symbol(context.models.flags(last_flags), flags)?;

            changed.intensity |= point.intensity != last.intensity;
            let intensity_index = (buckets.cpr << 1) | usize::from(gps_time_change);
            context.ic_intensity.compress(
                &mut encoders.intensity,
                i32::from(context.history.last_intensity[intensity_index]),
                i32::from(point.intensity),
                buckets.cpr as u32,
            )?;
            context.history.last_intensity[intensity_index] = point.intensity;

            if changed_values.scan_angle_changed() {
                changed.scan_angle = true;
                context.ic_scan_angle.compress(
                    &mut encoders.scan_angle,
                    i32::from(last.scan_angle),
                    i32::from(point.scan_angle),
                    u32::from(gps_time_change),
                )?;
            }

            changed.user_data |= point.user_data != last.user_data;
            encoders.user_data.encode_symbol(
                context.models.user_data(last.user_data),
                u32::from(point.user_data),
            )?;

            if changed_values.point_source_changed() {
                changed.point_source = true;
                context.ic_point_source_id.compress(
                    &mut encoders.point_source,
                    i32::from(last.point_source_id),
                    i32::from(point.point_source_id),
                    0,
                )?;
            }

            if gps_time_change {
                changed.gps_time = true;
                context
                    .gps
                    .compress(&mut encoders.gps_time, GpsTime::from(point.gps_time))?;
            }

            context.history.last_point = *point;
            context.history.gps_time_change = gps_time_change;
            Ok(self.current_context)
        }

        fn layer_sizes(&mut self) -> LayerSizes {
            let changed = self.changed;
            let encoders = &mut self.encoders;
            let size_if = |is_changed: bool, encoder: &mut LayerEncoder| {
                if is_changed {
                    layer_len_of(encoder)
                } else {
                    0
                }
            };
            LayerSizes {
                channel_returns_xy: size_if(true, &mut encoders.channel_returns_xy),
                z: size_if(true, &mut encoders.z),
                classification: size_if(changed.classification, &mut encoders.classification),
                flags: size_if(changed.flags, &mut encoders.flags),
                intensity: size_if(changed.intensity, &mut encoders.intensity),
                scan_angle: size_if(changed.scan_angle, &mut encoders.scan_angle),
                user_data: size_if(changed.user_data, &mut encoders.user_data),
                point_source: size_if(changed.point_source, &mut encoders.point_source),
                gps_time: size_if(changed.gps_time, &mut encoders.gps_time),
            }
        }

        fn changed_encoders(&mut self) -> Vec<&mut LayerEncoder> {
            let changed = self.changed;
            let encoders = &mut self.encoders;
            let mut layers = vec![&mut encoders.channel_returns_xy, &mut encoders.z];
            let optional = vec![
                (changed.classification, &mut encoders.classification),
                (changed.flags, &mut encoders.flags),
                (changed.intensity, &mut encoders.intensity),
                (changed.scan_angle, &mut encoders.scan_angle),
                (changed.user_data, &mut encoders.user_data),
                (changed.point_source, &mut encoders.point_source),
                (changed.gps_time, &mut encoders.gps_time),
            ];
            layers.extend(
                optional
                    .into_iter()
                    .filter(|(is_changed, _)| *is_changed)
                    .map(|(_, encoder)| encoder),
            );
            layers
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for LasPoint14Compressor {
        fn size_of_field(&self) -> usize {
            Point14::SIZE
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first_point: &[u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            dst.write_all(&first_point[..Point14::SIZE])?;
            let point = Point14::unpack_from(first_point);
            *context = self.init_with_first_point(&point);
            Ok(())
        }

        fn compress_field_with(
            &mut self,
            current_point: &[u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            let point = Point14::unpack_from(current_point);
            *context = self.compress_point(&point)?;
            Ok(())
        }

        fn write_layers_sizes(&mut self, dst: &mut W) -> crate::Result<()> {
            for encoder in self.changed_encoders() {
                encoder.done()?;
            }
            let sizes = self.layer_sizes();
            debug!("point14 layer sizes: {:?}", sizes);
            sizes.write_to(dst)?;
            Ok(())
        }

        fn write_layers(&mut self, dst: &mut W) -> crate::Result<()> {
            for encoder in self.changed_encoders() {
                copy_encoder_content_to(encoder, dst)?;
            }
            Ok(())
        }
    }

    struct Point14DecompressionContext {
        history: Point14History,
        models: Point14Models,

        ic_dx: IntegerDecompressor,
        ic_dy: IntegerDecompressor,
        ic_z: IntegerDecompressor,
        ic_intensity: IntegerDecompressor,
        ic_scan_angle: IntegerDecompressor,
        ic_point_source_id: IntegerDecompressor,
        gps: GpsTimeDecompressor,
    }

    impl Point14DecompressionContext {
        fn new() -> Self {
            Self {
                history: Point14History::default(),
                models: Point14Models::new(false),
                ic_dx: IntegerDecompressorBuilder::new().bits(32).contexts(2).build(),
                ic_dy: IntegerDecompressorBuilder::new().bits(32).contexts(22).build(),
                ic_z: IntegerDecompressorBuilder::new().bits(32).contexts(20).build(),
                ic_intensity: IntegerDecompressorBuilder::new().bits(16).contexts(4).build(),
                ic_scan_angle: IntegerDecompressorBuilder::new().bits(16).contexts(2).build(),
                ic_point_source_id: IntegerDecompressorBuilder::new().bits(16).build(),
                gps: GpsTimeDecompressor::new(),
            }
        }

        fn init_from(&mut self, point: &Point14) {
            self.models.reset();
            self.ic_dx.reset();
            self.ic_dy.reset();
            self.ic_z.reset();
            self.ic_intensity.reset();
            self.ic_scan_angle.reset();
            self.ic_point_source_id.reset();
            self.gps.reset(GpsTime::from(point.gps_time));
            self.history.seed(point);
        }
    }

    /// Decompressor of the point14 fields, version 3 (layered)
    pub struct LasPoint14Decompressor {
        decoders: Point14Decoders,
        decodable: ChangedLayers,
        layers_sizes: LayerSizes,
        selection: DecompressionSelection,

        // index in the chunk of the point being decompressed
        point_index: u64,
        current_context: usize,
        contexts: [Point14DecompressionContext; NUM_CONTEXTS],
    }

    impl Default for LasPoint14Decompressor {
        fn default() -> Self {
            Self::selective(DecompressionSelection::all())
        }
    }

    impl LasPoint14Decompressor {
        /// The layers not part of the `selection` are skipped, their fields
        /// keep the value of the first point
        pub fn selective(selection: DecompressionSelection) -> Self {
            Self {
                decoders: Point14Decoders::default(),
                decodable: ChangedLayers::default(),
                layers_sizes: LayerSizes::default(),
                selection,
                point_index: 0,
                current_context: 0,
                contexts: [
                    Point14DecompressionContext::new(),
                    Point14DecompressionContext::new(),
                    Point14DecompressionContext::new(),
                    Point14DecompressionContext::new(),
                ],
            }
        }

        pub fn init_with_first_point(&mut self, first_point: &Point14) -> usize {
            for context in &mut self.contexts {
                context.history.unused = true;
            }
            self.point_index = 0;
            self.current_context = first_point.scanner_channel() as usize;
            self.contexts[self.current_context].init_from(first_point);
            self.current_context
        }

        /// Decompresses the next point.
        ///
        /// The prediction baseline of the context is only updated when every layer
        /// of the point could be decoded.
        pub fn decompress_point(&mut self) -> crate::Result<Point14> {
            self.point_index += 1;
            let point_index = self.point_index;
            let on_layer =
                |layer: Layer| move |e: std::io::Error| LasZipError::corrupt(layer, point_index, e);

            let (changed_values, mut point) = self
                .decompress_channel_returns_xy()
                .map_err(on_layer(Layer::ChannelReturnsXY))?;
            let buckets =
                ReturnBuckets::new(point.number_of_returns(), point.return_number());
            let gps_time_change = changed_values.gps_time_changed();

            let decoders = &mut self.decoders;
            let decodable = self.decodable;
            let context = &mut self.contexts[self.current_context];
            let last = context.history.last_point;

            if decodable.z {
                let k_bits = (context.ic_dx.k() + context.ic_dy.k()) / 2;
                point.z = context
                    .ic_z
                    .decompress(
                        &mut decoders.z,
                        context.history.last_z[buckets.l],
                        buckets.z_context(k_bits),
                    )
                    .map_err(on_layer(Layer::Z))?;
                context.history.last_z[buckets.l] = point.z;
            }

            if decodable.classification {
                let model_index = buckets.classification_model(last.classification);
                point.classification = decoders
                    .classification
                    .decode_symbol(context.models.classification(model_index))
                    .map_err(on_layer(Layer::Classification))?
                    as u8;
            }

            if decodable.flags {
                let flags = decoders
                    .flags
                    .decode_symbol(context.models.flags(last.flags_symbol()))
                    .map_err(on_layer(Layer::Flags))?;
                point.set_flags_from_symbol(flags);
            }

            if decodable.intensity {
                let intensity_index = (buckets.cpr << 1) | usize::from(gps_time_change);
                point.intensity = context
                    .ic_intensity
                    .decompress(
                        &mut decoders.intensity,
                        i32::from(context.history.last_intensity[intensity_index]),
                        buckets.cpr as u32,
                    )
                    .map_err(on_layer(Layer::Intensity))? as u16;
                context.history.last_intensity[intensity_index] = point.intensity;
            }

            if decodable.scan_angle && changed_values.scan_angle_changed() {
                point.scan_angle = context
                    .ic_scan_angle
                    .decompress(
                        &mut decoders.scan_angle,
                        i32::from(last.scan_angle),
                        u32::from(gps_time_change),
                    )
                    .map_err(on_layer(Layer::ScanAngle))? as i16;
            }

            if decodable.user_data {
                point.user_data = decoders
                    .user_data
                    .decode_symbol(context.models.user_data(last.user_data))
                    .map_err(on_layer(Layer::UserData))? as u8;
            }

            if decodable.point_source && changed_values.point_source_changed() {
                point.point_source_id = context
                    .ic_point_source_id
                    .decompress(
                        &mut decoders.point_source,
                        i32::from(last.point_source_id),
                        0,
                    )
                    .map_err(on_layer(Layer::PointSource))? as u16;
            }

            if decodable.gps_time && gps_time_change {
                let time = context
                    .gps
                    .decompress(&mut decoders.gps_time)
                    .map_err(on_layer(Layer::GpsTime))?;
                point.gps_time = f64::from(time);
            }

            context.history.last_point = point;
            context.history.gps_time_change = gps_time_change;
            Ok(point)
        }

        /// Decodes the changed values, the scanner channel, the returns and X, Y.
        ///
        /// Returns the point being decoded, a copy of the (new) context's last point
        /// with these fields updated.
        fn decompress_channel_returns_xy(&mut self) -> std::io::Result<(ChangedValues, Point14)> {
            let decoder = &mut self.decoders.channel_returns_xy;
            let context = &mut self.contexts[self.current_context];
            let lpr = last_point_return_context(
                &context.history.last_point,
                context.history.gps_time_change,
            );
            let changed_values =
                ChangedValues(decoder.decode_symbol(&mut context.models.changed_values[lpr])?);

            if changed_values.scanner_channel_changed() {
                let diff = decoder.decode_symbol(&mut context.models.scanner_channel)? as usize;
                let scanner_channel = (self.current_context + diff + 1) % NUM_CONTEXTS;
                if self.contexts[scanner_channel].history.unused {
                    let seed = self.contexts[self.current_context].history.last_point;
                    debug!(
                        "Initializing context {} from context {}",
                        scanner_channel, self.current_context
                    );
                    self.contexts[scanner_channel].init_from(&seed);
                }
                self.current_context = scanner_channel;
            }

            let context = &mut self.contexts[self.current_context];
            let mut point = context.history.last_point;
            point.set_scanner_channel(self.current_context as u8);

            let last_n = point.number_of_returns();
            let last_r = point.return_number();

            let n = if changed_values.number_of_returns_changed() {
                decoder.decode_symbol(context.models.number_of_returns(last_n))? as u8
            } else {
                last_n
            };
            point.set_number_of_returns(n);

            let r = match changed_values.return_number_code() {
                0 => last_r,
                1 => (last_r + 1) % 16,
                2 => (last_r + 15) % 16,
                _ => {
                    if changed_values.gps_time_changed() {
                        decoder.decode_symbol(context.models.return_number(last_r))? as u8
                    } else {
                        let symbol =
                            decoder.decode_symbol(&mut context.models.return_number_gps_same)?;
                        return_number_from_gps_same_symbol(symbol, last_r)
                    }
                }
            };
            point.set_return_number(r);

            let buckets = ReturnBuckets::new(n, r);
            let median_index = (buckets.m << 1) | usize::from(changed_values.gps_time_changed());

            let median = context.history.last_x_diff_median5[median_index].get();
            let diff = context
                .ic_dx
                .decompress(decoder, median, buckets.x_context())?;
            point.x = point.x.wrapping_add(diff);
            context.history.last_x_diff_median5[median_index].add(diff);

            let median = context.history.last_y_diff_median5[median_index].get();
            let k_bits = context.ic_dx.k();
            let diff = context
                .ic_dy
                .decompress(decoder, median, buckets.y_context(k_bits))?;
            point.y = point.y.wrapping_add(diff);
            context.history.last_y_diff_median5[median_index].add(diff);

            Ok((changed_values, point))
        }
    }

    impl<R: Read + Seek> LayeredFieldDecompressor<R> for LasPoint14Decompressor {
        fn size_of_field(&self) -> usize {
            Point14::SIZE
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
            src.read_exact(&mut first_point[..Point14::SIZE])?;
            let point = Point14::unpack_from(first_point);
            *context = self.init_with_first_point(&point);
            Ok(())
        }

        fn decompress_field_with(
            &mut self,
            current_point: &mut [u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            let point = self.decompress_point()?;
            point.pack_into(current_point);
            *context = self.current_context;
            Ok(())
        }

        fn read_layers_sizes(&mut self, src: &mut R) -> crate::Result<()> {
            self.layers_sizes = LayerSizes::read_from(src)
                .map_err(|e| LasZipError::corrupt(Layer::ChunkHeader, 0, e))?;
            debug!("point14 layer sizes: {:?}", self.layers_sizes);
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> crate::Result<()> {
            let sizes = self.layers_sizes;
            let selection = self.selection;
            let decoders = &mut self.decoders;
            let load = |layer: Layer,
                        is_requested: bool,
                        num_bytes: u32,
                        decoder: &mut LayerDecoder,
                        src: &mut R|
             -> crate::Result<bool> {
                let decodable =
                    copy_bytes_into_decoder(is_requested, num_bytes as usize, decoder, src)
                        .map_err(|e| LasZipError::corrupt(layer, 0, e))?;
                if !is_requested && num_bytes > 0 {
                    debug!("Skipping the {} layer ({} bytes)", layer, num_bytes);
                }
                Ok(decodable)
            };

            load(
                Layer::ChannelReturnsXY,
                true,
                sizes.channel_returns_xy,
                &mut decoders.channel_returns_xy,
                src,
            )?;
            self.decodable = ChangedLayers {
                z: load(Layer::Z, selection.should_decompress_z(), sizes.z, &mut decoders.z, src)?,
                classification: load(
                    Layer::Classification,
                    selection.should_decompress_classification(),
                    sizes.classification,
                    &mut decoders.classification,
                    src,
                )?,
                flags: load(
                    Layer::Flags,
                    selection.should_decompress_flags(),
                    sizes.flags,
                    &mut decoders.flags,
                    src,
                )?,
                intensity: load(
                    Layer::Intensity,
                    selection.should_decompress_intensity(),
                    sizes.intensity,
                    &mut decoders.intensity,
                    src,
                )?,
                scan_angle: load(
                    Layer::ScanAngle,
                    selection.should_decompress_scan_angle(),
                    sizes.scan_angle,
                    &mut decoders.scan_angle,
                    src,
                )?,
                user_data: load(
                    Layer::UserData,
                    selection.should_decompress_user_data(),
                    sizes.user_data,
                    &mut decoders.user_data,
                    src,
                )?,
                point_source: load(
                    Layer::PointSource,
                    selection.should_decompress_point_source_id(),
                    sizes.point_source,
                    &mut decoders.point_source,
                    src,
                )?,
                gps_time: load(
                    Layer::GpsTime,
                    selection.should_decompress_gps_time(),
                    sizes.gps_time,
                    &mut decoders.gps_time,
                    src,
                )?,
            };
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn point(n: u8, r: u8) -> Point14 {
            let mut p = Point14::default();
            p.set_number_of_returns(n);
            p.set_return_number(r);
            p
        }

        #[test]
        fn return_context_of_last_point() {
            assert_eq!(last_point_return_context(&point(1, 1), false), 3);
            assert_eq!(last_point_return_context(&point(3, 1), false), 1);
            assert_eq!(last_point_return_context(&point(3, 3), true), 6);
            assert_eq!(last_point_return_context(&point(3, 2), true), 4);
        }

        #[test]
        fn identical_points_change_nothing() {
            let mut p = point(2, 1);
            p.x = 17;
            p.gps_time = 3.5;
            assert_eq!(ChangedValues::from_points(&p, &p, false).0, 0);
        }

        #[test]
        fn return_number_codes() {
            let last = point(5, 15);
            assert_eq!(ChangedValues::from_points(&point(5, 0), &last, false).0, 1);
            assert_eq!(ChangedValues::from_points(&point(5, 14), &last, false).0, 2);
            assert_eq!(ChangedValues::from_points(&point(5, 3), &last, false).0, 3);
            assert_eq!(
                ChangedValues::from_points(&point(4, 15), &last, true).0,
                (1 << 6) | (1 << 2)
            );
        }

        #[test]
        fn gps_time_is_compared_bitwise() {
            let mut last = point(1, 1);
            last.gps_time = 0.0;
            let mut current = last;
            current.gps_time = -0.0;
            assert!(ChangedValues::from_points(&current, &last, false).gps_time_changed());
        }

        #[test]
        fn gps_same_return_number_symbols_cover_the_offsets() {
            for last_r in 0..16u8 {
                for r in 0..16u8 {
                    let diff = (i32::from(r) - i32::from(last_r)).rem_euclid(16);
                    if diff <= 1 || diff == 15 {
                        continue;
                    }
                    let symbol = return_number_gps_same_symbol(r, last_r);
                    assert!(symbol < 13, "{} -> {} gave {}", last_r, r, symbol);
                    assert_eq!(return_number_from_gps_same_symbol(symbol, last_r), r);
                }
            }
        }

        #[test]
        fn packed_fields_stay_in_range() {
            let mut p = Point14::default();
            p.set_scanner_channel(7);
            p.set_return_number(0x1F);
            p.set_number_of_returns(0x12);
            p.set_classification_flags(0xFF);
            p.set_edge_of_flight_line(true);
            assert_eq!(p.scanner_channel(), 3);
            assert_eq!(p.return_number(), 15);
            assert_eq!(p.number_of_returns(), 2);
            assert_eq!(p.classification_flags(), 15);
            assert!(!p.scan_direction_flag());
            assert_eq!(p.flags_symbol(), 0x2F);

            let mut bytes = [0u8; Point14::SIZE];
            p.pack_into(&mut bytes);
            assert_eq!(Point14::unpack_from(&bytes), p);
        }
    }
}
