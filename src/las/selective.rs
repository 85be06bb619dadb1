//! Selection of the layers to decompress

/// Mask of the layers a decompressor decodes, the others are skipped
/// without being decoded.
///
/// The bit values are the ones of LASzip's `LASZIP_DECOMPRESS_SELECTIVE_*`,
/// the X, Y, returns and scanner channel layer is always decompressed.
///
/// A skipped field keeps the value it had in the first point of the chunk.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct DecompressionSelection(pub u32);

macro_rules! decompress_setter {
    (
        $fn_name:ident = $bit_mask:expr
    ) => {
        pub fn $fn_name(self) -> Self {
            self.set($bit_mask)
        }
    };
}

macro_rules! skip_setter {
    (
        $fn_name:ident = $bit_mask:expr
    ) => {
        pub fn $fn_name(self) -> Self {
            self.unset($bit_mask)
        }
    };
}

macro_rules! accessor {
    (
        $fn_name:ident = $bit_mask:expr
    ) => {
        pub fn $fn_name(self) -> bool {
            self.is_set($bit_mask)
        }
    };
}

impl DecompressionSelection {
    pub const ALL: u32 = u32::MAX;

    pub const CHANNEL_RETURNS_XY: u32 = 0;
    pub const Z: u32 = 0x0000_0001;
    pub const CLASSIFICATION: u32 = 0x0000_0002;
    pub const FLAGS: u32 = 0x0000_0004;
    pub const INTENSITY: u32 = 0x0000_0008;
    pub const SCAN_ANGLE: u32 = 0x0000_0010;
    pub const USER_DATA: u32 = 0x0000_0020;
    pub const POINT_SOURCE_ID: u32 = 0x0000_0040;
    pub const GPS_TIME: u32 = 0x0000_0080;
    pub const RGB: u32 = 0x0000_0100;
    pub const NIR: u32 = 0x0000_0200;
    pub const WAVEPACKET: u32 = 0x0000_0400;
    /// Bit of the first extra bytes layer, the following ones are the next 7 bits
    pub const EXTRA_BYTES_0: u32 = 0x0001_0000;
    pub const ALL_EXTRA_BYTES: u32 = 0x00FF_0000;

    pub const NUM_EXTRA_BYTES_LAYERS: usize = 8;

    /// To decompress all the possible fields
    pub fn all() -> Self {
        Self(Self::ALL)
    }

    /// To decompress only the layer that is always decompressed:
    ///
    /// - x, y
    /// - return number, number of returns
    /// - scanner channel
    pub fn base() -> Self {
        Self(Self::CHANNEL_RETURNS_XY)
    }

    decompress_setter!(decompress_z = Self::Z);
    decompress_setter!(decompress_classification = Self::CLASSIFICATION);
    decompress_setter!(decompress_flags = Self::FLAGS);
    decompress_setter!(decompress_intensity = Self::INTENSITY);
    decompress_setter!(decompress_scan_angle = Self::SCAN_ANGLE);
    decompress_setter!(decompress_user_data = Self::USER_DATA);
    decompress_setter!(decompress_point_source_id = Self::POINT_SOURCE_ID);
    decompress_setter!(decompress_gps_time = Self::GPS_TIME);
    decompress_setter!(decompress_rgb = Self::RGB);
    decompress_setter!(decompress_nir = Self::NIR);
    decompress_setter!(decompress_wavepacket = Self::WAVEPACKET);
    decompress_setter!(decompress_all_extra_bytes = Self::ALL_EXTRA_BYTES);

    skip_setter!(skip_z = Self::Z);
    skip_setter!(skip_classification = Self::CLASSIFICATION);
    skip_setter!(skip_flags = Self::FLAGS);
    skip_setter!(skip_intensity = Self::INTENSITY);
    skip_setter!(skip_scan_angle = Self::SCAN_ANGLE);
    skip_setter!(skip_user_data = Self::USER_DATA);
    skip_setter!(skip_point_source_id = Self::POINT_SOURCE_ID);
    skip_setter!(skip_gps_time = Self::GPS_TIME);
    skip_setter!(skip_rgb = Self::RGB);
    skip_setter!(skip_nir = Self::NIR);
    skip_setter!(skip_wavepacket = Self::WAVEPACKET);
    skip_setter!(skip_all_extra_bytes = Self::ALL_EXTRA_BYTES);

    accessor!(should_decompress_z = Self::Z);
    accessor!(should_decompress_classification = Self::CLASSIFICATION);
    accessor!(should_decompress_flags = Self::FLAGS);
    accessor!(should_decompress_intensity = Self::INTENSITY);
    accessor!(should_decompress_scan_angle = Self::SCAN_ANGLE);
    accessor!(should_decompress_user_data = Self::USER_DATA);
    accessor!(should_decompress_point_source_id = Self::POINT_SOURCE_ID);
    accessor!(should_decompress_gps_time = Self::GPS_TIME);
    accessor!(should_decompress_rgb = Self::RGB);
    accessor!(should_decompress_nir = Self::NIR);
    accessor!(should_decompress_wavepacket = Self::WAVEPACKET);

    /// # Panics
    ///
    /// If `index` is not less than [`Self::NUM_EXTRA_BYTES_LAYERS`]
    pub fn decompress_extra_bytes(self, index: usize) -> Self {
        self.set(Self::extra_bytes_bit(index))
    }

    /// # Panics
    ///
    /// If `index` is not less than [`Self::NUM_EXTRA_BYTES_LAYERS`]
    pub fn skip_extra_bytes(self, index: usize) -> Self {
        self.unset(Self::extra_bytes_bit(index))
    }

    /// Extra bytes layers past the 8th share the bit of the 8th
    pub fn should_decompress_extra_bytes(self, index: usize) -> bool {
        let index = index.min(Self::NUM_EXTRA_BYTES_LAYERS - 1);
        self.is_set(Self::extra_bytes_bit(index))
    }

    fn extra_bytes_bit(index: usize) -> u32 {
        assert!(
            index < Self::NUM_EXTRA_BYTES_LAYERS,
            "extra bytes layer index out of range: {}",
            index
        );
        Self::EXTRA_BYTES_0 << index
    }

    fn set(self, bit_mask: u32) -> Self {
        Self(self.0 | bit_mask)
    }

    fn unset(self, bit_mask: u32) -> Self {
        Self(self.0 & (!bit_mask))
    }

    fn is_set(self, bit_mask: u32) -> bool {
        (self.0 & bit_mask) != 0
    }
}

impl Default for DecompressionSelection {
    fn default() -> Self {
        Self::all()
    }
}
