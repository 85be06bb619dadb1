//! Definitions of error related things.

use std::fmt;

use thiserror::Error;

use crate::las::laszip::LazItemType;

/// Independently coded byte stream of a layered chunk
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Layer {
    /// Raw first point, count of points and layer sizes preceding the layers data
    ChunkHeader,
    ChannelReturnsXY,
    Z,
    Classification,
    Flags,
    Intensity,
    ScanAngle,
    UserData,
    PointSource,
    GpsTime,
    Rgb,
    Nir,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Layer::ChunkHeader => "chunk header",
            Layer::ChannelReturnsXY => "channel_returns_XY",
            Layer::Z => "Z",
            Layer::Classification => "classification",
            Layer::Flags => "flags",
            Layer::Intensity => "intensity",
            Layer::ScanAngle => "scan_angle",
            Layer::UserData => "user_data",
            Layer::PointSource => "point_source",
            Layer::GpsTime => "gps_time",
            Layer::Rgb => "RGB",
            Layer::Nir => "NIR",
        };
        f.write_str(name)
    }
}

/// Errors of this crate
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LasZipError {
    /// The Laz item it not known
    #[error("Item with type code: {0} is unknown")]
    UnknownLazItem(u16),
    /// The compression version used for the item is not supported
    #[error("Item {0:?} with compression version: {1} is not supported")]
    UnsupportedLazItemVersion(LazItemType, u16),
    /// The point format has no layered compression
    #[error("Point format {0} is not supported")]
    UnsupportedPointFormat(u8),
    #[error("The len of the buffer ({buffer_len}) is not a multiple of the point size {point_size}")]
    BufferLenNotMultipleOfPointSize { buffer_len: usize, point_size: usize },
    /// The compressed data is truncated, corrupted or was
    /// not produced by a compatible compressor.
    #[error("Corrupt or incompatible compressed point stream: layer {layer}, point {point_index}: {source}")]
    CorruptPointStream {
        layer: Layer,
        /// Index of the point in its chunk, the raw first point being 0
        point_index: u64,
        #[source]
        source: std::io::Error,
    },
    /// A previous decompression failed, the prediction state can't be trusted anymore
    #[error("The decompressor failed on a previous point and must be reset")]
    DecompressorPoisoned,
    /// Wrapper around and io error from the std lib
    #[error("IoError: {0}")]
    IoError(#[from] std::io::Error),
}

impl LasZipError {
    pub(crate) fn corrupt(layer: Layer, point_index: u64, source: std::io::Error) -> Self {
        LasZipError::CorruptPointStream {
            layer,
            point_index,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LasZipError>;
