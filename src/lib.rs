//! Layered (version 3) LASzip compression of the points of the LAS point formats 6, 7 and 8.
//!
//! Each chunk of points is split in layers, one independently arithmetic-coded
//! byte stream per group of fields, so that a reader can skip the fields it has no use for.
//! The points of the different scanner channels are predicted from separate contexts.
//!
//! [`compress_chunk`] and [`decompress_chunk`] work on whole chunks held in memory,
//! the [`LayeredPointRecordCompressor`] and [`LayeredPointRecordDecompressor`] they are
//! built on work point by point over any stream.
//!
//! # Examples
//!
//! ```
//! use laz_layered::packers::Packable;
//! use laz_layered::{
//!     compress_chunk, decompress_chunk, DecompressionSelection, LasZipError,
//!     LazItemRecordBuilder, Point14,
//! };
//!
//! # fn main() -> Result<(), LasZipError> {
//! let items = LazItemRecordBuilder::default_for_point_format_id(6)?;
//!
//! let mut points = vec![0u8; 2 * Point14::SIZE];
//! let mut point = Point14::default();
//! point.x = 10;
//! point.set_return_number(1);
//! point.set_number_of_returns(1);
//! point.pack_into(&mut points[..Point14::SIZE]);
//! point.x = 12;
//! point.gps_time = 1.5;
//! point.pack_into(&mut points[Point14::SIZE..]);
//!
//! let compressed = compress_chunk(&items, &points)?;
//!
//! let mut decompressed = vec![0u8; points.len()];
//! let num_points = decompress_chunk(
//!     &items,
//!     DecompressionSelection::all(),
//!     &compressed,
//!     &mut decompressed,
//! )?;
//! assert_eq!(num_points, 2);
//! assert_eq!(decompressed, points);
//! # Ok(())
//! # }
//! ```
//!
//! Only the z and the gps time of the points are decompressed here,
//! the other skipped fields keep the value of the first point.
//!
//! ```
//! # use laz_layered::{compress_chunk, decompress_chunk, DecompressionSelection, LazItemRecordBuilder};
//! # fn main() -> Result<(), laz_layered::LasZipError> {
//! # let items = LazItemRecordBuilder::default_for_point_format_id(7)?;
//! # let points = vec![0u8; 36 * 3];
//! # let compressed = compress_chunk(&items, &points)?;
//! let selection = DecompressionSelection::base().decompress_gps_time();
//! let mut decompressed = vec![0u8; 36 * 3];
//! decompress_chunk(&items, selection, &compressed, &mut decompressed)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Parallelism
//!
//! This crate has an optional feature 'parallel'.
//! When using this feature, additional `par_` functions are exposed.
//!
//! - [`par_compress_chunks`]
//! - [`par_decompress_chunks`]
//!
//! [`par_compress_chunks`]: record/fn.par_compress_chunks.html
//! [`par_decompress_chunks`]: record/fn.par_decompress_chunks.html

pub(crate) mod compressors;
pub(crate) mod decoders;
pub(crate) mod decompressors;
pub(crate) mod encoders;
pub(crate) mod models;

pub mod errors;
pub mod las;
pub mod packers;
pub mod record;

pub use errors::{LasZipError, Layer, Result};
pub use las::laszip::{
    point_size_of, read_laz_items_from, write_laz_items_to, LazItem, LazItemRecordBuilder,
    LazItemType,
};
pub use las::nir::Nir;
pub use las::point14::Point14;
pub use las::rgb::RGB;
pub use las::rgbnir::RGBNIR;
pub use las::selective::DecompressionSelection;
#[cfg(feature = "parallel")]
pub use record::{par_compress_chunks, par_decompress_chunks};
pub use record::{
    compress_chunk, decompress_chunk, LayeredPointRecordCompressor,
    LayeredPointRecordDecompressor,
};
