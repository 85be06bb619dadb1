pub mod gps;
pub mod laszip;
pub mod nir;
pub mod point14;
pub mod rgb;
pub mod rgbnir;
pub mod selective;

mod utils;

pub mod v3 {
    pub use crate::las::point14::v3::{LasPoint14Compressor, LasPoint14Decompressor};
    pub use crate::las::rgb::v3::{LasRGBCompressor, LasRGBDecompressor};
    pub use crate::las::rgbnir::v3::{LasRGBNIRCompressor, LasRGBNIRDecompressor};
}
