//! Record compressors and decompressors, they chain the field codecs
//! of a point record and lay the chunk out.
//!
//! A layered chunk is organized as follow:
//!
//! 1) 1 Raw Point (as per ASPRS LAS definition)
//! 2) Number of points in the chunk
//! 3) Number of bytes for each layer of the chunk
//! 4) Data of the layers

use std::io::{Cursor, Read, Seek, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::errors::{LasZipError, Layer};
use crate::las::laszip::{point_size_of, LazItem, LazItemType, LAYERED_VERSION};
use crate::las::point14::v3::{LasPoint14Compressor, LasPoint14Decompressor};
use crate::las::rgb::v3::{LasRGBCompressor, LasRGBDecompressor};
use crate::las::rgbnir::v3::{LasRGBNIRCompressor, LasRGBNIRDecompressor};
use crate::las::selective::DecompressionSelection;

/***************************************************************************************************
                    Decompression Related Traits
***************************************************************************************************/

/// Decompressor of one field (item) of a point record coded in layers.
///
/// The `context` is decided by the first field (the point14) and followed by the others.
pub trait LayeredFieldDecompressor<R: Read + Seek> {
    fn size_of_field(&self) -> usize;

    /// Selects the layers to decompress, applied when the layers are read
    fn set_selection(&mut self, _selection: DecompressionSelection) {}

    fn init_first_point(
        &mut self,
        src: &mut R,
        first_point: &mut [u8],
        context: &mut usize,
    ) -> crate::Result<()>;

    fn decompress_field_with(
        &mut self,
        current_point: &mut [u8],
        context: &mut usize,
    ) -> crate::Result<()>;

    fn read_layers_sizes(&mut self, src: &mut R) -> crate::Result<()>;
    fn read_layers(&mut self, src: &mut R) -> crate::Result<()>;
}

/***************************************************************************************************
                    Compression related Traits
***************************************************************************************************/

pub trait LayeredFieldCompressor<W: Write> {
    fn size_of_field(&self) -> usize;

    fn init_first_point(
        &mut self,
        dst: &mut W,
        first_point: &[u8],
        context: &mut usize,
    ) -> crate::Result<()>;

    fn compress_field_with(&mut self, current_point: &[u8], context: &mut usize)
        -> crate::Result<()>;

    fn write_layers_sizes(&mut self, dst: &mut W) -> crate::Result<()>;
    fn write_layers(&mut self, dst: &mut W) -> crate::Result<()>;
}

fn check_layered_version(item: &LazItem) -> crate::Result<()> {
    if item.version() == LAYERED_VERSION {
        Ok(())
    } else {
        Err(LasZipError::UnsupportedLazItemVersion(
            item.item_type(),
            item.version(),
        ))
    }
}

/***************************************************************************************************
                    Record Decompressors implementations
***************************************************************************************************/

/// LayeredPointRecordDecompressor decompresses a chunk using LayeredFieldDecompressors.
pub struct LayeredPointRecordDecompressor<R: Read + Seek> {
    field_decompressors: Vec<Box<dyn LayeredFieldDecompressor<R>>>,
    input: R,
    is_first_decompression: bool,
    poisoned: bool,
    record_size: usize,
    context: usize,
    selection: DecompressionSelection,
    chunk_point_count: u32,
    // the record being decoded, copied to the caller once every field succeeded
    record: Vec<u8>,
}

impl<R: Read + Seek> LayeredPointRecordDecompressor<R> {
    pub fn new(input: R) -> Self {
        Self {
            field_decompressors: vec![],
            input,
            is_first_decompression: true,
            poisoned: false,
            record_size: 0,
            context: 0,
            selection: DecompressionSelection::all(),
            chunk_point_count: 0,
            record: vec![],
        }
    }

    pub fn add_field_decompressor<T: 'static + LayeredFieldDecompressor<R>>(&mut self, mut field: T) {
        field.set_selection(self.selection);
        self.record_size += field.size_of_field();
        self.record.resize(self.record_size, 0);
        self.field_decompressors.push(Box::new(field));
    }

    /// Builds the decompressors of the items, in their order
    pub fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        for item in laz_items {
            check_layered_version(item)?;
            match item.item_type() {
                LazItemType::Point14 => {
                    self.add_field_decompressor(LasPoint14Decompressor::default())
                }
                LazItemType::RGB14 => self.add_field_decompressor(LasRGBDecompressor::default()),
                LazItemType::RGBNIR14 => {
                    self.add_field_decompressor(LasRGBNIRDecompressor::default())
                }
            }
        }
        Ok(())
    }

    /// The selection only takes effect when the layers of the next chunk are read
    pub fn set_selection(&mut self, selection: DecompressionSelection) {
        self.selection = selection;
        for field in &mut self.field_decompressors {
            field.set_selection(selection);
        }
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Number of points of the chunk, known once the first point is decompressed
    pub fn chunk_point_count(&self) -> u32 {
        self.chunk_point_count
    }

    /// Decompresses the next point of the chunk into `out`.
    ///
    /// `out` is only written when every field of the point was decoded.
    /// Once a point failed to decompress, the following calls fail with
    /// [`LasZipError::DecompressorPoisoned`] until [`reset`](Self::reset) is called.
    pub fn decompress_next(&mut self, out: &mut [u8]) -> crate::Result<()> {
        if self.poisoned {
            return Err(LasZipError::DecompressorPoisoned);
        }
        if out.len() < self.record_size {
            return Err(LasZipError::BufferLenNotMultipleOfPointSize {
                buffer_len: out.len(),
                point_size: self.record_size,
            });
        }
        let mut record = std::mem::take(&mut self.record);
        let mut context = self.context;
        let result = if self.is_first_decompression {
            self.decompress_first(&mut record, &mut context)
        } else {
            self.decompress_following(&mut record, &mut context)
        };
        match result {
            Ok(()) => {
                out[..self.record_size].copy_from_slice(&record);
                self.context = context;
            }
            Err(_) => self.poisoned = true,
        }
        self.record = record;
        result
    }

    fn decompress_first(&mut self, record: &mut [u8], context: &mut usize) -> crate::Result<()> {
        let mut field_start = 0;
        for field in &mut self.field_decompressors {
            let field_end = field_start + field.size_of_field();
            field
                .init_first_point(&mut self.input, &mut record[field_start..field_end], context)
                .map_err(|e| match e {
                    LasZipError::IoError(e) => LasZipError::corrupt(Layer::ChunkHeader, 0, e),
                    e => e,
                })?;
            field_start = field_end;
        }

        self.chunk_point_count = self
            .input
            .read_u32::<LittleEndian>()
            .map_err(|e| LasZipError::corrupt(Layer::ChunkHeader, 0, e))?;
        debug!("Decompressing a chunk of {} points", self.chunk_point_count);
        for field in &mut self.field_decompressors {
            field.read_layers_sizes(&mut self.input)?;
        }
        for field in &mut self.field_decompressors {
            field.read_layers(&mut self.input)?;
        }
        self.is_first_decompression = false;
        Ok(())
    }

    fn decompress_following(
        &mut self,
        record: &mut [u8],
        context: &mut usize,
    ) -> crate::Result<()> {
        let mut field_start = 0;
        for field in &mut self.field_decompressors {
            let field_end = field_start + field.size_of_field();
            field.decompress_field_with(&mut record[field_start..field_end], context)?;
            field_start = field_end;
        }
        Ok(())
    }

    /// Prepares the decompression of a new chunk, the field decompressors are kept
    pub fn reset(&mut self) {
        self.is_first_decompression = true;
        self.poisoned = false;
        self.context = 0;
        self.chunk_point_count = 0;
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.input
    }

    pub fn into_inner(self) -> R {
        self.input
    }
}

/***************************************************************************************************
                    Record Compressors implementations
***************************************************************************************************/

/// LayeredPointRecordCompressor compresses a chunk using LayeredFieldCompressors.
pub struct LayeredPointRecordCompressor<W: Write> {
    field_compressors: Vec<Box<dyn LayeredFieldCompressor<W>>>,
    point_size: usize,
    point_count: u32,
    context: usize,
    dst: W,
}

impl<W: Write> LayeredPointRecordCompressor<W> {
    pub fn new(dst: W) -> Self {
        Self {
            field_compressors: vec![],
            point_size: 0,
            point_count: 0,
            context: 0,
            dst,
        }
    }

    pub fn add_field_compressor<T: 'static + LayeredFieldCompressor<W>>(&mut self, field: T) {
        self.point_size += field.size_of_field();
        self.field_compressors.push(Box::new(field));
    }

    /// Builds the compressors of the items, in their order
    pub fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        for item in laz_items {
            check_layered_version(item)?;
            match item.item_type() {
                LazItemType::Point14 => self.add_field_compressor(LasPoint14Compressor::default()),
                LazItemType::RGB14 => self.add_field_compressor(LasRGBCompressor::default()),
                LazItemType::RGBNIR14 => {
                    self.add_field_compressor(LasRGBNIRCompressor::default())
                }
            }
        }
        Ok(())
    }

    pub fn record_size(&self) -> usize {
        self.point_size
    }

    pub fn compress_next(&mut self, point: &[u8]) -> crate::Result<()> {
        if point.len() < self.point_size {
            return Err(LasZipError::BufferLenNotMultipleOfPointSize {
                buffer_len: point.len(),
                point_size: self.point_size,
            });
        }
        let mut field_start = 0;
        if self.point_count == 0 {
            for compressor in &mut self.field_compressors {
                let field_end = field_start + compressor.size_of_field();
                compressor.init_first_point(
                    &mut self.dst,
                    &point[field_start..field_end],
                    &mut self.context,
                )?;
                field_start = field_end;
            }
        } else {
            for compressor in &mut self.field_compressors {
                let field_end = field_start + compressor.size_of_field();
                compressor.compress_field_with(&point[field_start..field_end], &mut self.context)?;
                field_start = field_end;
            }
        }
        self.point_count += 1;
        Ok(())
    }

    /// Writes the point count, the layers sizes and the layers, nothing if no point
    /// was compressed
    pub fn done(&mut self) -> crate::Result<()> {
        if self.point_count > 0 {
            debug!("Compressed a chunk of {} points", self.point_count);
            self.dst.write_u32::<LittleEndian>(self.point_count)?;
            for compressor in &mut self.field_compressors {
                compressor.write_layers_sizes(&mut self.dst)?;
            }
            for compressor in &mut self.field_compressors {
                compressor.write_layers(&mut self.dst)?;
            }
        }
        Ok(())
    }

    /// Prepares the compression of a new chunk, the field compressors are kept
    pub fn reset(&mut self) {
        self.point_count = 0;
        self.context = 0;
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.dst
    }

    pub fn into_inner(self) -> W {
        self.dst
    }
}

/***************************************************************************************************
                    In memory chunks
***************************************************************************************************/

fn check_buffer_len(buffer_len: usize, point_size: usize) -> crate::Result<()> {
    if point_size == 0 || buffer_len % point_size != 0 {
        Err(LasZipError::BufferLenNotMultipleOfPointSize {
            buffer_len,
            point_size,
        })
    } else {
        Ok(())
    }
}

/// Compresses the points as one chunk and returns the chunk bytes
pub fn compress_chunk(laz_items: &[LazItem], points: &[u8]) -> crate::Result<Vec<u8>> {
    let point_size = point_size_of(laz_items);
    check_buffer_len(points.len(), point_size)?;

    let mut compressor = LayeredPointRecordCompressor::new(Cursor::new(Vec::<u8>::new()));
    compressor.set_fields_from(laz_items)?;
    for point in points.chunks_exact(point_size) {
        compressor.compress_next(point)?;
    }
    compressor.done()?;
    Ok(compressor.into_inner().into_inner())
}

/// Decompresses the points of one chunk into `out`.
///
/// Stops when `out` is full or when all the points of the chunk are decompressed,
/// and returns the number of points decompressed.
pub fn decompress_chunk(
    laz_items: &[LazItem],
    selection: DecompressionSelection,
    data: &[u8],
    out: &mut [u8],
) -> crate::Result<usize> {
    let point_size = point_size_of(laz_items);
    check_buffer_len(out.len(), point_size)?;
    if out.is_empty() {
        return Ok(0);
    }

    let mut decompressor = LayeredPointRecordDecompressor::new(Cursor::new(data));
    decompressor.set_selection(selection);
    decompressor.set_fields_from(laz_items)?;

    let mut points = out.chunks_exact_mut(point_size);
    let mut num_decompressed = 0usize;
    if let Some(first) = points.next() {
        decompressor.decompress_next(first)?;
        num_decompressed += 1;
    }
    let remaining = (decompressor.chunk_point_count() as usize).saturating_sub(1);
    for point in points.take(remaining) {
        decompressor.decompress_next(point)?;
        num_decompressed += 1;
    }
    Ok(num_decompressed)
}

/// Compresses the points in chunks of `points_per_chunk` points, using multiple threads.
///
/// # Note
///
/// Chunk order [is conserved](https://github.com/rayon-rs/rayon/issues/551)
#[cfg(feature = "parallel")]
pub fn par_compress_chunks(
    laz_items: &[LazItem],
    points: &[u8],
    points_per_chunk: usize,
) -> crate::Result<Vec<Vec<u8>>> {
    use rayon::iter::{IntoParallelIterator, ParallelIterator};

    let point_size = point_size_of(laz_items);
    check_buffer_len(points.len(), point_size)?;
    let chunk_size_in_bytes = points_per_chunk.max(1) * point_size;

    // The last chunk may not have the same size,
    // the chunks() method takes care of that for us
    let all_slices = points.chunks(chunk_size_in_bytes).collect::<Vec<_>>();
    all_slices
        .into_par_iter()
        .map(|points| compress_chunk(laz_items, points))
        .collect()
}

/// Decompresses the chunks using multiple threads, chunk `i` is decompressed into
/// the `i`-th group of `points_per_chunk` points of `out`.
///
/// Returns the number of points decompressed in each chunk.
#[cfg(feature = "parallel")]
pub fn par_decompress_chunks<C: AsRef<[u8]> + Sync>(
    laz_items: &[LazItem],
    selection: DecompressionSelection,
    chunks: &[C],
    out: &mut [u8],
    points_per_chunk: usize,
) -> crate::Result<Vec<usize>> {
    use rayon::iter::{IntoParallelIterator, ParallelIterator};

    let point_size = point_size_of(laz_items);
    check_buffer_len(out.len(), point_size)?;
    let chunk_size_in_bytes = points_per_chunk.max(1) * point_size;

    let decompression_jobs: Vec<(&C, &mut [u8])> =
        chunks.iter().zip(out.chunks_mut(chunk_size_in_bytes)).collect();
    decompression_jobs
        .into_par_iter()
        .map(|(chunk, out)| decompress_chunk(laz_items, selection, chunk.as_ref(), out))
        .collect()
}
