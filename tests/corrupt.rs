mod common;

use std::io::Cursor;

use common::{init_logging, items_of, pack_points, point_size_of_format, scanner_points};
use laz_layered::{
    compress_chunk, decompress_chunk, DecompressionSelection, LasZipError, Layer,
    LayeredPointRecordDecompressor,
};

fn failing_layer(point_format_id: u8, compressed: &[u8], num_points: usize) -> (Layer, u64) {
    let items = items_of(point_format_id);
    let mut out = vec![0u8; num_points * point_size_of_format(point_format_id)];
    match decompress_chunk(&items, DecompressionSelection::all(), compressed, &mut out) {
        Err(LasZipError::CorruptPointStream {
            layer, point_index, ..
        }) => (layer, point_index),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("the decompression of a truncated chunk succeeded"),
    }
}

#[test]
fn test_truncated_chunks_name_the_layer() {
    init_logging();
    let points = scanner_points(64, 500);
    let compressed = compress_chunk(&items_of(7), &pack_points(7, &points)).unwrap();
    let point_size = point_size_of_format(7);

    // in the first raw point
    assert_eq!(
        failing_layer(7, &compressed[..point_size - 3], points.len()),
        (Layer::ChunkHeader, 0)
    );
    // in the number of points
    assert_eq!(
        failing_layer(7, &compressed[..point_size + 2], points.len()),
        (Layer::ChunkHeader, 0)
    );
    // in the layers sizes
    assert_eq!(
        failing_layer(7, &compressed[..point_size + 4 + 17], points.len()),
        (Layer::ChunkHeader, 0)
    );
    // the RGB layer is the last one of the chunk
    assert_eq!(
        failing_layer(7, &compressed[..compressed.len() - 1], points.len()),
        (Layer::Rgb, 0)
    );

    let compressed = compress_chunk(&items_of(6), &pack_points(6, &points)).unwrap();
    let (layer, _) = failing_layer(6, &compressed[..compressed.len() - 1], points.len());
    assert_eq!(layer, Layer::GpsTime);
    let message = LasZipError::CorruptPointStream {
        layer,
        point_index: 0,
        source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"),
    }
    .to_string();
    assert!(message.contains("gps_time"));
}

#[test]
fn test_poisoned_decompressor_can_be_reset() {
    let items = items_of(8);
    let point_size = point_size_of_format(8);
    let bytes = pack_points(8, &scanner_points(3, 200));
    let compressed = compress_chunk(&items, &bytes).unwrap();

    let truncated = compressed[..compressed.len() / 2].to_vec();
    let mut decompressor = LayeredPointRecordDecompressor::new(Cursor::new(truncated));
    decompressor.set_fields_from(&items).unwrap();

    let mut point = vec![0u8; point_size];
    assert!(matches!(
        decompressor.decompress_next(&mut point),
        Err(LasZipError::CorruptPointStream { .. })
    ));
    for _ in 0..3 {
        assert!(matches!(
            decompressor.decompress_next(&mut point),
            Err(LasZipError::DecompressorPoisoned)
        ));
    }

    *decompressor.get_mut() = Cursor::new(compressed);
    decompressor.reset();
    let mut decompressed = vec![0u8; bytes.len()];
    for point in decompressed.chunks_exact_mut(point_size) {
        decompressor.decompress_next(point).unwrap();
    }
    assert_eq!(decompressed, bytes);
}

#[test]
fn test_failed_point_leaves_the_output_untouched() {
    init_logging();
    let items = items_of(7);
    let point_size = point_size_of_format(7);
    let points = scanner_points(21, 500);
    let mut compressed = compress_chunk(&items, &pack_points(7, &points)).unwrap();

    // halve the RGB layer, the last one of the chunk, and patch its size
    let rgb_size_start = point_size + 4 + 9 * 4;
    let mut rgb_size = [0u8; 4];
    rgb_size.copy_from_slice(&compressed[rgb_size_start..rgb_size_start + 4]);
    let rgb_size = u32::from_le_bytes(rgb_size) as usize;
    assert!(rgb_size > 16);
    let kept = rgb_size / 2;
    compressed[rgb_size_start..rgb_size_start + 4].copy_from_slice(&(kept as u32).to_le_bytes());
    let new_len = compressed.len() - (rgb_size - kept);
    compressed.truncate(new_len);

    let mut decompressor = LayeredPointRecordDecompressor::new(Cursor::new(compressed));
    decompressor.set_fields_from(&items).unwrap();

    let mut out = vec![0xAAu8; point_size];
    let mut failed_at = None;
    for i in 0..points.len() {
        out.iter_mut().for_each(|byte| *byte = 0xAA);
        match decompressor.decompress_next(&mut out) {
            Ok(()) => continue,
            Err(LasZipError::CorruptPointStream {
                layer, point_index, ..
            }) => {
                assert_eq!(layer, Layer::Rgb);
                assert_eq!(point_index, i as u64);
                failed_at = Some(i);
                break;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    let failed_at = failed_at.expect("the decompression of a halved layer succeeded");
    assert!(failed_at > 0);
    assert!(out.iter().all(|byte| *byte == 0xAA));

    for _ in 0..2 {
        assert!(matches!(
            decompressor.decompress_next(&mut out),
            Err(LasZipError::DecompressorPoisoned)
        ));
        assert!(out.iter().all(|byte| *byte == 0xAA));
    }
}

#[test]
fn test_unsupported_items() {
    use laz_layered::{LazItem, LazItemType};

    let items = vec![
        LazItem::new(LazItemType::Point14, 3),
        LazItem::new(LazItemType::RGB14, 2),
    ];
    let mut out = vec![0u8; 36];
    assert!(matches!(
        decompress_chunk(&items, DecompressionSelection::all(), &[0u8; 100], &mut out),
        Err(LasZipError::UnsupportedLazItemVersion(LazItemType::RGB14, 2))
    ));
    assert!(matches!(
        compress_chunk(&items, &[0u8; 36]),
        Err(LasZipError::UnsupportedLazItemVersion(LazItemType::RGB14, 2))
    ));
}
