mod common;

/// Compressing with multiple threads gives the same chunks
/// as compressing them one after the other
#[cfg(feature = "parallel")]
#[test]
fn test_par_compress_chunks() {
    use common::{items_of, pack_points, scanner_points};

    let items = items_of(7);
    let bytes = pack_points(7, &scanner_points(77, 2_500));
    let points_per_chunk = 1_000;

    let chunks = laz_layered::par_compress_chunks(&items, &bytes, points_per_chunk).unwrap();
    assert_eq!(chunks.len(), 3);

    let chunk_size_in_bytes = points_per_chunk * 36;
    for (chunk, points) in chunks.iter().zip(bytes.chunks(chunk_size_in_bytes)) {
        assert_eq!(chunk, &laz_layered::compress_chunk(&items, points).unwrap());
    }
}

#[cfg(feature = "parallel")]
#[test]
fn test_par_decompress_chunks() {
    use common::{items_of, pack_points, scanner_points};
    use laz_layered::DecompressionSelection;

    let items = items_of(8);
    let bytes = pack_points(8, &scanner_points(78, 2_100));
    let points_per_chunk = 500;

    let chunks = laz_layered::par_compress_chunks(&items, &bytes, points_per_chunk).unwrap();
    let mut decompressed = vec![0u8; bytes.len()];
    let num_points = laz_layered::par_decompress_chunks(
        &items,
        DecompressionSelection::all(),
        &chunks,
        &mut decompressed,
        points_per_chunk,
    )
    .unwrap();
    assert_eq!(num_points, vec![500, 500, 500, 500, 100]);
    assert_eq!(decompressed, bytes);
}
