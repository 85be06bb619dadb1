mod common;

use std::io::Cursor;

use common::{
    init_logging, items_of, make_point, pack_points, point_size_of_format, scanner_points,
    unpack_points, TestPoint,
};
use laz_layered::{
    compress_chunk, decompress_chunk, DecompressionSelection, LayeredPointRecordCompressor,
    LayeredPointRecordDecompressor, Nir, Point14, RGB,
};

fn round_trip(point_format_id: u8, points: &[TestPoint]) -> Vec<u8> {
    let items = items_of(point_format_id);
    let bytes = pack_points(point_format_id, points);
    let compressed = compress_chunk(&items, &bytes).unwrap();

    let mut decompressed = vec![0u8; bytes.len()];
    let num_points = decompress_chunk(
        &items,
        DecompressionSelection::all(),
        &compressed,
        &mut decompressed,
    )
    .unwrap();
    assert_eq!(num_points, points.len());
    assert_eq!(
        unpack_points(point_format_id, &decompressed),
        unpack_points(point_format_id, &bytes)
    );
    assert_eq!(decompressed, bytes);
    compressed
}

fn with_default_colors(points: Vec<Point14>) -> Vec<TestPoint> {
    points
        .into_iter()
        .map(|point| TestPoint {
            point,
            rgb: RGB::default(),
            nir: Nir::default(),
        })
        .collect()
}

/// Reads the 9 point14 layers sizes of a chunk
fn point14_layers_sizes(chunk: &[u8], point_size: usize) -> Vec<u32> {
    let start = point_size + 4;
    chunk[start..start + 9 * 4]
        .chunks_exact(4)
        .map(|size| u32::from_le_bytes([size[0], size[1], size[2], size[3]]))
        .collect()
}

#[test]
fn test_point_format_6_four_channels() {
    init_logging();
    let points = scanner_points(42, 10_000);
    let channels: Vec<u8> = points.iter().map(|p| p.point.scanner_channel()).collect();
    for channel in 0..4 {
        assert!(channels.contains(&channel));
    }
    round_trip(6, &points);
}

#[test]
fn test_point_format_7_four_channels() {
    init_logging();
    round_trip(7, &scanner_points(7, 5_000));
}

#[test]
fn test_point_format_8_four_channels() {
    init_logging();
    round_trip(8, &scanner_points(8, 5_000));
}

#[test]
fn test_single_point_chunk() {
    let points = scanner_points(1, 1);
    let compressed = round_trip(7, &points);
    let point_size = point_size_of_format(7);
    assert_eq!(
        u32::from_le_bytes([
            compressed[point_size],
            compressed[point_size + 1],
            compressed[point_size + 2],
            compressed[point_size + 3]
        ]),
        1
    );
    let sizes = point14_layers_sizes(&compressed, point_size);
    assert!(sizes[0] > 0);
    assert!(sizes[1] > 0);
    assert!(sizes[2..].iter().all(|size| *size == 0), "{:?}", sizes);

    let rgb_size_start = point_size + 4 + 9 * 4;
    assert_eq!(&compressed[rgb_size_start..rgb_size_start + 4], &[0, 0, 0, 0]);
    assert_eq!(
        compressed.len(),
        rgb_size_start + 4 + (sizes[0] + sizes[1]) as usize
    );
}

#[test]
fn test_duplicated_points_only_write_mandatory_layers() {
    init_logging();
    let mut point = make_point(10, 20, 30, 1234.5, 2);
    point.intensity = 300;
    point.classification = 2;
    point.user_data = 8;
    point.scan_angle = -200;
    point.point_source_id = 5;
    let mut points = with_default_colors(vec![point; 50]);
    for p in &mut points {
        p.rgb = RGB {
            red: 7,
            green: 7,
            blue: 7,
        };
    }

    let compressed = round_trip(7, &points);
    let sizes = point14_layers_sizes(&compressed, point_size_of_format(7));
    assert!(sizes[0] > 0, "the channel_returns_XY layer is always written");
    assert!(sizes[1] > 0, "the Z layer is always written");
    assert!(sizes[2..].iter().all(|size| *size == 0), "{:?}", sizes);

    let rgb_size_start = point_size_of_format(7) + 4 + 9 * 4;
    assert_eq!(&compressed[rgb_size_start..rgb_size_start + 4], &[0, 0, 0, 0]);
    assert_eq!(
        compressed.len(),
        rgb_size_start + 4 + (sizes[0] + sizes[1]) as usize
    );
}

#[test]
fn test_duplicated_colored_points_write_the_rgb_layer() {
    let point = make_point(10, 20, 30, 1234.5, 2);
    let mut points = with_default_colors(vec![point; 50]);
    for p in &mut points {
        p.rgb = RGB {
            red: 1,
            green: 2,
            blue: 3,
        };
    }

    let compressed = round_trip(7, &points);
    let rgb_size_start = point_size_of_format(7) + 4 + 9 * 4;
    let rgb_size = u32::from_le_bytes([
        compressed[rgb_size_start],
        compressed[rgb_size_start + 1],
        compressed[rgb_size_start + 2],
        compressed[rgb_size_start + 3],
    ]);
    assert!(rgb_size > 0);
}

#[test]
fn test_number_of_returns_change() {
    let mut points = Vec::new();
    for i in 0..20 {
        let mut point = make_point(i * 3, i * 2, i, 10.0 + f64::from(i), 0);
        if i >= 10 {
            point.set_number_of_returns(2);
            point.set_return_number(if i % 2 == 0 { 1 } else { 2 });
        }
        points.push(point);
    }
    round_trip(6, &with_default_colors(points));
}

#[test]
fn test_channel_jumps() {
    let mut points = Vec::new();
    let mut time = 100.0;
    for i in 0..40 {
        // jump from 0 directly to 3 then back, then visit the others
        let channel = match i {
            0..=4 => 0,
            5..=9 => 3,
            10..=14 => 0,
            _ => (i % 4) as u8,
        };
        time += 0.001;
        let mut point = make_point(1000 * i32::from(channel) + i, -i, 7, time, channel);
        point.intensity = 100 * u16::from(channel);
        point.point_source_id = u16::from(channel);
        points.push(point);
    }
    round_trip(6, &with_default_colors(points));
}

#[test]
fn test_channels_values_do_not_leak() {
    // two channels scanning areas far from one another
    let mut points = Vec::new();
    for i in 0..500 {
        let channel = (i % 2) as u8;
        let offset = if channel == 0 { 0 } else { 50_000_000 };
        let mut point = make_point(
            offset + i * 10,
            offset - i * 10,
            offset / 100 + i,
            f64::from(i / 2) * 0.5 + f64::from(channel) * 1e6,
            channel,
        );
        point.classification = 1 + channel;
        point.intensity = 2000 * u16::from(channel) + (i % 13) as u16;
        points.push(point);
    }
    let points = with_default_colors(points);
    let interleaved = round_trip(6, &points);

    // Each channel alone should not compress much better than when interleaved
    let channel_0: Vec<TestPoint> = points
        .iter()
        .filter(|p| p.point.scanner_channel() == 0)
        .copied()
        .collect();
    let alone = round_trip(6, &channel_0);
    assert!(interleaved.len() < 4 * alone.len());
}

#[test]
fn test_gps_time_sequences() {
    init_logging();
    let mut points = Vec::new();
    for i in 0..1_000 {
        // two interleaved time lines with a gap bigger than 32 bits
        let gps_time = if i % 2 == 0 {
            1_000.0 + f64::from(i) * 1e-5
        } else {
            3.0e8 + f64::from(i) * 1e-5
        };
        points.push(make_point(i, i, i, gps_time, 0));
    }
    round_trip(6, &with_default_colors(points));
}

#[test]
fn test_gps_time_big_jumps() {
    let gps_times = [
        0.0,
        0.0,
        1.0,
        -1.0,
        f64::MAX,
        f64::MIN_POSITIVE,
        1e-300,
        4.0e9,
        4.0e9 + 1e-6,
        -0.0,
        0.0,
        f64::from(u32::MAX),
        f64::from(u32::MAX) + 1.0,
        123_456.789,
    ];
    let points: Vec<Point14> = gps_times
        .iter()
        .enumerate()
        .map(|(i, gps_time)| make_point(i as i32, 0, 0, *gps_time, (i % 2) as u8))
        .collect();
    round_trip(6, &with_default_colors(points));
}

#[test]
fn test_extreme_coordinates() {
    let points = vec![
        make_point(i32::MIN, i32::MAX, 0, 1.0, 0),
        make_point(i32::MAX, i32::MIN, i32::MAX, 1.0, 0),
        make_point(0, 0, i32::MIN, 2.0, 1),
        make_point(i32::MIN, i32::MIN, i32::MIN, 2.0, 0),
    ];
    round_trip(6, &with_default_colors(points));
}

#[test]
fn test_multiple_chunks_in_one_stream() {
    init_logging();
    let items = items_of(8);
    let point_size = point_size_of_format(8);
    let first_chunk = pack_points(8, &scanner_points(10, 700));
    let second_chunk = pack_points(8, &scanner_points(11, 300));

    let mut compressor = LayeredPointRecordCompressor::new(Cursor::new(Vec::<u8>::new()));
    compressor.set_fields_from(&items).unwrap();
    assert_eq!(compressor.record_size(), point_size);
    for chunk in &[&first_chunk, &second_chunk] {
        for point in chunk.chunks_exact(point_size) {
            compressor.compress_next(point).unwrap();
        }
        compressor.done().unwrap();
        compressor.reset();
    }
    let compressed = compressor.into_inner().into_inner();

    let mut decompressor = LayeredPointRecordDecompressor::new(Cursor::new(compressed));
    decompressor.set_fields_from(&items).unwrap();
    for chunk in &[&first_chunk, &second_chunk] {
        let mut decompressed = vec![0u8; chunk.len()];
        for point in decompressed.chunks_exact_mut(point_size) {
            decompressor.decompress_next(point).unwrap();
        }
        assert_eq!(
            decompressor.chunk_point_count() as usize,
            chunk.len() / point_size
        );
        assert_eq!(&decompressed, *chunk);
        decompressor.reset();
    }
}

#[test]
fn test_decompress_into_a_smaller_buffer() {
    let items = items_of(6);
    let bytes = pack_points(6, &scanner_points(3, 100));
    let compressed = compress_chunk(&items, &bytes).unwrap();

    let mut decompressed = vec![0u8; 10 * Point14::SIZE];
    let num_points = decompress_chunk(
        &items,
        DecompressionSelection::all(),
        &compressed,
        &mut decompressed,
    )
    .unwrap();
    assert_eq!(num_points, 10);
    assert_eq!(&decompressed[..], &bytes[..decompressed.len()]);

    // A bigger buffer only receives the points of the chunk
    let mut decompressed = vec![0u8; 120 * Point14::SIZE];
    let num_points = decompress_chunk(
        &items,
        DecompressionSelection::all(),
        &compressed,
        &mut decompressed,
    )
    .unwrap();
    assert_eq!(num_points, 100);
    assert_eq!(&decompressed[..bytes.len()], &bytes[..]);
}
