#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use laz_layered::packers::Packable;
use laz_layered::{LazItem, LazItemRecordBuilder, Nir, Point14, RGB, RGBNIR};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A point of any of the point formats 6, 7 and 8
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TestPoint {
    pub point: Point14,
    pub rgb: RGB,
    pub nir: Nir,
}

pub fn items_of(point_format_id: u8) -> Vec<LazItem> {
    LazItemRecordBuilder::default_for_point_format_id(point_format_id).unwrap()
}

pub fn point_size_of_format(point_format_id: u8) -> usize {
    match point_format_id {
        6 => Point14::SIZE,
        7 => Point14::SIZE + RGB::SIZE,
        8 => Point14::SIZE + RGBNIR::SIZE,
        _ => panic!("no test points for format {}", point_format_id),
    }
}

pub fn pack_points(point_format_id: u8, points: &[TestPoint]) -> Vec<u8> {
    let point_size = point_size_of_format(point_format_id);
    let mut bytes = vec![0u8; point_size * points.len()];
    for (point, out) in points.iter().zip(bytes.chunks_exact_mut(point_size)) {
        point.point.pack_into(&mut out[..Point14::SIZE]);
        match point_format_id {
            7 => point.rgb.pack_into(&mut out[Point14::SIZE..]),
            8 => RGBNIR {
                rgb: point.rgb,
                nir: point.nir,
            }
            .pack_into(&mut out[Point14::SIZE..]),
            _ => {}
        }
    }
    bytes
}

pub fn unpack_points(point_format_id: u8, bytes: &[u8]) -> Vec<TestPoint> {
    let point_size = point_size_of_format(point_format_id);
    bytes
        .chunks_exact(point_size)
        .map(|raw| {
            let point = Point14::unpack_from(&raw[..Point14::SIZE]);
            let (rgb, nir) = match point_format_id {
                7 => (RGB::unpack_from(&raw[Point14::SIZE..]), Nir::default()),
                8 => {
                    let value = RGBNIR::unpack_from(&raw[Point14::SIZE..]);
                    (value.rgb, value.nir)
                }
                _ => (RGB::default(), Nir::default()),
            };
            TestPoint { point, rgb, nir }
        })
        .collect()
}

pub fn make_point(x: i32, y: i32, z: i32, gps_time: f64, channel: u8) -> Point14 {
    let mut point = Point14::default();
    point.x = x;
    point.y = y;
    point.z = z;
    point.gps_time = gps_time;
    point.set_return_number(1);
    point.set_number_of_returns(1);
    point.set_scanner_channel(channel);
    point
}

/// Pulses of a scanner with 4 channels, firing in turns, each pulse
/// having between 1 and 5 returns sharing the same gps time.
pub fn scanner_points(seed: u64, num_points: usize) -> Vec<TestPoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(num_points);

    let mut positions = [(1_000, 2_000, 300); 4];
    let mut times = [
        500_000.0f64,
        500_000.000_1,
        500_000.000_2,
        500_000.000_3,
    ];
    let mut colors = [RGB::default(); 4];
    let mut point_source_id = 17u16;

    while points.len() < num_points {
        let channel = if rng.gen_bool(0.7) {
            (points.len() / 7 % 4) as u8
        } else {
            rng.gen_range(0..4)
        };
        let c = channel as usize;
        times[c] += rng.gen_range(1..50) as f64 * 1e-6;
        if rng.gen_bool(0.01) {
            point_source_id = point_source_id.wrapping_add(1);
        }
        let num_returns = rng.gen_range(1..=5u8);
        for return_number in 1..=num_returns {
            let position = &mut positions[c];
            position.0 += rng.gen_range(-50..50);
            position.1 += rng.gen_range(-50..50);
            position.2 += rng.gen_range(-20..20);

            let mut point = make_point(position.0, position.1, position.2, times[c], channel);
            point.set_return_number(return_number);
            point.set_number_of_returns(num_returns);
            point.intensity = rng.gen_range(0..1200) / u16::from(return_number);
            point.classification = if return_number == num_returns {
                2
            } else {
                rng.gen_range(3..6)
            };
            point.set_classification_flags(if rng.gen_bool(0.05) { 0b0100 } else { 0 });
            point.set_scan_direction_flag(c % 2 == 0);
            point.set_edge_of_flight_line(rng.gen_bool(0.01));
            point.user_data = if rng.gen_bool(0.1) { rng.gen() } else { 0 };
            point.scan_angle = rng.gen_range(-15_000..15_000);
            point.point_source_id = point_source_id;

            if rng.gen_bool(0.3) {
                let color = &mut colors[c];
                color.red = color.red.wrapping_add(rng.gen_range(0..600));
                color.green = color.green.wrapping_add(rng.gen_range(0..300));
                color.blue = rng.gen();
            }
            let nir = Nir(colors[c].red ^ colors[c].blue);

            points.push(TestPoint {
                point,
                rgb: colors[c],
                nir,
            });
            if points.len() == num_points {
                break;
            }
        }
    }
    points
}
