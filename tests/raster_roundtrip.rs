// Integration tests: bitmap -> script -> file -> estimate

use laser_engraver::file_manager;
use laser_engraver::{estimate, Bitmap, Interpreter, MotionScript, Point, RasterConverter};
use laser_engraver::script::Decoded;

fn ring(size: usize) -> Bitmap {
    let rows: Vec<Vec<bool>> = (0..size)
        .map(|r| (0..size).map(|c| r == 0 || c == 0 || r == size - 1 || c == size - 1).collect())
        .collect();
    Bitmap::from_rows(&rows).unwrap()
}

#[test]
fn test_estimate_matches_converted_bitmap() {
    let bitmap = ring(6);
    let script = RasterConverter::default().convert(&bitmap);
    let est = estimate(&script, 1).unwrap();
    assert_eq!(est.point_count, 20);
    assert_eq!((est.width, est.height), (6, 6));
    assert!(est.total_steps >= 20);
}

#[test]
fn test_converted_script_replays_every_point() {
    let rows = [
        [false, true, false],
        [false, false, false],
        [true, false, true],
    ];
    let bitmap = Bitmap::from_rows(&rows).unwrap();
    let converter = RasterConverter::default();
    let expected = converter.scan(&bitmap);
    assert_eq!(expected, vec![Point::new(0, 0), Point::new(2, 0), Point::new(1, 2)]);

    let script = converter.convert(&bitmap);
    let mut interp = Interpreter::new(1);
    let replayed: Vec<Point> = script
        .lines()
        .iter()
        .enumerate()
        .map(|(i, line)| match interp.decode_line(line, i + 1).unwrap() {
            Decoded::Point(p) => p,
            Decoded::EndOfScript => panic!("unexpected end of script"),
        })
        .collect();
    assert_eq!(replayed, expected);
}

#[test]
fn test_script_survives_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ring.txt");
    let script = RasterConverter::default().convert(&ring(4));

    tokio_test::block_on(async {
        file_manager::write_script(&path, &script).await.unwrap();
        let loaded: MotionScript = file_manager::read_script(&path).await.unwrap();
        assert_eq!(loaded.lines(), script.lines());
        assert_eq!(estimate(&loaded, 1).unwrap(), estimate(&script, 1).unwrap());
    });
}
