//! Integration tests for the define → write → read lifecycle.
//!
//! These tests verify:
//! - Range reads with and without interval downsampling
//! - Reads across schema changes
//! - Multi-day reads
//! - Binned aggregation against plain reads

use alopex_hstore::format::{Tag, TypeCode};
use alopex_hstore::store::{midnight, day_of, FileKind, ManualClock, ReadRequest, Sample};
use alopex_hstore::{HistoryConfig, HistoryError, HistoryStore};
use tempfile::TempDir;

fn open(dir: &TempDir, clock: &ManualClock) -> HistoryStore {
    HistoryStore::open(HistoryConfig::new(dir.path()))
        .unwrap()
        .with_clock(clock.clone())
}

fn write_at(store: &mut HistoryStore, clock: &ManualClock, event_id: u32, time: u32, payload: &[u8]) {
    clock.set(time);
    store.write_event(event_id, payload).unwrap();
}

// ============================================================================
// Range reads
// ============================================================================

/// Three samples ten seconds apart, read back in full and with a 15 s interval.
#[test]
fn test_temperature_scenario() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new(1000);
    let mut store = open(&dir, &clock);
    store
        .define_event(1, "Temp", &[Tag::new("T", TypeCode::Float, 1)])
        .unwrap();
    for (time, value) in [(1000, 1.0f32), (1010, 2.0), (1020, 3.0)] {
        write_at(&mut store, &clock, 1, time, &value.to_le_bytes());
    }

    let all = store
        .read(&ReadRequest::new(1, "T").with_range(1000, 1020))
        .unwrap();
    assert_eq!(
        all,
        vec![
            Sample { time: 1000, value: 1.0 },
            Sample { time: 1010, value: 2.0 },
            Sample { time: 1020, value: 3.0 },
        ]
    );

    let sparse = store
        .read(
            &ReadRequest::new(1, "T")
                .with_range(1000, 1020)
                .with_interval(15),
        )
        .unwrap();
    assert_eq!(
        sparse,
        vec![
            Sample { time: 1000, value: 1.0 },
            Sample { time: 1020, value: 3.0 },
        ]
    );
}

/// A second store instance reads what the first one wrote.
#[test]
fn test_reader_sees_writer_files() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new(1_700_000_000);
    let mut writer = open(&dir, &clock);
    writer
        .define_event(4, "Scaler", &[Tag::new("S", TypeCode::DWord, 3)])
        .unwrap();
    let mut payload = Vec::new();
    for v in [10u32, 20, 30] {
        payload.extend_from_slice(&v.to_le_bytes());
    }
    writer.write_event(4, &payload).unwrap();

    let reader = open(&dir, &clock);
    let request = ReadRequest::new(4, "S")
        .with_range(1_700_000_000, 1_700_000_000)
        .with_index(2);
    assert_eq!(reader.read(&request).unwrap()[0].value, 30.0);
}

// ============================================================================
// Schema changes
// ============================================================================

/// Samples written before and after a redefinition use their own layouts.
#[test]
fn test_read_across_schema_change() {
    let dir = TempDir::new().unwrap();
    let base = 1_700_000_000;
    let clock = ManualClock::new(base);
    let mut store = open(&dir, &clock);

    store
        .define_event(1, "Temp", &[Tag::new("T", TypeCode::Float, 1)])
        .unwrap();
    write_at(&mut store, &clock, 1, base, &1.5f32.to_le_bytes());

    store
        .define_event(
            1,
            "Temp",
            &[
                Tag::new("Status", TypeCode::Int, 1),
                Tag::new("T", TypeCode::Double, 1),
            ],
        )
        .unwrap();
    let mut payload = 9i32.to_le_bytes().to_vec();
    payload.extend_from_slice(&2.25f64.to_le_bytes());
    write_at(&mut store, &clock, 1, base + 1, &payload);

    let request = ReadRequest::new(1, "T").with_range(base, base + 1);
    let samples = store.read(&request).unwrap();
    assert_eq!(
        samples,
        vec![
            Sample { time: base, value: 1.5 },
            Sample { time: base + 1, value: 2.25 },
        ]
    );

    let mut times = [0u32; 2];
    let mut data = [0u8; 12];
    let summary = store.read_into(&request, &mut times, &mut data).unwrap();
    assert_eq!(summary.runs.len(), 2);
    assert_eq!(summary.runs[0].type_code, TypeCode::Float);
    assert_eq!(summary.runs[1].type_code, TypeCode::Double);
    assert_eq!(summary.values(&data), vec![1.5, 2.25]);

    // Only the newer schema has "Status".
    let status = store
        .read(&ReadRequest::new(1, "status").with_range(base, base + 1))
        .unwrap();
    assert_eq!(status, vec![Sample { time: base + 1, value: 9.0 }]);
}

/// A tag no schema defines is an error even when samples exist.
#[test]
fn test_undefined_variable() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new(1_700_000_000);
    let mut store = open(&dir, &clock);
    store
        .define_event(1, "Temp", &[Tag::new("T", TypeCode::Float, 1)])
        .unwrap();
    store.write_event(1, &1.0f32.to_le_bytes()).unwrap();

    let err = store
        .read(&ReadRequest::new(1, "Humidity").with_range(1_700_000_000, 1_700_000_001))
        .unwrap_err();
    assert!(matches!(err, HistoryError::UndefinedVariable { .. }));
}

// ============================================================================
// Multi-day reads and binning
// ============================================================================

/// Noon samples on three consecutive days come back from one read.
#[test]
fn test_multi_day_read() {
    let dir = TempDir::new().unwrap();
    let first = day_of(1_700_000_000);
    let noons: Vec<u32> = (0..3)
        .map(|d| midnight(first + chrono::Duration::days(d)) + 12 * 3600)
        .collect();
    let clock = ManualClock::new(noons[0]);
    let mut store = open(&dir, &clock);
    store
        .define_event(2, "Level", &[Tag::new("L", TypeCode::Short, 1)])
        .unwrap();
    for (i, &time) in noons.iter().enumerate() {
        write_at(&mut store, &clock, 2, time, &(i as i16 * -10).to_le_bytes());
    }

    for &time in &noons {
        assert!(store.layout().path_for_time(time, FileKind::Data).is_file());
    }
    let samples = store
        .read(&ReadRequest::new(2, "L").with_range(noons[0], noons[2]))
        .unwrap();
    assert_eq!(
        samples,
        vec![
            Sample { time: noons[0], value: 0.0 },
            Sample { time: noons[1], value: -10.0 },
            Sample { time: noons[2], value: -20.0 },
        ]
    );

    let middle = store
        .read(&ReadRequest::new(2, "L").with_range(noons[0] + 1, noons[2] - 1))
        .unwrap();
    assert_eq!(middle, vec![Sample { time: noons[1], value: -10.0 }]);
}

/// One bin over all samples matches the plain mean and count.
#[test]
fn test_single_bin_matches_plain_read() {
    let dir = TempDir::new().unwrap();
    let base = 1_700_000_000;
    let clock = ManualClock::new(base);
    let mut store = open(&dir, &clock);
    store
        .define_event(1, "Temp", &[Tag::new("T", TypeCode::Double, 1)])
        .unwrap();
    for i in 0..50u32 {
        let value = f64::from(i) * 0.5 - 3.0;
        write_at(&mut store, &clock, 1, base + i * 7, &value.to_le_bytes());
    }

    let request = ReadRequest::new(1, "T").with_range(base, base + 49 * 7);
    let samples = store.read(&request).unwrap();
    let mean = samples.iter().map(|s| s.value).sum::<f64>() / samples.len() as f64;

    let binned = store.read_binned(&request, 1).unwrap();
    assert_eq!(binned.bins[0].count, samples.len() as u64);
    assert!((binned.bins[0].mean - mean).abs() < 1e-9);
    assert_eq!(binned.bins[0].min, -3.0);
    assert_eq!(binned.bins[0].max, 21.5);
    assert_eq!(binned.last_time, base + 49 * 7);

    let ten = store.read_binned(&request, 10).unwrap();
    assert_eq!(ten.bins.len(), 10);
    assert_eq!(ten.bins.iter().map(|b| b.count).sum::<u64>(), 50);
}
