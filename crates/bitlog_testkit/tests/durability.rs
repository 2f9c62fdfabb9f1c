//! Engine behaviour that must hold across restarts.

use bitlog_core::{CoreError, Engine};
use bitlog_testkit::prelude::*;

#[test]
fn round_trip_and_last_writer_wins() {
    let fixture = TempEngine::new();
    fixture.put(b"k", b"v1").unwrap();
    assert_eq!(fixture.get(b"k").unwrap(), Some(b"v1".to_vec()));

    fixture.put(b"k", b"v2").unwrap();
    assert_eq!(fixture.get(b"k").unwrap(), Some(b"v2".to_vec()));

    fixture.delete(b"k").unwrap();
    assert_eq!(fixture.get(b"k").unwrap(), None);
}

#[test]
fn values_survive_restart() {
    let mut fixture = TempEngine::new();
    populate(&fixture, 50);
    for i in (0..50).step_by(5) {
        fixture.put(&key(i), &value(i, 1)).unwrap();
    }
    for i in (1..50).step_by(7) {
        fixture.delete(&key(i)).unwrap();
    }

    fixture.reopen();

    for i in 0..50 {
        let expected = if i % 7 == 1 {
            None
        } else if i % 5 == 0 {
            Some(value(i, 1))
        } else {
            Some(value(i, 0))
        };
        assert_eq!(fixture.get(&key(i)).unwrap(), expected, "key {i}");
    }
}

#[test]
fn size_grows_with_every_put_until_rotation() {
    let fixture = TempEngine::new();
    let mut last = fixture.size().unwrap();
    for i in 0..100 {
        fixture.put(&key(i), &value(i, 0)).unwrap();
        let size = fixture.size().unwrap();
        assert!(size > last, "size did not grow after put {i}");
        last = size;
    }
}

#[test]
fn rotation_keeps_every_key_readable() {
    let mut fixture = TempEngine::small_segments(256);
    populate(&fixture, 100);

    let sealed = sealed_segments(fixture.path());
    assert!(sealed.len() > 1, "expected rotation, got {} sealed", sealed.len());
    for i in 0..100 {
        assert_eq!(fixture.get(&key(i)).unwrap(), Some(value(i, 0)));
    }

    fixture.reopen();
    assert_eq!(fixture.len(), 100);
}

#[test]
fn replay_uses_numeric_segment_order() {
    // One record per segment, so ids run past 10 and "10.seg" would sort
    // before "2.seg" in a plain listing.
    let mut fixture = TempEngine::small_segments(1);
    for version in 0..15 {
        fixture.put(b"counter", &value(0, version)).unwrap();
    }
    assert!(sealed_segments(fixture.path()).len() >= 10);

    fixture.reopen();
    assert_eq!(fixture.get(b"counter").unwrap(), Some(value(0, 14)));
}

#[test]
fn directory_is_locked_while_open() {
    let mut fixture = TempEngine::new();
    assert!(matches!(fixture.try_open(), Err(CoreError::DatabaseLocked)));

    fixture.close();
    let engine = fixture.try_open().unwrap();
    engine.close().unwrap();
}

#[test]
fn close_releases_directory_for_a_new_engine() {
    let fixture = TempEngine::small_segments(256);
    populate(&fixture, 40);
    let engine: &Engine = &fixture;
    engine.close().unwrap();

    let second = fixture.try_open().unwrap();
    assert_eq!(second.len(), 40);
    for i in 0..40 {
        assert_eq!(second.get(&key(i)).unwrap(), Some(value(i, 0)));
    }
    assert!(matches!(fixture.try_open(), Err(CoreError::DatabaseLocked)));
}

#[test]
fn concurrent_writers_lose_nothing() {
    let mut fixture = TempEngine::small_segments(4096);
    let config = StressConfig::default();

    let result = concurrent_writers(&fixture, &config);
    assert_eq!(result.failed_ops, 0);
    assert_eq!(result.successful_ops, config.total_keys());
    assert!(missing_after_concurrent_writers(&fixture, &config).is_empty());

    fixture.reopen();
    assert_eq!(fixture.len(), config.total_keys());
    assert!(missing_after_concurrent_writers(&fixture, &config).is_empty());
}

#[test]
fn closed_engine_rejects_operations() {
    let fixture = TempEngine::new();
    fixture.put(b"k", b"v").unwrap();
    let engine: &Engine = &fixture;
    engine.close().unwrap();
    engine.close().unwrap();

    assert!(matches!(fixture.put(b"k", b"v"), Err(CoreError::EngineClosed)));
    assert!(matches!(fixture.get(b"k"), Err(CoreError::EngineClosed)));
    assert!(matches!(fixture.compact(), Err(CoreError::EngineClosed)));
}
