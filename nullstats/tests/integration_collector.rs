//! Integration tests for the collector lifecycle.
//!
//! These tests drive a collector across several days, restart it over the
//! same directory, and simulate a crash between persisting the history and
//! truncating the log.

use chrono::{DateTime, NaiveDateTime, Utc};
use nullstats::{Collector, CollectorConfig, Device, Hit, Stats, Zone};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn ts(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .unwrap()
        .and_utc()
}

fn open(dir: &Path) -> Collector {
    Collector::new(CollectorConfig::new(dir).with_zone(Zone::Utc)).unwrap()
}

fn values(stats: &Stats, path: &str) -> Vec<u64> {
    stats.paths.get(path).map(|row| row.values.clone()).unwrap_or_default()
}

#[test]
fn test_multi_day_sequence() {
    let temp_dir = tempdir().unwrap();
    let collector = open(temp_dir.path());

    for (when, path) in [
        ("2021-01-01 10:30", "/a"),
        ("2021-01-01 10:42", "/b"),
        ("2021-01-01 12:00", "/c"),
        ("2021-01-01 18:00", "/c"),
        ("2021-01-01 18:01", "/c"),
        ("2021-01-01 18:59", "/d"),
        ("2021-01-02 00:00", "/e"),
        ("2021-01-02 08:00", "/f"),
        ("2021-01-04 09:45", "/g"),
        ("2021-01-05 07:30", "/h"),
    ] {
        assert!(collector.hit(&Hit::new(ts(when), path)).unwrap());
    }

    // Phase 1: three rollovers happened, day 5 is live
    let (daily, history) = collector.stats().unwrap();
    assert_eq!(daily.start.unwrap().to_rfc3339(), "2021-01-05T00:00:00+00:00");
    assert_eq!(daily.paths.row_count(), 1);
    assert_eq!(daily.paths.get("/h").unwrap().get(7), 1);

    assert_eq!(history.width(), 5);
    assert_eq!(values(&history, "/a"), [1, 0, 0, 0, 0]);
    assert_eq!(values(&history, "/c"), [3, 0, 0, 0, 0]);
    assert_eq!(values(&history, "/e"), [0, 1, 0, 0, 0]);
    assert_eq!(values(&history, "/g"), [0, 0, 0, 1, 0]);
    assert_eq!(values(&history, "/h"), [0, 0, 0, 0, 1]);
    assert_eq!(history.sessions.get("sessions").unwrap().values, [6, 2, 0, 1, 1]);

    // Only finished days are on disk
    let on_disk: Stats = fs::read_to_string(temp_dir.path().join("stats.csv"))
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(on_disk.width(), 4);
    assert_eq!(values(&on_disk, "/g"), [0, 0, 0, 1]);

    // Phase 2: more hits on the live day
    collector.hit(&Hit::new(ts("2021-01-05 00:01"), "/g")).unwrap();
    collector.hit(&Hit::new(ts("2021-01-05 23:59"), "/h")).unwrap();

    let (daily, history) = collector.stats().unwrap();
    assert_eq!(daily.paths.get("/g").unwrap().get(0), 1);
    assert_eq!(daily.paths.get("/h").unwrap().get(23), 1);
    assert_eq!(values(&history, "/g"), [0, 0, 0, 1, 1]);
    assert_eq!(values(&history, "/h"), [0, 0, 0, 0, 2]);
    assert_eq!(history.sessions.get("sessions").unwrap().values, [6, 2, 0, 1, 3]);
}

#[test]
fn test_restart_resumes_period() {
    let temp_dir = tempdir().unwrap();

    {
        let collector = open(temp_dir.path());
        collector.hit(&Hit::new(ts("2021-03-01 09:00"), "/")).unwrap();
        collector.hit(&Hit::new(ts("2021-03-02 09:00"), "/")).unwrap();
        collector.close().unwrap();
    }

    // A fresh collector sees the history and the live day
    let collector = open(temp_dir.path());
    collector.hit(&Hit::new(ts("2021-03-02 11:00"), "/about")).unwrap();
    let (daily, history) = collector.stats().unwrap();
    assert_eq!(daily.paths.row_count(), 2);
    assert_eq!(values(&history, "/"), [1, 1]);
    assert_eq!(values(&history, "/about"), [0, 1]);

    // The next day rolls the resumed period over
    collector.hit(&Hit::new(ts("2021-03-03 00:30"), "/")).unwrap();
    let on_disk: Stats = fs::read_to_string(temp_dir.path().join("stats.csv"))
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(values(&on_disk, "/"), [1, 1]);
    assert_eq!(values(&on_disk, "/about"), [0, 1]);
}

#[test]
fn test_crash_before_truncate_does_not_double_count() {
    let temp_dir = tempdir().unwrap();
    let log_path = temp_dir.path().join("log.csv");
    let history_path = temp_dir.path().join("stats.csv");

    let collector = open(temp_dir.path());
    collector.hit(&Hit::new(ts("2021-01-01 10:00"), "/a").with_session("s1")).unwrap();
    collector.hit(&Hit::new(ts("2021-01-01 11:00"), "/a").with_session("s1")).unwrap();
    let day_one_log = fs::read_to_string(&log_path).unwrap();

    collector.hit(&Hit::new(ts("2021-01-02 10:00"), "/b")).unwrap();
    collector.close().unwrap();
    drop(collector);
    let history_before = fs::read_to_string(&history_path).unwrap();

    // Simulate a crash after stats.csv was written but before log.csv was truncated.
    fs::write(&log_path, &day_one_log).unwrap();

    let collector = open(temp_dir.path());
    collector.hit(&Hit::new(ts("2021-01-02 12:00"), "/b")).unwrap();

    assert_eq!(fs::read_to_string(&history_path).unwrap(), history_before);
    let (_, history) = collector.stats().unwrap();
    assert_eq!(values(&history, "/a"), [2, 0]);
    assert_eq!(history.sessions.get("sessions").unwrap().values, [1, 1]);
}

#[test]
fn test_restart_after_torn_write() {
    let temp_dir = tempdir().unwrap();
    let log_path = temp_dir.path().join("log.csv");
    let t = ts("2021-01-01 10:00").timestamp();

    // A crash mid-append left a partial second line
    fs::write(&log_path, format!("{t},/a,,,,\n{t},/b,,")).unwrap();

    let collector = open(temp_dir.path());
    collector.hit(&Hit::new(ts("2021-01-01 11:00"), "/c")).unwrap();
    let (daily, _) = collector.stats().unwrap();
    assert_eq!(daily.paths.get("/a").unwrap().get(10), 1);
    assert_eq!(daily.paths.get("/c").unwrap().get(11), 1);
    assert!(daily.paths.get("/b").is_none());

    // The next day folds the recovered period
    collector.hit(&Hit::new(ts("2021-01-02 09:00"), "/d")).unwrap();
    let on_disk: Stats = fs::read_to_string(temp_dir.path().join("stats.csv"))
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(values(&on_disk, "/a"), [1]);
    assert_eq!(values(&on_disk, "/c"), [1]);
    assert_eq!(on_disk.sessions.get("sessions").unwrap().values, [2]);
}

#[test]
fn test_late_event_keeps_newer_days() {
    let temp_dir = tempdir().unwrap();
    let collector = open(temp_dir.path());

    for (when, path) in [
        ("2021-01-01 12:00", "/a"),
        ("2021-01-02 12:00", "/a"),
        ("2021-01-02 13:00", "/a"),
        ("2021-01-03 12:00", "/a"),
        ("2021-01-03 13:00", "/a"),
        ("2021-01-03 14:00", "/a"),
        ("2021-01-04 08:00", "/a"),
    ] {
        collector.hit(&Hit::new(ts(when), path)).unwrap();
    }

    // A late event from the previous day, then the live day resumes
    collector.hit(&Hit::new(ts("2021-01-03 23:59"), "/a")).unwrap();
    collector.hit(&Hit::new(ts("2021-01-04 09:00"), "/a")).unwrap();

    let on_disk: Stats = fs::read_to_string(temp_dir.path().join("stats.csv"))
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(on_disk.width(), 4);
    // The late period overwrites day 3; day 4 is kept
    assert_eq!(values(&on_disk, "/a"), [1, 2, 1, 1]);

    let (_, history) = collector.stats().unwrap();
    assert_eq!(values(&history, "/a"), [1, 2, 1, 1]);
}

#[test]
fn test_sessions_count_dimensions_once() {
    let temp_dir = tempdir().unwrap();
    let collector = open(temp_dir.path());

    for path in ["/", "/blog", "/about"] {
        collector
            .hit(
                &Hit::new(ts("2021-06-01 14:10"), path)
                    .with_session("abc")
                    .with_referrer("duckduckgo.com")
                    .with_country("DE")
                    .with_device(Device::Mobile),
            )
            .unwrap();
    }
    collector
        .hit(&Hit::new(ts("2021-06-01 15:00"), "/").with_device(Device::Desktop))
        .unwrap();

    let (daily, _) = collector.stats().unwrap();
    assert_eq!(daily.paths.get("/").unwrap().total(), 2);
    assert_eq!(daily.sessions.get("sessions").unwrap().total(), 2);
    assert_eq!(daily.referrers.get("duckduckgo.com").unwrap().total(), 1);
    assert_eq!(daily.countries.get("DE").unwrap().total(), 1);
    assert_eq!(daily.devices.get("mobile").unwrap().total(), 1);
    assert_eq!(daily.devices.get("desktop").unwrap().total(), 1);
}

#[test]
fn test_fixed_offset_zone_moves_day_boundary() {
    let temp_dir = tempdir().unwrap();
    let zone: Zone = "+02:00".parse().unwrap();
    let collector =
        Collector::new(CollectorConfig::new(temp_dir.path()).with_zone(zone)).unwrap();

    // 21:30 UTC and 22:30 UTC are 23:30 and 00:30 at +02:00
    collector.hit(&Hit::new(ts("2021-01-01 21:30"), "/")).unwrap();
    collector.hit(&Hit::new(ts("2021-01-01 22:30"), "/")).unwrap();

    let history = fs::read_to_string(temp_dir.path().join("stats.csv")).unwrap();
    assert!(history.starts_with("#2021-01-01T00:00:00+02:00,24h0m0s\n/,1\n"));

    let (daily, _) = collector.stats().unwrap();
    assert_eq!(daily.start.unwrap().to_rfc3339(), "2021-01-02T00:00:00+02:00");
    assert_eq!(daily.paths.get("/").unwrap().get(0), 1);
}

#[test]
fn test_concurrent_hits() {
    use std::sync::Arc;
    use std::thread;

    let temp_dir = tempdir().unwrap();
    let collector = Arc::new(open(temp_dir.path()));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let collector = Arc::clone(&collector);
            thread::spawn(move || {
                for i in 0..50 {
                    let hit = Hit::new(ts("2021-01-01 12:00"), format!("/t{t}"))
                        .with_session(format!("{t}-{i}"));
                    collector.hit(&hit).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let log = fs::read_to_string(temp_dir.path().join("log.csv")).unwrap();
    assert_eq!(log.lines().count(), 200);
    let (daily, _) = collector.stats().unwrap();
    assert_eq!(daily.sessions.get("sessions").unwrap().total(), 200);
}
