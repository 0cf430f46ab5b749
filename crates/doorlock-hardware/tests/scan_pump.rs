//! Integration tests for the scan pump.

use doorlock_hardware::mock::MockRfid;
use doorlock_hardware::{ReaderError, ScanPump, SerialRfidReader};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_scans_become_access_events() {
    let (reader, handle) = MockRfid::new();
    let (events_tx, mut events) = mpsc::channel(8);
    let pump = ScanPump::new();
    let cancel = CancellationToken::new();

    let task = pump.spawn(reader, events_tx, cancel.clone());

    handle.present("04a1b2c3").await.unwrap();
    handle.present("04A1B2C3").await.unwrap();

    let first = events.recv().await.unwrap();
    let second = events.recv().await.unwrap();
    assert_eq!(first.uid.as_str(), "04A1B2C3");
    assert_eq!(first.uid, second.uid);
    assert_ne!(first.id, second.id);

    cancel.cancel();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_scan_feed_sees_every_uid() {
    let (reader, handle) = MockRfid::new();
    let (events_tx, mut events) = mpsc::channel(8);
    let pump = ScanPump::new();
    let mut feed = pump.subscribe();

    let task = pump.spawn(reader, events_tx, CancellationToken::new());

    handle.present("cafe").await.unwrap();

    assert_eq!(feed.recv().await.unwrap().as_str(), "CAFE");
    assert_eq!(events.recv().await.unwrap().uid.as_str(), "CAFE");

    drop(handle);
    assert!(matches!(
        task.await.unwrap(),
        Err(ReaderError::Disconnected)
    ));
}

#[tokio::test]
async fn test_pump_stops_when_controller_hangs_up() {
    let (reader, handle) = MockRfid::new();
    let (events_tx, events) = mpsc::channel(8);
    let pump = ScanPump::new();

    let task = pump.spawn(reader, events_tx, CancellationToken::new());
    drop(events);

    handle.present("0001").await.unwrap();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_pump_over_serial_lines() {
    let (mut device, host) = tokio::io::duplex(256);
    let reader = SerialRfidReader::from_reader(host);
    let (events_tx, mut events) = mpsc::channel(8);
    let pump = ScanPump::new();

    let _task = pump.spawn(reader, events_tx, CancellationToken::new());

    device.write_all(b"\r\n0a0b0c0d\r\n").await.unwrap();

    assert_eq!(events.recv().await.unwrap().uid.as_str(), "0A0B0C0D");
}

#[tokio::test]
async fn test_pump_survives_oversized_line() {
    let (mut device, host) = tokio::io::duplex(1024);
    let reader = SerialRfidReader::from_reader(host);
    let (events_tx, mut events) = mpsc::channel(8);
    let pump = ScanPump::new();

    let task = pump.spawn(reader, events_tx, CancellationToken::new());

    device.write_all(&[b'F'; 512]).await.unwrap();
    device.write_all(b"\n04DEAD01\n").await.unwrap();

    assert_eq!(events.recv().await.unwrap().uid.as_str(), "04DEAD01");
    assert!(!task.is_finished());
}
