use std::io::SeekFrom;
use std::sync::Arc;

use crate::output::OutputDevice;
use crate::sink::BufferSink;

fn device(seekable: bool) -> (OutputDevice, crate::sink::BufferHandle) {
    let sink = BufferSink::new(seekable);
    let handle = sink.handle();
    (OutputDevice::new(Box::new(sink)), handle)
}

#[test]
fn writes_forward_in_order() {
    let (device, handle) = device(true);
    assert_eq!(device.write(b"head", None).unwrap(), 4);
    assert_eq!(device.write(b"-tail", Some(4)).unwrap(), 5);
    assert_eq!(handle.lock().data, b"head-tail");
}

#[test]
fn seek_back_rewrites_in_place() {
    let (device, handle) = device(true);
    device.write(b"abcdef", None).unwrap();
    assert_eq!(device.seek(SeekFrom::Start(2)).unwrap(), 2);
    device.write(b"XY", None).unwrap();
    assert_eq!(handle.lock().data, b"abXYef");
}

#[test]
#[should_panic(expected = "seek on a non-seekable output sink")]
fn seek_on_non_seekable_sink_is_fatal() {
    let (device, _) = device(false);
    let _ = device.seek(SeekFrom::Start(0));
}

#[test]
#[should_panic(expected = "only supports absolute seeks")]
fn relative_seek_is_fatal() {
    let (device, _) = device(true);
    let _ = device.seek(SeekFrom::Current(4));
}

#[test]
#[should_panic(expected = "combined seek-and-write")]
fn write_with_stale_position_is_fatal() {
    let (device, _) = device(true);
    device.write(b"abcd", None).unwrap();
    let _ = device.write(b"late", Some(0));
}

#[test]
#[should_panic(expected = "write after output device closed")]
fn write_after_close_is_fatal() {
    let (device, _) = device(true);
    device.close();
    let _ = device.write(b"x", None);
}

#[test]
fn force_close_drops_late_writes() {
    let (device, handle) = device(true);
    device.write(b"kept", None).unwrap();
    device.force_close();

    // The codec thread may still be holding bytes from a read that raced
    // the force-close; they are dropped, not fatal.
    assert_eq!(device.write(b"dropped", None).unwrap(), 7);
    let _ = device.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(handle.lock().data, b"kept");
}

#[test]
fn close_is_idempotent() {
    let (device, _) = device(true);
    device.close();
    device.close();
}

#[test]
fn sink_close_happens_at_most_once() {
    let (device, handle) = device(true);
    device.close_sink().unwrap();
    device.close_sink().unwrap();
    assert_eq!(handle.lock().closes, 1);
}

#[tokio::test]
async fn wait_closed_wakes_every_waiter() {
    let (device, _) = device(true);
    let device = Arc::new(device);

    let a = tokio::spawn({
        let device = Arc::clone(&device);
        async move { device.wait_closed().await }
    });
    let b = tokio::spawn({
        let device = Arc::clone(&device);
        async move { device.wait_closed().await }
    });

    tokio::task::yield_now().await;
    device.close();
    a.await.unwrap();
    b.await.unwrap();

    // A late waiter resolves immediately.
    device.wait_closed().await;
}
