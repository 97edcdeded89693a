//! Loopback tests joining the parent and child sessions over one in-memory
//! pipe, with no real process involved. These run on every platform.

use std::time::Duration;

use credpipe::errors::AppError;
use credpipe::session::{ChildSession, HandshakeTimeouts, ParentSession};
use credpipe::wire::codec::WireFormat;
use credpipe::CredentialSet;
use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

fn short() -> HandshakeTimeouts {
    HandshakeTimeouts {
        ready: Duration::from_millis(500),
        payload: Duration::from_millis(500),
        ack: Duration::from_millis(500),
    }
}

fn sample_creds() -> CredentialSet {
    let mut set = CredentialSet::new();
    set.insert("API_KEY", "abc123").expect("valid name");
    set.insert("DB_PASS", "hunter2").expect("valid name");
    set
}

#[tokio::test]
async fn json_handshake_end_to_end() {
    let (parent_end, child_end) = duplex(64 * 1024);
    let (parent_read, parent_write) = split(parent_end);
    let (child_read, child_write) = split(child_end);

    let parent = ParentSession::new(parent_read, parent_write, WireFormat::Json, short());
    let child = ChildSession::new(child_read, child_write, WireFormat::Json, short());

    let (parent_result, child_result) =
        tokio::join!(parent.run(sample_creds(), Instant::now()), child.run());

    parent_result.expect("parent side");
    let (creds, _stream) = child_result.expect("child side");
    assert_eq!(creds.get("API_KEY"), Some("abc123"));
    assert_eq!(creds.get("DB_PASS"), Some("hunter2"));
}

#[tokio::test]
async fn legacy_handshake_end_to_end() {
    let (parent_end, child_end) = duplex(64 * 1024);
    let (parent_read, parent_write) = split(parent_end);
    let (child_read, child_write) = split(child_end);

    let parent = ParentSession::new(parent_read, parent_write, WireFormat::Legacy, short());
    let child = ChildSession::new(child_read, child_write, WireFormat::Legacy, short());

    let (parent_result, child_result) =
        tokio::join!(parent.run(sample_creds(), Instant::now()), child.run());

    parent_result.expect("parent side");
    let (creds, _stream) = child_result.expect("child side");
    assert_eq!(creds.len(), 2);
}

#[tokio::test]
async fn application_traffic_flows_untouched_after_handshake() {
    let (parent_end, child_end) = duplex(64 * 1024);
    let (parent_read, parent_write) = split(parent_end);
    let (child_read, child_write) = split(child_end);

    let parent = ParentSession::new(parent_read, parent_write, WireFormat::Json, short());
    let child = ChildSession::new(child_read, child_write, WireFormat::Json, short());

    let (parent_result, child_result) =
        tokio::join!(parent.run(sample_creds(), Instant::now()), child.run());
    let mut parent_stream = parent_result.expect("parent side");
    let (_creds, mut child_stream) = child_result.expect("child side");

    // A request goes down, a response comes back, byte for byte. Control
    // markers inside the traffic mean nothing any more.
    let request = b"{\"jsonrpc\":\"2.0\",\"method\":\"tools/list\",\"id\":1}\n+READY\n";
    parent_stream.writer.write_all(request).await.expect("send");
    parent_stream.writer.flush().await.expect("flush");

    let mut seen = vec![0u8; request.len()];
    child_stream.reader.read_exact(&mut seen).await.expect("receive");
    assert_eq!(seen.as_slice(), request.as_slice());

    let response = b"{\"jsonrpc\":\"2.0\",\"result\":[],\"id\":1}\n";
    child_stream.writer.write_all(response).await.expect("send");
    child_stream.writer.flush().await.expect("flush");

    let mut seen = vec![0u8; response.len()];
    parent_stream.reader.read_exact(&mut seen).await.expect("receive");
    assert_eq!(seen.as_slice(), response.as_slice());
}

#[tokio::test]
async fn mismatched_encodings_fail_both_sides() {
    let (parent_end, child_end) = duplex(64 * 1024);
    let (parent_read, parent_write) = split(parent_end);
    let (child_read, child_write) = split(child_end);

    // Parent speaks the marker framing, child expects a json line.
    let parent = ParentSession::new(parent_read, parent_write, WireFormat::Legacy, short());
    let child = ChildSession::new(child_read, child_write, WireFormat::Json, short());

    let (parent_result, child_result) =
        tokio::join!(parent.run(sample_creds(), Instant::now()), child.run());

    match child_result {
        Err(AppError::Decode(_)) => {}
        other => panic!("expected decode failure on the child, got {other:?}"),
    }
    assert!(parent_result.is_err(), "parent must not report success");
}

#[tokio::test]
async fn payload_timeout_fails_terminally() {
    let (parent_end, child_end) = duplex(64 * 1024);
    let (mut parent_read, _parent_write) = split(parent_end);
    let (child_read, child_write) = split(child_end);

    let timeouts = HandshakeTimeouts {
        payload: Duration::from_millis(25),
        ..short()
    };
    let child = ChildSession::new(child_read, child_write, WireFormat::Json, timeouts);

    // The parent never sends anything.
    match child.run().await {
        Err(AppError::Timeout(_)) => {}
        other => panic!("expected payload timeout, got {other:?}"),
    }

    // Exactly one ready line and one error line ever left the child.
    let mut seen = Vec::new();
    parent_read.read_to_end(&mut seen).await.expect("drain");
    assert_eq!(seen.as_slice(), b"+READY\n+ERR TIMEOUT\n".as_slice());
}
