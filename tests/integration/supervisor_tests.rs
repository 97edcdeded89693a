//! Integration tests that spawn real shell children through the supervisor.

use std::time::{Duration, Instant};

use credpipe::errors::AppError;
use credpipe::session::HandshakeTimeouts;
use credpipe::supervisor::{self, ChildChannel, SpawnedChild};
use credpipe::wire::codec::WireFormat;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::test_helpers::{sample_creds, sh_config};

/// A child that completes the handshake and then echoes one request.
const WELL_BEHAVED: &str = r#"
printf '+READY\n'
read -r payload
printf '+OK\n'
read -r request
printf 'echo:%s\n' "$request"
"#;

#[tokio::test]
async fn launch_hands_off_to_a_well_behaved_child() {
    let channel = supervisor::launch(
        &sh_config(WELL_BEHAVED),
        sample_creds(),
        WireFormat::Json,
        HandshakeTimeouts::default(),
    )
    .await
    .expect("handshake");
    let ChildChannel {
        mut child,
        mut stream,
        ..
    } = channel;

    stream.writer.write_all(b"ping\n").await.expect("send request");
    stream.writer.flush().await.expect("flush");

    let mut reply = Vec::new();
    stream.reader.read_to_end(&mut reply).await.expect("drain");
    assert_eq!(reply.as_slice(), b"echo:ping\n".as_slice());

    let status = child.wait().await.expect("reap");
    assert!(status.success());
}

#[tokio::test]
async fn legacy_child_can_count_the_pairs() {
    let script = r#"
printf '+READY\n'
count=0
while read -r line; do
  case "$line" in
    +CRED) ;;
    +END) break ;;
    *) count=$((count+1)) ;;
  esac
done
printf '+OK %s\n' "$count"
"#;
    let channel = supervisor::launch(
        &sh_config(script),
        sample_creds(),
        WireFormat::Legacy,
        HandshakeTimeouts::default(),
    )
    .await
    .expect("handshake");

    let ChildChannel { mut child, .. } = channel;
    child.wait().await.expect("reap");
}

#[tokio::test]
async fn slow_child_is_killed_within_the_ready_deadline() {
    let timeouts = HandshakeTimeouts {
        ready: Duration::from_millis(50),
        ..HandshakeTimeouts::default()
    };

    let started = Instant::now();
    let result = supervisor::launch(
        &sh_config("sleep 5"),
        sample_creds(),
        WireFormat::Json,
        timeouts,
    )
    .await;
    let elapsed = started.elapsed();

    match result {
        Err(AppError::Timeout(_)) => {}
        other => panic!("expected ready timeout, got {other:?}"),
    }
    assert!(
        elapsed < Duration::from_secs(2),
        "kill should not wait for the child: {elapsed:?}"
    );
}

#[tokio::test]
async fn exiting_child_reports_a_closed_stream() {
    let result = supervisor::launch(
        &sh_config("exit 3"),
        sample_creds(),
        WireFormat::Json,
        HandshakeTimeouts::default(),
    )
    .await;

    match result {
        Err(AppError::Closed(_)) => {}
        other => panic!("expected closed stream, got {other:?}"),
    }
}

#[tokio::test]
async fn child_that_reports_failure_is_a_peer_error() {
    let result = supervisor::launch(
        &sh_config(r"printf '+ERR NO_KEYRING\n'; sleep 1"),
        sample_creds(),
        WireFormat::Json,
        HandshakeTimeouts::default(),
    )
    .await;

    match result {
        Err(AppError::Peer(message)) => assert_eq!(message, "NO_KEYRING"),
        other => panic!("expected peer failure, got {other:?}"),
    }
}

#[tokio::test]
async fn chatty_child_is_a_protocol_violation() {
    let started = Instant::now();
    let result = supervisor::launch(
        &sh_config(r"printf 'starting up...\n'; sleep 5"),
        sample_creds(),
        WireFormat::Json,
        HandshakeTimeouts::default(),
    )
    .await;
    let elapsed = started.elapsed();

    match result {
        Err(AppError::Protocol { .. }) => {}
        other => panic!("expected protocol violation, got {other:?}"),
    }
    assert!(
        elapsed < Duration::from_secs(2),
        "kill should not wait for the child: {elapsed:?}"
    );
}

#[tokio::test]
async fn kill_and_reap_is_idempotent() {
    let SpawnedChild {
        session_id,
        mut child,
        ..
    } = supervisor::spawn_child(&sh_config("sleep 30")).expect("spawn");

    supervisor::kill_and_reap(&mut child, &session_id).await;
    supervisor::kill_and_reap(&mut child, &session_id).await;

    let status = child.try_wait().expect("status").expect("exited");
    assert!(!status.success(), "sleep should have been killed");
}

#[tokio::test]
#[serial_test::serial]
async fn child_environment_is_scrubbed() {
    std::env::set_var("CREDPIPE_TEST_SECRET_ENV", "leaked");

    let SpawnedChild {
        mut child,
        mut stdout,
        ..
    } = supervisor::spawn_child(&sh_config(
        r#"printf '%s\n' "${CREDPIPE_TEST_SECRET_ENV:-scrubbed}""#,
    ))
    .expect("spawn");

    let mut out = Vec::new();
    stdout.read_to_end(&mut out).await.expect("drain");
    assert_eq!(out.as_slice(), b"scrubbed\n".as_slice());

    child.wait().await.expect("reap");
    std::env::remove_var("CREDPIPE_TEST_SECRET_ENV");
}

#[tokio::test]
#[serial_test::serial]
async fn passthrough_env_reaches_the_child() {
    std::env::set_var("CREDPIPE_TEST_PASSTHROUGH", "visible");

    let mut config = sh_config(r#"printf '%s\n' "${CREDPIPE_TEST_PASSTHROUGH:-scrubbed}""#);
    config.extra_env = vec!["CREDPIPE_TEST_PASSTHROUGH".into()];

    let SpawnedChild {
        mut child,
        mut stdout,
        ..
    } = supervisor::spawn_child(&config).expect("spawn");

    let mut out = Vec::new();
    stdout.read_to_end(&mut out).await.expect("drain");
    assert_eq!(out.as_slice(), b"visible\n".as_slice());

    child.wait().await.expect("reap");
    std::env::remove_var("CREDPIPE_TEST_PASSTHROUGH");
}
