//! Integration tests — session lifecycle, ordered delivery, handler
//! buffering, and link-loss behavior over a real TCP connection on
//! localhost.

use std::time::Duration;

use mlight_core::{
    ConnectionInfo, ExposureBracket, Instruction, MlightError, Reply, Resolution, Session,
    StatusUpdate, SweepAxis, WireMessage,
};
use tokio::net::TcpListener;

// ── Helpers ──────────────────────────────────────────────────────

/// Spin up a listener on an OS-assigned port and return the connection
/// info.  The listener is returned so the caller can accept on it.
async fn ephemeral_listener() -> (TcpListener, ConnectionInfo) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let info = ConnectionInfo::new(addr.ip().to_string(), addr.port());
    (listener, info)
}

/// Connect a controller/device session pair over localhost.
async fn session_pair() -> (Session, Session) {
    let (listener, info) = ephemeral_listener().await;
    let dial = tokio::spawn(async move { Session::connect(&info).await.unwrap() });
    let (stream, _) = listener.accept().await.unwrap();
    let accepted = Session::new(stream);
    let dialed = dial.await.unwrap();
    (dialed, accepted)
}

async fn recv_instruction(session: &Session) -> Instruction {
    tokio::time::timeout(Duration::from_secs(5), session.expect().recv_instruction())
        .await
        .expect("timeout")
        .expect("link lost")
}

// ── Session lifecycle ────────────────────────────────────────────

#[tokio::test]
async fn test_session_round_trip() {
    let (controller, device) = session_pair().await;

    controller
        .send(Instruction::SetFocus { lens_position: 0.5 })
        .await
        .unwrap();

    let inst = recv_instruction(&device).await;
    assert!(matches!(
        inst,
        Instruction::SetFocus { lens_position } if lens_position == 0.5
    ));

    device.send(Reply::ack()).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), controller.expect().recv_reply())
        .await
        .expect("timeout")
        .unwrap();
    assert!(matches!(reply, Reply::Status(StatusUpdate::None)));
}

#[tokio::test]
async fn test_sends_arrive_in_order() {
    let (controller, device) = session_pair().await;

    for bit in 0..8u32 {
        controller
            .send(Instruction::CaptureNormalInvertedPair {
                bit,
                bracket: ExposureBracket::single(0.01, 100.0),
                resolution: Resolution::High,
            })
            .await
            .unwrap();
    }

    for bit in 0..8u32 {
        match recv_instruction(&device).await {
            Instruction::CaptureNormalInvertedPair { bit: got, .. } => assert_eq!(got, bit),
            other => panic!("unexpected instruction {}", other.name()),
        }
    }
}

#[tokio::test]
async fn test_ready_waits_for_drained_queue() {
    let (controller, device) = session_pair().await;

    // Big payload so the write takes a moment.
    let raster = Reply::Raster {
        axis: SweepAxis::Vertical,
        data: vec![0u8; 4 * 1024 * 1024],
    };
    device.send(raster).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), device.ready())
        .await
        .expect("timeout")
        .unwrap();
    assert!(device.is_ready());

    // Message still arrives intact on the other side.
    let reply = tokio::time::timeout(Duration::from_secs(5), controller.expect().recv_reply())
        .await
        .expect("timeout")
        .unwrap();
    assert!(matches!(reply, Reply::Raster { data, .. } if data.len() == 4 * 1024 * 1024));
}

// ── Handler buffering ────────────────────────────────────────────

#[tokio::test]
async fn test_message_before_handler_is_buffered() {
    let (controller, device) = session_pair().await;

    device
        .send(Reply::Status(StatusUpdate::CapturedNormalBinaryCode))
        .await
        .unwrap();
    device
        .send(Reply::Status(StatusUpdate::LockedWhiteBalance))
        .await
        .unwrap();

    // Give the messages time to land before any handler exists.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Handlers registered late still see arrival order.
    let first = controller.expect().recv_reply().await.unwrap();
    let second = controller.expect().recv_reply().await.unwrap();
    assert!(matches!(
        first,
        Reply::Status(StatusUpdate::CapturedNormalBinaryCode)
    ));
    assert!(matches!(
        second,
        Reply::Status(StatusUpdate::LockedWhiteBalance)
    ));
}

#[tokio::test]
async fn test_earlier_handler_gets_earlier_message() {
    let (controller, device) = session_pair().await;

    let first = controller.expect();
    let second = controller.expect();

    device
        .send(Reply::Status(StatusUpdate::CapturedNormalBinaryCode))
        .await
        .unwrap();
    device.send(Reply::Status(StatusUpdate::None)).await.unwrap();

    let a = tokio::time::timeout(Duration::from_secs(5), first.recv_reply())
        .await
        .expect("timeout")
        .unwrap();
    let b = tokio::time::timeout(Duration::from_secs(5), second.recv_reply())
        .await
        .expect("timeout")
        .unwrap();
    assert!(matches!(
        a,
        Reply::Status(StatusUpdate::CapturedNormalBinaryCode)
    ));
    assert!(matches!(b, Reply::Status(StatusUpdate::None)));
}

#[tokio::test]
async fn test_drain_discards_buffered_messages() {
    let (controller, device) = session_pair().await;

    device
        .send(Reply::Error {
            message: "stale".into(),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(controller.drain_backlog(), 1);

    // A fresh exchange sees only the fresh reply.
    let slot = controller.expect();
    device.send(Reply::ack()).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), slot.recv_reply())
        .await
        .expect("timeout")
        .unwrap();
    assert!(matches!(reply, Reply::Status(StatusUpdate::None)));
}

#[tokio::test]
async fn test_wrong_family_rejected() {
    let (controller, device) = session_pair().await;

    // A raw instruction on the controller's inbound path is a
    // protocol violation, not a crash.
    device
        .send(WireMessage::Instruction(Instruction::EndSweep))
        .await
        .unwrap();
    let err = tokio::time::timeout(Duration::from_secs(5), controller.expect().recv_reply())
        .await
        .expect("timeout")
        .unwrap_err();
    assert!(matches!(err, MlightError::UnexpectedReply(_)));
}

// ── Link loss ────────────────────────────────────────────────────

#[tokio::test]
async fn test_peer_drop_resolves_expectations() {
    let (controller, device) = session_pair().await;

    let pending = controller.expect();
    drop(device);

    let err = tokio::time::timeout(Duration::from_secs(5), pending.recv())
        .await
        .expect("timeout")
        .unwrap_err();
    assert!(matches!(err, MlightError::LinkLost));

    // Session is now permanently unusable.
    controller.closed().await;
    assert!(!controller.is_connected());
    assert!(matches!(
        controller.expect().recv().await.unwrap_err(),
        MlightError::LinkLost
    ));
    assert!(matches!(
        controller.send(Instruction::EndSession).await.unwrap_err(),
        MlightError::LinkLost
    ));
}

#[tokio::test]
async fn test_ready_fails_on_link_loss() {
    let (controller, device) = session_pair().await;
    drop(device);

    controller.closed().await;
    let err = controller.ready().await.unwrap_err();
    assert!(matches!(err, MlightError::LinkLost));
    assert!(!controller.is_ready());
}
