//! Integration tests for the SFU session facade
//!
//! These tests drive a signaling-only manager end to end through its public API.
//!
//! Run with: cargo test --test session_flow

use futures::FutureExt;
use huddle_sfu::{
    Config, ConnectionId, EngineMode, EngineProbe, Error, MediaKind, RoomId, RtpCapabilities,
    RtpParameters, SfuManager, TransportDirection, UserId,
};
use huddle_sfu::rtp::{DtlsFingerprint, DtlsParameters, DtlsRole};
use std::sync::Arc;

async fn signaling_only_manager() -> Arc<SfuManager> {
    let mut config = Config::default();
    config.sfu.enable_media_engine = false;
    SfuManager::bootstrap(&config, None)
        .await
        .expect("Failed to bootstrap manager")
}

fn client_dtls() -> DtlsParameters {
    DtlsParameters {
        role: Some(DtlsRole::Client),
        fingerprints: vec![DtlsFingerprint {
            algorithm: "sha-256".to_string(),
            value: "11:22:33".to_string(),
        }],
    }
}

#[tokio::test]
async fn test_failed_engine_probe_falls_back_to_signaling_only() {
    let probe: EngineProbe = async { Err(anyhow::anyhow!("engine library not found")) }.boxed();
    let manager = SfuManager::bootstrap(&Config::default(), Some(probe))
        .await
        .unwrap();

    let info = manager.runtime_info();
    assert!(!info.engine_available);
    assert_eq!(info.engine_mode, EngineMode::Stub);
    assert_eq!(
        manager.router_rtp_capabilities(None).await,
        RtpCapabilities::fallback()
    );
}

#[tokio::test]
async fn test_full_session_in_signaling_only_mode() {
    let manager = signaling_only_manager().await;
    let room = RoomId::from("standup");
    let (alice, bob) = (UserId::from("alice"), UserId::from("bob"));

    let joined = manager
        .join_room(&room, &alice, ConnectionId::from("ws-1"))
        .await
        .unwrap();
    assert_eq!(joined.peer_ids, vec![alice.clone()]);

    let send = manager
        .create_transport(&room, &alice, TransportDirection::Send)
        .await
        .unwrap();
    manager.connect_transport(&send.id, client_dtls()).await.unwrap();
    manager.connect_transport(&send.id, client_dtls()).await.unwrap();

    let mic = manager
        .produce(
            &room,
            &alice,
            &send.id,
            MediaKind::Audio,
            RtpParameters(serde_json::json!({ "encodings": [{ "ssrc": 1111 }] })),
            Some(serde_json::json!({ "source": "mic" })),
        )
        .await
        .unwrap();
    assert_eq!(mic.kind, MediaKind::Audio);

    let joined = manager
        .join_room(&room, &bob, ConnectionId::from("ws-2"))
        .await
        .unwrap();
    assert_eq!(joined.peer_ids, vec![alice.clone(), bob.clone()]);

    let visible = manager.list_room_producers(&room, Some(&bob));
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].producer_id, mic.id);

    let recv = manager
        .create_transport(&room, &bob, TransportDirection::Recv)
        .await
        .unwrap();
    let consumer = manager
        .consume(&room, &bob, &recv.id, &mic.id, &RtpCapabilities::default())
        .await
        .unwrap();
    assert_eq!(consumer.kind, MediaKind::Audio);
    assert_eq!(consumer.producer_user_id, alice);
    assert_eq!(consumer.rtp_parameters.0["encodings"][0]["ssrc"], 1111);

    assert_eq!(
        manager.peer_socket_id(&room, &bob),
        Some(ConnectionId::from("ws-2"))
    );

    // Signaling connection drops
    let left = manager.leave_user_from_all_rooms(&alice).await;
    assert_eq!(left, vec![room.clone()]);
    assert!(manager.list_room_producers(&room, None).is_empty());

    manager.wait_for_snapshots().await;
    let snapshot = manager.persisted_room_snapshot(&room).await.unwrap();
    assert_eq!(snapshot.peers, vec![bob.clone()]);

    manager.leave_room(&room, &bob).await;
    manager.wait_for_snapshots().await;
    assert!(manager.room_ids().is_empty());
    assert!(manager.persisted_room_snapshot(&room).await.is_none());
}

#[tokio::test]
async fn test_invalid_references_are_client_errors() {
    let manager = signaling_only_manager().await;
    let room = RoomId::from("r");
    let user = UserId::from("u");

    let err = manager
        .create_transport(&room, &user, TransportDirection::Send)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PeerNotJoined));
    assert!(err.is_client_error());

    manager
        .join_room(&room, &user, ConnectionId::generate())
        .await
        .unwrap();
    let recv = manager
        .create_transport(&room, &user, TransportDirection::Recv)
        .await
        .unwrap();

    let err = manager
        .produce(&room, &user, &recv.id, MediaKind::Video, RtpParameters::default(), None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "invalid send transport");

    let err = manager
        .connect_transport(&"missing".into(), client_dtls())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "transport not found");
    assert!(err.is_client_error());

    // Teardown paths never fail
    assert!(!manager.close_producer(&room, &user, &"missing".into()).await);
    assert!(manager.close_user_producers(&room, &user).await.is_empty());
    manager.leave_room(&room, &user).await;
    manager.leave_room(&room, &user).await;
    assert!(manager.leave_user_from_all_rooms(&user).await.is_empty());
}

#[tokio::test]
async fn test_room_limit_from_config() {
    let mut config = Config::default();
    config.sfu.enable_media_engine = false;
    config.sfu.max_rooms = 1;
    let manager = SfuManager::bootstrap(&config, None).await.unwrap();

    manager
        .join_room(&RoomId::from("a"), &UserId::from("u"), ConnectionId::generate())
        .await
        .unwrap();
    let err = manager
        .join_room(&RoomId::from("b"), &UserId::from("u"), ConnectionId::generate())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RoomLimitReached));

    manager.shutdown().await;
    manager
        .join_room(&RoomId::from("b"), &UserId::from("u"), ConnectionId::generate())
        .await
        .unwrap();
}
