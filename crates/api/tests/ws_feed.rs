mod common;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use common::{build_test_app, requester, TestApp, TENANT};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use shanty_api::ws::SocketKind;
use shanty_player::voice::FRAME_BYTES;
use tokio_tungstenite::tungstenite::Message;

async fn serve(app: &TestApp) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held");
}

#[tokio::test]
async fn feed_delivers_only_own_tenant_events() {
    let app = build_test_app();
    let addr = serve(&app).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/{TENANT}/events"))
        .await
        .unwrap();
    let broadcaster = &app.state.broadcaster;
    until(move || async move { broadcaster.subscriber_count(TENANT).await == 1 }).await;

    let jukebox = &app.state.jukebox;
    jukebox
        .enqueue_reference("guild-2", "https://youtu.be/other", &requester())
        .await
        .unwrap();
    jukebox
        .enqueue_reference(TENANT, "https://youtu.be/mine", &requester())
        .await
        .unwrap();

    let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .expect("no event")
        .unwrap()
        .unwrap();
    let Message::Text(text) = message else {
        panic!("expected a text frame, got {message:?}");
    };
    let event: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(event["tenant_id"], TENANT);
    assert_eq!(event["type"], "added");
    assert_eq!(event["entry"]["track"]["id"], "mine");

    socket.close(None).await.unwrap();
    until(move || async move { broadcaster.subscriber_count(TENANT).await == 0 }).await;
}

#[tokio::test]
async fn voice_bridge_receives_speaking_and_frames() {
    let app = build_test_app();
    let addr = serve(&app).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/{TENANT}/voice"))
        .await
        .unwrap();
    let voice = &app.state.voice;
    until(move || async move { voice.len().await == 1 }).await;
    assert_eq!(
        app.state.ws_manager.tenant_count(TENANT, SocketKind::Voice).await,
        1
    );

    app.state
        .jukebox
        .enqueue_reference(TENANT, "https://youtu.be/a", &requester())
        .await
        .unwrap();

    let mut saw_speaking = false;
    let mut saw_frame = false;
    while !(saw_speaking && saw_frame) {
        let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("bridge got nothing")
            .unwrap()
            .unwrap();
        match message {
            Message::Text(text) => {
                let control: Value = serde_json::from_str(&text).unwrap();
                assert_eq!(control["type"], "speaking");
                saw_speaking |= control["speaking"] == true;
            }
            Message::Binary(frame) => {
                assert_eq!(frame.len(), FRAME_BYTES);
                saw_frame = true;
            }
            _ => {}
        }
    }

    socket.close(None).await.unwrap();
    until(move || async move { voice.len().await == 0 }).await;
}
