//! Playlist expansion: ordering, partial failures and skip-all.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::{harness, requester, TENANT};
use shanty_events::QueueEvent;
use shanty_player::{PlayerError, QueueStore, ResolveError};

const PLAYLIST: &str = "https://www.youtube.com/playlist?list=PL1";

#[tokio::test]
async fn entries_queue_in_playlist_order() {
    let h = harness();
    h.resolver.add_playlist(PLAYLIST, &["p1", "p2", "p3", "p4"]);
    // Out-of-order completion must not reorder the queue.
    h.resolver.delay("p1", Duration::from_millis(80));
    h.resolver.delay("p2", Duration::from_millis(10));

    let outcome = h
        .jukebox
        .enqueue_playlist(TENANT, PLAYLIST, &requester(), false)
        .await
        .unwrap();
    assert_eq!(outcome.total, 4);
    assert_eq!(outcome.queued, 4);
    assert_eq!(outcome.failed, 0);
    assert!(!outcome.cancelled);

    let next = h.store.peek_next(TENANT, 10).await.unwrap();
    let order: Vec<_> = next.iter().map(|e| e.track.id.as_str()).collect();
    assert_eq!(order, vec!["p1", "p2", "p3", "p4"]);
}

#[tokio::test]
async fn failed_entries_are_counted_not_fatal() {
    let h = harness();
    h.resolver.add_playlist(PLAYLIST, &["p1", "missing", "p3"]);

    let outcome = h
        .jukebox
        .enqueue_playlist(TENANT, PLAYLIST, &requester(), false)
        .await
        .unwrap();
    assert_eq!(outcome.total, 3);
    assert_eq!(outcome.queued, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(h.jukebox.count(TENANT).await.unwrap(), 2);
}

#[tokio::test]
async fn unknown_playlist_is_an_error() {
    let h = harness();
    let err = h
        .jukebox
        .enqueue_playlist(TENANT, "https://www.youtube.com/playlist?list=nope", &requester(), false)
        .await
        .unwrap_err();
    assert_matches!(err, PlayerError::Resolve(ResolveError::NotFound(_)));
}

#[tokio::test]
async fn skip_all_stops_expansion() {
    let mut h = harness();
    let ids = ["p1", "p2", "p3", "p4", "p5", "p6"];
    h.resolver.add_playlist(PLAYLIST, &ids);
    for id in ids {
        h.resolver.delay(id, Duration::from_millis(60));
    }

    let jukebox = h.jukebox.clone();
    let expansion = tokio::spawn(async move {
        jukebox
            .enqueue_playlist(TENANT, PLAYLIST, &requester(), false)
            .await
    });

    h.wait_for(|e| matches!(e, QueueEvent::Added { .. })).await;
    h.jukebox.skip_all(TENANT).await.unwrap();

    let outcome = expansion.await.unwrap().unwrap();
    assert!(outcome.cancelled);
    assert!(outcome.queued < outcome.total);
    // Everything inserted before the sweep was marked; nothing came after.
    assert_eq!(h.jukebox.count(TENANT).await.unwrap(), 0);
}
