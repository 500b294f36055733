mod common;

use std::time::Duration;

use linkboard::config::SyncConfig;
use linkboard::domain::ChannelStatus;
use linkboard::infrastructure::InMemoryBackend;
use linkboard::SyncError;
use serde_json::json;

// ─── CONVERGENCE ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_two_boards_converge() {
    let backend = InMemoryBackend::new();
    let phone = common::connect_board(&backend).await;
    let laptop = common::connect_board(&backend).await;

    let ids = common::seed_links(&phone, 2).await;
    common::settle().await;
    assert_eq!(common::ids_of(&laptop), ids);

    laptop.delete_link(&ids[0]).await.unwrap();
    common::settle().await;
    assert_eq!(common::ids_of(&phone), vec![ids[1].clone()]);
    assert_eq!(common::positions_of(&phone), vec![0]);
}

#[tokio::test]
async fn test_clicks_stream_to_watchers() {
    let backend = InMemoryBackend::new();
    let board = common::connect_board(&backend).await;
    let ids = common::seed_links(&board, 1).await;
    let mut watcher = board.subscribe();

    backend.record_click(&ids[0]).unwrap();
    common::settle().await;

    watcher.changed().await.unwrap();
    let seen = watcher.borrow_and_update().clone();
    assert_eq!(seen[0].click_count, 1);
}

// ─── DEFERRAL ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_events_for_inflight_link_deferred_until_confirm() {
    let backend = InMemoryBackend::new();
    let board = common::connect_board(&backend).await;
    let ids = common::seed_links(&board, 1).await;
    backend.set_latency(Duration::from_millis(120));

    let edit = board.edit_link(&ids[0], common::title_patch("New Title"));
    let probe = async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        backend.record_click(&ids[0]).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        board.snapshot()[0].clone()
    };
    let (edited, mid_flight) = tokio::join!(edit, probe);
    edited.unwrap();

    // Mid-flight: the optimistic title holds and the click stays parked,
    // so the row never shows a mixed state.
    assert_eq!(mid_flight.title, "New Title");
    assert_eq!(mid_flight.click_count, 0);

    common::settle().await;
    let settled = board.snapshot()[0].clone();
    assert_eq!(settled.title, "New Title");
    assert_eq!(settled.click_count, 1);
}

#[tokio::test]
async fn test_session_buffer_drains_on_cancel() {
    let backend = InMemoryBackend::new();
    let board = common::connect_board(&backend).await;
    let ids = common::seed_links(&board, 2).await;

    board.begin_drag(&ids[0]).unwrap();
    for _ in 0..3 {
        backend.record_click(&ids[1]).unwrap();
    }
    common::settle().await;

    // Parked while the drag is open.
    assert_eq!(common::clicks_on(&board, &ids[1]), 0);

    board.cancel_drag().unwrap();
    assert_eq!(common::clicks_on(&board, &ids[1]), 3);
}

#[tokio::test]
async fn test_no_duplicate_row_from_own_create_echo() {
    let backend = InMemoryBackend::new();
    backend.set_latency(Duration::from_millis(80));
    let board = common::connect_board(&backend).await;

    let created = board
        .add_link(common::draft("Blog", "https://example.com/blog"))
        .await
        .unwrap();
    common::settle().await;

    // The broadcast insert for our own create was folded into the
    // provisional row, never added next to it.
    let snapshot = board.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, created.id);
}

// ─── CHANNEL LOSS ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_channel_drop_resyncs_and_recovers_missed_changes() {
    let backend = InMemoryBackend::new();
    let board = common::connect_board(&backend).await;
    let ids = common::seed_links(&board, 1).await;

    backend.drop_channel(common::OWNER);
    // This lands while nobody is listening.
    backend.record_click(&ids[0]).unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(board.channel_status(), ChannelStatus::Live);
    assert_eq!(common::clicks_on(&board, &ids[0]), 1);

    // The fresh subscription delivers again.
    backend.record_click(&ids[0]).unwrap();
    common::settle().await;
    assert_eq!(common::clicks_on(&board, &ids[0]), 2);
}

#[tokio::test]
async fn test_interruption_marker_forces_resync() {
    let backend = InMemoryBackend::new();
    let board = common::connect_board(&backend).await;
    let ids = common::seed_links(&board, 1).await;

    backend.interrupt(common::OWNER);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(board.channel_status(), ChannelStatus::Live);
    backend.record_click(&ids[0]).unwrap();
    common::settle().await;
    assert_eq!(common::clicks_on(&board, &ids[0]), 1);
}

#[tokio::test]
async fn test_transient_resync_failures_retry_until_live() {
    let backend = InMemoryBackend::new();
    let board = common::connect_board(&backend).await;
    let ids = common::seed_links(&board, 1).await;

    backend.fail_next(SyncError::network("connection reset", json!({})));
    backend.fail_next(SyncError::network("connection reset", json!({})));
    backend.drop_channel(common::OWNER);
    backend.record_click(&ids[0]).unwrap();

    // Two failed attempts back off, the third lands.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(board.channel_status(), ChannelStatus::Live);
    assert_eq!(common::clicks_on(&board, &ids[0]), 1);
}

#[tokio::test]
async fn test_fatal_resync_failure_marks_channel_lost() {
    let backend = InMemoryBackend::new();
    let board = common::connect_board(&backend).await;
    let ids = common::seed_links(&board, 1).await;

    backend.fail_next(SyncError::permission_denied("Session expired", json!({})));
    backend.drop_channel(common::OWNER);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(board.channel_status(), ChannelStatus::Lost);

    // No channel, no resync: changes stop arriving on their own.
    backend.record_click(&ids[0]).unwrap();
    common::settle().await;
    assert_eq!(common::clicks_on(&board, &ids[0]), 0);

    // A manual refresh still reconciles the data.
    board.refresh().await.unwrap();
    assert_eq!(common::clicks_on(&board, &ids[0]), 1);
}

// ─── BUFFER OVERFLOW ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_buffer_overflow_falls_back_to_resync() {
    let backend = InMemoryBackend::new();
    let board = common::connect_board_with(
        &backend,
        SyncConfig {
            event_buffer_limit: 16,
            ..SyncConfig::default()
        },
    )
    .await;
    let ids = common::seed_links(&board, 2).await;

    board.begin_drag(&ids[0]).unwrap();
    for _ in 0..20 {
        backend.record_click(&ids[1]).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Only a resync can get these through while the drag is open.
    assert_eq!(common::clicks_on(&board, &ids[1]), 20);

    board.cancel_drag().unwrap();
    common::settle().await;
    assert_eq!(common::clicks_on(&board, &ids[1]), 20);
}
