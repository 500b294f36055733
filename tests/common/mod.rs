#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use linkboard::config::SyncConfig;
use linkboard::domain::entities::{LinkDraft, LinkPatch};
use linkboard::infrastructure::{InMemoryBackend, InMemoryGateway};
use linkboard::LinkBoard;

pub const OWNER: &str = "owner-1";

pub async fn connect_board(backend: &InMemoryBackend) -> LinkBoard<InMemoryGateway> {
    connect_board_as(backend, OWNER, SyncConfig::default()).await
}

pub async fn connect_board_with(
    backend: &InMemoryBackend,
    config: SyncConfig,
) -> LinkBoard<InMemoryGateway> {
    connect_board_as(backend, OWNER, config).await
}

pub async fn connect_board_as(
    backend: &InMemoryBackend,
    owner: &str,
    config: SyncConfig,
) -> LinkBoard<InMemoryGateway> {
    let gateway = Arc::new(backend.gateway_for(owner));
    LinkBoard::connect(gateway, owner, config).await.unwrap()
}

pub fn draft(title: &str, url: &str) -> LinkDraft {
    LinkDraft {
        title: title.to_string(),
        url: url.to_string(),
        is_public: true,
    }
}

pub fn private_draft(title: &str, url: &str) -> LinkDraft {
    LinkDraft {
        is_public: false,
        ..draft(title, url)
    }
}

pub fn title_patch(title: &str) -> LinkPatch {
    LinkPatch {
        title: Some(title.to_string()),
        url: None,
    }
}

/// Adds `count` private links named `Link {i}` and returns their server
/// ids in list order. Private so that tests control the public cap
/// explicitly.
pub async fn seed_links(board: &LinkBoard<InMemoryGateway>, count: usize) -> Vec<String> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let link = board
            .add_link(private_draft(
                &format!("Link {i}"),
                &format!("https://example.com/{i}"),
            ))
            .await
            .unwrap();
        ids.push(link.id);
    }
    ids
}

/// Gives the background merge task time to route whatever is in flight.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn ids_of(board: &LinkBoard<InMemoryGateway>) -> Vec<String> {
    board.snapshot().into_iter().map(|l| l.id).collect()
}

pub fn titles_of(board: &LinkBoard<InMemoryGateway>) -> Vec<String> {
    board.snapshot().into_iter().map(|l| l.title).collect()
}

pub fn positions_of(board: &LinkBoard<InMemoryGateway>) -> Vec<u32> {
    board.snapshot().into_iter().map(|l| l.position).collect()
}

pub fn clicks_on(board: &LinkBoard<InMemoryGateway>, id: &str) -> u64 {
    board
        .snapshot()
        .into_iter()
        .find(|l| l.id == id)
        .map(|l| l.click_count)
        .unwrap_or(0)
}
