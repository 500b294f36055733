//! # Linkboard
//!
//! A synchronization engine for an ordered, partially public link list,
//! built around optimistic local mutation and authoritative backend
//! confirmation.
//!
//! ## Architecture
//!
//! This crate follows Clean Architecture principles with clear layer separation:
//!
//! - **Domain Layer** ([`domain`]) - Core business entities, the gateway
//!   trait, and change events
//! - **Application Layer** ([`application`]) - The board: local mirror,
//!   mutation pipelines, drag sessions, and realtime merging
//! - **Infrastructure Layer** ([`infrastructure`]) - Gateway
//!   implementations
//!
//! ## Features
//!
//! - Mutations apply locally first and roll back precisely on rejection
//! - Per-link FIFO ordering for concurrent mutations, with provisional
//!   ids redirected once the backend assigns real ones
//! - Drag reorder as a session: live preview, minimal renumbering diff,
//!   one atomic batch
//! - Public link cap enforced before the network is touched
//! - Realtime changes merged continuously, buffered while they would
//!   tear visible state, with automatic resync when the channel is lost
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use linkboard::config::SyncConfig;
//! use linkboard::domain::entities::LinkDraft;
//! use linkboard::infrastructure::InMemoryBackend;
//! use linkboard::LinkBoard;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = InMemoryBackend::new();
//!     let gateway = Arc::new(backend.gateway_for("owner-1"));
//!
//!     let board = LinkBoard::connect(gateway, "owner-1", SyncConfig::default()).await?;
//!     board
//!         .add_link(LinkDraft {
//!             title: "My Blog".into(),
//!             url: "https://example.com/blog".into(),
//!             is_public: true,
//!         })
//!         .await?;
//!
//!     for link in board.snapshot() {
//!         println!("{} {}", link.position, link.title);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Engine limits are loaded from environment variables via
//! [`config::SyncConfig`]. See [`config`] module for available options.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod utils;

pub mod config;

pub use application::LinkBoard;
pub use error::SyncError;

/// Commonly used types for external consumers.
///
/// Re-exports frequently used types to simplify imports for library users
/// and integration tests.
pub mod prelude {
    pub use crate::application::LinkBoard;
    pub use crate::config::SyncConfig;
    pub use crate::domain::entities::{Link, LinkDraft, LinkPatch};
    pub use crate::domain::{ChannelStatus, LinkGateway};
    pub use crate::error::{SyncError, SyncErrorKind};
    pub use crate::infrastructure::InMemoryBackend;
}
