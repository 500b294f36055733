//! Domain layer containing business entities and contracts.
//!
//! This module defines entities, the gateway interface, and domain rules
//! independent of any concrete backend.
//!
//! # Architecture
//!
//! - [`entities`] - Core business data structures and their shaping rules
//! - [`gateway`] - Authoritative backend trait, implemented by
//!   infrastructure
//! - [`change_event`] - Realtime change notifications and channel health
//! - [`policy`] - Visibility cap rules
//!
//! # Design Principles
//!
//! - The domain layer has no dependency on infrastructure or on the
//!   engine's internal state machinery
//! - The gateway trait defines the contract; implementations live in
//!   [`crate::infrastructure`]
//! - Mock implementations are auto-generated via `mockall` for testing

pub mod change_event;
pub mod entities;
pub mod gateway;
pub mod policy;

pub use change_event::{ChannelEvent, ChannelStatus, LinkChange};
pub use gateway::{LinkGateway, PositionUpdate};

#[cfg(test)]
pub use gateway::MockLinkGateway;
