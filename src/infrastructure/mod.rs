//! Infrastructure layer for backend integrations.
//!
//! This layer implements the gateway interface defined by the domain
//! layer, providing concrete link storage and change notification.
//!
//! # Modules
//!
//! - [`memory`] - In-memory backend for demos and tests

pub mod memory;

pub use memory::{InMemoryBackend, InMemoryGateway};
