//! Application layer implementing the synchronization engine.
//!
//! This layer holds the local mirror of one owner's link list and keeps
//! it converging with the backend: optimistic mutations with rollback,
//! per-link FIFO admission, the drag-reorder session, and the realtime
//! merge task.
//!
//! # Components
//!
//! - [`board::LinkBoard`] - Public entry point; one instance per owner
//! - [`store`] - Local link mirror and rollback plans
//! - [`mutation_queue`] - Per-link FIFO admission and provisional id
//!   aliasing
//! - [`reorder`] - Drag session state machine and minimal renumbering
//! - [`merge`] - Realtime event routing, buffering, and resync
//!
//! Mutation pipelines live in `coordinator`; they are methods on
//! [`board::LinkBoard`].

pub mod board;
mod coordinator;
pub(crate) mod merge;
pub(crate) mod mutation_queue;
pub(crate) mod reorder;
pub(crate) mod store;

pub use board::LinkBoard;
