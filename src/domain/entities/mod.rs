//! Core domain entities representing the business data model.
//!
//! # Entity Types
//!
//! - [`Link`] - One row of a user's ordered link list
//! - [`LinkDraft`] - User input for creating a link
//! - [`LinkPatch`] - Partial update to title/url
//! - [`NewLink`] - Validated, gateway-bound creation data
//!
//! # Design Pattern
//!
//! Entities are plain data structures; the rules that shape them
//! (title normalization, URL screening) live next to them as free
//! functions so that every layer applies the same ones.

pub mod link;

pub use link::{
    is_provisional_id, normalize_title, title_key, Link, LinkDraft, LinkPatch, NewLink,
    TitleError, MAX_TITLE_LEN,
};
