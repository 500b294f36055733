//! Utility functions for URL processing.
//!
//! - [`url_normalizer`] - Destination URL normalization, screening, and
//!   uniqueness keys

pub mod url_normalizer;
