//! Link entity representing one row of a user's link list.

use chrono::{DateTime, Utc};
use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::utils::url_normalizer::normalize_url;

/// Maximum accepted length of a link title, in characters, after trimming.
pub const MAX_TITLE_LEN: usize = 50;

/// Prefix carried by ids the engine makes up before the server has spoken.
const PROVISIONAL_PREFIX: &str = "local-";

/// A single link in a user's ordered list.
///
/// `position` is the authoritative sort key and is kept dense (`0..N-1`
/// with no gaps or duplicates) within one owner's list. `created_at` and
/// `id` break ties if a transient state ever produces equal positions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    /// Normalized destination URL. See
    /// [`normalize_url`](crate::utils::url_normalizer::normalize_url).
    pub url: String,
    pub position: u32,
    pub is_public: bool,
    pub click_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Link {
    /// Creates a new Link instance.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        owner_id: String,
        title: String,
        url: String,
        position: u32,
        is_public: bool,
        click_count: u64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            title,
            url,
            position,
            is_public,
            click_count,
            created_at,
            updated_at,
        }
    }

    /// Returns true if this row still carries an engine-generated id,
    /// i.e. its creation has not been confirmed by the backend yet.
    pub fn is_provisional(&self) -> bool {
        is_provisional_id(&self.id)
    }
}

/// User input for creating a link.
///
/// `title` and `url` are validated and normalized by the engine before
/// anything touches local state or the gateway.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LinkDraft {
    #[validate(custom(function = "validate_title_field"))]
    pub title: String,
    #[validate(custom(function = "validate_url_field"))]
    pub url: String,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

/// Partial update for an existing link.
///
/// `None` fields are left unchanged. Position and visibility move through
/// their own operations, never through a patch.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LinkPatch {
    #[validate(custom(function = "validate_title_field"))]
    pub title: Option<String>,
    #[validate(custom(function = "validate_url_field"))]
    pub url: Option<String>,
}

impl LinkPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.url.is_none()
    }
}

/// Gateway-bound data for creating a link. Already validated and
/// normalized; the backend assigns the id and the final position.
#[derive(Debug, Clone)]
pub struct NewLink {
    pub owner_id: String,
    pub title: String,
    pub url: String,
    pub position: u32,
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

/// Errors that can occur while normalizing a link title.
#[derive(Debug, thiserror::Error)]
pub enum TitleError {
    #[error("Title must not be empty")]
    Empty,

    #[error("Title must be at most {MAX_TITLE_LEN} characters, got {0}")]
    TooLong(usize),

    #[error("Title must not contain line breaks")]
    MultiLine,
}

/// Normalizes a raw title: trims surrounding whitespace and enforces the
/// single-line, 1..=[`MAX_TITLE_LEN`] character rule.
///
/// # Errors
///
/// Returns [`TitleError`] when the trimmed title is empty, too long, or
/// spans multiple lines.
pub fn normalize_title(raw: &str) -> Result<String, TitleError> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(TitleError::Empty);
    }

    let char_count = trimmed.chars().count();
    if char_count > MAX_TITLE_LEN {
        return Err(TitleError::TooLong(char_count));
    }

    if trimmed.contains(['\r', '\n']) {
        return Err(TitleError::MultiLine);
    }

    Ok(trimmed.to_string())
}

/// Key under which a title competes for uniqueness. Case-insensitive.
pub fn title_key(title: &str) -> String {
    title.to_lowercase()
}

/// Returns true for ids generated by [`provisional_id`].
pub fn is_provisional_id(id: &str) -> bool {
    id.starts_with(PROVISIONAL_PREFIX)
}

/// Generates a placeholder id for an optimistically created link.
///
/// The backend assigns the real id; the placeholder only has to be unique
/// within one board session and recognizable as local.
pub(crate) fn provisional_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("{PROVISIONAL_PREFIX}{suffix}")
}

fn validate_title_field(title: &str) -> Result<(), ValidationError> {
    normalize_title(title).map(drop).map_err(|e| {
        let mut err = ValidationError::new("title");
        err.message = Some(e.to_string().into());
        err
    })
}

fn validate_url_field(url: &str) -> Result<(), ValidationError> {
    normalize_url(url).map(drop).map_err(|e| {
        let mut err = ValidationError::new("url");
        err.message = Some(e.to_string().into());
        err
    })
}
