//! Realtime change notifications flowing from the backend to the engine.

use crate::domain::entities::Link;

/// One remote change to a link row, as broadcast by the backend.
///
/// Events are delivered per row. A backend-side delete that renumbers the
/// survivors arrives as one `Deleted` plus one `Updated` per shifted row.
#[derive(Debug, Clone)]
pub enum LinkChange {
    /// A link came into existence, including echoes of this client's own
    /// creates.
    Inserted(Link),
    /// Full authoritative state of an existing link.
    Updated(Link),
    /// A link is gone. Carries only the identifiers since the row no
    /// longer exists.
    Deleted { id: String, owner_id: String },
}

impl LinkChange {
    pub fn link_id(&self) -> &str {
        match self {
            Self::Inserted(link) | Self::Updated(link) => &link.id,
            Self::Deleted { id, .. } => id,
        }
    }

    pub fn owner_id(&self) -> &str {
        match self {
            Self::Inserted(link) | Self::Updated(link) => &link.owner_id,
            Self::Deleted { owner_id, .. } => owner_id,
        }
    }
}

/// Wire unit of the subscription channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Changed(LinkChange),
    /// The backend dropped events (slow consumer, transport hiccup).
    /// Everything received afterwards would be misleading; the engine must
    /// resynchronize from a full list.
    Interrupted,
}

/// Health of the realtime subscription, observable by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Events are flowing.
    Live,
    /// The channel was lost; a resubscribe attempt is scheduled or running.
    Reconnecting { attempt: u32 },
    /// Reconnecting was abandoned (e.g. the backend revoked access).
    /// Local state stops receiving remote updates.
    Lost,
}
