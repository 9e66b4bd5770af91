use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Channel, HighlightRow, MessageRow};

/// Tables that publish row changes on the realtime feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Messages,
    Highlights,
    Channels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Insert,
    Update,
}

/// The changed row, as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "record", rename_all = "snake_case")]
pub enum ChangeRow {
    Messages(MessageRow),
    Highlights(HighlightRow),
    Channels(Channel),
}

impl ChangeRow {
    pub fn table(&self) -> Table {
        match self {
            Self::Messages(_) => Table::Messages,
            Self::Highlights(_) => Table::Highlights,
            Self::Channels(_) => Table::Channels,
        }
    }

    /// Channel the row belongs to. Every published table is channel-scoped.
    pub fn channel_id(&self) -> i64 {
        match self {
            Self::Messages(m) => m.channel_id,
            Self::Highlights(h) => h.channel_id,
            Self::Channels(c) => c.id,
        }
    }
}

/// A row-level change published by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub row: ChangeRow,
}

impl ChangeEvent {
    pub fn insert(row: ChangeRow) -> Self {
        Self { kind: ChangeKind::Insert, row }
    }

    pub fn update(row: ChangeRow) -> Self {
        Self { kind: ChangeKind::Update, row }
    }
}

/// Server-side filter for a subscription: one table, optionally one channel,
/// optionally one change kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFilter {
    pub table: Table,
    #[serde(default)]
    pub channel_id: Option<i64>,
    #[serde(default)]
    pub kind: Option<ChangeKind>,
}

impl ChangeFilter {
    /// Inserts into `table` whose channel reference equals `channel_id`.
    pub fn inserts(table: Table, channel_id: i64) -> Self {
        Self {
            table,
            channel_id: Some(channel_id),
            kind: Some(ChangeKind::Insert),
        }
    }

    /// Every change on `table`.
    pub fn all(table: Table) -> Self {
        Self {
            table,
            channel_id: None,
            kind: None,
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.row.table() == self.table
            && self.channel_id.is_none_or(|id| id == event.row.channel_id())
            && self.kind.is_none_or(|k| k == event.kind)
    }
}

/// Commands sent FROM client TO server over the realtime socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeCommand {
    /// Authenticate the socket (optional; reads are public).
    Identify { token: String },

    /// Open a filtered subscription under a client-chosen topic id.
    Subscribe { topic: Uuid, filter: ChangeFilter },

    /// Close a subscription.
    Unsubscribe { topic: Uuid },
}

/// Frames sent FROM server TO client over the realtime socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeFrame {
    Ready { user_id: Option<Uuid> },
    Subscribed { topic: Uuid },
    Unsubscribed { topic: Uuid },
    Change { topic: Uuid, event: ChangeEvent },
    /// `topic` is set when the error refers to one subscription request.
    Error {
        #[serde(default)]
        topic: Option<Uuid>,
        message: String,
    },
}
