//! Realtime change notifications.

use serde::{Deserialize, Serialize};

/// Collections that publish change events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Posts,
    Comments,
    Communities,
    MessRatings,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Posts => "posts",
            Table::Comments => "comments",
            Table::Communities => "communities",
            Table::MessRatings => "mess_ratings",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row change pushed over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub revision: i64,
    pub table: Table,
    pub kind: ChangeKind,
    pub record: serde_json::Value,
}

/// Query parameters for the realtime endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeQuery {
    pub table: Table,
}
