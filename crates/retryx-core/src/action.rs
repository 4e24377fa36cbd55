//! Categories of work executed through the retry helper.
//!
//! The kind of an action selects its default timeout and labels every
//! metric recorded for it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of action categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AccountUpdate,
    ChangeUpdate,
    GroupUpdate,
    IndexQuery,
    PluginUpdate,
    RestRequest,
}

impl ActionKind {
    /// Every variant, in declaration order.
    pub const ALL: [ActionKind; 6] = [
        ActionKind::AccountUpdate,
        ActionKind::ChangeUpdate,
        ActionKind::GroupUpdate,
        ActionKind::IndexQuery,
        ActionKind::PluginUpdate,
        ActionKind::RestRequest,
    ];

    /// Label used in metrics and logs (e.g. `CHANGE_UPDATE`).
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::AccountUpdate => "ACCOUNT_UPDATE",
            ActionKind::ChangeUpdate => "CHANGE_UPDATE",
            ActionKind::GroupUpdate => "GROUP_UPDATE",
            ActionKind::IndexQuery => "INDEX_QUERY",
            ActionKind::PluginUpdate => "PLUGIN_UPDATE",
            ActionKind::RestRequest => "REST_REQUEST",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Returned when a string names no known action kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action kind: {0}")]
pub struct UnknownActionKind(pub String);

impl FromStr for ActionKind {
    type Err = UnknownActionKind;

    /// Accepts `CHANGE_UPDATE`, `change_update` and `change-update`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| UnknownActionKind(s.to_string()))
    }
}
