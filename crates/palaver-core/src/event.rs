use serde::{Deserialize, Serialize};

use crate::model::{Group, Message};

/// Named event channels on the notification bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    MessageAdded,
    GroupAdded,
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Topic::MessageAdded => "message_added",
            Topic::GroupAdded => "group_added",
        };
        f.write_str(name)
    }
}

/// Event envelope relayed by the bus. The bus owns no data: each event is a
/// full materialized copy of the record storage just wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    MessageAdded { message: Message },
    GroupAdded { group: Group },
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::MessageAdded { .. } => Topic::MessageAdded,
            Event::GroupAdded { .. } => Topic::GroupAdded,
        }
    }
}
