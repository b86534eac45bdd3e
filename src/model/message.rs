use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Unique, strictly increasing message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct MessageId(pub u64);

/// Who authored a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    /// Role name used when replaying history to the assistant.
    pub fn role(self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

/// One immutable transcript entry. Created only by the scene store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ConversationMessage {
    pub id: MessageId,
    pub sender: Sender,
    pub content: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}
