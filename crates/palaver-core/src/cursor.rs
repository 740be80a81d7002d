use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::MessageId;

/// Opaque pagination token carrying exactly one message identifier. The
/// encoding is purely syntactic (base64 over the decimal id); callers must
/// never compare or interpret the encoded form, only round-trip it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("malformed pagination cursor")]
    Malformed,
}

impl Cursor {
    pub fn encode(id: MessageId) -> Self {
        Cursor(STANDARD_NO_PAD.encode(id.0.to_string()))
    }

    pub fn decode(raw: &str) -> Result<MessageId, CursorError> {
        let bytes = STANDARD_NO_PAD
            .decode(raw)
            .map_err(|_| CursorError::Malformed)?;
        let text = String::from_utf8(bytes).map_err(|_| CursorError::Malformed)?;
        let id = text.parse::<i64>().map_err(|_| CursorError::Malformed)?;
        Ok(MessageId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
