// ── Data layer errors ──
//
// Every failure the registry can report through a Result or a batch
// outcome. Transport-layer errors from deckathlon-api are translated by
// the `From` impl below; callers never see raw reqwest errors.

use thiserror::Error;

/// Unified error type for the core crate.
///
/// Cloneable so a batch outcome can be handed to several listeners.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    // ── Network ──────────────────────────────────────────────────────
    /// No response arrived at all.
    #[error("Error contacting server.")]
    Transport { url: String, message: String },

    /// Non-2xx status, or a 2xx body carrying an error envelope.
    #[error("{message}")]
    Server {
        url: String,
        status: u16,
        message: String,
    },

    /// HTTP 401 nobody re-authenticated for.
    #[error("Not authorized: {url}")]
    Unauthorized { url: String },

    // ── Data ─────────────────────────────────────────────────────────
    /// Delete refused because other rows still reference the items.
    #[error("Cannot delete {type_name} item #{}: there are related rows.", ids.join(", #"))]
    Integrity { type_name: String, ids: Vec<String> },

    /// Partial failures of a save or remove batch.
    #[error("{}", messages.join(" "))]
    Batch { messages: Vec<String> },

    #[error("Unknown entity type: {type_name}")]
    UnknownType { type_name: String },

    #[error("Invalid payload from {url}: {message}")]
    InvalidPayload { url: String, message: String },
}

impl DataError {
    /// Generic message for an error status with no `{error}` body.
    pub fn server_status(url: &str, status: u16, reason: Option<&str>) -> Self {
        Self::Server {
            url: url.to_owned(),
            status,
            message: format!(
                "Error posting to {url}, result: {status} ({})",
                reason.unwrap_or_default()
            ),
        }
    }

    /// Attach the request URL to an error converted without one.
    pub fn at(self, url: &str) -> Self {
        match self {
            Self::Transport { url: found, message } if found.is_empty() => Self::Transport {
                url: url.to_owned(),
                message,
            },
            Self::InvalidPayload { url: found, message } if found.is_empty() => {
                Self::InvalidPayload {
                    url: url.to_owned(),
                    message,
                }
            }
            other => other,
        }
    }

    /// Collapse several failures into one, or `None` if there were none.
    pub fn batch(errors: Vec<DataError>) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        Some(Self::Batch {
            messages: errors.iter().map(ToString::to_string).collect(),
        })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<deckathlon_api::Error> for DataError {
    fn from(err: deckathlon_api::Error) -> Self {
        match err {
            deckathlon_api::Error::Transport(ref e) => Self::Transport {
                url: e.url().map(ToString::to_string).unwrap_or_default(),
                message: e.to_string(),
            },
            deckathlon_api::Error::InvalidUrl(e) => Self::InvalidPayload {
                url: String::new(),
                message: format!("Invalid URL: {e}"),
            },
            deckathlon_api::Error::Encoding(e) => Self::InvalidPayload {
                url: String::new(),
                message: e.to_string(),
            },
            deckathlon_api::Error::Tls(message) => Self::Transport {
                url: String::new(),
                message,
            },
        }
    }
}
