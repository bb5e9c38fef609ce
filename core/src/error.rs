//! Error types for the CI server client.
//!
//! # Design
//! "Could not reach the server" (`Transport`) and "the server answered with
//! a status we do not accept" (`Status`) are separate variants, so a network
//! outage can never be read as a resource that does not exist. The status
//! code is the whole payload of `Status`; failure bodies are logged, not
//! parsed.

use std::path::PathBuf;

use thiserror::Error;

use crate::decode::DecodeError;

/// Errors returned by the client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never got a response.
    #[error("could not reach {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    /// The server answered with a status the operation does not accept.
    #[error("{path} returned status {status}")]
    Status { status: u16, path: String },

    /// A structured body the caller needs could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A multipart attachment could not be read.
    #[error("could not read attachment {}: {source}", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    /// The wire request could not be assembled.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// The HTTP status carried by a `Status` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport { .. })
    }
}
