//! Error types for plugin hosting and streaming sessions.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Resolving,
    Instantiation,
    Negotiation,
    Preparation,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStage::Resolving => write!(f, "resolving descriptor"),
            LoadStage::Instantiation => write!(f, "creating instance"),
            LoadStage::Negotiation => write!(f, "negotiating bus layout"),
            LoadStage::Preparation => write!(f, "preparing processor"),
        }
    }
}

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Plugin load failed at {stage} stage: {id}\n  Reason: {reason}")]
    LoadFailed {
        id: String,
        stage: LoadStage,
        reason: String,
    },

    #[error("Buffer has not enough channels: needed {needed}, received {received}")]
    InsufficientChannels { needed: usize, received: usize },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Control thread error: {0}")]
    ControlThread(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    pub fn load_failed(id: impl Into<String>, stage: LoadStage, reason: impl Into<String>) -> Self {
        HostError::LoadFailed {
            id: id.into(),
            stage,
            reason: reason.into(),
        }
    }

    /// Streaming errors end the session; everything else is reported to the caller.
    pub fn is_fatal_for_session(&self) -> bool {
        matches!(
            self,
            HostError::InsufficientChannels { .. }
                | HostError::Transport(_)
                | HostError::ConnectionClosed
                | HostError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, HostError>;
