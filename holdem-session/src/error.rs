//! Session-layer error taxonomy. `CoreError` covers game-rule rejections;
//! this covers the transport/session concerns that sit in front of it.

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("missing or malformed bearer token")]
    MalformedToken,

    #[error("bearer token expired or revoked")]
    ExpiredToken,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("send queue full, disconnecting slow consumer")]
    SlowConsumer,

    #[error("session expired")]
    SessionExpired,

    #[error("no table registered with that id")]
    TableNotFound,
}

impl SessionError {
    /// Matches the §6 client-protocol error code table.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::MalformedToken => "malformed_token",
            SessionError::ExpiredToken => "expired_token",
            SessionError::UnknownType(_) => "unknown_type",
            SessionError::SlowConsumer => "slow_consumer",
            SessionError::SessionExpired => "session_expired",
            SessionError::TableNotFound => "table_not_found",
        }
    }

    pub fn details(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let SessionError::UnknownType(t) = self {
            map.insert("type".to_string(), t.clone());
        }
        map
    }
}
