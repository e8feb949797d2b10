//! Shared data types for the Chatter server.
//!
//! This module defines the documents kept by the store ([`Message`], [`User`])
//! and the realtime wire protocol ([`ClientEvent`], [`ServerEvent`]).
//!
//! # Wire Format
//!
//! Every realtime frame is a JSON text frame of the form
//! `{"event": "<name>", "data": <payload>}`. Events without a payload omit
//! `data`.
//!
//! ```json
//! {"event": "send-message", "data": {"text": "hi", "username": "alice"}}
//! {"event": "clients-total", "data": 2}
//! ```

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// A chat message document.
///
/// Messages are immutable once created. Timestamps are kept at millisecond
/// precision so that every backend returns the same value it was given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Builds a message document from a client payload.
    ///
    /// Assigns a random id when the client did not send one and stamps the
    /// creation time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if `text` or `username` is empty.
    pub fn create(new: NewMessage) -> Result<Self, StoreError> {
        if new.text.is_empty() {
            return Err(StoreError::validation("`text` is required"));
        }
        if new.username.is_empty() {
            return Err(StoreError::validation("`username` is required"));
        }

        let id = match new.id {
            Some(id) if !id.is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };

        Ok(Self {
            id,
            text: new.text,
            username: new.username,
            created_at: Utc::now().trunc_subsecs(3),
        })
    }
}

/// Payload of a `send-message` event.
///
/// Missing fields deserialize as empty and are rejected by
/// [`Message::create`]. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub username: String,
}

impl NewMessage {
    /// Convenience constructor for a payload without a client-side id.
    pub fn new(text: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            username: username.into(),
        }
    }
}

/// Profile keys that collide with the named [`User`] fields.
const RESERVED_FIELDS: [&str; 2] = ["id", "email"];

/// A user profile document.
///
/// Only `id` and `email` are known to the relay; any other profile fields
/// the store holds are carried through untouched. `profile` never holds an
/// `id` or `email` key, since it is flattened next to them when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            profile: Map::new(),
        }
    }

    /// Adds a profile field (builder pattern).
    ///
    /// `id` and `email` are ignored; set them through [`User::new`].
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if !RESERVED_FIELDS.contains(&key.as_str()) {
            self.profile.insert(key, value.into());
        }
        self
    }

    /// Drops profile entries named `id` or `email`.
    #[must_use]
    pub fn without_reserved_fields(mut self) -> Self {
        self.profile
            .retain(|key, _| !RESERVED_FIELDS.contains(&key.as_str()));
        self
    }
}

/// Errors raised while decoding a realtime frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not JSON, or not a known `{"event", "data"}` shape.
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] serde_json::Error),
}

/// Events sent by a realtime client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Request the history snapshot taken at connect time.
    GetMessage,
    /// Persist a message and rebroadcast the collection.
    SendMessage(NewMessage),
    /// Relay a typing/feedback hint to every other session.
    Feedback(String),
}

impl ClientEvent {
    /// Parses a text frame into a client event.
    pub fn from_frame(frame: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetMessage => "get-message",
            Self::SendMessage(_) => "send-message",
            Self::Feedback(_) => "feedback",
        }
    }
}

/// Events emitted by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Reply to `get-message` with the ordered history.
    InitMessage(Vec<Message>),
    /// Full collection after a successful send.
    ChatMessage(Vec<Message>),
    /// Feedback relayed from another session.
    FeedbackCheck(String),
    /// Number of connected sessions.
    ClientsTotal(usize),
}

impl ServerEvent {
    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InitMessage(_) => "init-message",
            Self::ChatMessage(_) => "chat-message",
            Self::FeedbackCheck(_) => "feedback-check",
            Self::ClientsTotal(_) => "clients-total",
        }
    }
}
