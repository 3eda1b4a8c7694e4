// src/protocol/message.rs
//! Message envelope and typed message kinds
//!
//! Construction is type-first: each kind fixes its `type` tag and callers
//! only supply the value and detail. A `ClientMessage` is immutable once
//! built.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Message type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    SystemOut,
    Status,
    Exception,
    Debug,
    Neighborhood,
    Theater,
    Playground,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::SystemOut => "SYSTEM_OUT",
            MessageType::Status => "STATUS",
            MessageType::Exception => "EXCEPTION",
            MessageType::Debug => "DEBUG",
            MessageType::Neighborhood => "NEIGHBORHOOD",
            MessageType::Theater => "THEATER",
            MessageType::Playground => "PLAYGROUND",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detail vocabulary shared by all producers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DetailKey {
    Id,
    X,
    Y,
    Color,
    Status,
    Url,
    FileName,
    ContentType,
    ClassName,
    Cause,
    FallbackMessage,
    ExitCode,
    ConnectionId,
}

/// Ordered detail map
pub type Detail = BTreeMap<DetailKey, String>;

/// Whether a message is delivered unconditionally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendPolicy {
    #[default]
    AlwaysSend,
    /// Only delivered when the transport opted into introspection traffic
    Conditional,
}

/// Wire envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    message_type: MessageType,
    value: String,
    #[serde(default)]
    detail: Detail,
    #[serde(skip)]
    send_policy: SendPolicy,
}

impl ClientMessage {
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn detail(&self) -> &Detail {
        &self.detail
    }

    pub fn detail_value(&self, key: DetailKey) -> Option<&str> {
        self.detail.get(&key).map(String::as_str)
    }

    pub fn send_policy(&self) -> SendPolicy {
        self.send_policy
    }

    pub fn should_always_send(&self) -> bool {
        self.send_policy == SendPolicy::AlwaysSend
    }

    /// Serialize to the JSON wire shape
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A concrete message kind
///
/// Implementors fix the type tag; `should_always_send` may be overridden
/// for messages that only exist for introspection.
pub trait ClientMessageKind {
    fn message_type(&self) -> MessageType;

    fn value(&self) -> String;

    fn detail(&self) -> Detail {
        Detail::new()
    }

    fn should_always_send(&self) -> bool {
        true
    }
}

impl<T: ClientMessageKind> From<T> for ClientMessage {
    fn from(kind: T) -> Self {
        let send_policy = if kind.should_always_send() {
            SendPolicy::AlwaysSend
        } else {
            SendPolicy::Conditional
        };

        ClientMessage {
            message_type: kind.message_type(),
            value: kind.value(),
            detail: kind.detail(),
            send_policy,
        }
    }
}

/// Console text produced by the hosted program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemOut(pub String);

impl ClientMessageKind for SystemOut {
    fn message_type(&self) -> MessageType {
        MessageType::SystemOut
    }

    fn value(&self) -> String {
        self.0.clone()
    }
}

/// Session lifecycle status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKey {
    Compiling,
    CompilationSuccessful,
    Running,
    TimeoutWarning,
    Exited,
}

impl StatusKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKey::Compiling => "COMPILING",
            StatusKey::CompilationSuccessful => "COMPILATION_SUCCESSFUL",
            StatusKey::Running => "RUNNING",
            StatusKey::TimeoutWarning => "TIMEOUT_WARNING",
            StatusKey::Exited => "EXITED",
        }
    }
}

/// Lifecycle status signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub key: StatusKey,
    pub detail: Detail,
}

impl StatusMessage {
    pub fn new(key: StatusKey) -> Self {
        Self {
            key,
            detail: Detail::new(),
        }
    }

    pub fn with_detail(mut self, key: DetailKey, value: impl Into<String>) -> Self {
        self.detail.insert(key, value.into());
        self
    }
}

impl ClientMessageKind for StatusMessage {
    fn message_type(&self) -> MessageType {
        MessageType::Status
    }

    fn value(&self) -> String {
        self.key.as_str().to_string()
    }

    fn detail(&self) -> Detail {
        self.detail.clone()
    }
}

/// User-facing error notification carrying a symbolic key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionMessage {
    pub key: String,
    pub detail: Detail,
}

impl ClientMessageKind for ExceptionMessage {
    fn message_type(&self) -> MessageType {
        MessageType::Exception
    }

    fn value(&self) -> String {
        self.key.clone()
    }

    fn detail(&self) -> Detail {
        self.detail.clone()
    }
}

/// Introspection-only signal; real clients never need it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMessage {
    pub value: String,
    pub detail: Detail,
}

impl DebugMessage {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            detail: Detail::new(),
        }
    }
}

impl ClientMessageKind for DebugMessage {
    fn message_type(&self) -> MessageType {
        MessageType::Debug
    }

    fn value(&self) -> String {
        self.value.clone()
    }

    fn detail(&self) -> Detail {
        self.detail.clone()
    }

    fn should_always_send(&self) -> bool {
        false
    }
}
