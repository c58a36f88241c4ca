//! Wire types exchanged between the exam page and a proctoring worker.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message discriminant, as carried in the `type` field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Config,
    StartExamAttempt,
    EndExamAttempt,
    Ping,
    ExamAttemptStarted,
    ExamAttemptEnded,
    Echo,
}

impl MessageType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::StartExamAttempt => "startExamAttempt",
            Self::EndExamAttempt => "endExamAttempt",
            Self::Ping => "ping",
            Self::ExamAttemptStarted => "examAttemptStarted",
            Self::ExamAttemptEnded => "examAttemptEnded",
            Self::Echo => "echo",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host → worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    Config {
        #[serde(default)]
        options: Value,
    },
    StartExamAttempt,
    EndExamAttempt,
    Ping,
    #[serde(other)]
    Unknown,
}

impl HostMessage {
    /// Builds the bare prompt for a prompt-side message type.
    #[must_use]
    pub fn prompt(message_type: MessageType) -> Option<Self> {
        match message_type {
            MessageType::StartExamAttempt => Some(Self::StartExamAttempt),
            MessageType::EndExamAttempt => Some(Self::EndExamAttempt),
            MessageType::Ping => Some(Self::Ping),
            _ => None,
        }
    }

    #[must_use]
    pub fn message_type(&self) -> Option<MessageType> {
        match self {
            Self::Config { .. } => Some(MessageType::Config),
            Self::StartExamAttempt => Some(MessageType::StartExamAttempt),
            Self::EndExamAttempt => Some(MessageType::EndExamAttempt),
            Self::Ping => Some(MessageType::Ping),
            Self::Unknown => None,
        }
    }
}

/// Worker → host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerMessage {
    ExamAttemptStarted,
    ExamAttemptEnded,
    Echo,
    #[serde(other)]
    Unknown,
}

impl WorkerMessage {
    #[must_use]
    pub fn message_type(&self) -> Option<MessageType> {
        match self {
            Self::ExamAttemptStarted => Some(MessageType::ExamAttemptStarted),
            Self::ExamAttemptEnded => Some(MessageType::ExamAttemptEnded),
            Self::Echo => Some(MessageType::Echo),
            Self::Unknown => None,
        }
    }
}

/// The message sent to the worker and the message expected back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventNamePair {
    pub prompt: MessageType,
    pub response: MessageType,
}

pub const START_EXAM_ATTEMPT_EVENTS: EventNamePair = EventNamePair {
    prompt: MessageType::StartExamAttempt,
    response: MessageType::ExamAttemptStarted,
};

pub const END_EXAM_ATTEMPT_EVENTS: EventNamePair = EventNamePair {
    prompt: MessageType::EndExamAttempt,
    response: MessageType::ExamAttemptEnded,
};

pub const PING_EVENTS: EventNamePair = EventNamePair {
    prompt: MessageType::Ping,
    response: MessageType::Echo,
};
