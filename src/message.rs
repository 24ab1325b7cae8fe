//! The wire envelope exchanged between nodes, and its line-oriented textual codec.
//!
//! A message is encoded as semicolon-separated `key=value` pairs. `type` and `from` are
//! mandatory; `p` (a proposal number) and `value` are optional; any other key is an extension
//! field, written with an `x_` prefix and stripped of it again on decode.

use std::collections::HashMap;
use std::fmt;

use crate::error::PaxosError;
use crate::proposal_number::ProposalNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Prepare,
    Promise,
    AcceptRequest,
    Accepted,
    Decide,
}

impl MessageType {
    fn as_str(self) -> &'static str {
        match self {
            MessageType::Prepare => "PREPARE",
            MessageType::Promise => "PROMISE",
            MessageType::AcceptRequest => "ACCEPT_REQUEST",
            MessageType::Accepted => "ACCEPTED",
            MessageType::Decide => "DECIDE",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "PREPARE" => Some(MessageType::Prepare),
            "PROMISE" => Some(MessageType::Promise),
            "ACCEPT_REQUEST" => Some(MessageType::AcceptRequest),
            "ACCEPTED" => Some(MessageType::Accepted),
            "DECIDE" => Some(MessageType::Decide),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable message envelope. `extra` carries extension fields -- today only the
/// previously-accepted `(number, value)` pair an acceptor piggybacks on a PROMISE, under the
/// keys `accNum` / `accVal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: MessageType,
    pub sender_id: String,
    pub proposal: Option<ProposalNumber>,
    pub value: Option<String>,
    pub extra: HashMap<String, String>,
}

const RESERVED_KEYS: [&str; 4] = ["type", "from", "p", "value"];
const EXTENSION_PREFIX: &str = "x_";

impl Message {
    pub fn new(msg_type: MessageType, sender_id: impl Into<String>) -> Self {
        Message {
            msg_type,
            sender_id: sender_id.into(),
            proposal: None,
            value: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_proposal(mut self, proposal: ProposalNumber) -> Self {
        self.proposal = Some(proposal);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Encodes this message into one semicolon-separated line. The iteration order of `extra` is
    /// not guaranteed and callers must not depend on it.
    pub fn encode(&self) -> String {
        let mut parts = vec![
            format!("type={}", self.msg_type),
            format!("from={}", self.sender_id),
        ];

        if let Some(p) = &self.proposal {
            parts.push(format!("p={}", p));
        }

        if let Some(v) = &self.value {
            parts.push(format!("value={}", v));
        }

        for (k, v) in &self.extra {
            parts.push(format!("{}{}={}", EXTENSION_PREFIX, k, v));
        }

        parts.join(";")
    }

    /// Decodes one line into a message. Fails with [`PaxosError::MalformedMessage`] when `type`
    /// is missing or unrecognized, `from` is missing, or a `p=` field cannot be parsed as a
    /// proposal number.
    pub fn decode(line: &str) -> Result<Message, PaxosError> {
        let mut fields: HashMap<&str, &str> = HashMap::new();

        for field in line.split(';').filter(|f| !f.is_empty()) {
            let eq = field
                .find('=')
                .ok_or_else(|| PaxosError::MalformedMessage(line.to_string()))?;
            let (key, rest) = field.split_at(eq);
            fields.insert(key, &rest[1..]);
        }

        let msg_type = fields
            .get("type")
            .and_then(|s| MessageType::from_str(s))
            .ok_or_else(|| PaxosError::MalformedMessage(line.to_string()))?;

        let sender_id = fields
            .get("from")
            .ok_or_else(|| PaxosError::MalformedMessage(line.to_string()))?
            .to_string();

        let proposal = match fields.get("p") {
            Some(raw) => Some(
                ProposalNumber::parse(raw)
                    .map_err(|_| PaxosError::MalformedMessage(line.to_string()))?,
            ),
            None => None,
        };

        let value = fields.get("value").map(|s| s.to_string());

        let mut extra = HashMap::new();
        for (key, value) in &fields {
            if RESERVED_KEYS.contains(key) {
                continue;
            }
            if let Some(stripped) = key.strip_prefix(EXTENSION_PREFIX) {
                extra.insert(stripped.to_string(), value.to_string());
            }
        }

        Ok(Message {
            msg_type,
            sender_id,
            proposal,
            value,
            extra,
        })
    }
}
