//! ---
//! rhome_section: "02-messaging"
//! rhome_subsection: "module"
//! rhome_type: "source"
//! rhome_scope: "code"
//! rhome_description: "Line protocol codec, message variants and queues."
//! rhome_version: "v0.1.0"
//! rhome_owner: "tbd"
//! ---
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::codec::{ensure_wire_safe, DecodeError};
use crate::refnum::RefNum;

/// Address/port pair identifying a service on the control plane.
///
/// Both parts are kept as text because they are copied verbatim between
/// configuration and wire lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or IP address.
    pub addr: String,
    /// Port, as written on the wire.
    pub port: String,
}

impl Endpoint {
    /// Construct an endpoint from its address and port.
    pub fn new(addr: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            port: port.into(),
        }
    }
}

impl Endpoint {
    /// Check that both parts can be written into a single wire field.
    ///
    /// Blank parts are allowed; inbound requests may leave the destination empty.
    pub fn validate(&self) -> Result<(), DecodeError> {
        ensure_wire_safe("addr", &self.addr)?;
        ensure_wire_safe("port", &self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// Fields shared by every message variant (wire indices 0 through 5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Reference number assigned by the sender. Inbound lines may leave it blank.
    pub ref_num: Option<RefNum>,
    /// Intended receiver.
    pub dest: Endpoint,
    /// Sender.
    pub source: Endpoint,
    /// Wire tag copied from the type table.
    pub msg_type: String,
}

/// Closed set of message kinds understood by the codec.
///
/// The snake_case form of each kind is also its key in [`MessageTypes`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    /// Liveness probe.
    Heartbeat,
    /// Answer to a liveness probe.
    HeartbeatAck,
    /// Request for the scheduled power state of one device.
    GetDeviceScheduledState,
    /// Scheduled power state of one device.
    GetDeviceScheduledStateAck,
}

impl MessageKind {
    /// Symbolic name used as the type-table key.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Errors raised while validating a [`MessageTypes`] table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeTableError {
    /// A tag was configured as an empty string.
    #[error("message type `{name}` has an empty wire tag")]
    EmptyTag {
        /// Symbolic name of the offending entry.
        name: String,
    },
    /// A tag contains the field separator and could never be matched.
    #[error("message type `{name}` uses wire tag `{tag}` which contains a comma")]
    InvalidTag {
        /// Symbolic name of the offending entry.
        name: String,
        /// Configured tag.
        tag: String,
    },
    /// Two names resolve to the same tag.
    #[error("wire tag `{tag}` is used by both `{first}` and `{second}`")]
    DuplicateTag {
        /// Shared tag.
        tag: String,
        /// First name using the tag.
        first: String,
        /// Second name using the tag.
        second: String,
    },
}

/// Mapping from symbolic message-type name to the wire tag placed in field 5.
///
/// The four kinds handled by the codec are required; any further entries are
/// kept in [`MessageTypes::extra`] so other services' types can be named in
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTypes {
    /// Tag for [`MessageKind::Heartbeat`].
    pub heartbeat: String,
    /// Tag for [`MessageKind::HeartbeatAck`].
    pub heartbeat_ack: String,
    /// Tag for [`MessageKind::GetDeviceScheduledState`].
    pub get_device_scheduled_state: String,
    /// Tag for [`MessageKind::GetDeviceScheduledStateAck`].
    pub get_device_scheduled_state_ack: String,
    /// Additional named tags not handled by this crate.
    #[serde(flatten)]
    pub extra: IndexMap<String, String>,
}

impl MessageTypes {
    /// Build a table holding only the required kinds.
    pub fn new(
        heartbeat: impl Into<String>,
        heartbeat_ack: impl Into<String>,
        get_device_scheduled_state: impl Into<String>,
        get_device_scheduled_state_ack: impl Into<String>,
    ) -> Self {
        Self {
            heartbeat: heartbeat.into(),
            heartbeat_ack: heartbeat_ack.into(),
            get_device_scheduled_state: get_device_scheduled_state.into(),
            get_device_scheduled_state_ack: get_device_scheduled_state_ack.into(),
            extra: IndexMap::new(),
        }
    }

    /// Wire tag configured for `kind`.
    pub fn tag(&self, kind: MessageKind) -> &str {
        match kind {
            MessageKind::Heartbeat => &self.heartbeat,
            MessageKind::HeartbeatAck => &self.heartbeat_ack,
            MessageKind::GetDeviceScheduledState => &self.get_device_scheduled_state,
            MessageKind::GetDeviceScheduledStateAck => &self.get_device_scheduled_state_ack,
        }
    }

    /// Resolve a wire tag to one of the known kinds.
    pub fn kind_of(&self, tag: &str) -> Option<MessageKind> {
        MessageKind::iter().find(|kind| self.tag(*kind) == tag)
    }

    /// Look up any configured tag by symbolic name, including extra entries.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        match name.parse::<MessageKind>() {
            Ok(kind) => Some(self.tag(kind)),
            Err(_) => self.extra.get(name).map(String::as_str),
        }
    }

    /// Iterate over every `(name, tag)` pair, required kinds first.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        MessageKind::iter()
            .map(|kind| (kind.name(), self.tag(kind)))
            .chain(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Check that every tag is usable and that no two names share a tag.
    pub fn validate(&self) -> Result<(), TypeTableError> {
        let mut seen: IndexMap<&str, &str> = IndexMap::new();
        for (name, tag) in self.entries() {
            if tag.is_empty() {
                return Err(TypeTableError::EmptyTag { name: name.into() });
            }
            if tag.contains(crate::codec::FIELD_SEPARATOR) {
                return Err(TypeTableError::InvalidTag {
                    name: name.into(),
                    tag: tag.into(),
                });
            }
            if let Some(first) = seen.insert(tag, name) {
                return Err(TypeTableError::DuplicateTag {
                    tag: tag.into(),
                    first: first.into(),
                    second: name.into(),
                });
            }
        }
        Ok(())
    }
}
