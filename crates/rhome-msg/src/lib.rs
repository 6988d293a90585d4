//! ---
//! rhome_section: "02-messaging"
//! rhome_subsection: "module"
//! rhome_type: "source"
//! rhome_scope: "code"
//! rhome_description: "Line protocol codec, message variants and queues."
//! rhome_version: "v0.1.0"
//! rhome_owner: "tbd"
//! ---
//! Messaging primitives shared by rhome services.
//!
//! Every message travels as one comma-delimited line:
//!
//! ```text
//! ref,dest_addr,dest_port,source_addr,source_port,type_tag[,payload...]
//! ```
//!
//! The wire tag in field 5 is resolved through a configured [`MessageTypes`]
//! table, so the same binary can talk to peers using different numbering.
#![warn(missing_docs)]

pub mod codec;
pub mod messages;
pub mod queue;
pub mod refnum;
pub mod types;

pub use codec::{ensure_wire_safe, peek_destination, peek_type_tag, DecodeError};
pub use messages::{
    DeviceCommand, GetDeviceScheduledState, GetDeviceScheduledStateAck, Heartbeat, HeartbeatAck,
    Message, WireMessage,
};
pub use queue::MessageQueue;
pub use refnum::{RefNum, RefNumGenerator};
pub use types::{Endpoint, Header, MessageKind, MessageTypes, TypeTableError};
