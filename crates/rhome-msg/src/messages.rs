//! ---
//! rhome_section: "02-messaging"
//! rhome_subsection: "module"
//! rhome_type: "source"
//! rhome_scope: "code"
//! rhome_description: "Line protocol codec, message variants and queues."
//! rhome_version: "v0.1.0"
//! rhome_owner: "tbd"
//! ---
use strum::{Display, EnumString};

use crate::codec::{ensure_wire_safe, join, DecodeError, Fields};
use crate::refnum::RefNum;
use crate::types::{Endpoint, Header, MessageKind, MessageTypes};

/// Behaviour shared by every message variant.
///
/// An instance is well formed when no header or payload field contains a
/// comma or line terminator and every payload field is non-empty. Both
/// `parse` and the variant's `from_fields` constructor refuse anything else,
/// so they converge on the same values and `parse(encode(m)) == m` holds for
/// every instance they hand out.
pub trait WireMessage: Sized {
    /// Kind whose configured tag this variant carries in field 5.
    const KIND: MessageKind;

    /// Decode one raw line.
    fn parse(line: &str, types: &MessageTypes) -> Result<Self, DecodeError>;

    /// Encode into one raw line. Never fails.
    fn encode(&self) -> String;

    /// Shared header fields.
    fn header(&self) -> &Header;

    /// Reference number, if the sender assigned one.
    fn ref_num(&self) -> Option<RefNum> {
        self.header().ref_num
    }

    /// Sending endpoint.
    fn source(&self) -> &Endpoint {
        &self.header().source
    }

    /// Receiving endpoint.
    fn dest(&self) -> &Endpoint {
        &self.header().dest
    }
}

fn header_for(
    kind: MessageKind,
    ref_num: RefNum,
    dest: Endpoint,
    source: Endpoint,
    types: &MessageTypes,
) -> Result<Header, DecodeError> {
    dest.validate()?;
    source.validate()?;
    Ok(Header {
        ref_num: Some(ref_num),
        dest,
        source,
        msg_type: types.tag(kind).to_owned(),
    })
}

fn device_name(device: impl Into<String>) -> Result<String, DecodeError> {
    let device = device.into();
    if device.is_empty() {
        return Err(DecodeError::InvalidField {
            field: "device",
            value: device,
        });
    }
    ensure_wire_safe("device", &device)?;
    Ok(device)
}

/// Power state requested for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DeviceCommand {
    /// Device should be powered.
    On,
    /// Device should be unpowered.
    Off,
}

impl From<bool> for DeviceCommand {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

/// Liveness probe sent periodically to peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    /// Shared header.
    pub header: Header,
}

impl Heartbeat {
    /// Build a heartbeat from explicit fields.
    pub fn from_fields(
        ref_num: RefNum,
        dest: Endpoint,
        source: Endpoint,
        types: &MessageTypes,
    ) -> Result<Self, DecodeError> {
        Ok(Self {
            header: header_for(Self::KIND, ref_num, dest, source, types)?,
        })
    }
}

impl WireMessage for Heartbeat {
    const KIND: MessageKind = MessageKind::Heartbeat;

    fn parse(line: &str, types: &MessageTypes) -> Result<Self, DecodeError> {
        let fields = Fields::split(line)?;
        Ok(Self {
            header: fields.header(types.tag(Self::KIND))?,
        })
    }

    fn encode(&self) -> String {
        join(&self.header, &[])
    }

    fn header(&self) -> &Header {
        &self.header
    }
}

/// Answer to a [`Heartbeat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatAck {
    /// Shared header.
    pub header: Header,
}

impl HeartbeatAck {
    /// Build a heartbeat acknowledgement from explicit fields.
    pub fn from_fields(
        ref_num: RefNum,
        dest: Endpoint,
        source: Endpoint,
        types: &MessageTypes,
    ) -> Result<Self, DecodeError> {
        Ok(Self {
            header: header_for(Self::KIND, ref_num, dest, source, types)?,
        })
    }
}

impl WireMessage for HeartbeatAck {
    const KIND: MessageKind = MessageKind::HeartbeatAck;

    fn parse(line: &str, types: &MessageTypes) -> Result<Self, DecodeError> {
        let fields = Fields::split(line)?;
        Ok(Self {
            header: fields.header(types.tag(Self::KIND))?,
        })
    }

    fn encode(&self) -> String {
        join(&self.header, &[])
    }

    fn header(&self) -> &Header {
        &self.header
    }
}

/// Asks what power state a device should currently be in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDeviceScheduledState {
    /// Shared header.
    pub header: Header,
    /// Device the question is about.
    pub device: String,
}

impl GetDeviceScheduledState {
    /// Build a scheduled-state request from explicit fields.
    ///
    /// Fails with [`DecodeError::InvalidField`] for a blank device name or any
    /// field that would not survive encoding.
    pub fn from_fields(
        ref_num: RefNum,
        dest: Endpoint,
        source: Endpoint,
        device: impl Into<String>,
        types: &MessageTypes,
    ) -> Result<Self, DecodeError> {
        Ok(Self {
            header: header_for(Self::KIND, ref_num, dest, source, types)?,
            device: device_name(device)?,
        })
    }
}

impl WireMessage for GetDeviceScheduledState {
    const KIND: MessageKind = MessageKind::GetDeviceScheduledState;

    fn parse(line: &str, types: &MessageTypes) -> Result<Self, DecodeError> {
        let fields = Fields::split(line)?;
        let header = fields.header(types.tag(Self::KIND))?;
        let device = fields.payload(0, "device")?;
        Ok(Self {
            header,
            device: device.to_owned(),
        })
    }

    fn encode(&self) -> String {
        join(&self.header, &[self.device.as_str()])
    }

    fn header(&self) -> &Header {
        &self.header
    }
}

/// Carries the schedule's verdict for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDeviceScheduledStateAck {
    /// Shared header.
    pub header: Header,
    /// Device the verdict applies to.
    pub device: String,
    /// Scheduled power state.
    pub command: DeviceCommand,
}

impl GetDeviceScheduledStateAck {
    /// Build a scheduled-state acknowledgement from explicit fields.
    pub fn from_fields(
        ref_num: RefNum,
        dest: Endpoint,
        source: Endpoint,
        device: impl Into<String>,
        command: DeviceCommand,
        types: &MessageTypes,
    ) -> Result<Self, DecodeError> {
        Ok(Self {
            header: header_for(Self::KIND, ref_num, dest, source, types)?,
            device: device_name(device)?,
            command,
        })
    }
}

impl WireMessage for GetDeviceScheduledStateAck {
    const KIND: MessageKind = MessageKind::GetDeviceScheduledStateAck;

    fn parse(line: &str, types: &MessageTypes) -> Result<Self, DecodeError> {
        let fields = Fields::split(line)?;
        let header = fields.header(types.tag(Self::KIND))?;
        let device = fields.payload(0, "device")?;
        let raw_command = fields.payload(1, "command")?;
        let command = raw_command
            .parse::<DeviceCommand>()
            .map_err(|_| DecodeError::InvalidField {
                field: "command",
                value: raw_command.to_owned(),
            })?;
        Ok(Self {
            header,
            device: device.to_owned(),
            command,
        })
    }

    fn encode(&self) -> String {
        let command = self.command.to_string();
        join(&self.header, &[self.device.as_str(), command.as_str()])
    }

    fn header(&self) -> &Header {
        &self.header
    }
}

/// Any message of the closed variant set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// See [`Heartbeat`].
    Heartbeat(Heartbeat),
    /// See [`HeartbeatAck`].
    HeartbeatAck(HeartbeatAck),
    /// See [`GetDeviceScheduledState`].
    GetDeviceScheduledState(GetDeviceScheduledState),
    /// See [`GetDeviceScheduledStateAck`].
    GetDeviceScheduledStateAck(GetDeviceScheduledStateAck),
}

impl Message {
    /// Kind of the wrapped variant.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Heartbeat(_) => MessageKind::Heartbeat,
            Message::HeartbeatAck(_) => MessageKind::HeartbeatAck,
            Message::GetDeviceScheduledState(_) => MessageKind::GetDeviceScheduledState,
            Message::GetDeviceScheduledStateAck(_) => MessageKind::GetDeviceScheduledStateAck,
        }
    }

    /// Header of the wrapped variant.
    pub fn header(&self) -> &Header {
        match self {
            Message::Heartbeat(m) => m.header(),
            Message::HeartbeatAck(m) => m.header(),
            Message::GetDeviceScheduledState(m) => m.header(),
            Message::GetDeviceScheduledStateAck(m) => m.header(),
        }
    }

    /// Encode the wrapped variant.
    pub fn encode(&self) -> String {
        match self {
            Message::Heartbeat(m) => m.encode(),
            Message::HeartbeatAck(m) => m.encode(),
            Message::GetDeviceScheduledState(m) => m.encode(),
            Message::GetDeviceScheduledStateAck(m) => m.encode(),
        }
    }
}

impl From<Heartbeat> for Message {
    fn from(value: Heartbeat) -> Self {
        Message::Heartbeat(value)
    }
}

impl From<HeartbeatAck> for Message {
    fn from(value: HeartbeatAck) -> Self {
        Message::HeartbeatAck(value)
    }
}

impl From<GetDeviceScheduledState> for Message {
    fn from(value: GetDeviceScheduledState) -> Self {
        Message::GetDeviceScheduledState(value)
    }
}

impl From<GetDeviceScheduledStateAck> for Message {
    fn from(value: GetDeviceScheduledStateAck) -> Self {
        Message::GetDeviceScheduledStateAck(value)
    }
}
