//! ---
//! rhome_section: "01-core-functionality"
//! rhome_subsection: "module"
//! rhome_type: "source"
//! rhome_scope: "code"
//! rhome_description: "Dispatch loop, handlers and schedule lookup."
//! rhome_version: "v0.1.0"
//! rhome_owner: "tbd"
//! ---
//! Per-message-type handlers. None of these touch the queues; the dispatch
//! loop enqueues whatever they return.
use rhome_msg::{
    DecodeError, DeviceCommand, Endpoint, GetDeviceScheduledState, GetDeviceScheduledStateAck,
    Heartbeat, HeartbeatAck, MessageTypes, RefNumGenerator, WireMessage,
};
use tracing::debug;

use crate::dispatch::DispatchError;
use crate::schedule::ScheduleOracle;

/// Acknowledge a heartbeat, swapping source and destination.
pub fn handle_heartbeat(
    request: &Heartbeat,
    refs: &RefNumGenerator,
    types: &MessageTypes,
) -> Result<HeartbeatAck, DecodeError> {
    let ack = HeartbeatAck::from_fields(
        refs.next(),
        request.source().clone(),
        request.dest().clone(),
        types,
    )?;
    debug!(from = %request.source(), ref_num = ?ack.ref_num(), "heartbeat acknowledged");
    Ok(ack)
}

/// Answer a scheduled-state query from the oracle's verdict.
///
/// Oracle failures are returned to the caller; no acknowledgement is built
/// for a device whose state could not be determined.
pub fn handle_get_device_scheduled_state<O>(
    request: &GetDeviceScheduledState,
    refs: &RefNumGenerator,
    oracle: &O,
    types: &MessageTypes,
) -> Result<GetDeviceScheduledStateAck, DispatchError>
where
    O: ScheduleOracle + ?Sized,
{
    debug!(device = %request.device, "checking schedule for device");
    let command = DeviceCommand::from(oracle.is_on(&request.device)?);
    debug!(device = %request.device, %command, "device state according to schedule");
    let ack = GetDeviceScheduledStateAck::from_fields(
        refs.next(),
        request.source().clone(),
        request.dest().clone(),
        request.device.clone(),
        command,
        types,
    )?;
    Ok(ack)
}

/// One heartbeat per destination, each with its own reference number.
pub fn build_heartbeats(
    destinations: &[Endpoint],
    source: &Endpoint,
    refs: &RefNumGenerator,
    types: &MessageTypes,
) -> Result<Vec<Heartbeat>, DecodeError> {
    destinations
        .iter()
        .map(|dest| Heartbeat::from_fields(refs.next(), dest.clone(), source.clone(), types))
        .collect()
}
