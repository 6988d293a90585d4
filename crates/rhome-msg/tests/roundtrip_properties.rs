//! ---
//! rhome_section: "02-messaging"
//! rhome_subsection: "module"
//! rhome_type: "source"
//! rhome_scope: "code"
//! rhome_description: "Line protocol codec, message variants and queues."
//! rhome_version: "v0.1.0"
//! rhome_owner: "tbd"
//! ---
//! Encode/parse laws over generated field values.
use proptest::prelude::*;
use rhome_msg::{
    DeviceCommand, Endpoint, GetDeviceScheduledState, GetDeviceScheduledStateAck, Heartbeat,
    HeartbeatAck, MessageTypes, RefNum, WireMessage,
};

fn types() -> MessageTypes {
    MessageTypes::new("600", "601", "1", "2")
}

/// Any non-empty text that fits in one field.
fn field() -> impl Strategy<Value = String> {
    "[^,\\r\\n]{1,24}"
}

fn endpoint() -> impl Strategy<Value = Endpoint> {
    (field(), field()).prop_map(|(addr, port)| Endpoint::new(addr, port))
}

fn ref_num() -> impl Strategy<Value = Option<RefNum>> {
    proptest::option::of(any::<u64>().prop_map(RefNum::new))
}

fn command() -> impl Strategy<Value = DeviceCommand> {
    prop_oneof![Just(DeviceCommand::On), Just(DeviceCommand::Off)]
}

/// Text with at least one comma or line terminator somewhere inside.
fn unsafe_field() -> impl Strategy<Value = String> {
    "[a-z]{0,8}[,\\r\\n][a-z]{0,8}"
}

proptest! {
    #[test]
    fn heartbeat_survives_encoding(
        ref_num in ref_num(),
        dest in endpoint(),
        source in endpoint(),
    ) {
        let types = types();
        let mut msg = Heartbeat::from_fields(RefNum::new(0), dest, source, &types)
            .expect("generated fields are wire safe");
        msg.header.ref_num = ref_num;
        prop_assert_eq!(Heartbeat::parse(&msg.encode(), &types), Ok(msg));
    }

    #[test]
    fn heartbeat_ack_survives_encoding(
        ref_num in ref_num(),
        dest in endpoint(),
        source in endpoint(),
    ) {
        let types = types();
        let mut msg = HeartbeatAck::from_fields(RefNum::new(0), dest, source, &types)
            .expect("generated fields are wire safe");
        msg.header.ref_num = ref_num;
        prop_assert_eq!(HeartbeatAck::parse(&msg.encode(), &types), Ok(msg));
    }

    #[test]
    fn scheduled_state_survives_encoding(
        ref_num in ref_num(),
        dest in endpoint(),
        source in endpoint(),
        device in field(),
    ) {
        let types = types();
        let mut msg =
            GetDeviceScheduledState::from_fields(RefNum::new(0), dest, source, device, &types)
                .expect("generated fields are wire safe");
        msg.header.ref_num = ref_num;
        prop_assert_eq!(GetDeviceScheduledState::parse(&msg.encode(), &types), Ok(msg));
    }

    #[test]
    fn scheduled_state_ack_survives_encoding(
        ref_num in ref_num(),
        dest in endpoint(),
        source in endpoint(),
        device in field(),
        command in command(),
    ) {
        let types = types();
        let mut msg = GetDeviceScheduledStateAck::from_fields(
            RefNum::new(0),
            dest,
            source,
            device,
            command,
            &types,
        )
        .expect("generated fields are wire safe");
        msg.header.ref_num = ref_num;
        prop_assert_eq!(GetDeviceScheduledStateAck::parse(&msg.encode(), &types), Ok(msg));
    }

    #[test]
    fn constructors_refuse_unsafe_text(
        bad in unsafe_field(),
        good in endpoint(),
    ) {
        let types = types();
        prop_assert!(GetDeviceScheduledState::from_fields(
            RefNum::new(1),
            good.clone(),
            good.clone(),
            bad.clone(),
            &types,
        )
        .is_err());
        prop_assert!(Heartbeat::from_fields(
            RefNum::new(1),
            Endpoint::new(bad.clone(), good.port.clone()),
            good.clone(),
            &types,
        )
        .is_err());
        prop_assert!(HeartbeatAck::from_fields(
            RefNum::new(1),
            good.clone(),
            Endpoint::new(good.addr.clone(), bad),
            &types,
        )
        .is_err());
    }
}
