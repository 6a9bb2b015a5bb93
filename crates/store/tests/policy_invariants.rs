//! Property-based invariants over the command guard and the reducer.

use proptest::prelude::*;
use scopehost_store::{guard, model::ConnectionStatus, policy::CommandKind, reducer, DeviceSnapshot, Event};
use scopehost_wire::model::{
    DeviceInfo, DeviceState, Endianness, TimingConfig, TriggerConfig, TriggerMode,
};

fn synced(path: String, state: DeviceState) -> DeviceSnapshot {
    let mut s = DeviceSnapshot::new(path);
    s.status = ConnectionStatus::Connected;
    s.info = Some(DeviceInfo {
        num_channels: 2,
        buffer_size: 100,
        isr_khz: 10,
        var_count: 0,
        rt_count: 0,
        rt_buffer_len: 0,
        name_len: 8,
        endianness: Endianness::Little,
        device_name: "dev".into(),
    });
    s.state = Some(state);
    s.timing = Some(TimingConfig { divider: 1, pre_trig: 10 });
    s.trigger = Some(TriggerConfig { threshold: 0.0, channel: 0, mode: TriggerMode::Disabled });
    s.channel_map = Some(vec![0, 1]);
    s
}

fn state_strategy() -> impl Strategy<Value = DeviceState> {
    prop_oneof![
        Just(DeviceState::Halted),
        Just(DeviceState::Running),
        Just(DeviceState::Acquiring),
    ]
}

fn to_snapshots(states: &[DeviceState]) -> Vec<DeviceSnapshot> {
    states
        .iter()
        .enumerate()
        .map(|(i, state)| synced(format!("/dev/{i}"), *state))
        .collect()
}

proptest! {
    /// If a non-halt command is rejected with `StopOnly` on a set of
    /// devices, connecting one more device never turns that same command
    /// allowed: the conflicting pair that caused the rejection is still
    /// present as a subset.
    #[test]
    fn connecting_another_device_never_lifts_a_stop_only_rejection(
        states in prop::collection::vec(state_strategy(), 2..5),
        extra in state_strategy(),
    ) {
        let base = to_snapshots(&states);
        let decision = guard(CommandKind::Trigger, None, &base);
        if decision.reason == Some(scopehost_store::policy::GuardError::StopOnly) {
            let mut with_extra = base.clone();
            with_extra.push(synced(format!("/dev/{}", base.len()), extra));
            let decision_after = guard(CommandKind::Trigger, None, &with_extra);
            prop_assert!(!decision_after.allowed);
        }
    }

    /// Applying the same plain field-update event twice is the same as
    /// applying it once.
    #[test]
    fn reducer_is_idempotent_for_state_updates(state in state_strategy()) {
        let snap = DeviceSnapshot::new("/dev/x");
        let event = Event::StateUpdated { path: "/dev/x".into(), state };
        let once = reducer::apply(snap.clone(), &event);
        let twice = reducer::apply(once.clone(), &event);
        prop_assert_eq!(once, twice);
    }
}
