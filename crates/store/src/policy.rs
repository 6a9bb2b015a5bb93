//! The control-mode state machine and command guard (spec.md §4.7.9,
//! §4.7.10). Pure; the runtime calls `guard` before dispatching any
//! mutating command and only sends it to `target_paths`.

use crate::consensus::derive_for_policy;
use crate::model::{ConnectionStatus, DeviceSnapshot};
use scopehost_wire::model::DeviceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// No devices connected.
    Empty,
    /// At least one connected device hasn't reported state/timing/
    /// trigger/channel map yet.
    Syncing,
    /// Connected devices disagree on run state. Only a halt is allowed.
    MismatchStopOnly,
    /// Connected devices agree on run state but disagree on some other
    /// field. Run/stop and per-device reads are still fine.
    MismatchRunBlocked,
    /// Every connected device reports the same state, and that state is
    /// `Halted`.
    AlignedHalted,
    /// Every connected device reports the same non-`Halted` state.
    AlignedNonHalted,
}

fn is_synced(snap: &DeviceSnapshot) -> bool {
    snap.state.is_some()
        && snap.timing.is_some()
        && snap.trigger.is_some()
        && snap.channel_map.is_some()
}

pub fn control_mode(connected: &[&DeviceSnapshot]) -> ControlMode {
    if connected.is_empty() {
        return ControlMode::Empty;
    }
    if connected.iter().any(|s| !is_synced(s)) {
        return ControlMode::Syncing;
    }
    let consensus = derive_for_policy(connected);
    if !consensus.state.aligned {
        return ControlMode::MismatchStopOnly;
    }
    let other_fields_aligned =
        consensus.timing.aligned && consensus.trigger.aligned && consensus.channel_map.aligned;
    if !other_fields_aligned {
        return ControlMode::MismatchRunBlocked;
    }
    match consensus.state.value {
        Some(DeviceState::Halted) => ControlMode::AlignedHalted,
        Some(_) => ControlMode::AlignedNonHalted,
        None => ControlMode::MismatchStopOnly,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    SetState(DeviceState),
    Trigger,
    SetTiming,
    SetChannelMap,
    SetTrigger,
    SetRtBuffer,
}

impl CommandKind {
    fn is_halt(&self) -> bool {
        matches!(self, CommandKind::SetState(DeviceState::Halted))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotConnected,
    StateNotHalted,
    StopOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardError {
    /// `MismatchStopOnly` and the command isn't a halt.
    StopOnly,
    /// The target set was non-empty on entry but every candidate was
    /// filtered out.
    NoEligibleTargets,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandDecision {
    pub allowed: bool,
    pub target_paths: Vec<String>,
    pub skipped: Vec<(String, SkipReason)>,
    pub reason: Option<GuardError>,
}

impl CommandDecision {
    fn rejected(reason: GuardError, skipped: Vec<(String, SkipReason)>) -> Self {
        CommandDecision { allowed: false, target_paths: Vec::new(), skipped, reason }
    }
}

/// Four-step guard: intersect requested targets with connected devices,
/// enforce `MismatchStopOnly`, apply the per-command eligibility rule, then
/// reject if nothing is left to send to.
pub fn guard(
    kind: CommandKind,
    requested_targets: Option<&[String]>,
    snapshots: &[DeviceSnapshot],
) -> CommandDecision {
    let connected: Vec<&DeviceSnapshot> = snapshots
        .iter()
        .filter(|s| s.status == ConnectionStatus::Connected)
        .collect();

    // Step 1: intersect requested paths with the connected set.
    let (mut candidates, mut skipped): (Vec<&DeviceSnapshot>, Vec<(String, SkipReason)>) =
        match requested_targets {
            Some(paths) => {
                let mut out = Vec::new();
                let mut skipped = Vec::new();
                for path in paths {
                    match connected.iter().find(|s| s.path == *path) {
                        Some(s) => out.push(*s),
                        None => skipped.push((path.clone(), SkipReason::NotConnected)),
                    }
                }
                if out.is_empty() && !skipped.is_empty() {
                    return CommandDecision::rejected(GuardError::NoEligibleTargets, skipped);
                }
                (out, skipped)
            }
            None => (connected.clone(), Vec::new()),
        };

    let mode = control_mode(&connected);

    // Step 2: a StopOnly mode blocks every command except a halt — except
    // `set_channel_map`, which spec.md §4.7.10 allows "whenever any device
    // is connected" with no mode restriction at all.
    if mode == ControlMode::MismatchStopOnly && !kind.is_halt() && kind != CommandKind::SetChannelMap {
        skipped.extend(candidates.iter().map(|s| (s.path.clone(), SkipReason::StopOnly)));
        return CommandDecision::rejected(GuardError::StopOnly, skipped);
    }

    // Step 3: per-command eligibility. Only `set_timing` is restricted to
    // devices currently `Halted` (spec.md §4.7.10); `set_channel_map` and
    // `set_trigger` carry no such per-device restriction.
    candidates.retain(|s| match kind {
        CommandKind::SetTiming => {
            let eligible = s.state == Some(DeviceState::Halted);
            if !eligible {
                skipped.push((s.path.clone(), SkipReason::StateNotHalted));
            }
            eligible
        }
        CommandKind::SetState(DeviceState::Halted) => true,
        CommandKind::SetState(_) => {
            // spec.md §4.7.10: set_run_state is allowed only in AlignedHalted.
            let eligible = mode == ControlMode::AlignedHalted;
            if !eligible {
                skipped.push((s.path.clone(), SkipReason::StateNotHalted));
            }
            eligible
        }
        CommandKind::Trigger | CommandKind::SetRtBuffer | CommandKind::SetTrigger | CommandKind::SetChannelMap => {
            true
        }
    });

    // Step 4: reject if nothing eligible remains.
    if candidates.is_empty() {
        return CommandDecision::rejected(GuardError::NoEligibleTargets, skipped);
    }

    CommandDecision {
        allowed: true,
        target_paths: candidates.into_iter().map(|s| s.path.clone()).collect(),
        skipped,
        reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopehost_wire::model::{DeviceInfo, Endianness, TimingConfig, TriggerConfig, TriggerMode};

    fn synced(path: &str, state: DeviceState) -> DeviceSnapshot {
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

    #[test]
    fn empty_mode_when_nothing_connected() {
        assert_eq!(control_mode(&[]), ControlMode::Empty);
    }

    #[test]
    fn syncing_mode_before_state_arrives() {
        let mut s = DeviceSnapshot::new("/a");
        s.status = ConnectionStatus::Connected;
        assert_eq!(control_mode(&[&s]), ControlMode::Syncing);
    }

    #[test]
    fn mismatch_stop_only_blocks_non_halt_commands() {
        let a = synced("/a", DeviceState::Halted);
        let b = synced("/b", DeviceState::Running);
        let snaps = vec![a, b];
        let decision = guard(CommandKind::Trigger, None, &snaps);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(GuardError::StopOnly));
    }

    #[test]
    fn mismatch_stop_only_still_allows_halt() {
        let a = synced("/a", DeviceState::Halted);
        let b = synced("/b", DeviceState::Running);
        let snaps = vec![a, b];
        let decision = guard(CommandKind::SetState(DeviceState::Halted), None, &snaps);
        assert!(decision.allowed);
        assert_eq!(decision.target_paths.len(), 2);
    }

    #[test]
    fn set_timing_excludes_non_halted_devices() {
        let a = synced("/a", DeviceState::Halted);
        let b = synced("/b", DeviceState::Halted);
        let snaps = vec![a, b];
        let decision = guard(CommandKind::SetTiming, None, &snaps);
        assert!(decision.allowed);
        assert_eq!(decision.target_paths, vec!["/a".to_string(), "/b".to_string()]);
    }

    #[test]
    fn set_timing_excludes_running_device_even_when_aligned_non_halted() {
        let a = synced("/a", DeviceState::Running);
        let b = synced("/b", DeviceState::Running);
        let snaps = vec![a, b];
        let decision = guard(CommandKind::SetTiming, None, &snaps);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(GuardError::NoEligibleTargets));
    }

    #[test]
    fn set_trigger_does_not_require_halted_devices() {
        let a = synced("/a", DeviceState::Running);
        let b = synced("/b", DeviceState::Running);
        let snaps = vec![a, b];
        let decision = guard(CommandKind::SetTrigger, None, &snaps);
        assert!(decision.allowed);
        assert_eq!(decision.target_paths, vec!["/a".to_string(), "/b".to_string()]);
    }

    #[test]
    fn set_channel_map_is_allowed_even_during_mismatch_stop_only() {
        let a = synced("/a", DeviceState::Halted);
        let b = synced("/b", DeviceState::Running);
        let snaps = vec![a, b];
        assert_eq!(control_mode(&[&snaps[0], &snaps[1]]), ControlMode::MismatchStopOnly);
        let decision = guard(CommandKind::SetChannelMap, None, &snaps);
        assert!(decision.allowed);
        assert_eq!(decision.target_paths, vec!["/a".to_string(), "/b".to_string()]);
    }

    #[test]
    fn requesting_an_unconnected_path_is_skipped() {
        let a = synced("/a", DeviceState::Halted);
        let snaps = vec![a];
        let decision = guard(CommandKind::Trigger, Some(&["/a".to_string(), "/missing".to_string()]), &snaps);
        assert!(decision.allowed);
        assert_eq!(decision.target_paths, vec!["/a".to_string()]);
        assert_eq!(decision.skipped, vec![("/missing".to_string(), SkipReason::NotConnected)]);
    }

    #[test]
    fn no_eligible_targets_when_every_requested_path_is_disconnected() {
        let snaps: Vec<DeviceSnapshot> = vec![];
        let decision = guard(CommandKind::Trigger, Some(&["/missing".to_string()]), &snaps);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(GuardError::NoEligibleTargets));
    }
}
