//! `(DeviceSnapshot, Event) -> DeviceSnapshot`: the pure event consumer
//! (spec.md §4.7.8). The caller is responsible for routing each event to the
//! snapshot with the matching path; `FrameTick` is routed nowhere.

use crate::event::Event;
use crate::model::{ConnectionStatus, DeviceSnapshot};

pub fn apply(mut snapshot: DeviceSnapshot, event: &Event) -> DeviceSnapshot {
    match event {
        Event::DeviceConnected { path, info } => {
            let mut fresh = DeviceSnapshot::new(path.clone());
            fresh.status = ConnectionStatus::Connected;
            fresh.info = Some(info.clone());
            fresh
        }
        Event::DeviceDisconnected { path } => {
            let mut cleared = DeviceSnapshot::new(path.clone());
            cleared.status = ConnectionStatus::Disconnected;
            cleared
        }
        Event::DeviceError { error, .. } => {
            snapshot.last_error = Some(*error);
            snapshot
        }
        Event::StateUpdated { state, .. } => {
            snapshot.state = Some(*state);
            snapshot.last_error = None;
            snapshot
        }
        Event::TimingUpdated { timing, .. } => {
            snapshot.timing = Some(*timing);
            snapshot.last_error = None;
            snapshot
        }
        Event::TriggerUpdated { trigger, .. } => {
            snapshot.trigger = Some(*trigger);
            snapshot.last_error = None;
            snapshot
        }
        Event::ChannelMapUpdated { channel_map, .. } => {
            snapshot.channel_map = Some(channel_map.clone());
            snapshot.last_error = None;
            snapshot
        }
        Event::FrameUpdated { frame, .. } => {
            snapshot.latest_frame = Some(frame.clone());
            snapshot.last_error = None;
            snapshot
        }
        Event::FrameCleared { .. } => {
            snapshot.latest_frame = None;
            snapshot
        }
        Event::FrameTick { .. } => snapshot,
        Event::RtBufferUpdated { index, value, .. } => {
            snapshot.rt_buffers.insert(*index, *value);
            snapshot
        }
        Event::VarListPageUpdated { path: _, page } => {
            snapshot
                .catalog
                .var_list
                .apply(page.total_count, page.start_idx, &page.entries);
            snapshot
        }
        Event::RtLabelsPageUpdated { path: _, page } => {
            snapshot
                .catalog
                .rt_labels
                .apply(page.total_count, page.start_idx, &page.entries);
            snapshot
        }
        Event::SnapshotHeaderUpdated { header, .. } => {
            snapshot.snapshot_header = Some(header.clone());
            snapshot.last_error = None;
            snapshot
        }
        Event::SnapshotChunk { start, samples, .. } => {
            snapshot.snapshot_chunks.insert(*start, samples.clone());
            snapshot
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopehost_wire::model::{DeviceInfo, DeviceState, Endianness};

    fn dummy_info() -> DeviceInfo {
        DeviceInfo {
            num_channels: 2,
            buffer_size: 100,
            isr_khz: 10,
            var_count: 4,
            rt_count: 2,
            rt_buffer_len: 8,
            name_len: 8,
            endianness: Endianness::Little,
            device_name: "dev".into(),
        }
    }

    #[test]
    fn device_error_does_not_clear_known_fields() {
        let mut snap = DeviceSnapshot::new("/dev/x");
        snap.state = Some(DeviceState::Running);
        let snap = apply(
            snap,
            &Event::DeviceError {
                path: "/dev/x".into(),
                error: crate::model::DeviceErrorKind::Timeout,
            },
        );
        assert_eq!(snap.state, Some(DeviceState::Running));
        assert!(snap.last_error.is_some());
    }

    #[test]
    fn state_updated_clears_last_error() {
        let mut snap = DeviceSnapshot::new("/dev/x");
        snap.last_error = Some(crate::model::DeviceErrorKind::Timeout);
        let snap = apply(
            snap,
            &Event::StateUpdated { path: "/dev/x".into(), state: DeviceState::Halted },
        );
        assert!(snap.last_error.is_none());
        assert_eq!(snap.state, Some(DeviceState::Halted));
    }

    #[test]
    fn disconnected_clears_everything_but_keeps_the_entry() {
        let mut snap = DeviceSnapshot::new("/dev/x");
        snap.info = Some(dummy_info());
        snap.state = Some(DeviceState::Running);
        let snap = apply(snap, &Event::DeviceDisconnected { path: "/dev/x".into() });
        assert_eq!(snap.path, "/dev/x");
        assert_eq!(snap.status, ConnectionStatus::Disconnected);
        assert!(snap.info.is_none());
        assert!(snap.state.is_none());
    }

    #[test]
    fn rt_buffer_updated_upserts_single_index() {
        let mut snap = DeviceSnapshot::new("/dev/x");
        snap.rt_buffers.insert(1, 1.0);
        let snap = apply(
            snap,
            &Event::RtBufferUpdated { path: "/dev/x".into(), index: 2, value: 2.0 },
        );
        assert_eq!(snap.rt_buffers.get(&1), Some(&1.0));
        assert_eq!(snap.rt_buffers.get(&2), Some(&2.0));
    }

    #[test]
    fn idempotence_holds_for_plain_field_events() {
        let snap = DeviceSnapshot::new("/dev/x");
        let event = Event::StateUpdated { path: "/dev/x".into(), state: DeviceState::Halted };
        let once = apply(snap.clone(), &event);
        let twice = apply(once.clone(), &event);
        assert_eq!(once, twice);
    }
}
