//! Pure derivations over the current set of connected snapshots (spec.md
//! §4.7.9). Nothing here mutates anything; it's all read-only projections.

use crate::model::{ConnectionStatus, DeviceSnapshot};
use scopehost_wire::model::{ChannelMap, DeviceState, TimingConfig, TriggerConfig};

/// `{value, aligned}`: `aligned` iff every connected device reported the
/// field and all reported values are equal. `value` carries the common
/// value only when aligned — there is no single "the" value to report
/// otherwise.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldConsensus<T> {
    pub value: Option<T>,
    pub aligned: bool,
}

fn field_consensus<T: Clone + PartialEq>(
    connected: &[&DeviceSnapshot],
    project: impl Fn(&DeviceSnapshot) -> Option<T>,
) -> FieldConsensus<T> {
    if connected.is_empty() {
        return FieldConsensus::default();
    }
    let mut values = Vec::with_capacity(connected.len());
    for snap in connected {
        match project(snap) {
            Some(v) => values.push(v),
            None => return FieldConsensus { value: None, aligned: false },
        }
    }
    let aligned = values.windows(2).all(|w| w[0] == w[1]);
    FieldConsensus {
        value: if aligned { values.into_iter().next() } else { None },
        aligned,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticInfo {
    pub num_channels: u8,
    pub buffer_size: u16,
    pub isr_khz: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticInfoDiff {
    pub path: String,
    pub info: StaticInfo,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StaticInfoConsensus {
    pub aligned: bool,
    /// Populated only when not aligned: one entry per connected device.
    pub diffs: Vec<StaticInfoDiff>,
    /// Devices whose static info matches the first connected device's.
    pub compatible_paths: Vec<String>,
}

fn static_info_consensus(connected: &[&DeviceSnapshot]) -> StaticInfoConsensus {
    let infos: Vec<(String, Option<StaticInfo>)> = connected
        .iter()
        .map(|s| {
            (
                s.path.clone(),
                s.info.as_ref().map(|i| StaticInfo {
                    num_channels: i.num_channels,
                    buffer_size: i.buffer_size,
                    isr_khz: i.isr_khz,
                }),
            )
        })
        .collect();

    let Some((_, Some(first))) = infos.first().cloned() else {
        return StaticInfoConsensus::default();
    };
    let aligned = infos.iter().all(|(_, info)| *info == Some(first));
    if aligned {
        return StaticInfoConsensus {
            aligned: true,
            diffs: Vec::new(),
            compatible_paths: infos.into_iter().map(|(path, _)| path).collect(),
        };
    }
    let diffs = infos
        .iter()
        .filter_map(|(path, info)| info.map(|info| StaticInfoDiff { path: path.clone(), info }))
        .collect();
    let compatible_paths = infos
        .into_iter()
        .filter(|(_, info)| *info == Some(first))
        .map(|(path, _)| path)
        .collect();
    StaticInfoConsensus { aligned: false, diffs, compatible_paths }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CatalogConsensus {
    pub ready: bool,
    pub aligned: bool,
}

fn catalog_consensus(
    connected: &[&DeviceSnapshot],
    project: impl Fn(&DeviceSnapshot) -> &crate::model::CatalogList,
) -> CatalogConsensus {
    if connected.is_empty() {
        return CatalogConsensus::default();
    }
    let ready = connected.iter().all(|s| project(s).is_ready());
    if !ready {
        return CatalogConsensus { ready: false, aligned: false };
    }
    let first = project(connected[0]);
    let aligned = connected.iter().all(|s| project(s) == first);
    CatalogConsensus { ready: true, aligned }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Consensus {
    pub static_info: StaticInfoConsensus,
    pub state: FieldConsensus<DeviceState>,
    pub timing: FieldConsensus<TimingConfig>,
    pub trigger: FieldConsensus<TriggerConfig>,
    pub channel_map: FieldConsensus<ChannelMap>,
    pub var_list: CatalogConsensus,
    pub rt_labels: CatalogConsensus,
    /// `rt_values[i]` is `Some(v)` iff every connected device reports index
    /// `i` with the same value `v`.
    pub rt_values: Vec<Option<f32>>,
}

fn connected_of(snapshots: &[DeviceSnapshot]) -> Vec<&DeviceSnapshot> {
    snapshots
        .iter()
        .filter(|s| s.status == ConnectionStatus::Connected)
        .collect()
}

pub fn derive(snapshots: &[DeviceSnapshot]) -> Consensus {
    let connected = connected_of(snapshots);
    derive_from_connected(&connected)
}

fn derive_from_connected(connected: &[&DeviceSnapshot]) -> Consensus {
    let max_rt = connected
        .iter()
        .flat_map(|s| s.rt_buffers.keys().copied())
        .max()
        .map(|m| m as usize + 1)
        .unwrap_or(0);

    let rt_values = (0..max_rt as u8)
        .map(|idx| {
            if connected.is_empty() {
                return None;
            }
            let mut it = connected.iter().map(|s| s.rt_buffers.get(&idx).copied());
            let first = it.next().flatten()?;
            if connected.iter().all(|s| s.rt_buffers.get(&idx) == Some(&first)) {
                Some(first)
            } else {
                None
            }
        })
        .collect();

    Consensus {
        static_info: static_info_consensus(connected),
        state: field_consensus(connected, |s| s.state),
        timing: field_consensus(connected, |s| s.timing),
        trigger: field_consensus(connected, |s| s.trigger),
        channel_map: field_consensus(connected, |s| s.channel_map.clone()),
        var_list: catalog_consensus(connected, |s| &s.catalog.var_list),
        rt_labels: catalog_consensus(connected, |s| &s.catalog.rt_labels),
        rt_values,
    }
}

pub(crate) fn derive_for_policy(connected: &[&DeviceSnapshot]) -> Consensus {
    derive_from_connected(connected)
}
