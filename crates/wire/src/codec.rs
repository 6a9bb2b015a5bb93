//! Per-message-family encoders/decoders. Each function is pure: it takes
//! typed arguments (plus device metadata where the shape depends on it) and
//! returns bytes, or takes a raw response payload and returns a typed value.
//!
//! Requests that carry no arguments are a single `TYPE` byte — the framer
//! adds no payload for those (`encode_frame(ty, &[])`).

use crate::bytes::{self, Endianness};
use crate::error::WireError;
use crate::model::{
    ChannelMap, DeviceInfo, DeviceState, ErrorCode, MessageType, NameListPage, SnapshotHeader,
    TimingConfig, TriggerConfig, TriggerMode,
};

/// Raises [`WireError::Device`] if `payload` is an `0xFF ERROR` frame's
/// payload. Called by every decoder before interpreting bytes as its own
/// response shape — the transport hands decoders the raw frame body after
/// checking `TYPE`, but `TYPE == ERROR` is itself a valid response to any
/// request, so decoders must still special-case it.
pub fn decode_error_response(payload: &[u8]) -> Result<ErrorCode, WireError> {
    let byte = bytes::read_u8(payload, 0)?;
    ErrorCode::from_u8(byte).ok_or_else(|| WireError::decode(format!("unknown error code {byte}")))
}

// ---- GET_INFO ---------------------------------------------------------

pub fn encode_get_info() -> Vec<u8> {
    Vec::new()
}

/// The only decoder that does not take a [`DeviceInfo`] — it produces one.
///
/// `buffer_size` and `isr_khz` are decoded little-endian unconditionally:
/// they precede the `endianness` byte on the wire, so there is no other
/// endianness to decode them with.
pub fn decode_get_info_response(payload: &[u8]) -> Result<DeviceInfo, WireError> {
    let num_channels = bytes::read_u8(payload, 0)?;
    if num_channels < 1 {
        return Err(WireError::decode("num_channels must be >= 1"));
    }
    let buffer_size = bytes::read_u16(payload, 1, Endianness::Little)?;
    let isr_khz = bytes::read_u16(payload, 3, Endianness::Little)?;
    let var_count = bytes::read_u8(payload, 5)?;
    let rt_count = bytes::read_u8(payload, 6)?;
    let rt_buffer_len = bytes::read_u8(payload, 7)?;
    let name_len = bytes::read_u8(payload, 8)?;
    if name_len < 1 {
        return Err(WireError::decode("name_len must be >= 1"));
    }
    let endianness = match bytes::read_u8(payload, 9)? {
        0 => Endianness::Little,
        1 => Endianness::Big,
        other => return Err(WireError::decode(format!("unknown endianness byte {other}"))),
    };
    let device_name = bytes::read_fixed_string(payload, 10, name_len as usize)?;

    Ok(DeviceInfo {
        num_channels,
        buffer_size,
        isr_khz,
        var_count,
        rt_count,
        rt_buffer_len,
        name_len,
        endianness,
        device_name,
    })
}

// ---- GET_TIMING / SET_TIMING -------------------------------------------

pub fn encode_get_timing() -> Vec<u8> {
    Vec::new()
}

pub fn decode_timing_response(payload: &[u8], endianness: Endianness) -> Result<TimingConfig, WireError> {
    let divider = bytes::read_u32(payload, 0, endianness)?;
    let pre_trig = bytes::read_u32(payload, 4, endianness)?;
    Ok(TimingConfig { divider, pre_trig })
}

/// Fails if `divider == 0` — the device rejects it and the host should
/// never bother sending it.
pub fn encode_set_timing(cfg: &TimingConfig, endianness: Endianness) -> Result<Vec<u8>, WireError> {
    if cfg.divider == 0 {
        return Err(WireError::decode("divider must be >= 1"));
    }
    let mut buf = [0u8; 8];
    bytes::write_u32(&mut buf, 0, cfg.divider, endianness)?;
    bytes::write_u32(&mut buf, 4, cfg.pre_trig, endianness)?;
    Ok(buf.to_vec())
}

// ---- GET_STATE / SET_STATE ----------------------------------------------

pub fn encode_get_state() -> Vec<u8> {
    Vec::new()
}

pub fn decode_state_response(payload: &[u8]) -> Result<DeviceState, WireError> {
    let byte = bytes::read_u8(payload, 0)?;
    DeviceState::from_u8(byte).ok_or_else(|| WireError::decode(format!("unknown device state {byte}")))
}

pub fn encode_set_state(state: DeviceState) -> Vec<u8> {
    vec![state.as_u8()]
}

// ---- TRIGGER -------------------------------------------------------------

pub fn encode_trigger() -> Vec<u8> {
    Vec::new()
}

// ---- GET_FRAME ------------------------------------------------------------

pub fn encode_get_frame() -> Vec<u8> {
    Vec::new()
}

pub fn decode_frame_response(
    payload: &[u8],
    num_channels: u8,
    endianness: Endianness,
) -> Result<Vec<f32>, WireError> {
    let expected = num_channels as usize * 4;
    if payload.len() != expected {
        return Err(WireError::decode(format!(
            "GET_FRAME payload is {} bytes, expected {expected}",
            payload.len()
        )));
    }
    (0..num_channels as usize)
        .map(|i| bytes::read_f32(payload, i * 4, endianness))
        .collect()
}

// ---- GET_SNAPSHOT_HEADER --------------------------------------------------

pub fn encode_get_snapshot_header() -> Vec<u8> {
    Vec::new()
}

pub fn decode_snapshot_header_response(
    payload: &[u8],
    num_channels: u8,
    rt_count: u8,
    endianness: Endianness,
) -> Result<SnapshotHeader, WireError> {
    let num_channels = num_channels as usize;
    let rt_count = rt_count as usize;
    let expected = num_channels + 4 + 4 + 4 + 1 + 1 + rt_count * 4;
    if payload.len() != expected {
        return Err(WireError::decode(format!(
            "GET_SNAPSHOT_HEADER payload is {} bytes, expected {expected}",
            payload.len()
        )));
    }

    let channel_map: ChannelMap = payload[..num_channels].to_vec();
    let mut off = num_channels;
    let divider = bytes::read_u32(payload, off, endianness)?;
    off += 4;
    let pre_trig = bytes::read_u32(payload, off, endianness)?;
    off += 4;
    let trigger_threshold = bytes::read_f32(payload, off, endianness)?;
    off += 4;
    let trigger_channel = bytes::read_u8(payload, off)?;
    off += 1;
    let mode_byte = bytes::read_u8(payload, off)?;
    off += 1;
    let trigger_mode = TriggerMode::from_u8(mode_byte)
        .ok_or_else(|| WireError::decode(format!("unknown trigger mode {mode_byte}")))?;

    let mut rt_values = Vec::with_capacity(rt_count);
    for i in 0..rt_count {
        rt_values.push(bytes::read_f32(payload, off + i * 4, endianness)?);
    }

    Ok(SnapshotHeader {
        channel_map,
        divider,
        pre_trig,
        trigger_threshold,
        trigger_channel,
        trigger_mode,
        rt_values,
    })
}

// ---- GET_SNAPSHOT_DATA ------------------------------------------------

pub fn encode_get_snapshot_data(start_sample: u16, count: u8, endianness: Endianness) -> Result<Vec<u8>, WireError> {
    let mut buf = [0u8; 3];
    bytes::write_u16(&mut buf, 0, start_sample, endianness)?;
    bytes::write_u8(&mut buf, 2, count)?;
    Ok(buf.to_vec())
}

/// Decodes a contiguous run of samples in sample-major order: each sample is
/// `num_channels` floats, samples are laid out back to back.
pub fn decode_snapshot_data_response(
    payload: &[u8],
    count: u8,
    num_channels: u8,
    endianness: Endianness,
) -> Result<Vec<Vec<f32>>, WireError> {
    let count = count as usize;
    let num_channels = num_channels as usize;
    let expected = count * num_channels * 4;
    if payload.len() != expected {
        return Err(WireError::decode(format!(
            "GET_SNAPSHOT_DATA payload is {} bytes, expected {expected}",
            payload.len()
        )));
    }
    (0..count)
        .map(|sample| {
            (0..num_channels)
                .map(|ch| bytes::read_f32(payload, (sample * num_channels + ch) * 4, endianness))
                .collect::<Result<Vec<f32>, WireError>>()
        })
        .collect()
}

// ---- GET_VAR_LIST / GET_RT_LABELS --------------------------------------

pub fn encode_name_list_page_request(start: u8, max: u8) -> Vec<u8> {
    vec![start, max]
}

pub fn decode_name_list_page_response(payload: &[u8], name_len: u8) -> Result<NameListPage, WireError> {
    let total_count = bytes::read_u8(payload, 0)?;
    let start_idx = bytes::read_u8(payload, 1)?;
    let count = bytes::read_u8(payload, 2)?;
    let name_len = name_len as usize;
    let expected = 3 + count as usize * name_len;
    if payload.len() != expected {
        return Err(WireError::decode(format!(
            "name list page payload is {} bytes, expected {expected}",
            payload.len()
        )));
    }
    let mut entries = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        entries.push(bytes::read_fixed_string(payload, 3 + i * name_len, name_len)?);
    }
    Ok(NameListPage {
        total_count,
        start_idx,
        entries,
    })
}

// ---- GET_CHANNEL_MAP / SET_CHANNEL_MAP ---------------------------------

pub fn encode_get_channel_map() -> Vec<u8> {
    Vec::new()
}

pub fn decode_channel_map_response(payload: &[u8], num_channels: u8) -> Result<ChannelMap, WireError> {
    let expected = num_channels as usize;
    if payload.len() != expected {
        return Err(WireError::decode(format!(
            "GET_CHANNEL_MAP payload is {} bytes, expected {expected}",
            payload.len()
        )));
    }
    Ok(payload.to_vec())
}

pub fn encode_set_channel_map(channel_idx: u8, catalog_idx: u8) -> Vec<u8> {
    vec![channel_idx, catalog_idx]
}

pub fn decode_set_channel_map_response(payload: &[u8]) -> Result<(u8, u8), WireError> {
    if payload.len() != 2 {
        return Err(WireError::decode(format!(
            "SET_CHANNEL_MAP payload is {} bytes, expected 2",
            payload.len()
        )));
    }
    Ok((payload[0], payload[1]))
}

// ---- GET_RT_BUFFER / SET_RT_BUFFER -------------------------------------

pub fn encode_get_rt_buffer(index: u8) -> Vec<u8> {
    vec![index]
}

pub fn decode_rt_buffer_response(payload: &[u8], endianness: Endianness) -> Result<f32, WireError> {
    if payload.len() != 4 {
        return Err(WireError::decode(format!(
            "GET_RT_BUFFER payload is {} bytes, expected 4",
            payload.len()
        )));
    }
    bytes::read_f32(payload, 0, endianness)
}

pub fn encode_set_rt_buffer(index: u8, value: f32, endianness: Endianness) -> Result<Vec<u8>, WireError> {
    let mut buf = [0u8; 5];
    bytes::write_u8(&mut buf, 0, index)?;
    bytes::write_f32(&mut buf, 1, value, endianness)?;
    Ok(buf.to_vec())
}

// ---- GET_TRIGGER / SET_TRIGGER ------------------------------------------

pub fn encode_get_trigger() -> Vec<u8> {
    Vec::new()
}

pub fn decode_trigger_response(payload: &[u8], endianness: Endianness) -> Result<TriggerConfig, WireError> {
    if payload.len() != 6 {
        return Err(WireError::decode(format!(
            "GET_TRIGGER payload is {} bytes, expected 6",
            payload.len()
        )));
    }
    let threshold = bytes::read_f32(payload, 0, endianness)?;
    let channel = bytes::read_u8(payload, 4)?;
    let mode_byte = bytes::read_u8(payload, 5)?;
    let mode = TriggerMode::from_u8(mode_byte)
        .ok_or_else(|| WireError::decode(format!("unknown trigger mode {mode_byte}")))?;
    Ok(TriggerConfig {
        threshold,
        channel,
        mode,
    })
}

pub fn encode_set_trigger(cfg: &TriggerConfig, endianness: Endianness) -> Result<Vec<u8>, WireError> {
    let mut buf = [0u8; 6];
    bytes::write_f32(&mut buf, 0, cfg.threshold, endianness)?;
    bytes::write_u8(&mut buf, 4, cfg.channel)?;
    bytes::write_u8(&mut buf, 5, cfg.mode.as_u8())?;
    Ok(buf.to_vec())
}

/// Which request type a [`MessageType`] response must come back as —
/// every request/response pair shares the same type except there is none
/// here for `ERROR`, which is a valid response to any request.
pub fn response_type_for(request: MessageType) -> MessageType {
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn get_info_decodes_concrete_example() {
        let payload: Vec<u8> = vec![
            0x05, 0xE8, 0x03, 0x0A, 0x00, 0x08, 0x04, 0x10, 0x10, 0x00, b'T', b'e', b's', b't',
            b'D', b'e', b'v', 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let info = decode_get_info_response(&payload).unwrap();
        assert_eq!(info.num_channels, 5);
        assert_eq!(info.buffer_size, 1000);
        assert_eq!(info.isr_khz, 10);
        assert_eq!(info.var_count, 8);
        assert_eq!(info.rt_count, 4);
        assert_eq!(info.rt_buffer_len, 16);
        assert_eq!(info.name_len, 16);
        assert_eq!(info.endianness, Endianness::Little);
        assert_eq!(info.device_name, "TestDev");
    }

    #[test]
    fn set_timing_mirror_response_roundtrips() {
        let cfg = TimingConfig {
            divider: 100,
            pre_trig: 500,
        };
        let req = encode_set_timing(&cfg, Endianness::Little).unwrap();
        assert_eq!(req, vec![0x64, 0x00, 0x00, 0x00, 0xF4, 0x01, 0x00, 0x00]);
        // The mirror response carries the same bytes as GET_TIMING would.
        let decoded = decode_timing_response(&req, Endianness::Little).unwrap();
        assert_eq!(decoded, cfg);
    }

    #[test]
    fn set_timing_rejects_zero_divider() {
        let cfg = TimingConfig {
            divider: 0,
            pre_trig: 0,
        };
        assert!(encode_set_timing(&cfg, Endianness::Little).is_err());
    }

    #[test]
    fn snapshot_data_is_sample_major() {
        // 2 samples, 3 channels: [s0c0 s0c1 s0c2 s1c0 s1c1 s1c2]
        let values: [f32; 6] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut payload = Vec::new();
        for v in values {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let samples = decode_snapshot_data_response(&payload, 2, 3, Endianness::Little).unwrap();
        assert_eq!(samples, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
    }

    #[test]
    fn error_frame_decodes_known_codes() {
        assert_eq!(decode_error_response(&[5]).unwrap(), ErrorCode::NotReady);
        assert!(decode_error_response(&[0xEE]).is_err());
    }

    fn timing_cfg_strategy() -> impl Strategy<Value = TimingConfig> {
        (1u32..=u32::MAX, 0u32..=u32::MAX).prop_map(|(divider, pre_trig)| TimingConfig {
            divider,
            pre_trig,
        })
    }

    proptest! {
        // Codec round-trip: decoding a SET_TIMING mirror response with the
        // same endianness yields back the args that were encoded.
        #[test]
        fn timing_roundtrip(cfg in timing_cfg_strategy(), little in any::<bool>()) {
            let endianness = if little { Endianness::Little } else { Endianness::Big };
            let encoded = encode_set_timing(&cfg, endianness).unwrap();
            let decoded = decode_timing_response(&encoded, endianness).unwrap();
            prop_assert_eq!(decoded, cfg);
        }

        // Endianness: encoding Little then byte-swapping each multi-byte
        // field equals encoding Big.
        #[test]
        fn endianness_swap_equivalence(cfg in timing_cfg_strategy()) {
            let le = encode_set_timing(&cfg, Endianness::Little).unwrap();
            let be = encode_set_timing(&cfg, Endianness::Big).unwrap();
            let mut swapped = le.clone();
            for chunk in swapped.chunks_mut(4) {
                chunk.reverse();
            }
            prop_assert_eq!(swapped, be);
        }

        #[test]
        fn get_frame_roundtrip(num_channels in 1u8..=8, little in any::<bool>()) {
            let endianness = if little { Endianness::Little } else { Endianness::Big };
            let values: Vec<f32> = (0..num_channels).map(|i| i as f32 * 1.5).collect();
            let mut payload = Vec::new();
            for v in &values {
                let bytes = if endianness.is_little() { v.to_le_bytes() } else { v.to_be_bytes() };
                payload.extend_from_slice(&bytes);
            }
            let decoded = decode_frame_response(&payload, num_channels, endianness).unwrap();
            prop_assert_eq!(decoded, values);
        }
    }
}
