//! Drives the framer and codec together over a byte stream shaped like a
//! real device conversation, instead of exercising either module alone.

use scopehost_wire::bytes::Endianness;
use scopehost_wire::codec;
use scopehost_wire::framer::{encode_frame, Framer, ParseEvent};
use scopehost_wire::model::{DeviceState, MessageType};

#[test]
fn get_info_request_then_response_over_the_wire() {
    let request = encode_frame(MessageType::GetInfo.as_u8(), &codec::encode_get_info()).unwrap();
    assert_eq!(request.len(), 5); // SYNC LEN TYPE CRC, no payload

    let payload: Vec<u8> = vec![
        0x02, 0x40, 0x00, 0x14, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00, b'D', b'U', b'T', 0,
    ];
    let response = encode_frame(MessageType::GetInfo.as_u8(), &payload).unwrap();

    let mut framer = Framer::new();
    let events = framer.push_bytes(&response);
    let ParseEvent::Frame { msg_type, payload } = events.into_iter().next().unwrap() else {
        panic!("expected a valid frame");
    };
    assert_eq!(msg_type, MessageType::GetInfo.as_u8());
    let info = codec::decode_get_info_response(&payload).unwrap();
    assert_eq!(info.num_channels, 2);
    assert_eq!(info.device_name, "DUT");
}

#[test]
fn set_state_roundtrips_through_a_noisy_line() {
    let req_payload = codec::encode_set_state(DeviceState::Running);
    let frame = encode_frame(MessageType::SetState.as_u8(), &req_payload).unwrap();

    // Noise before and between bytes must not prevent resync.
    let mut stream = vec![0xAA, 0xAA];
    stream.extend_from_slice(&frame[..2]);
    stream.push(0x00); // garbage injected mid-sync-search is harmless pre-SYNC
    stream.extend_from_slice(&frame[2..]);

    let mut framer = Framer::new();
    let events = framer.push_bytes(&stream);
    assert_eq!(events.len(), 1);
    let ParseEvent::Frame { msg_type, payload } = &events[0] else {
        panic!("expected a valid frame");
    };
    assert_eq!(*msg_type, MessageType::SetState.as_u8());
    let state = codec::decode_state_response(payload).unwrap();
    assert_eq!(state, DeviceState::Running);
}

#[test]
fn error_frame_is_recognized_regardless_of_which_request_it_answers() {
    let frame = encode_frame(MessageType::Error.as_u8(), &[5]).unwrap();
    let mut framer = Framer::new();
    let events = framer.push_bytes(&frame);
    let ParseEvent::Frame { msg_type, payload } = &events[0] else {
        panic!("expected a valid frame");
    };
    assert_eq!(*msg_type, MessageType::Error.as_u8());
    let code = codec::decode_error_response(payload).unwrap();
    assert_eq!(code, scopehost_wire::ErrorCode::NotReady);
}

#[test]
fn snapshot_header_roundtrips_with_big_endian_device() {
    let channel_map = vec![3u8, 1, 2];
    let rt_values = vec![1.5f32, -2.5, 0.0];
    let mut payload = channel_map.clone();
    payload.extend_from_slice(&100u32.to_be_bytes());
    payload.extend_from_slice(&50u32.to_be_bytes());
    payload.extend_from_slice(&2.5f32.to_be_bytes());
    payload.push(1); // trigger_channel
    payload.push(1); // TriggerMode::Rising
    for v in &rt_values {
        payload.extend_from_slice(&v.to_be_bytes());
    }

    let header =
        codec::decode_snapshot_header_response(&payload, 3, 3, Endianness::Big).unwrap();
    assert_eq!(header.channel_map, channel_map);
    assert_eq!(header.divider, 100);
    assert_eq!(header.pre_trig, 50);
    assert_eq!(header.trigger_threshold, 2.5);
    assert_eq!(header.rt_values, rt_values);
}
