//! `DeviceSession`: a thin typed wrapper around one [`Transport`] plus the
//! [`DeviceInfo`] it learned at `open`. One method per protocol operation in
//! spec.md §6's message table; each encodes, round-trips through the
//! transport, checks the response type, and decodes.

use scopehost_transport::{SerialPort, Transport, TransportError};
use scopehost_wire::bytes::Endianness;
use scopehost_wire::codec;
use scopehost_wire::model::{
    ChannelMap, DeviceInfo, DeviceState, MessageType, NameListPage, SnapshotHeader, TimingConfig,
    TriggerConfig,
};
use scopehost_wire::WireError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("expected response type {expected:#04x}, got {got:#04x}")]
    UnexpectedResponseType { expected: u8, got: u8 },
}

/// Owns `(handle, DeviceInfo)` for one connected device. `DeviceInfo` is
/// populated once at `open` and never mutated afterwards (spec.md §3
/// ownership rules) — dropping the session releases the handle.
pub struct DeviceSession<S: SerialPort> {
    transport: Transport<S>,
    info: DeviceInfo,
}

/// Checks the transport-level response: `TYPE` must equal `request_type` or
/// be `ERROR`. Any other `TYPE` is a protocol violation (mismatched
/// request/response pairing), not something retryable.
fn expect_type(
    request_type: MessageType,
    resp: scopehost_transport::RawResponse,
) -> Result<Vec<u8>, SessionError> {
    if resp.msg_type == MessageType::Error.as_u8() {
        let code = codec::decode_error_response(&resp.payload)?;
        return Err(SessionError::Wire(WireError::Device(code)));
    }
    if resp.msg_type != request_type.as_u8() {
        return Err(SessionError::UnexpectedResponseType {
            expected: request_type.as_u8(),
            got: resp.msg_type,
        });
    }
    Ok(resp.payload)
}

impl<S: SerialPort> DeviceSession<S> {
    /// Opens a session: issues `GET_INFO` and caches the result. If
    /// `GET_INFO` fails, `port` is dropped right here rather than leaked
    /// into a half-open session the caller can't clean up.
    pub async fn open(port: S, request_timeout: Duration) -> Result<Self, SessionError> {
        let mut transport = Transport::new(port, request_timeout);
        let resp = transport
            .send_request(MessageType::GetInfo.as_u8(), &codec::encode_get_info())
            .await?;
        let payload = expect_type(MessageType::GetInfo, resp)?;
        let info = codec::decode_get_info_response(&payload)?;
        Ok(Self { transport, info })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn endianness(&self) -> Endianness {
        self.info.endianness
    }

    async fn call(
        &mut self,
        request_type: MessageType,
        payload: &[u8],
    ) -> Result<Vec<u8>, SessionError> {
        let resp = self.transport.send_request(request_type.as_u8(), payload).await?;
        expect_type(request_type, resp)
    }

    pub async fn get_timing(&mut self) -> Result<TimingConfig, SessionError> {
        let payload = self.call(MessageType::GetTiming, &codec::encode_get_timing()).await?;
        Ok(codec::decode_timing_response(&payload, self.endianness())?)
    }

    pub async fn set_timing(&mut self, cfg: TimingConfig) -> Result<TimingConfig, SessionError> {
        let req = codec::encode_set_timing(&cfg, self.endianness())?;
        let payload = self.call(MessageType::SetTiming, &req).await?;
        Ok(codec::decode_timing_response(&payload, self.endianness())?)
    }

    pub async fn get_state(&mut self) -> Result<DeviceState, SessionError> {
        let payload = self.call(MessageType::GetState, &codec::encode_get_state()).await?;
        Ok(codec::decode_state_response(&payload)?)
    }

    pub async fn set_state(&mut self, state: DeviceState) -> Result<DeviceState, SessionError> {
        let req = codec::encode_set_state(state);
        let payload = self.call(MessageType::SetState, &req).await?;
        Ok(codec::decode_state_response(&payload)?)
    }

    pub async fn trigger(&mut self) -> Result<(), SessionError> {
        self.call(MessageType::Trigger, &codec::encode_trigger()).await?;
        Ok(())
    }

    pub async fn get_frame(&mut self) -> Result<Vec<f32>, SessionError> {
        let payload = self.call(MessageType::GetFrame, &codec::encode_get_frame()).await?;
        Ok(codec::decode_frame_response(
            &payload,
            self.info.num_channels,
            self.endianness(),
        )?)
    }

    pub async fn get_snapshot_header(&mut self) -> Result<SnapshotHeader, SessionError> {
        let payload = self
            .call(MessageType::GetSnapshotHeader, &codec::encode_get_snapshot_header())
            .await?;
        Ok(codec::decode_snapshot_header_response(
            &payload,
            self.info.num_channels,
            self.info.rt_count,
            self.endianness(),
        )?)
    }

    /// Raw `GET_SNAPSHOT_DATA` call; chunking/adaptive sizing lives in
    /// `scopehost-snapshot`, not here.
    pub async fn get_snapshot_data(
        &mut self,
        start_sample: u16,
        count: u8,
    ) -> Result<Vec<Vec<f32>>, SessionError> {
        let req = codec::encode_get_snapshot_data(start_sample, count, self.endianness())?;
        let payload = self.call(MessageType::GetSnapshotData, &req).await?;
        Ok(codec::decode_snapshot_data_response(
            &payload,
            count,
            self.info.num_channels,
            self.endianness(),
        )?)
    }

    pub async fn get_var_list_page(&mut self, start: u8, max: u8) -> Result<NameListPage, SessionError> {
        let req = codec::encode_name_list_page_request(start, max);
        let payload = self.call(MessageType::GetVarList, &req).await?;
        Ok(codec::decode_name_list_page_response(&payload, self.info.name_len)?)
    }

    pub async fn get_rt_labels_page(&mut self, start: u8, max: u8) -> Result<NameListPage, SessionError> {
        let req = codec::encode_name_list_page_request(start, max);
        let payload = self.call(MessageType::GetRtLabels, &req).await?;
        Ok(codec::decode_name_list_page_response(&payload, self.info.name_len)?)
    }

    pub async fn get_channel_map(&mut self) -> Result<ChannelMap, SessionError> {
        let payload = self
            .call(MessageType::GetChannelMap, &codec::encode_get_channel_map())
            .await?;
        Ok(codec::decode_channel_map_response(&payload, self.info.num_channels)?)
    }

    pub async fn set_channel_map_entry(
        &mut self,
        channel_idx: u8,
        catalog_idx: u8,
    ) -> Result<(u8, u8), SessionError> {
        let req = codec::encode_set_channel_map(channel_idx, catalog_idx);
        let payload = self.call(MessageType::SetChannelMap, &req).await?;
        Ok(codec::decode_set_channel_map_response(&payload)?)
    }

    pub async fn get_rt_buffer(&mut self, index: u8) -> Result<f32, SessionError> {
        let req = codec::encode_get_rt_buffer(index);
        let payload = self.call(MessageType::GetRtBuffer, &req).await?;
        Ok(codec::decode_rt_buffer_response(&payload, self.endianness())?)
    }

    pub async fn set_rt_buffer(&mut self, index: u8, value: f32) -> Result<f32, SessionError> {
        let req = codec::encode_set_rt_buffer(index, value, self.endianness())?;
        let payload = self.call(MessageType::SetRtBuffer, &req).await?;
        Ok(codec::decode_rt_buffer_response(&payload, self.endianness())?)
    }

    pub async fn get_trigger(&mut self) -> Result<TriggerConfig, SessionError> {
        let payload = self.call(MessageType::GetTrigger, &codec::encode_get_trigger()).await?;
        Ok(codec::decode_trigger_response(&payload, self.endianness())?)
    }

    pub async fn set_trigger(&mut self, cfg: TriggerConfig) -> Result<TriggerConfig, SessionError> {
        let req = codec::encode_set_trigger(&cfg, self.endianness())?;
        let payload = self.call(MessageType::SetTrigger, &req).await?;
        Ok(codec::decode_trigger_response(&payload, self.endianness())?)
    }
}
