//! The post-trigger snapshot downloader (spec.md §4.8): an adaptive-chunk
//! streaming read of `[0, buffer_size)`, halving the chunk size on failure
//! and resuming from the same offset rather than giving up the device.

use scopehost_session::{DeviceSession, SessionError};
use scopehost_transport::{SerialPort, TransportError};
use scopehost_wire::model::ErrorCode;
use scopehost_wire::{framer::MAX_PAYLOAD, WireError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// A chunk still failed after shrinking to a single sample twice in a
    /// row.
    #[error("chunk download failed even at a single sample")]
    ChunkFailure,
    /// The device reported `NotReady` mid-download: the snapshot became
    /// invalid (e.g. a new acquisition started) before the read completed.
    #[error("snapshot became invalid mid-download")]
    NotReady,
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Largest `GET_SNAPSHOT_DATA` request that fits one frame: `count *
/// num_channels * 4` response bytes must fit in `MAX_PAYLOAD`, and spec.md
/// §4.8 caps it at 63 regardless.
pub fn max_chunk_size(num_channels: u8) -> usize {
    let per_sample = num_channels as usize * 4;
    let fits_in_frame = (MAX_PAYLOAD - 1) / per_sample;
    fits_in_frame.min(63).max(1)
}

fn is_retryable(err: &SessionError) -> bool {
    matches!(
        err,
        SessionError::Transport(TransportError::Timeout)
            | SessionError::Transport(TransportError::CrcMismatch)
    )
}

/// Downloads the full post-trigger buffer, `[0, buffer_size)`, calling
/// `on_chunk(start, samples)` as each contiguous run arrives (in addition
/// to the full concatenated result being the return value — callers that
/// want to emit a `SnapshotChunk` event per arrival use the callback, ones
/// that just want the data can ignore it).
///
/// Retries within one chunk halve the requested size on `Timeout`/
/// `CrcMismatch` and resume from the *same* offset; a fresh chunk always
/// starts again at the full adaptive size (spec.md §8 scenario 4: after a
/// successful reduced-size chunk, the next chunk is attempted at the full
/// size again, not the reduced one).
pub async fn download_snapshot<S: SerialPort>(
    session: &mut DeviceSession<S>,
    buffer_size: u16,
    mut on_chunk: impl FnMut(u16, &[Vec<f32>]),
) -> Result<Vec<Vec<f32>>, DownloadError> {
    let num_channels = session.info().num_channels;
    let max_chunk = max_chunk_size(num_channels);
    let mut offset: u16 = 0;
    let mut out = Vec::with_capacity(buffer_size as usize);

    while (offset as usize) < buffer_size as usize {
        let remaining = buffer_size as usize - offset as usize;
        let mut attempt = max_chunk.min(remaining);
        let mut consecutive_single_sample_failures = 0u32;

        loop {
            match session.get_snapshot_data(offset, attempt as u8).await {
                Ok(samples) => {
                    on_chunk(offset, &samples);
                    offset += samples.len() as u16;
                    out.extend(samples);
                    break;
                }
                Err(SessionError::Wire(WireError::Device(ErrorCode::NotReady))) => {
                    return Err(DownloadError::NotReady);
                }
                Err(err) if is_retryable(&err) => {
                    if attempt <= 1 {
                        consecutive_single_sample_failures += 1;
                        if consecutive_single_sample_failures >= 2 {
                            return Err(DownloadError::ChunkFailure);
                        }
                    } else {
                        attempt = (attempt / 2).max(1);
                    }
                }
                Err(err) => return Err(DownloadError::Session(err)),
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopehost_transport::fake::FakeSerialPort;
    use scopehost_wire::framer::encode_frame;
    use scopehost_wire::model::MessageType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn get_info_payload(num_channels: u8) -> Vec<u8> {
        let mut payload = vec![num_channels, 0x64, 0x00, 0x0A, 0x00, 0, 0, 0, 4, 0];
        payload.extend_from_slice(b"dev\0");
        payload
    }

    fn encode_samples(samples: &[Vec<f32>]) -> Vec<u8> {
        let mut out = Vec::new();
        for sample in samples {
            for v in sample {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out
    }

    #[test]
    fn max_chunk_size_is_capped_at_63() {
        assert_eq!(max_chunk_size(1), 63);
        assert_eq!(max_chunk_size(5), 12);
    }

    #[tokio::test]
    async fn downloads_full_buffer_in_one_chunk_when_it_fits() {
        let num_channels = 2;
        let buffer_size = 10u16;
        let samples: Vec<Vec<f32>> = (0..buffer_size)
            .map(|i| vec![i as f32, i as f32 * 2.0])
            .collect();
        let frames = vec![
            encode_frame(MessageType::GetInfo.as_u8(), &get_info_payload(num_channels)).unwrap(),
            encode_frame(MessageType::GetSnapshotData.as_u8(), &encode_samples(&samples)).unwrap(),
        ];
        let port = FakeSerialPort::scripted(frames);
        let mut session = DeviceSession::open(port, Duration::from_millis(200)).await.unwrap();

        let chunks = Arc::new(std::sync::Mutex::new(Vec::new()));
        let chunks_clone = chunks.clone();
        let out = download_snapshot(&mut session, buffer_size, |start, s| {
            chunks_clone.lock().unwrap().push((start, s.len()));
        })
        .await
        .unwrap();

        assert_eq!(out, samples);
        assert_eq!(*chunks.lock().unwrap(), vec![(0, 10)]);
    }

    #[tokio::test]
    async fn halves_chunk_size_on_crc_mismatch_then_resumes() {
        let num_channels = 1u8;
        let buffer_size = 4u16;
        let all_samples: Vec<Vec<f32>> = (0..buffer_size).map(|i| vec![i as f32]).collect();

        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();
        let all_samples_clone = all_samples.clone();
        let info_frame = encode_frame(MessageType::GetInfo.as_u8(), &get_info_payload(num_channels)).unwrap();
        let port = FakeSerialPort::empty().with_responder(move |written| {
            let n = call_count_clone.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                return info_frame.clone();
            }
            // Second call (the first GET_SNAPSHOT_DATA, count=4): corrupt it.
            if n == 1 {
                let mut frame =
                    encode_frame(MessageType::GetSnapshotData.as_u8(), &encode_samples(&all_samples_clone)).unwrap();
                *frame.last_mut().unwrap() ^= 0xFF;
                return frame;
            }
            // Every later call: decode the request and answer for real.
            // Frame layout is SYNC|LEN|TYPE|start_lo|start_hi|count|CRC.
            let start = u16::from_le_bytes([written[3], written[4]]);
            let count = written[5] as usize;
            let slice = &all_samples_clone[start as usize..start as usize + count];
            encode_frame(MessageType::GetSnapshotData.as_u8(), &encode_samples(slice)).unwrap()
        });
        let mut session = DeviceSession::open(port, Duration::from_millis(200)).await.unwrap();

        let out = download_snapshot(&mut session, buffer_size, |_, _| {}).await.unwrap();
        assert_eq!(out, all_samples);
    }

    #[tokio::test]
    async fn device_not_ready_aborts_immediately() {
        let num_channels = 1u8;
        let port = FakeSerialPort::scripted(vec![
            encode_frame(MessageType::GetInfo.as_u8(), &get_info_payload(num_channels)).unwrap(),
            encode_frame(MessageType::Error.as_u8(), &[5]).unwrap(),
        ]);
        let mut session = DeviceSession::open(port, Duration::from_millis(200)).await.unwrap();
        let err = download_snapshot(&mut session, 10, |_, _| {}).await.unwrap_err();
        assert!(matches!(err, DownloadError::NotReady));
    }

    #[tokio::test]
    async fn repeated_failure_at_one_sample_aborts_with_chunk_failure() {
        let num_channels = 1u8;
        let info_frame = encode_frame(MessageType::GetInfo.as_u8(), &get_info_payload(num_channels)).unwrap();
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();
        let port = FakeSerialPort::empty().with_responder(move |_written| {
            let n = call_count_clone.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                return info_frame.clone();
            }
            // Every GET_SNAPSHOT_DATA comes back CRC-corrupted, forever.
            let mut frame = encode_frame(
                MessageType::GetSnapshotData.as_u8(),
                &encode_samples(&[vec![1.0]]),
            )
            .unwrap();
            *frame.last_mut().unwrap() ^= 0xFF;
            frame
        });
        let mut session = DeviceSession::open(port, Duration::from_millis(200)).await.unwrap();
        let err = download_snapshot(&mut session, 1, |_, _| {}).await.unwrap_err();
        assert!(matches!(err, DownloadError::ChunkFailure));
    }
}
