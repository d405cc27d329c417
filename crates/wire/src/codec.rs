//! Pure byte-level frame assembly, with no I/O of its own. The `link`
//! crate drives the partial-read/write loop and hands whole frames in
//! and out of here.

use crate::envelope::{ReplyHeader, RequestHeader, COMMON_PREFIX_LEN, RESULT_LEN};
use crate::error::CephfsError;

/// Upper bound on a single frame's payload, matching the daemon's
/// receive-buffer capacity; a frame that declares a larger `data_len` is
/// rejected with `ENOBUFS` before any payload bytes are read.
pub const MAX_PAYLOAD_LEN: u32 = 1 << 20;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestFrame {
    pub opcode: u16,
    pub fixed: Vec<u8>,
    pub payload: Vec<u8>,
}

impl RequestFrame {
    pub fn encode(&self) -> Result<Vec<u8>, CephfsError> {
        check_capacity(self.payload.len())?;
        let header_len = COMMON_PREFIX_LEN + self.fixed.len();
        let header_len: u16 = header_len
            .try_into()
            .map_err(|_| CephfsError::OversizeFrame { requested: self.fixed.len() as u32, capacity: u16::MAX as u32 })?;
        let header = RequestHeader {
            header_len,
            opcode: self.opcode,
            data_len: self.payload.len() as u32,
        };
        let mut out = Vec::with_capacity(header_len as usize + self.payload.len());
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&self.fixed);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Decodes a frame already fully buffered in `bytes` (the common
    /// prefix, fixed header, and payload all present). Returns the frame
    /// and the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), CephfsError> {
        let prefix: [u8; COMMON_PREFIX_LEN] = bytes
            .get(..COMMON_PREFIX_LEN)
            .and_then(|s| s.try_into().ok())
            .ok_or(CephfsError::Truncated)?;
        let header = RequestHeader::from_bytes(prefix);
        check_capacity(header.data_len as usize)?;
        let fixed_len = header.fixed_len();
        let total = COMMON_PREFIX_LEN + fixed_len + header.data_len as usize;
        let frame_bytes = bytes.get(..total).ok_or(CephfsError::Truncated)?;
        let fixed = frame_bytes[COMMON_PREFIX_LEN..COMMON_PREFIX_LEN + fixed_len].to_vec();
        let payload = frame_bytes[COMMON_PREFIX_LEN + fixed_len..].to_vec();
        Ok((Self { opcode: header.opcode, fixed, payload }, total))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReplyFrame {
    pub result: i32,
    pub fixed: Vec<u8>,
    pub payload: Vec<u8>,
}

impl ReplyFrame {
    pub fn encode(&self) -> Result<Vec<u8>, CephfsError> {
        check_capacity(self.payload.len())?;
        let header_len = COMMON_PREFIX_LEN + RESULT_LEN + self.fixed.len();
        let header_len: u16 = header_len
            .try_into()
            .map_err(|_| CephfsError::OversizeFrame { requested: self.fixed.len() as u32, capacity: u16::MAX as u32 })?;
        let header = ReplyHeader {
            header_len,
            flags: 0,
            result: self.result,
            data_len: self.payload.len() as u32,
        };
        let mut out = Vec::with_capacity(header_len as usize + self.payload.len());
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&self.fixed);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), CephfsError> {
        let prefix: [u8; COMMON_PREFIX_LEN + RESULT_LEN] = bytes
            .get(..COMMON_PREFIX_LEN + RESULT_LEN)
            .and_then(|s| s.try_into().ok())
            .ok_or(CephfsError::Truncated)?;
        let header = ReplyHeader::from_bytes(prefix);
        check_capacity(header.data_len as usize)?;
        let fixed_len = header.trailing_fixed_len();
        let fixed_start = COMMON_PREFIX_LEN + RESULT_LEN;
        let total = fixed_start + fixed_len + header.data_len as usize;
        let frame_bytes = bytes.get(..total).ok_or(CephfsError::Truncated)?;
        let fixed = frame_bytes[fixed_start..fixed_start + fixed_len].to_vec();
        let payload = frame_bytes[fixed_start + fixed_len..].to_vec();
        Ok((Self { result: header.result, fixed, payload }, total))
    }
}

fn check_capacity(requested: usize) -> Result<(), CephfsError> {
    if requested as u64 > MAX_PAYLOAD_LEN as u64 {
        return Err(CephfsError::OversizeFrame {
            requested: requested as u32,
            capacity: MAX_PAYLOAD_LEN,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn request_frame_round_trips() {
        let frame = RequestFrame { opcode: 13, fixed: vec![1, 2, 3, 4], payload: b"/a/b".to_vec() };
        let encoded = frame.encode().unwrap();
        let (decoded, consumed) = RequestFrame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn reply_frame_round_trips() {
        let frame = ReplyFrame { result: -2, fixed: vec![9, 9], payload: vec![] };
        let encoded = frame.encode().unwrap();
        let (decoded, consumed) = ReplyFrame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn oversize_payload_is_rejected_before_allocation() {
        let frame = RequestFrame { opcode: 0, fixed: vec![], payload: vec![0u8; (MAX_PAYLOAD_LEN + 1) as usize] };
        assert!(matches!(frame.encode(), Err(CephfsError::OversizeFrame { .. })));
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let frame = RequestFrame { opcode: 1, fixed: vec![1], payload: b"xyz".to_vec() };
        let encoded = frame.encode().unwrap();
        let short = &encoded[..encoded.len() - 1];
        assert!(matches!(RequestFrame::decode(short), Err(CephfsError::Truncated)));
    }

    #[test]
    fn trailing_bytes_after_a_frame_are_left_for_the_next_read() {
        let frame = RequestFrame { opcode: 2, fixed: vec![], payload: vec![7, 7] };
        let mut encoded = frame.encode().unwrap();
        encoded.extend_from_slice(&[0xAA, 0xBB]);
        let (decoded, consumed) = RequestFrame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(&encoded[consumed..], &[0xAA, 0xBB]);
    }

    proptest! {
        #[test]
        fn request_frames_round_trip_for_arbitrary_small_payloads(
            opcode: u16,
            fixed in proptest::collection::vec(any::<u8>(), 0..64),
            payload in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let frame = RequestFrame { opcode, fixed, payload };
            let encoded = frame.encode().unwrap();
            let (decoded, consumed) = RequestFrame::decode(&encoded).unwrap();
            prop_assert_eq!(decoded, frame);
            prop_assert_eq!(consumed, encoded.len());
        }

        #[test]
        fn reply_frames_round_trip_for_arbitrary_small_payloads(
            result: i32,
            fixed in proptest::collection::vec(any::<u8>(), 0..64),
            payload in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let frame = ReplyFrame { result, fixed, payload };
            let encoded = frame.encode().unwrap();
            let (decoded, consumed) = ReplyFrame::decode(&encoded).unwrap();
            prop_assert_eq!(decoded, frame);
            prop_assert_eq!(consumed, encoded.len());
        }
    }
}
