//! Strict-mode wire frames.
//!
//! ```text
//! +-------+------+--------+--------+--------+-------------+----------+
//! | Start | Type | Off Lo | Off Hi | Length |   Payload   | Checksum |
//! +-------+------+--------+--------+--------+-------------+----------+
//! | 0xAA  | 0x01 |   1    |   1    | 0..240 |   Length    |    1     |
//! +-------+------+--------+--------+--------+-------------+----------+
//! ```
//!
//! The checksum is the XOR of every byte after the start marker.

use crate::error::{Error, Result};

/// Frame start marker.
pub const START: u8 = 0xAA;

/// Frame type for payload data.
pub const TYPE_DATA: u8 = 0x01;

/// Device accepted the frame.
pub const ACK_OK: u8 = 0x55;

/// Device rejected the frame.
pub const ACK_BAD: u8 = 0xEE;

/// Largest payload carried by one frame.
pub const MAX_PAYLOAD: usize = 240;

/// Largest total payload addressable by the 16-bit offset field.
pub const MAX_TOTAL: usize = u16::MAX as usize;

/// Bytes before the payload (start, type, offset, length).
pub const HEADER_LEN: usize = 5;

/// XOR-fold a byte slice.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// One encoded data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    offset: u16,
    bytes: Vec<u8>,
}

impl Frame {
    /// Encode `chunk` as the frame at `offset`.
    pub fn encode(offset: u16, chunk: &[u8]) -> Result<Self> {
        if chunk.len() > MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge {
                len: chunk.len(),
                max: MAX_PAYLOAD,
            });
        }

        let [off_lo, off_hi] = offset.to_le_bytes();
        // Bounded by MAX_PAYLOAD above
        #[allow(clippy::cast_possible_truncation)]
        let len = chunk.len() as u8;

        let mut bytes = Vec::with_capacity(HEADER_LEN + chunk.len() + 1);
        bytes.push(START);
        bytes.push(TYPE_DATA);
        bytes.push(off_lo);
        bytes.push(off_hi);
        bytes.push(len);
        bytes.extend_from_slice(chunk);
        bytes.push(checksum(&bytes[1..]));

        Ok(Self { offset, bytes })
    }

    /// Payload offset carried in the header.
    pub fn offset(&self) -> u16 {
        self.offset
    }

    /// Payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..self.bytes.len() - 1]
    }

    /// Checksum byte.
    pub fn checksum(&self) -> u8 {
        self.bytes[self.bytes.len() - 1]
    }

    /// Bytes covered by the checksum (type through payload).
    pub fn body(&self) -> &[u8] {
        &self.bytes[1..self.bytes.len() - 1]
    }

    /// Complete wire bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Receiver-side check: the body XORs to the carried checksum.
    pub fn verify(&self) -> bool {
        checksum(self.body()) == self.checksum()
    }
}

/// Split `payload` into consecutive frames of at most [`MAX_PAYLOAD`] bytes.
///
/// An empty payload yields no frames.
pub fn split(payload: &[u8]) -> Result<Vec<Frame>> {
    if payload.len() > MAX_TOTAL {
        return Err(Error::PayloadTooLarge {
            len: payload.len(),
            max: MAX_TOTAL,
        });
    }

    payload
        .chunks(MAX_PAYLOAD)
        .enumerate()
        .map(|(i, chunk)| {
            // Offsets stay below MAX_TOTAL, checked above
            #[allow(clippy::cast_possible_truncation)]
            let offset = (i * MAX_PAYLOAD) as u16;
            Frame::encode(offset, chunk)
        })
        .collect()
}

/// Number of frames needed for `len` payload bytes.
pub fn frame_count(len: usize) -> usize {
    len.div_ceil(MAX_PAYLOAD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = Frame::encode(0x0102, &[0x10, 0x20, 0x30]).unwrap();
        let bytes = frame.as_bytes();

        assert_eq!(&bytes[..5], &[START, TYPE_DATA, 0x02, 0x01, 3]);
        assert_eq!(&bytes[5..8], &[0x10, 0x20, 0x30]);
        assert_eq!(bytes[8], 0x01 ^ 0x02 ^ 0x01 ^ 3 ^ 0x10 ^ 0x20 ^ 0x30);
        assert_eq!(bytes.len(), HEADER_LEN + 3 + 1);
    }

    #[test]
    fn test_checksum_excludes_start_byte() {
        let frame = Frame::encode(0, &[]).unwrap();
        assert_eq!(frame.as_bytes(), &[START, TYPE_DATA, 0, 0, 0, TYPE_DATA]);
        assert!(frame.verify());
    }

    #[test]
    fn test_encode_rejects_oversized_chunk() {
        let chunk = vec![0u8; MAX_PAYLOAD + 1];
        assert!(matches!(
            Frame::encode(0, &chunk),
            Err(Error::PayloadTooLarge { len: 241, max: 240 })
        ));
        assert!(Frame::encode(0, &chunk[..MAX_PAYLOAD]).is_ok());
    }

    #[test]
    fn test_encode_is_deterministic() {
        let chunk: Vec<u8> = (0..=239).collect();
        let a = Frame::encode(480, &chunk).unwrap();
        let b = Frame::encode(480, &chunk).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_corrupted_body_fails_verify() {
        let frame = Frame::encode(240, &[1, 2, 3, 4]).unwrap();
        let mut bytes = frame.as_bytes().to_vec();
        bytes[6] ^= 0x40;
        assert_ne!(checksum(&bytes[1..bytes.len() - 1]), frame.checksum());
    }

    #[test]
    fn test_split_784_bytes() {
        let payload: Vec<u8> = (0..784u32).map(|i| (i % 251) as u8).collect();
        let frames = split(&payload).unwrap();

        let offsets: Vec<u16> = frames.iter().map(Frame::offset).collect();
        let lengths: Vec<usize> = frames.iter().map(|f| f.payload().len()).collect();
        assert_eq!(frames.len(), 4);
        assert_eq!(offsets, vec![0, 240, 480, 720]);
        assert_eq!(lengths, vec![240, 240, 240, 64]);
    }

    #[test]
    fn test_split_reassembles_payload() {
        for len in [0usize, 1, 239, 240, 241, 784, 4096, MAX_TOTAL] {
            let payload: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
            let frames = split(&payload).unwrap();

            assert_eq!(frames.len(), frame_count(len), "len {len}");
            let mut expected_offset = 0usize;
            let mut rebuilt = Vec::with_capacity(len);
            for frame in &frames {
                assert_eq!(usize::from(frame.offset()), expected_offset);
                assert!(frame.verify());
                expected_offset += frame.payload().len();
                rebuilt.extend_from_slice(frame.payload());
            }
            assert_eq!(rebuilt, payload, "len {len}");
        }
    }

    #[test]
    fn test_split_rejects_payload_over_offset_range() {
        let payload = vec![0u8; MAX_TOTAL + 1];
        assert!(matches!(
            split(&payload),
            Err(Error::PayloadTooLarge { max: MAX_TOTAL, .. })
        ));
    }

    #[test]
    fn test_frame_count() {
        assert_eq!(frame_count(0), 0);
        assert_eq!(frame_count(1), 1);
        assert_eq!(frame_count(240), 1);
        assert_eq!(frame_count(241), 2);
        assert_eq!(frame_count(784), 4);
        assert_eq!(frame_count(MAX_TOTAL), 274);
    }
}
