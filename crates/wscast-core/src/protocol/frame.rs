//! WebSocket frame codec (RFC 6455 §5.2).
//!
//! Wire format of a client → server frame:
//! ```text
//! [fin|rsv|opcode:1][mask|len7:1][ext_len:0|2|8][mask_key:4][payload:N]
//! ```
//! Server → client frames carry no mask key and the mask bit is clear.
//! All multi-byte integers are big-endian.
//!
//! The server always emits single, unfragmented text frames (`0x81`).  The
//! 64-bit extended length form is written with its high word fixed to zero,
//! so [`encode`] only accepts payloads whose length fits in 32 bits.

use thiserror::Error;

/// First header byte of every frame produced by the server: FIN=1, opcode=text.
pub const FIN_TEXT: u8 = 0x81;

/// Length of the client mask key in bytes.
pub const MASK_KEY_LEN: usize = 4;

/// `len7` value announcing a 16-bit extended payload length.
const LEN_EXT16: u8 = 126;

/// `len7` value announcing a 64-bit extended payload length.
const LEN_EXT64: u8 = 127;

const MASK_BIT: u8 = 0x80;
const LEN7_BITS: u8 = 0x7F;

/// Errors that can occur while encoding or decoding a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer ends before the header, mask key or payload is complete.
    #[error("incomplete frame: need at least {needed} bytes, got {available}")]
    Incomplete { needed: usize, available: usize },

    /// The payload is too long for the 32-bit value carried in the extended
    /// length field.
    #[error("payload of {len} bytes does not fit the 32-bit extended length")]
    PayloadTooLarge { len: usize },

    /// The declared 64-bit payload length cannot be addressed on this platform.
    #[error("declared payload length {0} is not addressable")]
    LengthOverflow(u64),
}

/// Frame opcode (low nibble of the first header byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// Any opcode RFC 6455 reserves for future use.
    Reserved(u8),
}

impl Opcode {
    /// Returns `true` for close, ping and pong.
    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

impl From<u8> for Opcode {
    fn from(nibble: u8) -> Self {
        match nibble & 0x0F {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            other => Opcode::Reserved(other),
        }
    }
}

/// Which of the three RFC 6455 length encodings a payload length selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthForm {
    /// Length 0–125 stored directly in the 7-bit field.
    Short,
    /// Length 126–65535 stored in a 16-bit extended field.
    Extended16,
    /// Length ≥ 65536 stored in the 64-bit extended field.
    Extended64,
}

impl LengthForm {
    /// Selects the encoding the server uses for a payload of `len` bytes.
    pub fn for_len(len: usize) -> Self {
        if len < LEN_EXT16 as usize {
            LengthForm::Short
        } else if len <= u16::MAX as usize {
            LengthForm::Extended16
        } else {
            LengthForm::Extended64
        }
    }

    /// Size of the unmasked header (first two bytes plus extended length).
    pub fn header_len(self) -> usize {
        match self {
            LengthForm::Short => 2,
            LengthForm::Extended16 => 4,
            LengthForm::Extended64 => 10,
        }
    }

    fn from_len7(len7: u8) -> Self {
        match len7 {
            LEN_EXT16 => LengthForm::Extended16,
            LEN_EXT64 => LengthForm::Extended64,
            _ => LengthForm::Short,
        }
    }
}

/// Parsed header of a masked client frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub opcode: Opcode,
    pub mask_key: [u8; MASK_KEY_LEN],
    /// Offset of the first payload byte (header + mask key).
    pub payload_offset: usize,
    /// Declared payload length.
    pub payload_len: usize,
}

impl FrameHeader {
    /// Total frame size on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::LengthOverflow`] if header plus payload does not
    /// fit in `usize`.
    pub fn frame_len(&self) -> Result<usize, FrameError> {
        self.payload_offset
            .checked_add(self.payload_len)
            .ok_or(FrameError::LengthOverflow(self.payload_len as u64))
    }
}

/// One frame decoded from the front of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub fin: bool,
    pub opcode: Opcode,
    /// Unmasked payload bytes.
    pub payload: Vec<u8>,
    /// Bytes consumed from the input, so the caller can advance its cursor.
    pub consumed: usize,
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Parses the header of a client frame without touching the payload.
///
/// Client frames are always assumed to be masked: the mask bit is not
/// checked and the four bytes after the length field are taken as the key.
///
/// # Errors
///
/// Returns [`FrameError::Incomplete`] if `bytes` ends before the mask key,
/// or [`FrameError::LengthOverflow`] if the 64-bit length exceeds what a
/// buffer can hold.
pub fn peek_header(bytes: &[u8]) -> Result<FrameHeader, FrameError> {
    if bytes.len() < 2 {
        return Err(FrameError::Incomplete {
            needed: 2,
            available: bytes.len(),
        });
    }

    let form = LengthForm::from_len7(bytes[1] & LEN7_BITS);
    let key_offset = form.header_len();
    let payload_offset = key_offset + MASK_KEY_LEN;
    if bytes.len() < payload_offset {
        return Err(FrameError::Incomplete {
            needed: payload_offset,
            available: bytes.len(),
        });
    }

    let payload_len = match form {
        LengthForm::Short => (bytes[1] & LEN7_BITS) as usize,
        LengthForm::Extended16 => u16::from_be_bytes([bytes[2], bytes[3]]) as usize,
        LengthForm::Extended64 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[2..10]);
            let declared = u64::from_be_bytes(raw);
            // No buffer can hold more than isize::MAX bytes.
            usize::try_from(declared)
                .ok()
                .filter(|len| *len <= isize::MAX as usize)
                .ok_or(FrameError::LengthOverflow(declared))?
        }
    };

    let mut mask_key = [0u8; MASK_KEY_LEN];
    mask_key.copy_from_slice(&bytes[key_offset..payload_offset]);

    Ok(FrameHeader {
        fin: bytes[0] & 0x80 != 0,
        opcode: Opcode::from(bytes[0]),
        mask_key,
        payload_offset,
        payload_len,
    })
}

/// Decodes one masked client frame from the beginning of `bytes`.
///
/// Trailing bytes beyond the declared payload are left for the next call.
///
/// # Errors
///
/// Returns [`FrameError::Incomplete`] if the header, mask key or payload is
/// not fully present yet.
pub fn decode_frame(bytes: &[u8]) -> Result<DecodedFrame, FrameError> {
    let header = peek_header(bytes)?;
    let end = header.frame_len()?;
    if bytes.len() < end {
        return Err(FrameError::Incomplete {
            needed: end,
            available: bytes.len(),
        });
    }

    let payload = apply_mask(&bytes[header.payload_offset..end], header.mask_key);
    Ok(DecodedFrame {
        fin: header.fin,
        opcode: header.opcode,
        payload,
        consumed: end,
    })
}

/// Decodes a single client frame into its payload.
///
/// Empty input yields an empty payload.
///
/// # Errors
///
/// Returns [`FrameError::Incomplete`] for a non-empty but truncated frame.
///
/// # Examples
///
/// ```rust
/// use wscast_core::protocol::frame::{decode, encode, mask_frame};
///
/// let client_frame = mask_frame(&encode(b"hi").unwrap(), [1, 2, 3, 4]);
/// assert_eq!(decode(&client_frame).unwrap(), b"hi");
/// assert!(decode(&[]).unwrap().is_empty());
/// ```
pub fn decode(raw: &[u8]) -> Result<Vec<u8>, FrameError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    decode_frame(raw).map(|frame| frame.payload)
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encodes `payload` into an unmasked FIN+text server frame.
///
/// An empty payload yields an empty frame (nothing to send).
///
/// # Errors
///
/// Returns [`FrameError::PayloadTooLarge`] if the payload length does not fit
/// in 32 bits; the 64-bit length field is written as `[0u32, len as u32]`.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }
    let header = encode_header(payload.len())?;
    let mut buf = Vec::with_capacity(header.len() + payload.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Writes the server header for a payload of `len` bytes.
fn encode_header(len: usize) -> Result<Vec<u8>, FrameError> {
    let form = LengthForm::for_len(len);
    let mut buf = Vec::with_capacity(form.header_len());
    buf.push(FIN_TEXT);

    match form {
        LengthForm::Short => buf.push(len as u8),
        LengthForm::Extended16 => {
            buf.push(LEN_EXT16);
            buf.extend_from_slice(&(len as u16).to_be_bytes());
        }
        LengthForm::Extended64 => {
            let len32 = u32::try_from(len).map_err(|_| FrameError::PayloadTooLarge { len })?;
            buf.push(LEN_EXT64);
            buf.extend_from_slice(&0u32.to_be_bytes());
            buf.extend_from_slice(&len32.to_be_bytes());
        }
    }
    Ok(buf)
}

/// Turns an unmasked server frame into the equivalent masked client frame.
///
/// Sets the mask bit, inserts `mask_key` after the length field and XORs the
/// payload.  This is what a browser puts on the wire, so it is used to build
/// client traffic in tests and benchmarks.  Empty input stays empty.
pub fn mask_frame(frame: &[u8], mask_key: [u8; MASK_KEY_LEN]) -> Vec<u8> {
    if frame.len() < 2 {
        return frame.to_vec();
    }
    let header_len = LengthForm::from_len7(frame[1] & LEN7_BITS)
        .header_len()
        .min(frame.len());

    let mut out = Vec::with_capacity(frame.len() + MASK_KEY_LEN);
    out.extend_from_slice(&frame[..header_len]);
    out[1] |= MASK_BIT;
    out.extend_from_slice(&mask_key);
    out.extend(apply_mask(&frame[header_len..], mask_key));
    out
}

/// XORs `data` with the repeating 4-byte `mask_key`.
fn apply_mask(data: &[u8], mask_key: [u8; MASK_KEY_LEN]) -> Vec<u8> {
    data.iter()
        .enumerate()
        .map(|(i, byte)| byte ^ mask_key[i % MASK_KEY_LEN])
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 4] = [0x37, 0xFA, 0x21, 0x3D];

    #[test]
    fn test_decode_empty_input_yields_empty_payload() {
        assert_eq!(decode(&[]), Ok(Vec::new()));
    }

    #[test]
    fn test_decode_rfc_masked_hello_sample() {
        // RFC 6455 §5.7: a single-frame masked text message containing "Hello".
        let raw = [
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];

        let frame = decode_frame(&raw).unwrap();

        assert_eq!(frame.payload, b"Hello");
        assert_eq!(frame.opcode, Opcode::Text);
        assert!(frame.fin);
        assert_eq!(frame.consumed, raw.len());
    }

    #[test]
    fn test_encode_rfc_unmasked_hello_sample() {
        assert_eq!(
            encode(b"Hello").unwrap(),
            vec![0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]
        );
    }

    #[test]
    fn test_encode_empty_payload_yields_empty_frame() {
        assert!(encode(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_encode_125_bytes_uses_short_form() {
        let frame = encode(&[b'a'; 125]).unwrap();
        assert_eq!(&frame[..2], &[0x81, 125]);
        assert_eq!(frame.len(), 2 + 125);
    }

    #[test]
    fn test_encode_126_bytes_uses_16_bit_form() {
        let frame = encode(&[b'a'; 126]).unwrap();
        assert_eq!(&frame[..4], &[0x81, 126, 0x00, 0x7E]);
        assert_eq!(frame.len(), 4 + 126);
    }

    #[test]
    fn test_encode_65535_bytes_uses_16_bit_form() {
        let frame = encode(&vec![0u8; 65535]).unwrap();
        assert_eq!(&frame[..4], &[0x81, 126, 0xFF, 0xFF]);
    }

    #[test]
    fn test_encode_65536_bytes_uses_64_bit_form_with_zero_high_word() {
        let frame = encode(&vec![0u8; 65536]).unwrap();
        // High 32 bits are always zero: only 32-bit lengths are representable.
        assert_eq!(
            &frame[..10],
            &[0x81, 127, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00]
        );
        assert_eq!(frame.len(), 10 + 65536);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_encode_rejects_lengths_beyond_32_bits() {
        let len = u32::MAX as usize + 1;
        assert_eq!(encode_header(len), Err(FrameError::PayloadTooLarge { len }));
    }

    #[test]
    fn test_encode_header_at_u32_max_keeps_high_word_zero() {
        assert_eq!(
            encode_header(u32::MAX as usize),
            Ok(vec![0x81, 127, 0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF])
        );
    }

    #[test]
    fn test_encode_never_sets_mask_bit() {
        for len in [1usize, 125, 126, 65536] {
            let frame = encode(&vec![1u8; len]).unwrap();
            assert_eq!(frame[1] & 0x80, 0, "len {len}");
        }
    }

    #[test]
    fn test_length_form_boundaries() {
        assert_eq!(LengthForm::for_len(0), LengthForm::Short);
        assert_eq!(LengthForm::for_len(125), LengthForm::Short);
        assert_eq!(LengthForm::for_len(126), LengthForm::Extended16);
        assert_eq!(LengthForm::for_len(65535), LengthForm::Extended16);
        assert_eq!(LengthForm::for_len(65536), LengthForm::Extended64);
    }

    #[test]
    fn test_roundtrip_through_mask_at_boundary_lengths() {
        for len in [1usize, 125, 126, 65535, 65536] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();

            let client_frame = mask_frame(&encode(&payload).unwrap(), KEY);

            assert_eq!(decode(&client_frame).unwrap(), payload, "len {len}");
        }
    }

    #[test]
    fn test_roundtrip_zero_length_is_empty_both_ways() {
        let client_frame = mask_frame(&encode(&[]).unwrap(), KEY);
        assert_eq!(decode(&client_frame).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_mask_key_is_read_from_bytes_before_payload() {
        // 16-bit form: mask at 4..8, payload at 8.
        let payload = vec![0x55u8; 200];
        let client_frame = mask_frame(&encode(&payload).unwrap(), [9, 8, 7, 6]);
        let header = peek_header(&client_frame).unwrap();

        assert_eq!(header.mask_key, [9, 8, 7, 6]);
        assert_eq!(header.payload_offset, 8);
        assert_eq!(header.payload_len, 200);
    }

    #[test]
    fn test_64_bit_form_offsets() {
        let payload = vec![0xAAu8; 70_000];
        let client_frame = mask_frame(&encode(&payload).unwrap(), KEY);
        let header = peek_header(&client_frame).unwrap();

        assert_eq!(header.payload_offset, 14);
        assert_eq!(header.mask_key, KEY);
        assert_eq!(header.payload_len, 70_000);
    }

    #[test]
    fn test_decode_truncated_header_is_incomplete() {
        assert_eq!(
            decode(&[0x81]),
            Err(FrameError::Incomplete {
                needed: 2,
                available: 1
            })
        );
    }

    #[test]
    fn test_decode_missing_mask_key_is_incomplete() {
        let result = decode_frame(&[0x81, 0x85, 0x01, 0x02]);
        assert_eq!(
            result,
            Err(FrameError::Incomplete {
                needed: 6,
                available: 4
            })
        );
    }

    #[test]
    fn test_decode_partial_payload_is_incomplete() {
        let client_frame = mask_frame(&encode(b"hello world").unwrap(), KEY);
        let result = decode_frame(&client_frame[..client_frame.len() - 3]);
        assert!(matches!(result, Err(FrameError::Incomplete { .. })));
    }

    #[test]
    fn test_decode_frame_leaves_trailing_bytes() {
        let mut buf = mask_frame(&encode(b"one").unwrap(), KEY);
        let first_len = buf.len();
        buf.extend(mask_frame(&encode(b"two").unwrap(), KEY));

        let first = decode_frame(&buf).unwrap();
        let second = decode_frame(&buf[first.consumed..]).unwrap();

        assert_eq!(first.consumed, first_len);
        assert_eq!(first.payload, b"one");
        assert_eq!(second.payload, b"two");
    }

    /// 64-bit length form announcing `declared`, mask key, no payload.
    fn header_with_len64(declared: u64) -> Vec<u8> {
        let mut raw = vec![0x81, 0xFF];
        raw.extend_from_slice(&declared.to_be_bytes());
        raw.extend_from_slice(&[1, 2, 3, 4]);
        raw
    }

    #[test]
    fn test_peek_header_rejects_max_declared_length() {
        let raw = header_with_len64(u64::MAX);

        assert_eq!(peek_header(&raw), Err(FrameError::LengthOverflow(u64::MAX)));
        assert_eq!(decode_frame(&raw), Err(FrameError::LengthOverflow(u64::MAX)));
    }

    #[test]
    fn test_peek_header_rejects_length_above_isize_max() {
        let declared = isize::MAX as u64 + 1;
        let raw = header_with_len64(declared);

        assert_eq!(peek_header(&raw), Err(FrameError::LengthOverflow(declared)));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_non_zero_high_word_is_accepted_and_waits_for_payload() {
        let declared = 1u64 << 32;
        let raw = header_with_len64(declared);

        let header = peek_header(&raw).unwrap();

        assert_eq!(header.payload_len, declared as usize);
        assert_eq!(header.frame_len(), Ok(14 + declared as usize));
        assert!(matches!(
            decode_frame(&raw),
            Err(FrameError::Incomplete { available: 14, .. })
        ));
    }

    #[test]
    fn test_frame_len_overflow_is_an_error() {
        let header = FrameHeader {
            fin: true,
            opcode: Opcode::Text,
            mask_key: KEY,
            payload_offset: 14,
            payload_len: usize::MAX,
        };

        assert_eq!(
            header.frame_len(),
            Err(FrameError::LengthOverflow(usize::MAX as u64))
        );
    }

    #[test]
    fn test_opcode_parsing() {
        assert_eq!(Opcode::from(0x81), Opcode::Text);
        assert_eq!(Opcode::from(0x82), Opcode::Binary);
        assert_eq!(Opcode::from(0x88), Opcode::Close);
        assert_eq!(Opcode::from(0x89), Opcode::Ping);
        assert_eq!(Opcode::from(0x8A), Opcode::Pong);
        assert_eq!(Opcode::from(0x00), Opcode::Continuation);
        assert_eq!(Opcode::from(0x83), Opcode::Reserved(3));
        assert!(Opcode::Close.is_control());
        assert!(!Opcode::Text.is_control());
    }

    #[test]
    fn test_close_frame_opcode_is_reported() {
        let raw = [0x88, 0x80, 0x01, 0x02, 0x03, 0x04];
        let frame = decode_frame(&raw).unwrap();
        assert_eq!(frame.opcode, Opcode::Close);
        assert!(frame.payload.is_empty());
    }
}
