//! Integration tests for the wscast-core public API.
//!
//! A browser masks every frame it sends.  These tests build such frames from
//! the server encoder plus a mask key and check that the decoder recovers the
//! original payload across every length encoding.

use wscast_core::protocol::frame::{decode, decode_frame, encode, mask_frame, LengthForm};
use wscast_core::protocol::handshake::{respond, HandshakeError};

const MASK_KEYS: [[u8; 4]; 4] = [
    [0x00, 0x00, 0x00, 0x00],
    [0xFF, 0xFF, 0xFF, 0xFF],
    [0x37, 0xFA, 0x21, 0x3D],
    [0x01, 0x80, 0x7F, 0xFE],
];

fn payload_of_len(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

#[test]
fn test_roundtrip_every_boundary_length_and_mask_key() {
    for len in [0usize, 1, 125, 126, 65535, 65536] {
        let payload = payload_of_len(len);
        for key in MASK_KEYS {
            let client_frame = mask_frame(&encode(&payload).expect("encode"), key);
            assert_eq!(
                decode(&client_frame).expect("decode"),
                payload,
                "len {len}, key {key:?}"
            );
        }
    }
}

#[test]
fn test_boundary_lengths_select_expected_header_form() {
    let cases = [
        (125usize, LengthForm::Short, 125u8),
        (126, LengthForm::Extended16, 126),
        (65535, LengthForm::Extended16, 126),
        (65536, LengthForm::Extended64, 127),
    ];

    for (len, form, len7) in cases {
        let frame = encode(&payload_of_len(len)).expect("encode");
        assert_eq!(LengthForm::for_len(len), form);
        assert_eq!(frame[0], 0x81);
        assert_eq!(frame[1], len7, "len {len}");
        assert_eq!(frame.len(), form.header_len() + len);
    }
}

#[test]
fn test_utf8_text_survives_roundtrip() {
    let text = "héllo, wörld ✓";
    let client_frame = mask_frame(&encode(text.as_bytes()).unwrap(), [4, 3, 2, 1]);
    let decoded = decode_frame(&client_frame).unwrap();
    assert_eq!(String::from_utf8(decoded.payload).unwrap(), text);
}

#[test]
fn test_handshake_missing_key_is_reported() {
    let request = "GET / HTTP/1.1\r\nHost: localhost:8888\r\nUpgrade: websocket\r\n\r\n";
    assert_eq!(respond(request), Err(HandshakeError::MissingKey));
}
