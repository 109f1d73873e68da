// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Helper functions shared by packet implementations.

use rand::Rng;

use crate::DecodeError;

/// Maximum byte length of an MQTT UTF-8 encoded string.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Total byte length of the first packet in `buf`, or `None` when more
/// bytes are needed to tell.
///
/// Used by stream readers to cut complete packets out of a receive
/// buffer without decoding them.
///
/// # Errors
///
/// Returns error on a malformed remaining-length field.
pub fn peek_packet_length(buf: &[u8]) -> Result<Option<usize>, DecodeError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let mut remaining: usize = 0;
    let mut multiplier: usize = 1;
    for index in 0..4 {
        let Some(&byte) = buf.get(1 + index) else {
            return Ok(None);
        };
        remaining += usize::from(byte & 0x7f) * multiplier;
        multiplier *= 128;
        if byte & 0x80 == 0 {
            return Ok(Some(1 + index + 1 + remaining));
        }
    }
    Err(DecodeError::InvalidVarInt)
}

/// Check that `s` is a well formed MQTT UTF-8 string.
///
/// The character data in a UTF-8 encoded string MUST be well-formed UTF-8
/// as defined by the Unicode specification and MUST NOT include encodings of
/// code points between U+D800 and U+DFFF [MQTT-1.5.3-1]. A UTF-8 encoded
/// string MUST NOT include an encoding of the null character U+0000
/// [MQTT-1.5.3-2].
#[must_use]
pub fn is_valid_string(s: &str) -> bool {
    s.len() <= MAX_STRING_LEN && !s.chars().any(|c| c == '\u{0}')
}

/// Convert raw bytes into a validated MQTT string.
///
/// # Errors
///
/// Returns `None` if bytes are not valid UTF-8 or contain U+0000.
#[must_use]
pub fn to_utf8_string(bytes: &[u8]) -> Option<String> {
    let s = std::str::from_utf8(bytes).ok()?;
    if is_valid_string(s) {
        Some(s.to_string())
    } else {
        None
    }
}

/// Check client id contents.
///
/// The Server MUST allow ClientIds which are between 1 and 23 UTF-8 encoded
/// bytes in length, and that contain only the characters
/// "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ"
/// [MQTT-3.1.3-5]. Longer ids are accepted as a server specific extension,
/// up to 128 bytes. Ids starting with `$` are reserved for server internal
/// pseudo-sessions and refused on the wire.
#[must_use]
pub fn is_valid_client_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('$')
        && id.chars().all(|c| !c.is_control())
}

/// Generate a random client id on behalf of a client which connected with
/// a zero length id.
#[must_use]
pub fn random_client_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..12)
        .map(|_| {
            let n: u8 = rng.gen_range(0..36);
            if n < 10 {
                (b'0' + n) as char
            } else {
                (b'a' + n - 10) as char
            }
        })
        .collect();
    format!("taranis-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_string() {
        assert!(is_valid_string("home/kitchen"));
        assert!(!is_valid_string("nul\u{0}char"));
    }

    #[test]
    fn test_random_client_id() {
        let id = random_client_id();
        assert!(is_valid_client_id(&id));
        assert_ne!(id, random_client_id());
    }

    #[test]
    fn test_peek_packet_length() {
        // PINGREQ, complete.
        assert_eq!(peek_packet_length(&[0xc0, 0x00]).unwrap(), Some(2));
        // PUBLISH header claiming 5 body bytes.
        assert_eq!(peek_packet_length(&[0x30, 0x05, 0x00]).unwrap(), Some(7));
        // Incomplete header.
        assert_eq!(peek_packet_length(&[0x30]).unwrap(), None);
        // Unterminated varint.
        assert!(peek_packet_length(&[0x30, 0x80, 0x80, 0x80, 0x80, 0x01]).is_err());
    }
}
