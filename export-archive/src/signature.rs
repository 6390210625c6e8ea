//! Signature entry encoding (base64url, no padding)

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

pub fn encode(sig: &[u8]) -> Vec<u8> {
    URL_SAFE_NO_PAD.encode(sig).into_bytes()
}

pub fn decode(entry: &[u8]) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(entry.trim_ascii()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_has_no_padding_or_std_chars() {
        let encoded = encode(&[0xfb, 0xff, 0xfe, 0x01]);
        let text = std::str::from_utf8(&encoded).unwrap();
        assert_eq!(text, "-__-AQ");
        assert_eq!(decode(&encoded).unwrap(), vec![0xfb, 0xff, 0xfe, 0x01]);
    }

    #[test]
    fn test_decode_rejects_standard_alphabet() {
        assert!(decode(b"+//+AQ==").is_none());
    }
}
