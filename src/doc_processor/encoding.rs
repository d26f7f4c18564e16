use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};
use std::borrow::Cow;

/// Decode a text file of unknown encoding into UTF-8.
///
/// A byte order mark wins; BOM-less UTF-16 is recognised by its zero-byte
/// lane; everything else goes through statistical detection. When the
/// detected encoding cannot decode the bytes cleanly the input must be valid
/// UTF-8, otherwise the whole file is rejected.
pub fn decode_text(bytes: &[u8]) -> Result<String, String> {
    if bytes.is_empty() {
        return Ok(String::new());
    }

    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        return decode_strict(encoding, &bytes[bom_len..])
            .ok_or_else(|| format!("invalid {} data after byte order mark", encoding.name()));
    }

    if let Some(encoding) = utf16_without_bom(bytes) {
        if let Some(text) = decode_strict(encoding, bytes) {
            return Ok(text);
        }
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let guess = detector.guess(None, true);
    tracing::debug!(encoding = guess.name(), "detected text encoding");

    decode_guessed(guess, bytes)
}

fn decode_guessed(guess: &'static Encoding, bytes: &[u8]) -> Result<String, String> {
    if let Some(text) = decode_strict(guess, bytes) {
        return Ok(text);
    }

    tracing::warn!(
        encoding = guess.name(),
        "detected encoding does not fit, falling back to UTF-8"
    );
    String::from_utf8(bytes.to_vec()).map_err(|e| format!("not valid UTF-8 text: {e}"))
}

fn decode_strict(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(Cow::into_owned)
}

/// Mostly-ASCII UTF-16 has a zero byte in every code unit, always in the
/// same lane: odd offsets for little endian, even offsets for big endian.
fn utf16_without_bom(bytes: &[u8]) -> Option<&'static Encoding> {
    if bytes.len() < 2 || bytes.len() % 2 != 0 {
        return None;
    }

    let units = bytes.len() / 2;
    let even_zeros = bytes.iter().step_by(2).filter(|&&b| b == 0).count();
    let odd_zeros = bytes.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();

    let dominant = |zeros: usize| zeros * 10 >= units * 3;
    let sparse = |zeros: usize| zeros * 20 <= units;

    if dominant(odd_zeros) && sparse(even_zeros) {
        Some(UTF_16LE)
    } else if dominant(even_zeros) && sparse(odd_zeros) {
        Some(UTF_16BE)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{SHIFT_JIS, WINDOWS_1252};

    const FRENCH: &str = "Le café était très bon, et la crème brûlée aussi. \
        Où est la bibliothèque? Ça va très bien, merci. Noël à la plage.";

    fn utf16(text: &str, little_endian: bool) -> Vec<u8> {
        text.encode_utf16()
            .flat_map(|unit| {
                if little_endian {
                    unit.to_le_bytes()
                } else {
                    unit.to_be_bytes()
                }
            })
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(decode_text(b"").unwrap(), "");
    }

    #[test]
    fn test_utf8_with_and_without_bom() {
        let text = "naïve – 日本語 – emoji 🦀";
        assert_eq!(decode_text(text.as_bytes()).unwrap(), text);

        let mut with_bom = vec![0xEF, 0xBB, 0xBF];
        with_bom.extend_from_slice(text.as_bytes());
        assert_eq!(decode_text(&with_bom).unwrap(), text);
    }

    #[test]
    fn test_utf16_with_bom() {
        let mut le = vec![0xFF, 0xFE];
        le.extend(utf16(FRENCH, true));
        assert_eq!(decode_text(&le).unwrap(), FRENCH);

        let mut be = vec![0xFE, 0xFF];
        be.extend(utf16(FRENCH, false));
        assert_eq!(decode_text(&be).unwrap(), FRENCH);
    }

    #[test]
    fn test_utf16_without_bom() {
        assert_eq!(decode_text(&utf16(FRENCH, true)).unwrap(), FRENCH);
        assert_eq!(decode_text(&utf16(FRENCH, false)).unwrap(), FRENCH);
    }

    #[test]
    fn test_latin1() {
        let (bytes, _, had_errors) = WINDOWS_1252.encode(FRENCH);
        assert!(!had_errors);
        assert!(std::str::from_utf8(&bytes).is_err());
        assert_eq!(decode_text(&bytes).unwrap(), FRENCH);
    }

    #[test]
    fn test_fallback_to_utf8_when_guess_fails() {
        // Odd length can never be clean UTF-16.
        assert_eq!(decode_guessed(UTF_16LE, b"abc").unwrap(), "abc");
    }

    #[test]
    fn test_fallback_failure_is_error() {
        let err = decode_guessed(SHIFT_JIS, &[0x81, 0x20, 0xFF]).unwrap_err();
        assert!(err.contains("UTF-8"), "{err}");
    }

    #[test]
    fn test_invalid_data_after_bom() {
        let err = decode_text(&[0xEF, 0xBB, 0xBF, 0xFF, 0xFE, 0x00]).unwrap_err();
        assert!(err.contains("byte order mark"), "{err}");
    }
}
