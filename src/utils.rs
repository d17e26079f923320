//! Key formatting helpers.
//!
//! Keys are bit vectors where index 0 is the least significant bit. Their
//! hexadecimal form is the usual big-endian number, zero-padded to one digit
//! per started nibble: `[true, false, false, false, true]` is `"11"`.

use num_bigint::BigUint;

use crate::error::AttackError;

/// Formats a key as a hexadecimal string.
pub fn key_to_hex(key: &[bool]) -> String {
    if key.is_empty() {
        return String::new();
    }
    let mut value = BigUint::default();
    for (i, &b) in key.iter().enumerate() {
        if b {
            value.set_bit(i as u64, true);
        }
    }
    let digits = key.len().div_ceil(4);
    format!("{:0>width$}", value.to_str_radix(16), width = digits)
}

/// Parses a hexadecimal string into a key of `4 * s.len()` bits.
pub fn parse_hex_key(s: &str) -> Result<Vec<bool>, AttackError> {
    if let Some(c) = s.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(AttackError::Hex(c));
    }
    if s.is_empty() {
        return Ok(Vec::new());
    }
    let value = BigUint::parse_bytes(s.as_bytes(), 16).ok_or(AttackError::Hex(' '))?;
    Ok((0..4 * s.len() as u64).map(|i| value.bit(i)).collect())
}

/// Number of keys of the given width, for reporting.
pub fn key_space(nb_key_bits: usize) -> BigUint {
    BigUint::from(1u32) << nb_key_bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_to_hex() {
        assert_eq!(key_to_hex(&[]), "");
        assert_eq!(key_to_hex(&[true]), "1");
        assert_eq!(key_to_hex(&[false, true, false, true]), "a");
        assert_eq!(key_to_hex(&[true, false, false, false, true]), "11");
        assert_eq!(key_to_hex(&[false; 9]), "000");
    }

    #[test]
    fn test_parse_hex_key() {
        assert_eq!(parse_hex_key("").unwrap(), Vec::<bool>::new());
        assert_eq!(parse_hex_key("a").unwrap(), vec![false, true, false, true]);
        assert_eq!(
            parse_hex_key("1F").unwrap(),
            vec![true, true, true, true, true, false, false, false]
        );
        assert_eq!(parse_hex_key("00").unwrap(), vec![false; 8]);
        assert_eq!(parse_hex_key("1x"), Err(AttackError::Hex('x')));
    }

    #[test]
    fn test_hex_round_trip() {
        let key = vec![true, false, true, true, false, false, true, false, true, true, true, false];
        assert_eq!(parse_hex_key(&key_to_hex(&key)).unwrap(), key);
    }

    #[test]
    fn test_key_space() {
        assert_eq!(key_space(0), BigUint::from(1u32));
        assert_eq!(key_space(10), BigUint::from(1024u32));
        assert_eq!(key_space(80).bits(), 81);
    }
}
