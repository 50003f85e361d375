//! Decoding and encoding between raw 16-bit PLC words and typed tag values.

use crate::config::DataType;
use serde::Serialize;

/// A decoded tag value, ready for a sink. `None` inside a variant never
/// occurs; a missing read is represented at the `Sample` level instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Real32(f32),
    Text(String),
}

impl Value {
    /// Render this value the way the CSV sink writes it: booleans as
    /// `True`/`False`, floats with at least 6 significant digits.
    #[must_use]
    pub fn to_csv_field(&self) -> String {
        match self {
            Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Value::Int16(v) => v.to_string(),
            Value::Uint16(v) => v.to_string(),
            Value::Int32(v) => v.to_string(),
            Value::Uint32(v) => v.to_string(),
            Value::Real32(v) => format_real(*v),
            Value::Text(s) => s.clone(),
        }
    }
}

/// At least 6 significant digits in plain decimal notation, regardless of
/// magnitude: `0.001234` needs more decimal places than `123.456` does to
/// reach 6 significant figures.
fn format_real(v: f32) -> String {
    if v == 0.0 {
        return format!("{v:.6}");
    }
    let magnitude = v.abs().log10().floor() as i32;
    let decimals = (5 - magnitude).max(0) as usize;
    format!("{v:.decimals$}")
}

/// Decode the words returned for one tag into a typed `Value`.
///
/// `words` must have exactly `data_type.word_width()` entries; callers
/// (the acquisition loop) guarantee this after a successful read.
#[must_use]
pub fn decode(data_type: DataType, words: &[u16]) -> Value {
    match data_type {
        DataType::Bool => Value::Bool(decode_bool(words[0])),
        DataType::Channel => Value::Uint16(words[0]),
        DataType::Int16 => Value::Int16(words[0] as i16),
        DataType::Uint16 => Value::Uint16(words[0]),
        DataType::Int32 => Value::Int32(decode_u32(words[0], words[1]) as i32),
        DataType::Uint32 => Value::Uint32(decode_u32(words[0], words[1])),
        DataType::Real32 => Value::Real32(f32::from_bits(decode_u32(words[0], words[1]))),
        DataType::String { n } => Value::Text(decode_string(words, n)),
    }
}

/// BOOL decodes true only when the word is exactly `1`; any other nonzero
/// word is malformed on the wire and is coerced to `false`. This function
/// only coerces — the acquisition loop is responsible for warning on the
/// malformed case, since it owns the per-PLC log.
#[must_use]
pub fn decode_bool(word: u16) -> bool {
    word == 1
}

fn decode_u32(low: u16, high: u16) -> u32 {
    (u32::from(high) << 16) | u32::from(low)
}

fn decode_string(words: &[u16], n: u16) -> String {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for w in words {
        bytes.push((w & 0x00ff) as u8);
        bytes.push((w >> 8) as u8);
    }
    bytes.truncate(n as usize);
    if let Some(end) = bytes.iter().position(|&b| b == 0) {
        bytes.truncate(end);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_decodes_only_from_exactly_one() {
        assert!(decode_bool(1));
        assert!(!decode_bool(0));
        assert!(!decode_bool(2));
        assert!(!decode_bool(0xffff));
    }

    #[test]
    fn int32_round_trips_word_order() {
        let v = decode(DataType::Int32, &[0x0002, 0x0000]);
        assert_eq!(v, Value::Int32(2));
    }

    #[test]
    fn real32_decodes_ieee_bits() {
        let bits = 1.5f32.to_bits();
        let low = (bits & 0xffff) as u16;
        let high = (bits >> 16) as u16;
        let v = decode(DataType::Real32, &[low, high]);
        assert_eq!(v, Value::Real32(1.5));
    }

    #[test]
    fn string_trims_at_first_null() {
        // "AB\0\0" packed little-endian per word: word0 = 'B'<<8 | 'A', word1 = 0
        let word0 = (u16::from(b'B') << 8) | u16::from(b'A');
        let v = decode(DataType::String { n: 4 }, &[word0, 0x0000]);
        assert_eq!(v, Value::Text("AB".to_string()));
    }

    #[test]
    fn csv_field_rendering() {
        assert_eq!(Value::Bool(true).to_csv_field(), "True");
        assert_eq!(Value::Bool(false).to_csv_field(), "False");
        assert_eq!(Value::Real32(1.0).to_csv_field(), "1.00000");
    }

    #[test]
    fn csv_field_rendering_keeps_six_significant_digits_below_one() {
        // 0.001234 needs 8 decimal places to reach 6 significant figures.
        let field = Value::Real32(0.001234).to_csv_field();
        let decimals = field.split('.').nth(1).unwrap();
        assert_eq!(decimals.len(), 8);
        assert!((field.parse::<f32>().unwrap() - 0.001234).abs() < 1e-6);
    }
}
