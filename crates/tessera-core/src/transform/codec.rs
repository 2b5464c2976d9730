use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use byteorder::{BigEndian, ByteOrder};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::consts::RAW_BLOCK_MARKER;
use crate::error::{Result, TesseraError};

/// Format a double the way the persisted coefficient strings expect it:
/// shortest round-trip digits, plain notation in `[1e-3, 1e7)`, scientific
/// `E` notation outside it, and always at least one fractional digit.
pub fn format_decimal(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    if (1e-3..1e7).contains(&v.abs()) {
        let s = format!("{}", v);
        if s.contains('.') {
            s
        } else {
            s + ".0"
        }
    } else {
        let s = format!("{:e}", v);
        match s.split_once('e') {
            Some((mantissa, exponent)) if mantissa.contains('.') => {
                format!("{mantissa}E{exponent}")
            }
            Some((mantissa, exponent)) => format!("{mantissa}.0E{exponent}"),
            None => s,
        }
    }
}

/// Parse one decimal token of a coefficient string.
pub fn parse_decimal(token: &str, variant: &'static str) -> Result<f64> {
    token
        .parse::<f64>()
        .map_err(|_| TesseraError::format(variant, format!("'{token}' is not a number")))
}

/// Parse one unsigned integer token of a coefficient string.
pub fn parse_count(token: &str, variant: &'static str) -> Result<usize> {
    token
        .parse::<usize>()
        .map_err(|_| TesseraError::format(variant, format!("'{token}' is not a count")))
}

pub fn join_decimals(values: &[f64]) -> String {
    values
        .iter()
        .map(|&v| format_decimal(v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pack doubles as big-endian bytes, deflate them, and base64 the result.
/// When deflating does not shrink the block the raw bytes are emitted behind
/// a leading `@`.
pub fn encode_doubles(values: &[f64]) -> String {
    let mut raw = vec![0u8; values.len() * 8];
    BigEndian::write_f64_into(values, &mut raw);

    match deflate(&raw) {
        Ok(zipped) if zipped.len() < raw.len() => STANDARD.encode(zipped),
        _ => format!("{RAW_BLOCK_MARKER}{}", STANDARD.encode(&raw)),
    }
}

/// Inverse of [`encode_doubles`]; `expected` is the number of doubles the
/// block must hold.
pub fn decode_doubles(block: &str, expected: usize, variant: &'static str) -> Result<Vec<f64>> {
    let bytes = match block.strip_prefix(RAW_BLOCK_MARKER) {
        Some(raw) => STANDARD
            .decode(raw)
            .map_err(|e| TesseraError::format(variant, format!("bad base64 block: {e}")))?,
        None => {
            let zipped = STANDARD
                .decode(block)
                .map_err(|e| TesseraError::format(variant, format!("bad base64 block: {e}")))?;
            let mut bytes = Vec::with_capacity(expected * 8);
            ZlibDecoder::new(zipped.as_slice())
                .read_to_end(&mut bytes)
                .map_err(|e| TesseraError::format(variant, format!("bad deflate block: {e}")))?;
            bytes
        }
    };

    if bytes.len() != expected * 8 {
        return Err(TesseraError::format(
            variant,
            format!(
                "block holds {} bytes, expected {} doubles",
                bytes.len(),
                expected
            ),
        ));
    }
    let mut values = vec![0.0f64; expected];
    BigEndian::read_f64_into(&bytes, &mut values);
    Ok(values)
}

fn deflate(raw: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len()), Compression::default());
    encoder.write_all(raw)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_decimal_plain_range() {
        assert_eq!(format_decimal(1.0), "1.0");
        assert_eq!(format_decimal(-2.5), "-2.5");
        assert_eq!(format_decimal(0.001), "0.001");
        assert_eq!(format_decimal(1234567.0), "1234567.0");
    }

    #[test]
    fn test_format_decimal_scientific_range() {
        assert_eq!(format_decimal(1e7), "1.0E7");
        assert_eq!(format_decimal(1.5e-5), "1.5E-5");
        assert_eq!(format_decimal(-2.25e10), "-2.25E10");
    }

    #[test]
    fn test_format_decimal_specials() {
        assert_eq!(format_decimal(0.0), "0.0");
        assert_eq!(format_decimal(-0.0), "-0.0");
        assert_eq!(format_decimal(f64::NAN), "NaN");
        assert_eq!(format_decimal(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_format_decimal_parses_back_exactly() {
        for v in [0.1, 1.0 / 3.0, 6.02214076e23, -1e-300, 123.456e-9] {
            let s = format_decimal(v);
            assert_eq!(s.parse::<f64>().unwrap().to_bits(), v.to_bits(), "{s}");
        }
    }

    #[test]
    fn test_compressible_block_is_deflated() {
        let values = vec![0.0; 64];
        let block = encode_doubles(&values);
        assert!(!block.starts_with(RAW_BLOCK_MARKER));
        assert_eq!(decode_doubles(&block, 64, "test").unwrap(), values);
    }

    #[test]
    fn test_incompressible_block_is_raw() {
        let block = encode_doubles(&[std::f64::consts::PI]);
        assert!(block.starts_with(RAW_BLOCK_MARKER));
        let values = decode_doubles(&block, 1, "test").unwrap();
        assert_eq!(values[0].to_bits(), std::f64::consts::PI.to_bits());
    }

    #[test]
    fn test_block_length_mismatch_is_format_error() {
        let block = encode_doubles(&[1.0, 2.0]);
        assert!(matches!(
            decode_doubles(&block, 3, "test"),
            Err(TesseraError::Format { .. })
        ));
    }
}
