//! Compatibility shim for the API's double-encoded text payloads.
//!
//! The crawler and rendering endpoints return HTML as the body of a JSON-quoted
//! string, so newlines and quotes arrive as literal `\n` / `\"`, and non-ASCII
//! text sometimes arrives as the individual UTF-8 bytes escaped as `\u00XX`.
//! This is an upstream bug, not a general decoding strategy: if the API starts
//! returning clean HTML, [unescape_double_encoded] is the only thing to remove.

use crate::api::error::ApiError;

/// Undo the API's double encoding.
///
/// Stage one resolves backslash escapes over the payload bytes, stage two
/// reads the result as Latin-1 code units and decodes those bytes as UTF-8.
/// Fails with [ApiError::Decode] if an escape is malformed, names a code
/// point above U+00FF, or the final bytes are not valid UTF-8.
pub fn unescape_double_encoded(raw: &str) -> Result<String, ApiError> {
    let bytes = unescape_backslashes(raw.as_bytes())?;
    String::from_utf8(bytes).map_err(|e| ApiError::Decode {
        reason: format!(
            "payload is not valid UTF-8 after unescaping (at byte {})",
            e.utf8_error().valid_up_to()
        ),
    })
}

fn decode_err(reason: impl Into<String>) -> ApiError {
    ApiError::Decode {
        reason: reason.into(),
    }
}

/// Resolve backslash escapes. Non-escape bytes pass through untouched; each
/// escape must yield a code point that fits in one Latin-1 byte.
fn unescape_backslashes(input: &[u8]) -> Result<Vec<u8>, ApiError> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        let Some(&esc) = input.get(i + 1) else {
            return Err(decode_err(format!("lone backslash at end of payload (byte {})", i)));
        };
        i += 2;
        match esc {
            b'\n' => {}
            b'\\' => out.push(b'\\'),
            b'\'' => out.push(b'\''),
            b'"' => out.push(b'"'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            b'0'..=b'7' => {
                let mut value = u32::from(esc - b'0');
                let mut taken = 0;
                while taken < 2 {
                    match input.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            i += 1;
                            taken += 1;
                        }
                        _ => break,
                    }
                }
                out.push(latin1_byte(value, i)?);
            }
            b'x' => {
                let value = read_hex(input, i, 2, "\\xXX")?;
                i += 2;
                out.push(latin1_byte(value, i)?);
            }
            b'u' => {
                let value = read_hex(input, i, 4, "\\uXXXX")?;
                i += 4;
                out.push(latin1_byte(value, i)?);
            }
            b'U' => {
                let value = read_hex(input, i, 8, "\\UXXXXXXXX")?;
                i += 8;
                out.push(latin1_byte(value, i)?);
            }
            b'N' => {
                return Err(decode_err(format!(
                    "named \\N{{...}} escapes are not supported (byte {})",
                    i - 2
                )))
            }
            other => {
                // Unknown escapes are kept as written.
                out.push(b'\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

fn read_hex(input: &[u8], start: usize, len: usize, form: &str) -> Result<u32, ApiError> {
    let digits = input
        .get(start..start + len)
        .ok_or_else(|| decode_err(format!("truncated {} escape at byte {}", form, start)))?;
    let mut value: u32 = 0;
    for &d in digits {
        let nibble = (d as char)
            .to_digit(16)
            .ok_or_else(|| decode_err(format!("invalid {} escape at byte {}", form, start)))?;
        value = value * 16 + nibble;
    }
    Ok(value)
}

fn latin1_byte(value: u32, pos: usize) -> Result<u8, ApiError> {
    u8::try_from(value).map_err(|_| {
        decode_err(format!(
            "escape before byte {} names U+{:04X}, which has no single-byte Latin-1 form",
            pos, value
        ))
    })
}
