//! Decoders for the compact site, drive and version encodings.

use super::FileNameError;

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn letter_value(b: u8) -> i32 {
    b as i32 - b'A' as i32
}

fn digit_value(b: u8) -> i32 {
    b as i32 - b'0' as i32
}

fn digits_value(field: &'static str, s: &str) -> Result<i32, FileNameError> {
    s.parse::<i32>().map_err(|_| FileNameError::ParseFail {
        field,
        value: s.to_string(),
    })
}

fn parse_fail(field: &'static str, s: &str) -> FileNameError {
    FileNameError::ParseFail {
        field,
        value: s.to_string(),
    }
}

/// Decode a 2-character version: `NN`, `AN` (100+) or `AA` (110+).
pub fn decode_version(s: &str) -> Result<i32, FileNameError> {
    const FIELD: &str = "version";
    let b = s.as_bytes();
    if b.len() != 2 {
        return Err(parse_fail(FIELD, s));
    }
    if is_digits(s) {
        return digits_value(FIELD, s);
    }
    match (b[0].is_ascii_alphabetic(), b[1].is_ascii_alphabetic(), b[1].is_ascii_digit()) {
        (true, _, true) => Ok(100 + letter_value(b[0]) * 36 + digit_value(b[1])),
        (true, true, _) => Ok(110 + letter_value(b[0]) * 36 + letter_value(b[1])),
        _ => Err(parse_fail(FIELD, s)),
    }
}

/// Decode a 3-character site code.
pub fn decode_site_id(s: &str) -> Result<i32, FileNameError> {
    const FIELD: &str = "site";
    let b = s.as_bytes();
    if b.len() != 3 {
        return Err(parse_fail(FIELD, s));
    }
    if is_digits(s) {
        return digits_value(FIELD, s);
    }

    let alpha = |i: usize| b[i].is_ascii_alphabetic();
    let digit = |i: usize| b[i].is_ascii_digit();

    if alpha(0) && digit(1) && digit(2) {
        return Ok(1000 + letter_value(b[0]) * 100 + digits_value(FIELD, &s[1..3])?);
    }
    if alpha(0) && alpha(1) && digit(2) {
        return Ok(3600 + letter_value(b[0]) * 260 + letter_value(b[1]) * 10 + digit_value(b[2]));
    }
    if alpha(0) && alpha(1) && alpha(2) {
        return Ok(10360 + letter_value(b[0]) * 676 + letter_value(b[1]) * 26 + letter_value(b[2]));
    }
    if digit(0) && alpha(1) && alpha(2) {
        let value =
            27936 + digit_value(b[0]) * 676 + letter_value(b[1]) * 26 + letter_value(b[2]);
        if value >= 32768 {
            return Err(FileNameError::RangeFail {
                field: FIELD,
                value: s.to_string(),
            });
        }
        return Ok(value);
    }

    Err(parse_fail(FIELD, s))
}

/// Decode a 4-character drive code.
pub fn decode_drive_id(s: &str) -> Result<i32, FileNameError> {
    const FIELD: &str = "drive";
    let b = s.as_bytes();
    if b.len() != 4 {
        return Err(parse_fail(FIELD, s));
    }
    if is_digits(s) {
        return digits_value(FIELD, s);
    }

    if b[0].is_ascii_alphabetic() && is_digits(&s[1..4]) {
        return Ok(10000 + letter_value(b[0]) * 1000 + digits_value(FIELD, &s[1..4])?);
    }
    if b[0].is_ascii_alphabetic() && b[1].is_ascii_alphabetic() && is_digits(&s[2..4]) {
        let value = 36000
            + letter_value(b[0]) * 2600
            + letter_value(b[1]) * 100
            + digits_value(FIELD, &s[2..4])?;
        if value >= 65536 {
            return Err(FileNameError::RangeFail {
                field: FIELD,
                value: s.to_string(),
            });
        }
        return Ok(value);
    }

    Err(parse_fail(FIELD, s))
}
