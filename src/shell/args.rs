// Argument helpers shared by command handlers.
use crate::core::error::{Error, ErrorKind};

pub fn is_decimal(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

pub fn is_hex(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Returns the text after `prefix` when `token` starts with it, ignoring case.
pub fn option_value<'a>(token: &'a str, prefix: &str) -> Option<&'a str> {
    let head = token.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &token[prefix.len()..])
}

pub fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidArgument).with_message(message)
}

pub fn parse_decimal_u32(token: &str, what: &str) -> Result<u32, Error> {
    if !is_decimal(token) {
        return Err(invalid(format!("Invalid argument: {what} must be numeric.")));
    }
    token
        .parse()
        .map_err(|_| invalid(format!("Invalid {what}.")))
}

pub fn parse_decimal_u64(token: &str, what: &str) -> Result<u64, Error> {
    if !is_decimal(token) {
        return Err(invalid(format!("Invalid argument: {what} must be numeric.")));
    }
    token
        .parse()
        .map_err(|_| invalid(format!("Invalid {what}.")))
}

/// Parses a 1-2 digit hexadecimal partition type (`id=` value).
pub fn parse_type_code(value: &str) -> Result<u8, Error> {
    if value.is_empty() {
        return Err(invalid("Invalid argument: id= value missing."));
    }
    if value.len() > 2 {
        return Err(invalid("Invalid format: id= must be 1 or 2 hex digits."));
    }
    if !is_hex(value) {
        return Err(invalid("Invalid format: id= must be hex digits."));
    }
    u8::from_str_radix(value, 16).map_err(|_| invalid("Invalid format: id= must be hex digits."))
}

/// Parses an 8 hex digit disk signature.
pub fn parse_signature(value: &str) -> Result<u32, Error> {
    if value.len() != 8 || !is_hex(value) {
        return Err(invalid("Invalid arguments.").with_hint("The disk ID must be 8 hex digits."));
    }
    u32::from_str_radix(value, 16).map_err(|_| invalid("Invalid arguments."))
}

pub fn rounding_divide(value: u64, divisor: u64) -> u64 {
    (value + divisor / 2) / divisor
}

#[cfg(test)]
mod tests {
    use super::{
        is_decimal, option_value, parse_signature, parse_type_code, rounding_divide,
    };
    use crate::core::error::ErrorKind;

    #[test]
    fn option_prefix_is_case_insensitive() {
        assert_eq!(option_value("ID=07", "id="), Some("07"));
        assert_eq!(option_value("size=100", "id="), None);
        assert_eq!(option_value("i", "id="), None);
    }

    #[test]
    fn type_codes_accept_one_or_two_hex_digits() {
        assert_eq!(parse_type_code("7").expect("7"), 0x07);
        assert_eq!(parse_type_code("Af").expect("af"), 0xAF);
        for bad in ["", "123", "zz", "-1"] {
            let err = parse_type_code(bad).expect_err("bad");
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn signatures_need_eight_hex_digits() {
        assert_eq!(parse_signature("DEADbeef").expect("sig"), 0xDEAD_BEEF);
        assert!(parse_signature("1234").is_err());
        assert!(parse_signature("1234567g").is_err());
    }

    #[test]
    fn decimal_and_rounding_helpers() {
        assert!(is_decimal("0042"));
        assert!(!is_decimal("4a"));
        assert!(!is_decimal(""));
        assert_eq!(rounding_divide(1536, 1024), 2);
        assert_eq!(rounding_divide(1535, 1024), 1);
    }
}
