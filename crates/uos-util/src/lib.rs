pub mod result_ext;

/// Strip a leading `0x`, if there is one
pub fn strip_hex_prefix(hex: &str) -> &str {
    hex.strip_prefix("0x").unwrap_or(hex)
}

/// `0x` prefixed, non empty, even length hex
pub fn is_hex(value: &str) -> bool {
    let Some(digits) = value.strip_prefix("0x") else {
        return false;
    };

    !digits.is_empty()
        && digits.len() % 2 == 0
        && digits.bytes().all(|byte| byte.is_ascii_hexdigit())
}

/// Decode hex with or without the `0x` prefix
pub fn decode_hex(hex: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(strip_hex_prefix(hex))
}
