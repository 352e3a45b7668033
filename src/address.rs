//! SS58 and Ethereum address handling.
//!
//! Substrate addresses are SS58 strings: base58 over `prefix | public key | checksum`, where
//! the checksum is the first two bytes of `blake2b-512("SS58PRE" | prefix | public key)`.
//! Ethereum addresses are `0x` + 40 hex chars, optionally EIP-55 checksummed.

use blake2::{Blake2b512, Digest as _};
use sha3::Keccak256;
use uos_util::{decode_hex, is_hex};

/// Network prefix used when reformatting addresses that are not tied to a chain
pub const GENERIC_SS58_PREFIX: u16 = 42;

/// Length of a `0x` prefixed Ethereum address string
pub const ETHEREUM_ADDRESS_LEN: usize = 42;

const SS58_CHECKSUM_PREFIX: &[u8] = b"SS58PRE";
const SS58_CHECKSUM_LEN: usize = 2;
const MAX_SS58_PREFIX: u16 = 16_383;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, uniffi::Error)]
pub enum AddressError {
    #[error("invalid base58 encoding: {0}")]
    InvalidBase58(String),

    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),

    #[error("invalid ss58 prefix byte: {0}")]
    InvalidPrefixByte(u8),

    #[error("ss58 prefix out of range: {0}, max is 16383")]
    PrefixOutOfRange(u16),

    #[error("invalid public key length: {0}, expected 32 or 33 bytes")]
    InvalidKeyLength(u32),

    #[error("ss58 checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid ethereum address: {0}")]
    InvalidEthereumAddress(String),
}

type Error = AddressError;

/// A decoded SS58 address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ss58Address {
    pub prefix: u16,
    pub public_key: Vec<u8>,
}

impl Ss58Address {
    /// Decode an SS58 string, or a `0x` hex public key (which gets the generic prefix)
    pub fn decode(address: &str) -> Result<Self, Error> {
        if address.starts_with("0x") {
            let public_key =
                decode_hex(address).map_err(|error| Error::InvalidHex(error.to_string()))?;

            check_key_length(public_key.len())?;
            return Ok(Self { prefix: GENERIC_SS58_PREFIX, public_key });
        }

        let data = bs58::decode(address)
            .into_vec()
            .map_err(|error| Error::InvalidBase58(error.to_string()))?;

        let Some(&first) = data.first() else {
            return Err(Error::InvalidKeyLength(0));
        };

        let (prefix, prefix_len) = match first {
            0..=63 => (first as u16, 1),
            64..=127 => {
                let second = *data.get(1).ok_or(Error::InvalidKeyLength(0))?;
                let lower = ((first & 0b0011_1111) << 2) | (second >> 6);
                let upper = second & 0b0011_1111;
                ((lower as u16) | ((upper as u16) << 8), 2)
            }
            other => return Err(Error::InvalidPrefixByte(other)),
        };

        let key_len = data.len().saturating_sub(prefix_len + SS58_CHECKSUM_LEN);
        check_key_length(key_len)?;

        let (body, checksum) = data.split_at(data.len() - SS58_CHECKSUM_LEN);
        if ss58_checksum(body) != checksum {
            return Err(Error::ChecksumMismatch);
        }

        Ok(Self { prefix, public_key: body[prefix_len..].to_vec() })
    }

    pub fn new(prefix: u16, public_key: Vec<u8>) -> Result<Self, Error> {
        if prefix > MAX_SS58_PREFIX {
            return Err(Error::PrefixOutOfRange(prefix));
        }

        check_key_length(public_key.len())?;
        Ok(Self { prefix, public_key })
    }

    pub fn encode(&self) -> String {
        let mut body = match self.prefix {
            0..=63 => vec![self.prefix as u8],
            _ => {
                let first = (((self.prefix & 0b1111_1100) >> 2) as u8) | 0b0100_0000;
                let second = ((self.prefix >> 8) as u8) | (((self.prefix & 0b11) as u8) << 6);
                vec![first, second]
            }
        };

        body.extend_from_slice(&self.public_key);
        let checksum = ss58_checksum(&body);
        body.extend_from_slice(&checksum);

        bs58::encode(body).into_string()
    }

    pub fn with_prefix(self, prefix: u16) -> Result<Self, Error> {
        Self::new(prefix, self.public_key)
    }
}

fn check_key_length(len: usize) -> Result<(), Error> {
    match len {
        32 | 33 => Ok(()),
        other => Err(Error::InvalidKeyLength(other as u32)),
    }
}

fn ss58_checksum(body: &[u8]) -> [u8; SS58_CHECKSUM_LEN] {
    let mut hasher = Blake2b512::new();
    hasher.update(SS58_CHECKSUM_PREFIX);
    hasher.update(body);
    let hash = hasher.finalize();

    [hash[0], hash[1]]
}

/// Public key bytes of an SS58 (or hex) address
pub fn decode_address(address: &str) -> Result<Vec<u8>, Error> {
    Ss58Address::decode(address).map(|decoded| decoded.public_key)
}

/// Re-encode an address under another network prefix
pub fn reformat_address(address: &str, prefix: u16) -> Result<String, Error> {
    let reformatted = Ss58Address::decode(address)?.with_prefix(prefix)?;
    Ok(reformatted.encode())
}

/// `0x` + 40 hex chars, all lower, all upper, or a valid EIP-55 checksum
pub fn is_ethereum_address(address: &str) -> bool {
    if address.len() != ETHEREUM_ADDRESS_LEN || !is_hex(address) {
        return false;
    }

    let digits = &address[2..];
    let has_lower = digits.bytes().any(|byte| byte.is_ascii_lowercase());
    let has_upper = digits.bytes().any(|byte| byte.is_ascii_uppercase());

    if !(has_lower && has_upper) {
        return true;
    }

    is_eip55_checksum_valid(digits)
}

fn is_eip55_checksum_valid(digits: &str) -> bool {
    let hash = Keccak256::digest(digits.to_ascii_lowercase().as_bytes());

    digits.bytes().enumerate().all(|(index, byte)| {
        if !byte.is_ascii_alphabetic() {
            return true;
        }

        let nibble = match index % 2 {
            0 => hash[index / 2] >> 4,
            _ => hash[index / 2] & 0x0f,
        };

        match nibble >= 8 {
            true => byte.is_ascii_uppercase(),
            false => byte.is_ascii_lowercase(),
        }
    })
}

/// The 20 address bytes of an Ethereum address
pub fn ethereum_address_bytes(address: &str) -> Result<[u8; 20], Error> {
    if !is_ethereum_address(address) {
        return Err(Error::InvalidEthereumAddress(address.to_string()));
    }

    let mut bytes = [0u8; 20];
    hex::decode_to_slice(&address[2..], &mut bytes)
        .map_err(|error| Error::InvalidHex(error.to_string()))?;

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    const ALICE_POLKADOT: &str = "15oF4uVJwmo4TdGW7VfQxNLavjCXviqxT9S1MgbjMNHr6Sp5";
    const ALICE_PUBLIC_KEY: &str =
        "d43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";

    #[test]
    fn test_decode_generic_address() {
        let decoded = Ss58Address::decode(ALICE).unwrap();
        assert_eq!(decoded.prefix, GENERIC_SS58_PREFIX);
        assert_eq!(hex::encode(&decoded.public_key), ALICE_PUBLIC_KEY);
    }

    #[test]
    fn test_reformat_to_polkadot_and_back() {
        assert_eq!(reformat_address(ALICE, 0).unwrap(), ALICE_POLKADOT);
        assert_eq!(reformat_address(ALICE_POLKADOT, GENERIC_SS58_PREFIX).unwrap(), ALICE);
    }

    #[test]
    fn test_two_byte_prefix() {
        let public_key = hex::decode(ALICE_PUBLIC_KEY).unwrap();
        let address = Ss58Address::new(2_000, public_key.clone()).unwrap().encode();

        let decoded = Ss58Address::decode(&address).unwrap();
        assert_eq!(decoded.prefix, 2_000);
        assert_eq!(decoded.public_key, public_key);
    }

    #[test]
    fn test_hex_public_key_is_accepted() {
        let key = format!("0x{ALICE_PUBLIC_KEY}");
        assert_eq!(hex::encode(decode_address(&key).unwrap()), ALICE_PUBLIC_KEY);
        assert_eq!(reformat_address(&key, GENERIC_SS58_PREFIX).unwrap(), ALICE);
    }

    #[test]
    fn test_bad_checksum_is_rejected() {
        let mut data = bs58::decode(ALICE).into_vec().unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xff;
        let tampered = bs58::encode(data).into_string();

        assert_eq!(Ss58Address::decode(&tampered), Err(AddressError::ChecksumMismatch));
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(matches!(decode_address("not an address!"), Err(AddressError::InvalidBase58(_))));
        assert!(matches!(decode_address("0x1234"), Err(AddressError::InvalidKeyLength(2))));
        assert!(decode_address("").is_err());
    }

    #[test]
    fn test_prefix_out_of_range() {
        let public_key = hex::decode(ALICE_PUBLIC_KEY).unwrap();
        assert_eq!(
            Ss58Address::new(16_384, public_key),
            Err(AddressError::PrefixOutOfRange(16_384))
        );
    }

    #[test]
    fn test_ethereum_address_checksum() {
        assert!(is_ethereum_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert!(is_ethereum_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
        assert!(is_ethereum_address("0x5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED"));

        // one letter with the wrong case
        assert!(!is_ethereum_address("0x5aaeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));

        assert!(!is_ethereum_address("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
        assert!(!is_ethereum_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1bea"));
        assert!(!is_ethereum_address(ALICE));
    }

    #[test]
    fn test_ethereum_address_bytes() {
        let bytes = ethereum_address_bytes("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap();
        assert_eq!(hex::encode(bytes), "5aaeb6053f3e94c9b9a09f33669435e7ef1beaed");

        assert!(matches!(
            ethereum_address_bytes(ALICE),
            Err(AddressError::InvalidEthereumAddress(_))
        ));
    }
}
