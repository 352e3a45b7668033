//! Parsing UOS payloads read back from a QR code.

use blake2::{Blake2b, Digest as _, digest::consts::U32};
use parity_scale_codec::{Compact, Decode as _};
use tracing::debug;

use super::{
    CryptoType, ETHEREUM_ID, EthereumCommand, GENESIS_HASH_LEN, SUBSTRATE_ID, SubstrateCommand,
};

/// Transaction payloads longer than this are signed by hash
pub const MAX_UNHASHED_PAYLOAD_LEN: usize = 256;

type Blake2b256 = Blake2b<U32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SigningAction {
    SignTransaction,
    SignData,
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum UosPayload {
    Ethereum {
        action: SigningAction,
        command: EthereumCommand,
        /// `0x` prefixed, lowercase
        address: String,
        data: Vec<u8>,
        is_hash: bool,
    },
    Substrate {
        action: SigningAction,
        crypto: CryptoType,
        command: SubstrateCommand,
        public_key: Vec<u8>,
        payload: Vec<u8>,
        genesis_hash: Option<String>,
        is_oversized: bool,
        is_hash: bool,
        /// What actually gets signed, the blake2-256 hash for oversized transactions
        signing_data: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, uniffi::Error)]
pub enum UosDecodeError {
    #[error("payload is empty")]
    Empty,

    #[error("unknown network id: {0}")]
    UnknownNetwork(u8),

    #[error("unknown crypto type: {0}")]
    UnknownCrypto(u8),

    #[error("unknown command: {0}")]
    UnknownCommand(u8),

    #[error("payload is truncated, expected at least {expected} bytes, got {actual}")]
    Truncated { expected: u32, actual: u32 },

    #[error("invalid compact length prefix: {0}")]
    InvalidCompactPrefix(String),

    #[error("not a binary qr bitstream: {0}")]
    InvalidRawData(String),
}

type Error = UosDecodeError;

impl UosPayload {
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let (&network, rest) = bytes.split_first().ok_or(Error::Empty)?;

        match network {
            ETHEREUM_ID => parse_ethereum(rest),
            SUBSTRATE_ID => parse_substrate(rest),
            other => Err(Error::UnknownNetwork(other)),
        }
    }

    pub fn action(&self) -> SigningAction {
        match self {
            Self::Ethereum { action, .. } | Self::Substrate { action, .. } => *action,
        }
    }
}

fn ensure_len(bytes: &[u8], expected: usize) -> Result<(), Error> {
    if bytes.len() < expected {
        return Err(Error::Truncated { expected: expected as u32, actual: bytes.len() as u32 });
    }

    Ok(())
}

fn parse_ethereum(bytes: &[u8]) -> Result<UosPayload, Error> {
    ensure_len(bytes, 1 + 20)?;

    let command = EthereumCommand::try_from_byte(bytes[0]).ok_or(Error::UnknownCommand(bytes[0]))?;
    let address = format!("0x{}", hex::encode(&bytes[1..21]));
    let data = bytes[21..].to_vec();

    let action = match command {
        EthereumCommand::SignTransaction => SigningAction::SignTransaction,
        EthereumCommand::SignHash | EthereumCommand::SignMessage => SigningAction::SignData,
    };

    debug!("parsed ethereum payload {command:?} for {address}");
    Ok(UosPayload::Ethereum {
        action,
        command,
        address,
        data,
        is_hash: command == EthereumCommand::SignHash,
    })
}

fn parse_substrate(bytes: &[u8]) -> Result<UosPayload, Error> {
    ensure_len(bytes, 2)?;

    let crypto = CryptoType::try_from_byte(bytes[0]).ok_or(Error::UnknownCrypto(bytes[0]))?;
    let command = SubstrateCommand::try_from_byte(bytes[1]).ok_or(Error::UnknownCommand(bytes[1]))?;

    let key_end = 2 + crypto.key_len();
    let genesis_len = match command {
        SubstrateCommand::SignMessage => 0,
        _ => GENESIS_HASH_LEN,
    };

    ensure_len(bytes, key_end + genesis_len)?;

    let public_key = bytes[2..key_end].to_vec();
    let (payload, genesis_hash) = bytes[key_end..].split_at(bytes.len() - key_end - genesis_len);
    let genesis_hash = (!genesis_hash.is_empty()).then(|| format!("0x{}", hex::encode(genesis_hash)));
    let payload = payload.to_vec();

    let (action, is_oversized, is_hash, signing_data) = match command {
        SubstrateCommand::SignMortal | SubstrateCommand::SignImmortal => {
            let is_oversized = payload.len() > MAX_UNHASHED_PAYLOAD_LEN;
            let signing_data = match is_oversized {
                true => hash_oversized_payload(&payload)?,
                false => payload.clone(),
            };

            (SigningAction::SignTransaction, is_oversized, is_oversized, signing_data)
        }
        SubstrateCommand::SignHash => (SigningAction::SignData, false, true, payload.clone()),
        SubstrateCommand::SignMessage => (SigningAction::SignData, false, false, payload.clone()),
    };

    debug!("parsed substrate payload {command:?}, {} bytes, oversized: {is_oversized}", payload.len());
    Ok(UosPayload::Substrate {
        action,
        crypto,
        command,
        public_key,
        payload,
        genesis_hash,
        is_oversized,
        is_hash,
        signing_data,
    })
}

/// blake2-256 of the payload with its SCALE compact length prefix removed
///
/// Hashes the raw call bytes, as Parity Signer does, not their hex text.
fn hash_oversized_payload(payload: &[u8]) -> Result<Vec<u8>, Error> {
    let mut input = payload;
    Compact::<u32>::decode(&mut input)
        .map_err(|error| Error::InvalidCompactPrefix(error.to_string()))?;

    Ok(Blake2b256::digest(input).to_vec())
}

/// Decode the raw byte-mode bitstream some scanners hand back as hex
///
/// The stream is `4 | length (8 or 16 bits) | data | 0`, padded with `ec11` filler.
pub fn decode_raw_qr_bytes(raw: &str) -> Result<Vec<u8>, Error> {
    let invalid = || Error::InvalidRawData(raw.to_string());

    if raw.is_empty() || !raw.is_ascii() {
        return Err(invalid());
    }

    let mut data = raw.strip_suffix("ec").unwrap_or(raw);
    while let Some(stripped) = data.strip_suffix("ec11") {
        data = stripped;
    }

    let data = data
        .strip_prefix('4')
        .and_then(|data| data.strip_suffix('0'))
        .ok_or_else(invalid)?;

    let length_prefix = |digits: usize| {
        data.get(..digits)
            .and_then(|prefix| usize::from_str_radix(prefix, 16).ok())
            .unwrap_or(0)
    };

    let body = if length_prefix(2) * 2 + 2 == data.len() {
        &data[2..]
    } else if length_prefix(4) * 2 + 4 == data.len() {
        &data[4..]
    } else {
        return Err(invalid());
    };

    hex::decode(body).map_err(|_| invalid())
}

#[uniffi::export]
fn parse_uos_payload(bytes: Vec<u8>) -> Result<UosPayload, UosDecodeError> {
    UosPayload::parse(&bytes)
}

#[uniffi::export]
fn decode_raw_qr_hex(raw: String) -> Result<Vec<u8>, UosDecodeError> {
    decode_raw_qr_bytes(&raw)
}
