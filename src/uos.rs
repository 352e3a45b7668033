//! Universal Offline Signatures (UOS) payload frames.
//!
//! A [`SigningRequest`] is turned into a single [`BinaryFrame`] that a companion signing
//! device can read byte for byte:
//!
//! - Substrate: `0x53 | crypto | command | public key | payload | genesis hash`
//!   (the genesis hash is left out for message signing)
//! - Ethereum: `0x45 | command | 20 byte address | payload`

pub mod decode;

use derive_more::{Deref, Into};
use strum::EnumIter;
use tracing::debug;
use uos_util::decode_hex;

use crate::address::{self, AddressError};

pub const SUBSTRATE_ID: u8 = 0x53;
pub const ETHEREUM_ID: u8 = 0x45;

pub const GENESIS_HASH_LEN: usize = 32;

pub const SUBSTRATE_PREFIX: &str = "substrate";
pub const ETHEREUM_PREFIX: &str = "ethereum";
pub const SECRET_PREFIX: &str = "secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, uniffi::Enum)]
pub enum CryptoType {
    Ed25519,
    Sr25519,
    Ecdsa,
    /// EVM key used on a Substrate chain
    Ethereum,
}

impl CryptoType {
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Ed25519 => 0x00,
            Self::Sr25519 => 0x01,
            Self::Ecdsa => 0x02,
            Self::Ethereum => 0x03,
        }
    }

    pub const fn try_from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Ed25519),
            0x01 => Some(Self::Sr25519),
            0x02 => Some(Self::Ecdsa),
            0x03 => Some(Self::Ethereum),
            _ => None,
        }
    }

    /// Length of the public key (or address) that follows the command byte
    pub const fn key_len(self) -> usize {
        match self {
            Self::Ed25519 | Self::Sr25519 => 32,
            Self::Ecdsa => 33,
            Self::Ethereum => 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, uniffi::Enum)]
pub enum SubstrateCommand {
    SignMortal,
    SignHash,
    SignImmortal,
    SignMessage,
}

impl SubstrateCommand {
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::SignMortal => 0x00,
            Self::SignHash => 0x01,
            Self::SignImmortal => 0x02,
            Self::SignMessage => 0x03,
        }
    }

    pub const fn try_from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::SignMortal),
            0x01 => Some(Self::SignHash),
            0x02 => Some(Self::SignImmortal),
            0x03 => Some(Self::SignMessage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, uniffi::Enum)]
pub enum EthereumCommand {
    SignHash,
    SignTransaction,
    SignMessage,
}

impl EthereumCommand {
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::SignHash => 0x00,
            Self::SignTransaction => 0x01,
            Self::SignMessage => 0x02,
        }
    }

    pub const fn try_from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::SignHash),
            0x01 => Some(Self::SignTransaction),
            0x02 => Some(Self::SignMessage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Substrate(SubstrateCommand),
    Ethereum(EthereumCommand),
}

impl Command {
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Substrate(command) => command.to_byte(),
            Self::Ethereum(command) => command.to_byte(),
        }
    }
}

/// Everything needed to show a payload to a companion signer
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct SigningRequest {
    /// SS58 address, or a `0x` EVM address
    pub address: String,
    /// Chain genesis hash, required for Substrate transactions and hashes
    pub genesis_hash: Option<String>,
    pub payload: Vec<u8>,
    pub is_ethereum: bool,
    pub is_message: bool,
    pub is_hash: bool,
}

/// Encoded UOS frame, ready for QR transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deref, Into)]
pub struct BinaryFrame(Vec<u8>);

impl AsRef<[u8]> for BinaryFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl BinaryFrame {
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, uniffi::Error)]
pub enum UosError {
    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("genesis hash is required to sign a substrate transaction or hash")]
    MissingGenesisHash,

    #[error("invalid genesis hash: {0}")]
    InvalidGenesisHash(String),
}

type Error = UosError;

impl SigningRequest {
    pub fn command(&self) -> Command {
        use EthereumCommand as Eth;
        use SubstrateCommand as Sub;

        match (self.is_ethereum, self.is_message, self.is_hash) {
            (true, true, true) => Command::Ethereum(Eth::SignHash),
            (true, true, false) => Command::Ethereum(Eth::SignMessage),
            (true, false, _) => Command::Ethereum(Eth::SignTransaction),
            (false, true, _) => Command::Substrate(Sub::SignMessage),
            (false, false, true) => Command::Substrate(Sub::SignHash),
            (false, false, false) => Command::Substrate(Sub::SignImmortal),
        }
    }

    pub fn build_frame(&self) -> Result<BinaryFrame, Error> {
        let frame = match self.command() {
            Command::Ethereum(command) => self.ethereum_frame(command)?,
            Command::Substrate(command) => self.substrate_frame(command)?,
        };

        debug!("built uos frame, {} bytes", frame.len());
        Ok(BinaryFrame(frame))
    }

    fn ethereum_frame(&self, command: EthereumCommand) -> Result<Vec<u8>, Error> {
        let address = address::ethereum_address_bytes(&self.address)?;

        let mut frame = Vec::with_capacity(2 + address.len() + self.payload.len());
        frame.push(ETHEREUM_ID);
        frame.push(command.to_byte());
        frame.extend_from_slice(&address);
        frame.extend_from_slice(&self.payload);

        Ok(frame)
    }

    fn substrate_frame(&self, command: SubstrateCommand) -> Result<Vec<u8>, Error> {
        let (crypto, public_key) = match address::is_ethereum_address(&self.address) {
            true => (CryptoType::Ethereum, address::ethereum_address_bytes(&self.address)?.to_vec()),
            false => (CryptoType::Sr25519, address::decode_address(&self.address)?),
        };

        let genesis_hash = match command {
            SubstrateCommand::SignMessage => None,
            _ => Some(parse_genesis_hash(self.genesis_hash.as_deref())?),
        };

        let mut frame = Vec::with_capacity(
            3 + public_key.len() + self.payload.len() + GENESIS_HASH_LEN,
        );

        frame.push(SUBSTRATE_ID);
        frame.push(crypto.to_byte());
        frame.push(command.to_byte());
        frame.extend_from_slice(&public_key);
        frame.extend_from_slice(&self.payload);

        if let Some(genesis_hash) = genesis_hash {
            frame.extend_from_slice(&genesis_hash);
        }

        Ok(frame)
    }
}

fn parse_genesis_hash(genesis_hash: Option<&str>) -> Result<[u8; GENESIS_HASH_LEN], Error> {
    let genesis_hash = genesis_hash.ok_or(Error::MissingGenesisHash)?;
    let bytes = decode_hex(genesis_hash)
        .map_err(|_| Error::InvalidGenesisHash(genesis_hash.to_string()))?;

    bytes.try_into().map_err(|_| Error::InvalidGenesisHash(genesis_hash.to_string()))
}

/// The text an account QR carries so a companion app can connect it
///
/// `ethereum:<address>` for EVM accounts, `substrate:<address>:<genesis hash>` otherwise
pub fn address_payload(address: &str, genesis_hash: &str) -> Result<String, Error> {
    if address::is_ethereum_address(address) {
        return Ok(format!("{ETHEREUM_PREFIX}:{address}"));
    }

    address::decode_address(address)?;
    parse_genesis_hash(Some(genesis_hash))?;

    Ok(format!("{SUBSTRATE_PREFIX}:{address}:{genesis_hash}"))
}

#[uniffi::export]
fn build_signing_frame(request: SigningRequest) -> Result<Vec<u8>, UosError> {
    request.build_frame().map(BinaryFrame::into_bytes)
}

#[uniffi::export]
fn account_qr_payload(address: String, genesis_hash: String) -> Result<String, UosError> {
    address_payload(&address, &genesis_hash)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator as _;

    pub const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    pub const ALICE_PUBLIC_KEY: &str =
        "d43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";
    pub const POLKADOT_GENESIS: &str =
        "0x91b171bb158e2d3848fa23a9f1c25182fb8e20313b2c1eb49219da7a70ce90c3";
    pub const EVM_ADDRESS: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn request(is_ethereum: bool, is_message: bool, is_hash: bool) -> SigningRequest {
        let address = if is_ethereum { EVM_ADDRESS } else { ALICE };

        SigningRequest {
            address: address.to_string(),
            genesis_hash: Some(POLKADOT_GENESIS.to_string()),
            payload: vec![0xde, 0xad, 0xbe, 0xef],
            is_ethereum,
            is_message,
            is_hash,
        }
    }

    #[test]
    fn test_command_table() {
        use EthereumCommand as Eth;
        use SubstrateCommand as Sub;

        let cases = [
            ((true, true, true), Command::Ethereum(Eth::SignHash), 0x00),
            ((true, true, false), Command::Ethereum(Eth::SignMessage), 0x02),
            ((true, false, true), Command::Ethereum(Eth::SignTransaction), 0x01),
            ((true, false, false), Command::Ethereum(Eth::SignTransaction), 0x01),
            ((false, true, true), Command::Substrate(Sub::SignMessage), 0x03),
            ((false, true, false), Command::Substrate(Sub::SignMessage), 0x03),
            ((false, false, true), Command::Substrate(Sub::SignHash), 0x01),
            ((false, false, false), Command::Substrate(Sub::SignImmortal), 0x02),
        ];

        for ((is_ethereum, is_message, is_hash), command, byte) in cases {
            let request = request(is_ethereum, is_message, is_hash);
            assert_eq!(request.command(), command, "{is_ethereum} {is_message} {is_hash}");

            let frame = request.build_frame().unwrap();
            let command_index = if is_ethereum { 1 } else { 2 };
            assert_eq!(frame[command_index], byte, "{is_ethereum} {is_message} {is_hash}");
        }
    }

    #[test]
    fn test_substrate_immortal_layout() {
        let request = request(false, false, false);
        let frame = request.build_frame().unwrap();

        assert_eq!(frame.len(), 1 + 1 + 1 + 32 + request.payload.len() + 32);
        assert_eq!(frame[0], SUBSTRATE_ID);
        assert_eq!(frame[1], CryptoType::Sr25519.to_byte());
        assert_eq!(frame[2], SubstrateCommand::SignImmortal.to_byte());
        assert_eq!(hex::encode(&frame[3..35]), ALICE_PUBLIC_KEY);
        assert_eq!(&frame[35..39], request.payload.as_slice());
        assert_eq!(format!("0x{}", hex::encode(&frame[39..])), POLKADOT_GENESIS);
    }

    #[test]
    fn test_substrate_message_omits_genesis_hash() {
        let mut request = request(false, true, false);
        request.genesis_hash = None;

        let frame = request.build_frame().unwrap();
        assert_eq!(frame.len(), 3 + 32 + request.payload.len());
        assert_eq!(&frame[35..], request.payload.as_slice());
    }

    #[test]
    fn test_substrate_evm_address_uses_ethereum_crypto() {
        let mut request = request(false, false, true);
        request.address = EVM_ADDRESS.to_string();

        let frame = request.build_frame().unwrap();
        assert_eq!(frame[1], CryptoType::Ethereum.to_byte());
        assert_eq!(frame.len(), 3 + 20 + request.payload.len() + 32);
    }

    #[test]
    fn test_ethereum_layout() {
        let request = request(true, false, false);
        let frame = request.build_frame().unwrap();

        assert_eq!(frame[0], ETHEREUM_ID);
        assert_eq!(hex::encode(&frame[2..22]), EVM_ADDRESS[2..].to_lowercase());
        assert_eq!(&frame[22..], request.payload.as_slice());
    }

    #[test]
    fn test_encoding_errors_propagate() {
        let mut bad_address = request(false, false, false);
        bad_address.address = "definitely not an address".to_string();
        assert!(matches!(bad_address.build_frame(), Err(UosError::Address(_))));

        let mut missing_genesis = request(false, false, false);
        missing_genesis.genesis_hash = None;
        assert_eq!(missing_genesis.build_frame(), Err(UosError::MissingGenesisHash));

        let mut short_genesis = request(false, false, true);
        short_genesis.genesis_hash = Some("0x91b1".to_string());
        assert!(matches!(short_genesis.build_frame(), Err(UosError::InvalidGenesisHash(_))));

        let mut bad_evm = request(true, false, false);
        bad_evm.address = ALICE.to_string();
        assert!(matches!(
            bad_evm.build_frame(),
            Err(UosError::Address(AddressError::InvalidEthereumAddress(_)))
        ));
    }

    #[test]
    fn test_command_bytes_round_trip() {
        for crypto in CryptoType::iter() {
            assert_eq!(CryptoType::try_from_byte(crypto.to_byte()), Some(crypto));
        }

        for command in SubstrateCommand::iter() {
            assert_eq!(SubstrateCommand::try_from_byte(command.to_byte()), Some(command));
        }

        for command in EthereumCommand::iter() {
            assert_eq!(EthereumCommand::try_from_byte(command.to_byte()), Some(command));
        }
    }

    #[test]
    fn test_address_payload() {
        assert_eq!(
            address_payload(ALICE, POLKADOT_GENESIS).unwrap(),
            format!("substrate:{ALICE}:{POLKADOT_GENESIS}")
        );

        assert_eq!(
            address_payload(EVM_ADDRESS, POLKADOT_GENESIS).unwrap(),
            format!("ethereum:{EVM_ADDRESS}")
        );

        assert!(address_payload(ALICE, "0x00").is_err());
    }
}
