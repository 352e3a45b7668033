//! Classifying scanned QR strings.
//!
//! Scanned text is either `<scheme>:<parts>` (account import QRs) or a bare string (a
//! plain address, or a signature read back from the companion signer). Each scheme has
//! its own decoder in a lookup table, anything that doesn't decode is a miss (`None`),
//! never an error.

use ahash::AHashMap;
use tracing::{debug, trace};
use uos_util::is_hex;

use crate::{
    address::{self, ETHEREUM_ADDRESS_LEN, GENERIC_SS58_PREFIX},
    uos::{ETHEREUM_PREFIX, SECRET_PREFIX, SUBSTRATE_PREFIX},
};

const SCHEME_DELIMITER: char = ':';

/// Decodes the `:` separated parts that follow a scheme prefix
pub type SchemeDecoder = fn(&[&str]) -> Option<ScanResult>;

/// Decodes a scan that has no registered scheme prefix
pub type FallbackDecoder = fn(&str) -> Option<ScanResult>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum ScanResult {
    Address {
        content: String,
        genesis_hash: Option<String>,
        is_ethereum: bool,
        is_read_only: bool,
        name: Option<String>,
    },
    /// Key material, not a bare address
    Secret { content: String, genesis_hash: Option<String>, name: Option<String> },
    /// Signature from the companion signer, `0x` prefixed lowercase hex
    Signature { signature: String },
}

impl ScanResult {
    pub fn signature(&self) -> Option<&str> {
        match self {
            Self::Signature { signature } => Some(signature.as_str()),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Address { .. } => "address",
            Self::Secret { .. } => "secret",
            Self::Signature { .. } => "signature",
        }
    }
}

/// Which kinds of QR the current screen accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum ScanMode {
    /// `substrate:`, `ethereum:` and `secret:` account QRs
    ImportAccount,
    /// A bare Ethereum or SS58 address, watched without keys
    AttachReadOnly,
    /// A signature shown by the companion signer
    Signature,
}

#[derive(Debug, Clone, Default)]
pub struct ScanClassifier {
    schemes: AHashMap<&'static str, SchemeDecoder>,
    fallback: Option<FallbackDecoder>,
}

impl ScanClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_mode(mode: ScanMode) -> Self {
        let mut classifier = Self::new();

        match mode {
            ScanMode::ImportAccount => {
                classifier
                    .register(SUBSTRATE_PREFIX, decode_substrate)
                    .register(ETHEREUM_PREFIX, decode_ethereum)
                    .register(SECRET_PREFIX, decode_secret);
            }
            ScanMode::AttachReadOnly => {
                classifier.set_fallback(decode_read_only_address);
            }
            ScanMode::Signature => {
                classifier.set_fallback(decode_signature);
            }
        }

        classifier
    }

    /// Add or replace the decoder for `prefix`
    pub fn register(&mut self, prefix: &'static str, decoder: SchemeDecoder) -> &mut Self {
        self.schemes.insert(prefix, decoder);
        self
    }

    pub fn set_fallback(&mut self, decoder: FallbackDecoder) -> &mut Self {
        self.fallback = Some(decoder);
        self
    }

    pub fn classify(&self, raw: &str) -> Option<ScanResult> {
        let scheme = raw
            .split_once(SCHEME_DELIMITER)
            .and_then(|(prefix, rest)| Some((self.schemes.get(prefix)?, prefix, rest)));

        let result = match (scheme, self.fallback) {
            (Some((decoder, prefix, rest)), _) => {
                trace!("decoding {prefix} scan");
                let parts = rest.split(SCHEME_DELIMITER).collect::<Vec<_>>();
                decoder(&parts)
            }
            (None, Some(fallback)) => fallback(raw),
            (None, None) => None,
        };

        if result.is_none() {
            debug!("scan not recognized");
        }

        result
    }
}

fn non_empty(value: Option<&&str>) -> Option<String> {
    value.filter(|value| !value.is_empty()).map(|value| value.to_string())
}

fn join_name(parts: &[&str]) -> Option<String> {
    let name = parts.join(":");
    (!name.is_empty()).then_some(name)
}

/// `substrate:<address>:<genesis hash>[:name]`
fn decode_substrate(parts: &[&str]) -> Option<ScanResult> {
    let content = non_empty(parts.first())?;
    address::decode_address(&content).ok()?;

    Some(ScanResult::Address {
        content,
        genesis_hash: non_empty(parts.get(1)),
        is_ethereum: false,
        is_read_only: false,
        name: join_name(parts.get(2..).unwrap_or_default()),
    })
}

/// `ethereum:<address>[@<chain hint>][:name]`
fn decode_ethereum(parts: &[&str]) -> Option<ScanResult> {
    let raw = *parts.first()?;
    let genesis_hash = raw.split_once('@').map(|(_, hint)| hint).filter(|hint| !hint.is_empty());

    let content = raw.get(..ETHEREUM_ADDRESS_LEN).unwrap_or(raw);
    if !address::is_ethereum_address(content) {
        return None;
    }

    Some(ScanResult::Address {
        content: content.to_string(),
        genesis_hash: genesis_hash.map(ToString::to_string),
        is_ethereum: true,
        is_read_only: false,
        name: join_name(parts.get(1..).unwrap_or_default()),
    })
}

/// `secret:<secret>:<genesis hash>[:name]`
fn decode_secret(parts: &[&str]) -> Option<ScanResult> {
    Some(ScanResult::Secret {
        content: non_empty(parts.first())?,
        genesis_hash: non_empty(parts.get(1)),
        name: join_name(parts.get(2..).unwrap_or_default()),
    })
}

/// A bare address, Ethereum first then SS58 (re-encoded with the generic prefix)
///
/// Plain hex that isn't an Ethereum address is ambiguous and rejected.
fn decode_read_only_address(raw: &str) -> Option<ScanResult> {
    if address::is_ethereum_address(raw) {
        return Some(ScanResult::Address {
            content: raw.to_string(),
            genesis_hash: None,
            is_ethereum: true,
            is_read_only: true,
            name: None,
        });
    }

    if is_hex(raw) {
        return None;
    }

    let content = address::reformat_address(raw, GENERIC_SS58_PREFIX).ok()?;
    Some(ScanResult::Address {
        content,
        genesis_hash: None,
        is_ethereum: false,
        is_read_only: true,
        name: None,
    })
}

/// `0x` prefixed hex signature, bare numbers and hex are not signatures
fn decode_signature(raw: &str) -> Option<ScanResult> {
    if !is_hex(raw) {
        return None;
    }

    Some(ScanResult::Signature { signature: raw.to_ascii_lowercase() })
}

#[uniffi::export]
fn classify_scan(raw: String, mode: ScanMode) -> Option<ScanResult> {
    ScanClassifier::for_mode(mode).classify(&raw)
}
