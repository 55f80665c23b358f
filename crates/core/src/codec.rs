use std::fmt;
use std::str::FromStr;

/// Length in bytes of an on-chain public key.
pub const ADDRESS_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("invalid character '{character}' at index {index}")]
    InvalidCharacter { character: char, index: usize },

    #[error("invalid base58: {0}")]
    Malformed(String),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("empty address")]
    Empty,
}

/// Encode bytes with the Bitcoin base58 alphabet.
///
/// Each leading zero byte becomes a leading `'1'`.
pub fn encode_base58(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Decode a Bitcoin-alphabet base58 string.
pub fn decode_base58(value: &str) -> Result<Vec<u8>, CodecError> {
    bs58::decode(value).into_vec().map_err(|e| match e {
        bs58::decode::Error::InvalidCharacter { character, index } => {
            CodecError::InvalidCharacter { character, index }
        }
        other => CodecError::Malformed(other.to_string()),
    })
}

/// Decode into a fixed-size array, rejecting any other length.
pub fn decode_base58_array<const N: usize>(value: &str) -> Result<[u8; N], CodecError> {
    let bytes = decode_base58(value)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| CodecError::InvalidLength {
        expected: N,
        actual: bytes.len(),
    })
}

/// A well-formed on-chain public key (32 bytes, base58 on the wire).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a base58 address. Surrounding whitespace is ignored.
    pub fn parse(value: &str) -> Result<Self, CodecError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(CodecError::Empty);
        }
        decode_base58_array(trimmed).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        encode_base58(&self.0)
    }
}

impl FromStr for Address {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_base58())
    }
}
