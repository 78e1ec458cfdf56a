use std::fmt;
use std::str::FromStr;

/// Implements `Serialize`/`Deserialize` for a `[u8; 32]` newtype: `0x`-prefixed hex for
/// human readable formats (JSON), raw bytes otherwise (bincode).
macro_rules! hex_bytes32_serde {
    ($ty:ident) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
                } else {
                    serde::Serialize::serialize(&self.0, serializer)
                }
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                    s.parse().map_err(serde::de::Error::custom)
                } else {
                    <[u8; 32] as serde::Deserialize>::deserialize(deserializer).map($ty)
                }
            }
        }
    };
}

pub(crate) use hex_bytes32_serde;

pub(crate) fn parse_hex32(s: &str) -> Result<[u8; 32], String> {
    let mut out = [0u8; 32];
    hex::decode_to_slice(s.trim_start_matches("0x"), &mut out)
        .map_err(|e| format!("invalid 32-byte hex value {s:?}: {e}"))?;
    Ok(out)
}

/// A participant identity. For signed transactions this is the ed25519 verifying key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 32]);

hex_bytes32_serde!(Address);

impl Address {
    /// The null sentinel. Never a valid driver or owner.
    pub const ZERO: Address = Address([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First four bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex32(s).map(Address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_text_form_parses_with_and_without_prefix() {
        let addr = Address([0xab; 32]);
        let text = addr.to_string();
        assert!(text.starts_with("0xabab"));
        assert_eq!(text.parse::<Address>().unwrap(), addr);
        assert_eq!(text.trim_start_matches("0x").parse::<Address>().unwrap(), addr);
        assert!("0x1234".parse::<Address>().is_err());
    }

    #[test]
    fn json_uses_hex_and_bincode_uses_bytes() {
        let addr = Address([7u8; 32]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr));
        assert_eq!(serde_json::from_str::<Address>(&json).unwrap(), addr);

        let bytes = bincode::serialize(&addr).unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(bincode::deserialize::<Address>(&bytes).unwrap(), addr);
    }

    #[test]
    fn zero_sentinel() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address([1u8; 32]).is_zero());
    }
}
