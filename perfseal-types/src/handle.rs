use crate::address::{hex_bytes32_serde, parse_hex32};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Byte of a handle that carries its [`FheType`] tag.
pub const TYPE_TAG_INDEX: usize = 30;

/// Encrypted value types understood by the coprocessor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FheType {
    Bool,
    Uint32,
}

impl FheType {
    pub fn tag(self) -> u8 {
        match self {
            FheType::Bool => 0,
            FheType::Uint32 => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(FheType::Bool),
            4 => Some(FheType::Uint32),
            _ => None,
        }
    }
}

/// Opaque reference to a ciphertext held by the FHE coprocessor.
///
/// The core stores and forwards handles; it never learns what they encrypt.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CiphertextHandle(pub [u8; 32]);

hex_bytes32_serde!(CiphertextHandle);

impl CiphertextHandle {
    /// Builds a handle from a 32-byte digest, stamping the type tag into it.
    pub fn from_digest(mut digest: [u8; 32], fhe_type: FheType) -> Self {
        digest[TYPE_TAG_INDEX] = fhe_type.tag();
        CiphertextHandle(digest)
    }

    pub fn fhe_type(&self) -> Option<FheType> {
        FheType::from_tag(self.0[TYPE_TAG_INDEX])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First four bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl FromStr for CiphertextHandle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex32(s).map(CiphertextHandle)
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CiphertextHandle(0x{}..)", self.short())
    }
}

/// A per-driver ciphertext slot. `Empty` is never a valid encrypted value.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandleSlot {
    #[default]
    Empty,
    Present(CiphertextHandle),
}

impl HandleSlot {
    pub fn is_empty(&self) -> bool {
        matches!(self, HandleSlot::Empty)
    }

    pub fn handle(&self) -> Option<&CiphertextHandle> {
        match self {
            HandleSlot::Empty => None,
            HandleSlot::Present(handle) => Some(handle),
        }
    }
}

impl From<CiphertextHandle> for HandleSlot {
    fn from(handle: CiphertextHandle) -> Self {
        HandleSlot::Present(handle)
    }
}

/// Validity proof accompanying an encrypted input.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct InputProof(pub Vec<u8>);

impl InputProof {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for InputProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InputProof({} bytes)", self.0.len())
    }
}

impl Serialize for InputProof {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&format!("0x{}", hex::encode(&self.0)))
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for InputProof {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            hex::decode(s.trim_start_matches("0x"))
                .map(InputProof)
                .map_err(serde::de::Error::custom)
        } else {
            Vec::<u8>::deserialize(deserializer).map(InputProof)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tag_is_stamped_into_handle() {
        let handle = CiphertextHandle::from_digest([0xff; 32], FheType::Uint32);
        assert_eq!(handle.fhe_type(), Some(FheType::Uint32));
        let handle = CiphertextHandle::from_digest([0xff; 32], FheType::Bool);
        assert_eq!(handle.fhe_type(), Some(FheType::Bool));
        assert_eq!(CiphertextHandle([0xff; 32]).fhe_type(), None);
    }

    #[test]
    fn empty_slot_is_distinct_from_zeroed_handle() {
        let zeroed = HandleSlot::Present(CiphertextHandle([0u8; 32]));
        assert!(!zeroed.is_empty());
        assert!(HandleSlot::default().is_empty());
        assert_eq!(HandleSlot::Empty.handle(), None);
    }

    #[test]
    fn proof_json_is_hex() {
        let proof = InputProof(vec![1, 2, 255]);
        let json = serde_json::to_string(&proof).unwrap();
        assert_eq!(json, "\"0x0102ff\"");
        assert_eq!(serde_json::from_str::<InputProof>(&json).unwrap(), proof);
    }
}
