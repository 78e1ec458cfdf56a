use serde::{Serialize, Deserialize};
use crate::address::Address;
use crate::instruction::ContractInstruction;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Transaction {
    pub sender: Address,
    pub nonce: u64,
    pub instruction: ContractInstruction,
    pub signature: Vec<u8>,
}

impl Transaction {
    pub fn new(sender: Address, nonce: u64, instruction: ContractInstruction) -> Self {
        Self {
            sender,
            nonce,
            instruction,
            signature: Vec::new(),
        }
    }

    pub fn signing_bytes(&self) -> Vec<u8> {
        #[derive(Serialize)]
        struct SigningTx<'a> {
            sender: &'a Address,
            nonce: u64,
            instruction: &'a ContractInstruction,
        }

        let signing = SigningTx {
            sender: &self.sender,
            nonce: self.nonce,
            instruction: &self.instruction,
        };

        bincode::serialize(&signing).expect("tx signing serialization")
    }

    pub fn id(&self) -> [u8; 32] {
        use blake3::Hasher;
        let mut hasher = Hasher::new();
        hasher.update(&self.signing_bytes());
        hasher.update(&self.signature);
        *hasher.finalize().as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_covers_signature_and_signing_bytes_do_not() {
        let mut tx = Transaction::new(Address([1u8; 32]), 3, ContractInstruction::Pause);
        let bytes = tx.signing_bytes();
        let id = tx.id();

        tx.signature = vec![9u8; 64];
        assert_eq!(tx.signing_bytes(), bytes);
        assert_ne!(tx.id(), id);

        tx.nonce = 4;
        assert_ne!(tx.signing_bytes(), bytes);
    }
}
