//! Seams to the homomorphic-encryption coprocessor.
//!
//! The contract only ever holds [`CiphertextHandle`]s. Everything that needs the
//! underlying ciphertexts (input verification, comparison, decryption) goes through the
//! traits below.

mod coprocessor;

pub use coprocessor::{EncryptedInput, MockCoprocessor};
pub use perfseal_types::{CiphertextHandle, FheError, FheType, InputProof};

use perfseal_types::Address;
use serde::{Deserialize, Serialize};

/// A decrypted value.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plaintext {
    Bool(bool),
    Uint32(u32),
}

impl Plaintext {
    pub fn fhe_type(&self) -> FheType {
        match self {
            Plaintext::Bool(_) => FheType::Bool,
            Plaintext::Uint32(_) => FheType::Uint32,
        }
    }
}

/// Operations the contract runtime needs from the coprocessor.
pub trait FheRuntime {
    /// Checks that `proof` binds `handle` to `contract` and `user` and that the handle
    /// encrypts a value of type `expected`. On success `contract` may use the handle.
    fn verify_input(
        &mut self,
        handle: &CiphertextHandle,
        proof: &InputProof,
        expected: FheType,
        contract: &Address,
        user: &Address,
    ) -> Result<CiphertextHandle, FheError>;

    /// Encrypted `lhs >= rhs`. `caller` must be allowed on `lhs` and is allowed on the result.
    fn ge_scalar(
        &mut self,
        caller: &Address,
        lhs: &CiphertextHandle,
        rhs: u32,
    ) -> Result<CiphertextHandle, FheError>;

    /// Grants `account` the right to use and decrypt `handle`.
    fn allow(&mut self, handle: &CiphertextHandle, account: &Address) -> Result<(), FheError>;

    fn is_allowed(&self, handle: &CiphertextHandle, account: &Address) -> bool;
}

/// Off-chain decryption on behalf of an already-authenticated requester.
pub trait Decryptor {
    fn user_decrypt(
        &self,
        handle: &CiphertextHandle,
        requester: &Address,
    ) -> Result<Plaintext, FheError>;

    fn user_decrypt_bool(
        &self,
        handle: &CiphertextHandle,
        requester: &Address,
    ) -> Result<bool, FheError> {
        match self.user_decrypt(handle, requester)? {
            Plaintext::Bool(value) => Ok(value),
            Plaintext::Uint32(_) => Err(FheError::TypeMismatch),
        }
    }
}
