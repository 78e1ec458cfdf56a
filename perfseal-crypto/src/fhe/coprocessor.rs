use super::{Decryptor, FheRuntime, Plaintext};
use perfseal_types::{Address, CiphertextHandle, FheError, FheType, InputProof};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

const INPUT_DOMAIN: &[u8] = b"perfseal.fhe.input";
const PROOF_DOMAIN: &[u8] = b"perfseal.fhe.input-proof";
const GE_DOMAIN: &[u8] = b"perfseal.fhe.ge";

/// Handle and proof produced for one encrypted input.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EncryptedInput {
    pub handle: CiphertextHandle,
    pub proof: InputProof,
}

/// Development coprocessor: keeps plaintexts behind handles, the way local FHE
/// development networks mock the real ciphertext store.
///
/// Handles and input proofs are keyed blake3 digests, so they cannot be forged without
/// the coprocessor key. This is not encryption and provides no confidentiality against
/// whoever holds the coprocessor state.
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct MockCoprocessor {
    key: [u8; 32],
    counter: u64,
    ciphertexts: BTreeMap<CiphertextHandle, Plaintext>,
    acl: BTreeMap<CiphertextHandle, BTreeSet<Address>>,
}

impl fmt::Debug for MockCoprocessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockCoprocessor")
            .field("counter", &self.counter)
            .field("ciphertexts", &self.ciphertexts.len())
            .finish()
    }
}

impl MockCoprocessor {
    pub fn new(key: [u8; 32]) -> Self {
        Self {
            key,
            counter: 0,
            ciphertexts: BTreeMap::new(),
            acl: BTreeMap::new(),
        }
    }

    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    pub fn len(&self) -> usize {
        self.ciphertexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertexts.is_empty()
    }

    /// Client-side encryption of `value` for submission by `user` to `contract`.
    pub fn encrypt_u32(&mut self, contract: &Address, user: &Address, value: u32) -> EncryptedInput {
        self.counter += 1;
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(INPUT_DOMAIN);
        hasher.update(&self.counter.to_le_bytes());
        hasher.update(contract.as_bytes());
        hasher.update(user.as_bytes());
        let handle = CiphertextHandle::from_digest(*hasher.finalize().as_bytes(), FheType::Uint32);

        self.ciphertexts.insert(handle, Plaintext::Uint32(value));
        let proof = InputProof(self.proof_digest(contract, user, &handle).as_bytes().to_vec());
        EncryptedInput { handle, proof }
    }

    fn proof_digest(&self, contract: &Address, user: &Address, handle: &CiphertextHandle) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(PROOF_DOMAIN);
        hasher.update(contract.as_bytes());
        hasher.update(user.as_bytes());
        hasher.update(handle.as_bytes());
        hasher.finalize()
    }

    fn plaintext(&self, handle: &CiphertextHandle) -> Result<Plaintext, FheError> {
        self.ciphertexts.get(handle).copied().ok_or(FheError::UnknownHandle)
    }
}

impl FheRuntime for MockCoprocessor {
    fn verify_input(
        &mut self,
        handle: &CiphertextHandle,
        proof: &InputProof,
        expected: FheType,
        contract: &Address,
        user: &Address,
    ) -> Result<CiphertextHandle, FheError> {
        let plaintext = self.plaintext(handle)?;
        if plaintext.fhe_type() != expected || handle.fhe_type() != Some(expected) {
            return Err(FheError::TypeMismatch);
        }

        let bytes: [u8; 32] = proof
            .as_bytes()
            .try_into()
            .map_err(|_| FheError::InvalidProof)?;
        // blake3::Hash equality is constant time.
        if blake3::Hash::from(bytes) != self.proof_digest(contract, user, handle) {
            return Err(FheError::InvalidProof);
        }

        self.allow(handle, contract)?;
        Ok(*handle)
    }

    fn ge_scalar(
        &mut self,
        caller: &Address,
        lhs: &CiphertextHandle,
        rhs: u32,
    ) -> Result<CiphertextHandle, FheError> {
        let value = match self.plaintext(lhs)? {
            Plaintext::Uint32(value) => value,
            Plaintext::Bool(_) => return Err(FheError::TypeMismatch),
        };
        if !self.is_allowed(lhs, caller) {
            return Err(FheError::AccessDenied);
        }

        self.counter += 1;
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(GE_DOMAIN);
        hasher.update(&self.counter.to_le_bytes());
        hasher.update(lhs.as_bytes());
        hasher.update(&rhs.to_le_bytes());
        let result = CiphertextHandle::from_digest(*hasher.finalize().as_bytes(), FheType::Bool);

        self.ciphertexts.insert(result, Plaintext::Bool(value >= rhs));
        self.allow(&result, caller)?;
        Ok(result)
    }

    fn allow(&mut self, handle: &CiphertextHandle, account: &Address) -> Result<(), FheError> {
        if !self.ciphertexts.contains_key(handle) {
            return Err(FheError::UnknownHandle);
        }
        self.acl.entry(*handle).or_default().insert(*account);
        Ok(())
    }

    fn is_allowed(&self, handle: &CiphertextHandle, account: &Address) -> bool {
        self.acl
            .get(handle)
            .map(|allowed| allowed.contains(account))
            .unwrap_or(false)
    }
}

impl Decryptor for MockCoprocessor {
    fn user_decrypt(
        &self,
        handle: &CiphertextHandle,
        requester: &Address,
    ) -> Result<Plaintext, FheError> {
        let plaintext = self.plaintext(handle)?;
        if !self.is_allowed(handle, requester) {
            return Err(FheError::AccessDenied);
        }
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: Address = Address([0xc0; 32]);
    const ALICE: Address = Address([0xa1; 32]);
    const BOB: Address = Address([0xb0; 32]);

    fn verified(cop: &mut MockCoprocessor, value: u32) -> CiphertextHandle {
        let input = cop.encrypt_u32(&CONTRACT, &ALICE, value);
        cop.verify_input(&input.handle, &input.proof, FheType::Uint32, &CONTRACT, &ALICE)
            .unwrap()
    }

    #[test]
    fn proof_is_bound_to_contract_and_user() {
        let mut cop = MockCoprocessor::new([1u8; 32]);
        let input = cop.encrypt_u32(&CONTRACT, &ALICE, 15);

        assert_eq!(
            cop.verify_input(&input.handle, &input.proof, FheType::Uint32, &CONTRACT, &BOB),
            Err(FheError::InvalidProof)
        );
        assert_eq!(
            cop.verify_input(&input.handle, &input.proof, FheType::Uint32, &BOB, &ALICE),
            Err(FheError::InvalidProof)
        );
        assert_eq!(
            cop.verify_input(&input.handle, &InputProof(vec![0u8; 5]), FheType::Uint32, &CONTRACT, &ALICE),
            Err(FheError::InvalidProof)
        );
        assert!(!cop.is_allowed(&input.handle, &CONTRACT));

        let handle = cop
            .verify_input(&input.handle, &input.proof, FheType::Uint32, &CONTRACT, &ALICE)
            .unwrap();
        assert_eq!(handle, input.handle);
        assert!(cop.is_allowed(&handle, &CONTRACT));
    }

    #[test]
    fn proofs_from_another_coprocessor_are_rejected() {
        let mut ours = MockCoprocessor::new([1u8; 32]);
        let mut theirs = MockCoprocessor::new([2u8; 32]);
        let forged = theirs.encrypt_u32(&CONTRACT, &ALICE, 7);

        assert_eq!(
            ours.verify_input(&forged.handle, &forged.proof, FheType::Uint32, &CONTRACT, &ALICE),
            Err(FheError::UnknownHandle)
        );
    }

    #[test]
    fn ge_compares_without_exposing_operands() {
        let mut cop = MockCoprocessor::generate();
        let high = verified(&mut cop, 15);
        let equal = verified(&mut cop, 10);
        let low = verified(&mut cop, 5);

        for (handle, expected) in [(high, true), (equal, true), (low, false)] {
            let result = cop.ge_scalar(&CONTRACT, &handle, 10).unwrap();
            assert_eq!(result.fhe_type(), Some(FheType::Bool));
            cop.allow(&result, &ALICE).unwrap();
            assert_eq!(cop.user_decrypt_bool(&result, &ALICE), Ok(expected));
        }
    }

    #[test]
    fn ge_requires_the_caller_to_be_allowed() {
        let mut cop = MockCoprocessor::generate();
        let handle = verified(&mut cop, 3);
        assert_eq!(cop.ge_scalar(&BOB, &handle, 1), Err(FheError::AccessDenied));
    }

    #[test]
    fn decryption_follows_the_acl() {
        let mut cop = MockCoprocessor::generate();
        let handle = verified(&mut cop, 12);
        let result = cop.ge_scalar(&CONTRACT, &handle, 10).unwrap();

        assert_eq!(cop.user_decrypt(&result, &BOB), Err(FheError::AccessDenied));
        cop.allow(&result, &BOB).unwrap();
        assert_eq!(cop.user_decrypt(&result, &BOB), Ok(Plaintext::Bool(true)));
        assert_eq!(cop.user_decrypt_bool(&handle, &CONTRACT), Err(FheError::TypeMismatch));
    }

    #[test]
    fn unknown_handles_cannot_be_allowed() {
        let mut cop = MockCoprocessor::generate();
        let bogus = CiphertextHandle([9u8; 32]);
        assert_eq!(cop.allow(&bogus, &ALICE), Err(FheError::UnknownHandle));
        assert!(!cop.is_allowed(&bogus, &ALICE));
    }

    #[test]
    fn snapshot_round_trips_through_bincode() {
        let mut cop = MockCoprocessor::new([4u8; 32]);
        let handle = verified(&mut cop, 20);
        let bytes = bincode::serialize(&cop).unwrap();
        let restored: MockCoprocessor = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored, cop);
        assert!(restored.is_allowed(&handle, &CONTRACT));
    }
}
