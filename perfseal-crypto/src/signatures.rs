pub use ed25519_dalek::{SigningKey, VerifyingKey};
use ed25519_dalek::{Signature, Signer, Verifier};
use perfseal_types::{Address, CiphertextHandle, Transaction};
use rand::rngs::OsRng;
use anyhow::{Result, anyhow, bail};

const DECRYPT_DOMAIN: &[u8] = b"perfseal-decrypt";
const INPUT_DOMAIN: &[u8] = b"perfseal-input";

pub fn generate_keypair() -> SigningKey {
    let mut csprng = OsRng;
    SigningKey::generate(&mut csprng)
}

pub fn address_of(key: &SigningKey) -> Address {
    Address(key.verifying_key().to_bytes())
}

pub fn sign(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    let sig: Signature = key.sign(message);
    sig.to_bytes().to_vec()
}

pub fn sign_transaction(key: &SigningKey, tx: &mut Transaction) {
    tx.signature = sign(key, &tx.signing_bytes());
}

pub fn verify_signature(signer: &Address, message: &[u8], signature_bytes: &[u8]) -> Result<()> {
    let pubkey = VerifyingKey::from_bytes(signer.as_bytes()).map_err(|_| anyhow!("Invalid public key"))?;

    let bytes: &[u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| anyhow!("Invalid signature length: {}", signature_bytes.len()))?;
    let signature = Signature::from_bytes(bytes);

    if pubkey.verify(message, &signature).is_err() {
        bail!("Signature verification failed");
    }
    Ok(())
}

pub fn verify_transaction(tx: &Transaction) -> Result<()> {
    verify_signature(&tx.sender, &tx.signing_bytes(), &tx.signature)
}

/// Bytes a requester signs to ask for the plaintext behind `handle`.
pub fn decrypt_request_bytes(requester: &Address, handle: &CiphertextHandle) -> Vec<u8> {
    let mut message = Vec::with_capacity(DECRYPT_DOMAIN.len() + 64);
    message.extend_from_slice(DECRYPT_DOMAIN);
    message.extend_from_slice(requester.as_bytes());
    message.extend_from_slice(handle.as_bytes());
    message
}

pub fn sign_decrypt_request(key: &SigningKey, handle: &CiphertextHandle) -> Vec<u8> {
    sign(key, &decrypt_request_bytes(&address_of(key), handle))
}

pub fn verify_decrypt_request(requester: &Address, handle: &CiphertextHandle, signature: &[u8]) -> Result<()> {
    verify_signature(requester, &decrypt_request_bytes(requester, handle), signature)
}

/// Bytes a user signs to have `value` encrypted for them against `contract`.
pub fn encrypt_request_bytes(user: &Address, contract: &Address, value: u32) -> Vec<u8> {
    let mut message = Vec::with_capacity(INPUT_DOMAIN.len() + 68);
    message.extend_from_slice(INPUT_DOMAIN);
    message.extend_from_slice(user.as_bytes());
    message.extend_from_slice(contract.as_bytes());
    message.extend_from_slice(&value.to_le_bytes());
    message
}

pub fn sign_encrypt_request(key: &SigningKey, contract: &Address, value: u32) -> Vec<u8> {
    sign(key, &encrypt_request_bytes(&address_of(key), contract, value))
}

pub fn verify_encrypt_request(user: &Address, contract: &Address, value: u32, signature: &[u8]) -> Result<()> {
    verify_signature(user, &encrypt_request_bytes(user, contract, value), signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfseal_types::ContractInstruction;

    #[test]
    fn signed_transaction_verifies_and_tampering_is_detected() {
        let key = generate_keypair();
        let mut tx = Transaction::new(address_of(&key), 0, ContractInstruction::Pause);
        sign_transaction(&key, &mut tx);
        assert!(verify_transaction(&tx).is_ok());

        tx.nonce = 1;
        assert!(verify_transaction(&tx).is_err());
    }

    #[test]
    fn wrong_length_signature_is_rejected() {
        let key = generate_keypair();
        let addr = address_of(&key);
        assert!(verify_signature(&addr, b"msg", &[0u8; 10]).is_err());
    }

    #[test]
    fn decrypt_request_is_bound_to_the_handle() {
        let key = generate_keypair();
        let addr = address_of(&key);
        let handle = CiphertextHandle([7u8; 32]);
        let sig = sign_decrypt_request(&key, &handle);
        assert!(verify_decrypt_request(&addr, &handle, &sig).is_ok());
        assert!(verify_decrypt_request(&addr, &CiphertextHandle([8u8; 32]), &sig).is_err());

        let other = address_of(&generate_keypair());
        assert!(verify_decrypt_request(&other, &handle, &sig).is_err());
    }

    #[test]
    fn encrypt_request_is_bound_to_user_contract_and_value() {
        let key = generate_keypair();
        let user = address_of(&key);
        let contract = Address([0xc0; 32]);
        let sig = sign_encrypt_request(&key, &contract, 15);
        assert!(verify_encrypt_request(&user, &contract, 15, &sig).is_ok());
        assert!(verify_encrypt_request(&user, &contract, 16, &sig).is_err());
        assert!(verify_encrypt_request(&user, &Address([0xc1; 32]), 15, &sig).is_err());

        let other = address_of(&generate_keypair());
        assert!(verify_encrypt_request(&other, &contract, 15, &sig).is_err());
    }

    #[test]
    fn request_domains_do_not_overlap() {
        let key = generate_keypair();
        let user = address_of(&key);
        let handle = CiphertextHandle([7u8; 32]);
        let sig = sign_decrypt_request(&key, &handle);
        assert!(verify_encrypt_request(&user, &Address(handle.0), 0, &sig).is_err());
    }
}
