use crate::address::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures raised by the FHE coprocessor.
#[derive(Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum FheError {
    #[error("unknown ciphertext handle")]
    UnknownHandle,
    #[error("ciphertext type mismatch")]
    TypeMismatch,
    #[error("input proof does not bind the handle to this contract and user")]
    InvalidProof,
    #[error("account is not allowed to use this ciphertext")]
    AccessDenied,
}

/// Every way a contract call can fail. Each variant aborts the call with no state change.
#[derive(Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("invalid address")]
    InvalidAddress,
    #[error("driver {0} is already registered")]
    DriverAlreadyRegistered(Address),
    #[error("driver list cannot be empty")]
    EmptyDriverList,
    #[error("batch of {len} drivers exceeds the limit of {max}")]
    BatchSizeTooLarge { len: usize, max: usize },
    #[error("offset {offset} is out of bounds for {count} registered drivers")]
    OffsetOutOfBounds { offset: u64, count: u64 },
    #[error("unauthorized access")]
    UnauthorizedAccess,
    #[error("contract is paused")]
    ContractPaused,
    #[error("contract is not paused")]
    ContractNotPaused,
    #[error("no order count submitted for driver {0}")]
    NoSubmission(Address),
    #[error("driver {0} is not registered")]
    DriverNotRegistered(Address),
    #[error("input proof rejected: {0}")]
    ProofRejected(FheError),
    #[error("invalid transaction signature")]
    InvalidSignature,
    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },
    #[error("fhe runtime failure: {0}")]
    Fhe(FheError),
}
