use crate::address::Address;
use crate::error::ContractError;
use crate::handle::CiphertextHandle;
use serde::{Deserialize, Serialize};

/// Notifications emitted by successful calls, in emission order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ContractEvent {
    DriverRegistered { driver: Address },
    OrderCountSubmitted { driver: Address, handle: CiphertextHandle },
    PerformanceEvaluated { driver: Address, result: CiphertextHandle },
    TargetThresholdUpdated { old: u32, new: u32 },
    ContractPaused { by: Address },
    ContractUnpaused { by: Address },
    /// `new_owner` is `None` after renunciation.
    OwnershipTransferred {
        previous_owner: Option<Address>,
        new_owner: Option<Address>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ReceiptStatus {
    Success { events: Vec<ContractEvent> },
    Failed { error: ContractError },
}

/// Outcome of one sequenced transaction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Receipt {
    pub seq: u64,
    pub tx_id: [u8; 32],
    pub status: ReceiptStatus,
    /// State root after the transaction (unchanged on failure).
    pub state_root: [u8; 32],
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ReceiptStatus::Success { .. })
    }

    pub fn events(&self) -> &[ContractEvent] {
        match &self.status {
            ReceiptStatus::Success { events } => events,
            ReceiptStatus::Failed { .. } => &[],
        }
    }

    pub fn error(&self) -> Option<&ContractError> {
        match &self.status {
            ReceiptStatus::Success { .. } => None,
            ReceiptStatus::Failed { error } => Some(error),
        }
    }
}
