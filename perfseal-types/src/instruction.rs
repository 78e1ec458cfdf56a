use crate::address::Address;
use crate::handle::{CiphertextHandle, InputProof};
use serde::{Deserialize, Serialize};

/// Every state-changing call the contract accepts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ContractInstruction {
    // ══════════════════════════════════════════════════════════════
    // Driver Registry
    // ══════════════════════════════════════════════════════════════
    RegisterDriver { driver: Address },
    BatchRegisterDrivers { drivers: Vec<Address> },

    // ══════════════════════════════════════════════════════════════
    // Encrypted Performance
    // ══════════════════════════════════════════════════════════════
    SubmitOrderCount {
        driver: Address,
        handle: CiphertextHandle,
        proof: InputProof,
    },
    EvaluatePerformance { driver: Address },
    SetTargetThreshold { threshold: u32 },

    // ══════════════════════════════════════════════════════════════
    // Access & Lifecycle
    // ══════════════════════════════════════════════════════════════
    Pause,
    Unpause,
    TransferOwnership { new_owner: Address },
    RenounceOwnership,
}

impl ContractInstruction {
    /// Stable name used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            ContractInstruction::RegisterDriver { .. } => "register_driver",
            ContractInstruction::BatchRegisterDrivers { .. } => "batch_register_drivers",
            ContractInstruction::SubmitOrderCount { .. } => "submit_order_count",
            ContractInstruction::EvaluatePerformance { .. } => "evaluate_performance",
            ContractInstruction::SetTargetThreshold { .. } => "set_target_threshold",
            ContractInstruction::Pause => "pause",
            ContractInstruction::Unpause => "unpause",
            ContractInstruction::TransferOwnership { .. } => "transfer_ownership",
            ContractInstruction::RenounceOwnership => "renounce_ownership",
        }
    }
}
