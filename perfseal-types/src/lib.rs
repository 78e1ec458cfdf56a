pub mod address;
pub mod error;
pub mod event;
pub mod handle;
pub mod instruction;
pub mod state;
pub mod transaction;

pub use address::Address;
pub use error::{ContractError, FheError};
pub use event::{ContractEvent, Receipt, ReceiptStatus};
pub use handle::{CiphertextHandle, FheType, HandleSlot, InputProof};
pub use instruction::ContractInstruction;
pub use state::{ContractState, DriverSet, DriverStatus, PerformanceSlots, SubmissionPolicy};
pub use transaction::Transaction;

/// Upper bound on the number of drivers accepted by one batch registration.
pub const MAX_BATCH_SIZE: usize = 100;
