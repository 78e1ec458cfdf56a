pub mod access;
pub mod engine;
pub mod registry;


use perfseal_crypto::fhe::FheRuntime;
use perfseal_crypto::signatures::verify_transaction;
use perfseal_types::{Address, ContractError, ContractEvent, ContractInstruction, ContractState, Transaction};
use tracing::{debug, info};

pub struct ExecutionContext<'a> {
    pub state: &'a mut ContractState,
    pub fhe: &'a mut dyn FheRuntime,
    pub events: Vec<ContractEvent>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(state: &'a mut ContractState, fhe: &'a mut dyn FheRuntime) -> Self {
        Self {
            state,
            fhe,
            events: Vec::new(),
        }
    }

    pub(crate) fn emit(&mut self, event: ContractEvent) {
        debug!(?event, "contract event");
        self.events.push(event);
    }
}

/// Checks that `tx` is signed by its sender and carries the sender's next nonce.
///
/// Needs only read access, so a sequencer can turn away forged or replayed
/// transactions before giving them a slot in the log.
pub fn check_envelope(tx: &Transaction, state: &ContractState) -> Result<(), ContractError> {
    verify_transaction(tx).map_err(|_| ContractError::InvalidSignature)?;

    let expected = state.nonce_of(&tx.sender);
    if tx.nonce != expected {
        return Err(ContractError::InvalidNonce { expected, got: tx.nonce });
    }
    Ok(())
}

/// Verifies the envelope of `tx` and applies its instruction.
///
/// The instruction runs against a staged copy of the state which replaces
/// `ctx.state` only on success, so a failing transaction leaves no trace, nonce
/// included.
pub fn execute_transaction(tx: &Transaction, ctx: &mut ExecutionContext) -> Result<(), ContractError> {
    // 1. Signature and nonce
    check_envelope(tx, ctx.state)?;
    let expected = tx.nonce;

    // 2. Execute Instruction
    let mut staged = ctx.state.clone();
    let events = {
        let mut inner = ExecutionContext::new(&mut staged, &mut *ctx.fhe);
        execute_instruction(&tx.instruction, &tx.sender, &mut inner)?;
        inner.events
    };
    staged.nonces.insert(tx.sender, expected + 1);

    *ctx.state = staged;
    ctx.events.extend(events);
    Ok(())
}

/// Dispatches one instruction on behalf of `caller`. Callers needing atomicity on
/// failure go through [`execute_transaction`].
pub fn execute_instruction(
    instruction: &ContractInstruction,
    caller: &Address,
    ctx: &mut ExecutionContext,
) -> Result<(), ContractError> {
    let result = match instruction {
        ContractInstruction::RegisterDriver { driver } => registry::register_driver(ctx, caller, *driver),
        ContractInstruction::BatchRegisterDrivers { drivers } => {
            registry::batch_register_drivers(ctx, caller, drivers)
        }
        ContractInstruction::SubmitOrderCount { driver, handle, proof } => {
            engine::submit_order_count(ctx, caller, *driver, handle, proof)
        }
        ContractInstruction::EvaluatePerformance { driver } => engine::evaluate_performance(ctx, *driver),
        ContractInstruction::SetTargetThreshold { threshold } => {
            engine::set_target_threshold(ctx, caller, *threshold)
        }
        ContractInstruction::Pause => access::pause(ctx, caller),
        ContractInstruction::Unpause => access::unpause(ctx, caller),
        ContractInstruction::TransferOwnership { new_owner } => {
            access::transfer_ownership(ctx, caller, *new_owner)
        }
        ContractInstruction::RenounceOwnership => access::renounce_ownership(ctx, caller),
    };

    match &result {
        Ok(()) => info!(instruction = instruction.name(), caller = %caller.short(), "instruction applied"),
        Err(e) => info!(instruction = instruction.name(), caller = %caller.short(), error = %e, "instruction rejected"),
    }
    result
}
