use crate::access::{ensure_not_paused, ensure_owner};
use crate::ExecutionContext;
use perfseal_types::{
    Address, CiphertextHandle, ContractError, ContractEvent, ContractState, DriverStatus, FheType,
    HandleSlot, InputProof, SubmissionPolicy,
};
use tracing::debug;

/// Stores a verified encrypted order count for `driver`, replacing any earlier one.
///
/// The caller must be the driver itself or the owner acting as operator, and the proof
/// must bind the handle to this contract and to the caller.
pub fn submit_order_count(
    ctx: &mut ExecutionContext,
    caller: &Address,
    driver: Address,
    handle: &CiphertextHandle,
    proof: &InputProof,
) -> Result<(), ContractError> {
    if *caller != driver {
        ensure_owner(ctx.state, caller)?;
    }
    ensure_not_paused(ctx.state)?;
    if driver.is_zero() {
        return Err(ContractError::InvalidAddress);
    }
    if ctx.state.submission_policy == SubmissionPolicy::RegisteredOnly && !ctx.state.drivers.contains(&driver) {
        return Err(ContractError::DriverNotRegistered(driver));
    }

    let contract = ctx.state.contract_id;
    let handle = ctx
        .fhe
        .verify_input(handle, proof, FheType::Uint32, &contract, caller)
        .map_err(ContractError::ProofRejected)?;
    ctx.fhe.allow(&handle, &driver).map_err(ContractError::Fhe)?;

    let slots = ctx.state.performance.entry(driver).or_default();
    slots.order_count = HandleSlot::Present(handle);
    slots.result_stale = !slots.result.is_empty();

    debug!(driver = %driver.short(), submitter = %caller.short(), handle = %handle.short(), "order count stored");
    ctx.emit(ContractEvent::OrderCountSubmitted { driver, handle });
    Ok(())
}

/// Compares the stored order count with the current threshold under encryption and
/// stores the encrypted verdict. Open to any caller.
pub fn evaluate_performance(ctx: &mut ExecutionContext, driver: Address) -> Result<(), ContractError> {
    ensure_not_paused(ctx.state)?;
    let order_count = match ctx.state.slots(&driver).order_count {
        HandleSlot::Present(handle) => handle,
        HandleSlot::Empty => return Err(ContractError::NoSubmission(driver)),
    };

    let contract = ctx.state.contract_id;
    let threshold = ctx.state.target_threshold;
    let result = ctx
        .fhe
        .ge_scalar(&contract, &order_count, threshold)
        .map_err(ContractError::Fhe)?;

    ctx.fhe.allow(&result, &driver).map_err(ContractError::Fhe)?;
    if let Some(owner) = ctx.state.owner {
        ctx.fhe.allow(&result, &owner).map_err(ContractError::Fhe)?;
    }

    let slots = ctx.state.performance.entry(driver).or_default();
    slots.result = HandleSlot::Present(result);
    slots.result_stale = false;

    debug!(driver = %driver.short(), result = %result.short(), threshold, "performance evaluated");
    ctx.emit(ContractEvent::PerformanceEvaluated { driver, result });
    Ok(())
}

/// Owner only, allowed while paused. Stored results are not re-evaluated.
pub fn set_target_threshold(
    ctx: &mut ExecutionContext,
    caller: &Address,
    threshold: u32,
) -> Result<(), ContractError> {
    ensure_owner(ctx.state, caller)?;
    let old = std::mem::replace(&mut ctx.state.target_threshold, threshold);
    ctx.emit(ContractEvent::TargetThresholdUpdated { old, new: threshold });
    Ok(())
}

pub fn target_threshold(state: &ContractState) -> u32 {
    state.target_threshold
}

/// `HandleSlot::Empty` until the driver has been evaluated once.
pub fn performance_result(state: &ContractState, driver: &Address) -> HandleSlot {
    state.slots(driver).result
}

pub fn order_count_handle(state: &ContractState, driver: &Address) -> HandleSlot {
    state.slots(driver).order_count
}

pub fn driver_status(state: &ContractState, driver: &Address) -> DriverStatus {
    let slots = state.slots(driver);
    match (slots.order_count, slots.result) {
        (HandleSlot::Empty, _) => DriverStatus::NoSubmission,
        (HandleSlot::Present(_), HandleSlot::Present(_)) if !slots.result_stale => DriverStatus::Evaluated,
        (HandleSlot::Present(_), _) => DriverStatus::Submitted,
    }
}
