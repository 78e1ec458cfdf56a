use crate::access::{ensure_not_paused, ensure_owner};
use crate::ExecutionContext;
use perfseal_types::{Address, ContractError, ContractEvent, ContractState, MAX_BATCH_SIZE};
use std::collections::HashSet;

fn check_new_driver(state: &ContractState, driver: &Address) -> Result<(), ContractError> {
    if driver.is_zero() {
        return Err(ContractError::InvalidAddress);
    }
    if state.drivers.contains(driver) {
        return Err(ContractError::DriverAlreadyRegistered(*driver));
    }
    Ok(())
}

pub fn register_driver(
    ctx: &mut ExecutionContext,
    caller: &Address,
    driver: Address,
) -> Result<(), ContractError> {
    ensure_owner(ctx.state, caller)?;
    ensure_not_paused(ctx.state)?;
    check_new_driver(ctx.state, &driver)?;

    ctx.state.drivers.insert(driver);
    ctx.emit(ContractEvent::DriverRegistered { driver });
    Ok(())
}

/// Registers every driver in `drivers` or none of them.
pub fn batch_register_drivers(
    ctx: &mut ExecutionContext,
    caller: &Address,
    drivers: &[Address],
) -> Result<(), ContractError> {
    ensure_owner(ctx.state, caller)?;
    ensure_not_paused(ctx.state)?;
    if drivers.is_empty() {
        return Err(ContractError::EmptyDriverList);
    }
    if drivers.len() > MAX_BATCH_SIZE {
        return Err(ContractError::BatchSizeTooLarge {
            len: drivers.len(),
            max: MAX_BATCH_SIZE,
        });
    }

    // Stage first: a duplicate later in the batch must not leave earlier entries applied.
    let mut staged = Vec::with_capacity(drivers.len());
    let mut seen = HashSet::with_capacity(drivers.len());
    for driver in drivers {
        check_new_driver(ctx.state, driver)?;
        if !seen.insert(*driver) {
            return Err(ContractError::DriverAlreadyRegistered(*driver));
        }
        staged.push(*driver);
    }

    for driver in staged {
        ctx.state.drivers.insert(driver);
        ctx.emit(ContractEvent::DriverRegistered { driver });
    }
    Ok(())
}

pub fn is_driver_registered(state: &ContractState, driver: &Address) -> bool {
    state.drivers.contains(driver)
}

pub fn registered_driver_count(state: &ContractState) -> u64 {
    state.drivers.len() as u64
}

/// Up to `limit` drivers from position `offset`, in registration order.
///
/// The last page may be shorter than `limit`.
pub fn registered_drivers(
    state: &ContractState,
    offset: u64,
    limit: u64,
) -> Result<Vec<Address>, ContractError> {
    let count = registered_driver_count(state);
    if offset >= count {
        return Err(ContractError::OffsetOutOfBounds { offset, count });
    }
    // offset < count, so it fits in usize.
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    Ok(state.drivers.window(offset as usize, limit).to_vec())
}
