//! Single-owner authorization and the pause switch.
//!
//! The two gates are independent: [`ensure_owner`] answers "who may call",
//! [`ensure_not_paused`] answers "may anything mutate right now". Operations pick
//! whichever they need, authorization first.

use crate::ExecutionContext;
use perfseal_types::{Address, ContractError, ContractEvent, ContractState};
use tracing::warn;

pub fn ensure_owner(state: &ContractState, caller: &Address) -> Result<(), ContractError> {
    match state.owner {
        Some(owner) if owner == *caller => Ok(()),
        _ => Err(ContractError::UnauthorizedAccess),
    }
}

pub fn ensure_not_paused(state: &ContractState) -> Result<(), ContractError> {
    if state.paused {
        return Err(ContractError::ContractPaused);
    }
    Ok(())
}

pub fn ensure_paused(state: &ContractState) -> Result<(), ContractError> {
    if !state.paused {
        return Err(ContractError::ContractNotPaused);
    }
    Ok(())
}

pub fn owner(state: &ContractState) -> Option<Address> {
    state.owner
}

pub fn is_paused(state: &ContractState) -> bool {
    state.paused
}

pub fn pause(ctx: &mut ExecutionContext, caller: &Address) -> Result<(), ContractError> {
    ensure_owner(ctx.state, caller)?;
    ensure_not_paused(ctx.state)?;
    ctx.state.paused = true;
    ctx.emit(ContractEvent::ContractPaused { by: *caller });
    Ok(())
}

pub fn unpause(ctx: &mut ExecutionContext, caller: &Address) -> Result<(), ContractError> {
    ensure_owner(ctx.state, caller)?;
    ensure_paused(ctx.state)?;
    ctx.state.paused = false;
    ctx.emit(ContractEvent::ContractUnpaused { by: *caller });
    Ok(())
}

pub fn transfer_ownership(
    ctx: &mut ExecutionContext,
    caller: &Address,
    new_owner: Address,
) -> Result<(), ContractError> {
    ensure_owner(ctx.state, caller)?;
    if new_owner.is_zero() {
        return Err(ContractError::InvalidAddress);
    }
    let previous_owner = ctx.state.owner.replace(new_owner);
    ctx.emit(ContractEvent::OwnershipTransferred {
        previous_owner,
        new_owner: Some(new_owner),
    });
    Ok(())
}

/// Irreversible: no owner-gated call can succeed afterwards.
pub fn renounce_ownership(ctx: &mut ExecutionContext, caller: &Address) -> Result<(), ContractError> {
    ensure_owner(ctx.state, caller)?;
    let previous_owner = ctx.state.owner.take();
    warn!(previous = %caller.short(), "ownership renounced");
    ctx.emit(ContractEvent::OwnershipTransferred {
        previous_owner,
        new_owner: None,
    });
    Ok(())
}
