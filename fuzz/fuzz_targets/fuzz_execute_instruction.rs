#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use perfseal_crypto::fhe::MockCoprocessor;
use perfseal_execution::{execute_instruction, registry, ExecutionContext};
use perfseal_types::{Address, ContractInstruction, ContractState, InputProof, SubmissionPolicy};

#[derive(Arbitrary, Debug)]
enum Op {
    Register { driver: u8 },
    Batch { drivers: Vec<u8> },
    Submit { driver: u8, count: u32, forge: bool },
    Evaluate { driver: u8 },
    SetThreshold { threshold: u32 },
    Pause,
    Unpause,
    Transfer { to: u8 },
    Renounce,
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    open_submissions: bool,
    steps: Vec<(u8, Op)>,
}

// Small address space so duplicates and owner hits are common; 0 maps to the zero address.
fn addr(n: u8) -> Address {
    Address([n % 8; 32])
}

fuzz_target!(|data: FuzzInput| {
    let policy = if data.open_submissions {
        SubmissionPolicy::Open
    } else {
        SubmissionPolicy::RegisteredOnly
    };
    let contract = Address([0xc0; 32]);
    let mut state = ContractState::new(contract, addr(1), 100, policy);
    let mut fhe = MockCoprocessor::new([7u8; 32]);

    for (caller, op) in data.steps.into_iter().take(64) {
        let caller = addr(caller);
        let instruction = match op {
            Op::Register { driver } => ContractInstruction::RegisterDriver { driver: addr(driver) },
            Op::Batch { drivers } => ContractInstruction::BatchRegisterDrivers {
                drivers: drivers.into_iter().take(128).map(addr).collect(),
            },
            Op::Submit { driver, count, forge } => {
                let driver = addr(driver);
                let input = fhe.encrypt_u32(&contract, &caller, count);
                let proof = if forge { InputProof(vec![0u8; 32]) } else { input.proof };
                ContractInstruction::SubmitOrderCount { driver, handle: input.handle, proof }
            }
            Op::Evaluate { driver } => ContractInstruction::EvaluatePerformance { driver: addr(driver) },
            Op::SetThreshold { threshold } => ContractInstruction::SetTargetThreshold { threshold },
            Op::Pause => ContractInstruction::Pause,
            Op::Unpause => ContractInstruction::Unpause,
            Op::Transfer { to } => ContractInstruction::TransferOwnership { new_owner: addr(to) },
            Op::Renounce => ContractInstruction::RenounceOwnership,
        };

        let before = state.clone();
        let count_before = registry::registered_driver_count(&state);
        let result = {
            let mut ctx = ExecutionContext::new(&mut state, &mut fhe);
            execute_instruction(&instruction, &caller, &mut ctx)
        };

        match result {
            Err(_) => assert_eq!(state, before, "failed call mutated state"),
            Ok(()) => {
                if let ContractInstruction::SubmitOrderCount { driver, .. } = &instruction {
                    assert!(*driver == caller || before.owner == Some(caller), "submission by a third party");
                }
                if let ContractInstruction::BatchRegisterDrivers { drivers } = &instruction {
                    assert!(!drivers.is_empty() && drivers.len() <= 100);
                    assert_eq!(registry::registered_driver_count(&state), count_before + drivers.len() as u64);
                }
                if matches!(instruction, ContractInstruction::Pause | ContractInstruction::Unpause) {
                    assert_ne!(state.paused, before.paused);
                }
            }
        }

        let listed: Vec<Address> = state.drivers.iter().copied().collect();
        let mut unique = listed.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), listed.len(), "duplicate driver in registry");
        assert!(!state.drivers.contains(&Address::ZERO));
        for slots in state.performance.values() {
            if !slots.result.is_empty() {
                assert!(!slots.order_count.is_empty(), "result without a submission");
            }
        }
    }
});
