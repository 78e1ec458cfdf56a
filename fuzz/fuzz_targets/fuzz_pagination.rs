#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use perfseal_types::{Address, ContractError, ContractState, SubmissionPolicy};
use perfseal_execution::registry;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    drivers: Vec<[u8; 32]>,
    offset: u64,
    limit: u64,
}

fuzz_target!(|data: FuzzInput| {
    let mut state = ContractState::new(Address([0xc0; 32]), Address([1u8; 32]), 100, SubmissionPolicy::RegisteredOnly);
    for raw in data.drivers.into_iter().take(512) {
        let driver = Address(raw);
        if !driver.is_zero() {
            state.drivers.insert(driver);
        }
    }
    let count = registry::registered_driver_count(&state);
    let offset = data.offset % (count + 2);

    match registry::registered_drivers(&state, offset, data.limit) {
        Ok(page) => {
            assert!(offset < count);
            let expected = std::cmp::min(data.limit, count - offset);
            assert_eq!(page.len() as u64, expected);
            let all: Vec<Address> = state.drivers.iter().copied().collect();
            assert_eq!(&page[..], &all[offset as usize..offset as usize + page.len()]);
        }
        Err(e) => {
            assert_eq!(e, ContractError::OffsetOutOfBounds { offset, count });
        }
    }
});
