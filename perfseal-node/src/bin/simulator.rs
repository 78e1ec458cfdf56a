use perfseal_crypto::fhe::{Decryptor, MockCoprocessor};
use perfseal_crypto::signatures::{address_of, generate_keypair, sign_transaction, SigningKey};
use perfseal_execution::{execute_transaction, ExecutionContext};
use perfseal_genesis::{create_genesis_state, GenesisConfig};
use perfseal_types::{Address, ContractInstruction, ContractState, Transaction, MAX_BATCH_SIZE};
use rand::Rng;
use std::time::Instant;

struct Sim {
    state: ContractState,
    fhe: MockCoprocessor,
    successful: u64,
    failed: u64,
}

impl Sim {
    fn send(&mut self, key: &SigningKey, instruction: ContractInstruction) {
        let sender = address_of(key);
        let mut tx = Transaction::new(sender, self.state.nonce_of(&sender), instruction);
        sign_transaction(key, &mut tx);

        let mut staged = self.state.clone();
        let mut ctx = ExecutionContext::new(&mut staged, &mut self.fhe);
        match execute_transaction(&tx, &mut ctx) {
            Ok(()) => {
                self.state = staged;
                self.successful += 1;
            }
            Err(_) => self.failed += 1,
        }
    }
}

fn main() {
    println!("--- PerfSeal Driver Performance Simulator ---");

    let num_drivers = 1_000;
    let owner = generate_keypair();
    let drivers: Vec<SigningKey> = (0..num_drivers).map(|_| generate_keypair()).collect();
    let addresses: Vec<Address> = drivers.iter().map(address_of).collect();

    let mut genesis = GenesisConfig::new(address_of(&owner));
    genesis.target_threshold = 100;
    let mut sim = Sim {
        state: create_genesis_state(&genesis),
        fhe: MockCoprocessor::generate(),
        successful: 0,
        failed: 0,
    };
    let contract = sim.state.contract_id;
    let mut rng = rand::thread_rng();

    let start_time = Instant::now();

    println!("Registering {} drivers in batches of {}...", num_drivers, MAX_BATCH_SIZE);
    for chunk in addresses.chunks(MAX_BATCH_SIZE) {
        sim.send(&owner, ContractInstruction::BatchRegisterDrivers { drivers: chunk.to_vec() });
    }

    println!("Submitting and evaluating encrypted order counts...");
    let mut expected_meeting = 0;
    for (key, driver) in drivers.iter().zip(&addresses) {
        let orders: u32 = rng.gen_range(0..200);
        if orders >= genesis.target_threshold {
            expected_meeting += 1;
        }
        let input = sim.fhe.encrypt_u32(&contract, driver, orders);
        sim.send(
            key,
            ContractInstruction::SubmitOrderCount {
                driver: *driver,
                handle: input.handle,
                proof: input.proof,
            },
        );
        sim.send(key, ContractInstruction::EvaluatePerformance { driver: *driver });
    }

    let elapsed = start_time.elapsed();
    let total = sim.successful + sim.failed;

    let mut meeting = 0;
    for driver in &addresses {
        if let Some(handle) = sim.state.slots(driver).result.handle() {
            if matches!(sim.fhe.user_decrypt_bool(handle, driver), Ok(true)) {
                meeting += 1;
            }
        }
    }

    println!("--- Simulation Complete ---");
    println!("Executed {} transactions in {:.2?}", total, elapsed);
    println!("Throughput: {:.2} TPS", total as f64 / elapsed.as_secs_f64());
    println!("Successful: {}", sim.successful);
    println!("Failed: {}", sim.failed);
    println!("Registered drivers: {}", sim.state.drivers.len());
    println!("Drivers meeting target: {} (expected {})", meeting, expected_meeting);
}
