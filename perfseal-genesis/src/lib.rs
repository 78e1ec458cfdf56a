use perfseal_types::{Address, ContractState, SubmissionPolicy};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Threshold used when none is configured.
pub const DEFAULT_THRESHOLD: u32 = 100;

const CONTRACT_ID_DOMAIN: &[u8] = b"perfseal.contract-id";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GenesisConfig {
    pub owner: Address,
    #[serde(default = "default_threshold")]
    pub target_threshold: u32,
    #[serde(default)]
    pub submission_policy: SubmissionPolicy,
    /// Derived from the owner and `salt` when absent.
    #[serde(default)]
    pub contract_id: Option<Address>,
    #[serde(default)]
    pub salt: u64,
}

fn default_threshold() -> u32 {
    DEFAULT_THRESHOLD
}

impl GenesisConfig {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            target_threshold: DEFAULT_THRESHOLD,
            submission_policy: SubmissionPolicy::default(),
            contract_id: None,
            salt: 0,
        }
    }

    pub fn contract_id(&self) -> Address {
        self.contract_id
            .unwrap_or_else(|| derive_contract_id(&self.owner, self.salt))
    }
}

/// Deterministic instance id: the same deployer and salt always yield the same id.
pub fn derive_contract_id(deployer: &Address, salt: u64) -> Address {
    let mut hasher = blake3::Hasher::new();
    hasher.update(CONTRACT_ID_DOMAIN);
    hasher.update(deployer.as_bytes());
    hasher.update(&salt.to_le_bytes());
    Address(*hasher.finalize().as_bytes())
}

pub fn create_genesis_state(config: &GenesisConfig) -> ContractState {
    let contract_id = config.contract_id();
    info!(
        contract = %contract_id,
        owner = %config.owner,
        threshold = config.target_threshold,
        policy = ?config.submission_policy,
        "creating genesis state"
    );
    ContractState::new(
        contract_id,
        config.owner,
        config.target_threshold,
        config.submission_policy,
    )
}
