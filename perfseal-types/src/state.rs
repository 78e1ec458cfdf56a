use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, HashSet};
use crate::address::Address;
use crate::handle::HandleSlot;

/// Whether an order count may be submitted for an address that is not in the registry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionPolicy {
    #[default]
    RegisteredOnly,
    Open,
}

/// Where a driver sits in the submit/evaluate lifecycle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    NoSubmission,
    Submitted,
    Evaluated,
}

/// Insertion-ordered, deduplicated set of driver addresses.
///
/// Only the ordered list is serialized; the membership index is rebuilt on load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Address>", into = "Vec<Address>")]
pub struct DriverSet {
    order: Vec<Address>,
    index: HashSet<Address>,
}

impl DriverSet {
    pub fn contains(&self, driver: &Address) -> bool {
        self.index.contains(driver)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Appends `driver` unless already present. Returns whether it was added.
    pub fn insert(&mut self, driver: Address) -> bool {
        if !self.index.insert(driver) {
            return false;
        }
        self.order.push(driver);
        true
    }

    /// Window of at most `limit` addresses starting at `offset`, clamped to the end.
    pub fn window(&self, offset: usize, limit: usize) -> &[Address] {
        let start = offset.min(self.order.len());
        let end = start.saturating_add(limit).min(self.order.len());
        &self.order[start..end]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.order.iter()
    }
}

impl From<Vec<Address>> for DriverSet {
    fn from(list: Vec<Address>) -> Self {
        let mut set = DriverSet::default();
        for driver in list {
            set.insert(driver);
        }
        set
    }
}

impl From<DriverSet> for Vec<Address> {
    fn from(set: DriverSet) -> Self {
        set.order
    }
}

impl PartialEq for DriverSet {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

/// The two single-value ciphertext slots kept per driver.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct PerformanceSlots {
    pub order_count: HandleSlot,
    pub result: HandleSlot,
    /// Set on submission and cleared by evaluation, so a result read after a fresh
    /// submission can be recognized as stale.
    pub result_stale: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContractState {
    /// Binding target of encrypted input proofs.
    pub contract_id: Address,
    pub owner: Option<Address>,
    pub paused: bool,
    pub target_threshold: u32,
    pub submission_policy: SubmissionPolicy,
    pub drivers: DriverSet,
    pub performance: BTreeMap<Address, PerformanceSlots>,
    pub nonces: BTreeMap<Address, u64>,
}

impl ContractState {
    pub fn new(
        contract_id: Address,
        owner: Address,
        target_threshold: u32,
        submission_policy: SubmissionPolicy,
    ) -> Self {
        Self {
            contract_id,
            owner: Some(owner),
            paused: false,
            target_threshold,
            submission_policy,
            drivers: DriverSet::default(),
            performance: BTreeMap::new(),
            nonces: BTreeMap::new(),
        }
    }

    pub fn nonce_of(&self, account: &Address) -> u64 {
        self.nonces.get(account).copied().unwrap_or(0)
    }

    pub fn slots(&self, driver: &Address) -> PerformanceSlots {
        self.performance.get(driver).copied().unwrap_or_default()
    }

    pub fn root_hash(&self) -> [u8; 32] {
        let encoded = bincode::serialize(self).expect("contract state serialization");
        *blake3::hash(&encoded).as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address([b; 32])
    }

    #[test]
    fn driver_set_keeps_insertion_order_and_rejects_duplicates() {
        let mut set = DriverSet::default();
        assert!(set.insert(addr(3)));
        assert!(set.insert(addr(1)));
        assert!(!set.insert(addr(3)));
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![addr(3), addr(1)]);
    }

    #[test]
    fn window_clamps_to_the_end() {
        let set: DriverSet = (1..=5).map(addr).collect::<Vec<_>>().into();
        assert_eq!(set.window(1, 2), &[addr(2), addr(3)]);
        assert_eq!(set.window(3, 10), &[addr(4), addr(5)]);
        assert!(set.window(5, 10).is_empty());
        assert!(set.window(2, 0).is_empty());
        assert_eq!(set.window(0, usize::MAX).len(), 5);
    }

    #[test]
    fn membership_index_survives_a_bincode_round_trip() {
        let mut state = ContractState::new(addr(9), addr(1), 10, SubmissionPolicy::RegisteredOnly);
        state.drivers.insert(addr(4));
        state.drivers.insert(addr(2));

        let bytes = bincode::serialize(&state).unwrap();
        let loaded: ContractState = bincode::deserialize(&bytes).unwrap();

        assert!(loaded.drivers.contains(&addr(4)));
        assert!(loaded.drivers.contains(&addr(2)));
        assert!(!loaded.drivers.contains(&addr(1)));
        assert_eq!(loaded, state);
        assert_eq!(loaded.root_hash(), state.root_hash());
    }

    #[test]
    fn root_hash_tracks_state_changes() {
        let mut state = ContractState::new(addr(9), addr(1), 10, SubmissionPolicy::Open);
        let before = state.root_hash();
        state.target_threshold = 11;
        assert_ne!(state.root_hash(), before);
    }
}
