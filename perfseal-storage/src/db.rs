#[cfg(feature = "rocksdb")]
use rocksdb::{DB, Options, WriteBatch};
use anyhow::{anyhow, Context, Result};
use perfseal_crypto::fhe::MockCoprocessor;
use perfseal_types::{ContractState, Receipt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::info;

const STATE_KEY: &str = "contract_state";
const COPROCESSOR_KEY: &str = "coprocessor";
const TIP_KEY: &str = "tip";

fn receipt_key(seq: u64) -> String {
    format!("receipt_{:020}", seq)
}

fn tx_index_key(tx_id: &[u8; 32]) -> String {
    format!("tx_{}", hex::encode(tx_id))
}

enum Backend {
    #[cfg(feature = "rocksdb")]
    Rocks(DB),
    Sled(sled::Db),
}

pub struct Storage {
    backend: Backend,
}

impl Storage {
    /// Opens the store at `path`: RocksDB when built with the `rocksdb` feature, sled otherwise.
    pub fn new(path: &str) -> Result<Self> {
        #[cfg(feature = "rocksdb")]
        {
            let mut opts = Options::default();
            opts.create_if_missing(true);
            let db = DB::open(&opts, path).map_err(|e| anyhow!("Failed to open DB: {}", e))?;
            Ok(Self { backend: Backend::Rocks(db) })
        }
        #[cfg(not(feature = "rocksdb"))]
        {
            Self::open_sled(path)
        }
    }

    pub fn open_sled(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .with_context(|| format!("Could not open database at path '{}'", path.display()))?;
        if db.was_recovered() {
            info!("Recovered db at {}", path.display());
        } else {
            info!("Created db at {}", path.display());
        }
        Ok(Self { backend: Backend::Sled(db) })
    }

    /// Writes every entry or none of them, and makes the write durable before returning.
    fn put_all(&self, entries: &[(String, Vec<u8>)]) -> Result<()> {
        match &self.backend {
            #[cfg(feature = "rocksdb")]
            Backend::Rocks(db) => {
                let mut batch = WriteBatch::default();
                for (key, value) in entries {
                    batch.put(key.as_bytes(), value);
                }
                db.write(batch).map_err(|e| anyhow!("DB write error: {}", e))
            }
            Backend::Sled(db) => {
                let mut batch = sled::Batch::default();
                for (key, value) in entries {
                    batch.insert(key.as_bytes(), value.as_slice());
                }
                db.apply_batch(batch).map_err(|e| anyhow!("DB write error: {}", e))?;
                db.flush().map_err(|e| anyhow!("DB flush error: {}", e))?;
                Ok(())
            }
        }
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match &self.backend {
            #[cfg(feature = "rocksdb")]
            Backend::Rocks(db) => db.get(key.as_bytes()).map_err(|e| anyhow!("DB read error: {}", e)),
            Backend::Sled(db) => db
                .get(key.as_bytes())
                .map(|value| value.map(|bytes| bytes.to_vec()))
                .map_err(|e| anyhow!("DB read error: {}", e)),
        }
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => {
                let decoded = bincode::deserialize(&bytes)
                    .map_err(|e| anyhow!("Deserialization error for {}: {}", key, e))?;
                Ok(Some(decoded))
            }
            None => Ok(None),
        }
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| anyhow!("Serialization error: {}", e))
    }

    fn receipt_entries(receipt: &Receipt) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(vec![
            (receipt_key(receipt.seq), Self::encode(receipt)?),
            (tx_index_key(&receipt.tx_id), Self::encode(&receipt.seq)?),
            (TIP_KEY.to_string(), Self::encode(&receipt.seq)?),
        ])
    }

    pub fn save_state(&self, state: &ContractState) -> Result<()> {
        self.put_all(&[(STATE_KEY.to_string(), Self::encode(state)?)])
    }

    /// `None` on a fresh store.
    pub fn load_state(&self) -> Result<Option<ContractState>> {
        self.load(STATE_KEY)
    }

    pub fn save_coprocessor(&self, coprocessor: &MockCoprocessor) -> Result<()> {
        self.put_all(&[(COPROCESSOR_KEY.to_string(), Self::encode(coprocessor)?)])
    }

    pub fn load_coprocessor(&self) -> Result<Option<MockCoprocessor>> {
        self.load(COPROCESSOR_KEY)
    }

    /// Persists an applied transaction: receipt, tx index, tip, state and coprocessor in
    /// one atomic batch.
    pub fn commit(&self, state: &ContractState, coprocessor: &MockCoprocessor, receipt: &Receipt) -> Result<()> {
        let mut entries = Self::receipt_entries(receipt)?;
        entries.push((COPROCESSOR_KEY.to_string(), Self::encode(coprocessor)?));
        entries.push((STATE_KEY.to_string(), Self::encode(state)?));
        self.put_all(&entries)
    }

    /// Persists the receipt of a sequenced call that failed; state is left as is.
    pub fn commit_rejection(&self, receipt: &Receipt) -> Result<()> {
        self.put_all(&Self::receipt_entries(receipt)?)
    }

    pub fn load_receipt(&self, seq: u64) -> Result<Option<Receipt>> {
        self.load(&receipt_key(seq))
    }

    pub fn load_receipt_by_tx(&self, tx_id: &[u8; 32]) -> Result<Option<Receipt>> {
        match self.load::<u64>(&tx_index_key(tx_id))? {
            Some(seq) => self.load_receipt(seq),
            None => Ok(None),
        }
    }

    /// Sequence number of the last committed transaction.
    pub fn load_tip(&self) -> Result<Option<u64>> {
        self.load(TIP_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfseal_types::{Address, ContractEvent, ContractError, ReceiptStatus, SubmissionPolicy};

    fn sample_state() -> ContractState {
        let mut state = ContractState::new(Address([9u8; 32]), Address([1u8; 32]), 10, SubmissionPolicy::RegisteredOnly);
        state.drivers.insert(Address([2u8; 32]));
        state.drivers.insert(Address([3u8; 32]));
        state
    }

    #[test]
    fn fresh_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open_sled(dir.path()).unwrap();
        assert!(storage.load_state().unwrap().is_none());
        assert!(storage.load_coprocessor().unwrap().is_none());
        assert!(storage.load_tip().unwrap().is_none());
        assert!(storage.load_receipt(0).unwrap().is_none());
    }

    #[test]
    fn commit_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let state = sample_state();
        let coprocessor = MockCoprocessor::new([5u8; 32]);
        let receipt = Receipt {
            seq: 7,
            tx_id: [4u8; 32],
            status: ReceiptStatus::Success {
                events: vec![ContractEvent::DriverRegistered { driver: Address([3u8; 32]) }],
            },
            state_root: state.root_hash(),
        };

        {
            let storage = Storage::open_sled(dir.path()).unwrap();
            storage.commit(&state, &coprocessor, &receipt).unwrap();
        }

        let storage = Storage::open_sled(dir.path()).unwrap();
        let loaded = storage.load_state().unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(loaded.drivers.contains(&Address([2u8; 32])));
        assert_eq!(storage.load_coprocessor().unwrap(), Some(coprocessor));
        assert_eq!(storage.load_tip().unwrap(), Some(7));
        assert_eq!(storage.load_receipt(7).unwrap(), Some(receipt.clone()));
        assert_eq!(storage.load_receipt_by_tx(&[4u8; 32]).unwrap(), Some(receipt));
        assert!(storage.load_receipt_by_tx(&[5u8; 32]).unwrap().is_none());
    }

    #[test]
    fn rejection_moves_the_tip_but_not_the_state() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open_sled(dir.path()).unwrap();
        let state = sample_state();
        storage.save_state(&state).unwrap();

        let receipt = Receipt {
            seq: 1,
            tx_id: [8u8; 32],
            status: ReceiptStatus::Failed { error: ContractError::ContractPaused },
            state_root: state.root_hash(),
        };
        storage.commit_rejection(&receipt).unwrap();

        let loaded = storage.load_receipt(1).unwrap().unwrap();
        assert_eq!(loaded.error(), Some(&ContractError::ContractPaused));
        assert_eq!(storage.load_tip().unwrap(), Some(1));
        assert_eq!(storage.load_state().unwrap(), Some(state));
        assert!(storage.load_coprocessor().unwrap().is_none());
    }

    #[test]
    fn corrupt_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open_sled(dir.path()).unwrap();
        storage
            .put_all(&[(STATE_KEY.to_string(), b"not bincode".to_vec())])
            .unwrap();
        assert!(storage.load_state().is_err());
    }
}
