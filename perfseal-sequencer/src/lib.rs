use perfseal_crypto::fhe::{EncryptedInput, MockCoprocessor};
use perfseal_execution::{check_envelope, execute_transaction, ExecutionContext};
use perfseal_storage::db::Storage;
use perfseal_types::{Address, ContractError, ContractState, Receipt, ReceiptStatus, Transaction};
use tokio::sync::{mpsc, oneshot, RwLock};
use std::sync::Arc;
use tracing::{info, error, warn};
use anyhow::{Result, Context};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmitError {
    /// Bad signature or nonce. The transaction was not sequenced.
    #[error("Transaction refused: {0}")]
    Envelope(ContractError),
    #[error("Sequencer is not running")]
    Stopped,
    #[error("Sequencer dropped the request")]
    Dropped,
}

/// Work for the single writer, plus where to send the outcome.
pub enum Request {
    Transaction {
        tx: Transaction,
        reply: oneshot::Sender<Result<Receipt, SubmitError>>,
    },
    /// Relayer encryption; mints a ciphertext in the shared coprocessor.
    EncryptInput {
        user: Address,
        value: u32,
        reply: oneshot::Sender<EncryptedInput>,
    },
}

/// Cloneable entry point to the mutation queue.
#[derive(Clone)]
pub struct SequencerHandle {
    tx_sender: mpsc::Sender<Request>,
}

impl SequencerHandle {
    pub fn new(tx_sender: mpsc::Sender<Request>) -> Self {
        Self { tx_sender }
    }

    /// Queues `tx` and waits until it has been applied (or rejected) and persisted.
    pub async fn submit(&self, tx: Transaction) -> Result<Receipt, SubmitError> {
        let (reply, outcome) = oneshot::channel();
        self.tx_sender
            .send(Request::Transaction { tx, reply })
            .await
            .map_err(|_| SubmitError::Stopped)?;
        outcome.await.map_err(|_| SubmitError::Dropped)?
    }

    /// Encrypts `value` for `user` and waits until the new ciphertext is persisted.
    pub async fn encrypt_input(&self, user: Address, value: u32) -> Result<EncryptedInput, SubmitError> {
        let (reply, outcome) = oneshot::channel();
        self.tx_sender
            .send(Request::EncryptInput { user, value, reply })
            .await
            .map_err(|_| SubmitError::Stopped)?;
        outcome.await.map_err(|_| SubmitError::Dropped)
    }
}

/// Single writer of the contract state and the coprocessor.
///
/// Requests are handled one at a time, in arrival order. Each transaction runs
/// against staged copies; the shared values are swapped only after the outcome is
/// persisted, so readers never see a half-applied call. Transactions with a bad
/// signature or nonce are refused before they get a sequence number.
pub struct Sequencer {
    state: Arc<RwLock<ContractState>>,
    coprocessor: Arc<RwLock<MockCoprocessor>>,
    storage: Arc<Storage>,
    tx_rx: mpsc::Receiver<Request>,
    next_seq: u64,
}

impl Sequencer {
    pub fn new(
        state: Arc<RwLock<ContractState>>,
        coprocessor: Arc<RwLock<MockCoprocessor>>,
        storage: Arc<Storage>,
        tx_rx: mpsc::Receiver<Request>,
    ) -> Result<Self> {
        let next_seq = match storage.load_tip().context("load_tip")? {
            Some(tip) => {
                info!("Recovered sequence tip {}", tip);
                tip + 1
            }
            None => 0,
        };
        Ok(Self {
            state,
            coprocessor,
            storage,
            tx_rx,
            next_seq,
        })
    }

    pub async fn run(mut self) {
        info!("Starting sequencer at seq {}", self.next_seq);

        while let Some(request) = self.tx_rx.recv().await {
            match request {
                Request::Transaction { tx, reply } => {
                    let checked = check_envelope(&tx, &*self.state.read().await);
                    let outcome = match checked {
                        Err(e) => {
                            info!("Refused tx {}: {}", hex::encode(tx.id()), e);
                            Err(SubmitError::Envelope(e))
                        }
                        Ok(()) => match self.apply(&tx).await {
                            Ok(receipt) => Ok(receipt),
                            Err(e) => {
                                // Nothing was published: the shared state still matches storage.
                                error!("Failed to persist tx {}: {:#}", hex::encode(tx.id()), e);
                                continue;
                            }
                        },
                    };
                    if reply.send(outcome).is_err() {
                        warn!("Submitter went away before receiving its receipt");
                    }
                }
                Request::EncryptInput { user, value, reply } => match self.encrypt(user, value).await {
                    Ok(input) => {
                        if reply.send(input).is_err() {
                            warn!("Requester went away before receiving its input");
                        }
                    }
                    Err(e) => error!("Failed to persist encrypted input: {:#}", e),
                },
            }
        }

        info!("Sequencer stopped: all submitters closed");
    }

    /// Runs a storage write on the blocking pool so no lock or runtime worker waits on disk.
    async fn persist<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Storage) -> Result<T> + Send + 'static,
    {
        let storage = self.storage.clone();
        tokio::task::spawn_blocking(move || job(&storage))
            .await
            .context("storage task")?
    }

    async fn apply(&mut self, tx: &Transaction) -> Result<Receipt> {
        let seq = self.next_seq;
        // Short read guards: this task is the only writer of either value.
        let mut staged_state = self.state.read().await.clone();
        let mut staged_coprocessor = self.coprocessor.read().await.clone();

        let outcome = {
            let mut ctx = ExecutionContext::new(&mut staged_state, &mut staged_coprocessor);
            execute_transaction(tx, &mut ctx).map(|()| ctx.events)
        };

        let receipt = Receipt {
            seq,
            tx_id: tx.id(),
            state_root: staged_state.root_hash(),
            status: match outcome {
                Ok(events) => ReceiptStatus::Success { events },
                Err(error) => ReceiptStatus::Failed { error },
            },
        };

        let receipt = if receipt.is_success() {
            let (state, coprocessor, receipt) = self
                .persist(move |storage| {
                    storage
                        .commit(&staged_state, &staged_coprocessor, &receipt)
                        .context("commit")?;
                    Ok((staged_state, staged_coprocessor, receipt))
                })
                .await?;
            *self.coprocessor.write().await = coprocessor;
            *self.state.write().await = state;
            info!(
                "Sequenced {} at seq {} ({} events)",
                tx.instruction.name(),
                seq,
                receipt.events().len()
            );
            receipt
        } else {
            // Failed calls leave the state untouched; only the receipt is new.
            let receipt = self
                .persist(move |storage| {
                    storage.commit_rejection(&receipt).context("commit_rejection")?;
                    Ok(receipt)
                })
                .await?;
            info!("Rejected tx {} at seq {}", tx.instruction.name(), seq);
            receipt
        };

        self.next_seq += 1;
        Ok(receipt)
    }

    async fn encrypt(&mut self, user: Address, value: u32) -> Result<EncryptedInput> {
        let contract = self.state.read().await.contract_id;
        let mut staged = self.coprocessor.read().await.clone();
        let input = staged.encrypt_u32(&contract, &user, value);

        let staged = self
            .persist(move |storage| {
                storage.save_coprocessor(&staged).context("save_coprocessor")?;
                Ok(staged)
            })
            .await?;
        *self.coprocessor.write().await = staged;
        info!(user = %user.short(), handle = %input.handle.short(), "encrypted input issued");
        Ok(input)
    }
}

/// Wires a sequencer to fresh channels and returns it with its handle.
pub fn channel(
    state: Arc<RwLock<ContractState>>,
    coprocessor: Arc<RwLock<MockCoprocessor>>,
    storage: Arc<Storage>,
    capacity: usize,
) -> Result<(Sequencer, SequencerHandle)> {
    let (tx_sender, tx_rx) = mpsc::channel(capacity);
    let sequencer = Sequencer::new(state, coprocessor, storage, tx_rx)?;
    Ok((sequencer, SequencerHandle::new(tx_sender)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfseal_crypto::fhe::{FheRuntime, FheType};
    use perfseal_crypto::signatures::{address_of, generate_keypair, sign_transaction, SigningKey};
    use perfseal_types::{ContractEvent, ContractInstruction, SubmissionPolicy};
    use tokio::task::JoinHandle;

    struct Node {
        state: Arc<RwLock<ContractState>>,
        coprocessor: Arc<RwLock<MockCoprocessor>>,
        storage: Arc<Storage>,
        handle: SequencerHandle,
        task: JoinHandle<()>,
    }

    impl Node {
        /// Closes the queue and waits for the sequencer, releasing the database.
        async fn stop(self) {
            let Node { handle, storage, task, .. } = self;
            drop(handle);
            task.await.unwrap();
            drop(storage);
        }
    }

    fn start(dir: &std::path::Path, owner: &SigningKey) -> Node {
        let storage = Arc::new(Storage::open_sled(dir).unwrap());
        let state = storage.load_state().unwrap().unwrap_or_else(|| {
            ContractState::new(Address([0xc0; 32]), address_of(owner), 10, SubmissionPolicy::RegisteredOnly)
        });
        let coprocessor = storage
            .load_coprocessor()
            .unwrap()
            .unwrap_or_else(MockCoprocessor::generate);
        let state = Arc::new(RwLock::new(state));
        let coprocessor = Arc::new(RwLock::new(coprocessor));
        let (sequencer, handle) = channel(state.clone(), coprocessor.clone(), storage.clone(), 16).unwrap();
        let task = tokio::spawn(sequencer.run());
        Node {
            state,
            coprocessor,
            storage,
            handle,
            task,
        }
    }

    async fn signed(node: &Node, key: &SigningKey, instruction: ContractInstruction) -> Transaction {
        let sender = address_of(key);
        let nonce = node.state.read().await.nonce_of(&sender);
        let mut tx = Transaction::new(sender, nonce, instruction);
        sign_transaction(key, &mut tx);
        tx
    }

    #[tokio::test]
    async fn applies_in_order_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let owner = generate_keypair();
        let node = start(dir.path(), &owner);

        let tx = signed(&node, &owner, ContractInstruction::RegisterDriver { driver: Address([1u8; 32]) }).await;
        let receipt = node.handle.submit(tx).await.unwrap();
        assert_eq!(receipt.seq, 0);
        assert_eq!(
            receipt.events(),
            &[ContractEvent::DriverRegistered { driver: Address([1u8; 32]) }]
        );
        assert!(node.state.read().await.drivers.contains(&Address([1u8; 32])));

        let persisted = node.storage.load_state().unwrap().unwrap();
        assert_eq!(persisted.root_hash(), receipt.state_root);
        assert_eq!(node.storage.load_tip().unwrap(), Some(0));
    }

    #[tokio::test]
    async fn rejected_calls_get_a_receipt_and_change_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let owner = generate_keypair();
        let node = start(dir.path(), &owner);
        let before = node.state.read().await.root_hash();

        let stranger = generate_keypair();
        let tx = signed(&node, &stranger, ContractInstruction::Pause).await;
        let receipt = node.handle.submit(tx.clone()).await.unwrap();

        assert_eq!(receipt.error(), Some(&ContractError::UnauthorizedAccess));
        assert_eq!(receipt.state_root, before);
        assert_eq!(node.state.read().await.root_hash(), before);
        assert_eq!(node.storage.load_receipt_by_tx(&tx.id()).unwrap(), Some(receipt));
    }

    #[tokio::test]
    async fn forged_or_replayed_transactions_are_not_sequenced() {
        let dir = tempfile::tempdir().unwrap();
        let owner = generate_keypair();
        let node = start(dir.path(), &owner);

        let unsigned = Transaction::new(address_of(&owner), 0, ContractInstruction::Pause);
        let err = node.handle.submit(unsigned.clone()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Envelope(ContractError::InvalidSignature)));

        let mut wrong_nonce = Transaction::new(address_of(&owner), 5, ContractInstruction::Pause);
        sign_transaction(&owner, &mut wrong_nonce);
        let err = node.handle.submit(wrong_nonce.clone()).await.unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Envelope(ContractError::InvalidNonce { expected: 0, got: 5 })
        ));

        // Nothing reached the log.
        assert_eq!(node.storage.load_tip().unwrap(), None);
        assert!(node.storage.load_receipt(0).unwrap().is_none());
        assert!(node.storage.load_receipt_by_tx(&unsigned.id()).unwrap().is_none());
        assert!(node.storage.load_receipt_by_tx(&wrong_nonce.id()).unwrap().is_none());

        // The next valid transaction still gets the first slot.
        let tx = signed(&node, &owner, ContractInstruction::Pause).await;
        let receipt = node.handle.submit(tx).await.unwrap();
        assert_eq!(receipt.seq, 0);
        assert!(receipt.is_success());
    }

    #[tokio::test]
    async fn encrypted_inputs_are_persisted_by_the_sequencer() {
        let dir = tempfile::tempdir().unwrap();
        let owner = generate_keypair();
        let node = start(dir.path(), &owner);

        let user = address_of(&owner);
        let input = node.handle.encrypt_input(user, 17).await.unwrap();
        let mut shared = node.coprocessor.read().await.clone();
        assert_eq!(
            shared.verify_input(&input.handle, &input.proof, FheType::Uint32, &Address([0xc0; 32]), &user),
            Ok(input.handle)
        );

        let stored = node.storage.load_coprocessor().unwrap().unwrap();
        assert_eq!(stored, *node.coprocessor.read().await);
        // Encryption alone is not a transaction.
        assert_eq!(node.storage.load_tip().unwrap(), None);
    }

    #[tokio::test]
    async fn restart_resumes_sequence_and_state() {
        let dir = tempfile::tempdir().unwrap();
        let owner = generate_keypair();
        let node = start(dir.path(), &owner);
        let tx = signed(&node, &owner, ContractInstruction::SetTargetThreshold { threshold: 42 }).await;
        assert!(node.handle.submit(tx).await.unwrap().is_success());
        node.stop().await;

        let node = start(dir.path(), &owner);
        assert_eq!(node.state.read().await.target_threshold, 42);
        let tx = signed(&node, &owner, ContractInstruction::Pause).await;
        let receipt = node.handle.submit(tx).await.unwrap();
        assert_eq!(receipt.seq, 1);
        assert!(receipt.is_success());
    }
}
