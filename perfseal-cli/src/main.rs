use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use perfseal_crypto::fhe::{EncryptedInput, Plaintext};
use perfseal_crypto::signatures::{
    address_of, generate_keypair, sign_decrypt_request, sign_encrypt_request, sign_transaction, SigningKey,
};
use perfseal_types::{Address, CiphertextHandle, ContractInstruction, HandleSlot, Receipt, ReceiptStatus, Transaction};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "PerfSeal CLI: manage drivers and encrypted performance checks"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long, default_value = "http://localhost:3000", env = "PERFSEAL_NODE_URL")]
    node_url: String,
    #[arg(short, long, default_value = "wallet.json")]
    wallet_path: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new wallet
    Init,
    /// Show current wallet info
    Show,
    /// Show contract owner, pause flag, threshold and driver count
    Info,
    /// Register one driver (owner only)
    Register {
        #[arg(long)]
        driver: Address,
    },
    /// Register up to 100 drivers at once (owner only)
    BatchRegister {
        #[arg(long, value_delimiter = ',', required = true)]
        drivers: Vec<Address>,
    },
    /// Change the target order count (owner only)
    SetThreshold {
        #[arg(long)]
        threshold: u32,
    },
    /// Pause mutating operations (owner only)
    Pause,
    /// Resume mutating operations (owner only)
    Unpause,
    /// Hand the contract to another owner
    TransferOwnership {
        #[arg(long)]
        new_owner: Address,
    },
    /// Give up ownership for good
    RenounceOwnership,
    /// Page through registered drivers
    List {
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 100)]
        limit: u64,
    },
    /// Show registration and evaluation status of a driver
    Status {
        #[arg(long)]
        driver: Address,
    },
    /// Encrypt an order count and submit it for a driver
    Submit {
        /// Defaults to the wallet address; any other driver needs the owner wallet
        #[arg(long)]
        driver: Option<Address>,
        #[arg(long)]
        count: u32,
    },
    /// Compare a driver's submitted order count with the threshold
    Evaluate {
        #[arg(long)]
        driver: Option<Address>,
    },
    /// Decrypt a driver's performance result (driver or owner)
    Decrypt {
        #[arg(long)]
        driver: Option<Address>,
    },
    /// Fetch a receipt by sequence number
    Receipt {
        #[arg(long)]
        seq: u64,
    },
}

#[derive(Serialize, Deserialize)]
struct Wallet {
    secret_key: String,
    public_key: String,
}

impl Wallet {
    fn generate() -> Self {
        let kp = generate_keypair();
        Wallet {
            secret_key: hex::encode(kp.to_bytes()),
            public_key: address_of(&kp).to_string(),
        }
    }

    fn load(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read wallet {:?} (run `init` first)", path))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, path: &PathBuf) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn to_keypair(&self) -> Result<SigningKey> {
        let secret = hex::decode(self.secret_key.trim_start_matches("0x"))?;
        let bytes: &[u8; 32] = secret
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("Wallet secret key must be 32 bytes"))?;
        Ok(SigningKey::from_bytes(bytes))
    }
}

#[derive(Deserialize)]
struct NonceInfo {
    nonce: u64,
}

#[derive(Deserialize)]
struct ContractId {
    contract_id: Address,
}

#[derive(Deserialize)]
struct ResultInfo {
    result: HandleSlot,
    stale: bool,
}

#[derive(Serialize)]
struct EncryptRequest {
    user: Address,
    value: u32,
    signature: String,
}

#[derive(Serialize)]
struct DecryptRequest {
    requester: Address,
    handle: CiphertextHandle,
    signature: String,
}

#[derive(Deserialize)]
struct DecryptResponse {
    value: Plaintext,
}

struct NodeClient {
    client: Client,
    base: String,
}

impl NodeClient {
    fn new(base: &str) -> Self {
        Self {
            client: Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let res = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .with_context(|| format!("GET {path}"))?;
        Self::decode(res).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let res = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {path}"))?;
        Self::decode(res).await
    }

    async fn decode<T: DeserializeOwned>(res: reqwest::Response) -> Result<T> {
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            bail!("Node returned {}: {}", status, body);
        }
        Ok(res.json().await?)
    }

    async fn send(&self, key: &SigningKey, instruction: ContractInstruction) -> Result<Receipt> {
        let sender = address_of(key);
        let NonceInfo { nonce } = self.get(&format!("/accounts/{sender}/nonce")).await?;
        let mut tx = Transaction::new(sender, nonce, instruction);
        sign_transaction(key, &mut tx);

        let receipt: Receipt = self.post("/tx", &tx).await?;
        match &receipt.status {
            ReceiptStatus::Success { events } => {
                println!("Applied at seq {}", receipt.seq);
                for event in events {
                    println!("  {:?}", event);
                }
                Ok(receipt)
            }
            ReceiptStatus::Failed { error } => {
                bail!("Rejected at seq {}: {}", receipt.seq, error)
            }
        }
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let node = NodeClient::new(&cli.node_url);

    match cli.command {
        Commands::Init => {
            let wallet = Wallet::generate();
            wallet.save(&cli.wallet_path)?;
            println!("Wallet initialized at {:?}", cli.wallet_path);
            println!("Address: {}", wallet.public_key);
        }
        Commands::Show => {
            let wallet = Wallet::load(&cli.wallet_path)?;
            println!("Wallet: {:?}", cli.wallet_path);
            println!("Address: {}", wallet.public_key);
        }
        Commands::Info => {
            let info: serde_json::Value = node.get("/contract").await?;
            print_json(&info)?;
        }
        Commands::List { offset, limit } => {
            let page: serde_json::Value = node
                .get(&format!("/drivers?offset={offset}&limit={limit}"))
                .await?;
            print_json(&page)?;
        }
        Commands::Status { driver } => {
            let info: serde_json::Value = node.get(&format!("/drivers/{driver}")).await?;
            print_json(&info)?;
        }
        Commands::Receipt { seq } => {
            let receipt: serde_json::Value = node.get(&format!("/receipts/{seq}")).await?;
            print_json(&receipt)?;
        }
        command => {
            let kp = Wallet::load(&cli.wallet_path)?.to_keypair()?;
            let me = address_of(&kp);
            run_signed(&node, &kp, me, command).await?;
        }
    }

    Ok(())
}

async fn run_signed(node: &NodeClient, kp: &SigningKey, me: Address, command: Commands) -> Result<()> {
    match command {
        Commands::Register { driver } => {
            node.send(kp, ContractInstruction::RegisterDriver { driver }).await?;
        }
        Commands::BatchRegister { drivers } => {
            node.send(kp, ContractInstruction::BatchRegisterDrivers { drivers }).await?;
        }
        Commands::SetThreshold { threshold } => {
            node.send(kp, ContractInstruction::SetTargetThreshold { threshold }).await?;
        }
        Commands::Pause => {
            node.send(kp, ContractInstruction::Pause).await?;
        }
        Commands::Unpause => {
            node.send(kp, ContractInstruction::Unpause).await?;
        }
        Commands::TransferOwnership { new_owner } => {
            node.send(kp, ContractInstruction::TransferOwnership { new_owner }).await?;
        }
        Commands::RenounceOwnership => {
            node.send(kp, ContractInstruction::RenounceOwnership).await?;
        }
        Commands::Submit { driver, count } => {
            let driver = driver.unwrap_or(me);
            // The input is bound to the sender of the submission, not to the driver.
            let ContractId { contract_id } = node.get("/contract").await?;
            let request = EncryptRequest {
                user: me,
                value: count,
                signature: hex::encode(sign_encrypt_request(kp, &contract_id, count)),
            };
            let input: EncryptedInput = node.post("/fhe/input", &request).await?;
            println!("Encrypted input handle: {}", input.handle);
            node.send(
                kp,
                ContractInstruction::SubmitOrderCount {
                    driver,
                    handle: input.handle,
                    proof: input.proof,
                },
            )
            .await?;
        }
        Commands::Evaluate { driver } => {
            let driver = driver.unwrap_or(me);
            node.send(kp, ContractInstruction::EvaluatePerformance { driver }).await?;
        }
        Commands::Decrypt { driver } => {
            let driver = driver.unwrap_or(me);
            let info: ResultInfo = node.get(&format!("/drivers/{driver}/result")).await?;
            let Some(handle) = info.result.handle().copied() else {
                bail!("Driver {} has not been evaluated yet", driver);
            };
            if info.stale {
                println!("Note: a newer order count was submitted after this result");
            }
            let request = DecryptRequest {
                requester: me,
                handle,
                signature: hex::encode(sign_decrypt_request(kp, &handle)),
            };
            let response: DecryptResponse = node.post("/fhe/decrypt", &request).await?;
            match response.value {
                Plaintext::Bool(true) => println!("Driver {} meets the target", driver),
                Plaintext::Bool(false) => println!("Driver {} does not meet the target", driver),
                Plaintext::Uint32(value) => println!("Decrypted value: {}", value),
            }
        }
        _ => bail!("Command does not send a transaction"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        let wallet = Wallet::generate();
        wallet.save(&path).unwrap();

        let loaded = Wallet::load(&path).unwrap();
        let kp = loaded.to_keypair().unwrap();
        assert_eq!(address_of(&kp).to_string(), wallet.public_key);
    }

    #[test]
    fn batch_register_parses_comma_separated_addresses() {
        let a = Address([1u8; 32]);
        let b = Address([2u8; 32]);
        let cli = Cli::try_parse_from([
            "perfseal",
            "batch-register",
            "--drivers",
            &format!("{a},{b}"),
        ])
        .unwrap();
        match cli.command {
            Commands::BatchRegister { drivers } => assert_eq!(drivers, vec![a, b]),
            _ => panic!("wrong subcommand"),
        }
    }
}
