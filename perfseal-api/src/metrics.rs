use perfseal_types::Receipt;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    Applied,
    Rejected,
    /// Bad signature or nonce; never sequenced.
    Refused,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TxLabels {
    pub instruction: String,
    pub outcome: Outcome,
}

#[derive(Debug)]
pub struct Metrics {
    registry: Registry,
    transactions: Family<TxLabels, Counter>,
    encrypted_inputs: Counter,
    decryptions: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("perfseal");

        let transactions = Family::<TxLabels, Counter>::default();
        registry.register(
            "transactions",
            "Submitted transactions by instruction and outcome",
            transactions.clone(),
        );
        let encrypted_inputs = Counter::default();
        registry.register(
            "encrypted_inputs",
            "Inputs encrypted through the relayer endpoint",
            encrypted_inputs.clone(),
        );
        let decryptions = Counter::default();
        registry.register(
            "decryptions",
            "Successful user decryptions",
            decryptions.clone(),
        );

        Self {
            registry,
            transactions,
            encrypted_inputs,
            decryptions,
        }
    }

    pub fn record_receipt(&self, instruction: &str, receipt: &Receipt) {
        let outcome = if receipt.is_success() {
            Outcome::Applied
        } else {
            Outcome::Rejected
        };
        self.transactions
            .get_or_create(&TxLabels {
                instruction: instruction.to_string(),
                outcome,
            })
            .inc();
    }

    pub fn record_refused(&self, instruction: &str) {
        self.transactions
            .get_or_create(&TxLabels {
                instruction: instruction.to_string(),
                outcome: Outcome::Refused,
            })
            .inc();
    }

    pub fn record_encrypted_input(&self) {
        self.encrypted_inputs.inc();
    }

    pub fn record_decryption(&self) {
        self.decryptions.inc();
    }

    /// OpenMetrics text exposition.
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
