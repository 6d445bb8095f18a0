use serde::de::IgnoredAny;
use serde::Deserialize;
use tracing::warn;

use crate::error::{ReplayError, ReplayResult};

/// Coinbase format whose reward is masked and always indexed under amount 0.
const RCT_COINBASE_VERSION: u32 = 2;

/// A block as received from the ledger source.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockHeader {
    pub height: u64,
    pub hash: String,
    pub timestamp: i64,
    pub coinbase: LedgerTransaction,
    pub tx_hashes: Vec<String>,
}

/// A transaction after Coinbase Rule and Fee Rule resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerTransaction {
    /// Empty for coinbase transactions.
    pub hash: String,
    pub fee: u64,
    pub inputs: Vec<LedgerInput>,
    pub outputs: Vec<LedgerOutput>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerInput {
    pub amount: u64,
    /// Relative ring member offsets, cumulative from index 0.
    pub key_offsets: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerOutput {
    pub amount: u64,
}

/// Block body as embedded in the daemon's `getblock` response.
#[derive(Debug, Deserialize)]
pub struct RawBlock {
    pub miner_tx: RawTransaction,
    #[serde(default)]
    pub tx_hashes: Vec<String>,
}

/// Transaction JSON as decoded by the daemon.
#[derive(Debug, Deserialize)]
pub struct RawTransaction {
    pub version: u32,
    #[serde(default)]
    pub vin: Vec<RawInput>,
    #[serde(default)]
    pub vout: Vec<RawOutput>,
    pub rct_signatures: Option<RawRctSignatures>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawInput {
    Key(RawKeyInput),
    Gen(IgnoredAny),
}

#[derive(Debug, Deserialize)]
pub struct RawKeyInput {
    pub amount: u64,
    pub key_offsets: Vec<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawOutput {
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
pub struct RawRctSignatures {
    #[serde(rename = "txnFee")]
    pub txn_fee: Option<u64>,
}

impl RawTransaction {
    /// Applies the Coinbase Rule. Coinbase transactions carry no inputs and no fee.
    pub fn into_coinbase(self) -> LedgerTransaction {
        let outputs = if self.version == RCT_COINBASE_VERSION {
            vec![LedgerOutput { amount: 0 }]
        } else {
            self.vout
                .iter()
                .map(|vout| LedgerOutput { amount: vout.amount })
                .collect()
        };

        LedgerTransaction {
            hash: String::new(),
            fee: 0,
            inputs: Vec::new(),
            outputs,
        }
    }

    /// Decodes an ordinary transaction and applies the Fee Rule.
    pub fn into_ordinary(self, hash: String) -> ReplayResult<LedgerTransaction> {
        let inputs: Vec<LedgerInput> = self
            .vin
            .into_iter()
            .filter_map(|vin| match vin {
                RawInput::Key(key) => Some(LedgerInput {
                    amount: key.amount,
                    key_offsets: key.key_offsets,
                }),
                RawInput::Gen(_) => None,
            })
            .collect();
        let outputs: Vec<LedgerOutput> = self
            .vout
            .iter()
            .map(|vout| LedgerOutput { amount: vout.amount })
            .collect();

        let explicit_fee = self.rct_signatures.and_then(|rct| rct.txn_fee);
        let fee = match explicit_fee {
            Some(fee) => fee,
            None => implied_fee(&hash, &inputs, &outputs)?,
        };

        Ok(LedgerTransaction {
            hash,
            fee,
            inputs,
            outputs,
        })
    }
}

/// Plaintext fee: inputs minus outputs. Meaningless for masked amounts.
fn implied_fee(
    hash: &str,
    inputs: &[LedgerInput],
    outputs: &[LedgerOutput],
) -> ReplayResult<u64> {
    let spent = checked_total(hash, inputs.iter().map(|input| input.amount))?;
    let created = checked_total(hash, outputs.iter().map(|output| output.amount))?;
    if created > spent {
        warn!(
            "Transaction {} creates {} but spends only {}, recording fee 0",
            hash, created, spent
        );
    }
    Ok(spent.saturating_sub(created))
}

fn checked_total(hash: &str, mut amounts: impl Iterator<Item = u64>) -> ReplayResult<u64> {
    amounts
        .try_fold(0u64, |total, amount| total.checked_add(amount))
        .ok_or_else(|| ReplayError::Malformed(format!("transaction {} amounts overflow", hash)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> RawTransaction {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_rct_coinbase_yields_single_zero_output() {
        let raw = parse(
            r#"{"version":2,"vin":[{"gen":{"height":1220516}}],
                "vout":[{"amount":8513807560000,"target":{"key":"aa"}}],
                "rct_signatures":{"type":0}}"#,
        );
        let tx = raw.into_coinbase();
        assert_eq!(tx.outputs, vec![LedgerOutput { amount: 0 }]);
        assert_eq!(tx.fee, 0);
        assert!(tx.inputs.is_empty());
        assert!(tx.hash.is_empty());
    }

    #[test]
    fn test_legacy_coinbase_keeps_every_amount() {
        let raw = parse(
            r#"{"version":1,"vin":[{"gen":{"height":10}}],
                "vout":[{"amount":7000000000},{"amount":600000000},{"amount":3}]}"#,
        );
        let amounts: Vec<u64> = raw.into_coinbase().outputs.iter().map(|o| o.amount).collect();
        assert_eq!(amounts, vec![7000000000, 600000000, 3]);
    }

    #[test]
    fn test_implied_fee_from_plaintext_amounts() {
        let raw = parse(
            r#"{"version":1,
                "vin":[{"key":{"amount":60,"key_offsets":[1],"k_image":"ab"}},
                       {"key":{"amount":40,"key_offsets":[0,2],"k_image":"cd"}}],
                "vout":[{"amount":90},{"amount":7}]}"#,
        );
        let tx = raw.into_ordinary("deadbeef".to_string()).unwrap();
        assert_eq!(tx.fee, 3);
        assert_eq!(tx.hash, "deadbeef");
        assert_eq!(tx.inputs[1].key_offsets, vec![0, 2]);
    }

    #[test]
    fn test_explicit_fee_wins() {
        let raw = parse(
            r#"{"version":2,
                "vin":[{"key":{"amount":0,"key_offsets":[5,1,1],"k_image":"ab"}}],
                "vout":[{"amount":0},{"amount":0}],
                "rct_signatures":{"type":1,"txnFee":12000000}}"#,
        );
        assert_eq!(raw.into_ordinary("ff".to_string()).unwrap().fee, 12000000);
    }

    #[test]
    fn test_negative_implied_fee_saturates() {
        let raw = parse(
            r#"{"version":1,
                "vin":[{"key":{"amount":5,"key_offsets":[0],"k_image":"ab"}}],
                "vout":[{"amount":9}]}"#,
        );
        assert_eq!(raw.into_ordinary("ee".to_string()).unwrap().fee, 0);
    }

    #[test]
    fn test_overflowing_amounts_are_malformed() {
        let raw = parse(
            r#"{"version":1,
                "vin":[{"key":{"amount":18446744073709551615,"key_offsets":[0],"k_image":"ab"}},
                       {"key":{"amount":1,"key_offsets":[0],"k_image":"cd"}}],
                "vout":[{"amount":1}]}"#,
        );
        let err = raw.into_ordinary("aa".to_string()).unwrap_err();
        assert!(matches!(err, ReplayError::Malformed(_)));
    }
}
