//! Ledger source abstraction and the Monero daemon RPC client.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ReplayError, ReplayResult};
use crate::models::{BlockHeader, LedgerTransaction, RawBlock, RawTransaction};

/// JSON-RPC error code the daemon returns for heights above the tip.
const TOO_BIG_HEIGHT: i64 = -2;

/// Supplies blocks and transactions to the replay driver.
pub trait LedgerSource {
    /// Block header, decoded coinbase and the hashes of its other transactions.
    fn get_block_header(&self, height: u64) -> impl Future<Output = ReplayResult<BlockHeader>>;

    /// Fetches several transactions in one call. Result order is unspecified;
    /// each transaction carries its hash so callers can pair it with the request.
    fn get_transactions(
        &self,
        tx_hashes: &[String],
    ) -> impl Future<Output = ReplayResult<Vec<LedgerTransaction>>>;
}

/// RPC client configuration
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Daemon URL (e.g., "http://127.0.0.1:18081")
    pub url: String,
    pub timeout: Duration,
}

/// Monero daemon RPC client
pub struct MoneroRpc {
    client: Client,
    config: RpcConfig,
}

#[derive(Debug, Deserialize)]
struct GetBlockResult {
    block_header: RawBlockHeader,
    json: String,
}

#[derive(Debug, Deserialize)]
struct RawBlockHeader {
    hash: String,
    height: u64,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct GetTransactionsResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    txs: Vec<TransactionEntry>,
    #[serde(default)]
    missed_tx: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionEntry {
    tx_hash: String,
    as_json: String,
}

impl MoneroRpc {
    pub fn new(config: RpcConfig) -> ReplayResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: &Value) -> ReplayResult<Value> {
        let response = self.client.post(self.endpoint(path)).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReplayError::SourceUnavailable(format!(
                "{} returned status {}",
                path, status
            )));
        }

        Ok(response.json().await?)
    }

    /// Make a JSON-RPC call
    async fn call(&self, method: &str, params: Value) -> ReplayResult<Value> {
        let body = rpc_request_body(method, &params);
        let json = self.post("json_rpc", &body).await?;
        decode_rpc_response(method, &params, json)
    }

    /// Number of blocks in the daemon's chain.
    pub async fn get_block_count(&self) -> ReplayResult<u64> {
        let result = self.call("get_block_count", Value::Null).await?;
        result
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| ReplayError::Malformed("invalid get_block_count response".to_string()))
    }
}

impl LedgerSource for MoneroRpc {
    async fn get_block_header(&self, height: u64) -> ReplayResult<BlockHeader> {
        let result = self
            .call("getblock", serde_json::json!({ "height": height }))
            .await?;
        let header = decode_block(result)?;
        debug!(
            "Fetched block {} with {} transactions",
            header.height,
            header.tx_hashes.len()
        );
        Ok(header)
    }

    async fn get_transactions(
        &self,
        tx_hashes: &[String],
    ) -> ReplayResult<Vec<LedgerTransaction>> {
        let body = serde_json::json!({
            "txs_hashes": tx_hashes,
            "decode_as_json": true,
        });
        decode_transactions(self.post("gettransactions", &body).await?)
    }
}

/// JSON-RPC 2.0 envelope. `params` is left out entirely when null.
fn rpc_request_body(method: &str, params: &Value) -> Value {
    let mut body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": "0",
        "method": method,
    });
    if !params.is_null() {
        body["params"] = params.clone();
    }
    body
}

/// Unwraps `result` from a JSON-RPC response, mapping the error envelope.
fn decode_rpc_response(method: &str, params: &Value, mut json: Value) -> ReplayResult<Value> {
    if let Some(error) = json.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        if code == TOO_BIG_HEIGHT {
            if let Some(height) = params.get("height").and_then(Value::as_u64) {
                return Err(ReplayError::NotFound { height });
            }
        }
        return Err(ReplayError::SourceUnavailable(format!(
            "{} failed: {}",
            method, error
        )));
    }

    json.get_mut("result")
        .map(Value::take)
        .ok_or_else(|| ReplayError::Malformed(format!("{} response missing result", method)))
}

fn decode_block(result: Value) -> ReplayResult<BlockHeader> {
    let result: GetBlockResult = serde_json::from_value(result)?;
    let body: RawBlock = serde_json::from_str(&result.json)?;

    Ok(BlockHeader {
        height: result.block_header.height,
        hash: result.block_header.hash,
        timestamp: result.block_header.timestamp,
        coinbase: body.miner_tx.into_coinbase(),
        tx_hashes: body.tx_hashes,
    })
}

fn decode_transactions(response: Value) -> ReplayResult<Vec<LedgerTransaction>> {
    let response: GetTransactionsResponse = serde_json::from_value(response)?;

    if let Some(missed) = response.missed_tx.into_iter().next() {
        return Err(ReplayError::UnknownReference(missed));
    }
    if response.status != "OK" {
        return Err(ReplayError::SourceUnavailable(format!(
            "gettransactions status: {}",
            response.status
        )));
    }

    response
        .txs
        .into_iter()
        .map(|entry| {
            let raw: RawTransaction = serde_json::from_str(&entry.as_json)?;
            raw.into_ordinary(entry.tx_hash)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LedgerOutput;

    #[test]
    fn test_decode_block() {
        let block_json = r#"{"major_version":1,
            "miner_tx":{"version":1,"vin":[{"gen":{"height":2}}],
                "vout":[{"amount":17590122566891,"target":{"key":"9b"}}]},
            "tx_hashes":["ab12","cd34"]}"#;
        let result = serde_json::json!({
            "block_header": {
                "hash": "e5d8",
                "height": 2,
                "timestamp": 1397818225,
                "reward": 17590122566891u64
            },
            "json": block_json,
            "status": "OK"
        });

        let header = decode_block(result).unwrap();
        assert_eq!(header.height, 2);
        assert_eq!(header.hash, "e5d8");
        assert_eq!(header.timestamp, 1397818225);
        assert_eq!(header.tx_hashes, vec!["ab12", "cd34"]);
        assert_eq!(
            header.coinbase.outputs,
            vec![LedgerOutput { amount: 17590122566891 }]
        );
    }

    #[test]
    fn test_decode_transactions_keeps_hashes() {
        let response = serde_json::json!({
            "status": "OK",
            "txs": [
                {
                    "tx_hash": "cd34",
                    "as_json": r#"{"version":2,
                        "vin":[{"key":{"amount":0,"key_offsets":[7,3],"k_image":"01"}}],
                        "vout":[{"amount":0}],
                        "rct_signatures":{"type":1,"txnFee":4000}}"#
                },
                {
                    "tx_hash": "ab12",
                    "as_json": r#"{"version":1,
                        "vin":[{"key":{"amount":100,"key_offsets":[0],"k_image":"02"}}],
                        "vout":[{"amount":97}]}"#
                }
            ]
        });

        let txs = decode_transactions(response).unwrap();
        assert_eq!(txs[0].hash, "cd34");
        assert_eq!(txs[0].fee, 4000);
        assert_eq!(txs[0].inputs[0].key_offsets, vec![7, 3]);
        assert_eq!(txs[1].hash, "ab12");
        assert_eq!(txs[1].fee, 3);
    }

    #[test]
    fn test_missed_transaction_is_unknown_reference() {
        let response = serde_json::json!({
            "status": "OK",
            "txs": [],
            "missed_tx": ["beef"]
        });
        let err = decode_transactions(response).unwrap_err();
        assert!(matches!(err, ReplayError::UnknownReference(hash) if hash == "beef"));
    }

    #[test]
    fn test_busy_daemon_is_unavailable() {
        let response = serde_json::json!({ "status": "BUSY", "txs": [] });
        let err = decode_transactions(response).unwrap_err();
        assert!(matches!(err, ReplayError::SourceUnavailable(_)));
    }

    #[test]
    fn test_too_big_height_is_not_found() {
        let params = serde_json::json!({ "height": 3000000 });
        let response = serde_json::json!({
            "error": {
                "code": -2,
                "message": "Requested block height: 3000000 greater than current top block height"
            }
        });
        let err = decode_rpc_response("getblock", &params, response).unwrap_err();
        assert!(matches!(err, ReplayError::NotFound { height: 3000000 }));
    }

    #[test]
    fn test_too_big_height_without_height_param_is_unavailable() {
        let response = serde_json::json!({ "error": { "code": -2, "message": "too big" } });
        let err = decode_rpc_response("getblock", &Value::Null, response).unwrap_err();
        assert!(matches!(err, ReplayError::SourceUnavailable(_)));
    }

    #[test]
    fn test_other_rpc_error_is_unavailable() {
        let params = serde_json::json!({ "height": 5 });
        let response = serde_json::json!({ "error": { "code": -5, "message": "internal" } });
        let err = decode_rpc_response("getblock", &params, response).unwrap_err();
        assert!(
            matches!(err, ReplayError::SourceUnavailable(message) if message.contains("getblock"))
        );
    }

    #[test]
    fn test_missing_result_is_malformed() {
        let response = serde_json::json!({ "jsonrpc": "2.0", "id": "0" });
        let err = decode_rpc_response("get_block_count", &Value::Null, response).unwrap_err();
        assert!(matches!(err, ReplayError::Malformed(_)));
    }

    #[test]
    fn test_result_is_unwrapped() {
        let response = serde_json::json!({
            "jsonrpc": "2.0",
            "id": "0",
            "error": null,
            "result": { "count": 42, "status": "OK" }
        });
        let result = decode_rpc_response("get_block_count", &Value::Null, response).unwrap();
        assert_eq!(result["count"], 42);
    }

    #[test]
    fn test_null_params_are_omitted() {
        let body = rpc_request_body("get_block_count", &Value::Null);
        assert!(body.get("params").is_none());
        assert_eq!(body["method"], "get_block_count");

        let body = rpc_request_body("getblock", &serde_json::json!({ "height": 7 }));
        assert_eq!(body["params"]["height"], 7);
    }
}
