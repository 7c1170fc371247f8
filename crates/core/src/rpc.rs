//! # ネットワーククライアント
//!
//! 送信・確認・ログ取得・blockhash取得を行うネットワーク境界。
//! `JsonRpcClient` はSolana JSON-RPCをreqwestで直接呼び出す実装。
//!
//! 再送やレート制限はここでは行わない。

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine;
use solana_sdk::hash::Hash;
use solana_sdk::signature::Signature;

use crate::config::ConfirmationLevel;
use crate::error::{CnftError, Result};

/// 1回の確認照会の結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmStatus {
    /// 要求した確認レベルに到達した
    Confirmed,
    /// 未着地、または確認レベル未到達
    Pending,
    /// 着地したがプログラムが失敗した
    Failed(String),
}

/// コアが呼び出すネットワーククライアント。
#[async_trait::async_trait]
pub trait NetworkClient: Send + Sync {
    /// 署名済みトランザクションを送信する。1回だけ試行する。
    async fn submit_signed(&self, tx_bytes: &[u8]) -> Result<Signature>;

    /// 署名の状態を1回照会する。
    async fn confirm(&self, signature: &Signature, level: ConfirmationLevel)
        -> Result<ConfirmStatus>;

    /// トランザクションのプログラムログを取得する。見つからなければ `None`。
    async fn get_transaction_logs(&self, signature: &Signature) -> Result<Option<Vec<String>>>;

    /// 有効期限の基準となる最新のblockhash。
    async fn get_latest_blockhash(&self) -> Result<Hash>;

    /// 指定サイズのアカウントのrent-exempt minimum。
    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64>;
}

fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// 1リクエストあたりの既定タイムアウト。
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Solana JSON-RPCクライアント。
pub struct JsonRpcClient {
    endpoint: String,
    http_client: reqwest::Client,
    commitment: ConfirmationLevel,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(endpoint: impl Into<String>, commitment: ConfirmationLevel) -> Result<Self> {
        Self::with_timeout(endpoint, commitment, DEFAULT_REQUEST_TIMEOUT)
    }

    /// 応答の無い接続で呼び出しが止まらないよう、各リクエストに上限を設ける。
    pub fn with_timeout(
        endpoint: impl Into<String>,
        commitment: ConfirmationLevel,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CnftError::Config(format!("HTTPクライアントの構築に失敗: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
            commitment,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// JSON-RPCリクエストを送り、レスポンス全体を返す。
    async fn request(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let rpc_request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let rpc_response = self
            .http_client
            .post(&self.endpoint)
            .json(&rpc_request)
            .send()
            .await
            .map_err(|e| CnftError::Network(format!("{method}: RPC送信失敗: {e}")))?;

        rpc_response
            .json()
            .await
            .map_err(|e| CnftError::Network(format!("{method}: RPCレスポンスのパースに失敗: {e}")))
    }

    /// `result` を取り出す。`error` があれば `Network` エラー。
    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let mut rpc_body = self.request(method, params).await?;
        if let Some(error) = rpc_body.get("error") {
            return Err(CnftError::Network(format!("{method}: {error}")));
        }
        rpc_body
            .get_mut("result")
            .map(serde_json::Value::take)
            .ok_or_else(|| CnftError::Network(format!("{method}: RPCレスポンスにresultがありません")))
    }
}

/// sendTransactionのエラーオブジェクトを `NetworkRejected` に変換する。
/// プリフライトのシミュレーションログがあれば一緒に保持する。
fn rejection_from_rpc_error(error: &serde_json::Value) -> CnftError {
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    let logs = error
        .pointer("/data/logs")
        .and_then(|l| l.as_array())
        .map(|lines| {
            lines
                .iter()
                .filter_map(|l| l.as_str().map(str::to_string))
                .collect()
        });
    CnftError::NetworkRejected {
        message,
        signature: None,
        logs,
    }
}

fn parse_signature(s: &str) -> Result<Signature> {
    Signature::from_str(s).map_err(|e| CnftError::Network(format!("不正な署名です ({s}): {e}")))
}

#[async_trait::async_trait]
impl NetworkClient for JsonRpcClient {
    async fn submit_signed(&self, tx_bytes: &[u8]) -> Result<Signature> {
        let params = serde_json::json!([
            b64().encode(tx_bytes),
            {"encoding": "base64", "preflightCommitment": self.commitment.as_str()}
        ]);
        let rpc_body = self.request("sendTransaction", params).await?;

        if let Some(error) = rpc_body.get("error") {
            return Err(rejection_from_rpc_error(error));
        }

        let tx_sig = rpc_body
            .get("result")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CnftError::Network("RPCレスポンスにresultがありません".to_string()))?;
        parse_signature(tx_sig)
    }

    async fn confirm(
        &self,
        signature: &Signature,
        level: ConfirmationLevel,
    ) -> Result<ConfirmStatus> {
        let result = self
            .call(
                "getSignatureStatuses",
                serde_json::json!([[signature.to_string()], {"searchTransactionHistory": false}]),
            )
            .await?;

        let status = match result.pointer("/value/0") {
            Some(s) if !s.is_null() => s,
            _ => return Ok(ConfirmStatus::Pending),
        };

        if let Some(err) = status.get("err").filter(|e| !e.is_null()) {
            return Ok(ConfirmStatus::Failed(err.to_string()));
        }

        let reached = status
            .get("confirmationStatus")
            .and_then(|s| s.as_str())
            .and_then(|s| ConfirmationLevel::from_str(s).ok());
        match reached {
            Some(r) if r >= level => Ok(ConfirmStatus::Confirmed),
            _ => Ok(ConfirmStatus::Pending),
        }
    }

    async fn get_transaction_logs(&self, signature: &Signature) -> Result<Option<Vec<String>>> {
        let result = self
            .call(
                "getTransaction",
                serde_json::json!([
                    signature.to_string(),
                    {"encoding": "json", "commitment": "confirmed", "maxSupportedTransactionVersion": 0}
                ]),
            )
            .await?;

        if result.is_null() {
            return Ok(None);
        }
        Ok(result
            .pointer("/meta/logMessages")
            .and_then(|l| l.as_array())
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|l| l.as_str().map(str::to_string))
                    .collect()
            }))
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        let result = self
            .call(
                "getLatestBlockhash",
                serde_json::json!([{"commitment": self.commitment.as_str()}]),
            )
            .await?;
        let blockhash = result
            .pointer("/value/blockhash")
            .and_then(|b| b.as_str())
            .ok_or_else(|| CnftError::Network("getLatestBlockhash: blockhashがありません".into()))?;
        Hash::from_str(blockhash)
            .map_err(|e| CnftError::Network(format!("不正なblockhashです ({blockhash}): {e}")))
    }

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64> {
        let result = self
            .call("getMinimumBalanceForRentExemption", serde_json::json!([data_len]))
            .await?;
        result.as_u64().ok_or_else(|| {
            CnftError::Network(format!(
                "getMinimumBalanceForRentExemption: 数値ではありません: {result}"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use axum::Json;
    use serde_json::{json, Value};

    /// テスト用モックRPCサーバーを起動し、メソッド名とparamsからレスポンスを返す。
    async fn start_mock_rpc<F>(respond: F) -> String
    where
        F: Fn(&str, &Value) -> Value + Send + Sync + 'static,
    {
        use axum::routing::post;

        let respond = Arc::new(respond);
        let app = axum::Router::new().route(
            "/",
            post(move |Json(req): Json<Value>| {
                let respond = respond.clone();
                async move {
                    let method = req["method"].as_str().unwrap_or_default().to_string();
                    let mut body = respond(&method, &req["params"]);
                    body["jsonrpc"] = json!("2.0");
                    body["id"] = req["id"].clone();
                    Json(body)
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        format!("http://127.0.0.1:{port}/")
    }

    #[tokio::test]
    async fn test_submit_signed_returns_signature() {
        let sig = Signature::from([7u8; 64]);
        let sig_str = sig.to_string();
        let url = start_mock_rpc(move |method, params| {
            assert_eq!(method, "sendTransaction");
            assert_eq!(params[1]["encoding"], "base64");
            json!({"result": sig_str})
        })
        .await;

        let client = JsonRpcClient::new(url, ConfirmationLevel::Confirmed).unwrap();
        assert_eq!(client.submit_signed(&[1, 2, 3]).await.unwrap(), sig);
    }

    #[tokio::test]
    async fn test_submit_rejection_keeps_simulation_logs() {
        let url = start_mock_rpc(|_, _| {
            json!({"error": {
                "code": -32002,
                "message": "Transaction simulation failed: Error processing Instruction 0: custom program error: 0x1771",
                "data": {"logs": ["Program BGUMAp9Gq7iTEuizy4pqaxsTyUCBK68MDfK752saRPUY invoke [1]", "Program log: Error"]}
            }})
        })
        .await;

        let client = JsonRpcClient::new(url, ConfirmationLevel::Confirmed).unwrap();
        match client.submit_signed(&[0]).await.unwrap_err() {
            CnftError::NetworkRejected { message, signature, logs } => {
                assert!(message.contains("custom program error"));
                assert!(signature.is_none());
                assert_eq!(logs.unwrap().len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_confirm_statuses() {
        let url = start_mock_rpc(|method, params| {
            assert_eq!(method, "getSignatureStatuses");
            let sig = params[0][0].as_str().unwrap().to_string();
            let value = if sig == Signature::from([1u8; 64]).to_string() {
                json!([{"slot": 1, "confirmations": null, "err": null, "confirmationStatus": "finalized"}])
            } else if sig == Signature::from([2u8; 64]).to_string() {
                json!([{"slot": 1, "confirmations": 0, "err": null, "confirmationStatus": "processed"}])
            } else if sig == Signature::from([3u8; 64]).to_string() {
                json!([{"slot": 1, "confirmations": 0, "err": {"InstructionError": [0, {"Custom": 6001}]}, "confirmationStatus": "confirmed"}])
            } else {
                json!([null])
            };
            json!({"result": {"context": {"slot": 1}, "value": value}})
        })
        .await;

        let client = JsonRpcClient::new(url, ConfirmationLevel::Confirmed).unwrap();
        let level = ConfirmationLevel::Confirmed;
        assert_eq!(
            client.confirm(&Signature::from([1u8; 64]), level).await.unwrap(),
            ConfirmStatus::Confirmed
        );
        assert_eq!(
            client.confirm(&Signature::from([2u8; 64]), level).await.unwrap(),
            ConfirmStatus::Pending
        );
        assert!(matches!(
            client.confirm(&Signature::from([3u8; 64]), level).await.unwrap(),
            ConfirmStatus::Failed(e) if e.contains("6001")
        ));
        assert_eq!(
            client.confirm(&Signature::from([4u8; 64]), level).await.unwrap(),
            ConfirmStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_transaction_logs_and_blockhash() {
        let blockhash = Hash::new_unique();
        let blockhash_str = blockhash.to_string();
        let url = start_mock_rpc(move |method, params| match method {
            "getTransaction" => {
                assert_eq!(params[1]["maxSupportedTransactionVersion"], 0);
                if params[0] == json!(Signature::from([1u8; 64]).to_string()) {
                    json!({"result": {"meta": {"logMessages": ["Program log: Instruction: MintToCollectionV1"]}}})
                } else {
                    json!({"result": null})
                }
            }
            "getLatestBlockhash" => {
                json!({"result": {"context": {"slot": 1}, "value": {"blockhash": blockhash_str, "lastValidBlockHeight": 100}}})
            }
            "getMinimumBalanceForRentExemption" => {
                assert_eq!(params[0], 82);
                json!({"result": 1_461_600})
            }
            _ => json!({"error": {"code": -32601, "message": "Method not found"}}),
        })
        .await;

        let client = JsonRpcClient::new(url, ConfirmationLevel::Confirmed).unwrap();
        let logs = client
            .get_transaction_logs(&Signature::from([1u8; 64]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(logs, vec!["Program log: Instruction: MintToCollectionV1"]);
        assert_eq!(
            client
                .get_transaction_logs(&Signature::from([2u8; 64]))
                .await
                .unwrap(),
            None
        );
        assert_eq!(client.get_latest_blockhash().await.unwrap(), blockhash);
        assert_eq!(
            client.get_minimum_balance_for_rent_exemption(82).await.unwrap(),
            1_461_600
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let client = JsonRpcClient::new("http://127.0.0.1:1/", ConfirmationLevel::Confirmed).unwrap();
        assert!(matches!(
            client.get_latest_blockhash().await.unwrap_err(),
            CnftError::Network(_)
        ));
    }

    #[tokio::test]
    async fn test_stalled_endpoint_times_out() {
        let app = axum::Router::new().route(
            "/",
            axum::routing::post(|| async {
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                Json(json!({}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = JsonRpcClient::with_timeout(
            format!("http://127.0.0.1:{port}/"),
            ConfirmationLevel::Confirmed,
            std::time::Duration::from_millis(100),
        )
        .unwrap();
        let started = std::time::Instant::now();
        let err = client
            .confirm(&Signature::from([1u8; 64]), ConfirmationLevel::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, CnftError::Network(_)));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
