//! # トランザクション送信
//!
//! 1回の送信を `Built → Signed → Submitted → {Confirmed | Failed}` の状態機械として扱う。
//!
//! - 署名: 必要な署名者が揃わなければ `MissingSignature`、署名に失敗すれば `IncompleteSignerSet`
//! - 送信: 1回だけ試行する。同じペイロードを再送すると、先の送信が後から着地した場合に
//!   二重に実行され得るため、自動再送は行わない
//! - 確認: タイムアウトまでポーリングする。応答しない照会も残り時間で打ち切り、
//!   タイムアウトは結果未確定の `ConfirmationTimeout`
//! - 送信中の通信断: ペイロードが届いた可能性があるため `SubmissionUncertain`（結果未確定）
//! - 失敗時: エラーから署名を復元し（無ければ署名済みの署名）、設定に応じてプログラムログを
//!   ベストエフォートで取得する

pub mod extract;


use std::str::FromStr;

use solana_sdk::hash::Hash;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

pub use extract::{extract_signature, recover_signature};

use crate::assembler::TransactionPlan;
use crate::config::ClientConfig;
use crate::error::{CnftError, Result};
use crate::explorer;
use crate::rpc::{ConfirmStatus, NetworkClient};
use crate::signer::{signer_pubkeys, MessageSigner};

/// 送信の状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Built,
    Signed,
    Submitted,
    Confirmed,
    Failed,
}

/// 1トランザクション分の送信。
#[derive(Debug, Clone)]
pub struct Submission {
    plan: TransactionPlan,
    transaction: Option<Transaction>,
    signature: Option<Signature>,
    state: SubmissionState,
}

impl Submission {
    pub fn new(plan: TransactionPlan) -> Self {
        Self {
            plan,
            transaction: None,
            signature: None,
            state: SubmissionState::Built,
        }
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn plan(&self) -> &TransactionPlan {
        &self.plan
    }

    /// 送信済みの署名（fee payerの署名）。
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    /// Built → Signed。全ての必要な署名をメッセージに付ける。
    pub fn sign(&mut self, blockhash: &Hash, signers: &[&dyn MessageSigner]) -> Result<()> {
        if self.state != SubmissionState::Built {
            return Err(CnftError::InvalidInput(format!(
                "{:?} 状態のトランザクションには署名できません",
                self.state
            )));
        }

        let result = self.try_sign(blockhash, signers);
        if result.is_err() {
            self.state = SubmissionState::Failed;
        }
        result
    }

    fn try_sign(&mut self, blockhash: &Hash, signers: &[&dyn MessageSigner]) -> Result<()> {
        self.plan.ensure_signers(&signer_pubkeys(signers))?;

        let message = Message::new_with_blockhash(
            &self.plan.instructions(),
            Some(self.plan.fee_payer()),
            blockhash,
        );
        let num_signers = message.header.num_required_signatures as usize;
        let mut tx = Transaction {
            signatures: vec![Signature::default(); num_signers],
            message,
        };

        let message_bytes = tx.message.serialize();
        let signer_keys: Vec<Pubkey> = tx.message.account_keys[..num_signers].to_vec();
        for key in signer_keys {
            let signer = signers
                .iter()
                .find(|s| s.identity() == key)
                .ok_or_else(|| CnftError::MissingSignature(key.to_string()))?;
            let sig = signer
                .sign(&message_bytes)
                .map_err(|e| CnftError::IncompleteSignerSet(format!("{key}: {e}")))?;
            apply_signature(&mut tx, &key, sig)?;
        }

        self.signature = tx.signatures.first().copied();
        self.transaction = Some(tx);
        self.state = SubmissionState::Signed;
        Ok(())
    }

    /// 署名済みトランザクションのワイヤ表現。
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let tx = self
            .transaction
            .as_ref()
            .ok_or_else(|| CnftError::InvalidInput("トランザクションが未署名です".into()))?;
        serialize_transaction(tx)
    }
}

/// 公開鍵に対応する署名スロットに署名をセットする。
pub fn apply_signature(tx: &mut Transaction, pubkey: &Pubkey, signature: Signature) -> Result<()> {
    let num_signers = tx.message.header.num_required_signatures as usize;
    let index = tx
        .message
        .account_keys
        .iter()
        .take(num_signers)
        .position(|k| k == pubkey)
        .ok_or_else(|| {
            CnftError::InvalidInput(format!(
                "公開鍵 {pubkey} がトランザクションの署名者に見つかりません"
            ))
        })?;
    tx.signatures[index] = signature;
    Ok(())
}

/// トランザクションをバイナリにシリアライズする。
pub fn serialize_transaction(tx: &Transaction) -> Result<Vec<u8>> {
    bincode::serialize(tx)
        .map_err(|e| CnftError::Serialize(format!("トランザクションのシリアライズに失敗: {e}")))
}

// ---------------------------------------------------------------------------
// Submitter
// ---------------------------------------------------------------------------

/// ネットワーククライアントを使って送信と確認を行う。
pub struct Submitter<C> {
    client: C,
    config: ClientConfig,
}

impl<C: NetworkClient> Submitter<C> {
    pub fn new(client: C, config: ClientConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// 計画を署名・送信し、設定された確認レベルまで待つ。
    pub async fn submit(
        &self,
        plan: TransactionPlan,
        signers: &[&dyn MessageSigner],
    ) -> Result<Signature> {
        let mut submission = Submission::new(plan);
        self.drive(&mut submission, signers).await
    }

    /// Built状態の送信を最後まで進める。
    pub async fn drive(
        &self,
        submission: &mut Submission,
        signers: &[&dyn MessageSigner],
    ) -> Result<Signature> {
        let blockhash = match self.client.get_latest_blockhash().await {
            Ok(b) => b,
            Err(e) => {
                submission.state = SubmissionState::Failed;
                return Err(e);
            }
        };
        submission.sign(&blockhash, signers)?;
        tracing::debug!(
            signers = submission.plan.required_signers().len(),
            "トランザクションに署名しました"
        );

        let bytes = submission.serialize()?;
        let signature = match self.client.submit_signed(&bytes).await {
            Ok(sig) => sig,
            Err(CnftError::Network(message)) => {
                return Err(self.uncertain(submission, message));
            }
            Err(e) => return Err(self.fail(submission, e).await),
        };
        submission.signature = Some(signature);
        submission.state = SubmissionState::Submitted;
        tracing::info!(signature = %signature, "トランザクションを送信しました");

        self.await_confirmation(submission, signature).await
    }

    /// Submitted → Confirmed | Failed
    async fn await_confirmation(
        &self,
        submission: &mut Submission,
        signature: Signature,
    ) -> Result<Signature> {
        let level = self.config.confirmation_level;
        let timeout = self.config.confirm_timeout;
        let started = tokio::time::Instant::now();

        loop {
            // 応答しない照会で止まらないよう、1回の照会も残り時間で打ち切る
            let remaining = timeout.saturating_sub(started.elapsed());
            let polled =
                tokio::time::timeout(remaining, self.client.confirm(&signature, level)).await;
            match polled {
                Ok(Ok(ConfirmStatus::Confirmed)) => {
                    submission.state = SubmissionState::Confirmed;
                    tracing::info!(
                        signature = %signature,
                        level = level.as_str(),
                        explorer_url = %explorer::transaction_url(&signature.to_string(), &self.config),
                        "トランザクションが確認されました"
                    );
                    return Ok(signature);
                }
                Ok(Ok(ConfirmStatus::Failed(message))) => {
                    let err = CnftError::NetworkRejected {
                        message,
                        signature: Some(signature.to_string()),
                        logs: None,
                    };
                    return Err(self.fail(submission, err).await);
                }
                Ok(Ok(ConfirmStatus::Pending)) => {}
                // 照会の失敗は結果を決めないため、タイムアウトまで照会を続ける
                Ok(Err(e)) => tracing::warn!(error = %e, "確認状態の照会に失敗しました"),
                Err(_) => tracing::warn!(signature = %signature, "確認状態の照会が応答しませんでした"),
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                submission.state = SubmissionState::Failed;
                tracing::warn!(
                    signature = %signature,
                    waited_ms = elapsed.as_millis() as u64,
                    "確認がタイムアウトしました。再送せず状態を再照会してください"
                );
                return Err(CnftError::ConfirmationTimeout {
                    signature: signature.to_string(),
                    waited_ms: elapsed.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.config.poll_interval.min(timeout.saturating_sub(elapsed))).await;
        }
    }

    /// 送信要求中の通信断。署名済みの署名を添えて結果未確定として返す。
    fn uncertain(&self, submission: &mut Submission, message: String) -> CnftError {
        submission.state = SubmissionState::Failed;
        let signature = match submission.signature() {
            Some(sig) => sig.to_string(),
            None => return CnftError::Network(message),
        };
        tracing::warn!(
            signature = %signature,
            explorer_url = %explorer::transaction_url(&signature, &self.config),
            error = %message,
            "送信結果が不明です。再送せず署名の状態を確認してください"
        );
        CnftError::SubmissionUncertain { signature, message }
    }

    /// Failedへ遷移し、拒否エラーに署名とログを補う。
    async fn fail(&self, submission: &mut Submission, err: CnftError) -> CnftError {
        submission.state = SubmissionState::Failed;

        let (message, signature, logs) = match err {
            CnftError::NetworkRejected {
                message,
                signature,
                logs,
            } => (message, signature, logs),
            other => return other,
        };

        let signature = recover_signature(signature.as_deref(), &message)
            .or_else(|| submission.signature().map(|s| s.to_string()));
        let logs = match (&signature, logs) {
            (_, Some(logs)) => Some(logs),
            (Some(sig), None) if self.config.fetch_logs => self.fetch_logs(sig).await,
            _ => None,
        };

        self.report_failure(&message, signature.as_deref(), logs.as_deref());

        CnftError::NetworkRejected {
            message,
            signature,
            logs,
        }
    }

    /// ログ取得はベストエフォート。失敗しても元のエラーを隠さない。
    async fn fetch_logs(&self, signature: &str) -> Option<Vec<String>> {
        let sig = match Signature::from_str(signature) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(signature, error = %e, "署名をパースできないためログを取得しません");
                return None;
            }
        };
        match self.client.get_transaction_logs(&sig).await {
            Ok(Some(logs)) => Some(logs),
            Ok(None) => {
                tracing::warn!(signature, "RPCがログを返しませんでした");
                None
            }
            Err(e) => {
                tracing::warn!(signature, error = %e, "ログの取得に失敗しました");
                None
            }
        }
    }

    fn report_failure(&self, message: &str, signature: Option<&str>, logs: Option<&[String]>) {
        match signature {
            Some(sig) => tracing::error!(
                signature = sig,
                explorer_url = %explorer::transaction_url(sig, &self.config),
                error = message,
                "トランザクションが失敗しました"
            ),
            None => tracing::error!(error = message, "トランザクションが失敗しました"),
        }

        if let Some(logs) = logs {
            tracing::info!("==== Transaction logs ====");
            for line in logs {
                tracing::info!("{line}");
            }
            tracing::info!("==== END LOGS ====");
        }
    }
}
