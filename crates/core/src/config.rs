//! # クライアント設定
//!
//! プログラムID・RPCエンドポイント・確認レベルを構築時に明示的に渡すための設定。
//! モジュールレベルの定数に依存せず、全コンポーネントはこの構造体を受け取る。

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::error::{CnftError, Result};

// ---------------------------------------------------------------------------
// プログラムID
// ---------------------------------------------------------------------------

/// SPL Account Compression (V1) プログラムID。
pub const SPL_ACCOUNT_COMPRESSION_ID: Pubkey =
    solana_sdk::pubkey!("cmtDvXumGCrqC1Age74AVPhSRVXJMd8PJS91L8KbNCK");

/// SPL Noop プログラムID（Bubblegumのlog wrapper）。
pub const SPL_NOOP_ID: Pubkey = solana_sdk::pubkey!("noopb9bkMVfRPU8AsbpTUg8AQkHtKwMYZiFUjNRtMmV");

/// 命令構築で参照するプログラムID一式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramIds {
    /// Bubblegum（tree authority等のPDAの所有プログラム）
    pub bubblegum: Pubkey,
    /// Token Metadata
    pub token_metadata: Pubkey,
    /// SPL Account Compression
    pub account_compression: Pubkey,
    /// SPL Noop
    pub noop: Pubkey,
    /// SPL Token
    pub spl_token: Pubkey,
    /// Associated Token Account
    pub associated_token: Pubkey,
    /// System Program
    pub system: Pubkey,
}

impl Default for ProgramIds {
    fn default() -> Self {
        Self {
            bubblegum: mpl_bubblegum::ID,
            token_metadata: mpl_token_metadata::ID,
            account_compression: SPL_ACCOUNT_COMPRESSION_ID,
            noop: SPL_NOOP_ID,
            spl_token: spl_token::ID,
            associated_token: spl_associated_token_account::ID,
            system: solana_sdk::system_program::ID,
        }
    }
}

// ---------------------------------------------------------------------------
// クラスタ・確認レベル
// ---------------------------------------------------------------------------

/// 接続先クラスタ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cluster {
    MainnetBeta,
    Devnet,
    Testnet,
    Localnet,
}

impl Cluster {
    /// デフォルトのRPCエンドポイント。
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Cluster::MainnetBeta => "https://api.mainnet-beta.solana.com",
            Cluster::Devnet => "https://api.devnet.solana.com",
            Cluster::Testnet => "https://api.testnet.solana.com",
            Cluster::Localnet => "http://127.0.0.1:8899",
        }
    }

    /// エクスプローラURLの `cluster=` パラメータ値。
    pub fn as_str(&self) -> &'static str {
        match self {
            Cluster::MainnetBeta => "mainnet-beta",
            Cluster::Devnet => "devnet",
            Cluster::Testnet => "testnet",
            Cluster::Localnet => "custom",
        }
    }
}

impl FromStr for Cluster {
    type Err = CnftError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mainnet-beta" | "mainnet" => Ok(Cluster::MainnetBeta),
            "devnet" => Ok(Cluster::Devnet),
            "testnet" => Ok(Cluster::Testnet),
            "localnet" | "localhost" => Ok(Cluster::Localnet),
            other => Err(CnftError::Config(format!("未知のクラスタです: {other}"))),
        }
    }
}

/// トランザクション確認レベル。`processed < confirmed < finalized` の順に強い。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationLevel {
    Processed,
    Confirmed,
    Finalized,
}

impl ConfirmationLevel {
    /// RPCの `commitment` パラメータ値。
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationLevel::Processed => "processed",
            ConfirmationLevel::Confirmed => "confirmed",
            ConfirmationLevel::Finalized => "finalized",
        }
    }
}

impl FromStr for ConfirmationLevel {
    type Err = CnftError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "processed" => Ok(ConfirmationLevel::Processed),
            "confirmed" => Ok(ConfirmationLevel::Confirmed),
            "finalized" => Ok(ConfirmationLevel::Finalized),
            other => Err(CnftError::Config(format!("未知の確認レベルです: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// クライアント設定
// ---------------------------------------------------------------------------

/// ネットワーク操作を行うコンポーネントの設定。
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// 命令構築で参照するプログラムID
    pub program_ids: ProgramIds,
    /// RPCエンドポイントURL
    pub network_endpoint: String,
    /// 完了とみなす確認レベル
    pub confirmation_level: ConfirmationLevel,
    /// 確認待ちのタイムアウト
    pub confirm_timeout: Duration,
    /// 確認ポーリング間隔
    pub poll_interval: Duration,
    /// 失敗時にプログラムログを取得するか
    pub fetch_logs: bool,
    /// エクスプローラURL用のクラスタ
    pub cluster: Cluster,
}

impl ClientConfig {
    /// 指定クラスタのデフォルト設定。
    pub fn for_cluster(cluster: Cluster) -> Self {
        Self {
            program_ids: ProgramIds::default(),
            network_endpoint: cluster.default_endpoint().to_string(),
            confirmation_level: ConfirmationLevel::Confirmed,
            confirm_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
            fetch_logs: false,
            cluster,
        }
    }

    /// Bubblegum（PDA所有プログラム）のID。
    pub fn owning_program_id(&self) -> Pubkey {
        self.program_ids.bubblegum
    }

    /// 環境変数から構築する。
    ///
    /// - `SOLANA_CLUSTER` (default: devnet)
    /// - `SOLANA_RPC_URL` (default: クラスタのデフォルトエンドポイント)
    /// - `CONFIRMATION_LEVEL` (default: confirmed)
    /// - `CONFIRM_TIMEOUT_SECS` (default: 60)
    /// - `FETCH_TX_LOGS` (`true` で有効)
    pub fn from_env() -> Result<Self> {
        let cluster = std::env::var("SOLANA_CLUSTER")
            .ok()
            .map(|s| s.parse::<Cluster>())
            .transpose()?
            .unwrap_or(Cluster::Devnet);

        let mut config = Self::for_cluster(cluster);

        if let Ok(url) = std::env::var("SOLANA_RPC_URL") {
            config.network_endpoint = url;
        }
        if let Ok(level) = std::env::var("CONFIRMATION_LEVEL") {
            config.confirmation_level = level.parse()?;
        }
        if let Ok(secs) = std::env::var("CONFIRM_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|e| {
                CnftError::Config(format!("CONFIRM_TIMEOUT_SECSが数値ではありません: {e}"))
            })?;
            config.confirm_timeout = Duration::from_secs(secs);
        }
        config.fetch_logs = std::env::var("FETCH_TX_LOGS").unwrap_or_default() == "true";

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_level_order() {
        assert!(ConfirmationLevel::Processed < ConfirmationLevel::Confirmed);
        assert!(ConfirmationLevel::Confirmed < ConfirmationLevel::Finalized);
        assert_eq!(
            "finalized".parse::<ConfirmationLevel>().unwrap(),
            ConfirmationLevel::Finalized
        );
        assert!("final".parse::<ConfirmationLevel>().is_err());
    }

    #[test]
    fn test_cluster_parse() {
        assert_eq!("mainnet".parse::<Cluster>().unwrap(), Cluster::MainnetBeta);
        assert_eq!(Cluster::MainnetBeta.as_str(), "mainnet-beta");
        assert!("moon".parse::<Cluster>().is_err());
    }

    #[test]
    fn test_default_program_ids() {
        let ids = ProgramIds::default();
        assert_eq!(
            ids.bubblegum.to_string(),
            "BGUMAp9Gq7iTEuizy4pqaxsTyUCBK68MDfK752saRPUY"
        );
        assert_eq!(
            ids.token_metadata.to_string(),
            "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s"
        );

        let config = ClientConfig::for_cluster(Cluster::Devnet);
        assert_eq!(config.owning_program_id(), ids.bubblegum);
        assert_eq!(config.network_endpoint, "https://api.devnet.solana.com");
    }
}
