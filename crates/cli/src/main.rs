//! # cNFT Minter CLI
//!
//! 管理操作ごとに1つのサブコマンドを持つ。各実行は独立しており、
//! 前の実行が書き出したJSONファイルを作業ディレクトリから読み込む。
//!
//! ## サブコマンド
//! - `create-tree`: Merkle Tree作成（`merkleTreeKeypair.json`, `treeConfig.json` を書き出す）
//! - `tree-size`: Treeのアカウントサイズとrentの概算（オフライン）
//! - `create-collection`: コレクションNFT作成（`collectionData.json` を書き出す）
//! - `mint`: コレクションへの圧縮NFTミント
//! - `set-delegate`: tree delegateの変更
//! - `derive`: tree authority等のPDAを表示（オフライン）
//!
//! ## 環境変数
//! `SOLANA_CLUSTER`, `SOLANA_RPC_URL`, `CONFIRMATION_LEVEL`, `CONFIRM_TIMEOUT_SECS`,
//! `FETCH_TX_LOGS`（フラグで上書き可能）

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use cnft_core::{ClientConfig, Cluster, CnftError};
use cnft_types::FailureReport;

#[derive(Parser)]
#[command(name = "cnft", author, version, about = "Compressed NFT minter", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

/// 全サブコマンド共通のオプション。
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Fee payerの鍵ファイル（solana-keygen形式）
    #[arg(long, global = true, default_value = "wallet.json")]
    pub wallet: PathBuf,

    /// JSONレコードを読み書きするディレクトリ
    #[arg(long, global = true, default_value = ".")]
    pub dir: PathBuf,

    /// mainnet-beta / devnet / testnet / localnet
    #[arg(long, global = true)]
    pub cluster: Option<String>,

    /// RPCエンドポイント（省略時はクラスタの既定値）
    #[arg(long, global = true)]
    pub rpc_url: Option<String>,

    /// processed / confirmed / finalized
    #[arg(long, global = true)]
    pub commitment: Option<String>,

    /// 確認待ちのタイムアウト（秒）
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// 失敗時にプログラムログを取得する
    #[arg(long, global = true)]
    pub fetch_logs: bool,

    /// 結果をJSONで出力する
    #[arg(long, global = true)]
    pub json: bool,
}

impl GlobalArgs {
    /// 環境変数の設定にフラグを重ねる。
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = ClientConfig::from_env()?;
        if let Some(cluster) = &self.cluster {
            let cluster = cluster.parse::<Cluster>()?;
            let rpc_overridden = std::env::var("SOLANA_RPC_URL").is_ok();
            config.cluster = cluster;
            if !rpc_overridden {
                config.network_endpoint = cluster.default_endpoint().to_string();
            }
        }
        if let Some(url) = &self.rpc_url {
            config.network_endpoint = url.clone();
        }
        if let Some(level) = &self.commitment {
            config.confirmation_level = level.parse()?;
        }
        if let Some(secs) = self.timeout_secs {
            config.confirm_timeout = Duration::from_secs(secs);
        }
        if self.fetch_logs {
            config.fetch_logs = true;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Merkle Treeを作成する
    CreateTree(commands::CreateTreeArgs),
    /// Treeのアカウントサイズ・容量・rentを表示する
    TreeSize(commands::TreeSizeArgs),
    /// コレクションNFTを作成する
    CreateCollection(commands::CreateCollectionArgs),
    /// コレクションへ圧縮NFTをミントする
    Mint(commands::MintArgs),
    /// tree delegateを変更する
    SetDelegate(commands::SetDelegateArgs),
    /// PDAを導出して表示する
    Derive(commands::DeriveArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = cli.global.client_config()?;
    tracing::info!(
        cluster = config.cluster.as_str(),
        endpoint = %config.network_endpoint,
        commitment = config.confirmation_level.as_str(),
        "設定を読み込みました"
    );

    let result = match cli.command {
        Command::CreateTree(args) => commands::create_tree(&cli.global, config.clone(), args).await,
        Command::TreeSize(args) => commands::tree_size(&cli.global, args),
        Command::CreateCollection(args) => {
            commands::create_collection(&cli.global, config.clone(), args).await
        }
        Command::Mint(args) => commands::mint(&cli.global, config.clone(), args).await,
        Command::SetDelegate(args) => {
            commands::set_delegate(&cli.global, config.clone(), args).await
        }
        Command::Derive(args) => commands::derive(&cli.global, &config, args),
    };

    if let Err(e) = &result {
        report_failure(&cli.global, &config, e);
    }
    result
}

/// 失敗を人間向けまたはJSONで出力する。
fn report_failure(global: &GlobalArgs, config: &ClientConfig, err: &anyhow::Error) {
    let core_err = err.downcast_ref::<CnftError>();
    let signature = core_err.and_then(|e| e.signature()).map(str::to_string);
    let report = FailureReport {
        error: format!("{err:#}"),
        explorer_url: signature
            .as_deref()
            .map(|s| cnft_core::explorer::transaction_url(s, config)),
        signature,
        logs: core_err.and_then(|e| e.logs()).map(<[String]>::to_vec),
        ambiguous: core_err.is_some_and(|e| e.is_ambiguous()),
    };

    if global.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("レポートの生成に失敗: {e}"),
        }
        return;
    }

    eprintln!("\n失敗: {}", report.error);
    if let Some(url) = &report.explorer_url {
        eprintln!("========================================");
        eprintln!("{url}");
        eprintln!("========================================");
    }
    if let Some(logs) = &report.logs {
        eprintln!("==== Transaction logs ====");
        for line in logs {
            eprintln!("{line}");
        }
        eprintln!("==== END LOGS ====");
    }
    if report.ambiguous {
        eprintln!("トランザクションは後で着地する可能性があります。再送せず署名の状態を確認してください。");
    }
}
