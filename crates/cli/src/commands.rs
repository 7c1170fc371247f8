//! サブコマンドの実装。

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::Args;
use cnft_core::assembler::collection::DEFAULT_COLLECTION_SIZE;
use cnft_core::assembler::tree::rent_exempt_minimum;
use cnft_core::assembler::{
    CollectionMintSetup, CollectionSetupBuilder, CreateTreeBuilder, MintOperation,
    MintToCollectionBuilder, SetTreeDelegate, TreeConfig,
};
use cnft_core::metadata::AssetMetadata;
use cnft_core::record;
use cnft_core::rpc::{JsonRpcClient, NetworkClient};
use cnft_core::signer::load_keypair;
use cnft_core::submit::Submitter;
use cnft_core::{derive as pda, explorer, ClientConfig, ProgramIds};
use cnft_types::MintReport;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;

use crate::GlobalArgs;

fn submitter(config: ClientConfig) -> anyhow::Result<Submitter<JsonRpcClient>> {
    let client = JsonRpcClient::new(config.network_endpoint.clone(), config.confirmation_level)?;
    Ok(Submitter::new(client, config))
}

fn parse_pubkey(label: &str, s: &str) -> anyhow::Result<Pubkey> {
    Pubkey::from_str(s).with_context(|| format!("{label}が不正なアドレスです: {s}"))
}

fn tree_key_path(global: &GlobalArgs, explicit: &Option<PathBuf>) -> PathBuf {
    explicit
        .clone()
        .unwrap_or_else(|| global.dir.join(record::TREE_KEY_FILE))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// create-tree / tree-size
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct TreeSizeArgs {
    #[arg(long, default_value_t = 14)]
    pub max_depth: u32,
    #[arg(long, default_value_t = 64)]
    pub max_buffer_size: u32,
    #[arg(long, default_value_t = 0)]
    pub canopy_depth: u32,
}

impl TreeSizeArgs {
    fn config(&self) -> anyhow::Result<TreeConfig> {
        Ok(TreeConfig::new(
            self.max_depth,
            self.max_buffer_size,
            self.canopy_depth,
        )?)
    }
}

#[derive(Args, Debug)]
pub struct CreateTreeArgs {
    #[command(flatten)]
    pub size: TreeSizeArgs,

    /// 誰でもミントできるTreeにする
    #[arg(long)]
    pub public: bool,

    /// Tree鍵の書き出し先（既定: <dir>/merkleTreeKeypair.json）
    #[arg(long)]
    pub tree_key_file: Option<PathBuf>,
}

pub fn tree_size(global: &GlobalArgs, args: TreeSizeArgs) -> anyhow::Result<()> {
    let config = args.config()?;
    let size = config.account_size();
    let rent = rent_exempt_minimum(size);

    if global.json {
        return print_json(&serde_json::json!({
            "maxDepth": config.max_depth,
            "maxBufferSize": config.max_buffer_size,
            "canopyDepth": config.canopy_depth,
            "capacity": config.capacity(),
            "accountSize": size,
            "rentLamports": rent,
        }));
    }

    println!("max_depth:       {}", config.max_depth);
    println!("max_buffer_size: {}", config.max_buffer_size);
    println!("canopy_depth:    {}", config.canopy_depth);
    println!("capacity:        {} leaves", config.capacity());
    println!("account size:    {size} bytes");
    println!(
        "rent (estimate): {rent} lamports ({:.8} SOL)",
        rent as f64 / 1_000_000_000.0
    );
    Ok(())
}

pub async fn create_tree(
    global: &GlobalArgs,
    config: ClientConfig,
    args: CreateTreeArgs,
) -> anyhow::Result<()> {
    let tree_config = args.size.config()?;
    let key_path = tree_key_path(global, &args.tree_key_file);
    if key_path.exists() {
        anyhow::bail!(
            "{} は既に存在します。既存のTreeを上書きしません",
            key_path.display()
        );
    }

    let payer = load_keypair(&global.wallet)?;
    let tree = Keypair::new();
    let ids = config.program_ids;
    let submitter = submitter(config)?;

    let space = tree_config.account_size();
    let lamports = submitter
        .client()
        .get_minimum_balance_for_rent_exemption(space)
        .await?;
    tracing::info!(
        tree_address = %tree.pubkey(),
        space,
        lamports,
        capacity = tree_config.capacity(),
        "Merkle Treeを作成します"
    );

    let create = CreateTreeBuilder::new()
        .payer(payer.pubkey())
        .merkle_tree(tree.pubkey())
        .config(tree_config)
        .lamports(lamports)
        .public(args.public)
        .build(&ids)?;

    record::save_keypair(&key_path, &tree)?;

    let signature = submitter.submit(create.plan()?, &[&payer, &tree]).await?;
    record::save_tree_config(&global.dir.join(record::TREE_CONFIG_FILE), &tree_config)?;

    let config = submitter.config();
    if global.json {
        return print_json(&serde_json::json!({
            "signature": signature.to_string(),
            "treeAddress": tree.pubkey().to_string(),
            "treeAuthority": create.tree_authority.address.to_string(),
            "explorerUrl": explorer::transaction_url(&signature.to_string(), config),
        }));
    }
    println!("\nMerkle Treeを作成しました");
    println!("tree address:   {}", tree.pubkey());
    println!("tree authority: {}", create.tree_authority.address);
    println!("{}", explorer::transaction_url(&signature.to_string(), config));
    Ok(())
}

// ---------------------------------------------------------------------------
// create-collection
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct CreateCollectionArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub symbol: String,
    /// コレクションのJSONメタデータURI
    #[arg(long)]
    pub uri: String,
    /// royalty（basis points）
    #[arg(long, default_value_t = 0)]
    pub royalty_bps: u16,
    /// コレクションサイズ（クライアント側では強制しない）
    #[arg(long, default_value_t = DEFAULT_COLLECTION_SIZE)]
    pub size: u64,
    /// メタデータを変更可能にする
    #[arg(long)]
    pub mutable: bool,
}

pub async fn create_collection(
    global: &GlobalArgs,
    config: ClientConfig,
    args: CreateCollectionArgs,
) -> anyhow::Result<()> {
    let collection_path = global.dir.join(record::COLLECTION_FILE);
    if collection_path.exists() {
        anyhow::bail!(
            "{} は既に存在します。コレクションは一度だけ作成します",
            collection_path.display()
        );
    }

    let mint_key_path = global.dir.join(record::COLLECTION_MINT_KEY_FILE);
    if mint_key_path.exists() {
        anyhow::bail!(
            "{} が残っています。前回作成したコレクションMintを確認してから削除してください",
            mint_key_path.display()
        );
    }

    let payer = load_keypair(&global.wallet)?;
    let mint = Keypair::new();
    let ids = config.program_ids;
    let submitter = submitter(config)?;

    let lamports = submitter
        .client()
        .get_minimum_balance_for_rent_exemption(CollectionMintSetup::mint_space())
        .await?;

    let mut metadata = AssetMetadata::new(args.name, args.symbol, args.uri)
        .with_creator(payer.pubkey(), 100)
        .with_royalty(args.royalty_bps);
    metadata.is_mutable = args.mutable;

    let setup = CollectionSetupBuilder::new()
        .payer(payer.pubkey())
        .mint(mint.pubkey())
        .metadata(metadata)
        .mint_lamports(lamports)
        .collection_size(args.size)
        .build(&ids)?;

    record::save_keypair(&mint_key_path, &mint)?;
    tracing::info!(mint = %setup.record.mint, "コレクションのMintを作成します");
    let mint_sig = submitter.submit(setup.mint_plan()?, &[&payer, &mint]).await?;
    tracing::info!(
        signature = %mint_sig,
        token_account = %setup.record.token_account,
        "コレクションMintに1枚ミントしました"
    );

    tracing::info!(
        metadata_account = %setup.record.metadata_account,
        master_edition_account = %setup.record.master_edition_account,
        size = setup.collection_size,
        "Metadata・Master Editionを作成します"
    );
    let signature = submitter
        .submit(setup.metadata_plan()?, &[&payer])
        .await
        .with_context(|| {
            format!(
                "コレクションMint {} は作成済みです（鍵: {}）",
                setup.record.mint,
                mint_key_path.display()
            )
        })?;

    record::save_collection(&collection_path, &setup.record)?;

    let config = submitter.config();
    if global.json {
        return print_json(&serde_json::json!({
            "signature": signature.to_string(),
            "collection": setup.record.to_data(),
            "explorerUrl": explorer::transaction_url(&signature.to_string(), config),
        }));
    }
    println!("\nコレクションを作成しました");
    println!("mint:                   {}", setup.record.mint);
    println!("token account:          {}", setup.record.token_account);
    println!("metadata account:       {}", setup.record.metadata_account);
    println!("master edition account: {}", setup.record.master_edition_account);
    println!("{}", explorer::transaction_url(&signature.to_string(), config));
    Ok(())
}

// ---------------------------------------------------------------------------
// mint
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct MintArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub symbol: String,
    /// NFTのJSONメタデータURI
    #[arg(long)]
    pub uri: String,
    /// 受取人（省略時はwallet）
    #[arg(long)]
    pub receiver: Option<String>,
    /// royalty（basis points）
    #[arg(long, default_value_t = 0)]
    pub royalty_bps: u16,
    /// Tree鍵ファイル（既定: <dir>/merkleTreeKeypair.json）
    #[arg(long)]
    pub tree_key_file: Option<PathBuf>,
}

pub async fn mint(global: &GlobalArgs, config: ClientConfig, args: MintArgs) -> anyhow::Result<()> {
    let payer = load_keypair(&global.wallet)?;
    let collection = record::load_collection(&global.dir.join(record::COLLECTION_FILE))?;
    let tree = record::load_tree_address(&tree_key_path(global, &args.tree_key_file))?;
    let receiver = match &args.receiver {
        Some(r) => parse_pubkey("receiver", r)?,
        None => payer.pubkey(),
    };

    let ids = config.program_ids;
    collection.verify_derived(&ids)?;

    let op = MintOperation {
        receiver,
        metadata: AssetMetadata::new(args.name, args.symbol, args.uri)
            .with_creator(payer.pubkey(), 100)
            .with_royalty(args.royalty_bps),
        tree,
        collection,
    };
    let mint = MintToCollectionBuilder::from_operation(&op, payer.pubkey()).build(&ids)?;

    let submitter = submitter(config)?;
    let signature = submitter.submit(mint.plan()?, &[&payer]).await?;

    let report = MintReport {
        signature: signature.to_string(),
        tree_address: tree.to_string(),
        leaf_owner: receiver.to_string(),
        data_hash: mint.data_hash.to_string(),
        creator_hash: mint.creator_hash.to_string(),
        explorer_url: explorer::transaction_url(&signature.to_string(), submitter.config()),
    };
    if global.json {
        return print_json(&report);
    }
    println!("\n圧縮NFTをミントしました");
    println!("leaf owner:   {}", report.leaf_owner);
    println!("data hash:    {}", report.data_hash);
    println!("creator hash: {}", report.creator_hash);
    println!("{}", report.explorer_url);
    Ok(())
}

// ---------------------------------------------------------------------------
// set-delegate
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct SetDelegateArgs {
    /// 新しいtree delegate
    #[arg(long)]
    pub new_delegate: String,
    /// Tree鍵ファイル（既定: <dir>/merkleTreeKeypair.json）
    #[arg(long)]
    pub tree_key_file: Option<PathBuf>,
}

pub async fn set_delegate(
    global: &GlobalArgs,
    config: ClientConfig,
    args: SetDelegateArgs,
) -> anyhow::Result<()> {
    let creator = load_keypair(&global.wallet)?;
    let tree = record::load_tree_address(&tree_key_path(global, &args.tree_key_file))?;
    let new_delegate = parse_pubkey("new_delegate", &args.new_delegate)?;

    let op = SetTreeDelegate::new(&config.program_ids, tree, creator.pubkey(), new_delegate)?;
    let submitter = submitter(config)?;
    let signature = submitter.submit(op.plan()?, &[&creator]).await?;

    let url = explorer::transaction_url(&signature.to_string(), submitter.config());
    if global.json {
        return print_json(&serde_json::json!({
            "signature": signature.to_string(),
            "treeAddress": tree.to_string(),
            "newDelegate": new_delegate.to_string(),
            "explorerUrl": url,
        }));
    }
    println!("\ntree delegateを {new_delegate} に変更しました");
    println!("{url}");
    Ok(())
}

// ---------------------------------------------------------------------------
// derive
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct DeriveArgs {
    /// Treeアドレス（省略時はTree鍵ファイルから読む）
    #[arg(long)]
    pub tree: Option<String>,
    /// Tree鍵ファイル（既定: <dir>/merkleTreeKeypair.json）
    #[arg(long)]
    pub tree_key_file: Option<PathBuf>,
    /// コレクションMint（指定時はMetadata / Master Editionも表示）
    #[arg(long)]
    pub mint: Option<String>,
}

pub fn derive(global: &GlobalArgs, config: &ClientConfig, args: DeriveArgs) -> anyhow::Result<()> {
    let ids: &ProgramIds = &config.program_ids;
    let tree = match &args.tree {
        Some(t) => parse_pubkey("tree", t)?,
        None => record::load_tree_address(&tree_key_path(global, &args.tree_key_file))?,
    };

    let authority = pda::tree_authority(ids, &tree)?;
    let cpi_signer = pda::collection_cpi_signer(ids)?;
    let mut out = serde_json::json!({
        "treeAddress": tree.to_string(),
        "treeAuthority": authority.address.to_string(),
        "treeAuthorityBump": authority.bump,
        "collectionCpiSigner": cpi_signer.address.to_string(),
        "collectionCpiSignerBump": cpi_signer.bump,
    });

    if let Some(mint) = &args.mint {
        let mint = parse_pubkey("mint", mint)?;
        let metadata = pda::metadata_account(ids, &mint)?;
        let edition = pda::master_edition_account(ids, &mint)?;
        out["metadataAccount"] = metadata.address.to_string().into();
        out["masterEditionAccount"] = edition.address.to_string().into();
    }

    if global.json {
        return print_json(&out);
    }
    println!("tree:           {tree}");
    println!("tree authority: {} (bump {})", authority.address, authority.bump);
    println!(
        "collection cpi: {} (bump {})",
        cpi_signer.address, cpi_signer.bump
    );
    if let (Some(md), Some(me)) = (
        out.get("metadataAccount").and_then(|v| v.as_str()),
        out.get("masterEditionAccount").and_then(|v| v.as_str()),
    ) {
        println!("metadata:       {md}");
        println!("master edition: {me}");
    }
    println!(
        "{}",
        explorer::address_url(&tree.to_string(), config)
    );
    Ok(())
}
