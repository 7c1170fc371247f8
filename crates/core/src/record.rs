//! # 状態レコード
//!
//! 実行間で受け渡すJSONファイルの読み書き。
//!
//! - `collectionData.json`: コレクション作成後に一度だけ書き出し、以降は読み取り専用
//! - `treeConfig.json`: Tree作成時のサイズパラメータ
//! - Treeの鍵ファイル: 秘密鍵配列・Base58文字列・`{ "publicKey": ... }` のいずれか
//! - コレクションMintの鍵ファイル: 1つ目のトランザクションの送信前に書き出す

use std::path::Path;
use std::str::FromStr;

use cnft_types::{CollectionData, TreeConfigData, TreeKeyFile};
use serde::de::DeserializeOwned;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{write_keypair_file, Keypair};
use solana_sdk::signer::Signer;

use crate::assembler::{CollectionRecord, TreeConfig};
use crate::error::{CnftError, Result};

/// コレクションレコードの既定ファイル名。
pub const COLLECTION_FILE: &str = "collectionData.json";
/// Tree設定の既定ファイル名。
pub const TREE_CONFIG_FILE: &str = "treeConfig.json";
/// Tree鍵の既定ファイル名。
pub const TREE_KEY_FILE: &str = "merkleTreeKeypair.json";
/// コレクションMint鍵の既定ファイル名。
pub const COLLECTION_MINT_KEY_FILE: &str = "collectionMintKeypair.json";

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)
        .map_err(|e| CnftError::Persist(format!("{} の読み込みに失敗: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| CnftError::Persist(format!("{} のパースに失敗: {e}", path.display())))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CnftError::Persist(format!("JSONの生成に失敗: {e}")))?;
    std::fs::write(path, json)
        .map_err(|e| CnftError::Persist(format!("{} の書き込みに失敗: {e}", path.display())))
}

/// コレクションレコードを読み込む。
pub fn load_collection(path: &Path) -> Result<CollectionRecord> {
    let data: CollectionData = read_json(path)?;
    CollectionRecord::try_from(&data)
}

/// コレクションレコードを書き出す。既存ファイルは上書きしない。
pub fn save_collection(path: &Path, record: &CollectionRecord) -> Result<()> {
    if path.exists() {
        return Err(CnftError::Persist(format!(
            "{} は既に存在します。コレクションレコードは上書きしません",
            path.display()
        )));
    }
    write_json(path, &record.to_data())?;
    tracing::info!(path = %path.display(), mint = %record.mint, "コレクションレコードを書き出しました");
    Ok(())
}

/// Tree設定を読み込み、検証する。
pub fn load_tree_config(path: &Path) -> Result<TreeConfig> {
    let data: TreeConfigData = read_json(path)?;
    TreeConfig::try_from(data)
}

/// Tree設定を書き出す。
pub fn save_tree_config(path: &Path, config: &TreeConfig) -> Result<()> {
    write_json(path, &TreeConfigData::from(*config))
}

/// 新しく作るアカウントの鍵を書き出す。既存ファイルは上書きしない。
///
/// 送信前に呼び、トランザクションが着地した後に鍵が失われないようにする。
pub fn save_keypair(path: &Path, keypair: &Keypair) -> Result<()> {
    if path.exists() {
        return Err(CnftError::Persist(format!(
            "{} は既に存在します。前回作成したアカウントの鍵を上書きしません",
            path.display()
        )));
    }
    write_keypair_file(keypair, path)
        .map_err(|e| CnftError::Persist(format!("{} の書き込みに失敗: {e}", path.display())))?;
    tracing::info!(path = %path.display(), address = %keypair.pubkey(), "鍵を書き出しました");
    Ok(())
}

/// Tree鍵ファイルからTreeアドレスを読み取る。
pub fn load_tree_address(path: &Path) -> Result<Pubkey> {
    let file: TreeKeyFile = read_json(path)?;
    tree_address_from_key_file(&file)
}

/// 鍵ファイルの内容から公開鍵を取り出す。
///
/// 秘密鍵配列は `solana-keygen` 形式（64バイト、後半32バイトが公開鍵）。
pub fn tree_address_from_key_file(file: &TreeKeyFile) -> Result<Pubkey> {
    match file {
        TreeKeyFile::SecretKey(bytes) => {
            if bytes.len() != 64 {
                return Err(CnftError::Persist(format!(
                    "秘密鍵配列は64バイトである必要があります (実際: {}バイト)",
                    bytes.len()
                )));
            }
            let public: [u8; 32] = bytes[32..]
                .try_into()
                .map_err(|_| CnftError::Persist("公開鍵部分を取り出せません".into()))?;
            Ok(Pubkey::new_from_array(public))
        }
        TreeKeyFile::Address(s) | TreeKeyFile::Object { public_key: s } => Pubkey::from_str(s)
            .map_err(|e| CnftError::Persist(format!("不正なTreeアドレスです ({s}): {e}"))),
    }
}
