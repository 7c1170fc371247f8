//! # cNFT Minter 共有型定義
//!
//! 実行間で永続化されるJSONレコードと、CLIが出力するレポートの構造体を提供する。
//!
//! ## エンコーディング規則
//! - Base58: Solanaアドレス、トランザクション署名
//! - JSONのフィールド名はcamelCase（既存の `collectionData.json` / `treeConfig.json` と互換）

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// コレクション (collectionData.json)
// ---------------------------------------------------------------------------

/// コレクション作成時に書き出されるアドレス一式。
///
/// 一度作成された後は読み取り専用で、以降のミント実行の入力になる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionData {
    /// Base58エンコードされたコレクションMintアドレス
    pub mint: String,
    /// Base58エンコードされたトークンアカウントアドレス
    pub token_account: String,
    /// Base58エンコードされたMetadataアカウントアドレス
    pub metadata_account: String,
    /// Base58エンコードされたMaster Editionアカウントアドレス
    pub master_edition_account: String,
}

// ---------------------------------------------------------------------------
// Merkle Tree (treeConfig.json)
// ---------------------------------------------------------------------------

/// Tree作成時のパラメータ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeConfigData {
    /// Merkle Treeの深さ
    pub max_depth: u32,
    /// 最大バッファサイズ
    pub max_buffer_size: u32,
    /// Canopyの深さ（旧形式のファイルには存在しない）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canopy_depth: Option<u32>,
}

/// Treeアドレスを保持するJSONファイルの形式。
///
/// 以下の3形式を受け付ける:
/// - 64バイトの秘密鍵配列（`solana-keygen` 形式）
/// - Base58文字列
/// - `{ "publicKey": "..." }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeKeyFile {
    /// 秘密鍵バイト列。公開鍵は後半32バイト
    SecretKey(Vec<u8>),
    /// Base58公開鍵
    Address(String),
    /// 公開鍵フィールドを持つオブジェクト
    Object {
        #[serde(rename = "publicKey")]
        public_key: String,
    },
}

// ---------------------------------------------------------------------------
// 実行レポート
// ---------------------------------------------------------------------------

/// ミント結果のレポート。CLIが `--json` 指定時に標準出力へ書き出す。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintReport {
    /// Base58エンコードされたトランザクション署名
    pub signature: String,
    /// Base58エンコードされたMerkle Treeアドレス
    pub tree_address: String,
    /// Base58エンコードされた受取人アドレス
    pub leaf_owner: String,
    /// クライアント側で計算したdata hash（Base58）
    pub data_hash: String,
    /// クライアント側で計算したcreator hash（Base58）
    pub creator_hash: String,
    /// ブロックエクスプローラURL
    pub explorer_url: String,
}

/// 失敗したトランザクションの診断レポート。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    /// エラーメッセージ
    pub error: String,
    /// エラーから復元できたトランザクション署名
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// 取得できたプログラムログ
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,
    /// 結果が未確定（後で着地する可能性がある）かどうか
    pub ambiguous: bool,
    /// ブロックエクスプローラURL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// collectionData.json の既存レイアウトと互換であることを確認
    #[test]
    fn test_collection_data_camel_case() {
        let json = r#"{
            "mint": "So11111111111111111111111111111111111111112",
            "tokenAccount": "11111111111111111111111111111111",
            "metadataAccount": "11111111111111111111111111111111",
            "masterEditionAccount": "11111111111111111111111111111111"
        }"#;
        let data: CollectionData = serde_json::from_str(json).unwrap();
        assert_eq!(data.mint, "So11111111111111111111111111111111111111112");

        let value = serde_json::to_value(&data).unwrap();
        assert!(value.get("masterEditionAccount").is_some());
        assert!(value.get("master_edition_account").is_none());
    }

    /// canopyDepthが無い旧形式も読み込めることを確認
    #[test]
    fn test_tree_config_without_canopy() {
        let data: TreeConfigData =
            serde_json::from_str(r#"{"maxDepth": 5, "maxBufferSize": 8}"#).unwrap();
        assert_eq!(data.max_depth, 5);
        assert_eq!(data.max_buffer_size, 8);
        assert_eq!(data.canopy_depth, None);

        let out = serde_json::to_string(&data).unwrap();
        assert!(!out.contains("canopyDepth"));
    }

    #[test]
    fn test_tree_key_file_formats() {
        let arr: TreeKeyFile = serde_json::from_str("[1, 2, 3]").unwrap();
        assert_eq!(arr, TreeKeyFile::SecretKey(vec![1, 2, 3]));

        let s: TreeKeyFile =
            serde_json::from_str(r#""11111111111111111111111111111111""#).unwrap();
        assert!(matches!(s, TreeKeyFile::Address(_)));

        let obj: TreeKeyFile = serde_json::from_str(
            r#"{"publicKey": "11111111111111111111111111111111"}"#,
        )
        .unwrap();
        assert!(matches!(obj, TreeKeyFile::Object { .. }));
    }
}
