//! # リーフ内容ハッシュ
//!
//! メタデータとcreator一覧からBubblegumのdata hash / creator hashを計算する。
//!
//! 正規エンコーディングは `MetadataArgs` のborshシリアライズで、
//! フィールド順・長さプレフィックス・LE固定幅整数は呼び出し側の表現に依存しない。
//! ここで計算したハッシュは診断用であり、正はオンチェーンで再計算される値である。

use std::fmt;

use base58::ToBase58;
use mpl_bubblegum::types::{Creator, MetadataArgs};
use solana_sdk::keccak;

use crate::error::{CnftError, Result};
use crate::metadata::{AssetMetadata, CreatorEntry};

/// メタデータのdata hash。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(pub [u8; 32]);

/// creator一覧のcreator hash。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CreatorHash(pub [u8; 32]);

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_base58())
    }
}

impl fmt::Display for CreatorHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_base58())
    }
}

fn encode_args(args: &MetadataArgs) -> Result<Vec<u8>> {
    borsh::to_vec(args)
        .map_err(|e| CnftError::Serialize(format!("MetadataArgsのエンコードに失敗: {e}")))
}

/// メタデータの正規エンコーディング（`MetadataArgs` のborsh表現）を返す。
///
/// ミント命令のデータ部（判別子8バイトの後）と一致する。
pub fn canonical_encoding(metadata: &AssetMetadata) -> Result<Vec<u8>> {
    encode_args(&metadata.to_metadata_args())
}

/// 正規エンコーディング済みのバイト列からdata hashを計算する。
///
/// `keccak(keccak(encoding) || seller_fee_basis_points(u16 LE))`
pub fn hash_encoded(encoding: &[u8], seller_fee_basis_points: u16) -> ContentHash {
    let args_hash = keccak::hashv(&[encoding]).to_bytes();
    let fee = seller_fee_basis_points.to_le_bytes();
    ContentHash(keccak::hashv(&[&args_hash, &fee]).to_bytes())
}

/// メタデータのdata hashを計算する。
pub fn hash_content(metadata: &AssetMetadata) -> Result<ContentHash> {
    mpl_bubblegum::hash::hash_metadata(&metadata.to_metadata_args())
        .map(ContentHash)
        .map_err(|e| CnftError::Serialize(format!("data hashの計算に失敗: {e}")))
}

/// creator一覧のcreator hashを計算する（順序は入力のまま）。
pub fn hash_creators(creators: &[CreatorEntry]) -> CreatorHash {
    let creators: Vec<Creator> = creators
        .iter()
        .map(|c| Creator {
            address: c.address,
            verified: c.verified,
            share: c.share,
        })
        .collect();
    CreatorHash(mpl_bubblegum::hash::hash_creators(&creators))
}
