//! # アセットメタデータ
//!
//! 圧縮NFTのメタデータとcreator一覧。ネットワーク呼び出し前に検証を行い、
//! Bubblegumの `MetadataArgs` へ変換する。

use mpl_bubblegum::types::{
    Collection, Creator, MetadataArgs, TokenProgramVersion, TokenStandard, UseMethod, Uses,
};
use solana_sdk::pubkey::Pubkey;

use crate::error::{CnftError, Result};

/// 名前の最大バイト長
pub const MAX_NAME_LENGTH: usize = 32;
/// シンボルの最大バイト長
pub const MAX_SYMBOL_LENGTH: usize = 10;
/// URIの最大バイト長
pub const MAX_URI_LENGTH: usize = 200;
/// creatorの最大数
pub const MAX_CREATOR_LIMIT: usize = 5;
/// royaltyの上限（basis points）
pub const MAX_BASIS_POINTS: u16 = 10_000;

/// creator一覧の要素。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatorEntry {
    pub address: Pubkey,
    pub verified: bool,
    /// 0〜100のシェア（%）
    pub share: u8,
}

/// コレクションへの参照。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionRef {
    /// コレクションMint
    pub key: Pubkey,
    /// 検証済みフラグ。コレクションへのミント時はfalseで送る
    pub verified: bool,
}

/// 使用回数制限への参照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsesRef {
    pub use_method: UseMethod,
    pub remaining: u64,
    pub total: u64,
}

/// 圧縮NFTのメタデータ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMetadata {
    pub name: String,
    pub symbol: String,
    pub uri: String,
    pub seller_fee_basis_points: u16,
    pub creators: Vec<CreatorEntry>,
    pub is_mutable: bool,
    pub primary_sale_happened: bool,
    pub edition_nonce: Option<u8>,
    pub token_standard: Option<TokenStandard>,
    pub collection: Option<CollectionRef>,
    pub uses: Option<UsesRef>,
}

impl AssetMetadata {
    /// NonFungible・イミュータブル・royalty 0の既定値で作る。
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            uri: uri.into(),
            seller_fee_basis_points: 0,
            creators: Vec::new(),
            is_mutable: false,
            primary_sale_happened: false,
            edition_nonce: Some(0),
            token_standard: Some(TokenStandard::NonFungible),
            collection: None,
            uses: None,
        }
    }

    /// creatorを追加する。
    pub fn with_creator(mut self, address: Pubkey, share: u8) -> Self {
        self.creators.push(CreatorEntry {
            address,
            verified: false,
            share,
        });
        self
    }

    /// royaltyを設定する。
    pub fn with_royalty(mut self, basis_points: u16) -> Self {
        self.seller_fee_basis_points = basis_points;
        self
    }

    /// フィールド長・royalty・creatorシェアを検証する。
    pub fn validate(&self) -> Result<()> {
        if self.name.len() > MAX_NAME_LENGTH {
            return Err(CnftError::InvalidInput(format!(
                "nameは{MAX_NAME_LENGTH}バイト以内である必要があります: {}",
                self.name
            )));
        }
        if self.symbol.len() > MAX_SYMBOL_LENGTH {
            return Err(CnftError::InvalidInput(format!(
                "symbolは{MAX_SYMBOL_LENGTH}バイト以内である必要があります: {}",
                self.symbol
            )));
        }
        if self.uri.len() > MAX_URI_LENGTH {
            return Err(CnftError::InvalidInput(format!(
                "uriは{MAX_URI_LENGTH}バイト以内である必要があります"
            )));
        }
        if self.seller_fee_basis_points > MAX_BASIS_POINTS {
            return Err(CnftError::InvalidInput(format!(
                "seller_fee_basis_pointsは0〜{MAX_BASIS_POINTS}である必要があります: {}",
                self.seller_fee_basis_points
            )));
        }
        validate_creators(&self.creators)
    }

    /// BubblegumのMetadataArgsへ変換する。
    pub fn to_metadata_args(&self) -> MetadataArgs {
        MetadataArgs {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            uri: self.uri.clone(),
            seller_fee_basis_points: self.seller_fee_basis_points,
            primary_sale_happened: self.primary_sale_happened,
            is_mutable: self.is_mutable,
            edition_nonce: self.edition_nonce,
            token_standard: self.token_standard.clone(),
            collection: self.collection.map(|c| Collection {
                verified: c.verified,
                key: c.key,
            }),
            uses: self.uses.as_ref().map(|u| Uses {
                use_method: u.use_method.clone(),
                remaining: u.remaining,
                total: u.total,
            }),
            token_program_version: TokenProgramVersion::Original,
            creators: self
                .creators
                .iter()
                .map(|c| Creator {
                    address: c.address,
                    verified: c.verified,
                    share: c.share,
                })
                .collect(),
        }
    }
}

/// creator一覧を検証する。
///
/// - 最大5件
/// - 各シェアは0〜100
/// - 空でない場合、シェア合計はちょうど100
/// - アドレスの重複は不可
pub fn validate_creators(creators: &[CreatorEntry]) -> Result<()> {
    if creators.is_empty() {
        return Ok(());
    }
    if creators.len() > MAX_CREATOR_LIMIT {
        return Err(CnftError::InvalidInput(format!(
            "creatorは{MAX_CREATOR_LIMIT}件までです (指定: {}件)",
            creators.len()
        )));
    }
    if let Some(c) = creators.iter().find(|c| c.share > 100) {
        return Err(CnftError::InvalidInput(format!(
            "creator {} のshareが100を超えています: {}",
            c.address, c.share
        )));
    }
    for (i, c) in creators.iter().enumerate() {
        if creators[..i].iter().any(|prev| prev.address == c.address) {
            return Err(CnftError::InvalidInput(format!(
                "creator {} が重複しています",
                c.address
            )));
        }
    }
    let total: u32 = creators.iter().map(|c| c.share as u32).sum();
    if total != 100 {
        return Err(CnftError::InvalidInput(format!(
            "creatorのshare合計は100である必要があります (合計: {total})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creators(shares: &[u8]) -> Vec<CreatorEntry> {
        shares
            .iter()
            .map(|&share| CreatorEntry {
                address: Pubkey::new_unique(),
                verified: false,
                share,
            })
            .collect()
    }

    #[test]
    fn test_creator_shares_must_sum_to_100() {
        assert!(validate_creators(&creators(&[100])).is_ok());
        assert!(validate_creators(&creators(&[60, 40])).is_ok());
        assert!(validate_creators(&creators(&[20, 20, 20, 20, 20])).is_ok());
        assert!(validate_creators(&[]).is_ok());

        for shares in [&[99][..], &[50, 49], &[60, 60], &[0]] {
            let err = validate_creators(&creators(shares)).unwrap_err();
            assert!(matches!(err, CnftError::InvalidInput(_)), "shares={shares:?}");
        }
    }

    #[test]
    fn test_creator_limits() {
        // 6件
        let err = validate_creators(&creators(&[10, 10, 20, 20, 20, 20])).unwrap_err();
        assert!(matches!(err, CnftError::InvalidInput(_)));

        // share > 100
        let err = validate_creators(&creators(&[150])).unwrap_err();
        assert!(matches!(err, CnftError::InvalidInput(_)));

        // 重複アドレス
        let addr = Pubkey::new_unique();
        let dup = vec![
            CreatorEntry { address: addr, verified: false, share: 50 },
            CreatorEntry { address: addr, verified: false, share: 50 },
        ];
        assert!(validate_creators(&dup).is_err());
    }

    #[test]
    fn test_royalty_range() {
        let payer = Pubkey::new_unique();
        let ok = AssetMetadata::new("Test God #1", "TG", "https://arweave.net/x")
            .with_creator(payer, 100)
            .with_royalty(MAX_BASIS_POINTS);
        assert!(ok.validate().is_ok());

        let too_high = ok.clone().with_royalty(MAX_BASIS_POINTS + 1);
        assert!(matches!(
            too_high.validate().unwrap_err(),
            CnftError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_field_lengths() {
        let long_name = AssetMetadata::new("x".repeat(33), "S", "u");
        assert!(long_name.validate().is_err());
        let long_symbol = AssetMetadata::new("n", "SYMBOLSYMBOL", "u");
        assert!(long_symbol.validate().is_err());
        let long_uri = AssetMetadata::new("n", "S", "u".repeat(201));
        assert!(long_uri.validate().is_err());
    }

    #[test]
    fn test_to_metadata_args() {
        let payer = Pubkey::new_unique();
        let collection = Pubkey::new_unique();
        let mut metadata =
            AssetMetadata::new("Test God #1", "Test God", "https://arweave.net/x")
                .with_creator(payer, 100);
        metadata.collection = Some(CollectionRef {
            key: collection,
            verified: false,
        });

        let args = metadata.to_metadata_args();
        assert_eq!(args.name, "Test God #1");
        assert_eq!(args.creators.len(), 1);
        assert_eq!(args.creators[0].address, payer);
        let c = args.collection.unwrap();
        assert_eq!(c.key, collection);
        assert!(!c.verified);
        assert_eq!(args.token_program_version, TokenProgramVersion::Original);
    }
}
