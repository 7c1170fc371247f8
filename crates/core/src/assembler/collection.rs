//! # コレクション作成命令
//!
//! コレクションNFTを2トランザクションで作成する。
//!
//! 1. Mintアカウント割り当て → initialize_mint2 → ATA作成 → 1枚ミント
//! 2. Metadata V3 → Master Edition V3 (max_supply 0) → コレクションサイズ設定
//!
//! 2つ目のトランザクションが成功した後に `CollectionRecord` を永続化する。

use std::str::FromStr;

use cnft_types::CollectionData;
use mpl_token_metadata::instructions::{
    CreateMasterEditionV3Builder, CreateMetadataAccountV3Builder, SetCollectionSizeBuilder,
};
use mpl_token_metadata::types::{Creator, DataV2, SetCollectionSizeArgs};
use solana_sdk::pubkey::Pubkey;
use spl_token::solana_program::program_pack::Pack;

use super::{required, InstructionKind, PlannedInstruction, TransactionPlan};
use crate::config::ProgramIds;
use crate::derive;
use crate::error::{CnftError, Result};
use crate::metadata::AssetMetadata;

/// コレクションサイズの既定値。
pub const DEFAULT_COLLECTION_SIZE: u64 = 50;

// ---------------------------------------------------------------------------
// CollectionRecord
// ---------------------------------------------------------------------------

/// 作成済みコレクションのアドレス一式。作成後は読み取り専用。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionRecord {
    pub mint: Pubkey,
    pub token_account: Pubkey,
    pub metadata_account: Pubkey,
    pub master_edition_account: Pubkey,
}

fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value)
        .map_err(|e| CnftError::Persist(format!("{field}が不正なアドレスです ({value}): {e}")))
}

impl TryFrom<&CollectionData> for CollectionRecord {
    type Error = CnftError;

    fn try_from(data: &CollectionData) -> Result<Self> {
        Ok(Self {
            mint: parse_pubkey("mint", &data.mint)?,
            token_account: parse_pubkey("tokenAccount", &data.token_account)?,
            metadata_account: parse_pubkey("metadataAccount", &data.metadata_account)?,
            master_edition_account: parse_pubkey(
                "masterEditionAccount",
                &data.master_edition_account,
            )?,
        })
    }
}

impl CollectionRecord {
    /// 永続化用のJSON表現へ変換する。
    pub fn to_data(&self) -> CollectionData {
        CollectionData {
            mint: self.mint.to_string(),
            token_account: self.token_account.to_string(),
            metadata_account: self.metadata_account.to_string(),
            master_edition_account: self.master_edition_account.to_string(),
        }
    }

    /// Metadata / Master Editionがmintから導出されるアドレスと一致するか確認する。
    pub fn verify_derived(&self, ids: &ProgramIds) -> Result<()> {
        let metadata = derive::metadata_account(ids, &self.mint)?;
        let edition = derive::master_edition_account(ids, &self.mint)?;
        if metadata.address != self.metadata_account {
            return Err(CnftError::InvalidInput(format!(
                "metadataAccountがmintから導出したアドレスと一致しません (期待値: {})",
                metadata.address
            )));
        }
        if edition.address != self.master_edition_account {
            return Err(CnftError::InvalidInput(format!(
                "masterEditionAccountがmintから導出したアドレスと一致しません (期待値: {})",
                edition.address
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// トランザクション1: Mint作成
// ---------------------------------------------------------------------------

/// コレクションMintの作成とトークン1枚のミント。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionMintSetup {
    pub program_ids: ProgramIds,
    pub payer: Pubkey,
    pub mint: Pubkey,
    pub token_account: Pubkey,
    pub lamports: u64,
}

impl CollectionMintSetup {
    /// Mintアカウントのデータサイズ。
    pub fn mint_space() -> usize {
        spl_token::state::Mint::LEN
    }

    /// 署名者: payer, mint
    #[allow(deprecated)]
    pub fn plan(&self) -> Result<TransactionPlan> {
        let ids = &self.program_ids;

        let create_account = solana_sdk::system_instruction::create_account(
            &self.payer,
            &self.mint,
            self.lamports,
            Self::mint_space() as u64,
            &ids.spl_token,
        );

        // decimals 0、mint/freeze authorityはpayer
        let initialize = spl_token::instruction::initialize_mint2(
            &ids.spl_token,
            &self.mint,
            &self.payer,
            Some(&self.payer),
            0,
        )
        .map_err(|e| CnftError::InvalidInput(format!("initialize_mint2の構築に失敗: {e}")))?;

        let create_ata = spl_associated_token_account::instruction::create_associated_token_account(
            &self.payer,
            &self.payer,
            &self.mint,
            &ids.spl_token,
        );

        let mint_one = spl_token::instruction::mint_to(
            &ids.spl_token,
            &self.mint,
            &self.token_account,
            &self.payer,
            &[],
            1,
        )
        .map_err(|e| CnftError::InvalidInput(format!("mint_toの構築に失敗: {e}")))?;

        TransactionPlan::new(
            self.payer,
            vec![
                PlannedInstruction {
                    kind: InstructionKind::CreateMintAccount,
                    instruction: create_account,
                },
                PlannedInstruction {
                    kind: InstructionKind::InitializeMint,
                    instruction: initialize,
                },
                PlannedInstruction {
                    kind: InstructionKind::CreateTokenAccount,
                    instruction: create_ata,
                },
                PlannedInstruction {
                    kind: InstructionKind::MintOneToken,
                    instruction: mint_one,
                },
            ],
        )
    }
}

// ---------------------------------------------------------------------------
// ビルダー
// ---------------------------------------------------------------------------

/// コレクション作成のビルダー。
#[derive(Debug, Clone, Default)]
pub struct CollectionSetupBuilder {
    payer: Option<Pubkey>,
    mint: Option<Pubkey>,
    metadata: Option<AssetMetadata>,
    mint_lamports: Option<u64>,
    collection_size: Option<u64>,
}

impl CollectionSetupBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fee payer兼mint/update/collection authority。
    pub fn payer(&mut self, payer: Pubkey) -> &mut Self {
        self.payer = Some(payer);
        self
    }

    /// 新規コレクションMint（署名者）。
    pub fn mint(&mut self, mint: Pubkey) -> &mut Self {
        self.mint = Some(mint);
        self
    }

    /// コレクションNFTのメタデータ。
    pub fn metadata(&mut self, metadata: AssetMetadata) -> &mut Self {
        self.metadata = Some(metadata);
        self
    }

    /// Mintアカウントに預けるlamports。
    pub fn mint_lamports(&mut self, lamports: u64) -> &mut Self {
        self.mint_lamports = Some(lamports);
        self
    }

    /// コレクションサイズ（既定: 50）。
    pub fn collection_size(&mut self, size: u64) -> &mut Self {
        self.collection_size = Some(size);
        self
    }

    pub fn build(&self, ids: &ProgramIds) -> Result<CollectionSetup> {
        let payer = required(self.payer, "payer")?;
        let mint = required(self.mint, "mint")?;
        let lamports = required(self.mint_lamports, "mint_lamports")?;
        let metadata = self
            .metadata
            .clone()
            .ok_or_else(|| CnftError::InvalidInput("metadataが指定されていません".into()))?;
        metadata.validate()?;

        let token_account = spl_associated_token_account::get_associated_token_address_with_program_id(
            &payer,
            &mint,
            &ids.spl_token,
        );
        let record = CollectionRecord {
            mint,
            token_account,
            metadata_account: derive::metadata_account(ids, &mint)?.address,
            master_edition_account: derive::master_edition_account(ids, &mint)?.address,
        };

        Ok(CollectionSetup {
            mint_setup: CollectionMintSetup {
                program_ids: *ids,
                payer,
                mint,
                token_account,
                lamports,
            },
            record,
            metadata,
            collection_size: self.collection_size.unwrap_or(DEFAULT_COLLECTION_SIZE),
        })
    }
}

/// 検証済みのコレクション作成操作。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSetup {
    pub mint_setup: CollectionMintSetup,
    pub record: CollectionRecord,
    pub metadata: AssetMetadata,
    /// コレクションサイズの上限。クライアント側では強制しない
    pub collection_size: u64,
}

impl CollectionSetup {
    /// トランザクション1（Mint作成）。
    pub fn mint_plan(&self) -> Result<TransactionPlan> {
        self.mint_setup.plan()
    }

    /// トランザクション2（Metadata・Master Edition・サイズ設定）。
    ///
    /// 署名者: payer
    pub fn metadata_plan(&self) -> Result<TransactionPlan> {
        let payer = self.mint_setup.payer;
        let r = &self.record;
        let m = &self.metadata;

        // サイズはオンチェーンのカウンタとして記録されるだけで、ミント数の上限としては扱わない
        tracing::info!(
            mint = %r.mint,
            size = self.collection_size,
            "コレクションサイズを設定します（クライアント側では上限を強制しません）"
        );

        let creators = if m.creators.is_empty() {
            None
        } else {
            Some(
                m.creators
                    .iter()
                    .map(|c| Creator {
                        address: c.address,
                        verified: c.verified,
                        share: c.share,
                    })
                    .collect(),
            )
        };

        let create_metadata = CreateMetadataAccountV3Builder::new()
            .metadata(r.metadata_account)
            .mint(r.mint)
            .mint_authority(payer)
            .payer(payer)
            .update_authority(payer, true)
            .data(DataV2 {
                name: m.name.clone(),
                symbol: m.symbol.clone(),
                uri: m.uri.clone(),
                seller_fee_basis_points: m.seller_fee_basis_points,
                creators,
                collection: None,
                uses: None,
            })
            .is_mutable(m.is_mutable)
            .instruction();

        let create_edition = CreateMasterEditionV3Builder::new()
            .edition(r.master_edition_account)
            .mint(r.mint)
            .update_authority(payer)
            .mint_authority(payer)
            .payer(payer)
            .metadata(r.metadata_account)
            .max_supply(0)
            .instruction();

        let set_size = SetCollectionSizeBuilder::new()
            .collection_metadata(r.metadata_account)
            .collection_authority(payer)
            .collection_mint(r.mint)
            .set_collection_size_args(SetCollectionSizeArgs {
                size: self.collection_size,
            })
            .instruction();

        TransactionPlan::new(
            payer,
            vec![
                PlannedInstruction {
                    kind: InstructionKind::CreateMetadata,
                    instruction: create_metadata,
                },
                PlannedInstruction {
                    kind: InstructionKind::CreateMasterEdition,
                    instruction: create_edition,
                },
                PlannedInstruction {
                    kind: InstructionKind::SetCollectionSize,
                    instruction: set_size,
                },
            ],
        )
    }
}
