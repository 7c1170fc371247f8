//! # 命令組み立て
//!
//! Bubblegum / Token Metadata / SPL Token の命令を、プログラムが要求する
//! アカウント順序・署名者フラグで構築する。
//!
//! ## 構成
//! - `tree`: Merkle Treeの割り当て・TreeConfig作成・tree delegate設定
//! - `collection`: コレクションMint・Metadata・Master Edition・コレクションサイズ
//! - `mint`: コレクションへの圧縮NFTミント
//!
//! 各ビルダーは必須フィールドを検証してから不変の値を返す。
//! 命令列は `TransactionPlan` にまとめ、順序制約と署名者を送信前に検証する。

pub mod collection;
pub mod mint;
pub mod tree;

use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;

use crate::error::{CnftError, Result};

pub use collection::{CollectionMintSetup, CollectionRecord, CollectionSetup, CollectionSetupBuilder};
pub use mint::{MintOperation, MintToCollection, MintToCollectionBuilder};
pub use tree::{CreateTree, CreateTreeBuilder, SetTreeDelegate, TreeConfig};

/// ビルダーの必須フィールドを取り出す。
pub(crate) fn required<T: Copy>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| CnftError::InvalidInput(format!("{name}が指定されていません")))
}

// ---------------------------------------------------------------------------
// 命令の種類と順序制約
// ---------------------------------------------------------------------------

/// トランザクション内の命令の種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionKind {
    /// Merkle Treeアカウントの割り当て（system create_account）
    AllocateTree,
    /// Bubblegum create_tree_config
    CreateTreeConfig,
    /// Bubblegum set_tree_delegate
    SetTreeDelegate,
    /// Bubblegum mint_to_collection_v1
    MintToCollection,
    /// コレクションMintアカウントの割り当て（system create_account）
    CreateMintAccount,
    /// SPL Token initialize_mint2
    InitializeMint,
    /// Associated Token Accountの作成
    CreateTokenAccount,
    /// SPL Token mint_to（1枚）
    MintOneToken,
    /// Token Metadata create_metadata_account_v3
    CreateMetadata,
    /// Token Metadata create_master_edition_v3
    CreateMasterEdition,
    /// Token Metadata set_collection_size
    SetCollectionSize,
}

impl InstructionKind {
    /// 同じトランザクションに含まれる場合、この命令より前に置く必要がある命令。
    fn prerequisites(&self) -> &'static [InstructionKind] {
        use InstructionKind::*;
        match self {
            CreateTreeConfig => &[AllocateTree],
            SetTreeDelegate | MintToCollection => &[AllocateTree, CreateTreeConfig],
            InitializeMint => &[CreateMintAccount],
            CreateTokenAccount => &[InitializeMint],
            MintOneToken => &[InitializeMint, CreateTokenAccount],
            CreateMetadata => &[InitializeMint],
            CreateMasterEdition => &[CreateMetadata, MintOneToken],
            SetCollectionSize => &[CreateMetadata, CreateMasterEdition],
            AllocateTree | CreateMintAccount => &[],
        }
    }

    /// アカウントを新規に割り当てる命令なら、割り当て対象のアカウント位置。
    fn allocated_account_index(&self) -> Option<usize> {
        match self {
            // system create_account: [from, to]
            InstructionKind::AllocateTree | InstructionKind::CreateMintAccount => Some(1),
            _ => None,
        }
    }
}

/// 命令と種類の組。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedInstruction {
    pub kind: InstructionKind,
    pub instruction: Instruction,
}

/// 1トランザクション分の順序付き命令列。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPlan {
    fee_payer: Pubkey,
    steps: Vec<PlannedInstruction>,
}

impl TransactionPlan {
    /// 順序制約を検証して構築する。
    ///
    /// - 各命令の前提命令が同じ計画に含まれる場合、必ずそれより前にある
    /// - 割り当て命令より前に、割り当て対象のアカウントを参照する命令は無い
    pub fn new(fee_payer: Pubkey, steps: Vec<PlannedInstruction>) -> Result<Self> {
        if steps.is_empty() {
            return Err(CnftError::InvalidInput("命令が空です".into()));
        }

        for (i, step) in steps.iter().enumerate() {
            for prereq in step.kind.prerequisites() {
                if let Some(pos) = steps.iter().position(|s| s.kind == *prereq) {
                    if pos > i {
                        return Err(CnftError::InvalidInput(format!(
                            "{:?} は {:?} より後に置く必要があります",
                            step.kind, prereq
                        )));
                    }
                }
            }

            if let Some(idx) = step.kind.allocated_account_index() {
                let allocated = step
                    .instruction
                    .accounts
                    .get(idx)
                    .map(|m| m.pubkey)
                    .ok_or_else(|| {
                        CnftError::InvalidInput(format!("{:?} のアカウントが不足しています", step.kind))
                    })?;
                let used_before = steps[..i]
                    .iter()
                    .any(|s| s.instruction.accounts.iter().any(|m| m.pubkey == allocated));
                if used_before {
                    return Err(CnftError::InvalidInput(format!(
                        "アカウント {allocated} は割り当て前に参照されています"
                    )));
                }
            }
        }

        Ok(Self { fee_payer, steps })
    }

    /// Fee payer。
    pub fn fee_payer(&self) -> &Pubkey {
        &self.fee_payer
    }

    /// 種類付きの命令列。
    pub fn steps(&self) -> &[PlannedInstruction] {
        &self.steps
    }

    /// 命令の種類の並び。
    pub fn kinds(&self) -> Vec<InstructionKind> {
        self.steps.iter().map(|s| s.kind).collect()
    }

    /// 命令列（順序はそのまま）。
    pub fn instructions(&self) -> Vec<Instruction> {
        self.steps.iter().map(|s| s.instruction.clone()).collect()
    }

    /// 署名が必要な公開鍵一覧（fee payerが先頭、重複なし）。
    pub fn required_signers(&self) -> Vec<Pubkey> {
        let mut signers = vec![self.fee_payer];
        for meta in self.steps.iter().flat_map(|s| s.instruction.accounts.iter()) {
            if meta.is_signer && !signers.contains(&meta.pubkey) {
                signers.push(meta.pubkey);
            }
        }
        signers
    }

    /// 署名者フラグ付きの全アカウントが署名者セットに含まれることを確認する。
    pub fn ensure_signers(&self, available: &[Pubkey]) -> Result<()> {
        let missing: Vec<String> = self
            .required_signers()
            .into_iter()
            .filter(|pk| !available.contains(pk))
            .map(|pk| pk.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CnftError::MissingSignature(missing.join(", ")))
        }
    }
}
