//! # Merkle Tree命令
//!
//! Concurrent Merkle Treeアカウントの割り当て、Bubblegum TreeConfigの作成、
//! tree delegateの設定を行う命令を構築する。

use cnft_types::TreeConfigData;
use mpl_bubblegum::instructions::{CreateTreeConfigBuilder, SetTreeDelegateBuilder};
use solana_sdk::pubkey::Pubkey;

use super::{required, InstructionKind, PlannedInstruction, TransactionPlan};
use crate::config::ProgramIds;
use crate::derive::{self, DerivedAddress};
use crate::error::{CnftError, Result};

/// spl-account-compressionが受け付ける (max_depth, max_buffer_size) の組。
pub const ALLOWED_DEPTH_BUFFER_PAIRS: &[(u32, u32)] = &[
    (3, 8),
    (5, 8),
    (6, 16),
    (7, 16),
    (8, 16),
    (9, 16),
    (10, 32),
    (11, 32),
    (12, 32),
    (13, 32),
    (14, 64),
    (14, 256),
    (14, 1024),
    (14, 2048),
    (15, 64),
    (16, 64),
    (17, 64),
    (18, 64),
    (19, 64),
    (20, 64),
    (20, 256),
    (20, 1024),
    (20, 2048),
    (24, 64),
    (24, 256),
    (24, 512),
    (24, 1024),
    (24, 2048),
    (26, 512),
    (26, 1024),
    (26, 2048),
    (30, 512),
    (30, 1024),
    (30, 2048),
];

// ---------------------------------------------------------------------------
// TreeConfig
// ---------------------------------------------------------------------------

/// Merkle Treeのサイズパラメータ。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    pub max_depth: u32,
    pub max_buffer_size: u32,
    pub canopy_depth: u32,
}

impl TreeConfig {
    /// 検証して構築する。
    pub fn new(max_depth: u32, max_buffer_size: u32, canopy_depth: u32) -> Result<Self> {
        let config = Self {
            max_depth,
            max_buffer_size,
            canopy_depth,
        };
        config.validate()?;
        Ok(config)
    }

    /// depth/buffer の組とcanopy深さを検証する。
    pub fn validate(&self) -> Result<()> {
        if !ALLOWED_DEPTH_BUFFER_PAIRS.contains(&(self.max_depth, self.max_buffer_size)) {
            return Err(CnftError::InvalidInput(format!(
                "未対応のTreeサイズです (max_depth: {}, max_buffer_size: {})",
                self.max_depth, self.max_buffer_size
            )));
        }
        if self.canopy_depth >= self.max_depth {
            return Err(CnftError::InvalidInput(format!(
                "canopy_depthはmax_depth未満である必要があります (canopy_depth: {}, max_depth: {})",
                self.canopy_depth, self.max_depth
            )));
        }
        Ok(())
    }

    /// 格納可能なリーフ数（2^max_depth）。
    ///
    /// 検証を経ない値でもpanicせず、u64に収まらない深さは `u64::MAX` に丸める。
    pub fn capacity(&self) -> u64 {
        1u64.checked_shl(self.max_depth).unwrap_or(u64::MAX)
    }

    /// Merkle Treeアカウントに必要なデータサイズを計算する。
    /// spl-account-compression V1のConcurrentMerkleTreeレイアウトに基づく。
    pub fn account_size(&self) -> usize {
        let d = self.max_depth as usize;
        let b = self.max_buffer_size as usize;

        // ヘッダー: CompressionAccountType(1) + version(1) + max_buffer_size(4) +
        //   max_depth(4) + authority(32) + creation_slot(8) + padding(6)
        let header_size: usize = 2 + 54;

        // ConcurrentMerkleTree: sequence_number(8) + active_index(8) + buffer_size(8)
        let tree_header = 24;

        // ChangeLog: root(32) + path_nodes(d * 32) + index(4) + _padding(4)
        let change_log_size = d.saturating_mul(32).saturating_add(32 + 4 + 4);

        // RightMostPath: proof(d * 32) + leaf(32) + index(4) + _padding(4)
        let path_size = d.saturating_mul(32).saturating_add(32 + 4 + 4);

        // Canopy: 上位 canopy_depth 段のノード（ルート除く）
        let canopy_size = self
            .canopy_depth
            .checked_add(1)
            .and_then(|shift| 1usize.checked_shl(shift))
            .map_or(usize::MAX, |nodes| (nodes - 2).saturating_mul(32));

        (header_size + tree_header)
            .saturating_add(b.saturating_mul(change_log_size))
            .saturating_add(path_size)
            .saturating_add(canopy_size)
    }
}

impl From<TreeConfig> for TreeConfigData {
    fn from(c: TreeConfig) -> Self {
        TreeConfigData {
            max_depth: c.max_depth,
            max_buffer_size: c.max_buffer_size,
            canopy_depth: Some(c.canopy_depth),
        }
    }
}

impl TryFrom<TreeConfigData> for TreeConfig {
    type Error = CnftError;

    fn try_from(d: TreeConfigData) -> Result<Self> {
        TreeConfig::new(d.max_depth, d.max_buffer_size, d.canopy_depth.unwrap_or(0))
    }
}

/// rent-exempt minimum lamportsのオフライン概算。
/// `(128 + data_len) * 6960`
pub fn rent_exempt_minimum(data_len: usize) -> u64 {
    (data_len as u64).saturating_add(128).saturating_mul(6960)
}

// ---------------------------------------------------------------------------
// create_tree
// ---------------------------------------------------------------------------

/// Tree作成命令のビルダー。
#[derive(Debug, Clone, Default)]
pub struct CreateTreeBuilder {
    payer: Option<Pubkey>,
    merkle_tree: Option<Pubkey>,
    tree_creator: Option<Pubkey>,
    config: Option<TreeConfig>,
    lamports: Option<u64>,
    public: bool,
}

impl CreateTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fee payer兼アカウント割り当ての支払者。
    pub fn payer(&mut self, payer: Pubkey) -> &mut Self {
        self.payer = Some(payer);
        self
    }

    /// 新規Treeアカウント（署名者）。
    pub fn merkle_tree(&mut self, merkle_tree: Pubkey) -> &mut Self {
        self.merkle_tree = Some(merkle_tree);
        self
    }

    /// Tree creator。省略時はpayer。
    pub fn tree_creator(&mut self, tree_creator: Pubkey) -> &mut Self {
        self.tree_creator = Some(tree_creator);
        self
    }

    pub fn config(&mut self, config: TreeConfig) -> &mut Self {
        self.config = Some(config);
        self
    }

    /// アカウントに預けるlamports（ネットワーククライアントから取得したrent）。
    pub fn lamports(&mut self, lamports: u64) -> &mut Self {
        self.lamports = Some(lamports);
        self
    }

    /// 誰でもミントできるTreeにするか。
    pub fn public(&mut self, public: bool) -> &mut Self {
        self.public = public;
        self
    }

    pub fn build(&self, ids: &ProgramIds) -> Result<CreateTree> {
        let payer = required(self.payer, "payer")?;
        let merkle_tree = required(self.merkle_tree, "merkle_tree")?;
        let config = required(self.config, "config")?;
        let lamports = required(self.lamports, "lamports")?;
        config.validate()?;

        Ok(CreateTree {
            program_ids: *ids,
            payer,
            merkle_tree,
            tree_creator: self.tree_creator.unwrap_or(payer),
            tree_authority: derive::tree_authority(ids, &merkle_tree)?,
            config,
            lamports,
            public: self.public,
        })
    }
}

/// 検証済みのTree作成命令。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTree {
    pub program_ids: ProgramIds,
    pub payer: Pubkey,
    pub merkle_tree: Pubkey,
    pub tree_creator: Pubkey,
    pub tree_authority: DerivedAddress,
    pub config: TreeConfig,
    pub lamports: u64,
    pub public: bool,
}

impl CreateTree {
    /// 割り当て → TreeConfig作成 の2命令。
    ///
    /// 署名者: payer, merkle_tree, tree_creator
    #[allow(deprecated)]
    pub fn plan(&self) -> Result<TransactionPlan> {
        let ids = &self.program_ids;

        // 命令1: Merkle Treeアカウントの割り当て
        let allocate = solana_sdk::system_instruction::create_account(
            &self.payer,
            &self.merkle_tree,
            self.lamports,
            self.config.account_size() as u64,
            &ids.account_compression,
        );

        // 命令2: Bubblegum CreateTreeConfig
        let create = CreateTreeConfigBuilder::new()
            .tree_config(self.tree_authority.address)
            .merkle_tree(self.merkle_tree)
            .payer(self.payer)
            .tree_creator(self.tree_creator)
            .log_wrapper(ids.noop)
            .compression_program(ids.account_compression)
            .system_program(ids.system)
            .max_depth(self.config.max_depth)
            .max_buffer_size(self.config.max_buffer_size)
            .public(self.public)
            .instruction();

        TransactionPlan::new(
            self.payer,
            vec![
                PlannedInstruction {
                    kind: InstructionKind::AllocateTree,
                    instruction: allocate,
                },
                PlannedInstruction {
                    kind: InstructionKind::CreateTreeConfig,
                    instruction: create,
                },
            ],
        )
    }
}

// ---------------------------------------------------------------------------
// set_tree_delegate
// ---------------------------------------------------------------------------

/// tree delegateの変更。tree creatorが署名する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetTreeDelegate {
    pub program_ids: ProgramIds,
    pub merkle_tree: Pubkey,
    pub tree_creator: Pubkey,
    pub new_tree_delegate: Pubkey,
    pub tree_authority: DerivedAddress,
}

impl SetTreeDelegate {
    pub fn new(
        ids: &ProgramIds,
        merkle_tree: Pubkey,
        tree_creator: Pubkey,
        new_tree_delegate: Pubkey,
    ) -> Result<Self> {
        Ok(Self {
            program_ids: *ids,
            merkle_tree,
            tree_creator,
            new_tree_delegate,
            tree_authority: derive::tree_authority(ids, &merkle_tree)?,
        })
    }

    pub fn plan(&self) -> Result<TransactionPlan> {
        let ix = SetTreeDelegateBuilder::new()
            .tree_config(self.tree_authority.address)
            .tree_creator(self.tree_creator)
            .new_tree_delegate(self.new_tree_delegate)
            .merkle_tree(self.merkle_tree)
            .system_program(self.program_ids.system)
            .instruction();

        TransactionPlan::new(
            self.tree_creator,
            vec![PlannedInstruction {
                kind: InstructionKind::SetTreeDelegate,
                instruction: ix,
            }],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_size_known_values() {
        // depth 14 / buffer 64 / canopy 0 は 31,800 バイト
        let c = TreeConfig::new(14, 64, 0).unwrap();
        assert_eq!(c.account_size(), 31_800);

        // depth 5 / buffer 8 / canopy 3
        let small = TreeConfig::new(5, 8, 3).unwrap();
        assert_eq!(small.account_size(), 2_328);
        assert_eq!(small.capacity(), 32);
        // 0.01709376 SOL
        assert_eq!(rent_exempt_minimum(small.account_size()), 17_093_760);
    }

    /// 検証を経ずに組み立てた値でもpanicしない
    #[test]
    fn test_unvalidated_config_does_not_panic() {
        let huge = TreeConfig {
            max_depth: 64,
            max_buffer_size: u32::MAX,
            canopy_depth: 200,
        };
        assert!(huge.validate().is_err());
        assert_eq!(huge.capacity(), u64::MAX);
        assert_eq!(huge.account_size(), usize::MAX);

        let edge = TreeConfig {
            max_depth: 63,
            max_buffer_size: 8,
            canopy_depth: 0,
        };
        assert_eq!(edge.capacity(), 1u64 << 63);
    }

    #[test]
    fn test_tree_config_validation() {
        assert!(TreeConfig::new(20, 64, 10).is_ok());
        assert!(matches!(
            TreeConfig::new(5, 64, 0).unwrap_err(),
            CnftError::InvalidInput(_)
        ));
        assert!(TreeConfig::new(5, 8, 5).is_err());
    }

    #[test]
    fn test_tree_config_data_conversion() {
        let data = TreeConfigData {
            max_depth: 5,
            max_buffer_size: 8,
            canopy_depth: None,
        };
        let config = TreeConfig::try_from(data).unwrap();
        assert_eq!(config.canopy_depth, 0);
        let back: TreeConfigData = config.into();
        assert_eq!(back.canopy_depth, Some(0));

        let bad = TreeConfigData {
            max_depth: 4,
            max_buffer_size: 8,
            canopy_depth: None,
        };
        assert!(TreeConfig::try_from(bad).is_err());
    }

    #[test]
    fn test_create_tree_plan() {
        let ids = ProgramIds::default();
        let payer = Pubkey::new_unique();
        let tree = Pubkey::new_unique();
        let config = TreeConfig::new(14, 64, 0).unwrap();

        let create = CreateTreeBuilder::new()
            .payer(payer)
            .merkle_tree(tree)
            .config(config)
            .lamports(rent_exempt_minimum(config.account_size()))
            .build(&ids)
            .unwrap();
        assert_eq!(create.tree_creator, payer);

        let plan = create.plan().unwrap();
        assert_eq!(
            plan.kinds(),
            vec![InstructionKind::AllocateTree, InstructionKind::CreateTreeConfig]
        );

        let ixs = plan.instructions();
        // 割り当て先はaccount-compressionプログラム所有
        assert_eq!(ixs[0].program_id, ids.system);
        assert_eq!(ixs[0].accounts[1].pubkey, tree);
        assert!(ixs[0].accounts[1].is_signer);
        // TreeConfigはtree authority PDAを参照
        assert_eq!(ixs[1].program_id, ids.bubblegum);
        assert_eq!(ixs[1].accounts[0].pubkey, create.tree_authority.address);

        // 署名者: payer + tree
        assert_eq!(plan.required_signers(), vec![payer, tree]);
    }

    #[test]
    fn test_create_tree_builder_requires_fields() {
        let ids = ProgramIds::default();
        let err = CreateTreeBuilder::new()
            .payer(Pubkey::new_unique())
            .build(&ids)
            .unwrap_err();
        assert!(matches!(err, CnftError::InvalidInput(_)));
    }

    #[test]
    fn test_set_tree_delegate_plan() {
        let ids = ProgramIds::default();
        let tree = Pubkey::new_unique();
        let creator = Pubkey::new_unique();
        let delegate = Pubkey::new_unique();

        let op = SetTreeDelegate::new(&ids, tree, creator, delegate).unwrap();
        let plan = op.plan().unwrap();
        assert_eq!(plan.fee_payer(), &creator);
        assert_eq!(plan.required_signers(), vec![creator]);

        let ix = &plan.instructions()[0];
        assert_eq!(ix.program_id, ids.bubblegum);
        assert!(ix.accounts.iter().any(|m| m.pubkey == delegate && !m.is_signer));
        assert!(ix.accounts.iter().any(|m| m.pubkey == tree));
    }
}
