//! # コレクションへの圧縮NFTミント
//!
//! Bubblegum `mint_to_collection_v1` 命令を構築する。
//!
//! 送信するメタデータの `collection.verified` は必ず `false` にする。
//! Bubblegumはミントの副作用としてコレクションを検証し、検証済みで届いた
//! ペイロードは拒否する。

use mpl_bubblegum::instructions::MintToCollectionV1Builder;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;

use super::collection::CollectionRecord;
use super::{required, InstructionKind, PlannedInstruction, TransactionPlan};
use crate::config::ProgramIds;
use crate::derive::{self, DerivedAddress};
use crate::error::{CnftError, Result};
use crate::hash::{self, ContentHash, CreatorHash};
use crate::metadata::{AssetMetadata, CollectionRef};

/// 1回のミント要求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintOperation {
    /// 受取人（leaf owner）
    pub receiver: Pubkey,
    pub metadata: AssetMetadata,
    /// ミント先のMerkle Tree
    pub tree: Pubkey,
    /// ミント先のコレクション
    pub collection: CollectionRecord,
}

/// `mint_to_collection_v1` のビルダー。
///
/// payer以外の権限（tree delegate、collection authority、leaf delegate）と
/// leaf ownerは省略時にpayerになる。
#[derive(Debug, Clone, Default)]
pub struct MintToCollectionBuilder {
    payer: Option<Pubkey>,
    merkle_tree: Option<Pubkey>,
    tree_delegate: Option<Pubkey>,
    leaf_owner: Option<Pubkey>,
    leaf_delegate: Option<Pubkey>,
    collection_authority: Option<Pubkey>,
    collection: Option<CollectionRecord>,
    metadata: Option<AssetMetadata>,
}

impl MintToCollectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `MintOperation` の内容を設定したビルダー。
    pub fn from_operation(op: &MintOperation, payer: Pubkey) -> Self {
        let mut builder = Self::new();
        builder
            .payer(payer)
            .merkle_tree(op.tree)
            .leaf_owner(op.receiver)
            .collection(op.collection)
            .metadata(op.metadata.clone());
        builder
    }

    pub fn payer(&mut self, payer: Pubkey) -> &mut Self {
        self.payer = Some(payer);
        self
    }

    pub fn merkle_tree(&mut self, merkle_tree: Pubkey) -> &mut Self {
        self.merkle_tree = Some(merkle_tree);
        self
    }

    /// Tree creatorまたはdelegate（署名者）。
    pub fn tree_delegate(&mut self, tree_delegate: Pubkey) -> &mut Self {
        self.tree_delegate = Some(tree_delegate);
        self
    }

    pub fn leaf_owner(&mut self, leaf_owner: Pubkey) -> &mut Self {
        self.leaf_owner = Some(leaf_owner);
        self
    }

    pub fn leaf_delegate(&mut self, leaf_delegate: Pubkey) -> &mut Self {
        self.leaf_delegate = Some(leaf_delegate);
        self
    }

    /// コレクションのupdate authority（署名者）。
    pub fn collection_authority(&mut self, collection_authority: Pubkey) -> &mut Self {
        self.collection_authority = Some(collection_authority);
        self
    }

    pub fn collection(&mut self, collection: CollectionRecord) -> &mut Self {
        self.collection = Some(collection);
        self
    }

    pub fn metadata(&mut self, metadata: AssetMetadata) -> &mut Self {
        self.metadata = Some(metadata);
        self
    }

    /// 必須フィールドとメタデータを検証し、不変の命令値を返す。
    ///
    /// - `collection.verified == true` は `InvalidInput`
    /// - `collection.key` がコレクションMintと異なる場合は `InvalidInput`
    /// - `collection` が未設定なら `{ key: mint, verified: false }` を補う
    pub fn build(&self, ids: &ProgramIds) -> Result<MintToCollection> {
        let payer = required(self.payer, "payer")?;
        let merkle_tree = required(self.merkle_tree, "merkle_tree")?;
        let collection = required(self.collection, "collection")?;
        let mut metadata = self
            .metadata
            .clone()
            .ok_or_else(|| CnftError::InvalidInput("metadataが指定されていません".into()))?;

        metadata.validate()?;

        match metadata.collection {
            Some(c) if c.verified => {
                return Err(CnftError::InvalidInput(
                    "コレクションへのミントではcollection.verifiedをfalseにする必要があります".into(),
                ));
            }
            Some(c) if c.key != collection.mint => {
                return Err(CnftError::InvalidInput(format!(
                    "collection.keyがコレクションMintと一致しません (key: {}, mint: {})",
                    c.key, collection.mint
                )));
            }
            Some(_) => {}
            None => {
                metadata.collection = Some(CollectionRef {
                    key: collection.mint,
                    verified: false,
                });
            }
        }

        let data_hash = hash::hash_content(&metadata)?;
        let creator_hash = hash::hash_creators(&metadata.creators);
        tracing::info!(
            data_hash = %data_hash,
            creator_hash = %creator_hash,
            "クライアント側でリーフハッシュを計算しました"
        );

        Ok(MintToCollection {
            program_ids: *ids,
            payer,
            merkle_tree,
            tree_authority: derive::tree_authority(ids, &merkle_tree)?,
            bubblegum_signer: derive::collection_cpi_signer(ids)?,
            tree_delegate: self.tree_delegate.unwrap_or(payer),
            leaf_owner: self.leaf_owner.unwrap_or(payer),
            leaf_delegate: self.leaf_delegate.unwrap_or(payer),
            collection_authority: self.collection_authority.unwrap_or(payer),
            collection,
            metadata,
            data_hash,
            creator_hash,
        })
    }
}

/// 検証済みのミント命令値。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintToCollection {
    pub program_ids: ProgramIds,
    pub payer: Pubkey,
    pub merkle_tree: Pubkey,
    pub tree_authority: DerivedAddress,
    pub bubblegum_signer: DerivedAddress,
    pub tree_delegate: Pubkey,
    pub leaf_owner: Pubkey,
    pub leaf_delegate: Pubkey,
    pub collection_authority: Pubkey,
    pub collection: CollectionRecord,
    /// 送信するメタデータ（collectionは未検証）
    pub metadata: AssetMetadata,
    /// 診断用のdata hash
    pub data_hash: ContentHash,
    /// 診断用のcreator hash
    pub creator_hash: CreatorHash,
}

impl MintToCollection {
    /// 命令が参照するアカウントを、プログラムが要求する順で役割名と共に返す。
    pub fn account_roles(&self) -> Vec<(&'static str, Pubkey)> {
        let ids = &self.program_ids;
        vec![
            ("tree_config", self.tree_authority.address),
            ("leaf_owner", self.leaf_owner),
            ("leaf_delegate", self.leaf_delegate),
            ("merkle_tree", self.merkle_tree),
            ("payer", self.payer),
            ("tree_creator_or_delegate", self.tree_delegate),
            ("collection_authority", self.collection_authority),
            // collection authority recordを使わない場合はBubblegumのIDを置く
            ("collection_authority_record_pda", ids.bubblegum),
            ("collection_mint", self.collection.mint),
            ("collection_metadata", self.collection.metadata_account),
            ("collection_edition", self.collection.master_edition_account),
            ("bubblegum_signer", self.bubblegum_signer.address),
            ("log_wrapper", ids.noop),
            ("compression_program", ids.account_compression),
            ("token_metadata_program", ids.token_metadata),
            ("system_program", ids.system),
        ]
    }

    pub fn instruction(&self) -> Instruction {
        let ids = &self.program_ids;
        MintToCollectionV1Builder::new()
            .tree_config(self.tree_authority.address)
            .leaf_owner(self.leaf_owner)
            .leaf_delegate(self.leaf_delegate)
            .merkle_tree(self.merkle_tree)
            .payer(self.payer)
            .tree_creator_or_delegate(self.tree_delegate)
            .collection_authority(self.collection_authority)
            .collection_authority_record_pda(None)
            .collection_mint(self.collection.mint)
            .collection_metadata(self.collection.metadata_account)
            .collection_edition(self.collection.master_edition_account)
            .bubblegum_signer(self.bubblegum_signer.address)
            .log_wrapper(ids.noop)
            .compression_program(ids.account_compression)
            .token_metadata_program(ids.token_metadata)
            .system_program(ids.system)
            .metadata(self.metadata.to_metadata_args())
            .instruction()
    }

    /// 1命令のトランザクション計画。
    ///
    /// 署名者: payer, tree delegate, collection authority
    pub fn plan(&self) -> Result<TransactionPlan> {
        TransactionPlan::new(
            self.payer,
            vec![PlannedInstruction {
                kind: InstructionKind::MintToCollection,
                instruction: self.instruction(),
            }],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::canonical_encoding;

    struct Fixture {
        ids: ProgramIds,
        payer: Pubkey,
        receiver: Pubkey,
        tree: Pubkey,
        collection: CollectionRecord,
    }

    fn fixture() -> Fixture {
        let ids = ProgramIds::default();
        let mint = Pubkey::new_unique();
        Fixture {
            ids,
            payer: Pubkey::new_unique(),
            receiver: Pubkey::new_unique(),
            tree: Pubkey::new_unique(),
            collection: CollectionRecord {
                mint,
                token_account: Pubkey::new_unique(),
                metadata_account: derive::metadata_account(&ids, &mint).unwrap().address,
                master_edition_account: derive::master_edition_account(&ids, &mint)
                    .unwrap()
                    .address,
            },
        }
    }

    fn operation(f: &Fixture) -> MintOperation {
        MintOperation {
            receiver: f.receiver,
            metadata: AssetMetadata::new(
                "Test God #1",
                "Test God",
                "https://arweave.net/dZERmvgaY1swOJkiOzf6UB4JXBIDDRZiXl78h-eZivo",
            )
            .with_creator(f.payer, 100),
            tree: f.tree,
            collection: f.collection,
        }
    }

    #[test]
    fn test_mint_to_collection_accounts() {
        let f = fixture();
        let mint = MintToCollectionBuilder::from_operation(&operation(&f), f.payer)
            .build(&f.ids)
            .unwrap();
        let plan = mint.plan().unwrap();

        assert_eq!(plan.kinds(), vec![InstructionKind::MintToCollection]);
        let ixs = plan.instructions();
        assert_eq!(ixs.len(), 1);
        let ix = &ixs[0];
        assert_eq!(ix.program_id, f.ids.bubblegum);

        // 役割の並びと命令のアカウント順が一致する
        let roles = mint.account_roles();
        assert_eq!(ix.accounts.len(), 16);
        assert_eq!(roles.len(), 16);
        for (meta, (role, key)) in ix.accounts.iter().zip(roles.iter()) {
            assert_eq!(meta.pubkey, *key, "role {role}");
        }

        // コレクション関連のアカウントは {M, MD, ME}
        assert_eq!(ix.accounts[8].pubkey, f.collection.mint);
        assert_eq!(ix.accounts[9].pubkey, f.collection.metadata_account);
        assert_eq!(ix.accounts[10].pubkey, f.collection.master_edition_account);
        assert_eq!(ix.accounts[1].pubkey, f.receiver);

        // 署名者はpayerのみ（delegate・authorityもpayer）
        assert_eq!(plan.required_signers(), vec![f.payer]);
        assert!(ix.accounts[5].is_signer);
        assert!(ix.accounts[6].is_signer);
        assert!(!ix.accounts[1].is_signer);
    }

    #[test]
    fn test_payload_has_unverified_collection() {
        let f = fixture();
        let mint = MintToCollectionBuilder::from_operation(&operation(&f), f.payer)
            .build(&f.ids)
            .unwrap();

        let collection = mint.metadata.collection.unwrap();
        assert_eq!(collection.key, f.collection.mint);
        assert!(!collection.verified);

        // 命令データ = 8バイトの判別子 + MetadataArgs
        let ix = mint.instruction();
        assert_eq!(&ix.data[8..], canonical_encoding(&mint.metadata).unwrap().as_slice());
        assert_eq!(mint.data_hash, hash::hash_content(&mint.metadata).unwrap());
    }

    #[test]
    fn test_verified_collection_rejected() {
        let f = fixture();
        let mut op = operation(&f);
        op.metadata.collection = Some(CollectionRef {
            key: f.collection.mint,
            verified: true,
        });

        let err = MintToCollectionBuilder::from_operation(&op, f.payer)
            .build(&f.ids)
            .unwrap_err();
        assert!(matches!(err, CnftError::InvalidInput(_)));
    }

    #[test]
    fn test_collection_key_mismatch_rejected() {
        let f = fixture();
        let mut op = operation(&f);
        op.metadata.collection = Some(CollectionRef {
            key: Pubkey::new_unique(),
            verified: false,
        });
        assert!(MintToCollectionBuilder::from_operation(&op, f.payer)
            .build(&f.ids)
            .is_err());
    }

    #[test]
    fn test_creator_shares_checked_before_build() {
        let f = fixture();
        let mut op = operation(&f);
        op.metadata.creators[0].share = 99;
        let err = MintToCollectionBuilder::from_operation(&op, f.payer)
            .build(&f.ids)
            .unwrap_err();
        assert!(matches!(err, CnftError::InvalidInput(_)));

        op.metadata = op
            .metadata
            .clone()
            .with_creator(Pubkey::new_unique(), 1);
        assert!(MintToCollectionBuilder::from_operation(&op, f.payer)
            .build(&f.ids)
            .is_ok());
    }

    #[test]
    fn test_separate_tree_delegate_is_signer() {
        let f = fixture();
        let delegate = Pubkey::new_unique();
        let mint = MintToCollectionBuilder::from_operation(&operation(&f), f.payer)
            .tree_delegate(delegate)
            .build(&f.ids)
            .unwrap();
        let plan = mint.plan().unwrap();
        assert_eq!(plan.required_signers(), vec![f.payer, delegate]);
        assert!(plan.ensure_signers(&[f.payer]).is_err());
    }

    #[test]
    fn test_missing_required_field() {
        let f = fixture();
        let err = MintToCollectionBuilder::new()
            .payer(f.payer)
            .collection(f.collection)
            .build(&f.ids)
            .unwrap_err();
        assert!(matches!(err, CnftError::InvalidInput(_)));
    }
}
