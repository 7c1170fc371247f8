//! # PDA導出
//!
//! seedと所有プログラムIDから決定論的にProgram Derived Addressを計算する。
//! bumpを255から0へ順に試し、ed25519曲線外になった最初のアドレスを採用する。
//! ネットワーク呼び出しは行わない。

use solana_sdk::pubkey::{Pubkey, PubkeyError, MAX_SEEDS, MAX_SEED_LEN};

use crate::config::ProgramIds;
use crate::error::{CnftError, Result};

/// Bubblegumがコレクションミント時のCPI署名者に使うseed。
pub const COLLECTION_CPI_SEED: &[u8] = b"collection_cpi";
/// Token MetadataのMetadataアカウントseed。
pub const METADATA_SEED: &[u8] = b"metadata";
/// Token MetadataのEditionアカウントseed。
pub const EDITION_SEED: &[u8] = b"edition";

/// 導出されたアドレスと、それを生成した入力。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    /// 曲線外のアドレス
    pub address: Pubkey,
    /// 使用したbump
    pub bump: u8,
    /// bumpを含まないseed列
    pub seeds: Vec<Vec<u8>>,
    /// 所有プログラム
    pub program: Pubkey,
}

/// seed列と所有プログラムからPDAを導出する。
///
/// seed数やseed長がプログラムの上限を超える場合は `InvalidInput`、
/// 全てのbumpが曲線上の点になった場合は `Derivation` を返す。
pub fn derive(seeds: &[&[u8]], program: &Pubkey) -> Result<DerivedAddress> {
    // bump分の1枠を残す
    if seeds.len() >= MAX_SEEDS {
        return Err(CnftError::InvalidInput(format!(
            "seedは{}個までです (指定: {}個)",
            MAX_SEEDS - 1,
            seeds.len()
        )));
    }
    if let Some(seed) = seeds.iter().find(|s| s.len() > MAX_SEED_LEN) {
        return Err(CnftError::InvalidInput(format!(
            "seedは{}バイトまでです (指定: {}バイト)",
            MAX_SEED_LEN,
            seed.len()
        )));
    }

    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut candidate: Vec<&[u8]> = Vec::with_capacity(seeds.len() + 1);
        candidate.extend_from_slice(seeds);
        candidate.push(&bump_seed);

        match Pubkey::create_program_address(&candidate, program) {
            Ok(address) => {
                return Ok(DerivedAddress {
                    address,
                    bump,
                    seeds: seeds.iter().map(|s| s.to_vec()).collect(),
                    program: *program,
                })
            }
            // 曲線上の点。次のbumpへ
            Err(PubkeyError::InvalidSeeds) => continue,
            Err(e) => return Err(CnftError::InvalidInput(format!("PDA導出に失敗: {e}"))),
        }
    }

    Err(CnftError::Derivation {
        program: program.to_string(),
        seed_count: seeds.len(),
    })
}

// ---------------------------------------------------------------------------
// プロトコル固有のPDA
// ---------------------------------------------------------------------------

/// Bubblegum tree authority (tree_config) PDA。
/// seeds = [merkle_tree], program = Bubblegum
pub fn tree_authority(ids: &ProgramIds, merkle_tree: &Pubkey) -> Result<DerivedAddress> {
    derive(&[merkle_tree.as_ref()], &ids.bubblegum)
}

/// Bubblegumのコレクション用CPI署名者PDA。
/// seeds = [b"collection_cpi"], program = Bubblegum
pub fn collection_cpi_signer(ids: &ProgramIds) -> Result<DerivedAddress> {
    derive(&[COLLECTION_CPI_SEED], &ids.bubblegum)
}

/// Token Metadata の Metadataアカウント PDA。
/// seeds = [b"metadata", token_metadata_program, mint]
pub fn metadata_account(ids: &ProgramIds, mint: &Pubkey) -> Result<DerivedAddress> {
    derive(
        &[METADATA_SEED, ids.token_metadata.as_ref(), mint.as_ref()],
        &ids.token_metadata,
    )
}

/// Token Metadata の Master Editionアカウント PDA。
/// seeds = [b"metadata", token_metadata_program, mint, b"edition"]
pub fn master_edition_account(ids: &ProgramIds, mint: &Pubkey) -> Result<DerivedAddress> {
    derive(
        &[
            METADATA_SEED,
            ids.token_metadata.as_ref(),
            mint.as_ref(),
            EDITION_SEED,
        ],
        &ids.token_metadata,
    )
}
