//! # 署名者
//!
//! トランザクションメッセージへの署名能力の抽象化。
//! コアは秘密鍵を直接読まず、`MessageSigner::sign` だけを呼び出す。

use std::path::Path;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair, Signature};
use solana_sdk::signer::Signer;

use crate::error::{CnftError, Result};

/// 1つの署名者アイデンティティ。
pub trait MessageSigner: Send + Sync {
    /// 署名者の公開鍵。
    fn identity(&self) -> Pubkey;

    /// メッセージに署名する。鍵が利用できない場合はエラー。
    fn sign(&self, message: &[u8]) -> std::result::Result<Signature, String>;
}

impl MessageSigner for Keypair {
    fn identity(&self) -> Pubkey {
        Signer::pubkey(self)
    }

    fn sign(&self, message: &[u8]) -> std::result::Result<Signature, String> {
        self.try_sign_message(message).map_err(|e| e.to_string())
    }
}

/// `solana-keygen` 形式（64バイトのJSON配列）の鍵ファイルを読み込む。
pub fn load_keypair(path: &Path) -> Result<Keypair> {
    read_keypair_file(path).map_err(|e| {
        CnftError::Persist(format!("鍵ファイルの読み込みに失敗 ({}): {e}", path.display()))
    })
}

/// 署名者一覧の公開鍵。
pub fn signer_pubkeys(signers: &[&dyn MessageSigner]) -> Vec<Pubkey> {
    signers.iter().map(|s| s.identity()).collect()
}
