//! # cNFT Minter Core
//!
//! 圧縮NFTをBubblegumのConcurrent Merkle Tree上のコレクションへミントするためのコア。
//!
//! ## 構成
//! 1. `derive`: seedと所有プログラムからのPDA導出（純粋関数）
//! 2. `hash`: メタデータ・creator一覧の正規エンコーディングとKeccakハッシュ
//! 3. `assembler`: 命令とアカウント順序の組み立て、トランザクション計画の検証
//! 4. `submit`: 署名・送信・確認と失敗時の診断（I/Oを行う唯一の層）
//! 5. `record`: 実行間で受け渡すコレクション・Treeのレコード
//!
//! `derive` と `hash` の値を `assembler` が命令列にまとめ、`submit` に渡す。
//! 同じTree・コレクションへの操作の直列化は呼び出し側の責任で、コアはロックを持たない。

pub mod assembler;
pub mod config;
pub mod derive;
pub mod error;
pub mod explorer;
pub mod hash;
pub mod metadata;
pub mod record;
pub mod rpc;
pub mod signer;
pub mod submit;

pub use config::{ClientConfig, Cluster, ConfirmationLevel, ProgramIds};
pub use error::{CnftError, Result};
