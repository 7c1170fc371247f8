//! # エラー型
//!
//! ミント処理全体で共通のエラー型。
//! ネットワーク呼び出し前に検出できるもの（入力不正・導出失敗・署名者不足）と、
//! 送信後に判明するもの（拒否・確認タイムアウト）を区別する。

/// cNFTミント処理のエラー型。
#[derive(Debug, thiserror::Error)]
pub enum CnftError {
    /// 不正な入力（creatorのshare合計が100でない、royaltyが範囲外、verified済みcollection等）
    #[error("不正な入力: {0}")]
    InvalidInput(String),
    /// 256通り全てのbumpでcurve上の点になった。seed設計の誤り
    #[error("有効なPDAを導出できません (program: {program}, seeds: {seed_count}個)")]
    Derivation {
        /// 所有プログラム（Base58）
        program: String,
        /// seedの個数
        seed_count: usize,
    },
    /// 署名者フラグ付きアカウントに対応する署名者が署名者セットに無い
    #[error("署名者が不足しています: {0}")]
    MissingSignature(String),
    /// 署名者が存在するが署名を生成できなかった
    #[error("署名者セットが不完全です: {0}")]
    IncompleteSignerSet(String),
    /// ネットワーク（プログラム）がトランザクションを拒否した
    #[error("トランザクションが拒否されました: {message}")]
    NetworkRejected {
        /// 元のエラーメッセージ
        message: String,
        /// エラーから復元できた署名（Base58）
        signature: Option<String>,
        /// ベストエフォートで取得したプログラムログ
        logs: Option<Vec<String>>,
    },
    /// 確認待ちがタイムアウトした。トランザクションは後で着地する可能性がある
    #[error("トランザクション {signature} の確認が {waited_ms}ms 以内に完了しませんでした")]
    ConfirmationTimeout {
        /// 送信済みトランザクションの署名（Base58）
        signature: String,
        /// 待機した時間（ミリ秒）
        waited_ms: u64,
    },
    /// 送信要求の途中で通信が切れた。ペイロードが届いている可能性がある
    #[error("トランザクション {signature} の送信結果が不明です: {message}")]
    SubmissionUncertain {
        /// ローカルで署名済みのfee payer署名（Base58）
        signature: String,
        /// 通信エラーのメッセージ
        message: String,
    },
    /// RPC通信・レスポンス解析の失敗
    #[error("RPC通信に失敗: {0}")]
    Network(String),
    /// レコードファイルの読み書き失敗
    #[error("レコードの読み書きに失敗: {0}")]
    Persist(String),
    /// 設定値が不正
    #[error("設定が不正です: {0}")]
    Config(String),
    /// トランザクションのシリアライズ失敗
    #[error("シリアライズに失敗: {0}")]
    Serialize(String),
}

impl CnftError {
    /// 結果が未確定（トランザクションが後で着地し得る）かどうか。
    /// trueの場合、呼び出し側は再送ではなく状態の再照会を行うべき。
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            CnftError::ConfirmationTimeout { .. } | CnftError::SubmissionUncertain { .. }
        )
    }

    /// このエラーに紐づく最良の署名を返す。
    pub fn signature(&self) -> Option<&str> {
        match self {
            CnftError::NetworkRejected { signature, .. } => signature.as_deref(),
            CnftError::ConfirmationTimeout { signature, .. }
            | CnftError::SubmissionUncertain { signature, .. } => Some(signature),
            _ => None,
        }
    }

    /// 取得済みのプログラムログを返す。
    pub fn logs(&self) -> Option<&[String]> {
        match self {
            CnftError::NetworkRejected { logs, .. } => logs.as_deref(),
            _ => None,
        }
    }
}

/// core crate共通のResult型。
pub type Result<T> = std::result::Result<T, CnftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_ambiguous_and_rejection_is_not() {
        let timeout = CnftError::ConfirmationTimeout {
            signature: "sig".to_string(),
            waited_ms: 1000,
        };
        let rejected = CnftError::NetworkRejected {
            message: "blockhash not found".to_string(),
            signature: None,
            logs: None,
        };
        assert!(timeout.is_ambiguous());
        assert!(!rejected.is_ambiguous());
        assert_eq!(timeout.signature(), Some("sig"));
        assert_eq!(rejected.signature(), None);

        let uncertain = CnftError::SubmissionUncertain {
            signature: "sig2".to_string(),
            message: "connection reset".to_string(),
        };
        assert!(uncertain.is_ambiguous());
        assert_eq!(uncertain.signature(), Some("sig2"));
    }
}
