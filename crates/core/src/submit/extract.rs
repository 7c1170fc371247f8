//! 失敗メッセージからのトランザクション署名の復元。
//!
//! RPCの構造化エラーが署名を持たない場合に限って使う。ベストエフォート。

use once_cell::sync::Lazy;
use regex::Regex;

/// `Transaction <base58>` または `Signature <base58>`（大文字小文字を区別しない）。
static SIGNATURE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?i:transaction|signature)\s+([1-9A-HJ-NP-Za-km-z]{32,88})\b")
        .expect("signature pattern is valid")
});

/// エラーメッセージに埋め込まれた署名を取り出す。最初に一致したものを返す。
pub fn extract_signature(message: &str) -> Option<String> {
    SIGNATURE_PATTERN
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// 構造化された署名があればそれを、無ければメッセージから復元した署名を返す。
pub fn recover_signature(structured: Option<&str>, message: &str) -> Option<String> {
    structured
        .map(str::to_string)
        .or_else(|| extract_signature(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIG: &str =
        "3KJ8pWcYtb2xyWT1nBwqvXrX9e5bG3oAKxjqWPhL2dVrXWm9YFcKn6bQxR4mGg7JmVhsZpTq8uEo2aNfRBCDABCD";

    #[test]
    fn test_extracts_from_transaction_prefix() {
        let msg = format!("Transaction {SIG} failed");
        assert_eq!(extract_signature(&msg).as_deref(), Some(SIG));
    }

    #[test]
    fn test_extracts_from_signature_prefix_with_error_text() {
        let msg = format!(
            "Error: Signature {SIG} has expired: block height exceeded"
        );
        assert_eq!(extract_signature(&msg).as_deref(), Some(SIG));

        let lower = format!("failed to send transaction: transaction {SIG} was not confirmed");
        assert_eq!(extract_signature(&lower).as_deref(), Some(SIG));
    }

    #[test]
    fn test_no_signature_found() {
        assert_eq!(extract_signature("blockhash not found"), None);
        assert_eq!(
            extract_signature("Transaction signature verification failure"),
            None
        );
        // 32文字未満
        assert_eq!(extract_signature("Transaction 3KJ8abcd failed"), None);
        // base58外の文字（0, O, I, l）を含むトークン
        assert_eq!(
            extract_signature("Transaction 0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl failed"),
            None
        );
    }

    #[test]
    fn test_structured_signature_preferred() {
        let msg = format!("Transaction {SIG} failed");
        assert_eq!(
            recover_signature(Some("structured"), &msg).as_deref(),
            Some("structured")
        );
        assert_eq!(recover_signature(None, &msg).as_deref(), Some(SIG));
        assert_eq!(recover_signature(None, "timeout"), None);
    }
}
