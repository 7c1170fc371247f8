//! ブロックエクスプローラURL。

use crate::config::{ClientConfig, Cluster};

const EXPLORER_BASE: &str = "https://explorer.solana.com";

fn explorer_url(path: &str, config: &ClientConfig) -> String {
    match config.cluster {
        // ローカルノードはエクスプローラにRPCエンドポイントを渡す必要がある
        Cluster::Localnet => {
            let params = [
                ("cluster", config.cluster.as_str()),
                ("customUrl", config.network_endpoint.as_str()),
            ];
            reqwest::Url::parse_with_params(&format!("{EXPLORER_BASE}/{path}"), &params)
                .map(String::from)
                .unwrap_or_else(|_| {
                    format!(
                        "{EXPLORER_BASE}/{path}?cluster=custom&customUrl={}",
                        config.network_endpoint
                    )
                })
        }
        cluster => format!("{EXPLORER_BASE}/{path}?cluster={}", cluster.as_str()),
    }
}

/// トランザクションのエクスプローラURL。
pub fn transaction_url(signature: &str, config: &ClientConfig) -> String {
    explorer_url(&format!("tx/{signature}"), config)
}

/// アドレスのエクスプローラURL。
pub fn address_url(address: &str, config: &ClientConfig) -> String {
    explorer_url(&format!("address/{address}"), config)
}
