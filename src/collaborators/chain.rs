//! Chain settlement collaborator
//!
//! Contract for on-chain reward settlement: NFT minting and token transfers,
//! each returning a transaction identifier the engine stamps onto the claimed
//! reward. The shipped implementation is a mock that fabricates identifiers;
//! a real deployment substitutes its own client behind the same trait.

use sha2::{Digest, Sha256};
use tracing::info;

use crate::db::schemas::NftMetadata;
use crate::types::Result;

/// External settlement for chain-backed reward kinds
#[async_trait::async_trait]
pub trait ChainSettlement: Send + Sync {
    /// Mint an NFT to the target address, returning a transaction id
    async fn mint_nft(&self, target: &str, metadata: &NftMetadata) -> Result<String>;

    /// Transfer tokens to the target address, returning a transaction id
    async fn transfer_tokens(
        &self,
        target: &str,
        amount: i64,
        token_address: &str,
    ) -> Result<String>;
}

/// Mock chain client fabricating transaction identifiers
///
/// Identifiers are hex digests in the familiar 0x-prefixed 32-byte format,
/// derived from a random nonce so repeated calls never collide.
pub struct MockChainClient {
    network: String,
}

impl MockChainClient {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
        }
    }

    fn fabricate_tx_hash(&self, payload: &str) -> String {
        use rand::Rng;

        let nonce: u64 = rand::thread_rng().gen();
        let mut hasher = Sha256::new();
        hasher.update(self.network.as_bytes());
        hasher.update(payload.as_bytes());
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        hasher.update(nonce.to_le_bytes());
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new("mocknet")
    }
}

#[async_trait::async_trait]
impl ChainSettlement for MockChainClient {
    async fn mint_nft(&self, target: &str, metadata: &NftMetadata) -> Result<String> {
        let hash = self.fabricate_tx_hash(&format!("mint:{}:{}", target, metadata.name));
        info!(target = %target, nft = %metadata.name, tx = %hash, "mock NFT mint");
        Ok(hash)
    }

    async fn transfer_tokens(
        &self,
        target: &str,
        amount: i64,
        token_address: &str,
    ) -> Result<String> {
        let hash = self.fabricate_tx_hash(&format!("transfer:{}:{}:{}", target, amount, token_address));
        info!(target = %target, amount, token = %token_address, tx = %hash, "mock token transfer");
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mint_returns_tx_hash_format() {
        let chain = MockChainClient::default();
        let metadata = NftMetadata {
            name: "Founders Medal".into(),
            ..Default::default()
        };

        let hash = chain.mint_nft("0xwallet", &metadata).await.unwrap();
        assert!(hash.starts_with("0x"));
        assert_eq!(hash.len(), 66);
    }

    #[tokio::test]
    async fn test_transfers_do_not_collide() {
        let chain = MockChainClient::default();
        let a = chain.transfer_tokens("0xwallet", 10, "0xtoken").await.unwrap();
        let b = chain.transfer_tokens("0xwallet", 10, "0xtoken").await.unwrap();
        assert_ne!(a, b);
    }
}
