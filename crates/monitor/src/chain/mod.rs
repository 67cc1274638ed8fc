//! Chain adapters: one implementation per supported chain, chosen by the
//! chain stored on each watched address.

mod bitcoin;
mod ethereum;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use hackwatch_domain::model::{Chain, TransferCandidate};

use crate::worker::MonitorError;

pub use bitcoin::{EsploraAdapter, EsploraTx};
pub use ethereum::EthereumRpcAdapter;

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> Chain;

    async fn current_height(&self) -> Result<u64, MonitorError>;

    /// Transfers in `(since_height, tip_height]` in which `address` is a
    /// sender. `tip_height` is the height fetched at the start of the same
    /// address step, so nothing past the checkpoint about to be written is
    /// reported.
    async fn outgoing_transfers(
        &self,
        address: &str,
        since_height: u64,
        tip_height: u64,
    ) -> Result<Vec<TransferCandidate>, MonitorError>;
}

/// Adapters keyed by the chain they serve.
#[derive(Clone, Default)]
pub struct ChainRegistry {
    adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(adapter.chain(), adapter);
    }

    pub fn get(&self, chain: Chain) -> Option<&Arc<dyn ChainAdapter>> {
        self.adapters.get(&chain)
    }
}
