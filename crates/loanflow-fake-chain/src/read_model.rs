//! Fake indexer

use std::sync::Arc;

use async_trait::async_trait;
use loanflow_common::parking_lot::Mutex;
use loanflow_common::{Error, IndexedTrove, ReadModel, TroveId};

use crate::ChainState;

/// Indexer trailing a [`FakeChain`](crate::FakeChain)
///
/// Every query processes one more mined block. Troves only show up once the block they were
/// opened in is indexed.
#[derive(Debug, Clone)]
pub struct FakeReadModel {
    state: Arc<Mutex<ChainState>>,
}

impl FakeReadModel {
    pub(crate) fn new(state: Arc<Mutex<ChainState>>) -> Self {
        Self { state }
    }

    /// Index every mined block at once
    pub fn catch_up(&self) {
        let mut state = self.state.lock();
        state.indexed_block = state.block_number;
    }
}

fn poll(state: &mut ChainState) {
    if state.indexed_block < state.block_number {
        state.indexed_block += 1;
    }
}

#[async_trait]
impl ReadModel for FakeReadModel {
    async fn indexed_block(&self) -> Result<u64, Error> {
        let mut state = self.state.lock();
        poll(&mut state);
        Ok(state.indexed_block)
    }

    async fn trove(
        &self,
        branch_id: u32,
        trove_id: &TroveId,
    ) -> Result<Option<IndexedTrove>, Error> {
        let mut state = self.state.lock();
        poll(&mut state);
        Ok(state
            .troves
            .get(&(branch_id, *trove_id))
            .filter(|trove| trove.updated_at_block <= state.indexed_block)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use loanflow_common::{Address, Amount, CallArg, ChainClient, ContractCall};

    use super::*;
    use crate::{deployment, FakeChain, FakeChainConfig};

    #[tokio::test]
    async fn test_indexes_one_block_per_poll() {
        let chain = FakeChain::new(deployment(), FakeChainConfig::default());
        let read_model = chain.read_model();
        let account = Address::repeat_byte(0xaa);
        let staking = chain.deployment().lqty_staking;

        for _ in 0..3 {
            let call = ContractCall::new(
                staking,
                "unstake",
                vec![CallArg::Amount(Amount::ZERO)],
            );
            let tx_hash = chain.submit(account, call).await.unwrap();
            chain.wait_for_receipt(&tx_hash).await.unwrap();
        }
        assert_eq!(chain.block_number(), 3);

        assert_eq!(read_model.indexed_block().await.unwrap(), 1);
        assert_eq!(read_model.indexed_block().await.unwrap(), 2);
        assert_eq!(read_model.indexed_block().await.unwrap(), 3);
        assert_eq!(read_model.indexed_block().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_trove_visible_once_indexed() {
        let chain = FakeChain::new(deployment(), FakeChainConfig::default());
        let read_model = chain.read_model();
        let branch = chain.deployment().branches[0].clone();
        let owner = Address::repeat_byte(0xaa);

        for _ in 0..2 {
            let call = ContractCall::new(
                chain.deployment().lqty_staking,
                "unstake",
                vec![CallArg::Amount(Amount::ZERO)],
            );
            let tx_hash = chain.submit(owner, call).await.unwrap();
            chain.wait_for_receipt(&tx_hash).await.unwrap();
        }

        let call = ContractCall::new(
            branch.leverage_zapper,
            "openLeveragedTroveWithRawETH",
            vec![
                CallArg::Address(owner),
                CallArg::Uint(0),
                CallArg::Amount(Amount::WAD),
                CallArg::Amount(Amount::WAD),
                CallArg::Amount(Amount::new(2_000 * Amount::WAD.value())),
                CallArg::Amount(Amount::new(50_000_000_000_000_000)),
                CallArg::Amount(Amount::WAD),
            ],
        );
        let tx_hash = chain.submit(owner, call).await.unwrap();
        let receipt = chain.wait_for_receipt(&tx_hash).await.unwrap();
        assert_eq!(receipt.block_number, 3);

        let trove_id = TroveId::derive(&owner, 0);
        assert!(read_model.trove(0, &trove_id).await.unwrap().is_none());
        assert!(read_model.trove(0, &trove_id).await.unwrap().is_none());

        let trove = read_model.trove(0, &trove_id).await.unwrap().unwrap();
        assert_eq!(trove.owner, owner);
        assert_eq!(trove.debt, Amount::new(2_000 * Amount::WAD.value()));
    }

    #[tokio::test]
    async fn test_catch_up() {
        let chain = FakeChain::new(deployment(), FakeChainConfig::default());
        let read_model = chain.read_model();
        let owner = Address::repeat_byte(0xaa);

        for _ in 0..3 {
            let call = ContractCall::new(
                chain.deployment().lqty_staking,
                "unstake",
                vec![CallArg::Amount(Amount::ZERO)],
            );
            let tx_hash = chain.submit(owner, call).await.unwrap();
            chain.wait_for_receipt(&tx_hash).await.unwrap();
        }

        read_model.catch_up();
        assert_eq!(read_model.indexed_block().await.unwrap(), 3);
    }
}
