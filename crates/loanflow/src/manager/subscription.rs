//! Flow subscriptions

use futures::Stream;
use loanflow_common::{Address, Flowstate};
use tokio::sync::watch;

use super::visible;

/// Watches the flow visible to the connected account
#[derive(Debug)]
pub struct FlowSubscription {
    flow: watch::Receiver<Option<Flowstate>>,
    account: watch::Receiver<Option<Address>>,
}

impl FlowSubscription {
    pub(crate) fn new(
        flow: watch::Receiver<Option<Flowstate>>,
        account: watch::Receiver<Option<Address>>,
    ) -> Self {
        Self { flow, account }
    }

    /// Flow visible right now
    pub fn current(&self) -> Option<Flowstate> {
        visible(self.flow.borrow().clone(), *self.account.borrow())
    }

    /// Wait for the flow or the account to change
    ///
    /// Returns `false` once the manager is gone.
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            res = self.flow.changed() => res.is_ok(),
            res = self.account.changed() => res.is_ok(),
        }
    }

    /// Stream of the visible flow, one item per change
    pub fn into_stream(self) -> impl Stream<Item = Option<Flowstate>> {
        futures::stream::unfold(self, |mut subscription| async move {
            if subscription.changed().await {
                let current = subscription.current();
                Some((current, subscription))
            } else {
                None
            }
        })
    }
}
