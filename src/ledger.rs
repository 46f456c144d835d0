use crate::config::LedgerConfig;
use crate::error::LedgerResult;
use crate::store::LedgerStore;

/// Entry point for every ledger operation.
///
/// Holds no ledger state of its own; the operations live in the `users`,
/// `groups`, `membership`, `expense`, `settlement`, `balance` and `exchange`
/// modules as `impl` blocks on this type.
pub struct Ledger<S> {
    store: S,
    config: LedgerConfig,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub(crate) async fn begin(&self) -> LedgerResult<S::Tx> {
        Ok(self.store.begin().await?)
    }
}
