//! Shared-expense ledger: groups of users record who paid for what, and the
//! ledger derives who owes whom.

pub mod auth;
pub mod balance;
pub mod config;
pub mod error;
pub mod exchange;
pub mod expense;
pub mod groups;
pub mod guard;
pub mod ledger;
pub mod membership;
pub mod money;
pub mod routes;
pub mod schemas;
pub mod settlement;
pub mod store;
pub mod users;

pub use config::{Config, LedgerConfig};
pub use error::{LedgerError, LedgerResult, StoreError};
pub use ledger::Ledger;
pub use money::Money;
pub use store::{LedgerStore, LedgerTx, MemoryStore, MongoStore};
