use crate::schemas::{Currency, UnknownCurrency};
use std::env;
use std::net::SocketAddr;

/// Values injected into the ledger operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Used for expenses and settlements recorded without a currency.
    pub default_currency: Currency,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_currency: Currency::Cad,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    MongoDb,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub backend: StoreBackend,
    pub mongodb_uri: Option<String>,
    pub database: String,
    pub auth_secret: Option<String>,
    pub cors_origin: Option<String>,
    pub ledger: LedgerConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SPLITLEDGER_BIND is not a socket address: {0}")]
    Bind(String),
    #[error("SPLITLEDGER_STORE must be `mongodb` or `memory`, got `{0}`")]
    Backend(String),
    #[error("MONGODB_URI is required for the mongodb store")]
    MissingMongoUri,
    #[error("SPLITLEDGER_DEFAULT_CURRENCY: {0}")]
    Currency(#[from] UnknownCurrency),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind = lookup("SPLITLEDGER_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_owned());
        let bind: SocketAddr = bind.parse().map_err(|_| ConfigError::Bind(bind.clone()))?;

        let backend = match lookup("SPLITLEDGER_STORE").as_deref().map(str::trim) {
            None | Some("mongodb") => StoreBackend::MongoDb,
            Some("memory") => StoreBackend::Memory,
            Some(other) => return Err(ConfigError::Backend(other.to_owned())),
        };

        let mongodb_uri = lookup("MONGODB_URI").filter(|uri| !uri.is_empty());
        if backend == StoreBackend::MongoDb && mongodb_uri.is_none() {
            return Err(ConfigError::MissingMongoUri);
        }

        let default_currency = match lookup("SPLITLEDGER_DEFAULT_CURRENCY") {
            Some(code) => code.parse()?,
            None => LedgerConfig::default().default_currency,
        };

        Ok(Self {
            bind,
            backend,
            mongodb_uri,
            database: lookup("SPLITLEDGER_DATABASE").unwrap_or_else(|| "SplitLedger".to_owned()),
            auth_secret: lookup("SPLITLEDGER_AUTH_SECRET").filter(|secret| !secret.is_empty()),
            cors_origin: lookup("SPLITLEDGER_CORS_ORIGIN").filter(|origin| !origin.is_empty()),
            ledger: LedgerConfig { default_currency },
        })
    }
}
