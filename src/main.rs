use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use splitledger::auth::AuthConfig;
use splitledger::config::StoreBackend;
use splitledger::{routes, Config, Ledger, LedgerStore, MemoryStore, MongoStore};
use std::io;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

async fn serve<S: LedgerStore>(store: S, config: Config) -> io::Result<()> {
    let ledger = web::Data::new(Ledger::new(store, config.ledger));
    let auth = web::Data::new(AuthConfig {
        secret: config.auth_secret.clone(),
    });
    if auth.secret.is_none() {
        warn!("SPLITLEDGER_AUTH_SECRET is not set, trusting bare caller ids");
    }
    let cors_origin = config.cors_origin.clone();

    info!(bind = %config.bind, "listening");
    HttpServer::new(move || {
        let cors = match &cors_origin {
            Some(origin) => Cors::default()
                .allowed_origin(origin)
                .allow_any_method()
                .allow_any_header(),
            None => Cors::permissive(),
        };
        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(ledger.clone())
            .app_data(auth.clone())
            .configure(routes::configure::<S>)
    })
    .bind(config.bind)?
    .run()
    .await
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "invalid configuration");
            return Err(io::Error::new(io::ErrorKind::InvalidInput, err.to_string()));
        }
    };

    match config.backend {
        StoreBackend::MongoDb => {
            let uri = config.mongodb_uri.clone().unwrap_or_default();
            let store = MongoStore::connect(&uri, &config.database)
                .await
                .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
            serve(store, config).await
        }
        StoreBackend::Memory => {
            warn!("using the in-memory store, nothing will persist across restarts");
            serve(MemoryStore::new(), config).await
        }
    }
}
