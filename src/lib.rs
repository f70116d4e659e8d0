#[macro_use]
extern crate rocket;

use std::sync::Arc;
use std::time::Duration;

use mongodb::Client;
use rocket::data::{Limits, ToByteUnit};
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedHeaders, AllowedOrigins};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::ai::AiClient;
use crate::config::{Config, StoreBackend};
use crate::error::{BackendError, ConfigurationError};
use crate::keys::PushKeyAllocator;
use crate::roster::Roster;
use crate::route::mount_api;
use crate::security::Security;
use crate::store::{AnyStore, MemoryStore, MongoStore};

pub mod ai;
pub mod config;
pub mod data;
pub mod error;
pub mod keys;
pub mod live;
pub mod masterlist;
pub mod resp {
    pub mod jwt;
    pub mod problem;
}
pub mod roster;
pub mod route;
pub mod security;
pub mod store;
pub mod util;

fn load_config() -> Result<Config, BackendError> {
    match Config::load() {
        Ok(c) => {
            tracing::info!("Configuration loaded.");
            Ok(c)
        }
        Err(ConfigurationError::NotFound(_)) => {
            let c = Config::default();
            if c.save().is_err() {
                tracing::warn!("Unable to save generated configuration.");
            }
            Ok(c)
        }
        Err(other) => {
            tracing::error!("Configuration error: {}", other);
            Err(other.into())
        }
    }
}

async fn open_store(c: &Config) -> Result<AnyStore, BackendError> {
    match c.store {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, data is lost on shutdown.");
            Ok(AnyStore::Memory(MemoryStore::new(c.live_channel_capacity)))
        }
        StoreBackend::Mongodb => {
            tracing::info!("Connecting to MongoDB: {}", c.mongodb_uri);
            let client = Client::with_uri_str(c.mongodb_uri.as_str()).await?;

            tracing::info!("Using MongoDB database: {}", c.mongodb_db);
            let db = client.database(c.mongodb_db.as_str());
            if let Err(e) = db.list_collection_names(None).await {
                tracing::error!("Unable to connect to MongoDB.");
                return Err(e.into());
            }
            Ok(AnyStore::Mongo(MongoStore::new(&db, c.live_channel_capacity)))
        }
    }
}

/// Reads configuration and keys from the environment, opens the store and
/// builds the server.
pub async fn create(log_level: Option<Level>) -> Result<Rocket<Build>, BackendError> {
    if let Some(l) = log_level {
        let subscriber = FmtSubscriber::builder().with_max_level(l).finish();

        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Unable to set global logger: {}", err);
        };
        if let Err(err) = tracing_log::LogTracer::init() {
            eprintln!("Unable to forward log records: {}", err);
        }
    }

    tracing::info!("Reading .env file...");
    if dotenv::dotenv().is_err() {
        tracing::warn!("Unable to load .env file.");
    }

    tracing::info!("Loading configuration...");
    let c = load_config()?;

    tracing::info!("Initializing security information...");
    let security = Security::load()?;

    let store = open_store(&c).await?;
    build(c, security, store)
}

/// Assembles the server around an already opened store.
pub fn build(
    c: Config,
    security: Security,
    store: AnyStore,
) -> Result<Rocket<Build>, BackendError> {
    let roster = Roster::new(store, Arc::new(PushKeyAllocator::new()), c.roster_policy());
    tracing::info!("Roster policy: {:?}", roster.policy());

    let ai = AiClient::new(c.ai_endpoint.as_str(), Duration::from_secs(c.ai_timeout_secs))?;
    tracing::info!("AI endpoint: {}", ai.endpoint());

    let upload_limit = c.upload_limit_mib.mebibytes();
    let limits = Limits::default()
        .limit("file", upload_limit)
        .limit("data-form", upload_limit);
    let figment = rocket::Config::figment().merge(("limits", limits));

    tracing::info!("Starting HTTP server...");
    let mut r = rocket::custom(figment)
        .manage(c)
        .manage(security)
        .manage(roster)
        .manage(ai);

    tracing::info!("Setting up CORS...");
    let cors = rocket_cors::CorsOptions {
        allowed_origins: AllowedOrigins::All,
        allowed_methods: vec![Method::Get, Method::Put, Method::Post, Method::Delete]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: AllowedHeaders::All,
        allow_credentials: true,
        ..Default::default()
    }
    .to_cors()?;

    r = r.attach(cors);
    r = mount_api(r);

    Ok(r)
}
