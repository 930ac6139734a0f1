#[macro_use]
mod app;
mod config;
mod handlers;
mod state;
mod storage;
mod sweeper;

use std::time::Duration;

use actix_web::{HttpServer, web};
use dotenv::dotenv;
use ed25519_compact::KeyPair;
use pretty_env_logger::env_logger::{Builder, Env};

use crate::config::AppConfig;

fn startup_error(stage: &str, e: anyhow::Error) -> std::io::Error {
    log::error!("{} failed: {:#}", stage, e);
    std::io::Error::other(e.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    if cli::run_cli().await {
        return Ok(());
    }

    let logger_env = Env::default().default_filter_or("debug");
    let mut logger_builder = Builder::from_env(logger_env);
    logger_builder.init();

    let config = AppConfig::from_env().map_err(|e| startup_error("Configuration", e))?;

    let state = config
        .create_app_state()
        .await
        .map_err(|e| startup_error("Application initialization", e))?;

    log::info!("App state initialized successfully");

    state
        .initialize_data_from_files(config.packages_yaml.as_deref())
        .await
        .map_err(|e| startup_error("Data initialization", e))?;

    let data = web::Data::new(state);

    tokio::spawn(sweeper::start_sweeper(
        data.clone(),
        Duration::from_secs(config.sweep_interval_secs),
    ));

    //Authorization
    let KeyPair {
        pk: public_key,
        sk: secret_key,
    } = KeyPair::generate();

    // workers build their own authority; fail here instead of inside one
    let signer = app::token_signer(secret_key.clone())
        .map_err(|e| startup_error("Token signer setup", e))?;
    market_authority!(public_key, signer)
        .map_err(|e| startup_error("Authority setup", anyhow::anyhow!("{:?}", e)))?;

    log::info!("Listening on {}", config.bind_addr);

    HttpServer::new(move || {
        let signer = app::token_signer(secret_key.clone()).expect("checked at startup");
        let authority = market_authority!(public_key, signer).expect("checked at startup");
        market_app!(data.clone(), authority)
    })
    .bind(config.bind_addr.as_str())?
    .run()
    .await
}
