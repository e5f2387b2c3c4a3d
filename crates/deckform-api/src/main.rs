mod auth;
mod error;
mod handlers;
mod setup;
mod state;
mod telemetry;

use deckform_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    let (_state, router) = crate::setup::initialize_app(config.clone()).await?;

    crate::setup::server::start_server(&config, router).await?;

    Ok(())
}
