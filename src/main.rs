#![deny(rust_2018_idioms)]

use snafu::{ResultExt, Snafu};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub use config::Config;

mod config;
mod discord;
mod domain;
mod flow;
mod session;
#[cfg(test)]
mod test_utils;
mod web_api;

type GlobalConfig = &'static Config;

fn main() {
    if let Err(e) = core() {
        eprintln!("Error: {}", e);

        let mut source = std::error::Error::source(&e);
        while let Some(e) = source {
            eprintln!("Caused by: {}", e);
            source = e.source();
        }

        std::process::exit(1);
    }
}

#[tokio::main]
async fn core() -> Result<()> {
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_environment().context(UnableToConfigureSnafu)?;
    let config = &*Box::leak(Box::new(config));

    let discord = discord::Config::new(&config.discord_token, config.discord_api_url.clone())
        .into_client()
        .context(UnableToConfigureDiscordSnafu)?;

    let bot = discord.current_user().await.context(UnableToLogInSnafu)?;
    info!("Logged in as {}", bot.tag());

    let send_message_flow = flow::SendMessageFlow::new(discord, config);

    web_api::serve(config, send_message_flow, shutdown_signal())
        .await
        .context(WebApiFailedSnafu)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            error!("Unable to listen for shutdown signal: {}", e);
            futures::future::pending::<()>().await
        }
    }
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Unable to configure application"))]
    UnableToConfigure { source: config::Error },

    #[snafu(display("Unable to configure Discord integration"))]
    UnableToConfigureDiscord { source: discord::Error },

    #[snafu(display("Unable to log in to Discord"))]
    UnableToLogIn { source: discord::Error },

    #[snafu(display("The web API failed"))]
    WebApiFailed { source: web_api::ServeError },
}

type Result<T, E = Error> = std::result::Result<T, E>;
