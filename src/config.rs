use snafu::{ResultExt, Snafu};
use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};
use url::Url;

use crate::discord::GuildId;

const DEFAULT_DISCORD_API_URL: &str = "https://discord.com/api/v10/";

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub discord_api_url: Url,
    pub guild_id: GuildId,
    pub api_key: String,
    pub listen_address: SocketAddr,
    pub escape_markdown: bool,
    pub report_delivery_failures: bool,
}

impl Config {
    pub fn from_environment() -> Result<Self> {
        Self::from_source(|name| env::var(name))
    }

    fn from_source(var: impl Fn(&str) -> Result<String, env::VarError>) -> Result<Self> {
        let discord_token = required(var("DISCORD_TOKEN")).context(UnknownDiscordTokenSnafu)?;
        let api_key = required(var("API_KEY")).context(UnknownApiKeySnafu)?;
        let guild_id = required(var("GUILD_ID")).context(UnknownGuildIdSnafu)?;
        let port = required(var("WEB_LISTEN_PORT")).or_else(|_| required(var("PORT")));
        let port = port.context(UnknownWebListenPortSnafu)?;

        let address = var("WEB_LISTEN_ADDRESS").ok();
        let address: IpAddr = match address {
            Some(address) => address
                .parse()
                .context(InvalidWebListenAddressSnafu { address })?,
            None => Ipv4Addr::UNSPECIFIED.into(),
        };
        let port = port.parse().context(InvalidWebListenPortSnafu { port })?;
        let listen_address = (address, port).into();

        let uri = var("DISCORD_API_URL").unwrap_or_else(|_| DEFAULT_DISCORD_API_URL.into());
        let discord_api_url = Url::parse(&uri).context(InvalidDiscordApiUrlSnafu { uri })?;

        let escape_markdown = flag(&var, "ESCAPE_MARKDOWN")?;
        let report_delivery_failures = flag(&var, "REPORT_DELIVERY_FAILURES")?;

        Ok(Self {
            discord_token,
            discord_api_url,
            guild_id: GuildId(guild_id),
            api_key,
            listen_address,
            escape_markdown,
            report_delivery_failures,
        })
    }
}

fn required(value: Result<String, env::VarError>) -> Result<String, env::VarError> {
    value.and_then(|v| {
        if v.is_empty() {
            Err(env::VarError::NotPresent)
        } else {
            Ok(v)
        }
    })
}

fn flag(var: impl Fn(&str) -> Result<String, env::VarError>, name: &'static str) -> Result<bool> {
    let value = match var(name) {
        Ok(value) => value,
        Err(_) => return Ok(false),
    };

    match value.to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        _ => InvalidFlagSnafu { name, value }.fail(),
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("DISCORD_TOKEN must be set"))]
    UnknownDiscordToken { source: env::VarError },

    #[snafu(display("API_KEY must be set"))]
    UnknownApiKey { source: env::VarError },

    #[snafu(display("GUILD_ID must be set"))]
    UnknownGuildId { source: env::VarError },

    #[snafu(display("PORT must be set"))]
    UnknownWebListenPort { source: env::VarError },

    #[snafu(display("PORT is invalid"))]
    InvalidWebListenPort {
        source: std::num::ParseIntError,
        port: String,
    },

    #[snafu(display("WEB_LISTEN_ADDRESS is invalid"))]
    InvalidWebListenAddress {
        source: std::net::AddrParseError,
        address: String,
    },

    #[snafu(display("DISCORD_API_URL is invalid"))]
    InvalidDiscordApiUrl {
        source: url::ParseError,
        uri: String,
    },

    #[snafu(display("{} must be a boolean, not {:?}", name, value))]
    InvalidFlag { name: &'static str, value: String },
}

type Result<T, E = Error> = std::result::Result<T, E>;
