use reqwest::{header, Method, StatusCode};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{trace, trace_span, Instrument};
use url::Url;

const USER_AGENT: &str = concat!(
    "DiscordBot (",
    env!("CARGO_PKG_NAME"),
    ", ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuildId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
}

impl User {
    /// Accounts that migrated to unique usernames report a discriminator of `"0"`.
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(d) if d != "0" => format!("{}#{}", self.username, d),
            _ => self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Member {
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Guild {
    pub id: GuildId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
}

//--

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateMessage {
    pub embeds: Vec<Embed>,
    pub components: Vec<ActionRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub url: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRow {
    #[serde(rename = "type")]
    kind: u8,
    pub components: Vec<Button>,
}

impl ActionRow {
    const KIND: u8 = 1;

    pub fn new(components: Vec<Button>) -> Self {
        Self {
            kind: Self::KIND,
            components,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    #[serde(rename = "type")]
    kind: u8,
    pub style: u8,
    pub label: String,
    pub url: String,
}

impl Button {
    const KIND: u8 = 2;
    pub const STYLE_LINK: u8 = 5;

    pub fn link(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: Self::KIND,
            style: Self::STYLE_LINK,
            label: label.into(),
            url: url.into(),
        }
    }
}

//--

#[derive(Debug, Snafu)]
#[snafu(display("Discord responded with {}: {} (code {})", status, message, code.unwrap_or_default()))]
pub struct ApiError {
    status: StatusCode,
    code: Option<i64>,
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.json::<ErrorBody>().await.unwrap_or_default();
    let message = body
        .message
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").into());

    Err(ApiError {
        status,
        code: body.code,
        message,
    })
}

//--

#[derive(Debug, Clone)]
pub struct Config {
    token: String,
    api_url: Url,
}

impl Config {
    pub fn new(token: impl Into<String>, api_url: Url) -> Self {
        Self {
            token: token.into(),
            api_url,
        }
    }

    pub fn into_client(self) -> Result<Client> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context(UnableToBuildHttpClientSnafu)?;

        Ok(Client {
            client,
            config: self,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    client: reqwest::Client,
    config: Config,
}

impl Client {
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.config.api_url.clone();
        url.path_segments_mut()
            .ok()
            .context(ApiUrlCannotBeABaseSnafu)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header(header::AUTHORIZATION, format!("Bot {}", self.config.token))
    }

    pub async fn current_user(&self) -> Result<User> {
        let url = self.endpoint(&["users", "@me"])?;

        async {
            trace!("Fetching current user");

            let response = self
                .request(Method::GET, url)
                .send()
                .await
                .context(UnableToExecuteCurrentUserRequestSnafu)?;

            checked(response)
                .await
                .context(CurrentUserRequestFailedSnafu)?
                .json::<User>()
                .await
                .context(UnableToDeserializeCurrentUserRequestSnafu)
        }
        .instrument(trace_span!("current_user"))
        .await
    }

    pub async fn guild(&self, guild_id: &GuildId) -> Result<Guild> {
        let url = self.endpoint(&["guilds", &guild_id.0])?;

        async {
            trace!("Fetching guild");

            let response = self
                .request(Method::GET, url)
                .send()
                .await
                .context(UnableToExecuteGuildRequestSnafu)?;

            checked(response)
                .await
                .context(GuildRequestFailedSnafu)?
                .json::<Guild>()
                .await
                .context(UnableToDeserializeGuildRequestSnafu)
        }
        .instrument(trace_span!("guild", guild_id = %guild_id.0))
        .await
    }

    pub async fn guild_member(&self, guild_id: &GuildId, user_id: &UserId) -> Result<Member> {
        let url = self.endpoint(&["guilds", &guild_id.0, "members", &user_id.0])?;

        async {
            trace!("Fetching guild member");

            let response = self
                .request(Method::GET, url)
                .send()
                .await
                .context(UnableToExecuteMemberRequestSnafu)?;

            checked(response)
                .await
                .context(MemberRequestFailedSnafu)?
                .json::<Member>()
                .await
                .context(UnableToDeserializeMemberRequestSnafu)
        }
        .instrument(trace_span!("guild_member", guild_id = %guild_id.0, user_id = %user_id.0))
        .await
    }

    pub async fn search_guild_members(
        &self,
        guild_id: &GuildId,
        query: &str,
        limit: u16,
    ) -> Result<Vec<Member>> {
        #[derive(Debug, Serialize)]
        struct SearchParams<'a> {
            query: &'a str,
            limit: u16,
        }

        let url = self.endpoint(&["guilds", &guild_id.0, "members", "search"])?;

        async {
            trace!("Searching guild members");

            let response = self
                .request(Method::GET, url)
                .query(&SearchParams { query, limit })
                .send()
                .await
                .context(UnableToExecuteSearchRequestSnafu)?;

            checked(response)
                .await
                .context(SearchRequestFailedSnafu)?
                .json::<Vec<Member>>()
                .await
                .context(UnableToDeserializeSearchRequestSnafu)
        }
        .instrument(trace_span!("search_guild_members", guild_id = %guild_id.0, limit))
        .await
    }

    pub async fn create_dm(&self, recipient_id: &UserId) -> Result<Channel> {
        #[derive(Debug, Serialize)]
        struct CreateDmParams<'a> {
            recipient_id: &'a UserId,
        }

        let url = self.endpoint(&["users", "@me", "channels"])?;

        async {
            trace!("Opening direct message channel");

            let response = self
                .request(Method::POST, url)
                .json(&CreateDmParams { recipient_id })
                .send()
                .await
                .context(UnableToExecuteCreateDmRequestSnafu)?;

            checked(response)
                .await
                .context(CreateDmRequestFailedSnafu)?
                .json::<Channel>()
                .await
                .context(UnableToDeserializeCreateDmRequestSnafu)
        }
        .instrument(trace_span!("create_dm", recipient_id = %recipient_id.0))
        .await
    }

    pub async fn create_message(&self, channel_id: &ChannelId, message: &CreateMessage) -> Result<()> {
        let url = self.endpoint(&["channels", &channel_id.0, "messages"])?;

        async {
            trace!("Sending message");

            let response = self
                .request(Method::POST, url)
                .json(message)
                .send()
                .await
                .context(UnableToExecuteCreateMessageRequestSnafu)?;

            checked(response)
                .await
                .context(CreateMessageRequestFailedSnafu)?;

            Ok(())
        }
        .instrument(trace_span!("create_message", channel_id = %channel_id.0))
        .await
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    UnableToBuildHttpClient {
        source: reqwest::Error,
    },

    #[snafu(display("DISCORD_API_URL cannot be used as a base URL"))]
    ApiUrlCannotBeABase,

    UnableToExecuteCurrentUserRequest {
        source: reqwest::Error,
    },

    CurrentUserRequestFailed {
        source: ApiError,
    },

    UnableToDeserializeCurrentUserRequest {
        source: reqwest::Error,
    },

    UnableToExecuteGuildRequest {
        source: reqwest::Error,
    },

    GuildRequestFailed {
        source: ApiError,
    },

    UnableToDeserializeGuildRequest {
        source: reqwest::Error,
    },

    UnableToExecuteMemberRequest {
        source: reqwest::Error,
    },

    MemberRequestFailed {
        source: ApiError,
    },

    UnableToDeserializeMemberRequest {
        source: reqwest::Error,
    },

    UnableToExecuteSearchRequest {
        source: reqwest::Error,
    },

    SearchRequestFailed {
        source: ApiError,
    },

    UnableToDeserializeSearchRequest {
        source: reqwest::Error,
    },

    UnableToExecuteCreateDmRequest {
        source: reqwest::Error,
    },

    CreateDmRequestFailed {
        source: ApiError,
    },

    UnableToDeserializeCreateDmRequest {
        source: reqwest::Error,
    },

    UnableToExecuteCreateMessageRequest {
        source: reqwest::Error,
    },

    CreateMessageRequestFailed {
        source: ApiError,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;
