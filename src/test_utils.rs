use crate::{
    discord::{Channel, ChannelId, CreateMessage, Guild, GuildId, Member, User, UserId},
    session::Session,
    Config,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use snafu::{ensure, OptionExt, Snafu};
use std::{collections::HashMap, sync::Arc};
use url::Url;

pub const GUILD_ID: &str = "100000000000000001";
pub const API_KEY: &str = "hunter2";

pub fn config() -> &'static Config {
    let config = Config {
        discord_token: "token".into(),
        discord_api_url: Url::parse("http://discord.invalid/api/").unwrap(),
        guild_id: GuildId(GUILD_ID.into()),
        api_key: API_KEY.into(),
        listen_address: ([127, 0, 0, 1], 0).into(),
        escape_markdown: false,
        report_delivery_failures: false,
    };
    &*Box::leak(Box::new(config))
}

pub fn member(id: &str, username: &str) -> Member {
    Member {
        user: User {
            id: UserId(id.into()),
            username: username.into(),
            discriminator: Some("0".into()),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Guild { guild_id: GuildId },
    Member { user_id: UserId },
    SearchMembers { query: String, limit: u16 },
    OpenDm { user_id: UserId },
    Send { channel_id: ChannelId },
}

#[derive(Debug, Default)]
struct State {
    members: Vec<Member>,
    failing_lookups: bool,
    failing_delivery: bool,
    panicking: bool,
    dm_channels: HashMap<ChannelId, UserId>,
    calls: Vec<Call>,
    sent: Vec<(UserId, CreateMessage)>,
}

/// An in-memory guild that records every call made against it.
#[derive(Debug, Clone, Default)]
pub struct FakeSession {
    state: Arc<Mutex<State>>,
}

impl FakeSession {
    pub fn with_member(self, member: Member) -> Self {
        self.state.lock().members.push(member);
        self
    }

    pub fn failing_lookups(self) -> Self {
        self.state.lock().failing_lookups = true;
        self
    }

    pub fn failing_delivery(self) -> Self {
        self.state.lock().failing_delivery = true;
        self
    }

    pub fn panicking(self) -> Self {
        self.state.lock().panicking = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn sent(&self) -> Vec<(UserId, CreateMessage)> {
        self.state.lock().sent.clone()
    }
}

#[async_trait]
impl Session for FakeSession {
    type Error = FakeError;

    async fn guild(&self, guild_id: &GuildId) -> Result<Guild, FakeError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Guild {
            guild_id: guild_id.clone(),
        });

        if state.panicking {
            drop(state);
            panic!("guild lookup blew up");
        }

        ensure!(!state.failing_lookups, UnavailableSnafu);
        ensure!(guild_id.0 == GUILD_ID, UnknownGuildSnafu);

        Ok(Guild {
            id: guild_id.clone(),
            name: "Test Guild".into(),
        })
    }

    async fn member(&self, _guild: &Guild, user_id: &UserId) -> Result<Member, FakeError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Member {
            user_id: user_id.clone(),
        });

        ensure!(!state.failing_lookups, UnavailableSnafu);

        state
            .members
            .iter()
            .find(|m| &m.user.id == user_id)
            .cloned()
            .context(UnknownMemberSnafu)
    }

    async fn search_members(
        &self,
        _guild: &Guild,
        query: &str,
        limit: u16,
    ) -> Result<Vec<Member>, FakeError> {
        let mut state = self.state.lock();
        state.calls.push(Call::SearchMembers {
            query: query.into(),
            limit,
        });

        ensure!(!state.failing_lookups, UnavailableSnafu);

        let query = query.to_lowercase();
        Ok(state
            .members
            .iter()
            .filter(|m| m.user.username.to_lowercase().starts_with(&query))
            .take(limit.into())
            .cloned()
            .collect())
    }

    async fn open_dm(&self, member: &Member) -> Result<Channel, FakeError> {
        let mut state = self.state.lock();
        let user_id = member.user.id.clone();
        state.calls.push(Call::OpenDm {
            user_id: user_id.clone(),
        });

        ensure!(!state.failing_delivery, CannotSendMessagesSnafu);

        let id = ChannelId(format!("dm-{}", user_id.0));
        state.dm_channels.insert(id.clone(), user_id);
        Ok(Channel { id })
    }

    async fn send(&self, channel: &ChannelId, message: &CreateMessage) -> Result<(), FakeError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Send {
            channel_id: channel.clone(),
        });

        ensure!(!state.failing_delivery, CannotSendMessagesSnafu);

        let user_id = state
            .dm_channels
            .get(channel)
            .cloned()
            .context(UnknownChannelSnafu)?;
        state.sent.push((user_id, message.clone()));
        Ok(())
    }
}

#[derive(Debug, Snafu)]
pub enum FakeError {
    UnknownGuild,

    UnknownMember,

    UnknownChannel,

    Unavailable,

    CannotSendMessages,
}
