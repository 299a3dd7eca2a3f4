use crate::discord::{self, Channel, ChannelId, CreateMessage, Guild, GuildId, Member, UserId};
use async_trait::async_trait;

/// The slice of the chat platform that resolving and notifying members needs.
#[async_trait]
pub trait Session: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn guild(&self, guild_id: &GuildId) -> Result<Guild, Self::Error>;

    async fn member(&self, guild: &Guild, user_id: &UserId) -> Result<Member, Self::Error>;

    async fn search_members(
        &self,
        guild: &Guild,
        query: &str,
        limit: u16,
    ) -> Result<Vec<Member>, Self::Error>;

    async fn open_dm(&self, member: &Member) -> Result<Channel, Self::Error>;

    async fn send(&self, channel: &ChannelId, message: &CreateMessage) -> Result<(), Self::Error>;
}

#[async_trait]
impl Session for discord::Client {
    type Error = discord::Error;

    async fn guild(&self, guild_id: &GuildId) -> Result<Guild, Self::Error> {
        discord::Client::guild(self, guild_id).await
    }

    async fn member(&self, guild: &Guild, user_id: &UserId) -> Result<Member, Self::Error> {
        self.guild_member(&guild.id, user_id).await
    }

    async fn search_members(
        &self,
        guild: &Guild,
        query: &str,
        limit: u16,
    ) -> Result<Vec<Member>, Self::Error> {
        self.search_guild_members(&guild.id, query, limit).await
    }

    async fn open_dm(&self, member: &Member) -> Result<Channel, Self::Error> {
        self.create_dm(&member.user.id).await
    }

    async fn send(&self, channel: &ChannelId, message: &CreateMessage) -> Result<(), Self::Error> {
        self.create_message(channel, message).await
    }
}
