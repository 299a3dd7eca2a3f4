use crate::{
    discord::{GuildId, Member, UserId},
    domain::{IncomingRequest, MemberQuery, OrderNotification, ValidationError},
    session::Session,
};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{error, trace, trace_span, warn, Instrument};

pub const SEARCH_LIMIT: u16 = 5;

/// Picks the candidate whose username is exactly `username`; the platform's search is a prefix match.
pub fn exact_username_match(candidates: Vec<Member>, username: &str) -> Option<Member> {
    candidates.into_iter().find(|m| m.user.username == username)
}

#[derive(Debug, Clone)]
pub struct MemberResolver<S> {
    session: S,
    guild_id: GuildId,
}

impl<S: Session> MemberResolver<S> {
    pub fn new(session: S, guild_id: GuildId) -> Self {
        Self { session, guild_id }
    }

    pub async fn resolve(&self, query: &MemberQuery) -> Option<Member> {
        match query {
            MemberQuery::ById(user_id) => self.by_id(user_id).await,
            MemberQuery::ByName(username) => self.by_name(username).await,
        }
    }

    pub async fn by_id(&self, user_id: &UserId) -> Option<Member> {
        let Self { session, guild_id } = self;

        let r = async {
            let guild = session.guild(guild_id).await?;
            trace!("Looking up member in {}", guild.name);
            session.member(&guild, user_id).await
        }
        .instrument(trace_span!("by_id", user_id = %user_id.0))
        .await;

        match r {
            Ok(member) => Some(member),
            Err(e) => {
                warn!("Error fetching member by ID: {}", e);
                None
            }
        }
    }

    pub async fn by_name(&self, username: &str) -> Option<Member> {
        let Self { session, guild_id } = self;

        let r = async {
            let guild = session.guild(guild_id).await?;
            trace!("Searching members of {}", guild.name);
            let candidates = session
                .search_members(&guild, username, SEARCH_LIMIT)
                .await?;
            trace!("Search returned {} candidates", candidates.len());
            Ok::<_, S::Error>(exact_username_match(candidates, username))
        }
        .instrument(trace_span!("by_name", username))
        .await;

        match r {
            Ok(member) => member,
            Err(e) => {
                warn!("Error fetching member by username: {}", e);
                None
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notifier<S> {
    session: S,
    escape_markdown: bool,
}

impl<S: Session> Notifier<S> {
    pub fn new(session: S, escape_markdown: bool) -> Self {
        Self {
            session,
            escape_markdown,
        }
    }

    pub async fn notify(
        &self,
        member: &Member,
        notification: OrderNotification,
    ) -> Result<(), S::Error> {
        let Self {
            session,
            escape_markdown,
        } = self;

        let notification = if *escape_markdown {
            notification.escaped()
        } else {
            notification
        };

        async {
            let channel = session.open_dm(member).await?;
            let message = notification.to_message(chrono::Utc::now());
            session.send(&channel.id, &message).await?;
            trace!("Notification delivered");
            Ok(())
        }
        .instrument(trace_span!("notify", user_id = %member.user.id.0))
        .await
    }
}

#[derive(Debug, Clone)]
pub struct SendMessageFlow<S> {
    resolver: MemberResolver<S>,
    notifier: Notifier<S>,
    report_delivery_failures: bool,
}

impl<S: Session + Clone> SendMessageFlow<S> {
    pub fn new(session: S, config: &crate::Config) -> Self {
        Self {
            resolver: MemberResolver::new(session.clone(), config.guild_id.clone()),
            notifier: Notifier::new(session, config.escape_markdown),
            report_delivery_failures: config.report_delivery_failures,
        }
    }

    pub async fn send(&self, request: IncomingRequest) -> Result<()> {
        let Self {
            resolver,
            notifier,
            report_delivery_failures,
        } = self;

        let request = request.validate().context(InvalidRequestSnafu)?;
        let query = MemberQuery::parse(&request.member);

        let member = resolver.resolve(&query).await.context(MemberNotFoundSnafu)?;

        if let Err(e) = notifier.notify(&member, request.into()).await {
            error!("Error sending message to member: {}", e);
            if *report_delivery_failures {
                return DeliveryFailedSnafu.fail();
            }
        }

        Ok(())
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    InvalidRequest { source: ValidationError },

    MemberNotFound,

    DeliveryFailed,
}

type Result<T, E = Error> = std::result::Result<T, E>;
