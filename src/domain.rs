use crate::discord::{ActionRow, Button, CreateMessage, Embed, UserId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use snafu::{ensure, Snafu};

/// Measured in UTF-16 code units, the way the calling side counts string length.
pub const MAX_PARAMETER_LENGTH: usize = 2000;

/// The `/send-message` body before validation; fields keep whatever JSON type the caller sent.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IncomingRequest {
    pub member: Option<Value>,
    pub order_id: Option<Value>,
    pub message: Option<Value>,
    pub url: Option<Value>,
}

impl IncomingRequest {
    /// An empty body or a JSON value that isn't an object carries no fields.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        let mut fields = match serde_json::from_slice::<Value>(body)? {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };

        Ok(Self {
            member: fields.remove("member"),
            order_id: fields.remove("orderID"),
            message: fields.remove("message"),
            url: fields.remove("url"),
        })
    }

    pub fn validate(self) -> Result<NotificationRequest, ValidationError> {
        let Self {
            member,
            order_id,
            message,
            url,
        } = self;

        match (
            present(member),
            present(order_id),
            present(message),
            present(url),
        ) {
            (Some(member), Some(order_id), Some(message), Some(url)) => {
                let too_long = [&member, &order_id, &message, &url]
                    .iter()
                    .any(|s| s.encode_utf16().count() > MAX_PARAMETER_LENGTH);
                ensure!(!too_long, ParametersTooLongSnafu);

                Ok(NotificationRequest {
                    member,
                    order_id,
                    message,
                    url,
                })
            }
            _ => MissingParametersSnafu.fail(),
        }
    }
}

fn present(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub member: String,
    pub order_id: String,
    pub message: String,
    pub url: String,
}

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum ValidationError {
    #[snafu(display("Missing required parameters"))]
    MissingParameters,

    #[snafu(display("Parameters are too long"))]
    ParametersTooLong,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberQuery {
    ById(UserId),
    ByName(String),
}

impl MemberQuery {
    /// Snowflakes are 17 to 20 decimal digits; anything else is a username.
    pub fn parse(member: &str) -> Self {
        let is_snowflake = (17..=20).contains(&member.len())
            && member.bytes().all(|b| b.is_ascii_digit());

        if is_snowflake {
            MemberQuery::ById(UserId(member.to_owned()))
        } else {
            MemberQuery::ByName(member.to_owned())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderNotification {
    pub order_id: String,
    pub message: String,
    pub url: String,
}

impl OrderNotification {
    pub const BUTTON_LABEL: &'static str = "View Order";

    pub fn title(&self) -> String {
        format!("You got a new message in your order {}", self.order_id)
    }

    pub fn escaped(self) -> Self {
        Self {
            order_id: escape_markdown(&self.order_id),
            message: escape_markdown(&self.message),
            url: self.url,
        }
    }

    pub fn to_message(&self, sent_at: DateTime<Utc>) -> CreateMessage {
        let embed = Embed {
            title: self.title(),
            description: self.message.clone(),
            url: self.url.clone(),
            timestamp: sent_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let row = ActionRow::new(vec![Button::link(Self::BUTTON_LABEL, &self.url)]);

        CreateMessage {
            embeds: vec![embed],
            components: vec![row],
        }
    }
}

impl From<NotificationRequest> for OrderNotification {
    fn from(other: NotificationRequest) -> Self {
        let NotificationRequest {
            order_id,
            message,
            url,
            ..
        } = other;

        Self {
            order_id,
            message,
            url,
        }
    }
}

pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '\\' | '*' | '_' | '~' | '`' | '|' | '>' | '#' | '[' | ']'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request(value: Value) -> IncomingRequest {
        IncomingRequest::from_json(value.to_string().as_bytes()).unwrap()
    }

    fn valid() -> Value {
        serde_json::json!({
            "member": "123456789012345678",
            "orderID": "A1",
            "message": "hi",
            "url": "https://x.test",
        })
    }

    #[test]
    fn complete_request_is_valid() {
        let r = request(valid()).validate().unwrap();

        assert_eq!(r.member, "123456789012345678");
        assert_eq!(r.order_id, "A1");
        assert_eq!(r.message, "hi");
        assert_eq!(r.url, "https://x.test");
    }

    #[test]
    fn each_field_is_required() {
        for field in ["member", "orderID", "message", "url"] {
            let mut body = valid();
            body.as_object_mut().unwrap().remove(field);
            assert_eq!(
                request(body).validate(),
                Err(ValidationError::MissingParameters),
                "without {}",
                field,
            );

            let mut body = valid();
            body[field] = Value::from("");
            assert_eq!(
                request(body).validate(),
                Err(ValidationError::MissingParameters),
                "with empty {}",
                field,
            );
        }
    }

    #[test]
    fn non_string_fields_are_missing() {
        let mut body = valid();
        body["orderID"] = Value::from(42);
        assert_eq!(
            request(body).validate(),
            Err(ValidationError::MissingParameters)
        );
    }

    #[test]
    fn length_limit_is_inclusive() {
        let mut body = valid();
        body["message"] = Value::from("a".repeat(MAX_PARAMETER_LENGTH));
        assert!(request(body).validate().is_ok());

        let mut body = valid();
        body["message"] = Value::from("a".repeat(MAX_PARAMETER_LENGTH + 1));
        assert_eq!(
            request(body).validate(),
            Err(ValidationError::ParametersTooLong)
        );
    }

    #[test]
    fn length_counts_utf16_units_not_bytes() {
        let mut body = valid();
        body["url"] = Value::from("é".repeat(MAX_PARAMETER_LENGTH));
        assert!(request(body).validate().is_ok());
    }

    #[test]
    fn astral_characters_count_twice() {
        let mut body = valid();
        body["message"] = Value::from("😀".repeat(MAX_PARAMETER_LENGTH / 2));
        assert!(request(body).validate().is_ok());

        let mut body = valid();
        body["message"] = Value::from("😀".repeat(MAX_PARAMETER_LENGTH / 2 + 1));
        assert_eq!(
            request(body).validate(),
            Err(ValidationError::ParametersTooLong)
        );
    }

    #[test]
    fn missing_check_precedes_length_check() {
        let mut body = valid();
        body["message"] = Value::from("a".repeat(MAX_PARAMETER_LENGTH + 1));
        body.as_object_mut().unwrap().remove("url");
        assert_eq!(
            request(body).validate(),
            Err(ValidationError::MissingParameters)
        );
    }

    #[test]
    fn bodies_without_fields_are_empty() {
        assert_eq!(
            IncomingRequest::from_json(b"").unwrap(),
            IncomingRequest::default()
        );
        assert_eq!(
            IncomingRequest::from_json(b"[1, 2]").unwrap(),
            IncomingRequest::default()
        );
        assert!(IncomingRequest::from_json(b"{not json").is_err());
    }

    #[test]
    fn snowflakes_are_looked_up_by_id() {
        for id in ["12345678901234567", "12345678901234567890"] {
            assert_eq!(MemberQuery::parse(id), MemberQuery::ById(UserId(id.into())));
        }
    }

    #[test]
    fn everything_else_is_looked_up_by_name() {
        for name in [
            "1234567890123456",
            "123456789012345678901",
            "ghost_user",
            "12345678901234567a",
            " 123456789012345678",
            "١٢٣٤٥٦٧٨٩٠١٢٣٤٥٦٧٨",
        ] {
            assert_eq!(MemberQuery::parse(name), MemberQuery::ByName(name.into()));
        }
    }

    #[test]
    fn notification_renders_the_order_template() {
        let notification = OrderNotification {
            order_id: "A1".into(),
            message: "hi".into(),
            url: "https://x.test".into(),
        };
        let sent_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();

        let message = notification.to_message(sent_at);

        assert_eq!(message.embeds.len(), 1);
        let embed = &message.embeds[0];
        assert_eq!(embed.title, "You got a new message in your order A1");
        assert_eq!(embed.description, "hi");
        assert_eq!(embed.url, "https://x.test");
        assert_eq!(embed.timestamp, "2024-05-01T12:30:00.000Z");

        assert_eq!(
            message.components,
            vec![ActionRow::new(vec![Button::link("View Order", "https://x.test")])]
        );
    }

    #[test]
    fn escaping_leaves_the_url_alone() {
        let notification = OrderNotification {
            order_id: "**A1**".into(),
            message: "[click](https://evil.test) _now_".into(),
            url: "https://x.test/a_b".into(),
        }
        .escaped();

        assert_eq!(notification.order_id, r"\*\*A1\*\*");
        assert_eq!(notification.message, r"\[click\](https://evil.test) \_now\_");
        assert_eq!(notification.url, "https://x.test/a_b");
    }
}
