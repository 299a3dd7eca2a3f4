use crate::{domain::IncomingRequest, flow::SendMessageFlow, session::Session, GlobalConfig};
use futures::{FutureExt, Stream, TryStreamExt};
use serde::Serialize;
use snafu::{ensure, ResultExt, Snafu};
use std::{convert::Infallible, future::Future, net::SocketAddr, panic::AssertUnwindSafe};
use tracing::{error, info, trace_span, Instrument};
use warp::{
    filters::BoxedFilter,
    http::{header::CONTENT_LENGTH, HeaderMap, StatusCode},
    hyper::body::{Buf, Bytes},
    reject,
    reply::{self, Json, WithStatus},
    Filter, Rejection, Reply,
};

const BODY_LIMIT: u64 = 100 * 1024;

pub(crate) async fn serve<S>(
    config: GlobalConfig,
    flow: SendMessageFlow<S>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServeError>
where
    S: Session + Clone + 'static,
{
    let routes = routes(config, flow);
    let address = config.listen_address;

    let (address, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(address, shutdown)
        .context(UnableToBindSnafu { address })?;

    info!("Server is running on {}", address);
    server.await;

    Ok(())
}

pub(crate) fn routes<S>(
    config: GlobalConfig,
    flow: SendMessageFlow<S>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone
where
    S: Session + Clone + 'static,
{
    let root = warp::path::end()
        .and(warp::get())
        .map(|| message("Never gonna give you up", StatusCode::OK));

    let api = authorized(config).and(send_message(flow));

    root.or(api)
        .recover(report_invalid)
        .with(warp::trace::request())
}

fn message(text: &str, status: StatusCode) -> WithStatus<Json> {
    #[derive(Debug, Serialize)]
    struct Body<'a> {
        message: &'a str,
    }

    reply::with_status(reply::json(&Body { message: text }), status)
}

fn authorized(config: GlobalConfig) -> BoxedFilter<()> {
    warp::header::headers_cloned()
        .and_then(move |headers: HeaderMap| async move {
            let api_key = headers.get("x-api-key").map(|v| v.as_bytes());
            if api_key == Some(config.api_key.as_bytes()) {
                Ok(())
            } else {
                Err(reject::custom(Error::Unauthorized))
            }
        })
        .untuple_one()
        .boxed()
}

fn send_message<S>(flow: SendMessageFlow<S>) -> BoxedFilter<(impl Reply,)>
where
    S: Session + Clone + 'static,
{
    warp::path!("send-message")
        .and(warp::post())
        .and(warp::header::headers_cloned())
        .and(warp::body::stream())
        .and_then(read_body)
        .and_then(move |body: Bytes| {
            let flow = flow.clone();
            async move {
                let request = IncomingRequest::from_json(&body).context(InvalidBodySnafu)?;

                let s = trace_span!("send_message");
                let outcome = AssertUnwindSafe(flow.send(request).instrument(s))
                    .catch_unwind()
                    .await;

                match outcome {
                    Ok(r) => r.context(RejectedSnafu)?,
                    Err(_) => return Err(Rejection::from(Error::Panicked)),
                }

                Ok::<_, Rejection>(message("Message sent successfully", StatusCode::OK))
            }
        })
        .boxed()
}

/// Bodies may arrive without a `Content-Length` (chunked, or none at all);
/// the limit is enforced on the declared length and again while reading.
async fn read_body<S, B>(headers: HeaderMap, body: S) -> Result<Bytes, Rejection>
where
    S: Stream<Item = Result<B, warp::Error>>,
    B: Buf,
{
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok()?.parse::<u64>().ok());

    if declared.map_or(false, |length| length > BODY_LIMIT) {
        return Err(reject::custom(Error::BodyTooLarge));
    }

    read_limited(body, BODY_LIMIT).await.map_err(reject::custom)
}

async fn read_limited<S, B>(body: S, limit: u64) -> Result<Bytes, Error>
where
    S: Stream<Item = Result<B, warp::Error>>,
    B: Buf,
{
    futures::pin_mut!(body);

    let mut collected = Vec::new();
    while let Some(mut chunk) = body.try_next().await.context(UnreadableBodySnafu)? {
        let total = collected.len() as u64 + chunk.remaining() as u64;
        ensure!(total <= limit, BodyTooLargeSnafu);

        while chunk.has_remaining() {
            let part = chunk.chunk();
            let n = part.len();
            collected.extend_from_slice(part);
            chunk.advance(n);
        }
    }

    Ok(collected.into())
}

async fn report_invalid(r: Rejection) -> Result<impl Reply, Infallible> {
    let internal = || {
        Ok(message(
            "Internal server error",
            StatusCode::INTERNAL_SERVER_ERROR,
        ))
    };

    if let Some(e) = r.find::<Error>() {
        use crate::flow::Error as Flow;
        use Error::*;

        match e {
            Unauthorized => Ok(message("Unauthorized", StatusCode::UNAUTHORIZED)),
            BodyTooLarge => Ok(message("Payload too large", StatusCode::PAYLOAD_TOO_LARGE)),
            UnreadableBody { .. } => Ok(message("Unable to read body", StatusCode::BAD_REQUEST)),
            InvalidBody { .. } => Ok(message("Invalid JSON body", StatusCode::BAD_REQUEST)),
            Rejected { source } => match source {
                Flow::InvalidRequest { source } => {
                    Ok(message(&source.to_string(), StatusCode::BAD_REQUEST))
                }
                Flow::MemberNotFound => Ok(message("Member not found", StatusCode::NOT_FOUND)),
                Flow::DeliveryFailed => Ok(message(
                    "Unable to deliver message",
                    StatusCode::BAD_GATEWAY,
                )),
            },
            Panicked => {
                error!("Error in /send-message endpoint: {}", e);
                internal()
            }
        }
    } else if r.is_not_found() || r.find::<reject::MethodNotAllowed>().is_some() {
        // Routes only exist for their one method; anything else is unknown.
        Ok(message("Not found", StatusCode::NOT_FOUND))
    } else {
        error!("Unhandled web API error: {:?}", r);
        internal()
    }
}

#[derive(Debug, Snafu)]
enum Error {
    Unauthorized,

    BodyTooLarge,

    UnreadableBody { source: warp::Error },

    InvalidBody { source: serde_json::Error },

    Rejected { source: crate::flow::Error },

    #[snafu(display("The request handler panicked"))]
    Panicked,
}

impl warp::reject::Reject for Error {}

#[derive(Debug, Snafu)]
pub(crate) enum ServeError {
    #[snafu(display("Unable to listen on {}", address))]
    UnableToBind {
        source: warp::Error,
        address: SocketAddr,
    },
}
