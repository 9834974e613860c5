//! HTTP transport for the MCP server.
//!
//! One endpoint, two verbs:
//!
//! - `POST /mcp` carries a single JSON-RPC message. Requests are answered
//!   with the JSON-RPC reply; notifications get an empty `200 OK`. Bodies
//!   that are not a JSON-RPC request or notification get `400 Bad Request`.
//! - `GET /mcp` opens a Server-Sent Events stream that drains the session's
//!   notification queue, emitting a `ping` event whenever the queue stays
//!   idle for the configured timeout.
//!
//! Both verbs take an optional `session_id` query parameter, defaulting to
//! `"default"`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::dispatch::{Dispatcher, RequestContext, DEFAULT_SESSION_ID};
use super::protocol::{parse_message, IncomingMessage};
use crate::state::StreamAttachment;

/// Path of the single MCP endpoint.
pub const MCP_PATH: &str = "/mcp";

/// Shared state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
    sse_idle_timeout: Duration,
}

/// Query string accepted by both verbs.
#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    /// Session the request or stream belongs to.
    pub session_id: Option<String>,
}

impl SessionQuery {
    fn into_session_id(self) -> String {
        self.session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string())
    }
}

/// Builds the axum router serving [`MCP_PATH`].
pub fn router(dispatcher: Arc<Dispatcher>, sse_idle_timeout: Duration) -> Router {
    Router::new()
        .route(MCP_PATH, get(open_event_stream).post(handle_post))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState {
            dispatcher,
            sse_idle_timeout,
        })
}

async fn handle_post(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    body: String,
) -> Response {
    let ctx = RequestContext::new(query.into_session_id());

    match parse_message(&body) {
        Ok(IncomingMessage::Request(request)) => {
            let reply = state.dispatcher.dispatch(request, &ctx).await;
            Json(reply).into_response()
        }
        Ok(IncomingMessage::Notification(notification)) => {
            state.dispatcher.handle_notification(&notification, &ctx);
            StatusCode::OK.into_response()
        }
        Err(e) => {
            warn!(session = %ctx.session_id, error = %e, "Rejected malformed message");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

async fn open_event_stream(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = query.into_session_id();
    let attachment = state.dispatcher.state().attach_stream(&session_id).await;
    info!(session = %session_id, "SSE stream opened");

    let frames = frame_stream(attachment, state.sse_idle_timeout);
    Sse::new(frames.map(|frame| Ok(frame.into_event())))
}

/// One event on an SSE stream, before HTTP framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A serialised JSON-RPC notification.
    Notification(String),
    /// Keep-alive after an idle period.
    Ping,
    /// Terminal failure; the stream ends after this frame.
    Error(String),
}

impl SseFrame {
    /// The SSE `event:` name for this frame.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Notification(_) => "notification",
            Self::Ping => "ping",
            Self::Error(_) => "error",
        }
    }

    /// The SSE `data:` payload for this frame.
    #[must_use]
    pub fn data(&self) -> String {
        match self {
            Self::Notification(json) => json.clone(),
            Self::Ping => String::new(),
            Self::Error(message) => json!({ "error": message }).to_string(),
        }
    }

    fn into_event(self) -> Event {
        Event::default().event(self.event_name()).data(self.data())
    }
}

/// Turns a stream attachment into an endless stream of frames.
///
/// Each step waits up to `idle_timeout` for the next notification and yields
/// a [`SseFrame::Ping`] if none arrives. Dropping the stream drops the
/// attachment, so the session stops receiving fan-out until it reconnects.
pub fn frame_stream(
    attachment: StreamAttachment,
    idle_timeout: Duration,
) -> impl Stream<Item = SseFrame> + Send + 'static {
    stream::unfold(Some(attachment), move |attachment| async move {
        let attachment = attachment?;
        match tokio::time::timeout(idle_timeout, attachment.queue().recv()).await {
            Ok(notification) => match serde_json::to_string(&notification) {
                Ok(json) => Some((SseFrame::Notification(json), Some(attachment))),
                Err(e) => {
                    error!(
                        session = %attachment.session_id(),
                        error = %e,
                        "Cannot serialise notification"
                    );
                    Some((SseFrame::Error(e.to_string()), None))
                }
            },
            Err(_) => Some((SseFrame::Ping, Some(attachment))),
        }
    })
}
