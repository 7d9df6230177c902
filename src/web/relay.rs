//! Live-feed relay
//!
//! Bridges a collector live stream onto a server-sent-event response.
//! The relay is a pass-through state machine: connect upstream, forward
//! each item, terminate on the first upstream end or error. There is no
//! automatic retry; the browser's `EventSource` reconnect is the
//! recovery path.

use std::convert::Infallible;

use axum::response::sse::Event;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::Serialize;

use crate::client::CollectorClient;

/// Relay lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayState {
    Connecting,
    Streaming,
    Terminated,
}

/// Payload of the `feed` SSE event
#[derive(Debug, Clone, Serialize)]
pub struct FeedView {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub id: String,
}

/// Rewrites internal storage references into URLs the browser can fetch
///
/// A pure prefix substitution; URLs outside the expected prefix pass
/// through untouched.
#[derive(Debug, Clone)]
pub struct UrlRewriter {
    from_prefix: String,
    to_prefix: String,
}

impl UrlRewriter {
    pub fn new(from_prefix: impl Into<String>, to_prefix: impl Into<String>) -> Self {
        Self {
            from_prefix: from_prefix.into(),
            to_prefix: to_prefix.into(),
        }
    }

    pub fn apply(&self, url: &str) -> String {
        match url.strip_prefix(&self.from_prefix) {
            Some(rest) => format!("{}{}", self.to_prefix, rest),
            None => url.to_string(),
        }
    }
}

fn problem_event(message: &str) -> Event {
    Event::default().event("problem").data(message)
}

/// Open a collector live stream and re-emit it as SSE events
///
/// Emits `feed` events with a JSON payload and a terminal `problem`
/// event when the upstream goes away, then ends. Dropping the returned
/// stream (browser disconnect) closes the upstream connection.
pub fn feed_events(
    collector_addr: String,
    rewriter: UrlRewriter,
    feed_id: String,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    async_stream::stream! {
        let mut state = RelayState::Connecting;
        tracing::debug!(feed_id = %feed_id, state = ?state, "relay opening upstream");

        // No state is retried: a connect or subscribe failure ends the
        // relay, and the consumer decides whether to reconnect.
        let upstream = match CollectorClient::connect(collector_addr.as_str()).await {
            Ok(client) => client.live_stream().await,
            Err(e) => Err(e),
        };

        match upstream {
            Err(e) => {
                tracing::warn!(feed_id = %feed_id, error = %e, "relay could not open upstream feed");
                yield Ok(problem_event(&e.to_string()));
            }
            Ok(mut feed) => {
                state = RelayState::Streaming;
                tracing::debug!(feed_id = %feed_id, state = ?state, "relay streaming");

                loop {
                    match feed.next_event().await {
                        Ok(Some(event)) => {
                            let view = FeedView {
                                url: rewriter.apply(&event.image_url),
                                timestamp: event.timestamp,
                                id: event.id,
                            };
                            match Event::default().event("feed").json_data(&view) {
                                Ok(sse) => yield Ok(sse),
                                Err(e) => {
                                    tracing::error!(feed_id = %feed_id, error = %e, "feed event serialization failed");
                                }
                            }
                        }
                        Ok(None) => {
                            yield Ok(problem_event("feed ended"));
                            break;
                        }
                        Err(e) => {
                            yield Ok(problem_event(&e.to_string()));
                            break;
                        }
                    }
                }
            }
        }

        state = RelayState::Terminated;
        tracing::debug!(feed_id = %feed_id, state = ?state, "relay closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewriter_swaps_prefix() {
        let rewriter = UrlRewriter::new("http://localhost:8000/image", "/image");

        assert_eq!(
            rewriter.apply("http://localhost:8000/image/a.jpg"),
            "/image/a.jpg"
        );
    }

    #[test]
    fn test_rewriter_passes_foreign_urls_through() {
        let rewriter = UrlRewriter::new("http://localhost:8000/image", "/image");

        assert_eq!(
            rewriter.apply("http://elsewhere/b.jpg"),
            "http://elsewhere/b.jpg"
        );
    }

    #[test]
    fn test_feed_view_serializes_expected_fields() {
        let view = FeedView {
            url: "/image/a.jpg".into(),
            timestamp: DateTime::from_timestamp_millis(0).unwrap(),
            id: "cam".into(),
        };
        let value = serde_json::to_value(&view).unwrap();

        assert_eq!(value["url"], "/image/a.jpg");
        assert_eq!(value["id"], "cam");
        assert!(value["timestamp"].is_string());
    }
}
