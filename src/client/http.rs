//! HTTP backend for the feed service.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use super::{ClientError, PulseBackend, Subscription};
use crate::api::CHANGE_EVENT;
use crate::auth::{API_KEY_HEADER, PROFILE_HEADER};
use crate::config::ClientConfig;
use crate::errors::ErrorDetails;
use crate::models::{
    decode_rows, CastVoteRequest, ChangeEvent, Comment, Community, CreateCommentRequest,
    CreateCommunityRequest, CreatePostRequest, CreateProfileRequest, FeedQuery, Post, Profile,
    Table, VoteTally, VoteValue,
};

/// Buffered changes per subscription before the reader waits on the view.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Response envelope shared by every endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<ErrorDetails>,
}

/// Talks to the feed service over its REST and SSE endpoints.
#[derive(Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| ClientError::Validation(format!("invalid API key: {}", e)))?;
            headers.insert(API_KEY_HEADER, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn as_viewer(builder: RequestBuilder, viewer: Option<&str>) -> RequestBuilder {
        match viewer {
            Some(id) => builder.header(PROFILE_HEADER, id),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = builder.send().await?;
        read_envelope(response).await
    }

    async fn send_rows<T: DeserializeOwned>(
        &self,
        kind: &str,
        builder: RequestBuilder,
    ) -> Result<Vec<T>, ClientError> {
        let rows: Vec<Value> = self.send(builder).await?;
        Ok(decode_rows(kind, rows))
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        viewer: Option<&str>,
        body: &B,
    ) -> Result<T, ClientError> {
        let builder = Self::as_viewer(self.http.post(self.url(path)), viewer).json(body);
        self.send(builder).await
    }
}

/// Unwrap a response envelope, turning error envelopes into [`ClientError::Api`].
async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.text().await?;

    let envelope: Envelope<T> = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => return Err(ClientError::Decode(e.to_string())),
        Err(_) => {
            return Err(ClientError::Api {
                status: status.as_u16(),
                code: "HTTP_ERROR".to_string(),
                message: body,
            })
        }
    };

    if envelope.success && status.is_success() {
        return envelope
            .data
            .ok_or_else(|| ClientError::Decode("response carried no data".to_string()));
    }

    let details = envelope.error.unwrap_or(ErrorDetails {
        code: "HTTP_ERROR".to_string(),
        message: status.to_string(),
    });
    Err(ClientError::Api {
        status: status.as_u16(),
        code: details.code,
        message: details.message,
    })
}

#[async_trait]
impl PulseBackend for HttpBackend {
    async fn create_profile(&self, request: &CreateProfileRequest) -> Result<Profile, ClientError> {
        self.post_json("/profiles", None, request).await
    }

    async fn list_communities(&self) -> Result<Vec<Community>, ClientError> {
        self.send_rows("community", self.http.get(self.url("/communities")))
            .await
    }

    async fn create_community(
        &self,
        request: &CreateCommunityRequest,
    ) -> Result<Community, ClientError> {
        self.post_json("/communities", None, request).await
    }

    async fn list_posts(
        &self,
        query: &FeedQuery,
        viewer: Option<&str>,
    ) -> Result<Vec<Post>, ClientError> {
        let builder = Self::as_viewer(self.http.get(self.url("/posts")), viewer).query(query);
        self.send_rows("post", builder).await
    }

    async fn create_post(
        &self,
        viewer: &str,
        request: &CreatePostRequest,
    ) -> Result<Post, ClientError> {
        self.post_json("/posts", Some(viewer), request).await
    }

    async fn cast_vote(
        &self,
        viewer: &str,
        post_id: &str,
        value: VoteValue,
    ) -> Result<VoteTally, ClientError> {
        let path = format!("/posts/{}/vote", post_id);
        let builder = Self::as_viewer(self.http.put(self.url(&path)), Some(viewer))
            .json(&CastVoteRequest { value });
        self.send(builder).await
    }

    async fn retract_vote(&self, viewer: &str, post_id: &str) -> Result<VoteTally, ClientError> {
        let path = format!("/posts/{}/vote", post_id);
        let builder = Self::as_viewer(self.http.delete(self.url(&path)), Some(viewer));
        self.send(builder).await
    }

    async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>, ClientError> {
        let path = format!("/posts/{}/comments", post_id);
        self.send_rows("comment", self.http.get(self.url(&path)))
            .await
    }

    async fn create_comment(
        &self,
        viewer: &str,
        post_id: &str,
        content: &str,
    ) -> Result<Comment, ClientError> {
        let path = format!("/posts/{}/comments", post_id);
        let request = CreateCommentRequest {
            content: content.to_string(),
        };
        self.post_json(&path, Some(viewer), &request).await
    }

    async fn subscribe(&self, table: Table) -> Result<Subscription, ClientError> {
        let response = self
            .http
            .get(self.url("/realtime"))
            .query(&[("table", table.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                code: "HTTP_ERROR".to_string(),
                message,
            });
        }

        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let reader = tokio::spawn(async move {
            let mut changes = Box::pin(change_events(response.bytes_stream()));
            while let Some(event) = changes.next().await {
                match event {
                    Ok(event) => {
                        if sender.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Realtime stream on {} failed: {}", table.as_str(), e);
                        return;
                    }
                }
            }
            tracing::debug!("Realtime stream on {} ended", table.as_str());
        });

        Ok(Subscription::new(table, receiver, reader))
    }
}

/// Decode a `text/event-stream` body into change events.
///
/// Frames with another event name are skipped, malformed payloads are logged and
/// dropped. A transport error ends the stream after being yielded once.
pub fn change_events<S, B, E>(body: S) -> impl Stream<Item = Result<ChangeEvent, String>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    body.eventsource()
        .filter_map(|frame| async move {
            match frame {
                Ok(frame) if frame.event != CHANGE_EVENT => None,
                Ok(frame) => match serde_json::from_str::<ChangeEvent>(&frame.data) {
                    Ok(event) => Some(Ok(event)),
                    Err(e) => {
                        tracing::warn!("Dropping malformed change frame: {}", e);
                        None
                    }
                },
                Err(e) => Some(Err(e.to_string())),
            }
        })
        .scan(false, |failed, item| {
            let next = if *failed {
                None
            } else {
                *failed = item.is_err();
                Some(item)
            };
            futures::future::ready(next)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> {
        let parts: Vec<Result<Vec<u8>, std::io::Error>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(parts)
    }

    #[tokio::test]
    async fn test_change_events_across_chunks() {
        let body = chunks(&[
            ": subscribed\n\nevent: cha",
            "nge\r\ndata: {\"revision\":3,\"table\":\"posts\",",
            "\"kind\":\"update\",\"record\":{\"id\":\"p1\"}}\n\n",
        ]);
        let events: Vec<_> = change_events(body).collect().await;

        assert_eq!(events.len(), 1);
        let event = events[0].as_ref().unwrap();
        assert_eq!(event.revision, 3);
        assert_eq!(event.table, Table::Posts);
        assert_eq!(event.record["id"], "p1");
    }

    #[tokio::test]
    async fn test_change_events_skip_other_frames() {
        let body = chunks(&[
            ":\n\n",
            "data: not a change\n\n",
            "event: change\ndata: {broken\n\n",
            "event: change\ndata: {\"revision\":9,\"table\":\"comments\",\"kind\":\"insert\",\"record\":{}}\n\n",
        ]);
        let events: Vec<_> = change_events(body).collect().await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().table, Table::Comments);
    }

    #[tokio::test]
    async fn test_change_events_stop_on_transport_error() {
        let body = futures::stream::iter(vec![
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(b"event: change\ndata: {}\n\n".to_vec()),
        ]);
        let events: Vec<_> = change_events(body).collect().await;

        assert_eq!(events.len(), 1);
        assert!(events[0].is_err());
    }

    #[test]
    fn test_url_joins_base() {
        let config = ClientConfig {
            base_url: "http://localhost:8080".to_string(),
            api_key: Some("secret".to_string()),
            local_store_path: "./data/local.json".into(),
            search_debounce: crate::config::DEFAULT_SEARCH_DEBOUNCE,
        };
        let backend = HttpBackend::new(&config).unwrap();
        assert_eq!(backend.url("/posts"), "http://localhost:8080/api/posts");
    }
}
