use crate::error::{Error, Result};
use crate::youtube::playlist::{PlaylistItems, PlaylistItemsRequest, PlaylistItemsResponse, PlaylistPage};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// YouTube Data API v3 client authenticated with an API key.
pub struct YouTube {
    http: Client,
    api_key: String,
    api_base: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

impl YouTube {
    pub fn new(api_key: &str) -> Self {
        Self::with_base(api_key, DEFAULT_API_BASE)
    }

    pub fn with_base(api_key: &str, api_base: &str) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn playlist_items_query(&self, request: &PlaylistItemsRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("part", request.part.to_string()),
            ("playlistId", request.playlist_id.clone()),
            ("maxResults", request.max_results.to_string()),
        ];
        if let Some(token) = &request.page_token {
            query.push(("pageToken", token.clone()));
        }
        query.push(("key", self.api_key.clone()));
        query
    }
}

#[async_trait]
impl PlaylistItems for YouTube {
    async fn list_playlist_items(&self, request: &PlaylistItemsRequest) -> Result<PlaylistPage> {
        debug!(
            playlist_id = %request.playlist_id,
            page_token = ?request.page_token,
            "requesting playlist items"
        );

        let response = self
            .http
            .get(format!("{}/playlistItems", self.api_base))
            .query(&self.playlist_items_query(request))
            .send()
            .await?;

        let status = response.status();
        match status.is_success() {
            true => {
                let body = response.text().await?;
                let items: PlaylistItemsResponse =
                    serde_json::from_str(&body).map_err(|e| Error::Payload(e.to_string()))?;
                PlaylistPage::try_from(items)
            }
            false => Err(status_error(status, &response.text().await?)),
        }
    }
}

fn status_error(status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|response| response.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized(message),
        _ => Error::Api {
            status: status.as_u16(),
            message,
        },
    }
}
