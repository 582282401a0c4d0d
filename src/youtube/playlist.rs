use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Largest page the playlistItems endpoint will return.
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub title: String,
    pub video_id: String,
}

/// One page of a playlist, in the order the API returned it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistPage {
    pub items: Vec<PlaylistEntry>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistItemsRequest {
    pub playlist_id: String,
    pub part: &'static str,
    pub max_results: u32,
    pub page_token: Option<String>,
}

impl PlaylistItemsRequest {
    pub fn new(playlist_id: &str, page_token: Option<String>) -> Self {
        Self {
            playlist_id: playlist_id.to_string(),
            part: "snippet",
            max_results: MAX_PAGE_SIZE,
            page_token,
        }
    }
}

/// Anything that can list the items of a playlist one page at a time.
#[async_trait]
pub trait PlaylistItems {
    async fn list_playlist_items(&self, request: &PlaylistItemsRequest) -> Result<PlaylistPage>;
}

/// Walks every page of `playlist_id` and returns its entries in playlist order.
///
/// Pages are fetched one after the other until the API stops handing out a
/// continuation token. The first error aborts the walk and is returned as is.
pub async fn enumerate_playlist<C>(catalog: &C, playlist_id: &str) -> Result<Vec<PlaylistEntry>>
where
    C: PlaylistItems + ?Sized,
{
    let mut entries = Vec::new();
    let mut page_token = None;

    loop {
        let request = PlaylistItemsRequest::new(playlist_id, page_token);
        let page = catalog.list_playlist_items(&request).await?;
        debug!(
            playlist_id,
            items = page.items.len(),
            more = page.next_page_token.is_some(),
            "fetched playlist page"
        );

        entries.extend(page.items);

        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    Ok(entries)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    pub video_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub title: String,
    pub resource_id: ResourceId,
}

#[derive(Deserialize)]
pub struct PlaylistItem {
    pub snippet: Snippet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemsResponse {
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
    pub next_page_token: Option<String>,
}

impl TryFrom<PlaylistItemsResponse> for PlaylistPage {
    type Error = Error;

    fn try_from(response: PlaylistItemsResponse) -> Result<Self> {
        let items = response
            .items
            .into_iter()
            .map(|item| {
                let Snippet { title, resource_id } = item.snippet;
                match resource_id.video_id {
                    Some(video_id) if !video_id.is_empty() => Ok(PlaylistEntry { title, video_id }),
                    _ => Err(Error::Payload(format!("item \"{}\" has no video id", title))),
                }
            })
            .collect::<Result<Vec<PlaylistEntry>>>()?;

        Ok(PlaylistPage {
            items,
            next_page_token: response.next_page_token.filter(|token| !token.is_empty()),
        })
    }
}
