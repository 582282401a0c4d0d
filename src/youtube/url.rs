use lazy_static::lazy_static;
use regex::Regex;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const PLAYLIST_MARKER: &str = "PL";

lazy_static! {
    static ref YOUTUBE_URL: Regex =
        Regex::new(r"^(https?://)?(www\.youtube\.com|youtu\.be)/.*$").unwrap();
}

/// What a YouTube URL points at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReference {
    pub has_playlist: bool,
    pub video_id: Option<String>,
    pub playlist_id: Option<String>,
}

impl ParsedReference {
    fn video(id: &str) -> Self {
        Self {
            video_id: non_empty(id),
            ..Self::default()
        }
    }

    fn playlist(id: &str) -> Self {
        let playlist_id = non_empty(id);
        Self {
            has_playlist: playlist_id.is_some(),
            playlist_id,
            ..Self::default()
        }
    }

    /// Nothing recognizable was found in the URL.
    pub fn is_empty(&self) -> bool {
        self.video_id.is_none() && self.playlist_id.is_none()
    }
}

pub fn video_url(video_id: &str) -> String {
    format!("{}{}", WATCH_URL, video_id)
}

/// Loose check for `www.youtube.com` / `youtu.be` links. Ids are not validated.
pub fn is_valid_url(url: &str) -> bool {
    YOUTUBE_URL.is_match(url)
}

/// Splits a URL into its video and playlist ids.
///
/// A link without any query (`https://youtu.be/<id>`) is resolved from its
/// last path segment: if the segment contains `PL` anywhere it is taken as a
/// playlist id, otherwise as a video id. This is a substring test, so a video
/// id that happens to contain `PL` is classified as a playlist.
///
/// With a query, `v=` and `list=` parameters are picked up independently, so a
/// video opened from inside a playlist keeps both ids. Anything else in the
/// query is ignored. Unrecognized input gives an empty reference.
///
/// Ids are trimmed of surrounding whitespace (a pasted link often carries a
/// trailing newline), and an id that is empty after trimming counts as absent.
pub fn classify(url: &str) -> ParsedReference {
    let tokens: Vec<&str> = url.split(['?', '&']).collect();

    if let [only] = tokens.as_slice() {
        let segment = only.rsplit('/').next().unwrap_or_default();
        return if segment.contains(PLAYLIST_MARKER) {
            ParsedReference::playlist(segment)
        } else {
            ParsedReference::video(segment)
        };
    }

    let mut reference = ParsedReference::default();
    for token in tokens {
        if let Some(id) = token.strip_prefix("v=") {
            reference.video_id = non_empty(id);
        } else if let Some(id) = token.strip_prefix("list=") {
            reference.playlist_id = non_empty(id);
            reference.has_playlist = reference.playlist_id.is_some();
        }
    }
    reference
}

fn non_empty(id: &str) -> Option<String> {
    match id.trim() {
        "" => None,
        id => Some(id.to_string()),
    }
}
