pub mod client;
pub mod playlist;
pub mod url;

pub use client::YouTube;
pub use playlist::{enumerate_playlist, PlaylistEntry};
pub use url::{classify, is_valid_url, video_url};
