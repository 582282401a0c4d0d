use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

fn downloads(home: &Path) -> PathBuf {
    home.join("Downloads")
}

/// Absolute, home-relative (`~`) or drive-letter paths are taken as given.
fn is_rooted(input: &str) -> bool {
    input.starts_with('/') || input.starts_with('~') || input.chars().nth(1) == Some(':')
}

/// Turns user input into an existing download directory.
///
/// Relative input is resolved against `home`. When the result does not exist
/// the download goes to `~/Downloads` instead.
pub fn resolve_download_dir(input: &str, home: &Path) -> PathBuf {
    let input = input.trim();
    if input.is_empty() {
        return downloads(home);
    }

    let path = if let Some(rest) = input.strip_prefix('~') {
        home.join(rest.trim_start_matches(['/', '\\']))
    } else if is_rooted(input) {
        PathBuf::from(input)
    } else {
        home.join(input)
    };

    if path.is_dir() {
        path
    } else {
        let fallback = downloads(home);
        warn!(
            "could not find directory {} | downloading into {} instead",
            path.display(),
            fallback.display()
        );
        fallback
    }
}

/// Asks on stdin where the files should go.
pub fn prompt_download_dir(home: &Path) -> io::Result<PathBuf> {
    print!(
        "{} ",
        "Directory where you want to download the songs (absolute path or from user directory):".bold()
    );
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(resolve_download_dir(&input, home))
}
