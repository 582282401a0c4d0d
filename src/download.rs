use crate::error::{Error, Result};
use colored::Colorize;
use std::cell::{Cell, RefCell};
use std::io::{Stdout, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

const PROGRESS_MARKER: &str = "ytmp3:";
const PROGRESS_TEMPLATE: &str = "download:ytmp3:%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s|%(progress.status)s";
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressStatus {
    Downloading,
    Finished,
    Error,
    Other(String),
}

impl From<&str> for ProgressStatus {
    fn from(status: &str) -> Self {
        match status {
            "downloading" => Self::Downloading,
            "finished" => Self::Finished,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub downloaded: u64,
    pub total: Option<u64>,
    /// Bytes per second.
    pub speed: Option<f64>,
    pub eta: Option<Duration>,
    pub status: ProgressStatus,
}

impl Progress {
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some(self.downloaded as f64 * 100.0 / total as f64),
            _ => None,
        }
    }
}

/// Receives progress updates while a download is running.
///
/// Called on the task driving the download, once per progress line.
pub trait ProgressObserver {
    fn on_progress(&self, progress: &Progress);

    /// The yt-dlp process has exited, successfully or not.
    fn on_exit(&self, _success: bool) {}
}

/// Ignores every update.
pub struct Silent;

impl ProgressObserver for Silent {
    fn on_progress(&self, _progress: &Progress) {}
}

/// Prints a single, rewritten percentage line.
pub struct ConsoleProgress<W: Write = Stdout> {
    out: RefCell<W>,
    line_open: Cell<bool>,
}

impl ConsoleProgress {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleProgress<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: RefCell::new(out),
            line_open: Cell::new(false),
        }
    }

    fn render(&self, progress: &Progress) -> std::io::Result<()> {
        let percent = progress
            .percent()
            .map(|p| format!("{:5.1}%", p))
            .unwrap_or_else(|| "  ?  %".to_string());

        let mut line = format!("\r  {}", percent.cyan());
        if let Some(speed) = progress.speed {
            line.push_str(&format!("  {:>8.1} KiB/s", speed / 1024.0));
        }
        if let Some(eta) = progress.eta {
            line.push_str(&format!("  eta {}s", eta.as_secs()));
        }

        let mut out = self.out.borrow_mut();
        write!(out, "{}", line)?;
        self.line_open.set(true);
        if progress.status == ProgressStatus::Finished {
            writeln!(out, "  {}", "done".green())?;
            self.line_open.set(false);
        }
        out.flush()
    }

    /// Ends a percentage line left open by an interrupted download.
    fn close_line(&self) -> std::io::Result<()> {
        if self.line_open.replace(false) {
            let mut out = self.out.borrow_mut();
            writeln!(out)?;
            out.flush()?;
        }
        Ok(())
    }
}

impl<W: Write> ProgressObserver for ConsoleProgress<W> {
    fn on_progress(&self, progress: &Progress) {
        if let Err(e) = self.render(progress) {
            debug!("could not print progress: {}", e);
        }
    }

    fn on_exit(&self, _success: bool) {
        if let Err(e) = self.close_line() {
            debug!("could not print progress: {}", e);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    pub ytdlp_bin: PathBuf,
    pub format: String,
    pub audio_format: String,
    pub audio_quality: String,
    pub embed_thumbnail: bool,
    pub add_metadata: bool,
    pub verbose: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            ytdlp_bin: PathBuf::from("yt-dlp"),
            format: "bestaudio/best".to_string(),
            audio_format: "mp3".to_string(),
            audio_quality: "192K".to_string(),
            embed_thumbnail: true,
            add_metadata: true,
            verbose: false,
        }
    }
}

/// Fetches a video's audio track through yt-dlp and transcodes it with ffmpeg.
pub struct Downloader {
    config: DownloadConfig,
}

impl Downloader {
    pub fn new(config: DownloadConfig) -> Self {
        Self { config }
    }

    pub fn args(&self, url: &str, dir: &Path) -> Vec<String> {
        let mut args = vec![
            "--format".to_string(),
            self.config.format.clone(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            self.config.audio_format.clone(),
            "--audio-quality".to_string(),
            self.config.audio_quality.clone(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "--output".to_string(),
            dir.join(OUTPUT_TEMPLATE).to_string_lossy().to_string(),
        ];
        if self.config.embed_thumbnail {
            args.push("--embed-thumbnail".to_string());
        }
        if self.config.add_metadata {
            args.push("--add-metadata".to_string());
        }
        if self.config.verbose {
            args.push("--verbose".to_string());
        }
        args.push(url.to_string());
        args
    }

    /// Runs yt-dlp to completion, reporting progress to `observer` as it goes.
    pub async fn download(&self, url: &str, dir: &Path, observer: &dyn ProgressObserver) -> Result<()> {
        let args = self.args(url, dir);
        info!(url, dir = %dir.display(), "starting download");
        debug!(bin = %self.config.ytdlp_bin.display(), ?args, "spawning yt-dlp");

        let mut child = Command::new(&self.config.ytdlp_bin)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Download("yt-dlp stdout unavailable".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Download("yt-dlp stderr unavailable".to_string()))?;

        let stderr_reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        });

        // titles and paths are not guaranteed to be utf-8
        let mut stdout = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = match stdout.read_until(b'\n', &mut buf).await {
                Ok(read) => read,
                Err(e) => {
                    observer.on_exit(false);
                    return Err(e.into());
                }
            };
            if read == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            match parse_progress_line(&line) {
                Some(progress) => observer.on_progress(&progress),
                None => debug!(target: "ytmp3::ytdlp", "{}", line.trim_end()),
            }
        }

        let status = child.wait().await;
        observer.on_exit(matches!(&status, Ok(status) if status.success()));
        let status = status?;
        let stderr = stderr_reader.await.unwrap_or_default();

        if status.success() {
            info!(url, "download finished");
            Ok(())
        } else {
            Err(Error::Download(format!(
                "yt-dlp exited with {}: {}",
                status,
                stderr_tail(&stderr)
            )))
        }
    }
}

/// Parses a line produced by our `--progress-template`.
fn parse_progress_line(line: &str) -> Option<Progress> {
    let fields: Vec<&str> = line.trim().strip_prefix(PROGRESS_MARKER)?.split('|').collect();
    let [downloaded, total, estimate, speed, eta, status] = fields.as_slice() else {
        return None;
    };

    Some(Progress {
        downloaded: parse_number::<f64>(downloaded).map(|n| n as u64).unwrap_or(0),
        total: parse_number::<f64>(total)
            .or_else(|| parse_number::<f64>(estimate))
            .map(|n| n as u64),
        speed: parse_number(speed),
        eta: parse_number::<f64>(eta).map(|secs| Duration::from_secs(secs.max(0.0) as u64)),
        status: ProgressStatus::from(status.trim()),
    })
}

fn parse_number<T: std::str::FromStr>(field: &str) -> Option<T> {
    match field.trim() {
        "NA" | "None" | "" => None,
        value => value.parse().ok(),
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(3);
    match lines[start..].join("\n") {
        tail if tail.is_empty() => "no output".to_string(),
        tail => tail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use std::fs;

    #[derive(Default)]
    struct Recorder {
        updates: RefCell<Vec<Progress>>,
        exits: RefCell<Vec<bool>>,
    }

    impl ProgressObserver for Recorder {
        fn on_progress(&self, progress: &Progress) {
            self.updates.borrow_mut().push(progress.clone());
        }

        fn on_exit(&self, success: bool) {
            self.exits.borrow_mut().push(success);
        }
    }

    /// Writes an executable shell script standing in for yt-dlp.
    #[cfg(unix)]
    fn fake_ytdlp(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("yt-dlp");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn progress(status: ProgressStatus) -> Progress {
        Progress {
            downloaded: 512,
            total: Some(1024),
            speed: None,
            eta: None,
            status,
        }
    }

    #[test]
    fn parses_progress_line() {
        let progress = parse_progress_line("ytmp3:1048576|4194304|NA|524288.0|6|downloading").unwrap();

        assert_eq!(
            progress,
            Progress {
                downloaded: 1_048_576,
                total: Some(4_194_304),
                speed: Some(524_288.0),
                eta: Some(Duration::from_secs(6)),
                status: ProgressStatus::Downloading,
            }
        );
        assert_eq!(progress.percent(), Some(25.0));
    }

    #[test]
    fn falls_back_to_estimated_total() {
        let progress = parse_progress_line("ytmp3:500|NA|1000.0|NA|NA|downloading").unwrap();

        assert_eq!(progress.total, Some(1000));
        assert_eq!(progress.speed, None);
        assert_eq!(progress.eta, None);
        assert_eq!(progress.percent(), Some(50.0));
    }

    #[test]
    fn finished_line() {
        let progress = parse_progress_line("ytmp3:4194304|4194304|NA|NA|NA|finished").unwrap();
        assert_eq!(progress.status, ProgressStatus::Finished);
    }

    #[test]
    fn ignores_other_output() {
        assert_eq!(parse_progress_line("[youtube] XAAoiV37X7c: Downloading webpage"), None);
        assert_eq!(parse_progress_line("ytmp3:1|2|3"), None);
    }

    #[test]
    fn unknown_total_has_no_percent() {
        let progress = parse_progress_line("ytmp3:10|NA|NA|NA|NA|downloading").unwrap();
        assert_eq!(progress.percent(), None);
    }

    #[test]
    fn default_args() {
        let downloader = Downloader::new(DownloadConfig::default());
        let url = "https://www.youtube.com/watch?v=XAAoiV37X7c";

        let args = downloader.args(url, Path::new("/music"));

        assert_eq!(args.last().map(String::as_str), Some(url));
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("--format") + 1], "bestaudio/best");
        assert_eq!(args[pos("--audio-format") + 1], "mp3");
        assert_eq!(args[pos("--audio-quality") + 1], "192K");
        assert_eq!(
            Path::new(&args[pos("--output") + 1]),
            Path::new("/music").join("%(title)s.%(ext)s")
        );
        assert!(args.contains(&"--extract-audio".to_string()));
        assert!(args.contains(&"--embed-thumbnail".to_string()));
        assert!(args.contains(&"--add-metadata".to_string()));
        assert!(!args.contains(&"--verbose".to_string()));
    }

    #[test]
    fn optional_flags_follow_config() {
        let downloader = Downloader::new(DownloadConfig {
            embed_thumbnail: false,
            add_metadata: false,
            verbose: true,
            ..DownloadConfig::default()
        });

        let args = downloader.args("https://youtu.be/jJTfV3hON8M", Path::new("out"));

        assert!(!args.contains(&"--embed-thumbnail".to_string()));
        assert!(!args.contains(&"--add-metadata".to_string()));
        assert!(args.contains(&"--verbose".to_string()));
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let stderr = "one\n\ntwo\nthree\nERROR: four\n";
        assert_eq!(stderr_tail(stderr), "two\nthree\nERROR: four");
        assert_eq!(stderr_tail(""), "no output");
    }

    #[tokio::test]
    async fn missing_binary_is_io_error() {
        let downloader = Downloader::new(DownloadConfig {
            ytdlp_bin: PathBuf::from("/nonexistent/yt-dlp-ytmp3-test"),
            ..DownloadConfig::default()
        });
        let recorder = Recorder::default();

        let result = downloader
            .download("https://youtu.be/jJTfV3hON8M", Path::new("."), &recorder)
            .await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert!(recorder.updates.borrow().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_output_does_not_abort() {
        let bin_dir = tempfile::tempdir().unwrap();
        let ytdlp_bin = fake_ytdlp(
            bin_dir.path(),
            r"printf '[download] Destination: Caf\351 del Mar.webm\n'
printf 'ytmp3:1024|1024|NA|NA|NA|finished\n'
exit 0",
        );
        let downloader = Downloader::new(DownloadConfig {
            ytdlp_bin,
            ..DownloadConfig::default()
        });
        let recorder = Recorder::default();

        let result = downloader
            .download("https://youtu.be/jJTfV3hON8M", bin_dir.path(), &recorder)
            .await;

        assert!(result.is_ok(), "{:?}", result);
        let updates = recorder.updates.borrow();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].status, ProgressStatus::Finished);
        assert_eq!(*recorder.exits.borrow(), vec![true]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_exit_reports_stderr() {
        let bin_dir = tempfile::tempdir().unwrap();
        let ytdlp_bin = fake_ytdlp(
            bin_dir.path(),
            r"printf 'ytmp3:10|100|NA|NA|NA|downloading\n'
printf 'ERROR: [youtube] jJTfV3hON8M: Video unavailable\n' >&2
exit 1",
        );
        let downloader = Downloader::new(DownloadConfig {
            ytdlp_bin,
            ..DownloadConfig::default()
        });
        let recorder = Recorder::default();

        let result = downloader
            .download("https://youtu.be/jJTfV3hON8M", bin_dir.path(), &recorder)
            .await;

        match result {
            Err(Error::Download(message)) => assert!(message.contains("Video unavailable")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(*recorder.exits.borrow(), vec![false]);
    }

    #[test]
    fn console_closes_interrupted_line() {
        let console = ConsoleProgress::new(Vec::new());

        console.on_progress(&progress(ProgressStatus::Downloading));
        console.on_exit(false);

        let out = String::from_utf8(console.out.into_inner()).unwrap();
        assert!(out.starts_with('\r'));
        assert!(out.contains("50.0%"));
        assert!(out.ends_with('\n'));
        assert_eq!(out.matches('\n').count(), 1);
    }

    #[test]
    fn console_finished_line_is_not_closed_twice() {
        let console = ConsoleProgress::new(Vec::new());

        console.on_progress(&progress(ProgressStatus::Finished));
        console.on_exit(true);

        let out = String::from_utf8(console.out.into_inner()).unwrap();
        assert!(out.contains("done"));
        assert_eq!(out.matches('\n').count(), 1);
    }

    #[test]
    fn console_without_updates_prints_nothing() {
        let console = ConsoleProgress::new(Vec::new());

        console.on_exit(false);

        assert!(console.out.into_inner().is_empty());
    }
}
