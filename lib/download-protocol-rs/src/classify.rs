use once_cell::sync::Lazy;
use regex::Regex;

// Ep.005 [████░░] 42.5% | 50MB/120MB | 3.1MB/s | 00:10 | ETA: 00:14
static PROGRESS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Ep\.(\d+).*?(\d+(?:\.\d+)?)%\s*\|\s*(\S+)/(\S+)\s*\|\s*(\S+/s)\s*\|.*?ETA:\s*(\S+)")
        .unwrap()
});
static EPISODE_TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"Ep\.(\d+)").unwrap());
static SKIP_FILE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"SKIP\s+(\S+\.\S+)").unwrap());
static SKIP_NUMBER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"SKIP\s+(\d+)_").unwrap());
static QUEUE_INDEX_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)/\d+\]").unwrap());

const LOG_MARKERS: &[&str] = &["[INFO]", "[COMPLETE]", "[DOWNLOADING]", "[ERROR]", "[WARNING]"];
const FAILURE_RUN: &str = "XXXXXXXXXX";

/// Per-episode terminal status carried by some progress records
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeStatus {
    Done,
    Failed,
    Skipped,
}

/// One parsed worker-output progress record
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct ProgressEvent {
    /// Episode number the record refers to
    pub episode: u32,

    /// Percent complete, 0..=100. Authoritative even when a status is set.
    pub percent: f32,

    /// Downloaded size display string
    pub downloaded: Option<String>,

    /// Total size display string
    pub total: Option<String>,

    /// Speed display string
    pub speed: Option<String>,

    /// ETA display string
    pub eta: Option<String>,

    /// Terminal status, absent while the episode is still downloading
    pub status: Option<EpisodeStatus>,

    /// Output file name, known for skip records
    pub filename: Option<String>,
}

/// A classified worker line
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerLine {
    Progress(ProgressEvent),
    Log(String),
}

/// Classify one complete worker line.
///
/// Rules are tried in priority order: progress, done, skip, failure,
/// log marker. Anything else is chatter and returns `None`.
pub fn classify_line(line: &str) -> Option<WorkerLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(captures) = PROGRESS_REGEX.captures(line) {
        return Some(WorkerLine::Progress(ProgressEvent {
            episode: captures.get(1)?.as_str().parse().ok()?,
            percent: captures.get(2)?.as_str().parse().ok()?,
            downloaded: Some(captures.get(3)?.as_str().to_string()),
            total: Some(captures.get(4)?.as_str().to_string()),
            speed: Some(captures.get(5)?.as_str().to_string()),
            eta: Some(captures.get(6)?.as_str().to_string()),
            ..Default::default()
        }));
    }

    if line.contains("Done in") {
        if let Some(episode) = episode_tag(line) {
            return Some(WorkerLine::Progress(ProgressEvent {
                episode,
                percent: 100.0,
                status: Some(EpisodeStatus::Done),
                ..Default::default()
            }));
        }
    }

    if line.contains("SKIP") {
        // Falls back to the queue index, which matches the episode
        // number only while the worker processes episodes in order.
        let episode = SKIP_NUMBER_REGEX
            .captures(line)
            .or_else(|| QUEUE_INDEX_REGEX.captures(line))
            .and_then(|captures| captures.get(1)?.as_str().parse().ok());
        let filename = SKIP_FILE_REGEX
            .captures(line)
            .map(|captures| captures[1].to_string());
        return episode.map(|episode| {
            WorkerLine::Progress(ProgressEvent {
                episode,
                percent: 100.0,
                status: Some(EpisodeStatus::Skipped),
                filename,
                ..Default::default()
            })
        });
    }

    if line.contains("FAILED") || line.contains(FAILURE_RUN) {
        if let Some(episode) = episode_tag(line) {
            return Some(WorkerLine::Progress(ProgressEvent {
                episode,
                percent: 0.0,
                status: Some(EpisodeStatus::Failed),
                ..Default::default()
            }));
        }
    }

    if LOG_MARKERS.iter().any(|marker| line.contains(marker)) {
        return Some(WorkerLine::Log(line.to_string()));
    }

    None
}

fn episode_tag(line: &str) -> Option<u32> {
    EPISODE_TAG_REGEX
        .captures(line)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn progress_line() {
        let line = "Ep.005 [████░░] 42.5% | 50MB/120MB | 3.1MB/s | 00:10 | ETA: 00:14";
        let parsed = classify_line(line).expect("progress line not classified");
        assert_eq!(
            parsed,
            WorkerLine::Progress(ProgressEvent {
                episode: 5,
                percent: 42.5,
                downloaded: Some("50MB".to_string()),
                total: Some("120MB".to_string()),
                speed: Some("3.1MB/s".to_string()),
                eta: Some("00:14".to_string()),
                status: None,
                filename: None,
            })
        );
    }

    #[test]
    fn done_line() {
        let line = "Ep.003 [█████████████████████████] 100.0% | 1.2GB | Done in 10:23";
        let parsed = classify_line(line).expect("done line not classified");
        let WorkerLine::Progress(event) = parsed else {
            panic!("expected progress");
        };
        assert_eq!(event.episode, 3);
        assert_eq!(event.percent, 100.0);
        assert_eq!(event.status, Some(EpisodeStatus::Done));
    }

    #[test]
    fn skip_line_with_file_prefix() {
        let line = "[2/12] SKIP 007_第7集.mp4 (1.2GB)";
        let parsed = classify_line(line).expect("skip line not classified");
        let WorkerLine::Progress(event) = parsed else {
            panic!("expected progress");
        };
        assert_eq!(event.episode, 7);
        assert_eq!(event.percent, 100.0);
        assert_eq!(event.status, Some(EpisodeStatus::Skipped));
        assert_eq!(event.filename.as_deref(), Some("007_第7集.mp4"));
    }

    #[test]
    fn skip_line_queue_index_fallback() {
        let line = "[4/12] SKIP existing file";
        let parsed = classify_line(line).expect("skip line not classified");
        let WorkerLine::Progress(event) = parsed else {
            panic!("expected progress");
        };
        assert_eq!(event.episode, 4);
        assert_eq!(event.status, Some(EpisodeStatus::Skipped));
    }

    #[test]
    fn skip_line_without_episode_is_dropped() {
        assert_eq!(classify_line("SKIP"), None);
    }

    #[test]
    fn failed_lines() {
        let line = "Ep.009 [XXXXXXXXXXXXXXXXXXXXXXXXX] FAILED";
        let parsed = classify_line(line).expect("failed line not classified");
        let WorkerLine::Progress(event) = parsed else {
            panic!("expected progress");
        };
        assert_eq!(event.episode, 9);
        assert_eq!(event.percent, 0.0);
        assert_eq!(event.status, Some(EpisodeStatus::Failed));
    }

    #[test]
    fn log_lines() {
        for line in [
            "[INFO] Fetching episode list from: https://example.com",
            "[COMPLETE] Downloaded: 10, Skipped: 2, Failed: 0",
            "[DOWNLOADING]",
            "  [ERROR] Download failed",
            "[WARNING] Could not find vid for episode 3",
        ] {
            match classify_line(line) {
                Some(WorkerLine::Log(text)) => assert_eq!(text, line.trim()),
                other => panic!("expected log for {line:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn chatter_is_discarded() {
        assert_eq!(classify_line(""), None);
        assert_eq!(classify_line("   "), None);
        assert_eq!(classify_line("Will download 12 episodes"), None);
        // Sub-1% progress lines carry no size pair and are not progress.
        assert_eq!(
            classify_line("Ep.001 [░░░░] 0.5% | 2.1MB | 1.1MB/s | 00:02 | ETA: --:--"),
            None
        );
    }

    #[test]
    fn chunked_stream_end_to_end() {
        let mut buffer = crate::LineBuffer::new();
        let mut events = Vec::new();
        for chunk in [
            "Ep.001 [█░] 10.0% | 10MB/100MB | 2.0MB",
            "/s | 00:05 | ETA: 00:45\rEp.001 [██",
            "░] 20.0% | 20MB/100MB | 2.0MB/s | 00:10 | ETA: 00:40\r",
            "\n[COMPLETE] Downloaded: 1, Skipped: 0, Failed: 0\n",
        ] {
            for line in buffer.push(chunk) {
                if let Some(parsed) = classify_line(&line) {
                    events.push(parsed);
                }
            }
        }

        assert_eq!(events.len(), 3);
        let WorkerLine::Progress(first) = &events[0] else {
            panic!("expected progress");
        };
        assert_eq!(first.percent, 10.0);
        let WorkerLine::Progress(second) = &events[1] else {
            panic!("expected progress");
        };
        assert_eq!(second.percent, 20.0);
        assert!(matches!(&events[2], WorkerLine::Log(_)));
    }
}
