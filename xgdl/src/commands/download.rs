use crate::downloads::DownloadEvent;
use crate::downloads::DownloadJob;
use crate::downloads::DownloadTask;
use crate::downloads::WorkerCommand;
use crate::Config;
use anyhow::bail;
use anyhow::ensure;
use anyhow::Context;
use download_protocol::EpisodeStatus;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, argh::FromArgs)]
#[argh(
    subcommand,
    name = "download",
    description = "download episodes of a title"
)]
pub struct Options {
    #[argh(positional, description = "the detail page url")]
    pub url: String,

    #[argh(
        option,
        description = "episodes to download, as \"N\" or \"N-M\" (default: all)"
    )]
    pub episodes: Option<EpisodeRange>,

    #[argh(option, description = "season number, 1-based (default: first)")]
    pub season: Option<usize>,
}

/// An inclusive episode number range.
#[derive(Debug, Clone, Copy)]
pub struct EpisodeRange {
    pub start: u32,
    pub end: u32,
}

impl EpisodeRange {
    pub fn contains(self, number: u32) -> bool {
        (self.start..=self.end).contains(&number)
    }
}

impl FromStr for EpisodeRange {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (start, end) = match input.split_once('-') {
            Some((start, end)) => (start, end),
            None => (input, input),
        };
        let start: u32 = start
            .trim()
            .parse()
            .with_context(|| format!("invalid episode number \"{start}\""))?;
        let end: u32 = end
            .trim()
            .parse()
            .with_context(|| format!("invalid episode number \"{end}\""))?;
        ensure!(start <= end, "episode range \"{input}\" is backwards");
        ensure!(start > 0, "episode numbers start at 1");

        Ok(Self { start, end })
    }
}

pub async fn exec(config: Config, client: xgcartoon::Client, options: Options) -> anyhow::Result<()> {
    let detail = client
        .get_detail(&options.url)
        .await
        .context("failed to get detail page")?;
    ensure!(!detail.seasons.is_empty(), "\"{}\" has no episodes", detail.title);

    let season_index = options.season.unwrap_or(1);
    let season = detail
        .seasons
        .get(season_index.saturating_sub(1))
        .with_context(|| {
            format!(
                "no season {season_index}, \"{}\" has {}",
                detail.title,
                detail.seasons.len()
            )
        })?;

    let episodes: Vec<_> = match options.episodes {
        Some(range) => season
            .episodes
            .iter()
            .filter(|episode| range.contains(episode.number))
            .cloned()
            .collect(),
        None => season.episodes.clone(),
    };
    ensure!(
        !episodes.is_empty(),
        "no matching episodes in \"{}\"",
        season.name
    );

    println!(
        "downloading {} episode(s) of \"{}\" to \"{}\"",
        episodes.len(),
        detail.title,
        config.download_directory.display()
    );

    let task = DownloadTask::new(WorkerCommand {
        program: config.worker.python.clone(),
        script: config.worker.script.clone(),
    });
    let mut events = task.subscribe();

    task.submit(DownloadJob {
        cartoon_id: detail.cartoon_id.clone(),
        episodes,
        output_directory: config.download_directory.clone(),
        detail_url: detail.detail_url.clone(),
    })
    .await
    .context("failed to submit download")?;

    let snapshot = task.queue().await.context("failed to get queue state")?;
    debug!(
        "queue state: active={}, queued={}",
        snapshot.active.is_some(),
        snapshot.queued.len()
    );

    let exit_code = loop {
        let event = tokio::select! {
            event = events.recv() => event.context("event stream closed")?,
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for ctrl+c")?;
                if task.cancel().await.context("failed to cancel")? {
                    println!("cancelling...");
                }
                continue;
            }
        };
        match event {
            DownloadEvent::Progress(event) => match event.status {
                Some(EpisodeStatus::Done) => println!("episode {} done", event.episode),
                Some(EpisodeStatus::Skipped) => {
                    match event.filename.as_ref() {
                        Some(filename) => {
                            println!("episode {} skipped ({filename})", event.episode)
                        }
                        None => println!("episode {} skipped", event.episode),
                    };
                }
                Some(EpisodeStatus::Failed) => println!("episode {} FAILED", event.episode),
                None => {
                    println!(
                        "episode {}: {:.1}% {} {}",
                        event.episode,
                        event.percent,
                        event
                            .speed
                            .as_deref()
                            .map(|speed| format!("at {speed}"))
                            .unwrap_or_default(),
                        event
                            .eta
                            .as_deref()
                            .map(|eta| format!("(eta {eta})"))
                            .unwrap_or_default(),
                    );
                }
            },
            DownloadEvent::Log(text) => println!("{text}"),
            DownloadEvent::Error { message } => bail!("failed to start worker: {message}"),
            DownloadEvent::Completed { code } => break code,
        }
    };

    task.shutdown().await.context("failed to shutdown")?;

    if exit_code != 0 {
        bail!("worker exited with code {exit_code}");
    }
    Ok(())
}
