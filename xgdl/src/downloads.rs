use anyhow::ensure;
use anyhow::Context;
use download_protocol::classify_line;
use download_protocol::LineBuffer;
use download_protocol::ProgressEvent;
use download_protocol::WorkerLine;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio::process::ChildStderr;
use tokio::process::ChildStdout;
use tokio::process::Command;
use tracing::info;
use tracing::trace;
use url::Url;

const VIDEO_URL_BASE: &str = "https://tw.xgcartoon.com/video";

/// Exit code reported when the worker dies without one, killed by a signal.
const KILLED_EXIT_CODE: i32 = -1;

/// How the external download worker is launched.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    /// The interpreter binary
    pub program: String,

    /// The worker script path
    pub script: PathBuf,
}

/// One caller-submitted request to download episodes for one title.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    /// The title's id on the site
    pub cartoon_id: String,

    /// The requested episodes, in the order the caller picked them
    pub episodes: Vec<xgcartoon::Episode>,

    /// Where the worker writes its files
    pub output_directory: PathBuf,

    /// The detail page the episodes came from
    pub detail_url: Url,
}

/// The entire output surface of the download subsystem.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// A structured worker progress record
    Progress(ProgressEvent),

    /// A worker log line
    Log(String),

    /// The active worker exited
    Completed { code: i32 },

    /// A job could not be started
    Error { message: String },
}

/// A point-in-time view of the queue.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub active: Option<JobSummary>,
    pub queued: Vec<JobSummary>,
}

#[derive(Debug, Clone)]
pub struct JobSummary {
    pub cartoon_id: String,
    pub episodes: usize,
}

#[derive(Debug)]
enum DownloadTaskMessage {
    Close {
        tx: tokio::sync::oneshot::Sender<()>,
    },
    Submit {
        job: DownloadJob,
        tx: tokio::sync::oneshot::Sender<()>,
    },
    Cancel {
        tx: tokio::sync::oneshot::Sender<bool>,
    },
    Queue {
        tx: tokio::sync::oneshot::Sender<QueueSnapshot>,
    },
    WorkerExited {
        /// Which spawned worker exited, so a notification from an
        /// already-cancelled worker cannot reap its successor.
        id: u64,
    },
}

/// The download queue orchestrator.
///
/// Jobs run strictly one at a time, in arrival order. Construct one at
/// startup and hand it to whatever layer issues commands.
#[derive(Debug)]
pub struct DownloadTask {
    tx: tokio::sync::mpsc::Sender<DownloadTaskMessage>,
    events: tokio::sync::broadcast::Sender<DownloadEvent>,
    handle: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl DownloadTask {
    pub fn new(worker: WorkerCommand) -> Self {
        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let (events, _) = tokio::sync::broadcast::channel(256);
        let handle = tokio::spawn(download_task_impl(rx, tx.clone(), worker, events.clone()));

        Self {
            tx,
            events,
            handle: std::sync::Mutex::new(Some(handle)),
        }
    }

    /// Subscribe to the event stream.
    ///
    /// Subscribe before submitting to observe a job from its start.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DownloadEvent> {
        self.events.subscribe()
    }

    /// Append a job to the queue, starting it immediately when idle.
    pub async fn submit(&self, job: DownloadJob) -> anyhow::Result<()> {
        ensure!(!job.episodes.is_empty(), "job has no episodes");

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(DownloadTaskMessage::Submit { job, tx })
            .await?;
        Ok(rx.await?)
    }

    /// Terminate the active worker and clear the queue.
    ///
    /// Returns `false` when there was nothing to cancel.
    pub async fn cancel(&self) -> anyhow::Result<bool> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.tx.send(DownloadTaskMessage::Cancel { tx }).await?;
        Ok(rx.await?)
    }

    /// Get a snapshot of the queue.
    pub async fn queue(&self) -> anyhow::Result<QueueSnapshot> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.tx.send(DownloadTaskMessage::Queue { tx }).await?;
        Ok(rx.await?)
    }

    pub async fn close(&self) -> anyhow::Result<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.tx.send(DownloadTaskMessage::Close { tx }).await?;
        Ok(rx.await?)
    }

    pub async fn join(&self) -> anyhow::Result<()> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .context("missing handle")?;
        Ok(handle.await?)
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let close_result = self.close().await;
        let join_result = self.join().await;
        join_result.or(close_result)
    }
}

struct ActiveJob {
    id: u64,
    job: DownloadJob,
    child: Child,
}

struct DownloadQueue {
    queue: VecDeque<DownloadJob>,
    active: Option<ActiveJob>,
    next_id: u64,
    worker: WorkerCommand,
    events: tokio::sync::broadcast::Sender<DownloadEvent>,
    task_tx: tokio::sync::mpsc::Sender<DownloadTaskMessage>,
}

impl DownloadQueue {
    /// Start queued jobs until one spawns or the queue empties.
    ///
    /// A job whose worker cannot spawn produces an Error event and the
    /// queue keeps advancing.
    fn promote(&mut self) {
        while let Some(job) = self.queue.pop_front() {
            let id = self.next_id;
            self.next_id += 1;
            match self.spawn_worker(&job, id) {
                Ok(child) => {
                    self.active = Some(ActiveJob { id, job, child });
                    return;
                }
                Err(error) => {
                    let _ = self.events.send(DownloadEvent::Error {
                        message: format!("{error:#}"),
                    });
                }
            }
        }
    }

    fn spawn_worker(&self, job: &DownloadJob, id: u64) -> anyhow::Result<Child> {
        let target = worker_target_url(job);
        let (min, max) = episode_range(job);

        info!(
            "starting worker for \"{}\" (episodes {min}-{max}, target \"{target}\")",
            job.cartoon_id
        );

        let mut child = Command::new(&self.worker.program)
            .arg(&self.worker.script)
            .arg(&target)
            .arg(&job.output_directory)
            .arg(min.to_string())
            .arg(max.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn worker \"{}\"", self.worker.program))?;

        let stdout = child.stdout.take().context("missing worker stdout")?;
        let stderr = child.stderr.take().context("missing worker stderr")?;
        tokio::spawn(pump_stdout(
            stdout,
            id,
            self.events.clone(),
            self.task_tx.clone(),
        ));
        tokio::spawn(pump_stderr(stderr, self.events.clone()));

        Ok(child)
    }

    fn cancel(&mut self) -> bool {
        self.queue.clear();
        let Some(mut active) = self.active.take() else {
            return false;
        };

        info!("cancelling download of \"{}\"", active.job.cartoon_id);
        let _ = active.child.start_kill();

        // The exit still surfaces as an ordinary Completed event.
        let events = self.events.clone();
        tokio::spawn(async move {
            let code = exit_code(&mut active.child).await;
            let _ = events.send(DownloadEvent::Completed { code });
        });

        true
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            active: self.active.as_ref().map(|active| summarize(&active.job)),
            queued: self.queue.iter().map(summarize).collect(),
        }
    }
}

async fn download_task_impl(
    mut rx: tokio::sync::mpsc::Receiver<DownloadTaskMessage>,
    task_tx: tokio::sync::mpsc::Sender<DownloadTaskMessage>,
    worker: WorkerCommand,
    events: tokio::sync::broadcast::Sender<DownloadEvent>,
) {
    let mut state = DownloadQueue {
        queue: VecDeque::new(),
        active: None,
        next_id: 0,
        worker,
        events,
        task_tx,
    };

    while let Some(message) = rx.recv().await {
        match message {
            DownloadTaskMessage::Close { tx } => {
                rx.close();
                let _ = tx.send(()).is_ok();
            }
            DownloadTaskMessage::Submit { job, tx } => {
                state.queue.push_back(job);
                if state.active.is_none() {
                    state.promote();
                }
                let _ = tx.send(()).is_ok();
            }
            DownloadTaskMessage::Cancel { tx } => {
                let cancelled = state.cancel();
                let _ = tx.send(cancelled).is_ok();
            }
            DownloadTaskMessage::Queue { tx } => {
                let _ = tx.send(state.snapshot()).is_ok();
            }
            DownloadTaskMessage::WorkerExited { id } => {
                // Stale notifications from a cancelled worker carry the
                // old id and are ignored.
                if let Some(mut active) = state.active.take_if(|active| active.id == id) {
                    let code = exit_code(&mut active.child).await;
                    let _ = state.events.send(DownloadEvent::Completed { code });
                    state.promote();
                }
            }
        }
    }
    // A still-active child is reaped by kill_on_drop.
}

/// Read worker stdout chunks, reassemble lines and emit their events.
///
/// Notifies the queue when the stream closes, which the worker does
/// only by exiting.
async fn pump_stdout(
    mut stdout: ChildStdout,
    id: u64,
    events: tokio::sync::broadcast::Sender<DownloadEvent>,
    task_tx: tokio::sync::mpsc::Sender<DownloadTaskMessage>,
) {
    let mut buffer = LineBuffer::new();
    let mut chunk = [0u8; 4096];
    loop {
        let len = match stdout.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(len) => len,
        };
        for line in buffer.push(&String::from_utf8_lossy(&chunk[..len])) {
            match classify_line(&line) {
                Some(WorkerLine::Progress(event)) => {
                    let _ = events.send(DownloadEvent::Progress(event));
                }
                Some(WorkerLine::Log(text)) => {
                    let _ = events.send(DownloadEvent::Log(text));
                }
                None => trace!("unclassified worker line: {line}"),
            }
        }
    }

    let _ = task_tx.send(DownloadTaskMessage::WorkerExited { id }).await;
}

/// The error stream is not line-split: one log event per chunk.
async fn pump_stderr(
    mut stderr: ChildStderr,
    events: tokio::sync::broadcast::Sender<DownloadEvent>,
) {
    let mut chunk = [0u8; 4096];
    loop {
        let len = match stderr.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(len) => len,
        };
        let text = String::from_utf8_lossy(&chunk[..len]);
        let _ = events.send(DownloadEvent::Log(format!("[stderr] {}", text.trim_end())));
    }
}

async fn exit_code(child: &mut Child) -> i32 {
    child
        .wait()
        .await
        .ok()
        .and_then(|status| status.code())
        .unwrap_or(KILLED_EXIT_CODE)
}

/// Derive the worker's target url from the job's first episode.
fn worker_target_url(job: &DownloadJob) -> String {
    let Some(first) = job.episodes.first() else {
        return job.detail_url.to_string();
    };

    let href = first.href.as_str();
    if href.contains("/video/") {
        return match xgcartoon::absolutize(href) {
            Some(url) => url.into(),
            None => href.to_string(),
        };
    }

    if let Some(chapter) = xgcartoon::chapter_id(href) {
        return format!("{VIDEO_URL_BASE}/{}/{chapter}.html", job.cartoon_id);
    }

    // Last resort: the raw href token as a path segment.
    format!("https://tw.xgcartoon.com/{}", href.trim_start_matches('/'))
}

fn episode_range(job: &DownloadJob) -> (u32, u32) {
    let numbers = job.episodes.iter().map(|episode| episode.number);
    let min = numbers.clone().min().unwrap_or(1);
    let max = numbers.max().unwrap_or(min);
    (min, max)
}

fn summarize(job: &DownloadJob) -> JobSummary {
    JobSummary {
        cartoon_id: job.cartoon_id.clone(),
        episodes: job.episodes.len(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use download_protocol::EpisodeStatus;
    use std::time::Duration;

    fn write_script(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, contents).expect("failed to write script");
        path
    }

    fn make_job(cartoon_id: &str) -> DownloadJob {
        DownloadJob {
            cartoon_id: cartoon_id.to_string(),
            episodes: vec![xgcartoon::Episode {
                number: 1,
                title: "第1集".to_string(),
                href: format!("/user/page_direct?cartoon_id={cartoon_id}&chapter_id=ch{cartoon_id}"),
            }],
            output_directory: std::env::temp_dir(),
            detail_url: Url::parse(&format!("https://tw.xgcartoon.com/detail/{cartoon_id}"))
                .expect("invalid detail url"),
        }
    }

    async fn next_event(
        events: &mut tokio::sync::broadcast::Receiver<DownloadEvent>,
    ) -> DownloadEvent {
        tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    #[test]
    fn target_url_derivation() {
        let mut job = make_job("frieren");
        assert_eq!(
            worker_target_url(&job),
            "https://tw.xgcartoon.com/video/frieren/chfrieren.html"
        );

        job.episodes[0].href = "/video/frieren/abc.html".to_string();
        assert_eq!(
            worker_target_url(&job),
            "https://tw.xgcartoon.com/video/frieren/abc.html"
        );

        job.episodes[0].href = "mystery-token".to_string();
        assert_eq!(worker_target_url(&job), "https://tw.xgcartoon.com/mystery-token");
    }

    #[tokio::test]
    async fn worker_progress_and_completion() {
        let script = write_script(
            "xgdl-test-progress.sh",
            "printf 'Ep.001 [██░░] 50.0%% | 10MB/20MB | 2.0MB/s | 00:05 | ETA: 00:05\\r'\n\
             printf 'Ep.001 [████] 100.0%% | 20MB | Done in 00:10\\n'\n\
             exit 0\n",
        );
        let task = DownloadTask::new(WorkerCommand {
            program: "sh".to_string(),
            script,
        });
        let mut events = task.subscribe();

        task.submit(make_job("a")).await.expect("failed to submit");

        let mut saw_progress = false;
        let mut saw_done = false;
        loop {
            match next_event(&mut events).await {
                DownloadEvent::Progress(event) if event.status.is_none() => {
                    assert_eq!(event.episode, 1);
                    assert_eq!(event.percent, 50.0);
                    saw_progress = true;
                }
                DownloadEvent::Progress(event) => {
                    assert_eq!(event.status, Some(EpisodeStatus::Done));
                    saw_done = true;
                }
                DownloadEvent::Completed { code } => {
                    assert_eq!(code, 0);
                    break;
                }
                event => panic!("unexpected event {event:?}"),
            }
        }
        assert!(saw_progress);
        assert!(saw_done);

        task.shutdown().await.expect("failed to shutdown");
    }

    #[tokio::test]
    async fn queue_is_fifo_and_auto_advances() {
        let script = write_script(
            "xgdl-test-fifo.sh",
            "echo \"[INFO] target=$1\"\nsleep 0.2\nexit 0\n",
        );
        let task = DownloadTask::new(WorkerCommand {
            program: "sh".to_string(),
            script,
        });
        let mut events = task.subscribe();

        for id in ["a", "b", "c"] {
            task.submit(make_job(id)).await.expect("failed to submit");
        }

        let mut targets = Vec::new();
        let mut completions = 0;
        while completions < 3 {
            match next_event(&mut events).await {
                DownloadEvent::Log(text) => {
                    if let Some((_, target)) = text.split_once("target=") {
                        targets.push(target.to_string());
                    }
                }
                DownloadEvent::Completed { code } => {
                    assert_eq!(code, 0);
                    completions += 1;
                }
                event => panic!("unexpected event {event:?}"),
            }
        }

        assert_eq!(
            targets,
            vec![
                "https://tw.xgcartoon.com/video/a/cha.html".to_string(),
                "https://tw.xgcartoon.com/video/b/chb.html".to_string(),
                "https://tw.xgcartoon.com/video/c/chc.html".to_string(),
            ]
        );

        task.shutdown().await.expect("failed to shutdown");
    }

    #[tokio::test]
    async fn cancel_terminates_active_and_clears_queue() {
        let script = write_script("xgdl-test-cancel.sh", "sleep 30\n");
        let task = DownloadTask::new(WorkerCommand {
            program: "sh".to_string(),
            script,
        });
        let mut events = task.subscribe();

        for id in ["a", "b", "c"] {
            task.submit(make_job(id)).await.expect("failed to submit");
        }

        let snapshot = task.queue().await.expect("failed to get queue");
        assert_eq!(
            snapshot.active.as_ref().map(|job| job.cartoon_id.as_str()),
            Some("a")
        );
        assert_eq!(snapshot.queued.len(), 2);

        assert!(task.cancel().await.expect("failed to cancel"));

        let snapshot = task.queue().await.expect("failed to get queue");
        assert!(snapshot.active.is_none());
        assert!(snapshot.queued.is_empty());

        // The kill surfaces as an ordinary completion.
        loop {
            if let DownloadEvent::Completed { code } = next_event(&mut events).await {
                assert_ne!(code, 0);
                break;
            }
        }

        // Nothing left to cancel.
        assert!(!task.cancel().await.expect("failed to cancel"));

        task.shutdown().await.expect("failed to shutdown");
    }

    #[tokio::test]
    async fn spawn_failure_reports_error_and_advances() {
        let task = DownloadTask::new(WorkerCommand {
            program: "xgdl-test-missing-interpreter".to_string(),
            script: PathBuf::from("nope.py"),
        });
        let mut events = task.subscribe();

        task.submit(make_job("a")).await.expect("failed to submit");
        task.submit(make_job("b")).await.expect("failed to submit");

        for _ in 0..2 {
            match next_event(&mut events).await {
                DownloadEvent::Error { message } => {
                    assert!(message.contains("xgdl-test-missing-interpreter"));
                }
                event => panic!("unexpected event {event:?}"),
            }
        }

        let snapshot = task.queue().await.expect("failed to get queue");
        assert!(snapshot.active.is_none());
        assert!(snapshot.queued.is_empty());

        task.shutdown().await.expect("failed to shutdown");
    }
}
