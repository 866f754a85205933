use crate::Config;
use anyhow::ensure;
use std::process::Stdio;
use tracing::debug;

#[derive(Debug, argh::FromArgs)]
#[argh(
    subcommand,
    name = "check",
    description = "verify the external download dependencies are available"
)]
pub struct Options {}

pub async fn exec(config: Config, _options: Options) -> anyhow::Result<()> {
    let python = probe(&config.worker.python, "--version").await;
    let ffmpeg = probe("ffmpeg", "-version").await;
    let script = tokio::fs::try_exists(&config.worker.script)
        .await
        .unwrap_or(false);

    report(&config.worker.python, python);
    report("ffmpeg", ffmpeg);
    report(&config.worker.script.display().to_string(), script);

    ensure!(python && ffmpeg && script, "missing dependencies");
    Ok(())
}

/// Probe for a binary by running it with a version flag.
async fn probe(program: &str, arg: &str) -> bool {
    let result = tokio::process::Command::new(program)
        .arg(arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match result {
        Ok(status) => status.success(),
        Err(error) => {
            debug!("failed to run \"{program}\": {error}");
            false
        }
    }
}

fn report(name: &str, present: bool) {
    let marker = if present { "ok" } else { "MISSING" };
    println!("{marker:>7}  {name}");
}
