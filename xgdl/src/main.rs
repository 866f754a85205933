mod commands;
mod config;
mod downloads;
mod logger;

pub use self::config::Config;
use anyhow::Context;
use std::path::PathBuf;

#[derive(Debug, argh::FromArgs)]
#[argh(description = "search and download episodes from xgcartoon")]
struct Options {
    #[argh(option, description = "path to a toml config file")]
    config: Option<PathBuf>,

    #[argh(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, argh::FromArgs)]
#[argh(subcommand)]
enum Subcommand {
    Search(self::commands::search::Options),
    Info(self::commands::info::Options),
    Download(self::commands::download::Options),
    Check(self::commands::check::Options),
}

fn main() -> anyhow::Result<()> {
    let options: Options = argh::from_env();
    let config = match options.config.as_deref() {
        Some(path) => Config::load_path(path).context("failed to load config")?,
        None => Config::default(),
    };
    crate::logger::init(&config.logging.directives).context("failed to init logger")?;

    let tokio_rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    tokio_rt.block_on(async_main(config, options.subcommand))
}

async fn async_main(config: Config, subcommand: Subcommand) -> anyhow::Result<()> {
    let client = xgcartoon::Client::new();
    match subcommand {
        Subcommand::Search(options) => self::commands::search::exec(client, options).await,
        Subcommand::Info(options) => self::commands::info::exec(client, options).await,
        Subcommand::Download(options) => {
            self::commands::download::exec(config, client, options).await
        }
        Subcommand::Check(options) => self::commands::check::exec(config, options).await,
    }
}
