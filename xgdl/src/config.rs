use anyhow::Context;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, serde::Deserialize)]
pub struct Config {
    #[serde(rename = "download-directory", default = "default_download_directory")]
    pub download_directory: PathBuf,

    #[serde(default)]
    pub worker: ConfigWorker,

    #[serde(default)]
    pub logging: ConfigLogging,
}

impl Config {
    /// Load a config file.
    pub fn load_path<P>(path: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to load config file at \"{}\"", path.display()))?;
        let config: Self = toml::from_str(&data)
            .with_context(|| format!("failed to parse config file at \"{}\"", path.display()))?;

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_directory: default_download_directory(),
            worker: ConfigWorker::default(),
            logging: ConfigLogging::default(),
        }
    }
}

/// How the external download worker is launched.
#[derive(Debug, serde::Deserialize)]
pub struct ConfigWorker {
    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_script")]
    pub script: PathBuf,
}

impl Default for ConfigWorker {
    fn default() -> Self {
        Self {
            python: default_python(),
            script: default_script(),
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct ConfigLogging {
    #[serde(default)]
    pub directives: Vec<String>,
}

fn default_download_directory() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_script() -> PathBuf {
    PathBuf::from("scripts/download_episodes.py")
}
