use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

use config::{Config, Environment, File, FileFormat};
use miette::{Context, IntoDiagnostic};
use serde::Deserialize;
use tracing::Level;

use crate::{
    cli::Args,
    result::Result,
    types::{Extension, Quality},
};

/// What to do when a required external program is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallPolicy {
    /// Prompt on an interactive terminal, decline otherwise
    Ask,
    Always,
    Never,
}

impl FromStr for InstallPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ask" => Ok(Self::Ask),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            other => Err(format!("unknown install policy '{other}'")),
        }
    }
}

impl Display for InstallPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            InstallPolicy::Ask => "ask",
            InstallPolicy::Always => "always",
            InstallPolicy::Never => "never",
        })
    }
}

/// Immutable settings of a run: defaults, then the config file, then
/// `VGRAB_*` environment variables, then command line flags.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub out: PathBuf,
    pub quality: Option<Quality>,
    pub rename: bool,
    pub fetcher: Option<String>,
    pub encoder: Option<String>,
    pub prober: Option<String>,
    pub socket_timeout: u32,
    pub self_update: bool,
    pub install: InstallPolicy,
    pub source_container: Extension,
    pub log_level: Option<String>,
}

impl Settings {
    pub fn load(args: &Args) -> Result<Self> {
        let (config_path, required) = match &args.config {
            Some(path) => (Some(path.clone()), true),
            None => (default_config_path(), false),
        };

        let mut builder = Config::builder()
            .set_default("out", home_dir().to_string_lossy().into_owned())
            .and_then(|b| b.set_default("rename", false))
            .and_then(|b| b.set_default("socket_timeout", 30))
            .and_then(|b| b.set_default("self_update", true))
            .and_then(|b| b.set_default("install", "ask"))
            .and_then(|b| b.set_default("source_container", "mp4"))
            .into_diagnostic()?;

        if let Some(path) = &config_path {
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml).required(required));
        }

        let settings = builder
            .add_source(Environment::with_prefix("VGRAB").try_parsing(true))
            .set_override_option("out", args.out.as_deref().map(path_value))
            .and_then(|b| b.set_override_option("quality", args.quality.map(|q| q.name())))
            .and_then(|b| b.set_override_option("rename", args.rename.then_some(true)))
            .and_then(|b| b.set_override_option("self_update", args.no_update.then_some(false)))
            .and_then(|b| b.set_override_option("install", args.install.map(|i| i.to_string())))
            .into_diagnostic()?
            .build()
            .into_diagnostic()
            .wrap_err_with(|| match &config_path {
                Some(path) => format!("Could not load the configuration from {}", path.display()),
                None => "Could not load the configuration".to_owned(),
            })?
            .try_deserialize()
            .into_diagnostic()
            .wrap_err("Invalid configuration")?;

        Ok(settings)
    }

    /// Log level from the command line verbosity, else the config, else info
    pub fn log_level(&self, verbosity: i8) -> Level {
        match verbosity {
            i8::MIN..=-1 => Level::WARN,
            1 => Level::DEBUG,
            2.. => Level::TRACE,
            0 => self
                .log_level
                .as_deref()
                .and_then(|l| l.parse().ok())
                .unwrap_or(Level::INFO),
        }
    }
}

fn path_value(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
}

fn default_config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(".config"));
    Some(base.join("vgrab").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["vgrab", "clip.mp4"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn file_values_are_overridden_by_flags() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("vgrab.toml");
        std::fs::write(
            &config,
            "out = \"/srv/videos\"\nquality = \"hd\"\nsocket_timeout = 5\nsource_container = \"mkv\"\nfetcher = \"yt-dlp-nightly\"\n",
        )
        .unwrap();
        let config = config.to_string_lossy().into_owned();

        let settings = Settings::load(&args(&["--config", &config])).unwrap();
        assert_eq!(settings.out, PathBuf::from("/srv/videos"));
        assert_eq!(settings.quality, Some(Quality::Hd));
        assert_eq!(settings.socket_timeout, 5);
        assert_eq!(settings.source_container, Extension::Mkv);
        assert_eq!(settings.fetcher.as_deref(), Some("yt-dlp-nightly"));
        assert!(settings.self_update);
        assert_eq!(settings.install, InstallPolicy::Ask);

        let settings = Settings::load(&args(&[
            "--config", &config, "--out", "/tmp/x", "--quality", "quarter", "--no-update", "--install", "never",
        ]))
        .unwrap();
        assert_eq!(settings.out, PathBuf::from("/tmp/x"));
        assert_eq!(settings.quality, Some(Quality::Quarter));
        assert!(!settings.self_update);
        assert_eq!(settings.install, InstallPolicy::Never);
    }

    #[test]
    fn explicit_config_must_exist() {
        assert!(Settings::load(&args(&["--config", "/no/such/vgrab.toml"])).is_err());
    }

    #[test]
    fn invalid_quality_in_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("vgrab.toml");
        std::fs::write(&config, "quality = \"ultra\"\n").unwrap();
        assert!(Settings::load(&args(&["--config", &config.to_string_lossy()])).is_err());
    }

    #[test]
    fn verbosity_wins_over_config_level() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("vgrab.toml");
        std::fs::write(&config, "log_level = \"debug\"\n").unwrap();
        let settings = Settings::load(&args(&["--config", &config.to_string_lossy()])).unwrap();
        assert_eq!(settings.log_level(0), Level::DEBUG);
        assert_eq!(settings.log_level(-1), Level::WARN);
        assert_eq!(settings.log_level(2), Level::TRACE);
    }
}
