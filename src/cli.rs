use std::path::PathBuf;

use clap::{
    builder::{PossibleValuesParser, TypedValueParser},
    command, value_parser, Arg, ArgAction, ArgMatches, Command,
};
use indoc::indoc;

use crate::{settings::InstallPolicy, types::Quality};

macro_rules! arg_env {
    ($v:literal) => {
        concat!("VGRAB_", $v)
    };
}

/// What the user typed, before merging with the configuration file
#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    pub source: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub out: Option<PathBuf>,
    pub quality: Option<Quality>,
    pub rename: bool,
    pub config: Option<PathBuf>,
    pub dry_run: bool,
    pub no_update: bool,
    pub install: Option<InstallPolicy>,
    /// Number of `-v` minus one if `-q`
    pub verbosity: i8,
}

const AFTER_HELP: &str = indoc! {"
    Examples:
      vgrab clip.mp4 --quality sd
      vgrab dQw4w9WgXcQ 1:09 2:15
      vgrab https://x.com/someone/status/123 --quality 10mb --rename

    Without --quality, a trimmed input is cut without re-encoding (stream_copy)
    and a whole input is encoded with the `sd` profile.
"};

pub fn command() -> Command {
    command!()
        .about("Grab a video from a file or a web platform, trim it, and transcode it to a quality profile or a target size")
        .after_help(AFTER_HELP)
        .arg(
            Arg::new("source")
                .help("Local file path, platform URL, or bare YouTube video ID")
                .required(true),
        )
        .arg(Arg::new("start").help("Start time: SS, MM:SS or HH:MM:SS, with optional .fraction"))
        .arg(Arg::new("end").help("End time, same formats as the start time"))
        .arg(
            Arg::new("out")
                .long("out")
                .value_name("DIR")
                .help("Output directory [default: home directory]")
                .env(arg_env!("OUT"))
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("quality")
                .long("quality")
                .value_name("PROFILE")
                .help("Output profile [default: sd, or stream_copy when trimming]")
                .env(arg_env!("QUALITY"))
                .value_parser(
                    PossibleValuesParser::new(Quality::names().collect::<Vec<_>>())
                        .try_map(|s| s.parse::<Quality>()),
                ),
        )
        .arg(
            Arg::new("rename")
                .long("rename")
                .help("Rename the output after the fetched media title")
                .env(arg_env!("RENAME"))
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file [default: ~/.config/vgrab/config.toml]")
                .env(arg_env!("CONFIG"))
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("dry_run")
                .long("dry-run")
                .help("Resolve, fetch and plan, then print the encoder commands instead of running them")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no_update")
                .long("no-update")
                .help("Do not try to update the fetcher before using it")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("install")
                .long("install")
                .value_name("POLICY")
                .help("What to do when a required program is missing")
                .value_parser(
                    PossibleValuesParser::new(["ask", "always", "never"])
                        .try_map(|s| s.parse::<InstallPolicy>()),
                ),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("More logs, repeat for even more")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only log warnings and errors")
                .conflicts_with("verbose")
                .action(ArgAction::SetTrue),
        )
}

impl Args {
    pub fn try_parse_from<I, T>(iter: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        command().try_get_matches_from(iter).map(|m| Self::from_matches(&m))
    }

    fn from_matches(m: &ArgMatches) -> Self {
        let verbosity = if m.get_flag("quiet") {
            -1
        } else {
            m.get_count("verbose") as i8
        };

        Self {
            source: m.get_one::<String>("source").cloned().unwrap_or_default(),
            start: m.get_one::<String>("start").cloned(),
            end: m.get_one::<String>("end").cloned(),
            out: m.get_one::<PathBuf>("out").cloned(),
            quality: m.get_one::<Quality>("quality").copied(),
            rename: m.get_flag("rename"),
            config: m.get_one::<PathBuf>("config").cloned(),
            dry_run: m.get_flag("dry_run"),
            no_update: m.get_flag("no_update"),
            install: m.get_one::<InstallPolicy>("install").copied(),
            verbosity,
        }
    }
}
