use std::{fmt::Display, process::ExitStatus};

use miette::Diagnostic;

/// Every way a run can fail.
///
/// All variants are fatal except [`Error::RenameFailed`], which the pipeline
/// logs and swallows.
#[derive(Debug)]
pub enum Error {
    InvalidTimeFormat(String),
    InvalidTimeRange { start: String, end: String },
    UnrecognizedSource(String),
    MissingDependency(String),
    FetchFailed(String),
    ProbeFailed(String),
    TranscodeFailed(String),
    RenameFailed(String),

    /// An external program did run but exited unsuccessfully
    Command {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    Io(std::io::Error),
    Miette(miette::Report),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidTimeFormat(input) => write!(f, "Invalid time format: '{input}'"),
            Error::InvalidTimeRange { start, end } => {
                write!(f, "Invalid time range: end ({end}) is not after start ({start})")
            }
            Error::UnrecognizedSource(input) => write!(
                f,
                "Unrecognized source: '{input}' is neither an existing file nor a supported URL"
            ),
            Error::MissingDependency(what) => write!(f, "Missing dependency: {what}"),
            Error::FetchFailed(why) => write!(f, "Fetch failed: {why}"),
            Error::ProbeFailed(why) => write!(f, "Probe failed: {why}"),
            Error::TranscodeFailed(why) => write!(f, "Transcode failed: {why}"),
            Error::RenameFailed(why) => write!(f, "Rename failed: {why}"),
            Error::Command {
                program,
                status,
                stderr,
            } => {
                write!(f, "{program} did run but was not successful ({status})")?;
                let tail = stderr_tail(stderr);
                if !tail.is_empty() {
                    write!(f, ". Here is the end of its stderr: {tail}")?;
                }
                Ok(())
            }
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Miette(report) => write!(f, "{report}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        let code = match self {
            Error::InvalidTimeFormat(_) => "vgrab::invalid_time_format",
            Error::InvalidTimeRange { .. } => "vgrab::invalid_time_range",
            Error::UnrecognizedSource(_) => "vgrab::unrecognized_source",
            Error::MissingDependency(_) => "vgrab::missing_dependency",
            Error::FetchFailed(_) => "vgrab::fetch_failed",
            Error::ProbeFailed(_) => "vgrab::probe_failed",
            Error::TranscodeFailed(_) => "vgrab::transcode_failed",
            Error::RenameFailed(_) => "vgrab::rename_failed",
            Error::Command { .. } => "vgrab::command",
            Error::Io(_) => "vgrab::io",
            Error::Miette(_) => return None,
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        let help = match self {
            Error::InvalidTimeFormat(_) => "Use SS, MM:SS or HH:MM:SS, optionally with a fractional part (e.g. 1:09.5)",
            Error::UnrecognizedSource(_) => {
                "Supported: local files, YouTube (URL or 11-char id), X/Twitter, TikTok, Instagram, Facebook, NPO"
            }
            Error::MissingDependency(_) => "Install the missing program or set `install = \"always\"` in the config",
            Error::TranscodeFailed(_) => "Partial output files are left in place for inspection",
            _ => return None,
        };
        Some(Box::new(help))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<miette::Report> for Error {
    fn from(err: miette::Report) -> Self {
        Error::Miette(err)
    }
}

impl Error {
    /// Top-level report: a wrapped report is returned as is, anything else
    /// becomes a diagnostic.
    pub fn into_report(self) -> miette::Report {
        match self {
            Error::Miette(report) => report,
            err => miette::Report::new(err),
        }
    }

    pub fn wrap_err_with<D, F>(self, f: F) -> Error
    where
        D: Display + Send + Sync + 'static,
        F: FnOnce() -> D,
    {
        match self {
            Error::Miette(report) => Error::Miette(report.wrap_err(f())),
            err => err,
        }
    }

    /// Whether the run can keep going after this error
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::RenameFailed(_))
    }
}

/// Keep only the last few lines of a captured stderr.
fn stderr_tail(stderr: &str) -> String {
    const MAX_LINES: usize = 5;

    let lines: Vec<&str> = stderr.trim().lines().collect();
    let start = lines.len().saturating_sub(MAX_LINES);
    lines[start..].join(" | ")
}

pub type Result<T> = std::result::Result<T, Error>;
