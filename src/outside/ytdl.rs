use std::{
    ffi::OsStr,
    path::Path,
    process::{Command, Output},
};

use tracing::debug;

use super::command::{program_runs, run_command, Capture, YT_DL, YT_DLP};
use crate::{
    result::{Error, Result},
    types::{Extension, Metadata},
};

/// Interface for downloading streams and their metadata
pub trait StreamDownloader {
    /// Name of the program doing the work, for messages
    fn name(&self) -> &str;

    /// Get the media title and duration
    fn get_metadata(&self, url: &str) -> Result<Metadata>;

    /// Download the best video and audio streams of the media, muxed into
    /// a single file of the given container at `path`.
    fn download(&self, url: &str, path: &Path, container: Extension) -> Result<()>;

    /// Installed version, as printed by the program
    fn version(&self) -> Result<String>;

    /// Ask the program to update itself
    fn self_update(&self) -> Result<()>;
}

/// Interface for the [yt-dlp](https://github.com/yt-dlp/yt-dlp) program,
/// or its ancestor [youtube-dl](https://github.com/ytdl-org/youtube-dl)
#[derive(Debug)]
pub struct Ytdl {
    program: String,
    socket_timeout: u32,
}

impl Ytdl {
    /// Verify that the configured program, or else `yt-dlp` or `youtube-dl`, is reachable
    pub fn new(program: Option<&str>, socket_timeout: u32) -> Result<Self> {
        let candidates: Vec<&str> = match program {
            Some(program) => vec![program],
            None => vec![YT_DLP, YT_DL],
        };

        candidates
            .into_iter()
            .find(|program| program_runs(program, "--version"))
            .map(|program| Self {
                program: program.to_owned(),
                socket_timeout,
            })
            .ok_or_else(|| Error::MissingDependency(format!("fetcher ({})", Self::wanted(program))))
    }

    /// Human description of the program(s) looked for
    pub fn wanted(program: Option<&str>) -> String {
        program.map_or_else(|| format!("{YT_DLP} or {YT_DL}"), str::to_owned)
    }

    fn is_yt_dlp(&self) -> bool {
        self.program != YT_DL
    }

    /// Run the command and check if it failed with saying the stream is unavailable.
    /// In that case, return a [`Error::FetchFailed`] saying so.
    ///
    /// In other cases, return the output handle.
    pub fn run_check_availability<F>(&self, f: F, capture: Capture) -> Result<Output>
    where
        F: FnOnce(&mut Command) -> &mut Command,
    {
        let res = run_command(&self.program, f, capture | Capture::STDERR)?;

        let stderr = String::from_utf8_lossy(&res.stderr);
        let is_unavailable = stderr
            .lines()
            .any(|line| line.starts_with("ERROR:") && line.to_lowercase().contains("unavailable"));
        if is_unavailable {
            Err(Error::FetchFailed("the media is unavailable".to_owned()))
        } else if res.status.success() {
            Ok(res)
        } else {
            Err(Error::Command {
                program: self.program.clone(),
                status: res.status,
                stderr: stderr.into_owned(),
            })
        }
    }

    /// Format selector preferring separate best streams that fit the container
    fn format_selector(container: Extension) -> &'static str {
        match container {
            Extension::Mp4 => "bv*[ext=mp4]+ba[ext=m4a]/b[ext=mp4]/bv*+ba/b",
            Extension::Mkv => "bv*+ba/b",
        }
    }
}

impl StreamDownloader for Ytdl {
    fn name(&self) -> &str {
        &self.program
    }

    fn get_metadata(&self, url: &str) -> Result<Metadata> {
        let timeout = self.socket_timeout.to_string();
        let res = self.run_check_availability(
            |cmd| {
                let cmd = cmd
                    .arg("-q")
                    .arg("--no-warnings")
                    .arg("--skip-download")
                    .args(["--socket-timeout", &timeout]);

                // youtube-dl has no --print
                let cmd = if self.is_yt_dlp() {
                    cmd.args(["--print", "%(title)s", "--print", "%(duration)s"])
                } else {
                    cmd.args(["--get-title", "--get-duration"])
                };
                cmd.arg("--").arg(url)
            },
            Capture::STDOUT,
        )?;

        let output = String::from_utf8_lossy(&res.stdout);
        Ok(Metadata::from_lines(&output))
    }

    fn download(&self, url: &str, path: &Path, container: Extension) -> Result<()> {
        let timeout = self.socket_timeout.to_string();
        self.run_check_availability(
            |cmd| {
                cmd.arg("-q")
                    .arg("--no-warnings")
                    .args([OsStr::new("-o"), path.as_os_str()])
                    .arg("--no-continue") // Or else fails when file already exists, even an empty one
                    .arg("--no-playlist")
                    .args(["--socket-timeout", &timeout])
                    .args(["-f", Self::format_selector(container)])
                    .args(["--merge-output-format", container.with_no_dot()])
                    .arg("--")
                    .arg(url)
            },
            Capture::empty(),
        )?;
        Ok(())
    }

    fn version(&self) -> Result<String> {
        let res = self.run_check_availability(|cmd| cmd.arg("--version"), Capture::STDOUT)?;
        Ok(String::from_utf8_lossy(&res.stdout).trim().to_owned())
    }

    fn self_update(&self) -> Result<()> {
        debug!("Running {} self-update", self.program);
        self.run_check_availability(|cmd| cmd.arg("-U"), Capture::STDOUT)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fetcher_is_a_missing_dependency() {
        let err = Ytdl::new(Some("vgrab-no-such-fetcher"), 30).unwrap_err();
        assert!(matches!(err, Error::MissingDependency(ref what) if what.contains("vgrab-no-such-fetcher")));
    }

    #[test]
    fn mp4_selector_prefers_mp4_streams() {
        assert!(Ytdl::format_selector(Extension::Mp4).starts_with("bv*[ext=mp4]"));
        assert!(Ytdl::format_selector(Extension::Mkv).ends_with("/b"));
    }
}
