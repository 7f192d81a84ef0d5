use std::process::{Command, Output, Stdio};

use bitflags::bitflags;
use tracing::{debug, enabled, trace, Level};

use crate::result::{Error, Result};

pub const YT_DL: &str = "youtube-dl";
pub const YT_DLP: &str = "yt-dlp";
pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";
pub const FFXXX_DEFAULT_ARGS: [&str; 3] = ["-hide_banner", "-loglevel", "error"];

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capture: u8 {
        const STDIN = 0b0000001;
        const STDOUT = 0b0000010;
        const STDERR = 0b0000100;
    }
}

/// Run a command, returning its raw output handle.
///
/// IO handles will be captured only if the caller required it or if the log level is Debug.
/// In that last case, `stdout` and `stderr` will be logged.
///
/// The function returns an error only if the command failed to execute.
/// If the program runs but returns a non-0 status code, it will not trigger an error.
pub fn run_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
    capture: Capture,
) -> Result<Output> {
    let is_debug = enabled!(Level::DEBUG);
    let get_io = |capture| {
        if capture {
            Stdio::piped()
        } else {
            Stdio::null()
        }
    };

    let mut cmd = Command::new(program);
    let cmd = f(&mut cmd)
        .stdin(get_io(capture.contains(Capture::STDIN)))
        .stdout(get_io(is_debug || capture.contains(Capture::STDOUT)))
        .stderr(get_io(is_debug || capture.contains(Capture::STDERR)));

    debug!("Executing command: {cmd:?}");
    let res = cmd.output()?;

    if is_debug {
        debug!("status: {}", res.status);
        debug!("stdout: {} bytes long", res.stdout.len());
        trace!("stdout: {:?}", String::from_utf8_lossy(&res.stdout));
        debug!("stderr: {} bytes long", res.stderr.len());
        trace!("stderr: {:?}", String::from_utf8_lossy(&res.stderr));
    }

    Ok(res)
}

/// Run the command and verify that it has returned a success status code.
///
/// The error carries the exit status and whatever the program wrote on stderr.
pub fn assert_success_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
) -> Result<Output> {
    let res = run_command(program, f, Capture::STDERR)?;
    check_status(program, res)
}

/// Like [`assert_success_command`] but also captures the standard output
pub fn run_capture_stdout<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
) -> Result<String> {
    let res = check_status(program, run_command(program, f, Capture::STDOUT | Capture::STDERR)?)?;
    Ok(String::from_utf8_lossy(&res.stdout).into_owned())
}

/// Run a command attached to the terminal, so that the user sees its progress
/// and can answer its prompts (e.g. `sudo`).
pub fn run_attached<F: FnOnce(&mut Command) -> &mut Command>(program: &str, f: F) -> Result<()> {
    let mut cmd = Command::new(program);
    let cmd = f(&mut cmd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    debug!("Executing attached command: {cmd:?}");
    let status = cmd.status()?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::Command {
            program: program.to_owned(),
            status,
            stderr: String::new(),
        })
    }
}

/// Whether the program can be executed at all
pub fn program_runs(program: &str, version_arg: &str) -> bool {
    run_command(program, |cmd| cmd.arg(version_arg), Capture::empty())
        .map(|res| res.status.success())
        .unwrap_or(false)
}

fn check_status(program: &str, res: Output) -> Result<Output> {
    if res.status.success() {
        Ok(res)
    } else {
        Err(Error::Command {
            program: program.to_owned(),
            status: res.status,
            stderr: String::from_utf8_lossy(&res.stderr).into_owned(),
        })
    }
}
