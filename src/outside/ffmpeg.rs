use std::{ffi::OsString, fmt::Debug, path::Path};

use super::command::{assert_success_command, program_runs, FFMPEG, FFXXX_DEFAULT_ARGS};
use crate::result::{Error, Result};

/// Where an encoder invocation writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink<'a> {
    File(&'a Path),
    /// Analysis pass: output is thrown away
    Discard,
}

/// One run of the encoder: `<input_args> -i <input> <output_args> <sink>`
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation<'a> {
    pub input: &'a Path,
    pub input_args: Vec<String>,
    pub output_args: Vec<String>,
    pub sink: Sink<'a>,
}

impl Invocation<'_> {
    /// Full argument list, as given to the encoder
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = FFXXX_DEFAULT_ARGS.iter().map(OsString::from).collect();
        args.push("-y".into());
        args.extend(self.input_args.iter().map(OsString::from));
        args.push("-i".into());
        args.push(self.input.as_os_str().to_owned());
        args.extend(self.output_args.iter().map(OsString::from));
        match self.sink {
            Sink::File(path) => args.push(path.as_os_str().to_owned()),
            Sink::Discard => args.extend(["-f", "null", "-"].map(OsString::from)),
        }
        args
    }

    /// Shell-like rendering, for logs and dry runs
    pub fn display(&self, program: &str) -> String {
        let args: Vec<String> = self
            .to_args()
            .iter()
            .map(|a| {
                let a = a.to_string_lossy();
                if a.contains([' ', '\'', '"', '(', ')', ';']) {
                    format!("'{}'", a.replace('\'', r"'\''"))
                } else {
                    a.into_owned()
                }
            })
            .collect();
        format!("{program} {}", args.join(" "))
    }
}

pub trait StreamTransformer: Debug {
    fn name(&self) -> &str;

    /// Run one encoder invocation, blocking until it exits.
    fn run(&self, invocation: &Invocation) -> Result<()>;
}

/// Interface for the [ffmpeg](https://ffmpeg.org) program
#[derive(Debug)]
pub struct Ffmpeg {
    program: String,
}

impl Ffmpeg {
    /// Verify that the `ffmpeg` binary is reachable
    pub fn new(program: Option<&str>) -> Result<Self> {
        let program = program.unwrap_or(FFMPEG);
        if program_runs(program, "-version") {
            Ok(Self {
                program: program.to_owned(),
            })
        } else {
            Err(Error::MissingDependency(format!("encoder ({program})")))
        }
    }
}

impl StreamTransformer for Ffmpeg {
    fn name(&self) -> &str {
        &self.program
    }

    fn run(&self, invocation: &Invocation) -> Result<()> {
        assert_success_command(&self.program, |cmd| cmd.args(invocation.to_args()))?;
        Ok(())
    }
}
