use std::{collections::HashMap, fmt::Debug, path::Path};

use serde::Deserialize;

use super::command::{program_runs, run_capture_stdout, FFPROBE, FFXXX_DEFAULT_ARGS};
use crate::{
    result::{Error, Result},
    types::Artifact,
};

pub trait StreamProber: Debug {
    /// Read the container and first video stream properties of a media file
    fn probe(&self, path: &Path) -> Result<Artifact>;
}

/// Interface for the [ffprobe](https://ffmpeg.org) program
#[derive(Debug)]
pub struct Ffprobe {
    program: String,
}

impl Ffprobe {
    /// Verify that the `ffprobe` binary is reachable
    pub fn new(program: Option<&str>) -> Result<Self> {
        let program = program.unwrap_or(FFPROBE);
        if program_runs(program, "-version") {
            Ok(Self {
                program: program.to_owned(),
            })
        } else {
            Err(Error::MissingDependency(format!("prober ({program})")))
        }
    }
}

impl StreamProber for Ffprobe {
    fn probe(&self, path: &Path) -> Result<Artifact> {
        let output = run_capture_stdout(&self.program, |cmd| {
            cmd.args(FFXXX_DEFAULT_ARGS)
                .args(["-of", "json"])
                .args(["-select_streams", "v:0"])
                .args([
                    "-show_entries",
                    "format=format_name,duration,size,bit_rate:stream=codec_name,width,height,avg_frame_rate,r_frame_rate",
                ])
                .arg(path.as_os_str())
        })
        .map_err(|err| Error::ProbeFailed(format!("{}: {err}", path.display())))?;

        parse_probe_output(path, &output)
    }
}

/// ffprobe prints every number as a string
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: HashMap<String, serde_json::Value>,
    #[serde(default)]
    streams: Vec<HashMap<String, serde_json::Value>>,
}

fn parse_probe_output(path: &Path, output: &str) -> Result<Artifact> {
    let parsed: ProbeOutput = serde_json::from_str(output)
        .map_err(|err| Error::ProbeFailed(format!("{}: invalid JSON output: {err}", path.display())))?;

    let get = |map: &HashMap<String, serde_json::Value>, key: &str| -> Option<String> {
        match map.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };
    let stream = parsed.streams.into_iter().next().unwrap_or_default();
    let format = &parsed.format;

    let size_on_disk = std::fs::metadata(path).map(|m| m.len()).ok();
    let size_bytes = get(format, "size")
        .and_then(|s| s.parse().ok())
        .or(size_on_disk)
        .unwrap_or(0);

    let frame_rate = get(&stream, "avg_frame_rate")
        .and_then(|r| parse_rate(&r))
        .or_else(|| get(&stream, "r_frame_rate").and_then(|r| parse_rate(&r)));

    Ok(Artifact {
        path: path.to_path_buf(),
        container: get(format, "format_name"),
        size_bytes,
        duration_secs: get(format, "duration")
            .and_then(|d| d.parse().ok())
            .filter(|d: &f64| d.is_finite() && *d > 0.0),
        width: get(&stream, "width").and_then(|w| w.parse().ok()),
        height: get(&stream, "height").and_then(|h| h.parse().ok()),
        frame_rate,
        bitrate_kbps: get(format, "bit_rate")
            .and_then(|b| b.parse::<u64>().ok())
            .map(|bps| bps / 1000),
        codec: get(&stream, "codec_name"),
    })
}

/// Parse an `num/den` frame rate. `0/0` means unknown.
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/').unwrap_or((rate, "1"));
    let (num, den): (f64, f64) = (num.parse().ok()?, den.parse().ok()?);
    (den != 0.0 && num > 0.0).then(|| num / den)
}
