use std::{
    fmt::{self, Display},
    io::IsTerminal,
    time::Duration,
};

use owo_colors::OwoColorize;

use crate::types::{Artifact, MediaSource};

/// Wall-clock time of the stages worth reporting
#[derive(Debug, Clone, Copy, Default)]
pub struct Timings {
    pub fetch: Option<Duration>,
    pub transcode: Option<Duration>,
    pub total: Duration,
}

/// End of run report, printed to stdout.
///
/// Purely informational: missing fields are left out, never an error.
#[derive(Debug)]
pub struct Summary<'a> {
    pub source: &'a MediaSource,
    /// The probed input file (local file or cached download)
    pub input: Option<&'a Artifact>,
    /// Duration announced by the fetcher, for remote sources
    pub remote_duration: Option<f64>,
    pub output: &'a Artifact,
    /// Byte budget of a target-size profile
    pub target_bytes: Option<u64>,
    pub timings: Timings,
    pub color: bool,
}

impl Summary<'_> {
    pub fn print(mut self) {
        self.color = std::io::stdout().is_terminal();
        print!("{self}");
    }

    fn heading(&self, f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
        if self.color {
            write!(f, "{:<10}", text.bold())
        } else {
            write!(f, "{text:<10}")
        }
    }
}

impl Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.heading(f, "Input")?;
        if self.source.is_remote() {
            let duration = self
                .remote_duration
                .or_else(|| self.input.and_then(|a| a.duration_secs))
                .map_or_else(|| "unknown".to_owned(), format_secs);
            writeln!(f, "remote resource, duration {duration}")?;
        } else {
            match self.input {
                Some(input) => writeln!(f, "{}", Properties(input))?,
                None => writeln!(f, "{}", self.source)?,
            }
        }

        self.heading(f, "Output")?;
        writeln!(f, "{}", self.output.path.display())?;
        self.heading(f, "")?;
        writeln!(f, "{}", Properties(self.output))?;

        if let Some(input) = self.input.filter(|i| i.size_bytes > 0) {
            let ratio = 1.0 - self.output.size_bytes as f64 / input.size_bytes as f64;
            self.heading(f, "Size")?;
            let line = format!(
                "{} -> {} ({:+.1}%)",
                format_bytes(input.size_bytes),
                format_bytes(self.output.size_bytes),
                -ratio * 100.0
            );
            if self.color && ratio > 0.0 {
                writeln!(f, "{}", line.green())?;
            } else {
                writeln!(f, "{line}")?;
            }
        }

        if let Some(target) = self.target_bytes {
            let within = self.output.size_bytes <= target;
            self.heading(f, "Target")?;
            let line = format!(
                "{} for a budget of {}{}",
                format_bytes(self.output.size_bytes),
                format_bytes(target),
                if within { "" } else { " (over budget)" }
            );
            if self.color && !within {
                writeln!(f, "{}", line.yellow())?;
            } else {
                writeln!(f, "{line}")?;
            }
        }

        self.heading(f, "Time")?;
        let mut parts = Vec::with_capacity(3);
        if let Some(fetch) = self.timings.fetch {
            parts.push(format!("fetch {}", format_secs(fetch.as_secs_f64())));
        }
        if let Some(transcode) = self.timings.transcode {
            parts.push(format!("transcode {}", format_secs(transcode.as_secs_f64())));
        }
        parts.push(format!("total {}", format_secs(self.timings.total.as_secs_f64())));
        writeln!(f, "{}", parts.join(", "))
    }
}

/// One-line rendering of the known properties of a media file
struct Properties<'a>(&'a Artifact);

impl Display for Properties<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = self.0;
        let mut parts = Vec::new();

        if let Some(container) = &a.container {
            parts.push(container.clone());
        }
        if let Some((w, h)) = a.resolution() {
            parts.push(format!("{w}x{h}"));
        }
        if let Some(fps) = a.frame_rate {
            parts.push(format!("{} fps", trim_decimals(fps, 2)));
        }
        if let Some(secs) = a.duration_secs {
            parts.push(format_secs(secs));
        }
        parts.push(format_bytes(a.size_bytes));
        if let Some(kbps) = a.effective_bitrate_kbps() {
            parts.push(format!("{kbps} kbps"));
        }
        if let Some(codec) = &a.codec {
            parts.push(codec.clone());
        }

        f.write_str(&parts.join(", "))
    }
}

fn trim_decimals(value: f64, decimals: usize) -> String {
    let s = format!("{value:.decimals$}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_owned()
    } else {
        s
    }
}

/// Human readable size in binary units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for u in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = u;
    }
    format!("{value:.1} {unit}")
}

/// `12.3s` under a minute, `M:SS` or `H:MM:SS` above
pub fn format_secs(secs: f64) -> String {
    if secs < 60.0 {
        return format!("{secs:.1}s");
    }
    let whole = secs.round() as u64;
    let (h, m, s) = (whole / 3600, whole / 60 % 60, whole % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn artifact(path: &str, size: u64) -> Artifact {
        Artifact {
            path: PathBuf::from(path),
            container: Some("mov,mp4,m4a,3gp,3g2,mj2".into()),
            size_bytes: size,
            duration_secs: Some(120.0),
            width: Some(1280),
            height: Some(720),
            frame_rate: Some(30000.0 / 1001.0),
            bitrate_kbps: None,
            codec: Some("h264".into()),
        }
    }

    #[test]
    fn bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(10_276_044), "9.8 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[test]
    fn seconds() {
        assert_eq!(format_secs(4.26), "4.3s");
        assert_eq!(format_secs(66.0), "1:06");
        assert_eq!(format_secs(3723.4), "1:02:03");
    }

    #[test]
    fn properties_line() {
        let line = Properties(&artifact("/o/clip_sd.mp4", 5_000_000)).to_string();
        assert_eq!(line, "mov,mp4,m4a,3gp,3g2,mj2, 1280x720, 29.97 fps, 2:00, 4.8 MiB, 333 kbps, h264");
    }

    #[test]
    fn local_summary_reports_reduction() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"v").unwrap();
        let source = MediaSource::resolve(file.to_str().unwrap()).unwrap();
        let input = artifact("clip.mp4", 50 * 1024 * 1024);
        let output = artifact("clip_sd.mp4", 10 * 1024 * 1024);

        let text = Summary {
            source: &source,
            input: Some(&input),
            remote_duration: None,
            output: &output,
            target_bytes: None,
            timings: Timings {
                fetch: None,
                transcode: Some(Duration::from_secs(95)),
                total: Duration::from_secs(96),
            },
            color: false,
        }
        .to_string();

        assert!(text.contains("50.0 MiB -> 10.0 MiB (-80.0%)"), "{text}");
        assert!(text.contains("transcode 1:35, total 1:36"), "{text}");
        assert!(!text.contains("fetch"));
        assert!(!text.contains("remote resource"));
    }

    #[test]
    fn remote_summary_reports_duration_and_target() {
        let source = MediaSource::resolve("dQw4w9WgXcQ").unwrap();
        let output = artifact("yt_dQw4w9WgXcQ_10mb.mp4", 10_400_000);

        let text = Summary {
            source: &source,
            input: None,
            remote_duration: Some(212.0),
            output: &output,
            target_bytes: Some(10_276_044),
            timings: Timings {
                fetch: Some(Duration::from_secs(12)),
                transcode: Some(Duration::from_secs(40)),
                total: Duration::from_secs(53),
            },
            color: false,
        }
        .to_string();

        assert!(text.contains("remote resource, duration 3:32"), "{text}");
        assert!(text.contains("budget of 9.8 MiB (over budget)"), "{text}");
        assert!(text.contains("fetch 12.0s"), "{text}");
    }
}
