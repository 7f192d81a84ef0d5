use tracing::{debug, info, warn};

use crate::{
    result::{Error, Result},
    types::{Artifact, Bitrate, Quality, SizeTarget, Strategy, TimeRange},
};

/// Below this video bitrate the output will look bad
const LOW_VIDEO_KBPS: u32 = 100;
/// The encoder needs some bits to work with, even for a hopeless budget
const MIN_VIDEO_KBPS: u32 = 32;

const VIDEO_CODEC: [&str; 2] = ["-c:v", "libx264"];
const AUDIO_CODEC: [&str; 2] = ["-c:a", "aac"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStrategy {
    SinglePass,
    /// Analysis pass, then the real one
    TwoPass,
    StreamCopy,
}

/// Where the cut arguments go relative to the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPosition {
    /// Fast, keyframe-aligned: only for stream copy
    BeforeInput,
    /// Decode then cut: frame accurate
    AfterInput,
}

/// The byte budget of a target-size profile and the bitrates derived from it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetBudget {
    pub bytes: u64,
    pub video: Bitrate,
    pub audio: Bitrate,
}

/// Everything the encoder needs to know, computed fresh on every run
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingPlan {
    pub quality: Quality,
    pub strategy: PassStrategy,
    pub scale_filter: Option<String>,
    pub pad_filter: Option<String>,
    pub video_params: Vec<String>,
    pub audio_params: Vec<String>,
    pub seek_args: Vec<String>,
    pub duration_arg: Option<String>,
    pub seek_position: SeekPosition,
    /// Length of the output, when known
    pub processed_secs: Option<f64>,
    pub target: Option<TargetBudget>,
}

impl EncodingPlan {
    pub fn pass_count(&self) -> u8 {
        match self.strategy {
            PassStrategy::TwoPass => 2,
            _ => 1,
        }
    }

    pub fn filter_graph(&self) -> Option<String> {
        let filters: Vec<&str> = [&self.scale_filter, &self.pad_filter]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        (!filters.is_empty()).then(|| filters.join(","))
    }

    fn cut_args(&self) -> Vec<String> {
        let mut args = self.seek_args.clone();
        if let Some(duration) = &self.duration_arg {
            args.extend(["-t".to_owned(), duration.clone()]);
        }
        args
    }

    /// Arguments placed before `-i`
    pub fn input_args(&self) -> Vec<String> {
        match self.seek_position {
            SeekPosition::BeforeInput => self.cut_args(),
            SeekPosition::AfterInput => Vec::new(),
        }
    }

    /// Cut and filter arguments placed after `-i`, shared by every pass
    pub fn output_args(&self) -> Vec<String> {
        let mut args = match self.seek_position {
            SeekPosition::BeforeInput => Vec::new(),
            SeekPosition::AfterInput => self.cut_args(),
        };
        if let Some(graph) = self.filter_graph() {
            args.extend(["-vf".to_owned(), graph]);
        }
        args.extend(self.video_params.iter().cloned());
        args
    }
}

/// Turn a profile and a time range into encoder parameters.
///
/// `probe` describes the source file. It may be absent for a stream copy,
/// which needs nothing from it.
pub fn plan(quality: Quality, range: &TimeRange, probe: Option<&Artifact>) -> Result<EncodingPlan> {
    let profile = quality.profile();

    if profile.strategy == Strategy::StreamCopy {
        return Ok(stream_copy_plan(range, probe.and_then(|p| p.duration_secs)));
    }

    let probe = probe.ok_or_else(|| Error::ProbeFailed("the source could not be probed".to_owned()))?;
    let source_secs = probe
        .duration_secs
        .ok_or_else(|| Error::ProbeFailed(format!("unknown duration of {}", probe.path.display())))?;
    let (width, height) = probe
        .resolution()
        .ok_or_else(|| Error::ProbeFailed(format!("unknown dimensions of {}", probe.path.display())))?;

    if range.start_secs() >= source_secs {
        return Err(Error::InvalidTimeRange {
            start: range.start_secs().to_string(),
            end: format!("{source_secs:.3} (end of the source)"),
        });
    }
    let processed_secs = range.processed_secs(source_secs);
    debug!("Source {width}x{height}, {source_secs:.3}s; processing {processed_secs:.3}s");

    let (seek_args, duration_arg) = cut(range);
    let audio_params = audio_params(profile.audio);

    let plan = match profile.strategy {
        Strategy::Crf { crf, max_height } => {
            let (scale_filter, pad_filter) = fit_into_canvas(max_height, probe.is_portrait());
            EncodingPlan {
                quality,
                strategy: PassStrategy::SinglePass,
                scale_filter: Some(scale_filter),
                pad_filter: Some(pad_filter),
                video_params: video_params(profile.preset, ["-crf".to_owned(), crf.to_string()]),
                audio_params,
                seek_args,
                duration_arg,
                seek_position: SeekPosition::AfterInput,
                processed_secs: Some(processed_secs),
                target: None,
            }
        }
        Strategy::TargetSize(target) => {
            let bytes = target_bytes(target, probe, source_secs, processed_secs)?;
            let video = video_bitrate(bytes, processed_secs, profile.audio);
            info!(
                "Target {:.2} MiB over {processed_secs:.1}s: video {video}, audio {}",
                bytes as f64 / 1024.0 / 1024.0,
                profile.audio
            );
            EncodingPlan {
                quality,
                strategy: PassStrategy::TwoPass,
                scale_filter: Some("scale=trunc(iw/2)*2:trunc(ih/2)*2".to_owned()),
                pad_filter: None,
                video_params: video_params(profile.preset, ["-b:v".to_owned(), video.to_string()]),
                audio_params,
                seek_args,
                duration_arg,
                seek_position: SeekPosition::AfterInput,
                processed_secs: Some(processed_secs),
                target: Some(TargetBudget {
                    bytes,
                    video,
                    audio: profile.audio,
                }),
            }
        }
        Strategy::StreamCopy => unreachable!("stream copy is planned above"),
    };

    Ok(plan)
}

fn stream_copy_plan(range: &TimeRange, source_secs: Option<f64>) -> EncodingPlan {
    let (seek_args, duration_arg) = cut(range);
    EncodingPlan {
        quality: Quality::StreamCopy,
        strategy: PassStrategy::StreamCopy,
        scale_filter: None,
        pad_filter: None,
        video_params: ["-c:v", "copy"].map(String::from).to_vec(),
        audio_params: ["-c:a", "copy", "-avoid_negative_ts", "make_zero"].map(String::from).to_vec(),
        seek_args,
        duration_arg,
        seek_position: SeekPosition::BeforeInput,
        processed_secs: source_secs.map(|s| range.processed_secs(s)),
        target: None,
    }
}

/// `-ss` arguments and the `-t` value of a range
fn cut(range: &TimeRange) -> (Vec<String>, Option<String>) {
    let seek_args = range
        .start
        .as_ref()
        .map(|s| vec!["-ss".to_owned(), s.to_string()])
        .unwrap_or_default();
    let duration_arg = range.duration_secs().map(format_secs);
    (seek_args, duration_arg)
}

/// Seconds with at most millisecond precision and no trailing zeros
fn format_secs(secs: f64) -> String {
    let s = format!("{secs:.3}");
    s.trim_end_matches('0').trim_end_matches('.').to_owned()
}

/// Scale the content to fit a 16:9 canvas whose short side is `max_height`
/// (never upscaling), then pad it centered to the canvas.
///
/// The canvas follows the profile height rather than a fixed frame: `sd`
/// lands on exactly 1280x720 (720x1280 for portrait input), and the higher
/// profiles get a canvas large enough to keep their own resolution.
fn fit_into_canvas(max_height: u32, portrait: bool) -> (String, String) {
    let long = (max_height * 16 / 9 + 1) / 2 * 2;
    let (w, h) = if portrait { (max_height, long) } else { (long, max_height) };

    let scale = format!(
        "scale=w='min(iw,{w})':h='min(ih,{h})':force_original_aspect_ratio=decrease:force_divisible_by=2"
    );
    let pad = format!("pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1");
    (scale, pad)
}

fn video_params(preset: &str, rate: [String; 2]) -> Vec<String> {
    let mut params: Vec<String> = VIDEO_CODEC.map(String::from).to_vec();
    params.extend(["-preset".to_owned(), preset.to_owned()]);
    params.extend(rate);
    params.extend(["-pix_fmt", "yuv420p"].map(String::from));
    params
}

fn audio_params(audio: Bitrate) -> Vec<String> {
    let mut params: Vec<String> = AUDIO_CODEC.map(String::from).to_vec();
    params.extend(["-b:a".to_owned(), audio.to_string()]);
    params
}

/// Byte budget of a target-size profile.
///
/// The proportional budget assumes the source bitrate is uniform: a clip of
/// a variable bitrate source gets its share by duration, not by actual bytes.
fn target_bytes(target: SizeTarget, probe: &Artifact, source_secs: f64, processed_secs: f64) -> Result<u64> {
    match target {
        SizeTarget::Fixed { bytes } => Ok(bytes),
        SizeTarget::Proportional { fraction } => {
            if probe.size_bytes == 0 {
                return Err(Error::ProbeFailed(format!("unknown size of {}", probe.path.display())));
            }
            let slice = probe.size_bytes as f64 * processed_secs / source_secs;
            Ok((slice * fraction).round() as u64)
        }
    }
}

/// `(bytes * 8 / seconds) / 1000 - audio` kbps
fn video_bitrate(bytes: u64, processed_secs: f64, audio: Bitrate) -> Bitrate {
    let total_kbps = bytes as f64 * 8.0 / processed_secs / 1000.0;
    let video_kbps = total_kbps - audio.kbps() as f64;

    if video_kbps < LOW_VIDEO_KBPS as f64 {
        warn!(
            "Computed video bitrate is only {video_kbps:.0} kbps: expect a very low quality output"
        );
    }
    Bitrate::from_kbps((video_kbps.max(0.0) as u32).max(MIN_VIDEO_KBPS))
}
