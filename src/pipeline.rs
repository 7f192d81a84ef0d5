use std::{path::PathBuf, time::Instant};

use tracing::{debug, info, warn};

use crate::{
    cli::Args,
    fetch::Fetcher,
    naming::{self, Renamed},
    outside::{StreamDownloader, StreamProber, StreamTransformer},
    planner::{self, EncodingPlan},
    report::{Summary, Timings},
    result::{Error, Result},
    settings::Settings,
    transcode::Executor,
    types::{Artifact, MediaSource, Metadata, Quality, TimeRange},
};

/// The validated user input of a run.
///
/// Building it has no side effect: a bad time range or an unknown source
/// stops the run before anything touches the network or the disk.
#[derive(Debug, Clone)]
pub struct Request {
    pub source: MediaSource,
    pub range: TimeRange,
    pub dry_run: bool,
    pub started: Instant,
}

impl Request {
    pub fn from_args(args: &Args) -> Result<Self> {
        let started = Instant::now();
        let range = TimeRange::parse(args.start.as_deref(), args.end.as_deref())?;
        let source = MediaSource::resolve(&args.source)?;
        debug!("Source: {source}, stable id {}", source.stable_id);

        Ok(Self {
            source,
            range,
            dry_run: args.dry_run,
            started,
        })
    }
}

/// The external programs the pipeline drives
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    /// Only needed for remote sources
    pub fetcher: Option<&'a dyn StreamDownloader>,
    pub encoder: &'a dyn StreamTransformer,
    pub prober: &'a dyn StreamProber,
}

#[derive(Debug)]
pub struct Transcoded {
    pub input: Option<Artifact>,
    pub output: Artifact,
    pub metadata: Metadata,
    pub plan: EncodingPlan,
    pub timings: Timings,
}

impl Transcoded {
    pub fn summary<'a>(&'a self, source: &'a MediaSource) -> Summary<'a> {
        Summary {
            source,
            input: self.input.as_ref(),
            remote_duration: self.metadata.duration,
            output: &self.output,
            target_bytes: self.plan.target.map(|t| t.bytes),
            timings: self.timings,
            color: false,
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    /// Dry run: the encoder command lines that would have run
    Planned(Vec<String>),
    Transcoded(Box<Transcoded>),
}

/// Profile used when none was asked for
pub fn default_quality(range: &TimeRange) -> Quality {
    if range.is_trimmed() {
        Quality::StreamCopy
    } else {
        Quality::Sd
    }
}

/// Fetch, plan, encode and rename, in that order, stopping at the first fatal error.
pub fn run(request: &Request, settings: &Settings, tools: Collaborators) -> Result<Outcome> {
    let Request { source, range, .. } = request;

    std::fs::create_dir_all(&settings.out).map_err(|err| {
        Error::from(err).wrap_err_with(|| format!("Could not create the output directory {}", settings.out.display()))
    })?;

    let fetched = Fetcher::new(tools.fetcher, &settings.out, settings.source_container).fetch(source)?;

    let quality = settings.quality.unwrap_or_else(|| default_quality(range));
    info!("Quality profile: {quality}");

    let input = match tools.prober.probe(&fetched.path) {
        Ok(artifact) => Some(artifact),
        // A stream copy only needs the file
        Err(err) if quality == Quality::StreamCopy => {
            warn!("Could not probe the source: {err}");
            None
        }
        Err(err) => return Err(err),
    };

    let plan = planner::plan(quality, range, input.as_ref())?;
    let output = naming::output_path(&settings.out, &source.output_stem(), quality.file_label(), range);

    if request.dry_run {
        let passlog = settings.out.join("ffmpeg2pass");
        let commands = Executor::invocations(&plan, &fetched.path, &output, &passlog)
            .iter()
            .map(|invocation| invocation.display(tools.encoder.name()))
            .collect();
        return Ok(Outcome::Planned(commands));
    }

    info!("Transcoding to {}", output.display());
    let transcode_time = Executor::new(tools.encoder).run(&plan, &fetched.path, &output)?;
    info!("Transcoded in {:.1}s", transcode_time.as_secs_f64());

    let output = match naming::rename_after_title(&output, fetched.metadata.title.as_deref(), range, settings.rename) {
        Ok(Renamed::To(renamed)) => renamed,
        Ok(Renamed::NotRequested | Renamed::Unchanged) => output,
        Err(err) if !err.is_fatal() => {
            warn!("{err}");
            output
        }
        Err(err) => return Err(err),
    };

    let output = tools.prober.probe(&output).unwrap_or_else(|err| {
        warn!("Could not probe the output: {err}");
        unprobed(output)
    });

    Ok(Outcome::Transcoded(Box::new(Transcoded {
        input,
        output,
        metadata: fetched.metadata,
        plan,
        timings: Timings {
            fetch: fetched.download_time,
            transcode: Some(transcode_time),
            total: request.started.elapsed(),
        },
    })))
}

/// What can be said about a file without the prober
fn unprobed(path: PathBuf) -> Artifact {
    let size_bytes = std::fs::metadata(&path).map_or(0, |m| m.len());
    Artifact {
        path,
        container: None,
        size_bytes,
        duration_secs: None,
        width: None,
        height: None,
        frame_rate: None,
        bitrate_kbps: None,
        codec: None,
    }
}
