use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::{
    outside::{Invocation, Sink, StreamTransformer},
    planner::{EncodingPlan, PassStrategy},
    result::{Error, Result},
};

const MP4_FLAGS: [&str; 2] = ["-movflags", "+faststart"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeState {
    Idle,
    SinglePass,
    TwoPass { pass: u8 },
    StreamCopy,
    Done,
    Failed,
}

/// Scratch directory holding the two-pass statistics files.
///
/// The directory and everything in it is removed on drop, whichever pass failed.
struct PassLog {
    dir: TempDir,
}

impl PassLog {
    fn create_in(out_dir: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix(".vgrab-2pass-").tempdir_in(out_dir)?;
        debug!("Two-pass logs in {}", dir.path().display());
        Ok(Self { dir })
    }

    fn prefix(&self) -> PathBuf {
        self.dir.path().join("ffmpeg2pass")
    }
}

impl Drop for PassLog {
    fn drop(&mut self) {
        debug!("Removing two-pass logs {}", self.dir.path().display());
    }
}

/// Runs an [`EncodingPlan`] with the encoder
pub struct Executor<'a> {
    encoder: &'a dyn StreamTransformer,
    state: TranscodeState,
}

impl<'a> Executor<'a> {
    pub fn new(encoder: &'a dyn StreamTransformer) -> Self {
        Self {
            encoder,
            state: TranscodeState::Idle,
        }
    }

    pub fn state(&self) -> TranscodeState {
        self.state
    }

    /// The encoder invocations carrying out a plan, in order.
    ///
    /// `passlog` is the statistics file prefix shared by both passes of a
    /// two-pass plan; it is ignored otherwise.
    pub fn invocations<'p>(
        plan: &EncodingPlan,
        input: &'p Path,
        output: &'p Path,
        passlog: &Path,
    ) -> Vec<Invocation<'p>> {
        let input_args = plan.input_args();
        let shared = plan.output_args();
        let finish = |mut args: Vec<String>| {
            args.extend(plan.audio_params.iter().cloned());
            args.extend(MP4_FLAGS.map(String::from));
            args
        };

        match plan.strategy {
            PassStrategy::SinglePass | PassStrategy::StreamCopy => vec![Invocation {
                input,
                input_args,
                output_args: finish(shared),
                sink: Sink::File(output),
            }],
            PassStrategy::TwoPass => {
                let passlog = passlog.to_string_lossy().into_owned();
                let pass = |n: &str| {
                    let mut args = shared.clone();
                    args.extend(["-pass".to_owned(), n.to_owned(), "-passlogfile".to_owned(), passlog.clone()]);
                    args
                };

                let mut analysis = pass("1");
                analysis.push("-an".to_owned());

                vec![
                    Invocation {
                        input,
                        input_args: input_args.clone(),
                        output_args: analysis,
                        sink: Sink::Discard,
                    },
                    Invocation {
                        input,
                        input_args,
                        output_args: finish(pass("2")),
                        sink: Sink::File(output),
                    },
                ]
            }
        }
    }

    /// Transcode `input` into `output`, returning the time it took.
    ///
    /// A failed run leaves whatever the encoder wrote in place.
    pub fn run(&mut self, plan: &EncodingPlan, input: &Path, output: &Path) -> Result<Duration> {
        let started = Instant::now();
        let res = self.run_passes(plan, input, output);
        self.state = if res.is_ok() {
            TranscodeState::Done
        } else {
            TranscodeState::Failed
        };
        debug!("Encoder stopped in state {:?}", self.state());
        res.map(|()| started.elapsed())
    }

    fn run_passes(&mut self, plan: &EncodingPlan, input: &Path, output: &Path) -> Result<()> {
        let out_dir = output.parent().unwrap_or(Path::new("."));
        // Held until the end of the function, both passes included
        let passlog = match plan.strategy {
            PassStrategy::TwoPass => Some(PassLog::create_in(out_dir)?),
            _ => None,
        };
        let prefix = passlog.as_ref().map(PassLog::prefix).unwrap_or_default();

        let invocations = Self::invocations(plan, input, output, &prefix);
        debug_assert_eq!(invocations.len(), usize::from(plan.pass_count()));
        for (idx, invocation) in invocations.iter().enumerate() {
            self.state = match plan.strategy {
                PassStrategy::SinglePass => TranscodeState::SinglePass,
                PassStrategy::StreamCopy => TranscodeState::StreamCopy,
                PassStrategy::TwoPass => TranscodeState::TwoPass { pass: idx as u8 + 1 },
            };
            let stage = self.stage_name();
            info!("Running {stage}");
            debug!("{}", invocation.display(self.encoder.name()));

            self.encoder
                .run(invocation)
                .map_err(|err| Error::TranscodeFailed(format!("{stage} failed: {err}")))?;
        }

        match std::fs::metadata(output) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            Ok(_) => Err(Error::TranscodeFailed(format!("{} is empty", output.display()))),
            Err(err) => {
                warn!("Encoder reported success but the output cannot be read: {err}");
                Err(Error::TranscodeFailed(format!("{} was not written", output.display())))
            }
        }
    }

    fn stage_name(&self) -> String {
        match self.state {
            TranscodeState::SinglePass => "single-pass encode".to_owned(),
            TranscodeState::StreamCopy => "stream copy".to_owned(),
            TranscodeState::TwoPass { pass: 1 } => "two-pass encode, pass 1 (analysis)".to_owned(),
            TranscodeState::TwoPass { pass } => format!("two-pass encode, pass {pass}"),
            state => format!("{state:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::{
        planner::plan,
        types::{Artifact, Quality, TimeRange},
    };

    /// Encoder recording its invocations, writing a small output,
    /// and optionally failing at a given call
    #[derive(Debug, Default)]
    struct FakeEncoder {
        calls: RefCell<Vec<Vec<String>>>,
        fail_at: Option<usize>,
        write_nothing: bool,
    }

    impl StreamTransformer for FakeEncoder {
        fn name(&self) -> &str {
            "fake-ffmpeg"
        }

        fn run(&self, invocation: &Invocation) -> Result<()> {
            let args = invocation
                .to_args()
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect();
            self.calls.borrow_mut().push(args);

            // Pass 1 of a real encoder writes its statistics next to the prefix
            if let Some(pos) = invocation.output_args.iter().position(|a| a == "-passlogfile") {
                let prefix = &invocation.output_args[pos + 1];
                std::fs::write(format!("{prefix}-0.log"), b"stats")?;
            }

            if self.fail_at == Some(self.calls.borrow().len()) {
                return Err(Error::TranscodeFailed("exit status: 1".into()));
            }
            if let (Sink::File(path), false) = (invocation.sink, self.write_nothing) {
                std::fs::write(path, b"encoded")?;
            }
            Ok(())
        }
    }

    fn probe(secs: f64) -> Artifact {
        Artifact {
            path: PathBuf::from("in.mp4"),
            container: None,
            size_bytes: 50 * 1024 * 1024,
            duration_secs: Some(secs),
            width: Some(1920),
            height: Some(1080),
            frame_rate: None,
            bitrate_kbps: None,
            codec: None,
        }
    }

    fn passlog_dirs(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(".vgrab-2pass-"))
            .count()
    }

    #[test]
    fn single_pass_writes_the_output_once() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip_sd.mp4");
        let plan = plan(Quality::Sd, &TimeRange::default(), Some(&probe(60.0))).unwrap();

        let encoder = FakeEncoder::default();
        let mut executor = Executor::new(&encoder);
        assert_eq!(executor.state(), TranscodeState::Idle);
        executor.run(&plan, Path::new("in.mp4"), &output).unwrap();

        assert_eq!(executor.state(), TranscodeState::Done);
        let calls = encoder.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].windows(2).any(|w| w == ["-crf", "19"]));
        assert_eq!(calls[0].last().unwrap(), &output.to_string_lossy());
    }

    #[test]
    fn two_pass_shares_filters_and_cleans_logs() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("x_10mb.mp4");
        let range = TimeRange::parse(Some("10"), Some("70")).unwrap();
        let plan = plan(Quality::TenMb, &range, Some(&probe(120.0))).unwrap();

        let encoder = FakeEncoder::default();
        Executor::new(&encoder).run(&plan, Path::new("in.mp4"), &output).unwrap();

        let calls = encoder.calls.borrow();
        assert_eq!(calls.len(), 2);
        let (first, second) = (&calls[0], &calls[1]);
        assert!(first.windows(2).any(|w| w == ["-pass", "1"]));
        assert!(first.contains(&"-an".to_owned()));
        assert_eq!(&first[first.len() - 3..], ["-f", "null", "-"]);
        assert!(second.windows(2).any(|w| w == ["-pass", "2"]));

        // Same cut and filters in both passes
        let vf = |args: &Vec<String>| args.iter().position(|a| a == "-vf").map(|i| args[i + 1].clone());
        assert_eq!(vf(first), vf(second));
        assert!(first.windows(2).any(|w| w == ["-ss", "10"]));
        assert!(second.windows(2).any(|w| w == ["-ss", "10"]));

        assert_eq!(passlog_dirs(dir.path()), 0);
    }

    #[test]
    fn failed_second_pass_still_cleans_logs_and_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("x_half.mp4");
        std::fs::write(&output, b"partial").unwrap();
        let plan = plan(Quality::Half, &TimeRange::default(), Some(&probe(120.0))).unwrap();

        let encoder = FakeEncoder {
            fail_at: Some(2),
            ..Default::default()
        };
        let mut executor = Executor::new(&encoder);
        let err = executor.run(&plan, Path::new("in.mp4"), &output).unwrap_err();

        assert!(matches!(err, Error::TranscodeFailed(ref why) if why.contains("pass 2")));
        assert_eq!(executor.state(), TranscodeState::Failed);
        assert_eq!(passlog_dirs(dir.path()), 0);
        assert!(output.exists());
    }

    #[test]
    fn stream_copy_is_one_copy_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("x_trimmed.mp4");
        let range = TimeRange::parse(Some("1:09"), Some("2:15")).unwrap();
        let plan = plan(Quality::StreamCopy, &range, None).unwrap();

        let encoder = FakeEncoder::default();
        Executor::new(&encoder).run(&plan, Path::new("in.mp4"), &output).unwrap();

        let calls = encoder.calls.borrow();
        assert_eq!(calls.len(), 1);
        let args = &calls[0];
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        let seek_pos = args.iter().position(|a| a == "-ss").unwrap();
        assert!(seek_pos < input_pos);
        assert!(args.windows(2).any(|w| w == ["-c:v", "copy"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "copy"]));
    }

    #[test]
    fn empty_output_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("x_sd.mp4");
        let plan = plan(Quality::Sd, &TimeRange::default(), Some(&probe(60.0))).unwrap();

        let encoder = FakeEncoder {
            write_nothing: true,
            ..Default::default()
        };
        let err = Executor::new(&encoder).run(&plan, Path::new("in.mp4"), &output).unwrap_err();
        assert!(matches!(err, Error::TranscodeFailed(_)));
    }
}
