mod command;
mod ffmpeg;
mod ffprobe;
mod ytdl;

pub use command::{program_runs, run_attached, run_capture_stdout};
pub use ffmpeg::{Ffmpeg, Invocation, Sink, StreamTransformer};
pub use ffprobe::{Ffprobe, StreamProber};
pub use ytdl::{StreamDownloader, Ytdl};
