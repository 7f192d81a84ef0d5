mod artifact;
mod bitrate;
mod extension;
mod metadata;
mod quality;
mod source;
mod timestamp;

pub use artifact::Artifact;
pub use bitrate::Bitrate;
pub use extension::Extension;
pub use metadata::Metadata;
pub use quality::{Quality, SizeTarget, Strategy};
#[cfg(test)]
pub use quality::TEN_MB_TARGET_BYTES;
pub use source::{MediaSource, SourceKind};
pub use timestamp::{TimeRange, Timestamp};
