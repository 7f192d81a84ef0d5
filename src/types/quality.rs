use std::{fmt::Display, str::FromStr};

use serde::Deserialize;

use super::Bitrate;

/// Target of the `10mb` profile: 9.8 MiB, leaving room for container overhead
pub const TEN_MB_TARGET_BYTES: u64 = 98 * 1024 * 1024 / 10;

const DEFAULT_AUDIO: Bitrate = Bitrate::from_kbps(128);

/// The closed set of output profiles a user can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Quality {
    PhoneSmall,
    PhoneFast,
    Sd,
    Hd,
    SourceMp4,
    Half,
    Quarter,
    TenMb,
    StreamCopy,
}

/// How a profile reaches its output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    /// Constant quality, with the shorter side capped at `max_height`
    Crf { crf: u8, max_height: u32 },
    /// Hit a byte budget with a computed bitrate, at the source resolution
    TargetSize(SizeTarget),
    /// Remux only
    StreamCopy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeTarget {
    Fixed { bytes: u64 },
    /// A fraction of the source bytes that fall inside the processed range
    Proportional { fraction: f64 },
}

#[derive(Debug)]
pub struct Profile {
    pub quality: Quality,
    pub name: &'static str,
    pub strategy: Strategy,
    pub audio: Bitrate,
    pub preset: &'static str,
}

const PROFILES: [Profile; 9] = [
    Profile {
        quality: Quality::PhoneSmall,
        name: "phone_small",
        strategy: Strategy::Crf { crf: 32, max_height: 360 },
        audio: DEFAULT_AUDIO,
        preset: "veryfast",
    },
    Profile {
        quality: Quality::PhoneFast,
        name: "phone_fast",
        strategy: Strategy::Crf { crf: 25, max_height: 480 },
        audio: DEFAULT_AUDIO,
        preset: "veryfast",
    },
    Profile {
        quality: Quality::Sd,
        name: "sd",
        strategy: Strategy::Crf { crf: 19, max_height: 720 },
        audio: DEFAULT_AUDIO,
        preset: "medium",
    },
    Profile {
        quality: Quality::Hd,
        name: "hd",
        strategy: Strategy::Crf { crf: 13, max_height: 1080 },
        audio: DEFAULT_AUDIO,
        preset: "medium",
    },
    Profile {
        quality: Quality::SourceMp4,
        name: "source_mp4",
        strategy: Strategy::Crf { crf: 22, max_height: 2160 },
        audio: Bitrate::from_kbps(192),
        preset: "medium",
    },
    Profile {
        quality: Quality::Half,
        name: "half",
        strategy: Strategy::TargetSize(SizeTarget::Proportional { fraction: 0.5 }),
        audio: DEFAULT_AUDIO,
        preset: "medium",
    },
    Profile {
        quality: Quality::Quarter,
        name: "quarter",
        strategy: Strategy::TargetSize(SizeTarget::Proportional { fraction: 0.25 }),
        audio: DEFAULT_AUDIO,
        preset: "medium",
    },
    Profile {
        quality: Quality::TenMb,
        name: "10mb",
        strategy: Strategy::TargetSize(SizeTarget::Fixed {
            bytes: TEN_MB_TARGET_BYTES,
        }),
        audio: DEFAULT_AUDIO,
        preset: "medium",
    },
    Profile {
        quality: Quality::StreamCopy,
        name: "stream_copy",
        strategy: Strategy::StreamCopy,
        audio: DEFAULT_AUDIO,
        preset: "",
    },
];

impl Quality {
    pub fn profile(self) -> &'static Profile {
        // Every variant has exactly one row
        PROFILES
            .iter()
            .find(|p| p.quality == self)
            .unwrap_or(&PROFILES[2])
    }

    pub fn name(self) -> &'static str {
        self.profile().name
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        PROFILES.iter().map(|p| p.name)
    }

    /// The word used in output file names
    pub fn file_label(self) -> &'static str {
        match self {
            Quality::StreamCopy => "trimmed",
            q => q.name(),
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        PROFILES
            .iter()
            .find(|p| p.name == s)
            .map(|p| p.quality)
            .ok_or_else(|| {
                let names: Vec<_> = Quality::names().collect();
                format!("unknown quality '{s}', expected one of: {}", names.join(", "))
            })
    }
}

impl TryFrom<String> for Quality {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
