use std::path::PathBuf;

/// Snapshot of a media file's properties, as reported by the prober
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub container: Option<String>,
    pub size_bytes: u64,
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub bitrate_kbps: Option<u64>,
    pub codec: Option<String>,
}

impl Artifact {
    /// Bitrate as reported, or derived from size and duration
    pub fn effective_bitrate_kbps(&self) -> Option<u64> {
        self.bitrate_kbps.or_else(|| {
            self.duration_secs
                .filter(|d| *d > 0.0)
                .map(|d| (self.size_bytes as f64 * 8.0 / d / 1000.0).round() as u64)
        })
    }

    pub fn is_portrait(&self) -> bool {
        matches!((self.width, self.height), (Some(w), Some(h)) if h > w)
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> Artifact {
        Artifact {
            path: PathBuf::from("x.mp4"),
            container: None,
            size_bytes: 1_000_000,
            duration_secs: Some(8.0),
            width: Some(1920),
            height: Some(1080),
            frame_rate: None,
            bitrate_kbps: None,
            codec: None,
        }
    }

    #[test]
    fn derives_bitrate_from_size() {
        assert_eq!(artifact().effective_bitrate_kbps(), Some(1000));
        let reported = Artifact {
            bitrate_kbps: Some(42),
            ..artifact()
        };
        assert_eq!(reported.effective_bitrate_kbps(), Some(42));
        let unknown = Artifact {
            duration_secs: None,
            ..artifact()
        };
        assert_eq!(unknown.effective_bitrate_kbps(), None);
    }

    #[test]
    fn orientation() {
        assert!(!artifact().is_portrait());
        let portrait = Artifact {
            width: Some(1080),
            height: Some(1920),
            ..artifact()
        };
        assert!(portrait.is_portrait());
    }
}
