use std::{fmt::Display, str::FromStr, sync::OnceLock};

use regex::Regex;

use crate::result::{Error, Result};

/// A point in a stream, in seconds, as typed by the user.
///
/// The fractional part is kept as written so that it can be handed to the
/// encoder without any float formatting noise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    whole: u64,
    frac: Option<String>,
}

fn time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(?P<h>\d+):(?P<m>\d{1,2}):(?P<s>\d{1,2})|(?P<secs>\d+))(?:\.(?P<frac>\d+))?$")
            .expect("time regex is valid")
    })
}

impl Timestamp {
    /// Parse `SS[.frac]`, `MM:SS[.frac]` or `HH:MM:SS[.frac]`.
    ///
    /// An empty (or blank) input gives `Ok(None)`.
    pub fn parse(input: &str) -> Result<Option<Self>> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        // MM:SS is HH:MM:SS with zero hours
        let normalized = if trimmed.matches(':').count() == 1 {
            format!("00:{trimmed}")
        } else {
            trimmed.to_owned()
        };

        let invalid = || Error::InvalidTimeFormat(input.to_owned());
        let cap = time_regex().captures(&normalized).ok_or_else(invalid)?;
        let field = |name: &str| -> Result<u64> {
            cap.name(name)
                .map_or(Ok(0), |m| m.as_str().parse().map_err(|_| invalid()))
        };

        let whole = if cap.name("secs").is_some() {
            field("secs")?
        } else {
            let (h, m, s) = (field("h")?, field("m")?, field("s")?);
            if m >= 60 || s >= 60 {
                return Err(invalid());
            }
            h.checked_mul(3600)
                .and_then(|h| h.checked_add(m * 60 + s))
                .ok_or_else(invalid)?
        };

        let frac = cap
            .name("frac")
            .map(|m| m.as_str().trim_end_matches('0'))
            .filter(|f| !f.is_empty())
            .map(str::to_owned);

        Ok(Some(Self { whole, frac }))
    }

    pub fn from_secs(whole: u64) -> Self {
        Self { whole, frac: None }
    }

    pub fn as_secs_f64(&self) -> f64 {
        // Cannot fail: both parts are plain digit strings
        self.to_string().parse().unwrap_or(self.whole as f64)
    }

    /// Render the whole seconds as `HH-MM-SS`, for use in file names.
    /// The fractional part is dropped.
    pub fn to_label(&self) -> String {
        let (h, m, s) = (self.whole / 3600, self.whole / 60 % 60, self.whole % 60);
        format!("{h:02}-{m:02}-{s:02}")
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)?.ok_or_else(|| Error::InvalidTimeFormat(s.to_owned()))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.frac {
            Some(frac) => write!(f, "{}.{frac}", self.whole),
            None => write!(f, "{}", self.whole),
        }
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Fractions compare as digit strings once padded to the same length
        let frac = |t: &Self, len| {
            let f = t.frac.as_deref().unwrap_or("");
            format!("{f:0<len$}")
        };
        let len = self.frac.as_ref().map_or(0, String::len).max(other.frac.as_ref().map_or(0, String::len));

        self.whole
            .cmp(&other.whole)
            .then_with(|| frac(self, len).cmp(&frac(other, len)))
    }
}

/// The part of the stream to keep. No bound at all means the whole stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
}

impl TimeRange {
    /// Parse both bounds and check that the end comes after the start.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let start = start.map(Timestamp::parse).transpose()?.flatten();
        let end = end.map(Timestamp::parse).transpose()?.flatten();

        if let (Some(s), Some(e)) = (&start, &end) {
            if e <= s {
                return Err(Error::InvalidTimeRange {
                    start: s.to_string(),
                    end: e.to_string(),
                });
            }
        }

        Ok(Self { start, end })
    }

    pub fn is_trimmed(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    pub fn start_secs(&self) -> f64 {
        self.start.as_ref().map_or(0.0, Timestamp::as_secs_f64)
    }

    /// Length of the kept part, when the end is known
    pub fn duration_secs(&self) -> Option<f64> {
        self.end.as_ref().map(|e| e.as_secs_f64() - self.start_secs())
    }

    /// Length of the kept part of a stream lasting `total` seconds.
    /// The end is clamped to the stream end.
    pub fn processed_secs(&self, total: f64) -> f64 {
        let end = self.end.as_ref().map_or(total, |e| e.as_secs_f64().min(total));
        (end - self.start_secs()).max(0.0)
    }

    /// The `_<start>_to_<end>` file name suffix, empty when not trimmed
    pub fn label_suffix(&self) -> String {
        if !self.is_trimmed() {
            return String::new();
        }

        let start = self
            .start
            .as_ref()
            .map_or_else(|| Timestamp::from_secs(0).to_label(), Timestamp::to_label);
        let end = self
            .end
            .as_ref()
            .map_or_else(|| "end".to_owned(), Timestamp::to_label);
        format!("_{start}_to_{end}")
    }
}
