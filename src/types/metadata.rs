use std::fmt::Display;

use super::Timestamp;

/// What the fetcher could tell about a remote media item.
///
/// Both fields are best-effort: a platform may hide either of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub duration: Option<f64>,
}

impl Metadata {
    /// Build from the fetcher's plain-text answers, one value per line:
    /// the title first, then the duration in seconds.
    ///
    /// Platforms without a value print `NA`. The duration may be plain
    /// seconds or a clock value such as `3:32`.
    pub fn from_lines(output: &str) -> Self {
        let mut lines = output.lines().map(str::trim);

        let title = lines
            .next()
            .filter(|t| !t.is_empty() && *t != "NA")
            .map(str::to_owned);
        let duration = lines
            .next()
            .and_then(|d| {
                d.parse::<f64>()
                    .ok()
                    .or_else(|| Timestamp::parse(d).ok().flatten().map(|t| t.as_secs_f64()))
            })
            .filter(|d| d.is_finite() && *d > 0.0);

        Self { title, duration }
    }
}

impl Display for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "title = {}, duration = {}",
            self.title.as_deref().unwrap_or("?"),
            self.duration.map_or_else(|| "?".to_owned(), |d| format!("{d:.1}s")),
        )
    }
}
