use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    my_regex::platform_patterns,
    result::{Error, Result},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Local { path: PathBuf },
    Remote { platform: &'static str, url: String },
}

/// A resolved input, fixed for the whole run.
///
/// `stable_id` is the cache key: the absolute path of a local file, or
/// `<platform>_<media id>` for a remote one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    pub kind: SourceKind,
    pub raw_input: String,
    pub stable_id: String,
}

impl MediaSource {
    /// Classify the input as a local file or a supported platform URL.
    ///
    /// Nothing is touched on disk or on the network: this only reads
    /// file metadata.
    pub fn resolve(raw_input: &str) -> Result<Self> {
        let raw = raw_input.trim();

        let path = Path::new(raw);
        if !raw.is_empty() && path.is_file() {
            let path = path.canonicalize()?;
            debug!("'{raw}' is a local file: {}", path.display());
            return Ok(Self {
                stable_id: path.to_string_lossy().into_owned(),
                kind: SourceKind::Local { path },
                raw_input: raw_input.to_owned(),
            });
        }

        for pattern in platform_patterns() {
            let Some(id) = pattern
                .regex
                .captures(raw)
                .and_then(|cap| cap.get(pattern.id_group))
            else {
                continue;
            };
            let id = id.as_str();

            let url = match pattern.url_template {
                Some(template) => template.replace("{id}", id),
                None if raw.contains("://") => raw.to_owned(),
                None => format!("https://{raw}"),
            };

            debug!("'{raw}' matched platform '{}' with id '{id}'", pattern.tag);
            return Ok(Self {
                kind: SourceKind::Remote {
                    platform: pattern.tag,
                    url,
                },
                raw_input: raw_input.to_owned(),
                stable_id: format!("{}_{id}", pattern.tag),
            });
        }

        Err(Error::UnrecognizedSource(raw_input.to_owned()))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.kind, SourceKind::Remote { .. })
    }

    /// The file name stem of the outputs: the local file name without
    /// its extension, or the stable ID for remote media
    pub fn output_stem(&self) -> String {
        match &self.kind {
            SourceKind::Local { path } => path
                .file_stem()
                .map_or_else(|| self.stable_id.clone(), |s| s.to_string_lossy().into_owned()),
            SourceKind::Remote { .. } => self.stable_id.clone(),
        }
    }
}

impl Display for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            SourceKind::Local { path } => write!(f, "local file {}", path.display()),
            SourceKind::Remote { platform, url } => write!(f, "{platform} media {url}"),
        }
    }
}
