use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    outside::StreamDownloader,
    result::{Error, Result},
    types::{Extension, MediaSource, Metadata, SourceKind},
};

/// Deterministic cache location of a downloaded source:
/// `<out_dir>/<stable_id>_source.<ext>`
pub fn cache_path(out_dir: &Path, stable_id: &str, container: Extension) -> PathBuf {
    out_dir.join(format!("{stable_id}_source{}", container.with_dot()))
}

/// A local file ready to be transcoded
#[derive(Debug)]
pub struct FetchedSource {
    pub path: PathBuf,
    pub metadata: Metadata,
    /// Time spent downloading, if a download happened
    pub download_time: Option<Duration>,
}

/// Materializes a [`MediaSource`] as a local file, downloading it at most once
/// per output directory.
pub struct Fetcher<'a> {
    downloader: Option<&'a dyn StreamDownloader>,
    out_dir: &'a Path,
    container: Extension,
}

impl<'a> Fetcher<'a> {
    pub fn new(downloader: Option<&'a dyn StreamDownloader>, out_dir: &'a Path, container: Extension) -> Self {
        Self {
            downloader,
            out_dir,
            container,
        }
    }

    pub fn fetch(&self, source: &MediaSource) -> Result<FetchedSource> {
        let url = match &source.kind {
            SourceKind::Local { path } => {
                debug!("Local source, nothing to fetch");
                return Ok(FetchedSource {
                    path: path.clone(),
                    metadata: Metadata::default(),
                    download_time: None,
                });
            }
            SourceKind::Remote { url, .. } => url,
        };

        let downloader = self
            .downloader
            .ok_or_else(|| Error::MissingDependency("fetcher".to_owned()))?;

        let metadata = match downloader.get_metadata(url) {
            Ok(metadata) => {
                info!("Metadata: {metadata}");
                metadata
            }
            Err(err) => {
                warn!("Could not get the media metadata, continuing without it: {err}");
                Metadata::default()
            }
        };

        let path = cache_path(self.out_dir, &source.stable_id, self.container);
        if is_cached(&path) {
            info!("Reusing cached source {}", path.display());
            return Ok(FetchedSource {
                path,
                metadata,
                download_time: None,
            });
        }

        info!("Downloading {url} with {}", downloader.name());
        let started = Instant::now();
        let downloaded = downloader
            .download(url, &path, self.container)
            .and_then(|()| {
                if is_cached(&path) {
                    Ok(())
                } else {
                    Err(Error::FetchFailed(format!(
                        "{} reported success but {} is missing or empty",
                        downloader.name(),
                        path.display()
                    )))
                }
            });

        if let Err(err) = downloaded {
            remove_partial_files(&path);
            return Err(match err {
                err @ Error::FetchFailed(_) => err,
                err => Error::FetchFailed(format!("{} could not download {url}: {err}", downloader.name())),
            });
        }

        let download_time = started.elapsed();
        info!("Downloaded {} in {:.1}s", path.display(), download_time.as_secs_f64());
        Ok(FetchedSource {
            path,
            metadata,
            download_time: Some(download_time),
        })
    }
}

/// A cached source must be a non-empty file: an empty one is a leftover
/// of an interrupted run.
fn is_cached(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

fn remove_partial_files(path: &Path) {
    let mut part = OsString::from(path.as_os_str());
    part.push(".part");

    for file in [path.to_path_buf(), PathBuf::from(part)] {
        match std::fs::remove_file(&file) {
            Ok(()) => debug!("Removed partial file {}", file.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!("Could not remove partial file {}: {err}", file.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Downloader writing a fixed payload, counting its calls
    #[derive(Default)]
    struct FakeDownloader {
        downloads: Cell<usize>,
        fail: bool,
        no_metadata: bool,
        write_partial: bool,
    }

    impl StreamDownloader for FakeDownloader {
        fn name(&self) -> &str {
            "fake-dl"
        }

        fn get_metadata(&self, _url: &str) -> Result<Metadata> {
            if self.no_metadata {
                return Err(Error::FetchFailed("no metadata".into()));
            }
            Ok(Metadata::from_lines("Sample Video (Official)!\n120\n"))
        }

        fn download(&self, _url: &str, path: &Path, _container: Extension) -> Result<()> {
            self.downloads.set(self.downloads.get() + 1);
            if self.write_partial {
                std::fs::write(path, b"half a video")?;
            }
            if self.fail {
                return Err(Error::FetchFailed("connection reset".into()));
            }
            std::fs::write(path, b"a whole video")?;
            Ok(())
        }

        fn version(&self) -> Result<String> {
            Ok("1.0".into())
        }

        fn self_update(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn downloads_at_most_once_per_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        let dl = FakeDownloader::default();
        let fetcher = Fetcher::new(Some(&dl), dir.path(), Extension::Mp4);
        let source = MediaSource::resolve("dQw4w9WgXcQ").unwrap();

        let first = fetcher.fetch(&source).unwrap();
        assert_eq!(first.path, dir.path().join("yt_dQw4w9WgXcQ_source.mp4"));
        assert!(first.download_time.is_some());
        assert_eq!(first.metadata.title.as_deref(), Some("Sample Video (Official)!"));

        let second = fetcher.fetch(&source).unwrap();
        assert_eq!(second.path, first.path);
        assert!(second.download_time.is_none());
        assert_eq!(dl.downloads.get(), 1);
    }

    #[test]
    fn empty_leftover_is_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        let source = MediaSource::resolve("dQw4w9WgXcQ").unwrap();
        let path = cache_path(dir.path(), &source.stable_id, Extension::Mkv);
        std::fs::write(&path, b"").unwrap();

        let dl = FakeDownloader::default();
        Fetcher::new(Some(&dl), dir.path(), Extension::Mkv).fetch(&source).unwrap();
        assert_eq!(dl.downloads.get(), 1);
        assert_eq!(std::fs::read(&path).unwrap(), b"a whole video");
    }

    #[test]
    fn failed_download_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dl = FakeDownloader {
            fail: true,
            write_partial: true,
            ..Default::default()
        };
        let source = MediaSource::resolve("https://x.com/a/status/42").unwrap();

        let err = Fetcher::new(Some(&dl), dir.path(), Extension::Mp4).fetch(&source).unwrap_err();
        assert!(matches!(err, Error::FetchFailed(_)));
        assert!(!cache_path(dir.path(), "x_42", Extension::Mp4).exists());
    }

    #[test]
    fn missing_metadata_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let dl = FakeDownloader {
            no_metadata: true,
            ..Default::default()
        };
        let source = MediaSource::resolve("dQw4w9WgXcQ").unwrap();

        let fetched = Fetcher::new(Some(&dl), dir.path(), Extension::Mp4).fetch(&source).unwrap();
        assert_eq!(fetched.metadata, Metadata::default());
    }

    #[test]
    fn local_source_is_its_own_cache() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"video").unwrap();
        let source = MediaSource::resolve(file.to_str().unwrap()).unwrap();

        let fetched = Fetcher::new(None, dir.path(), Extension::Mp4).fetch(&source).unwrap();
        assert_eq!(fetched.path, file.canonicalize().unwrap());
        assert!(fetched.download_time.is_none());
    }

    #[test]
    fn remote_source_needs_a_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let source = MediaSource::resolve("dQw4w9WgXcQ").unwrap();
        assert!(matches!(
            Fetcher::new(None, dir.path(), Extension::Mp4).fetch(&source),
            Err(Error::MissingDependency(_))
        ));
    }
}
