use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::{
    result::{Error, Result},
    types::{Extension, TimeRange},
};

/// Outputs are always MP4
const OUTPUT_EXT: Extension = Extension::Mp4;

static NAME_RE: OnceLock<[Regex; 3]> = OnceLock::new();

fn name_re() -> &'static [Regex; 3] {
    NAME_RE.get_or_init(|| {
        [
            Regex::new(r"\s+").unwrap(),
            Regex::new(r"[^A-Za-z0-9_.-]").unwrap(),
            Regex::new(r"([_.-])[_.-]+").unwrap(),
        ]
    })
}

/// `<out_dir>/<stem>_<label><range suffix>.mp4`
pub fn output_path(out_dir: &Path, stem: &str, label: &str, range: &TimeRange) -> PathBuf {
    out_dir.join(format!(
        "{stem}_{label}{}{}",
        range.label_suffix(),
        OUTPUT_EXT.with_dot()
    ))
}

/// Turn a media title into a portable file name stem.
///
/// `"Sample Video (Official)!"` becomes `"Sample_Video_Official"`.
pub fn normalize_title(title: &str) -> String {
    let [spaces, forbidden, repeated] = name_re();

    let name = spaces.replace_all(title.trim(), "_");
    let name = forbidden.replace_all(&name, "");
    let name = repeated.replace_all(&name, "$1");
    name.trim_matches(['_', '.', '-']).to_owned()
}

/// What the rename stage did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Renamed {
    /// Rename not requested or no title to rename after
    NotRequested,
    /// The output already had the wanted name
    Unchanged,
    To(PathBuf),
}

/// Rename `output` after the media title, keeping the time range suffix.
///
/// Failures are [`Error::RenameFailed`]: the caller can report them and
/// carry on with the original file.
pub fn rename_after_title(output: &Path, title: Option<&str>, range: &TimeRange, requested: bool) -> Result<Renamed> {
    let title = match (requested, title) {
        (true, Some(title)) => title,
        (true, None) => {
            warn!("No media title available, keeping {}", output.display());
            return Ok(Renamed::NotRequested);
        }
        (false, _) => return Ok(Renamed::NotRequested),
    };

    let stem = normalize_title(title);
    if stem.is_empty() {
        return Err(Error::RenameFailed(format!(
            "title '{title}' has no usable characters"
        )));
    }

    let target = output.with_file_name(format!(
        "{stem}{}{}",
        range.label_suffix(),
        OUTPUT_EXT.with_dot()
    ));
    if target == output {
        warn!("Output is already named {}, not renaming", target.display());
        return Ok(Renamed::Unchanged);
    }

    debug!("Renaming {} to {}", output.display(), target.display());
    if let Err(err) = std::fs::rename(output, &target) {
        debug!("Moving file failed ({err}), falling back to copying");
        std::fs::copy(output, &target)
            .and_then(|_| std::fs::remove_file(output))
            .map_err(|err| {
                Error::RenameFailed(format!(
                    "could not move {} to {}: {err}",
                    output.display(),
                    target.display()
                ))
            })?;
    }

    info!("Renamed to {}", target.display());
    Ok(Renamed::To(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_carries_label_and_range() {
        let out = Path::new("/videos");
        assert_eq!(
            output_path(out, "clip", "sd", &TimeRange::default()),
            PathBuf::from("/videos/clip_sd.mp4")
        );

        let range = TimeRange::parse(Some("1:09"), Some("2:15")).unwrap();
        assert_eq!(
            output_path(out, "yt_dQw4w9WgXcQ", "trimmed", &range),
            PathBuf::from("/videos/yt_dQw4w9WgXcQ_trimmed_00-01-09_to_00-02-15.mp4")
        );

        let open_end = TimeRange::parse(Some("30"), None).unwrap();
        assert_eq!(
            output_path(out, "x_42", "10mb", &open_end),
            PathBuf::from("/videos/x_42_10mb_00-00-30_to_end.mp4")
        );
    }

    #[test]
    fn titles_are_normalized() {
        assert_eq!(normalize_title("Sample Video (Official)!"), "Sample_Video_Official");
        assert_eq!(normalize_title("  a -- b  "), "a_b");
        assert_eq!(normalize_title("Ünïcödé & more"), "ncd_more");
        assert_eq!(normalize_title("v1.2...final"), "v1.2.final");
        assert_eq!(normalize_title("!!!"), "");
    }

    #[test]
    fn normalized_titles_have_no_doubled_or_edge_separators() {
        for title in ["__x__", "-.-x-.-", "a  (b)  [c]", "...", "x\ty\nz"] {
            let name = normalize_title(title);
            assert!(!name.starts_with(['_', '.', '-']), "{name}");
            assert!(!name.ends_with(['_', '.', '-']), "{name}");
            assert!(!name.contains("__") && !name.contains("_-") && !name.contains(".."), "{name}");
        }
    }

    #[test]
    fn renames_after_title_keeping_range() {
        let dir = tempfile::tempdir().unwrap();
        let range = TimeRange::parse(Some("1:09"), Some("2:15")).unwrap();
        let output = output_path(dir.path(), "yt_dQw4w9WgXcQ", "trimmed", &range);
        std::fs::write(&output, b"video").unwrap();

        let renamed = rename_after_title(&output, Some("Sample Video (Official)!"), &range, true).unwrap();
        let expected = dir.path().join("Sample_Video_Official_00-01-09_to_00-02-15.mp4");
        assert_eq!(renamed, Renamed::To(expected.clone()));
        assert!(expected.exists());
        assert!(!output.exists());
    }

    #[test]
    fn rename_overwrites_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip_sd.mp4");
        std::fs::write(&output, b"new").unwrap();
        std::fs::write(dir.path().join("Title.mp4"), b"old").unwrap();

        rename_after_title(&output, Some("Title"), &TimeRange::default(), true).unwrap();
        assert_eq!(std::fs::read(dir.path().join("Title.mp4")).unwrap(), b"new");
    }

    #[test]
    fn same_name_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("Title.mp4");
        std::fs::write(&output, b"video").unwrap();

        let renamed = rename_after_title(&output, Some("Title"), &TimeRange::default(), true).unwrap();
        assert_eq!(renamed, Renamed::Unchanged);
        assert!(output.exists());
    }

    #[test]
    fn rename_needs_request_and_title() {
        let output = Path::new("/nowhere/clip_sd.mp4");
        let range = TimeRange::default();
        assert_eq!(rename_after_title(output, Some("T"), &range, false).unwrap(), Renamed::NotRequested);
        assert_eq!(rename_after_title(output, None, &range, true).unwrap(), Renamed::NotRequested);
    }

    #[test]
    fn failures_are_rename_errors() {
        let range = TimeRange::default();
        let err = rename_after_title(Path::new("/nowhere/clip_sd.mp4"), Some("T"), &range, true).unwrap_err();
        assert!(matches!(err, Error::RenameFailed(_)));
        assert!(!err.is_fatal());

        let err = rename_after_title(Path::new("/nowhere/clip_sd.mp4"), Some("???"), &range, true).unwrap_err();
        assert!(matches!(err, Error::RenameFailed(_)));
    }
}
