//! Locating screenshot and audio files for a source document.
//!
//! The capture machines lay media out as
//! `{media_root}/{CHANNEL-NAME}/{YYYYMMDD}[AM|PM]/` with `screenshot/` (or
//! `screenshots/`) and `audio/` subdirectories. Export filenames embed the
//! channel token (underscored) and the date, so both can be derived without
//! any sidecar file. Paths recorded inside the export refer to the capture
//! machine's filesystem and are only tried verbatim as a first resort.

use std::path::{Path, PathBuf};

/// Audio extensions accepted for upload, with their content types.
const AUDIO_TYPES: &[(&str, &str)] = &[
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("m4a", "audio/mp4"),
    ("aac", "audio/aac"),
    ("ogg", "audio/ogg"),
    ("flac", "audio/flac"),
];

const IMAGE_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
];

/// Content type for a media file name, by extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    for (known, content_type) in AUDIO_TYPES.iter().chain(IMAGE_TYPES) {
        if *known == ext {
            return content_type;
        }
    }
    "application/octet-stream"
}

pub fn is_audio_file(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    AUDIO_TYPES.iter().any(|(known, _)| *known == ext)
}

/// Derive `(channel, date)` from an export file name like
/// `NHK_G_20250801_q0.9_integrated.json`: the underscore-separated tokens
/// before the first 8-digit token form the channel (hyphenated on disk).
pub fn derive_channel_date(file_name: &str) -> Option<(String, String)> {
    let stem = file_name.strip_suffix(".json").unwrap_or(file_name);
    let tokens: Vec<&str> = stem.split('_').collect();
    let date_pos = tokens.iter().position(|t| {
        t.len() == 8 && t.chars().all(|c| c.is_ascii_digit())
    })?;
    if date_pos == 0 {
        return None;
    }
    let channel = tokens[..date_pos].join("-");
    Some((channel, tokens[date_pos].to_string()))
}

/// Directories that may hold the document's media: the plain date directory
/// plus the AM/PM variants some capture machines use.
pub fn candidate_media_dirs(media_root: &Path, channel: &str, date: &str) -> Vec<PathBuf> {
    ["", "AM", "PM"]
        .iter()
        .map(|suffix| media_root.join(channel).join(format!("{}{}", date, suffix)))
        .filter(|dir| dir.is_dir())
        .collect()
}

/// Find a screenshot by name under the candidate directories, trying the
/// recorded absolute path first.
pub fn find_screenshot(
    recorded_path: Option<&str>,
    dirs: &[PathBuf],
    file_name: &str,
) -> Option<PathBuf> {
    if let Some(recorded) = recorded_path {
        let path = PathBuf::from(recorded);
        if path.is_file() {
            return Some(path);
        }
    }
    for dir in dirs {
        for sub in ["screenshot", "screenshots", "."] {
            let candidate = dir.join(sub).join(file_name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// All audio files under the candidate directories' `audio/` folders,
/// sorted by file name.
pub fn audio_files(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for dir in dirs {
        let audio_dir = dir.join("audio");
        let Ok(entries) = std::fs::read_dir(&audio_dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && is_audio_file(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn channel_and_date_from_export_name() {
        assert_eq!(
            derive_channel_date("NHK_G_20250801_q0.9_integrated.json"),
            Some(("NHK-G".to_string(), "20250801".to_string()))
        );
        assert_eq!(
            derive_channel_date("TBS_20250801_integrated.json"),
            Some(("TBS".to_string(), "20250801".to_string()))
        );
        assert_eq!(derive_channel_date("20250801_integrated.json"), None);
        assert_eq!(derive_channel_date("no_date_here.json"), None);
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("a.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("A.FLAC"), "audio/flac");
        assert_eq!(content_type_for("shot.jpg"), "image/jpeg");
        assert_eq!(content_type_for("unknown.bin"), "application/octet-stream");
    }

    #[test]
    fn screenshot_resolution_order() {
        let root = TempDir::new().unwrap();
        let day = root.path().join("NHK-G/20250801PM");
        fs::create_dir_all(day.join("screenshots")).unwrap();
        fs::write(day.join("screenshots/shot1.jpg"), b"img").unwrap();

        let dirs = candidate_media_dirs(root.path(), "NHK-G", "20250801");
        assert_eq!(dirs.len(), 1, "only the PM variant exists");

        let found = find_screenshot(Some("/capture/machine/shot1.jpg"), &dirs, "shot1.jpg");
        assert_eq!(found, Some(day.join("screenshots/shot1.jpg")));

        assert!(find_screenshot(None, &dirs, "missing.jpg").is_none());
    }

    #[test]
    fn audio_listing_filters_extensions() {
        let root = TempDir::new().unwrap();
        let day = root.path().join("TBS/20250801");
        fs::create_dir_all(day.join("audio")).unwrap();
        fs::write(day.join("audio/b.mp3"), b"x").unwrap();
        fs::write(day.join("audio/a.wav"), b"x").unwrap();
        fs::write(day.join("audio/readme.txt"), b"x").unwrap();

        let dirs = candidate_media_dirs(root.path(), "TBS", "20250801");
        let files = audio_files(&dirs);
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.wav"));
        assert!(files[1].ends_with("b.mp3"));
    }
}
