//! Track title canonicalization.
//!
//! Titles reach the dashboard from three producers that disagree about
//! formatting: the engine logs file-path-derived names
//! (`vanzo_-_me_and_you.mp3`), the scheduler logs display names, and Icecast
//! reports whatever the source client last sent. `normalize` reduces all of
//! them to one comparison key so "same track" is a plain string equality.
//! An empty normalized form never counts as a match.

/// File extensions recognized as audio payloads (matched case-insensitively,
/// final suffix only).
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg", "m4a", "aac"];

/// Strip a trailing audio extension, if present.
pub(crate) fn strip_audio_extension(name: &str) -> &str {
    if let Some((stem, ext)) = name.rsplit_once('.') {
        if AUDIO_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)) {
            return stem;
        }
    }
    name
}

/// Final path segment, for file-path-derived titles.
pub(crate) fn final_path_segment(raw: &str) -> &str {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw)
}

/// Replace the `_-_` artist/track convention and remaining underscores with
/// spaces, then collapse whitespace runs. Case is left alone so this can be
/// shared with the display-form cleanup in `logscan`.
pub(crate) fn space_underscores(raw: &str) -> String {
    let spaced = raw.replace("_-_", " - ").replace('_', " ");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical comparison form of a track title.
///
/// Trim, keep the final path segment, drop a known audio extension, turn
/// underscore conventions into spaces, collapse whitespace, lowercase.
/// Idempotent: normalizing an already-normalized title returns it unchanged.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let segment = final_path_segment(trimmed);
    let stem = strip_audio_extension(segment);
    space_underscores(stem).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_and_extension_stripped() {
        assert_eq!(
            normalize("/music/import/vanzo_-_me_and_you.mp3"),
            "vanzo - me and you"
        );
        assert_eq!(normalize("C:\\music\\Track_One.FLAC"), "track one");
    }

    #[test]
    fn test_file_form_equals_display_form() {
        assert_eq!(
            normalize("vanzo_-_me_and_you.mp3"),
            normalize("Vanzo - Me And You")
        );
        assert_eq!(normalize("vanzo_-_me_and_you.mp3"), "vanzo - me and you");
    }

    #[test]
    fn test_idempotent() {
        for raw in [
            "vanzo_-_me_and_you.mp3",
            "Vanzo - Me And You",
            "  spaced   out  ",
            "plain",
            "",
        ] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \t  "), "");
    }

    #[test]
    fn test_unknown_extension_kept() {
        // Only the known audio suffixes are stripped.
        assert_eq!(normalize("notes.txt"), "notes.txt");
        assert_eq!(normalize("track.mp3"), "track");
    }

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(normalize("A   B\t C"), "a b c");
        assert_eq!(normalize("a__b"), "a b");
    }
}
