use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Read a newline-delimited label file. Line `i` names class `i`.
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read label file: {}", path.display()))?;

    Ok(parse_labels(&raw))
}

/// Split label text into lines. Accepts `\n` and `\r\n`; a trailing newline
/// does not add an empty label, but blank lines in the middle are kept so
/// indices stay aligned with the model's classes.
pub fn parse_labels(raw: &str) -> Vec<String> {
    raw.lines().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parse_labels_splits_lines_in_order() {
        let labels = parse_labels("background\ntench\ngoldfish\n");
        assert_eq!(labels, vec!["background", "tench", "goldfish"]);
    }

    #[test]
    fn parse_labels_accepts_crlf() {
        let labels = parse_labels("cat\r\ndog\r\n");
        assert_eq!(labels, vec!["cat", "dog"]);
    }

    #[test]
    fn parse_labels_keeps_blank_lines_in_the_middle() {
        let labels = parse_labels("a\n\nc");
        assert_eq!(labels, vec!["a", "", "c"]);
    }

    #[test]
    fn parse_labels_empty_input() {
        assert!(parse_labels("").is_empty());
    }

    #[test]
    fn load_labels_reads_given_path() {
        let mut file = NamedTempFile::new().expect("create temp label file");
        write!(file, "cat\ndog\nfox\n").expect("write labels");

        let labels = load_labels(file.path()).expect("load labels");
        assert_eq!(labels, vec!["cat", "dog", "fox"]);
    }

    #[test]
    fn load_labels_missing_file_fails() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let err = load_labels(&dir.path().join("missing.txt"))
            .err()
            .expect("should fail");
        assert!(err.to_string().contains("failed to read label file"));
    }
}
