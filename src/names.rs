//! Filename conventions shared between staging, the engine, and result
//! mapping.
//!
//! Staged files are named `<base>__id__<evidenceId>.<ext>` so that engine
//! output lines can be resolved back to case evidence without a lookup
//! table on disk. The separator is a fixed contract with the engine: its
//! result files and annotated images reuse the staged names verbatim.

/// Separator embedded in staged filenames between base name and evidence id.
pub const ID_SEPARATOR: &str = "__id__";

/// Prefixes marking annotated output from a previous run that was
/// re-ingested as evidence. The first spelling is a legacy typo that still
/// occurs in old cases.
pub const ANNOTATED_PREFIXES: [&str; 2] = ["Anotated_", "Annotated_"];

/// Split a filename into base name and extension.
///
/// The last dot-separated segment is always the extension:
/// - `"photo"` -> `("photo", "")`
/// - `"photo.jpg"` -> `("photo", "jpg")`
/// - `"photo.backup.jpg"` -> `("photo.backup", "jpg")`
///
/// An empty input yields `("", "")`.
pub fn split_base_and_extension(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((base, ext)) => (base, ext),
        None => (name, ""),
    }
}

/// Build the staged filename for an evidence file.
pub fn staged_file_name(name: &str, evidence_id: u64) -> String {
    let (base, ext) = split_base_and_extension(name);
    if ext.is_empty() {
        format!("{base}{ID_SEPARATOR}{evidence_id}")
    } else {
        format!("{base}{ID_SEPARATOR}{evidence_id}.{ext}")
    }
}

/// One line of an engine result file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub evidence_id: u64,
    pub filename: String,
}

/// Parse an engine result line of the form `<base>__id__<id>.<ext>`.
///
/// Returns `None` for lines that do not follow the convention or whose id
/// segment is not numeric; callers skip those.
pub fn parse_result_line(line: &str) -> Option<ResultRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (_, tail) = line.split_once(ID_SEPARATOR)?;
    let id_part = match tail.split_once('.') {
        Some((id, _ext)) => id,
        None => tail,
    };
    let evidence_id = id_part.parse::<u64>().ok()?;
    Some(ResultRecord {
        evidence_id,
        filename: line.to_string(),
    })
}

/// True when the filename carries one of the annotated-output prefixes.
pub fn has_annotated_prefix(name: &str) -> bool {
    ANNOTATED_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_name() {
        assert_eq!(split_base_and_extension("photo.jpg"), ("photo", "jpg"));
    }

    #[test]
    fn splits_name_without_extension() {
        assert_eq!(split_base_and_extension("photo"), ("photo", ""));
    }

    #[test]
    fn splits_multi_dot_name_on_last_segment() {
        assert_eq!(
            split_base_and_extension("photo.backup.jpg"),
            ("photo.backup", "jpg")
        );
    }

    #[test]
    fn splits_empty_name() {
        assert_eq!(split_base_and_extension(""), ("", ""));
    }

    #[test]
    fn builds_staged_name() {
        assert_eq!(staged_file_name("a.jpg", 1), "a__id__1.jpg");
        assert_eq!(staged_file_name("a.b.jpg", 12), "a.b__id__12.jpg");
        assert_eq!(staged_file_name("noext", 3), "noext__id__3");
    }

    #[test]
    fn parses_result_line() {
        let record = parse_result_line("holiday__id__7.jpg\n").expect("record");
        assert_eq!(record.evidence_id, 7);
        assert_eq!(record.filename, "holiday__id__7.jpg");
    }

    #[test]
    fn parses_result_line_without_extension() {
        let record = parse_result_line("holiday__id__42").expect("record");
        assert_eq!(record.evidence_id, 42);
    }

    #[test]
    fn rejects_malformed_result_lines() {
        assert!(parse_result_line("").is_none());
        assert!(parse_result_line("   ").is_none());
        assert!(parse_result_line("holiday.jpg").is_none());
        assert!(parse_result_line("holiday__id__x.jpg").is_none());
    }

    #[test]
    fn detects_annotated_prefixes() {
        assert!(has_annotated_prefix("Annotated_a.jpg"));
        assert!(has_annotated_prefix("Anotated_a.jpg"));
        assert!(!has_annotated_prefix("a_Annotated.jpg"));
    }
}
