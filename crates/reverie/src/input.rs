//! Entry dumps on disk.

use std::path::Path;

use miette::{IntoDiagnostic, Result, WrapErr};
use tracing::debug;

use reverie_store::Entry;

/// Read a JSON array of entries.
pub async fn load_entries(path: &Path) -> Result<Vec<Entry>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;

    let entries = parse_entries(&raw)
        .wrap_err_with(|| format!("failed to parse entries from {}", path.display()))?;
    debug!(count = entries.len(), path = %path.display(), "entries loaded");
    Ok(entries)
}

pub fn parse_entries(raw: &str) -> Result<Vec<Entry>> {
    serde_json::from_str(raw).into_diagnostic()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entries_defaults() {
        let entries = parse_entries(
            r#"[
                {"id": "1", "timestamp": "2024-01-01T00:00:00Z"},
                {"id": "2", "parentId": "1", "kind": "dream", "timestamp": "2024-01-01T00:01:00Z"}
            ]"#,
        )
        .unwrap();

        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_root());
        assert_eq!(entries[1].parent_id.as_ref().map(|p| p.as_str()), Some("1"));
    }

    #[tokio::test]
    async fn test_load_entries_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"[{"id": "a", "timestamp": "2024-01-01T00:00:00Z", "content": "hi"}]"#,
        )
        .unwrap();

        let entries = load_entries(file.path()).await.unwrap();
        assert_eq!(entries[0].content, "hi");
    }

    #[tokio::test]
    async fn test_load_entries_missing_file() {
        let err = load_entries(Path::new("/nonexistent/entries.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn test_parse_entries_rejects_garbage() {
        assert!(parse_entries("{not json").is_err());
    }
}
