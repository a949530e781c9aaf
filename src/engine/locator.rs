use std::path::{Path, PathBuf};
use thiserror::Error;

/// Finds the include directory of an installed dependency by looking for a
/// marker file in the candidate directories an outer resolver handed us.
#[derive(Debug, Default)]
pub struct Locator;

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("{marker} not found in any candidate include directory ({})", format_searched(.searched))]
    MarkerNotFound {
        marker: String,
        searched: Vec<PathBuf>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn format_searched(searched: &[PathBuf]) -> String {
    searched
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Locator {
    pub fn new() -> Self {
        Locator
    }

    /// Candidates are probed in the given order; the first directory whose
    /// listing contains the marker wins. Unreadable candidates are skipped.
    pub async fn locate(&self, candidates: &[PathBuf], marker: &str) -> Result<PathBuf, LocatorError> {
        for dir in candidates {
            if self.contains_marker(dir, marker).await? {
                return Ok(dir.clone());
            }
        }

        Err(LocatorError::MarkerNotFound {
            marker: marker.to_string(),
            searched: candidates.to_vec(),
        })
    }

    async fn contains_marker(&self, dir: &Path, marker: &str) -> Result<bool, LocatorError> {
        let mut listing = match tokio::fs::read_dir(dir).await {
            Ok(listing) => listing,
            Err(_) => return Ok(false),
        };

        while let Some(entry) = listing.next_entry().await? {
            if entry.file_name() == marker {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_first_candidate_with_marker() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        tokio::fs::write(second.path().join("sip.h"), b"")
            .await
            .unwrap();

        let candidates = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let found = Locator::new().locate(&candidates, "sip.h").await.unwrap();

        assert_eq!(found, second.path());
    }

    #[tokio::test]
    async fn earlier_candidate_shadows_later_one() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        tokio::fs::write(first.path().join("sip.h"), b"").await.unwrap();
        tokio::fs::write(second.path().join("sip.h"), b"").await.unwrap();

        let candidates = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let found = Locator::new().locate(&candidates, "sip.h").await.unwrap();

        assert_eq!(found, first.path());
    }

    #[tokio::test]
    async fn missing_marker_is_fatal() {
        let only = tempfile::tempdir().unwrap();
        let missing = only.path().join("not-there");

        let candidates = vec![only.path().to_path_buf(), missing];
        let err = Locator::new()
            .locate(&candidates, "sip.h")
            .await
            .unwrap_err();

        match err {
            LocatorError::MarkerNotFound { marker, searched } => {
                assert_eq!(marker, "sip.h");
                assert_eq!(searched.len(), 2);
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
