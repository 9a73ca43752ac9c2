//! Ingest run reporting.

use serde::{Deserialize, Serialize};

/// What went wrong for a document or one of its chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Unreadable or corrupt document.
    Content,
    /// Embedding provider failure.
    Provider,
    /// Vector store write failure.
    Store,
    /// Provider output disagreed with the store's dimension.
    Configuration,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Content => write!(f, "content"),
            FailureKind::Provider => write!(f, "provider"),
            FailureKind::Store => write!(f, "store"),
            FailureKind::Configuration => write!(f, "configuration"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    pub reason: String,
}

/// Outcome of one document in a fill run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub source: String,
    pub chunks: usize,
    pub indexed: usize,
    pub characters: usize,
    /// Chunks left unembedded because the run was cancelled.
    #[serde(default)]
    pub cancelled: usize,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub failures: Vec<Failure>,
}

impl DocumentReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Every chunk was indexed and nothing failed.
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty() && self.cancelled == 0 && self.indexed == self.chunks
    }

    pub fn fail(&mut self, kind: FailureKind, chunk_index: Option<u32>, reason: impl ToString) {
        self.failures.push(Failure {
            kind,
            chunk_index,
            reason: reason.to_string(),
        });
    }
}

/// Aggregate result of `fill_rag`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub documents_found: usize,
    pub documents_skipped: usize,
    pub documents: Vec<DocumentReport>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl IngestSummary {
    pub fn documents_processed(&self) -> usize {
        self.documents.len()
    }

    pub fn documents_succeeded(&self) -> usize {
        self.documents.iter().filter(|d| d.succeeded()).count()
    }

    pub fn documents_failed(&self) -> usize {
        self.documents_processed() - self.documents_succeeded()
    }

    pub fn chunks_produced(&self) -> usize {
        self.documents.iter().map(|d| d.chunks).sum()
    }

    pub fn chunks_indexed(&self) -> usize {
        self.documents.iter().map(|d| d.indexed).sum()
    }

    pub fn chunks_cancelled(&self) -> usize {
        self.documents.iter().map(|d| d.cancelled).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &Failure)> {
        self.documents
            .iter()
            .flat_map(|d| d.failures.iter().map(move |f| (d.source.as_str(), f)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut ok = DocumentReport::new("a.md");
        ok.chunks = 3;
        ok.indexed = 3;

        let mut partial = DocumentReport::new("b.md");
        partial.chunks = 2;
        partial.indexed = 1;
        partial.fail(FailureKind::Provider, Some(1), "timeout");

        let summary = IngestSummary {
            documents_found: 3,
            documents_skipped: 1,
            documents: vec![ok, partial],
            ..Default::default()
        };

        assert_eq!(summary.documents_processed(), 2);
        assert_eq!(summary.documents_succeeded(), 1);
        assert_eq!(summary.documents_failed(), 1);
        assert_eq!(summary.chunks_produced(), 5);
        assert_eq!(summary.chunks_indexed(), 4);
        assert_eq!(summary.failures().count(), 1);
    }

    #[test]
    fn test_cancelled_chunks_fail_the_document() {
        let mut report = DocumentReport::new("c.md");
        report.chunks = 5;
        report.indexed = 1;
        report.cancelled = 4;
        assert!(!report.succeeded());

        let mut unaccounted = DocumentReport::new("d.md");
        unaccounted.chunks = 2;
        unaccounted.indexed = 1;
        assert!(!unaccounted.succeeded());

        let summary = IngestSummary {
            documents: vec![report, unaccounted],
            cancelled: true,
            ..Default::default()
        };
        assert_eq!(summary.documents_failed(), 2);
        assert_eq!(summary.chunks_cancelled(), 4);
    }
}
