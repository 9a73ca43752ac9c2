//! Retrieval results and output formats.

use serde::{Deserialize, Serialize};

use super::document::{Metadata, MetadataValue, keys};

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
    /// Documentation-friendly Markdown format
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// A raw hit returned by a vector store. Higher scores are more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredVector {
    pub key: String,
    pub score: f32,
    pub metadata: Metadata,
}

/// A ranked retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub key: String,
    pub score: f32,
    pub content: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    /// Remaining payload, e.g. page or heading.
    pub metadata: Metadata,
}

impl From<ScoredVector> for QueryResult {
    fn from(hit: ScoredVector) -> Self {
        let mut metadata = hit.metadata;
        let content = take_text(&mut metadata, keys::CONTENT);
        let source = take_text(&mut metadata, keys::SOURCE);
        let chunk_index = metadata
            .remove(keys::CHUNK_INDEX)
            .and_then(|v| v.as_i64())
            .and_then(|n| u32::try_from(n).ok());

        Self {
            key: hit.key,
            score: hit.score,
            content,
            source,
            chunk_index,
            metadata,
        }
    }
}

impl QueryResult {
    /// `source` with the most specific location hint available.
    pub fn location(&self) -> String {
        let get = |key: &str| self.metadata.get(key).and_then(MetadataValue::as_i64);

        if let Some(page) = get(keys::PAGE) {
            match get(keys::PAGE_END) {
                Some(end) if end != page => format!("{} (pages {}-{})", self.source, page, end),
                _ => format!("{} (page {})", self.source, page),
            }
        } else if let (Some(start), Some(end)) = (get(keys::LINE_START), get(keys::LINE_END)) {
            format!("{}:{}-{}", self.source, start, end)
        } else {
            self.source.clone()
        }
    }
}

fn take_text(metadata: &mut Metadata, key: &str) -> String {
    match metadata.remove(key) {
        Some(MetadataValue::Text(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
