use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{IngestSummary, OutputFormat, QueryResult};
use crate::services::RagStatus;

/// Characters of chunk content shown per hit in text output.
const PREVIEW_CHARS: usize = 200;

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults<'_>) -> String;
    fn format_status(&self, status: &RagStatus) -> String;
    fn format_ingest_summary(&self, summary: &IngestSummary) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Serialize)]
pub struct SearchResults<'a> {
    pub query: &'a str,
    pub results: &'a [QueryResult],
    pub duration_ms: u64,
}

impl SearchResults<'_> {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

fn preview(content: &str) -> String {
    let preview: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().count() > PREVIEW_CHARS {
        format!("{}...", preview)
    } else {
        preview
    }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults<'_>) -> String {
        if results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "Search results for: \"{}\"", results.query).unwrap();
        writeln!(
            output,
            "Found {} results in {}ms\n",
            results.results.len(),
            results.duration_ms
        )
        .unwrap();

        for (i, result) in results.results.iter().enumerate() {
            writeln!(output, "{}. [Score: {:.3}]", i + 1, result.score).unwrap();
            writeln!(output, "   Location: {}", result.location()).unwrap();
            writeln!(output, "   ---").unwrap();
            for line in preview(&result.content).lines() {
                writeln!(output, "   {}", line).unwrap();
            }
            writeln!(output).unwrap();
        }

        output
    }

    fn format_status(&self, status: &RagStatus) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();
        let provider_status = if status.provider_healthy {
            "[READY]"
        } else {
            "[UNREACHABLE]"
        };
        writeln!(
            output,
            "Embedding:     {} {} ({} dims)",
            provider_status, status.provider, status.dimension
        )
        .unwrap();

        let store_status = if status.healthy {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        writeln!(output, "Vector Store:  {} {}", store_status, status.store).unwrap();
        writeln!(output, "  Index:       {} ({})", status.index, status.metric).unwrap();
        match status.points_count {
            Some(points) => writeln!(output, "  Points:      {}", points).unwrap(),
            None => writeln!(output, "  Points:      (index not created)").unwrap(),
        }
        output
    }

    fn format_ingest_summary(&self, summary: &IngestSummary) -> String {
        let mut output = String::new();
        writeln!(output, "Fill complete").unwrap();
        writeln!(output, "  Documents found:   {}", summary.documents_found).unwrap();
        writeln!(output, "  Documents skipped: {}", summary.documents_skipped).unwrap();
        writeln!(output, "  Documents indexed: {}", summary.documents_succeeded()).unwrap();
        writeln!(output, "  Documents failed:  {}", summary.documents_failed()).unwrap();
        writeln!(
            output,
            "  Chunks indexed:    {}/{}",
            summary.chunks_indexed(),
            summary.chunks_produced()
        )
        .unwrap();
        writeln!(output, "  Duration:          {}ms", summary.duration_ms).unwrap();
        if summary.cancelled {
            writeln!(
                output,
                "  Cancelled before completion ({} chunks not embedded)",
                summary.chunks_cancelled()
            )
            .unwrap();
        }

        let failures: Vec<_> = summary.failures().collect();
        if !failures.is_empty() {
            writeln!(output, "\nFailures:").unwrap();
            for (source, failure) in failures {
                match failure.chunk_index {
                    Some(index) => writeln!(
                        output,
                        "  [{}] {} chunk {}: {}",
                        failure.kind, source, index, failure.reason
                    )
                    .unwrap(),
                    None => writeln!(output, "  [{}] {}: {}", failure.kind, source, failure.reason)
                        .unwrap(),
                }
            }
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| serde_json::json!({"error": e.to_string()}).to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults<'_>) -> String {
        self.render(results)
    }

    fn format_status(&self, status: &RagStatus) -> String {
        self.render(status)
    }

    fn format_ingest_summary(&self, summary: &IngestSummary) -> String {
        let json = serde_json::json!({
            "documents_found": summary.documents_found,
            "documents_skipped": summary.documents_skipped,
            "documents_succeeded": summary.documents_succeeded(),
            "documents_failed": summary.documents_failed(),
            "chunks_produced": summary.chunks_produced(),
            "chunks_indexed": summary.chunks_indexed(),
            "chunks_cancelled": summary.chunks_cancelled(),
            "cancelled": summary.cancelled,
            "duration_ms": summary.duration_ms,
            "documents": summary.documents,
        });
        self.render(&json)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_search_results(&self, results: &SearchResults<'_>) -> String {
        if results.is_empty() {
            return format!("## No results found\n\nQuery: `{}`\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "## Search Results\n").unwrap();
        writeln!(output, "**Query:** `{}`\n", results.query).unwrap();
        writeln!(
            output,
            "Found {} results in {}ms\n",
            results.results.len(),
            results.duration_ms
        )
        .unwrap();

        for (i, result) in results.results.iter().enumerate() {
            writeln!(output, "### {}. Score: {:.3}\n", i + 1, result.score).unwrap();
            writeln!(output, "**Location:** `{}`\n", result.location()).unwrap();
            writeln!(output, "```").unwrap();
            writeln!(output, "{}", result.content.trim_end()).unwrap();
            writeln!(output, "```\n").unwrap();
        }

        output
    }

    fn format_status(&self, status: &RagStatus) -> String {
        let mut output = String::new();
        writeln!(output, "## Status\n").unwrap();
        let healthy = if status.healthy { "✅" } else { "❌" };
        let provider_healthy = if status.provider_healthy { "✅" } else { "❌" };
        writeln!(output, "| Component | Value |").unwrap();
        writeln!(output, "|---|---|").unwrap();
        writeln!(
            output,
            "| Embedding | {} {} ({} dims) |",
            provider_healthy, status.provider, status.dimension
        )
        .unwrap();
        writeln!(output, "| Vector store | {} {} |", healthy, status.store).unwrap();
        writeln!(output, "| Index | `{}` ({}) |", status.index, status.metric).unwrap();
        let points = status
            .points_count
            .map_or_else(|| "not created".to_string(), |p| p.to_string());
        writeln!(output, "| Points | {} |", points).unwrap();
        output
    }

    fn format_ingest_summary(&self, summary: &IngestSummary) -> String {
        let mut output = String::new();
        writeln!(output, "## Fill Summary\n").unwrap();
        writeln!(output, "| Metric | Count |").unwrap();
        writeln!(output, "|---|---|").unwrap();
        writeln!(output, "| Documents found | {} |", summary.documents_found).unwrap();
        writeln!(output, "| Documents skipped | {} |", summary.documents_skipped).unwrap();
        writeln!(output, "| Documents indexed | {} |", summary.documents_succeeded()).unwrap();
        writeln!(output, "| Documents failed | {} |", summary.documents_failed()).unwrap();
        writeln!(output, "| Chunks indexed | {} |", summary.chunks_indexed()).unwrap();
        writeln!(output, "| Duration | {}ms |", summary.duration_ms).unwrap();

        let failures: Vec<_> = summary.failures().collect();
        if !failures.is_empty() {
            writeln!(output, "\n### Failures\n").unwrap();
            for (source, failure) in failures {
                writeln!(output, "- **{}** `{}`: {}", failure.kind, source, failure.reason).unwrap();
            }
        }
        if summary.cancelled {
            writeln!(
                output,
                "\n> Cancelled before completion ({} chunks not embedded)",
                summary.chunks_cancelled()
            )
            .unwrap();
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DistanceMetric, DocumentReport, FailureKind, Metadata, keys};

    fn result() -> QueryResult {
        let mut metadata = Metadata::new();
        metadata.insert(keys::LINE_START.into(), 3i64.into());
        metadata.insert(keys::LINE_END.into(), 7i64.into());
        QueryResult {
            key: "k".to_string(),
            score: 0.875,
            content: "Install with cargo.".to_string(),
            source: "/docs/guide.md".to_string(),
            chunk_index: Some(1),
            metadata,
        }
    }

    #[test]
    fn test_text_search_results() {
        let hits = vec![result()];
        let results = SearchResults {
            query: "install",
            results: &hits,
            duration_ms: 12,
        };
        let output = TextFormatter.format_search_results(&results);
        assert!(output.contains("[Score: 0.875]"));
        assert!(output.contains("/docs/guide.md:3-7"));
        assert!(output.contains("Install with cargo."));
    }

    #[test]
    fn test_empty_results() {
        let results = SearchResults {
            query: "nothing",
            results: &[],
            duration_ms: 1,
        };
        assert_eq!(
            TextFormatter.format_search_results(&results),
            "No results found for: nothing\n"
        );
    }

    #[test]
    fn test_json_search_results() {
        let hits = vec![result()];
        let results = SearchResults {
            query: "install",
            results: &hits,
            duration_ms: 12,
        };
        let json: serde_json::Value =
            serde_json::from_str(&JsonFormatter::new(false).format_search_results(&results))
                .unwrap();
        assert_eq!(json["query"], "install");
        assert_eq!(json["results"][0]["source"], "/docs/guide.md");
        assert_eq!(json["results"][0]["chunk_index"], 1);
    }

    #[test]
    fn test_status_formats() {
        let status = RagStatus {
            provider: "openai".to_string(),
            store: "qdrant".to_string(),
            index: "rags-index".to_string(),
            dimension: 3072,
            metric: DistanceMetric::Cosine,
            healthy: true,
            provider_healthy: false,
            points_count: Some(42),
        };
        let text = TextFormatter.format_status(&status);
        assert!(text.contains("Points:      42"));
        assert!(text.contains("[UNREACHABLE] openai"));
        let json: serde_json::Value =
            serde_json::from_str(&JsonFormatter::new(true).format_status(&status)).unwrap();
        assert_eq!(json["metric"], "cosine");
        assert!(MarkdownFormatter.format_status(&status).contains("`rags-index`"));
    }

    #[test]
    fn test_ingest_summary_lists_failures() {
        let mut report = DocumentReport::new("/docs/bad.txt");
        report.fail(FailureKind::Content, None, "not valid UTF-8");
        let summary = IngestSummary {
            documents_found: 1,
            documents: vec![report],
            ..Default::default()
        };

        let text = TextFormatter.format_ingest_summary(&summary);
        assert!(text.contains("Documents failed:  1"));
        assert!(text.contains("[content] /docs/bad.txt: not valid UTF-8"));

        let json: serde_json::Value =
            serde_json::from_str(&JsonFormatter::new(false).format_ingest_summary(&summary))
                .unwrap();
        assert_eq!(json["documents_failed"], 1);
        assert_eq!(json["documents"][0]["failures"][0]["kind"], "content");
    }
}
