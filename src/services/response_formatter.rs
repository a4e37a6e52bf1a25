// src/services/response_formatter.rs
use std::cmp::Ordering;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use super::answer_enhancer::{citation_numbers, enhance_answer, source_file_name};
use super::quality_evaluator::evaluate_answer_quality;
use super::rag::RagResult;
use crate::message::{ChatAnswer, Citation, FormattedSource, Meta, SourceDocument};

const CONTEXT_CHARS: usize = 300;
const SNIPPET_CHARS: usize = 100;

/// Turn a pipeline result into the payload returned by the chat endpoints.
pub fn format_rag_response(result: RagResult, enhance: bool, evaluate_quality: bool) -> ChatAnswer {
    let sources = format_sources_for_display(&result.sources);

    let answer = if enhance {
        enhance_answer(&result.answer, &result.sources)
    } else {
        result.answer
    };

    let citations = extract_citations(&answer, &sources);
    let quality_metrics = evaluate_quality.then(|| evaluate_answer_quality(&answer, &result.sources));

    ChatAnswer {
        answer,
        sources,
        processing_time: result.processing_time,
        prompt_tokens: result.prompt_tokens,
        completion_tokens: result.completion_tokens,
        citations,
        quality_metrics,
        timestamp: Utc::now(),
    }
}

/// Resolve `[n]` markers against the sources' reference ids. Each source is
/// cited at most once.
pub fn extract_citations(answer: &str, sources: &[FormattedSource]) -> Vec<Citation> {
    let mut seen = Vec::new();
    let mut citations = Vec::new();

    for n in citation_numbers(answer) {
        if seen.contains(&n) {
            continue;
        }
        seen.push(n);
        let Some(source) = sources.iter().find(|s| s.reference_id == n) else {
            tracing::debug!(reference = n, "citation without matching source");
            continue;
        };
        citations.push(Citation {
            text: source.snippet.clone(),
            document_id: source
                .metadata
                .get("document_id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("doc_{}", n - 1)),
            document_name: Some(source.display_name.clone()),
            page: source.metadata.get("page").cloned(),
        });
    }
    citations
}

pub fn format_sources_for_display(sources: &[SourceDocument]) -> Vec<FormattedSource> {
    let mut formatted: Vec<FormattedSource> = sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            let context = ellipsize(&source.content, CONTEXT_CHARS);
            let display_metadata = display_metadata(&source.metadata, source.score);
            let display_name = display_metadata
                .get("filename")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Document {}", i + 1));
            let snippet = match context.char_indices().nth(SNIPPET_CHARS) {
                Some((cut, _)) => format!("{}...", &context[..cut]),
                None => context.clone(),
            };

            FormattedSource {
                reference_id: i + 1,
                content: source.content.clone(),
                context,
                metadata: source.metadata.clone(),
                display_metadata,
                score: source.score,
                snippet,
                display_name,
            }
        })
        .collect();

    formatted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    formatted
}

fn display_metadata(metadata: &Meta, score: f32) -> Meta {
    let mut display = Meta::new();

    if metadata.contains_key("source") {
        if let Some(name) = source_file_name(metadata) {
            display.insert("filename".into(), Value::String(name));
        }
    }
    for key in ["document_id", "page", "author"] {
        if let Some(v) = metadata.get(key) {
            display.insert(key.into(), v.clone());
        }
    }
    if let Some(created) = metadata.get("created_at") {
        let value = match created.as_str() {
            Some(s) => Value::String(format_date(s).unwrap_or_else(|| s.to_string())),
            None => created.clone(),
        };
        display.insert("created".into(), value);
    }
    display.insert("relevance".into(), Value::String(format!("{:.1}%", score * 100.0)));
    display
}

fn format_date(raw: &str) -> Option<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw.replace('Z', "+00:00")) {
        return Some(dt.format("%Y-%m-%d").to_string());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// Cut to `max` characters, the last three replaced by an ellipsis.
fn ellipsize(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max - 3).collect();
    format!("{kept}...")
}
