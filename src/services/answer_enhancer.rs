// src/services/answer_enhancer.rs
//! Post-processing applied to raw model answers before they are returned.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::message::{Meta, SourceDocument};

static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").unwrap());

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(Key features|Features|Advantages|Disadvantages|Conclusion|Summary):").unwrap()
});

const IMPORTANT_TERMS: &[&str] = &[
    "Vector Store",
    "JSON Schema",
    "OpenAPI",
    "OpenAI",
    "GPT-4",
    "Chroma",
    "Retrieval",
    "RAG",
    "LLM",
    "embedding",
    "async",
    "await",
];

const CONCEPTS: &[(&str, &str)] = &[
    ("API", "Application Programming Interface"),
    ("REST", "Representational State Transfer"),
    ("HTTP", "Hypertext Transfer Protocol"),
    ("JSON", "JavaScript Object Notation"),
    ("OAuth", "Open Authorization"),
    ("RAG", "Retrieval-Augmented Generation"),
    ("LLM", "Large Language Model"),
    ("NLP", "Natural Language Processing"),
];

fn word_pattern(word: &str) -> Regex {
    Regex::new(&format!(r"\b{}\b", regex::escape(word))).unwrap()
}

static TERM_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| IMPORTANT_TERMS.iter().map(|term| word_pattern(term)).collect());

static CONCEPT_PATTERNS: LazyLock<Vec<(Regex, &'static str, &'static str)>> = LazyLock::new(|| {
    CONCEPTS
        .iter()
        .map(|&(concept, full_form)| (word_pattern(concept), concept, full_form))
        .collect()
});

pub fn enhance_answer(answer: &str, sources: &[SourceDocument]) -> String {
    let enhanced = add_citations(answer, sources);
    let enhanced = apply_markdown(&enhanced);
    highlight_key_concepts(&enhanced)
}

pub fn has_citations(text: &str) -> bool {
    CITATION_RE.is_match(text)
}

/// Citation numbers (`[n]`) in order of appearance.
pub fn citation_numbers(text: &str) -> Vec<usize> {
    CITATION_RE
        .captures_iter(text)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

/// Mark sentences lifted verbatim from a source with `[n]` and append a
/// reference list. Answers that already cite are left alone.
pub fn add_citations(answer: &str, sources: &[SourceDocument]) -> String {
    if has_citations(answer) {
        return answer.to_string();
    }

    let mut enhanced = answer.to_string();
    for (i, source) in sources.iter().enumerate() {
        let citation = format!(" [{}]", i + 1);
        for sentence in source.content.split(". ") {
            if sentence.chars().count() <= 20 || !answer.contains(sentence) {
                continue;
            }
            let cited = format!("{sentence}{citation}");
            if !enhanced.contains(&cited) {
                enhanced = enhanced.replace(sentence, &cited);
            }
        }
    }

    if has_citations(&enhanced) {
        enhanced.push_str("\n\n**References:**\n");
        for (i, source) in sources.iter().enumerate() {
            let name = source_file_name(&source.metadata).unwrap_or_else(|| format!("Document {}", i + 1));
            match page_label(&source.metadata) {
                Some(page) => enhanced.push_str(&format!("[{}] {} p.{}\n", i + 1, name, page)),
                None => enhanced.push_str(&format!("[{}] {}\n", i + 1, name)),
            }
        }
    }
    enhanced
}

/// Promote known section labels to headings and bold important terms.
/// Fenced code blocks are left untouched.
pub fn apply_markdown(text: &str) -> String {
    let mut in_fence = false;
    let lines: Vec<String> = text
        .split('\n')
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                return line.to_string();
            }
            if in_fence {
                return line.to_string();
            }
            let line = TERM_PATTERNS
                .iter()
                .fold(line.to_string(), |acc, term| bold_term(&acc, term));
            if SECTION_RE.is_match(&line) {
                format!("\n### {line}")
            } else {
                line
            }
        })
        .collect();
    lines.join("\n")
}

fn bold_term(line: &str, re: &Regex) -> String {
    let mut out = String::with_capacity(line.len());
    let mut last = 0;
    for m in re.find_iter(line) {
        let already_bold =
            line[..m.start()].ends_with("**") || line[m.end()..].starts_with("**");
        out.push_str(&line[last..m.start()]);
        if already_bold {
            out.push_str(m.as_str());
        } else {
            out.push_str("**");
            out.push_str(m.as_str());
            out.push_str("**");
        }
        last = m.end();
    }
    out.push_str(&line[last..]);
    out
}

/// Spell out the first occurrence of well-known acronyms.
pub fn highlight_key_concepts(text: &str) -> String {
    if text.matches("**").count() > 10 {
        return text.to_string();
    }

    let mut text = text.to_string();
    for (re, concept, full_form) in CONCEPT_PATTERNS.iter() {
        if text.contains(full_form) {
            continue;
        }
        if let Some(range) = re.find(&text).map(|m| m.range()) {
            text.replace_range(range, &format!("{concept} ({full_form})"));
        }
    }
    text
}

/// Display name of a chunk's file: `filename`, else basename of `source`.
pub fn source_file_name(metadata: &Meta) -> Option<String> {
    if let Some(name) = metadata.get("filename").and_then(Value::as_str) {
        return Some(name.to_string());
    }
    metadata
        .get("source")
        .and_then(Value::as_str)
        .and_then(|s| Path::new(s).file_name())
        .map(|n| n.to_string_lossy().into_owned())
}

fn page_label(metadata: &Meta) -> Option<String> {
    match metadata.get("page")? {
        Value::Number(n) if n.as_u64() != Some(0) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
