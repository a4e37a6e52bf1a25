// src/services/quality_evaluator.rs
use std::sync::LazyLock;

use regex::Regex;

use super::answer_enhancer::citation_numbers;
use crate::message::{QualityMetrics, SourceDocument};

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(\.\d+)?").unwrap());

const UNCERTAINTY_PHRASES: &[&str] = &[
    "I don't know",
    "I do not know",
    "not sure",
    "uncertain",
    "does not contain information",
];

/// Heuristic reliability assessment of an answer.
pub fn evaluate_answer_quality(answer: &str, sources: &[SourceDocument]) -> QualityMetrics {
    let citation_count = citation_numbers(answer).len();
    let reliability_score = reliability_score(answer, sources.len(), citation_count);

    QualityMetrics {
        reliability_score,
        reliability_grade: reliability_grade(reliability_score).to_string(),
        citation_count,
        answer_length: answer.chars().count(),
        num_sources: sources.len(),
        quality_flags: quality_flags(answer, sources.len(), citation_count),
    }
}

pub fn reliability_score(answer: &str, num_sources: usize, citation_count: usize) -> f64 {
    let mut score = 0.5;

    if num_sources > 0 {
        score += (num_sources as f64 / 5.0).min(1.0) * 0.3;
    }
    if citation_count > 0 {
        score += (citation_count as f64 / 3.0).min(1.0) * 0.2;
    }

    let mut text_quality = 0.0;
    for phrase in UNCERTAINTY_PHRASES {
        if answer.contains(phrase) {
            text_quality -= 0.1;
        }
    }
    if NUMBER_RE.is_match(answer) {
        text_quality += 0.1;
    }
    let len = answer.chars().count();
    if len > 100 && len < 1000 {
        text_quality += 0.1;
    }
    score += f64::clamp(text_quality, -0.2, 0.2);

    score.clamp(0.0, 1.0)
}

pub fn reliability_grade(score: f64) -> &'static str {
    match score {
        s if s >= 0.9 => "very high",
        s if s >= 0.7 => "high",
        s if s >= 0.5 => "medium",
        s if s >= 0.3 => "low",
        _ => "very low",
    }
}

fn quality_flags(answer: &str, num_sources: usize, citation_count: usize) -> Vec<String> {
    let mut flags = Vec::new();

    match num_sources {
        0 => flags.push("no_sources"),
        1 => flags.push("few_sources"),
        _ => {}
    }
    if citation_count == 0 {
        flags.push("no_citations");
    }
    if UNCERTAINTY_PHRASES.iter().any(|p| answer.contains(p)) {
        flags.push("uncertainty_detected");
    }
    let len = answer.chars().count();
    if len < 50 {
        flags.push("answer_too_short");
    } else if len > 1500 {
        flags.push("answer_too_long");
    }

    flags.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Meta;

    fn sources(n: usize) -> Vec<SourceDocument> {
        (0..n)
            .map(|i| SourceDocument { content: format!("chunk {i}"), metadata: Meta::new(), score: 0.5 })
            .collect()
    }

    #[test]
    fn short_unsourced_answer_scores_medium_with_flags() {
        let m = evaluate_answer_quality("No idea.", &[]);
        assert!((m.reliability_score - 0.5).abs() < 1e-9);
        assert_eq!(m.reliability_grade, "medium");
        assert_eq!(m.quality_flags, vec!["no_sources", "no_citations", "answer_too_short"]);
    }

    #[test]
    fn well_sourced_cited_answer_scores_high() {
        let answer = format!("{} It was released in 2015 [1][2][3].", "Rust is a language. ".repeat(6));
        let m = evaluate_answer_quality(&answer, &sources(5));
        // 0.5 + 0.3 + 0.2 + clamp(0.1 + 0.1)
        assert!((m.reliability_score - 1.0).abs() < 1e-9);
        assert_eq!(m.reliability_grade, "very high");
        assert_eq!(m.citation_count, 3);
        assert!(m.quality_flags.is_empty());
    }

    #[test]
    fn uncertainty_lowers_score() {
        let score = reliability_score("I don't know and I'm not sure", 0, 0);
        assert!((score - 0.3).abs() < 1e-9);
        assert_eq!(reliability_grade(score), "low");
        assert_eq!(reliability_grade(0.1), "very low");
    }
}
