use log::warn;
use std::collections::HashSet;

use super::TokenPrediction;
use crate::core::types::{TagAssignment, TextFragment};

pub const OUTSIDE: &str = "O";

/// Drops the `B-`/`I-` prefix of a token label.
pub fn strip_bio(label: &str) -> &str {
    label
        .strip_prefix("B-")
        .or_else(|| label.strip_prefix("I-"))
        .unwrap_or(label)
}

/// Groups labelled words into `(chunk text, label)` spans.
///
/// `B-X` opens a chunk, `I-X` and a bare `X` extend an open chunk of the same label
/// (or open one), `O` closes whatever is open.
pub fn decode_chunks(words: &[&str], labels: &[String]) -> Vec<(String, String)> {
    let mut chunks: Vec<(String, String)> = Vec::new();
    let mut open = false;

    for (word, label) in words.iter().zip(labels) {
        if label == OUTSIDE {
            open = false;
            continue;
        }
        let starts = label.starts_with("B-");
        let name = strip_bio(label);
        let extends = open && !starts && chunks.last().map_or(false, |(_, current)| current == name);
        match chunks.last_mut() {
            Some((text, _)) if extends => {
                text.push(' ');
                text.push_str(word);
            }
            _ => {
                chunks.push((word.to_string(), name.to_string()));
                open = true;
            }
        }
    }
    chunks
}

fn aligned_words(predictions: &[TokenPrediction]) -> (Vec<&str>, Vec<String>) {
    let mut words = Vec::new();
    let mut labels = Vec::new();
    for prediction in predictions {
        let unit: Vec<&str> = prediction.text.split_whitespace().collect();
        if unit.is_empty() || unit.len() != prediction.labels.len() {
            warn!(
                "Dropping unit with {} words and {} labels: {}",
                unit.len(),
                prediction.labels.len(),
                prediction.text
            );
            continue;
        }
        words.extend(unit);
        labels.extend(prediction.labels.iter().cloned());
    }
    (words, labels)
}

/// Cover page predictions to assignments.
///
/// A chunk survives when it is longer than one character and occurs in a unit that
/// is not part of a filer-status checklist; each `(text, label)` pair is kept once.
pub fn cover_assignments(units: &[TextFragment], predictions: &[TokenPrediction]) -> Vec<TagAssignment> {
    let (words, labels) = aligned_words(predictions);
    let chunks = decode_chunks(&words, &labels);

    let mut seen = HashSet::new();
    let mut assignments = Vec::new();
    for unit in units {
        let text = unit.joined();
        if text.to_lowercase().contains("filer") {
            continue;
        }
        for (chunk, label) in &chunks {
            if chunk.chars().count() > 1 && text.contains(chunk.as_str()) && seen.insert((chunk, label)) {
                assignments.push(TagAssignment::new(chunk.clone(), label.clone()));
            }
        }
    }
    assignments
}

/// Notes predictions to assignments: every labelled word on its own, units labelled
/// entirely `O` skipped.
pub fn notes_assignments(predictions: &[TokenPrediction]) -> Vec<TagAssignment> {
    let mut assignments = Vec::new();
    for prediction in predictions {
        if prediction.labels.iter().all(|l| l == OUTSIDE) {
            continue;
        }
        for (word, label) in prediction.text.split_whitespace().zip(&prediction.labels) {
            if label != OUTSIDE {
                assignments.push(TagAssignment::new(word, strip_bio(label)));
            }
        }
    }
    assignments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SourceKind;

    fn labels(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|l| l.to_string()).collect()
    }

    fn unit(tokens: &[&str]) -> TextFragment {
        TextFragment {
            raw_text: tokens.join(" "),
            cleaned_tokens: tokens.iter().map(|t| t.to_string()).collect(),
            source_kind: SourceKind::Span,
        }
    }

    #[test]
    fn test_decode_chunks() {
        let words = ["Acme", "Holdings", "Inc", "files", "10-Q"];
        let chunks = decode_chunks(
            &words,
            &labels(&["B-EntityRegistrantName", "I-EntityRegistrantName", "I-EntityRegistrantName", "O", "DocumentType"]),
        );
        assert_eq!(
            chunks,
            vec![
                ("Acme Holdings Inc".to_string(), "EntityRegistrantName".to_string()),
                ("10-Q".to_string(), "DocumentType".to_string()),
            ]
        );
    }

    #[test]
    fn test_begin_splits_adjacent_chunks() {
        let chunks = decode_chunks(&["2023", "2022"], &labels(&["B-Period", "B-Period"]));
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_cover_assignments() {
        let units = vec![
            unit(&["Document", "Type"]),
            unit(&["10-Q"]),
            unit(&["Large", "accelerated", "filer", "Yes"]),
        ];
        let predictions = vec![
            TokenPrediction { text: "Document Type".into(), labels: labels(&["O", "O"]) },
            TokenPrediction { text: "10-Q".into(), labels: labels(&["B-DocumentType"]) },
            TokenPrediction { text: "Large accelerated filer Yes".into(), labels: labels(&["O", "O", "O", "B-FilerStatus"]) },
            TokenPrediction { text: "misaligned unit".into(), labels: labels(&["B-X"]) },
        ];
        assert_eq!(
            cover_assignments(&units, &predictions),
            vec![TagAssignment::new("10-Q", "DocumentType")]
        );
    }

    #[test]
    fn test_notes_assignments() {
        let predictions = vec![
            TokenPrediction { text: "Revenue was 5,000".into(), labels: labels(&["O", "O", "B-Revenues"]) },
            TokenPrediction { text: "Nothing here".into(), labels: labels(&["O", "O"]) },
        ];
        assert_eq!(
            notes_assignments(&predictions),
            vec![TagAssignment::new("5,000", "Revenues")]
        );
    }
}
