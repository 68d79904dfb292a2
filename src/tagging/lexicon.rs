use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::{Tagger, TokenPrediction, TokenTask};
use crate::tagging::bio::OUTSIDE;

#[derive(Debug, Default, Deserialize)]
struct LexiconFile {
    #[serde(default)]
    cover: BTreeMap<String, String>,
    #[serde(default)]
    notes: BTreeMap<String, String>,
    #[serde(default)]
    cells: BTreeMap<String, String>,
}

/// A dictionary-backed tagger: known phrases get BIO labels, known cell values get their label.
///
/// Used offline and in tests where no model server is around.
#[derive(Debug, Default, Clone)]
pub struct LexiconTagger {
    cover: Vec<(Vec<String>, String)>,
    notes: Vec<(Vec<String>, String)>,
    cells: HashMap<String, String>,
}

fn insert_phrase(phrases: &mut Vec<(Vec<String>, String)>, phrase: &str, label: &str) {
    let words: Vec<String> = phrase.split_whitespace().map(String::from).collect();
    if words.is_empty() {
        return;
    }
    phrases.push((words, label.to_string()));
    // Longest phrases are tried first.
    phrases.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
}

impl LexiconTagger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `{"cover": {phrase: label}, "notes": {...}, "cells": {value: label}}`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lexicon {}", path.display()))?;
        let file: LexiconFile = serde_json::from_str(&content)?;

        let mut tagger = Self::new();
        for (phrase, label) in &file.cover {
            insert_phrase(&mut tagger.cover, phrase, label);
        }
        for (phrase, label) in &file.notes {
            insert_phrase(&mut tagger.notes, phrase, label);
        }
        tagger.cells = file.cells.into_iter().collect();
        Ok(tagger)
    }

    pub fn with_phrase(mut self, task: TokenTask, phrase: &str, label: &str) -> Self {
        match task {
            TokenTask::Cover => insert_phrase(&mut self.cover, phrase, label),
            TokenTask::Notes => insert_phrase(&mut self.notes, phrase, label),
        }
        self
    }

    pub fn with_cell(mut self, value: &str, label: &str) -> Self {
        self.cells.insert(value.to_string(), label.to_string());
        self
    }

    fn label_unit(phrases: &[(Vec<String>, String)], tokens: &[String]) -> Vec<String> {
        let mut labels = vec![OUTSIDE.to_string(); tokens.len()];
        let mut i = 0;
        while i < tokens.len() {
            let hit = phrases
                .iter()
                .find(|(words, _)| tokens[i..].starts_with(words));
            match hit {
                Some((words, label)) => {
                    labels[i] = format!("B-{}", label);
                    for slot in labels.iter_mut().skip(i + 1).take(words.len() - 1) {
                        *slot = format!("I-{}", label);
                    }
                    i += words.len();
                }
                None => i += 1,
            }
        }
        labels
    }
}

#[async_trait]
impl Tagger for LexiconTagger {
    async fn tag_tokens(&self, task: TokenTask, units: &[Vec<String>]) -> Result<Vec<TokenPrediction>> {
        let phrases = match task {
            TokenTask::Cover => &self.cover,
            TokenTask::Notes => &self.notes,
        };
        Ok(units
            .iter()
            .map(|tokens| TokenPrediction {
                text: tokens.join(" "),
                labels: Self::label_unit(phrases, tokens),
            })
            .collect())
    }

    /// Looks the cell value (last word before `==`) up; unknown values keep the placeholder label.
    async fn tag_cells(&self, composites: &[String]) -> Result<Vec<String>> {
        Ok(composites
            .iter()
            .map(|composite| {
                let (key, placeholder) = composite.rsplit_once("==").unwrap_or((composite.as_str(), ""));
                let value = key.split_whitespace().last().unwrap_or_default();
                match self.cells.get(value) {
                    Some(label) => label.clone(),
                    None => {
                        debug!("No lexicon entry for cell value '{}'", value);
                        placeholder.to_string()
                    }
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_tag_tokens_labels_phrases() {
        let tagger = LexiconTagger::new()
            .with_phrase(TokenTask::Cover, "10-Q", "DocumentType")
            .with_phrase(TokenTask::Cover, "Acme Holdings", "EntityRegistrantName");
        let predictions = tagger
            .tag_tokens(TokenTask::Cover, &[tokens(&["Acme", "Holdings", "files", "10-Q"])])
            .await
            .unwrap();
        assert_eq!(predictions[0].text, "Acme Holdings files 10-Q");
        assert_eq!(
            predictions[0].labels,
            vec!["B-EntityRegistrantName", "I-EntityRegistrantName", "O", "B-DocumentType"]
        );

        let notes = tagger
            .tag_tokens(TokenTask::Notes, &[tokens(&["10-Q"])])
            .await
            .unwrap();
        assert_eq!(notes[0].labels, vec!["O"]);
    }

    #[tokio::test]
    async fn test_tag_cells_uses_value() {
        let tagger = LexiconTagger::new().with_cell("1234", "Cash");
        let labels = tagger
            .tag_cells(&[
                "balance sheet Cash June 30 2023 1234==Others".to_string(),
                "balance sheet Debt June 30 2023 99==Others".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(labels, vec!["Cash", "Others"]);
    }

    #[test]
    fn test_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("lexicon.json");
        std::fs::write(&path, r#"{"cover": {"10-Q": "DocumentType"}, "cells": {"1234": "Cash"}}"#).unwrap();
        let tagger = LexiconTagger::from_file(&path).unwrap();
        assert_eq!(tagger.cover.len(), 1);
        assert!(tagger.notes.is_empty());
        assert_eq!(tagger.cells.get("1234").map(String::as_str), Some("Cash"));
    }
}
