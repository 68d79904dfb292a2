use log::debug;
use scraper::ElementRef;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use super::dom::{
    element_text, has_descendant, innermost_named, is_named, normalize_space, outermost_named,
    text_outside_tables,
};
use crate::core::types::{SourceKind, TextFragment};

// Abbreviations that end with a period without ending the sentence.
const ABBREVIATIONS: &[&str] = &[
    "inc", "corp", "co", "ltd", "llc", "lp", "plc", "no", "nos", "mr", "mrs", "ms", "dr", "jr",
    "sr", "st", "ave", "vs", "etc", "approx", "dept", "est", "fig", "jan", "feb", "mar", "apr",
    "jun", "jul", "aug", "sep", "sept", "oct", "nov", "dec",
];

/// How a container's text is read, decided once from its markup shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerShape {
    /// Spans without tables: all text, sentence by sentence.
    Prose,
    /// Table rows: non-empty cells joined per row.
    MiniTable,
    /// Each paragraph on its own.
    ParagraphList,
    /// Plain text read straight off the container.
    Direct,
}

impl ContainerShape {
    pub fn classify(container: ElementRef<'_>) -> Self {
        let has_span = has_descendant(container, "span");
        let has_table = has_descendant(container, "table");

        if has_span && !has_table {
            ContainerShape::Prose
        } else if has_span {
            ContainerShape::MiniTable
        } else if has_descendant(container, "p") {
            ContainerShape::ParagraphList
        } else if !has_descendant(container, "tr") {
            ContainerShape::Direct
        } else {
            ContainerShape::MiniTable
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        match self {
            ContainerShape::Prose => SourceKind::Span,
            ContainerShape::MiniTable => SourceKind::TableRow,
            ContainerShape::ParagraphList => SourceKind::Paragraph,
            ContainerShape::Direct => SourceKind::Generic,
        }
    }
}

/// Turns containers into token units, one per sentence, in document order.
pub fn harvest(containers: &[ElementRef<'_>]) -> Vec<TextFragment> {
    let mut fragments = Vec::new();
    for container in containers {
        harvest_container(*container, &mut fragments);
    }
    fragments
}

pub fn harvest_container(container: ElementRef<'_>, out: &mut Vec<TextFragment>) {
    let shape = ContainerShape::classify(container);
    let kind = shape.source_kind();
    debug!("Harvesting <{}> as {:?}", container.value().name(), shape);

    match shape {
        ContainerShape::Prose | ContainerShape::Direct => {
            push_sentences(&element_text(container), kind, out);
        }
        ContainerShape::MiniTable => {
            for row in table_rows(container) {
                push_sentences(&row, kind, out);
            }
        }
        ContainerShape::ParagraphList => {
            for paragraph in outermost_named(container, "p") {
                push_sentences(&element_text(paragraph), kind, out);
            }
        }
    }
}

/// Picks the cover page containers: innermost divs, or paragraphs then tables.
pub fn cover_containers(root: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let divs = innermost_named(root, "div");
    if !divs.is_empty() && !harvest(&divs).is_empty() {
        return divs;
    }
    let mut containers = outermost_named(root, "p");
    containers.extend(outermost_named(root, "table"));
    containers
}

/// Non-empty cell texts of each row, joined with single spaces.
fn table_rows(container: ElementRef<'_>) -> Vec<String> {
    let mut rows = Vec::new();
    let trs = if is_named(container, "tr") {
        vec![container]
    } else {
        super::dom::descendants_named(container, "tr")
    };
    for tr in trs {
        let cells: Vec<String> = tr
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| is_named(*c, "td") || is_named(*c, "th"))
            .map(|c| normalize_space(&element_text(c)))
            .filter(|t| !t.is_empty())
            .collect();
        if !cells.is_empty() {
            rows.push(cells.join(" "));
        }
    }
    rows
}

fn push_sentences(text: &str, kind: SourceKind, out: &mut Vec<TextFragment>) {
    for sentence in split_sentences(text) {
        let cleaned = clean_text(&sentence);
        let tokens = tokenize(&cleaned);
        if !tokens.is_empty() {
            out.push(TextFragment {
                raw_text: sentence,
                cleaned_tokens: tokens,
                source_kind: kind,
            });
        }
    }
}

/// Whitespace tokens, each cleaned, empty ones dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(clean_text)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Notes units: paragraphs outside tables, or spans when the filing has no paragraphs.
pub fn harvest_notes(root: ElementRef<'_>) -> Vec<TextFragment> {
    let outside = |e: &ElementRef<'_>| {
        !e.ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| is_named(a, "table"))
    };

    let paragraphs: Vec<_> = outermost_named(root, "p").into_iter().filter(outside).collect();
    let (containers, kind) = if paragraphs.is_empty() {
        let spans: Vec<_> = outermost_named(root, "span").into_iter().filter(outside).collect();
        (spans, SourceKind::Span)
    } else {
        (paragraphs, SourceKind::Paragraph)
    };

    containers
        .into_iter()
        .filter_map(|container| {
            let text = text_outside_tables(container);
            let tokens = notes_tokens(&text);
            if tokens.is_empty() {
                return None;
            }
            let cleaned = tokenize(&clean_text(&tokens.join(" ")));
            (!cleaned.is_empty()).then(|| TextFragment {
                raw_text: normalize_space(&text),
                cleaned_tokens: cleaned,
                source_kind: kind,
            })
        })
        .collect()
}

/// Sentence tokens with `$` removed and trailing periods cut; one-word sentences are noise.
fn notes_tokens(paragraph: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for sentence in split_sentences(paragraph) {
        let words: Vec<String> = sentence
            .split_whitespace()
            .map(|w| w.replace('$', ""))
            .map(|w| w.trim_end_matches('.').to_string())
            .filter(|w| !w.is_empty())
            .collect();
        let distinct: HashSet<&String> = words.iter().collect();
        if distinct.len() > 1 {
            tokens.extend(words);
        }
    }
    tokens
}

/// Sentence split on Unicode boundaries, re-joining splits after known abbreviations.
/// Decimal numbers never split since a period followed by a digit is not a boundary.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences: Vec<String> = Vec::new();
    for piece in text.unicode_sentences() {
        let piece = normalize_space(piece);
        if piece.is_empty() {
            continue;
        }
        match sentences.last_mut() {
            Some(previous) if ends_with_abbreviation(previous) => {
                previous.push(' ');
                previous.push_str(&piece);
            }
            _ => sentences.push(piece),
        }
    }
    sentences
}

fn ends_with_abbreviation(sentence: &str) -> bool {
    let Some(last) = sentence.split_whitespace().last() else {
        return false;
    };
    let word = last.trim_start_matches(|c: char| !c.is_alphanumeric());
    if !word.ends_with('.') {
        return false;
    }
    let stem = word.trim_end_matches('.').to_lowercase();
    if stem.is_empty() {
        return false;
    }
    // Initials ("J.") and dotted forms ("U.S.", "e.g.")
    if stem.chars().count() == 1 && stem.chars().all(char::is_alphabetic) {
        return true;
    }
    if stem.contains('.') && stem.split('.').all(|p| p.chars().count() <= 2) {
        return true;
    }
    ABBREVIATIONS.contains(&stem.as_str())
}

/// NFKC, typographic punctuation folded to ASCII, control and zero-width characters
/// removed, whitespace collapsed.
pub fn clean_text(text: &str) -> String {
    let folded: String = text
        .nfkc()
        .filter_map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201a}' | '\u{201b}' | '\u{2032}' => Some('\''),
            '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{201f}' | '\u{2033}' => Some('"'),
            '\u{2010}'..='\u{2015}' | '\u{2212}' => Some('-'),
            '\u{200b}'..='\u{200f}' | '\u{2060}' | '\u{feff}' => None,
            c if c.is_whitespace() => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();
    normalize_space(&folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn fragments_for(html: &str) -> Vec<Vec<String>> {
        let doc = Html::parse_fragment(html);
        let containers = cover_containers(doc.root_element());
        harvest(&containers)
            .into_iter()
            .map(|f| f.cleaned_tokens)
            .collect()
    }

    #[test]
    fn test_cover_divs_in_order() {
        let tokens = fragments_for("<div><span>Document Type</span></div><div><span>10-Q</span></div>");
        assert_eq!(tokens, vec![vec!["Document", "Type"], vec!["10-Q"]]);
    }

    #[test]
    fn test_shape_precedence() {
        let doc = Html::parse_fragment(
            "<div id=\"prose\"><span>a</span></div>\
             <div id=\"mini\"><span>a</span><table><tr><td>x</td></tr></table></div>\
             <div id=\"paras\"><p>a</p></div>\
             <div id=\"direct\">a</div>\
             <div id=\"rows\"><table><tr><td>x</td></tr></table></div>",
        );
        let shapes: Vec<_> = innermost_named(doc.root_element(), "div")
            .into_iter()
            .map(ContainerShape::classify)
            .collect();
        assert_eq!(
            shapes,
            vec![
                ContainerShape::Prose,
                ContainerShape::MiniTable,
                ContainerShape::ParagraphList,
                ContainerShape::Direct,
                ContainerShape::MiniTable,
            ]
        );
    }

    #[test]
    fn test_mini_table_rows_skip_empty_cells() {
        let tokens = fragments_for(
            "<div><table><tr><td>Commission File Number</td><td> </td><td>001-12345</td></tr></table></div>",
        );
        assert_eq!(tokens, vec![vec!["Commission", "File", "Number", "001-12345"]]);
    }

    #[test]
    fn test_sentences_keep_decimals_and_abbreviations() {
        let sentences = split_sentences(
            "Revenue was $1.5 million for Acme Inc. in the quarter. Costs rose. See Note No. 4.",
        );
        assert_eq!(
            sentences,
            vec![
                "Revenue was $1.5 million for Acme Inc. in the quarter.",
                "Costs rose.",
                "See Note No. 4.",
            ]
        );
    }

    #[test]
    fn test_sentences_after_us_abbreviation() {
        let sentences = split_sentences("Incorporated under U.S. law. Next sentence here.");
        assert_eq!(sentences.len(), 2);
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("Shareholders\u{2019}\u{a0} equity\u{200b}\n"), "Shareholders' equity");
        assert_eq!(clean_text("2023\u{2014}2024"), "2023-2024");
        assert_eq!(clean_text("\u{7}"), "");
    }

    #[test]
    fn test_notes_skip_tables_and_one_word_sentences() {
        let doc = Html::parse_fragment(
            "<p>Cash and equivalents were $5,000.</p>\
             <table><tr><td><p>1,234</p></td></tr></table>\
             <p>Total.</p>",
        );
        let notes = harvest_notes(doc.root_element());
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].cleaned_tokens, vec!["Cash", "and", "equivalents", "were", "5,000"]);
        assert_eq!(notes[0].source_kind, SourceKind::Paragraph);
    }

    #[test]
    fn test_notes_fall_back_to_spans() {
        let doc = Html::parse_fragment("<div><span>Net income was 200 dollars</span></div>");
        let notes = harvest_notes(doc.root_element());
        assert_eq!(notes[0].source_kind, SourceKind::Span);
        assert_eq!(notes[0].joined(), "Net income was 200 dollars");
    }
}
