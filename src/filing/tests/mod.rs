use scraper::Html;
use std::fs;
use std::path::PathBuf;

use super::pages::{cover_page, locate_markers, page_intervals, split_raw};
use super::tables::{extract_raw_rows, find_statement_tables, reconstruct, StatementKind};
use super::text::{cover_containers, harvest, harvest_notes};
use crate::core::config::AutotagConfig;

pub fn get_test_file_path(filename: &str) -> PathBuf {
    PathBuf::from("src/filing/tests/data").join(filename)
}

pub fn read_test_file(filename: &str) -> String {
    fs::read_to_string(get_test_file_path(filename))
        .unwrap_or_else(|e| panic!("Failed to read test file {}: {}", filename, e))
}

#[test]
fn test_sample_cover_units() {
    let raw = read_test_file("sample-10q.htm");
    let doc = Html::parse_document(&raw);
    let markers = locate_markers(&doc);
    assert_eq!(markers.len(), 2);

    let cover = cover_page(&markers).unwrap();
    let fragment = Html::parse_fragment(&cover.html);
    let units: Vec<Vec<String>> = harvest(&cover_containers(fragment.root_element()))
        .into_iter()
        .map(|u| u.cleaned_tokens)
        .collect();
    assert_eq!(units.len(), 5);
    assert_eq!(units[1], vec!["Document", "Type"]);
    assert_eq!(units[2], vec!["10-Q"]);
}

#[test]
fn test_sample_balance_sheet() {
    let raw = read_test_file("sample-10q.htm");
    let doc = Html::parse_document(&raw);
    let markers = locate_markers(&doc);
    let config = AutotagConfig::default();

    let pages = page_intervals(&doc, &markers, config.scan_limit);
    assert_eq!(pages.len(), 2);

    let fragment = Html::parse_fragment(&pages[0].html);
    let found = find_statement_tables(&fragment, &config);
    assert_eq!(found.len(), 1);
    let (statement, table) = found[0];
    assert_eq!(statement, StatementKind::BalanceSheet);

    let reconstructed = reconstruct(table);
    assert_eq!(reconstructed.header, vec!["index", "June 30 2023", "December 31 2022"]);
    assert_eq!(reconstructed.rows.len(), 3);
    assert_eq!(reconstructed.rows[0], vec!["Cash", "1234", "1000"]);

    let rows = extract_raw_rows(table, &config.placeholder_label);
    assert_eq!(rows[1].context(), "Cash 1234 1000");

    let notes_page = Html::parse_fragment(&pages[1].html);
    assert!(find_statement_tables(&notes_page, &config).is_empty());
}

#[test]
fn test_sample_notes_cover_everything_after_the_cover() {
    let raw = read_test_file("sample-10q.htm");
    let split = split_raw(&raw);
    assert!(split.is_segmented());
    assert!(split.cover.contains("Document Type"));
    assert!(!split.remainder.contains("Document Type"));

    let remainder = Html::parse_document(split.remainder);
    let units = harvest_notes(remainder.root_element());
    let joined: Vec<String> = units.iter().map(|u| u.joined()).collect();
    assert!(joined.contains(&"Revenue was 5,000 for the quarter".to_string()));
    assert!(joined.iter().all(|u| !u.contains("Cash")));
}
