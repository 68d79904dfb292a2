use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use strum::{EnumIter, IntoEnumIterator};

use super::dom::{descendants_named, element_text, is_named, normalize_space, outermost_named, text_before_first_table};
use crate::core::config::AutotagConfig;
use crate::core::types::{RawRow, ReconstructedTable};

const MAX_SPAN: usize = 64;
const MIN_COLUMN_VALUES: usize = 3;

/// The financial statements whose tables are tagged cell by cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
pub enum StatementKind {
    BalanceSheet,
    Operations,
    ShareholdersEquity,
    CashFlow,
    Equity,
}

impl StatementKind {
    /// Caption keywords, checked in declaration order so the more specific equity
    /// statement wins over the generic one.
    fn keywords(&self) -> &'static [&'static str] {
        match self {
            StatementKind::BalanceSheet => &["BALANCE"],
            StatementKind::Operations => &["OPERATIONS"],
            StatementKind::ShareholdersEquity => &[
                "SHAREHOLDERS\u{2019}",
                "SHAREHOLDERS'",
                "STOCKHOLDERS\u{2019}",
                "STOCKHOLDERS'",
            ],
            StatementKind::CashFlow => &["CASH FLOW"],
            StatementKind::Equity => &["EQUITY"],
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            StatementKind::BalanceSheet => "CONDENSED CONSOLIDATED BALANCE SHEETS",
            StatementKind::Operations => "CONSOLIDATED STATEMENTS OF OPERATIONS AND COMPREHENSIVE LOSS",
            StatementKind::ShareholdersEquity => {
                "CONSOLIDATED STATEMENTS OF CHANGES IN SHAREHOLDERS\u{2019} EQUITY"
            }
            StatementKind::CashFlow => "CONDENSED CONSOLIDATED STATEMENTS OF CASH FLOWS",
            StatementKind::Equity => "CONSOLIDATED STATEMENTS OF EQUITY",
        }
    }

    /// The statement words prefixed to every composite key.
    pub fn context_name(&self) -> &'static str {
        match self {
            StatementKind::BalanceSheet => "balance sheet",
            StatementKind::Operations => "operations and comprehensive",
            StatementKind::ShareholdersEquity => "shareholders\u{2019} equity",
            StatementKind::CashFlow => "statements of cash flow",
            StatementKind::Equity => "statements of equity",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            StatementKind::BalanceSheet => "balance-sheet",
            StatementKind::Operations => "operations",
            StatementKind::ShareholdersEquity => "shareholders-equity",
            StatementKind::CashFlow => "cash-flow",
            StatementKind::Equity => "equity",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        StatementKind::iter().find(|k| k.slug() == slug)
    }

    /// Equity statements are commonly split over several adjacent tables.
    pub fn takes_all_tables(&self) -> bool {
        matches!(self, StatementKind::ShareholdersEquity)
    }

    /// Matches an uppercased, whitespace-normalized caption.
    pub fn detect(caption: &str) -> Option<Self> {
        StatementKind::iter().find(|k| k.keywords().iter().any(|kw| caption.contains(kw)))
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// Statement tables of one page, each paired with the statement its caption names.
pub fn find_statement_tables<'a>(
    page: &'a Html,
    config: &AutotagConfig,
) -> Vec<(StatementKind, ElementRef<'a>)> {
    let root = page.root_element();
    let tables = outermost_named(root, "table");
    if tables.is_empty() {
        return Vec::new();
    }

    let caption = normalize_space(&text_before_first_table(root)).to_uppercase();
    let caption_len = caption.chars().count();
    if !config.caption_fits(caption_len) {
        debug!("Skipping page with {} tables, caption length {}", tables.len(), caption_len);
        return Vec::new();
    }

    let Some(kind) = StatementKind::detect(&caption) else {
        debug!("No statement keyword in caption: {}", caption);
        return Vec::new();
    };
    info!("Found {} ......", kind);

    if kind.takes_all_tables() {
        tables.into_iter().map(|t| (kind, t)).collect()
    } else {
        vec![(kind, tables[0])]
    }
}

/// Rows of `table` itself, leaving out rows of nested tables.
fn own_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    descendants_named(table, "tr")
        .into_iter()
        .filter(|tr| {
            tr.ancestors()
                .filter_map(ElementRef::wrap)
                .find(|a| is_named(*a, "table"))
                .map_or(false, |owner| owner.id() == table.id())
        })
        .collect()
}

fn cells(tr: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    tr.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| is_named(*c, "td") || is_named(*c, "th"))
        .collect()
}

fn span_attr(cell: ElementRef<'_>, name: &str) -> usize {
    cell.value()
        .attr(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_SPAN)
}

/// The table as a padded grid of cell texts, with `colspan` and `rowspan` cells repeated.
pub fn raw_grid(table: ElementRef<'_>) -> Vec<Vec<String>> {
    let mut grid: Vec<Vec<String>> = Vec::new();
    let mut carry: BTreeMap<usize, (String, usize)> = BTreeMap::new();

    for tr in own_rows(table) {
        let mut row = Vec::new();
        let mut pending = cells(tr).into_iter();
        loop {
            let col = row.len();
            if let Some((text, remaining)) = carry.get(&col).cloned() {
                if remaining <= 1 {
                    carry.remove(&col);
                } else {
                    carry.insert(col, (text.clone(), remaining - 1));
                }
                row.push(text);
                continue;
            }
            let Some(cell) = pending.next() else {
                break;
            };
            let text = normalize_space(&element_text(cell));
            let rowspan = span_attr(cell, "rowspan");
            for _ in 0..span_attr(cell, "colspan") {
                if rowspan > 1 {
                    carry.insert(row.len(), (text.clone(), rowspan - 1));
                }
                row.push(text.clone());
            }
        }

        let trailing: Vec<usize> = carry.range(row.len()..).map(|(c, _)| *c).collect();
        for col in trailing {
            if let Some((text, remaining)) = carry.remove(&col) {
                row.resize(col, String::new());
                row.push(text.clone());
                if remaining > 1 {
                    carry.insert(col, (text, remaining - 1));
                }
            }
        }
        grid.push(row);
    }

    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    for row in grid.iter_mut() {
        row.resize(width, String::new());
    }
    grid
}

/// Strips currency symbols, thousands separators and closing parentheses; an opening
/// parenthesis (accounting negative) becomes a minus sign.
pub fn normalize_cell(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !matches!(*c, '$' | '\u{20ac}' | '\u{a3}' | '\u{a5}' | ',' | ')'))
        .map(|c| if c == '(' { '-' } else { c })
        .collect();
    normalize_space(&stripped)
}

fn is_blank(value: &str) -> bool {
    value.is_empty()
}

fn drop_blank(grid: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let rows: Vec<Vec<String>> = grid
        .into_iter()
        .filter(|row| row.iter().any(|v| !is_blank(v)))
        .collect();
    let width = rows.first().map_or(0, Vec::len);

    // A column that only carries a value in the first row is a stray caption.
    let keep: Vec<usize> = (0..width)
        .filter(|&c| {
            let values = rows.iter().map(|r| &r[c]);
            if rows.len() > 1 {
                values.skip(1).any(|v| !is_blank(v))
            } else {
                rows.iter().any(|r| !is_blank(&r[c]))
            }
        })
        .collect();

    rows.into_iter()
        .map(|row| keep.iter().map(|&c| row[c].clone()).collect())
        .collect()
}

fn select_columns(table: &mut ReconstructedTable, keep: &[usize]) {
    table.header = keep.iter().map(|&c| table.header[c].clone()).collect();
    for row in table.rows.iter_mut() {
        *row = keep.iter().map(|&c| row[c].clone()).collect();
    }
}

fn parse_number(value: &str) -> Option<f64> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    compact.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Removes accounting dashes from numeric cells; a cell made only of dashes is blank.
fn strip_dashes(value: &str) -> String {
    let is_dash = |c: char| matches!(c, '-' | '\u{2013}' | '\u{2014}');
    if !value.is_empty() && value.chars().all(|c| is_dash(c) || c.is_whitespace()) {
        return String::new();
    }
    let without: String = value.chars().filter(|c| !is_dash(*c)).collect();
    if parse_number(&without).is_some() {
        normalize_space(&without)
    } else {
        value.to_string()
    }
}

fn larger(a: &str, b: &str) -> Result<String> {
    match (is_blank(a), is_blank(b)) {
        (true, _) => return Ok(b.to_string()),
        (_, true) => return Ok(a.to_string()),
        _ => {}
    }
    match (parse_number(a), parse_number(b)) {
        (Some(x), Some(y)) => Ok(if y > x { b.to_string() } else { a.to_string() }),
        (None, None) if a == b => Ok(a.to_string()),
        _ => Err(anyhow!("cannot compare '{}' with '{}'", a, b)),
    }
}

/// Drops exact duplicate columns, then folds same-named columns into their element-wise maximum.
fn merge_duplicate_columns(table: &mut ReconstructedTable) -> Result<()> {
    let width = table.width();
    let column = |t: &ReconstructedTable, c: usize| -> Vec<String> {
        std::iter::once(t.header[c].clone())
            .chain(t.rows.iter().map(|r| r[c].clone()))
            .collect()
    };

    let mut distinct: Vec<usize> = Vec::new();
    for c in 0..width {
        if !distinct.iter().any(|&d| column(table, d) == column(table, c)) {
            distinct.push(c);
        }
    }
    select_columns(table, &distinct);

    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    for (c, name) in table.header.iter().enumerate() {
        if name.is_empty() {
            groups.push((String::new(), vec![c]));
            continue;
        }
        match by_name.get(name) {
            Some(&g) => groups[g].1.push(c),
            None => {
                by_name.insert(name.clone(), groups.len());
                groups.push((name.clone(), vec![c]));
            }
        }
    }

    if groups.len() == table.width() {
        return Ok(());
    }

    let mut merged_rows = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let mut merged = Vec::with_capacity(groups.len());
        for (_, members) in &groups {
            let mut best = row[members[0]].clone();
            for &m in &members[1..] {
                best = larger(&best, &row[m])?;
            }
            merged.push(best);
        }
        merged_rows.push(merged);
    }
    table.header = groups.into_iter().map(|(name, _)| name).collect();
    table.rows = merged_rows;
    Ok(())
}

/// Header band detection, noise column removal and duplicate merging.
fn structure(grid: &[Vec<String>]) -> Result<ReconstructedTable> {
    if grid.is_empty() {
        return Err(anyhow!("table has no rows"));
    }
    let width = grid[0].len();
    let first_label = grid
        .iter()
        .position(|row| !is_blank(&row[0]))
        .ok_or_else(|| anyhow!("first column is empty"))?;
    if first_label == 0 {
        return Err(anyhow!("no header band above the first row label"));
    }

    let header: Vec<String> = (0..width)
        .map(|c| {
            grid[..first_label]
                .iter()
                .map(|r| r[c].as_str())
                .filter(|v| !is_blank(v))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();

    let mut table = ReconstructedTable {
        header,
        rows: grid[first_label..].to_vec(),
    };

    let keep: Vec<usize> = (0..width)
        .filter(|&c| table.rows.iter().filter(|r| !is_blank(&r[c])).count() >= MIN_COLUMN_VALUES)
        .collect();
    if keep.len() < width {
        debug!("Dropping {} sparse columns", width - keep.len());
    }
    select_columns(&mut table, &keep);
    if table.width() == 0 {
        return Ok(ReconstructedTable::default());
    }

    if table.header[0].is_empty() {
        table.header[0] = "index".to_string();
    }
    for row in table.rows.iter_mut() {
        for value in row.iter_mut() {
            *value = strip_dashes(value);
        }
    }

    merge_duplicate_columns(&mut table)?;
    Ok(table)
}

/// Fallback shape: the first two rows joined as header, everything else as body.
fn two_row_header(grid: &[Vec<String>]) -> ReconstructedTable {
    let width = grid.first().map_or(0, Vec::len);
    let split = grid.len().min(2);
    let header = (0..width)
        .map(|c| {
            grid[..split]
                .iter()
                .map(|r| r[c].as_str())
                .filter(|v| !is_blank(v))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    ReconstructedTable {
        header,
        rows: grid[split..].to_vec(),
    }
}

/// Squares an irregular statement table off into a header and equally wide rows.
pub fn reconstruct(table: ElementRef<'_>) -> ReconstructedTable {
    let grid: Vec<Vec<String>> = raw_grid(table)
        .into_iter()
        .map(|row| row.iter().map(|c| normalize_cell(c)).collect())
        .collect();
    let grid = drop_blank(grid);

    match structure(&grid) {
        Ok(table) => table,
        Err(e) => {
            warn!("Irregular table ({}), using the first two rows as header", e);
            two_row_header(&grid)
        }
    }
}

/// Row literals for the raw row dump: first cell as context, later cells as `{value: label}`.
pub fn extract_raw_rows(table: ElementRef<'_>, placeholder_label: &str) -> Vec<RawRow> {
    let mut rows = Vec::new();

    for tr in own_rows(table) {
        if element_text(tr).trim().is_empty() {
            continue;
        }
        let values: Vec<String> = descendants_named(tr, "td")
            .into_iter()
            .map(|td| match descendants_named(td, "span").first() {
                Some(span) => element_text(*span),
                None => element_text(td),
            })
            .map(|text| normalize_space(&text))
            .filter(|text| text != "$")
            .map(|text| normalize_space(&text.replace('$', "")))
            .filter(|text| text.chars().count() > 1)
            .collect();

        if values.len() < 2 {
            continue;
        }

        let mut context = values[0].clone();
        let mut tagged = Vec::new();
        for cell in &values[1..] {
            let parts: Vec<&str> = cell.split_whitespace().collect();
            let (value, label) = match parts.as_slice() {
                [value, label] => (*value, *label),
                _ => (cell.as_str(), placeholder_label),
            };
            let digits: String = value.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
            if digits.is_empty() {
                continue;
            }
            context.push(' ');
            context.push_str(&digits);
            tagged.push(BTreeMap::from([(digits, label.to_string())]));
        }
        rows.push(RawRow(context, tagged));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_table(doc: &Html) -> ElementRef<'_> {
        outermost_named(doc.root_element(), "table")[0]
    }

    const BALANCE: &str = r#"
        <p>CONDENSED CONSOLIDATED BALANCE SHEETS</p>
        <table>
          <tr><td></td><td colspan="2">June 30, 2023</td><td></td><td colspan="2">December 31, 2022</td></tr>
          <tr><td>Cash</td><td>$</td><td>1,234</td><td></td><td>$</td><td>1,000</td></tr>
          <tr><td>Receivables</td><td></td><td>(500)</td><td></td><td></td><td>400</td></tr>
          <tr><td>Total assets</td><td>$</td><td>734</td><td></td><td>$</td><td>1,400</td></tr>
        </table>"#;

    #[test]
    fn test_statement_detection() {
        assert_eq!(StatementKind::detect("CONDENSED CONSOLIDATED BALANCE SHEETS"), Some(StatementKind::BalanceSheet));
        assert_eq!(
            StatementKind::detect("STATEMENTS OF CHANGES IN SHAREHOLDERS\u{2019} EQUITY"),
            Some(StatementKind::ShareholdersEquity)
        );
        assert_eq!(StatementKind::detect("STATEMENTS OF EQUITY"), Some(StatementKind::Equity));
        assert_eq!(StatementKind::detect("CONDENSED STATEMENTS OF CASH FLOWS"), Some(StatementKind::CashFlow));
        assert_eq!(StatementKind::detect("SIGNATURES"), None);
        assert_eq!(StatementKind::from_slug("cash-flow"), Some(StatementKind::CashFlow));
    }

    #[test]
    fn test_find_statement_tables_checks_caption() {
        let config = AutotagConfig::default();
        let page = Html::parse_fragment(BALANCE);
        let found = find_statement_tables(&page, &config);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, StatementKind::BalanceSheet);

        let short = Html::parse_fragment("<p>BALANCE</p><table><tr><td>x</td></tr></table>");
        assert!(find_statement_tables(&short, &config).is_empty());

        let unrelated = Html::parse_fragment("<p>EXHIBIT INDEX AND SIGNATURES</p><table><tr><td>x</td></tr></table>");
        assert!(find_statement_tables(&unrelated, &config).is_empty());
    }

    #[test]
    fn test_equity_takes_every_table() {
        let config = AutotagConfig::default();
        let page = Html::parse_fragment(
            "<p>STATEMENTS OF CHANGES IN SHAREHOLDERS\u{2019} EQUITY</p>\
             <table><tr><td>a</td></tr></table><table><tr><td>b</td></tr></table>",
        );
        assert_eq!(find_statement_tables(&page, &config).len(), 2);
    }

    #[test]
    fn test_raw_grid_expands_spans() {
        let doc = Html::parse_fragment(
            "<table><tr><td rowspan=\"2\">A</td><td colspan=\"2\">B</td></tr><tr><td>c</td><td>d</td></tr></table>",
        );
        assert_eq!(
            raw_grid(first_table(&doc)),
            vec![vec!["A", "B", "B"], vec!["A", "c", "d"]]
        );
    }

    #[test]
    fn test_normalize_cell() {
        assert_eq!(normalize_cell("$1,234"), "1234");
        assert_eq!(normalize_cell("(1,234)"), "-1234");
        assert_eq!(normalize_cell(" $ "), "");
    }

    #[test]
    fn test_reconstruct_balance_sheet() {
        let doc = Html::parse_fragment(BALANCE);
        let table = reconstruct(first_table(&doc));
        assert!(table.is_rectangular());
        assert_eq!(table.header, vec!["index", "June 30 2023", "December 31 2022"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["Cash", "1234", "1000"],
                vec!["Receivables", "500", "400"],
                vec!["Total assets", "734", "1400"],
            ]
        );
    }

    #[test]
    fn test_sparse_columns_are_dropped() {
        let doc = Html::parse_fragment(
            "<table><tr><td></td><td>2023</td><td>Note</td></tr>\
             <tr><td>Cash</td><td>1</td><td>4</td></tr>\
             <tr><td>Debt</td><td>2</td><td></td></tr>\
             <tr><td>Total</td><td>3</td><td></td></tr></table>",
        );
        let table = reconstruct(first_table(&doc));
        assert_eq!(table.header, vec!["index", "2023"]);
        assert!(table.is_rectangular());
    }

    #[test]
    fn test_duplicate_columns_take_the_maximum() {
        let doc = Html::parse_fragment(
            "<table><tr><td></td><td>2023</td><td>2023</td></tr>\
             <tr><td>Cash</td><td>1</td><td>5</td></tr>\
             <tr><td>Debt</td><td>7</td><td>3</td></tr>\
             <tr><td>Total</td><td>8</td><td>2</td></tr></table>",
        );
        let table = reconstruct(first_table(&doc));
        assert_eq!(table.header, vec!["index", "2023"]);
        assert_eq!(table.rows[0], vec!["Cash", "5"]);
        assert_eq!(table.rows[1], vec!["Debt", "7"]);
        assert_eq!(table.rows[2], vec!["Total", "8"]);
    }

    #[test]
    fn test_irregular_table_falls_back_to_two_row_header() {
        let doc = Html::parse_fragment(
            "<table><tr><td>In thousands</td><td>2023</td></tr>\
             <tr><td>Cash</td><td>10</td></tr>\
             <tr><td>Debt</td><td>20</td></tr></table>",
        );
        let table = reconstruct(first_table(&doc));
        assert_eq!(table.header, vec!["In thousands Cash", "2023 10"]);
        assert_eq!(table.rows, vec![vec!["Debt", "20"]]);
        assert!(table.is_rectangular());
    }

    #[test]
    fn test_ragged_rows_stay_rectangular() {
        let doc = Html::parse_fragment(
            "<table><tr><td></td></tr><tr><td>a</td><td>1</td><td>2</td></tr><tr><td>b</td></tr></table>",
        );
        let table = reconstruct(first_table(&doc));
        assert!(table.is_rectangular());
    }

    #[test]
    fn test_extract_raw_rows() {
        let doc = Html::parse_fragment(BALANCE);
        let rows = extract_raw_rows(first_table(&doc), "Others");
        assert_eq!(rows[0].context(), "June 30, 2023 312022");
        assert_eq!(rows[1].context(), "Cash 1234 1000");
        assert_eq!(rows[1].values().collect::<Vec<_>>(), vec!["1234", "1000"]);
        assert_eq!(rows[2].context(), "Receivables 500 400");
    }
}
