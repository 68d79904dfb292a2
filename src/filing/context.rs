use log::debug;
use std::collections::HashSet;

use super::tables::StatementKind;
use crate::core::types::{ContextualCell, RawRow, ReconstructedTable, TagAssignment};

/// Drops a zero fractional part (`"1234.0"` -> `"1234"`); other text is returned unchanged.
pub fn convert_float_to_int(value: &str) -> String {
    let trimmed = value.trim();
    if let Some((whole, fraction)) = trimmed.split_once('.') {
        let digits = whole.strip_prefix('-').unwrap_or(whole);
        let integral = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());
        let zero_fraction = !fraction.is_empty() && fraction.chars().all(|c| c == '0');
        if integral && zero_fraction && digits.chars().any(|c| c != '0') {
            return whole.to_string();
        }
    }
    trimmed.to_string()
}

/// Puts thousands separators back into a plain number: `"-1234567.5"` -> `"-1,234,567.5"`.
pub fn restore_thousands_separators(value: &str) -> String {
    let (sign, unsigned) = match value.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", value),
    };
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (unsigned, None),
    };
    if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
        return value.to_string();
    }
    if let Some(f) = fraction {
        if !f.chars().all(|c| c.is_ascii_digit()) {
            return value.to_string();
        }
    }

    let digits: Vec<char> = whole.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, d) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*d);
    }

    match fraction {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

/// Walks every row of `table` left to right, turning known data values into composite keys.
///
/// A cell whose value appears in the raw row dump is data; any other non-blank cell
/// becomes the context for the data cells after it in the same row.
pub fn align(
    raw_rows: &[RawRow],
    table: &ReconstructedTable,
    statement: StatementKind,
    placeholder_label: &str,
) -> Vec<ContextualCell> {
    let known: HashSet<&str> = raw_rows.iter().flat_map(RawRow::values).collect();
    let statement_name = statement.context_name();
    let mut cells = Vec::new();

    for row in &table.rows {
        let mut context = String::new();
        for (value, column) in row.iter().zip(&table.header) {
            let value = convert_float_to_int(value);
            if value.is_empty() {
                continue;
            }
            if !known.contains(value.as_str()) {
                context = value;
                continue;
            }
            cells.push(ContextualCell {
                composite_key: format!(
                    "{} {} {} {}=={}",
                    statement_name, context, column, value, placeholder_label
                ),
                source_value: value,
                statement_name: statement_name.to_string(),
                column_name: column.clone(),
            });
        }
    }

    debug!("Aligned {} data cells for {}", cells.len(), statement);
    cells
}

/// Pairs cells with predicted labels, dropping placeholder predictions.
pub fn table_assignments(
    cells: &[ContextualCell],
    labels: &[String],
    placeholder_label: &str,
) -> Vec<TagAssignment> {
    cells
        .iter()
        .zip(labels)
        .filter(|(_, label)| {
            let label = label.trim();
            !label.is_empty() && label != placeholder_label && label != "O"
        })
        .map(|(cell, label)| {
            TagAssignment::new(restore_thousands_separators(&cell.source_value), label.trim())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn raw(context: &str, values: &[&str]) -> RawRow {
        RawRow(
            context.to_string(),
            values
                .iter()
                .map(|v| BTreeMap::from([(v.to_string(), "Others".to_string())]))
                .collect(),
        )
    }

    #[test]
    fn test_convert_float_to_int() {
        assert_eq!(convert_float_to_int("1234.0"), "1234");
        assert_eq!(convert_float_to_int("1234"), "1234");
        assert_eq!(convert_float_to_int("12.5"), "12.5");
        assert_eq!(convert_float_to_int("0.0"), "0.0");
        assert_eq!(convert_float_to_int("Cash"), "Cash");
        assert_eq!(convert_float_to_int("-5.00"), "-5");
        assert_eq!(convert_float_to_int("1.5e3"), "1.5e3");
    }

    #[test]
    fn test_convert_float_to_int_keeps_every_digit() {
        assert_eq!(convert_float_to_int("123456789012345678901.0"), "123456789012345678901");
        assert_eq!(convert_float_to_int("9007199254740993.00"), "9007199254740993");
    }

    #[test]
    fn test_restore_thousands_separators() {
        assert_eq!(restore_thousands_separators("1234"), "1,234");
        assert_eq!(restore_thousands_separators("123"), "123");
        assert_eq!(restore_thousands_separators("-1234567.25"), "-1,234,567.25");
        assert_eq!(restore_thousands_separators("n/a"), "n/a");
    }

    #[test]
    fn test_align_builds_composite_keys() {
        let table = ReconstructedTable {
            header: vec!["index".into(), "June 30 2023".into()],
            rows: vec![
                vec!["Cash".into(), "1234".into()],
                vec!["Receivables".into(), "".into()],
            ],
        };
        let rows = vec![raw("Cash 1234", &["1234"])];
        let cells = align(&rows, &table, StatementKind::BalanceSheet, "Others");
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].composite_key, "balance sheet Cash June 30 2023 1234==Others");
        assert_eq!(cells[0].source_value, "1234");
        assert_eq!(cells[0].column_name, "June 30 2023");
    }

    #[test]
    fn test_context_follows_latest_label() {
        let table = ReconstructedTable {
            header: vec!["index".into(), "A".into(), "B".into()],
            rows: vec![vec!["5".into(), "Debt".into(), "7".into()]],
        };
        let rows = vec![raw("x", &["5", "7"])];
        let cells = align(&rows, &table, StatementKind::CashFlow, "Others");
        assert_eq!(cells[0].composite_key, "statements of cash flow  index 5==Others");
        assert_eq!(cells[1].composite_key, "statements of cash flow Debt B 7==Others");
    }

    #[test]
    fn test_table_assignments_drop_placeholder() {
        let cell = |v: &str| ContextualCell {
            composite_key: String::new(),
            source_value: v.to_string(),
            statement_name: "balance sheet".into(),
            column_name: "2023".into(),
        };
        let cells = vec![cell("1234"), cell("99")];
        let labels = vec!["us-gaap:Cash".to_string(), "Others".to_string()];
        assert_eq!(
            table_assignments(&cells, &labels, "Others"),
            vec![TagAssignment::new("1,234", "us-gaap:Cash")]
        );
    }
}
