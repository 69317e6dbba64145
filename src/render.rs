use crate::registry::{ColumnRegistry, ColumnRole};
use crate::table::SurveyTable;

/// Shown where a label is needed but the identifier cell is empty.
pub const EMPTY_LABEL: &str = "∅";

/// A question/answer pair rendered as one box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledBlock {
    pub label: String,
    pub value: String,
}

impl LabeledBlock {
    fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        LabeledBlock {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Every non-empty answer of `row` in column order. The row key column is skipped.
pub fn detail_blocks(
    table: &SurveyTable,
    registry: &ColumnRegistry,
    row: usize,
) -> Vec<LabeledBlock> {
    table
        .columns()
        .iter()
        .enumerate()
        .filter(|(idx, _)| registry.role(*idx) != Some(ColumnRole::RowKey))
        .filter_map(|(_, column)| {
            column
                .cell(row)
                .map(|value| LabeledBlock::new(column.name(), value))
        })
        .collect()
}

/// Every non-empty answer to `column` in row order, labeled with the
/// respondent's identifier value.
pub fn question_blocks(
    table: &SurveyTable,
    registry: &ColumnRegistry,
    column: usize,
) -> Vec<LabeledBlock> {
    let Some(question) = table.column(column) else {
        return Vec::new();
    };
    (0..table.nrows())
        .filter_map(|row| {
            question
                .cell(row)
                .map(|value| LabeledBlock::new(identifier_value(table, registry, row), value))
        })
        .collect()
}

pub fn identifier_value<'a>(
    table: &'a SurveyTable,
    registry: &ColumnRegistry,
    row: usize,
) -> &'a str {
    table
        .cell(row, registry.identifier())
        .unwrap_or(EMPTY_LABEL)
}

/// Label used by the respondent selector.
pub fn record_label(table: &SurveyTable, registry: &ColumnRegistry, row: usize) -> String {
    format!("{} (Row {})", identifier_value(table, registry, row), row)
}

/// Terminal rows a bordered block needs at the given outer width.
pub fn block_height(block: &LabeledBlock, width: usize) -> usize {
    let inner = width.saturating_sub(2).max(1);
    let lines: usize = block
        .value
        .lines()
        .map(|line| line.chars().count().div_ceil(inner).max(1))
        .sum();
    lines.max(1) + 2
}
