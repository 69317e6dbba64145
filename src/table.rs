use polars::prelude::*;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::domain::SVError;

/// Name of the row key column. Added with values 0..N-1 when the file has none.
pub const ROW_ID_COLUMN: &str = "Row_ID";

/// Field values read as missing, on top of empty fields.
const NULL_TOKENS: [&str; 18] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>",
    "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

pub const EXAMPLE_SURVEY: &str = "\
Response ID,Name,Satisfaction Score (1-10),What did you like most?,What can we improve?
1,Alice Johnson,8,\"The variety of options was great. I really enjoyed the user interface.\",\"The loading speed could be a bit faster on mobile devices.\"
2,Bob Smith,5,\"It was okay. Nothing special standing out.\",\"Customer support took 3 days to reply. That is unacceptable.\"
3,Charlie Brown,10,\"Absolutely everything! The service was impeccable and the team was friendly.\",\"Nothing, keep doing what you are doing!\"
4,Diana Prince,3,\"Not much to be honest. I found it confusing.\",\"Make the documentation clearer. I had to guess how to use half the features.\"
5,Evan Wright,9,\"Very robust platform. Handles large datasets well.\",\"Maybe add a dark mode?\"
";

#[derive(Debug, Clone, Copy, PartialEq)]
enum FileType {
    CSV,
    TSV,
}

impl FileType {
    fn separator(&self) -> u8 {
        match self {
            FileType::CSV => b',',
            FileType::TSV => b'\t',
        }
    }
}

#[derive(Debug)]
struct FileInfo {
    path: PathBuf,
    file_size: u64,
    file_type: FileType,
}

impl FileInfo {
    fn inspect(path: &Path) -> Result<Self, SVError> {
        let metadata = fs::metadata(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => SVError::FileNotFound(path.to_path_buf()),
            ErrorKind::PermissionDenied => SVError::PermissionDenied(path.to_path_buf()),
            _ => SVError::IoError(e),
        })?;
        if !metadata.is_file() {
            return Err(SVError::LoadingFailed(format!(
                "{} is not a file!",
                path.display()
            )));
        }

        Ok(FileInfo {
            path: path.to_path_buf(),
            file_size: metadata.len(),
            file_type: Self::detect_file_type(path)?,
        })
    }

    fn detect_file_type(path: &Path) -> Result<FileType, SVError> {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_uppercase())
            .as_deref()
        {
            Some("CSV") => Ok(FileType::CSV),
            Some("TSV") | Some("TAB") => Ok(FileType::TSV),
            _ => Err(SVError::UnknownFileType(path.to_path_buf())),
        }
    }
}

/// One named column with every cell rendered to text. `None` marks an empty cell.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    dtype: DataType,
    cells: Vec<Option<String>>,
    max_width: usize,
}

impl Column {
    fn load(df: &DataFrame, name: &str) -> Result<Self, PolarsError> {
        let column = df.column(name)?;
        let dtype = column.dtype().clone();

        let as_text = column.cast(&DataType::String)?;
        let mut cells = Vec::with_capacity(as_text.len());
        let mut max_width = 0;
        for value in as_text.str()?.into_iter() {
            let cell = value.filter(|s| !s.is_empty()).map(str::to_string);
            if let Some(s) = &cell {
                max_width = max_width.max(Self::display_text(s).chars().count());
            }
            cells.push(cell);
        }

        Ok(Column {
            name: name.to_string(),
            dtype,
            cells,
            max_width,
        })
    }

    fn row_ids(nrows: usize) -> Self {
        Column {
            name: ROW_ID_COLUMN.to_string(),
            dtype: DataType::UInt64,
            cells: (0..nrows).map(|i| Some(i.to_string())).collect(),
            max_width: nrows.saturating_sub(1).to_string().len(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Cell value, `None` when empty or out of range.
    pub fn cell(&self, row: usize) -> Option<&str> {
        self.cells.get(row).and_then(|c| c.as_deref())
    }

    /// Single line rendering for the grid.
    pub fn display(&self, row: usize) -> String {
        match self.cell(row) {
            Some(s) => Self::display_text(s),
            None => String::from("∅"),
        }
    }

    pub fn max_width(&self) -> usize {
        self.max_width
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.dtype,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
                | DataType::Float32
                | DataType::Float64
        )
    }

    fn display_text(s: &str) -> String {
        s.replace("\r\n", " ↵ ").replace('\n', " ↵ ")
    }
}

/// A loaded survey. Immutable once built; opening another file replaces it.
#[derive(Debug, Clone)]
pub struct SurveyTable {
    name: String,
    columns: Vec<Column>,
    nrows: usize,
    synthetic_row_id: bool,
}

impl SurveyTable {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn from_path(path: &Path) -> Result<Self, SVError> {
        let file_info = FileInfo::inspect(path)?;
        let name = file_info
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("???")
            .to_string();
        debug!("Reading {:?}", file_info);
        let bytes = fs::read(&file_info.path)?;
        info!("Read {} ({} bytes)", name, file_info.file_size);
        Self::parse(name, &bytes, file_info.file_type.separator())
    }

    pub fn from_csv_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self, SVError> {
        Self::parse(name.into(), bytes, FileType::CSV.separator())
    }

    pub fn example() -> Result<Self, SVError> {
        Self::from_csv_bytes("example_survey.csv", EXAMPLE_SURVEY.as_bytes())
    }

    #[instrument(skip(bytes), fields(bytes = bytes.len()))]
    fn parse(name: String, bytes: &[u8], separator: u8) -> Result<Self, SVError> {
        let start_time = Instant::now();
        let null_values = NullValues::AllColumns(NULL_TOKENS.iter().map(|&t| t.into()).collect());
        // Types are inferred from every row, a late text cell must not fail the load.
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(None)
            .with_parse_options(
                CsvParseOptions::default()
                    .with_separator(separator)
                    .with_null_values(Some(null_values)),
            )
            .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
            .finish()
            .map_err(|e| SVError::ParseError(e.to_string()))?;

        let table = Self::from_frame(name, &df)?;
        info!(
            "Loaded {} rows x {} columns in {}ms",
            table.nrows(),
            table.ncolumns(),
            start_time.elapsed().as_millis()
        );
        Ok(table)
    }

    /// Converts every column to text, one rayon task per column, and adds
    /// the row key column if the frame has none.
    pub fn from_frame(name: impl Into<String>, df: &DataFrame) -> Result<Self, SVError> {
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();

        let mut seen = HashSet::new();
        if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(SVError::DuplicateColumn(dup.clone()));
        }

        let loaded: Result<Vec<Column>, PolarsError> =
            names.par_iter().map(|n| Column::load(df, n)).collect();
        let mut columns = loaded?;

        let nrows = df.height();
        let synthetic_row_id = !names.iter().any(|n| n == ROW_ID_COLUMN);
        if synthetic_row_id {
            columns.insert(0, Column::row_ids(nrows));
        }
        for c in columns.iter() {
            debug!(
                "Column \"{}\" {:?}, max width {}, {} rows",
                c.name,
                c.dtype,
                c.max_width,
                c.len()
            );
        }

        Ok(SurveyTable {
            name: name.into(),
            columns,
            nrows,
            synthetic_row_id,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncolumns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.columns.get(column).and_then(|c| c.cell(row))
    }

    pub fn has_synthetic_row_id(&self) -> bool {
        self.synthetic_row_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURVEY_01: &[u8] = include_bytes!("../tests/fixtures/survey_01.csv");

    #[test]
    fn example_survey_gets_a_row_key() {
        let table = SurveyTable::example().unwrap();
        assert_eq!(table.nrows(), 5);
        assert_eq!(
            table.column_names(),
            vec![
                ROW_ID_COLUMN,
                "Response ID",
                "Name",
                "Satisfaction Score (1-10)",
                "What did you like most?",
                "What can we improve?",
            ]
        );
        assert!(table.has_synthetic_row_id());
        let ids: Vec<_> = (0..5).map(|r| table.cell(r, 0).unwrap()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
        assert_eq!(table.cell(2, 2), Some("Charlie Brown"));
    }

    #[test]
    fn structure_matches_source() {
        let table = SurveyTable::from_csv_bytes("survey_01.csv", SURVEY_01).unwrap();
        assert_eq!(table.nrows(), 4);
        assert_eq!(
            &table.column_names()[1..],
            &["Name", "Age", "Favourite colour", "Comments"]
        );
        // Quoted multi line answers stay intact, the grid flattens them.
        let comments = table.column_index("Comments").unwrap();
        assert_eq!(table.cell(0, comments), Some("Loved it.\nWould come again."));
        assert_eq!(
            table.column(comments).unwrap().display(0),
            "Loved it. ↵ Would come again."
        );
    }

    #[test]
    fn empty_fields_are_empty_cells() {
        let table = SurveyTable::from_csv_bytes("t.csv", SURVEY_01).unwrap();
        let age = table.column_index("Age").unwrap();
        let colour = table.column_index("Favourite colour").unwrap();
        assert_eq!(table.cell(1, age), None);
        assert_eq!(table.cell(2, colour), None);
        assert_eq!(table.column(colour).unwrap().display(2), "∅");
    }

    #[test]
    fn existing_row_key_is_kept() {
        let csv = b"Row_ID,Name\n10,A\n11,B\n";
        let table = SurveyTable::from_csv_bytes("t.csv", csv).unwrap();
        assert!(!table.has_synthetic_row_id());
        assert_eq!(table.column_names(), vec![ROW_ID_COLUMN, "Name"]);
        assert_eq!(table.cell(1, 0), Some("11"));
    }

    #[test]
    fn header_only_file_has_no_rows() {
        let table = SurveyTable::from_csv_bytes("t.csv", b"Name,Score\n").unwrap();
        assert_eq!(table.nrows(), 0);
        assert_eq!(table.column_names(), vec![ROW_ID_COLUMN, "Name", "Score"]);
    }

    #[test]
    fn late_text_in_a_numeric_column_still_loads() {
        let mut csv = String::from("Name,Age\n");
        for i in 0..150 {
            csv.push_str(&format!("P{i},{}\n", 20 + i % 50));
        }
        csv.push_str("Late,prefer not to say\n");
        let table = SurveyTable::from_csv_bytes("t.csv", csv.as_bytes()).unwrap();
        assert_eq!(table.nrows(), 151);
        let age = table.column_index("Age").unwrap();
        assert_eq!(table.cell(0, age), Some("20"));
        assert_eq!(table.cell(150, age), Some("prefer not to say"));
        assert!(!table.column(age).unwrap().is_numeric());
    }

    #[test]
    fn missing_value_markers_are_empty_cells() {
        let csv = b"Name,Answer\nA,NA\nB,\nC,N/A\nD,null\nE,yes\n";
        let table = SurveyTable::from_csv_bytes("t.csv", csv).unwrap();
        let answer = table.column_index("Answer").unwrap();
        let cells: Vec<_> = (0..5).map(|r| table.cell(r, answer)).collect();
        assert_eq!(cells, vec![None, None, None, None, Some("yes")]);
    }

    #[test]
    fn numeric_column_with_missing_markers_stays_numeric() {
        let csv = b"Name,Score\nA,3\nB,NaN\nC,7\n";
        let table = SurveyTable::from_csv_bytes("t.csv", csv).unwrap();
        let score = table.column_index("Score").unwrap();
        assert!(table.column(score).unwrap().is_numeric());
        assert_eq!(table.cell(1, score), None);
    }

    #[test]
    fn ragged_rows_fail_to_parse() {
        let csv = b"Name,Score\nA,1\nB,2,3,4\n";
        let result = SurveyTable::from_csv_bytes("t.csv", csv);
        assert!(matches!(result, Err(SVError::ParseError(_))));
    }

    #[test]
    fn empty_input_fails_to_parse() {
        let result = SurveyTable::from_csv_bytes("t.csv", b"");
        assert!(matches!(result, Err(SVError::ParseError(_))));
    }

    #[test]
    fn numeric_columns_are_detected() {
        let table = SurveyTable::from_csv_bytes("t.csv", SURVEY_01).unwrap();
        assert!(table.column(0).unwrap().is_numeric());
        assert!(!table.column(1).unwrap().is_numeric());
    }

    #[test]
    fn loads_from_path() {
        let table = SurveyTable::from_path(Path::new("tests/fixtures/survey_01.csv")).unwrap();
        assert_eq!(table.name(), "survey_01.csv");
        assert_eq!(table.nrows(), 4);
    }

    #[test]
    fn loads_tab_separated_files() {
        let table = SurveyTable::from_path(Path::new("tests/fixtures/responses.tsv")).unwrap();
        assert_eq!(table.column_names(), vec![ROW_ID_COLUMN, "Name", "Answer"]);
        assert_eq!(table.cell(1, 2), Some("no, thanks"));
    }

    #[test]
    fn missing_file_is_reported() {
        let result = SurveyTable::from_path(Path::new("tests/fixtures/does_not_exist.csv"));
        assert!(matches!(result, Err(SVError::FileNotFound(_))));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let result = SurveyTable::from_path(Path::new("Cargo.toml"));
        assert!(matches!(result, Err(SVError::UnknownFileType(_))));
    }

    #[test]
    fn directories_are_rejected() {
        let result = SurveyTable::from_path(Path::new("tests/fixtures"));
        assert!(matches!(result, Err(SVError::LoadingFailed(_))));
    }
}
