use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;
use std::fmt;
use std::io::Error;
use std::path::PathBuf;

use crate::session::ViewMode;

pub const HELP_TEXT: &str = "\
Navigation
  Tab / Shift-Tab   cycle focus: content, identifier, view mode, selector
  Up/Down, j/k      move within the focused control
  PgUp/PgDn         move by a page
  Home/g, End/G     jump to first / last entry
  Left/Right, h/l   move the grid column cursor
  Esc               back to the overview, or return focus to the content

Views
  1 2 3             Overview & Sorting, Individual Detail, Question Analysis
  Enter             open the respondent under the grid cursor
  n / p             next / previous respondent or question
  :                 jump to a respondent row

Data
  s / S             sort grid by the current column (asc / desc)
  c / C             copy cell or answer / copy row as CSV
  o                 open a CSV file
  e                 load the example survey

  ?  help            q  quit";

#[derive(Debug)]
pub enum SVError {
    IoError(Error),
    PolarsError(PolarsError),
    ParseError(String),
    DuplicateColumn(String),
    LoadingFailed(String),
    InvalidArgument(String),
    FileNotFound(PathBuf),
    PermissionDenied(PathBuf),
    UnknownFileType(PathBuf),
}

impl fmt::Display for SVError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SVError::IoError(e) => write!(f, "I/O error: {e}"),
            SVError::PolarsError(e) => write!(f, "Error reading CSV: {e}"),
            SVError::ParseError(msg) => write!(f, "Error reading CSV: {msg}"),
            SVError::DuplicateColumn(name) => {
                write!(f, "Error reading CSV: duplicate column \"{name}\"")
            }
            SVError::LoadingFailed(msg) => write!(f, "Loading failed: {msg}"),
            SVError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            SVError::FileNotFound(path) => write!(f, "File not found: {}", path.display()),
            SVError::PermissionDenied(path) => {
                write!(f, "Permission denied: {}", path.display())
            }
            SVError::UnknownFileType(path) => {
                write!(f, "Not a CSV or TSV file: {}", path.display())
            }
        }
    }
}

impl std::error::Error for SVError {}

impl From<Error> for SVError {
    fn from(err: Error) -> Self {
        SVError::IoError(err)
    }
}

impl From<PolarsError> for SVError {
    fn from(err: PolarsError) -> Self {
        SVError::PolarsError(err)
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct SVConfig {
    /// Milliseconds to wait for a terminal event before redrawing.
    pub event_poll_time: u64,
    pub max_column_width: usize,
    pub sidebar_width: usize,
    /// Rows moved by PgUp/PgDn in the respondent selector.
    pub page_size: usize,
    /// Preferred identifier column, applied on every load when present.
    #[setters(strip_option)]
    pub identifier: Option<String>,
}

impl Default for SVConfig {
    fn default() -> Self {
        SVConfig {
            event_poll_time: 100,
            max_column_width: 40,
            sidebar_width: 34,
            page_size: 10,
            identifier: None,
        }
    }
}

/// What the status line prompt is collecting input for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    OpenFile,
    GotoRecord,
}

impl CMDMode {
    pub fn prompt(&self) -> &'static str {
        match self {
            CMDMode::OpenFile => "Open: ",
            CMDMode::GotoRecord => "Row: ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    Enter,
    Exit,
    FocusNext,
    FocusPrevious,
    ShowView(ViewMode),
    NextItem,
    PreviousItem,
    GotoRecord,
    SortAscending,
    SortDescending,
    CopyCell,
    CopyRow,
    OpenFile,
    LoadExample,
    Help,
    Resize(usize, usize),
    RawKey(KeyEvent),
}
