use std::collections::VecDeque;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Overview,
    Detail,
    QuestionAnalysis,
}

impl ViewMode {
    pub const ALL: [ViewMode; 3] = [
        ViewMode::Overview,
        ViewMode::Detail,
        ViewMode::QuestionAnalysis,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ViewMode::Overview => "Overview & Sorting",
            ViewMode::Detail => "Individual Detail View",
            ViewMode::QuestionAnalysis => "Question Analysis View",
        }
    }

    pub fn position(&self) -> usize {
        match self {
            ViewMode::Overview => 0,
            ViewMode::Detail => 1,
            ViewMode::QuestionAnalysis => 2,
        }
    }

    pub fn from_position(idx: usize) -> Self {
        Self::ALL[idx.min(Self::ALL.len() - 1)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionEvent {
    /// A row was picked in the overview grid. Carries the table row index.
    RowClicked(usize),
    /// The respondent selector changed. Only honoured in the detail view.
    RecordChosen(usize),
    ModeChosen(ViewMode),
}

/// Selection values every control of one render pass is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPass {
    pub mode: ViewMode,
    pub selected_row: usize,
    pub row_count: usize,
}

/// Session wide selection: the active view and the selected row.
///
/// Widgets never write the state directly. They queue a [`SelectionEvent`]
/// and the queue is drained by [`SelectionState::begin_pass`] before any
/// control of the next pass is constructed, so the row selector and the
/// mode radio never show values from the previous pass.
#[derive(Debug)]
pub struct SelectionState {
    mode: ViewMode,
    selected_row: usize,
    pending: VecDeque<SelectionEvent>,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionState {
    pub fn new() -> Self {
        SelectionState {
            mode: ViewMode::Overview,
            selected_row: 0,
            pending: VecDeque::new(),
        }
    }

    pub fn push(&mut self, event: SelectionEvent) {
        trace!("Queued selection event {:?}", event);
        self.pending.push_back(event);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Applies queued events in arrival order, then clamps the row against
    /// `row_count`.
    pub fn begin_pass(&mut self, row_count: usize) -> RenderPass {
        while let Some(event) = self.pending.pop_front() {
            self.apply(event);
        }
        if self.selected_row >= row_count {
            if self.selected_row > 0 {
                trace!(
                    "Selected row {} out of range for {} rows, resetting",
                    self.selected_row, row_count
                );
            }
            self.selected_row = 0;
        }
        RenderPass {
            mode: self.mode,
            selected_row: self.selected_row,
            row_count,
        }
    }

    fn apply(&mut self, event: SelectionEvent) {
        match event {
            SelectionEvent::RowClicked(row) => {
                self.selected_row = row;
                self.mode = ViewMode::Detail;
            }
            SelectionEvent::RecordChosen(row) => {
                if self.mode == ViewMode::Detail {
                    self.selected_row = row;
                } else {
                    trace!("Ignoring record choice {} outside detail view", row);
                }
            }
            SelectionEvent::ModeChosen(mode) => self.mode = mode,
        }
    }

    /// Mode as of the last pass.
    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    /// Row as of the last pass.
    pub fn selected_row(&self) -> usize {
        self.selected_row
    }
}
