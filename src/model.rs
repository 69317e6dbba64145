use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn};

use crate::domain::{CMDMode, HELP_TEXT, Message, SVConfig, SVError};
use crate::inputter::{InputResult, Inputter};
use crate::registry::ColumnRegistry;
use crate::render::{self, LabeledBlock};
use crate::session::{RenderPass, SelectionEvent, SelectionState, ViewMode};
use crate::table::{Column, SurveyTable};
use crate::ui::{
    COLUMN_SPACING, COLUMN_WIDTH_MARGIN, CONTENT_BORDER, CONTENT_HEADING_HEIGHT,
    STATUSLINE_HEIGHT, TABLE_HEADER_HEIGHT, TITLE_HEIGHT,
};

#[derive(Debug, PartialEq)]
pub enum Status {
    Empty,
    Ready,
    Quitting,
}

/// Which control receives movement keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Content,
    Identifier,
    ViewMode,
    /// Respondent selector in the detail view, question selector in the question view.
    Selector,
}

impl Focus {
    const ORDER: [Focus; 4] = [
        Focus::Content,
        Focus::Identifier,
        Focus::ViewMode,
        Focus::Selector,
    ];
}

#[derive(Clone, Debug)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
}

/// A list control (dropdown or radio group) as shown in one render pass.
#[derive(Clone, Debug)]
pub struct SelectorView {
    pub title: String,
    pub options: Vec<String>,
    pub selected: usize,
}

#[derive(Clone, Debug)]
pub struct SidebarData {
    pub source: String,
    pub identifier: SelectorView,
    pub view_mode: SelectorView,
    pub selector: Option<SelectorView>,
}

#[derive(Clone, Debug)]
pub struct GridData {
    pub columns: Vec<ColumnView>,
    pub nrows: usize,
    pub selected_row: usize, // Relative to the first visible row
    pub selected_column: usize, // Relative to the first visible column
    pub abs_selected_row: usize,
    pub sort: Option<String>,
}

#[derive(Clone, Debug)]
pub struct BlocksData {
    pub heading: String,
    pub blocks: Vec<LabeledBlock>,
    pub offset: usize,
    pub selected: usize,
}

#[derive(Clone, Debug)]
pub enum ContentData {
    Welcome,
    LoadError(String),
    Overview(GridData),
    Detail(BlocksData),
    Question(BlocksData),
}

pub struct UIData {
    pub name: String,
    pub sidebar: Option<SidebarData>,
    pub content: ContentData,
    pub focus: Focus,
    pub show_popup: bool,
    pub popup_message: String,
    pub layout: UILayout,
    pub cmdinput: InputResult,
    pub cmd_mode: Option<CMDMode>,
    pub active_cmdinput: bool,
    pub status_message: String,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            name: String::new(),
            sidebar: None,
            content: ContentData::Welcome,
            focus: Focus::Content,
            show_popup: false,
            popup_message: String::new(),
            layout: UILayout::default(),
            cmdinput: InputResult::default(),
            cmd_mode: None,
            active_cmdinput: false,
            status_message: String::new(),
        }
    }
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub sidebar_width: usize,
    pub content_width: usize,
    pub grid_width: usize,
    pub grid_height: usize,
    pub blocks_height: usize,
}

impl UILayout {
    pub fn from_values(sidebar_width: usize, ui_width: usize, ui_height: usize) -> Self {
        let sidebar_width = std::cmp::min(sidebar_width, ui_width / 2);
        let content_width = ui_width - sidebar_width;
        let content_height = ui_height.saturating_sub(TITLE_HEIGHT + STATUSLINE_HEIGHT);
        let body_height = content_height.saturating_sub(CONTENT_HEADING_HEIGHT);

        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            sidebar_width,
            content_width,
            grid_width: content_width.saturating_sub(CONTENT_BORDER),
            grid_height: body_height
                .saturating_sub(CONTENT_BORDER + TABLE_HEADER_HEIGHT)
                .max(1),
            blocks_height: body_height.max(1),
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

struct Survey {
    table: SurveyTable,
    registry: ColumnRegistry,
    source: String,
}

/// The response grid of the overview. Rows can be reordered by sorting,
/// `rows` maps display positions back to table rows.
struct GridView {
    rows: Vec<usize>,
    column_widths: Vec<usize>,
    selected_row: usize, // Display position
    selected_column: usize,
    offset_row: usize,
    offset_column: usize,
    sort: Option<(usize, bool)>,
}

impl GridView {
    fn empty() -> Self {
        GridView {
            rows: Vec::new(),
            column_widths: Vec::new(),
            selected_row: 0,
            selected_column: 0,
            offset_row: 0,
            offset_column: 0,
            sort: None,
        }
    }

    fn for_table(table: &SurveyTable, max_column_width: usize) -> Self {
        GridView {
            rows: (0..table.nrows()).collect(),
            column_widths: table
                .columns()
                .iter()
                .map(|c| Self::column_width(c, max_column_width))
                .collect(),
            ..GridView::empty()
        }
    }

    fn column_width(column: &Column, max_column_width: usize) -> usize {
        let width =
            std::cmp::max(column.name().chars().count(), column.max_width()) + COLUMN_WIDTH_MARGIN;
        std::cmp::min(width, max_column_width)
    }

    fn selected_table_row(&self) -> Option<usize> {
        self.rows.get(self.selected_row).copied()
    }

    // (column idx, render width) of the columns fitting into `width`, the last one possibly cut.
    fn visible_columns(&self, offset: usize, width: usize) -> Vec<(usize, usize)> {
        let mut visible = Vec::new();
        let mut used = 0;
        for (idx, &column_width) in self.column_widths.iter().enumerate().skip(offset) {
            if used + column_width + COLUMN_SPACING <= width {
                visible.push((idx, column_width));
                used += column_width + COLUMN_SPACING;
            } else {
                if used < width {
                    visible.push((idx, width - used));
                }
                break;
            }
        }
        visible
    }

    fn scroll_into_view(&mut self, layout: &UILayout) {
        if self.rows.is_empty() {
            self.selected_row = 0;
            self.offset_row = 0;
        } else {
            self.selected_row = std::cmp::min(self.selected_row, self.rows.len() - 1);
            if self.selected_row < self.offset_row {
                self.offset_row = self.selected_row;
            } else if self.selected_row >= self.offset_row + layout.grid_height {
                self.offset_row = self.selected_row + 1 - layout.grid_height;
            }
        }

        self.selected_column = std::cmp::min(
            self.selected_column,
            self.column_widths.len().saturating_sub(1),
        );
        if self.selected_column < self.offset_column {
            self.offset_column = self.selected_column;
        }
        while self.offset_column < self.selected_column {
            let fully_visible = self
                .visible_columns(self.offset_column, layout.grid_width)
                .iter()
                .any(|&(idx, w)| idx == self.selected_column && w == self.column_widths[idx]);
            if fully_visible {
                break;
            }
            self.offset_column += 1;
        }
    }

    fn build(&mut self, table: &SurveyTable, layout: &UILayout) -> GridData {
        self.scroll_into_view(layout);

        let rbegin = self.offset_row;
        let rend = std::cmp::min(rbegin + layout.grid_height, self.rows.len());
        let visible = self.visible_columns(self.offset_column, layout.grid_width);
        trace!(
            "Grid: sel {}:{}, offset {}:{}, rows {}..{}, visible {:?}",
            self.selected_row,
            self.selected_column,
            self.offset_row,
            self.offset_column,
            rbegin,
            rend,
            visible
        );

        let columns = visible
            .iter()
            .filter_map(|&(idx, width)| {
                let column = table.column(idx)?;
                Some(ColumnView {
                    name: Self::visible_name(column.name(), width),
                    width,
                    data: self.rows[rbegin..rend]
                        .iter()
                        .map(|&row| column.display(row))
                        .collect(),
                })
            })
            .collect();

        GridData {
            columns,
            nrows: self.rows.len(),
            selected_row: self.selected_row - self.offset_row,
            selected_column: visible
                .iter()
                .position(|&(idx, _)| idx == self.selected_column)
                .unwrap_or(0),
            abs_selected_row: self.selected_row,
            sort: self.sort.and_then(|(idx, ascending)| {
                table.column(idx).map(|c| {
                    format!("{} {}", c.name(), if ascending { "▲" } else { "▼" })
                })
            }),
        }
    }

    fn visible_name(name: &str, width: usize) -> String {
        if width < 3 {
            return String::new();
        }
        if name.chars().count() > width {
            let mut reduced: String = name.chars().take(width - 3).collect();
            reduced.push_str("...");
            reduced
        } else {
            name.to_string()
        }
    }

    /// Reorders the display rows. The selection stays on the same table row.
    fn sort_by_column(&mut self, table: &SurveyTable, column_idx: usize, ascending: bool) {
        let Some(column) = table.column(column_idx) else {
            return;
        };
        let selected = self.selected_table_row();
        let numeric = column.is_numeric();

        let mut rows: Vec<usize> = (0..table.nrows()).collect();
        rows.sort_by(|&a, &b| Self::compare_cells(column.cell(a), column.cell(b), numeric, ascending));

        if let Some(row) = selected {
            self.selected_row = rows.iter().position(|&r| r == row).unwrap_or(0);
        }
        self.rows = rows;
        self.sort = Some((column_idx, ascending));
    }

    // Empty cells always go last. Numeric columns compare as floats, cells
    // that do not parse fall back to text ordering after the numbers.
    fn compare_cells(a: Option<&str>, b: Option<&str>, numeric: bool, ascending: bool) -> Ordering {
        let (a, b) = match (a, b) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Greater,
            (Some(_), None) => return Ordering::Less,
            (Some(a), Some(b)) => (a, b),
        };
        let ordering = if numeric {
            match (a.parse::<f64>(), b.parse::<f64>()) {
                (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                (Ok(_), Err(_)) => Ordering::Less,
                (Err(_), Ok(_)) => Ordering::Greater,
                (Err(_), Err(_)) => a.cmp(b),
            }
        } else {
            a.cmp(b)
        };
        if ascending { ordering } else { ordering.reverse() }
    }
}

/// Cursor and scroll offset over the labeled blocks of the detail and question views.
#[derive(Default)]
struct BlockView {
    key: Option<(ViewMode, usize)>,
    blocks: Vec<LabeledBlock>,
    cursor: usize,
    offset: usize,
}

impl BlockView {
    fn build(
        &mut self,
        key: (ViewMode, usize),
        heading: String,
        blocks: Vec<LabeledBlock>,
        layout: &UILayout,
    ) -> BlocksData {
        if self.key != Some(key) {
            self.key = Some(key);
            self.cursor = 0;
            self.offset = 0;
        }
        self.cursor = std::cmp::min(self.cursor, blocks.len().saturating_sub(1));
        self.offset = std::cmp::min(self.offset, self.cursor);
        while self.offset < self.cursor
            && Self::span(&blocks[self.offset..=self.cursor], layout.content_width)
                > layout.blocks_height
        {
            self.offset += 1;
        }
        self.blocks = blocks;

        BlocksData {
            heading,
            blocks: self.blocks.clone(),
            offset: self.offset,
            selected: self.cursor,
        }
    }

    fn span(blocks: &[LabeledBlock], width: usize) -> usize {
        blocks.iter().map(|b| render::block_height(b, width)).sum()
    }

    fn clear(&mut self) {
        self.key = None;
        self.blocks.clear();
    }
}

pub struct Model {
    config: SVConfig,
    pub status: Status,
    survey: Option<Survey>,
    load_error: Option<String>,
    session: SelectionState,
    question: usize, // Index into ColumnRegistry::answer_columns()
    grid: GridView,
    block_view: BlockView,
    focus: Focus,
    show_popup: bool,
    uilayout: UILayout,
    uidata: UIData,
    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    active_cmdinput: bool,
    status_message: String,
}

impl Model {
    pub fn init(config: &SVConfig, ui_width: usize, ui_height: usize) -> Result<Self, SVError> {
        let mut model = Self {
            config: config.clone(),
            status: Status::Empty,
            survey: None,
            load_error: None,
            session: SelectionState::new(),
            question: 0,
            grid: GridView::empty(),
            block_view: BlockView::default(),
            focus: Focus::Content,
            show_popup: false,
            uilayout: UILayout::from_values(config.sidebar_width, ui_width, ui_height),
            uidata: UIData::empty(),
            clipboard: None,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
            status_message: "Started sv!".to_string(),
        };
        model.update_uidata();
        Ok(model)
    }

    pub fn load_data_file(&mut self, path: &Path) -> Result<(), SVError> {
        match SurveyTable::from_path(path) {
            Ok(table) => {
                self.install_survey(table, path.display().to_string());
                Ok(())
            }
            Err(e) => {
                self.fail_load(&e);
                Err(e)
            }
        }
    }

    pub fn load_example(&mut self) -> Result<(), SVError> {
        match SurveyTable::example() {
            Ok(table) => {
                self.install_survey(table, "Example survey".to_string());
                Ok(())
            }
            Err(e) => {
                self.fail_load(&e);
                Err(e)
            }
        }
    }

    // The selection state is kept across loads and clamped by the next pass.
    fn install_survey(&mut self, table: SurveyTable, source: String) {
        let mut registry = ColumnRegistry::resolve(&table);
        let mut message = format!(
            "Loaded {} responses to {} questions",
            table.nrows(),
            registry.answer_columns().len()
        );
        if let Some(name) = &self.config.identifier
            && !registry.set_identifier_by_name(name)
        {
            warn!("Identifier column \"{name}\" not found in {source}");
            message = format!(
                "Identifier column \"{}\" not found, using \"{}\"",
                name,
                registry.identifier_name()
            );
        }
        info!("{message} from {source}");

        self.grid = GridView::for_table(&table, self.config.max_column_width);
        self.block_view.clear();
        self.survey = Some(Survey {
            table,
            registry,
            source,
        });
        self.load_error = None;
        self.status = Status::Ready;
        self.set_status_message(message);
        self.update_uidata();
    }

    fn fail_load(&mut self, err: &SVError) {
        error!("Loading failed: {err}");
        self.survey = None;
        self.grid = GridView::empty();
        self.block_view.clear();
        self.load_error = Some(err.to_string());
        self.status = Status::Empty;
        self.set_status_message(err.to_string());
        self.update_uidata();
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.uidata.status_message = self.status_message.clone();
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput
    }

    pub fn quit(&mut self) {
        self.status = Status::Quitting;
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout::from_values(self.config.sidebar_width, width, height);
    }

    // ------------------------- Render pass ---------------------------- //

    /// Builds the snapshot the UI draws. Queued selection events are applied
    /// first so every control of this pass shows the same selection.
    fn update_uidata(&mut self) {
        let (name, sidebar, content) = match self.survey.as_ref() {
            None => {
                let content = match &self.load_error {
                    Some(e) => ContentData::LoadError(e.clone()),
                    None => ContentData::Welcome,
                };
                (String::new(), None, content)
            }
            Some(survey) => {
                if self.session.has_pending() {
                    trace!("Applying queued selection events before building controls");
                }
                let pass = self.session.begin_pass(survey.table.nrows());
                let questions = survey.registry.answer_columns();
                self.question = std::cmp::min(self.question, questions.len().saturating_sub(1));
                if self.focus == Focus::Selector && pass.mode == ViewMode::Overview {
                    self.focus = Focus::Content;
                }

                let sidebar = Self::build_sidebar(survey, &pass, &questions, self.question);
                let content = match pass.mode {
                    ViewMode::Overview => {
                        self.block_view.clear();
                        ContentData::Overview(self.grid.build(&survey.table, &self.uilayout))
                    }
                    ViewMode::Detail => {
                        let heading = if pass.row_count == 0 {
                            "No responses".to_string()
                        } else {
                            render::identifier_value(
                                &survey.table,
                                &survey.registry,
                                pass.selected_row,
                            )
                            .to_string()
                        };
                        let blocks = render::detail_blocks(
                            &survey.table,
                            &survey.registry,
                            pass.selected_row,
                        );
                        ContentData::Detail(self.block_view.build(
                            (ViewMode::Detail, pass.selected_row),
                            heading,
                            blocks,
                            &self.uilayout,
                        ))
                    }
                    ViewMode::QuestionAnalysis => {
                        let (column, heading, blocks) = match questions.get(self.question) {
                            Some(&column) => (
                                column,
                                survey
                                    .table
                                    .column(column)
                                    .map(|c| c.name().to_string())
                                    .unwrap_or_default(),
                                render::question_blocks(&survey.table, &survey.registry, column),
                            ),
                            // Only the row key: nothing to analyse
                            None => (usize::MAX, "No questions".to_string(), Vec::new()),
                        };
                        ContentData::Question(self.block_view.build(
                            (ViewMode::QuestionAnalysis, column),
                            heading,
                            blocks,
                            &self.uilayout,
                        ))
                    }
                };
                (survey.table.name().to_string(), Some(sidebar), content)
            }
        };

        self.uidata = UIData {
            name,
            sidebar,
            content,
            focus: self.focus,
            show_popup: self.show_popup,
            popup_message: HELP_TEXT.to_string(),
            layout: self.uilayout.clone(),
            cmdinput: self.last_input.clone(),
            cmd_mode: self.cmd_mode,
            active_cmdinput: self.active_cmdinput,
            status_message: self.status_message.clone(),
        };
    }

    fn build_sidebar(
        survey: &Survey,
        pass: &RenderPass,
        questions: &[usize],
        question: usize,
    ) -> SidebarData {
        let table = &survey.table;
        let registry = &survey.registry;

        let selector = match pass.mode {
            ViewMode::Overview => None,
            ViewMode::Detail => Some(SelectorView {
                title: "Viewing Record".to_string(),
                options: (0..pass.row_count)
                    .map(|row| render::record_label(table, registry, row))
                    .collect(),
                selected: pass.selected_row,
            }),
            ViewMode::QuestionAnalysis => Some(SelectorView {
                title: "Question".to_string(),
                options: questions
                    .iter()
                    .filter_map(|&idx| table.column(idx).map(|c| c.name().to_string()))
                    .collect(),
                selected: question,
            }),
        };

        SidebarData {
            source: format!(
                "{}\n{} rows, {} columns",
                survey.source,
                table.nrows(),
                questions.len()
            ),
            identifier: SelectorView {
                title: "Name/Identifier Column".to_string(),
                options: registry.names().iter().map(|n| n.to_string()).collect(),
                selected: registry.identifier(),
            },
            view_mode: SelectorView {
                title: "View Mode".to_string(),
                options: ViewMode::ALL.iter().map(|m| m.label().to_string()).collect(),
                selected: pass.mode.position(),
            },
            selector,
        }
    }

    // ------------------------- Message handling ------------------------ //

    pub fn update(&mut self, message: Option<Message>) -> Result<(), SVError> {
        let Some(msg) = message else {
            return Ok(());
        };
        trace!("Update: focus {:?}, message {:?}", self.focus, msg);

        if self.active_cmdinput {
            match msg {
                Message::RawKey(key) => self.raw_input(key),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => (),
            }
        } else if self.show_popup {
            match msg {
                Message::Quit => self.quit(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::Exit | Message::Enter | Message::Help => self.show_popup = false,
                _ => (),
            }
        } else {
            self.handle_message(msg);
        }

        self.update_uidata();
        Ok(())
    }

    fn handle_message(&mut self, msg: Message) {
        match msg {
            Message::Quit => self.quit(),
            Message::Help => self.show_popup = true,
            Message::Resize(width, height) => self.ui_resize(width, height),
            Message::OpenFile => self.enter_cmd_mode(CMDMode::OpenFile),
            Message::LoadExample => {
                if let Err(e) = self.load_example() {
                    debug!("Example survey failed to load: {e}");
                }
            }
            _ if self.survey.is_none() => trace!("No survey loaded, ignoring {msg:?}"),
            Message::FocusNext => self.cycle_focus(true),
            Message::FocusPrevious => self.cycle_focus(false),
            Message::ShowView(mode) => self.choose_mode(mode),
            Message::Enter => self.enter(),
            Message::Exit => self.exit(),
            Message::NextItem => self.step_item(Message::MoveDown),
            Message::PreviousItem => self.step_item(Message::MoveUp),
            Message::GotoRecord => {
                if self.session.mode() == ViewMode::Detail {
                    self.enter_cmd_mode(CMDMode::GotoRecord);
                } else {
                    self.set_status_message("Jumping to a row works in the Individual Detail View");
                }
            }
            Message::SortAscending => self.sort_current_column(true),
            Message::SortDescending => self.sort_current_column(false),
            Message::CopyCell => self.copy_cell(),
            Message::CopyRow => self.copy_row(),
            Message::MoveUp
            | Message::MoveDown
            | Message::MoveLeft
            | Message::MoveRight
            | Message::MovePageUp
            | Message::MovePageDown
            | Message::MoveBeginning
            | Message::MoveEnd => self.move_focused(msg),
            Message::RawKey(_) => (),
        }
    }

    fn step_index(current: usize, len: usize, msg: &Message, page: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let last = len - 1;
        match msg {
            Message::MoveUp => current.saturating_sub(1),
            Message::MoveDown => std::cmp::min(current + 1, last),
            Message::MovePageUp => current.saturating_sub(page),
            Message::MovePageDown => std::cmp::min(current + page, last),
            Message::MoveBeginning => 0,
            Message::MoveEnd => last,
            _ => std::cmp::min(current, last),
        }
    }

    fn move_focused(&mut self, msg: Message) {
        let mode = self.session.mode();
        match self.focus {
            Focus::Identifier => self.move_identifier(&msg),
            Focus::ViewMode => {
                let next = Self::step_index(mode.position(), ViewMode::ALL.len(), &msg, 1);
                self.choose_mode(ViewMode::from_position(next));
            }
            Focus::Selector => self.step_item(msg),
            Focus::Content => match mode {
                ViewMode::Overview => self.move_grid(&msg),
                ViewMode::Detail | ViewMode::QuestionAnalysis => {
                    self.block_view.cursor = Self::step_index(
                        self.block_view.cursor,
                        self.block_view.blocks.len(),
                        &msg,
                        self.config.page_size,
                    );
                }
            },
        }
    }

    fn move_identifier(&mut self, msg: &Message) {
        let page = self.config.page_size;
        if let Some(survey) = self.survey.as_mut() {
            let registry = &mut survey.registry;
            let next = Self::step_index(registry.identifier(), registry.len(), msg, page);
            registry.set_identifier(next);
        }
    }

    fn move_grid(&mut self, msg: &Message) {
        let grid = &mut self.grid;
        match msg {
            Message::MoveLeft => grid.selected_column = grid.selected_column.saturating_sub(1),
            Message::MoveRight => {
                if grid.selected_column + 1 < grid.column_widths.len() {
                    grid.selected_column += 1;
                }
            }
            _ => {
                grid.selected_row = Self::step_index(
                    grid.selected_row,
                    grid.rows.len(),
                    msg,
                    self.uilayout.grid_height,
                );
            }
        }
    }

    /// Moves the respondent or question selector, or the grid row in the overview.
    fn step_item(&mut self, msg: Message) {
        let Some(survey) = self.survey.as_ref() else {
            return;
        };
        match self.session.mode() {
            ViewMode::Overview => self.move_grid(&msg),
            ViewMode::Detail => {
                let row = Self::step_index(
                    self.session.selected_row(),
                    survey.table.nrows(),
                    &msg,
                    self.config.page_size,
                );
                self.session.push(SelectionEvent::RecordChosen(row));
            }
            ViewMode::QuestionAnalysis => {
                self.question = Self::step_index(
                    self.question,
                    survey.registry.answer_columns().len(),
                    &msg,
                    self.config.page_size,
                );
            }
        }
    }

    fn choose_mode(&mut self, mode: ViewMode) {
        self.session.push(SelectionEvent::ModeChosen(mode));
    }

    fn cycle_focus(&mut self, forward: bool) {
        let with_selector = self.session.mode() != ViewMode::Overview;
        let order: Vec<Focus> = Focus::ORDER
            .iter()
            .copied()
            .filter(|f| with_selector || *f != Focus::Selector)
            .collect();
        let current = order.iter().position(|f| *f == self.focus).unwrap_or(0);
        let next = if forward {
            (current + 1) % order.len()
        } else {
            (current + order.len() - 1) % order.len()
        };
        self.focus = order[next];
        trace!("Focus moved to {:?}", self.focus);
    }

    fn enter(&mut self) {
        if self.focus != Focus::Content {
            self.focus = Focus::Content;
            return;
        }
        if self.session.mode() == ViewMode::Overview
            && let Some(row) = self.grid.selected_table_row()
        {
            debug!("Row {row} clicked");
            self.session.push(SelectionEvent::RowClicked(row));
        }
    }

    fn exit(&mut self) {
        if self.focus != Focus::Content {
            self.focus = Focus::Content;
        } else if self.session.mode() != ViewMode::Overview {
            self.choose_mode(ViewMode::Overview);
        }
    }

    fn sort_current_column(&mut self, ascending: bool) {
        if self.session.mode() != ViewMode::Overview {
            return;
        }
        let Some(survey) = self.survey.as_ref() else {
            return;
        };
        let column = self.grid.selected_column;
        self.grid.sort_by_column(&survey.table, column, ascending);
        let message = match survey.table.column(column) {
            Some(c) => format!(
                "Sorted by \"{}\" {}",
                c.name(),
                if ascending { "ascending" } else { "descending" }
            ),
            None => return,
        };
        self.set_status_message(message);
    }

    // ------------------------- Clipboard ------------------------------- //

    fn wrap_cell_content(c: &str) -> String {
        let needs_escaping = c.contains('"');
        let needs_wrapping = c.chars().any(|c| matches!(c, ' ' | '\t' | ',' | '\n' | '"'));
        let mut out = String::from(c);

        if needs_escaping {
            out = out.replace('"', "\"\"");
        }
        if needs_wrapping {
            out = format!("\"{out}\"");
        }
        out
    }

    fn copy_cell(&mut self) {
        let text = match self.session.mode() {
            ViewMode::Overview => {
                let Some(survey) = self.survey.as_ref() else {
                    return;
                };
                match self.grid.selected_table_row() {
                    Some(row) => survey
                        .table
                        .cell(row, self.grid.selected_column)
                        .unwrap_or("")
                        .to_string(),
                    None => return,
                }
            }
            ViewMode::Detail | ViewMode::QuestionAnalysis => {
                match self.block_view.blocks.get(self.block_view.cursor) {
                    Some(block) => block.value.clone(),
                    None => return,
                }
            }
        };
        self.set_clipboard(text, "cell");
    }

    fn copy_row(&mut self) {
        let Some(survey) = self.survey.as_ref() else {
            return;
        };
        let row = match self.session.mode() {
            ViewMode::Overview => self.grid.selected_table_row(),
            ViewMode::Detail => Some(self.session.selected_row()),
            ViewMode::QuestionAnalysis => None,
        };
        let Some(row) = row.filter(|&r| r < survey.table.nrows()) else {
            self.set_status_message("No row to copy");
            return;
        };
        let skip = usize::from(survey.table.has_synthetic_row_id());
        let content = survey
            .table
            .columns()
            .iter()
            .skip(skip)
            .map(|c| Self::wrap_cell_content(c.cell(row).unwrap_or("")))
            .collect::<Vec<String>>()
            .join(",");
        self.set_clipboard(content, "row");
    }

    fn set_clipboard(&mut self, text: String, what: &str) {
        trace!("Copy {what}: {text}");
        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => warn!("Clipboard unavailable: {:?}", e),
            }
        }
        let result = match self.clipboard.as_mut() {
            Some(clipboard) => clipboard.set_text(text).map_err(|e| e.to_string()),
            None => Err("clipboard unavailable".to_string()),
        };
        match result {
            Ok(_) => self.set_status_message(format!("Copied {what} to clipboard")),
            Err(e) => self.set_status_message(format!("Copy failed: {e}")),
        }
    }

    // ------------------------- Command input --------------------------- //

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        trace!("Entering command mode {:?} ...", mode);
        self.cmd_mode = Some(mode);
        self.active_cmdinput = true;
        self.input.clear();
        if mode == CMDMode::GotoRecord {
            self.input.set(&self.session.selected_row().to_string());
        }
        self.last_input = self.input.get();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        self.last_input = self.input.read(key);
        if self.last_input.finished {
            self.handle_cmd_input();
        }
    }

    fn handle_cmd_input(&mut self) {
        let result = std::mem::take(&mut self.last_input);
        self.active_cmdinput = false;
        self.input.clear();
        let mode = self.cmd_mode.take();
        trace!("Handle cmd input {:?} for {:?}", result.input, mode);

        if result.canceled {
            return;
        }
        match mode {
            Some(CMDMode::OpenFile) => self.open_path(result.input.trim()),
            Some(CMDMode::GotoRecord) => match result.input.trim().parse::<usize>() {
                Ok(row) => self.session.push(SelectionEvent::RecordChosen(row)),
                Err(_) => self.set_status_message(format!("Not a row number: {}", result.input)),
            },
            None => info!("Cmd mode is none!"),
        }
    }

    fn open_path(&mut self, input: &str) {
        if input.is_empty() {
            return;
        }
        match shellexpand::full(input) {
            Ok(expanded) => {
                let path = PathBuf::from(expanded.as_ref());
                if let Err(e) = self.load_data_file(&path) {
                    debug!("Opening {} failed: {e}", path.display());
                }
            }
            Err(e) => self.set_status_message(format!("Cannot expand path: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::{KeyCode, KeyModifiers};

    fn model() -> Model {
        Model::init(&SVConfig::default(), 120, 40).unwrap()
    }

    fn example_model() -> Model {
        let mut model = model();
        model.load_example().unwrap();
        model
    }

    fn send(model: &mut Model, messages: &[Message]) {
        for msg in messages {
            model.update(Some(msg.clone())).unwrap();
        }
    }

    fn type_keys(model: &mut Model, s: &str) {
        for c in s.chars() {
            let key = KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE);
            model.update(Some(Message::RawKey(key))).unwrap();
        }
        let enter = KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE);
        model.update(Some(Message::RawKey(enter))).unwrap();
    }

    fn sidebar(model: &Model) -> &SidebarData {
        model.get_uidata().sidebar.as_ref().unwrap()
    }

    fn blocks(model: &Model) -> &BlocksData {
        match &model.get_uidata().content {
            ContentData::Detail(b) | ContentData::Question(b) => b,
            other => panic!("expected blocks, got {other:?}"),
        }
    }

    #[test]
    fn starts_with_welcome_screen() {
        let model = model();
        assert_eq!(model.status, Status::Empty);
        assert!(matches!(model.get_uidata().content, ContentData::Welcome));
        assert!(model.get_uidata().sidebar.is_none());
    }

    #[test]
    fn example_opens_in_overview() {
        let model = example_model();
        assert_eq!(model.status, Status::Ready);
        let sidebar = sidebar(&model);
        assert_eq!(sidebar.view_mode.selected, 0);
        assert_eq!(sidebar.identifier.options[sidebar.identifier.selected], "Name");
        assert!(sidebar.selector.is_none());
        match &model.get_uidata().content {
            ContentData::Overview(grid) => {
                assert_eq!(grid.nrows, 5);
                assert_eq!(grid.columns[0].name, "Row_ID");
                assert_eq!(grid.columns[0].data, vec!["0", "1", "2", "3", "4"]);
            }
            other => panic!("expected overview, got {other:?}"),
        }
    }

    #[test]
    fn row_click_switches_controls_in_the_same_pass() {
        let mut model = example_model();
        send(
            &mut model,
            &[Message::MoveDown, Message::MoveDown, Message::Enter],
        );
        let sidebar = sidebar(&model);
        assert_eq!(sidebar.view_mode.selected, ViewMode::Detail.position());
        let selector = sidebar.selector.as_ref().unwrap();
        assert_eq!(selector.selected, 2);
        assert_eq!(selector.options[2], "Charlie Brown (Row 2)");
        assert_eq!(blocks(&model).heading, "Charlie Brown");
    }

    #[test]
    fn detail_lists_answers_without_row_key() {
        let mut model = example_model();
        send(&mut model, &[Message::Enter]);
        let labels: Vec<_> = blocks(&model)
            .blocks
            .iter()
            .map(|b| b.label.as_str())
            .collect();
        assert_eq!(
            labels,
            vec![
                "Response ID",
                "Name",
                "Satisfaction Score (1-10)",
                "What did you like most?",
                "What can we improve?",
            ]
        );
    }

    #[test]
    fn clicking_a_sorted_grid_selects_the_table_row() {
        let mut model = example_model();
        send(
            &mut model,
            &[
                Message::MoveRight,
                Message::MoveRight,
                Message::MoveRight,
                Message::SortDescending,
                Message::MoveBeginning,
                Message::Enter,
            ],
        );
        assert_eq!(model.session.selected_row(), 2);
        assert_eq!(blocks(&model).heading, "Charlie Brown");
    }

    #[test]
    fn sorting_keeps_the_selected_respondent() {
        let mut model = example_model();
        send(&mut model, &[Message::MoveRight, Message::MoveRight, Message::SortAscending]);
        // Alphabetical by name, Alice stays selected and is still first.
        assert_eq!(model.grid.selected_table_row(), Some(0));
        send(&mut model, &[Message::MoveEnd]);
        assert_eq!(model.grid.selected_table_row(), Some(4));
        match &model.get_uidata().content {
            ContentData::Overview(grid) => {
                assert_eq!(grid.sort.as_deref(), Some("Name ▲"));
            }
            other => panic!("expected overview, got {other:?}"),
        }
    }

    #[test]
    fn record_selector_moves_the_detail_view() {
        let mut model = example_model();
        send(&mut model, &[Message::ShowView(ViewMode::Detail)]);
        assert_eq!(model.session.selected_row(), 0);
        send(&mut model, &[Message::NextItem, Message::NextItem]);
        assert_eq!(sidebar(&model).selector.as_ref().unwrap().selected, 2);
        send(&mut model, &[Message::PreviousItem]);
        assert_eq!(blocks(&model).heading, "Bob Smith");
    }

    #[test]
    fn tab_reaches_the_selector_only_outside_overview() {
        let mut model = example_model();
        let mut seen = Vec::new();
        for _ in 0..3 {
            send(&mut model, &[Message::FocusNext]);
            seen.push(model.focus);
        }
        assert_eq!(seen, vec![Focus::Identifier, Focus::ViewMode, Focus::Content]);

        send(&mut model, &[Message::ShowView(ViewMode::Detail), Message::FocusPrevious]);
        assert_eq!(model.focus, Focus::Selector);
        send(&mut model, &[Message::MoveEnd]);
        assert_eq!(model.session.selected_row(), 4);
    }

    #[test]
    fn view_mode_radio_keeps_the_row() {
        let mut model = example_model();
        send(&mut model, &[Message::MoveDown, Message::Enter]);
        send(&mut model, &[Message::FocusNext, Message::FocusNext, Message::MoveDown]);
        assert_eq!(model.session.mode(), ViewMode::QuestionAnalysis);
        send(&mut model, &[Message::MoveUp]);
        assert_eq!(model.session.mode(), ViewMode::Detail);
        assert_eq!(model.session.selected_row(), 1);
    }

    #[test]
    fn question_view_skips_empty_answers() {
        let mut model = model();
        model
            .load_data_file(Path::new("tests/fixtures/scores.csv"))
            .unwrap();
        send(&mut model, &[Message::ShowView(ViewMode::QuestionAnalysis)]);
        let selector = sidebar(&model).selector.clone().unwrap();
        assert_eq!(selector.options, vec!["ID", "Name", "Score"]);

        send(&mut model, &[Message::FocusPrevious, Message::MoveEnd]);
        let data = blocks(&model);
        assert_eq!(data.heading, "Score");
        assert_eq!(data.blocks.len(), 4);
        assert!(data.blocks.iter().all(|b| b.label != "Charlie"));
    }

    #[test]
    fn question_view_without_questions_is_empty() {
        let mut model = model();
        let table = SurveyTable::from_csv_bytes("keys.csv", b"Row_ID\n5\n6\n").unwrap();
        model.install_survey(table, "keys.csv".to_string());
        send(&mut model, &[Message::ShowView(ViewMode::QuestionAnalysis)]);
        let data = blocks(&model);
        assert_eq!(data.heading, "No questions");
        assert!(data.blocks.is_empty());
        assert!(sidebar(&model).selector.as_ref().unwrap().options.is_empty());
        send(&mut model, &[Message::NextItem, Message::CopyCell]);
        assert_eq!(blocks(&model).heading, "No questions");
    }

    #[test]
    fn identifier_choice_relabels_respondents() {
        let mut model = example_model();
        send(
            &mut model,
            &[
                Message::ShowView(ViewMode::Detail),
                Message::FocusNext,
                Message::MoveUp,
            ],
        );
        let sidebar = sidebar(&model);
        assert_eq!(sidebar.identifier.selected, 1);
        assert_eq!(sidebar.selector.as_ref().unwrap().options[0], "1 (Row 0)");
        assert_eq!(blocks(&model).heading, "1");
    }

    #[test]
    fn smaller_reload_clamps_the_selection() {
        let mut model = example_model();
        send(&mut model, &[Message::MoveEnd, Message::Enter]);
        assert_eq!(model.session.selected_row(), 4);

        model
            .load_data_file(Path::new("tests/fixtures/survey_01.csv"))
            .unwrap();
        assert_eq!(model.session.selected_row(), 0);
        assert_eq!(model.session.mode(), ViewMode::Detail);
        assert_eq!(blocks(&model).heading, "Ada Lovelace");
    }

    #[test]
    fn parse_error_discards_the_table() {
        let mut model = example_model();
        let result = model.load_data_file(Path::new("tests/fixtures/ragged.csv"));
        assert!(result.is_err());
        assert_eq!(model.status, Status::Empty);
        assert!(model.get_uidata().sidebar.is_none());
        match &model.get_uidata().content {
            ContentData::LoadError(msg) => assert!(msg.starts_with("Error reading CSV")),
            other => panic!("expected load error, got {other:?}"),
        }
        // Navigation is ignored until a table is loaded again.
        send(&mut model, &[Message::MoveDown, Message::Enter]);
        assert!(matches!(model.get_uidata().content, ContentData::LoadError(_)));
    }

    #[test]
    fn open_prompt_loads_a_file() {
        let mut model = model();
        send(&mut model, &[Message::OpenFile]);
        assert!(model.raw_keyevents());
        assert_eq!(model.get_uidata().cmd_mode, Some(CMDMode::OpenFile));
        type_keys(&mut model, "tests/fixtures/scores.csv");
        assert!(!model.raw_keyevents());
        assert_eq!(model.status, Status::Ready);
        assert_eq!(model.get_uidata().name, "scores.csv");
    }

    #[test]
    fn goto_jumps_to_a_respondent() {
        let mut model = example_model();
        send(&mut model, &[Message::GotoRecord]);
        assert!(!model.raw_keyevents());

        send(&mut model, &[Message::ShowView(ViewMode::Detail), Message::GotoRecord]);
        type_keys(&mut model, "3");
        assert_eq!(model.session.selected_row(), 3);
        assert_eq!(blocks(&model).heading, "Diana Prince");

        send(&mut model, &[Message::GotoRecord]);
        type_keys(&mut model, "x");
        assert_eq!(model.session.selected_row(), 3);
        assert!(model.get_uidata().status_message.starts_with("Not a row number"));
    }

    #[test]
    fn escape_returns_to_overview() {
        let mut model = example_model();
        send(&mut model, &[Message::Enter, Message::FocusNext, Message::Exit]);
        assert_eq!(model.focus, Focus::Content);
        assert_eq!(model.session.mode(), ViewMode::Detail);
        send(&mut model, &[Message::Exit]);
        assert_eq!(model.session.mode(), ViewMode::Overview);
    }

    #[test]
    fn block_cursor_resets_with_the_respondent() {
        let mut model = example_model();
        send(
            &mut model,
            &[Message::Enter, Message::MoveDown, Message::MoveDown],
        );
        assert_eq!(blocks(&model).selected, 2);
        send(&mut model, &[Message::NextItem]);
        assert_eq!(blocks(&model).selected, 0);
    }

    #[test]
    fn block_offset_follows_the_cursor_on_small_screens() {
        let mut model = Model::init(&SVConfig::default(), 80, 14).unwrap();
        model.load_example().unwrap();
        send(&mut model, &[Message::Enter, Message::MoveEnd]);
        let data = blocks(&model);
        assert_eq!(data.selected, 4);
        assert!(data.offset > 0);
    }

    #[test]
    fn configured_identifier_is_applied() {
        let cfg = SVConfig::default().with_identifier("Response ID".to_string());
        let mut model = Model::init(&cfg, 120, 40).unwrap();
        model.load_example().unwrap();
        assert_eq!(sidebar(&model).identifier.selected, 1);

        let cfg = SVConfig::default().with_identifier("Nope".to_string());
        let mut model = Model::init(&cfg, 120, 40).unwrap();
        model.load_example().unwrap();
        assert_eq!(sidebar(&model).identifier.selected, 2);
        assert!(model.get_uidata().status_message.contains("not found"));
    }

    #[test]
    fn help_popup_swallows_navigation() {
        let mut model = example_model();
        send(&mut model, &[Message::Help, Message::MoveDown]);
        assert!(model.get_uidata().show_popup);
        assert_eq!(model.grid.selected_row, 0);
        send(&mut model, &[Message::Exit]);
        assert!(!model.get_uidata().show_popup);
        send(&mut model, &[Message::Quit]);
        assert_eq!(model.status, Status::Quitting);
    }

    #[test]
    fn rows_are_quoted_for_the_clipboard() {
        assert_eq!(Model::wrap_cell_content("plain"), "plain");
        assert_eq!(Model::wrap_cell_content("a, b"), "\"a, b\"");
        assert_eq!(Model::wrap_cell_content("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn grid_columns_fit_the_width() {
        let table = SurveyTable::example().unwrap();
        let mut grid = GridView::for_table(&table, 20);
        let layout = UILayout::from_values(34, 80, 30);
        let data = grid.build(&table, &layout);
        let used: usize = data.columns.iter().map(|c| c.width + COLUMN_SPACING).sum();
        assert!(used <= layout.grid_width + COLUMN_SPACING);
        assert!(data.columns.len() < table.ncolumns());

        grid.selected_column = table.ncolumns() - 1;
        let data = grid.build(&table, &layout);
        assert_eq!(data.columns[data.selected_column].name, "What can we improve?");
    }

    #[test]
    fn visible_names_are_shortened() {
        assert_eq!(GridView::visible_name("Satisfaction", 8), "Satis...");
        assert_eq!(GridView::visible_name("Name", 8), "Name");
        assert_eq!(GridView::visible_name("Name", 2), "");
    }

    #[test]
    fn empty_cells_sort_last_either_way() {
        let table = SurveyTable::from_path(Path::new("tests/fixtures/scores.csv")).unwrap();
        let score = table.column_index("Score").unwrap();
        let mut grid = GridView::for_table(&table, 20);
        grid.sort_by_column(&table, score, true);
        assert_eq!(grid.rows, vec![3, 1, 0, 4, 2]);
        grid.sort_by_column(&table, score, false);
        assert_eq!(grid.rows, vec![4, 0, 1, 3, 2]);
    }
}
