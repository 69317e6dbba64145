use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Margin, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Text},
    widgets::{
        Block, BorderType, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Scrollbar,
        ScrollbarOrientation, ScrollbarState, Table, TableState, Wrap,
    },
};

use crate::model::{
    BlocksData, ContentData, Focus, GridData, Model, SelectorView, SidebarData, UIData,
};
use crate::render;

pub const TITLE_HEIGHT: usize = 1;
pub const STATUSLINE_HEIGHT: usize = 1;
pub const CONTENT_HEADING_HEIGHT: usize = 2;
pub const CONTENT_BORDER: usize = 2;
pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const COLUMN_WIDTH_MARGIN: usize = 1;
pub const COLUMN_SPACING: usize = 1;

const SOURCE_HEIGHT: u16 = 4;
const VIEW_MODE_HEIGHT: u16 = 5;
const KEY_HINTS: &str = " ?: help  o: open  q: quit ";

pub struct ExplorerUI {
    accent: Color,
    muted: Color,
}

impl Default for ExplorerUI {
    fn default() -> Self {
        Self::new()
    }
}

impl ExplorerUI {
    pub fn new() -> Self {
        Self {
            accent: Color::Cyan,
            muted: Color::DarkGray,
        }
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let [title_area, body_area, status_area] = Layout::vertical([
            Constraint::Length(TITLE_HEIGHT as u16),
            Constraint::Min(0),
            Constraint::Length(STATUSLINE_HEIGHT as u16),
        ])
        .areas(frame.area());

        self.draw_title(uidata, frame, title_area);
        match &uidata.sidebar {
            Some(sidebar) => {
                let [sidebar_area, content_area] = Layout::horizontal([
                    Constraint::Length(uidata.layout.sidebar_width as u16),
                    Constraint::Min(0),
                ])
                .areas(body_area);
                self.draw_sidebar(sidebar, uidata.focus, frame, sidebar_area);
                self.draw_content(uidata, frame, content_area);
            }
            None => self.draw_content(uidata, frame, body_area),
        }
        self.draw_statusline(uidata, frame, status_area);

        if uidata.show_popup {
            self.draw_popup(&uidata.popup_message, frame);
        }
    }

    fn draw_title(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let title = Line::from(vec![
            " 📊 Survey Response Explorer ".bold(),
            uidata.name.as_str().yellow(),
        ]);
        frame.render_widget(Paragraph::new(title), area);
    }

    fn border_style(&self, focused: bool) -> (BorderType, Style) {
        if focused {
            (BorderType::Thick, Style::new().fg(self.accent))
        } else {
            (BorderType::Rounded, Style::new().fg(self.muted))
        }
    }

    // ------------------------------ Sidebar -------------------------------- //

    fn draw_sidebar(&self, sidebar: &SidebarData, focus: Focus, frame: &mut Frame, area: Rect) {
        let selector_constraint = if sidebar.selector.is_some() {
            Constraint::Fill(1)
        } else {
            Constraint::Length(0)
        };
        let [source_area, identifier_area, mode_area, selector_area] = Layout::vertical([
            Constraint::Length(SOURCE_HEIGHT),
            Constraint::Fill(1),
            Constraint::Length(VIEW_MODE_HEIGHT),
            selector_constraint,
        ])
        .areas(area);

        let (border_type, style) = self.border_style(false);
        let source = Paragraph::new(sidebar.source.as_str())
            .wrap(Wrap { trim: true })
            .block(
                Block::bordered()
                    .border_type(border_type)
                    .border_style(style)
                    .title(" 1. Data Source "),
            );
        frame.render_widget(source, source_area);

        self.draw_selector(
            &sidebar.identifier,
            "2.",
            focus == Focus::Identifier,
            false,
            frame,
            identifier_area,
        );
        self.draw_selector(
            &sidebar.view_mode,
            "3.",
            focus == Focus::ViewMode,
            true,
            frame,
            mode_area,
        );
        if let Some(selector) = &sidebar.selector {
            self.draw_selector(
                selector,
                "4.",
                focus == Focus::Selector,
                false,
                frame,
                selector_area,
            );
        }
    }

    fn draw_selector(
        &self,
        view: &SelectorView,
        number: &str,
        focused: bool,
        radio: bool,
        frame: &mut Frame,
        area: Rect,
    ) {
        let items: Vec<ListItem> = view
            .options
            .iter()
            .enumerate()
            .map(|(idx, option)| {
                if radio {
                    let mark = if idx == view.selected { "(•) " } else { "( ) " };
                    ListItem::new(format!("{mark}{option}"))
                } else {
                    ListItem::new(option.as_str())
                }
            })
            .collect();

        let (border_type, style) = self.border_style(focused);
        let highlight = if focused {
            Style::new().fg(Color::Black).bg(self.accent)
        } else {
            Style::new().add_modifier(Modifier::REVERSED)
        };
        let list = List::new(items)
            .block(
                Block::bordered()
                    .border_type(border_type)
                    .border_style(style)
                    .title(format!(" {} {} ", number, view.title)),
            )
            .highlight_style(highlight)
            .highlight_symbol("▶ ");

        let selected = (!view.options.is_empty()).then_some(view.selected);
        let mut state = ListState::default().with_selected(selected);
        frame.render_stateful_widget(list, area, &mut state);
    }

    // ------------------------------ Content -------------------------------- //

    fn draw_content(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let [heading_area, body_area] = Layout::vertical([
            Constraint::Length(CONTENT_HEADING_HEIGHT as u16),
            Constraint::Min(0),
        ])
        .areas(area);
        let focused = uidata.focus == Focus::Content;

        match &uidata.content {
            ContentData::Welcome => {
                self.draw_heading("Survey Response Explorer", "", frame, heading_area);
                let text = Text::from(vec![
                    Line::from("👋 Please open a CSV file to get started."),
                    Line::from(""),
                    Line::from(vec![
                        "Press ".into(),
                        "o".bold().fg(self.accent),
                        " to open a file or ".into(),
                        "e".bold().fg(self.accent),
                        " to load the example survey data.".into(),
                    ]),
                    Line::from(""),
                    Line::from(
                        "Pick a row in the overview to view that person's full answers.",
                    )
                    .fg(self.muted),
                ]);
                frame.render_widget(Paragraph::new(text).wrap(Wrap { trim: true }), body_area);
            }
            ContentData::LoadError(msg) => {
                self.draw_heading("Survey Response Explorer", "", frame, heading_area);
                let text = Text::from(vec![
                    Line::from(msg.as_str()).red(),
                    Line::from(""),
                    Line::from("Press o to open another file.").fg(self.muted),
                ]);
                frame.render_widget(Paragraph::new(text).wrap(Wrap { trim: false }), body_area);
            }
            ContentData::Overview(grid) => {
                self.draw_heading(
                    "Global Overview",
                    "Select a row with Enter to jump to their details.",
                    frame,
                    heading_area,
                );
                self.draw_grid(grid, focused, frame, body_area);
            }
            ContentData::Detail(blocks) => {
                let heading = format!("👤 {}", blocks.heading);
                self.draw_heading(&heading, "Individual Response Viewer", frame, heading_area);
                self.draw_blocks(blocks, focused, frame, body_area);
            }
            ContentData::Question(blocks) => {
                let heading = format!("❓ {}", blocks.heading);
                let caption = format!(
                    "Question Analysis Viewer, {} answers",
                    blocks.blocks.len()
                );
                self.draw_heading(&heading, &caption, frame, heading_area);
                self.draw_blocks(blocks, focused, frame, body_area);
            }
        }
    }

    fn draw_heading(&self, heading: &str, caption: &str, frame: &mut Frame, area: Rect) {
        let text = Text::from(vec![
            Line::from(heading).bold(),
            Line::from(caption).fg(self.muted),
        ]);
        frame.render_widget(Paragraph::new(text), area);
    }

    fn draw_grid(&self, grid: &GridData, focused: bool, frame: &mut Frame, area: Rect) {
        let header = Row::new(grid.columns.iter().map(|c| Cell::from(c.name.as_str())))
            .style(Style::new().bold())
            .height(TABLE_HEADER_HEIGHT as u16);
        let nvisible = grid.columns.first().map(|c| c.data.len()).unwrap_or(0);
        let rows = (0..nvisible).map(|r| {
            Row::new(
                grid.columns
                    .iter()
                    .map(|c| Cell::from(c.data[r].as_str())),
            )
        });
        let widths = grid
            .columns
            .iter()
            .map(|c| Constraint::Length(c.width as u16));

        let mut title = format!(
            " Response Data Grid [{}/{}] ",
            if grid.nrows == 0 { 0 } else { grid.abs_selected_row + 1 },
            grid.nrows
        );
        if let Some(sort) = &grid.sort {
            title.push_str(&format!("sorted by {sort} "));
        }

        let (border_type, style) = self.border_style(focused);
        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(COLUMN_SPACING as u16)
            .block(
                Block::bordered()
                    .border_type(border_type)
                    .border_style(style)
                    .title(title),
            )
            .row_highlight_style(Style::new().add_modifier(Modifier::REVERSED))
            .cell_highlight_style(Style::new().fg(Color::Black).bg(self.accent));

        let mut state = TableState::default()
            .with_selected((nvisible > 0).then_some(grid.selected_row))
            .with_selected_column(Some(grid.selected_column));
        frame.render_stateful_widget(table, area, &mut state);

        let mut scrollbar_state = ScrollbarState::new(grid.nrows).position(grid.abs_selected_row);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }

    fn draw_blocks(&self, data: &BlocksData, focused: bool, frame: &mut Frame, area: Rect) {
        if data.blocks.is_empty() {
            let empty = Paragraph::new("No answers to show.").fg(self.muted);
            frame.render_widget(empty, area);
            return;
        }

        let bottom = area.bottom();
        let mut y = area.y;
        for (idx, block) in data.blocks.iter().enumerate().skip(data.offset) {
            let height = render::block_height(block, area.width as usize) as u16;
            let height = height.min(bottom.saturating_sub(y));
            // Borders plus one line of text
            if height < 3 {
                break;
            }

            let selected = idx == data.selected;
            let (border_type, style) = if selected {
                (BorderType::Thick, Style::new().fg(self.accent))
            } else {
                (BorderType::Rounded, Style::new().fg(Color::Blue))
            };
            let style = if selected && !focused {
                style.fg(Color::Blue)
            } else {
                style
            };
            let widget = Paragraph::new(block.value.as_str())
                .wrap(Wrap { trim: false })
                .block(
                    Block::bordered()
                        .border_type(border_type)
                        .border_style(style)
                        .title(Line::from(block.label.as_str()).bold()),
                );
            frame.render_widget(
                widget,
                Rect {
                    x: area.x,
                    y,
                    width: area.width,
                    height,
                },
            );
            y += height;
        }
    }

    // ---------------------------- Status line ------------------------------ //

    fn draw_statusline(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        if uidata.active_cmdinput {
            let prompt = uidata.cmd_mode.map(|m| m.prompt()).unwrap_or("> ");
            let line = Line::from(vec![
                prompt.bold().fg(self.accent),
                uidata.cmdinput.input.as_str().into(),
            ]);
            frame.render_widget(Paragraph::new(line), area);

            let cursor_x = area.x as usize + prompt.chars().count() + uidata.cmdinput.cursor_pos;
            let cursor_x = cursor_x.min(area.right().saturating_sub(1) as usize) as u16;
            frame.set_cursor_position((cursor_x, area.y));
        } else {
            let [message_area, hint_area] = Layout::horizontal([
                Constraint::Min(0),
                Constraint::Length(KEY_HINTS.chars().count() as u16),
            ])
            .areas(area);
            frame.render_widget(
                Paragraph::new(uidata.status_message.as_str()).fg(self.muted),
                message_area,
            );
            frame.render_widget(Paragraph::new(KEY_HINTS).fg(self.muted), hint_area);
        }
    }

    fn draw_popup(&self, message: &str, frame: &mut Frame) {
        let area = Self::popup_area(frame.area(), 70, 80);
        frame.render_widget(Clear, area);
        let popup = Paragraph::new(message).block(
            Block::bordered()
                .border_type(BorderType::Thick)
                .border_style(Style::new().fg(self.accent))
                .title(" Help ")
                .title_bottom(Line::from(" Esc to close ").centered()),
        );
        frame.render_widget(popup, area);
    }

    fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
        let [area] = Layout::vertical([Constraint::Percentage(percent_y)])
            .flex(Flex::Center)
            .areas(area);
        let [area] = Layout::horizontal([Constraint::Percentage(percent_x)])
            .flex(Flex::Center)
            .areas(area);
        area
    }
}
