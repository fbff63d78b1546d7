//! Modal overlays drawn on top of the rule list: a one-line input prompt
//! and a "press any key" message box.
//!
//! Geometry is computed by plain functions so it can be checked without a
//! terminal; the `render_*` functions only paint what those return.

use ratatui::{
    backend::Backend,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{
        block::{Position, Title},
        Block, Borders, Clear, Paragraph,
    },
    Frame,
};

pub const INPUT_HEIGHT: u16 = 7;
pub const DISMISS_HINT: &str = "Press any key to continue...";

const WIDTH_PERCENT: u32 = 60;
const PADDING: u16 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Option<String>,
    pub body: String,
}

impl Message {
    pub fn with_header(header: impl Into<String>, body: impl Into<String>) -> Self {
        Self { header: Some(header.into()), body: body.into() }
    }

    pub fn plain(body: impl Into<String>) -> Self {
        Self { header: None, body: body.into() }
    }

    pub fn error(body: impl Into<String>) -> Self {
        Self::with_header("Error", body)
    }
}

/// Where the input prompt goes: full width minus a two column margin,
/// vertically centred.
pub fn input_area(screen: Rect) -> Rect {
    let height = INPUT_HEIGHT.min(screen.height);
    let y = (screen.height / 2)
        .saturating_sub(INPUT_HEIGHT / 2)
        .min(screen.height - height);
    let x = 2.min(screen.width);
    Rect::new(screen.x + x, screen.y + y, screen.width.saturating_sub(4), height)
}

/// Tail of `buffer` that fits a field `width` columns wide.
pub fn input_field(buffer: &str, width: usize) -> &str {
    let count = buffer.chars().count();
    if count <= width {
        return buffer;
    }
    let skip = count - width;
    let offset = buffer.char_indices().nth(skip).map_or(buffer.len(), |(i, _)| i);
    &buffer[offset..]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLayout {
    pub area: Rect,
    pub header: Option<String>,
    pub lines: Vec<String>,
}

impl MessageLayout {
    /// Text region inside the border, two columns in from each side.
    pub fn text_area(&self) -> Rect {
        let rows = self.header.as_ref().map_or(0, |_| 2) + self.lines.len() as u16;
        Rect::new(
            self.area.x + 2.min(self.area.width),
            self.area.y + 1.min(self.area.height),
            self.area.width.saturating_sub(4),
            rows.min(self.area.height.saturating_sub(2)),
        )
    }
}

/// Sizes a message box to its content, clamped to `screen`. Lines wider than
/// the box are cut; lines that do not fit vertically are dropped.
pub fn message_layout(screen: Rect, message: &Message) -> MessageLayout {
    let body: Vec<&str> = message.body.trim().split('\n').collect();
    let extra: u16 = if message.header.is_some() { 3 } else { 2 };

    let wanted = u16::try_from(body.len()).unwrap_or(u16::MAX).saturating_add(extra + PADDING);
    let height = wanted.min(screen.height);
    let width = (u32::from(screen.width) * WIDTH_PERCENT / 100) as u16;
    let area = Rect::new(
        screen.x + (screen.width - width) / 2,
        screen.y + (screen.height - height) / 2,
        width,
        height,
    );

    let text_width = usize::from(width.saturating_sub(4));
    // text runs from row 1 and stops two rows short of the bottom
    let mut rows = usize::from(height).saturating_sub(3);

    let header = message.header.as_deref().map(|h| {
        rows = rows.saturating_sub(2);
        format!("{:^text_width$}", truncate(h, text_width))
    });
    let lines = body.iter().take(rows).map(|l| truncate(l, text_width)).collect();

    MessageLayout { area, header, lines }
}

fn truncate(line: &str, width: usize) -> String {
    line.chars().take(width).collect()
}

pub fn render_input<B: Backend>(f: &mut Frame<B>, prompt: &str, buffer: &str) {
    let area = input_area(f.size());
    if area.width < 4 || area.height < 3 {
        return;
    }
    f.render_widget(Clear, area);
    f.render_widget(Block::default().borders(Borders::ALL), area);

    let inner_width = area.width.saturating_sub(4);
    f.render_widget(Paragraph::new(prompt), Rect::new(area.x + 2, area.y + 1, inner_width, 1));
    if area.height > 4 {
        let field = input_field(buffer, usize::from(inner_width.saturating_sub(3)));
        f.render_widget(
            Paragraph::new(format!("> {field}")),
            Rect::new(area.x + 2, area.y + 3, inner_width, 1),
        );
        let cursor = (field.chars().count() as u16 + 2).min(inner_width);
        f.set_cursor(area.x + 2 + cursor, area.y + 3);
    }
}

pub fn render_message<B: Backend>(f: &mut Frame<B>, message: &Message) {
    let layout = message_layout(f.size(), message);
    if layout.area.width < 4 || layout.area.height < 3 {
        return;
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Title::from(DISMISS_HINT).position(Position::Bottom));
    f.render_widget(Clear, layout.area);
    f.render_widget(block, layout.area);

    let mut lines = Vec::with_capacity(layout.lines.len() + 2);
    if let Some(header) = &layout.header {
        lines.push(Line::from(Span::styled(header.clone(), Style::default().add_modifier(Modifier::BOLD))));
        lines.push(Line::from(""));
    }
    lines.extend(layout.lines.iter().map(|l| Line::from(l.as_str())));
    f.render_widget(Paragraph::new(lines), layout.text_area());
}
