use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use crate::dialog::{render_input, render_message};
use crate::rules::Rule;
use crate::session::{Mode, Session, ADD_PROMPT};
use crate::ufw::CommandRunner;
use crate::viewport::Viewport;

const TITLE: &str = "UFW Port Manager - h to help, q to quit";
const EMPTY_HINT: &str = "No ports found (press \"a\" to add ports)";

pub fn draw<B: Backend, R: CommandRunner>(f: &mut Frame<B>, session: &Session<R>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0), Constraint::Length(3)])
        .split(f.size());

    f.render_widget(
        Paragraph::new(TITLE).style(Style::default().add_modifier(Modifier::BOLD)),
        chunks[0],
    );
    render_rules(f, session, chunks[1]);
    render_footer(f, session, chunks[2]);

    match session.mode() {
        Mode::Browsing => {}
        Mode::AwaitingInput { buffer } => render_input(f, ADD_PROMPT, buffer),
        Mode::ShowingMessage => {
            if let Some(message) = session.current_message() {
                render_message(f, message);
            }
        }
    }
}

fn rule_line(rule: &Rule) -> Line<'static> {
    let color = if rule.allowed { Color::Green } else { Color::Red };
    Line::from(vec![
        Span::raw(format!("{:<15} ", rule.spec())),
        Span::styled(rule.state_label(), Style::default().fg(color)),
    ])
}

fn render_rules<B: Backend, R: CommandRunner>(f: &mut Frame<B>, session: &Session<R>, area: Rect) {
    let rules = session.rules();
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Ports ({})", rules.len()));

    let Some(selected) = session.selected() else {
        f.render_widget(Paragraph::new(EMPTY_HINT).block(block), area);
        return;
    };

    let view = Viewport::compute(selected, rules.len(), usize::from(area.height.saturating_sub(2)));
    let items: Vec<ListItem> = view
        .range()
        .map(|idx| {
            let item = ListItem::new(rule_line(&rules[idx]));
            if idx == selected {
                item.style(Style::default().add_modifier(Modifier::REVERSED))
            } else {
                item
            }
        })
        .collect();

    f.render_widget(List::new(items).block(block), area);
}

fn render_footer<B: Backend, R: CommandRunner>(f: &mut Frame<B>, session: &Session<R>, area: Rect) {
    let hints = match session.mode() {
        Mode::AwaitingInput { .. } => "INPUT MODE (Esc to cancel, Enter to confirm)",
        Mode::ShowingMessage => "Press any key to continue",
        Mode::Browsing => "↑/↓:Nav  SPACE:Toggle  a:Add  d:Delete  r:Reload  h:Help  q:Quit",
    };
    let p = match session.status() {
        Some(status) => Paragraph::new(format!("{hints} | {status}")).style(Style::default().fg(Color::Green)),
        None => Paragraph::new(hints).style(Style::default().fg(Color::Gray)),
    }
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Protocol;
    use crate::ufw::SimulatedRunner;
    use crossterm::event::KeyCode;
    use ratatui::{backend::TestBackend, Terminal};

    fn rendered(session: &Session<SimulatedRunner>, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| draw(f, session)).unwrap();
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..height {
            for x in 0..width {
                text.push_str(&buffer.get(x, y).symbol);
            }
            text.push('\n');
        }
        text
    }

    fn many_rules(n: usize) -> Vec<Rule> {
        (0..n).map(|i| Rule::new(format!("{:04}", 1000 + i), Protocol::Tcp, i % 2 == 0)).collect()
    }

    #[test]
    fn empty_list_shows_hint() {
        let s = Session::with_rules(SimulatedRunner::default(), vec![], false);
        let screen = rendered(&s, 60, 12);
        assert!(screen.contains("No ports found"));
        assert!(screen.contains("UFW Port Manager"));
    }

    #[test]
    fn list_scrolls_with_selection() {
        let mut s = Session::with_rules(SimulatedRunner::default(), many_rules(30), false);
        for _ in 0..20 {
            s.handle_key(KeyCode::Down);
        }
        // 16 rows: title, list border, 10 rows, list border, footer (3)
        let screen = rendered(&s, 60, 16);
        assert!(screen.contains("1020/tcp"));
        assert!(screen.contains("1011/tcp"));
        assert!(!screen.contains("1010/tcp"));
        assert!(!screen.contains("1021/tcp"));
    }

    #[test]
    fn modals_draw_on_small_terminals() {
        let mut s = Session::with_rules(SimulatedRunner::default(), many_rules(3), false);
        s.handle_key(KeyCode::Char('h'));
        for (w, h) in [(80, 24), (20, 6), (10, 4)] {
            rendered(&s, w, h);
        }
        assert!(rendered(&s, 80, 24).contains("Press any key to continue..."));

        s.handle_key(KeyCode::Esc);
        s.handle_key(KeyCode::Char('a'));
        s.handle_key(KeyCode::Char('2'));
        for (w, h) in [(80, 24), (20, 6), (10, 4)] {
            rendered(&s, w, h);
        }
        assert!(rendered(&s, 80, 24).contains("> 2"));
    }
}
