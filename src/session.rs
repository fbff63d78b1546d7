use std::collections::VecDeque;

use crossterm::event::KeyCode;

use crate::dialog::Message;
use crate::error::Error;
use crate::rules::Rule;
use crate::status::parse_status;
use crate::ufw::{CommandRunner, UfwCommand};

pub const ADD_PROMPT: &str = "Add new ports (spaces in between, `!` for denied): ";

pub const HELP_TEXT: &str = "\
↑ / ↓  : Navigate
SPACE  : Toggle selected port
a      : Add new ports (`!` prefix to deny)
d      : Delete selected port
r      : Reload rules from ufw
q      : Quit";

const REAUTH_HINT: &str = "sudo credentials expired. Closing this message asks for the password again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Browsing,
    /// The add-ports prompt owns the keyboard.
    AwaitingInput { buffer: String },
    /// The front of the message queue is on screen.
    ShowingMessage,
}

/// Everything one run of the manager owns: the mirrored rules, the cursor,
/// the current modal and the runner that talks to ufw.
pub struct Session<R: CommandRunner> {
    rules: Vec<Rule>,
    selected: Option<usize>,
    mode: Mode,
    messages: VecDeque<Message>,
    status: Option<String>,
    sort_on_add: bool,
    should_quit: bool,
    reauth_requested: bool,
    runner: R,
}

impl<R: CommandRunner> Session<R> {
    /// Reads the current rules from ufw. Any failure here is fatal.
    pub fn load(mut runner: R, sort_on_add: bool) -> Result<Self, Error> {
        let rules = parse_status(&runner.run(&UfwCommand::Status)?)?;
        tracing::info!(count = rules.len(), "loaded rules");
        Ok(Self::with_rules(runner, rules, sort_on_add))
    }

    pub fn with_rules(runner: R, rules: Vec<Rule>, sort_on_add: bool) -> Self {
        let selected = if rules.is_empty() { None } else { Some(0) };
        Self {
            rules,
            selected,
            mode: Mode::Browsing,
            messages: VecDeque::new(),
            status: None,
            sort_on_add,
            should_quit: false,
            reauth_requested: false,
            runner,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn current_message(&self) -> Option<&Message> {
        match self.mode {
            Mode::ShowingMessage => self.messages.front(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// True once per expired-credentials failure, after its message is gone.
    pub fn take_reauth_request(&mut self) -> bool {
        self.mode == Mode::Browsing && std::mem::take(&mut self.reauth_requested)
    }

    /// Asks the runner to refresh its credentials. The caller must have
    /// left raw mode first.
    pub fn reauthenticate(&mut self) {
        match self.runner.authenticate() {
            Ok(()) => {
                tracing::info!("credentials refreshed");
                self.status = Some("sudo credentials refreshed".into());
            }
            Err(err) => self.report(&err),
        }
    }

    pub fn handle_key(&mut self, key: KeyCode) {
        match self.mode {
            Mode::Browsing => self.handle_browsing_key(key),
            Mode::AwaitingInput { .. } => self.handle_input_key(key),
            Mode::ShowingMessage => self.dismiss_message(),
        }
    }

    fn handle_browsing_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') => self.previous_rule(),
            KeyCode::Down | KeyCode::Char('j') => self.next_rule(),
            KeyCode::Char(' ') => self.toggle_selected(),
            KeyCode::Char('a') => self.mode = Mode::AwaitingInput { buffer: String::new() },
            KeyCode::Char('d') => self.delete_selected(),
            KeyCode::Char('r') => self.reload(),
            KeyCode::Char('h') => self.show(Message::with_header("Help", HELP_TEXT)),
            _ => {}
        }
    }

    fn handle_input_key(&mut self, key: KeyCode) {
        let Mode::AwaitingInput { buffer } = &mut self.mode else {
            return;
        };
        match key {
            KeyCode::Enter => {
                let input = buffer.trim().to_string();
                self.mode = Mode::Browsing;
                self.add_ports(&input);
            }
            KeyCode::Esc => self.mode = Mode::Browsing,
            KeyCode::Backspace => {
                buffer.pop();
            }
            KeyCode::Char(c) => buffer.push(c),
            _ => {}
        }
    }

    fn show(&mut self, message: Message) {
        self.messages.push_back(message);
        self.mode = Mode::ShowingMessage;
    }

    fn dismiss_message(&mut self) {
        self.messages.pop_front();
        if self.messages.is_empty() {
            self.mode = Mode::Browsing;
        }
    }

    fn report(&mut self, err: &Error) {
        tracing::warn!(error = %err, fatal = err.is_fatal(), "action failed");
        self.status = None;
        let message = if err.is_token_problem() {
            Message::plain(err.to_string())
        } else if err.needs_authentication() {
            self.reauth_requested = true;
            Message::error(format!("{err}\n\n{REAUTH_HINT}"))
        } else {
            Message::error(err.to_string())
        };
        self.show(message);
    }

    fn previous_rule(&mut self) {
        if let Some(sel) = self.selected {
            if sel > 0 {
                self.selected = Some(sel - 1);
            }
        }
    }

    fn next_rule(&mut self) {
        if let Some(sel) = self.selected {
            if sel + 1 < self.rules.len() {
                self.selected = Some(sel + 1);
            }
        }
    }

    fn toggle_selected(&mut self) {
        let Some(idx) = self.selected else {
            self.show(Message::error("No ports to toggle"));
            return;
        };
        let rule = &mut self.rules[idx];
        match rule.toggle(&mut self.runner) {
            Ok(()) => {
                tracing::info!(rule = %rule.spec(), allowed = rule.allowed, "toggled");
                self.status = Some(format!("{} is now {}", rule.spec(), rule.state_label()));
            }
            Err(err) => self.report(&err),
        }
    }

    fn delete_selected(&mut self) {
        let Some(idx) = self.selected else {
            self.show(Message::error("No ports to delete"));
            return;
        };
        if let Err(err) = self.rules[idx].delete(&mut self.runner) {
            self.report(&err);
            return;
        }
        let removed = self.rules.remove(idx);
        tracing::info!(rule = %removed.spec(), "deleted");
        self.status = Some(format!("Deleted {}", removed.spec()));
        self.selected = self.rules.len().checked_sub(1).map(|last| idx.min(last));
    }

    /// Adds every whitespace separated token in `input`. A bad token is
    /// reported and skipped; the rest are still processed.
    fn add_ports(&mut self, input: &str) {
        let mut added = Vec::new();
        for token in input.split_whitespace() {
            match self.add_port(token) {
                Ok(spec) => added.push(spec),
                Err(err) => self.report(&err),
            }
        }
        if added.is_empty() {
            return;
        }
        if self.sort_on_add {
            self.sort_keeping_selection();
        }
        self.status = Some(format!("Added {}", added.join(", ")));
    }

    fn add_port(&mut self, token: &str) -> Result<String, Error> {
        let mut rule = Rule::parse_token(token)?;
        if self.rules.iter().any(|r| r.key() == rule.key()) {
            return Err(Error::DuplicateRule(rule.spec()));
        }

        if rule.allowed {
            rule.allow(&mut self.runner)?;
        } else {
            rule.deny(&mut self.runner)?;
        }

        let spec = rule.spec();
        tracing::info!(rule = %spec, allowed = rule.allowed, "added");
        self.rules.push(rule);
        self.selected.get_or_insert(0);
        Ok(spec)
    }

    fn sort_keeping_selection(&mut self) {
        let previous = self.selected.map(|idx| self.rules[idx].clone());
        self.rules.sort_by(|a, b| a.port_id.cmp(&b.port_id));
        self.reselect(previous, 0);
    }

    /// Puts the cursor back on `previous` if it is still listed, otherwise
    /// on `fallback` clamped to the list.
    fn reselect(&mut self, previous: Option<Rule>, fallback: usize) {
        let kept = previous.and_then(|prev| self.rules.iter().position(|r| r.key() == prev.key()));
        self.selected = kept.or_else(|| self.rules.len().checked_sub(1).map(|last| fallback.min(last)));
    }

    /// Re-reads the listing from ufw. Unlike startup, a failure only produces a message.
    fn reload(&mut self) {
        let result = self
            .runner
            .run(&UfwCommand::Status)
            .and_then(|text| parse_status(&text));
        match result {
            Ok(rules) => {
                tracing::info!(count = rules.len(), "reloaded rules");
                self.status = Some(format!("Reloaded {} rules", rules.len()));
                let previous = self.selected.map(|idx| self.rules[idx].clone());
                let fallback = self.selected.unwrap_or(0);
                self.rules = rules;
                self.reselect(previous, fallback);
            }
            Err(err) => self.report(&err),
        }
    }
}
