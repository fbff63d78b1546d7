use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Error;
use crate::ufw::{Action, CommandRunner, UfwCommand};

lazy_static! {
    // [!]<port>[/tcp|/udp], the whole token must match
    static ref PORT_TOKEN: Regex = Regex::new(r"^(!)?(\w+)(?:/(tcp|udp))?$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Any,
    Tcp,
    Udp,
}

impl Protocol {
    pub fn from_suffix(suffix: Option<&str>) -> Self {
        match suffix {
            Some("tcp") => Self::Tcp,
            Some("udp") => Self::Udp,
            _ => Self::Any,
        }
    }

    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            Self::Any => None,
            Self::Tcp => Some("tcp"),
            Self::Udp => Some("udp"),
        }
    }
}

/// One port rule as mirrored from ufw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub port_id: String,
    pub protocol: Protocol,
    pub allowed: bool,
}

impl Rule {
    pub fn new(port_id: impl Into<String>, protocol: Protocol, allowed: bool) -> Self {
        Self { port_id: port_id.into(), protocol, allowed }
    }

    /// Parses one add-ports token such as `443/tcp` or `!25`.
    pub fn parse_token(token: &str) -> Result<Self, Error> {
        let cap = PORT_TOKEN
            .captures(token)
            .ok_or_else(|| Error::InvalidToken(token.to_string()))?;
        Ok(Self {
            port_id: cap[2].to_string(),
            protocol: Protocol::from_suffix(cap.get(3).map(|m| m.as_str())),
            allowed: cap.get(1).is_none(),
        })
    }

    /// The identifier ufw knows the rule by: `22` or `22/tcp`.
    pub fn spec(&self) -> String {
        match self.protocol.suffix() {
            None => self.port_id.clone(),
            Some(proto) => format!("{}/{}", self.port_id, proto),
        }
    }

    pub fn state_label(&self) -> &'static str {
        if self.allowed { "ALLOWED" } else { "DENIED" }
    }

    pub fn key(&self) -> (&str, Protocol) {
        (&self.port_id, self.protocol)
    }

    pub fn action(&self) -> Action {
        if self.allowed { Action::Allow } else { Action::Deny }
    }

    pub fn toggle_command(&self) -> UfwCommand {
        match self.action() {
            Action::Allow => UfwCommand::Deny(self.spec()),
            Action::Deny => UfwCommand::Allow(self.spec()),
        }
    }

    /// ufw keeps allow and deny rules apart, so the current state picks the variant.
    pub fn delete_command(&self) -> UfwCommand {
        UfwCommand::Delete { action: self.action(), spec: self.spec() }
    }

    /// State transition for a command that already succeeded.
    pub fn apply(&mut self, command: &UfwCommand) {
        match command {
            UfwCommand::Allow(_) => self.allowed = true,
            UfwCommand::Deny(_) => self.allowed = false,
            UfwCommand::Status | UfwCommand::Delete { .. } => {}
        }
    }

    pub fn allow(&mut self, runner: &mut dyn CommandRunner) -> Result<(), Error> {
        self.execute(UfwCommand::Allow(self.spec()), runner)
    }

    pub fn deny(&mut self, runner: &mut dyn CommandRunner) -> Result<(), Error> {
        self.execute(UfwCommand::Deny(self.spec()), runner)
    }

    pub fn toggle(&mut self, runner: &mut dyn CommandRunner) -> Result<(), Error> {
        let command = self.toggle_command();
        self.execute(command, runner)
    }

    /// Removes the rule from ufw. The caller drops it from its own list.
    pub fn delete(&self, runner: &mut dyn CommandRunner) -> Result<(), Error> {
        runner.run(&self.delete_command()).map(|_| ())
    }

    fn execute(&mut self, command: UfwCommand, runner: &mut dyn CommandRunner) -> Result<(), Error> {
        runner.run(&command)?;
        self.apply(&command);
        Ok(())
    }
}
