//! The ufw command surface.
//!
//! Everything the session does to the firewall goes through a
//! [`CommandRunner`]. [`SystemRunner`] shells out to the real `ufw` binary
//! (elevated with `sudo` unless already root) and bounds every call with a
//! timeout. [`SimulatedRunner`] keeps an in-memory rule table instead and is
//! used by `--simulate` and the tests.

use std::fmt;
use std::process::{Output, Stdio};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::runtime::Runtime;

use crate::error::Error;
use crate::rules::Rule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Allow,
    Deny,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UfwCommand {
    Status,
    Allow(String),
    Deny(String),
    Delete { action: Action, spec: String },
}

impl UfwCommand {
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Status => vec!["status".into(), "numbered".into()],
            Self::Allow(spec) => vec!["allow".into(), spec.clone()],
            Self::Deny(spec) => vec!["deny".into(), spec.clone()],
            Self::Delete { action, spec } => {
                vec!["delete".into(), action.as_str().into(), spec.clone()]
            }
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Status)
    }
}

impl fmt::Display for UfwCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ufw {}", self.args().join(" "))
    }
}

/// Runs a ufw command to completion and hands back its stdout.
pub trait CommandRunner {
    fn run(&mut self, command: &UfwCommand) -> Result<String, Error>;

    /// Refreshes whatever credentials `run` relies on. Called with the
    /// terminal in cooked mode.
    fn authenticate(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

fn failed(command: &UfwCommand, status: impl Into<String>) -> Error {
    Error::CommandFailed { command: command.to_string(), status: status.into() }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Elevation {
    /// `sudo` unless the process already runs as root
    #[default]
    Auto,
    Sudo,
    None,
}

impl Elevation {
    pub fn uses_sudo(&self) -> bool {
        match self {
            Self::Auto => !nix::unistd::getuid().is_root(),
            Self::Sudo => true,
            Self::None => false,
        }
    }
}

pub struct SystemRunner {
    program: String,
    sudo: bool,
    timeout: Duration,
    runtime: Runtime,
}

impl SystemRunner {
    pub fn new(program: impl Into<String>, elevation: Elevation, timeout: Duration) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            program: program.into(),
            sudo: elevation.uses_sudo(),
            timeout,
            runtime,
        })
    }

    fn build(&self, command: &UfwCommand) -> Command {
        let mut cmd = if self.sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg("-n").arg(&self.program);
            cmd
        } else {
            Command::new(&self.program)
        };
        cmd.args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

/// Collects the command's output, or `None` if it outlived `limit`.
async fn output_within(mut cmd: Command, limit: Duration) -> std::io::Result<Option<Output>> {
    let child = cmd.spawn()?;
    let pid = child.id();
    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(output) => output.map(Some),
        Err(_) => {
            if let Some(pid) = pid {
                terminate(pid);
            }
            Ok(None)
        }
    }
}

/// SIGKILL would stop `sudo` without reaching ufw; SIGTERM is relayed.
fn terminate(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        tracing::warn!(pid, error = %err, "could not stop timed out command");
    }
}

impl CommandRunner for SystemRunner {
    fn run(&mut self, command: &UfwCommand) -> Result<String, Error> {
        let cmd = self.build(command);
        let limit = self.timeout;
        tracing::debug!(%command, sudo = self.sudo, "running");

        let result = self.runtime.block_on(output_within(cmd, limit));

        let output = match result {
            Ok(Some(output)) => output,
            Ok(None) => {
                tracing::warn!(%command, ?limit, "timed out, sent SIGTERM");
                return Err(failed(command, format!("timed out after {limit:?}")));
            }
            Err(e) => return Err(failed(command, e.to_string())),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let status = if stderr.is_empty() {
                output.status.to_string()
            } else {
                format!("{} ({stderr})", output.status)
            };
            return Err(failed(command, status));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Caches sudo credentials so calls can run with `sudo -n` and never
    /// prompt over the UI. Runs once before raw mode and again whenever sudo
    /// reports the cached credentials gone.
    fn authenticate(&mut self) -> Result<(), Error> {
        if !self.sudo {
            return Ok(());
        }
        let sudo_failed = |status: String| Error::CommandFailed { command: "sudo -v".into(), status };
        let status = std::process::Command::new("sudo")
            .arg("-v")
            .status()
            .map_err(|e| sudo_failed(e.to_string()))?;
        if !status.success() {
            return Err(sudo_failed(status.to_string()));
        }
        Ok(())
    }
}

/// In-memory stand-in for ufw.
#[derive(Debug, Default, Clone)]
pub struct SimulatedRunner {
    rules: Vec<Rule>,
    history: Vec<UfwCommand>,
    failing: Vec<(UfwCommand, String)>,
}

impl SimulatedRunner {
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules, ..Self::default() }
    }

    pub fn demo() -> Self {
        use crate::rules::Protocol;
        Self::with_rules(vec![
            Rule::new("22", Protocol::Tcp, true),
            Rule::new("80", Protocol::Any, true),
            Rule::new("443", Protocol::Tcp, true),
            Rule::new("25", Protocol::Any, false),
            Rule::new("53", Protocol::Udp, true),
            Rule::new("3306", Protocol::Tcp, false),
        ])
    }

    /// Makes every later `command` fail as if ufw rejected it.
    #[cfg(test)]
    pub fn fail_on(&mut self, command: UfwCommand) {
        self.fail_with(command, "exit status: 1");
    }

    #[cfg(test)]
    pub fn fail_with(&mut self, command: UfwCommand, status: &str) {
        self.failing.push((command, status.to_string()));
    }

    #[cfg(test)]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Every command received, in order, status reads excluded.
    pub fn history(&self) -> &[UfwCommand] {
        &self.history
    }

    /// `ufw status numbered` output, every rule listed for IPv4 then IPv6.
    pub fn status_text(&self) -> String {
        let mut out = String::from("Status: active\n\n");
        out.push_str("     To                         Action      From\n");
        out.push_str("     --                         ------      ----\n");
        let listing = self.rules.iter().map(|r| (r, false)).chain(self.rules.iter().map(|r| (r, true)));
        for (idx, (rule, v6)) in listing.enumerate() {
            let seq = idx + 1;
            let to = if v6 { format!("{} (v6)", rule.spec()) } else { rule.spec() };
            let from = if v6 { "Anywhere (v6)" } else { "Anywhere" };
            let action = if rule.allowed { "ALLOW IN" } else { "DENY IN" };
            out.push_str(&format!("[{seq:>2}] {to:<26} {action:<11} {from}\n"));
        }
        out
    }

    fn upsert(&mut self, spec: &str, allowed: bool) -> Result<(), String> {
        let parsed = Rule::parse_token(spec).map_err(|e| e.to_string())?;
        match self.rules.iter_mut().find(|r| r.key() == parsed.key()) {
            Some(rule) => rule.allowed = allowed,
            None => self.rules.push(Rule { allowed, ..parsed }),
        }
        Ok(())
    }
}

impl CommandRunner for SimulatedRunner {
    fn run(&mut self, command: &UfwCommand) -> Result<String, Error> {
        if command.is_mutation() {
            self.history.push(command.clone());
        }
        if let Some((_, status)) = self.failing.iter().find(|(c, _)| c == command) {
            return Err(failed(command, status.clone()));
        }

        match command {
            UfwCommand::Status => return Ok(self.status_text()),
            UfwCommand::Allow(spec) => self.upsert(spec, true),
            UfwCommand::Deny(spec) => self.upsert(spec, false),
            UfwCommand::Delete { action, spec } => {
                let allowed = *action == Action::Allow;
                self.rules.retain(|r| !(r.spec() == *spec && r.allowed == allowed));
                Ok(())
            }
        }
        .map_err(|e| failed(command, e))?;

        Ok(String::from("Rule updated\n"))
    }

    /// Fresh credentials clear every failure sudo blamed on stale ones.
    fn authenticate(&mut self) -> Result<(), Error> {
        self.failing.retain(|(command, status)| !failed(command, status.clone()).needs_authentication());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Protocol;
    use crate::status::parse_status;
    use std::path::{Path, PathBuf};

    /// Writes an executable shell script standing in for the ufw binary.
    fn fake_ufw(dir: &Path, body: &str) -> PathBuf {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;

        let script = dir.join("ufw");
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .mode(0o755)
            .open(&script)
            .unwrap();
        file.write_all(format!("#!/bin/sh\n{body}").as_bytes()).unwrap();
        script
    }

    fn system_runner(script: &Path, timeout: Duration) -> SystemRunner {
        SystemRunner::new(script.to_string_lossy(), Elevation::None, timeout).unwrap()
    }

    #[test]
    fn command_arguments() {
        assert_eq!(UfwCommand::Status.args(), ["status", "numbered"]);
        assert_eq!(UfwCommand::Allow("443/tcp".into()).args(), ["allow", "443/tcp"]);
        assert_eq!(UfwCommand::Deny("25".into()).args(), ["deny", "25"]);
        assert_eq!(
            UfwCommand::Delete { action: Action::Deny, spec: "25".into() }.to_string(),
            "ufw delete deny 25"
        );
        assert!(!UfwCommand::Status.is_mutation());
    }

    #[test]
    fn elevation_overrides() {
        assert!(Elevation::Sudo.uses_sudo());
        assert!(!Elevation::None.uses_sudo());
    }

    #[test]
    fn simulated_status_round_trips_through_parser() {
        let mut runner = SimulatedRunner::demo();
        let text = runner.run(&UfwCommand::Status).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with('[')).count(), 12);

        let rules = parse_status(&text).unwrap();
        assert_eq!(rules.len(), 6);
        assert_eq!(rules[0], Rule::new("22", Protocol::Tcp, true));
        assert!(runner.history().is_empty());
    }

    #[test]
    fn simulated_mutations() {
        let mut runner = SimulatedRunner::default();
        runner.run(&UfwCommand::Allow("22".into())).unwrap();
        runner.run(&UfwCommand::Deny("22".into())).unwrap();
        assert_eq!(runner.rules(), &[Rule::new("22", Protocol::Any, false)]);

        // wrong variant leaves the rule alone
        runner.run(&UfwCommand::Delete { action: Action::Allow, spec: "22".into() }).unwrap();
        assert_eq!(runner.rules().len(), 1);
        runner.run(&UfwCommand::Delete { action: Action::Deny, spec: "22".into() }).unwrap();
        assert!(runner.rules().is_empty());
        assert_eq!(runner.history().len(), 4);
    }

    #[test]
    fn simulated_failure() {
        let mut runner = SimulatedRunner::default();
        runner.fail_on(UfwCommand::Allow("80".into()));
        let err = runner.run(&UfwCommand::Allow("80".into())).unwrap_err();
        assert_eq!(
            err,
            Error::CommandFailed { command: "ufw allow 80".into(), status: "exit status: 1".into() }
        );
        assert!(runner.rules().is_empty());
    }

    #[test]
    fn system_runner_reports_missing_binary() {
        let mut runner = SystemRunner::new(
            "/nonexistent/ufwtui-test-binary",
            Elevation::None,
            Duration::from_secs(5),
        )
        .unwrap();
        let err = runner.run(&UfwCommand::Status).unwrap_err();
        assert!(matches!(err, Error::CommandFailed { ref command, .. } if command == "ufw status numbered"));
    }

    #[test]
    fn system_runner_returns_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_ufw(dir.path(), "echo \"Rule added for $1 $2\"\n");
        let mut runner = system_runner(&script, Duration::from_secs(5));

        let out = runner.run(&UfwCommand::Allow("443/tcp".into())).unwrap();
        assert_eq!(out, "Rule added for allow 443/tcp\n");
    }

    #[test]
    fn system_runner_reports_rejection_with_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_ufw(dir.path(), "echo 'ERROR: Bad port' >&2\nexit 1\n");
        let mut runner = system_runner(&script, Duration::from_secs(5));

        let err = runner.run(&UfwCommand::Allow("99999".into())).unwrap_err();
        let Error::CommandFailed { command, status } = err else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(command, "ufw allow 99999");
        assert!(status.starts_with("exit status: 1"), "{status}");
        assert!(status.contains("(ERROR: Bad port)"), "{status}");
    }

    #[test]
    fn system_runner_reports_bare_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_ufw(dir.path(), "exit 3\n");
        let mut runner = system_runner(&script, Duration::from_secs(5));

        let err = runner.run(&UfwCommand::Status).unwrap_err();
        assert!(matches!(err, Error::CommandFailed { ref status, .. } if status == "exit status: 3"));
    }

    #[test]
    fn system_runner_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_ufw(dir.path(), "exec sleep 5\n");
        let mut runner = system_runner(&script, Duration::from_millis(200));

        let err = runner.run(&UfwCommand::Allow("22".into())).unwrap_err();
        assert!(matches!(err, Error::CommandFailed { ref status, .. } if status.starts_with("timed out")));
    }

    #[test]
    fn timed_out_command_gets_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("terminated");
        let body = format!(
            "trap 'touch {}; exit 143' TERM\nsleep 5 &\nwait\n",
            marker.display()
        );
        let script = fake_ufw(dir.path(), &body);
        let mut runner = system_runner(&script, Duration::from_millis(300));

        assert!(runner.run(&UfwCommand::Deny("25".into())).is_err());
        for _ in 0..50 {
            if marker.exists() {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(marker.exists(), "the script never saw SIGTERM");
    }

    #[test]
    fn authenticate_without_sudo_is_a_no_op() {
        let mut runner = system_runner(Path::new("ufw"), Duration::from_secs(1));
        assert_eq!(runner.authenticate(), Ok(()));
    }

    #[test]
    fn simulated_authenticate_clears_stale_credentials() {
        let mut runner = SimulatedRunner::default();
        runner.fail_with(UfwCommand::Allow("22".into()), "exit status: 1 (sudo: a password is required)");
        runner.fail_on(UfwCommand::Allow("23".into()));
        assert!(runner.run(&UfwCommand::Allow("22".into())).is_err());

        runner.authenticate().unwrap();
        assert!(runner.run(&UfwCommand::Allow("22".into())).is_ok());
        assert!(runner.run(&UfwCommand::Allow("23".into())).is_err());
    }
}
