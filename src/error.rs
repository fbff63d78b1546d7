use thiserror::Error;

/// What `sudo -n` prints once its cached credentials have expired.
const SUDO_PASSWORD_REQUIRED: &str = "a password is required";

/// Errors raised while reading or changing ufw rules.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// `ufw status numbered` listed an odd number of rule lines
    #[error("Malformed ufw status: expected an even number of numbered rules, got {count}")]
    MalformedStatus { count: usize },

    /// A numbered line that does not look like a port rule
    #[error("Invalid line: {line}")]
    MalformedLine { line: String },

    #[error("Invalid port: {0}")]
    InvalidToken(String),

    #[error("Port {0} already exists")]
    DuplicateRule(String),

    /// The external command could not be launched, exited non-zero or timed out
    #[error("Command `{command}` failed: {status}")]
    CommandFailed { command: String, status: String },
}

impl Error {
    /// Startup cannot continue past these.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MalformedStatus { .. } | Self::MalformedLine { .. })
    }

    /// The command was refused because sudo wants a password again.
    pub fn needs_authentication(&self) -> bool {
        matches!(self, Self::CommandFailed { status, .. } if status.contains(SUDO_PASSWORD_REQUIRED))
    }

    /// Problems with a single add-ports token, shown without an error header.
    pub fn is_token_problem(&self) -> bool {
        matches!(self, Self::InvalidToken(_) | Self::DuplicateRule(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_are_fatal() {
        assert!(Error::MalformedStatus { count: 3 }.is_fatal());
        assert!(Error::MalformedLine { line: "[ 1] ?".into() }.is_fatal());
        assert!(!Error::InvalidToken("a/b".into()).is_fatal());
        assert!(!Error::DuplicateRule("22".into()).is_fatal());
        assert!(!Error::CommandFailed { command: "ufw allow 22".into(), status: "exit status: 1".into() }.is_fatal());
    }

    #[test]
    fn messages_name_the_offender() {
        assert_eq!(Error::InvalidToken("80/icmp".into()).to_string(), "Invalid port: 80/icmp");
        assert_eq!(Error::DuplicateRule("22/tcp".into()).to_string(), "Port 22/tcp already exists");
        let err = Error::CommandFailed { command: "ufw deny 25".into(), status: "timed out after 30s".into() };
        assert_eq!(err.to_string(), "Command `ufw deny 25` failed: timed out after 30s");
    }

    #[test]
    fn expired_sudo_credentials_are_recognised() {
        let expired = Error::CommandFailed {
            command: "ufw allow 22".into(),
            status: "exit status: 1 (sudo: a password is required)".into(),
        };
        assert!(expired.needs_authentication());
        let rejected = Error::CommandFailed { command: "ufw allow 22".into(), status: "exit status: 1".into() };
        assert!(!rejected.needs_authentication());
        assert!(!Error::InvalidToken("x".into()).needs_authentication());
    }

    #[test]
    fn token_problems() {
        assert!(Error::InvalidToken("80/icmp".into()).is_token_problem());
        assert!(Error::DuplicateRule("22".into()).is_token_problem());
        assert!(!Error::MalformedStatus { count: 1 }.is_token_problem());
    }
}
