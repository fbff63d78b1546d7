use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Error;
use crate::rules::{Protocol, Rule};

lazy_static! {
    static ref NUMBERED: Regex = Regex::new(r"^\[\s*\d+\]").unwrap();
    static ref RULE_LINE: Regex =
        Regex::new(r"^\[\s*\d+\]\s+(\w+)(?:/(tcp|udp))?\s+(ALLOW|DENY)").unwrap();
}

/// Parses `ufw status numbered` output into rules sorted by port id.
///
/// ufw lists every rule once per address family, so only the first half of
/// the numbered lines is kept. Any numbered line in that half that is not a
/// port rule rejects the whole listing.
pub fn parse_status(text: &str) -> Result<Vec<Rule>, Error> {
    let numbered: Vec<&str> = text.lines().filter(|line| NUMBERED.is_match(line)).collect();

    if numbered.len() % 2 != 0 {
        return Err(Error::MalformedStatus { count: numbered.len() });
    }

    let mut rules = numbered[..numbered.len() / 2]
        .iter()
        .map(|line| parse_line(line))
        .collect::<Result<Vec<_>, _>>()?;

    rules.sort_by(|a, b| a.port_id.cmp(&b.port_id));
    Ok(rules)
}

fn parse_line(line: &str) -> Result<Rule, Error> {
    let cap = RULE_LINE
        .captures(line)
        .ok_or_else(|| Error::MalformedLine { line: line.to_string() })?;

    Ok(Rule {
        port_id: cap[1].to_string(),
        protocol: Protocol::from_suffix(cap.get(2).map(|m| m.as_str())),
        allowed: &cap[3] == "ALLOW",
    })
}
