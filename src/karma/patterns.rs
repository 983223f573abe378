//! The command grammar.
//!
//! Every command is one [`Rule`]: a regex plus a function lifting its captures into a
//! [`Command`]. Rules are tried in table order and the first match wins, so the order of
//! [`Grammar::new`]'s table *is* the command precedence. The motivate shortcut is not a rule; it
//! rewrites the message before the table runs.

use regex::{Captures, Regex};

use crate::karma::policy;

/// A user token: an optional `@`, then either `<@ID>` or a bare name of two or more characters.
const USER: &str = r"@??((?:<@)??\w[A-Za-z0-9_\-@<>]+?)";
/// Between the name and the operator in a whole-message command (`user: ++` from autocomplete).
const SEPARATOR: &str = r"(?:: ?)??";
/// Between the name and the operator mid-sentence, where only the full `": "` counts.
const EXPLICIT_SEPARATOR: &str = r"(?:: )??";
const POINTS: &str = r"(\+{2,}|-{2,})";
const REASON: &str = r"(?:(?: for)? +(.*))?";

pub const MOTIVATE_REASON: &str = "doing good work";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Url,
    Give(GiveMatch),
    Leaderboard { limit: Option<String> },
    Throwback { target: Option<String> },
    Query { target: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiveMatch {
    /// Raw user token, `<@ID>` or a bare name.
    pub target: String,
    /// The run of `+` or `-` characters.
    pub operator: String,
    pub reason: Option<String>,
}

impl GiveMatch {
    /// Signed delta for this operator: one less than its length, capped at `max_points`.
    pub fn points(&self, max_points: u32) -> i64 {
        let magnitude = self.operator.len() as i64 - 1;
        let raw = match self.operator.starts_with('-') {
            true => -magnitude,
            false => magnitude,
        };

        policy::clamp(raw, max_points)
    }
}

struct Rule {
    name: &'static str,
    regex: Regex,
    extract: fn(&Captures<'_>) -> Option<Command>,
}

impl Rule {
    fn new(
        name: &'static str,
        pattern: &str,
        extract: fn(&Captures<'_>) -> Option<Command>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            regex: Regex::new(pattern)?,
            extract,
        })
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

#[derive(Debug)]
pub struct Grammar {
    rules: Vec<Rule>,
    motivate: Regex,
}

impl Grammar {
    pub fn new() -> Result<Self, regex::Error> {
        let give = format!(
            "(?:^{USER}{SEPARATOR}{POINTS}{REASON}$)|(?:\\s+{USER}{EXPLICIT_SEPARATOR}{POINTS}{REASON}$)"
        );

        let rules = vec![
            Rule::new("url", r"^karma(?:bot)? (?:url|web|link)$", |_| {
                Some(Command::Url)
            })?,
            Rule::new("give", &give, give_match)?,
            Rule::new(
                "leaderboard",
                r"^karma(?:bot)? (?:leaderboard|top|highscores) ?([0-9]+)?$",
                |caps| {
                    Some(Command::Leaderboard {
                        limit: capture(caps, 1),
                    })
                },
            )?,
            Rule::new(
                "throwback",
                &format!("^karma(?:bot)? throwback(?: +{USER})?$"),
                |caps| {
                    Some(Command::Throwback {
                        target: capture(caps, 1),
                    })
                },
            )?,
            Rule::new("query", &format!("^{USER}==$"), |caps| {
                Some(Command::Query {
                    target: capture(caps, 1)?,
                })
            })?,
        ];

        Ok(Self {
            rules,
            motivate: Regex::new(&format!(r"^(?:\?|!)m +{USER}:?? ??$"))?,
        })
    }

    /// Recognizes `text` as a command, honoring rule precedence.
    pub fn parse(&self, text: &str) -> Option<Command> {
        self.rules.iter().find_map(|rule| {
            let caps = rule.regex.captures(text)?;
            let command = (rule.extract)(&caps)?;
            tracing::trace!(rule = rule.name, "matched command");

            Some(command)
        })
    }

    /// Expands `?m user` / `!m user` into `user++ for doing good work`.
    pub fn expand_motivate(&self, text: &str) -> Option<String> {
        let user = self.motivate.captures(text)?.get(1)?.as_str();
        Some(format!("{user}++ for {MOTIVATE_REASON}"))
    }
}

fn capture(caps: &Captures<'_>, idx: usize) -> Option<String> {
    caps.get(idx)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn give_match(caps: &Captures<'_>) -> Option<Command> {
    // groups 1-3 belong to the whole-message form, 4-6 to the mid-sentence one
    let offset = if caps.get(1).is_some() { 0 } else { 3 };

    Some(Command::Give(GiveMatch {
        target: capture(caps, 1 + offset)?,
        operator: capture(caps, 2 + offset)?,
        reason: capture(caps, 3 + offset),
    }))
}
