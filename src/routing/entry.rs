//! Dispatch entries built from classified screen members

use std::fmt;

use regex::Regex;

use super::checksum::Identifier;
use super::filters::{command_pattern, typing, InboundAction, MessageFilter};
use super::handler::Handler;
use super::screen::{HandlerType, Member};
use crate::core::error::{AppError, AppResult};

/// How an entry recognizes the action it handles
#[derive(Clone)]
pub enum MatchRule {
    /// Callback payload starting with `<identifier>,`
    Callback { identifier: Identifier, pattern: Regex },
    /// `/name` command message
    Command { name: String, pattern: Regex },
    /// Any message the filter accepts
    Filter(MessageFilter),
}

impl MatchRule {
    /// Short human-readable form used in route listings.
    pub fn describe(&self) -> String {
        match self {
            Self::Callback { identifier, .. } => format!("callback {identifier}"),
            Self::Command { name, .. } => format!("/{name}"),
            Self::Filter(filter) => format!("filter {}", filter.name()),
        }
    }

    fn matches(&self, action: &InboundAction) -> Option<Match> {
        match (self, action) {
            (Self::Callback { pattern, .. }, InboundAction::Callback { data }) => pattern
                .captures(data)
                .map(|caps| Match::with_args(caps.get(1).map_or("", |m| m.as_str()))),
            (Self::Command { pattern, .. }, InboundAction::Message(message)) => {
                let text = message.text.as_deref()?;
                pattern.captures(text).map(|caps| match caps.get(1) {
                    Some(args) => Match::with_args(args.as_str()),
                    None => Match::default(),
                })
            }
            (Self::Filter(filter), InboundAction::Message(message)) => {
                filter.matches(message).then(Match::default)
            }
            _ => None,
        }
    }
}

impl fmt::Debug for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Successful match; `args` is the callback tail or the command arguments
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Match {
    pub args: Option<String>,
}

impl Match {
    fn with_args(args: &str) -> Self {
        Self {
            args: Some(args.to_string()),
        }
    }
}

/// One row of a state's handler list
#[derive(Clone, Debug)]
pub struct HandlerEntry {
    screen: &'static str,
    member: String,
    handler: Handler,
    handler_type: HandlerType,
    rule: MatchRule,
}

impl HandlerEntry {
    pub fn screen(&self) -> &'static str {
        self.screen
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    /// The permission-wrapped handler.
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn handler_type(&self) -> HandlerType {
        self.handler_type
    }

    pub fn rule(&self) -> &MatchRule {
        &self.rule
    }

    /// Callback identifier, for button entries.
    pub fn identifier(&self) -> Option<&Identifier> {
        match &self.rule {
            MatchRule::Callback { identifier, .. } => Some(identifier),
            _ => None,
        }
    }

    pub fn matches(&self, action: &InboundAction) -> Option<Match> {
        self.rule.matches(action)
    }
}

/// Builds the dispatch entry for `member` around the already wrapped handler.
///
/// Untagged members (the builtin actions) are buttons. The callback
/// identifier comes from the handler id, which wrapping leaves untouched.
pub fn build_entry(
    screen: &'static str,
    member: &Member,
    handler: Handler,
    identifier_len: usize,
) -> AppResult<HandlerEntry> {
    let handler_type = match member.tag() {
        None => HandlerType::Button,
        Some(tag) => tag.resolve().map_err(|tag| AppError::UnknownHandlerType {
            screen: screen.to_string(),
            member: member.name().to_string(),
            tag,
        })?,
    };

    let rule = match handler_type {
        HandlerType::Button => {
            let identifier = Identifier::derive(handler.id(), identifier_len);
            let pattern = identifier.pattern()?;
            MatchRule::Callback { identifier, pattern }
        }
        HandlerType::Command => {
            let name = member.command_name().ok_or_else(|| AppError::MissingCommandName {
                screen: screen.to_string(),
                member: member.name().to_string(),
            })?;
            MatchRule::Command {
                name: name.to_string(),
                pattern: command_pattern(name)?,
            }
        }
        HandlerType::Input => {
            let filter = member.filter().cloned().ok_or_else(|| AppError::MissingFilter {
                screen: screen.to_string(),
                member: member.name().to_string(),
            })?;
            MatchRule::Filter(filter)
        }
        HandlerType::Typing => MatchRule::Filter(typing()),
    };

    Ok(HandlerEntry {
        screen,
        member: member.name().to_string(),
        handler,
        handler_type,
        rule,
    })
}
