//! Inbound actions and composable message filters

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

use regex::Regex;

use crate::core::error::{AppError, AppResult};

/// Rough shape of an inbound message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Photo,
    Document,
    Voice,
    Other,
}

/// Transport-independent view of a user message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub text: Option<String>,
    pub caption: Option<String>,
    pub kind: MessageKind,
}

impl InboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            caption: None,
            kind: MessageKind::Text,
        }
    }

    pub fn media(kind: MessageKind, caption: Option<String>) -> Self {
        Self {
            text: None,
            caption,
            kind,
        }
    }

    pub fn is_command(&self) -> bool {
        self.text.as_deref().is_some_and(|t| t.starts_with('/'))
    }
}

/// One thing a user did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundAction {
    /// Inline button press carrying `<identifier>,<args>`
    Callback { data: String },
    Message(InboundMessage),
}

impl InboundAction {
    pub fn callback(data: impl Into<String>) -> Self {
        Self::Callback { data: data.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Message(InboundMessage::text(text))
    }

    pub fn message(&self) -> Option<&InboundMessage> {
        match self {
            Self::Message(m) => Some(m),
            Self::Callback { .. } => None,
        }
    }

    pub fn callback_data(&self) -> Option<&str> {
        match self {
            Self::Callback { data } => Some(data),
            Self::Message(_) => None,
        }
    }
}

type Predicate = dyn Fn(&InboundMessage) -> bool + Send + Sync;

/// Named predicate over inbound messages
///
/// Filters compose with `&`, `|` and `!`:
///
/// ```
/// use screenflow::routing::MessageFilter;
///
/// let plain_text = MessageFilter::text() & !MessageFilter::command();
/// assert_eq!(plain_text.name(), "(text & !command)");
/// ```
#[derive(Clone)]
pub struct MessageFilter {
    name: Arc<str>,
    predicate: Arc<Predicate>,
}

impl MessageFilter {
    pub fn custom<F>(name: impl AsRef<str>, predicate: F) -> Self
    where
        F: Fn(&InboundMessage) -> bool + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.as_ref()),
            predicate: Arc::new(predicate),
        }
    }

    /// Any message
    pub fn all() -> Self {
        Self::custom("all", |_| true)
    }

    /// Messages with text
    pub fn text() -> Self {
        Self::custom("text", |m| m.text.is_some())
    }

    /// Messages whose text starts with `/`
    pub fn command() -> Self {
        Self::custom("command", InboundMessage::is_command)
    }

    pub fn kind(kind: MessageKind) -> Self {
        Self::custom(format!("kind:{kind:?}"), move |m| m.kind == kind)
    }

    /// Text or caption matching `pattern`
    pub fn regex(pattern: &str) -> AppResult<Self> {
        let re = Regex::new(pattern).map_err(|e| AppError::Config(format!("filter regex '{pattern}': {e}")))?;
        Ok(Self::custom(format!("regex:{pattern}"), move |m| {
            m.text
                .as_deref()
                .or(m.caption.as_deref())
                .is_some_and(|t| re.is_match(t))
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, message: &InboundMessage) -> bool {
        (self.predicate)(message)
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let name = format!("({} & {})", self.name, other.name);
        Self::custom(name, move |m| self.matches(m) && other.matches(m))
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        let name = format!("({} | {})", self.name, other.name);
        Self::custom(name, move |m| self.matches(m) || other.matches(m))
    }

    #[must_use]
    pub fn negate(self) -> Self {
        let name = format!("!{}", self.name);
        Self::custom(name, move |m| !self.matches(m))
    }
}

impl BitAnd for MessageFilter {
    type Output = MessageFilter;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(rhs)
    }
}

impl BitOr for MessageFilter {
    type Output = MessageFilter;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(rhs)
    }
}

impl Not for MessageFilter {
    type Output = MessageFilter;

    fn not(self) -> Self::Output {
        self.negate()
    }
}

impl fmt::Debug for MessageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageFilter({})", self.name)
    }
}

/// Plain text that is not a command.
pub fn typing() -> MessageFilter {
    MessageFilter::text() & !MessageFilter::command()
}

/// Regex for `/<name>`, optionally addressed as `/<name>@bot`, followed by
/// whitespace or the end of the text. Group 1 holds the arguments.
pub fn command_pattern(name: &str) -> AppResult<Regex> {
    if !lazy_regex::regex_is_match!(r"^[A-Za-z0-9_]{1,32}$", name) {
        return Err(AppError::InvalidCommandName(name.to_string()));
    }
    let source = format!(r"(?s)^/{}(?:@[A-Za-z0-9_]+)?(?:\s+(.*))?$", regex::escape(name));
    Regex::new(&source).map_err(|e| AppError::Config(format!("command pattern for '{name}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typing_filter() {
        let f = typing();
        assert!(f.matches(&InboundMessage::text("hello")));
        assert!(!f.matches(&InboundMessage::text("/start")));
        assert!(!f.matches(&InboundMessage::media(MessageKind::Photo, Some("cap".into()))));
    }

    #[test]
    fn test_combinators_and_names() {
        let f = MessageFilter::kind(MessageKind::Photo) | MessageFilter::kind(MessageKind::Document);
        assert_eq!(f.name(), "(kind:Photo | kind:Document)");
        assert!(f.matches(&InboundMessage::media(MessageKind::Document, None)));
        assert!(!f.matches(&InboundMessage::text("x")));
    }

    #[test]
    fn test_regex_filter_checks_caption_too() {
        let f = MessageFilter::regex(r"^\d+$").unwrap();
        assert!(f.matches(&InboundMessage::text("123")));
        assert!(f.matches(&InboundMessage::media(MessageKind::Photo, Some("42".into()))));
        assert!(!f.matches(&InboundMessage::text("12a")));
    }

    #[test]
    fn test_bad_regex_is_config_error() {
        assert!(matches!(MessageFilter::regex("("), Err(AppError::Config(_))));
    }

    #[test]
    fn test_command_pattern_boundaries() {
        let re = command_pattern("help").unwrap();
        assert!(re.is_match("/help"));
        assert!(re.is_match("/help topic"));
        assert!(re.is_match("/help@demo_bot"));
        assert!(!re.is_match("/helpme"));
        assert!(!re.is_match("help"));
        assert!(!re.is_match(" /help"));
        let caps = re.captures("/help  two words").unwrap();
        assert_eq!(caps.get(1).map(|m| m.as_str()), Some("two words"));
    }

    #[test]
    fn test_command_name_validation() {
        assert!(matches!(command_pattern(""), Err(AppError::InvalidCommandName(_))));
        assert!(matches!(command_pattern("he lp"), Err(AppError::InvalidCommandName(_))));
        assert!(matches!(command_pattern("a.b"), Err(AppError::InvalidCommandName(_))));
        assert!(command_pattern("set_lang2").is_ok());
    }

    #[test]
    fn test_action_accessors() {
        let cb = InboundAction::callback("abc,1");
        assert_eq!(cb.callback_data(), Some("abc,1"));
        assert!(cb.message().is_none());
        let msg = InboundAction::text("/x");
        assert!(msg.message().is_some_and(InboundMessage::is_command));
    }
}
