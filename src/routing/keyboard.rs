//! Buttons and keyboards
//!
//! A button either points at a screen (its `goto` or `sgoto` action), at a
//! handler, or at an external URL. Keyboards are plain values; rendering them into
//! Telegram markup happens in [`crate::telegram::render`].

use std::fmt;
use std::sync::Arc;

use strum::{AsRefStr, Display};
use url::Url;

use super::checksum::{encode_payload, Identifier, DEFAULT_IDENTIFIER_LEN};
use super::handler::{Handler, HandlerId};
use super::screen::{Screen, GOTO, SGOTO};
use crate::core::error::AppResult;

/// Kind of action behind a button
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SourceType {
    Goto,
    Route,
    Handler,
    Url,
    WebApp,
}

/// What pressing a button does
#[derive(Clone)]
pub enum ButtonSource {
    /// Show another screen (dispatched to that screen's `goto`)
    Goto(Arc<dyn Screen>),
    /// Follow the screen's routes (dispatched to that screen's `sgoto`)
    Route(Arc<dyn Screen>),
    Handler(Handler),
    Url(Url),
    WebApp(Url),
}

impl fmt::Debug for ButtonSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Goto(screen) => write!(f, "Goto({})", screen.id()),
            Self::Route(screen) => write!(f, "Route({})", screen.id()),
            Self::Handler(handler) => write!(f, "Handler({})", handler.id()),
            Self::Url(url) => write!(f, "Url({url})"),
            Self::WebApp(url) => write!(f, "WebApp({url})"),
        }
    }
}

/// One keyboard cell
#[derive(Clone, Debug)]
pub struct Button {
    caption: String,
    source: ButtonSource,
    args: String,
}

impl Button {
    pub fn new(caption: impl Into<String>, source: ButtonSource) -> Self {
        Self {
            caption: caption.into(),
            source,
            args: String::new(),
        }
    }

    pub fn goto(caption: impl Into<String>, screen: Arc<dyn Screen>) -> Self {
        Self::new(caption, ButtonSource::Goto(screen))
    }

    pub fn route(caption: impl Into<String>, screen: Arc<dyn Screen>) -> Self {
        Self::new(caption, ButtonSource::Route(screen))
    }

    pub fn handler(caption: impl Into<String>, handler: Handler) -> Self {
        Self::new(caption, ButtonSource::Handler(handler))
    }

    pub fn url(caption: impl Into<String>, url: Url) -> Self {
        Self::new(caption, ButtonSource::Url(url))
    }

    pub fn web_app(caption: impl Into<String>, url: Url) -> Self {
        Self::new(caption, ButtonSource::WebApp(url))
    }

    /// Free-form arguments appended to the callback payload.
    #[must_use]
    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn source(&self) -> &ButtonSource {
        &self.source
    }

    pub fn args(&self) -> &str {
        &self.args
    }

    pub fn source_type(&self) -> SourceType {
        match self.source {
            ButtonSource::Goto(_) => SourceType::Goto,
            ButtonSource::Route(_) => SourceType::Route,
            ButtonSource::Handler(_) => SourceType::Handler,
            ButtonSource::Url(_) => SourceType::Url,
            ButtonSource::WebApp(_) => SourceType::WebApp,
        }
    }

    /// Handler a press is dispatched to; `None` for URL buttons.
    pub fn target_handler_id(&self) -> Option<HandlerId> {
        match &self.source {
            ButtonSource::Goto(screen) => Some(HandlerId::builtin(screen.id(), GOTO)),
            ButtonSource::Route(screen) => Some(HandlerId::builtin(screen.id(), SGOTO)),
            ButtonSource::Handler(handler) => Some(handler.id().clone()),
            ButtonSource::Url(_) | ButtonSource::WebApp(_) => None,
        }
    }

    pub fn target_identifier(&self, identifier_len: usize) -> Option<Identifier> {
        self.target_handler_id()
            .map(|id| Identifier::derive(&id, identifier_len))
    }

    /// Wire payload for callback buttons, `Ok(None)` for URL buttons.
    pub fn callback_data(&self) -> AppResult<Option<String>> {
        self.callback_data_with_len(DEFAULT_IDENTIFIER_LEN)
    }

    pub fn callback_data_with_len(&self, identifier_len: usize) -> AppResult<Option<String>> {
        self.target_identifier(identifier_len)
            .map(|id| encode_payload(&id, &self.args))
            .transpose()
    }
}

/// Ordered grid of buttons
#[derive(Clone, Debug, Default)]
pub struct Keyboard {
    rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }

    pub fn push_row(&mut self, buttons: Vec<Button>) {
        self.rows.push(buttons);
    }

    pub fn rows(&self) -> &[Vec<Button>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }

    /// Handlers behind HANDLER buttons, in grid order.
    pub fn handler_sources(&self) -> impl Iterator<Item = &Handler> {
        self.buttons().filter_map(|b| match b.source() {
            ButtonSource::Handler(h) => Some(h),
            _ => None,
        })
    }

    /// Screens behind GOTO and ROUTE buttons with the builtin action a press
    /// lands on (`goto` or `sgoto`), in grid order.
    pub fn screen_targets(&self) -> impl Iterator<Item = (&Arc<dyn Screen>, &'static str)> {
        self.buttons().filter_map(|b| match b.source() {
            ButtonSource::Goto(screen) => Some((screen, GOTO)),
            ButtonSource::Route(screen) => Some((screen, SGOTO)),
            _ => None,
        })
    }
}
