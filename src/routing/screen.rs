//! Screens, their members, and member classification
//!
//! A screen declares its handlers explicitly through [`Screen::members`].
//! Classification turns a screen into the ordered list of members that get
//! registered: declared members first, then handlers found only on the
//! keyboard, then the builtin navigation actions.

use std::any::type_name;
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use strum::{AsRefStr, Display, EnumString};

use super::filters::MessageFilter;
use super::handler::{Context, Handler, HandlerId, Outcome, Render, RenderMode, Transition};
use super::keyboard::Keyboard;
use super::state::State;

pub const START: &str = "start";
pub const GOTO: &str = "goto";
pub const JUMP: &str = "jump";
pub const SGOTO: &str = "sgoto";
pub const SJUMP: &str = "sjump";

/// Member names that are registered even without a handler type tag
pub const RESERVED_NAMES: [&str; 5] = [START, GOTO, JUMP, SGOTO, SJUMP];

/// Members that fan out over the screen's routes
pub const ROUTE_HANDLERS: [&str; 2] = [SGOTO, SJUMP];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

pub fn is_route_handler(name: &str) -> bool {
    ROUTE_HANDLERS.contains(&name)
}

/// How a registered member is triggered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum HandlerType {
    /// Inline button press, matched by callback identifier
    Button,
    /// `/name` command
    Command,
    /// Message accepted by the member's filter
    Input,
    /// Plain text that is not a command
    Typing,
}

/// Handler type as declared on a member
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerTag {
    Known(HandlerType),
    /// Tag taken from declarative metadata, checked at registration
    Raw(String),
}

impl HandlerTag {
    pub fn resolve(&self) -> Result<HandlerType, String> {
        match self {
            Self::Known(t) => Ok(*t),
            Self::Raw(raw) => HandlerType::from_str(raw.trim()).map_err(|_| raw.clone()),
        }
    }
}

/// Fan-out rule for `sgoto`/`sjump`: registered in every state of `states`,
/// moving the conversation to `target` when pressed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub states: BTreeSet<State>,
    pub target: State,
}

impl Route {
    pub fn new(states: impl IntoIterator<Item = State>, target: State) -> Self {
        Self {
            states: states.into_iter().collect(),
            target,
        }
    }
}

/// Target of the first route whose state set contains `current`.
pub fn route_target(routes: &[Route], current: Option<State>) -> Option<State> {
    let current = current?;
    routes
        .iter()
        .find(|route| route.states.contains(&current))
        .map(|route| route.target)
}

/// Where a classified member came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberOrigin {
    Declared,
    Keyboard,
    Builtin,
}

/// A handler exposed by a screen, with the metadata its trigger needs
#[derive(Clone, Debug)]
pub struct Member {
    name: String,
    handler: Handler,
    tag: Option<HandlerTag>,
    command_name: Option<String>,
    filter: Option<MessageFilter>,
    origin: MemberOrigin,
}

impl Member {
    fn with_tag(name: impl Into<String>, handler: Handler, tag: Option<HandlerTag>) -> Self {
        Self {
            name: name.into(),
            handler,
            tag,
            command_name: None,
            filter: None,
            origin: MemberOrigin::Declared,
        }
    }

    pub fn button(name: impl Into<String>, handler: Handler) -> Self {
        Self::with_tag(name, handler, Some(HandlerTag::Known(HandlerType::Button)))
    }

    pub fn command(name: impl Into<String>, command_name: impl Into<String>, handler: Handler) -> Self {
        Self::with_tag(name, handler, Some(HandlerTag::Known(HandlerType::Command))).with_command_name(command_name)
    }

    pub fn input(name: impl Into<String>, filter: MessageFilter, handler: Handler) -> Self {
        Self::with_tag(name, handler, Some(HandlerTag::Known(HandlerType::Input))).with_filter(filter)
    }

    pub fn typing(name: impl Into<String>, handler: Handler) -> Self {
        Self::with_tag(name, handler, Some(HandlerTag::Known(HandlerType::Typing)))
    }

    /// Untagged member. Registered only under a reserved name, otherwise
    /// reported as unregistered and skipped.
    pub fn helper(name: impl Into<String>, handler: Handler) -> Self {
        Self::with_tag(name, handler, None)
    }

    /// Member whose handler type comes from a string, e.g. a manifest.
    pub fn tagged(name: impl Into<String>, tag: impl Into<String>, handler: Handler) -> Self {
        Self::with_tag(name, handler, Some(HandlerTag::Raw(tag.into())))
    }

    #[must_use]
    pub fn with_command_name(mut self, command_name: impl Into<String>) -> Self {
        self.command_name = Some(command_name.into());
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: MessageFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    fn with_origin(mut self, origin: MemberOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn tag(&self) -> Option<&HandlerTag> {
        self.tag.as_ref()
    }

    pub fn command_name(&self) -> Option<&str> {
        self.command_name.as_deref()
    }

    pub fn filter(&self) -> Option<&MessageFilter> {
        self.filter.as_ref()
    }

    pub fn origin(&self) -> MemberOrigin {
        self.origin
    }

    /// Reserved name or carries a tag.
    pub fn qualifies(&self) -> bool {
        self.tag.is_some() || is_reserved(&self.name)
    }
}

/// A unit of conversation: some text, a keyboard and the handlers behind it
///
/// Building a screen must be cheap and free of side effects; the registration
/// pass asks every screen for its keyboard, routes and members once per
/// declaring state.
pub trait Screen: Send + Sync + 'static {
    /// Identity used to derive builtin handler ids.
    fn id(&self) -> &'static str {
        type_name::<Self>()
    }

    /// Message text shown by `goto`/`jump`.
    fn description(&self) -> String {
        String::new()
    }

    fn keyboard(&self) -> Keyboard {
        Keyboard::default()
    }

    fn routes(&self) -> Vec<Route> {
        Vec::new()
    }

    fn members(&self) -> Vec<Member> {
        Vec::new()
    }
}

/// Receives registration diagnostics
pub trait RegistrationObserver: Send + Sync {
    /// A member that is neither reserved nor tagged was skipped.
    fn unregistered_handler(&self, screen: &str, member: &str);
}

/// Observer writing to the log
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl RegistrationObserver for LogObserver {
    fn unregistered_handler(&self, screen: &str, member: &str) {
        log::warn!(
            "{}::{} is neither a reserved action nor tagged with a handler type, skipping",
            screen,
            member
        );
    }
}

/// Message showing `screen` with its keyboard.
pub fn render_screen(screen: &dyn Screen, mode: RenderMode) -> Render {
    let keyboard = screen.keyboard();
    Render {
        text: screen.description(),
        keyboard: (!keyboard.is_empty()).then_some(keyboard),
        mode,
    }
}

fn builtin_handler(screen: &Arc<dyn Screen>, action: &'static str, routes: Vec<Route>) -> Handler {
    let screen = Arc::clone(screen);
    let id = HandlerId::builtin(screen.id(), action);
    let mode = if action == GOTO || action == SGOTO {
        RenderMode::Edit
    } else {
        RenderMode::Send
    };

    Handler::named(id, move |ctx: Context| {
        let render = render_screen(screen.as_ref(), mode);
        let transition = if is_route_handler(action) {
            match route_target(&routes, ctx.state) {
                Some(target) => Transition::To(target),
                None => {
                    log::debug!("{}::{} pressed outside its routes, staying", screen.id(), action);
                    Transition::Stay
                }
            }
        } else {
            Transition::Stay
        };
        async move {
            Ok(Outcome {
                transition,
                renders: vec![render],
                denied_by: None,
            })
        }
    })
}

/// Start handler for an entry-point screen: its declared `start` member if
/// any, otherwise a handler sending the screen and moving to `initial_state`.
pub fn start_handler(screen: &Arc<dyn Screen>, initial_state: State) -> Handler {
    if let Some(member) = screen.members().into_iter().find(|m| m.name() == START) {
        return member.handler;
    }

    let screen = Arc::clone(screen);
    let id = HandlerId::builtin(screen.id(), START);
    Handler::named(id, move |_ctx: Context| {
        let render = render_screen(screen.as_ref(), RenderMode::Send);
        async move { Ok(Outcome::to(initial_state).render(render)) }
    })
}

/// Ordered members of `screen` that take part in routing.
///
/// Declared members come first, then keyboard targets (HANDLER buttons and
/// the builtins behind GOTO/ROUTE buttons to other screens), then this
/// screen's builtins. Untagged members outside the reserved names go to
/// `observer` and are dropped. A declared member named like a builtin
/// replaces the builtin.
pub fn classify(screen: &Arc<dyn Screen>, observer: &dyn RegistrationObserver) -> Vec<Member> {
    let mut classified = Vec::new();
    let mut names = HashSet::new();
    let mut handler_ids = HashSet::new();

    for member in screen.members() {
        if !member.qualifies() {
            observer.unregistered_handler(screen.id(), member.name());
            continue;
        }
        names.insert(member.name.clone());
        handler_ids.insert(member.handler.id().clone());
        classified.push(member);
    }

    let keyboard = screen.keyboard();
    for handler in keyboard.handler_sources() {
        if handler_ids.insert(handler.id().clone()) {
            classified.push(
                Member::button(handler.id().as_str(), handler.clone()).with_origin(MemberOrigin::Keyboard),
            );
        }
    }

    // Buttons leading to other screens land on that screen's builtin, which
    // has to be reachable from the state showing the button.
    for (target, action) in keyboard.screen_targets() {
        if target.id() == screen.id() {
            continue;
        }
        let handler = builtin_handler(target, action, target.routes());
        if handler_ids.insert(handler.id().clone()) {
            classified.push(
                Member::button(handler.id().as_str(), handler.clone()).with_origin(MemberOrigin::Keyboard),
            );
        }
    }

    let routes = screen.routes();
    for action in [GOTO, JUMP, SGOTO, SJUMP] {
        if names.contains(action) {
            continue;
        }
        let handler = builtin_handler(screen, action, routes.clone());
        classified.push(Member::helper(action, handler).with_origin(MemberOrigin::Builtin));
    }

    classified
}
