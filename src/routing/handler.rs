//! Handler callables, invocation context and outcomes
//!
//! A [`Handler`] is an async function from [`Context`] to [`HandlerResult`]
//! paired with a stable [`HandlerId`]. The id is what the identifier service
//! hashes into callback payloads, so it must not change between restarts of
//! the same build.

use std::any::{type_name, TypeId};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use super::checksum::{Identifier, DEFAULT_IDENTIFIER_LEN};
use super::filters::InboundAction;
use super::keyboard::Keyboard;
use super::permissions::PolicyId;
use super::state::State;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What every handler returns
pub type HandlerResult = Result<Outcome, HandlerError>;

/// Conversation identity (the chat id)
pub type SessionKey = i64;

type HandlerFn = dyn Fn(Context) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// Fully-qualified handler identity
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(Arc<str>);

impl HandlerId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Identity of a builtin screen action, e.g. `app::MainMenu::goto`.
    pub fn builtin(screen_id: &str, action: &str) -> Self {
        Self::new(format!("{screen_id}::{action}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HandlerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for HandlerId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Everything a handler gets to see about one inbound action
#[derive(Clone, Debug)]
pub struct Context {
    pub session: SessionKey,
    pub user_id: Option<i64>,
    /// Conversation state at the moment the action arrived
    pub state: Option<State>,
    pub action: InboundAction,
    /// Free-form arguments: the callback payload tail or the command tail
    pub args: Option<String>,
}

impl Context {
    pub fn new(session: SessionKey, action: InboundAction) -> Self {
        Self {
            session,
            user_id: None,
            state: None,
            action,
            args: None,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    #[must_use]
    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = Some(args.into());
        self
    }

    /// Message text, if the action is a message with text.
    pub fn text(&self) -> Option<&str> {
        self.action.message().and_then(|m| m.text.as_deref())
    }
}

/// How a render reaches the chat
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    /// Replace the message the action came from
    Edit,
    /// Post a new message
    Send,
}

/// Outgoing message produced by a handler
#[derive(Clone, Debug)]
pub struct Render {
    pub text: String,
    pub keyboard: Option<Keyboard>,
    pub mode: RenderMode,
}

impl Render {
    pub fn send(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
            mode: RenderMode::Send,
        }
    }

    pub fn edit(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
            mode: RenderMode::Edit,
        }
    }

    #[must_use]
    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Where the conversation goes after a handler ran
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Stay,
    To(State),
    /// Conversation finished; the stored state is dropped
    End,
}

/// Result of a successful handler call
#[derive(Clone, Debug)]
pub struct Outcome {
    pub transition: Transition,
    pub renders: Vec<Render>,
    /// Set when a permission policy answered instead of the handler
    pub denied_by: Option<PolicyId>,
}

impl Outcome {
    pub fn stay() -> Self {
        Self::with_transition(Transition::Stay)
    }

    pub fn to(state: State) -> Self {
        Self::with_transition(Transition::To(state))
    }

    pub fn end() -> Self {
        Self::with_transition(Transition::End)
    }

    fn with_transition(transition: Transition) -> Self {
        Self {
            transition,
            renders: Vec::new(),
            denied_by: None,
        }
    }

    #[must_use]
    pub fn render(mut self, render: Render) -> Self {
        self.renders.push(render);
        self
    }

    #[must_use]
    pub fn denied_by(mut self, policy: PolicyId) -> Self {
        self.denied_by = Some(policy);
        self
    }
}

/// A registered callable with its identity and permission opt-outs
#[derive(Clone)]
pub struct Handler {
    id: HandlerId,
    /// Type of the wrapped callable; tells apart distinct closures sharing an id
    origin: TypeId,
    func: Arc<HandlerFn>,
    permissions_ignored: Arc<BTreeSet<PolicyId>>,
}

impl Handler {
    /// Wraps a function, taking its identity from the function's type path.
    ///
    /// For a function item `app::screens::open` the id is `app::screens::open`.
    /// Closures all end in `{{closure}}`, so two closures declared in the same
    /// function share an id; give those an explicit one with [`Handler::named`].
    /// Registering both anyway is rejected when the state table is built.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::named(type_name::<F>(), f)
    }

    /// Wraps a function under an explicit identity.
    pub fn named<F, Fut>(id: impl Into<HandlerId>, f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            id: id.into(),
            origin: TypeId::of::<F>(),
            func: Arc::new(move |ctx| f(ctx).boxed()),
            permissions_ignored: Arc::new(BTreeSet::new()),
        }
    }

    /// Same identity and opt-outs, different body. Used by permission wrappers.
    pub(crate) fn rewrap<F, Fut>(&self, f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            id: self.id.clone(),
            origin: self.origin,
            func: Arc::new(move |ctx| f(ctx).boxed()),
            permissions_ignored: Arc::clone(&self.permissions_ignored),
        }
    }

    /// Opts this handler out of the policy with the given identity.
    #[must_use]
    pub fn ignore_permission(mut self, policy: PolicyId) -> Self {
        Arc::make_mut(&mut self.permissions_ignored).insert(policy);
        self
    }

    pub fn id(&self) -> &HandlerId {
        &self.id
    }

    /// Whether both handlers wrap the same callable, wrappers aside.
    pub fn same_origin(&self, other: &Handler) -> bool {
        self.origin == other.origin
    }

    pub fn permissions_ignored(&self) -> &BTreeSet<PolicyId> {
        &self.permissions_ignored
    }

    pub fn ignores(&self, policy: &PolicyId) -> bool {
        self.permissions_ignored.contains(policy)
    }

    /// Callback identifier with the default length.
    pub fn identifier(&self) -> Identifier {
        Identifier::derive(&self.id, DEFAULT_IDENTIFIER_LEN)
    }

    pub fn call(&self, ctx: Context) -> BoxFuture<'static, HandlerResult> {
        (self.func)(ctx)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("permissions_ignored", &self.permissions_ignored)
            .finish()
    }
}
