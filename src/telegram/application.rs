//! The application shell: state table, start handler, error handlers and jobs
//!
//! Everything is assembled and validated in [`ApplicationBuilder::build`].
//! A built [`Application`] never changes; [`Application::dispatch`] can be
//! called concurrently for different sessions.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use secrecy::ExposeSecret;
use teloxide::Bot;

use super::jobs::Job;
use super::runtime;
use super::session::{ConversationStore, InMemoryStore};
use crate::core::config::Settings;
use crate::core::error::{AppError, AppResult};
use crate::core::metrics::RoutingMetrics;
use crate::routing::filters::command_pattern;
use crate::routing::permissions::{apply_permission_to, Permission};
use crate::routing::screen::{start_handler, START};
use crate::routing::{
    Context, Handler, HandlerError, HandlerId, InboundAction, LogObserver, Outcome, PermissionRegistry,
    RegistrationObserver, RouteRegistration, Screen, SessionKey, State, StateTable, StateTableBuilder, Transition,
};

/// Receives errors returned by handlers
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn on_error(&self, ctx: &Context, handler: &HandlerId, error: &HandlerError);
}

/// Writes handler errors to the log
#[derive(Clone, Copy, Debug, Default)]
pub struct LogErrorHandler;

#[async_trait]
impl ErrorHandler for LogErrorHandler {
    async fn on_error(&self, ctx: &Context, handler: &HandlerId, error: &HandlerError) {
        log::error!("Handler {} failed for session {}: {}", handler, ctx.session, error);
    }
}

/// What happened to one inbound action
#[derive(Debug)]
pub enum Dispatch {
    Handled(Outcome),
    /// Nothing in the current state accepts the action
    NoMatch,
    /// The handler returned an error; error handlers have been notified
    Failed,
}

/// Collects the pieces of an [`Application`]
pub struct ApplicationBuilder {
    name: String,
    settings: Option<Settings>,
    entry_point: Option<Arc<dyn Screen>>,
    initial_state: Option<State>,
    states: Vec<(State, Vec<Arc<dyn Screen>>)>,
    error_handlers: Vec<Arc<dyn ErrorHandler>>,
    jobs: Vec<Job>,
    store: Option<Arc<dyn ConversationStore>>,
    permissions: PermissionRegistry,
    route_registration: RouteRegistration,
    identifier_len: Option<usize>,
    observer: Arc<dyn RegistrationObserver>,
}

impl ApplicationBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: None,
            entry_point: None,
            initial_state: None,
            states: Vec::new(),
            error_handlers: Vec::new(),
            jobs: Vec::new(),
            store: None,
            permissions: PermissionRegistry::default_registry(),
            route_registration: RouteRegistration::default(),
            identifier_len: None,
            observer: Arc::new(LogObserver),
        }
    }

    /// Settings to use instead of the environment.
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Screen answering `/start`.
    #[must_use]
    pub fn entry_point(mut self, screen: Arc<dyn Screen>) -> Self {
        self.entry_point = Some(screen);
        self
    }

    /// State entered by the builtin start handler; defaults to the first declared state.
    #[must_use]
    pub fn initial_state(mut self, state: State) -> Self {
        self.initial_state = Some(state);
        self
    }

    #[must_use]
    pub fn state(mut self, state: State, screens: Vec<Arc<dyn Screen>>) -> Self {
        self.states.push((state, screens));
        self
    }

    #[must_use]
    pub fn error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handlers.push(handler);
        self
    }

    #[must_use]
    pub fn job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    /// Conversation store; in-memory when not set.
    #[must_use]
    pub fn persistence(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Registry the PERMISSIONS setting is resolved against.
    #[must_use]
    pub fn permissions(mut self, registry: PermissionRegistry) -> Self {
        self.permissions = registry;
        self
    }

    #[must_use]
    pub fn route_registration(mut self, mode: RouteRegistration) -> Self {
        self.route_registration = mode;
        self
    }

    #[must_use]
    pub fn identifier_len(mut self, len: usize) -> Self {
        self.identifier_len = Some(len);
        self
    }

    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn RegistrationObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Builds the state table alone, without a bot token.
    ///
    /// Meant for offline tooling such as route listings. Registration errors
    /// and collisions are reported exactly as by [`ApplicationBuilder::build`].
    pub fn build_table(self) -> AppResult<StateTable> {
        let settings = self.resolve_settings()?;
        self.assemble_table(&settings).map(|(_, table)| table)
    }

    /// Validates the configuration and builds the state table.
    ///
    /// Settings come from the environment unless set explicitly.
    pub fn build(self) -> AppResult<Application> {
        let settings = self.resolve_settings()?;
        if !settings.has_token() {
            return Err(AppError::TokenIsNotSpecified);
        }

        let entry_point = self
            .entry_point
            .clone()
            .ok_or_else(|| AppError::Config("entry point screen is not set".to_string()))?;

        if let Some(job) = self.jobs.iter().find(|job| job.interval().is_zero()) {
            return Err(AppError::Config(format!("job '{}' has a zero interval", job.name())));
        }

        let (policies, table) = self.assemble_table(&settings)?;

        let initial_state = self
            .initial_state
            .or_else(|| self.states.first().map(|(state, _)| *state))
            .ok_or_else(|| AppError::Config("no initial state and no declared states".to_string()))?;

        let start = apply_permission_to(start_handler(&entry_point, initial_state), &policies);
        let metrics = RoutingMetrics::new(&self.name)?;

        log::info!(
            "Application '{}' built: entry point {}, initial state {}, {} polic(ies), {} job(s)",
            self.name,
            entry_point.id(),
            initial_state,
            policies.len(),
            self.jobs.len()
        );

        Ok(Application {
            name: self.name,
            settings,
            entry_point,
            initial_state,
            start,
            start_pattern: command_pattern(START)?,
            table,
            error_handlers: self.error_handlers,
            jobs: self.jobs,
            store: self.store.unwrap_or_else(|| Arc::new(InMemoryStore::new())),
            metrics,
        })
    }

    fn resolve_settings(&self) -> AppResult<Settings> {
        match &self.settings {
            Some(settings) => Ok(settings.clone()),
            None => Settings::from_env(),
        }
    }

    /// Resolves the permission chain and registers every declared state.
    fn assemble_table(&self, settings: &Settings) -> AppResult<(Vec<Arc<dyn Permission>>, StateTable)> {
        let policies = self.permissions.resolve(&settings.permissions, settings)?;

        let mut table = StateTableBuilder::new(policies.clone())
            .route_registration(self.route_registration)
            .observer(Arc::clone(&self.observer));
        if let Some(len) = self.identifier_len {
            table = table.identifier_len(len);
        }
        for (state, screens) in &self.states {
            table.register(*state, screens)?;
        }
        Ok((policies, table.build()?))
    }
}

/// A fully assembled conversation application
pub struct Application {
    name: String,
    settings: Settings,
    entry_point: Arc<dyn Screen>,
    initial_state: State,
    start: Handler,
    start_pattern: Regex,
    table: StateTable,
    error_handlers: Vec<Arc<dyn ErrorHandler>>,
    jobs: Vec<Job>,
    store: Arc<dyn ConversationStore>,
    metrics: RoutingMetrics,
}

impl Application {
    pub fn builder(name: impl Into<String>) -> ApplicationBuilder {
        ApplicationBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn entry_point(&self) -> &Arc<dyn Screen> {
        &self.entry_point
    }

    pub fn initial_state(&self) -> State {
        self.initial_state
    }

    pub fn table(&self) -> &StateTable {
        &self.table
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn metrics(&self) -> &RoutingMetrics {
        &self.metrics
    }

    pub fn metrics_text(&self) -> AppResult<String> {
        self.metrics.render()
    }

    /// Routes one inbound action.
    ///
    /// `/start` always reaches the start handler, whatever the stored state.
    /// Anything else is matched against the session's current state; a
    /// session without state matches nothing. Only store failures are errors.
    pub async fn dispatch(
        &self,
        session: SessionKey,
        user_id: Option<i64>,
        action: InboundAction,
    ) -> AppResult<Dispatch> {
        let state = self.store.get(session).await?;

        let (handler, handler_type, args) = match self.match_start(&action) {
            Some(args) => (self.start.clone(), START.to_string(), args),
            None => {
                let resolved = state.and_then(|s| self.table.resolve(s, &action));
                let Some(resolved) = resolved else {
                    self.metrics.misses.inc();
                    log::debug!("No handler for {:?} in state {:?} (session {})", action, state, session);
                    return Ok(Dispatch::NoMatch);
                };
                (
                    resolved.entry.handler().clone(),
                    resolved.entry.handler_type().to_string(),
                    resolved.args,
                )
            }
        };

        let mut ctx = Context::new(session, action);
        ctx.user_id = user_id;
        ctx.state = state;
        ctx.args = args;

        match handler.call(ctx.clone()).await {
            Ok(outcome) => {
                self.metrics.dispatched.with_label_values(&[handler_type.as_str()]).inc();
                if let Some(policy) = &outcome.denied_by {
                    self.metrics.denied.with_label_values(&[policy.as_str()]).inc();
                }
                match outcome.transition {
                    Transition::Stay => {}
                    Transition::To(next) => {
                        if !self.table.contains(next) {
                            log::warn!("{} moved session {} to unregistered state {}", handler.id(), session, next);
                        }
                        self.store.set(session, next).await?;
                    }
                    Transition::End => self.store.remove(session).await?,
                }
                Ok(Dispatch::Handled(outcome))
            }
            Err(error) => {
                self.metrics.failures.inc();
                if self.error_handlers.is_empty() {
                    LogErrorHandler.on_error(&ctx, handler.id(), &error).await;
                }
                for error_handler in &self.error_handlers {
                    error_handler.on_error(&ctx, handler.id(), &error).await;
                }
                Ok(Dispatch::Failed)
            }
        }
    }

    fn match_start(&self, action: &InboundAction) -> Option<Option<String>> {
        let text = action.message()?.text.as_deref()?;
        let caps = self.start_pattern.captures(text)?;
        Some(caps.get(1).map(|m| m.as_str().to_string()))
    }

    /// Bot client for the configured token.
    pub fn bot(&self) -> Bot {
        Bot::new(self.settings.token.expose_secret())
    }

    /// Runs until interrupted, by polling or behind a webhook.
    pub async fn run(self) -> AppResult<()> {
        let bot = self.bot();
        runtime::run(Arc::new(self), bot).await
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.name)
            .field("entry_point", &self.entry_point.id())
            .field("initial_state", &self.initial_state)
            .field("states", &self.table.states().count())
            .field("jobs", &self.jobs)
            .finish()
    }
}
