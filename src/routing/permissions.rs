//! Permission policies wrapped around handlers at registration time
//!
//! Policies are applied in configuration order and each one wraps the result
//! of the previous, so the last configured policy is the outermost layer and
//! runs first when a handler is invoked.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::handler::{Context, Handler, HandlerResult, Outcome, Render};
use crate::core::config::Settings;
use crate::core::error::{AppError, AppResult};

/// Stable policy identity, the value handlers list to opt out of a policy
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PolicyId(Cow<'static, str>);

impl PolicyId {
    pub const fn from_static(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(Cow::Owned(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Access-control policy
#[async_trait]
pub trait Permission: Send + Sync + 'static {
    /// Identity handlers use in their opt-out set.
    fn class_uuid(&self) -> PolicyId;

    async fn has_permission(&self, ctx: &Context) -> bool;

    /// Answer given instead of running the handler.
    async fn handle_permission_denied(&self, _ctx: Context) -> HandlerResult {
        Ok(Outcome::stay())
    }
}

/// Wraps `handler` so that `policy` is consulted before every call.
pub fn check_permission(policy: Arc<dyn Permission>, handler: Handler) -> Handler {
    let inner = handler.clone();
    handler.rewrap(move |ctx: Context| {
        let policy = Arc::clone(&policy);
        let inner = inner.clone();
        async move {
            if policy.has_permission(&ctx).await {
                return inner.call(ctx).await;
            }
            let policy_id = policy.class_uuid();
            log::info!(
                "Permission {} denied {} for session {}",
                policy_id,
                inner.id(),
                ctx.session
            );
            let outcome = policy.handle_permission_denied(ctx).await?;
            Ok(outcome.denied_by(policy_id))
        }
    })
}

/// Folds the policy chain over `handler`, skipping policies it opted out of.
pub fn apply_permission_to(handler: Handler, policies: &[Arc<dyn Permission>]) -> Handler {
    policies.iter().fold(handler, |current, policy| {
        if current.ignores(&policy.class_uuid()) {
            current
        } else {
            check_permission(Arc::clone(policy), current)
        }
    })
}

type PermissionConstructor = Arc<dyn Fn(&Settings) -> Arc<dyn Permission> + Send + Sync>;

/// Name → constructor table the PERMISSIONS setting is resolved against
#[derive(Clone, Default)]
pub struct PermissionRegistry {
    constructors: Vec<(String, PermissionConstructor)>,
}

impl PermissionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in policies.
    pub fn default_registry() -> Self {
        let mut registry = Self::new();
        registry.register(MaintenanceMode::NAME, |settings: &Settings| {
            Arc::new(MaintenanceMode::from_settings(settings)) as Arc<dyn Permission>
        });
        registry
    }

    /// Adds or replaces a policy constructor.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&Settings) -> Arc<dyn Permission> + Send + Sync + 'static,
    {
        let name = name.into();
        let constructor: PermissionConstructor = Arc::new(constructor);
        match self.constructors.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = constructor,
            None => self.constructors.push((name, constructor)),
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.iter().map(|(n, _)| n.as_str())
    }

    /// Instantiates the named policies in the given order.
    pub fn resolve(&self, names: &[String], settings: &Settings) -> AppResult<Vec<Arc<dyn Permission>>> {
        names
            .iter()
            .map(|name| {
                self.constructors
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, constructor)| constructor(settings))
                    .ok_or_else(|| AppError::UnknownPermission(name.clone()))
            })
            .collect()
    }
}

/// Lets only admins through while maintenance mode is on
#[derive(Clone, Debug)]
pub struct MaintenanceMode {
    enabled: bool,
    admin_ids: Vec<i64>,
    notice: String,
}

impl MaintenanceMode {
    pub const NAME: &'static str = "maintenance";
    pub const CLASS_UUID: PolicyId = PolicyId::from_static("5f0c6a8e-2b7d-4c1e-9a43-1d8e7b6f2c90");

    pub fn new(enabled: bool, admin_ids: Vec<i64>) -> Self {
        Self {
            enabled,
            admin_ids,
            notice: "The bot is under maintenance, please come back later.".to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.maintenance_mode, settings.admin_ids.clone())
    }

    #[must_use]
    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = notice.into();
        self
    }
}

#[async_trait]
impl Permission for MaintenanceMode {
    fn class_uuid(&self) -> PolicyId {
        Self::CLASS_UUID
    }

    async fn has_permission(&self, ctx: &Context) -> bool {
        !self.enabled || ctx.user_id.is_some_and(|id| self.admin_ids.contains(&id))
    }

    async fn handle_permission_denied(&self, _ctx: Context) -> HandlerResult {
        Ok(Outcome::stay().render(Render::send(self.notice.clone())))
    }
}
