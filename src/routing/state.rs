//! Conversation states and the state registration engine
//!
//! [`StateTableBuilder`] runs once at startup: every declared state is
//! registered with its screens, members are classified, wrapped in the
//! permission chain and turned into [`HandlerEntry`] values. The resulting
//! [`StateTable`] is immutable and shared by all sessions.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{self, Write as _};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::checksum::{Identifier, DEFAULT_IDENTIFIER_LEN};
use super::entry::{build_entry, HandlerEntry};
use super::filters::InboundAction;
use super::handler::Handler;
use super::permissions::{apply_permission_to, Permission};
use super::screen::{classify, is_route_handler, LogObserver, RegistrationObserver, Screen};
use crate::core::error::{AppError, AppResult};

/// Point in the conversation graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(pub i32);

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for State {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

/// Where `sgoto`/`sjump` land when their screen declares routes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RouteRegistration {
    /// Only in the route states
    #[default]
    FanOutOnly,
    /// In the route states and in the declaring state
    FanOutAndDeclaring,
}

/// Accumulates registrations; see [`StateTableBuilder::register`]
pub struct StateTableBuilder {
    policies: Vec<Arc<dyn Permission>>,
    route_registration: RouteRegistration,
    identifier_len: usize,
    observer: Arc<dyn RegistrationObserver>,
    declared: BTreeSet<State>,
    table: BTreeMap<State, Vec<HandlerEntry>>,
}

impl StateTableBuilder {
    /// Builder applying `policies` (in order) to every registered handler.
    pub fn new(policies: Vec<Arc<dyn Permission>>) -> Self {
        Self {
            policies,
            route_registration: RouteRegistration::default(),
            identifier_len: DEFAULT_IDENTIFIER_LEN,
            observer: Arc::new(LogObserver),
            declared: BTreeSet::new(),
            table: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn route_registration(mut self, mode: RouteRegistration) -> Self {
        self.route_registration = mode;
        self
    }

    /// Hex characters per callback identifier. Shorter identifiers leave more
    /// room for button arguments but collide sooner.
    #[must_use]
    pub fn identifier_len(mut self, len: usize) -> Self {
        self.identifier_len = len.clamp(1, 64);
        self
    }

    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn RegistrationObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Registers `screens` under `state`.
    ///
    /// Nothing is written unless every member of every screen builds: on
    /// error the table is exactly as it was before the call. A state can be
    /// declared once.
    pub fn register(&mut self, state: State, screens: &[Arc<dyn Screen>]) -> AppResult<()> {
        if self.declared.contains(&state) {
            return Err(AppError::DuplicateState(state.0));
        }

        let mut touched = vec![state];
        let mut staged: Vec<(State, HandlerEntry)> = Vec::new();

        for screen in screens {
            let routes = screen.routes();
            for route in &routes {
                touched.extend(route.states.iter().copied());
                touched.push(route.target);
            }

            for member in classify(screen, self.observer.as_ref()) {
                let wrapped = apply_permission_to(member.handler().clone(), &self.policies);
                let entry = build_entry(screen.id(), &member, wrapped, self.identifier_len)?;

                if is_route_handler(member.name()) && !routes.is_empty() {
                    let mut targets: BTreeSet<State> =
                        routes.iter().flat_map(|r| r.states.iter().copied()).collect();
                    if self.route_registration == RouteRegistration::FanOutAndDeclaring {
                        targets.insert(state);
                    }
                    staged.extend(targets.into_iter().map(|s| (s, entry.clone())));
                } else {
                    staged.push((state, entry));
                }
            }
        }

        self.declared.insert(state);
        for s in touched {
            self.table.entry(s).or_default();
        }
        for (s, entry) in staged {
            let list = self.table.entry(s).or_default();
            // Two screens routing into the same state register the same
            // route handler only once there.
            if s != state && list.iter().any(|e| e.handler().id() == entry.handler().id()) {
                continue;
            }
            list.push(entry);
        }

        log::debug!(
            "Registered state {} with {} screen(s), {} handler(s)",
            state,
            screens.len(),
            self.table.get(&state).map_or(0, Vec::len)
        );
        Ok(())
    }

    /// Finishes the build, rejecting callback identifier collisions and
    /// distinct callables registered under one handler id.
    pub fn build(self) -> AppResult<StateTable> {
        let mut seen: HashMap<&Identifier, &Handler> = HashMap::new();
        for entry in self.table.values().flatten() {
            let Some(identifier) = entry.identifier() else {
                continue;
            };
            let handler = entry.handler();
            match seen.entry(identifier) {
                Entry::Vacant(slot) => {
                    slot.insert(handler);
                }
                Entry::Occupied(slot) if slot.get().id() != handler.id() => {
                    return Err(AppError::ChecksumCollision {
                        identifier: identifier.to_string(),
                        first: slot.get().id().to_string(),
                        second: handler.id().to_string(),
                    });
                }
                Entry::Occupied(slot) if !slot.get().same_origin(handler) => {
                    return Err(AppError::DuplicateHandlerId {
                        id: handler.id().to_string(),
                    });
                }
                Entry::Occupied(_) => {}
            }
        }

        log::info!(
            "State table ready: {} state(s), {} handler entr(ies)",
            self.table.len(),
            self.table.values().map(Vec::len).sum::<usize>()
        );
        Ok(StateTable {
            table: self.table,
            identifier_len: self.identifier_len,
        })
    }
}

/// Entry that accepted an action, with the extracted arguments
#[derive(Clone, Debug)]
pub struct Resolved<'a> {
    pub entry: &'a HandlerEntry,
    pub args: Option<String>,
}

/// Immutable state → handler list mapping
#[derive(Clone, Debug)]
pub struct StateTable {
    table: BTreeMap<State, Vec<HandlerEntry>>,
    identifier_len: usize,
}

impl StateTable {
    /// Every known state, ascending.
    pub fn states(&self) -> impl Iterator<Item = State> + '_ {
        self.table.keys().copied()
    }

    pub fn contains(&self, state: State) -> bool {
        self.table.contains_key(&state)
    }

    /// Handler list of `state`; empty for unknown states.
    pub fn entries(&self, state: State) -> &[HandlerEntry] {
        self.table.get(&state).map_or(&[], Vec::as_slice)
    }

    pub fn identifier_len(&self) -> usize {
        self.identifier_len
    }

    /// First entry of `state` accepting `action`. A miss is `None`, never an error.
    pub fn resolve(&self, state: State, action: &InboundAction) -> Option<Resolved<'_>> {
        self.entries(state).iter().find_map(|entry| {
            entry.matches(action).map(|m| Resolved { entry, args: m.args })
        })
    }

    /// Plain-text listing of every state and its handlers.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for (state, entries) in &self.table {
            let _ = writeln!(out, "state {} ({} handlers)", state, entries.len());
            for entry in entries {
                let _ = writeln!(
                    out,
                    "  {:<8} {:<32} {}",
                    entry.handler_type(),
                    entry.handler().id(),
                    entry.rule().describe()
                );
            }
        }
        out
    }
}
