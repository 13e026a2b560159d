//! Handler registration and routing
//!
//! Screens declare members, members become handler entries, entries are
//! collected per conversation state into a [`StateTable`].

pub mod checksum;
pub mod entry;
pub mod filters;
pub mod handler;
pub mod keyboard;
pub mod permissions;
pub mod screen;
pub mod state;

pub use checksum::{checksum, decode_payload, encode_payload, Identifier};
pub use entry::{build_entry, HandlerEntry, Match, MatchRule};
pub use filters::{typing, InboundAction, InboundMessage, MessageFilter, MessageKind};
pub use handler::{
    Context, Handler, HandlerError, HandlerId, HandlerResult, Outcome, Render, RenderMode, SessionKey, Transition,
};
pub use keyboard::{Button, ButtonSource, Keyboard, SourceType};
pub use permissions::{apply_permission_to, check_permission, MaintenanceMode, Permission, PermissionRegistry, PolicyId};
pub use screen::{classify, HandlerTag, HandlerType, LogObserver, Member, RegistrationObserver, Route, Screen};
pub use state::{Resolved, RouteRegistration, State, StateTable, StateTableBuilder};
