//! Screenflow - screen/button conversation framework for Telegram bots
//!
//! A bot is described as a set of screens. Each screen shows some text and a
//! keyboard, and exposes handlers for button presses, commands and free
//! input. At startup the screens are registered per conversation state into
//! an immutable state table; at runtime every inbound action is matched
//! against the table for the chat's current state.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging and metrics
//! - `routing`: identifiers, screens, permissions and the state table
//! - `telegram`: the application shell and its teloxide runtime

pub mod cli;
pub mod core;
pub mod routing;
pub mod telegram;

pub use self::core::{config, AppError, AppResult, Settings};
pub use routing::{Button, Context, Handler, Keyboard, Member, Outcome, Render, Route, Screen, State};
pub use telegram::{Application, ApplicationBuilder};
