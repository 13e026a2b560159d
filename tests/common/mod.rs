//! Common test utilities
//!
//! Screens, policies and observers shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use screenflow::routing::{
    Button, Context, Handler, HandlerResult, Keyboard, Member, MessageFilter, MessageKind, Outcome, Permission,
    PolicyId, RegistrationObserver, Render, Route, Screen, State,
};

pub const HOME: State = State(1);
pub const SETTINGS: State = State(2);
pub const PROFILE: State = State(3);
pub const WIZARD: State = State(4);

pub async fn go(_ctx: Context) -> HandlerResult {
    Ok(Outcome::to(SETTINGS))
}

pub async fn stay(_ctx: Context) -> HandlerResult {
    Ok(Outcome::stay())
}

pub async fn fail(_ctx: Context) -> HandlerResult {
    Err("handler exploded".into())
}

pub async fn finish(_ctx: Context) -> HandlerResult {
    Ok(Outcome::end().render(Render::send("Bye")))
}

/// One button member `go`, nothing else declared
pub struct SingleButton;

impl Screen for SingleButton {
    fn id(&self) -> &'static str {
        "common::SingleButton"
    }

    fn members(&self) -> Vec<Member> {
        vec![Member::button("go", Handler::named("common::go", go))]
    }
}

/// `/help` command
pub struct HelpScreen;

impl Screen for HelpScreen {
    fn id(&self) -> &'static str {
        "common::HelpScreen"
    }

    fn members(&self) -> Vec<Member> {
        vec![Member::command("help", "help", Handler::named("common::help", stay))]
    }
}

/// Member tagged with a handler type that does not exist
pub struct BadTag;

impl Screen for BadTag {
    fn id(&self) -> &'static str {
        "common::BadTag"
    }

    fn routes(&self) -> Vec<Route> {
        vec![Route::new([WIZARD], WIZARD)]
    }

    fn members(&self) -> Vec<Member> {
        vec![
            Member::button("ok", Handler::named("common::ok", stay)),
            Member::tagged("swipe", "swipe_left", Handler::named("common::swipe", stay)),
        ]
    }
}

/// Declares `sgoto`/`sjump` routes from SETTINGS and PROFILE to WIZARD
pub struct Router;

impl Screen for Router {
    fn id(&self) -> &'static str {
        "common::Router"
    }

    fn description(&self) -> String {
        "Wizard".to_string()
    }

    fn routes(&self) -> Vec<Route> {
        vec![Route::new([SETTINGS, PROFILE], WIZARD)]
    }
}

/// Home screen: text, a keyboard and one member of every kind
pub struct Home;

impl Screen for Home {
    fn id(&self) -> &'static str {
        "common::Home"
    }

    fn description(&self) -> String {
        "Home".to_string()
    }

    fn keyboard(&self) -> Keyboard {
        Keyboard::new()
            .row(vec![Button::handler("Go", Handler::named("common::go", go))])
            .row(vec![
                Button::handler("Fail", Handler::named("common::fail", fail)),
                Button::handler("Finish", Handler::named("common::finish", finish)),
            ])
    }

    fn members(&self) -> Vec<Member> {
        vec![
            Member::command(
                "help",
                "help",
                Handler::named("common::public_help", |_ctx: Context| async {
                    Ok(Outcome::stay().render(Render::send("Help")))
                })
                .ignore_permission(screenflow::routing::MaintenanceMode::CLASS_UUID),
            ),
            Member::input(
                "photo",
                MessageFilter::kind(MessageKind::Photo),
                Handler::named("common::photo", stay),
            ),
            Member::helper("format_title", Handler::named("common::format_title", stay)),
        ]
    }
}

/// Two members: one under every policy, one opted out of `skip_id`
pub struct Guarded {
    pub skip_id: &'static str,
}

impl Screen for Guarded {
    fn id(&self) -> &'static str {
        "common::Guarded"
    }

    fn members(&self) -> Vec<Member> {
        vec![
            Member::button("open", Handler::named("common::open", go)),
            Member::button(
                "public",
                Handler::named("common::public", go).ignore_permission(PolicyId::from_static(self.skip_id)),
            ),
        ]
    }
}

/// Policy counting its checks
pub struct CountingPolicy {
    pub id: &'static str,
    pub allow: bool,
    pub checks: Arc<AtomicUsize>,
}

impl CountingPolicy {
    pub fn new(id: &'static str, allow: bool) -> (Arc<dyn Permission>, Arc<AtomicUsize>) {
        let checks = Arc::new(AtomicUsize::new(0));
        let policy = Arc::new(Self {
            id,
            allow,
            checks: Arc::clone(&checks),
        });
        (policy, checks)
    }
}

#[async_trait]
impl Permission for CountingPolicy {
    fn class_uuid(&self) -> PolicyId {
        PolicyId::from_static(self.id)
    }

    async fn has_permission(&self, _ctx: &Context) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.allow
    }
}

/// Observer collecting `screen::member` names of skipped members
#[derive(Default)]
pub struct RecordingObserver {
    pub skipped: Mutex<Vec<String>>,
}

impl RegistrationObserver for RecordingObserver {
    fn unregistered_handler(&self, screen: &str, member: &str) {
        self.skipped.lock().unwrap().push(format!("{screen}::{member}"));
    }
}
