//! Small bot showing every kind of member: a menu with an about page, a
//! ping button, a `/help` command and a feedback form reached through a route.

use std::sync::Arc;
use std::time::Duration;

use screenflow::routing::screen::render_screen;
use screenflow::routing::{HandlerError, HandlerResult, MaintenanceMode, RenderMode};
use screenflow::telegram::{ApplicationBuilder, Job, JobContext};
use screenflow::{Button, Context, Handler, Keyboard, Member, Outcome, Render, Route, Screen, State};
use url::Url;

pub const MENU: State = State(1);
pub const FEEDBACK: State = State(2);

const DOCS_URL: &str = "https://core.telegram.org/bots/features#inline-keyboards";

pub struct MainMenu;

impl Screen for MainMenu {
    fn description(&self) -> String {
        "Welcome! Pick something below.".to_string()
    }

    fn keyboard(&self) -> Keyboard {
        let mut keyboard = Keyboard::new()
            .row(vec![
                Button::goto("About", Arc::new(About)),
                Button::handler("Ping", Handler::new(ping)),
            ])
            .row(vec![Button::route("Leave feedback", Arc::new(Feedback))]);
        if let Ok(url) = Url::parse(DOCS_URL) {
            keyboard.push_row(vec![Button::url("Docs", url)]);
        }
        keyboard
    }

    fn members(&self) -> Vec<Member> {
        vec![Member::command(
            "help",
            "help",
            Handler::new(help).ignore_permission(MaintenanceMode::CLASS_UUID),
        )]
    }
}

pub struct About;

impl Screen for About {
    fn description(&self) -> String {
        "Screenflow demo: screens, buttons and routes on top of teloxide.".to_string()
    }

    fn keyboard(&self) -> Keyboard {
        Keyboard::new().row(vec![Button::goto("Back", Arc::new(MainMenu))])
    }
}

pub struct Feedback;

impl Screen for Feedback {
    fn description(&self) -> String {
        "Type your feedback in one message.".to_string()
    }

    fn keyboard(&self) -> Keyboard {
        Keyboard::new().row(vec![Button::handler("Cancel", Handler::new(back_to_menu))])
    }

    fn routes(&self) -> Vec<Route> {
        vec![Route::new([MENU], FEEDBACK)]
    }

    fn members(&self) -> Vec<Member> {
        vec![Member::typing("collect", Handler::new(collect_feedback))]
    }
}

async fn ping(ctx: Context) -> HandlerResult {
    let args = ctx.args.unwrap_or_default();
    let text = if args.is_empty() {
        "pong".to_string()
    } else {
        format!("pong ({args})")
    };
    Ok(Outcome::stay().render(Render::send(text)))
}

async fn help(_ctx: Context) -> HandlerResult {
    Ok(Outcome::stay().render(Render::send(
        "/start shows the menu. Buttons do the rest; in the feedback form just type.",
    )))
}

async fn collect_feedback(ctx: Context) -> HandlerResult {
    let feedback = ctx.text().unwrap_or_default().trim().to_string();
    log::info!("Feedback from session {}: {}", ctx.session, feedback);
    Ok(Outcome::to(MENU)
        .render(Render::send("Thanks, noted!"))
        .render(render_screen(&MainMenu, RenderMode::Send)))
}

async fn back_to_menu(_ctx: Context) -> HandlerResult {
    Ok(Outcome::to(MENU).render(render_screen(&MainMenu, RenderMode::Edit)))
}

async fn heartbeat(ctx: JobContext) -> Result<(), HandlerError> {
    log::debug!("Job '{}' alive", ctx.name);
    Ok(())
}

/// Demo application with everything but the settings filled in.
pub fn builder() -> ApplicationBuilder {
    ApplicationBuilder::new("screenflow-demo")
        .entry_point(Arc::new(MainMenu))
        .initial_state(MENU)
        .state(MENU, vec![Arc::new(MainMenu) as Arc<dyn Screen>, Arc::new(About)])
        .state(FEEDBACK, vec![Arc::new(Feedback) as Arc<dyn Screen>])
        .job(Job::new(
            "heartbeat",
            Duration::from_secs(60),
            Duration::from_secs(300),
            heartbeat,
        ))
}
