//! Integration tests for the application shell: build validation, dispatch,
//! permissions, error handlers and persistence
//!
//! Run with: cargo test --test application_test

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serial_test::serial;

use common::*;
use screenflow::routing::{
    Button, Context, HandlerError, HandlerId, InboundAction, MaintenanceMode, RenderMode, Screen, Transition,
};
use screenflow::telegram::{
    Application, ApplicationBuilder, ConversationStore, Dispatch, ErrorHandler, Job, JobContext, JsonFileStore,
};
use screenflow::{AppError, Settings};

fn builder(settings: Settings) -> ApplicationBuilder {
    Application::builder("test-app")
        .settings(settings)
        .entry_point(Arc::new(Home))
        .state(HOME, vec![Arc::new(Home) as Arc<dyn Screen>])
        .state(SETTINGS, vec![Arc::new(SingleButton) as Arc<dyn Screen>])
}

fn app() -> Application {
    builder(Settings::with_token("123:test")).build().unwrap()
}

fn press(button: Button) -> InboundAction {
    InboundAction::callback(button.callback_data().unwrap().unwrap())
}

async fn noop_job(_ctx: JobContext) -> Result<(), HandlerError> {
    Ok(())
}

/// Error handler remembering which handlers failed
#[derive(Default)]
struct RecordingErrors {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl ErrorHandler for RecordingErrors {
    async fn on_error(&self, ctx: &Context, handler: &HandlerId, error: &HandlerError) {
        self.seen
            .lock()
            .unwrap()
            .push(format!("{}:{}:{}", ctx.session, handler, error));
    }
}

// ============================================================================
// Build validation
// ============================================================================

mod build {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_token_is_rejected() {
        let err = builder(Settings::default()).build().unwrap_err();
        assert!(matches!(err, AppError::TokenIsNotSpecified));
    }

    #[test]
    fn test_unknown_permission_is_rejected() {
        let mut settings = Settings::with_token("123:test");
        settings.permissions = vec!["maintenance".to_string(), "vip_only".to_string()];
        let err = builder(settings).build().unwrap_err();
        assert!(matches!(err, AppError::UnknownPermission(ref name) if name == "vip_only"));
    }

    #[test]
    fn test_missing_entry_point_is_rejected() {
        let err = Application::builder("test-app")
            .settings(Settings::with_token("123:test"))
            .state(HOME, vec![Arc::new(Home) as Arc<dyn Screen>])
            .build()
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_zero_interval_job_is_rejected() {
        let err = builder(Settings::with_token("123:test"))
            .job(Job::new("tick", Duration::ZERO, Duration::ZERO, noop_job))
            .build()
            .unwrap_err();
        assert!(matches!(err, AppError::Config(ref msg) if msg.contains("tick")));
    }

    #[test]
    fn test_registration_errors_surface_from_build() {
        let err = builder(Settings::with_token("123:test"))
            .state(WIZARD, vec![Arc::new(BadTag) as Arc<dyn Screen>])
            .build()
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownHandlerType { .. }));
    }

    #[test]
    fn test_table_builds_without_a_token() {
        let table = builder(Settings::default()).build_table().unwrap();
        assert_eq!(table.states().collect::<Vec<_>>(), vec![HOME, SETTINGS]);
        assert!(table.summary().contains("common::go"));

        let err = builder(Settings::default())
            .state(WIZARD, vec![Arc::new(BadTag) as Arc<dyn Screen>])
            .build_table()
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownHandlerType { .. }));
    }

    #[test]
    fn test_initial_state_defaults_to_first_declared_state() {
        let app = app();
        assert_eq!(app.initial_state(), HOME);
        assert_eq!(app.entry_point().id(), "common::Home");
        assert!(app.jobs().is_empty());
    }

    #[test]
    #[serial]
    fn test_settings_come_from_environment_when_not_given() {
        std::env::set_var("BOT_TOKEN", "456:from-env");
        std::env::set_var("ADMIN_IDS", "7, 8");
        let result = Application::builder("env-app")
            .entry_point(Arc::new(Home))
            .state(HOME, vec![Arc::new(Home) as Arc<dyn Screen>])
            .build();
        std::env::remove_var("BOT_TOKEN");
        std::env::remove_var("ADMIN_IDS");

        let app = result.unwrap();
        assert!(app.settings().has_token());
        assert!(app.settings().is_admin(8));
    }
}

// ============================================================================
// Dispatch
// ============================================================================

mod dispatch {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_start_enters_initial_state() {
        let app = app();
        let dispatch = app.dispatch(10, Some(10), InboundAction::text("/start")).await.unwrap();

        let Dispatch::Handled(outcome) = dispatch else {
            panic!("start was not handled: {dispatch:?}");
        };
        assert_eq!(outcome.transition, Transition::To(HOME));
        assert_eq!(outcome.renders[0].text, "Home");
        assert_eq!(outcome.renders[0].mode, RenderMode::Send);
        assert_eq!(app.store().get(10).await.unwrap(), Some(HOME));
    }

    #[tokio::test]
    async fn test_start_works_from_any_state() {
        let app = app();
        app.store().set(11, SETTINGS).await.unwrap();
        app.dispatch(11, None, InboundAction::text("/start")).await.unwrap();
        assert_eq!(app.store().get(11).await.unwrap(), Some(HOME));
    }

    #[tokio::test]
    async fn test_button_press_moves_state() {
        let app = app();
        app.dispatch(12, None, InboundAction::text("/start")).await.unwrap();

        let go = Button::handler("Go", screenflow::Handler::named("common::go", go));
        let dispatch = app.dispatch(12, None, press(go)).await.unwrap();
        assert!(matches!(dispatch, Dispatch::Handled(_)));
        assert_eq!(app.store().get(12).await.unwrap(), Some(SETTINGS));
    }

    #[tokio::test]
    async fn test_goto_edits_the_message() {
        let app = app();
        app.store().set(13, SETTINGS).await.unwrap();

        let dispatch = app
            .dispatch(13, None, press(Button::goto("Home", Arc::new(Home))))
            .await
            .unwrap();
        // `goto` of Home is registered in HOME only.
        assert!(matches!(dispatch, Dispatch::NoMatch));

        app.store().set(13, HOME).await.unwrap();
        let Dispatch::Handled(outcome) = app
            .dispatch(13, None, press(Button::goto("Home", Arc::new(Home))))
            .await
            .unwrap()
        else {
            panic!("goto was not handled");
        };
        assert_eq!(outcome.transition, Transition::Stay);
        assert_eq!(outcome.renders[0].mode, RenderMode::Edit);
        assert!(outcome.renders[0].keyboard.is_some());
    }

    #[tokio::test]
    async fn test_miss_is_counted_not_failed() {
        let app = app();
        app.dispatch(14, None, InboundAction::text("/start")).await.unwrap();

        let dispatch = app.dispatch(14, None, InboundAction::text("hello?")).await.unwrap();
        assert!(matches!(dispatch, Dispatch::NoMatch));
        assert_eq!(app.metrics().misses.get(), 1);
        assert!(app.metrics_text().unwrap().contains("routing_miss_total"));
        assert_eq!(app.store().get(14).await.unwrap(), Some(HOME));
    }

    #[tokio::test]
    async fn test_session_without_state_matches_nothing_but_start() {
        let app = app();
        let go = Button::handler("Go", screenflow::Handler::named("common::go", go));
        let dispatch = app.dispatch(15, None, press(go)).await.unwrap();
        assert!(matches!(dispatch, Dispatch::NoMatch));
    }

    #[tokio::test]
    async fn test_handler_error_reaches_every_error_handler() {
        let first = Arc::new(RecordingErrors::default());
        let second = Arc::new(RecordingErrors::default());
        let app = builder(Settings::with_token("123:test"))
            .error_handler(first.clone())
            .error_handler(second.clone())
            .build()
            .unwrap();
        app.store().set(16, HOME).await.unwrap();

        let fail = Button::handler("Fail", screenflow::Handler::named("common::fail", fail));
        let dispatch = app.dispatch(16, None, press(fail)).await.unwrap();

        assert!(matches!(dispatch, Dispatch::Failed));
        assert_eq!(*first.seen.lock().unwrap(), vec!["16:common::fail:handler exploded"]);
        assert_eq!(*second.seen.lock().unwrap(), vec!["16:common::fail:handler exploded"]);
        assert_eq!(app.metrics().failures.get(), 1);
        assert_eq!(app.store().get(16).await.unwrap(), Some(HOME));
    }

    #[tokio::test]
    async fn test_end_clears_the_session() {
        let app = app();
        app.store().set(17, HOME).await.unwrap();

        let finish = Button::handler("Finish", screenflow::Handler::named("common::finish", finish));
        let Dispatch::Handled(outcome) = app.dispatch(17, None, press(finish)).await.unwrap() else {
            panic!("finish was not handled");
        };
        assert_eq!(outcome.renders[0].text, "Bye");
        assert_eq!(app.store().get(17).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_command_arguments_reach_the_handler() {
        let app = app();
        app.store().set(18, HOME).await.unwrap();
        let Dispatch::Handled(outcome) = app
            .dispatch(18, None, InboundAction::text("/help me please"))
            .await
            .unwrap()
        else {
            panic!("help was not handled");
        };
        assert_eq!(outcome.renders[0].text, "Help");
        assert!(app
            .metrics_text()
            .unwrap()
            .contains("handler_type=\"command\""));
    }
}

// ============================================================================
// Maintenance mode
// ============================================================================

mod maintenance {
    use super::*;
    use pretty_assertions::assert_eq;

    fn maintenance_app() -> Application {
        let mut settings = Settings::with_token("123:test");
        settings.permissions = vec![MaintenanceMode::NAME.to_string()];
        settings.maintenance_mode = true;
        settings.admin_ids = vec![42];
        builder(settings).build().unwrap()
    }

    #[tokio::test]
    async fn test_non_admin_gets_the_notice() {
        let app = maintenance_app();
        let Dispatch::Handled(outcome) = app.dispatch(1, Some(1), InboundAction::text("/start")).await.unwrap() else {
            panic!("start was not handled");
        };
        assert_eq!(outcome.denied_by, Some(MaintenanceMode::CLASS_UUID));
        assert_eq!(outcome.transition, Transition::Stay);
        assert!(outcome.renders[0].text.contains("maintenance"));
        assert_eq!(app.store().get(1).await.unwrap(), None);
        assert!(app.metrics_text().unwrap().contains("permission_denied_total"));
    }

    #[tokio::test]
    async fn test_admin_passes() {
        let app = maintenance_app();
        let Dispatch::Handled(outcome) = app.dispatch(42, Some(42), InboundAction::text("/start")).await.unwrap()
        else {
            panic!("start was not handled");
        };
        assert_eq!(outcome.denied_by, None);
        assert_eq!(app.store().get(42).await.unwrap(), Some(HOME));
    }

    #[tokio::test]
    async fn test_opted_out_handler_runs_for_everyone() {
        let app = maintenance_app();
        app.store().set(2, HOME).await.unwrap();

        let Dispatch::Handled(outcome) = app.dispatch(2, Some(2), InboundAction::text("/help")).await.unwrap() else {
            panic!("help was not handled");
        };
        assert_eq!(outcome.denied_by, None);
        assert_eq!(outcome.renders[0].text, "Help");

        let go = Button::handler("Go", screenflow::Handler::named("common::go", go));
        let Dispatch::Handled(outcome) = app.dispatch(2, Some(2), press(go)).await.unwrap() else {
            panic!("go was not handled");
        };
        assert_eq!(outcome.denied_by, Some(MaintenanceMode::CLASS_UUID));
        assert_eq!(app.store().get(2).await.unwrap(), Some(HOME));
    }
}

// ============================================================================
// Persistence
// ============================================================================

mod persistence {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_state_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversations.json");

        {
            let store = Arc::new(JsonFileStore::open(&path).await.unwrap());
            let app = builder(Settings::with_token("123:test"))
                .persistence(store)
                .build()
                .unwrap();
            app.dispatch(99, None, InboundAction::text("/start")).await.unwrap();
            let go = Button::handler("Go", screenflow::Handler::named("common::go", go));
            app.dispatch(99, None, press(go)).await.unwrap();
        }

        let store = Arc::new(JsonFileStore::open(&path).await.unwrap());
        let app = builder(Settings::with_token("123:test"))
            .persistence(store)
            .build()
            .unwrap();
        assert_eq!(app.store().get(99).await.unwrap(), Some(SETTINGS));

        // SETTINGS holds SingleButton, so its `go` member answers now.
        let go = Button::handler("Go", screenflow::Handler::named("common::go", go));
        assert!(matches!(
            app.dispatch(99, None, press(go)).await.unwrap(),
            Dispatch::Handled(_)
        ));
    }
}
