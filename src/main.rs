use anyhow::Result;

use screenflow::cli::{Cli, Commands};
use screenflow::core::{init_logger, log_startup_configuration, Settings};

mod demo;

/// Main entry point for the demo bot
///
/// Parses CLI arguments and dispatches to the selected subcommand.
///
/// # Errors
/// Returns an error if the logger, the settings or the application fail to initialize.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Reads .env before anything else looks at the environment
    let mut settings = Settings::from_env()?;

    init_logger(&settings.log_file_path, settings.log_level)?;

    match cli.command {
        Some(Commands::Routes) => {
            let table = demo::builder().settings(settings).build_table()?;
            print!("{}", table.summary());
            Ok(())
        }
        Some(Commands::Run { webhook }) => {
            settings.use_webhook |= webhook;
            run(settings).await
        }
        None => run(settings).await,
    }
}

async fn run(settings: Settings) -> Result<()> {
    let app = demo::builder().settings(settings).build()?;
    log_startup_configuration(app.name(), app.settings());
    app.run().await?;
    log::info!("Bye");
    Ok(())
}
