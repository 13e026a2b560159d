use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "screenflow")]
#[command(author, version, about = "Demo bot built on the screenflow conversation framework", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot
    Run {
        /// Use webhook mode instead of long polling
        #[arg(long)]
        webhook: bool,
    },

    /// Print the registered states and their handlers, then exit
    Routes,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
