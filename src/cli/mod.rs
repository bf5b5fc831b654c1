//! CLI command definitions for taskhub.
//!
//! The main entry point is the `Cli` struct which contains subcommands.

use clap::{Args, Parser, Subcommand};

/// Collaborative task server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Listen host (overrides config)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Listen port (overrides config)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP and WebSocket server (default if no subcommand given)
    Serve,

    /// Print a session token for an existing user
    Token(TokenArgs),
}

#[derive(Args, Debug)]
pub struct TokenArgs {
    /// User id (identity provider subject)
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serve_with_stderr_logging() {
        let cli = Cli::parse_from(["taskhub"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.log, "2");
        assert!(!cli.verbose);
    }

    #[test]
    fn parses_token_command_with_global_flags() {
        let cli = Cli::parse_from(["taskhub", "token", "g-123", "--database", "x.db", "-p", "8080"]);
        match cli.command {
            Some(Command::Token(args)) => assert_eq!(args.user_id, "g-123"),
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.database.as_deref(), Some("x.db"));
        assert_eq!(cli.port, Some(8080));
    }
}
