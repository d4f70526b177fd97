use clap::{Parser, Subcommand};
use docs_rag::commands::{ask, chat, show_status};
use docs_rag::config::{run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "docs-rag")]
#[command(about = "Answer questions about a local document folder with retrieval-augmented generation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding server, generator and corpus
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Initialize every component and report what is available
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask a single question
    Ask {
        /// The question to answer
        message: String,
        /// Number of document chunks to retrieve
        #[arg(short, long, allow_negative_numbers = true)]
        k: Option<i64>,
        /// Print the exchange as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start an interactive question session
    Chat {
        /// Number of document chunks to retrieve per question
        #[arg(short, long, allow_negative_numbers = true)]
        k: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Status { json } => {
            show_status(json).await?;
        }
        Commands::Ask { message, k, json } => {
            ask(&message, k, json).await?;
        }
        Commands::Chat { k } => {
            chat(k).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn status_command() {
        let cli = Cli::try_parse_from(["docs-rag", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Status { json: false }));
        }
    }

    #[test]
    fn ask_command_with_k() {
        let cli = Cli::try_parse_from(["docs-rag", "ask", "What is X?", "-k", "3"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask { message, k, json } = parsed.command {
                assert_eq!(message, "What is X?");
                assert_eq!(k, Some(3));
                assert!(!json);
            }
        }
    }

    #[test]
    fn ask_command_passes_negative_k_through() {
        let cli = Cli::try_parse_from(["docs-rag", "ask", "hello", "--k", "-2"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask { k, .. } = parsed.command {
                assert_eq!(k, Some(-2));
            }
        }
    }

    #[test]
    fn ask_requires_message() {
        let cli = Cli::try_parse_from(["docs-rag", "ask"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn chat_command() {
        let cli = Cli::try_parse_from(["docs-rag", "chat"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Chat { k: None }));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["docs-rag", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["docs-rag", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["docs-rag", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
