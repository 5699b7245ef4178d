//! flowgen CLI: turn a natural-language request into a workflow file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use flowgen_cli::commands;
use flowgen_cli::commands::generate::RunOptions;
use flowgen_cli::commands::resume::DecisionArgs;

/// flowgen: workflow generation agent
#[derive(Parser)]
#[command(name = "flowgen", version, about = "flowgen: workflow generation agent")]
pub struct Cli {
    /// Config file (YAML). Defaults to ./flowgen.yaml, then the user config dir.
    #[arg(long, env = "FLOWGEN_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a workflow from a request
    Generate {
        /// What the workflow should do
        request: String,
        /// Write the artifact to this path
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Where to save a permission stop
        #[arg(long)]
        resume_file: Option<PathBuf>,
        /// Print session/update notifications as JSON lines
        #[arg(long)]
        events: bool,
    },

    /// Answer a pending permission request and continue
    Resume {
        /// Approve the pending request
        #[arg(long)]
        approve: bool,
        /// Reject the pending request
        #[arg(long)]
        reject: bool,
        /// Field value for an approval, as name=value (repeatable)
        #[arg(long = "field")]
        fields: Vec<String>,
        /// Extra note passed along with the decision
        #[arg(long)]
        note: Option<String>,
        /// Saved session to continue
        #[arg(long)]
        resume_file: Option<PathBuf>,
        /// Write the artifact to this path
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Print session/update notifications as JSON lines
        #[arg(long)]
        events: bool,
    },

    /// Call one capability on the bridge
    Invoke {
        /// Capability name (e.g. "list_capabilities")
        name: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// List the capability registry
    Capabilities,

    /// Parse a flow dialect file and print it as JSON
    Inspect {
        file: PathBuf,
    },

    /// Show which integrations have stored credentials
    AuthStatus {
        /// Persisted auth state file
        #[arg(long, default_value = commands::dialect::DEFAULT_AUTH_FILE)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowgen_core=warn,flowgen_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    commands::load_dotenv();

    let result = match cli.command {
        Some(command) => run(command, cli.config).await,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, config_path: Option<PathBuf>) -> Result<(), String> {
    match command {
        Commands::Generate {
            request,
            output,
            resume_file,
            events,
        } => {
            let config = commands::load_config(config_path.as_deref())?;
            let options = RunOptions {
                output,
                resume_file: commands::resume_file(resume_file),
                events,
            };
            commands::generate::run(&config, &request, &options).await
        }

        Commands::Resume {
            approve,
            reject,
            fields,
            note,
            resume_file,
            output,
            events,
        } => {
            let config = commands::load_config(config_path.as_deref())?;
            let args = DecisionArgs {
                approve,
                reject,
                fields,
                note,
            };
            let options = RunOptions {
                output,
                resume_file: commands::resume_file(resume_file),
                events,
            };
            commands::resume::run(&config, &args, &options).await
        }

        Commands::Invoke { name, args } => {
            let config = commands::load_config(config_path.as_deref())?;
            commands::bridge::invoke(&config, &name, &args).await
        }

        Commands::Capabilities => {
            let config = commands::load_config(config_path.as_deref())?;
            commands::bridge::capabilities(&config)
        }

        Commands::Inspect { file } => commands::dialect::inspect(&file),

        Commands::AuthStatus { file } => commands::dialect::auth_status(&file),
    }
}
