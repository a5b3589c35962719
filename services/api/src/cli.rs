use crate::demo::{run_audit, run_demo, run_templates, AuditArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use decision_os::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "DecisionOS",
    about = "Score, explain, stress test, and govern decisions from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run the vendor selection example end to end
    Demo(DemoArgs),
    /// List the built-in decision templates
    Templates,
    /// Verify the hash chain of a decision persisted in a JSON-lines store
    Audit(AuditArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::Templates => run_templates(),
        Command::Audit(args) => run_audit(args),
    }
}
