use chatpilot_cli::cli::Cli;
use chatpilot_cli::{commands, logging};
use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = commands::dispatch(cli.command).await {
		error!(target = "chatpilot", error = %err, "command failed");
		std::process::exit(err.exit_code());
	}
}
