mod check;
mod replay;

use crate::cli::Commands;
use crate::error::Result;

pub use replay::ReplayArgs;

pub async fn dispatch(command: Commands) -> Result<()> {
	match command {
		Commands::Check { config } => check::run(&config),
		Commands::Replay {
			config,
			script,
			format,
			question,
		} => {
			replay::run(ReplayArgs {
				config,
				script,
				format,
				question,
			})
			.await
		}
	}
}
