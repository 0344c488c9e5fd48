use std::path::PathBuf;

use chatpilot_runtime::config::DEFAULT_CONFIG_FILE;
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "chatpilot")]
#[command(about = "Drive a supervised chat worker from the command line")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Load and validate a worker config
	Check {
		/// Worker config file
		#[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
		config: PathBuf,
	},

	/// Ask one question against a scripted session and print the streamed reply
	Replay {
		/// Worker config file (its sessionKind must be "scripted")
		#[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
		config: PathBuf,

		/// Script the scripted driver replays
		#[arg(short, long)]
		script: PathBuf,

		/// How to print reply events
		#[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
		format: OutputFormat,

		question: String,
	},
}
