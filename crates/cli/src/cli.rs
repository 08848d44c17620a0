use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "typepad")]
#[command(about = "Type check snippets with a slow engine and share them as links")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
	/// Session configuration file (TOML)
	#[arg(long, short = 'c', global = true, value_name = "PATH")]
	pub config: Option<PathBuf>,

	/// Verbose logging
	#[arg(long, short, global = true)]
	pub verbose: bool,

	#[command(subcommand)]
	pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
	/// Print the share link fragment for a file (stdin if omitted)
	Encode {
		file: Option<PathBuf>,

		/// Option to record in the link
		#[arg(long = "option", short = 'o', value_name = "NAME=BOOL", value_parser = parse_option)]
		options: Vec<(String, bool)>,
	},
	/// Print the text and options carried by a share link fragment
	Decode { fragment: String },
	/// Type check a file with an external engine
	Check {
		file: PathBuf,

		/// Option passed to the engine
		#[arg(long = "option", short = 'o', value_name = "NAME=BOOL", value_parser = parse_option)]
		options: Vec<(String, bool)>,

		/// Engine command, after `--` (overrides `engine_command`)
		#[arg(last = true, value_name = "ENGINE")]
		engine: Vec<String>,
	},
	/// List the flags the engine understands
	Flags {
		/// Engine command, after `--` (overrides `engine_command`)
		#[arg(last = true, value_name = "ENGINE")]
		engine: Vec<String>,
	},
}

/// Parses `name=true|false`; a bare `name` means `true`.
pub fn parse_option(arg: &str) -> Result<(String, bool), String> {
	let (name, value) = match arg.split_once('=') {
		Some((name, value)) => (name, value),
		None => (arg, "true"),
	};
	if name.is_empty() {
		return Err(format!("missing option name in `{arg}`"));
	}
	match value {
		"true" => Ok((name.to_string(), true)),
		"false" => Ok((name.to_string(), false)),
		other => Err(format!("option value must be `true` or `false`, got `{other}`")),
	}
}
