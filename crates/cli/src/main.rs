//! `typepad` command line.

mod cli;
mod commands;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command};
use typepad_session::SessionConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
	let cli = Cli::parse();
	setup_tracing(cli.verbose);

	let config = match &cli.config {
		Some(path) => SessionConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
		None => SessionConfig::default(),
	};

	match cli.command {
		Command::Encode { file, options } => {
			println!("{}", commands::encode(file.as_deref(), &options)?);
			Ok(ExitCode::SUCCESS)
		}
		Command::Decode { fragment } => {
			print!("{}", commands::decode(&fragment, &config));
			Ok(ExitCode::SUCCESS)
		}
		Command::Check { file, options, engine } => commands::check(&file, &options, &engine, config).await,
		Command::Flags { engine } => {
			commands::flags(&engine, &config).await?;
			Ok(ExitCode::SUCCESS)
		}
	}
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("typepad=debug")
		} else {
			EnvFilter::new("typepad=info")
		}
	});

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(verbose)
		.init();
}
