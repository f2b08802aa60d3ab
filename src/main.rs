use clap::{Arg, Command};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use deployr::logging;
use deployr::{groups, DirectoryDiscovery, SyncConfig, SyncEvent, SyncManager, SummaryStatus};

fn source_args(command: Command) -> Command {
	command
		.arg(
			Arg::new("source")
				.long("source")
				.value_name("DIR")
				.help("Override the configured source root"),
		)
		.arg(
			Arg::new("targets")
				.long("targets")
				.value_name("DIR")
				.required(true)
				.help("Directory whose numeric subdirectories are the sync targets"),
		)
}

fn load_config(matches: &clap::ArgMatches, sub: &clap::ArgMatches) -> Result<SyncConfig, Box<dyn Error>> {
	let config_path = matches
		.get_one::<String>("config")
		.ok_or("config argument required")?;
	let mut config = SyncConfig::load(Path::new(config_path))?;
	let cycle = groups::find_circular_references(&config.target_groups);
	if !cycle.is_empty() {
		return Err(format!("circular group reference: {}", cycle.join(" -> ")).into());
	}
	if let Some(source) = sub.get_one::<String>("source") {
		config.source_root = PathBuf::from(source);
	}
	Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	logging::init_tracing();

	let matches = Command::new("deployr")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Rule-driven source tree fan-out synchronizer")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.default_value("deployr.json")
				.global(true)
				.help("Configuration file"),
		)
		.subcommand(source_args(Command::new("sync").about("Run one sync cycle and exit")))
		.subcommand(source_args(
			Command::new("watch").about("Watch the source tree and sync continuously"),
		))
		.get_matches();

	if let Some(sub) = matches.subcommand_matches("sync") {
		let config = load_config(&matches, sub)?;
		let location = sub.get_one::<String>("targets").ok_or("targets argument required")?;
		let discovery = Arc::new(DirectoryDiscovery::new(location.as_str()));

		let mut manager = SyncManager::new(config, discovery);
		let (mut controller, mut events) = manager.init_manual_mode()?;
		controller.start()?;

		while let Some(event) = events.recv().await {
			match event {
				SyncEvent::SyncComplete(summary) => {
					println!("{}", serde_json::to_string_pretty(&summary)?);
					let failed = summary.status == SummaryStatus::Error;
					controller.stop().await;
					if failed {
						return Err("sync finished with errors".into());
					}
					break;
				}
				SyncEvent::ControllerStopped(state) => {
					return Err(format!("engine stopped unexpectedly: {:?}", state).into());
				}
				_ => {}
			}
		}
	} else if let Some(sub) = matches.subcommand_matches("watch") {
		let config = load_config(&matches, sub)?;
		let location = sub.get_one::<String>("targets").ok_or("targets argument required")?;
		let discovery = Arc::new(DirectoryDiscovery::new(location.as_str()));

		let mut manager = SyncManager::new(config, discovery);
		let (mut controller, mut events) = manager.init_watch_mode()?;
		controller.start()?;

		loop {
			tokio::select! {
				maybe_event = events.recv() => {
					match maybe_event {
						Some(SyncEvent::InitialSyncComplete(summary))
						| Some(SyncEvent::SyncComplete(summary)) => {
							println!("{}", serde_json::to_string(&summary)?);
						}
						Some(SyncEvent::ControllerStopped(state)) => {
							if state == deployr::EngineState::Error {
								return Err("engine stopped after an error".into());
							}
							break;
						}
						Some(_) => {}
						None => break,
					}
				}
				_ = tokio::signal::ctrl_c() => {
					controller.stop().await;
					break;
				}
			}
		}
	}

	Ok(())
}

// vim: ts=4
