// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use steptrack::{
    init_scheduler, BuiltinPresets, LoggingTrigger, PresetLoader, SequencerConfig, SequencerEvent,
};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A lookahead step sequencer."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the built-in presets.
    Presets {},
    /// Plays the configured patterns, logging every trigger.
    Play {
        /// The path to the sequencer config.
        config_path: String,
        /// Stop after this many bars. Plays until interrupted if not given.
        #[arg[short, long]]
        bars: Option<u64>,
    },
    /// Prints the configured patterns as JSON.
    Export {
        /// The path to the sequencer config.
        config_path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Presets {} => {
            let presets = BuiltinPresets;
            println!("Presets:");
            for name in presets.preset_names() {
                println!("- {}", name);
                let Some(rows) = presets.preset(&name) else {
                    continue;
                };
                for (track, row) in rows.iter() {
                    let row: String = row
                        .iter()
                        .map(|value| if *value != 0 { 'x' } else { '.' })
                        .collect();
                    println!("    {:<6} {}", track, row);
                }
            }
        }
        Commands::Play { config_path, bars } => {
            let scheduler = init_scheduler(&PathBuf::from(config_path))?;
            scheduler.set_sound_trigger(Some(Arc::new(LoggingTrigger)));
            let events = scheduler.subscribe();

            let finished = tokio::task::spawn_blocking(move || {
                for event in events.iter() {
                    match event {
                        SequencerEvent::Bar { bar, bank, .. } => {
                            if bars.is_some_and(|limit| bar >= limit) {
                                return;
                            }
                            info!(bar, bank = bank.as_str(), "Bar.");
                        }
                        SequencerEvent::Stopped => return,
                        _ => {}
                    }
                }
            });

            scheduler.start();
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Interrupted."),
                result = finished => result?,
            }
            scheduler.stop();
        }
        Commands::Export { config_path } => {
            let config = SequencerConfig::deserialize(&PathBuf::from(config_path))?;
            let store = config.build_store(&BuiltinPresets)?;
            println!("{}", store.export_all().to_json()?);
        }
    }

    Ok(())
}
