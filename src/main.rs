use clap::{Parser, Subcommand};
use log::LevelFilter;
use pitch2midi::config::{PitchMethod, Segmentation};
use pitch2midi::pitch::note_name;
use pitch2midi::{midi, Config, Transcriber};
use std::path::PathBuf;

/// Monophonic audio-to-MIDI transcription
#[derive(Parser)]
#[command(name = "pitch2midi")]
#[command(about = "Transcribe monophonic recordings to MIDI with classical pitch tracking")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transcribe WAV files to MIDI
    Transcribe {
        /// Input audio files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory (defaults to each input's directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Pitch method (overrides the config file)
        #[arg(long, value_enum)]
        method: Option<PitchMethod>,

        /// Note segmentation (overrides the config file)
        #[arg(long, value_enum)]
        segmentation: Option<Segmentation>,

        /// Write a JSON analysis report next to each MIDI file
        #[arg(long)]
        report: bool,

        /// Worker threads for multiple inputs
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,
    },
    /// Export the note-on numbers of a MIDI file as JSON
    Notes {
        /// MIDI file
        midi: PathBuf,

        /// Output directory (defaults to the MIDI file's directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the notes stored in a MIDI file
    Inspect {
        /// MIDI file
        midi: PathBuf,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show default configuration
    ShowConfig {
        /// Also write it to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        LevelFilter::Error
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose && cli.quiet {
        anyhow::bail!("Cannot specify both --verbose and --quiet");
    }
    init_logging(cli.verbose, cli.quiet);
    let quiet = cli.quiet;

    match cli.command {
        Commands::Transcribe {
            inputs,
            output,
            config,
            method,
            segmentation,
            report,
            jobs,
        } => {
            let mut config = if let Some(config_path) = config {
                pitch2midi::config::load_config(config_path)?
            } else {
                Config::default()
            };
            if let Some(method) = method {
                config.pitch.method = method;
            }
            if let Some(segmentation) = segmentation {
                config.notes.segmentation = segmentation;
            }
            pitch2midi::config::validate_config(&config)?;

            let processor = Transcriber::new(config).with_report(report);

            if !quiet {
                println!("Processing {} file(s)...", inputs.len());
            }

            let results = processor.process_batch(&inputs, output.as_deref(), jobs);
            let mut failures = 0;
            for (input, result) in inputs.iter().zip(results) {
                match result {
                    Ok(path) => {
                        if !quiet {
                            println!("{} -> {}", input.display(), path.display());
                        }
                    }
                    Err(err) => {
                        failures += 1;
                        eprintln!("{}: {}", input.display(), err);
                    }
                }
            }

            if failures > 0 {
                anyhow::bail!("{} of {} file(s) failed", failures, inputs.len());
            }
        }
        Commands::Notes { midi: midi_path, output } => {
            let output_dir = output
                .or_else(|| midi_path.parent().map(PathBuf::from))
                .unwrap_or_default();
            let json_path = midi::export_note_array(&midi_path, &output_dir)?;
            if !quiet {
                println!("Note array saved to {}", json_path.display());
            }
        }
        Commands::Inspect { midi: midi_path } => {
            let bytes = std::fs::read(&midi_path)?;
            let notes = midi::decode_notes(&bytes)?;
            println!("{} notes in {}", notes.len(), midi_path.display());
            for event in &notes {
                println!(
                    "{:>9.3}s {:>9.3}s  {:<4} ({:>3})  vel {:>3}",
                    event.start_sec,
                    event.end_sec,
                    note_name(event.note),
                    event.note,
                    event.velocity
                );
            }
        }
        Commands::ValidateConfig { config } => {
            let config = pitch2midi::config::load_config(config)?;
            println!("Configuration is valid");
            if let Ok(json) = serde_json::to_string_pretty(&config) {
                println!("{}", json);
            }
        }
        Commands::ShowConfig { output } => {
            let config = Config::default();
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
            if let Some(path) = output {
                pitch2midi::config::save_config(&config, &path)?;
                if !quiet {
                    eprintln!("Configuration saved to {}", path.display());
                }
            }
        }
    }

    Ok(())
}
