//! Solvia command-line interface.
//!
//! Run continuum-solvent embedding calculations from TOML configuration
//! files:
//! ```sh
//! solvia run job.toml
//! solvia validate job.toml
//! ```

mod config;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(name = "solvia")]
#[command(about = "Solvia: continuum-solvent embedding for electronic-structure calculations")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v: info, -vv: debug, -vvv: trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an embedding calculation from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides the config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file without running the calculation.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(level)
        .compact()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Run { config, output } => {
            println!("Solvia continuum-solvent engine");
            println!("===============================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let result = runner::run_job(&job)?;

            println!("Cavity volume:        {:.6} bohr^3", result.volume);
            println!("Cavity surface:       {:.6} bohr^2", result.surface);
            println!("Polarization charge:  {:.6e}", result.polarization_charge);
            println!("Embedding energy:     {:.8} hartree", result.energy);

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));
            if job.output.save_potential_profile {
                let path = out_dir.join("potential_profile.csv");
                runner::write_potential_profile(&result.potential, &path)?;
            }

            println!("Run complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let _job = config::load_config(&config)?;
            println!("Configuration is valid: {}", config.display());
            Ok(())
        }
    }
}
