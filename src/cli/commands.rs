//! Command execution for the bikeshare processor CLI.
//!
//! Wires argument parsing to the pipeline phases and owns logging setup.

use crate::cli::args::{Args, Commands, PipelineArgs};
use crate::error::Result;
use crate::pipeline::Pipeline;
use tracing::{debug, info};

/// Run the subcommand selected on the command line.
pub async fn run(args: Args) -> Result<()> {
    let phase_args = match &args.command {
        Commands::Normalize(a)
        | Commands::Enrich(a)
        | Commands::Signatures(a)
        | Commands::Run(a) => a.clone(),
    };

    setup_logging(&phase_args);
    info!("Starting bikeshare processor");
    debug!("Command line arguments: {:?}", args);

    let pipeline = Pipeline::new(phase_args.to_config())?;

    match args.command {
        Commands::Normalize(_) => {
            pipeline.run_normalize().await?;
        }
        Commands::Enrich(_) => {
            pipeline.run_enrich().await?;
        }
        Commands::Signatures(_) => {
            pipeline.run_signatures()?;
        }
        Commands::Run(_) => {
            pipeline.run_all().await?;
        }
    }

    Ok(())
}

/// Set up tracing based on verbosity flags.
fn setup_logging(args: &PipelineArgs) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let log_level = args.get_log_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bikeshare_processor={}", log_level)));

    if args.quiet {
        // Minimal logging for quiet mode
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    } else {
        // Standard logging with timestamps
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
