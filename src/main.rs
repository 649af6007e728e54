#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;

use seroscan::associate::TestFamily;
use seroscan::config::{InfectionTest, PipelineConfig};
use seroscan::pipeline::{self, PipelineInputs};

#[derive(Parser)]
#[command(
    name = "seroscan",
    about = "Antibody seroreactivity and association analysis for cohort serology panels",
    long_about = "Assembles an epidemiology table, a force-of-infection table and an antibody \
                  panel into one cohort table, calls seroreactivity per antigen, and tests \
                  every antigen for association with age, exposure and infection status."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole pipeline and write every output
    Run {
        #[command(flatten)]
        inputs: InputArgs,

        /// Directory receiving the cohort table, summaries and report
        #[arg(long, value_name = "DIR")]
        out_dir: PathBuf,

        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Run the integrity checks and print a summary without writing anything
    Validate {
        #[command(flatten)]
        inputs: InputArgs,

        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Show version information
    Version,
}

#[derive(Args)]
struct InputArgs {
    /// Epidemiology table (participant id, age, infection marker, cohort category)
    #[arg(long, value_name = "CSV")]
    epidemiology: PathBuf,

    /// Antibody measurement table (participant id plus one column per antigen)
    #[arg(long, value_name = "CSV")]
    antibody: PathBuf,

    /// Force-of-infection table (participant id, molFOB)
    #[arg(long, value_name = "CSV")]
    exposure: PathBuf,
}

#[derive(Clone, ValueEnum)]
enum InfectionTestCli {
    Literal,
    Grouped,
}

#[derive(Args)]
struct OverrideArgs {
    /// TOML configuration file; flags below take precedence over it
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Cohort category value selecting the analysis cohort
    #[arg(long)]
    keep: Option<String>,

    /// How the infection-status comparison is formed
    #[arg(long, value_enum)]
    infection_test: Option<InfectionTestCli>,

    /// Marker value above which a participant counts as infected; implies grouped
    /// mode and replaces the threshold from the configuration file
    #[arg(long)]
    infection_threshold: Option<f64>,

    /// Number of participants the filtered cohort must contain
    #[arg(long, value_name = "N")]
    expected_participants: Option<usize>,

    /// Number of antigens the panel must contain
    #[arg(long, value_name = "N")]
    expected_antigens: Option<usize>,
}

impl InputArgs {
    fn into_inputs(self) -> PipelineInputs {
        PipelineInputs {
            epidemiology: self.epidemiology,
            antibody: self.antibody,
            exposure: self.exposure,
        }
    }
}

/// Combines the configured infection test with the command-line flags. A
/// threshold without a mode selects grouped mode; a mode without a threshold
/// keeps the configured grouped threshold, or 0 when there is none.
fn apply_infection_override(
    configured: InfectionTest,
    mode: Option<InfectionTestCli>,
    threshold: Option<f64>,
) -> Result<InfectionTest, String> {
    let configured_threshold = match configured {
        InfectionTest::Grouped { threshold } => Some(threshold),
        InfectionTest::Literal => None,
    };
    match (mode, threshold) {
        (None, None) => Ok(configured),
        (Some(InfectionTestCli::Literal), None) => Ok(InfectionTest::Literal),
        (Some(InfectionTestCli::Literal), Some(_)) => Err(
            "--infection-threshold only applies to --infection-test grouped".to_string(),
        ),
        (Some(InfectionTestCli::Grouped), None) => Ok(InfectionTest::Grouped {
            threshold: configured_threshold.unwrap_or(0.0),
        }),
        (Some(InfectionTestCli::Grouped) | None, Some(threshold)) => {
            Ok(InfectionTest::Grouped { threshold })
        }
    }
}

fn resolve_config(overrides: OverrideArgs) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &overrides.config {
        Some(path) => {
            println!("Loading configuration from: {}", path.display());
            PipelineConfig::load(path)?
        }
        None => PipelineConfig::default(),
    };

    if let Some(keep) = overrides.keep {
        config.cohort.keep = keep;
    }
    config.analysis.infection_test = apply_infection_override(
        config.analysis.infection_test,
        overrides.infection_test,
        overrides.infection_threshold,
    )?;
    if let Some(n) = overrides.expected_participants {
        config.cohort.expected_participants = n;
    }
    if let Some(n) = overrides.expected_antigens {
        config.panel.expected_antigens = n;
    }

    config.validate()?;
    Ok(config)
}

fn run_pipeline(
    inputs: InputArgs,
    out_dir: PathBuf,
    overrides: OverrideArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(overrides)?;
    let inputs = inputs.into_inputs();

    println!("Running seroreactivity pipeline...");
    let outcome = pipeline::run(&inputs, &config)?;
    println!(
        "Cohort: {} participants x {} antigens",
        outcome.table.n_participants(),
        outcome.table.panel.len()
    );

    for family in TestFamily::ALL {
        if let Some(rollup) = outcome.associations.rollup(family) {
            println!(
                "  {:<17} {} of {} antigens significant ({:.1}%), {} undefined",
                family.label(),
                rollup.n_significant,
                outcome.table.panel.len(),
                rollup.percent_significant,
                rollup.n_undefined
            );
        }
    }

    let paths = pipeline::write_outputs(&outcome, &config, &out_dir)?;
    println!("Cohort table saved to: {}", paths.cohort_table.display());
    println!("Report saved to: {}", paths.report.display());
    Ok(())
}

fn run_validate(
    inputs: InputArgs,
    overrides: OverrideArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(overrides)?;
    let inputs = inputs.into_inputs();

    let tables = pipeline::load_inputs(&inputs, &config)?;
    let (table, classification) = pipeline::prepare(&tables, &config)?;

    let any_reactive = classification
        .antigens
        .iter()
        .filter(|a| a.n_seroreactive > 0)
        .count();
    println!("Inputs are consistent.");
    println!(
        "Cohort: {} participants x {} antigens",
        table.n_participants(),
        table.panel.len()
    );
    println!(
        "Antigens with at least one seroreactive participant: {} of {}",
        any_reactive,
        table.panel.len()
    );
    Ok(())
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("SEROSCAN_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("seroscan {version}");
    if build_timestamp > 0 {
        println!("Built: {build_timestamp} (seconds since the Unix epoch)");
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Run {
            inputs,
            out_dir,
            overrides,
        }) => run_pipeline(inputs, out_dir, overrides),
        Some(Commands::Validate { inputs, overrides }) => run_validate(inputs, overrides),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
