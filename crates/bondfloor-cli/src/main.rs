//! Bondfloor CLI
//!
//! Runs scripted scenarios against the economics engine and prints quotes
//! and views as JSON.

mod scenario;

use anyhow::Context;
use bondfloor_economics::math::parse_units;
use bondfloor_economics::{views, Address, FixedPriceOracle, Protocol, ProtocolConfig};
use clap::{Parser, Subcommand, ValueEnum};
use scenario::{Runner, Scenario};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "bondfloor")]
#[command(version)]
#[command(about = "Bondfloor - ve(3,3) bonding-curve economics simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the default protocol configuration as TOML
    Config,

    /// Run a scenario and print the resulting state
    Simulate {
        /// Scenario file (TOML)
        #[arg(short, long)]
        scenario: PathBuf,

        /// Protocol configuration file; defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stop at the first rejected step
        #[arg(long)]
        strict: bool,

        /// USD price of one BASE used for the views
        #[arg(long, default_value = "1")]
        base_price: String,
    },

    /// Quote a swap against the curve
    Quote {
        /// Which side of the swap is fixed
        #[arg(value_enum)]
        side: QuoteSide,

        /// Amount, in whole tokens ("12.5")
        amount: String,

        /// Share of the output to keep as the minimum, in basis points
        #[arg(short, long, default_value_t = 9_800)]
        tolerance: u128,

        /// Protocol configuration file; defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run this scenario first and quote against its final curve
        #[arg(short, long)]
        scenario: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum QuoteSide {
    /// Spend exactly this much BASE
    BuyIn,
    /// Receive exactly this much TOKEN
    BuyOut,
    /// Sell exactly this much TOKEN
    SellIn,
    /// Receive exactly this much BASE
    SellOut,
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false),
        )
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ProtocolConfig> {
    match path {
        Some(path) => ProtocolConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(ProtocolConfig::default()),
    }
}

/// Deploy, set up and run `scenario`, returning the runner
fn run_scenario(config: ProtocolConfig, scenario: &Scenario, strict: bool) -> anyhow::Result<(Runner, Vec<scenario::StepReport>)> {
    let deployer = Address::from_label(&scenario.deployer);
    let protocol = Protocol::deploy_and_setup(config, deployer, scenario.start)?;
    tracing::info!(
        deployer = %deployer,
        token = %protocol.addresses().token,
        steps = scenario.steps.len(),
        "protocol deployed"
    );
    let mut runner = Runner::new(protocol, &scenario.deployer);
    let reports = runner.run(&scenario.steps, strict)?;
    Ok((runner, reports))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Config => {
            print!("{}", ProtocolConfig::default().to_toml_string()?);
        }

        Commands::Simulate {
            scenario,
            config,
            strict,
            base_price,
        } => {
            let config = load_config(config.as_deref())?;
            let oracle = FixedPriceOracle::new(parse_units(&base_price)?);
            let scenario = Scenario::load(&scenario)?;

            let (runner, reports) = run_scenario(config, &scenario, strict)?;
            let rejected = reports.iter().filter(|r| !r.ok).count();
            tracing::info!(steps = reports.len(), rejected, "scenario finished");

            let report = runner.report(reports, &oracle)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Quote {
            side,
            amount,
            tolerance,
            config,
            scenario,
        } => {
            let config = load_config(config.as_deref())?;
            let amount = parse_units(&amount)?;
            let protocol = match scenario {
                Some(path) => {
                    let scenario = Scenario::load(&path)?;
                    run_scenario(config, &scenario, false)?.0.snapshot()
                }
                None => Protocol::deploy_and_setup(config, Address::from_label("owner"), 0)?,
            };

            let market = protocol.market();
            let quote = match side {
                QuoteSide::BuyIn => views::quote_buy_in(market, amount, tolerance)?,
                QuoteSide::BuyOut => views::quote_buy_out(market, amount, tolerance)?,
                QuoteSide::SellIn => views::quote_sell_in(market, amount, tolerance)?,
                QuoteSide::SellOut => views::quote_sell_out(market, amount, tolerance)?,
            };
            println!("{}", serde_json::to_string_pretty(&quote)?);
        }
    }

    Ok(())
}
