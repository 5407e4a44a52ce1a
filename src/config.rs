use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::core::DEFAULT_TICK_PERIOD;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_TICKS: u32 = 600;
pub const MAX_PROJECTION_TICKS: u32 = 100_000;

#[derive(Parser, Debug)]
#[command(
    name = "debt-sim",
    about = "Debt repayment simulator (per-tick interest, capped repayments)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP API with live, ticking simulations
    Serve(ServeArgs),
    /// Print a repayment projection without waiting on a timer
    Project(ProjectArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    #[arg(
        long,
        default_value_t = 1000,
        help = "Milliseconds between simulation ticks"
    )]
    pub tick_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    #[arg(long, help = "Starting amount owed")]
    pub principal: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Interest per tick in percent, e.g. 5"
    )]
    pub interest_rate: f64,
    #[arg(long, default_value_t = 0.0, help = "Maximum amount repaid per tick")]
    pub repayment_rate: f64,
    #[arg(long, default_value_t = DEFAULT_MAX_TICKS, help = "Stop after this many ticks")]
    pub max_ticks: u32,
    #[arg(long, help = "Print the projection as JSON")]
    pub json: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ServeConfig {
    pub port: u16,
    pub tick_period: Duration,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            tick_period: DEFAULT_TICK_PERIOD,
        }
    }
}

impl TryFrom<ServeArgs> for ServeConfig {
    type Error = String;

    fn try_from(args: ServeArgs) -> Result<Self, Self::Error> {
        if args.tick_ms == 0 {
            return Err("--tick-ms must be > 0".to_string());
        }
        Ok(Self {
            port: args.port,
            tick_period: Duration::from_millis(args.tick_ms),
        })
    }
}
