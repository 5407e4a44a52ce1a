use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use debt_sim::api::{build_projection_inputs, rounded_projection, run_http_server};
use debt_sim::config::{Cli, Command, ProjectArgs, ServeConfig};
use debt_sim::core::project;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debt_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve(args) => serve(args.try_into()).await,
        Command::Project(args) => print_projection(&args),
    };

    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn serve(config: Result<ServeConfig, String>) -> Result<(), String> {
    let config = config?;
    run_http_server(config)
        .await
        .map_err(|e| format!("Server error: {e}"))
}

fn print_projection(args: &ProjectArgs) -> Result<(), String> {
    let inputs = build_projection_inputs(args)?;
    let projection = rounded_projection(project(&inputs.params, inputs.max_ticks));

    if args.json {
        let json = serde_json::to_string_pretty(&projection)
            .map_err(|e| format!("Failed to encode projection: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    println!("{:>6}  {:>14}  {:>16}", "tick", "payment", "remaining");
    for sample in &projection.samples {
        println!(
            "{:>6}  {:>14.2}  {:>16.2}",
            sample.tick_index, sample.payment_applied, sample.remaining_balance_after_tick
        );
    }
    println!();
    println!("total interest: {:.2}", projection.total_interest_accrued);
    if projection.paid_off {
        println!("paid off after {} ticks", projection.ticks);
    } else {
        println!(
            "not paid off after {} ticks, {:.2} still owed",
            projection.ticks, projection.final_balance
        );
    }
    Ok(())
}
