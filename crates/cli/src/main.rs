mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use mercato_events::ContractKey;

#[derive(Parser, Debug)]
#[command(
    name = "mercato-consumer",
    version,
    about = "Inspect topics, validate payloads and dry-run the queue consumer"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the topic registry as JSON.
    Topics,
    /// Validate a JSON payload against a contract.
    Validate(ValidateArgs),
    /// Run the consumer against in-memory sinks and print what happened.
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
struct ValidateArgs {
    /// Contract key, e.g. inventory_ledger_delta
    #[arg(long)]
    contract: ContractKey,

    /// Payload file (stdin when omitted)
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct SimulateArgs {
    /// Topic key, e.g. inventory_sync
    #[arg(long)]
    topic: String,

    /// Contract to decode the payload as (topic default when omitted)
    #[arg(long)]
    contract: Option<ContractKey>,

    /// Attempt of the first delivery
    #[arg(long, default_value_t = 0)]
    attempt: u32,

    /// Make the handler fail with this message
    #[arg(long)]
    fail: Option<String>,

    #[arg(long)]
    idempotency_key: Option<String>,

    #[arg(long)]
    trace_id: Option<String>,

    /// Deliver the message this many times, following requeues
    #[arg(long, default_value_t = 1)]
    deliveries: u32,

    /// Payload file (stdin when omitted)
    #[arg(long)]
    file: Option<PathBuf>,

    /// Shared idempotency backend (process-local store when unset)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    #[arg(long, env = "MERCATO_IDEMPOTENCY_PREFIX")]
    idempotency_prefix: Option<String>,
}

#[tokio::main]
async fn main() {
    mercato_observability::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Topics => commands::topics(),
        Command::Validate(args) => commands::validate(&args),
        Command::Simulate(args) => commands::simulate(&args).await,
    };

    match result {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simulate_flags() {
        let cli = Cli::try_parse_from([
            "mercato-consumer",
            "simulate",
            "--topic",
            "invoice_issuance",
            "--contract",
            "inventory_ledger_delta",
            "--attempt",
            "6",
            "--fail",
            "boom",
        ])
        .unwrap();

        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.topic, "invoice_issuance");
        assert_eq!(args.contract, Some(ContractKey::InventoryLedgerDelta));
        assert_eq!(args.attempt, 6);
        assert_eq!(args.fail.as_deref(), Some("boom"));
        assert_eq!(args.deliveries, 1);
    }

    #[test]
    fn backend_flags_override_configuration() {
        let cli = Cli::try_parse_from([
            "mercato-consumer",
            "simulate",
            "--topic",
            "inventory_sync",
            "--redis-url",
            "redis://cache:6379",
            "--idempotency-prefix",
            "staging",
        ])
        .unwrap();

        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        let config = commands::consumer_config(&args);
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.idempotency_prefix, "staging");
    }

    #[test]
    fn rejects_unknown_contracts() {
        let err = Cli::try_parse_from(["mercato-consumer", "validate", "--contract", "shipping_label"]);
        assert!(err.is_err());
    }
}
