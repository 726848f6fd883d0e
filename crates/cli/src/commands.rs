use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::info;

use mercato_core::TraceId;
use mercato_events::{
    Contract, ContractKey, InventoryLedgerDelta, InvoiceRecord, OrderSyncStatus, PaymentSettlement,
    PickPackBatch, QueueEnvelope, TopicContract, TopicRegistry, WeightPriceRule, validate as validate_payload,
};
use mercato_infra::{
    ConsumeOutcome, ConsumeRequest, ConsumerConfig, InMemoryQueueSinks, QueueConsumer, Requeued,
};

use crate::{SimulateArgs, ValidateArgs};

pub fn topics() -> Result<String> {
    let registry = TopicRegistry::marketplace();
    let topics: Vec<&TopicContract> = registry.iter().collect();
    serde_json::to_string_pretty(&topics).context("failed to encode topic registry")
}

pub fn validate(args: &ValidateArgs) -> Result<String> {
    let raw = read_payload(args.file.as_deref())?;
    let payload = validate_payload(args.contract, raw)?;

    #[derive(Serialize)]
    struct Valid {
        contract: ContractKey,
        payload: JsonValue,
    }

    let report = Valid {
        contract: payload.contract_key(),
        payload: payload.to_value().context("failed to re-encode payload")?,
    };
    serde_json::to_string_pretty(&report).context("failed to encode validation report")
}

pub async fn simulate(args: &SimulateArgs) -> Result<String> {
    let registry = Arc::new(TopicRegistry::marketplace());
    let contract = match args.contract {
        Some(key) => key,
        None => registry.get(&args.topic)?.contract,
    };
    let payload = read_payload(args.file.as_deref())?;

    let config = consumer_config(args);
    let consumer = QueueConsumer::new(registry, config.build_idempotency_store());

    match contract {
        ContractKey::InventoryLedgerDelta => simulate_as::<InventoryLedgerDelta>(&consumer, args, payload).await,
        ContractKey::OrderSyncStatus => simulate_as::<OrderSyncStatus>(&consumer, args, payload).await,
        ContractKey::WeightPriceRule => simulate_as::<WeightPriceRule>(&consumer, args, payload).await,
        ContractKey::PickPackBatch => simulate_as::<PickPackBatch>(&consumer, args, payload).await,
        ContractKey::InvoiceRecord => simulate_as::<InvoiceRecord>(&consumer, args, payload).await,
        ContractKey::PaymentSettlement => simulate_as::<PaymentSettlement>(&consumer, args, payload).await,
    }
}

/// Environment configuration with command-line overrides applied.
pub fn consumer_config(args: &SimulateArgs) -> ConsumerConfig {
    let mut config = ConsumerConfig::from_env();
    if let Some(url) = &args.redis_url {
        config.redis_url = Some(url.clone()).filter(|u| !u.trim().is_empty());
    }
    if let Some(prefix) = &args.idempotency_prefix {
        config.idempotency_prefix = prefix.clone();
    }
    config
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationReport<T> {
    outcomes: Vec<ConsumeOutcome>,
    requeued: Vec<Requeued<T>>,
    dead_letters: Vec<QueueEnvelope<T>>,
}

async fn simulate_as<T: Contract>(
    consumer: &QueueConsumer,
    args: &SimulateArgs,
    payload: JsonValue,
) -> Result<String> {
    let report = run_deliveries::<T>(consumer, args, payload).await?;
    serde_json::to_string_pretty(&report).context("failed to encode simulation report")
}

/// Deliver the payload up to `args.deliveries` times, each redelivery at the
/// attempt the previous retry asked for. Stops at the first dead letter.
async fn run_deliveries<T: Contract>(
    consumer: &QueueConsumer,
    args: &SimulateArgs,
    payload: JsonValue,
) -> Result<SimulationReport<T>> {
    if args.deliveries == 0 {
        bail!("--deliveries must be at least 1");
    }

    let sinks = InMemoryQueueSinks::<T>::new();
    let trace_id = args
        .trace_id
        .clone()
        .unwrap_or_else(|| TraceId::new().into_inner());
    let mut attempt = args.attempt;
    let mut outcomes = Vec::new();

    for _ in 0..args.deliveries {
        let mut request = ConsumeRequest::new(&args.topic, payload.clone())
            .at_attempt(attempt)
            .with_trace_id(trace_id.clone());
        if let Some(key) = &args.idempotency_key {
            request = request.with_idempotency_key(key.clone());
        }

        let failure = args.fail.clone();
        let outcome = consumer
            .consume(
                request,
                |_: T| async move {
                    match failure {
                        Some(message) => Err(message),
                        None => Ok(()),
                    }
                },
                &sinks,
            )
            .await
            .with_context(|| format!("delivery at attempt {attempt} failed"))?;

        info!(status = ?outcome.status(), retries = outcome.retries(), "delivery finished");

        let dead_lettered = matches!(outcome, ConsumeOutcome::Dlq { .. });
        if let ConsumeOutcome::Retry { retries, .. } = &outcome {
            attempt = *retries;
        }
        outcomes.push(outcome);
        if dead_lettered {
            break;
        }
    }

    Ok(SimulationReport {
        outcomes,
        requeued: sinks.requeued()?,
        dead_letters: sinks.dead_letters()?,
    })
}

fn read_payload(file: Option<&Path>) -> Result<JsonValue> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read payload file {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("cannot read payload from stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("payload is not valid JSON")
}
