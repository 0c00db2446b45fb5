use anyhow::{Context, Result};
use clap::Parser;
use core_logic::{
    LogOptions, RetryConfig, SPAM_TARGET, SpamCounters, SpammerTrait, WorkerRunner, setup_logger,
    with_retry,
};
use dotenv::dotenv;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tangle_spammer::config::{ConfigOverrides, DEFAULT_CONFIG_PATH, SpammerConfig};
use tangle_spammer::reporter::{REPORT_INTERVAL, run_reporter};
use tangle_spammer::{
    BundleProvider, HttpNode, SpamMode, SubmissionWorker, TangleApi, WinternitzSha256,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const PROBE_CONCURRENCY: usize = 8;

#[derive(Parser, Debug)]
#[command(author, version, about = "Spams tangle nodes with precomputed bundles", long_about = None)]
struct Args {
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Errors only; no status line or log files
    #[arg(short, long)]
    quiet: bool,

    /// Build the bundle pool, print it and exit
    #[arg(long)]
    init: bool,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let args = Args::parse();

    let _log_guard = setup_logger(&LogOptions {
        file_prefix: "tangle-spammer".to_string(),
        quiet: args.quiet,
        ..Default::default()
    })?;

    let (mut config, _) = SpammerConfig::load_or_create(&args.config, args.overrides)
        .context("Failed to load config")?;
    config.validate().context("Invalid configuration")?;

    let mode = config.spam_mode();
    let seed = config.resolve_seed()?;
    let params = config.supply_params(seed)?;

    let provider = Arc::new(BundleProvider::new());
    provider
        .init(mode, &WinternitzSha256, &params)
        .context("Failed to build bundle pool")?;
    log_pool_summary(&provider, mode)?;

    if args.init {
        info!(target: SPAM_TARGET, "Init only, not spamming");
        return Ok(());
    }

    let nodes = config
        .node_endpoints()?
        .iter()
        .map(|endpoint| Ok(Arc::new(HttpNode::new(endpoint)?) as Arc<dyn TangleApi>))
        .collect::<Result<Vec<_>>>()?;
    let pow = match config.pow_endpoint()? {
        Some(endpoint) => Some(Arc::new(HttpNode::new(&endpoint)?) as Arc<dyn TangleApi>),
        None => None,
    };

    probe_nodes(&nodes).await;

    info!(
        target: SPAM_TARGET,
        "Mode: {} | Nodes: {} | Instances per node: {} | MWM: {} | Depth: {}",
        mode,
        nodes.len(),
        config.instances,
        config.mwm,
        config.depth
    );
    if let Some(pow) = &pow {
        info!(target: SPAM_TARGET, "Proof-of-work on {}", pow.endpoint());
    }

    let counters = Arc::new(SpamCounters::new());
    let token = CancellationToken::new();
    let settings = config.worker_settings();

    let mut spammers: Vec<Box<dyn SpammerTrait>> = Vec::new();
    for k in 0..config.instances * nodes.len() {
        let node = Arc::clone(&nodes[k % nodes.len()]);
        let mut worker = SubmissionWorker::new(
            k + 1,
            node,
            Arc::clone(&provider),
            Arc::clone(&counters),
            settings.clone(),
        );
        if let Some(pow) = &pow {
            worker = worker.with_pow_node(Arc::clone(pow));
        }
        spammers.push(Box::new(worker));
    }

    let reporter = tokio::spawn(run_reporter(
        Arc::clone(&counters),
        token.clone(),
        REPORT_INTERVAL,
        args.quiet,
    ));

    let result = WorkerRunner::run_spammers(spammers, token.clone()).await;
    token.cancel();
    let _ = reporter.await;

    result.map(|_| ())
}

fn log_pool_summary(provider: &BundleProvider, mode: SpamMode) -> Result<()> {
    let bundles = provider.bundles()?;
    info!(
        target: SPAM_TARGET,
        "Pool: mode={} bundles={} transactions/bundle={}",
        mode,
        bundles.len(),
        bundles.first().map_or(0, |b| b.len())
    );
    for (i, bundle) in bundles.iter().enumerate() {
        let spent: Vec<String> = bundle
            .spent_addresses()
            .iter()
            .map(|a| a.to_string())
            .collect();
        info!(
            target: SPAM_TARGET,
            "  #{} hash={} spends=[{}]",
            i,
            hex::encode(bundle.hash()),
            spent.join(", ")
        );
    }
    Ok(())
}

/// Checks each node once. Unreachable nodes are only reported.
async fn probe_nodes(nodes: &[Arc<dyn TangleApi>]) {
    let results: Vec<_> = stream::iter(nodes.iter())
        .map(|node| async move {
            let info = with_retry(RetryConfig::new(2, 500), "getNodeInfo", || async move {
                node.node_info().await.map_err(anyhow::Error::from)
            })
            .await;
            (node.endpoint().to_string(), info)
        })
        .buffer_unordered(PROBE_CONCURRENCY)
        .collect()
        .await;

    for (endpoint, result) in results {
        match result {
            Ok(info) if info.is_synced() => info!(
                target: SPAM_TARGET,
                "Node {}: {} {} (milestone {})",
                endpoint,
                info.app_name,
                info.app_version,
                info.latest_milestone_index
            ),
            Ok(info) => warn!(
                target: SPAM_TARGET,
                "Node {} is not synced (milestone {}/{})",
                endpoint,
                info.latest_solid_subtangle_milestone_index,
                info.latest_milestone_index
            ),
            Err(e) => warn!(
                target: SPAM_TARGET,
                "Node {} unreachable, spamming anyway: {:#}",
                endpoint,
                e
            ),
        }
    }
}
