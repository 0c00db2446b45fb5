use async_trait::async_trait;
use core_logic::{LoopConfig, NetworkError, RetryPolicy, SpamCounters, SpammerTrait};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tangle_spammer::client::{NodeInfo, TangleApi, Tips};
use tangle_spammer::crypto::{Address, SecurityLevel, Seed, WinternitzSha256, HASH_LEN};
use tangle_spammer::provider::BundleProvider;
use tangle_spammer::supply::{SpamMode, SupplyParams};
use tangle_spammer::worker::{SubmissionWorker, WorkerSettings};
use tokio_util::sync::CancellationToken;

/// Fails every `fail_every`-th tip request; everything else succeeds.
struct ScriptedNode {
    fail_every: usize,
    tip_calls: AtomicUsize,
    broadcasts: AtomicUsize,
}

impl ScriptedNode {
    fn new(fail_every: usize) -> Self {
        Self {
            fail_every,
            tip_calls: AtomicUsize::new(0),
            broadcasts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TangleApi for ScriptedNode {
    fn endpoint(&self) -> &str {
        "http://mock:14265"
    }

    async fn node_info(&self) -> Result<NodeInfo, NetworkError> {
        Ok(NodeInfo::default())
    }

    async fn transactions_to_approve(&self, _depth: u32) -> Result<Tips, NetworkError> {
        let call = self.tip_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every > 0 && call % self.fail_every == 0 {
            return Err(NetworkError::Timeout {
                timeout_ms: 10,
                endpoint: self.endpoint().to_string(),
            });
        }
        Ok(Tips {
            trunk_transaction: "trunk".to_string(),
            branch_transaction: "branch".to_string(),
        })
    }

    async fn attach_to_tangle(
        &self,
        _tips: &Tips,
        _mwm: u8,
        payloads: &[String],
    ) -> Result<Vec<String>, NetworkError> {
        Ok(payloads.to_vec())
    }

    async fn broadcast_transactions(&self, _payloads: &[String]) -> Result<(), NetworkError> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Attach node that always rejects.
struct RejectingPow;

#[async_trait]
impl TangleApi for RejectingPow {
    fn endpoint(&self) -> &str {
        "http://pow:14265"
    }

    async fn node_info(&self) -> Result<NodeInfo, NetworkError> {
        Ok(NodeInfo::default())
    }

    async fn transactions_to_approve(&self, _depth: u32) -> Result<Tips, NetworkError> {
        unreachable!("tips always come from the main node")
    }

    async fn attach_to_tangle(
        &self,
        _tips: &Tips,
        _mwm: u8,
        _payloads: &[String],
    ) -> Result<Vec<String>, NetworkError> {
        Err(NetworkError::NodeRejected {
            endpoint: self.endpoint().to_string(),
            command: "attachToTangle".to_string(),
            reason: "invalid trytes".to_string(),
        })
    }

    async fn broadcast_transactions(&self, _payloads: &[String]) -> Result<(), NetworkError> {
        unreachable!("nothing is broadcast after a failed attach")
    }
}

/// Records the failure streak it is asked about and stops the worker
/// once the streak reaches `stop_at`.
struct RecordingPolicy {
    seen: Arc<Mutex<Vec<u32>>>,
    stop_at: u32,
    token: CancellationToken,
}

impl RetryPolicy for RecordingPolicy {
    fn failure_delay(&self, consecutive_failures: u32) -> Option<Duration> {
        self.seen.lock().unwrap().push(consecutive_failures);
        if consecutive_failures >= self.stop_at {
            self.token.cancel();
        }
        None
    }
}

fn ready_provider(bundle_size: usize) -> Arc<BundleProvider> {
    let provider = BundleProvider::new();
    let params = SupplyParams {
        bundle_size,
        cycle_length: 2,
        security: SecurityLevel::Medium,
        target: Address::from_hash([0x42; HASH_LEN]).to_string(),
        tag: "WORKERTEST".to_string(),
        message: String::new(),
        seed: Seed::parse(&"07".repeat(32)).unwrap(),
        static_balance: 1,
        conflict_value: 1,
        timestamp: Some(1_700_000_000),
    };
    provider
        .init(SpamMode::ZeroValue, &WinternitzSha256, &params)
        .unwrap();
    Arc::new(provider)
}

fn settings(stop_after: Option<u64>) -> WorkerSettings {
    WorkerSettings {
        loop_config: LoopConfig {
            stop_after,
            backoff_base_ms: None,
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn test_stop_after_counts_only_successes() {
    let node = Arc::new(ScriptedNode::new(2));
    let counters = Arc::new(SpamCounters::new());
    let mut worker = SubmissionWorker::new(
        1,
        node.clone(),
        ready_provider(3),
        counters.clone(),
        settings(Some(5)),
    )
    .with_rng(StdRng::seed_from_u64(1));

    let stats = worker.start(CancellationToken::new()).await.unwrap();

    assert_eq!(stats.success, 5);
    assert_eq!(stats.transactions, 15);
    assert_eq!(stats.failed, 4);
    assert_eq!(node.broadcasts.load(Ordering::SeqCst), 5);

    let snapshot = counters.snapshot();
    assert_eq!(snapshot.spammed, 15);
    assert_eq!(snapshot.errors, 4);
}

#[tokio::test]
async fn test_not_ready_provider_is_fatal() {
    let mut worker = SubmissionWorker::new(
        1,
        Arc::new(ScriptedNode::new(0)),
        Arc::new(BundleProvider::new()),
        Arc::new(SpamCounters::new()),
        settings(Some(1)),
    );

    let err = worker.start(CancellationToken::new()).await.unwrap_err();
    assert!(format!("{:#}", err).contains("before it was ready"));
}

#[tokio::test]
async fn test_cancelled_worker_exits_cleanly() {
    let token = CancellationToken::new();
    token.cancel();
    let mut worker = SubmissionWorker::new(
        1,
        Arc::new(ScriptedNode::new(0)),
        ready_provider(2),
        Arc::new(SpamCounters::new()),
        settings(None),
    );

    let stats = worker.start(token).await.unwrap();
    assert_eq!(stats.success + stats.failed, 0);
}

#[tokio::test]
async fn test_pow_node_failures_are_counted() {
    let node = Arc::new(ScriptedNode::new(0));
    let counters = Arc::new(SpamCounters::new());
    let token = CancellationToken::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut worker = SubmissionWorker::new(
        3,
        node.clone(),
        ready_provider(2),
        counters.clone(),
        settings(None),
    )
    .with_pow_node(Arc::new(RejectingPow))
    .with_retry_policy(Box::new(RecordingPolicy {
        seen: seen.clone(),
        stop_at: 3,
        token: token.clone(),
    }));

    let stats = worker.start(token).await.unwrap();
    assert_eq!(stats.success, 0);
    assert_eq!(stats.failed, 3);
    assert_eq!(counters.errors(), 3);
    assert_eq!(node.broadcasts.load(Ordering::SeqCst), 0);
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
}
