//! End-to-end pipeline tests over the public API, driving real dispatcher
//! and worker tasks against the mock venue.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use signal_relay::config::{
    GatewaySettings, MasterKey, PipelineSettings, RateLimitKeyMode, RateLimitSettings, TierLimits,
};
use signal_relay::gateway::VenueClient;
use signal_relay::supervisor::run_event_intake;
use signal_relay::{
    Account, AccountRegistry, BufferNotifier, ConnectionStateTable, CredentialVault, ErrorKind,
    ExecutionGateway, MockVenue, PipelineContext, RateLimiter, RelayError, SignalLedger,
    SignalPipeline, SignalRecord, SignalStatus, TradeCredentials,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Harness {
    pipeline: Arc<SignalPipeline>,
    registry: Arc<AccountRegistry>,
    vault: Arc<CredentialVault>,
    venue: Arc<MockVenue>,
    notifier: Arc<BufferNotifier>,
    table: Arc<ConnectionStateTable>,
    cancel: CancellationToken,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn limits(standard_max: u32) -> RateLimitSettings {
    RateLimitSettings {
        key_mode: RateLimitKeyMode::PerOwner,
        strict: TierLimits {
            max_requests: 10,
            window: Duration::from_secs(60),
        },
        standard: TierLimits {
            max_requests: standard_max,
            window: Duration::from_secs(60),
        },
        relaxed: TierLimits {
            max_requests: 300,
            window: Duration::from_secs(60),
        },
    }
}

fn start(venue: Arc<MockVenue>, standard_max: u32) -> Harness {
    let cancel = CancellationToken::new();
    let vault = Arc::new(CredentialVault::new(&MasterKey::new([7; 32])));
    let registry = Arc::new(AccountRegistry::new());
    let limiter = Arc::new(RateLimiter::new(limits(standard_max)));
    let ledger = Arc::new(SignalLedger::new());
    let notifier = Arc::new(BufferNotifier::new());
    let table = Arc::new(ConnectionStateTable::new());

    let gateway_settings = GatewaySettings {
        call_timeout: Duration::from_millis(500),
        read_retry_attempts: 2,
        read_retry_initial: Duration::from_millis(5),
        ..GatewaySettings::default()
    };
    let gateway = Arc::new(ExecutionGateway::new(
        Arc::clone(&venue) as Arc<dyn VenueClient>,
        &gateway_settings,
    ));

    let (event_tx, event_rx) = mpsc::channel(64);
    tokio::spawn(run_event_intake(
        event_rx,
        Arc::clone(&table),
        cancel.clone(),
    ));

    let ctx = Arc::new(PipelineContext {
        limiter,
        registry: Arc::clone(&registry),
        vault: Arc::clone(&vault),
        gateway,
        ledger,
        notifier: Arc::clone(&notifier) as Arc<dyn signal_relay::Notifier>,
        events: event_tx,
    });

    let pipeline_settings = PipelineSettings {
        queue_capacity: 64,
        account_queue_capacity: 32,
        retention: Duration::from_secs(3600),
        event_capacity: 64,
    };
    let (pipeline, dispatcher) =
        SignalPipeline::new(Arc::clone(&ctx), &pipeline_settings, cancel.clone());
    tokio::spawn(dispatcher.run());

    Harness {
        pipeline: Arc::new(pipeline),
        registry,
        vault,
        venue,
        notifier,
        table,
        cancel,
    }
}

fn register_account(harness: &Harness, account_id: &str, owner: &str) {
    let credentials = TradeCredentials::new(
        account_id.to_string(),
        "Demo-Server".to_string(),
        "pw".to_string(),
    );
    let blob = harness.vault.seal(&credentials).unwrap();
    harness
        .registry
        .register(Account::new(account_id, owner, blob, false));
}

fn record(id: &str, owner: &str) -> SignalRecord {
    SignalRecord {
        id: Some(id.to_string()),
        kind: "open_buy".to_string(),
        instrument: "EURUSD".to_string(),
        volume: dec!(0.10),
        price: None,
        stop: Some(dec!(1.0800)),
        target: Some(dec!(1.0950)),
        ticket: None,
        owner: owner.to_string(),
        account_ref: None,
        comment: None,
        tag: None,
    }
}

async fn wait_terminal(pipeline: &SignalPipeline, id: &str) -> SignalStatus {
    for _ in 0..200 {
        if let Some(status) = pipeline.status(id) {
            if status.is_terminal() {
                return status;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("signal {id} did not reach a terminal status in time");
}

#[tokio::test]
async fn valid_signal_executes_with_ticket() {
    let harness = start(Arc::new(MockVenue::always_succeed()), 60);
    register_account(&harness, "8812345", "1001");

    let receipt = harness.pipeline.submit(record("sig-1", "1001")).await.unwrap();
    let status = wait_terminal(&harness.pipeline, &receipt.id).await;

    assert_eq!(status, SignalStatus::Executed);
    let result = harness.pipeline.result(&receipt.id).unwrap();
    assert!(result.success);
    assert!(result.ticket.is_some());

    // Owner got exactly one confirmation.
    let notices = harness.notifier.take();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].title.contains("executed"));
}

#[tokio::test]
async fn duplicate_id_is_rejected_without_second_result() {
    let harness = start(Arc::new(MockVenue::always_succeed()), 60);
    register_account(&harness, "8812345", "1001");

    harness.pipeline.submit(record("sig-dup", "1001")).await.unwrap();
    let err = harness
        .pipeline
        .submit(record("sig-dup", "1001"))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::DuplicateSignal(id) if id == "sig-dup"));

    wait_terminal(&harness.pipeline, "sig-dup").await;

    // One execution, one result.
    assert_eq!(harness.venue.execution_count(), 1);
    assert_eq!(harness.pipeline.totals().submitted, 1);
}

#[tokio::test]
async fn missing_account_fails_without_gateway_call() {
    let harness = start(Arc::new(MockVenue::always_succeed()), 60);
    // No account registered for this owner.

    let receipt = harness.pipeline.submit(record("sig-2", "9999")).await.unwrap();
    let status = wait_terminal(&harness.pipeline, &receipt.id).await;

    assert_eq!(status, SignalStatus::Failed);
    let result = harness.pipeline.result(&receipt.id).unwrap();
    assert_eq!(result.error_kind, Some(ErrorKind::NoActiveAccount));
    assert_eq!(harness.venue.execution_count(), 0);
}

#[tokio::test]
async fn validation_failures_are_synchronous_and_traceless() {
    let harness = start(Arc::new(MockVenue::always_succeed()), 60);

    let mut bad_volume = record("sig-3", "1001");
    bad_volume.volume = dec!(0);
    assert!(matches!(
        harness.pipeline.submit(bad_volume).await,
        Err(RelayError::Validation(_))
    ));

    let mut bad_kind = record("sig-4", "1001");
    bad_kind.kind = "yolo".to_string();
    assert!(matches!(
        harness.pipeline.submit(bad_kind).await,
        Err(RelayError::Validation(_))
    ));

    assert_eq!(harness.pipeline.totals().submitted, 0);
    assert!(harness.pipeline.status("sig-3").is_none());
}

#[tokio::test]
async fn same_account_signals_execute_in_submission_order() {
    let venue = Arc::new(MockVenue::always_succeed());
    venue.set_behavior(signal_relay::gateway::VenueBehavior::Delay(
        Duration::from_millis(5),
    ));
    let harness = start(Arc::clone(&venue), 60);
    register_account(&harness, "acct-a", "1001");
    register_account(&harness, "acct-b", "2002");

    // Interleave submissions across two accounts.
    let mut a_ids = Vec::new();
    let mut b_ids = Vec::new();
    for i in 0..5 {
        let a_id = format!("a-{i}");
        let b_id = format!("b-{i}");
        harness.pipeline.submit(record(&a_id, "1001")).await.unwrap();
        harness.pipeline.submit(record(&b_id, "2002")).await.unwrap();
        a_ids.push(a_id);
        b_ids.push(b_id);
    }

    for id in a_ids.iter().chain(&b_ids) {
        assert_eq!(wait_terminal(&harness.pipeline, id).await, SignalStatus::Executed);
    }

    // Per-account order matches submission order exactly.
    let executed = venue.executed_signal_ids();
    let a_order: Vec<&String> = executed.iter().filter(|id| id.starts_with("a-")).collect();
    let b_order: Vec<&String> = executed.iter().filter(|id| id.starts_with("b-")).collect();
    assert_eq!(a_order, a_ids.iter().collect::<Vec<_>>());
    assert_eq!(b_order, b_ids.iter().collect::<Vec<_>>());
}

#[tokio::test]
async fn over_limit_signals_are_rejected_with_no_execution() {
    let harness = start(Arc::new(MockVenue::always_succeed()), 2);
    register_account(&harness, "8812345", "1001");

    for i in 0..2 {
        let id = format!("ok-{i}");
        harness.pipeline.submit(record(&id, "1001")).await.unwrap();
        assert_eq!(wait_terminal(&harness.pipeline, &id).await, SignalStatus::Executed);
    }

    harness.pipeline.submit(record("denied", "1001")).await.unwrap();
    let status = wait_terminal(&harness.pipeline, "denied").await;

    assert_eq!(status, SignalStatus::Rejected);
    let result = harness.pipeline.result("denied").unwrap();
    assert_eq!(result.error_kind, Some(ErrorKind::RateLimitExceeded));
    assert_eq!(harness.venue.execution_count(), 2);
}

#[tokio::test]
async fn venue_rejection_fails_signal_without_feeding_supervisor() {
    let harness = start(Arc::new(MockVenue::rejecting("insufficient margin")), 60);
    register_account(&harness, "8812345", "1001");

    let receipt = harness.pipeline.submit(record("sig-rej", "1001")).await.unwrap();
    let status = wait_terminal(&harness.pipeline, &receipt.id).await;

    assert_eq!(status, SignalStatus::Failed);
    assert_eq!(
        harness.pipeline.result(&receipt.id).unwrap().error_kind,
        Some(ErrorKind::VenueRejected)
    );

    // Business rejections never count as connectivity failures.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.table.get("mock-venue").is_none());
}

#[tokio::test]
async fn transport_failure_feeds_the_supervisor() {
    let harness = start(Arc::new(MockVenue::unreachable("connection refused")), 60);
    register_account(&harness, "8812345", "1001");

    let receipt = harness.pipeline.submit(record("sig-net", "1001")).await.unwrap();
    let status = wait_terminal(&harness.pipeline, &receipt.id).await;

    assert_eq!(status, SignalStatus::Failed);
    assert_eq!(
        harness.pipeline.result(&receipt.id).unwrap().error_kind,
        Some(ErrorKind::Transport)
    );

    // The worker's transport report lands in the connection table.
    let mut failures = 0;
    for _ in 0..100 {
        if let Some(state) = harness.table.get("mock-venue") {
            failures = state.consecutive_failures;
            if failures > 0 {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(failures > 0, "transport failure was not reported");

    // Owner sees a degradation notice, not a raw transport error.
    let notices = harness.notifier.take();
    assert!(notices.iter().any(|n| n.body.contains("degraded")));
    assert!(!notices.iter().any(|n| n.body.contains("connection refused")));
}

#[tokio::test]
async fn cancellation_only_before_execution() {
    let harness = start(Arc::new(MockVenue::always_succeed()), 60);
    register_account(&harness, "8812345", "1001");

    // Executed signals cannot be cancelled.
    let receipt = harness.pipeline.submit(record("sig-done", "1001")).await.unwrap();
    wait_terminal(&harness.pipeline, &receipt.id).await;
    assert!(matches!(
        harness.pipeline.cancel(&receipt.id),
        Err(RelayError::NotCancellable(_))
    ));

    assert!(matches!(
        harness.pipeline.cancel("never-submitted"),
        Err(RelayError::UnknownSignal(_))
    ));
}

#[tokio::test]
async fn pending_signal_cancels_to_expired() {
    // No dispatcher here: the signal stays pending, as it would while
    // queued behind a slow account worker.
    let cancel = CancellationToken::new();
    let vault = Arc::new(CredentialVault::new(&MasterKey::new([7; 32])));
    let venue = Arc::new(MockVenue::always_succeed());
    let gateway = Arc::new(ExecutionGateway::new(
        Arc::clone(&venue) as Arc<dyn VenueClient>,
        &GatewaySettings::default(),
    ));
    let (event_tx, _event_rx) = mpsc::channel(8);
    let ctx = Arc::new(PipelineContext {
        limiter: Arc::new(RateLimiter::new(limits(60))),
        registry: Arc::new(AccountRegistry::new()),
        vault,
        gateway,
        ledger: Arc::new(SignalLedger::new()),
        notifier: Arc::new(BufferNotifier::new()) as Arc<dyn signal_relay::Notifier>,
        events: event_tx,
    });
    let (pipeline, _dispatcher) = SignalPipeline::new(
        ctx,
        &PipelineSettings {
            queue_capacity: 8,
            account_queue_capacity: 8,
            retention: Duration::from_secs(3600),
            event_capacity: 8,
        },
        cancel,
    );

    let receipt = pipeline.submit(record("sig-cancel", "1001")).await.unwrap();
    assert_eq!(pipeline.status(&receipt.id), Some(SignalStatus::Pending));

    pipeline.cancel(&receipt.id).unwrap();
    assert_eq!(pipeline.status(&receipt.id), Some(SignalStatus::Expired));

    let result = pipeline.result(&receipt.id).unwrap();
    assert!(!result.success);
    assert!(result.error_kind.is_none());
    assert_eq!(venue.execution_count(), 0);
}
