use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fjall::Keyspace;
use tempfile::TempDir;
use tokio::sync::watch;
use uuid::Uuid;

use linguabox::EngineError;
use linguabox::jobs::{
    ChunkOutcome, CreateJobRequest, EngineContext, EngineSettings, FjallJobStore, JobOrchestrator,
    JobStatus, RefundReason, TranslationJob,
};
use linguabox::ledger::{EntryKind, FjallLedger, LedgerEntry, LedgerStore, Page, UserId, open_keyspace};
use linguabox::observability::Metrics;
use linguabox::storage::StorageClient;
use linguabox::worker::{
    ChunkProcessor, ChunkRequest, ChunkTranslation, ProviderError, WorkerSettings,
};

/// What the scripted provider does for a chunk
#[derive(Debug, Clone, Copy)]
enum Step {
    Succeed,
    Reject,
    /// Wait for the gate, then succeed
    GatedSucceed,
    /// Wait for the gate, then fail transiently
    GatedTransient,
}

struct ScriptedProvider {
    default: Step,
    overrides: HashMap<u32, Step>,
    tokens: (u64, u64),
    gate: watch::Receiver<bool>,
}

#[async_trait]
impl ChunkProcessor for ScriptedProvider {
    async fn process(&self, request: &ChunkRequest) -> Result<ChunkTranslation, ProviderError> {
        let step = self
            .overrides
            .get(&request.chunk_index)
            .copied()
            .unwrap_or(self.default);

        if matches!(step, Step::GatedSucceed | Step::GatedTransient) {
            let mut gate = self.gate.clone();
            let _ = gate.wait_for(|open| *open).await;
        }

        match step {
            Step::Reject => Err(ProviderError::Permanent("content rejected".into())),
            Step::GatedTransient => Err(ProviderError::Transient("rate limited".into())),
            Step::Succeed | Step::GatedSucceed => Ok(ChunkTranslation {
                translated_text: format!("chunk-{}", request.chunk_index),
                tokens_in: self.tokens.0,
                tokens_out: self.tokens.1,
            }),
        }
    }
}

/// Orchestrator and ledger over one keyspace
fn engine(
    keyspace: &Keyspace,
    storage: Arc<StorageClient>,
    processor: ScriptedProvider,
    settings: EngineSettings,
) -> (JobOrchestrator, Arc<FjallLedger>) {
    let ledger = Arc::new(FjallLedger::with_keyspace(keyspace.clone()).unwrap());
    let jobs = Arc::new(FjallJobStore::with_keyspace(keyspace).unwrap());
    let orchestrator = JobOrchestrator::new(EngineContext {
        ledger: ledger.clone(),
        jobs,
        processor: Arc::new(processor),
        storage,
        metrics: Arc::new(Metrics::new()),
        settings,
    });
    (orchestrator, ledger)
}

async fn wait_for(
    orchestrator: &JobOrchestrator,
    job_id: Uuid,
    done: impl Fn(&TranslationJob) -> bool,
) -> TranslationJob {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let job = orchestrator.get_job(job_id).await.unwrap();
            if done(&job) {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not reach the expected state in time")
}

struct Harness {
    orchestrator: JobOrchestrator,
    ledger: Arc<FjallLedger>,
    gate: watch::Sender<bool>,
    keyspace: Keyspace,
    storage: Arc<StorageClient>,
    settings: EngineSettings,
    _temp_dir: TempDir,
}

impl Harness {
    fn new(
        settings: EngineSettings,
        default: Step,
        overrides: &[(u32, Step)],
        tokens: (u64, u64),
    ) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let keyspace = open_keyspace(temp_dir.path().join("data")).unwrap();
        let storage = Arc::new(StorageClient::in_memory());

        let (gate, gate_rx) = watch::channel(false);
        let processor = ScriptedProvider {
            default,
            overrides: overrides.iter().copied().collect(),
            tokens,
            gate: gate_rx,
        };
        let (orchestrator, ledger) = engine(&keyspace, storage.clone(), processor, settings.clone());

        Self {
            orchestrator,
            ledger,
            gate,
            keyspace,
            storage,
            settings,
            _temp_dir: temp_dir,
        }
    }

    /// A fresh engine over the same data, as after a process restart.
    ///
    /// The first engine's gate stays closed, so its gated workers never
    /// report.
    fn restart(
        &self,
        storage: Arc<StorageClient>,
        default: Step,
        tokens: (u64, u64),
    ) -> (JobOrchestrator, Arc<FjallLedger>) {
        let processor = ScriptedProvider {
            default,
            overrides: HashMap::new(),
            tokens,
            gate: watch::channel(true).1,
        };
        engine(&self.keyspace, storage, processor, self.settings.clone())
    }

    fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    async fn history(&self, user: &UserId) -> Vec<LedgerEntry> {
        self.ledger.history(user, Page::default()).await.unwrap()
    }

    async fn wait_for(
        &self,
        job_id: Uuid,
        done: impl Fn(&TranslationJob) -> bool,
    ) -> TranslationJob {
        wait_for(&self.orchestrator, job_id, done).await
    }
}

/// Billing at 1 credit per thousand tokens, chunks of up to 15000 chars
fn flat_rate_settings() -> EngineSettings {
    EngineSettings {
        rate_per_thousand: 1,
        max_chunk_chars: 15_000,
        ..EngineSettings::default()
    }
}

/// Four paragraphs of 14900 chars: 29804 estimated tokens, 4 chunks
fn four_chunk_document() -> String {
    vec!["x".repeat(14_900); 4].join("\n\n")
}

fn request(document: String) -> CreateJobRequest {
    CreateJobRequest {
        source_lang: "en".to_string(),
        target_lang: "id".to_string(),
        output_format: "docx".to_string(),
        document,
        idempotency_key: None,
    }
}

#[tokio::test]
async fn test_completed_job_returns_unused_reservation() {
    let h = Harness::new(flat_rate_settings(), Step::Succeed, &[], (2750, 2750));
    let user = UserId::new("alice");
    h.ledger.topup(&user, 100, None, None).await.unwrap();

    let job = h
        .orchestrator
        .create_job(&user, request(four_chunk_document()))
        .await
        .unwrap();
    assert_eq!(job.reserved_amount, 30);
    assert_eq!(job.total_chunks, 4);

    let done = h.wait_for(job.id, |j| j.status.is_terminal()).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.processed_chunks, 4);
    assert_eq!(done.token_act_in, Some(11_000));
    assert_eq!(done.token_act_out, Some(11_000));

    // 22000 actual tokens cost 22 of the 30 reserved
    assert_eq!(h.ledger.balance(&user).await.unwrap(), 78);
    let history = h.history(&user).await;
    let kinds: Vec<_> = history.iter().map(|e| (e.kind, e.amount)).collect();
    assert_eq!(
        kinds,
        vec![
            (EntryKind::Adjust, 8),
            (EntryKind::Reserve, -30),
            (EntryKind::Topup, 100),
        ]
    );

    let account = h.orchestrator.refunds().account(&done).await.unwrap();
    assert_eq!(account.reserved, 30);
    assert_eq!(account.adjusted, 8);
    assert_eq!(account.refunded, 0);
    assert_eq!(account.consumed(), 22);

    let (_, output) = h.orchestrator.download_output(&user, job.id).await.unwrap();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "chunk-0\n\nchunk-1\n\nchunk-2\n\nchunk-3"
    );
}

#[tokio::test]
async fn test_failure_over_threshold_refunds_everything_once() {
    let h = Harness::new(
        flat_rate_settings(),
        Step::GatedSucceed,
        &[(3, Step::Reject)],
        (2750, 2750),
    );
    let user = UserId::new("alice");
    h.ledger.topup(&user, 100, None, None).await.unwrap();

    let job = h
        .orchestrator
        .create_job(&user, request(four_chunk_document()))
        .await
        .unwrap();

    // One failed chunk out of four is over the 10% threshold
    let failed = h.wait_for(job.id, |j| j.status.is_terminal()).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.failed_chunks, 1);
    assert!(failed.error_message.as_deref().unwrap().contains("1 of 4"));
    assert_eq!(h.ledger.balance(&user).await.unwrap(), 100);
    assert_eq!(h.orchestrator.active_jobs(), 0);

    // Chunks finishing after the failure change nothing
    h.open_gate();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let after = h.orchestrator.get_job(job.id).await.unwrap();
    assert_eq!(after.status, JobStatus::Failed);
    assert_eq!(after.processed_chunks, failed.processed_chunks);
    assert_eq!(h.ledger.balance(&user).await.unwrap(), 100);

    let refunds: Vec<_> = h
        .history(&user)
        .await
        .into_iter()
        .filter(|e| e.kind == EntryKind::Refund)
        .collect();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].amount, 30);
    assert_eq!(refunds[0].note.as_deref(), Some("job_failed"));
}

#[tokio::test]
async fn test_insufficient_credits_persists_nothing() {
    let h = Harness::new(flat_rate_settings(), Step::Succeed, &[], (10, 10));
    let user = UserId::new("alice");
    h.ledger.topup(&user, 5, None, None).await.unwrap();

    let err = h
        .orchestrator
        .create_job(&user, request(four_chunk_document()))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            EngineError::InsufficientCredits {
                required: 30,
                available: 5
            }
        ),
        "got {err:?}"
    );

    assert_eq!(h.ledger.balance(&user).await.unwrap(), 5);
    let history = h.history(&user).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, EntryKind::Topup);
    assert_eq!(h.orchestrator.active_jobs(), 0);
}

#[tokio::test]
async fn test_cancel_refunds_unprocessed_share() {
    let settings = EngineSettings {
        worker: WorkerSettings {
            base_backoff_ms: 60_000,
            ..WorkerSettings::default()
        },
        ..flat_rate_settings()
    };
    let h = Harness::new(
        settings,
        Step::Succeed,
        &[(2, Step::GatedTransient), (3, Step::GatedTransient)],
        (2750, 2750),
    );
    let user = UserId::new("alice");
    h.ledger.topup(&user, 100, None, None).await.unwrap();

    let job = h
        .orchestrator
        .create_job(&user, request(four_chunk_document()))
        .await
        .unwrap();
    h.wait_for(job.id, |j| j.processed_chunks == 2).await;

    // Remaining chunks fail once and sit in a long backoff
    h.open_gate();
    let cancelled = h.orchestrator.cancel(job.id).await.unwrap();

    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert_eq!(cancelled.processed_chunks, 2);
    assert_eq!(cancelled.failed_chunks, 0);
    // floor(30 * 2 / 4)
    assert_eq!(h.ledger.balance(&user).await.unwrap(), 85);
    assert_eq!(h.orchestrator.active_jobs(), 0);

    let refund = h
        .history(&user)
        .await
        .into_iter()
        .find(|e| e.kind == EntryKind::Refund)
        .unwrap();
    assert_eq!(refund.amount, 15);
    assert_eq!(refund.note.as_deref(), Some("cancelled"));

    let err = h.orchestrator.cancel(job.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: JobStatus::Cancelled,
            to: JobStatus::Cancelled
        }
    ));
}

#[tokio::test]
async fn test_cancel_completed_job_is_rejected() {
    let h = Harness::new(flat_rate_settings(), Step::Succeed, &[], (2750, 2750));
    let user = UserId::new("alice");
    h.ledger.topup(&user, 100, None, None).await.unwrap();

    let job = h
        .orchestrator
        .create_job(&user, request(four_chunk_document()))
        .await
        .unwrap();
    h.wait_for(job.id, |j| j.status == JobStatus::Completed).await;

    let err = h.orchestrator.cancel(job.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
    assert_eq!(h.ledger.balance(&user).await.unwrap(), 78);
}

#[tokio::test]
async fn test_create_with_same_idempotency_key_reserves_once() {
    let h = Harness::new(flat_rate_settings(), Step::GatedSucceed, &[], (10, 10));
    let user = UserId::new("alice");
    h.ledger.topup(&user, 100, None, None).await.unwrap();

    let keyed = || CreateJobRequest {
        idempotency_key: Some("upload-1".to_string()),
        ..request(four_chunk_document())
    };
    let first = h.orchestrator.create_job(&user, keyed()).await.unwrap();
    let second = h.orchestrator.create_job(&user, keyed()).await.unwrap();
    assert_eq!(first.id, second.id);

    // Another user may reuse the key
    let bob = UserId::new("bob");
    h.ledger.topup(&bob, 100, None, None).await.unwrap();
    let other = h.orchestrator.create_job(&bob, keyed()).await.unwrap();
    assert_ne!(other.id, first.id);

    let reserves = h
        .history(&user)
        .await
        .into_iter()
        .filter(|e| e.kind == EntryKind::Reserve)
        .count();
    assert_eq!(reserves, 1);
    assert_eq!(h.ledger.balance(&user).await.unwrap(), 70);

    h.open_gate();
}

#[tokio::test]
async fn test_duplicate_chunk_report_counts_once() {
    let h = Harness::new(
        EngineSettings {
            max_chunk_chars: 12,
            ..EngineSettings::default()
        },
        Step::GatedSucceed,
        &[],
        (0, 0),
    );
    let user = UserId::new("alice");
    h.ledger.topup(&user, 100, None, None).await.unwrap();

    let job = h
        .orchestrator
        .create_job(&user, request("First part.\n\nSecond part.".to_string()))
        .await
        .unwrap();
    assert_eq!(job.total_chunks, 2);

    let report = || ChunkOutcome::Succeeded {
        translated_text: "Bagian pertama.".to_string(),
        tokens_in: 100,
        tokens_out: 100,
    };
    let once = h.orchestrator.process_chunk(job.id, 0, report()).await.unwrap();
    let twice = h.orchestrator.process_chunk(job.id, 0, report()).await.unwrap();
    assert_eq!(once.processed_chunks, 1);
    assert_eq!(twice.processed_chunks, 1);
    assert_eq!(twice.version, once.version);

    let err = h
        .orchestrator
        .process_chunk(job.id, 2, report())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let done = h
        .orchestrator
        .process_chunk(
            job.id,
            1,
            ChunkOutcome::Succeeded {
                translated_text: "Bagian kedua.".to_string(),
                tokens_in: 100,
                tokens_out: 100,
            },
        )
        .await
        .unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.token_act_in, Some(200));

    // 400 tokens cost the 10 reserved, nothing comes back
    assert_eq!(h.ledger.balance(&user).await.unwrap(), 90);
    let account = h.orchestrator.refunds().account(&done).await.unwrap();
    assert_eq!(account.consumed(), 10);

    let (_, output) = h.orchestrator.download_output(&user, job.id).await.unwrap();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "Bagian pertama.\n\nBagian kedua."
    );

    // Workers finishing late are ignored
    h.open_gate();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.ledger.balance(&user).await.unwrap(), 90);
}

#[tokio::test]
async fn test_concurrent_creates_cannot_overdraw() {
    let h = Harness::new(flat_rate_settings(), Step::GatedSucceed, &[], (10, 10));
    let user = UserId::new("alice");
    h.ledger.topup(&user, 100, None, None).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let orchestrator = h.orchestrator.clone();
        let user = user.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .create_job(&user, request(four_chunk_document()))
                .await
        }));
    }

    let mut accepted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(EngineError::InsufficientCredits { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }

    assert_eq!(accepted, 3);
    assert_eq!(rejected, 2);
    assert_eq!(h.ledger.balance(&user).await.unwrap(), 10);

    h.open_gate();
}

#[tokio::test]
async fn test_report_on_unknown_job() {
    let h = Harness::new(EngineSettings::default(), Step::Succeed, &[], (1, 1));
    let err = h
        .orchestrator
        .process_chunk(
            Uuid::now_v7(),
            0,
            ChunkOutcome::Failed {
                error: ProviderError::Transient("lost".into()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn test_running_job_resumes_after_restart() {
    let h = Harness::new(
        flat_rate_settings(),
        Step::Succeed,
        &[(2, Step::GatedSucceed), (3, Step::GatedSucceed)],
        (2750, 2750),
    );
    let user = UserId::new("alice");
    h.ledger.topup(&user, 100, None, None).await.unwrap();

    let job = h
        .orchestrator
        .create_job(&user, request(four_chunk_document()))
        .await
        .unwrap();
    h.wait_for(job.id, |j| j.processed_chunks == 2).await;

    let (revived, ledger) = h.restart(h.storage.clone(), Step::Succeed, (2750, 2750));
    assert_eq!(revived.recover().await.unwrap(), 1);

    let done = wait_for(&revived, job.id, |j| j.status.is_terminal()).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.processed_chunks, 4);
    assert_eq!(done.token_act_in, Some(11_000));
    assert_eq!(ledger.balance(&user).await.unwrap(), 78);

    let (_, output) = revived.download_output(&user, job.id).await.unwrap();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "chunk-0\n\nchunk-1\n\nchunk-2\n\nchunk-3"
    );

    // Nothing left to pick up
    assert_eq!(revived.recover().await.unwrap(), 0);
}

#[tokio::test]
async fn test_job_without_source_fails_on_restart() {
    let h = Harness::new(flat_rate_settings(), Step::GatedSucceed, &[], (10, 10));
    let user = UserId::new("alice");
    h.ledger.topup(&user, 100, None, None).await.unwrap();

    let job = h
        .orchestrator
        .create_job(&user, request(four_chunk_document()))
        .await
        .unwrap();
    assert_eq!(h.ledger.balance(&user).await.unwrap(), 70);

    // Restart against storage that lost the source document
    let (revived, ledger) = h.restart(
        Arc::new(StorageClient::in_memory()),
        Step::Succeed,
        (10, 10),
    );
    assert_eq!(revived.recover().await.unwrap(), 1);

    let failed = revived.get_job(job.id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(
        failed
            .error_message
            .as_deref()
            .unwrap()
            .contains("could not resume")
    );
    assert_eq!(ledger.balance(&user).await.unwrap(), 100);
    assert_eq!(revived.active_jobs(), 0);
}

#[tokio::test]
async fn test_failure_below_threshold_keeps_running_then_refunds_unused() {
    // 20 chunks of 100 chars: 1020 estimated tokens, 20 credits reserved
    let settings = EngineSettings {
        max_chunk_chars: 150,
        worker: WorkerSettings {
            worker_concurrency: 32,
            per_job_concurrency: 32,
            ..WorkerSettings::default()
        },
        ..EngineSettings::default()
    };
    let h = Harness::new(settings, Step::GatedSucceed, &[(7, Step::Reject)], (20, 20));
    let user = UserId::new("alice");
    h.ledger.topup(&user, 100, None, None).await.unwrap();

    let document = vec!["x".repeat(100); 20].join("\n\n");
    let job = h.orchestrator.create_job(&user, request(document)).await.unwrap();
    assert_eq!(job.total_chunks, 20);
    assert_eq!(job.reserved_amount, 20);

    // 1 of 20 is under the 10% threshold
    let running = h.wait_for(job.id, |j| j.failed_chunks == 1).await;
    assert_eq!(running.status, JobStatus::Running);
    assert_eq!(h.orchestrator.active_jobs(), 1);

    h.open_gate();
    let failed = h.wait_for(job.id, |j| j.status.is_terminal()).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.processed_chunks, 19);
    assert!(failed.error_message.as_deref().unwrap().contains("1 of 20"));

    // 19 * 40 = 760 tokens cost 10 of the 20 reserved
    assert_eq!(h.ledger.balance(&user).await.unwrap(), 90);
    let refunds: Vec<_> = h
        .history(&user)
        .await
        .into_iter()
        .filter(|e| e.kind == EntryKind::Refund)
        .collect();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].amount, 10);
    assert_eq!(refunds[0].note.as_deref(), Some("job_failed"));

    let account = h.orchestrator.refunds().account(&failed).await.unwrap();
    assert_eq!(account.reserved, 20);
    assert_eq!(account.refunded, 10);
    assert_eq!(account.adjusted, 0);
    assert_eq!(account.consumed(), 10);
}

#[tokio::test]
async fn test_chunk_finishing_during_cancel_is_counted() {
    let settings = EngineSettings {
        worker: WorkerSettings {
            base_backoff_ms: 60_000,
            ..WorkerSettings::default()
        },
        ..flat_rate_settings()
    };
    let h = Harness::new(
        settings,
        Step::Succeed,
        &[(2, Step::GatedSucceed), (3, Step::GatedTransient)],
        (2750, 2750),
    );
    let user = UserId::new("alice");
    h.ledger.topup(&user, 100, None, None).await.unwrap();

    let job = h
        .orchestrator
        .create_job(&user, request(four_chunk_document()))
        .await
        .unwrap();
    h.wait_for(job.id, |j| j.processed_chunks == 2).await;

    let cancel = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.cancel(job.id).await })
    };

    // Cancel waits for the calls already in flight
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!cancel.is_finished());

    h.open_gate();
    let cancelled = cancel.await.unwrap().unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert_eq!(cancelled.processed_chunks, 3);
    assert_eq!(cancelled.failed_chunks, 0);

    // floor(30 * 1 / 4)
    assert_eq!(h.ledger.balance(&user).await.unwrap(), 77);
    let refund = h
        .history(&user)
        .await
        .into_iter()
        .find(|e| e.kind == EntryKind::Refund)
        .unwrap();
    assert_eq!(refund.amount, 7);
}

#[tokio::test]
async fn test_interrupted_cancel_settles_as_cancelled() {
    let h = Harness::new(
        EngineSettings {
            max_chunk_chars: 12,
            ..EngineSettings::default()
        },
        Step::GatedSucceed,
        &[],
        (0, 0),
    );
    let user = UserId::new("alice");
    h.ledger.topup(&user, 100, None, None).await.unwrap();

    let job = h
        .orchestrator
        .create_job(&user, request("First part.\n\nSecond part.".to_string()))
        .await
        .unwrap();
    assert_eq!(job.reserved_amount, 10);

    // A cancel that returned credit but never wrote its status
    h.orchestrator
        .refunds()
        .issue(&job, 5, RefundReason::Cancelled)
        .await
        .unwrap();

    let report = |text: &str| ChunkOutcome::Succeeded {
        translated_text: text.to_string(),
        tokens_in: 0,
        tokens_out: 0,
    };
    h.orchestrator
        .process_chunk(job.id, 0, report("Bagian pertama."))
        .await
        .unwrap();
    let done = h
        .orchestrator
        .process_chunk(job.id, 1, report("Bagian kedua."))
        .await
        .unwrap();

    assert_eq!(done.status, JobStatus::Cancelled);
    assert_eq!(done.error_message.as_deref(), Some("cancelled by user"));
    assert_eq!(h.ledger.balance(&user).await.unwrap(), 95);
    let history = h.history(&user).await;
    assert!(history.iter().all(|e| e.kind != EntryKind::Adjust));

    h.open_gate();
}

#[tokio::test]
async fn test_huge_token_counts_are_capped_at_reservation() {
    let h = Harness::new(
        EngineSettings {
            max_chunk_chars: 12,
            ..EngineSettings::default()
        },
        Step::Succeed,
        &[],
        (u64::MAX, u64::MAX),
    );
    let user = UserId::new("alice");
    h.ledger.topup(&user, 100, None, None).await.unwrap();

    let job = h
        .orchestrator
        .create_job(&user, request("First part.\n\nSecond part.".to_string()))
        .await
        .unwrap();

    let done = h.wait_for(job.id, |j| j.status.is_terminal()).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.token_act_in, Some(u64::MAX));
    assert_eq!(h.ledger.balance(&user).await.unwrap(), 90);
}
