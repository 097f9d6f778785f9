//! Full pipeline: activity → issuance → reveal → expiry → cleanup, driven
//! through the engine façade exactly as the request layer would.

use std::sync::Arc;
use std::time::Duration;

use veilmint_engine::{
    ActivityKind, EngineConfig, EngineError, FixedPicker, ManualClock, MemoryStore, MintEngine,
    MockLedger,
};
use veilmint_primitives::{token_leaf, verify_inclusion, MerkleProof};

struct Harness {
    engine: Arc<MintEngine>,
    ledger: Arc<MockLedger>,
    clock: Arc<ManualClock>,
}

fn harness(config: EngineConfig, threshold: u64) -> Harness {
    let clock: Arc<ManualClock> = Arc::new(ManualClock::new(1_700_000_000));
    let ledger = Arc::new(MockLedger::new(clock.clone(), threshold));
    let engine = Arc::new(MintEngine::new(
        config,
        Arc::new(MemoryStore::new()),
        ledger.clone(),
        Arc::new(FixedPicker::new("ipfs://collection/item.json")),
        clock.clone(),
    ));
    Harness {
        engine,
        ledger,
        clock,
    }
}

#[tokio::test]
async fn issue_reveal_expire_cleanup_cycle() {
    let fx = harness(EngineConfig::default(), 300);

    // First activity issues a batch whose root lands on the ledger.
    let outcome = fx.engine.trigger_activity("0xAbCd01").await.unwrap();
    assert_eq!(outcome.kind, ActivityKind::First);
    let batch = outcome.issued.expect("first activity issues");
    assert_eq!(fx.ledger.committed_roots(), vec![batch.root]);

    // Every identifier of the batch reveals with a proof the ledger-side
    // verifier would accept against the committed root.
    for id in batch.range.ids() {
        let bundle = fx.engine.request_reveal("0xabcd01", id).await.unwrap();
        assert_eq!(bundle.root_ref, batch.ledger_seq);
        assert_eq!(bundle.uri, "ipfs://collection/item.json");
        let proof = MerkleProof {
            siblings: bundle.proof,
        };
        assert!(verify_inclusion(&batch.root, &token_leaf(id), &proof));
    }

    // Past the window the batch stops revealing, and a cleanup pass
    // reclaims both the record and its metadata.
    fx.clock.advance(301);
    assert!(matches!(
        fx.engine.request_reveal("0xabcd01", batch.range.start_id).await,
        Err(EngineError::Expired { .. })
    ));
    let report = fx.engine.run_global_cleanup().await.unwrap();
    assert_eq!(report.batches_removed, 1);
    assert_eq!(report.metadata_removed, batch.range.count as usize);
    assert!(matches!(
        fx.engine.request_reveal("0xabcd01", batch.range.start_id).await,
        Err(EngineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn steady_cadence_keeps_issuing_disjoint_ranges() {
    let config = EngineConfig {
        mint_interval: 60,
        ..EngineConfig::default()
    };
    let fx = harness(config, 10_000);

    fx.engine.trigger_activity("carol").await.unwrap();

    // Heartbeats alone never re-issue.
    fx.clock.advance(30);
    fx.engine.trigger_activity("carol").await.unwrap();
    assert_eq!(fx.ledger.committed_roots().len(), 1);

    // The cadence ticks are what keep a continuously-active account
    // supplied, one batch per elapsed interval.
    for _ in 0..3 {
        fx.clock.advance(60);
        assert_eq!(fx.engine.run_cadence_check().await.unwrap(), 1);
    }
    assert_eq!(fx.ledger.committed_roots().len(), 4);

    let batches = fx.engine.list_batches("carol").await.unwrap();
    assert_eq!(batches.len(), 4);
    for pair in batches.windows(2) {
        assert_eq!(pair[0].range.end_exclusive(), pair[1].range.start_id);
    }
}

#[tokio::test]
async fn ledger_history_positions_stay_stable_across_cleanup() {
    let fx = harness(EngineConfig::default(), 120);

    let first = fx
        .engine
        .trigger_activity("alice")
        .await
        .unwrap()
        .issued
        .expect("issued");
    fx.clock.advance(100);
    let second = fx
        .engine
        .trigger_activity("bob")
        .await
        .unwrap()
        .issued
        .expect("issued");
    assert_eq!(first.ledger_seq, 0);
    assert_eq!(second.ledger_seq, 1);

    // Expire the first batch; the second's reveal still references ledger
    // position 1 even though it is now the only local record.
    fx.clock.advance(30);
    let report = fx.engine.run_global_cleanup().await.unwrap();
    assert_eq!(report.batches_removed, 1);
    let bundle = fx
        .engine
        .request_reveal("bob", second.range.start_id)
        .await
        .unwrap();
    assert_eq!(bundle.root_ref, 1);
}

#[tokio::test]
async fn legacy_batches_without_commit_time_are_swept_not_kept() {
    use veilmint_engine::{Batch, Owner, StateStore, TokenRange};

    // A store migrated from an older deployment: one record has no commit
    // time (deserialized as zero). It must be reclaimed on the first pass,
    // not live forever.
    let store = Arc::new(MemoryStore::new());
    store
        .save_batches(vec![Batch {
            owner: Owner::new("alice"),
            range: TokenRange {
                start_id: 1,
                count: 5,
            },
            root: [1u8; 32],
            committed_at: 0,
            ledger_seq: 0,
        }])
        .await
        .unwrap();

    let clock: Arc<ManualClock> = Arc::new(ManualClock::new(1_700_000_000));
    let ledger = Arc::new(MockLedger::new(clock.clone(), 1_000_000));
    let engine = MintEngine::new(
        EngineConfig::default(),
        store,
        ledger,
        Arc::new(FixedPicker::new("ipfs://x")),
        clock,
    );

    let report = engine.run_global_cleanup().await.unwrap();
    assert_eq!(report.batches_removed, 1);
    assert!(engine.list_batches("alice").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn background_loops_sweep_while_requests_flow() {
    let config = EngineConfig {
        cleanup_interval: Duration::from_millis(20),
        cadence_check_interval: Duration::from_millis(20),
        reap_interval: Duration::from_millis(20),
        mint_interval: 1_000_000,
        ..EngineConfig::default()
    };
    let fx = harness(config, 50);

    let batch = fx
        .engine
        .trigger_activity("alice")
        .await
        .unwrap()
        .issued
        .expect("issued");
    let tasks = fx.engine.spawn_background_tasks();

    // Expire the batch under the running loops; the sweep removes it and a
    // racing reveal fails cleanly rather than returning deleted data.
    fx.clock.advance(100);
    tokio::time::sleep(Duration::from_millis(120)).await;
    let result = fx.engine.request_reveal("alice", batch.range.start_id).await;
    assert!(matches!(
        result,
        Err(EngineError::Expired { .. } | EngineError::NotFound { .. })
    ));
    assert!(fx.engine.list_batches("alice").await.unwrap().is_empty());

    tasks.shutdown();
}
