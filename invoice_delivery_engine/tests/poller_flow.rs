//! End-to-end exercises of the polling engine against the in-memory gateway and a real on-disk store.
use std::{
    future::Future,
    path::PathBuf,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use invoice_delivery_engine::{
    events::{DeliveryHooks, InvoiceReadyEvent},
    gateway::MemoryGateway,
    registry::ExpectedInvoiceRegistry,
    store::InvoiceStore,
    types::{InvoiceRecord, MaxRetries, OrderData, S3Metadata},
    PollerConfig, PollingEngine,
};

const PDF_BYTES: &[u8] = b"%PDF-1.4\nGame invoice body";

struct Harness {
    gateway: MemoryGateway,
    store: InvoiceStore,
    registry: ExpectedInvoiceRegistry,
    engine: PollingEngine,
    delivered: Arc<Mutex<Vec<InvoiceReadyEvent>>>,
    expired: Arc<Mutex<Vec<String>>>,
    /// What the delivery hook reports back to the engine: true = a live session got the frame.
    session_live: Arc<AtomicBool>,
}

async fn harness(max_retries: MaxRetries) -> Harness {
    let _ = env_logger::try_init();
    let gateway = MemoryGateway::new("game-invoices");
    let dir: PathBuf = std::env::temp_dir().join(format!("gig_poller_test_{}", rand::random::<u64>()));
    let store = InvoiceStore::new(dir).await.unwrap();
    let registry = ExpectedInvoiceRegistry::new();

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let expired = Arc::new(Mutex::new(Vec::new()));
    let session_live = Arc::new(AtomicBool::new(true));

    let mut hooks = DeliveryHooks::default();
    let sink = delivered.clone();
    let live = session_live.clone();
    hooks.on_invoice_ready(move |event| {
        let sink = sink.clone();
        let live = live.clone();
        Box::pin(async move {
            sink.lock().unwrap().push(event);
            live.load(Ordering::SeqCst)
        }) as Pin<Box<dyn Future<Output = bool> + Send>>
    });
    let expired_sink = expired.clone();
    hooks.on_registration_expired(move |entry| {
        let expired_sink = expired_sink.clone();
        Box::pin(async move {
            expired_sink.lock().unwrap().push(entry.po_number.as_str().to_string());
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });

    let engine = PollingEngine::new(
        Arc::new(gateway.clone()),
        store.clone(),
        registry.clone(),
        hooks,
        PollerConfig { max_retries, ..Default::default() },
    );
    Harness { gateway, store, registry, engine, delivered, expired, session_live }
}

fn summary_json(total: i64) -> OrderData {
    OrderData { summary: Some(serde_json::json!({ "total": total })), ..Default::default() }
}

#[tokio::test]
async fn happy_path_processes_persists_and_delivers() {
    let h = harness(MaxRetries::Unlimited).await;
    h.registry.register("1030".into(), "alice".into(), summary_json(50));
    h.gateway.put_object("invoice_1030.pdf", PDF_BYTES.to_vec());

    let summary = h.engine.run_tick().await.unwrap();
    assert_eq!(summary.processed, vec!["1030".into()]);
    assert!(summary.renotified.is_empty());

    // The record is on disk, carries the original bytes, and the registration is gone.
    let record = h.store.get(&"1030".into()).await.unwrap();
    assert_eq!(BASE64.decode(&record.base64_data).unwrap(), PDF_BYTES);
    assert_eq!(record.file_size as usize, PDF_BYTES.len());
    assert_eq!(record.player_id, Some("alice".into()));
    assert_eq!(record.summary.as_ref().unwrap()["total"], 50);
    assert!(h.registry.is_empty());

    let delivered = h.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].record.invoice_number.as_str(), "1030");
    assert!(!delivered[0].renotified);
}

#[tokio::test]
async fn unsolicited_objects_are_never_touched() {
    let h = harness(MaxRetries::Unlimited).await;
    // Something else is expected, so the scan actually runs; 9999 is not.
    h.registry.register("1111".into(), "bob".into(), OrderData::default());
    h.gateway.put_object("invoice_9999.pdf", PDF_BYTES.to_vec());

    for _ in 0..3 {
        h.engine.run_tick().await.unwrap();
    }
    assert_eq!(h.gateway.fetch_count("invoice_9999.pdf"), 0);
    assert!(!h.store.has(&"9999".into()));
    assert!(h.delivered.lock().unwrap().is_empty());
    // The unrelated registration is still waiting.
    assert!(h.registry.lookup(&"1111".into()).is_some());
}

#[tokio::test]
async fn empty_registry_gates_the_scan() {
    let h = harness(MaxRetries::Unlimited).await;
    h.gateway.put_object("invoice_1030.pdf", PDF_BYTES.to_vec());
    let summary = h.engine.run_tick().await.unwrap();
    assert_eq!(summary.listed, 0);
    assert_eq!(h.gateway.fetch_count("invoice_1030.pdf"), 0);
}

#[tokio::test]
async fn duplicate_registration_delivers_to_the_latest_player() {
    let h = harness(MaxRetries::Unlimited).await;
    h.registry.register("1030".into(), "alice".into(), summary_json(50));
    h.registry.register("1030".into(), "bob".into(), summary_json(75));
    h.gateway.put_object("1030.pdf", PDF_BYTES.to_vec());

    h.engine.run_tick().await.unwrap();
    let delivered = h.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].record.player_id, Some("bob".into()));
}

#[tokio::test]
async fn offline_player_still_gets_a_persisted_record() {
    let h = harness(MaxRetries::Unlimited).await;
    h.session_live.store(false, Ordering::SeqCst);
    h.registry.register("2001".into(), "carol".into(), OrderData::default());
    h.gateway.put_object("invoice_2001.pdf", PDF_BYTES.to_vec());

    h.engine.run_tick().await.unwrap();

    // Delivery found no session, but the record is durable and the registration is retired anyway.
    assert_eq!(h.delivered.lock().unwrap().len(), 1);
    assert!(h.registry.is_empty());
    let record = h.store.get(&"2001".into()).await.unwrap();
    assert_eq!(BASE64.decode(&record.base64_data).unwrap(), PDF_BYTES);
}

#[tokio::test]
async fn already_processed_invoices_are_renotified_without_a_fetch() {
    let h = harness(MaxRetries::Unlimited).await;
    // Simulate a record written by a previous process lifetime.
    let prior = InvoiceRecord {
        invoice_number: "1030".into(),
        player_id: Some("alice".into()),
        base64_data: BASE64.encode(PDF_BYTES),
        filename: "invoice_1030.pdf".to_string(),
        file_size: PDF_BYTES.len() as u64,
        processed_at: chrono::Utc::now(),
        s3_metadata: S3Metadata::default(),
        summary: None,
        saved_at: None,
        file_path: None,
    };
    h.store.put(&prior).await.unwrap();

    h.registry.register("1030".into(), "alice".into(), summary_json(50));
    h.gateway.put_object("invoice_1030.pdf", PDF_BYTES.to_vec());

    let summary = h.engine.run_tick().await.unwrap();
    assert_eq!(summary.renotified, vec!["1030".into()]);
    assert!(summary.processed.is_empty());
    assert_eq!(h.gateway.fetch_count("invoice_1030.pdf"), 0);
    assert!(h.registry.is_empty());

    let delivered = h.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0].renotified);
}

#[tokio::test]
async fn two_objects_for_one_po_process_once() {
    let h = harness(MaxRetries::Unlimited).await;
    h.registry.register("1030".into(), "alice".into(), OrderData::default());
    h.gateway.put_object("1030.pdf", PDF_BYTES.to_vec());
    h.gateway.put_object("invoice_1030.pdf", PDF_BYTES.to_vec());

    h.engine.run_tick().await.unwrap();
    assert_eq!(h.gateway.total_fetches(), 1);
    assert_eq!(h.delivered.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn listing_failure_leaves_everything_in_place() {
    let h = harness(MaxRetries::Finite(2)).await;
    h.registry.register("1030".into(), "alice".into(), OrderData::default());
    h.gateway.put_object("invoice_1030.pdf", PDF_BYTES.to_vec());
    h.gateway.set_listing_failure(true);

    assert!(h.engine.run_tick().await.is_err());
    assert!(h.engine.run_tick().await.is_err());
    // Failed listings do not count against the retry budget.
    assert!(h.registry.lookup(&"1030".into()).is_some());

    h.gateway.set_listing_failure(false);
    let summary = h.engine.run_tick().await.unwrap();
    assert_eq!(summary.processed, vec!["1030".into()]);
}

#[tokio::test]
async fn fetch_failure_retries_on_the_next_tick() {
    let h = harness(MaxRetries::Unlimited).await;
    h.registry.register("1030".into(), "alice".into(), OrderData::default());
    h.gateway.put_object("invoice_1030.pdf", PDF_BYTES.to_vec());
    h.gateway.set_fetch_failure("invoice_1030.pdf", true);

    let summary = h.engine.run_tick().await.unwrap();
    assert!(summary.processed.is_empty());
    assert!(h.registry.lookup(&"1030".into()).is_some());
    assert!(h.delivered.lock().unwrap().is_empty());

    h.gateway.set_fetch_failure("invoice_1030.pdf", false);
    let summary = h.engine.run_tick().await.unwrap();
    assert_eq!(summary.processed, vec!["1030".into()]);
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn finite_retry_budget_expires_stale_registrations() {
    let h = harness(MaxRetries::Finite(2)).await;
    h.registry.register("4040".into(), "dave".into(), OrderData::default());
    // The bucket never produces the artifact, but holds something so listings are non-trivial.
    h.gateway.put_object("unrelated.txt", b"noise".to_vec());

    h.engine.run_tick().await.unwrap();
    assert!(h.registry.lookup(&"4040".into()).is_some());
    let summary = h.engine.run_tick().await.unwrap();
    assert_eq!(summary.expired, vec!["4040".into()]);
    assert!(h.registry.is_empty());
    assert_eq!(h.expired.lock().unwrap().as_slice(), ["4040".to_string()]);
    assert!(h.delivered.lock().unwrap().is_empty());
}
