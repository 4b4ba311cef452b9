//! Registration injection test: a burst of expected invoices lands while the polling engine is scanning, and every
//! invariant about one-shot processing has to hold at the end.
use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    time::Duration,
};

use invoice_delivery_engine::{
    events::DeliveryHooks,
    gateway::MemoryGateway,
    registry::ExpectedInvoiceRegistry,
    store::InvoiceStore,
    types::{MaxRetries, OrderData, PoNumber},
    PollerConfig, PollingEngine,
};
use log::*;

const NUM_REGISTRATIONS: u64 = 100;
const RATE: u64 = 500; // registrations per second

#[tokio::test]
async fn burst_registrations() {
    let _ = env_logger::try_init();
    info!("🚀 Starting registration injection test");

    let gateway = MemoryGateway::new("game-invoices");
    let dir = std::env::temp_dir().join(format!("gig_burst_test_{}", rand::random::<u64>()));
    let store = InvoiceStore::new(dir).await.unwrap();
    let registry = ExpectedInvoiceRegistry::new();

    // Artifacts exist up front for every even PO number; odd ones never get one.
    for po in (0..NUM_REGISTRATIONS).filter(|po| po % 2 == 0) {
        gateway.put_object(format!("invoice_{po}.pdf"), format!("%PDF-1.4 burst {po}").into_bytes());
    }

    let delivered = Arc::new(Mutex::new(Vec::<PoNumber>::new()));
    let mut hooks = DeliveryHooks::default();
    let sink = delivered.clone();
    hooks.on_invoice_ready(move |event| {
        let sink = sink.clone();
        Box::pin(async move {
            sink.lock().unwrap().push(event.record.invoice_number.clone());
            true
        }) as Pin<Box<dyn Future<Output = bool> + Send>>
    });

    let engine = PollingEngine::new(
        Arc::new(gateway.clone()),
        store.clone(),
        registry.clone(),
        hooks,
        PollerConfig { max_retries: MaxRetries::Unlimited, ..Default::default() },
    );

    // Inject registrations at a fixed rate, scanning in between so arrivals interleave with processing.
    let mut timer = tokio::time::interval(Duration::from_millis(1000 / RATE));
    for po in 0..NUM_REGISTRATIONS {
        timer.tick().await;
        registry.register(po.to_string().into(), format!("player_{}", po % 7).into(), OrderData::default());
        if po % 25 == 0 {
            engine.run_tick().await.unwrap();
        }
    }
    // Drain whatever the interleaved scans did not catch.
    engine.run_tick().await.unwrap();
    engine.run_tick().await.unwrap();

    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered.len() as u64, NUM_REGISTRATIONS / 2);
    for po in 0..NUM_REGISTRATIONS {
        let po_number: PoNumber = po.to_string().into();
        if po % 2 == 0 {
            // Processed exactly once, on disk, registration retired.
            assert_eq!(gateway.fetch_count(&format!("invoice_{po}.pdf")), 1, "{po_number} fetched more than once");
            assert!(store.has(&po_number));
            assert!(registry.lookup(&po_number).is_none());
            assert_eq!(delivered.iter().filter(|d| **d == po_number).count(), 1);
        } else {
            // No artifact: untouched and still waiting.
            assert!(!store.has(&po_number));
            assert!(registry.lookup(&po_number).is_some());
        }
    }
    info!("🚀 test complete");
}
