use std::{
    path::Path,
    sync::{Arc, Barrier},
    thread,
};

use ledger::{LedgerConfig, TransactionLedger};
use rust_decimal_macros::dec;
use settlement::{
    PaymentProof, ReconciliationLog, SettlementConfig, SettlementError, SettlementMetrics,
    SettlementService,
};
use slot_space::{
    overlaps, Allocation, AllocationService, ContentInput, GridIndex, Rect, SlotSpaceConfig,
};
use tempfile::tempdir;

fn open_service(dir: &Path, precheck: bool) -> Arc<SettlementService> {
    let mut grid_config = SlotSpaceConfig::new(dir.to_path_buf());
    grid_config.sync_writes = false;
    let (grid, _) = GridIndex::bootstrap(&grid_config, None).unwrap();
    let allocations = AllocationService::new(
        Arc::new(grid),
        grid_config.pricing,
        grid_config.max_title_chars,
        None,
    );
    let mut ledger_config = LedgerConfig::new(dir.to_path_buf());
    ledger_config.sync_writes = false;
    let (ledger, _) = TransactionLedger::bootstrap(ledger_config).unwrap();
    let mut settlement_config = SettlementConfig::new(dir.to_path_buf());
    settlement_config.sync_writes = false;
    let reconciliation = ReconciliationLog::open(
        settlement_config.reconciliation_path(),
        settlement_config.sync_writes,
    )
    .unwrap();
    Arc::new(
        SettlementService::new(
            Arc::new(allocations),
            Arc::new(ledger),
            Arc::new(reconciliation),
            SettlementMetrics::new(),
        )
        .with_precheck(precheck),
    )
}

fn content(title: &str) -> ContentInput {
    ContentInput {
        image_ref: format!("ipfs://{title}"),
        link: "example.com".to_string(),
        title: title.to_string(),
    }
}

fn race_same_rect(
    service: &Arc<SettlementService>,
    hashes: &[&str],
) -> Vec<Result<Allocation, SettlementError>> {
    let rect = Rect::new(100, 100, 20, 20);
    let barrier = Arc::new(Barrier::new(hashes.len()));
    let handles: Vec<_> = hashes
        .iter()
        .map(|hash| {
            let service = Arc::clone(service);
            let barrier = Arc::clone(&barrier);
            let hash = hash.to_string();
            thread::spawn(move || {
                let draft = service
                    .allocations()
                    .finalize_draft(3, rect, &content(&hash), false)
                    .unwrap();
                barrier.wait();
                service.commit(&draft, &PaymentProof::new(hash, "ETH", Some("4.00")))
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn concurrent_commits_same_rect_spend_then_flag_loser() {
    let dir = tempdir().unwrap();
    let service = open_service(dir.path(), false);
    let outcomes = race_same_rect(&service, &["0xaaa", "0xbbb"]);

    let winners: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let tickets: Vec<_> = outcomes
        .iter()
        .filter_map(|o| match o {
            Err(SettlementError::SlotTakenAfterPayment { ticket }) => Some(ticket.clone()),
            Err(other) => panic!("unexpected {other:?}"),
            Ok(_) => None,
        })
        .collect();
    assert_eq!(tickets.len(), 1);
    assert_ne!(tickets[0].hash, winners[0].proof_hash);

    // both proofs are spent; the loser is on the reconciliation list
    assert!(service.ledger().contains("0xaaa"));
    assert!(service.ledger().contains("0xbbb"));
    assert_eq!(service.reconciliation().list(), tickets);
    assert_eq!(service.allocations().grid().page_len(3).unwrap(), 1);
}

#[test]
fn concurrent_commits_with_precheck_never_lose_track_of_a_payment() {
    let dir = tempdir().unwrap();
    let service = open_service(dir.path(), true);
    let hashes = ["0x1", "0x2", "0x3", "0x4"];
    let outcomes = race_same_rect(&service, &hashes);

    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    for outcome in &outcomes {
        match outcome {
            Ok(allocation) => assert!(service.ledger().contains(&allocation.proof_hash)),
            Err(SettlementError::SlotTaken { page: 3, .. }) => {}
            Err(SettlementError::SlotTakenAfterPayment { ticket }) => {
                assert!(service.ledger().contains(&ticket.hash))
            }
            Err(other) => panic!("unexpected {other:?}"),
        }
    }
    // every spent proof either paid for the allocation or has a ticket
    assert_eq!(service.ledger().len(), 1 + service.reconciliation().len());
}

#[test]
fn concurrent_replay_of_one_proof_commits_once() {
    let dir = tempdir().unwrap();
    let service = open_service(dir.path(), true);
    let workers = 6;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers as u32)
        .map(|i| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.settle(
                    0,
                    Rect::new(i * 10, 0, 5, 5),
                    &content("replay"),
                    false,
                    &PaymentProof::new("H1", "ETH", Some("5")),
                )
            })
        })
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, Err(SettlementError::DuplicatePayment { .. })))
            .count(),
        workers - 1
    );
    assert_eq!(service.ledger().len(), 1);
    assert_eq!(service.allocations().grid().len(), 1);
    assert_eq!(service.metrics().snapshot().duplicate_payments, (workers - 1) as u64);
}

#[test]
fn committed_allocations_never_overlap() {
    let dir = tempdir().unwrap();
    let service = open_service(dir.path(), true);
    let handles: Vec<_> = (0..4u32)
        .map(|worker| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                for n in 0..40u32 {
                    let x = (n * 7 + worker * 3) % 300;
                    let y = (n * 13 + worker * 5) % 300;
                    let _ = service.settle(
                        0,
                        Rect::new(x, y, 1 + n % 9, 1 + worker % 7),
                        &content("tile"),
                        n % 2 == 0,
                        &PaymentProof::new(format!("w{worker}-{n}"), "POLYGON", None),
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let page = service.allocations().grid().snapshot(0).unwrap();
    assert!(!page.is_empty());
    for (i, a) in page.iter().enumerate() {
        for b in &page[i + 1..] {
            assert!(!overlaps(&a.rect, &b.rect));
        }
    }
    assert_eq!(
        service.ledger().len(),
        page.len() + service.reconciliation().len()
    );
}

#[test]
fn restart_restores_grid_ledger_and_tickets() {
    let dir = tempdir().unwrap();
    let committed = {
        let service = open_service(dir.path(), false);
        let allocation = service
            .settle(
                7,
                Rect::new(2, 3, 13, 4),
                &content("first"),
                true,
                &PaymentProof::new("0xfeed", "BASE", Some("104.00")),
            )
            .unwrap();
        let err = service
            .settle(
                7,
                Rect::new(10, 5, 2, 2),
                &content("late"),
                false,
                &PaymentProof::new("0xbeef", "BASE", None),
            )
            .unwrap_err();
        assert!(matches!(err, SettlementError::SlotTakenAfterPayment { .. }));
        allocation
    };

    let service = open_service(dir.path(), true);
    let grid = service.allocations().grid();
    assert_eq!(grid.get(&committed.id), Some(committed.clone()));
    assert!(grid.query(7, &Rect::new(14, 6, 1, 1)).unwrap());
    assert_eq!(service.ledger().len(), 2);
    assert_eq!(service.reconciliation().list()[0].hash, "0xbeef");

    let replay = service
        .settle(
            8,
            Rect::new(0, 0, 1, 1),
            &content("again"),
            false,
            &PaymentProof::new("0xfeed", "BASE", None),
        )
        .unwrap_err();
    assert!(matches!(replay, SettlementError::DuplicatePayment { .. }));

    let preview = service
        .allocations()
        .preview(7, &Rect::new(2, 3, 13, 4), true);
    assert!(!preview.valid);
    assert_eq!(preview.price, dec!(104.00));
}
