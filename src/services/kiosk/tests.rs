//! Tests for the KioskController module

use super::*;
use crate::domain::catalog::{Door, Product};
use crate::domain::types::{PaymentMethod, PurchaseOutcome, SessionState};
use crate::io::backend_worker::BackendCmd;
use crate::io::display::{create_display_channel, DisplayMessage};
use std::collections::HashMap;
use tempfile::TempDir;

/// Test harness that keeps channel receivers alive so `try_send` succeeds
struct TestKiosk {
    kiosk: KioskController,
    backend_rx: mpsc::Receiver<BackendCmd>,
    display_rx: mpsc::Receiver<DisplayMessage>,
    #[allow(dead_code)]
    receipts_dir: TempDir,
}

impl std::ops::Deref for TestKiosk {
    type Target = KioskController;
    fn deref(&self) -> &Self::Target {
        &self.kiosk
    }
}

impl std::ops::DerefMut for TestKiosk {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.kiosk
    }
}

impl TestKiosk {
    /// Drain all pending display messages
    fn drain_display(&mut self) -> Vec<DisplayMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.display_rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Drain all pending backend commands
    fn drain_backend(&mut self) -> Vec<BackendCmd> {
        let mut cmds = Vec::new();
        while let Ok(cmd) = self.backend_rx.try_recv() {
            cmds.push(cmd);
        }
        cmds
    }
}

fn create_test_kiosk() -> TestKiosk {
    // Boot Active: most tests exercise the running session
    create_test_kiosk_with_config(Config::default().with_start_idle(false))
}

fn create_test_kiosk_with_config(config: Config) -> TestKiosk {
    let receipts_dir = TempDir::new().unwrap();
    let receipts_file = receipts_dir.path().join("receipts.jsonl");
    let config = config.with_receipts_file(receipts_file.to_str().unwrap());

    let (backend_tx, backend_rx) = mpsc::channel::<BackendCmd>(64);
    let (display_tx, display_rx) = create_display_channel(64, "test-kiosk".to_string());
    let metrics = Arc::new(Metrics::new());
    let kiosk = KioskController::new(config, backend_tx, metrics, Some(display_tx)).unwrap();
    TestKiosk { kiosk, backend_rx, display_rx, receipts_dir }
}

fn touch(door: &str) -> ParsedEvent {
    ParsedEvent::new(EventType::DoorTouch(DoorId::from(door)))
}

fn snapshot_event() -> ParsedEvent {
    let mut doors = HashMap::new();
    for (id, stock) in [("A1", 5u32), ("B2", 5), ("C3", 5), ("D4", 5)] {
        doors.insert(
            DoorId::from(id),
            Door {
                enabled: true,
                product: Some(Product {
                    name: format!("Item {id}"),
                    price_cents: 250,
                    stock,
                    min_stock: 1,
                }),
            },
        );
    }
    // One empty door for non-selectable cases
    doors.insert(DoorId::from("E5"), Door { enabled: true, product: None });
    ParsedEvent::new(EventType::DoorsSnapshot(doors))
}

fn purchase_result(door: &str, success: bool, remaining: Option<u32>) -> ParsedEvent {
    ParsedEvent::new(EventType::PurchaseResult(PurchaseOutcome {
        door: DoorId::from(door),
        method: PaymentMethod::Contactless,
        success,
        remaining_stock: remaining,
        error: if success { None } else { Some("declined".to_string()) },
    }))
}

#[tokio::test]
async fn test_touch_selects_available_door() {
    let mut kiosk = create_test_kiosk();
    kiosk.process_event(snapshot_event());
    kiosk.drain_display();

    kiosk.process_event(touch("A1"));

    assert_eq!(kiosk.selection(), Some(&DoorId::from("A1")));
    let messages = kiosk.drain_display();
    assert!(messages.iter().any(|m| matches!(
        m,
        DisplayMessage::Selection(p) if p.door.as_deref() == Some("A1") && p.price_cents == Some(250)
    )));
}

#[tokio::test]
async fn test_touch_on_empty_door_does_not_select() {
    let mut kiosk = create_test_kiosk();
    kiosk.process_event(snapshot_event());

    kiosk.process_event(touch("E5"));
    assert_eq!(kiosk.selection(), None);

    // Unknown doors also never select
    kiosk.process_event(touch("Z9"));
    assert_eq!(kiosk.selection(), None);
}

#[tokio::test]
async fn test_full_sequence_activates_restock() {
    let mut kiosk = create_test_kiosk();
    kiosk.process_event(snapshot_event());
    kiosk.drain_display();

    for door in ["A1", "B2", "C3", "D4"] {
        kiosk.process_event(touch(door));
    }

    let messages = kiosk.drain_display();
    let restocks: Vec<_> = messages
        .iter()
        .filter_map(|m| match m {
            DisplayMessage::Restock(p) => Some(p.source.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(restocks, vec!["sequence".to_string()]);
    assert_eq!(kiosk.metrics.sequence_completed_total(), 1);
}

#[tokio::test]
async fn test_sequence_works_on_unavailable_doors() {
    // Sequence detection is a side channel: it must work even when the
    // doors are empty/unknown and selection never happens
    let mut kiosk = create_test_kiosk();
    // No snapshot: every door is unknown to the catalog

    for door in ["A1", "B2", "C3", "D4"] {
        kiosk.process_event(touch(door));
        assert_eq!(kiosk.selection(), None);
    }

    assert_eq!(kiosk.metrics.sequence_completed_total(), 1);
}

#[tokio::test]
async fn test_sequence_progress_published_per_step() {
    let mut kiosk = create_test_kiosk();
    kiosk.drain_display();

    kiosk.process_event(touch("A1"));
    kiosk.process_event(touch("B2"));

    let messages = kiosk.drain_display();
    let progress: Vec<(usize, Option<String>)> = messages
        .iter()
        .filter_map(|m| match m {
            DisplayMessage::SequenceProgress(p) => Some((p.matched, p.next.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        progress,
        vec![(1, Some("B2".to_string())), (2, Some("C3".to_string()))]
    );
}

#[tokio::test]
async fn test_wrong_door_resets_progress_display() {
    let mut kiosk = create_test_kiosk();
    kiosk.process_event(snapshot_event());
    kiosk.drain_display();

    kiosk.process_event(touch("A1"));
    kiosk.process_event(touch("C3")); // wrong: expected B2
    let messages = kiosk.drain_display();

    let last_progress = messages
        .iter()
        .rev()
        .find_map(|m| match m {
            DisplayMessage::SequenceProgress(p) => Some(p.matched),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_progress, 0);
}

#[tokio::test]
async fn test_purchase_request_enqueues_backend_cmd() {
    let mut kiosk = create_test_kiosk();
    kiosk.process_event(snapshot_event());
    kiosk.process_event(touch("A1"));

    kiosk.process_event(ParsedEvent::new(EventType::PurchaseRequest(PaymentMethod::Card)));

    let cmds = kiosk.drain_backend();
    assert_eq!(cmds.len(), 1);
    match &cmds[0] {
        BackendCmd::Purchase { door, method, price_cents, .. } => {
            assert_eq!(door, &DoorId::from("A1"));
            assert_eq!(*method, PaymentMethod::Card);
            assert_eq!(*price_cents, Some(250));
        }
        other => panic!("unexpected cmd: {other:?}"),
    }
}

#[tokio::test]
async fn test_purchase_request_without_selection_is_noop() {
    let mut kiosk = create_test_kiosk();
    kiosk.process_event(snapshot_event());

    kiosk.process_event(ParsedEvent::new(EventType::PurchaseRequest(PaymentMethod::Cash)));
    assert!(kiosk.drain_backend().is_empty());
}

#[tokio::test]
async fn test_purchase_result_reconciles_and_clears_selection() {
    let mut kiosk = create_test_kiosk();
    kiosk.process_event(snapshot_event());
    kiosk.process_event(touch("A1"));
    kiosk.drain_display();

    kiosk.process_event(purchase_result("A1", true, Some(1)));

    assert_eq!(kiosk.selection(), None);
    assert_eq!(kiosk.catalog.stock(&DoorId::from("A1")), Some(1));

    let messages = kiosk.drain_display();
    assert!(messages.iter().any(|m| matches!(
        m,
        DisplayMessage::PurchaseResult(p) if p.success && p.remaining_stock == Some(1)
    )));

    // Receipt was appended
    let receipts = std::fs::read_to_string(kiosk.config.receipts_file()).unwrap();
    assert_eq!(receipts.lines().count(), 1);
    assert!(receipts.contains("\"door\":\"A1\""));
}

#[tokio::test]
async fn test_failed_purchase_keeps_stock() {
    let mut kiosk = create_test_kiosk();
    kiosk.process_event(snapshot_event());
    kiosk.process_event(touch("A1"));

    kiosk.process_event(purchase_result("A1", false, None));

    assert_eq!(kiosk.catalog.stock(&DoorId::from("A1")), Some(5));
    assert_eq!(kiosk.selection(), None);

    // No receipt for a failed attempt
    let receipts = std::fs::read_to_string(kiosk.config.receipts_file()).unwrap_or_default();
    assert!(receipts.is_empty());
}

#[tokio::test]
async fn test_cancel_clears_selection() {
    let mut kiosk = create_test_kiosk();
    kiosk.process_event(snapshot_event());
    kiosk.process_event(touch("A1"));
    assert!(kiosk.selection().is_some());

    kiosk.process_event(ParsedEvent::new(EventType::Cancel));
    assert_eq!(kiosk.selection(), None);
}

#[tokio::test]
async fn test_idle_clears_selection_before_screensaver() {
    let mut kiosk = create_test_kiosk();
    kiosk.process_event(snapshot_event());
    kiosk.process_event(touch("A1"));
    kiosk.drain_display();

    // Force the idle transition well past the 30s default window
    let later = Instant::now() + Duration::from_secs(60);
    kiosk.tick(later);

    assert_eq!(kiosk.session_state(), SessionState::Idle);
    assert_eq!(kiosk.selection(), None);

    // Ordering requirement: the cleared selection must be published before
    // the screensaver-on command
    let messages = kiosk.drain_display();
    let clear_pos = messages
        .iter()
        .position(|m| matches!(m, DisplayMessage::Selection(p) if p.door.is_none()))
        .expect("selection clear published");
    let saver_pos = messages
        .iter()
        .position(|m| matches!(m, DisplayMessage::Screensaver(p) if p.on))
        .expect("screensaver-on published");
    assert!(clear_pos < saver_pos);
}

#[tokio::test]
async fn test_idle_fires_once_then_waits_for_activity() {
    let mut kiosk = create_test_kiosk();
    kiosk.drain_display();

    let later = Instant::now() + Duration::from_secs(60);
    kiosk.tick(later);
    kiosk.tick(later + Duration::from_secs(10));

    let screensavers: Vec<bool> = kiosk
        .drain_display()
        .iter()
        .filter_map(|m| match m {
            DisplayMessage::Screensaver(p) => Some(p.on),
            _ => None,
        })
        .collect();
    assert_eq!(screensavers, vec![true]);
}

#[tokio::test]
async fn test_activity_wakes_and_hides_screensaver() {
    let mut kiosk =
        create_test_kiosk_with_config(Config::default().with_start_idle(true));
    assert_eq!(kiosk.session_state(), SessionState::Idle);
    kiosk.drain_display();

    kiosk.process_event(ParsedEvent::new(EventType::Activity));

    assert_eq!(kiosk.session_state(), SessionState::Active);
    let messages = kiosk.drain_display();
    assert!(messages
        .iter()
        .any(|m| matches!(m, DisplayMessage::Screensaver(p) if !p.on)));
}

#[tokio::test]
async fn test_step_timeout_tick_resets_progress() {
    let mut kiosk = create_test_kiosk();
    kiosk.process_event(touch("A1"));
    kiosk.drain_display();

    // Past the 5s step window
    kiosk.tick(Instant::now() + Duration::from_secs(6));

    let messages = kiosk.drain_display();
    assert!(messages.iter().any(|m| matches!(
        m,
        DisplayMessage::SequenceProgress(p) if p.matched == 0
    )));
}

#[tokio::test]
async fn test_snapshot_invalidates_stale_selection() {
    let mut kiosk = create_test_kiosk();
    kiosk.process_event(snapshot_event());
    kiosk.process_event(touch("A1"));
    assert!(kiosk.selection().is_some());

    // New snapshot where A1 sold out
    let mut doors = HashMap::new();
    doors.insert(
        DoorId::from("A1"),
        Door {
            enabled: true,
            product: Some(Product {
                name: "Item A1".to_string(),
                price_cents: 250,
                stock: 0,
                min_stock: 1,
            }),
        },
    );
    kiosk.process_event(ParsedEvent::new(EventType::DoorsSnapshot(doors)));

    assert_eq!(kiosk.selection(), None);
}

#[tokio::test]
async fn test_remote_activation_shares_restock_path() {
    let mut kiosk = create_test_kiosk();
    kiosk.process_event(snapshot_event());
    kiosk.process_event(touch("A1"));
    kiosk.drain_display();

    kiosk.process_event(ParsedEvent::new(EventType::RemoteActivation));

    // Selection was cleared (restock UI and purchase UI are exclusive)
    assert_eq!(kiosk.selection(), None);

    let messages = kiosk.drain_display();
    assert!(messages.iter().any(|m| matches!(
        m,
        DisplayMessage::Restock(p) if p.source == "remote"
    )));

    // The backend flag gets cleared so it fires once per request
    let cmds = kiosk.drain_backend();
    assert!(cmds.iter().any(|c| matches!(c, BackendCmd::ClearRedirect)));
}

#[tokio::test]
async fn test_touch_is_qualifying_activity() {
    let mut kiosk =
        create_test_kiosk_with_config(Config::default().with_start_idle(true));
    kiosk.process_event(snapshot_event());

    kiosk.process_event(touch("B2"));
    assert_eq!(kiosk.session_state(), SessionState::Active);
}

#[tokio::test]
async fn test_invalid_sequence_config_rejected() {
    let config = Config::default().with_sequence_doors(vec![]);
    let (backend_tx, _backend_rx) = mpsc::channel::<BackendCmd>(8);
    let metrics = Arc::new(Metrics::new());

    assert!(KioskController::new(config, backend_tx, metrics, None).is_err());
}
