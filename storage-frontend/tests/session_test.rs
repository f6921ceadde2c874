mod common;

use common::seeded_lab;
use std::time::Duration;
use storage_frontend::workflow::{spawn_session, ControllerState, SessionCommand, WorkflowError};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_autosave_fires_after_quiet_period() {
    let lab = seeded_lab().await;
    let (mut handle, _task) = spawn_session(common::controller(&lab, true));
    handle
        .send(SessionCommand::Open {
            sample_item_id: "S-1".into(),
        })
        .await
        .unwrap();

    let started = Instant::now();
    let freezer = common::search_row(&lab, "Freezer 1").await;
    handle
        .send(SessionCommand::SelectSearchResult(freezer))
        .await
        .unwrap();

    let view = handle.wait_for(|v| v.saves == 1).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert!(view.autosaved);
    // The session stays open after an auto-save
    assert_eq!(view.state, ControllerState::LocationChosen);
    assert_eq!(view.hierarchical_path, "Main Lab > Freezer 1");

    let assignments = lab.store.assignments().await;
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].location_id, lab.freezer);

    let view = handle.wait_for(|v| !v.autosaved).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(3_500));
    assert_eq!(view.saves, 1);
    assert_eq!(view.state, ControllerState::LocationChosen);
}

#[tokio::test(start_paused = true)]
async fn test_new_input_restarts_autosave_debounce() {
    let lab = seeded_lab().await;
    let (mut handle, _task) = spawn_session(common::controller(&lab, true));
    handle
        .send(SessionCommand::Open {
            sample_item_id: "S-1".into(),
        })
        .await
        .unwrap();

    let started = Instant::now();
    handle
        .send(SessionCommand::SelectSearchResult(
            common::search_row(&lab, "Freezer 1").await,
        ))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle
        .send(SessionCommand::SelectSearchResult(
            common::search_row(&lab, "Shelf B").await,
        ))
        .await
        .unwrap();

    handle.wait_for(|v| v.saves == 1).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(800));

    let assignments = lab.store.assignments().await;
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].location_id, lab.shelf_b);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drops_pending_autosave() {
    let lab = seeded_lab().await;
    let (mut handle, task) = spawn_session(common::controller(&lab, true));
    handle
        .send(SessionCommand::Open {
            sample_item_id: "S-1".into(),
        })
        .await
        .unwrap();
    handle
        .send(SessionCommand::SelectSearchResult(
            common::search_row(&lab, "Freezer 1").await,
        ))
        .await
        .unwrap();
    handle
        .wait_for(|v| v.state == ControllerState::LocationChosen)
        .await
        .unwrap();

    handle.shutdown();
    let controller = task.await.unwrap();
    assert_eq!(controller.state(), ControllerState::Idle);
    assert!(controller.autosave_deadline().is_none());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(lab.store.assignments().await.is_empty());

    let err = handle.send(SessionCommand::Confirm).await.unwrap_err();
    assert!(matches!(err, WorkflowError::SessionClosed));
}

#[tokio::test]
async fn test_explicit_confirm_closes_session() {
    let lab = seeded_lab().await;
    let (mut handle, _task) = spawn_session(common::controller(&lab, false));
    handle
        .send(SessionCommand::Open {
            sample_item_id: "S-1".into(),
        })
        .await
        .unwrap();
    handle
        .send(SessionCommand::ScanBarcode {
            barcode: "MAIN-FRZ1-SHA".into(),
        })
        .await
        .unwrap();
    handle
        .send(SessionCommand::SetNotes("second box".into()))
        .await
        .unwrap();
    handle.send(SessionCommand::Confirm).await.unwrap();

    let view = handle
        .wait_for(|v| v.saves == 1 && v.state == ControllerState::Idle)
        .await
        .unwrap();
    assert!(!view.can_confirm);
    assert!(view.hierarchical_path.is_empty());

    let assignments = lab.store.assignments().await;
    assert_eq!(assignments[0].location_id, lab.shelf_a);
    assert_eq!(assignments[0].notes.as_deref(), Some("second box"));
}

#[tokio::test(start_paused = true)]
async fn test_barcode_error_clears_after_three_seconds() {
    let lab = seeded_lab().await;
    let (mut handle, _task) = spawn_session(common::controller(&lab, false));
    handle
        .send(SessionCommand::Open {
            sample_item_id: "S-1".into(),
        })
        .await
        .unwrap();

    let started = Instant::now();
    handle
        .send(SessionCommand::ScanBarcode {
            barcode: "ZZZ-FRZ1".into(),
        })
        .await
        .unwrap();
    let view = handle
        .wait_for(|v| v.barcode_error.is_some())
        .await
        .unwrap();
    assert_eq!(view.barcode_error.as_deref(), Some("Room 'ZZZ' not found"));
    assert!(view.hierarchical_path.is_empty());

    handle
        .wait_for(|v| v.barcode_error.is_none())
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(handle.view().state, ControllerState::Editing);
}

#[tokio::test]
async fn test_partial_scan_is_reflected_in_view() {
    let lab = seeded_lab().await;
    let (mut handle, _task) = spawn_session(common::controller(&lab, false));
    handle
        .send(SessionCommand::Open {
            sample_item_id: "S-1".into(),
        })
        .await
        .unwrap();
    handle
        .send(SessionCommand::ScanBarcode {
            barcode: "MAIN-FRZ1-SHX-R9".into(),
        })
        .await
        .unwrap();

    let view = handle
        .wait_for(|v| v.pending_gap.is_some())
        .await
        .unwrap();
    assert_eq!(view.focus, Some(storage_frontend::models::HierarchyLevel::Shelf));
    assert!(view.dropped_levels_warning);
    assert!(!view.can_confirm);
    assert_eq!(view.mode, storage_frontend::workflow::ResolverMode::Create);
}
