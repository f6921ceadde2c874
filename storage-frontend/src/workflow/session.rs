//! Task that owns one controller for the lifetime of a modal session.
//!
//! Commands are processed one at a time. The auto-save deadline is raced
//! against incoming commands, so new input always cancels a pending save
//! before it fires. Shutdown also tears the pending save down.

use super::controller::{ControllerState, LocationAssignmentController};
use super::resolver::ResolverMode;
use super::WorkflowError;
use crate::models::{HierarchyLevel, HierarchyNode, SearchResult};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Clone)]
pub enum SessionCommand {
    Open { sample_item_id: String },
    EnterText { level: HierarchyLevel, text: String },
    SelectFromList { level: HierarchyLevel, node: HierarchyNode },
    CreatePending { level: HierarchyLevel },
    OpenCreate,
    CancelCreate,
    ConfirmCreated,
    Search { query: String },
    SelectSearchResult(SearchResult),
    ScanBarcode { barcode: String },
    SetPosition(String),
    SetNotes(String),
    SetReason(String),
    Confirm,
    Close,
}

impl SessionCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::EnterText { .. } => "enter_text",
            Self::SelectFromList { .. } => "select_from_list",
            Self::CreatePending { .. } => "create_pending",
            Self::OpenCreate => "open_create",
            Self::CancelCreate => "cancel_create",
            Self::ConfirmCreated => "confirm_created",
            Self::Search { .. } => "search",
            Self::SelectSearchResult(_) => "select_search_result",
            Self::ScanBarcode { .. } => "scan_barcode",
            Self::SetPosition(_) => "set_position",
            Self::SetNotes(_) => "set_notes",
            Self::SetReason(_) => "set_reason",
            Self::Confirm => "confirm",
            Self::Close => "close",
        }
    }
}

/// Snapshot of everything a view renders for the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub state: ControllerState,
    pub mode: ResolverMode,
    pub movement_mode: bool,
    pub hierarchical_path: String,
    pub can_confirm: bool,
    pub show_reason_for_move: bool,
    pub focus: Option<HierarchyLevel>,
    pub pending_gap: Option<HierarchyLevel>,
    pub dropped_levels_warning: bool,
    pub barcode_error: Option<String>,
    pub autosaved: bool,
    pub last_error: Option<String>,
    pub search_results: Vec<SearchResult>,
    /// Number of successful saves, auto-saves included.
    pub saves: u64,
}

impl SessionView {
    fn capture(controller: &LocationAssignmentController, now: Instant, saves: u64) -> Self {
        Self {
            state: controller.state(),
            mode: controller.resolver().mode(),
            movement_mode: controller.is_movement_mode(),
            hierarchical_path: controller.hierarchical_path(),
            can_confirm: controller.can_confirm(),
            show_reason_for_move: controller.show_reason_for_move(),
            focus: controller.resolver().cascade().focused(),
            pending_gap: controller.pending_gap(),
            dropped_levels_warning: controller.dropped_levels_warning(),
            barcode_error: controller.barcode_error(now).map(str::to_string),
            autosaved: controller.autosaved_visible(now),
            last_error: controller.last_error().map(str::to_string),
            search_results: controller.resolver().results().to_vec(),
            saves,
        }
    }
}

pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<SessionView>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> Result<(), WorkflowError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| WorkflowError::SessionClosed)
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Wait until the published view satisfies `predicate`.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&SessionView) -> bool,
    ) -> Result<SessionView, WorkflowError> {
        self.view
            .wait_for(predicate)
            .await
            .map(|view| view.clone())
            .map_err(|_| WorkflowError::SessionClosed)
    }

    /// Stop the session task; a pending auto-save is dropped.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Run `controller` on its own task. The task hands the controller back,
/// closed, once the session is shut down or every handle is dropped.
pub fn spawn_session(
    controller: LocationAssignmentController,
) -> (SessionHandle, JoinHandle<LocationAssignmentController>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (view_tx, view_rx) = watch::channel(SessionView::capture(&controller, Instant::now(), 0));
    let shutdown = CancellationToken::new();

    let session_id = Uuid::new_v4();
    let span = tracing::info_span!("location_session", session_id = %session_id);
    let task = tokio::spawn(
        run_session(controller, command_rx, view_tx, shutdown.clone()).instrument(span),
    );

    let handle = SessionHandle {
        commands: command_tx,
        view: view_rx,
        shutdown,
    };
    (handle, task)
}

async fn run_session(
    mut controller: LocationAssignmentController,
    mut commands: mpsc::Receiver<SessionCommand>,
    view: watch::Sender<SessionView>,
    shutdown: CancellationToken,
) -> LocationAssignmentController {
    let mut saves = 0u64;
    tracing::debug!("Session task started");

    loop {
        // Copy the deadlines out so no borrow of the controller is held across select
        let autosave_at = controller.autosave_deadline();
        let indicator_at = controller.next_indicator_expiry(Instant::now());

        tokio::select! {
            _ = shutdown.cancelled() => break,
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                if handle_command(&mut controller, command).await {
                    saves += 1;
                }
            }
            _ = until(autosave_at) => {
                match controller.run_autosave_if_due(Instant::now()).await {
                    Some(Ok(_)) => saves += 1,
                    Some(Err(e)) => tracing::warn!(error = %e, "Auto-save failed"),
                    None => {}
                }
            }
            _ = until(indicator_at) => {}
        }

        view.send_replace(SessionView::capture(&controller, Instant::now(), saves));
    }

    controller.close();
    view.send_replace(SessionView::capture(&controller, Instant::now(), saves));
    tracing::debug!("Session task stopped");
    controller
}

/// Returns `true` when the command saved a location.
async fn handle_command(controller: &mut LocationAssignmentController, command: SessionCommand) -> bool {
    let name = command.name();
    let result = match command {
        SessionCommand::Open { sample_item_id } => controller.open_for(&sample_item_id).await,
        SessionCommand::EnterText { level, text } => controller.enter_text(level, &text).await,
        SessionCommand::SelectFromList { level, node } => {
            controller.select_from_list(level, node).await
        }
        SessionCommand::CreatePending { level } => {
            controller.create_pending(level).await.map(|_| ())
        }
        SessionCommand::OpenCreate => controller.open_create().await,
        SessionCommand::CancelCreate => {
            controller.cancel_create();
            Ok(())
        }
        SessionCommand::ConfirmCreated => controller.confirm_created(),
        SessionCommand::Search { query } => controller.search(&query).await.map(|_| ()),
        SessionCommand::SelectSearchResult(result) => {
            controller.select_search_result(&result).map(|_| ())
        }
        SessionCommand::ScanBarcode { barcode } => {
            controller.scan_barcode(&barcode).await.map(|_| ())
        }
        SessionCommand::SetPosition(coordinate) => {
            controller.set_position(&coordinate);
            Ok(())
        }
        SessionCommand::SetNotes(notes) => {
            controller.set_notes(&notes);
            Ok(())
        }
        SessionCommand::SetReason(reason) => {
            controller.set_reason(&reason);
            Ok(())
        }
        SessionCommand::Confirm => {
            return match controller.confirm().await {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(command = name, error = %e, "Session command failed");
                    false
                }
            };
        }
        SessionCommand::Close => {
            controller.close();
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::warn!(command = name, error = %e, "Session command failed");
    }
    false
}
