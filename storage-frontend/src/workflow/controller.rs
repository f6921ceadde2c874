//! Assign/move workflow for one sample item within one modal session.
//!
//! Dropdown and barcode inputs both produce [`LocationInputEvent`]s which are
//! merged by timestamp: the most recently started action wins regardless of
//! which one finishes last.

use super::debounce::{DebounceTimer, TimedFlag};
use super::resolver::{LocationResolver, ResolverMode};
use super::WorkflowError;
use crate::config::WorkflowSettings;
use crate::models::{
    AssignmentReceipt, AssignmentRequest, BarcodeComponents, BarcodeOutcome, CurrentLocation,
    HierarchyLevel, HierarchyNode, MetadataUpdate, PositionCoordinate, ResolvedLocation,
    SearchResult,
};
use crate::services::HierarchyRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Editing,
    LocationChosen,
    Confirming,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Editing => "editing",
            Self::LocationChosen => "location_chosen",
            Self::Confirming => "confirming",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Dropdown,
    Barcode,
}

impl InputSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dropdown => "dropdown",
            Self::Barcode => "barcode",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationInputEvent {
    pub source: InputSource,
    pub timestamp: Instant,
    pub location: ResolvedLocation,
}

impl LocationInputEvent {
    pub fn new(source: InputSource, timestamp: Instant, location: ResolvedLocation) -> Self {
        Self {
            source,
            timestamp,
            location,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub auto_save: bool,
    pub autosave_delay: Duration,
    pub autosaved_indicator: Duration,
    pub barcode_error: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from(&WorkflowSettings::default())
    }
}

impl From<&WorkflowSettings> for ControllerOptions {
    fn from(settings: &WorkflowSettings) -> Self {
        Self {
            auto_save: settings.auto_save,
            autosave_delay: settings.autosave_delay(),
            autosaved_indicator: settings.autosaved_indicator(),
            barcode_error: settings.barcode_error(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    Assigned(AssignmentReceipt),
    MetadataUpdated,
}

pub struct LocationAssignmentController {
    repository: Arc<dyn HierarchyRepository>,
    options: ControllerOptions,
    state: ControllerState,
    sample_item_id: Option<String>,
    current: Option<CurrentLocation>,
    resolver: LocationResolver,
    location: Option<ResolvedLocation>,
    last_applied: Option<Instant>,
    position: String,
    notes: String,
    reason: String,
    initial_position: String,
    initial_notes: String,
    pending_gap: Option<HierarchyLevel>,
    dropped_levels: bool,
    barcode_error: TimedFlag<String>,
    autosaved: TimedFlag<()>,
    autosave: DebounceTimer,
    last_error: Option<String>,
}

impl LocationAssignmentController {
    pub fn new(repository: Arc<dyn HierarchyRepository>, options: ControllerOptions) -> Self {
        Self {
            resolver: LocationResolver::new(repository.clone()),
            repository,
            options,
            state: ControllerState::Idle,
            sample_item_id: None,
            current: None,
            location: None,
            last_applied: None,
            position: String::new(),
            notes: String::new(),
            reason: String::new(),
            initial_position: String::new(),
            initial_notes: String::new(),
            pending_gap: None,
            dropped_levels: false,
            barcode_error: TimedFlag::default(),
            autosaved: TimedFlag::default(),
            autosave: DebounceTimer::new(),
            last_error: None,
        }
    }

    // ------------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------------

    /// Open the session. With a placed `current` location the session is in
    /// movement mode and its position/notes become the metadata baseline.
    pub async fn open(
        &mut self,
        sample_item_id: &str,
        current: Option<CurrentLocation>,
    ) -> Result<(), WorkflowError> {
        self.reset();
        self.sample_item_id = Some(sample_item_id.to_string());
        self.current = current.filter(CurrentLocation::is_assigned);
        if let Some(current) = &self.current {
            self.initial_position = current.position_coordinate.clone().unwrap_or_default();
            self.initial_notes = current.notes.clone().unwrap_or_default();
        }
        self.position = self.initial_position.clone();
        self.notes = self.initial_notes.clone();
        self.state = ControllerState::Editing;

        tracing::info!(
            sample_item_id = %sample_item_id,
            movement = self.is_movement_mode(),
            "Location session opened"
        );
        self.resolver
            .cascade_mut()
            .load_children(HierarchyLevel::Room)
            .await?;
        Ok(())
    }

    /// Open the session after reading the item's current placement.
    pub async fn open_for(&mut self, sample_item_id: &str) -> Result<(), WorkflowError> {
        let current = self.repository.current_location(sample_item_id).await?;
        self.open(sample_item_id, current).await
    }

    /// Close the session, cancelling any pending auto-save.
    pub fn close(&mut self) {
        if self.state != ControllerState::Idle {
            tracing::info!(sample_item_id = ?self.sample_item_id, "Location session closed");
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.autosave.cancel();
        self.state = ControllerState::Idle;
        self.sample_item_id = None;
        self.current = None;
        self.resolver.reset();
        self.location = None;
        self.last_applied = None;
        self.position.clear();
        self.notes.clear();
        self.reason.clear();
        self.initial_position.clear();
        self.initial_notes.clear();
        self.pending_gap = None;
        self.dropped_levels = false;
        self.barcode_error.clear();
        self.autosaved.clear();
        self.last_error = None;
    }

    fn ensure_open(&self) -> Result<(), WorkflowError> {
        match self.state {
            ControllerState::Idle => Err(WorkflowError::NotEditing),
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------------

    /// Apply an input event if it is not older than the last applied one.
    /// Ties go to the new event.
    pub fn apply(&mut self, event: LocationInputEvent) -> bool {
        if self.state == ControllerState::Idle {
            return false;
        }
        if self.last_applied.is_some_and(|last| event.timestamp < last) {
            tracing::debug!(source = event.source.as_str(), "Discarding stale location input");
            return false;
        }

        self.last_applied = Some(event.timestamp);
        if let Some(coordinate) = event.location.position_coordinate() {
            self.position = coordinate.to_string();
        }
        let chosen = !event.location.is_empty();
        self.location = Some(event.location).filter(|_| chosen);
        self.last_error = None;
        if self.state != ControllerState::Confirming {
            self.state = if chosen {
                ControllerState::LocationChosen
            } else {
                ControllerState::Editing
            };
        }
        tracing::debug!(
            source = event.source.as_str(),
            path = %self.hierarchical_path(),
            "Applied location input"
        );
        self.touch(event.timestamp);
        true
    }

    /// New user input restarts the auto-save debounce.
    fn touch(&mut self, now: Instant) {
        self.autosave.cancel();
        if self.options.auto_save && self.can_auto_save() {
            self.autosave.schedule(now, self.options.autosave_delay);
        }
    }

    fn emit_dropdown(&mut self, started: Instant) {
        let location = self.resolver.cascade().snapshot();
        self.apply(LocationInputEvent::new(InputSource::Dropdown, started, location));
    }

    // ------------------------------------------------------------------------
    // Dropdown input
    // ------------------------------------------------------------------------

    /// Type into a hierarchy field and load the next level's options when the
    /// field resolved to an existing node.
    pub async fn enter_text(&mut self, level: HierarchyLevel, text: &str) -> Result<(), WorkflowError> {
        self.ensure_open()?;
        let started = Instant::now();
        if self.resolver.mode() != ResolverMode::Create {
            self.resolver.open_create(None, None).await?;
        }
        self.resolver.cascade_mut().set_field_input(level, text)?;
        self.emit_dropdown(started);
        self.load_below(level).await;
        Ok(())
    }

    pub async fn select_from_list(
        &mut self,
        level: HierarchyLevel,
        node: HierarchyNode,
    ) -> Result<(), WorkflowError> {
        self.ensure_open()?;
        let started = Instant::now();
        if self.resolver.mode() != ResolverMode::Create {
            self.resolver.open_create(None, None).await?;
        }
        self.resolver.cascade_mut().select_from_list(level, node)?;
        self.emit_dropdown(started);
        self.load_below(level).await;
        Ok(())
    }

    /// Persist the proposed node of `level`; the failure message stays on the field.
    pub async fn create_pending(&mut self, level: HierarchyLevel) -> Result<HierarchyNode, WorkflowError> {
        self.ensure_open()?;
        let started = Instant::now();
        let created = self.resolver.cascade_mut().create_pending_node(level).await?;
        self.emit_dropdown(started);
        self.load_below(level).await;
        Ok(created)
    }

    /// Load the options of the level below `level`. A failed fetch is left on
    /// that field; the input already applied stands.
    async fn load_below(&mut self, level: HierarchyLevel) {
        let Some(child) = level.child().filter(|c| *c != HierarchyLevel::Position) else {
            return;
        };
        if let Err(e) = self.resolver.cascade_mut().load_children(child).await {
            tracing::warn!(level = %child, error = %e, "Failed to load child options");
        }
    }

    pub async fn open_create(&mut self) -> Result<(), WorkflowError> {
        self.ensure_open()?;
        let prefill = self.location.clone();
        self.resolver.open_create(prefill.as_ref(), None).await
    }

    /// Leave create mode, discarding unconfirmed input. The applied location
    /// is kept unless it is a partial barcode prefix still waiting for its gap.
    pub fn cancel_create(&mut self) {
        self.resolver.cancel_create();
        if self.pending_gap().is_some() {
            tracing::debug!(path = %self.hierarchical_path(), "Discarding partial barcode prefix");
            self.location = None;
            self.autosave.cancel();
            if self.state == ControllerState::LocationChosen {
                self.state = ControllerState::Editing;
            }
        }
        self.pending_gap = None;
        self.dropped_levels = false;
    }

    /// Emit the create form as the chosen location.
    pub fn confirm_created(&mut self) -> Result<(), WorkflowError> {
        self.ensure_open()?;
        let started = Instant::now();
        let location = self.resolver.confirm_created()?;
        self.apply(LocationInputEvent::new(InputSource::Dropdown, started, location));
        Ok(())
    }

    pub async fn search(&mut self, query: &str) -> Result<Vec<SearchResult>, WorkflowError> {
        self.ensure_open()?;
        Ok(self.resolver.search(query).await?.to_vec())
    }

    pub fn select_search_result(&mut self, result: &SearchResult) -> Result<bool, WorkflowError> {
        self.ensure_open()?;
        let started = Instant::now();
        match self.resolver.select_existing(result) {
            Some(location) => {
                self.pending_gap = None;
                self.dropped_levels = false;
                Ok(self.apply(LocationInputEvent::new(InputSource::Dropdown, started, location)))
            }
            None => Ok(false),
        }
    }

    // ------------------------------------------------------------------------
    // Barcode input
    // ------------------------------------------------------------------------

    /// Validate a scanned barcode. The event is stamped when the scan starts,
    /// so dropdown input made while validation is in flight wins.
    pub async fn scan_barcode(&mut self, barcode: &str) -> Result<BarcodeOutcome, WorkflowError> {
        self.ensure_open()?;
        let started = Instant::now();

        if BarcodeComponents::parse(barcode).is_none() {
            let err = WorkflowError::InvalidBarcodeFormat;
            self.barcode_error
                .show(err.to_string(), started, self.options.barcode_error);
            return Err(err);
        }

        let validation = match self.repository.validate_barcode(barcode).await {
            Ok(validation) => validation,
            Err(e) => {
                tracing::error!(barcode = %barcode, error = %e, "Barcode validation failed");
                self.barcode_error
                    .show(e.upstream_message(), Instant::now(), self.options.barcode_error);
                return Err(e.into());
            }
        };

        let outcome = validation.outcome();
        match &outcome {
            BarcodeOutcome::Valid(location) => {
                tracing::info!(barcode = %barcode, path = %location.hierarchical_path(), "Barcode resolved");
                let event = LocationInputEvent::new(InputSource::Barcode, started, location.clone());
                if self.apply(event) {
                    self.barcode_error.clear();
                    self.pending_gap = None;
                    self.dropped_levels = false;
                    if self.resolver.mode() == ResolverMode::Create {
                        self.resolver.cancel_create();
                    }
                }
            }
            BarcodeOutcome::Partial {
                prefix,
                first_missing,
                dropped_levels,
            } => {
                tracing::info!(
                    barcode = %barcode,
                    first_missing = %first_missing,
                    dropped_levels = *dropped_levels,
                    "Barcode partially resolved"
                );
                let event = LocationInputEvent::new(InputSource::Barcode, started, prefix.clone());
                if self.apply(event) {
                    self.barcode_error.clear();
                    self.pending_gap = Some(*first_missing);
                    self.dropped_levels = *dropped_levels;
                    // The prefix alone must not be auto-saved
                    self.touch(started);
                    self.resolver
                        .open_create(Some(prefix), Some(*first_missing))
                        .await?;
                }
            }
            BarcodeOutcome::Invalid { message } => {
                tracing::warn!(barcode = %barcode, message = %message, "Barcode rejected");
                self.barcode_error
                    .show(message.clone(), Instant::now(), self.options.barcode_error);
            }
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------------

    pub fn set_position(&mut self, coordinate: &str) {
        self.position = coordinate.trim().to_string();
        self.resolver.cascade_mut().set_position_input(coordinate);
        if let Some(location) = self.location.as_mut() {
            location.position =
                Some(PositionCoordinate::new(&self.position)).filter(|p| !p.coordinate.is_empty());
        }
        self.touch(Instant::now());
    }

    pub fn set_notes(&mut self, notes: &str) {
        self.notes = notes.to_string();
        self.touch(Instant::now());
    }

    pub fn set_reason(&mut self, reason: &str) {
        self.reason = reason.to_string();
    }

    fn metadata_changed(&self) -> bool {
        self.position.trim() != self.initial_position.trim()
            || self.notes.trim() != self.initial_notes.trim()
    }

    // ------------------------------------------------------------------------
    // Derived state
    // ------------------------------------------------------------------------

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn sample_item_id(&self) -> Option<&str> {
        self.sample_item_id.as_deref()
    }

    pub fn location(&self) -> Option<&ResolvedLocation> {
        self.location.as_ref()
    }

    pub fn resolver(&self) -> &LocationResolver {
        &self.resolver
    }

    pub fn current(&self) -> Option<&CurrentLocation> {
        self.current.as_ref()
    }

    pub fn is_movement_mode(&self) -> bool {
        self.current.as_ref().is_some_and(CurrentLocation::is_assigned)
    }

    pub fn hierarchical_path(&self) -> String {
        self.location
            .as_ref()
            .map(ResolvedLocation::hierarchical_path)
            .unwrap_or_default()
    }

    pub fn position(&self) -> &str {
        &self.position
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Level the create form was opened at by a partial barcode, until resolved.
    pub fn pending_gap(&self) -> Option<HierarchyLevel> {
        self.pending_gap
            .filter(|gap| {
                self.location
                    .as_ref()
                    .and_then(ResolvedLocation::deepest_level)
                    .map_or(true, |deepest| deepest.depth() < gap.depth())
            })
    }

    pub fn dropped_levels_warning(&self) -> bool {
        self.dropped_levels && self.pending_gap().is_some()
    }

    pub fn barcode_error(&self, now: Instant) -> Option<&str> {
        self.barcode_error.get(now).map(String::as_str)
    }

    pub fn autosaved_visible(&self, now: Instant) -> bool {
        self.autosaved.is_visible(now)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn autosave_deadline(&self) -> Option<Instant> {
        self.autosave.deadline()
    }

    /// Earliest instant a transient indicator disappears.
    pub fn next_indicator_expiry(&self, now: Instant) -> Option<Instant> {
        [self.barcode_error.expires_at(), self.autosaved.expires_at()]
            .into_iter()
            .flatten()
            .filter(|until| *until > now)
            .min()
    }

    fn location_confirmable(&self) -> bool {
        self.pending_gap().is_none()
            && self
                .location
                .as_ref()
                .is_some_and(|l| l.is_assignable() && l.target().is_some())
    }

    pub fn can_confirm(&self) -> bool {
        if matches!(self.state, ControllerState::Idle | ControllerState::Confirming) {
            return false;
        }
        self.location_confirmable() || (self.is_movement_mode() && self.metadata_changed())
    }

    fn can_auto_save(&self) -> bool {
        self.can_confirm()
    }

    /// Movement mode and the chosen containers differ from the current ones.
    /// Position is metadata and does not count as a move.
    pub fn show_reason_for_move(&self) -> bool {
        let Some(current) = self.current.as_ref().and_then(CurrentLocation::container_path) else {
            return false;
        };
        let path = self
            .location
            .as_ref()
            .map(ResolvedLocation::container_path)
            .unwrap_or_default();
        !path.is_empty() && path != current
    }

    // ------------------------------------------------------------------------
    // Confirm / auto-save
    // ------------------------------------------------------------------------

    pub async fn confirm(&mut self) -> Result<ConfirmOutcome, WorkflowError> {
        self.persist(true).await
    }

    /// Run the auto-save if its deadline has passed. Returns `None` when
    /// nothing was due.
    pub async fn run_autosave_if_due(
        &mut self,
        now: Instant,
    ) -> Option<Result<ConfirmOutcome, WorkflowError>> {
        if !self.autosave.take_due(now) {
            return None;
        }
        Some(self.persist(false).await)
    }

    async fn persist(&mut self, close_on_success: bool) -> Result<ConfirmOutcome, WorkflowError> {
        self.ensure_open()?;
        if !self.can_confirm() {
            return Err(WorkflowError::NothingToConfirm);
        }
        let sample_item_id = self
            .sample_item_id
            .clone()
            .ok_or(WorkflowError::NotEditing)?;

        self.autosave.cancel();
        let previous = self.state;
        self.state = ControllerState::Confirming;

        let target = self
            .location
            .as_ref()
            .filter(|_| self.location_confirmable())
            .and_then(ResolvedLocation::target);

        let result = match target {
            Some(target) => {
                let reason = self.show_reason_for_move().then_some(self.reason.as_str());
                let request = AssignmentRequest::new(&sample_item_id, target)
                    .with_position(Some(&self.position))
                    .with_notes(Some(&self.notes))
                    .with_reason(reason);
                self.repository
                    .assign(&request)
                    .await
                    .map(ConfirmOutcome::Assigned)
            }
            None => {
                let update = MetadataUpdate::new(Some(&self.position), Some(&self.notes));
                self.repository
                    .update_metadata(&sample_item_id, &update)
                    .await
                    .map(|_| ConfirmOutcome::MetadataUpdated)
            }
        };

        match result {
            Ok(outcome) => {
                tracing::info!(
                    sample_item_id = %sample_item_id,
                    autosave = !close_on_success,
                    "Storage location saved"
                );
                if close_on_success {
                    self.close();
                } else {
                    self.state = previous;
                    self.rebase(&outcome);
                    self.autosaved
                        .show((), Instant::now(), self.options.autosaved_indicator);
                }
                Ok(outcome)
            }
            Err(e) => {
                let message = e.upstream_message();
                tracing::error!(sample_item_id = %sample_item_id, error = %e, "Failed to save storage location");
                self.state = previous;
                self.last_error = Some(message.clone());
                Err(WorkflowError::AssignmentFailed(message))
            }
        }
    }

    /// After an auto-save the saved values become the new baseline.
    fn rebase(&mut self, outcome: &ConfirmOutcome) {
        let path = match outcome {
            ConfirmOutcome::Assigned(receipt) => receipt
                .hierarchical_path
                .clone()
                .unwrap_or_else(|| self.hierarchical_path()),
            ConfirmOutcome::MetadataUpdated => self
                .current
                .as_ref()
                .and_then(|c| c.hierarchical_path.clone())
                .unwrap_or_default(),
        };
        let previous = self.current.take().unwrap_or_default();
        self.current = Some(CurrentLocation {
            hierarchical_path: Some(path),
            position_coordinate: Some(self.position.clone()).filter(|p| !p.is_empty()),
            notes: Some(self.notes.clone()).filter(|n| !n.is_empty()),
            ..previous
        });
        self.initial_position = self.position.clone();
        self.initial_notes = self.notes.clone();
    }
}

impl Drop for LocationAssignmentController {
    fn drop(&mut self) {
        self.autosave.cancel();
    }
}
