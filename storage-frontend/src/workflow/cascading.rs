//! Four dependent hierarchy fields with create-on-the-fly.
//!
//! Each field resolves typed text against the children of its parent. A field
//! holds nothing, an existing node, or a proposed node the user may create.
//! Changing a field to a different node clears every field below it.

use super::WorkflowError;
use crate::models::{
    HierarchyLevel, HierarchyNode, NewNode, NodeId, PositionCoordinate, ResolvedLocation,
};
use crate::services::HierarchyRepository;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldValue {
    #[default]
    Empty,
    Existing(HierarchyNode),
    Proposed(HierarchyNode),
}

impl FieldValue {
    pub fn node(&self) -> Option<&HierarchyNode> {
        match self {
            FieldValue::Empty => None,
            FieldValue::Existing(node) | FieldValue::Proposed(node) => Some(node),
        }
    }

    pub fn persisted_id(&self) -> Option<&NodeId> {
        match self {
            FieldValue::Existing(node) => node.id.as_ref(),
            _ => None,
        }
    }

    /// Resolved to an existing node or a proposal with a name.
    pub fn is_resolved(&self) -> bool {
        match self {
            FieldValue::Empty => false,
            FieldValue::Existing(_) => true,
            FieldValue::Proposed(node) => !node.display_name.trim().is_empty(),
        }
    }

    fn same_identity(&self, other: &FieldValue) -> bool {
        match (self.node(), other.node()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same_identity(b),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LevelField {
    pub level: HierarchyLevel,
    input: String,
    value: FieldValue,
    options: Vec<HierarchyNode>,
    options_parent: Option<NodeId>,
    error: Option<String>,
}

impl LevelField {
    fn new(level: HierarchyLevel) -> Self {
        Self {
            level,
            input: String::new(),
            value: FieldValue::Empty,
            options: Vec::new(),
            options_parent: None,
            error: None,
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn options(&self) -> &[HierarchyNode] {
        &self.options
    }

    /// Parent the current options were loaded for.
    pub fn options_parent(&self) -> Option<&NodeId> {
        self.options_parent.as_ref()
    }

    /// Last create failure, as reported by the server.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_proposed(&self) -> bool {
        matches!(self.value, FieldValue::Proposed(_))
    }

    fn reset(&mut self) {
        self.input.clear();
        self.value = FieldValue::Empty;
        self.options.clear();
        self.options_parent = None;
        self.error = None;
    }
}

/// Identifies one child-list request; a response is applied only while the
/// field's parent is still the one the request was made for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub level: HierarchyLevel,
    pub parent: Option<NodeId>,
}

pub struct CascadingSelector {
    repository: Arc<dyn HierarchyRepository>,
    fields: [LevelField; 4],
    position_input: String,
    cache: HashMap<(HierarchyLevel, Option<NodeId>), Vec<HierarchyNode>>,
    focus: Option<HierarchyLevel>,
}

impl CascadingSelector {
    pub fn new(repository: Arc<dyn HierarchyRepository>) -> Self {
        Self {
            repository,
            fields: HierarchyLevel::CASCADE.map(LevelField::new),
            position_input: String::new(),
            cache: HashMap::new(),
            focus: None,
        }
    }

    fn index(level: HierarchyLevel) -> Option<usize> {
        HierarchyLevel::CASCADE.iter().position(|l| *l == level)
    }

    pub fn field(&self, level: HierarchyLevel) -> Option<&LevelField> {
        Self::index(level).map(|i| &self.fields[i])
    }

    fn field_mut(&mut self, level: HierarchyLevel) -> Option<&mut LevelField> {
        Self::index(level).map(move |i| &mut self.fields[i])
    }

    fn value(&self, level: HierarchyLevel) -> &FieldValue {
        const EMPTY: &FieldValue = &FieldValue::Empty;
        self.field(level).map_or(EMPTY, |f| &f.value)
    }

    /// Persisted id of the parent of `level`; `None` for rooms or while the
    /// parent is empty or only proposed.
    pub fn parent_id(&self, level: HierarchyLevel) -> Option<NodeId> {
        level
            .parent()
            .and_then(|parent| self.value(parent).persisted_id().cloned())
    }

    /// A field is interactable once its parent holds at least a named proposal.
    pub fn is_enterable(&self, level: HierarchyLevel) -> bool {
        match level.parent() {
            None => level == HierarchyLevel::Room,
            Some(parent) => self.value(parent).is_resolved(),
        }
    }

    /// The "Add new" control: non-empty text with no matching sibling, under a
    /// resolved parent. Creation itself still needs the parent persisted.
    pub fn can_create(&self, level: HierarchyLevel) -> bool {
        self.is_enterable(level)
            && self
                .field(level)
                .is_some_and(|f| f.is_proposed() && !f.input.trim().is_empty())
    }

    pub fn focus(&mut self, level: HierarchyLevel) {
        self.focus = Some(level);
    }

    pub fn focused(&self) -> Option<HierarchyLevel> {
        self.focus
    }

    pub fn position_input(&self) -> &str {
        &self.position_input
    }

    pub fn set_position_input(&mut self, text: &str) {
        self.position_input = text.trim().to_string();
    }

    pub fn reset(&mut self) {
        for field in self.fields.iter_mut() {
            field.reset();
        }
        self.position_input.clear();
        self.focus = None;
    }

    // ------------------------------------------------------------------------
    // Child lists
    // ------------------------------------------------------------------------

    /// Start loading the options of `level`. `None` when there is nothing to
    /// load because the parent is not persisted yet; the options are cleared.
    pub fn begin_load(&mut self, level: HierarchyLevel) -> Option<LoadTicket> {
        let parent = self.parent_id(level);
        let field = self.field_mut(level)?;
        if level != HierarchyLevel::Room && parent.is_none() {
            field.options.clear();
            field.options_parent = None;
            return None;
        }
        Some(LoadTicket { level, parent })
    }

    /// Apply a child list. Returns `false` and leaves the field untouched when
    /// the field's parent changed since the ticket was issued.
    pub fn finish_load(&mut self, ticket: LoadTicket, nodes: Vec<HierarchyNode>) -> bool {
        if self.parent_id(ticket.level) != ticket.parent {
            tracing::debug!(level = %ticket.level, "Discarding stale child list");
            return false;
        }
        let active: Vec<HierarchyNode> = nodes.into_iter().filter(|n| n.active).collect();
        self.cache
            .insert((ticket.level, ticket.parent.clone()), active.clone());
        match self.field_mut(ticket.level) {
            Some(field) => {
                field.options = active;
                field.options_parent = ticket.parent;
                field.error = None;
                true
            }
            None => false,
        }
    }

    /// Fetch (or reuse cached) active children for the current parent of `level`.
    pub async fn load_children(
        &mut self,
        level: HierarchyLevel,
    ) -> Result<Vec<HierarchyNode>, WorkflowError> {
        let Some(ticket) = self.begin_load(level) else {
            return Ok(Vec::new());
        };

        let key = (level, ticket.parent.clone());
        let nodes = match self.cache.get(&key) {
            Some(cached) => cached.clone(),
            None => {
                let fetched = self
                    .repository
                    .list_children(level, ticket.parent.as_ref())
                    .await;
                match fetched {
                    Ok(nodes) => nodes,
                    Err(e) => {
                        if let Some(field) = self.field_mut(level) {
                            field.error = Some(e.upstream_message());
                        }
                        return Err(e.into());
                    }
                }
            }
        };

        if self.finish_load(ticket, nodes) {
            Ok(self.field(level).map(|f| f.options.clone()).unwrap_or_default())
        } else {
            Ok(Vec::new())
        }
    }

    // ------------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------------

    /// Replace the value of `level`, clearing the levels below when it now
    /// denotes a different node.
    fn resolve(&mut self, level: HierarchyLevel, value: FieldValue) {
        let Some(index) = Self::index(level) else {
            return;
        };
        let changed = !self.fields[index].value.same_identity(&value);
        self.fields[index].value = value;
        self.fields[index].error = None;
        if changed {
            for field in self.fields.iter_mut().skip(index + 1) {
                field.reset();
            }
            self.position_input.clear();
        }
    }

    /// Resolve typed text against the loaded siblings (trimmed, case-insensitive).
    pub fn set_field_input(&mut self, level: HierarchyLevel, text: &str) -> Result<(), WorkflowError> {
        if level == HierarchyLevel::Position {
            self.set_position_input(text);
            return Ok(());
        }
        if !self.is_enterable(level) {
            return Err(WorkflowError::FieldLocked(level));
        }

        let parent = self.parent_id(level);
        let Some(field) = self.field_mut(level) else {
            return Ok(());
        };
        field.input = text.to_string();

        let value = if text.trim().is_empty() {
            FieldValue::Empty
        } else {
            match field.options.iter().find(|n| n.matches_name(text)) {
                Some(existing) => FieldValue::Existing(existing.clone()),
                None => {
                    let mut proposed = HierarchyNode::proposed(level, text);
                    proposed.parent_id = parent;
                    FieldValue::Proposed(proposed)
                }
            }
        };
        self.resolve(level, value);
        Ok(())
    }

    /// Pick a node directly, bypassing text matching.
    pub fn select_from_list(
        &mut self,
        level: HierarchyLevel,
        node: HierarchyNode,
    ) -> Result<(), WorkflowError> {
        if !self.is_enterable(level) {
            return Err(WorkflowError::FieldLocked(level));
        }
        if let Some(field) = self.field_mut(level) {
            field.input = node.display_name.clone();
        }
        let value = if node.is_persisted() {
            FieldValue::Existing(node)
        } else {
            FieldValue::Proposed(node)
        };
        self.resolve(level, value);
        Ok(())
    }

    /// Persist the proposed node of `level` under its persisted parent.
    ///
    /// On failure the proposal and the typed text stay as they were and the
    /// server message is kept on the field.
    pub async fn create_pending_node(
        &mut self,
        level: HierarchyLevel,
    ) -> Result<HierarchyNode, WorkflowError> {
        let proposed = match self.field(level).map(|f| &f.value) {
            Some(FieldValue::Proposed(node)) if !node.display_name.is_empty() => node.clone(),
            _ => return Err(WorkflowError::NothingToCreate(level)),
        };
        let parent = self.parent_id(level);
        if level != HierarchyLevel::Room && parent.is_none() {
            return Err(WorkflowError::ParentNotPersisted(level));
        }

        let request = NewNode::new(level, &proposed.display_name, parent.clone());
        match self.repository.create_node(&request).await {
            Ok(created) => {
                tracing::info!(level = %level, id = ?created.id, "Created node from proposal");
                if let Some(field) = self.field_mut(level) {
                    field.value = FieldValue::Existing(created.clone());
                    field.options.push(created.clone());
                    field.error = None;
                }
                if let Some(cached) = self.cache.get_mut(&(level, parent)) {
                    cached.push(created.clone());
                }
                // Staged child proposals now hang off the saved node
                if let Some(child) = level.child().and_then(|c| self.field_mut(c)) {
                    if let FieldValue::Proposed(node) = &mut child.value {
                        node.parent_id = created.id.clone();
                    }
                }
                Ok(created)
            }
            Err(e) => {
                let message = e.upstream_message();
                tracing::warn!(level = %level, error = %e, "Node creation rejected");
                if let Some(field) = self.field_mut(level) {
                    field.error = Some(message.clone());
                }
                Err(WorkflowError::CreateFailed { level, message })
            }
        }
    }

    // ------------------------------------------------------------------------
    // Whole-form state
    // ------------------------------------------------------------------------

    pub fn snapshot(&self) -> ResolvedLocation {
        let mut location = ResolvedLocation::new();
        for field in &self.fields {
            if field.value.is_resolved() {
                location.set_node(field.level, field.value.node().cloned());
            }
        }
        if !self.position_input.is_empty() {
            location.position = Some(PositionCoordinate::new(&self.position_input));
        }
        location
    }

    /// Load a location into the fields, persisted levels as existing nodes and
    /// the rest as proposals. Stops at the first empty level.
    pub fn prefill(&mut self, location: &ResolvedLocation) {
        self.reset();
        for level in HierarchyLevel::CASCADE {
            let Some(node) = location.node(level) else {
                break;
            };
            let value = if node.is_persisted() {
                FieldValue::Existing(node.clone())
            } else {
                FieldValue::Proposed(node.clone())
            };
            if let Some(field) = self.field_mut(level) {
                field.input = node.display_name.clone();
                field.value = value;
            }
        }
        if let Some(coordinate) = location.position_coordinate() {
            self.position_input = coordinate.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryHierarchy;
    use lis_core::error::AppError;

    async fn selector() -> (CascadingSelector, Arc<InMemoryHierarchy>, NodeId) {
        let store = Arc::new(InMemoryHierarchy::new());
        let room = store.seed(HierarchyLevel::Room, "Main Lab", None, None).await;
        store.seed(HierarchyLevel::Room, "Cold Room", None, None).await;
        store
            .seed(HierarchyLevel::Device, "Freezer 1", None, Some(&room))
            .await;
        let mut selector = CascadingSelector::new(store.clone());
        selector.load_children(HierarchyLevel::Room).await.unwrap();
        (selector, store, room)
    }

    #[tokio::test]
    async fn test_exact_match_resolves_existing() {
        let (mut selector, _, room) = selector().await;
        selector.set_field_input(HierarchyLevel::Room, " main LAB ").unwrap();

        let value = selector.field(HierarchyLevel::Room).unwrap().value();
        assert_eq!(value.persisted_id(), Some(&room));
        assert!(selector.is_enterable(HierarchyLevel::Device));
        assert!(!selector.can_create(HierarchyLevel::Room));
    }

    #[tokio::test]
    async fn test_unmatched_text_is_proposed() {
        let (mut selector, _, _) = selector().await;
        selector.set_field_input(HierarchyLevel::Room, "New Room X").unwrap();

        assert!(selector.field(HierarchyLevel::Room).unwrap().is_proposed());
        assert!(selector.can_create(HierarchyLevel::Room));
        assert!(selector.is_enterable(HierarchyLevel::Device));
        assert!(selector.parent_id(HierarchyLevel::Device).is_none());
    }

    #[tokio::test]
    async fn test_locked_field_rejects_input() {
        let (mut selector, _, _) = selector().await;
        let err = selector
            .set_field_input(HierarchyLevel::Shelf, "Shelf A")
            .unwrap_err();
        assert!(matches!(err, WorkflowError::FieldLocked(HierarchyLevel::Shelf)));
    }

    #[tokio::test]
    async fn test_changing_parent_clears_descendants() {
        let (mut selector, _, _) = selector().await;
        selector.set_field_input(HierarchyLevel::Room, "Main Lab").unwrap();
        selector.load_children(HierarchyLevel::Device).await.unwrap();
        selector.set_field_input(HierarchyLevel::Device, "Freezer 1").unwrap();
        selector.set_field_input(HierarchyLevel::Shelf, "Top").unwrap();
        selector.set_position_input("A1");

        selector.set_field_input(HierarchyLevel::Room, "cold room").unwrap();
        assert_eq!(
            selector.field(HierarchyLevel::Room).unwrap().value().node().unwrap().display_name,
            "Cold Room"
        );
        assert_eq!(
            selector.field(HierarchyLevel::Device).unwrap().value(),
            &FieldValue::Empty
        );
        assert_eq!(
            selector.field(HierarchyLevel::Shelf).unwrap().value(),
            &FieldValue::Empty
        );
        assert_eq!(selector.position_input(), "");
    }

    #[tokio::test]
    async fn test_reselecting_same_node_keeps_descendants() {
        let (mut selector, _, _) = selector().await;
        selector.set_field_input(HierarchyLevel::Room, "Main Lab").unwrap();
        selector.load_children(HierarchyLevel::Device).await.unwrap();
        selector.set_field_input(HierarchyLevel::Device, "Freezer 1").unwrap();

        selector.set_field_input(HierarchyLevel::Room, "MAIN LAB").unwrap();
        assert!(matches!(
            selector.field(HierarchyLevel::Device).unwrap().value(),
            FieldValue::Existing(_)
        ));
    }

    #[tokio::test]
    async fn test_empty_text_resets_level() {
        let (mut selector, _, _) = selector().await;
        selector.set_field_input(HierarchyLevel::Room, "Main Lab").unwrap();
        selector.set_field_input(HierarchyLevel::Device, "Whatever").unwrap();
        selector.set_field_input(HierarchyLevel::Room, "   ").unwrap();
        assert_eq!(
            selector.field(HierarchyLevel::Room).unwrap().value(),
            &FieldValue::Empty
        );
        assert!(!selector.is_enterable(HierarchyLevel::Device));
    }

    #[tokio::test]
    async fn test_create_under_proposed_parent_is_blocked() {
        let (mut selector, _, _) = selector().await;
        selector.set_field_input(HierarchyLevel::Room, "New Room X").unwrap();
        selector.set_field_input(HierarchyLevel::Device, "New Device").unwrap();

        assert!(selector.can_create(HierarchyLevel::Device));
        let err = selector
            .create_pending_node(HierarchyLevel::Device)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ParentNotPersisted(HierarchyLevel::Device)));
    }

    #[tokio::test]
    async fn test_create_chain_unblocks_children() {
        let (mut selector, store, _) = selector().await;
        selector.set_field_input(HierarchyLevel::Room, "New Room X").unwrap();
        selector.set_field_input(HierarchyLevel::Device, "New Device").unwrap();

        let room = selector.create_pending_node(HierarchyLevel::Room).await.unwrap();
        assert!(room.is_persisted());
        assert_eq!(selector.parent_id(HierarchyLevel::Device), room.id);
        assert!(selector.field(HierarchyLevel::Device).unwrap().is_proposed());

        let device = selector
            .create_pending_node(HierarchyLevel::Device)
            .await
            .unwrap();
        assert_eq!(device.parent_id, room.id);
        assert_eq!(store.node_count(HierarchyLevel::Device).await, 2);
    }

    #[tokio::test]
    async fn test_failed_create_preserves_input() {
        let (mut selector, store, _) = selector().await;
        store
            .fail_next_create(AppError::BadRequest("Room code NEWRO already exists".into()))
            .await;
        selector.set_field_input(HierarchyLevel::Room, "New Room X").unwrap();

        let err = selector
            .create_pending_node(HierarchyLevel::Room)
            .await
            .unwrap_err();
        match err {
            WorkflowError::CreateFailed { message, .. } => {
                assert_eq!(message, "Room code NEWRO already exists")
            }
            other => panic!("unexpected error {:?}", other),
        }
        let field = selector.field(HierarchyLevel::Room).unwrap();
        assert_eq!(field.input(), "New Room X");
        assert!(field.is_proposed());
        assert_eq!(field.error(), Some("Room code NEWRO already exists"));
    }

    #[tokio::test]
    async fn test_stale_child_list_is_discarded() {
        let (mut selector, _, _) = selector().await;
        selector.set_field_input(HierarchyLevel::Room, "Main Lab").unwrap();

        let ticket = selector.begin_load(HierarchyLevel::Device).unwrap();
        selector.set_field_input(HierarchyLevel::Room, "Cold Room").unwrap();

        let late = vec![HierarchyNode::persisted(HierarchyLevel::Device, "2", "Freezer 1")];
        assert!(!selector.finish_load(ticket, late));
        assert!(selector.field(HierarchyLevel::Device).unwrap().options().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_children_are_not_offered() {
        let (mut selector, _, room) = selector().await;
        selector.set_field_input(HierarchyLevel::Room, "Main Lab").unwrap();

        let ticket = selector.begin_load(HierarchyLevel::Device).unwrap();
        let nodes = vec![
            HierarchyNode::persisted(HierarchyLevel::Device, "2", "Freezer 1")
                .with_parent(room.clone()),
            HierarchyNode::persisted(HierarchyLevel::Device, "5", "Old Freezer")
                .with_parent(room)
                .inactive(),
        ];
        assert!(selector.finish_load(ticket, nodes));

        let options = selector.field(HierarchyLevel::Device).unwrap().options();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].display_name, "Freezer 1");

        // An inactive name is proposed as new rather than matched
        selector
            .set_field_input(HierarchyLevel::Device, "old freezer")
            .unwrap();
        assert!(selector.field(HierarchyLevel::Device).unwrap().is_proposed());
    }

    #[tokio::test]
    async fn test_failed_child_list_is_kept_on_field() {
        let (mut selector, store, _) = selector().await;
        selector.set_field_input(HierarchyLevel::Room, "Main Lab").unwrap();
        store
            .fail_next_list(HierarchyLevel::Device, AppError::BadGateway("list down".into()))
            .await;

        let err = selector
            .load_children(HierarchyLevel::Device)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Repository(AppError::BadGateway(_))));
        assert!(selector.field(HierarchyLevel::Room).unwrap().value().is_resolved());
        assert_eq!(
            selector.field(HierarchyLevel::Device).unwrap().error(),
            Some("Unexpected response from server: list down")
        );

        selector.load_children(HierarchyLevel::Device).await.unwrap();
        assert!(selector.field(HierarchyLevel::Device).unwrap().error().is_none());
    }

    #[tokio::test]
    async fn test_children_are_cached_per_parent() {
        let (mut selector, store, _) = selector().await;
        selector.set_field_input(HierarchyLevel::Room, "Main Lab").unwrap();
        selector.load_children(HierarchyLevel::Device).await.unwrap();
        let calls = store.list_calls().await;
        selector.load_children(HierarchyLevel::Device).await.unwrap();
        assert_eq!(store.list_calls().await, calls);
    }

    #[tokio::test]
    async fn test_prefill_and_snapshot() {
        let (mut selector, _, room) = selector().await;
        let location = ResolvedLocation::new()
            .with(HierarchyNode::persisted(HierarchyLevel::Room, room.clone(), "Main Lab"))
            .with(HierarchyNode::proposed(HierarchyLevel::Device, "Freezer 9"));
        selector.prefill(&location);
        selector.focus(HierarchyLevel::Shelf);

        assert!(selector.field(HierarchyLevel::Device).unwrap().is_proposed());
        assert_eq!(selector.focused(), Some(HierarchyLevel::Shelf));
        assert_eq!(selector.snapshot().hierarchical_path(), "Main Lab > Freezer 9");
    }
}
