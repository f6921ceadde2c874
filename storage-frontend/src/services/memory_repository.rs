//! In-process hierarchy store.
//!
//! Behaves like the storage backend closely enough to drive the workflow
//! without a server: parent scoping, duplicate-name rejection, progressive
//! barcode validation and sample placements. Failures can be injected for the
//! next listing, create or assign call.

use crate::models::{
    AssignmentReceipt, AssignmentRequest, BarcodeComponents, BarcodeValidation, CurrentLocation,
    HierarchyLevel, HierarchyNode, MetadataUpdate, NewNode, NodeId, NodeRecord, ResolvedLocation,
    SearchResult, PATH_SEPARATOR,
};
use crate::services::repository::HierarchyRepository;
use async_trait::async_trait;
use lis_core::error::AppError;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use validator::Validate;

#[derive(Default)]
struct State {
    nodes: Vec<HierarchyNode>,
    next_id: u64,
    placements: HashMap<String, CurrentLocation>,
    assignments: Vec<AssignmentRequest>,
    metadata_updates: Vec<(String, MetadataUpdate)>,
    list_calls: usize,
    fail_next_list: Option<(HierarchyLevel, AppError)>,
    fail_next_create: Option<AppError>,
    fail_next_assign: Option<AppError>,
}

impl State {
    fn find(&self, id: &NodeId) -> Option<&HierarchyNode> {
        self.nodes.iter().find(|n| n.id.as_ref() == Some(id))
    }

    fn children<'a>(
        &'a self,
        level: HierarchyLevel,
        parent: Option<&'a NodeId>,
    ) -> impl Iterator<Item = &'a HierarchyNode> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.level == level && n.parent_id.as_ref() == parent)
    }

    /// Ancestors of `node` from the room down, `node` included.
    fn lineage(&self, node: &HierarchyNode) -> Vec<HierarchyNode> {
        let mut chain = vec![node.clone()];
        let mut current = node.parent_id.clone();
        while let Some(id) = current {
            match self.find(&id) {
                Some(parent) => {
                    current = parent.parent_id.clone();
                    chain.push(parent.clone());
                }
                None => break,
            }
        }
        chain.reverse();
        chain
    }

    fn path_of(&self, node: &HierarchyNode, position: Option<&str>) -> String {
        let mut parts: Vec<String> = self
            .lineage(node)
            .into_iter()
            .map(|n| n.display_name)
            .collect();
        if let Some(coordinate) = position {
            parts.push(format!("Position {}", coordinate));
        }
        parts.join(PATH_SEPARATOR)
    }

    fn matches_component(node: &HierarchyNode, component: &str) -> bool {
        node.code
            .as_deref()
            .is_some_and(|code| code.eq_ignore_ascii_case(component))
            || node.matches_name(component)
    }
}

pub struct InMemoryHierarchy {
    state: Mutex<State>,
}

impl Default for InMemoryHierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHierarchy {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Insert an already persisted node, assigning the next free id.
    pub async fn seed(
        &self,
        level: HierarchyLevel,
        name: &str,
        code: Option<&str>,
        parent: Option<&NodeId>,
    ) -> NodeId {
        let mut state = self.state.lock().await;
        let id = NodeId::from(state.next_id);
        state.next_id += 1;

        let mut node = HierarchyNode::persisted(level, id.clone(), name);
        node.code = code.map(str::to_string);
        node.parent_id = parent.cloned();
        state.nodes.push(node);
        id
    }

    pub async fn deactivate(&self, id: &NodeId) {
        let mut state = self.state.lock().await;
        if let Some(node) = state.nodes.iter_mut().find(|n| n.id.as_ref() == Some(id)) {
            node.active = false;
        }
    }

    /// Record an existing placement for a sample item.
    pub async fn place(&self, sample_item_id: &str, location: CurrentLocation) {
        self.state
            .lock()
            .await
            .placements
            .insert(sample_item_id.to_string(), location);
    }

    /// Fail the next child listing of `level`.
    pub async fn fail_next_list(&self, level: HierarchyLevel, error: AppError) {
        self.state.lock().await.fail_next_list = Some((level, error));
    }

    pub async fn fail_next_create(&self, error: AppError) {
        self.state.lock().await.fail_next_create = Some(error);
    }

    pub async fn fail_next_assign(&self, error: AppError) {
        self.state.lock().await.fail_next_assign = Some(error);
    }

    pub async fn assignments(&self) -> Vec<AssignmentRequest> {
        self.state.lock().await.assignments.clone()
    }

    pub async fn metadata_updates(&self) -> Vec<(String, MetadataUpdate)> {
        self.state.lock().await.metadata_updates.clone()
    }

    pub async fn list_calls(&self) -> usize {
        self.state.lock().await.list_calls
    }

    pub async fn node_count(&self, level: HierarchyLevel) -> usize {
        self.state
            .lock()
            .await
            .nodes
            .iter()
            .filter(|n| n.level == level)
            .count()
    }
}

#[async_trait]
impl HierarchyRepository for InMemoryHierarchy {
    async fn list_children(
        &self,
        level: HierarchyLevel,
        parent: Option<&NodeId>,
    ) -> Result<Vec<HierarchyNode>, AppError> {
        let mut state = self.state.lock().await;
        state.list_calls += 1;
        if state
            .fail_next_list
            .as_ref()
            .is_some_and(|(failing, _)| *failing == level)
        {
            if let Some((_, error)) = state.fail_next_list.take() {
                return Err(error);
            }
        }
        if level != HierarchyLevel::Room && parent.is_none() {
            return Ok(Vec::new());
        }
        Ok(state
            .children(level, parent)
            .filter(|n| n.active)
            .cloned()
            .collect())
    }

    async fn create_node(&self, node: &NewNode) -> Result<HierarchyNode, AppError> {
        node.validate()?;
        let mut state = self.state.lock().await;
        if let Some(error) = state.fail_next_create.take() {
            return Err(error);
        }

        if node.level != HierarchyLevel::Room {
            match &node.parent_id {
                Some(parent) if state.find(parent).is_some() => {}
                _ => {
                    return Err(AppError::NotFound(format!(
                        "Parent of {} not found",
                        node.level.label()
                    )))
                }
            }
        }

        let duplicate = state
            .children(node.level, node.parent_id.as_ref())
            .any(|sibling| sibling.matches_name(&node.display_name));
        if duplicate {
            return Err(AppError::Conflict(format!(
                "{} '{}' already exists",
                node.level.label(),
                node.display_name
            )));
        }

        let id = NodeId::from(state.next_id);
        state.next_id += 1;
        let mut created = HierarchyNode::persisted(node.level, id, &node.display_name);
        created.code = node.code.clone();
        created.parent_id = node.parent_id.clone();
        state.nodes.push(created.clone());
        Ok(created)
    }

    async fn search_locations(&self, query: &str) -> Result<Vec<SearchResult>, AppError> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let state = self.state.lock().await;
        let results = state
            .nodes
            .iter()
            .filter(|n| n.active && n.display_name.to_lowercase().contains(&query))
            .filter_map(|n| {
                let mut location = ResolvedLocation::new();
                for node in state.lineage(n) {
                    let level = node.level;
                    location.set_node(level, Some(node));
                }
                SearchResult::from_location(&location)
            })
            .collect();
        Ok(results)
    }

    async fn validate_barcode(&self, barcode: &str) -> Result<BarcodeValidation, AppError> {
        let Some(components) = BarcodeComponents::parse(barcode) else {
            return Ok(BarcodeValidation {
                error_message: Some(format!("Invalid barcode format: {}", barcode.trim())),
                ..Default::default()
            });
        };

        let state = self.state.lock().await;
        let mut found: BTreeMap<HierarchyLevel, NodeRecord> = BTreeMap::new();
        let mut parent: Option<NodeId> = None;
        let mut first_missing = None;

        for level in HierarchyLevel::CASCADE
            .into_iter()
            .take(components.depth())
        {
            let Some(component) = components.component(level) else {
                break;
            };
            let hit = state
                .children(level, parent.as_ref())
                .find(|n| n.active && State::matches_component(n, component))
                .cloned();
            match hit {
                Some(node) => {
                    found.insert(level, NodeRecord::from_node(&node));
                    parent = node.id;
                }
                None => {
                    first_missing = Some((level, component.to_string()));
                    break;
                }
            }
        }

        let mut validation = BarcodeValidation {
            barcode_type: Some("location".to_string()),
            ..Default::default()
        };

        match first_missing {
            None => {
                validation.success = true;
                validation.inline.room = found.get(&HierarchyLevel::Room).cloned();
                validation.inline.device = found.get(&HierarchyLevel::Device).cloned();
                validation.inline.shelf = found.get(&HierarchyLevel::Shelf).cloned();
                validation.inline.rack = found.get(&HierarchyLevel::Rack).cloned();
                validation.inline.position = components
                    .component(HierarchyLevel::Position)
                    .map(|coordinate| NodeRecord {
                        coordinate: Some(coordinate.to_string()),
                        ..Default::default()
                    });
            }
            Some((level, component)) => {
                validation.error_message =
                    Some(format!("{} '{}' not found", level.label(), component));
                validation.first_missing_level = Some(level);
                validation.has_additional_invalid_levels = components.depth() > level.depth() + 1;
                validation.valid_components = found;
            }
        }
        Ok(validation)
    }

    async fn assign(&self, request: &AssignmentRequest) -> Result<AssignmentReceipt, AppError> {
        let mut state = self.state.lock().await;
        if let Some(error) = state.fail_next_assign.take() {
            return Err(error);
        }

        let target = state
            .find(&request.location_id)
            .filter(|n| n.level == request.location_type)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "{} {} not found",
                    request.location_type.label(),
                    request.location_id
                ))
            })?;
        if !target.active {
            return Err(AppError::BadRequest(format!(
                "{} is inactive",
                target.display_name
            )));
        }

        let path = state.path_of(&target, request.position_coordinate.as_deref());
        let assignment_id = NodeId::from(state.next_id);
        state.next_id += 1;
        state.assignments.push(request.clone());
        state.placements.insert(
            request.sample_item_id.clone(),
            CurrentLocation {
                sample_item_id: Some(NodeId::from(request.sample_item_id.as_str())),
                hierarchical_path: Some(path.clone()),
                position_coordinate: request.position_coordinate.clone(),
                notes: request.notes.clone(),
                ..Default::default()
            },
        );

        Ok(AssignmentReceipt {
            assignment_id: Some(assignment_id),
            hierarchical_path: Some(path),
        })
    }

    async fn update_metadata(
        &self,
        sample_item_id: &str,
        update: &MetadataUpdate,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        let placement = state
            .placements
            .get_mut(sample_item_id)
            .filter(|p| p.is_assigned())
            .ok_or_else(|| {
                AppError::NotFound(format!("Sample item {} has no location", sample_item_id))
            })?;
        placement.position_coordinate = update.position_coordinate.clone();
        placement.notes = update.notes.clone();
        state
            .metadata_updates
            .push((sample_item_id.to_string(), update.clone()));
        Ok(())
    }

    async fn current_location(
        &self,
        sample_item_id: &str,
    ) -> Result<Option<CurrentLocation>, AppError> {
        Ok(self.state.lock().await.placements.get(sample_item_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LocationTarget;

    async fn seeded() -> (InMemoryHierarchy, NodeId, NodeId) {
        let store = InMemoryHierarchy::new();
        let room = store
            .seed(HierarchyLevel::Room, "Main Lab", Some("MAIN"), None)
            .await;
        let device = store
            .seed(HierarchyLevel::Device, "Freezer 1", Some("FRZ1"), Some(&room))
            .await;
        (store, room, device)
    }

    #[tokio::test]
    async fn test_children_are_scoped_to_parent() {
        let (store, room, _) = seeded().await;
        let other = store.seed(HierarchyLevel::Room, "Other", None, None).await;
        store
            .seed(HierarchyLevel::Device, "Fridge", None, Some(&other))
            .await;

        let devices = store
            .list_children(HierarchyLevel::Device, Some(&room))
            .await
            .unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].display_name, "Freezer 1");

        let orphaned = store.list_children(HierarchyLevel::Shelf, None).await.unwrap();
        assert!(orphaned.is_empty());
    }

    #[tokio::test]
    async fn test_deactivated_node_is_hidden_and_not_assignable() {
        let (store, room, device) = seeded().await;
        store.deactivate(&device).await;

        let devices = store
            .list_children(HierarchyLevel::Device, Some(&room))
            .await
            .unwrap();
        assert!(devices.is_empty());

        let request = AssignmentRequest::new(
            "S-1",
            LocationTarget {
                id: device,
                level: HierarchyLevel::Device,
            },
        );
        let err = store.assign(&request).await.unwrap_err();
        assert_eq!(err.upstream_message(), "Freezer 1 is inactive");
        assert!(store.assignments().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_listing_applies_to_one_level_once() {
        let (store, room, _) = seeded().await;
        store
            .fail_next_list(HierarchyLevel::Device, AppError::BadGateway("down".into()))
            .await;

        assert_eq!(
            store.list_children(HierarchyLevel::Room, None).await.unwrap().len(),
            1
        );
        assert!(store
            .list_children(HierarchyLevel::Device, Some(&room))
            .await
            .is_err());
        assert_eq!(
            store
                .list_children(HierarchyLevel::Device, Some(&room))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_sibling() {
        let (store, room, _) = seeded().await;
        let err = store
            .create_node(&NewNode::new(HierarchyLevel::Device, "freezer 1", Some(room)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.node_count(HierarchyLevel::Device).await, 1);
    }

    #[tokio::test]
    async fn test_barcode_partial_match() {
        let (store, _, _) = seeded().await;
        let validation = store.validate_barcode("MAIN-FRZ1-SH9-R1").await.unwrap();
        assert!(!validation.success);
        assert_eq!(validation.first_missing_level, Some(HierarchyLevel::Shelf));
        assert!(validation.has_additional_invalid_levels);
        assert_eq!(validation.valid_components.len(), 2);
    }

    #[tokio::test]
    async fn test_assign_records_placement() {
        let (store, _, device) = seeded().await;
        let request = AssignmentRequest {
            sample_item_id: "S-1".to_string(),
            location_id: device,
            location_type: HierarchyLevel::Device,
            position_coordinate: Some("A1".to_string()),
            notes: None,
            reason: None,
        };
        let receipt = store.assign(&request).await.unwrap();
        assert_eq!(
            receipt.hierarchical_path.as_deref(),
            Some("Main Lab > Freezer 1 > Position A1")
        );

        let current = store.current_location("S-1").await.unwrap().unwrap();
        assert!(current.is_assigned());
        assert_eq!(current.position_coordinate.as_deref(), Some("A1"));
    }
}
