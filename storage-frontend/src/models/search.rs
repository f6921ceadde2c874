use super::hierarchy::{HierarchyLevel, HierarchyNode, NodeId};
use super::location::{PositionCoordinate, ResolvedLocation};
use serde::{Deserialize, Serialize};

/// Flat row returned by `GET /rest/storage/locations/search`.
///
/// The search service always supplies the full chain of parent ids and names,
/// so a result can be turned into a [`ResolvedLocation`] without further lookups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: Option<NodeId>,
    #[serde(rename = "type")]
    pub level: Option<HierarchyLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_room_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_room_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_device_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_shelf_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_shelf_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_rack_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_rack_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "hierarchical_path")]
    pub hierarchical_path: Option<String>,
}

impl SearchResult {
    fn own_name(&self, level: HierarchyLevel) -> String {
        let name = match level {
            HierarchyLevel::Room | HierarchyLevel::Device => self.name.as_ref().or(self.label.as_ref()),
            HierarchyLevel::Shelf | HierarchyLevel::Rack => self.label.as_ref().or(self.name.as_ref()),
            HierarchyLevel::Position => self.coordinate.as_ref().or(self.name.as_ref()),
        };
        name.or(self.code.as_ref()).cloned().unwrap_or_default()
    }

    fn ancestor(&self, level: HierarchyLevel) -> Option<HierarchyNode> {
        let (id, name) = match level {
            HierarchyLevel::Room => (&self.parent_room_id, &self.parent_room_name),
            HierarchyLevel::Device => (&self.parent_device_id, &self.parent_device_name),
            HierarchyLevel::Shelf => (&self.parent_shelf_id, &self.parent_shelf_label),
            HierarchyLevel::Rack => (&self.parent_rack_id, &self.parent_rack_label),
            HierarchyLevel::Position => return None,
        };
        let id = id.clone()?;
        let mut node = HierarchyNode::persisted(level, id, name.as_deref().unwrap_or_default());
        if let Some(parent) = level.parent().and_then(|p| self.ancestor_id(p)) {
            node = node.with_parent(parent.clone());
        }
        Some(node)
    }

    fn ancestor_id(&self, level: HierarchyLevel) -> Option<&NodeId> {
        match level {
            HierarchyLevel::Room => self.parent_room_id.as_ref(),
            HierarchyLevel::Device => self.parent_device_id.as_ref(),
            HierarchyLevel::Shelf => self.parent_shelf_id.as_ref(),
            HierarchyLevel::Rack => self.parent_rack_id.as_ref(),
            HierarchyLevel::Position => None,
        }
    }

    /// Rebuild the full location by walking the supplied parent chain.
    ///
    /// Returns `None` for a row without id or type. Device, shelf and rack rows
    /// also become the direct assignment target.
    pub fn to_location(&self) -> Option<ResolvedLocation> {
        let id = self.id.clone()?;
        let level = self.level?;

        let mut location = ResolvedLocation::new();
        for ancestor in HierarchyLevel::CASCADE
            .into_iter()
            .filter(|l| l.depth() < level.depth())
        {
            if let Some(node) = self.ancestor(ancestor) {
                location.set_node(ancestor, Some(node));
            }
        }

        if level == HierarchyLevel::Position {
            location.position = Some(PositionCoordinate {
                coordinate: self.own_name(level),
                id: Some(id),
            });
            return Some(location);
        }

        let mut node = HierarchyNode::persisted(level, id.clone(), &self.own_name(level));
        node.code = self.code.clone();
        node.active = self.active != Some(false);
        if let Some(parent) = level.parent().and_then(|p| self.ancestor_id(p)) {
            node = node.with_parent(parent.clone());
        }
        location.set_node(level, Some(node));

        Some(location.with_direct_target(id, level))
    }

    /// Inverse of [`SearchResult::to_location`]: the deepest persisted node
    /// becomes the row and its ancestors become parent references.
    pub fn from_location(location: &ResolvedLocation) -> Option<Self> {
        let level = HierarchyLevel::CASCADE
            .into_iter()
            .rev()
            .find(|l| location.node(*l).is_some_and(HierarchyNode::is_persisted))?;
        let node = location.node(level)?;

        let mut result = SearchResult {
            id: node.id.clone(),
            level: Some(level),
            code: node.code.clone(),
            active: Some(node.active),
            hierarchical_path: Some(location.hierarchical_path()),
            ..Default::default()
        };
        match level {
            HierarchyLevel::Room | HierarchyLevel::Device => result.name = Some(node.display_name.clone()),
            _ => result.label = Some(node.display_name.clone()),
        }

        for ancestor in HierarchyLevel::CASCADE
            .into_iter()
            .filter(|l| l.depth() < level.depth())
        {
            let Some(parent) = location.node(ancestor) else {
                continue;
            };
            let name = Some(parent.display_name.clone());
            match ancestor {
                HierarchyLevel::Room => {
                    result.parent_room_id = parent.id.clone();
                    result.parent_room_name = name;
                }
                HierarchyLevel::Device => {
                    result.parent_device_id = parent.id.clone();
                    result.parent_device_name = name;
                }
                HierarchyLevel::Shelf => {
                    result.parent_shelf_id = parent.id.clone();
                    result.parent_shelf_label = name;
                }
                HierarchyLevel::Rack | HierarchyLevel::Position => {}
            }
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rack_row() -> SearchResult {
        serde_json::from_value(serde_json::json!({
            "id": 40,
            "type": "rack",
            "label": "Rack 3",
            "parentShelfId": 30,
            "parentShelfLabel": "Shelf A",
            "parentDeviceId": 20,
            "parentDeviceName": "Freezer 1",
            "parentRoomId": 10,
            "parentRoomName": "Main Lab",
            "hierarchicalPath": "Main Lab > Freezer 1 > Shelf A > Rack 3"
        }))
        .unwrap()
    }

    #[test]
    fn test_rack_result_walks_parent_chain() {
        let location = rack_row().to_location().unwrap();
        assert_eq!(location.hierarchical_path(), "Main Lab > Freezer 1 > Shelf A > Rack 3");
        assert_eq!(location.shelf.as_ref().unwrap().parent_id, Some(NodeId::from("20")));

        let target = location.target().unwrap();
        assert_eq!(target.level, HierarchyLevel::Rack);
        assert_eq!(target.id.as_str(), "40");
        assert!(location.is_assignable());
    }

    #[test]
    fn test_room_result_is_not_a_direct_target() {
        let row: SearchResult =
            serde_json::from_str(r#"{"id": "1", "type": "room", "name": "Main Lab"}"#).unwrap();
        let location = row.to_location().unwrap();
        assert!(location.direct_target().is_none());
        assert!(!location.is_assignable());
    }

    #[test]
    fn test_position_result_keeps_coordinate() {
        let row: SearchResult = serde_json::from_value(serde_json::json!({
            "id": 50, "type": "position", "coordinate": "B2",
            "parentRackId": 40, "parentRackLabel": "Rack 3",
            "parentShelfId": 30, "parentShelfLabel": "Shelf A",
            "parentDeviceId": 20, "parentDeviceName": "Freezer 1",
            "parentRoomId": 10, "parentRoomName": "Main Lab"
        }))
        .unwrap();
        let location = row.to_location().unwrap();
        assert_eq!(location.position_coordinate(), Some("B2"));
        assert_eq!(location.target().unwrap().level, HierarchyLevel::Rack);
    }

    #[test]
    fn test_location_maps_back_to_search_row() {
        let location = rack_row().to_location().unwrap();
        let row = SearchResult::from_location(&location).unwrap();
        assert_eq!(row.id, Some(NodeId::from("40")));
        assert_eq!(row.level, Some(HierarchyLevel::Rack));
        assert_eq!(row.label.as_deref(), Some("Rack 3"));
        assert_eq!(row.parent_device_name.as_deref(), Some("Freezer 1"));
        assert_eq!(row.to_location().unwrap(), location);
    }

    #[test]
    fn test_missing_id_yields_nothing() {
        let row = SearchResult {
            level: Some(HierarchyLevel::Device),
            ..Default::default()
        };
        assert!(row.to_location().is_none());
    }
}
