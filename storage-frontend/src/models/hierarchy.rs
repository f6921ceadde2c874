//! Storage hierarchy levels and nodes (Room > Device > Shelf > Rack > Position).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

// ============================================================================
// Identifiers
// ============================================================================

/// Server-assigned node identifier.
///
/// The backend emits ids either as JSON numbers or as strings depending on the
/// endpoint; both are normalised to their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Int(n) => NodeId(n.to_string()),
            RawId::Text(s) => NodeId(s),
        })
    }
}

// ============================================================================
// Levels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyLevel {
    Room,
    Device,
    Shelf,
    Rack,
    Position,
}

impl HierarchyLevel {
    /// The four levels driven by the cascading selector, parent first.
    pub const CASCADE: [HierarchyLevel; 4] = [
        HierarchyLevel::Room,
        HierarchyLevel::Device,
        HierarchyLevel::Shelf,
        HierarchyLevel::Rack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Room => "room",
            Self::Device => "device",
            Self::Shelf => "shelf",
            Self::Rack => "rack",
            Self::Position => "position",
        }
    }

    /// Human-readable name used in messages and barcode level descriptions.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Room => "Room",
            Self::Device => "Device",
            Self::Shelf => "Shelf",
            Self::Rack => "Rack",
            Self::Position => "Position",
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Self::Room => 0,
            Self::Device => 1,
            Self::Shelf => 2,
            Self::Rack => 3,
            Self::Position => 4,
        }
    }

    pub fn from_depth(depth: usize) -> Option<Self> {
        match depth {
            0 => Some(Self::Room),
            1 => Some(Self::Device),
            2 => Some(Self::Shelf),
            3 => Some(Self::Rack),
            4 => Some(Self::Position),
            _ => None,
        }
    }

    pub fn parent(&self) -> Option<Self> {
        self.depth().checked_sub(1).and_then(Self::from_depth)
    }

    pub fn child(&self) -> Option<Self> {
        Self::from_depth(self.depth() + 1)
    }

    /// Levels a sample item can be assigned to directly.
    pub fn is_assignment_target(&self) -> bool {
        matches!(self, Self::Device | Self::Shelf | Self::Rack)
    }

    /// REST collection segment under `/rest/storage/`.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Room => "rooms",
            Self::Device => "devices",
            Self::Shelf => "shelves",
            Self::Rack => "racks",
            Self::Position => "positions",
        }
    }

    /// Query parameter filtering a child listing by its parent.
    pub fn parent_query_key(&self) -> Option<&'static str> {
        match self {
            Self::Room => None,
            Self::Device => Some("roomId"),
            Self::Shelf => Some("deviceId"),
            Self::Rack => Some("shelfId"),
            Self::Position => Some("rackId"),
        }
    }

    /// Body field carrying the parent reference on create.
    pub fn parent_field(&self) -> Option<&'static str> {
        match self {
            Self::Room => None,
            Self::Device => Some("parentRoomId"),
            Self::Shelf => Some("parentDeviceId"),
            Self::Rack => Some("parentShelfId"),
            Self::Position => Some("parentRackId"),
        }
    }

    /// Body field carrying the display name: rooms and devices are named,
    /// shelves and racks labelled, positions addressed by coordinate.
    pub fn name_field(&self) -> &'static str {
        match self {
            Self::Room | Self::Device => "name",
            Self::Shelf | Self::Rack => "label",
            Self::Position => "coordinate",
        }
    }
}

impl fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HierarchyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "room" => Ok(Self::Room),
            "device" => Ok(Self::Device),
            "shelf" => Ok(Self::Shelf),
            "rack" => Ok(Self::Rack),
            "position" => Ok(Self::Position),
            other => Err(format!("unknown hierarchy level '{}'", other)),
        }
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// One node of the storage hierarchy, persisted (has `id`) or proposed (typed
/// by the user, not yet created).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyNode {
    pub id: Option<NodeId>,
    pub level: HierarchyLevel,
    pub display_name: String,
    pub code: Option<String>,
    pub parent_id: Option<NodeId>,
    pub active: bool,
}

impl HierarchyNode {
    pub fn persisted(level: HierarchyLevel, id: impl Into<NodeId>, display_name: &str) -> Self {
        Self {
            id: Some(id.into()),
            level,
            display_name: display_name.to_string(),
            code: None,
            parent_id: None,
            active: true,
        }
    }

    pub fn proposed(level: HierarchyLevel, display_name: &str) -> Self {
        Self {
            id: None,
            level,
            display_name: display_name.trim().to_string(),
            code: None,
            parent_id: None,
            active: true,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<NodeId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Trimmed, case-insensitive comparison against typed text.
    pub fn matches_name(&self, text: &str) -> bool {
        let text = text.trim();
        !text.is_empty() && self.display_name.trim().to_lowercase() == text.to_lowercase()
    }

    /// Whether two nodes denote the same hierarchy entry: same id when
    /// persisted, same name when both are still proposals.
    pub fn same_identity(&self, other: &HierarchyNode) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.matches_name(&other.display_name),
            _ => false,
        }
    }
}

/// Node as serialised by the storage REST endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
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
    pub parent_device_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_shelf_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_rack_id: Option<NodeId>,
}

impl NodeRecord {
    /// Display name for the given level, falling back the way the backend does
    /// when a node was created without its preferred field.
    pub fn display_name(&self, level: HierarchyLevel) -> Option<&str> {
        let preferred = match level {
            HierarchyLevel::Room | HierarchyLevel::Device => self.name.as_ref().or(self.code.as_ref()),
            HierarchyLevel::Shelf | HierarchyLevel::Rack => {
                self.label.as_ref().or(self.name.as_ref()).or(self.code.as_ref())
            }
            HierarchyLevel::Position => self.coordinate.as_ref().or(self.code.as_ref()),
        };
        preferred.map(|s| s.as_str()).filter(|s| !s.trim().is_empty())
    }

    pub fn parent_id(&self, level: HierarchyLevel) -> Option<&NodeId> {
        match level {
            HierarchyLevel::Room => None,
            HierarchyLevel::Device => self.parent_room_id.as_ref(),
            HierarchyLevel::Shelf => self.parent_device_id.as_ref(),
            HierarchyLevel::Rack => self.parent_shelf_id.as_ref(),
            HierarchyLevel::Position => self.parent_rack_id.as_ref(),
        }
    }

    pub fn into_node(self, level: HierarchyLevel) -> HierarchyNode {
        HierarchyNode {
            display_name: self.display_name(level).unwrap_or_default().to_string(),
            parent_id: self.parent_id(level).cloned(),
            active: self.active != Some(false),
            id: self.id,
            level,
            code: self.code,
        }
    }

    pub fn from_node(node: &HierarchyNode) -> Self {
        let mut record = NodeRecord {
            id: node.id.clone(),
            code: node.code.clone(),
            active: Some(node.active),
            ..Default::default()
        };
        match node.level {
            HierarchyLevel::Room | HierarchyLevel::Device => {
                record.name = Some(node.display_name.clone())
            }
            HierarchyLevel::Shelf | HierarchyLevel::Rack => {
                record.label = Some(node.display_name.clone())
            }
            HierarchyLevel::Position => record.coordinate = Some(node.display_name.clone()),
        }
        match node.level {
            HierarchyLevel::Room => {}
            HierarchyLevel::Device => record.parent_room_id = node.parent_id.clone(),
            HierarchyLevel::Shelf => record.parent_device_id = node.parent_id.clone(),
            HierarchyLevel::Rack => record.parent_shelf_id = node.parent_id.clone(),
            HierarchyLevel::Position => record.parent_rack_id = node.parent_id.clone(),
        }
        record
    }
}

/// Request to persist a proposed node under an already persisted parent.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct NewNode {
    pub level: HierarchyLevel,
    #[validate(length(min = 1, max = 255))]
    pub display_name: String,
    /// Optional; the backend generates a unique code when absent.
    #[validate(length(max = 50))]
    pub code: Option<String>,
    pub parent_id: Option<NodeId>,
}

impl NewNode {
    pub fn new(level: HierarchyLevel, display_name: &str, parent_id: Option<NodeId>) -> Self {
        Self {
            level,
            display_name: display_name.trim().to_string(),
            code: None,
            parent_id,
        }
    }

    /// JSON body for `POST /rest/storage/{collection}`.
    pub fn to_payload(&self) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        body.insert(
            self.level.name_field().to_string(),
            serde_json::Value::String(self.display_name.clone()),
        );
        if let Some(code) = &self.code {
            body.insert("code".to_string(), serde_json::Value::String(code.clone()));
        }
        body.insert("active".to_string(), serde_json::Value::Bool(true));
        match self.level {
            HierarchyLevel::Room => {
                body.insert("description".to_string(), serde_json::Value::String(String::new()));
            }
            HierarchyLevel::Device => {
                body.insert("type".to_string(), serde_json::Value::String("other".to_string()));
            }
            HierarchyLevel::Rack => {
                body.insert("rows".to_string(), serde_json::Value::from(0));
                body.insert("columns".to_string(), serde_json::Value::from(0));
            }
            HierarchyLevel::Shelf | HierarchyLevel::Position => {}
        }
        if let (Some(field), Some(parent)) = (self.level.parent_field(), &self.parent_id) {
            body.insert(field.to_string(), serde_json::Value::String(parent.to_string()));
        }
        serde_json::Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_accepts_numbers_and_strings() {
        let ids: Vec<NodeId> = serde_json::from_str(r#"[12, "ab-3"]"#).unwrap();
        assert_eq!(ids[0].as_str(), "12");
        assert_eq!(ids[1].as_str(), "ab-3");
        assert_eq!(serde_json::to_string(&ids[0]).unwrap(), r#""12""#);
    }

    #[test]
    fn test_level_navigation() {
        assert_eq!(HierarchyLevel::Room.parent(), None);
        assert_eq!(HierarchyLevel::Shelf.parent(), Some(HierarchyLevel::Device));
        assert_eq!(HierarchyLevel::Rack.child(), Some(HierarchyLevel::Position));
        assert_eq!(HierarchyLevel::Position.child(), None);
        assert_eq!("Shelf".parse::<HierarchyLevel>(), Ok(HierarchyLevel::Shelf));
        assert!("freezer".parse::<HierarchyLevel>().is_err());
    }

    #[test]
    fn test_record_display_name_per_level() {
        let shelf: NodeRecord =
            serde_json::from_str(r#"{"id": 4, "label": "Top", "parentDeviceId": 2}"#).unwrap();
        let node = shelf.into_node(HierarchyLevel::Shelf);
        assert_eq!(node.display_name, "Top");
        assert_eq!(node.parent_id, Some(NodeId::from("2")));
        assert!(node.active);

        let room: NodeRecord =
            serde_json::from_str(r#"{"id": 1, "code": "MAIN", "active": false}"#).unwrap();
        let node = room.into_node(HierarchyLevel::Room);
        assert_eq!(node.display_name, "MAIN");
        assert!(!node.active);
    }

    #[test]
    fn test_matches_name_is_trimmed_and_case_insensitive() {
        let node = HierarchyNode::persisted(HierarchyLevel::Room, "1", "Main Lab");
        assert!(node.matches_name("  main lab "));
        assert!(!node.matches_name("Main"));
        assert!(!node.matches_name("   "));
    }

    #[test]
    fn test_payload_shapes() {
        let room = NewNode::new(HierarchyLevel::Room, " New Room X ", None);
        assert_eq!(
            room.to_payload(),
            serde_json::json!({"name": "New Room X", "description": "", "active": true})
        );

        let rack = NewNode::new(HierarchyLevel::Rack, "R1", Some(NodeId::from("9")));
        assert_eq!(
            rack.to_payload(),
            serde_json::json!({
                "label": "R1", "active": true, "rows": 0, "columns": 0, "parentShelfId": "9"
            })
        );
    }

    #[test]
    fn test_new_node_validation() {
        let mut node = NewNode::new(HierarchyLevel::Device, "   ", Some(NodeId::from("1")));
        assert!(node.validate().is_err());

        node.display_name = "Freezer 2".to_string();
        assert!(node.validate().is_ok());

        node.code = Some("X".repeat(51));
        assert!(node.validate().is_err());
    }
}
