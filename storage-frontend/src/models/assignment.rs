use super::hierarchy::{HierarchyLevel, NodeId};
use super::location::{LocationTarget, PATH_SEPARATOR};
use serde::{Deserialize, Serialize};

/// Body of `POST /rest/storage/sample-items/assign`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRequest {
    pub sample_item_id: String,
    pub location_id: NodeId,
    pub location_type: HierarchyLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_coordinate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AssignmentRequest {
    pub fn new(sample_item_id: &str, target: LocationTarget) -> Self {
        Self {
            sample_item_id: sample_item_id.to_string(),
            location_id: target.id,
            location_type: target.level,
            position_coordinate: None,
            notes: None,
            reason: None,
        }
    }

    pub fn with_position(mut self, coordinate: Option<&str>) -> Self {
        self.position_coordinate = non_blank(coordinate);
        self
    }

    pub fn with_notes(mut self, notes: Option<&str>) -> Self {
        self.notes = non_blank(notes);
        self
    }

    pub fn with_reason(mut self, reason: Option<&str>) -> Self {
        self.reason = non_blank(reason);
        self
    }
}

/// Body of `PATCH /rest/storage/sample-items/{id}` for a metadata-only change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_coordinate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl MetadataUpdate {
    pub fn new(position_coordinate: Option<&str>, notes: Option<&str>) -> Self {
        Self {
            position_coordinate: non_blank(position_coordinate),
            notes: non_blank(notes),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub assignment_id: Option<NodeId>,
    #[serde(default)]
    pub hierarchical_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Authoritative record of a successful assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentReceipt {
    pub assignment_id: Option<NodeId>,
    pub hierarchical_path: Option<String>,
}

impl AssignmentResponse {
    /// Success needs an explicit flag or one of the fields only a stored
    /// assignment carries. Otherwise the server message is the failure.
    pub fn into_result(self) -> Result<AssignmentReceipt, String> {
        let stored = self.assignment_id.is_some() || self.hierarchical_path.is_some();
        if self.success != Some(false) && (stored || self.success == Some(true)) {
            return Ok(AssignmentReceipt {
                assignment_id: self.assignment_id,
                hierarchical_path: self.hierarchical_path,
            });
        }
        Err(self
            .error
            .or(self.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "Failed to assign storage location".to_string()))
    }
}

/// Response of `GET /rest/storage/sample-items/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentLocation {
    #[serde(default)]
    pub sample_item_id: Option<NodeId>,
    #[serde(default)]
    pub hierarchical_path: Option<String>,
    #[serde(default)]
    pub position_coordinate: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub assigned_by: Option<String>,
    #[serde(default)]
    pub assigned_date: Option<String>,
}

impl CurrentLocation {
    /// An empty path means the item has never been placed.
    pub fn is_assigned(&self) -> bool {
        self.path().is_some()
    }

    pub fn path(&self) -> Option<&str> {
        self.hierarchical_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// The path without a trailing `Position <coordinate>` segment.
    pub fn container_path(&self) -> Option<&str> {
        let path = self.path()?;
        match path.rsplit_once(PATH_SEPARATOR) {
            Some((containers, last)) if last.starts_with("Position ") => Some(containers),
            _ => Some(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_skips_blank_metadata() {
        let target = LocationTarget {
            id: NodeId::from("40"),
            level: HierarchyLevel::Rack,
        };
        let request = AssignmentRequest::new("S-1", target)
            .with_position(Some(" B2 "))
            .with_notes(Some("  "))
            .with_reason(None);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "sampleItemId": "S-1",
                "locationId": "40",
                "locationType": "rack",
                "positionCoordinate": "B2"
            })
        );
    }

    #[test]
    fn test_response_interpretation() {
        let ok: AssignmentResponse =
            serde_json::from_str(r#"{"assignmentId": 7, "hierarchicalPath": "A > B"}"#).unwrap();
        let receipt = ok.into_result().unwrap();
        assert_eq!(receipt.assignment_id, Some(NodeId::from("7")));

        let flagged: AssignmentResponse = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(flagged.into_result().is_ok());

        let failed: AssignmentResponse =
            serde_json::from_str(r#"{"error": "Location is inactive"}"#).unwrap();
        assert_eq!(failed.into_result().unwrap_err(), "Location is inactive");

        let empty = AssignmentResponse::default();
        assert!(empty.into_result().is_err());
    }

    #[test]
    fn test_current_location_assignment_state() {
        let unassigned: CurrentLocation =
            serde_json::from_str(r#"{"sampleItemId": "S-1", "hierarchicalPath": ""}"#).unwrap();
        assert!(!unassigned.is_assigned());

        let placed: CurrentLocation = serde_json::from_str(
            r#"{"hierarchicalPath": "Main Lab > Freezer 1", "positionCoordinate": "A1"}"#,
        )
        .unwrap();
        assert_eq!(placed.path(), Some("Main Lab > Freezer 1"));

        let with_position: CurrentLocation = serde_json::from_str(
            r#"{"hierarchicalPath": "Main Lab > Freezer 1 > Position A1"}"#,
        )
        .unwrap();
        assert_eq!(with_position.container_path(), Some("Main Lab > Freezer 1"));
    }
}
