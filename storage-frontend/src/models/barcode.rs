use super::hierarchy::{HierarchyLevel, NodeRecord};
use super::location::{PositionCoordinate, ResolvedLocation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const BARCODE_DELIMITER: char = '-';
pub const MIN_BARCODE_COMPONENTS: usize = 2;
pub const MAX_BARCODE_COMPONENTS: usize = 5;
pub const DEFAULT_BARCODE_ERROR: &str = "Invalid barcode";

// ============================================================================
// Client-side format
// ============================================================================

/// A scanned location barcode split into its hierarchy components
/// (`ROOM-DEVICE[-SHELF[-RACK[-POSITION]]]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeComponents {
    components: Vec<String>,
}

impl BarcodeComponents {
    /// Returns `None` unless the text has 2 to 5 non-empty hyphen-separated parts.
    pub fn parse(barcode: &str) -> Option<Self> {
        let barcode = barcode.trim();
        if !barcode.contains(BARCODE_DELIMITER) {
            return None;
        }
        let components: Vec<String> = barcode
            .split(BARCODE_DELIMITER)
            .map(|c| c.trim().to_string())
            .collect();
        if !(MIN_BARCODE_COMPONENTS..=MAX_BARCODE_COMPONENTS).contains(&components.len())
            || components.iter().any(String::is_empty)
        {
            return None;
        }
        Some(Self { components })
    }

    pub fn depth(&self) -> usize {
        self.components.len()
    }

    pub fn component(&self, level: HierarchyLevel) -> Option<&str> {
        self.components.get(level.depth()).map(String::as_str)
    }

    /// Deepest level the barcode addresses; a two-part code is device level.
    pub fn level(&self) -> HierarchyLevel {
        HierarchyLevel::from_depth(self.depth() - 1).unwrap_or(HierarchyLevel::Position)
    }
}

// ============================================================================
// Server validation
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarcodeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<NodeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<NodeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shelf: Option<NodeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack: Option<NodeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<NodeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchical_path: Option<String>,
}

impl BarcodeData {
    fn is_empty(&self) -> bool {
        self.room.is_none() && self.device.is_none()
    }
}

/// Error as reported by the validation endpoint: either a bare string or an
/// object carrying `errorMessage`/`message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BarcodeError {
    Text(String),
    Detail {
        #[serde(default, rename = "errorMessage")]
        error_message: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

/// Response of `GET /rest/storage/barcode/validate`.
///
/// The endpoint returns the resolved components at the top level; wrapped
/// responses carry them under `data`. Both are accepted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarcodeValidation {
    #[serde(default, alias = "valid")]
    pub success: bool,
    #[serde(default)]
    pub barcode_type: Option<String>,
    #[serde(default)]
    pub data: Option<BarcodeData>,
    #[serde(flatten)]
    pub inline: BarcodeData,
    #[serde(default)]
    pub error: Option<BarcodeError>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub first_missing_level: Option<HierarchyLevel>,
    #[serde(default)]
    pub valid_components: BTreeMap<HierarchyLevel, NodeRecord>,
    #[serde(default)]
    pub has_additional_invalid_levels: bool,
}

/// What a validation response means for the location workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum BarcodeOutcome {
    /// Adopt the location wholesale.
    Valid(ResolvedLocation),
    /// Valid prefix up to a gap; creation opens at `first_missing`.
    Partial {
        prefix: ResolvedLocation,
        first_missing: HierarchyLevel,
        dropped_levels: bool,
    },
    /// No usable prefix; nothing changes.
    Invalid { message: String },
}

impl BarcodeValidation {
    pub fn message(&self) -> String {
        let detail = match &self.error {
            Some(BarcodeError::Text(text)) => Some(text.clone()),
            Some(BarcodeError::Detail {
                error_message,
                message,
            }) => error_message.clone().or_else(|| message.clone()),
            None => None,
        };
        detail
            .or_else(|| self.error_message.clone())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BARCODE_ERROR.to_string())
    }

    fn components(&self) -> &BarcodeData {
        match &self.data {
            Some(data) if !data.is_empty() => data,
            _ => &self.inline,
        }
    }

    fn location_from(data: &BarcodeData) -> ResolvedLocation {
        let mut location = ResolvedLocation::new();
        let records = [
            (HierarchyLevel::Room, &data.room),
            (HierarchyLevel::Device, &data.device),
            (HierarchyLevel::Shelf, &data.shelf),
            (HierarchyLevel::Rack, &data.rack),
        ];
        for (level, record) in records {
            if let Some(record) = record {
                location.set_node(level, Some(record.clone().into_node(level)));
            }
        }
        if let Some(position) = &data.position {
            if let Some(coordinate) = position.display_name(HierarchyLevel::Position) {
                location.position = Some(PositionCoordinate {
                    coordinate: coordinate.to_string(),
                    id: position.id.clone(),
                });
            }
        }
        location
    }

    fn prefix(&self, first_missing: HierarchyLevel) -> ResolvedLocation {
        let mut location = ResolvedLocation::new();
        for level in HierarchyLevel::CASCADE
            .into_iter()
            .filter(|l| l.depth() < first_missing.depth())
        {
            match self.valid_components.get(&level) {
                Some(record) => location.set_node(level, Some(record.clone().into_node(level))),
                None => break,
            }
        }
        location
    }

    pub fn outcome(&self) -> BarcodeOutcome {
        if self.barcode_type.as_deref() == Some("sample") {
            return BarcodeOutcome::Invalid {
                message: "Not a location barcode".to_string(),
            };
        }

        if self.success {
            let location = Self::location_from(self.components());
            if location.has_consecutive_levels() {
                return BarcodeOutcome::Valid(location);
            }
        }

        if let Some(first_missing) = self.first_missing_level {
            let prefix = self.prefix(first_missing);
            if !prefix.is_empty() {
                return BarcodeOutcome::Partial {
                    prefix,
                    first_missing,
                    dropped_levels: self.has_additional_invalid_levels,
                };
            }
        }

        BarcodeOutcome::Invalid {
            message: self.message(),
        }
    }
}
