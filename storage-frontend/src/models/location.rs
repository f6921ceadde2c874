//! The canonical output of location selection: `ResolvedLocation`.

use super::hierarchy::{HierarchyLevel, HierarchyNode, NodeId};
use serde::{Deserialize, Serialize};

/// Separator used when rendering a hierarchical path.
pub const PATH_SEPARATOR: &str = " > ";

/// Optional position inside the deepest container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionCoordinate {
    pub coordinate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
}

impl PositionCoordinate {
    pub fn new(coordinate: &str) -> Self {
        Self {
            coordinate: coordinate.trim().to_string(),
            id: None,
        }
    }
}

/// The `(locationId, locationType)` pair an assignment is made against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationTarget {
    pub id: NodeId,
    pub level: HierarchyLevel,
}

/// A location as chosen by the user: each level empty, persisted or proposed.
///
/// The assignment target and the hierarchical path are derived on demand and
/// cannot be set independently of the levels. The only extra input is a
/// direct target supplied by a search result that already names the node to
/// assign to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub room: Option<HierarchyNode>,
    pub device: Option<HierarchyNode>,
    pub shelf: Option<HierarchyNode>,
    pub rack: Option<HierarchyNode>,
    pub position: Option<PositionCoordinate>,
    direct_target: Option<LocationTarget>,
}

impl ResolvedLocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, node: HierarchyNode) -> Self {
        let level = node.level;
        self.set_node(level, Some(node));
        self
    }

    pub fn with_position(mut self, coordinate: &str) -> Self {
        self.position = Some(PositionCoordinate::new(coordinate)).filter(|p| !p.coordinate.is_empty());
        self
    }

    /// Attach a directly-resolved target. Only device, shelf and rack targets
    /// are accepted; anything else is ignored.
    pub fn with_direct_target(mut self, id: NodeId, level: HierarchyLevel) -> Self {
        if level.is_assignment_target() {
            self.direct_target = Some(LocationTarget { id, level });
        }
        self
    }

    pub fn direct_target(&self) -> Option<&LocationTarget> {
        self.direct_target.as_ref()
    }

    pub fn node(&self, level: HierarchyLevel) -> Option<&HierarchyNode> {
        match level {
            HierarchyLevel::Room => self.room.as_ref(),
            HierarchyLevel::Device => self.device.as_ref(),
            HierarchyLevel::Shelf => self.shelf.as_ref(),
            HierarchyLevel::Rack => self.rack.as_ref(),
            HierarchyLevel::Position => None,
        }
    }

    /// Replace one level. Position is carried by [`PositionCoordinate`] and is
    /// not settable through this method.
    pub fn set_node(&mut self, level: HierarchyLevel, node: Option<HierarchyNode>) {
        match level {
            HierarchyLevel::Room => self.room = node,
            HierarchyLevel::Device => self.device = node,
            HierarchyLevel::Shelf => self.shelf = node,
            HierarchyLevel::Rack => self.rack = node,
            HierarchyLevel::Position => {}
        }
    }

    /// A level is resolved when it maps to a persisted node or to a proposal
    /// with a non-empty name.
    pub fn is_resolved(&self, level: HierarchyLevel) -> bool {
        match level {
            HierarchyLevel::Position => self
                .position
                .as_ref()
                .is_some_and(|p| !p.coordinate.trim().is_empty()),
            _ => self
                .node(level)
                .is_some_and(|n| n.is_persisted() || !n.display_name.trim().is_empty()),
        }
    }

    pub fn resolved_levels(&self) -> Vec<HierarchyLevel> {
        HierarchyLevel::CASCADE
            .into_iter()
            .filter(|level| self.is_resolved(*level))
            .collect()
    }

    /// Any two adjacent cascade levels are resolved (room+device, device+shelf, shelf+rack).
    pub fn has_consecutive_levels(&self) -> bool {
        HierarchyLevel::CASCADE
            .windows(2)
            .any(|pair| self.is_resolved(pair[0]) && self.is_resolved(pair[1]))
    }

    /// Deepest resolved cascade level, persisted or proposed.
    pub fn deepest_level(&self) -> Option<HierarchyLevel> {
        HierarchyLevel::CASCADE
            .into_iter()
            .rev()
            .find(|level| self.is_resolved(*level))
    }

    /// The node an assignment is made against.
    ///
    /// The deepest resolved level among rack, shelf and device decides. When
    /// that level is only proposed there is no target until it is created;
    /// shallower persisted levels are not used as a fallback. Without any
    /// resolved target level a direct target from a search result applies.
    pub fn target(&self) -> Option<LocationTarget> {
        let deepest = [HierarchyLevel::Rack, HierarchyLevel::Shelf, HierarchyLevel::Device]
            .into_iter()
            .find(|level| self.is_resolved(*level));

        match deepest {
            Some(level) => self.node(level).and_then(|node| {
                node.id.clone().map(|id| LocationTarget { id, level })
            }),
            None => self.direct_target.clone(),
        }
    }

    /// Room and device resolved, or a directly supplied target.
    pub fn is_assignable(&self) -> bool {
        (self.is_resolved(HierarchyLevel::Room) && self.is_resolved(HierarchyLevel::Device))
            || self.direct_target.is_some()
    }

    pub fn position_coordinate(&self) -> Option<&str> {
        self.position
            .as_ref()
            .map(|p| p.coordinate.as_str())
            .filter(|c| !c.is_empty())
    }

    /// Human-readable path of resolved display names, e.g.
    /// `Main Lab > Freezer 1 > Shelf A > Rack 3 > Position B2`.
    pub fn hierarchical_path(&self) -> String {
        let mut parts: Vec<String> = HierarchyLevel::CASCADE
            .into_iter()
            .filter_map(|level| self.node(level))
            .map(|node| node.display_name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if let Some(coordinate) = self.position_coordinate() {
            parts.push(format!("Position {}", coordinate));
        }
        parts.join(PATH_SEPARATOR)
    }

    /// Path of the containers only, without the position segment.
    pub fn container_path(&self) -> String {
        HierarchyLevel::CASCADE
            .into_iter()
            .filter_map(|level| self.node(level))
            .map(|node| node.display_name.trim())
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>()
            .join(PATH_SEPARATOR)
    }

    pub fn is_empty(&self) -> bool {
        self.resolved_levels().is_empty()
            && self.position_coordinate().is_none()
            && self.direct_target.is_none()
    }

    /// Drop every level strictly below `level`.
    pub fn clear_below(&mut self, level: HierarchyLevel) {
        for deeper in HierarchyLevel::CASCADE
            .into_iter()
            .filter(|l| l.depth() > level.depth())
        {
            self.set_node(deeper, None);
        }
        self.position = None;
        self.direct_target = None;
    }
}
