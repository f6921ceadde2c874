#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use storage_frontend::models::{HierarchyLevel, NodeId, SearchResult};
use storage_frontend::services::{HierarchyRepository, InMemoryHierarchy};
use storage_frontend::workflow::{ControllerOptions, LocationAssignmentController};

/// A small lab:
///
/// Main Lab (MAIN)
///   Freezer 1 (FRZ1)
///     Shelf A (SHA)
///       Rack 1 (R1)
///     Shelf B (SHB)
/// Cold Room (COLD)
pub struct Lab {
    pub store: Arc<InMemoryHierarchy>,
    pub main_lab: NodeId,
    pub cold_room: NodeId,
    pub freezer: NodeId,
    pub shelf_a: NodeId,
    pub shelf_b: NodeId,
    pub rack: NodeId,
}

pub const SHELF_A_PATH: &str = "Main Lab > Freezer 1 > Shelf A";

pub async fn seeded_lab() -> Lab {
    let store = Arc::new(InMemoryHierarchy::new());
    let main_lab = store
        .seed(HierarchyLevel::Room, "Main Lab", Some("MAIN"), None)
        .await;
    let cold_room = store
        .seed(HierarchyLevel::Room, "Cold Room", Some("COLD"), None)
        .await;
    let freezer = store
        .seed(HierarchyLevel::Device, "Freezer 1", Some("FRZ1"), Some(&main_lab))
        .await;
    let shelf_a = store
        .seed(HierarchyLevel::Shelf, "Shelf A", Some("SHA"), Some(&freezer))
        .await;
    let shelf_b = store
        .seed(HierarchyLevel::Shelf, "Shelf B", Some("SHB"), Some(&freezer))
        .await;
    let rack = store
        .seed(HierarchyLevel::Rack, "Rack 1", Some("R1"), Some(&shelf_a))
        .await;

    Lab {
        store,
        main_lab,
        cold_room,
        freezer,
        shelf_a,
        shelf_b,
        rack,
    }
}

pub fn options(auto_save: bool) -> ControllerOptions {
    ControllerOptions {
        auto_save,
        autosave_delay: Duration::from_millis(500),
        autosaved_indicator: Duration::from_secs(3),
        barcode_error: Duration::from_secs(3),
    }
}

pub fn controller(lab: &Lab, auto_save: bool) -> LocationAssignmentController {
    LocationAssignmentController::new(lab.store.clone(), options(auto_save))
}

/// The single search row whose own name is exactly `name`.
pub async fn search_row(lab: &Lab, name: &str) -> SearchResult {
    lab.store
        .search_locations(name)
        .await
        .unwrap()
        .into_iter()
        .find(|row| row.name.as_deref() == Some(name) || row.label.as_deref() == Some(name))
        .unwrap_or_else(|| panic!("no search row named {}", name))
}
