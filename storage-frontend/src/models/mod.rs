pub mod assignment;
pub mod barcode;
pub mod hierarchy;
pub mod location;
pub mod search;

pub use assignment::{
    AssignmentReceipt, AssignmentRequest, AssignmentResponse, CurrentLocation, MetadataUpdate,
};
pub use barcode::{BarcodeComponents, BarcodeOutcome, BarcodeValidation};
pub use hierarchy::{HierarchyLevel, HierarchyNode, NewNode, NodeId, NodeRecord};
pub use location::{LocationTarget, PositionCoordinate, ResolvedLocation, PATH_SEPARATOR};
pub use search::SearchResult;
