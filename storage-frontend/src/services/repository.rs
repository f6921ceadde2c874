use crate::models::{
    AssignmentReceipt, AssignmentRequest, BarcodeValidation, CurrentLocation, HierarchyLevel,
    HierarchyNode, MetadataUpdate, NewNode, NodeId, SearchResult,
};
use async_trait::async_trait;
use lis_core::error::AppError;

/// Backend collaborator owning the storage hierarchy and sample placements.
#[async_trait]
pub trait HierarchyRepository: Send + Sync {
    /// Active children of `parent` at `level`. Rooms are listed with no parent;
    /// any other level without a parent has no children.
    async fn list_children(
        &self,
        level: HierarchyLevel,
        parent: Option<&NodeId>,
    ) -> Result<Vec<HierarchyNode>, AppError>;

    /// Persist a new node and return it with its server-assigned id.
    async fn create_node(&self, node: &NewNode) -> Result<HierarchyNode, AppError>;

    async fn search_locations(&self, query: &str) -> Result<Vec<SearchResult>, AppError>;

    async fn validate_barcode(&self, barcode: &str) -> Result<BarcodeValidation, AppError>;

    async fn assign(&self, request: &AssignmentRequest) -> Result<AssignmentReceipt, AppError>;

    /// Change position/notes of an item without moving it.
    async fn update_metadata(
        &self,
        sample_item_id: &str,
        update: &MetadataUpdate,
    ) -> Result<(), AppError>;

    /// `None` when the backend does not know the sample item.
    async fn current_location(
        &self,
        sample_item_id: &str,
    ) -> Result<Option<CurrentLocation>, AppError>;
}
