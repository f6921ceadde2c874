pub mod http_repository;
pub mod memory_repository;
pub mod repository;

pub use http_repository::StorageApiClient;
pub use memory_repository::InMemoryHierarchy;
pub use repository::HierarchyRepository;
