pub mod config;
pub mod models;
pub mod services;
pub mod workflow;

use config::Settings;
use services::{HierarchyRepository, StorageApiClient};
use std::sync::Arc;
use tokio::task::JoinHandle;
use workflow::{ControllerOptions, LocationAssignmentController, SessionHandle};

/// Shared state held by the embedding shell: one repository for every session.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn HierarchyRepository>,
    pub options: ControllerOptions,
}

impl AppState {
    pub fn new(repository: Arc<dyn HierarchyRepository>, options: ControllerOptions) -> Self {
        Self {
            repository,
            options,
        }
    }

    /// Wire the REST repository from configuration.
    pub fn from_settings(settings: &Settings) -> Self {
        let client = StorageApiClient::new(settings.storage_api.clone());
        Self::new(Arc::new(client), ControllerOptions::from(&settings.workflow))
    }

    pub fn new_controller(&self) -> LocationAssignmentController {
        LocationAssignmentController::new(self.repository.clone(), self.options.clone())
    }

    pub fn spawn_session(&self) -> (SessionHandle, JoinHandle<LocationAssignmentController>) {
        workflow::spawn_session(self.new_controller())
    }
}
