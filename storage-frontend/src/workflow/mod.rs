//! Location selection workflow: cascading hierarchy input, search/create
//! resolution, and the per-sample assignment controller.

pub mod cascading;
pub mod controller;
pub mod debounce;
pub mod resolver;
pub mod session;

pub use cascading::{CascadingSelector, FieldValue, LevelField, LoadTicket};
pub use controller::{
    ConfirmOutcome, ControllerOptions, ControllerState, InputSource, LocationAssignmentController,
    LocationInputEvent,
};
pub use debounce::{DebounceTimer, TimedFlag};
pub use resolver::{LocationResolver, ResolverMode};
pub use session::{spawn_session, SessionCommand, SessionHandle, SessionView};

use crate::models::HierarchyLevel;
use lis_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0} cannot be entered before its parent is chosen")]
    FieldLocked(HierarchyLevel),

    #[error("Nothing to create for {0}")]
    NothingToCreate(HierarchyLevel),

    #[error("Save the parent of {0} before creating it")]
    ParentNotPersisted(HierarchyLevel),

    #[error("Failed to create {level}: {message}")]
    CreateFailed {
        level: HierarchyLevel,
        message: String,
    },

    #[error("At least two consecutive levels are required, {resolved} resolved")]
    IncompleteHierarchy { resolved: usize },

    #[error("Invalid barcode format. Expected ROOM-DEVICE up to ROOM-DEVICE-SHELF-RACK-POSITION")]
    InvalidBarcodeFormat,

    #[error("No location session is open")]
    NotEditing,

    #[error("Nothing to confirm")]
    NothingToConfirm,

    #[error("Assignment failed: {0}")]
    AssignmentFailed(String),

    #[error("Location session has ended")]
    SessionClosed,

    #[error(transparent)]
    Repository(#[from] AppError),
}
