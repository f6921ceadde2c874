use super::cascading::CascadingSelector;
use super::WorkflowError;
use crate::models::{HierarchyLevel, ResolvedLocation, SearchResult};
use crate::services::HierarchyRepository;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverMode {
    Search,
    Create,
}

impl ResolverMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Create => "create",
        }
    }
}

/// One control that is either a search over existing locations or the
/// cascading create form, normalising either into a [`ResolvedLocation`].
pub struct LocationResolver {
    repository: Arc<dyn HierarchyRepository>,
    mode: ResolverMode,
    cascade: CascadingSelector,
    results: Vec<SearchResult>,
}

impl LocationResolver {
    pub fn new(repository: Arc<dyn HierarchyRepository>) -> Self {
        Self {
            cascade: CascadingSelector::new(repository.clone()),
            repository,
            mode: ResolverMode::Search,
            results: Vec::new(),
        }
    }

    pub fn mode(&self) -> ResolverMode {
        self.mode
    }

    pub fn cascade(&self) -> &CascadingSelector {
        &self.cascade
    }

    pub fn cascade_mut(&mut self) -> &mut CascadingSelector {
        &mut self.cascade
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    pub async fn search(&mut self, query: &str) -> Result<&[SearchResult], WorkflowError> {
        self.results = if query.trim().is_empty() {
            Vec::new()
        } else {
            self.repository.search_locations(query).await?
        };
        Ok(&self.results)
    }

    /// Adopt a search result. Leaves create mode, discarding its unconfirmed
    /// input. `None` when the result carries no id or type.
    pub fn select_existing(&mut self, result: &SearchResult) -> Option<ResolvedLocation> {
        let location = result.to_location()?;
        if self.mode == ResolverMode::Create {
            self.cancel_create();
        }
        Some(location)
    }

    /// Switch to the create form, optionally pre-filled and focused, and load
    /// the option lists along the pre-filled chain.
    pub async fn open_create(
        &mut self,
        prefill: Option<&ResolvedLocation>,
        focus: Option<HierarchyLevel>,
    ) -> Result<(), WorkflowError> {
        self.mode = ResolverMode::Create;
        self.results.clear();
        match prefill {
            Some(location) => self.cascade.prefill(location),
            None => self.cascade.reset(),
        }
        if let Some(level) = focus {
            self.cascade.focus(level);
        }

        for level in HierarchyLevel::CASCADE {
            if !self.cascade.is_enterable(level) {
                break;
            }
            self.cascade.load_children(level).await?;
        }
        Ok(())
    }

    pub fn cancel_create(&mut self) {
        self.mode = ResolverMode::Search;
        self.cascade.reset();
    }

    /// The create form as a location, if it has two consecutive resolved levels.
    /// The form stays open either way.
    pub fn confirm_created(&self) -> Result<ResolvedLocation, WorkflowError> {
        if self.mode != ResolverMode::Create {
            return Err(WorkflowError::NothingToConfirm);
        }
        let location = self.cascade.snapshot();
        if !location.has_consecutive_levels() {
            return Err(WorkflowError::IncompleteHierarchy {
                resolved: location.resolved_levels().len(),
            });
        }
        Ok(location)
    }

    pub fn reset(&mut self) {
        self.mode = ResolverMode::Search;
        self.results.clear();
        self.cascade.reset();
    }
}
