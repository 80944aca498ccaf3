use std::path::Path;
use std::sync::Arc;

use crate::error::StoreError;
use crate::events::{EventSink, NoopSink};
use crate::project::Project;
use crate::schema::{JsonSchemaValidator, SchemaValidator};

/// Shared collaborators for store operations: the schema validator and the
/// sink that receives change notifications.
#[derive(Clone)]
pub struct StoreEnv {
    pub validator: Arc<dyn SchemaValidator>,
    pub events: Arc<dyn EventSink>,
}

impl StoreEnv {
    /// Embedded schemas, events discarded.
    pub fn new() -> Result<Self, StoreError> {
        Self::with_events(Arc::new(NoopSink))
    }

    /// Embedded schemas, events delivered to `events`.
    pub fn with_events(events: Arc<dyn EventSink>) -> Result<Self, StoreError> {
        Ok(Self::from_parts(Arc::new(JsonSchemaValidator::new()?), events))
    }

    pub fn from_parts(validator: Arc<dyn SchemaValidator>, events: Arc<dyn EventSink>) -> Self {
        Self { validator, events }
    }

    /// Loads the project at `path` with this environment's validator.
    pub fn project(&self, path: impl AsRef<Path>) -> Result<Project, StoreError> {
        Project::load(path, self.validator.clone())
    }
}
