use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where a document-level error was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowErrorLocation {
    pub path: Option<String>,
    pub source_path: Option<PathBuf>,
    pub json_pointer: Option<String>,
}

impl FlowErrorLocation {
    pub fn at_path(path: impl Into<String>) -> Self {
        FlowErrorLocation {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_source_path(mut self, source_path: Option<&Path>) -> Self {
        self.source_path = source_path.map(Path::to_path_buf);
        self
    }

    pub fn with_json_pointer(mut self, pointer: Option<String>) -> Self {
        self.json_pointer = pointer;
        self
    }

    pub fn describe(&self) -> Option<String> {
        match (&self.source_path, &self.path) {
            (Some(source), _) => Some(source.display().to_string()),
            (None, Some(path)) => Some(path.clone()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchemaErrorDetail {
    pub message: String,
    pub location: FlowErrorLocation,
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("JSON parse error in {}: {message}", location.describe().unwrap_or_default())]
    Json {
        message: String,
        location: FlowErrorLocation,
    },
    #[error("Schema validation failed:\n{message}")]
    Schema {
        message: String,
        details: Vec<SchemaErrorDetail>,
        location: FlowErrorLocation,
    },
    #[error("Flow invariant violated: {message}")]
    GraphInvariant {
        message: String,
        location: FlowErrorLocation,
    },
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        location: FlowErrorLocation,
    },
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        location: FlowErrorLocation,
    },
}

impl FlowError {
    pub fn location(&self) -> &FlowErrorLocation {
        match self {
            FlowError::Json { location, .. }
            | FlowError::Schema { location, .. }
            | FlowError::GraphInvariant { location, .. }
            | FlowError::Config { location, .. }
            | FlowError::Internal { location, .. } => location,
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
