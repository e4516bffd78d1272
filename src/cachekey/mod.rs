//! Cache key resolution
//!
//! Renders path templates into concrete storage keys. Keys are
//! deterministic for identical inputs unless the template calls `epoch`,
//! and change whenever a file hashed by `checksum` changes.

pub mod functions;
pub mod template;

pub use functions::TemplateFunction;
pub use template::{Segment, Template};

use crate::error::StowageResult;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Variables available to templates as `{{ .Name }}`
pub type Metadata = BTreeMap<String, Value>;

/// Renders cache key templates relative to a working directory
#[derive(Debug, Clone)]
pub struct KeyResolver {
    workdir: PathBuf,
}

impl KeyResolver {
    /// Create a resolver; relative `checksum` paths are resolved against `workdir`
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Parse and render a template in one step
    pub fn render(&self, template: &str, metadata: &Metadata) -> StowageResult<String> {
        Template::parse(template)?.render(&self.workdir, metadata)
    }

    /// Render an already parsed template
    pub fn render_parsed(&self, template: &Template, metadata: &Metadata) -> StowageResult<String> {
        template.render(&self.workdir, metadata)
    }
}
