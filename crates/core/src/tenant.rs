//! Tenant identity: one managed project plus the tag used to namespace
//! its dataset.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A `{project, tag}` pair processed independently in each pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub project_id: String,
    pub tag: String,
}

impl TenantContext {
    pub fn new(project_id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            tag: tag.into(),
        }
    }

    /// Substitute `{project}`, `{tag}` and a bare positional `{}` (the project).
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{project}", &self.project_id)
            .replace("{tag}", &self.tag)
            .replace("{}", &self.project_id)
    }
}

impl std::fmt::Display for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.project_id, self.tag)
    }
}

/// Parse `project:tag,project:tag`. An entry without a colon gets an empty tag.
pub fn parse_tenant_list(list: &str) -> Result<Vec<TenantContext>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (project, tag) = entry.split_once(':').unwrap_or((entry, ""));
            let project = project.trim();
            if project.is_empty() {
                return Err(ConfigError::InvalidTenant(entry.to_string()));
            }
            Ok(TenantContext::new(project, tag.trim()))
        })
        .collect()
}

/// Pair two parallel comma-separated lists positionally. Unlike a plain zip,
/// lists of different lengths are rejected.
pub fn zip_tenant_lists(ids: &str, tags: &str) -> Result<Vec<TenantContext>, ConfigError> {
    let ids: Vec<&str> = ids.split(',').map(str::trim).collect();
    let tags: Vec<&str> = tags.split(',').map(str::trim).collect();

    if ids.len() != tags.len() {
        return Err(ConfigError::TenantArity {
            ids: ids.len(),
            tags: tags.len(),
        });
    }

    ids.into_iter()
        .zip(tags)
        .map(|(id, tag)| {
            if id.is_empty() {
                Err(ConfigError::InvalidTenant(format!("{id}:{tag}")))
            } else {
                Ok(TenantContext::new(id, tag))
            }
        })
        .collect()
}
