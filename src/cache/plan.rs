//! Resolve path and filename templates into concrete storage keys

use crate::archive::{self, Archive};
use crate::cachekey::{KeyResolver, Metadata, Template};
use crate::error::StowageResult;
use std::sync::Arc;
use tracing::debug;

/// Unrendered templates for one cache
#[derive(Debug, Clone, Default)]
pub struct CacheTemplates {
    /// Directory part of the key, `<namespace>/<dir>`
    pub path: String,
    /// Archive file name; its suffix selects the format
    pub filename: String,
    /// Directory tried on restore when `path` yields nothing
    pub fallback_path: Option<String>,
    /// Prefix cleaned by flush; defaults to `path`
    pub flush_path: Option<String>,
}

/// Fully rendered cache locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub key: String,
    pub fallback_key: Option<String>,
    pub flush_prefix: String,
    pub filename: String,
    /// Whether the key is content-derived, so an existing object is current
    pub skip_if_exists: bool,
}

impl Plan {
    /// Render every template against the resolver's working directory
    pub fn resolve(
        resolver: &KeyResolver,
        templates: &CacheTemplates,
        metadata: &Metadata,
    ) -> StowageResult<Self> {
        let path = Template::parse(&templates.path)?;
        let filename = Template::parse(&templates.filename)?;

        let rendered_path = resolver.render_parsed(&path, metadata)?;
        let rendered_filename = resolver.render_parsed(&filename, metadata)?;

        let fallback_key = match templates.fallback_path.as_deref() {
            Some(tpl) if !tpl.trim().is_empty() => {
                let dir = resolver.render(tpl, metadata)?;
                Some(join_key(&dir, &rendered_filename))
            }
            _ => None,
        };

        let flush_prefix = match templates.flush_path.as_deref() {
            Some(tpl) if !tpl.trim().is_empty() => resolver.render(tpl, metadata)?,
            _ => rendered_path.clone(),
        };

        let plan = Self {
            key: join_key(&rendered_path, &rendered_filename),
            fallback_key,
            flush_prefix: clean_key(&flush_prefix),
            filename: rendered_filename,
            skip_if_exists: path.uses_checksum() || filename.uses_checksum(),
        };
        debug!("Resolved cache plan: {:?}", plan);
        Ok(plan)
    }

    /// Archive format selected by the rendered filename
    pub fn archive(&self) -> StowageResult<Arc<dyn Archive>> {
        archive::from_filename(&self.filename)
    }
}

/// Join slash-separated key parts, dropping empty and `.` segments and
/// resolving `..`
pub fn join_key(dir: &str, file: &str) -> String {
    let joined = format!("{}/{}", dir, file);
    let cleaned = clean_key(&joined);
    if dir.is_empty() {
        cleaned.trim_start_matches('/').to_string()
    } else {
        cleaned
    }
}

/// Normalize a slash-separated key the same way [`join_key`] does
pub fn clean_key(key: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in key.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }

    let joined = parts.join("/");
    if key.starts_with('/') {
        format!("/{}", joined)
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn templates(path: &str, filename: &str) -> CacheTemplates {
        CacheTemplates {
            path: path.to_string(),
            filename: filename.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn join_key_cleans() {
        assert_eq!(join_key("cache/repo", "deps.tar"), "cache/repo/deps.tar");
        assert_eq!(join_key("cache/repo/", "deps.tar"), "cache/repo/deps.tar");
        assert_eq!(join_key("cache//", "deps.tar"), "cache/deps.tar");
        assert_eq!(join_key("/cache/./a/../b", "x.tgz"), "/cache/b/x.tgz");
        assert_eq!(join_key("", "x.tgz"), "x.tgz");
    }

    #[test]
    fn plan_from_metadata() {
        let ws = TempDir::new().unwrap();
        let resolver = KeyResolver::new(ws.path());
        let mut metadata = Metadata::new();
        metadata.insert("Repo".to_string(), json!("Acme/App"));

        let mut tpl = templates("cache/{{ .Repo }}", "archive.tgz");
        tpl.fallback_path = Some("cache/main".to_string());

        let plan = Plan::resolve(&resolver, &tpl, &metadata).unwrap();
        assert_eq!(plan.key, "cache/Acme/App/archive.tgz");
        assert_eq!(plan.fallback_key.as_deref(), Some("cache/main/archive.tgz"));
        assert_eq!(plan.flush_prefix, "cache/Acme/App");
        assert!(!plan.skip_if_exists);
        assert_eq!(plan.archive().unwrap().name(), "tgz");
    }

    #[test]
    fn checksum_template_enables_skip() {
        let ws = TempDir::new().unwrap();
        fs::write(ws.path().join("Cargo.lock"), "lock").unwrap();
        let resolver = KeyResolver::new(ws.path());

        let tpl = templates("cache/{{ checksum \"Cargo.lock\" }}", "deps.tar");
        let plan = Plan::resolve(&resolver, &tpl, &Metadata::new()).unwrap();

        assert!(plan.skip_if_exists);
        // cache/<64 hex chars>/deps.tar
        assert_eq!(plan.key.len(), "cache/".len() + 64 + "/deps.tar".len());
    }

    #[test]
    fn empty_fallback_means_none() {
        let ws = TempDir::new().unwrap();
        let resolver = KeyResolver::new(ws.path());
        let mut tpl = templates("cache/repo", "deps.tar");
        tpl.fallback_path = Some("  ".to_string());
        tpl.flush_path = Some("cache/old/".to_string());

        let plan = Plan::resolve(&resolver, &tpl, &Metadata::new()).unwrap();
        assert_eq!(plan.fallback_key, None);
        assert_eq!(plan.flush_prefix, "cache/old");
    }

    #[test]
    fn unknown_suffix_rejected_on_archive() {
        let ws = TempDir::new().unwrap();
        let resolver = KeyResolver::new(ws.path());
        let plan = Plan::resolve(&resolver, &templates("cache/repo", "deps.zip"), &Metadata::new())
            .unwrap();
        assert!(plan.archive().is_err());
    }
}
