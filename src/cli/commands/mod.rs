//! CLI command implementations

pub mod config;
pub mod flush;
pub mod rebuild;
pub mod restore;

pub use config::execute as config;
pub use flush::execute as flush;
pub use rebuild::execute as rebuild;
pub use restore::execute as restore;

use crate::archive::Archive;
use crate::cache::{Cache, CacheTemplates};
use crate::cachekey::{KeyResolver, Metadata};
use crate::cli::args::{KeyArgs, MetaArgs};
use crate::config::Config;
use crate::storage::{create_storage, Storage};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolved settings shared by the cache commands
pub struct Context {
    workdir: PathBuf,
    config: Config,
}

impl Context {
    pub fn new(workdir: PathBuf, config: Config) -> Self {
        Self { workdir, config }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> KeyResolver {
        KeyResolver::new(&self.workdir)
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        create_storage(&self.config.storage)
    }

    /// Cache bound to the working directory, sized from config
    pub fn cache(&self, archive: Arc<dyn Archive>) -> Cache {
        Cache::new(self.storage(), archive, &self.workdir)
            .with_pipe(self.config.cache.pipe_capacity, self.config.cache.chunk_size)
    }

    /// Templates from key arguments, with the filename defaulted from config
    pub fn templates(&self, key: &KeyArgs) -> CacheTemplates {
        CacheTemplates {
            path: key.path.clone(),
            filename: key
                .filename
                .clone()
                .unwrap_or_else(|| self.config.cache.filename.clone()),
            ..Default::default()
        }
    }
}

/// Template variables from `--meta` flags; later flags win
pub fn metadata(args: &MetaArgs) -> Metadata {
    args.meta
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_later_flags_win() {
        let args = MetaArgs {
            meta: vec![
                ("Branch".to_string(), "main".to_string()),
                ("Branch".to_string(), "dev".to_string()),
            ],
        };
        let meta = metadata(&args);
        assert_eq!(meta.len(), 1);
        assert_eq!(meta["Branch"], Value::from("dev"));
    }

    #[test]
    fn filename_defaults_from_config() {
        let mut config = Config::default();
        config.cache.filename = "deps.tgz".to_string();
        let ctx = Context::new(PathBuf::from("/src"), config);

        let key = KeyArgs {
            path: "cache/app".to_string(),
            filename: None,
            meta: MetaArgs::default(),
        };
        assert_eq!(ctx.templates(&key).filename, "deps.tgz");

        let key = KeyArgs {
            filename: Some("other.tar".to_string()),
            ..key
        };
        assert_eq!(ctx.templates(&key).filename, "other.tar");
    }
}
