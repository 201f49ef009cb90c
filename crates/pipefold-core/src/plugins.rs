//! Built-in plugins
//!
//! Small, general stages that make a YAML-only configuration useful.
//!
//! # Built-in Plugins
//!
//! - `sort` - Order records by path
//! - `filter` - Keep (or drop) records whose path matches a glob
//! - `replace` - Regex substitution in text content
//! - `log` - Log the collection without changing it
//! - `write` - Write records under the output root
//!
//! # Example
//!
//! ```yaml
//! out:
//!   - sort:
//!       reverse: true
//!   - filter:
//!       pattern: "drafts/*"
//!       exclude: true
//!   - replace:
//!       pattern: "\\{\\{year\\}\\}"
//!       with: "2024"
//!   - write:
//!       dir: posts
//!       extension: html
//! ```

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Error;
use crate::file::{Content, FileCollection, FileRecord};
use crate::plugin::{Plugin, PluginContext, PluginResult};
use crate::registry::{PluginRegistry, parse_args};

/// Register every built-in under its YAML name
pub fn register_builtins(registry: &mut PluginRegistry) {
    registry
        .register("sort", |args| {
            let args: SortArgs = parse_args("sort", args)?;
            Ok(Arc::new(Sort {
                reverse: args.reverse,
            }) as Arc<dyn Plugin>)
        })
        .register("filter", |args| {
            let args: FilterArgs = parse_args("filter", args)?;
            Ok(Arc::new(Filter {
                pattern: glob::Pattern::new(&args.pattern)?,
                exclude: args.exclude,
            }) as Arc<dyn Plugin>)
        })
        .register("replace", |args| {
            let args: ReplaceArgs = parse_args("replace", args)?;
            let regex = Regex::new(&args.pattern).map_err(|err| Error::ConfigInvalid {
                message: format!("plugin 'replace': {err}"),
            })?;
            Ok(Arc::new(Replace {
                regex,
                with: args.with,
            }) as Arc<dyn Plugin>)
        })
        .register("log", |_args| Ok(Arc::new(Log) as Arc<dyn Plugin>))
        .register("write", |args| {
            let args: WriteArgs = parse_args("write", args)?;
            Ok(Arc::new(Write {
                dir: args.dir,
                extension: args.extension,
            }) as Arc<dyn Plugin>)
        });
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SortArgs {
    #[serde(default)]
    reverse: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterArgs {
    pattern: String,
    #[serde(default)]
    exclude: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReplaceArgs {
    pattern: String,
    #[serde(default)]
    with: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WriteArgs {
    #[serde(default)]
    dir: Option<PathBuf>,
    #[serde(default)]
    extension: Option<String>,
}

/// Orders records by path
#[derive(Debug, Clone, Default)]
pub struct Sort {
    /// Descending instead of ascending
    pub reverse: bool,
}

#[async_trait]
impl Plugin for Sort {
    fn name(&self) -> &str {
        "sort"
    }

    async fn run(&self, mut files: FileCollection, _ctx: &PluginContext) -> PluginResult {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        if self.reverse {
            files.reverse();
        }
        Ok(Some(files))
    }
}

/// Keeps records whose path (relative to the input root) matches
#[derive(Debug, Clone)]
pub struct Filter {
    /// Pattern checked against each record's path
    pub pattern: glob::Pattern,
    /// Drop matches instead of keeping them
    pub exclude: bool,
}

#[async_trait]
impl Plugin for Filter {
    fn name(&self) -> &str {
        "filter"
    }

    async fn run(&self, files: FileCollection, ctx: &PluginContext) -> PluginResult {
        let kept = files
            .into_iter()
            .filter(|file| {
                let path = file
                    .relative_to(&ctx.config.dirs.in_dir)
                    .unwrap_or(file.path.as_path());
                self.pattern.matches_path(path) != self.exclude
            })
            .collect();
        Ok(Some(kept))
    }
}

/// Regex substitution over text records
#[derive(Debug, Clone)]
pub struct Replace {
    /// What to look for
    pub regex: Regex,
    /// Replacement, with `$1`/`$name` capture references
    pub with: String,
}

#[async_trait]
impl Plugin for Replace {
    fn name(&self) -> &str {
        "replace"
    }

    async fn run(&self, mut files: FileCollection, _ctx: &PluginContext) -> PluginResult {
        for file in &mut files {
            if let Content::Text(text) = &file.content {
                let replaced = self.regex.replace_all(text, self.with.as_str()).into_owned();
                file.content = Content::Text(replaced);
            }
        }
        Ok(Some(files))
    }
}

/// Logs the collection it sees
#[derive(Debug, Clone, Default)]
pub struct Log;

#[async_trait]
impl Plugin for Log {
    fn name(&self) -> &str {
        "log"
    }

    async fn run(&self, files: FileCollection, ctx: &PluginContext) -> PluginResult {
        tracing::info!(
            data_type = %ctx.data_type,
            view = %ctx.view,
            "{} file(s)",
            files.len()
        );
        for file in &files {
            tracing::debug!("  {} ({} bytes)", file.path.display(), file.content.len());
        }
        Ok(None)
    }
}

/// Writes every record under the output root
#[derive(Debug, Clone, Default)]
pub struct Write {
    /// Subdirectory of the output root
    pub dir: Option<PathBuf>,
    /// Replacement file extension
    pub extension: Option<String>,
}

impl Write {
    /// Where a record ends up. Records outside the input root keep only
    /// their file name.
    pub fn destination(&self, file: &FileRecord, in_dir: &Path, out_dir: &Path) -> PathBuf {
        let rel = file
            .relative_to(in_dir)
            .map(Path::to_path_buf)
            .or_else(|| file.path.file_name().map(PathBuf::from))
            .unwrap_or_default();

        let mut dest = match &self.dir {
            Some(dir) => out_dir.join(dir).join(rel),
            None => out_dir.join(rel),
        };
        if let Some(ext) = &self.extension {
            dest.set_extension(ext);
        }
        dest
    }
}

#[async_trait]
impl Plugin for Write {
    fn name(&self) -> &str {
        "write"
    }

    async fn run(&self, files: FileCollection, ctx: &PluginContext) -> PluginResult {
        for file in &files {
            let dest = self.destination(file, &ctx.config.dirs.in_dir, &ctx.config.dirs.out_dir);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|err| {
                    format!("failed to create {}: {err}", parent.display())
                })?;
            }
            tokio::fs::write(&dest, file.content.as_bytes())
                .await
                .map_err(|err| format!("failed to write {}: {err}", dest.display()))?;
            tracing::debug!("Wrote {}", dest.display());
        }
        Ok(None)
    }
}
