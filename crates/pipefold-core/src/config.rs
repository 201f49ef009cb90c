//! Configuration model and YAML loading
//!
//! Two layers:
//!
//! - [`RawConfig`] mirrors the YAML file. Plugins are referenced by name.
//! - [`Config`] is what the pipeline runs. Plugin names are resolved through a
//!   [`PluginRegistry`] and every output spec is normalized once into a map of
//!   [`ViewName`] to stage list.
//!
//! # Configuration File
//!
//! ```yaml
//! dirs:
//!   in: content
//!   out: public
//! data_types:
//!   blog:
//!     in: "posts/*.md"
//!     pre: [sort]
//!     out:
//!       single: [[replace: {pattern: "foo", with: "bar"}], write]
//!       archive: [log]
//!   images:
//!     in: "img/*.png"
//!     out: [write]
//! ```
//!
//! A document without `data_types` is read as a bare map of data types.
//!
//! Each element of a stage list is one step. An element that is itself a
//! list runs its plugins concurrently; a lone plugin is a step of one. So
//! `[a, b]` runs `a` then `b`, while `[[a, b]]` runs both at once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::plugin::{Plugin, ViewName};
use crate::registry::PluginRegistry;

/// Default configuration file name
pub const CONFIG_FILE: &str = "pipefold.yaml";

/// One step: plugins that run concurrently
pub type Step = Vec<Arc<dyn Plugin>>;

/// Ordered steps of one view
pub type StageList = Vec<Step>;

/// Input and output roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirs {
    /// Prefixed to relative input patterns
    pub in_dir: PathBuf,

    /// Where `write` puts files and what `serve` exposes
    pub out_dir: PathBuf,
}

impl Default for Dirs {
    fn default() -> Self {
        Self {
            in_dir: PathBuf::from(default_in_dir()),
            out_dir: PathBuf::from(default_out_dir()),
        }
    }
}

fn default_in_dir() -> String {
    ".".to_string()
}

fn default_out_dir() -> String {
    "out".to_string()
}

/// Where a data type's files go after reading
#[derive(Debug, Clone)]
pub enum OutputSpec {
    /// One untagged pipeline; the result is rendered flat
    Default(StageList),
    /// Named views, each over its own copy of the files
    Views(BTreeMap<String, StageList>),
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self::Default(Vec::new())
    }
}

impl OutputSpec {
    /// Whether views are declared
    pub fn has_views(&self) -> bool {
        matches!(self, Self::Views(_))
    }

    /// Uniform shape for the scheduler: the default spec becomes a single
    /// entry under [`ViewName::Default`].
    pub fn normalize(&self) -> BTreeMap<ViewName, StageList> {
        match self {
            Self::Default(stages) => BTreeMap::from([(ViewName::Default, stages.clone())]),
            Self::Views(views) => views
                .iter()
                .map(|(name, stages)| (ViewName::named(name.clone()), stages.clone()))
                .collect(),
        }
    }
}

/// One named category of input files
#[derive(Debug, Clone)]
pub struct DataTypeConfig {
    /// Input glob pattern, relative to [`Dirs::in_dir`] unless absolute
    pub pattern: String,

    /// Steps run on the flat collection before views are copied
    pub pre_process: StageList,

    /// Per-view (or default) steps
    pub output: OutputSpec,
}

impl DataTypeConfig {
    /// A data type with no pipelines
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            pre_process: Vec::new(),
            output: OutputSpec::default(),
        }
    }

    /// Set the pre-process stage list
    pub fn pre(mut self, stages: StageList) -> Self {
        self.pre_process = stages;
        self
    }

    /// Use a single untagged pipeline
    pub fn default_view(mut self, stages: StageList) -> Self {
        self.output = OutputSpec::Default(stages);
        self
    }

    /// Add a named view, switching the output spec to views if needed
    pub fn view(mut self, name: impl Into<String>, stages: StageList) -> Self {
        match &mut self.output {
            OutputSpec::Views(views) => {
                views.insert(name.into(), stages);
            }
            OutputSpec::Default(_) => {
                self.output = OutputSpec::Views(BTreeMap::from([(name.into(), stages)]));
            }
        }
        self
    }

    /// The input pattern with the input root prefixed when it is relative
    pub fn resolved_pattern(&self, dirs: &Dirs) -> String {
        if Path::new(&self.pattern).is_absolute() {
            self.pattern.clone()
        } else {
            dirs.in_dir.join(&self.pattern).to_string_lossy().into_owned()
        }
    }
}

/// Resolved configuration, read-only during a build
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Input and output roots
    pub dirs: Dirs,

    /// Data types by name
    pub data_types: BTreeMap<String, DataTypeConfig>,
}

impl Config {
    /// Empty configuration with default dirs
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the dirs
    pub fn with_dirs(mut self, in_dir: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        self.dirs = Dirs {
            in_dir: in_dir.into(),
            out_dir: out_dir.into(),
        };
        self
    }

    /// Add a data type
    pub fn data_type(mut self, name: impl Into<String>, config: DataTypeConfig) -> Self {
        self.data_types.insert(name.into(), config);
        self
    }

    /// Load and resolve a configuration file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to a project directory (containing `pipefold.yaml`) or
    ///   to the file itself
    /// * `registry` - Plugins that stage lists may reference by name
    ///
    /// Relative `dirs` resolve against the directory holding the file.
    pub fn load<P: AsRef<Path>>(path: P, registry: &PluginRegistry) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_path) = if path.is_dir() {
            (path.join(CONFIG_FILE), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.is_file() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|source| Error::Io {
            path: config_path.clone(),
            source,
        })?;
        tracing::debug!("Loaded configuration from {}", config_path.display());

        RawConfig::from_yaml(&contents)?.resolve(&base_path, registry)
    }

    /// Check structural rules that the builder API cannot enforce
    pub fn validate(&self) -> Result<()> {
        for (name, data_type) in &self.data_types {
            if name.trim().is_empty() {
                return Err(Error::invalid("data type names must not be empty"));
            }
            if data_type.pattern.trim().is_empty() {
                return Err(Error::invalid(format!(
                    "data type '{name}' has an empty input pattern"
                )));
            }
            glob::Pattern::new(&data_type.pattern)?;
            if let OutputSpec::Views(views) = &data_type.output
                && views.keys().any(|view| view.trim().is_empty())
            {
                return Err(Error::invalid(format!(
                    "data type '{name}' declares a view with an empty name"
                )));
            }
        }
        Ok(())
    }

    /// Every data type's input pattern, with the input root applied
    pub fn input_patterns(&self) -> Vec<String> {
        self.data_types
            .values()
            .map(|data_type| data_type.resolved_pattern(&self.dirs))
            .collect()
    }
}

// ============================================================================
// YAML layer
// ============================================================================

/// A plugin reference in a stage list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginRef {
    /// Bare name: `write`
    Name(String),
    /// Name with arguments: `filter: {pattern: "*.md"}`
    WithArgs(BTreeMap<String, serde_yaml::Value>),
}

impl PluginRef {
    /// Split into name and arguments (`Null` for a bare name)
    pub fn parts(&self) -> Result<(&str, serde_yaml::Value)> {
        match self {
            Self::Name(name) => Ok((name, serde_yaml::Value::Null)),
            Self::WithArgs(map) => {
                let mut entries = map.iter();
                match (entries.next(), entries.next()) {
                    (Some((name, args)), None) => Ok((name, args.clone())),
                    _ => Err(Error::invalid(format!(
                        "a plugin reference must have exactly one name, found {}",
                        map.len()
                    ))),
                }
            }
        }
    }
}

/// A step in a YAML stage list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawStep {
    /// Plugins that run concurrently
    Parallel(Vec<PluginRef>),
    /// A step of exactly one plugin
    Single(PluginRef),
}

impl RawStep {
    fn refs(&self) -> &[PluginRef] {
        match self {
            Self::Parallel(refs) => refs,
            Self::Single(plugin) => std::slice::from_ref(plugin),
        }
    }
}

/// YAML output spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawOutput {
    /// A single stage list
    Default(Vec<RawStep>),
    /// View name to stage list
    Views(BTreeMap<String, Vec<RawStep>>),
}

/// YAML data type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDataType {
    /// Input glob pattern
    #[serde(rename = "in")]
    pub pattern: String,

    /// Pre-process stage list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre: Vec<RawStep>,

    /// Output spec; missing means no pipelines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<RawOutput>,
}

/// YAML dirs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDirs {
    /// Input root
    #[serde(rename = "in", default = "default_in_dir")]
    pub in_dir: String,

    /// Output root
    #[serde(rename = "out", default = "default_out_dir")]
    pub out_dir: String,
}

impl Default for RawDirs {
    fn default() -> Self {
        Self {
            in_dir: default_in_dir(),
            out_dir: default_out_dir(),
        }
    }
}

/// Configuration as written in `pipefold.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawConfig {
    /// Input and output roots
    #[serde(default)]
    pub dirs: RawDirs,

    /// Data types by name
    #[serde(default)]
    pub data_types: BTreeMap<String, RawDataType>,
}

impl RawConfig {
    /// Parse a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let doc: serde_yaml::Value = serde_yaml::from_str(contents)?;
        let wrapped = match &doc {
            serde_yaml::Value::Null => return Ok(Self::default()),
            serde_yaml::Value::Mapping(map) => map.contains_key("data_types"),
            _ => return Err(Error::invalid("config must be a mapping")),
        };

        if wrapped {
            Ok(serde_yaml::from_value(doc)?)
        } else {
            Ok(Self {
                dirs: RawDirs::default(),
                data_types: serde_yaml::from_value(doc)?,
            })
        }
    }

    /// Resolve plugin names and dirs into a runnable [`Config`]
    pub fn resolve(self, base_path: &Path, registry: &PluginRegistry) -> Result<Config> {
        let dirs = Dirs {
            in_dir: base_path.join(&self.dirs.in_dir),
            out_dir: base_path.join(&self.dirs.out_dir),
        };

        let mut data_types = BTreeMap::new();
        for (name, raw) in self.data_types {
            let pre_process = resolve_stages(&raw.pre, registry)?;
            let output = match raw.out {
                None => OutputSpec::default(),
                Some(RawOutput::Default(steps)) => {
                    OutputSpec::Default(resolve_stages(&steps, registry)?)
                }
                Some(RawOutput::Views(views)) => OutputSpec::Views(
                    views
                        .iter()
                        .map(|(view, steps)| -> Result<(String, StageList)> {
                            Ok((view.clone(), resolve_stages(steps, registry)?))
                        })
                        .collect::<Result<_>>()?,
                ),
            };
            data_types.insert(
                name,
                DataTypeConfig {
                    pattern: raw.pattern,
                    pre_process,
                    output,
                },
            );
        }

        let config = Config { dirs, data_types };
        config.validate()?;
        Ok(config)
    }
}

fn resolve_stages(steps: &[RawStep], registry: &PluginRegistry) -> Result<StageList> {
    steps
        .iter()
        .map(|step| {
            step.refs()
                .iter()
                .map(|r| registry.create(r))
                .collect::<Result<Step>>()
        })
        .collect()
}
