use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::finder::ViewMode;

pub const DEFAULT_CONFIG_FILE: &str = "opfinder.toml";
pub const ENV_PREFIX: &str = "OPFINDER";

/// Top-level finder configuration.
///
/// Layered, lowest precedence first: built-in defaults, `opfinder.toml` in
/// the platform config directory, an explicitly supplied file, then
/// `OPFINDER__SECTION__KEY` environment variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinderConfig {
    pub filter: FilterConfig,
    pub index: IndexConfig,
    pub hierarchy: HierarchyConfig,
    pub simple: SimpleConfig,
    pub view: ViewConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// How many distinct top scores survive a filter run. Higher is fuzzier.
    pub keep: usize,
    /// Progress is reported (and cancellation polled) every this many percent.
    pub progress_step: u8,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            keep: 1,
            progress_step: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub advanced_delimiters: Vec<String>,
    pub simple_delimiters: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            advanced_delimiters: vec![".".to_string()],
            simple_delimiters: Vec::new(),
        }
    }
}

impl IndexConfig {
    pub fn advanced_delimiter_chars(&self) -> Vec<char> {
        delimiter_chars(&self.advanced_delimiters)
    }

    pub fn simple_delimiter_chars(&self) -> Vec<char> {
        delimiter_chars(&self.simple_delimiters)
    }
}

// Only the first character of each configured delimiter is meaningful.
fn delimiter_chars(delimiters: &[String]) -> Vec<char> {
    let mut chars: Vec<char> = delimiters.iter().filter_map(|d| d.chars().next()).collect();
    chars.dedup();
    chars
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    pub root_label: String,
    pub root_invocation: String,
    pub root_owner: String,
    /// Namespace used for entries registered without one.
    pub global_namespace: String,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            root_label: "ops".to_string(),
            root_invocation: "# @OpService ops".to_string(),
            root_owner: "net.imagej.ops.OpService".to_string(),
            global_namespace: "(global)".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleConfig {
    /// Type identifiers that make an entry eligible for the simple view when
    /// at least one of its inputs is assignable to one of them.
    pub eligible_types: Vec<String>,
    pub image_pattern: String,
    pub image_label: String,
    pub number_pattern: String,
    pub number_label: String,
}

impl Default for SimpleConfig {
    fn default() -> Self {
        Self {
            eligible_types: vec!["Img".to_string()],
            image_pattern: "ArrayImg|PlanarImg|RandomAccessibleInterval|IterableInterval|Img|Histogram1d|ImgPlus|Dataset"
                .to_string(),
            image_label: "Image".to_string(),
            number_pattern: "int|short|long|double|float|byte|RealType".to_string(),
            number_label: "Number".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub default_mode: ViewMode,
}

impl FinderConfig {
    /// Load the layered configuration. `explicit` overrides the per-user file.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&FinderConfig::default())?);

        if let Some(user_file) = Self::user_config_path() {
            debug!(path = %user_file.display(), "checking user config file");
            builder = builder.add_source(File::from(user_file).required(false));
        }

        if let Some(path) = explicit {
            debug!(path = %path.display(), "loading explicit config file");
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        let config: FinderConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config.normalized())
    }

    /// Platform config location, e.g. `~/.config/opfinder/opfinder.toml`.
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("net", "imagej", "opfinder").map(|dirs| dirs.config_dir().join(DEFAULT_CONFIG_FILE))
    }

    /// Clamp values that would make filtering meaningless.
    pub fn normalized(mut self) -> Self {
        self.filter.keep = self.filter.keep.max(1);
        self.filter.progress_step = self.filter.progress_step.clamp(1, 100);
        self
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
