//! Run configuration
//!
//! Two layers:
//! - [`ControlFile`]: the workflow control file, a flat `key | value` table
//!   holding paths, the domain name and numeric run parameters.
//! - [`ZonalConfig`]: the explicit settings object handed to every
//!   aggregation step (coverage policy, column naming, id fields).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Workflow control file.
///
/// ```text
/// # Settings for the Bow at Banff domain
/// domain_name     | BowAtBanff         ! used in file names
/// class_raster    | /data/modis_mode.tif
/// class_prefix    | IGBP_
/// ```
///
/// Every line with a `|` is a setting. Text after `!` is a comment, lines
/// starting with `#` are ignored, keys and values are trimmed. A key that
/// appears twice keeps its last value.
#[derive(Debug, Clone, Default)]
pub struct ControlFile {
    values: HashMap<String, String>,
    order: Vec<String>,
    source: Option<PathBuf>,
}

impl ControlFile {
    /// Parse control-file text
    pub fn parse(text: &str) -> Self {
        let mut control = ControlFile::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = match line.find('!') {
                Some(idx) => &line[..idx],
                None => line,
            };
            let Some((key, value)) = line.split_once('|') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            control.insert(key, value.trim());
        }
        control
    }

    /// Read and parse a control file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let mut control = Self::parse(&text);
        control.source = Some(path.as_ref().to_path_buf());
        tracing::debug!(
            "Loaded {} settings from {}",
            control.len(),
            path.as_ref().display()
        );
        Ok(control)
    }

    /// Set or replace a value
    pub fn insert(&mut self, key: &str, value: &str) {
        if self.values.insert(key.to_string(), value.to_string()).is_none() {
            self.order.push(key.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keys in the order they first appear in the file
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Raw value for a key
    pub fn get(&self, key: &str) -> Result<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| Error::Config(format!("missing key '{}'{}", key, self.origin())))
    }

    /// Value for a key, or `default` when the key is absent
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.values.get(key).map(String::as_str).unwrap_or(default)
    }

    /// Value as a path. Relative paths resolve against the control file's
    /// directory when the file was loaded from disk.
    pub fn path(&self, key: &str) -> Result<PathBuf> {
        let raw = PathBuf::from(self.get(key)?);
        if raw.is_relative() {
            if let Some(dir) = self.source.as_deref().and_then(Path::parent) {
                return Ok(dir.join(raw));
            }
        }
        Ok(raw)
    }

    /// Value parsed into `T`
    pub fn parse_value<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let raw = self.get(key)?;
        raw.parse().map_err(|e: T::Err| {
            Error::Config(format!("key '{}' has invalid value '{}': {}", key, raw, e))
        })
    }

    /// Optional value parsed into `T`; absent keys give `Ok(None)`
    pub fn parse_optional<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        if self.contains(key) {
            self.parse_value(key).map(Some)
        } else {
            Ok(None)
        }
    }

    fn origin(&self) -> String {
        match &self.source {
            Some(path) => format!(" in {}", path.display()),
            None => String::new(),
        }
    }
}

/// Which raster cells belong to a polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoveragePolicy {
    /// Cells whose center falls inside the polygon
    #[default]
    CenterPoint,
    /// Every cell the polygon overlaps
    AllTouched,
}

impl FromStr for CoveragePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "center" | "centre" | "center_point" | "centroid" => Ok(CoveragePolicy::CenterPoint),
            "all_touched" | "all-touched" | "alltouched" | "touched" => {
                Ok(CoveragePolicy::AllTouched)
            }
            other => Err(Error::Config(format!(
                "unknown coverage policy '{}', expected center_point or all_touched",
                other
            ))),
        }
    }
}

impl fmt::Display for CoveragePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoveragePolicy::CenterPoint => write!(f, "center_point"),
            CoveragePolicy::AllTouched => write!(f, "all_touched"),
        }
    }
}

/// Settings shared by the count and fraction steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonalConfig {
    pub coverage: CoveragePolicy,
    /// Prefix of generated class-count columns, e.g. `IGBP_`
    pub class_prefix: String,
    /// Suffix appended to per-unit fraction columns
    pub fraction_suffix: String,
    /// Drop class columns that are zero for every polygon
    pub drop_empty_classes: bool,
    /// Response-unit identifier field
    pub id_field: String,
    /// Parent basin identifier field
    pub parent_field: String,
}

impl Default for ZonalConfig {
    fn default() -> Self {
        Self {
            coverage: CoveragePolicy::CenterPoint,
            class_prefix: String::new(),
            fraction_suffix: "_frac".to_string(),
            drop_empty_classes: true,
            id_field: "HRU_ID".to_string(),
            parent_field: "GRU_ID".to_string(),
        }
    }
}

impl ZonalConfig {
    /// Overlay the optional zonal keys of a control file on the defaults
    pub fn from_control(control: &ControlFile) -> Result<Self> {
        let defaults = Self::default();
        let coverage = control
            .parse_optional::<CoveragePolicy>("zonal_coverage")?
            .unwrap_or(defaults.coverage);
        let drop_empty_classes = control
            .parse_optional::<bool>("drop_empty_classes")?
            .unwrap_or(defaults.drop_empty_classes);

        Ok(Self {
            coverage,
            class_prefix: control.get_or("class_prefix", &defaults.class_prefix).to_string(),
            fraction_suffix: control
                .get_or("fraction_suffix", &defaults.fraction_suffix)
                .to_string(),
            drop_empty_classes,
            id_field: control.get_or("hru_id_field", &defaults.id_field).to_string(),
            parent_field: control.get_or("gru_id_field", &defaults.parent_field).to_string(),
        })
    }
}
