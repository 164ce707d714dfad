//! Persisted parameter storage.
//!
//! One JSON object per file, rewritten wholesale on every save. Loading is
//! all-or-nothing: a missing file, a malformed document, a missing required
//! key or any out-of-range value yields the hard-coded defaults for the whole
//! set, never a merge of file and default values.

use std::{
    fs, io,
    ops::RangeInclusive,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::params::{
    HOUGH_THRESHOLD_RANGE, HoughParams, INTENSITY_RANGE, MAX_LINE_GAP_RANGE, MIN_LINE_LENGTH_RANGE,
    ParameterSet, PipelineVariant, RHO_RANGE, ThresholdBand,
};

/// Default file name, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no persisted parameters at {path}")]
    NotFound { path: PathBuf },
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed parameter file: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("required field `{0}` is missing")]
    MissingField(&'static str),
    #[error("field `{field}` = {value} is outside {range}")]
    OutOfRange {
        field: &'static str,
        value: String,
        range: String,
    },
}

/// On-disk shape. Extended keys are omitted when saving a base-variant set.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedParameters {
    min_val: i64,
    max_val: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hough_threshold: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_line_length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_line_gap: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rho: Option<f64>,
}

impl From<&ParameterSet> for PersistedParameters {
    fn from(params: &ParameterSet) -> Self {
        Self {
            min_val: i64::from(params.band.min),
            max_val: i64::from(params.band.max),
            hough_threshold: params.hough.map(|h| i64::from(h.vote_threshold)),
            min_line_length: params.hough.map(|h| i64::from(h.min_segment_length)),
            max_line_gap: params.hough.map(|h| i64::from(h.max_segment_gap)),
            rho: params.hough.map(|h| h.rho),
        }
    }
}

impl PersistedParameters {
    fn validate(self, variant: PipelineVariant) -> Result<ParameterSet, ConfigError> {
        let min = check_int("min_val", self.min_val, INTENSITY_RANGE)?;
        let max = check_int("max_val", self.max_val, INTENSITY_RANGE)?;
        let band = ThresholdBand::new(min as u8, max as u8);

        let hough = match variant {
            PipelineVariant::Base => None,
            PipelineVariant::Extended => {
                let vote_threshold = check_int(
                    "hough_threshold",
                    required("hough_threshold", self.hough_threshold)?,
                    HOUGH_THRESHOLD_RANGE,
                )?;
                let min_segment_length = check_int(
                    "min_line_length",
                    required("min_line_length", self.min_line_length)?,
                    MIN_LINE_LENGTH_RANGE,
                )?;
                let max_segment_gap = check_int(
                    "max_line_gap",
                    required("max_line_gap", self.max_line_gap)?,
                    MAX_LINE_GAP_RANGE,
                )?;
                let rho = required("rho", self.rho)?;
                if !RHO_RANGE.contains(&rho) {
                    return Err(ConfigError::OutOfRange {
                        field: "rho",
                        value: rho.to_string(),
                        range: format!("[{}, {}]", RHO_RANGE.start(), RHO_RANGE.end()),
                    });
                }
                Some(HoughParams {
                    vote_threshold,
                    min_segment_length,
                    max_segment_gap,
                    rho,
                })
            }
        };

        Ok(ParameterSet { band, hough })
    }
}

fn required<T>(field: &'static str, value: Option<T>) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::MissingField(field))
}

fn check_int(
    field: &'static str,
    value: i64,
    range: RangeInclusive<i32>,
) -> Result<i32, ConfigError> {
    match i32::try_from(value) {
        Ok(v) if range.contains(&v) => Ok(v),
        _ => Err(ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            range: format!("[{}, {}]", range.start(), range.end()),
        }),
    }
}

/// Parse and validate a persisted document for `variant`.
pub fn decode(bytes: &[u8], variant: PipelineVariant) -> Result<ParameterSet, ConfigError> {
    let persisted: PersistedParameters = serde_json::from_slice(bytes)?;
    persisted.validate(variant)
}

/// Serialise a parameter set in its persisted shape.
pub fn encode(params: &ParameterSet) -> Result<Vec<u8>, ConfigError> {
    let mut bytes = serde_json::to_vec_pretty(&PersistedParameters::from(params))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Loads parameters at startup and saves them at shutdown.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    path: PathBuf,
    variant: PipelineVariant,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, variant: PipelineVariant) -> Self {
        Self {
            path: path.into(),
            variant,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn variant(&self) -> PipelineVariant {
        self.variant
    }

    /// Persisted parameters, or the defaults when anything about the file is wrong.
    ///
    /// Never fails; the reason for falling back is logged.
    pub fn load(&self) -> ParameterSet {
        match self.try_load() {
            Ok(params) => {
                info!(
                    "Loaded {} parameters from {}",
                    self.variant,
                    self.path.display()
                );
                params
            }
            Err(ConfigError::NotFound { path }) => {
                info!(
                    "No persisted parameters at {}; starting from defaults",
                    path.display()
                );
                ParameterSet::defaults(self.variant)
            }
            Err(err) => {
                warn!(
                    "Invalid parameter file {} ({err}); reverting to defaults",
                    self.path.display()
                );
                ParameterSet::defaults(self.variant)
            }
        }
    }

    /// Strict load reporting why the persisted state was rejected.
    pub fn try_load(&self) -> Result<ParameterSet, ConfigError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound {
                    path: self.path.clone(),
                });
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        decode(&bytes, self.variant)
    }

    /// Replace the persisted file with `params`.
    ///
    /// The document is written next to the target and renamed over it so a
    /// failed write never leaves a truncated file behind.
    pub fn save(&self, params: &ParameterSet) -> Result<(), ConfigError> {
        let bytes = encode(params)?;
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &bytes).map_err(io_err)?;
        fs::rename(&tmp_path, &self.path).map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    use super::*;

    fn extended_json() -> &'static str {
        r#"{"min_val": 12, "max_val": 240, "hough_threshold": 80,
            "min_line_length": 30, "max_line_gap": 7, "rho": 2.5}"#
    }

    #[test]
    fn decodes_valid_extended_document_unchanged() {
        let params = decode(extended_json().as_bytes(), PipelineVariant::Extended).unwrap();
        assert_eq!(params.band, ThresholdBand::new(12, 240));
        let hough = params.hough.unwrap();
        assert_eq!(hough.vote_threshold, 80);
        assert_eq!(hough.min_segment_length, 30);
        assert_eq!(hough.max_segment_gap, 7);
        assert_relative_eq!(hough.rho, 2.5);
    }

    #[test]
    fn base_variant_ignores_extended_keys() {
        let params = decode(extended_json().as_bytes(), PipelineVariant::Base).unwrap();
        assert_eq!(params, ParameterSet {
            band: ThresholdBand::new(12, 240),
            hough: None,
        });
    }

    #[test]
    fn extended_variant_requires_every_key() {
        let err = decode(br#"{"min_val": 1, "max_val": 2}"#, PipelineVariant::Extended).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("hough_threshold")));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = decode(br#"{"min_val": 999, "max_val": 2}"#, PipelineVariant::Base).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "min_val", .. }));

        let doc = br#"{"min_val": 0, "max_val": 255, "hough_threshold": 50,
            "min_line_length": 10, "max_line_gap": 5, "rho": 0.0}"#;
        let err = decode(doc, PipelineVariant::Extended).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "rho", .. }));
    }

    #[test]
    fn rejects_fractional_and_textual_integers() {
        assert!(matches!(
            decode(br#"{"min_val": 1.5, "max_val": 2}"#, PipelineVariant::Base),
            Err(ConfigError::Malformed(_))
        ));
        assert!(matches!(
            decode(br#"{"min_val": "1", "max_val": 2}"#, PipelineVariant::Base),
            Err(ConfigError::Malformed(_))
        ));
    }

    #[test]
    fn missing_file_is_reported_as_not_found() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("absent.json"), PipelineVariant::Base);
        assert!(matches!(store.try_load(), Err(ConfigError::NotFound { .. })));
        assert_eq!(store.load(), ParameterSet::defaults(PipelineVariant::Base));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("nested/config.json"), PipelineVariant::Extended);
        let params = ParameterSet {
            band: ThresholdBand::new(40, 90),
            hough: Some(HoughParams {
                vote_threshold: 33,
                min_segment_length: 44,
                max_segment_gap: 11,
                rho: 3.21,
            }),
        };

        store.save(&params).unwrap();
        let loaded = store.try_load().unwrap();
        assert_eq!(loaded.band, params.band);
        let (saved, back) = (params.hough.unwrap(), loaded.hough.unwrap());
        assert_eq!(back.vote_threshold, saved.vote_threshold);
        assert_eq!(back.min_segment_length, saved.min_segment_length);
        assert_eq!(back.max_segment_gap, saved.max_segment_gap);
        assert_relative_eq!(back.rho, saved.rho, epsilon = 0.01);
        assert!(!dir.path().join("nested/config.json.tmp").exists());
    }

    #[test]
    fn base_save_omits_extended_keys() {
        let bytes = encode(&ParameterSet::defaults(PipelineVariant::Base)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["min_val"], 0);
        assert_eq!(object["max_val"], 255);
    }

    #[test]
    fn save_reports_unwritable_target() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let store = ConfigStore::new(blocker.join("config.json"), PipelineVariant::Base);
        let err = store.save(&ParameterSet::defaults(PipelineVariant::Base)).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
