//! Train/serve alignment: one-hot encoding, manifest reindexing and scaling.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{AnalyticsError, Result};
use crate::features::{FeatureVector, NUMERIC_FEATURES};

/// Categorical variables expanded into indicator columns.
pub const CATEGORICAL_FEATURES: [&str; 2] = ["gender", "country"];

/// Per-column standardisation fitted at training time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Standardise `value` with the parameters of column `idx`.
    /// A zero scale leaves the centred value unscaled.
    pub fn transform_value(&self, idx: usize, value: f64) -> f64 {
        let scale = if self.scale[idx] == 0.0 {
            1.0
        } else {
            self.scale[idx]
        };
        (value - self.mean[idx]) / scale
    }
}

/// Column contract frozen alongside the trained classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureManifest {
    /// Columns standardised by `scaler`, in scaler order.
    pub numeric_columns: Vec<String>,
    /// Exact ordered input columns of the classifier.
    pub model_columns: Vec<String>,
    /// Frozen category order per categorical variable. When a variable is
    /// missing here, the batch's sorted distinct values are used instead.
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
    pub scaler: StandardScaler,
}

impl FeatureManifest {
    fn validate(&self) -> Result<()> {
        let n = self.numeric_columns.len();
        if self.scaler.mean.len() != n || self.scaler.scale.len() != n {
            return Err(AnalyticsError::SchemaMismatch(format!(
                "scaler has {} means and {} scales for {} numeric columns",
                self.scaler.mean.len(),
                self.scaler.scale.len(),
                n
            )));
        }
        Ok(())
    }
}

/// Feature matrix whose columns are exactly the manifest's `model_columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFeatureMatrix {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl AlignedFeatureMatrix {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn row(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.values.row(idx)
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|idx| self.values.column(idx))
    }
}

/// Indicator columns for one categorical variable, first category dropped.
fn dummy_columns(
    variable: &str,
    features: &[FeatureVector],
    manifest: &FeatureManifest,
) -> Vec<String> {
    let categories: Vec<String> = match manifest.categories.get(variable) {
        Some(frozen) => frozen.clone(),
        None => features
            .iter()
            .filter_map(|f| f.categorical(variable))
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    };

    categories
        .iter()
        .skip(1)
        .map(|category| format!("{variable}_{category}"))
        .collect()
}

/// Batch columns that do not survive reindexing: engineered or indicator
/// columns the manifest lacks, plus batch categories outside a frozen
/// vocabulary, which encode as all zeros.
fn discarded_columns<'a>(
    features: &[FeatureVector],
    manifest: &FeatureManifest,
    batch_columns: impl Iterator<Item = &'a String>,
) -> Vec<String> {
    let manifest_set: BTreeSet<&str> = manifest.model_columns.iter().map(String::as_str).collect();
    let mut discarded: Vec<String> = NUMERIC_FEATURES
        .iter()
        .map(|column| column.to_string())
        .chain(batch_columns.cloned())
        .filter(|column| !manifest_set.contains(column.as_str()))
        .collect();

    for variable in CATEGORICAL_FEATURES {
        let Some(known) = manifest.categories.get(variable) else {
            continue;
        };
        discarded.extend(
            features
                .iter()
                .filter_map(|f| f.categorical(variable))
                .filter(|category| !known.iter().any(|k| k.as_str() == *category))
                .map(|category| format!("{variable}_{category}")),
        );
    }

    discarded.sort();
    discarded.dedup();
    discarded
}

/// Encode, reindex to the manifest and scale the numeric subset.
///
/// Columns the batch produces but the manifest does not list are discarded;
/// manifest columns the batch lacks are zero-filled.
#[instrument(skip_all, fields(rows = features.len(), columns = manifest.model_columns.len()))]
pub fn align_features(
    features: &[FeatureVector],
    manifest: &FeatureManifest,
) -> Result<AlignedFeatureMatrix> {
    manifest.validate()?;

    let mut batch_dummies: HashMap<String, (&str, String)> = HashMap::new();
    for variable in CATEGORICAL_FEATURES {
        for column in dummy_columns(variable, features, manifest) {
            let category = column[variable.len() + 1..].to_string();
            batch_dummies.insert(column, (variable, category));
        }
    }

    let dropped = discarded_columns(features, manifest, batch_dummies.keys());
    if !dropped.is_empty() {
        debug!(?dropped, "discarding batch columns absent from manifest");
    }

    let mut values = Array2::<f64>::zeros((features.len(), manifest.model_columns.len()));
    for (col_idx, column) in manifest.model_columns.iter().enumerate() {
        let mut target = values.column_mut(col_idx);
        if NUMERIC_FEATURES.contains(&column.as_str()) {
            for (cell, feature) in target.iter_mut().zip(features) {
                *cell = feature.numeric(column).unwrap_or(0.0);
            }
        } else if let Some((variable, category)) = batch_dummies.get(column) {
            for (cell, feature) in target.iter_mut().zip(features) {
                *cell = match feature.categorical(variable) {
                    Some(value) if value == category.as_str() => 1.0,
                    _ => 0.0,
                };
            }
        }
    }

    for (scaler_idx, name) in manifest.numeric_columns.iter().enumerate() {
        let col_idx = manifest
            .model_columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| {
                AnalyticsError::SchemaMismatch(format!(
                    "numeric column `{name}` is not present after reindexing"
                ))
            })?;
        values
            .index_axis_mut(Axis(1), col_idx)
            .mapv_inplace(|x| manifest.scaler.transform_value(scaler_idx, x));
    }

    Ok(AlignedFeatureMatrix {
        columns: manifest.model_columns.clone(),
        values,
    })
}
