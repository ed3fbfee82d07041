//! Churn model package and the scoring operations built on it.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::align::{align_features, AlignedFeatureMatrix, FeatureManifest};
use crate::error::{AnalyticsError, Result};
use crate::features::{engineer_features, FeatureVector};
use crate::models::{ChurnCandidate, ChurnTrend, CustomerAggregate};
use crate::series::monthly_totals;

pub const LOW_RISK_CEILING: f64 = 0.3;
pub const HIGH_RISK_FLOOR: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskSegment {
    Low,
    Medium,
    High,
}

impl RiskSegment {
    pub fn label(&self) -> &'static str {
        match self {
            RiskSegment::Low => "Low Risk",
            RiskSegment::Medium => "Medium Risk",
            RiskSegment::High => "High Risk",
        }
    }
}

/// Bucket a churn probability. Each bucket includes its lower bound.
pub fn segment(probability: f64) -> RiskSegment {
    if probability < LOW_RISK_CEILING {
        RiskSegment::Low
    } else if probability < HIGH_RISK_FLOOR {
        RiskSegment::Medium
    } else {
        RiskSegment::High
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    /// `row[feature] <= threshold` continues at `left`, otherwise `right`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Positive-class probability at this leaf.
    Leaf { value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn validate(&self, width: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature >= width {
                    return Err(format!("node {idx} splits on feature {feature} of {width}"));
                }
                // Children after their parent guarantees every walk terminates.
                let len = self.nodes.len();
                if *left <= idx || *right <= idx || *left >= len || *right >= len {
                    return Err(format!("node {idx} has invalid children {left}/{right}"));
                }
            }
        }
        Ok(())
    }

    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classifier {
    RandomForest { trees: Vec<DecisionTree> },
    Logistic { intercept: f64, coefficients: Vec<f64> },
}

impl Classifier {
    fn validate(&self, width: usize) -> std::result::Result<(), String> {
        match self {
            Classifier::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err("random forest has no trees".to_string());
                }
                trees.iter().try_for_each(|tree| tree.validate(width))
            }
            Classifier::Logistic { coefficients, .. } => {
                if coefficients.len() != width {
                    return Err(format!(
                        "logistic model has {} coefficients for {width} columns",
                        coefficients.len()
                    ));
                }
                Ok(())
            }
        }
    }

    /// Positive-class probability for one aligned row.
    pub fn predict_proba(&self, row: ArrayView1<'_, f64>) -> f64 {
        match self {
            Classifier::RandomForest { trees } => {
                trees.iter().map(|tree| tree.predict(row)).sum::<f64>() / trees.len() as f64
            }
            Classifier::Logistic {
                intercept,
                coefficients,
            } => {
                let z = intercept
                    + row
                        .iter()
                        .zip(coefficients)
                        .map(|(x, w)| x * w)
                        .sum::<f64>();
                1.0 / (1.0 + (-z).exp())
            }
        }
    }
}

fn default_reference_date() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 9, 27)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

fn default_threshold() -> f64 {
    0.5
}

/// Trained classifier plus everything needed to feed it exactly as in
/// training. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnModelPackage {
    /// The "now" used for recency and tenure.
    #[serde(default = "default_reference_date")]
    pub reference_date: NaiveDateTime,
    #[serde(flatten)]
    pub manifest: FeatureManifest,
    /// Rows with a probability above this are labelled churn.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    pub classifier: Classifier,
}

impl ChurnModelPackage {
    pub fn from_json(raw: &str, origin: &str) -> Result<Self> {
        let package: Self = serde_json::from_str(raw).map_err(|err| AnalyticsError::Artifact {
            path: origin.to_string(),
            reason: err.to_string(),
        })?;
        package
            .classifier
            .validate(package.manifest.model_columns.len())
            .map_err(|reason| AnalyticsError::Artifact {
                path: origin.to_string(),
                reason,
            })?;
        Ok(package)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let origin = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|err| AnalyticsError::Artifact {
            path: origin.clone(),
            reason: err.to_string(),
        })?;
        let package = Self::from_json(&raw, &origin)?;
        info!(
            path = %origin,
            columns = package.manifest.model_columns.len(),
            "churn model package loaded"
        );
        Ok(package)
    }
}

/// Features, probabilities and labels for one scored batch.
#[derive(Debug, Clone)]
pub struct ScoredBatch {
    pub features: Vec<FeatureVector>,
    pub probabilities: Vec<f64>,
    pub labels: Vec<bool>,
}

/// Read-only scoring over a shared model package.
#[derive(Debug, Clone)]
pub struct ChurnScorer {
    package: Arc<ChurnModelPackage>,
}

impl ChurnScorer {
    pub fn new(package: Arc<ChurnModelPackage>) -> Self {
        Self { package }
    }

    pub fn package(&self) -> &ChurnModelPackage {
        &self.package
    }

    /// Feature engineering followed by alignment to the package manifest.
    pub fn prepare(
        &self,
        rows: &[CustomerAggregate],
    ) -> Result<(Vec<FeatureVector>, AlignedFeatureMatrix)> {
        let features = engineer_features(rows, self.package.reference_date);
        let aligned = align_features(&features, &self.package.manifest)?;
        Ok((features, aligned))
    }

    fn check_columns(&self, matrix: &AlignedFeatureMatrix) -> Result<()> {
        if matrix.columns() != self.package.manifest.model_columns.as_slice() {
            return Err(AnalyticsError::SchemaMismatch(
                "matrix columns differ from the model manifest".to_string(),
            ));
        }
        Ok(())
    }

    pub fn score(&self, matrix: &AlignedFeatureMatrix) -> Result<Vec<f64>> {
        self.check_columns(matrix)?;
        Ok((0..matrix.nrows())
            .map(|idx| {
                self.package
                    .classifier
                    .predict_proba(matrix.row(idx))
                    .clamp(0.0, 1.0)
            })
            .collect())
    }

    /// Churn labels for already computed probabilities.
    pub fn labels_for(&self, probabilities: &[f64]) -> Vec<bool> {
        probabilities
            .iter()
            .map(|p| *p > self.package.threshold)
            .collect()
    }

    pub fn label(&self, matrix: &AlignedFeatureMatrix) -> Result<Vec<bool>> {
        Ok(self.labels_for(&self.score(matrix)?))
    }

    #[instrument(skip_all, fields(rows = rows.len()))]
    pub fn score_batch(&self, rows: &[CustomerAggregate]) -> Result<ScoredBatch> {
        let (features, aligned) = self.prepare(rows)?;
        let probabilities = self.score(&aligned)?;
        let labels = self.labels_for(&probabilities);
        Ok(ScoredBatch {
            features,
            probabilities,
            labels,
        })
    }
}

/// Highest-probability customers first; ties keep input order.
pub fn rank_candidates(batch: &ScoredBatch, count: usize) -> Vec<ChurnCandidate> {
    let mut order: Vec<usize> = (0..batch.probabilities.len()).collect();
    order.sort_by(|a, b| batch.probabilities[*b].total_cmp(&batch.probabilities[*a]));

    order
        .into_iter()
        .take(count)
        .map(|idx| {
            let feature = &batch.features[idx];
            ChurnCandidate {
                customer_id: feature.customer_id.clone(),
                last_purchase_date: feature
                    .last_purchase_date
                    .map(|d| d.format("%Y-%m-%d").to_string()),
                total_cancellations: feature.total_cancellations(),
                subscription_status: feature.subscription_status.clone(),
                churn_probability: batch.probabilities[idx],
            }
        })
        .collect()
}

pub fn segment_counts(probabilities: &[f64]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for p in probabilities {
        *counts.entry(segment(*p).label().to_string()).or_insert(0) += 1;
    }
    counts
}

/// Predicted churners per calendar month of last purchase. Rows without a
/// last purchase date have no month and are left out.
pub fn churn_trend(labels: &[bool], last_purchase_dates: &[Option<NaiveDate>]) -> ChurnTrend {
    let points = labels
        .iter()
        .zip(last_purchase_dates)
        .filter_map(|(label, date)| date.map(|d| (d, if *label { 1.0 } else { 0.0 })));

    let (months, churn_counts) = monthly_totals(points)
        .into_iter()
        .map(|(month, total)| (month.format("%Y-%m").to_string(), total as u64))
        .unzip();
    ChurnTrend {
        months,
        churn_counts,
    }
}

/// Share of churn labels in percent; zero for an empty batch.
pub fn churn_rate(labels: &[bool]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    labels.iter().filter(|l| **l).count() as f64 / labels.len() as f64 * 100.0
}
