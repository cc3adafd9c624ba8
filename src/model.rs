//! Linear regression model: fit, predict, and JSON persistence.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::dataset::TrainingExample;
use crate::schema::{assert_schema_compatible, feature_schema, FeatureSchema, SchemaError};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("insufficient training data: {0} examples")]
    InsufficientData(usize),
    #[error("feature vector has {found} values, model expects {expected}")]
    FeatureMismatch { expected: usize, found: usize },
    #[error("normal equations are singular; features are linearly dependent")]
    Singular,
    #[error("model was trained against a different feature schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("model file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("model serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Opaque prediction capability. The forecaster neither knows nor cares how
/// the model behind it was trained or persisted.
pub trait Regressor {
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError>;
}

/// Ordinary least squares with intercept over the shared feature schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub schema_version: u32,
    pub schema_fingerprint: String,
    pub intercept: f64,
    pub weights: Vec<f64>,
}

impl LinearModel {
    /// Fits via the normal equations, solved with Gaussian elimination and
    /// partial pivoting. The training set must be non-empty and every example
    /// must match the schema width.
    pub fn fit(train: &[TrainingExample], schema: &FeatureSchema) -> Result<Self, ModelError> {
        if train.is_empty() {
            return Err(ModelError::InsufficientData(0));
        }

        let width = schema.columns.len();
        for example in train {
            if example.features.len() != width {
                return Err(ModelError::FeatureMismatch {
                    expected: width,
                    found: example.features.len(),
                });
            }
        }

        // Augmented design: intercept column first.
        let dim = width + 1;
        let mut xtx = vec![vec![0.0f64; dim]; dim];
        let mut xty = vec![0.0f64; dim];

        for example in train {
            let mut row = Vec::with_capacity(dim);
            row.push(1.0);
            row.extend_from_slice(&example.features);

            for i in 0..dim {
                xty[i] += row[i] * example.label;
                for j in 0..dim {
                    xtx[i][j] += row[i] * row[j];
                }
            }
        }

        let solution = solve_linear_system(&mut xtx, &mut xty)?;

        info!(
            component = "model",
            event = "model.fit.finish",
            train_rows = train.len(),
            feature_count = width
        );

        Ok(Self {
            schema_version: schema.version,
            schema_fingerprint: schema.fingerprint.clone(),
            intercept: solution[0],
            weights: solution[1..].to_vec(),
        })
    }

    /// Serializes to JSON via a tmp file and rename, so a crashed write never
    /// leaves a truncated model behind.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let payload = serde_json::to_vec_pretty(self)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "model.json".to_string());
        let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        info!(
            component = "model",
            event = "model.save.finish",
            path = %path.display(),
            bytes = payload.len()
        );
        Ok(())
    }

    /// Loads a persisted model and verifies it was trained against this
    /// crate's feature schema before it is allowed to serve.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let bytes = fs::read(path)?;
        let model: Self = serde_json::from_slice(&bytes)?;
        assert_schema_compatible(
            model.schema_version,
            &model.schema_fingerprint,
            &feature_schema(),
        )?;
        Ok(model)
    }
}

impl Regressor for LinearModel {
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        if features.len() != self.weights.len() {
            return Err(ModelError::FeatureMismatch {
                expected: self.weights.len(),
                found: features.len(),
            });
        }

        let dot: f64 = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum();
        Ok(self.intercept + dot)
    }
}

pub fn mae(model: &dyn Regressor, examples: &[TrainingExample]) -> Result<f64, ModelError> {
    if examples.is_empty() {
        return Err(ModelError::InsufficientData(0));
    }
    let mut total = 0.0;
    for example in examples {
        total += (model.predict(&example.features)? - example.label).abs();
    }
    Ok(total / examples.len() as f64)
}

pub fn rmse(model: &dyn Regressor, examples: &[TrainingExample]) -> Result<f64, ModelError> {
    if examples.is_empty() {
        return Err(ModelError::InsufficientData(0));
    }
    let mut total = 0.0;
    for example in examples {
        let err = model.predict(&example.features)? - example.label;
        total += err * err;
    }
    Ok((total / examples.len() as f64).sqrt())
}

fn solve_linear_system(a: &mut [Vec<f64>], b: &mut [f64]) -> Result<Vec<f64>, ModelError> {
    let n = b.len();

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| {
                a[i][col]
                    .abs()
                    .partial_cmp(&a[j][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or(ModelError::Singular)?;

        if a[pivot_row][col].abs() < 1e-10 {
            return Err(ModelError::Singular);
        }

        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0f64; n];
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in (row + 1)..n {
            acc -= a[row][k] * x[k];
        }
        x[row] = acc / a[row][row];
    }

    Ok(x)
}
