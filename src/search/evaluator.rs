//! Contract with the external policy/value evaluator.

use crate::position::features::{FeatureSpec};

use serde::{Deserialize, Serialize};
use thiserror::{Error};

pub const MAX_BATCH: usize = 256;

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum EvaluatorError {
  #[error("evaluation failed: {0}")]
  EvaluationFailed(String),
  #[error("malformed evaluator output: {0}")]
  MalformedOutput(String),
  #[error("evaluator not ready")]
  NotReady,
}

/// Result for one input: a probability per policy index (every point, then
/// pass) and a scalar value in the evaluator's own convention.
#[derive(Clone, PartialEq, Debug)]
pub struct EvalOutput {
  pub policy: Vec<f32>,
  pub value:  f32,
}

/// How to read the evaluator's value as a score in [-1, 1] for the side to
/// move.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueConvention {
  /// Already in [-1, 1] for the side to move.
  Raw,
  /// In [-1, 1] for the side that just moved.
  SignFlipped,
  /// Win probability for the side to move.
  Probability,
  /// Win probability for the side that just moved.
  ProbabilityFlipped,
}

impl Default for ValueConvention {
  fn default() -> ValueConvention {
    ValueConvention::Raw
  }
}

impl ValueConvention {
  pub fn to_mover_value(self, raw: f32) -> f32 {
    let v = match self {
      ValueConvention::Raw                => raw,
      ValueConvention::SignFlipped        => -raw,
      ValueConvention::Probability        => 2.0 * raw - 1.0,
      ValueConvention::ProbabilityFlipped => 1.0 - 2.0 * raw,
    };
    v.max(-1.0).min(1.0)
  }
}

pub trait Evaluator: Send + Sync {
  /// Evaluates every input of a batch; each input is `spec.len()` floats.
  /// Must return exactly one output per input, in order.
  fn evaluate_batch(&self, spec: &FeatureSpec, inputs: &[&[f32]]) -> Result<Vec<EvalOutput>, EvaluatorError>;

  fn max_batch_size(&self) -> usize {
    MAX_BATCH
  }
}

/// Flat prior and an even value, whatever the position.
#[derive(Clone, Copy, Default, Debug)]
pub struct UniformEvaluator;

impl Evaluator for UniformEvaluator {
  fn evaluate_batch(&self, spec: &FeatureSpec, inputs: &[&[f32]]) -> Result<Vec<EvalOutput>, EvaluatorError> {
    let policy_len = spec.size * spec.size + 1;
    let p = 1.0 / policy_len as f32;
    Ok(inputs.iter().map(|_| EvalOutput{
      policy: vec![p; policy_len],
      value:  0.0,
    }).collect())
  }
}

/// Evaluates inputs one at a time with a closure.
pub struct FnEvaluator<F> {
  f:  F,
}

impl<F> FnEvaluator<F> where F: Fn(&FeatureSpec, &[f32]) -> Result<EvalOutput, EvaluatorError> + Send + Sync {
  pub fn new(f: F) -> FnEvaluator<F> {
    FnEvaluator{f: f}
  }
}

impl<F> Evaluator for FnEvaluator<F> where F: Fn(&FeatureSpec, &[f32]) -> Result<EvalOutput, EvaluatorError> + Send + Sync {
  fn evaluate_batch(&self, spec: &FeatureSpec, inputs: &[&[f32]]) -> Result<Vec<EvalOutput>, EvaluatorError> {
    inputs.iter().map(|input| (self.f)(spec, input)).collect()
  }
}
