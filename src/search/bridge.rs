use crate::position::{Board};
use crate::position::features::{FeatureSpec, extract_features};
use crate::search::control::{BatchStatus};
use crate::search::evaluator::{Evaluator, EvalOutput, EvaluatorError, ValueConvention};
use crate::worker::{WorkerSharedData};

use log::{debug, warn};

use std::sync::{Arc, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

struct EvalSlot {
  input:    Vec<f32>,
  pending:  bool,
  output:   Option<Result<EvalOutput, EvaluatorError>>,
}

/// What a worker gets back from one exchange round.
pub struct Exchange {
  /// The evaluation of this worker's submitted position, if it submitted one.
  pub output: Option<Result<EvalOutput, EvaluatorError>>,
  /// Set by the round leader; every worker sees the same value.
  pub stop:   bool,
}

/// Gathers one pending leaf per worker into a batch, calls the evaluator
/// once for the whole batch, and hands each worker its own result. Workers
/// take part in every round, with or without a position, so the rounds stay
/// in lockstep.
pub struct EvalBridge {
  evaluator:  Arc<dyn Evaluator>,
  spec:       FeatureSpec,
  convention: ValueConvention,
  slots:      Vec<Mutex<EvalSlot>>,
  shared:     WorkerSharedData,
  stop:       AtomicBool,
  num_calls:  AtomicU64,
  num_inputs: AtomicU64,
}

fn lock_slot(slot: &Mutex<EvalSlot>) -> MutexGuard<EvalSlot> {
  slot.lock().unwrap_or_else(|e| e.into_inner())
}

impl EvalBridge {
  pub fn new(evaluator: Arc<dyn Evaluator>, spec: FeatureSpec, convention: ValueConvention, num_workers: usize) -> EvalBridge {
    let slots = (0 .. num_workers).map(|_| Mutex::new(EvalSlot{
      input:    vec![0.0; spec.len()],
      pending:  false,
      output:   None,
    })).collect();
    EvalBridge{
      evaluator:  evaluator,
      spec:       spec,
      convention: convention,
      slots:      slots,
      shared:     WorkerSharedData::new(num_workers),
      stop:       AtomicBool::new(false),
      num_calls:  AtomicU64::new(0),
      num_inputs: AtomicU64::new(0),
    }
  }

  pub fn spec(&self) -> &FeatureSpec {
    &self.spec
  }

  pub fn num_workers(&self) -> usize {
    self.shared.num_workers
  }

  /// Number of evaluator invocations so far.
  pub fn num_calls(&self) -> u64 {
    self.num_calls.load(Ordering::Relaxed)
  }

  /// Number of positions evaluated so far.
  pub fn num_inputs(&self) -> u64 {
    self.num_inputs.load(Ordering::Relaxed)
  }

  /// Queues the features of `board` for worker `tid`, or nothing at all.
  pub fn submit(&self, tid: usize, board: Option<&Board>) {
    let mut slot = lock_slot(&self.slots[tid]);
    slot.output = None;
    match board {
      Some(board) => {
        extract_features(board, &self.spec, &mut slot.input);
        slot.pending = true;
      }
      None => {
        slot.pending = false;
      }
    }
  }

  /// Runs one round. Every worker must call this once per round after
  /// `submit`. The round leader evaluates the batch and then calls `control`
  /// with the outcome; its answer becomes the round's stop flag.
  pub fn exchange<F>(&self, tid: usize, control: F) -> Exchange where F: FnOnce(BatchStatus) -> bool {
    if self.shared.sync() {
      let status = self.run_batch();
      let stop = control(status);
      self.stop.store(stop, Ordering::Release);
    }
    self.shared.sync();
    let output = lock_slot(&self.slots[tid]).output.take();
    Exchange{
      output: output,
      stop:   self.stop.load(Ordering::Acquire),
    }
  }

  fn run_batch(&self) -> BatchStatus {
    let mut guards: Vec<MutexGuard<EvalSlot>> = self.slots.iter().map(|s| lock_slot(s)).collect();
    let pending: Vec<usize> = (0 .. guards.len()).filter(|&t| guards[t].pending).collect();
    if pending.is_empty() {
      return BatchStatus::Idle;
    }
    let result = {
      let inputs: Vec<&[f32]> = pending.iter().map(|&t| &guards[t].input[..]).collect();
      self.evaluator.evaluate_batch(&self.spec, &inputs)
    };
    self.num_calls.fetch_add(1, Ordering::Relaxed);
    self.num_inputs.fetch_add(pending.len() as u64, Ordering::Relaxed);
    debug!("evaluated batch of {}", pending.len());

    let policy_len = self.spec.size * self.spec.size + 1;
    match result {
      Ok(ref outputs) if outputs.len() != pending.len() => {
        warn!("evaluator returned {} outputs for {} inputs", outputs.len(), pending.len());
        let e = EvaluatorError::MalformedOutput(format!("expected {} outputs, got {}", pending.len(), outputs.len()));
        for &t in pending.iter() {
          guards[t].output = Some(Err(e.clone()));
        }
      }
      Ok(outputs) => {
        for (&t, out) in pending.iter().zip(outputs.into_iter()) {
          let checked = self.check_output(out, policy_len);
          if let Err(ref e) = checked {
            warn!("worker {}: {}", t, e);
          }
          guards[t].output = Some(checked);
        }
      }
      Err(e) => {
        warn!("evaluator call failed: {}", e);
        for &t in pending.iter() {
          guards[t].output = Some(Err(e.clone()));
        }
      }
    }
    let mut failed = false;
    for &t in pending.iter() {
      guards[t].pending = false;
      if let Some(Err(_)) = guards[t].output {
        failed = true;
      }
    }
    if failed {
      BatchStatus::Failed
    } else {
      BatchStatus::Evaluated
    }
  }

  fn check_output(&self, mut out: EvalOutput, policy_len: usize) -> Result<EvalOutput, EvaluatorError> {
    if out.policy.len() != policy_len {
      return Err(EvaluatorError::MalformedOutput(format!("policy has {} entries, expected {}", out.policy.len(), policy_len)));
    }
    if !out.value.is_finite() {
      return Err(EvaluatorError::MalformedOutput(format!("value is {}", out.value)));
    }
    for p in out.policy.iter_mut() {
      if !p.is_finite() || *p < 0.0 {
        *p = 0.0;
      }
    }
    out.value = self.convention.to_mover_value(out.value);
    Ok(out)
  }
}
