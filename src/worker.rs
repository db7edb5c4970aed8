use std::sync::{Arc, Barrier};
use std::sync::atomic::{AtomicBool, Ordering, fence};

#[derive(Clone)]
pub struct WorkerSharedData {
  pub num_workers:  usize,
  pub barrier:      Arc<Barrier>,
}

impl WorkerSharedData {
  pub fn new(num_workers: usize) -> WorkerSharedData {
    WorkerSharedData{
      num_workers:  num_workers,
      barrier:      Arc::new(Barrier::new(num_workers)),
    }
  }

  /// Waits for every worker. Exactly one caller per round gets `true`.
  pub fn sync(&self) -> bool {
    let res = self.barrier.wait();
    fence(Ordering::AcqRel);
    res.is_leader()
  }
}

/// Global abort flag shared by the search server, its workers and any
/// caller holding a clone.
#[derive(Clone, Default, Debug)]
pub struct CancelToken {
  flag: Arc<AtomicBool>,
}

impl CancelToken {
  pub fn new() -> CancelToken {
    CancelToken::default()
  }

  pub fn cancel(&self) {
    self.flag.store(true, Ordering::Release);
  }

  pub fn reset(&self) {
    self.flag.store(false, Ordering::Release);
  }

  pub fn is_cancelled(&self) -> bool {
    self.flag.load(Ordering::Acquire)
  }
}
