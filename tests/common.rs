use std::sync::{Mutex, MutexGuard, Once};

use flexi_logger::Logger;

static INIT: Once = Once::new();

static RUNNER: Mutex<()> = Mutex::new(());

pub fn setup() {
  INIT.call_once(|| {
    Logger::try_with_str("takerun=debug,info")
      .unwrap()
      .start()
      .unwrap();
  });
}

/// The runner supervises at most one child per process, so the scenarios
/// must not overlap.
pub fn run_lock() -> MutexGuard<'static, ()> {
  RUNNER.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
