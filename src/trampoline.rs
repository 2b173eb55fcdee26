use std::sync::atomic::{AtomicI32, Ordering};

use nix::libc;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;

use crate::TakerError;

/// The one supervised child of this process, 0 when none. Written only by
/// `ActiveChildLock`, read by the signal handler.
static ACTIVE_CHILD: AtomicI32 = AtomicI32::new(0);

/// Shared INT/TERM/QUIT handler: kill the sandboxed child first, then the
/// whole process group, supervisor included. Only async-signal-safe calls.
extern "C" fn forward_term_signal(_: libc::c_int) {
  let child = ACTIVE_CHILD.load(Ordering::SeqCst);
  if child != 0 {
    unsafe { libc::kill(child, libc::SIGKILL) };
  }
  unsafe { libc::kill(0, libc::SIGKILL) };
}

/// Asserts that at most one supervised child exists per process, and keeps
/// termination signals pointed at it. Prior handlers are restored on drop.
pub struct ActiveChildLock {
  old_actions: [SigAction; 3],
}

const TERM_SIGNALS: [Signal; 3] = [Signal::SIGINT, Signal::SIGTERM, Signal::SIGQUIT];

impl ActiveChildLock {
  pub fn new(child: Pid) -> Result<Self, TakerError> {
    ACTIVE_CHILD
      .compare_exchange(0, child.as_raw(), Ordering::SeqCst, Ordering::SeqCst)
      .map_err(|_| TakerError::runner("active child already set"))?;

    let action = SigAction::new(
      SigHandler::Handler(forward_term_signal),
      SaFlags::empty(),
      SigSet::empty(),
    );
    let mut old_actions = [action; 3];
    for (index, signal) in TERM_SIGNALS.iter().enumerate() {
      old_actions[index] = unsafe { sigaction(*signal, &action) }?;
    }
    Ok(ActiveChildLock { old_actions })
  }
}

impl Drop for ActiveChildLock {
  fn drop(&mut self) {
    ACTIVE_CHILD.store(0, Ordering::SeqCst);
    for (index, signal) in TERM_SIGNALS.iter().enumerate() {
      let _ = unsafe { sigaction(*signal, &self.old_actions[index]) };
    }
  }
}
