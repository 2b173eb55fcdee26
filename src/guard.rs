use std::os::unix::prelude::RawFd;
use std::path::{Path, PathBuf};

use log::error;
use nix::unistd::{chdir, close, getcwd};

use crate::TakerError;

/// Owns one raw descriptor and closes it on every exit path.
pub struct FdGuard(RawFd);

impl FdGuard {
  pub fn new(fd: RawFd) -> Self {
    FdGuard(fd)
  }
}

impl Drop for FdGuard {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}

/// Remembers the current working directory, enters `target` when it is
/// non-empty, and restores the original directory on drop.
pub struct WorkDirGuard {
  origin: PathBuf,
}

impl WorkDirGuard {
  pub fn enter(target: &str) -> Result<Self, TakerError> {
    let origin = getcwd()?;
    if !target.is_empty() {
      chdir(Path::new(target))?;
    }
    Ok(WorkDirGuard { origin })
  }
}

impl Drop for WorkDirGuard {
  fn drop(&mut self) {
    if let Err(err) = chdir(&self.origin) {
      error!("Restore working directory fails: {}", err);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn it_should_restore_working_directory() {
    let origin = getcwd().unwrap();
    {
      let _guard = WorkDirGuard::enter("/").unwrap();
      assert_eq!(getcwd().unwrap(), PathBuf::from("/"));
    }
    assert_eq!(getcwd().unwrap(), origin);

    {
      let _guard = WorkDirGuard::enter("").unwrap();
      assert_eq!(getcwd().unwrap(), origin);
    }
    assert_eq!(getcwd().unwrap(), origin);
  }
}
