use std::convert::Infallible;
use std::path::Path;

use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::libc::{self, rlim_t, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use nix::sys::resource::Resource;
use nix::sys::stat::Mode;
use nix::unistd::{chdir, dup2, execv, setsid};

use crate::error::{errno_message, TakerError};
use crate::guard::FdGuard;
use crate::pipe::ReportWriter;
use crate::utils::{c_string, set_limit};
use crate::RunnerParams;

const BYTES_PER_MB: f64 = 1048576.0;

/// Post-fork entry point. Runs the setup-then-exec sequence; on success
/// `execv` never returns and CLOEXEC closes the report pipe. Any failure is
/// reported through the pipe instead, followed by `_exit(42)` — the exit
/// code is a marker only, the pipe message is authoritative.
pub(crate) fn enter(params: &RunnerParams, pipe: ReportWriter) -> ! {
  let err = match setup(params) {
    Ok(never) => match never {},
    Err(err) => err,
  };
  let _ = pipe.send(err.to_string());
  drop(pipe);
  unsafe { libc::_exit(42) }
}

fn setup(params: &RunnerParams) -> Result<Infallible, TakerError> {
  // session leader, so that killing the group reaches the whole subtree
  let _ = setsid();

  set_limit(Resource::RLIMIT_CORE, 0).map_err(|errno| fail("could not disable core dumps", errno))?;

  // small cushion over the limit: the kernel's SIGXCPU is only the fallback
  // when the supervisor fails to notice first
  let time_limit = clamp_rlim((params.time_limit + 0.2).ceil());
  set_limit(Resource::RLIMIT_CPU, time_limit).map_err(|errno| fail("could not set time limit", errno))?;

  let memory_bytes = clamp_rlim((params.memory_limit * BYTES_PER_MB).ceil()).saturating_mul(2);
  for resource in [Resource::RLIMIT_AS, Resource::RLIMIT_DATA, Resource::RLIMIT_STACK] {
    set_limit(resource, memory_bytes).map_err(|errno| fail("could not set memory limit", errno))?;
  }

  if !params.working_dir.is_empty() {
    chdir(Path::new(&params.working_dir)).map_err(|errno| fail("could not change directory", errno))?;
  }

  redirect(STDIN_FILENO, &params.stdin_redir, OFlag::O_RDONLY).map_err(|errno| {
    fail(format!("unable to redirect stdin into \"{}\"", params.stdin_redir), errno)
  })?;
  let output_flags = OFlag::O_CREAT | OFlag::O_TRUNC | OFlag::O_WRONLY;
  redirect(STDOUT_FILENO, &params.stdout_redir, output_flags).map_err(|errno| {
    fail(format!("unable to redirect stdout into \"{}\"", params.stdout_redir), errno)
  })?;
  redirect(STDERR_FILENO, &params.stderr_redir, output_flags).map_err(|errno| {
    fail(format!("unable to redirect stderr into \"{}\"", params.stderr_redir), errno)
  })?;

  if params.clear_env {
    clear_environment()?;
  }
  for (key, value) in &params.env {
    set_env(key, value)?;
  }

  let program = c_string(&params.executable)?;
  let mut argv = vec![program.clone()];
  for arg in &params.args {
    argv.push(c_string(arg)?);
  }

  let never = execv(&program, &argv)
    .map_err(|errno| fail(format!("failed to run \"{}\"", params.executable), errno))?;
  Ok(never)
}

/// Point `target` at `path`, leaving it inherited when the path is empty.
fn redirect(target: i32, path: &str, flags: OFlag) -> nix::Result<()> {
  if path.is_empty() {
    return Ok(());
  }
  let fd = open(Path::new(path), flags, Mode::from_bits_truncate(0o644))?;
  let _owner = FdGuard::new(fd);
  if fd != target {
    dup2(fd, target)?;
  }
  Ok(())
}

#[cfg(target_os = "linux")]
fn clear_environment() -> Result<(), TakerError> {
  if unsafe { libc::clearenv() } != 0 {
    return Err(TakerError::runner("could not clear environment"));
  }
  Ok(())
}

#[cfg(not(target_os = "linux"))]
fn clear_environment() -> Result<(), TakerError> {
  // clearenv is a GNU extension; elsewhere drop the variables one by one
  for (key, _) in std::env::vars_os() {
    std::env::remove_var(key);
  }
  Ok(())
}

fn set_env(key: &str, value: &str) -> Result<(), TakerError> {
  let c_key = c_string(key)?;
  let c_value = c_string(value)?;
  if unsafe { libc::setenv(c_key.as_ptr(), c_value.as_ptr(), 1) } != 0 {
    return Err(fail(format!("could not set environment \"{}\"", key), Errno::last()));
  }
  Ok(())
}

fn fail<MS: AsRef<str>>(msg: MS, errno: Errno) -> TakerError {
  TakerError::runner(errno_message(msg, errno))
}

/// Huge limits clamp to the maximum instead of wrapping in the cast.
fn clamp_rlim(value: f64) -> rlim_t {
  if value >= rlim_t::MAX as f64 {
    rlim_t::MAX
  } else {
    value as rlim_t
  }
}
