use std::ffi::CString;
use std::mem;
use std::path::Path;
use std::time::Instant;

use flexi_logger::DeferredNow;
use log::Record;
use nix::errno::Errno;
use nix::libc::{self, rlim_t};
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::Signal;
use nix::sys::wait::WaitPidFlag;
use nix::unistd::{access, AccessFlags, Pid};

use crate::TakerError;

pub fn file_is_good<P: AsRef<Path>>(path: P) -> bool {
  path.as_ref().exists()
}

pub fn directory_is_good<P: AsRef<Path>>(path: P) -> bool {
  path.as_ref().is_dir()
}

pub fn file_is_readable<P: AsRef<Path>>(path: P) -> bool {
  access(path.as_ref(), AccessFlags::R_OK).is_ok()
}

pub fn file_is_executable<P: AsRef<Path>>(path: P) -> bool {
  path.as_ref().is_file() && access(path.as_ref(), AccessFlags::X_OK).is_ok()
}

/// Set both the soft and the hard limit to the same value.
pub fn set_limit(resource: Resource, value: rlim_t) -> nix::Result<()> {
  setrlimit(resource, value, value)
}

pub fn signal_name(signal: i32) -> String {
  Signal::try_from(signal)
    .map(|signal| signal.as_str().to_string())
    .unwrap_or_else(|_| String::from("unknown"))
}

/// Monotonic wall-clock timer for the supervision loop.
pub struct Stopwatch(Instant);

impl Stopwatch {
  pub fn start() -> Self {
    Stopwatch(Instant::now())
  }

  pub fn elapsed(&self) -> f64 {
    self.0.elapsed().as_secs_f64()
  }
}

/// wait4(2) with rusage, which nix does not wrap. Returns `None` when
/// `WNOHANG` is set and the child has not changed state yet.
pub fn wait4(pid: Pid, flags: WaitPidFlag) -> nix::Result<Option<(libc::c_int, libc::rusage)>> {
  let mut status: libc::c_int = 0;
  let mut usage: libc::rusage = unsafe { mem::zeroed() };
  let waited = unsafe { libc::wait4(pid.as_raw(), &mut status, flags.bits(), &mut usage) };
  match Errno::result(waited)? {
    0 => Ok(None),
    _ => Ok(Some((status, usage))),
  }
}

pub fn timeval_seconds(value: &libc::timeval) -> f64 {
  value.tv_sec as f64 + value.tv_usec as f64 / 1e6
}

pub(crate) fn c_string(text: &str) -> Result<CString, TakerError> {
  CString::new(text)
    .map_err(|_| TakerError::runner(format!("string \"{}\" contains a NUL byte", text.escape_default())))
}

/// A logline-formatter that produces log lines like <br>
/// ```[datetime: INFO] Supervising child process #1234```
#[allow(unused)]
pub fn default_format(
  w: &mut dyn std::io::Write,
  now: &mut DeferredNow,
  record: &Record,
) -> Result<(), std::io::Error> {
  write!(
    w,
    "[{}: {:5}] {}",
    now.format("%Y-%m-%d %H:%M:%S"),
    record.level(),
    record.args()
  )
}
