use std::thread;
use std::time::Duration;

use log::{debug, info};
use nix::libc::{self, pid_t};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::{fork, ForkResult, Pid};

use crate::child;
use crate::context::{RunResults, RunStatus, RunnerParams};
use crate::error::{errno_message, TakerError};
use crate::pipe::{ReportPipe, ReportReader};
use crate::proc;
use crate::trampoline::ActiveChildLock;
use crate::utils::{self, Stopwatch};

/// How long the supervisor sleeps between samples. Bounds both the
/// over-consumption past an announced limit and the drift of `clock_time`.
const POLL_PERIOD: Duration = Duration::from_millis(1);

/// Bytes per `ru_maxrss` unit: the kernel reports kilobytes on Linux and
/// bytes on macOS.
#[cfg(target_os = "macos")]
const MAX_RSS_BYTES: f64 = 1.0;
#[cfg(not(target_os = "macos"))]
const MAX_RSS_BYTES: f64 = 1024.0;

/// Supervises one child process per `execute` call: validates the
/// parameters, forks, lets the child set itself up and exec, and polls it
/// against the limits until a terminal verdict is reached.
pub struct ProcessRunner {
  params: RunnerParams,
  results: RunResults,
  pid: pid_t,
}

impl ProcessRunner {
  pub fn new() -> Self {
    Self::with_params(RunnerParams::default())
  }

  pub fn with_params(params: RunnerParams) -> Self {
    ProcessRunner {
      params,
      results: RunResults::default(),
      pid: 0,
    }
  }

  pub fn params(&self) -> &RunnerParams {
    &self.params
  }

  pub fn params_mut(&mut self) -> &mut RunnerParams {
    &mut self.params
  }

  pub fn results(&self) -> &RunResults {
    &self.results
  }

  /// Run the configured executable to completion. Validation errors
  /// propagate and leave no results; every failure past validation is
  /// converted into a `run-fail` verdict instead of an error.
  pub fn execute(&mut self) -> Result<&RunResults, TakerError> {
    if self.results.status == RunStatus::Running {
      return Err(TakerError::runner("process is already running"));
    }
    self.params.validate()?;

    self.results = RunResults::default();
    self.results.status = RunStatus::Running;
    if let Err(err) = self.do_execute() {
      self.results.status = RunStatus::RunFail;
      self.results.comment = err.to_string();
    }
    self.pid = 0;
    Ok(&self.results)
  }

  fn do_execute(&mut self) -> Result<(), TakerError> {
    let pipe = ReportPipe::new()?;

    match unsafe { fork() } {
      Err(errno) => Err(TakerError::runner(errno_message("unable to fork()", errno))),
      Ok(ForkResult::Child) => match pipe.into_writer() {
        Ok(writer) => child::enter(&self.params, writer),
        Err(_) => unsafe { libc::_exit(42) },
      },
      Ok(ForkResult::Parent { child }) => {
        debug!("Forked child process #{}", child);
        self.pid = child.as_raw();
        let _lock = ActiveChildLock::new(child)?;
        let reader = pipe.into_reader()?;
        self.supervise(child, &reader)
      }
    }
  }

  fn supervise(&mut self, child: Pid, pipe: &ReportReader) -> Result<(), TakerError> {
    let timer = Stopwatch::start();

    match pipe.handshake()? {
      Some(message) => {
        // the child failed before exec; reap it and report
        info!("Child process #{} failed before exec: {}", child, message);
        self.results.status = RunStatus::RunFail;
        self.results.comment = message;
        let _ = waitpid(child, None);
        return Ok(());
      }
      None => {
        debug!("Child process #{} reached exec", child);
      }
    }

    while self.results.status == RunStatus::Running {
      self.sample(&timer);
      self.update_verdicts();
      if self.results.status != RunStatus::Running {
        info!(
          "Child process #{} exceeded a limit: {}",
          child,
          self.results.status.as_str()
        );
        let _ = kill(child, Signal::SIGKILL);
        waitpid(child, None)
          .map_err(|errno| TakerError::runner(errno_message("unable to wait for process", errno)))?;
        break;
      }

      match utils::wait4(child, WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED) {
        Err(errno) => {
          let _ = kill(child, Signal::SIGKILL);
          return Err(TakerError::runner(errno_message("unable to wait for process", errno)));
        }
        Ok(None) => thread::sleep(POLL_PERIOD),
        Ok(Some((status, usage))) => {
          self.update_results_on_terminate(status, &usage, &timer);
          if self.results.status == RunStatus::Running {
            // stopped or continued; the runner never traces children
            let _ = kill(child, Signal::SIGKILL);
            let _ = waitpid(child, None);
            return Err(TakerError::runner(format!(
              "unexpected process status: wait4() returned, but the process is still alive (status = {})",
              status
            )));
          }
          // a process that finished over budget still gets the limit verdict
          self.update_verdicts();
          break;
        }
      }
    }

    info!(
      "Child process #{} finished: status = {}, time = {:.3}, clock-time = {:.3}, memory = {:.1}",
      child,
      self.results.status.as_str(),
      self.results.time,
      self.results.clock_time,
      self.results.memory
    );
    Ok(())
  }

  /// Refresh time and memory readings while the child runs. Without a
  /// `/proc` interface the samples simply fail and the terminal rusage is
  /// the only source.
  fn sample(&mut self, timer: &Stopwatch) {
    if let Some(time) = proc::cpu_time(self.pid) {
      self.results.time = time;
    }
    if let Some(memory) = proc::peak_memory(self.pid) {
      self.results.memory = self.results.memory.max(memory);
    }
    self.results.clock_time = timer.elapsed();
  }

  /// Later checks overwrite earlier ones: when several limits trip in the
  /// same tick, memory wins over idle wins over CPU.
  fn update_verdicts(&mut self) {
    if self.results.time > self.params.time_limit {
      self.results.status = RunStatus::TimeLimit;
    }
    if self.results.clock_time > self.params.idle_limit {
      self.results.status = RunStatus::IdleLimit;
    }
    if self.results.memory > self.params.memory_limit {
      self.results.status = RunStatus::MemoryLimit;
    }
  }

  fn update_results_on_terminate(&mut self, status: libc::c_int, usage: &libc::rusage, timer: &Stopwatch) {
    if libc::WIFEXITED(status) {
      self.results.exit_code = libc::WEXITSTATUS(status);
      self.results.status = if self.results.exit_code == 0 {
        RunStatus::Ok
      } else {
        RunStatus::RuntimeError
      };
    }
    if libc::WIFSIGNALED(status) {
      let signal = libc::WTERMSIG(status);
      self.results.signal = signal;
      self.results.signal_name = Some(utils::signal_name(signal));
      self.results.status = RunStatus::RuntimeError;
    }

    self.results.time = utils::timeval_seconds(&usage.ru_stime) + utils::timeval_seconds(&usage.ru_utime);
    self.results.clock_time = timer.elapsed();
    if self.results.memory == 0.0 {
      // no sample ever landed; maxrss is the best remaining estimate
      self.results.comment = String::from("memory measurement is not precise!");
      self.results.memory = usage.ru_maxrss as f64 / 1048576.0 * MAX_RSS_BYTES;
    }
  }
}

impl Default for ProcessRunner {
  fn default() -> Self {
    Self::new()
  }
}
