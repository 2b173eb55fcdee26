use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::guard::WorkDirGuard;
use crate::utils;
use crate::TakerError;

pub const RUNNER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const RUNNER_VERSION_NUMBER: i64 = 300;

/// Isolation preset consumed by the external isolation backend. The runner
/// itself only validates and carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolatePolicy {
  None,
  Normal,
  Compile,
  Strict,
}

impl IsolatePolicy {
  pub fn as_str(&self) -> &'static str {
    match self {
      IsolatePolicy::None => "none",
      IsolatePolicy::Normal => "normal",
      IsolatePolicy::Compile => "compile",
      IsolatePolicy::Strict => "strict",
    }
  }
}

impl FromStr for IsolatePolicy {
  type Err = TakerError;

  fn from_str(text: &str) -> Result<Self, Self::Err> {
    match text {
      "none" => Ok(IsolatePolicy::None),
      "normal" => Ok(IsolatePolicy::Normal),
      "compile" => Ok(IsolatePolicy::Compile),
      "strict" => Ok(IsolatePolicy::Strict),
      _ => Err(TakerError::validate(format!("{} is invalid isolate-policy", text))),
    }
  }
}

impl Display for IsolatePolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Run request for one child process. Empty path fields mean "unset": the
/// corresponding descriptor or directory is left inherited.
#[derive(Debug, Clone)]
pub struct RunnerParams {
  /// CPU time limit in seconds.
  pub time_limit: f64,
  /// Wall-clock limit in seconds.
  pub idle_limit: f64,
  /// Memory limit in megabytes.
  pub memory_limit: f64,
  pub executable: String,
  pub args: Vec<String>,
  pub env: Vec<(String, String)>,
  pub clear_env: bool,
  pub working_dir: String,
  pub stdin_redir: String,
  pub stdout_redir: String,
  pub stderr_redir: String,
  pub isolate_dir: String,
  pub isolate_policy: IsolatePolicy,
}

impl Default for RunnerParams {
  fn default() -> Self {
    RunnerParams {
      time_limit: 1.0,
      idle_limit: 3.5,
      memory_limit: 256.0,
      executable: String::new(),
      args: vec![],
      env: vec![],
      clear_env: false,
      working_dir: String::new(),
      stdin_redir: String::new(),
      stdout_redir: String::new(),
      stderr_redir: String::new(),
      isolate_dir: String::new(),
      isolate_policy: IsolatePolicy::Normal,
    }
  }
}

macro_rules! ensure_valid {
  ($cond:expr) => {
    if !($cond) {
      return Err(TakerError::validate(concat!("assertion failed: ", stringify!($cond))));
    }
  };
}

impl RunnerParams {
  pub fn new<PS: Into<String>, AS: Into<String>>(executable: PS, args: Vec<AS>) -> Self {
    RunnerParams {
      executable: executable.into(),
      args: args.into_iter().map(|arg| arg.into()).collect(),
      ..RunnerParams::default()
    }
  }

  /// Check the record against the filesystem. Relative `executable` and
  /// `stdin_redir` paths are resolved inside `working_dir`, exactly as the
  /// child will resolve them after its chdir. Performs no side effect
  /// beyond the scoped directory change.
  pub fn validate(&self) -> Result<(), TakerError> {
    ensure_valid!(self.working_dir.is_empty() || utils::directory_is_good(&self.working_dir));

    let _workdir = WorkDirGuard::enter(&self.working_dir)
      .map_err(|err| TakerError::validate(format!("cannot enter working directory: {}", err)))?;

    ensure_valid!(self.time_limit > 0.0);
    ensure_valid!(self.idle_limit > 0.0);
    ensure_valid!(self.memory_limit > 0.0);
    ensure_valid!(utils::file_is_good(&self.executable));
    ensure_valid!(utils::file_is_executable(&self.executable));
    ensure_valid!(self.stdin_redir.is_empty() || utils::file_is_good(&self.stdin_redir));
    ensure_valid!(self.stdin_redir.is_empty() || utils::file_is_readable(&self.stdin_redir));
    Ok(())
  }

  /// Load fields from a parameters document, keeping the current value for
  /// every missing scalar. A missing `idle-limit` defaults to 3.5 times the
  /// loaded `time-limit`; a missing `args` clears the list; a missing `env`
  /// keeps the inherited environment untouched.
  pub fn load_json(&mut self, value: &Value) -> Result<(), TakerError> {
    self.time_limit = number_or(value, "time-limit", self.time_limit);
    self.idle_limit = number_or(value, "idle-limit", self.time_limit * 3.5);
    self.memory_limit = number_or(value, "memory-limit", self.memory_limit);
    self.executable = string_or(value, "executable", "");
    self.clear_env = value
      .get("clear-env")
      .and_then(Value::as_bool)
      .unwrap_or(self.clear_env);

    if let Some(node) = value.get("env") {
      let object = node
        .as_object()
        .ok_or_else(|| TakerError::cli("env is not an object"))?;
      self.env.clear();
      for (name, item) in object {
        // values that do not convert to a string are skipped silently
        if let Some(text) = value_to_string(item) {
          self.env.push((name.clone(), text));
        }
      }
    }

    match value.get("args") {
      Some(node) => {
        let items = node
          .as_array()
          .ok_or_else(|| TakerError::cli("args is not an array"))?;
        self.args = items
          .iter()
          .map(|item| value_to_string(item).ok_or_else(|| TakerError::cli("args is not an array of strings")))
          .collect::<Result<Vec<String>, TakerError>>()?;
      }
      None => self.args.clear(),
    }

    self.working_dir = string_or(value, "working-dir", "");
    self.stdin_redir = string_or(value, "stdin-redir", "");
    self.stdout_redir = string_or(value, "stdout-redir", "");
    self.stderr_redir = string_or(value, "stderr-redir", "");
    self.isolate_dir = string_or(value, "isolate-dir", "");
    self.isolate_policy = IsolatePolicy::from_str(&string_or(value, "isolate-policy", "normal"))?;
    Ok(())
  }

  pub fn load_json_str(&mut self, text: &str) -> Result<(), TakerError> {
    let value = serde_json::from_str(text)?;
    self.load_json(&value)
  }
}

fn number_or(value: &Value, key: &str, default: f64) -> f64 {
  value.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn string_or(value: &Value, key: &str, default: &str) -> String {
  value
    .get(key)
    .and_then(Value::as_str)
    .unwrap_or(default)
    .to_string()
}

fn value_to_string(value: &Value) -> Option<String> {
  match value {
    Value::String(text) => Some(text.clone()),
    Value::Number(number) => Some(number.to_string()),
    Value::Bool(flag) => Some(flag.to_string()),
    _ => None,
  }
}

/// Verdict for one run. `Running` is transient, `None` is the sentinel
/// before any execution; the other seven are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
  Ok,
  TimeLimit,
  IdleLimit,
  MemoryLimit,
  RuntimeError,
  SecurityError,
  RunFail,
  Running,
  None,
}

impl RunStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      RunStatus::Ok => "ok",
      RunStatus::TimeLimit => "time-limit",
      RunStatus::IdleLimit => "idle-limit",
      RunStatus::MemoryLimit => "memory-limit",
      RunStatus::RuntimeError => "runtime-error",
      RunStatus::SecurityError => "security-error",
      RunStatus::RunFail => "run-fail",
      RunStatus::Running => "running",
      RunStatus::None => "none",
    }
  }
}

impl Display for RunStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Outcome of one run, serialized as the results document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunResults {
  /// CPU seconds, user plus system.
  pub time: f64,
  pub clock_time: f64,
  /// Peak memory in megabytes.
  pub memory: f64,
  #[serde(rename = "exitcode")]
  pub exit_code: i32,
  pub signal: i32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub signal_name: Option<String>,
  pub status: RunStatus,
  pub comment: String,
}

impl Default for RunResults {
  fn default() -> Self {
    RunResults {
      time: 0.0,
      clock_time: 0.0,
      memory: 0.0,
      exit_code: 0,
      signal: 0,
      signal_name: None,
      status: RunStatus::None,
      comment: String::new(),
    }
  }
}

impl RunResults {
  pub fn save_json_str(&self) -> Result<String, TakerError> {
    Ok(serde_json::to_string_pretty(self)?)
  }
}

/// Static self-description exposed to higher-level judging tools.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunnerInfo {
  pub name: &'static str,
  pub description: &'static str,
  pub author: &'static str,
  pub version: &'static str,
  pub version_number: i64,
  pub license: &'static str,
  pub features: Vec<String>,
}

pub fn runner_info() -> RunnerInfo {
  RunnerInfo {
    name: "Taker UNIX Runner",
    description: "A simple runner for UNIX-like systems (like GNU/Linux, macOS and FreeBSD)",
    author: "Alexander Kernozhitsky",
    version: RUNNER_VERSION,
    version_number: RUNNER_VERSION_NUMBER,
    license: "GPL-3+",
    features: vec![],
  }
}
