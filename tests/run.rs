use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::process::Command;

use log::info;
use tempfile::tempdir;

use takerun::{ProcessRunner, RunResults, RunStatus, RunnerParams, TakerError};

mod common;

fn shell(script: &str) -> RunnerParams {
  RunnerParams::new("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

fn execute(params: RunnerParams) -> RunResults {
  let mut runner = ProcessRunner::with_params(params);
  let results = runner.execute().unwrap().clone();
  info!("Results: {:?}", results);
  results
}

fn compile_fixture(dir: &PathBuf, name: &str) -> String {
  let source = format!("{}/tests/fixtures/{}.c", env!("CARGO_MANIFEST_DIR"), name);
  let executable = dir.join(format!("{}.out", name));
  let executable = executable.to_string_lossy().to_string();

  let output = Command::new("gcc")
    .args([source.as_str(), "-o", executable.as_str(), "-O0"])
    .output()
    .expect("gcc should be available");
  assert!(output.status.success(), "compile {} fails", name);

  executable
}

#[test]
fn it_should_run_true() {
  common::setup();
  let _run = common::run_lock();
  let results = execute(RunnerParams::new::<_, String>("/bin/true", vec![]));
  assert_eq!(results.status, RunStatus::Ok);
  assert_eq!(results.exit_code, 0);
  assert_eq!(results.signal, 0);
  assert_eq!(results.signal_name, None);
  assert!(results.time >= 0.0 && results.time < 1.0);
  assert!(results.clock_time >= 0.0 && results.clock_time < 1.0);
}

#[test]
fn it_should_report_runtime_error() {
  common::setup();
  let _run = common::run_lock();
  let results = execute(RunnerParams::new::<_, String>("/bin/false", vec![]));
  assert_eq!(results.status, RunStatus::RuntimeError);
  assert_eq!(results.exit_code, 1);
  assert_eq!(results.signal, 0);
}

#[cfg(target_os = "linux")]
#[test]
fn it_should_stop_cpu_spin() {
  common::setup();
  let _run = common::run_lock();
  let mut params = shell("while : ; do : ; done");
  params.time_limit = 0.5;
  params.idle_limit = 5.0;
  let results = execute(params);
  assert_eq!(results.status, RunStatus::TimeLimit);
  assert!(results.time > 0.5);
}

#[test]
fn it_should_stop_sleeper() {
  common::setup();
  let _run = common::run_lock();
  let mut params = shell("exec sleep 10");
  params.time_limit = 5.0;
  params.idle_limit = 0.3;
  let results = execute(params);
  assert_eq!(results.status, RunStatus::IdleLimit);
  assert!(results.clock_time > 0.3);
  assert!(results.clock_time < 5.0);
}

#[cfg(target_os = "linux")]
#[test]
fn it_should_stop_memory_hog() {
  common::setup();
  let _run = common::run_lock();
  let dir = tempdir().unwrap();
  let dir = dir.path().to_path_buf();
  let executable = compile_fixture(&dir, "alloc");

  let mut params = RunnerParams::new::<_, String>(executable, vec![]);
  params.time_limit = 10.0;
  params.idle_limit = 10.0;
  params.memory_limit = 32.0;
  let results = execute(params);
  assert_eq!(results.status, RunStatus::MemoryLimit);
  assert!(results.memory > 32.0);
}

#[test]
fn it_should_reject_missing_executable() {
  common::setup();
  let _run = common::run_lock();
  let mut runner = ProcessRunner::with_params(RunnerParams::new::<_, String>("/no/such/file", vec![]));
  let err = runner.execute().unwrap_err();
  assert!(matches!(err, TakerError::Validate(_)));
  // no child was forked, the sentinel is untouched
  assert_eq!(runner.results().status, RunStatus::None);
}

#[test]
fn it_should_reject_missing_working_dir() {
  common::setup();
  let _run = common::run_lock();
  let mut params = RunnerParams::new::<_, String>("/bin/true", vec![]);
  params.working_dir = "/nonexistent".to_string();
  let mut runner = ProcessRunner::with_params(params);
  let err = runner.execute().unwrap_err();
  assert!(matches!(err, TakerError::Validate(_)));
  assert_eq!(runner.results().status, RunStatus::None);
}

#[test]
fn it_should_reject_unreadable_stdin() {
  common::setup();
  let _run = common::run_lock();
  let mut params = RunnerParams::new::<_, String>("/bin/cat", vec![]);
  params.stdin_redir = "/no/such/input".to_string();
  let mut runner = ProcessRunner::with_params(params);
  assert!(matches!(runner.execute().unwrap_err(), TakerError::Validate(_)));
}

#[test]
fn it_should_report_pre_exec_failure() {
  common::setup();
  let _run = common::run_lock();
  let dir = tempdir().unwrap();
  let fake = dir.path().join("fake.out");
  fs::write(&fake, "this is not an executable\n").unwrap();
  fs::set_permissions(&fake, fs::Permissions::from_mode(0o755)).unwrap();

  let results = execute(RunnerParams::new::<_, String>(fake.to_string_lossy(), vec![]));
  assert_eq!(results.status, RunStatus::RunFail);
  assert!(results.comment.contains("failed to run"), "comment: {}", results.comment);
  assert_eq!(results.exit_code, 0);
  assert_eq!(results.signal, 0);
}

#[test]
fn it_should_redirect_stdio() {
  common::setup();
  let _run = common::run_lock();
  let dir = tempdir().unwrap();
  let input = dir.path().join("sub.in");
  let output = dir.path().join("sub.out");
  fs::write(&input, "1 2\n").unwrap();

  let mut params = RunnerParams::new::<_, String>("/bin/cat", vec![]);
  params.stdin_redir = input.to_string_lossy().to_string();
  params.stdout_redir = output.to_string_lossy().to_string();
  let results = execute(params);
  assert_eq!(results.status, RunStatus::Ok);
  assert_eq!(fs::read_to_string(&output).unwrap(), "1 2\n");
}

#[test]
fn it_should_reset_environment() {
  common::setup();
  let _run = common::run_lock();
  std::env::set_var("TAKERUN_TEST_B", "inherited");
  let dir = tempdir().unwrap();
  let output = dir.path().join("env.out");

  let mut params = shell("echo A=$TAKERUN_TEST_A B=$TAKERUN_TEST_B");
  params.clear_env = true;
  params.env.push(("TAKERUN_TEST_A".to_string(), "42".to_string()));
  params.stdout_redir = output.to_string_lossy().to_string();
  let results = execute(params);
  assert_eq!(results.status, RunStatus::Ok);
  assert_eq!(fs::read_to_string(&output).unwrap(), "A=42 B=\n");
}

#[test]
fn it_should_report_signals() {
  common::setup();
  let _run = common::run_lock();
  let results = execute(shell("kill -11 $$"));
  assert_eq!(results.status, RunStatus::RuntimeError);
  assert_eq!(results.exit_code, 0);
  assert_eq!(results.signal, 11);
  assert_eq!(results.signal_name.as_deref(), Some("SIGSEGV"));
}

#[test]
fn it_should_resolve_relative_executable() {
  common::setup();
  let _run = common::run_lock();
  let dir = tempdir().unwrap();
  let program = dir.path().join("prog");
  fs::copy("/bin/true", &program).unwrap();

  let mut params = RunnerParams::new::<_, String>("./prog", vec![]);
  params.working_dir = dir.path().to_string_lossy().to_string();
  let results = execute(params);
  assert_eq!(results.status, RunStatus::Ok);
}

#[test]
fn it_should_reset_results_between_runs() {
  common::setup();
  let _run = common::run_lock();
  let mut runner = ProcessRunner::with_params(RunnerParams::new::<_, String>("/bin/false", vec![]));
  let first = runner.execute().unwrap().clone();
  assert_eq!(first.status, RunStatus::RuntimeError);
  assert_eq!(first.exit_code, 1);

  runner.params_mut().executable = "/bin/true".to_string();
  let second = runner.execute().unwrap().clone();
  assert_eq!(second.status, RunStatus::Ok);
  assert_eq!(second.exit_code, 0);
  assert_eq!(second.signal, 0);
}
