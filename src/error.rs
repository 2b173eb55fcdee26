use std::{
  error::Error,
  fmt::{Debug, Display},
  process::{ExitCode, Termination},
};

use flexi_logger::FlexiLoggerError;
use nix::{errno::Errno, libc::STDOUT_FILENO, unistd::isatty};

pub enum TakerError {
  Validate(String),
  Runner(String),
  Nix(Errno),
  Fs(String),
  Cli(String),
  Json(serde_json::Error),
  Logger(FlexiLoggerError),
}

#[allow(unused)]
pub enum TakerExit {
  Ok,
  Err(TakerError),
}

impl TakerError {
  pub fn validate<MS: Into<String>>(msg: MS) -> TakerError {
    TakerError::Validate(msg.into())
  }

  pub fn runner<MS: Into<String>>(msg: MS) -> TakerError {
    TakerError::Runner(msg.into())
  }

  pub fn cli<MS: Into<String>>(msg: MS) -> TakerError {
    TakerError::Cli(msg.into())
  }
}

/// Compose "context: errno description", the form every syscall failure
/// report uses on both sides of the fork.
pub(crate) fn errno_message<MS: AsRef<str>>(msg: MS, errno: Errno) -> String {
  format!("{}: {}", msg.as_ref(), errno.desc())
}

impl Debug for TakerError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    std::fmt::Display::fmt(&self, f)
  }
}

impl Display for TakerError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self {
      TakerError::Validate(msg) => f.write_fmt(format_args!("Taker Validate Error: {}", msg)),
      TakerError::Runner(msg) => f.write_fmt(format_args!("Taker Runner Error: {}", msg)),
      TakerError::Nix(errno) => f.write_fmt(format_args!("Taker Nix Error: {}", errno)),
      TakerError::Fs(msg) => f.write_fmt(format_args!("Taker File System Error: {}", msg)),
      TakerError::Cli(msg) => f.write_fmt(format_args!("Taker CLI Error: {}", msg)),
      TakerError::Json(err) => f.write_fmt(format_args!("Taker JSON Error: {}", err)),
      TakerError::Logger(err) => f.write_fmt(format_args!("Taker Logger Error: {}", err)),
    }
  }
}

impl From<Errno> for TakerError {
  fn from(errno: Errno) -> Self {
    TakerError::Nix(errno)
  }
}

impl From<std::io::Error> for TakerError {
  fn from(err: std::io::Error) -> Self {
    TakerError::Fs(err.to_string())
  }
}

impl From<serde_json::Error> for TakerError {
  fn from(err: serde_json::Error) -> Self {
    TakerError::Json(err)
  }
}

impl From<FlexiLoggerError> for TakerError {
  fn from(err: FlexiLoggerError) -> Self {
    TakerError::Logger(err)
  }
}

impl Error for TakerError {}

impl Termination for TakerExit {
  fn report(self) -> ExitCode {
    match self {
      TakerExit::Ok => ExitCode::SUCCESS.report(),
      TakerExit::Err(err) => {
        let text = format!("{}", err);
        let text = match text.split_once(": ") {
          Some((prefix, message)) => {
            let is_tty = isatty(STDOUT_FILENO).unwrap_or(false);
            if is_tty {
              format!("\x1b[1m\x1b[91m{}\x1b[39m\x1b[22m  {}", prefix, message)
            } else {
              format!(
                "{{\n  \"ok\": false,\n  \"type\": \"{}\",\n  \"message\": \"{}\"\n}}",
                prefix, message
              )
            }
          }
          None => {
            format!("{}", err)
          }
        };
        eprintln!("{}", text);
        ExitCode::FAILURE.report()
      }
    }
  }
}
