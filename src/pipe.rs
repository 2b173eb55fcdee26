use std::mem;
use std::os::unix::prelude::RawFd;

use nix::{
  fcntl::OFlag,
  libc::c_int,
  unistd::{self, close, pipe2},
};

use crate::error::{errno_message, TakerError};

/// Report pipe between the supervisor and the child. Both descriptors carry
/// `O_CLOEXEC`, so a successful exec closes the child's write end and the
/// parent observes EOF. A child that fails before exec writes exactly one
/// framed message instead: a native-endian `c_int` length, then the bytes.
pub struct ReportPipe(RawFd, RawFd);

pub struct ReportReader(RawFd);

pub struct ReportWriter(RawFd);

impl ReportPipe {
  pub fn new() -> Result<Self, TakerError> {
    let result = pipe2(OFlag::O_CLOEXEC)
      .map_err(|errno| TakerError::runner(errno_message("unable to create pipe", errno)))?;
    Ok(ReportPipe(result.0, result.1))
  }

  /// Parent side: close the write end.
  pub fn into_reader(self) -> Result<ReportReader, TakerError> {
    let fd = self.0;
    close(self.1)?;
    mem::forget(self);
    Ok(ReportReader(fd))
  }

  /// Child side: close the read end.
  pub fn into_writer(self) -> Result<ReportWriter, TakerError> {
    let fd = self.1;
    close(self.0)?;
    mem::forget(self);
    Ok(ReportWriter(fd))
  }
}

impl Drop for ReportPipe {
  fn drop(&mut self) {
    let _ = close(self.0);
    let _ = close(self.1);
  }
}

impl ReportReader {
  /// Blocking handshake read. `None` means EOF: the child reached exec and
  /// is running user code. `Some(message)` is a pre-exec failure report.
  /// Everything else is a protocol error.
  pub fn handshake(&self) -> Result<Option<String>, TakerError> {
    let mut size_buf = [0u8; mem::size_of::<c_int>()];
    let bytes_read = unistd::read(self.0, &mut size_buf)
      .map_err(|errno| TakerError::runner(errno_message("unable to read from pipe", errno)))?;
    if bytes_read == 0 {
      return Ok(None);
    }
    if bytes_read != size_buf.len() {
      return Err(TakerError::runner("unexpected child/parent protocol error"));
    }

    let size = c_int::from_ne_bytes(size_buf);
    if size < 0 {
      return Err(TakerError::runner("unexpected child/parent protocol error"));
    }
    let mut message = vec![0u8; size as usize];
    let mut received = 0;
    while received < message.len() {
      let chunk = unistd::read(self.0, &mut message[received..])
        .map_err(|errno| TakerError::runner(errno_message("unable to read from pipe", errno)))?;
      if chunk == 0 {
        break;
      }
      received += chunk;
    }
    if received != size as usize {
      return Err(TakerError::runner(format!(
        "unexpected child/parent protocol error (message length must be {}, not {})",
        size, received
      )));
    }
    Ok(Some(String::from_utf8_lossy(&message).into_owned()))
  }
}

impl Drop for ReportReader {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}

impl ReportWriter {
  pub fn send<S: AsRef<str>>(&self, message: S) -> Result<(), TakerError> {
    let bytes = message.as_ref().as_bytes();
    let size = bytes.len() as c_int;
    unistd::write(self.0, &size.to_ne_bytes())?;
    unistd::write(self.0, bytes)?;
    Ok(())
  }
}

impl Drop for ReportWriter {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}
