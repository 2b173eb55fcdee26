use std::fs;

use nix::libc::pid_t;
use nix::unistd::{sysconf, SysconfVar};

/// CPU seconds consumed so far, from the per-pid stat record. `None` when
/// `/proc` is unavailable or the record cannot be parsed; the caller then
/// keeps the previous sample and falls back to the terminal rusage.
pub fn cpu_time(pid: pid_t) -> Option<f64> {
  let text = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
  let clock_tick = sysconf(SysconfVar::CLK_TCK).ok().flatten()?;
  if clock_tick <= 0 {
    return None;
  }
  let (utime, stime) = parse_stat_cpu(&text)?;
  Some((utime + stime) as f64 / clock_tick as f64)
}

/// Peak virtual memory in megabytes, from the `VmPeak` line of the per-pid
/// status record.
pub fn peak_memory(pid: pid_t) -> Option<f64> {
  let text = fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
  parse_vm_peak(&text)
}

/// The comm field is enclosed in parentheses and may itself contain
/// parentheses, so the fixed fields start after the last `)`.
fn parse_stat_cpu(text: &str) -> Option<(u64, u64)> {
  let rest = &text[text.rfind(')')? + 1..];
  let mut fields = rest.split_whitespace();
  // the token after the comm is field 3 (state); utime and stime are
  // fields 14 and 15 of the full record
  let utime = fields.nth(11)?.parse().ok()?;
  let stime = fields.next()?.parse().ok()?;
  Some((utime, stime))
}

fn parse_vm_peak(text: &str) -> Option<f64> {
  for line in text.lines() {
    if let Some(rest) = line.strip_prefix("VmPeak:") {
      let mut parts = rest.split_whitespace();
      let value: f64 = parts.next()?.parse().ok()?;
      let multiplier = unit_multiplier(parts.next()?)?;
      return Some(value * multiplier);
    }
  }
  None
}

fn unit_multiplier(unit: &str) -> Option<f64> {
  match unit {
    "kB" | "KB" | "kb" => Some(1.0 / 1024.0),
    "MB" | "mb" => Some(1.0),
    "GB" | "gb" => Some(1024.0),
    _ => None,
  }
}
