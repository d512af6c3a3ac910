//! Process table queries used by the package database lock.

/// Returns the real user id of the current process.
#[cfg(unix)]
pub fn current_uid() -> u32 {
  nix::unistd::getuid().as_raw()
}

#[cfg(not(unix))]
pub fn current_uid() -> u32 {
  0
}

/// Returns true when a process with `pid` exists and runs as `uid`.
///
/// On Linux the real uid is read from `/proc/<pid>/status`. Elsewhere only
/// existence can be verified.
#[cfg(target_os = "linux")]
pub fn process_matches(pid: u32, uid: u32) -> bool {
  let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) else {
    return false;
  };
  status
    .lines()
    .find_map(|line| line.strip_prefix("Uid:"))
    .and_then(|rest| rest.split_whitespace().next())
    .and_then(|real| real.parse::<u32>().ok())
    .is_some_and(|real| real == uid)
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn process_matches(pid: u32, _uid: u32) -> bool {
  use nix::errno::Errno;
  use nix::sys::signal::kill;
  use nix::unistd::Pid;

  let Ok(raw) = i32::try_from(pid) else {
    return false;
  };
  match kill(Pid::from_raw(raw), None) {
    Ok(()) => true,
    Err(Errno::EPERM) => true,
    Err(_) => false,
  }
}

#[cfg(not(unix))]
pub fn process_matches(_pid: u32, _uid: u32) -> bool {
  true
}
