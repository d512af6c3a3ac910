//! Running external commands.
//!
//! Phases never spawn processes themselves; they hand a [`Cmd`] to the
//! [`Executor`] owned by the build context. [`ShellExecutor`] runs commands on
//! the host. [`RecordingExecutor`] only records them, for dry runs and tests.

use std::borrow::Cow;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// A command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
  /// Interpreted by `/bin/sh -c`.
  Shell(String),
  /// Program and arguments, no shell involved.
  Argv(Vec<String>),
}

impl Cmd {
  pub fn argv<I, S>(args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Cmd::Argv(args.into_iter().map(Into::into).collect())
  }

  pub fn shell(script: impl Into<String>) -> Self {
    Cmd::Shell(script.into())
  }
}

/// Quotes `word` for `/bin/sh`. Words made only of characters the shell
/// passes through unchanged are returned as is.
pub fn shell_quote(word: &str) -> Cow<'_, str> {
  let plain = !word.is_empty()
    && word
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '=' | '/' | '.' | ',' | ':' | '@' | '%'));
  if plain {
    Cow::Borrowed(word)
  } else {
    Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
  }
}

/// `path` as one shell word.
pub fn quote_path(path: &Path) -> String {
  shell_quote(&path.to_string_lossy()).into_owned()
}

impl fmt::Display for Cmd {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Cmd::Shell(script) => f.write_str(script),
      Cmd::Argv(args) => {
        let mut first = true;
        for arg in args {
          if !first {
            f.write_str(" ")?;
          }
          first = false;
          if arg.is_empty() || arg.chars().any(char::is_whitespace) {
            write!(f, "'{}'", arg.replace('\'', r"'\''"))?;
          } else {
            f.write_str(arg)?;
          }
        }
        Ok(())
      }
    }
  }
}

#[derive(Debug, Error)]
pub enum CommandError {
  #[error("command failed with exit code {code:?}: {command}")]
  Failed { command: String, code: Option<i32> },

  #[error("command interrupted: {command}")]
  Interrupted { command: String },

  #[error("failed to start {command}: {source}")]
  Spawn {
    command: String,
    #[source]
    source: io::Error,
  },
}

/// Runs commands on behalf of the build.
pub trait Executor: Send {
  /// Runs `cmd` in `cwd` with `env` added to the inherited environment.
  fn execute(&mut self, cmd: &Cmd, cwd: &Path, env: &[(String, String)]) -> Result<(), CommandError>;

  /// Runs a check command, reporting only whether it succeeded.
  fn probe(&mut self, cmd: &Cmd, cwd: &Path) -> bool {
    self.execute(cmd, cwd, &[]).is_ok()
  }

  /// Opens an interactive shell in `cwd` and waits for it to exit.
  fn interactive_shell(&mut self, cwd: &Path) -> Result<(), CommandError>;

  /// Pause control for the running child, if this executor has one.
  fn pause_handle(&self) -> Option<PauseHandle> {
    None
  }
}

/// Suspends and resumes the child process of a [`ShellExecutor`].
#[derive(Debug, Clone, Default)]
pub struct PauseHandle {
  suspended: Arc<AtomicBool>,
  child: Arc<AtomicU32>,
}

impl PauseHandle {
  /// Stops the running child and holds the build between phases.
  pub fn pause(&self) {
    self.suspended.store(true, Ordering::SeqCst);
    signal_child(self.child.load(Ordering::SeqCst), ChildSignal::Stop);
  }

  pub fn resume(&self) {
    self.suspended.store(false, Ordering::SeqCst);
    signal_child(self.child.load(Ordering::SeqCst), ChildSignal::Continue);
  }

  pub fn is_paused(&self) -> bool {
    self.suspended.load(Ordering::SeqCst)
  }

  pub fn toggle(&self) {
    if self.is_paused() { self.resume() } else { self.pause() }
  }

  /// Toggles the pause whenever this process receives SIGUSR1.
  ///
  /// The handler is installed before this returns; a background thread
  /// serves it for the rest of the process.
  #[cfg(unix)]
  pub fn toggle_on_sigusr1(&self) -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let mut signals = runtime.block_on(async { signal(SignalKind::user_defined1()) })?;
    let handle = self.clone();
    std::thread::Builder::new().name("pause-signal".to_string()).spawn(move || {
      runtime.block_on(async {
        while signals.recv().await.is_some() {
          handle.toggle();
          info!(paused = handle.is_paused(), "build pause toggled");
        }
      })
    })?;
    Ok(())
  }

  fn attach(&self, pid: Option<u32>) {
    let pid = pid.unwrap_or(0);
    self.child.store(pid, Ordering::SeqCst);
    if self.is_paused() {
      signal_child(pid, ChildSignal::Stop);
    }
  }

  fn detach(&self) {
    self.child.store(0, Ordering::SeqCst);
  }
}

#[derive(Debug, Clone, Copy)]
enum ChildSignal {
  Stop,
  Continue,
  Terminate,
}

#[cfg(unix)]
fn signal_child(pid: u32, signal: ChildSignal) {
  use nix::sys::signal::{Signal, kill};
  use nix::unistd::Pid;

  if pid == 0 {
    return;
  }
  let signal = match signal {
    ChildSignal::Stop => Signal::SIGSTOP,
    ChildSignal::Continue => Signal::SIGCONT,
    ChildSignal::Terminate => Signal::SIGTERM,
  };
  if let Err(e) = kill(Pid::from_raw(pid as i32), signal) {
    debug!(pid, signal = ?signal, error = %e, "failed to signal child");
  }
}

#[cfg(not(unix))]
fn signal_child(_pid: u32, _signal: ChildSignal) {}

/// Runs commands as child processes of this one.
///
/// Output goes straight to the terminal. An interrupt (Ctrl-C) terminates the
/// running child and surfaces as [`CommandError::Interrupted`].
pub struct ShellExecutor {
  runtime: tokio::runtime::Runtime,
  pause: PauseHandle,
}

impl ShellExecutor {
  pub fn new() -> io::Result<Self> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    Ok(Self {
      runtime,
      pause: PauseHandle::default(),
    })
  }

  fn command(cmd: &Cmd) -> Result<Command, CommandError> {
    match cmd {
      Cmd::Shell(script) => {
        let mut command = Command::new("/bin/sh");
        command.arg("-c").arg(script);
        Ok(command)
      }
      Cmd::Argv(argv) => {
        let (program, args) = argv.split_first().ok_or_else(|| CommandError::Spawn {
          command: String::new(),
          source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
        })?;
        let mut command = Command::new(program);
        command.args(args);
        Ok(command)
      }
    }
  }
}

impl fmt::Debug for ShellExecutor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShellExecutor").field("pause", &self.pause).finish()
  }
}

impl Executor for ShellExecutor {
  fn execute(&mut self, cmd: &Cmd, cwd: &Path, env: &[(String, String)]) -> Result<(), CommandError> {
    let rendered = cmd.to_string();
    let mut command = Self::command(cmd)?;
    command
      .current_dir(cwd)
      .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
      .kill_on_drop(true);

    let pause = &self.pause;
    self.runtime.block_on(async {
      let mut child = command.spawn().map_err(|source| CommandError::Spawn {
        command: rendered.clone(),
        source,
      })?;
      let pid = child.id();
      pause.attach(pid);

      let status = tokio::select! {
        status = child.wait() => Some(status),
        _ = tokio::signal::ctrl_c() => None,
      };

      let status = match status {
        Some(status) => status,
        None => {
          warn!(command = %rendered, "interrupted, terminating child");
          if let Some(pid) = pid {
            signal_child(pid, ChildSignal::Continue);
            signal_child(pid, ChildSignal::Terminate);
          } else {
            let _ = child.start_kill();
          }
          let _ = child.wait().await;
          pause.detach();
          return Err(CommandError::Interrupted { command: rendered.clone() });
        }
      };
      pause.detach();

      let status = status.map_err(|source| CommandError::Spawn {
        command: rendered.clone(),
        source,
      })?;
      if status.success() {
        Ok(())
      } else {
        Err(CommandError::Failed {
          command: rendered.clone(),
          code: status.code(),
        })
      }
    })
  }

  fn interactive_shell(&mut self, cwd: &Path) -> Result<(), CommandError> {
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let status = std::process::Command::new(&shell)
      .current_dir(cwd)
      .status()
      .map_err(|source| CommandError::Spawn { command: shell, source })?;
    debug!(status = ?status.code(), "interactive shell exited");
    Ok(())
  }

  fn pause_handle(&self) -> Option<PauseHandle> {
    Some(self.pause.clone())
  }
}

/// A command seen by a [`RecordingExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
  pub command: String,
  pub cwd: PathBuf,
  pub env: Vec<(String, String)>,
}

impl RecordedCommand {
  pub fn env_var(&self, key: &str) -> Option<&str> {
    self.env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
  }
}

/// Shared view of the commands a [`RecordingExecutor`] has seen.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<RecordedCommand>>>);

impl CommandLog {
  pub fn entries(&self) -> Vec<RecordedCommand> {
    self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  pub fn commands(&self) -> Vec<String> {
    self.entries().into_iter().map(|c| c.command).collect()
  }

  pub fn contains(&self, needle: &str) -> bool {
    self.entries().iter().any(|c| c.command.contains(needle))
  }

  fn push(&self, command: RecordedCommand) {
    self.0.lock().unwrap_or_else(|e| e.into_inner()).push(command);
  }
}

type Hook = Box<dyn FnMut(&RecordedCommand) -> Result<(), CommandError> + Send>;

/// Records commands instead of running them.
///
/// Hooks run for every command containing their needle, so a caller can make
/// a command fail or simulate its effects on disk.
#[derive(Default)]
pub struct RecordingExecutor {
  log: CommandLog,
  hooks: Vec<(String, Hook)>,
}

impl RecordingExecutor {
  pub fn new() -> (Self, CommandLog) {
    let executor = Self::default();
    let log = executor.log.clone();
    (executor, log)
  }

  pub fn on(
    mut self,
    needle: impl Into<String>,
    hook: impl FnMut(&RecordedCommand) -> Result<(), CommandError> + Send + 'static,
  ) -> Self {
    self.hooks.push((needle.into(), Box::new(hook)));
    self
  }

  /// Makes every command containing `needle` exit with status 1.
  pub fn fail_on(self, needle: impl Into<String>) -> Self {
    self.on(needle, |cmd| {
      Err(CommandError::Failed {
        command: cmd.command.clone(),
        code: Some(1),
      })
    })
  }
}

impl fmt::Debug for RecordingExecutor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RecordingExecutor")
      .field("hooks", &self.hooks.iter().map(|(n, _)| n).collect::<Vec<_>>())
      .finish()
  }
}

impl Executor for RecordingExecutor {
  fn execute(&mut self, cmd: &Cmd, cwd: &Path, env: &[(String, String)]) -> Result<(), CommandError> {
    let recorded = RecordedCommand {
      command: cmd.to_string(),
      cwd: cwd.to_path_buf(),
      env: env.to_vec(),
    };
    self.log.push(recorded.clone());
    for (needle, hook) in &mut self.hooks {
      if recorded.command.contains(needle.as_str()) {
        hook(&recorded)?;
      }
    }
    Ok(())
  }

  fn interactive_shell(&mut self, cwd: &Path) -> Result<(), CommandError> {
    self.execute(&Cmd::argv(["$SHELL"]), cwd, &[])
  }
}
