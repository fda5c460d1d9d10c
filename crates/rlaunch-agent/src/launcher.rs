//! Owns the launch table and the child process behind each running entry.
//!
//! Every child runs as `sh -c "<command> <args>"` in its own process group.
//! A supervisor task per child waits for it to exit or, on a stop request,
//! walks the group through SIGINT, SIGTERM and SIGKILL until no member of
//! the group is left. An entry counts as running until its supervisor has
//! finished.

use rlaunch_core::LaunchEntry;
use std::collections::HashMap;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no launch entry with id {0}")]
    NotFound(u32),
    #[error("{name} is already running")]
    AlreadyRunning { name: String },
    #[error("{name} is not running")]
    NotRunning { name: String },
    #[error("launcher is shutting down")]
    ShuttingDown,
    #[error("failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    pub fn code(&self) -> &'static str {
        match self {
            LaunchError::NotFound(_) => "not_found",
            LaunchError::AlreadyRunning { .. } => "already_running",
            LaunchError::NotRunning { .. } => "not_running",
            LaunchError::ShuttingDown => "shutting_down",
            LaunchError::Spawn { .. } => "spawn_failed",
        }
    }
}

/// Grace periods for each step of a stop.
#[derive(Debug, Clone, Copy)]
pub struct Escalation {
    pub after_interrupt: Duration,
    pub after_terminate: Duration,
    pub after_kill: Duration,
}

impl Default for Escalation {
    fn default() -> Self {
        Self {
            after_interrupt: Duration::from_secs(2),
            after_terminate: Duration::from_secs(1),
            after_kill: Duration::from_secs(1),
        }
    }
}

struct Supervised {
    pid: u32,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

pub struct Launcher {
    entries: Vec<LaunchEntry>,
    children: HashMap<u32, Supervised>,
    escalation: Escalation,
    closed: bool,
}

/// Args containing a shell separator are dropped entirely.
pub fn sanitize_args(args: &str) -> &str {
    if args.contains('&') || args.contains(';') {
        ""
    } else {
        args.trim()
    }
}

fn command_line(command: &str, args: &str) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{command} {args}")
    }
}

impl Launcher {
    pub fn new(entries: Vec<LaunchEntry>, escalation: Escalation) -> Self {
        Self {
            entries,
            children: HashMap::new(),
            escalation,
            closed: false,
        }
    }

    fn entry(&self, id: u32) -> Result<&LaunchEntry, LaunchError> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .ok_or(LaunchError::NotFound(id))
    }

    /// Drops children whose supervisor has finished.
    fn reap(&mut self) {
        self.children.retain(|id, child| {
            let alive = !child.task.is_finished();
            if !alive {
                debug!(event = "child_reaped", id = *id, pid = child.pid);
            }
            alive
        });
    }

    pub fn is_running(&mut self, id: u32) -> bool {
        self.reap();
        self.children.contains_key(&id)
    }

    /// Current table in file order with fresh running flags.
    pub fn snapshot(&mut self) -> Vec<LaunchEntry> {
        self.reap();
        self.entries
            .iter()
            .map(|entry| LaunchEntry {
                running: self.children.contains_key(&entry.id),
                ..entry.clone()
            })
            .collect()
    }

    pub fn start(&mut self, id: u32, args: &str) -> Result<u32, LaunchError> {
        self.reap();
        let entry = self.entry(id)?.clone();
        if self.closed {
            return Err(LaunchError::ShuttingDown);
        }
        if self.children.contains_key(&id) {
            return Err(LaunchError::AlreadyRunning { name: entry.name });
        }

        let args = sanitize_args(args);
        let line = command_line(&entry.command, args);
        let child = Command::new("sh")
            .arg("-c")
            .arg(&line)
            .current_dir(&entry.working_directory)
            .stdin(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                name: entry.name.clone(),
                source,
            })?;
        let Some(pid) = child.id() else {
            return Err(LaunchError::Spawn {
                name: entry.name,
                source: io::Error::new(io::ErrorKind::Other, "child exited before it was tracked"),
            });
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(supervise(
            entry.name.clone(),
            child,
            pid,
            stop_rx,
            self.escalation,
        ));
        self.children.insert(
            id,
            Supervised {
                pid,
                stop: Some(stop_tx),
                task,
            },
        );
        info!(event = "child_started", id, name = %entry.name, pid, command = %line);
        Ok(pid)
    }

    /// Asks the supervisor to stop the child. Returns once the request is
    /// dispatched; the entry keeps reporting running until the group is gone.
    pub fn stop(&mut self, id: u32) -> Result<(), LaunchError> {
        self.reap();
        let name = self.entry(id)?.name.clone();
        let Some(child) = self.children.get_mut(&id) else {
            return Err(LaunchError::NotRunning { name });
        };
        match child.stop.take() {
            Some(stop) => {
                let _ = stop.send(());
                info!(event = "child_stop_requested", id, name = %name, pid = child.pid);
            }
            None => {
                debug!(event = "child_stop_pending", id, name = %name, pid = child.pid);
            }
        }
        Ok(())
    }

    /// Stops every child and waits for all supervisors to finish. Later
    /// starts fail with `shutting_down`.
    pub async fn shutdown(&mut self) {
        self.closed = true;
        let mut tasks = Vec::with_capacity(self.children.len());
        for (id, mut child) in self.children.drain() {
            if let Some(stop) = child.stop.take() {
                let _ = stop.send(());
            }
            tasks.push((id, child.task));
        }
        for (id, task) in tasks {
            if let Err(err) = task.await {
                warn!(event = "child_supervisor_failed", id, error = %err);
            }
        }
        info!(event = "launcher_shutdown");
    }
}

async fn supervise(
    name: String,
    mut child: Child,
    pid: u32,
    stop: oneshot::Receiver<()>,
    escalation: Escalation,
) {
    tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) => info!(event = "child_exited", name = %name, pid, status = %status),
                Err(err) => warn!(event = "child_wait_error", name = %name, pid, error = %err),
            }
        }
        _ = stop => {
            terminate_group(&name, &mut child, pid, escalation).await;
        }
    }
}

async fn terminate_group(name: &str, child: &mut Child, pid: u32, escalation: Escalation) {
    let steps = [
        (libc::SIGINT, escalation.after_interrupt),
        (libc::SIGTERM, escalation.after_terminate),
    ];
    for (signal, grace) in steps {
        signal_group(pid, signal);
        if wait_group_gone(child, pid, grace).await {
            info!(event = "child_stopped", name = %name, pid, signal);
            return;
        }
        debug!(event = "child_group_survived", name = %name, pid, signal);
    }
    warn!(event = "child_force_kill", name = %name, pid);
    signal_group(pid, libc::SIGKILL);
    if !wait_group_gone(child, pid, escalation.after_kill).await {
        warn!(event = "child_group_lingering", name = %name, pid);
    }
}

/// Polls until the leader is reaped and no member of its process group is
/// left, or `grace` runs out. Returns whether the group is gone.
async fn wait_group_gone(child: &mut Child, pid: u32, grace: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + grace;
    loop {
        let leader_done = match child.try_wait() {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(err) => {
                debug!(event = "child_wait_error", pid, error = %err);
                true
            }
        };
        if leader_done && !group_alive(pid) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(GROUP_POLL_INTERVAL).await;
    }
}

fn group_alive(pid: u32) -> bool {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // Signal 0 only checks delivery; ESRCH means no process is left in the group.
    let rc = unsafe { libc::kill(-pgid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // The child was spawned with process_group(0), so its pid is the group id.
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        debug!(event = "signal_group_failed", pid, signal, error = %err);
    }
}
