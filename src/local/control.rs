//! Platform-agnostic process control functions.

use std::path::Path;
use std::process::ExitStatus;

use tokio::process::Command;

use crate::error::{AppError, Result};

/// Check if a process is alive by PID.
#[cfg(target_os = "windows")]
pub fn is_process_alive(pid: u32) -> bool {
    std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH"])
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

/// Check if a process is alive by PID.
#[cfg(not(target_os = "windows"))]
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(target_os = "windows")]
pub fn force_kill(pid: u32) -> Result<()> {
    let output = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output()
        .map_err(|e| AppError::process(format!("Failed to run taskkill: {e}")))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = stderr.trim();
        let detail = if detail.is_empty() {
            stdout.trim()
        } else {
            detail
        };
        Err(AppError::process(format!(
            "taskkill failed for pid {}: {}",
            pid,
            if detail.is_empty() {
                "(no output)"
            } else {
                detail
            }
        )))
    }
}

/// SIGKILL the process group of `pid`, or just `pid` when it shares our own group.
#[cfg(not(target_os = "windows"))]
pub fn force_kill(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::{getpgid, Pid};

    let target = Pid::from_raw(pid as i32);
    let own_group = getpgid(None).ok();
    match getpgid(Some(target)) {
        Ok(pgid) if Some(pgid) != own_group => killpg(pgid, Signal::SIGKILL).map_err(|e| {
            AppError::process(format!(
                "Failed to kill process group {} (from pid {}): {}",
                pgid.as_raw(),
                pid,
                e
            ))
        }),
        _ => kill(target, Signal::SIGKILL)
            .map_err(|e| AppError::process(format!("Failed to kill process {}: {}", pid, e))),
    }
}

/// Read a PID file written by the instance's start script.
pub fn read_pid_file(path: &Path) -> Result<Option<u32>> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    content
        .trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|e| AppError::process(format!("Invalid PID file {}: {}", path.display(), e)))
}

/// Run a control script to completion and return its exit status.
pub async fn run_script(script: &Path, dir: &Path, env: &[(&str, String)]) -> Result<ExitStatus> {
    if !script.is_file() {
        return Err(AppError::process(format!(
            "Control script not found: {}",
            script.display()
        )));
    }

    #[cfg(target_os = "windows")]
    let mut cmd = {
        use windows::Win32::System::Threading::CREATE_NO_WINDOW;
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(script).creation_flags(CREATE_NO_WINDOW.0);
        cmd
    };

    #[cfg(not(target_os = "windows"))]
    let mut cmd = {
        let mut cmd = Command::new(script);
        cmd.process_group(0);
        cmd
    };

    cmd.current_dir(dir)
        .kill_on_drop(true)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    for (key, value) in env {
        cmd.env(key, value);
    }

    cmd.status().await.map_err(|e| {
        AppError::process(format!("Failed to run {}: {}", script.display(), e))
    })
}

/// Run a command and fail unless it exits with success.
pub async fn run_checked(cmd: &mut Command, what: &str) -> Result<()> {
    let output = cmd
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| AppError::process(format!("Failed to run {what}: {e}")))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(AppError::process(format!(
        "{} failed ({}): {}",
        what,
        output.status,
        stderr.trim()
    )))
}
