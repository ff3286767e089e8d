use std::{
    env,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{anyhow, Result};
use sysinfo::{get_current_pid, Signal, System};
use tracing::info;

use super::daemon_path::to_daemon_path;

/// Terminates every other process started from one of `executables`. Children of the current
/// process are left alone.
pub fn kill_previous_servers(executables: &[PathBuf]) -> Result<usize> {
    let system = System::new_all();
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't get current pid: {e}"))?;
    let mut killed = 0;
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(p) if p == current_id) {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| executables.iter().any(|name| name.as_path() == *v))
            .is_some()
        {
            info!("Stopping process {pid}");
            // This will forcefully terminate the process on Windows. Anything better will require a
            // lot more work.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
            killed += 1;
        }
    }
    Ok(killed)
}

/// Both the cli running `serve` and the standalone daemon count as a running daemon.
pub fn daemon_executables() -> Result<Vec<PathBuf>> {
    let cli = env::current_exe()?;
    Ok(vec![to_daemon_path(cli.clone()), cli])
}

/// Shuts down previous daemons and starts a new one in a detached `serve` process.
pub fn restart_server(app_dir: &Path) -> Result<()> {
    kill_previous_servers(&daemon_executables()?)?;
    let mut command = std::process::Command::new(env::current_exe()?);
    command.arg("--dir").arg(app_dir).arg("serve");

    #[cfg(feature = "win")]
    {
        use std::os::windows::process::CommandExt;
        use windows::Win32::System::Threading::DETACHED_PROCESS;
        command.creation_flags(DETACHED_PROCESS.0);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());
    command.stderr(Stdio::null());

    #[allow(clippy::zombie_processes)]
    let child = command.spawn()?;
    println!("Started daemon with pid {}", child.id());
    Ok(())
}
