// This runs daemon on windows without creating a console. Disable during development to see
// stdout.
#![windows_subsystem = "windows"]

use anyhow::Result;
use clap::Parser;
use dayflow::{
    daemon::{args::DaemonArgs, start_daemon},
    utils::{
        dir::application_path,
        logging::{enable_logging, DAEMON_PREFIX},
        runtime::single_thread_runtime,
    },
};

fn main() -> Result<()> {
    let mut args = DaemonArgs::parse();
    // Detaching moves the process into `/`.
    args.dir = args.dir.map(std::path::absolute).transpose()?;

    if !args.force && detach(&args)? {
        println!("Created daemon");
        return Ok(());
    }

    let app_dir = application_path(args.dir)?;
    enable_logging(DAEMON_PREFIX, &app_dir, args.log, args.log_console)?;
    single_thread_runtime()?.block_on(start_daemon(app_dir))
}

/// Returns true in the process that should exit after the daemon was started.
#[cfg(feature = "win")]
fn detach(args: &DaemonArgs) -> Result<bool> {
    use std::os::windows::process::CommandExt;
    use windows::Win32::System::Threading::DETACHED_PROCESS;

    let mut command = std::process::Command::new(std::env::current_exe()?);
    command.arg("--force");
    if let Some(dir) = &args.dir {
        command.arg("--dir").arg(dir);
    }
    if let Some(level) = args.log {
        command.arg("--log-filter").arg(level.to_string());
    }
    command.creation_flags(DETACHED_PROCESS.0);
    command.stdin(std::process::Stdio::null());
    command.stdout(std::process::Stdio::null());
    command.stderr(std::process::Stdio::null());
    #[allow(clippy::zombie_processes)]
    command.spawn()?;
    Ok(true)
}

#[cfg(all(unix, not(feature = "win")))]
fn detach(_args: &DaemonArgs) -> Result<bool> {
    use daemonize::{Daemonize, Outcome, Stdio};

    match Daemonize::new()
        .stdout(Stdio::devnull())
        .stderr(Stdio::devnull())
        .execute()
    {
        Outcome::Parent(parent) => {
            parent.map_err(|e| anyhow::anyhow!("Failed to create daemon {e}"))?;
            Ok(true)
        }
        Outcome::Child(child) => {
            child.map_err(|e| anyhow::anyhow!("Failed to detach daemon {e}"))?;
            Ok(false)
        }
    }
}

#[cfg(not(any(unix, feature = "win")))]
fn detach(_args: &DaemonArgs) -> Result<bool> {
    Ok(false)
}
