//! Out-of-process scoring worker.
//!
//! Every prediction and every training run is one short-lived child process:
//! - Crash isolation: a worker crash or hang never takes the server down
//! - Resource reclaim: the process (and its group) is killed when done
//!
//! `invocation` launches and supervises one process, `worker_bridge` turns a
//! predict invocation into a typed verdict, `training` drives train mode and
//! `worker_main` is the built-in reference worker.

pub mod invocation;
pub mod ipc_types;
pub mod training;
pub mod worker_bridge;
pub mod worker_main;

#[cfg(all(test, unix))]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use super::invocation::WorkerProgram;

    /// A worker implemented as an inline shell script. `$1` is the mode and
    /// `$2` the payload.
    pub fn sh_worker(script: &str) -> WorkerProgram {
        WorkerProgram::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "worker".to_string()],
        )
    }

    pub fn pid_file() -> PathBuf {
        std::env::temp_dir().join(format!("fraud-bridge-pid-{}", uuid::Uuid::new_v4()))
    }

    /// Wait for a script to record its pid.
    pub async fn wait_for_pid(path: &Path) -> i32 {
        for _ in 0..250 {
            if let Ok(raw) = std::fs::read_to_string(path) {
                if let Ok(pid) = raw.trim().parse() {
                    return pid;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no pid written to {}", path.display());
    }

    /// Zombies count as gone.
    pub fn is_running(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => {
                let state = stat
                    .rsplit_once(')')
                    .and_then(|(_, rest)| rest.split_whitespace().next());
                !matches!(state, Some("Z") | Some("X"))
            }
            Err(_) if Path::new("/proc/self").exists() => false,
            // No procfs: fall back to a signal-0 probe.
            Err(_) => unsafe { libc::kill(pid, 0) == 0 },
        }
    }
}
