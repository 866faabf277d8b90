//! Freeing a port held by another process.
//!
//! This is best-effort and racy: a third process may bind the port between
//! the kill and the next bind attempt, so callers go back through the retry
//! loop instead of assuming the port is free.

use std::io;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

pub type Pid = u32;

#[derive(Debug, Error)]
pub enum ReclaimError {
    #[error("no process is listening on port {0}")]
    NoListener(u16),
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: &'static str,
        source: std::io::Error,
    },
    #[error("`{command}` failed: {stderr}")]
    Command {
        command: &'static str,
        stderr: String,
    },
    #[error("failed to signal process {pid}: {source}")]
    Signal { pid: Pid, source: io::Error },
}

#[async_trait]
pub trait PortReclaimer: Send + Sync {
    /// Process holding `port` in the listening state, if any.
    async fn find_listener(&self, port: u16) -> Result<Option<Pid>, ReclaimError>;

    /// Forcefully terminate `pid`.
    async fn terminate(&self, pid: Pid) -> Result<(), ReclaimError>;

    async fn reclaim(&self, port: u16) -> Result<Pid, ReclaimError> {
        let pid = self
            .find_listener(port)
            .await?
            .ok_or(ReclaimError::NoListener(port))?;
        self.terminate(pid).await?;
        Ok(pid)
    }
}

/// Finds listeners with `lsof` and sends them SIGKILL.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemReclaimer;

#[async_trait]
impl PortReclaimer for SystemReclaimer {
    async fn find_listener(&self, port: u16) -> Result<Option<Pid>, ReclaimError> {
        let output = Command::new("lsof")
            .arg("-t")
            .arg(format!("-iTCP:{}", port))
            .arg("-sTCP:LISTEN")
            .output()
            .await
            .map_err(|source| ReclaimError::Spawn {
                command: "lsof",
                source,
            })?;

        // lsof exits 1 with no output when nothing matches
        if !output.status.success() && !output.stderr.is_empty() {
            return Err(ReclaimError::Command {
                command: "lsof",
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let own_pid = std::process::id();
        let pid = parse_pids(&String::from_utf8_lossy(&output.stdout))
            .into_iter()
            .find(|pid| *pid != own_pid);
        debug!("Listener on port {}: {:?}", port, pid);
        Ok(pid)
    }

    async fn terminate(&self, pid: Pid) -> Result<(), ReclaimError> {
        send_sigkill(pid).map_err(|source| ReclaimError::Signal { pid, source })?;
        info!("Sent SIGKILL to process {}", pid);
        Ok(())
    }
}

/// Pid 0 and negative pids address process groups, so only a positive pid
/// other than our own is signalled.
#[cfg(unix)]
fn send_sigkill(pid: Pid) -> io::Result<()> {
    let target = libc::pid_t::try_from(pid)
        .ok()
        .filter(|target| *target > 0 && pid != std::process::id())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "refusing to signal this pid"))?;

    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    if unsafe { libc::kill(target, libc::SIGKILL) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn send_sigkill(_pid: Pid) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "signals are only available on unix",
    ))
}

/// Parse `lsof -t` output: one pid per line.
pub fn parse_pids(output: &str) -> Vec<Pid> {
    output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    mod parse_pids_tests {
        use super::*;

        #[test]
        fn test_single_pid() {
            assert_eq!(parse_pids("1234\n"), vec![1234]);
        }

        #[test]
        fn test_multiple_pids() {
            assert_eq!(parse_pids("1234\n5678\n"), vec![1234, 5678]);
        }

        #[test]
        fn test_empty_output() {
            assert!(parse_pids("").is_empty());
        }

        #[test]
        fn test_ignores_garbage_lines() {
            assert_eq!(parse_pids("  42 \nlsof: warning\n\n7"), vec![42, 7]);
        }
    }

    struct StubReclaimer {
        listener: Option<Pid>,
        terminated: Mutex<Vec<Pid>>,
        fail_terminate: bool,
    }

    #[async_trait]
    impl PortReclaimer for StubReclaimer {
        async fn find_listener(&self, _port: u16) -> Result<Option<Pid>, ReclaimError> {
            Ok(self.listener)
        }

        async fn terminate(&self, pid: Pid) -> Result<(), ReclaimError> {
            if self.fail_terminate {
                return Err(ReclaimError::Command {
                    command: "kill",
                    stderr: "Operation not permitted".to_string(),
                });
            }
            self.terminated.lock().unwrap().push(pid);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reclaim_terminates_found_listener() {
        let stub = StubReclaimer {
            listener: Some(4242),
            terminated: Mutex::new(Vec::new()),
            fail_terminate: false,
        };

        let pid = stub.reclaim(3000).await.unwrap();

        assert_eq!(pid, 4242);
        assert_eq!(*stub.terminated.lock().unwrap(), vec![4242]);
    }

    #[tokio::test]
    async fn test_reclaim_without_listener_fails() {
        let stub = StubReclaimer {
            listener: None,
            terminated: Mutex::new(Vec::new()),
            fail_terminate: false,
        };

        let err = stub.reclaim(3000).await.unwrap_err();

        assert!(matches!(err, ReclaimError::NoListener(3000)));
        assert!(stub.terminated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reclaim_surfaces_kill_failure() {
        let stub = StubReclaimer {
            listener: Some(1),
            terminated: Mutex::new(Vec::new()),
            fail_terminate: true,
        };

        let err = stub.reclaim(3000).await.unwrap_err();
        assert!(err.to_string().contains("Operation not permitted"));
    }

    #[cfg(unix)]
    mod terminate_tests {
        use super::*;

        #[tokio::test]
        async fn test_missing_process_reports_errno() {
            // Above any pid_max the kernel allows
            let pid = i32::MAX as Pid;
            let err = SystemReclaimer.terminate(pid).await.unwrap_err();

            match err {
                ReclaimError::Signal { pid: failed, source } => {
                    assert_eq!(failed, pid);
                    assert_eq!(source.raw_os_error(), Some(libc::ESRCH));
                }
                other => panic!("expected Signal error, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_refuses_process_group_pids() {
            for pid in [0, u32::MAX] {
                let err = SystemReclaimer.terminate(pid).await.unwrap_err();
                assert!(matches!(
                    err,
                    ReclaimError::Signal { ref source, .. }
                        if source.kind() == io::ErrorKind::InvalidInput
                ));
            }
        }

        #[tokio::test]
        async fn test_refuses_own_pid() {
            let err = SystemReclaimer
                .terminate(std::process::id())
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                ReclaimError::Signal { ref source, .. }
                    if source.kind() == io::ErrorKind::InvalidInput
            ));
        }
    }

    #[tokio::test]
    async fn test_system_reclaimer_on_free_port_fails() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        // Either lsof finds nothing or lsof is not installed; both are errors
        let result = SystemReclaimer.reclaim(port).await;
        assert!(result.is_err());
    }
}
