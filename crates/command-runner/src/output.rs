//! Exit status and captured output types

/// Process exit status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal that terminated the process (Unix only)
    #[cfg(unix)]
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Returns true if the process was terminated by a signal
    pub fn terminated_by_signal(&self) -> bool {
        #[cfg(unix)]
        {
            self.signal.is_some()
        }
        #[cfg(not(unix))]
        {
            false
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        ExitStatus {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
        }
    }
}

/// Captured result of a completed command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// How the process exited
    pub status: ExitStatus,
    /// Combined stdout and stderr, lossily decoded
    pub output: String,
}

impl CommandOutput {
    /// Returns true if the command exited successfully
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_requires_zero_code() {
        let ok = ExitStatus {
            code: Some(0),
            #[cfg(unix)]
            signal: None,
        };
        let failed = ExitStatus {
            code: Some(1),
            #[cfg(unix)]
            signal: None,
        };
        let killed = ExitStatus {
            code: None,
            #[cfg(unix)]
            signal: Some(9),
        };

        assert!(ok.success());
        assert!(!failed.success());
        assert!(!killed.success());
        #[cfg(unix)]
        assert!(killed.terminated_by_signal());
    }
}
