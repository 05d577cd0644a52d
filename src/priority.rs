//! Worker thread priority classes.
//!
//! On Linux the class maps to a per-thread nice value via `setpriority` on
//! the thread id. Elsewhere priorities are accepted and ignored.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadPriority {
    Idle,
    Lowest,
    #[default]
    BelowNormal,
    Normal,
    AboveNormal,
}

impl ThreadPriority {
    pub fn nice(self) -> i32 {
        match self {
            ThreadPriority::Idle => 19,
            ThreadPriority::Lowest => 10,
            ThreadPriority::BelowNormal => 5,
            ThreadPriority::Normal => 0,
            ThreadPriority::AboveNormal => -5,
        }
    }
}

/// Apply `prio` to the calling thread. Best-effort: raising priority again
/// usually needs privileges, so failures are only logged.
pub fn set_current_thread(prio: ThreadPriority) {
    #[cfg(target_os = "linux")]
    {
        let tid = unsafe { libc::syscall(libc::SYS_gettid) } as libc::id_t;
        let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, tid, prio.nice()) };
        if rc != 0 {
            tracing::debug!(
                "texloader: setpriority({:?}) failed: {}",
                prio,
                std::io::Error::last_os_error()
            );
            return;
        }
    }
    tracing::debug!("texloader: priority {:?}", prio);
}

/// Tracks the class last applied so the syscall only happens on a change.
pub(crate) struct PrioritySwitch {
    applied: Option<ThreadPriority>,
}

impl PrioritySwitch {
    pub(crate) fn new() -> Self {
        PrioritySwitch { applied: None }
    }

    /// Returns true if the priority was changed.
    pub(crate) fn apply(&mut self, prio: ThreadPriority) -> bool {
        if self.applied == Some(prio) {
            return false;
        }
        self.applied = Some(prio);
        set_current_thread(prio);
        true
    }

    pub(crate) fn current(&self) -> Option<ThreadPriority> {
        self.applied
    }
}
