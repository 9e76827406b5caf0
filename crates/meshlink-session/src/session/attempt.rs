use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::NetworkConfig;
use crate::types::Room;

/// Which of the three session timers are currently armed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArmedTimers {
    pub timeout: bool,
    pub poll: bool,
    pub monitor: bool,
}

impl ArmedTimers {
    pub fn count(&self) -> usize {
        [self.timeout, self.poll, self.monitor]
            .iter()
            .filter(|armed| **armed)
            .count()
    }
}

/// One connection attempt, from `connect()` until the session returns to idle.
///
/// Every timer gets a child of the attempt's root token; cancelling the root
/// stops all of them at once.
pub(crate) struct ConnectionAttempt {
    pub(crate) id: u64,
    /// Target snapshot taken at connect time.
    pub(crate) room: Room,
    /// Resolved configuration submitted to the engine.
    pub(crate) config: NetworkConfig,
    elapsed_secs: u64,
    root: CancellationToken,
    timeout: Option<CancellationToken>,
    poll: Option<CancellationToken>,
    monitor: Option<CancellationToken>,
}

impl ConnectionAttempt {
    pub(crate) fn new(id: u64, room: Room, config: NetworkConfig) -> Self {
        Self {
            id,
            room,
            config,
            elapsed_secs: 0,
            root: CancellationToken::new(),
            timeout: None,
            poll: None,
            monitor: None,
        }
    }

    pub(crate) fn root_token(&self) -> CancellationToken {
        self.root.clone()
    }

    fn arm(root: &CancellationToken, slot: &mut Option<CancellationToken>) -> CancellationToken {
        let token = root.child_token();
        if let Some(previous) = slot.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    pub(crate) fn arm_timeout(&mut self) -> CancellationToken {
        Self::arm(&self.root, &mut self.timeout)
    }

    pub(crate) fn arm_poll(&mut self) -> CancellationToken {
        Self::arm(&self.root, &mut self.poll)
    }

    pub(crate) fn arm_monitor(&mut self) -> CancellationToken {
        Self::arm(&self.root, &mut self.monitor)
    }

    pub(crate) fn disarm_timeout(&mut self) {
        if let Some(token) = self.timeout.take() {
            token.cancel();
        }
    }

    pub(crate) fn disarm_poll(&mut self) {
        if let Some(token) = self.poll.take() {
            token.cancel();
        }
    }

    /// Cancel every timer belonging to this attempt.
    pub(crate) fn cancel_all(&self) {
        self.root.cancel();
    }

    pub(crate) fn armed(&self) -> ArmedTimers {
        let live = |slot: &Option<CancellationToken>| {
            slot.as_ref().is_some_and(|t| !t.is_cancelled())
        };
        ArmedTimers {
            timeout: live(&self.timeout),
            poll: live(&self.poll),
            monitor: live(&self.monitor),
        }
    }

    pub(crate) fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub(crate) fn tick(&mut self) -> u64 {
        self.elapsed_secs += 1;
        self.elapsed_secs
    }

    pub(crate) fn reset_elapsed(&mut self) {
        self.elapsed_secs = 0;
    }
}
