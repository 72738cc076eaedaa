use std::fmt;

use tracing::debug;

use crate::AuthError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignerStep {
    #[default]
    Idle,
    Begin,
    ExchangeInFlight,
    ExchangeSucceeded,
    ExchangeFailed,
    Ready,
    Expired,
}

impl fmt::Display for SignerStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Progress of the credential acquisition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerState {
    pub(crate) step: SignerStep,
    /// Consecutive failed attempts since the last success or external trigger.
    pub(crate) attempts: u32,
    pub(crate) last_attempt_at: i64,
    pub(crate) last_error: Option<AuthError>,
}

impl SignerState {
    pub fn step(&self) -> SignerStep {
        self.step
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_attempt_at(&self) -> i64 {
        self.last_attempt_at
    }

    pub fn last_error(&self) -> Option<&AuthError> {
        self.last_error.as_ref()
    }

    pub(crate) fn transition(&mut self, next: SignerStep) {
        if self.step != next {
            debug!(from = %self.step, to = %next, "signer transition");
            self.step = next;
        }
    }

    pub(crate) fn record_success(&mut self) {
        self.attempts = 0;
        self.last_error = None;
    }

    pub(crate) fn record_failure(&mut self, err: AuthError, now: i64) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt_at = now;
        self.last_error = Some(err);
    }
}
