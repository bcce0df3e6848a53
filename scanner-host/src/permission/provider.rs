//! Camera permission provider
//!
//! Provides a trait-based seam over the OS permission subsystem so hosts can
//! plug in their platform dialog and tests can answer requests by hand.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::controller::{Mailbox, Message};

/// Raw answer from the OS permission dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionAnswer {
    Granted,
    Denied,
    /// The dialog went away without an answer
    Dismissed,
}

/// One-shot reply slot for an outstanding permission request
///
/// The answer is delivered to the session's command queue, so it is
/// serialized against host commands like any other message. Dropping the
/// reply unanswered delivers [`PermissionAnswer::Dismissed`].
pub struct PermissionReply {
    mailbox: Option<Mailbox>,
}

impl PermissionReply {
    pub(crate) fn new(mailbox: Mailbox) -> Self {
        Self {
            mailbox: Some(mailbox),
        }
    }

    /// Deliver the user's answer
    pub fn send(mut self, answer: PermissionAnswer) {
        self.deliver(answer);
    }

    fn deliver(&mut self, answer: PermissionAnswer) {
        let Some(mailbox) = self.mailbox.take() else {
            return;
        };
        let delivered = mailbox
            .upgrade()
            .is_some_and(|mailbox| mailbox.send(Message::Permission(answer)).is_ok());
        if !delivered {
            tracing::debug!(?answer, "Session closed before permission answer arrived");
        }
    }
}

impl Drop for PermissionReply {
    fn drop(&mut self) {
        if self.mailbox.is_some() {
            tracing::debug!("Permission reply dropped unanswered");
            self.deliver(PermissionAnswer::Dismissed);
        }
    }
}

impl fmt::Debug for PermissionReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionReply").finish_non_exhaustive()
    }
}

/// Trait for the OS camera permission subsystem
///
/// # Example
///
/// ```rust
/// use scanner_host::permission::{PermissionProvider, PermissionReply, PermissionAnswer};
///
/// struct KioskPermissions;
///
/// impl PermissionProvider for KioskPermissions {
///     fn has_permission(&self) -> bool {
///         true
///     }
///
///     fn request(&self, reply: PermissionReply) {
///         reply.send(PermissionAnswer::Granted);
///     }
///
///     fn should_show_rationale(&self) -> bool {
///         true
///     }
/// }
/// ```
pub trait PermissionProvider: Send + Sync {
    /// Check whether the camera permission is currently held
    fn has_permission(&self) -> bool;

    /// Show the OS dialog; the answer must be sent through `reply` exactly once
    fn request(&self, reply: PermissionReply);

    /// Whether the OS would still show a rationale (false after "never ask again")
    fn should_show_rationale(&self) -> bool;

    /// Whether access is blocked by policy (parental controls, MDM)
    fn is_restricted(&self) -> bool {
        false
    }
}

// ============================================================================
// Auto Provider
// ============================================================================

/// Provider that answers every request immediately
#[derive(Debug)]
pub struct AutoPermissionProvider {
    granted: bool,
    rationale: bool,
}

impl AutoPermissionProvider {
    /// Permission already held
    pub fn always_grant() -> Self {
        Self {
            granted: true,
            rationale: true,
        }
    }

    /// Every request is denied, re-prompting allowed
    pub fn always_deny() -> Self {
        Self {
            granted: false,
            rationale: true,
        }
    }

    /// Every request is denied and the user opted out of prompts
    pub fn permanently_denied() -> Self {
        Self {
            granted: false,
            rationale: false,
        }
    }
}

impl PermissionProvider for AutoPermissionProvider {
    fn has_permission(&self) -> bool {
        self.granted
    }

    fn request(&self, reply: PermissionReply) {
        let answer = if self.granted {
            PermissionAnswer::Granted
        } else {
            PermissionAnswer::Denied
        };
        reply.send(answer);
    }

    fn should_show_rationale(&self) -> bool {
        self.rationale
    }
}

// ============================================================================
// Manual Provider (for testing)
// ============================================================================

/// Provider that parks requests until the test answers them
#[derive(Debug)]
pub struct ManualPermissionProvider {
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    granted: bool,
    rationale: bool,
    restricted: bool,
    requests: usize,
    pending: Vec<PermissionReply>,
}

impl ManualPermissionProvider {
    /// Permission not yet held
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManualState {
                granted: false,
                rationale: true,
                restricted: false,
                requests: 0,
                pending: Vec::new(),
            }),
        }
    }

    /// Permission already held
    pub fn granted() -> Self {
        let provider = Self::new();
        provider.lock().granted = true;
        provider
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Total OS requests issued so far
    pub fn request_count(&self) -> usize {
        self.lock().requests
    }

    /// Requests waiting for an answer
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Grant permission and answer every parked request
    pub fn grant(&self) -> usize {
        let pending = {
            let mut state = self.lock();
            state.granted = true;
            std::mem::take(&mut state.pending)
        };
        let count = pending.len();
        for reply in pending {
            reply.send(PermissionAnswer::Granted);
        }
        count
    }

    /// Deny parked requests, leaving re-prompting possible
    pub fn deny(&self) -> usize {
        self.answer_denied(true)
    }

    /// Deny parked requests as "never ask again"
    pub fn deny_permanently(&self) -> usize {
        self.answer_denied(false)
    }

    fn answer_denied(&self, rationale: bool) -> usize {
        let pending = {
            let mut state = self.lock();
            state.granted = false;
            state.rationale = rationale;
            std::mem::take(&mut state.pending)
        };
        let count = pending.len();
        for reply in pending {
            reply.send(PermissionAnswer::Denied);
        }
        count
    }

    /// Drop every parked request without answering it
    pub fn dismiss(&self) -> usize {
        let pending = std::mem::take(&mut self.lock().pending);
        let count = pending.len();
        drop(pending);
        count
    }

    /// Withdraw a previously held permission (e.g. from the settings screen)
    pub fn revoke(&self) {
        self.lock().granted = false;
    }

    /// Mark access as blocked by policy
    pub fn set_restricted(&self, restricted: bool) {
        self.lock().restricted = restricted;
    }
}

impl Default for ManualPermissionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionProvider for ManualPermissionProvider {
    fn has_permission(&self) -> bool {
        self.lock().granted
    }

    fn request(&self, reply: PermissionReply) {
        let mut state = self.lock();
        state.requests += 1;
        state.pending.push(reply);
    }

    fn should_show_rationale(&self) -> bool {
        self.lock().rationale
    }

    fn is_restricted(&self) -> bool {
        self.lock().restricted
    }
}
