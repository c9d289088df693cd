//! Per-call consistency and deadline options forwarded to the store.
//!
//! The core never interprets these; it merges per-call values over the
//! configured defaults and passes the result through.

use std::time::Duration;

/// Options for reading a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Replicas that must respond.
    pub r: Option<u32>,
    /// Primary replicas that must respond.
    pub pr: Option<u32>,
    /// Per-call deadline.
    pub timeout: Option<Duration>,
}

impl GetOptions {
    /// Fills unset fields from `defaults`.
    #[must_use]
    pub fn or(self, defaults: &Self) -> Self {
        Self {
            r: self.r.or(defaults.r),
            pr: self.pr.or(defaults.pr),
            timeout: self.timeout.or(defaults.timeout),
        }
    }
}

/// Options for writing a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Replicas that must acknowledge the write.
    pub w: Option<u32>,
    /// Replicas that must acknowledge a durable write.
    pub dw: Option<u32>,
    /// Per-call deadline.
    pub timeout: Option<Duration>,
}

impl PutOptions {
    #[must_use]
    pub fn with_w(mut self, w: u32) -> Self {
        self.w = Some(w);
        self
    }

    #[must_use]
    pub fn with_dw(mut self, dw: u32) -> Self {
        self.dw = Some(dw);
        self
    }

    /// Fills unset fields from `defaults`.
    #[must_use]
    pub fn or(self, defaults: &Self) -> Self {
        Self {
            w: self.w.or(defaults.w),
            dw: self.dw.or(defaults.dw),
            timeout: self.timeout.or(defaults.timeout),
        }
    }
}

/// Options for deleting a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Replicas that must acknowledge the delete.
    pub rw: Option<u32>,
    /// Per-call deadline.
    pub timeout: Option<Duration>,
}

impl DeleteOptions {
    /// Fills unset fields from `defaults`.
    #[must_use]
    pub fn or(self, defaults: &Self) -> Self {
        Self {
            rw: self.rw.or(defaults.rw),
            timeout: self.timeout.or(defaults.timeout),
        }
    }
}
