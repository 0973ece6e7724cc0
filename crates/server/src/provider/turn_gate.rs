// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

/// Mutual exclusion on a shared provider process.
///
/// The underlying process accepts one turn at a time across every session in
/// the process; waiters are served strictly first-come-first-served (tokio's
/// semaphore queues fairly). Closing the gate drains all waiters with an
/// error, which shutdown and reset rely on.
pub struct TurnGate {
    semaphore: Arc<Semaphore>,
}

/// Held for the duration of one turn.
pub struct TurnPermit<'a> {
    _permit: SemaphorePermit<'a>,
}

impl Default for TurnGate {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnGate {
    pub fn new() -> Self {
        Self { semaphore: Arc::new(Semaphore::new(1)) }
    }

    /// Wait for the process's turn slot. `Err` means the gate was closed
    /// while waiting (shutdown in progress).
    pub async fn acquire(&self) -> Result<TurnPermit<'_>, GateClosed> {
        match self.semaphore.acquire().await {
            Ok(permit) => Ok(TurnPermit { _permit: permit }),
            Err(_) => Err(GateClosed),
        }
    }

    /// Non-blocking acquire, `None` when the slot is taken or closed.
    pub fn try_acquire(&self) -> Option<TurnPermit<'_>> {
        self.semaphore.try_acquire().ok().map(|permit| TurnPermit { _permit: permit })
    }

    /// Close the gate: all current and future waiters fail.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

/// The gate was shut down while a turn waited on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateClosed;

impl std::fmt::Display for GateClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("provider turn gate closed")
    }
}

impl std::error::Error for GateClosed {}

#[cfg(test)]
#[path = "turn_gate_tests.rs"]
mod tests;
