//! Coalesced descriptor saves.
//!
//! Many threads may ask for the descriptor to be persisted at once. Only one
//! of them writes at a time; requests that arrive while a write is in flight
//! are folded into at most one further write.
//!
//! ```text
//!            request_save()                     write done, no new request
//!   Idle ─────────────────▶ Writing ───────────────────────────────────▶ Idle
//!   0b00                     0b10 ◀──────────┐
//!                              │              │ next write starts
//!              request_save()  ▼              │
//!                          DirtyWhileWriting ─┘
//!                            0b11
//! ```
//!
//! The requesting thread that finds the `WRITING` bit clear becomes the
//! writer and keeps writing until no new request arrived during its last
//! write. Everyone else returns immediately.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use tracing::{debug, warn};

use crate::error::StoreError;

const IDLE: u8 = 0b00;
const DIRTY: u8 = 0b01;
const WRITING: u8 = 0b10;

/// Observable state of a [`SaveCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    Dirty,
    Writing,
    DirtyWhileWriting,
}

/// Per-resource save coalescing over a single atomic.
#[derive(Debug, Default)]
pub struct SaveCoordinator {
    state: AtomicU8,
    writes: AtomicU64,
}

impl SaveCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SaveState {
        match self.state.load(Ordering::Acquire) {
            IDLE => SaveState::Idle,
            DIRTY => SaveState::Dirty,
            WRITING => SaveState::Writing,
            _ => SaveState::DirtyWhileWriting,
        }
    }

    /// Number of writes performed so far.
    pub fn completed_writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Ask for the descriptor to be persisted by `write`.
    ///
    /// If another thread is already writing, this only flags that one more
    /// write is owed and returns `Ok(())`. Otherwise the calling thread runs
    /// `write`, repeating it while new requests arrive, and gets the result of
    /// its last write. The state always returns to idle, even on failure.
    pub fn request_save<F>(&self, mut write: F) -> Result<(), StoreError>
    where
        F: FnMut() -> Result<(), StoreError>,
    {
        let previous = self.state.fetch_or(DIRTY | WRITING, Ordering::AcqRel);
        if previous & WRITING != 0 {
            debug!("Save already in progress, coalescing request");
            return Ok(());
        }

        loop {
            self.state.fetch_and(!DIRTY, Ordering::AcqRel);
            let result = write();
            self.writes.fetch_add(1, Ordering::Relaxed);

            match self
                .state
                .compare_exchange(WRITING, IDLE, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return result,
                Err(_) => {
                    if let Err(e) = &result {
                        warn!(error = %e, "Descriptor write failed, retrying for pending request");
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
