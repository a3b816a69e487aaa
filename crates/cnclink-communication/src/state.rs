//! Machine state store
//!
//! Holds the snapshot consumers read. Only the session's read loop writes it,
//! and every write swaps in a whole new snapshot, so a reader never sees half
//! of one status report applied.

use cnclink_core::{MachineState, Position, StatusDelta};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Current machine snapshot plus the work offset seen this session
#[derive(Default)]
pub struct MachineStateStore {
    current: RwLock<Arc<MachineState>>,
    work_offset: Mutex<Option<Position>>,
}

impl MachineStateStore {
    /// Create a store holding the default snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current snapshot
    pub fn current(&self) -> MachineState {
        self.current.read().as_ref().clone()
    }

    /// Shared handle to the current snapshot
    pub fn snapshot(&self) -> Arc<MachineState> {
        self.current.read().clone()
    }

    /// Last work coordinate offset reported this session
    pub fn work_offset(&self) -> Option<Position> {
        *self.work_offset.lock()
    }

    /// Apply one parsed report and return the resulting snapshot
    ///
    /// A report with `MPos` but no `WPos` gets its work position derived from
    /// the most recent `WCO`, if one has been seen.
    pub(crate) fn apply_delta(&self, delta: &StatusDelta) -> MachineState {
        let mut delta = delta.clone();
        {
            let mut offset = self.work_offset.lock();
            if let Some(wco) = delta.work_offset {
                *offset = Some(wco);
            }
            if delta.work_position.is_none() {
                if let (Some(mpos), Some(wco)) = (delta.machine_position, *offset) {
                    delta.work_position = Some(mpos.subtract(&wco));
                }
            }
        }

        let mut current = self.current.write();
        let next = delta.apply_to(&current);
        *current = Arc::new(next.clone());
        next
    }

    /// Return to the default snapshot and forget the work offset
    pub(crate) fn reset(&self) {
        *self.work_offset.lock() = None;
        *self.current.write() = Arc::new(MachineState::default());
    }
}
