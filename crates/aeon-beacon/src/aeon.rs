//! One cabinet's execution context.

use aeon_core::Cabinet;
use aeon_crypto::ThresholdKeyManager;

/// Everything one cabinet run needs: its description, its key manager,
/// and its place in the generation sequence.
///
/// A unit is created when the cabinet is queued for setup, travels
/// through the setup coordinator, and is handed to the rotation
/// scheduler once keys exist.
pub struct AeonExecutionUnit {
    manager: ThresholdKeyManager,
    cabinet: Cabinet,
    generation: u64,
    ready: bool,
}

impl AeonExecutionUnit {
    /// Bundle a cabinet description with a freshly reset key manager
    /// under generation `generation`.
    pub fn new(manager: ThresholdKeyManager, cabinet: Cabinet, generation: u64) -> Self {
        Self {
            manager,
            cabinet,
            generation,
            ready: false,
        }
    }

    /// The cabinet description.
    pub fn cabinet(&self) -> &Cabinet {
        &self.cabinet
    }

    /// The key manager for this run.
    pub fn manager(&self) -> &ThresholdKeyManager {
        &self.manager
    }

    /// Mutable key manager access for the setup coordinator.
    pub fn manager_mut(&mut self) -> &mut ThresholdKeyManager {
        &mut self.manager
    }

    /// Position in the cabinet succession. Strictly increasing across
    /// units created by one scheduler.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether key generation finished for this unit.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Mark key generation as finished.
    pub(crate) fn mark_ready(&mut self) {
        self.ready = true;
    }
}
