//! Per-octant load state machine.
//!
//! ```text
//! Unloaded --request--> Requested --loaded--> Resident
//!     ^                   |   |                  |
//!     |                failed evict            evict
//!     |                   v   v                  |
//!     +-------------------+ Evicting --done------+
//! ```
//!
//! Every request bumps the slot's generation. A completion carrying an older
//! generation is stale and ignored, so results of reclaimed requests never
//! become resident.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OctantState {
    #[default]
    Unloaded,
    /// A load is in flight and its result is wanted.
    Requested,
    Resident,
    /// A load is in flight but its result will be dropped.
    Evicting,
}

/// What a completion did to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The result should be kept.
    Resident,
    /// The load failed while wanted.
    Failed,
    /// The slot was evicted while loading; the result is dropped.
    Discarded,
    /// The completion belongs to an older request.
    Stale,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OctantSlot {
    state: OctantState,
    generation: u32,
}

impl OctantSlot {
    pub fn state(&self) -> OctantState {
        self.state
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, OctantState::Requested | OctantState::Evicting)
    }

    /// Starts a new load and returns its generation, or `None` if the slot is
    /// already wanted or resident.
    pub fn request(&mut self) -> Option<u32> {
        match self.state {
            OctantState::Unloaded | OctantState::Evicting => {
                self.generation = self.generation.wrapping_add(1);
                self.state = OctantState::Requested;
                Some(self.generation)
            }
            OctantState::Requested | OctantState::Resident => None,
        }
    }

    /// Applies the result of the load started with `generation`.
    pub fn complete(&mut self, generation: u32, loaded: bool) -> Completion {
        if generation != self.generation {
            return Completion::Stale;
        }
        match self.state {
            OctantState::Requested if loaded => {
                self.state = OctantState::Resident;
                Completion::Resident
            }
            OctantState::Requested => {
                self.state = OctantState::Unloaded;
                Completion::Failed
            }
            OctantState::Evicting => {
                self.state = OctantState::Unloaded;
                Completion::Discarded
            }
            OctantState::Unloaded | OctantState::Resident => Completion::Stale,
        }
    }

    /// Withdraws the load started with `generation` without a result.
    pub fn cancel(&mut self, generation: u32) -> bool {
        if generation == self.generation && self.is_pending() {
            self.state = OctantState::Unloaded;
            true
        } else {
            false
        }
    }

    /// Drops a resident payload or marks an in-flight load for discarding.
    /// Returns true if the slot was resident.
    pub fn evict(&mut self) -> bool {
        match self.state {
            OctantState::Resident => {
                self.state = OctantState::Unloaded;
                true
            }
            OctantState::Requested => {
                self.state = OctantState::Evicting;
                false
            }
            OctantState::Unloaded | OctantState::Evicting => false,
        }
    }
}
