use std::sync::atomic::{AtomicBool, Ordering};

/// A one-way flag guarding a fast-path invariant. Once invalidated it never
/// becomes valid again.
#[derive(Debug)]
pub struct Protector {
    name: &'static str,
    intact: AtomicBool,
}

impl Protector {
    pub const fn new(name: &'static str) -> Self {
        Protector {
            name,
            intact: AtomicBool::new(true),
        }
    }

    pub fn is_intact(&self) -> bool {
        self.intact.load(Ordering::Acquire)
    }

    /// Returns true if this call performed the transition.
    pub fn invalidate(&self) -> bool {
        let was_intact = self.intact.swap(false, Ordering::AcqRel);
        if was_intact {
            log::debug!("protector '{}' invalidated", self.name);
        }
        was_intact
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
