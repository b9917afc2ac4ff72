//! Identity slot allocation.
//!
//! Two policies are supported:
//!
//! - **Bounded** - a fixed table of `capacity` slots; `reserve` always hands out
//!   the lowest free identity, and released identities are reused.
//! - **Unbounded** - a counter starting at 1; identities are never reused.
//!
//! Both are deterministic: the same sequence of `reserve`/`release` calls
//! yields the same identities.

use relay_protocol::Identity;
use thiserror::Error;

/// Default number of slots for the bounded policy.
pub const DEFAULT_CAPACITY: usize = 8;

/// Slot allocation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotError {
    /// Every slot is occupied.
    #[error("All {0} identity slots are in use")]
    Full(usize),
}

/// How identities are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMode {
    /// Fixed pool of reusable identities `1..=capacity`.
    Bounded {
        /// Number of slots.
        capacity: usize,
    },
    /// Ever-increasing identities, never reused.
    Unbounded,
}

impl Default for IdentityMode {
    fn default() -> Self {
        IdentityMode::Bounded {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl IdentityMode {
    /// Maximum number of live identities, if bounded.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        match self {
            IdentityMode::Bounded { capacity } => Some(*capacity),
            IdentityMode::Unbounded => None,
        }
    }
}

/// Hands out and takes back identities.
#[derive(Debug, Clone)]
pub enum SlotAllocator {
    /// `slots[i]` is `true` while identity `i + 1` is held.
    Bounded { slots: Vec<bool> },
    /// Next identity to hand out, plus how many are outstanding.
    Unbounded { next: u32, in_use: usize },
}

impl SlotAllocator {
    /// Create an allocator for the given mode with every slot free.
    #[must_use]
    pub fn new(mode: IdentityMode) -> Self {
        match mode {
            IdentityMode::Bounded { capacity } => SlotAllocator::Bounded {
                slots: vec![false; capacity],
            },
            IdentityMode::Unbounded => SlotAllocator::Unbounded { next: 1, in_use: 0 },
        }
    }

    /// Reserve an identity.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::Full`] if the bounded table has no free slot.
    pub fn reserve(&mut self) -> Result<Identity, SlotError> {
        match self {
            SlotAllocator::Bounded { slots } => {
                let index = slots
                    .iter()
                    .position(|taken| !taken)
                    .ok_or(SlotError::Full(slots.len()))?;
                slots[index] = true;
                Ok(Identity::new(index as u32 + 1))
            }
            SlotAllocator::Unbounded { next, in_use } => {
                let identity = Identity::new(*next);
                *next += 1;
                *in_use += 1;
                Ok(identity)
            }
        }
    }

    /// Release an identity.
    ///
    /// Returns `true` if the identity was held. Releasing a free or
    /// out-of-range identity is a no-op.
    pub fn release(&mut self, identity: Identity) -> bool {
        match self {
            SlotAllocator::Bounded { slots } => {
                let Some(index) = (identity.get() as usize).checked_sub(1) else {
                    return false;
                };
                match slots.get_mut(index) {
                    Some(taken) if *taken => {
                        *taken = false;
                        true
                    }
                    _ => false,
                }
            }
            SlotAllocator::Unbounded { next, in_use } => {
                // Identities are never handed out again; only the count moves.
                if identity.get() == 0 || identity.get() >= *next || *in_use == 0 {
                    return false;
                }
                *in_use -= 1;
                true
            }
        }
    }

    /// Number of identities currently held.
    #[must_use]
    pub fn in_use(&self) -> usize {
        match self {
            SlotAllocator::Bounded { slots } => slots.iter().filter(|taken| **taken).count(),
            SlotAllocator::Unbounded { in_use, .. } => *in_use,
        }
    }

    /// Slot count, if bounded.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        match self {
            SlotAllocator::Bounded { slots } => Some(slots.len()),
            SlotAllocator::Unbounded { .. } => None,
        }
    }

    /// Check whether another identity can be reserved.
    #[must_use]
    pub fn is_full(&self) -> bool {
        match self {
            SlotAllocator::Bounded { slots } => slots.iter().all(|taken| *taken),
            SlotAllocator::Unbounded { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> Identity {
        Identity::new(n)
    }

    #[test]
    fn test_bounded_lowest_free_first() {
        let mut slots = SlotAllocator::new(IdentityMode::Bounded { capacity: 3 });

        assert_eq!(slots.reserve(), Ok(id(1)));
        assert_eq!(slots.reserve(), Ok(id(2)));
        assert_eq!(slots.reserve(), Ok(id(3)));
        assert_eq!(slots.reserve(), Err(SlotError::Full(3)));
        assert!(slots.is_full());

        assert!(slots.release(id(2)));
        assert_eq!(slots.reserve(), Ok(id(2)));

        assert!(slots.release(id(3)));
        assert!(slots.release(id(1)));
        assert_eq!(slots.reserve(), Ok(id(1)));
        assert_eq!(slots.reserve(), Ok(id(3)));
    }

    #[test]
    fn test_bounded_release_is_idempotent() {
        let mut slots = SlotAllocator::new(IdentityMode::Bounded { capacity: 2 });
        slots.reserve().unwrap();

        assert!(slots.release(id(1)));
        assert!(!slots.release(id(1)));
        assert!(!slots.release(id(0)));
        assert!(!slots.release(id(9)));
        assert_eq!(slots.in_use(), 0);
    }

    #[test]
    fn test_bounded_zero_capacity() {
        let mut slots = SlotAllocator::new(IdentityMode::Bounded { capacity: 0 });
        assert_eq!(slots.reserve(), Err(SlotError::Full(0)));
    }

    #[test]
    fn test_unbounded_never_reuses() {
        let mut slots = SlotAllocator::new(IdentityMode::Unbounded);

        assert_eq!(slots.reserve(), Ok(id(1)));
        assert_eq!(slots.reserve(), Ok(id(2)));
        assert!(slots.release(id(1)));
        assert_eq!(slots.reserve(), Ok(id(3)));
        assert_eq!(slots.in_use(), 2);
        assert_eq!(slots.capacity(), None);
        assert!(!slots.is_full());
    }

    #[test]
    fn test_deterministic_sequence() {
        let run = || {
            let mut slots = SlotAllocator::new(IdentityMode::default());
            let mut seen = Vec::new();
            for step in 0..20u32 {
                if step % 3 == 2 {
                    slots.release(id(step % 5 + 1));
                } else if let Ok(identity) = slots.reserve() {
                    seen.push(identity);
                }
            }
            seen
        };

        assert_eq!(run(), run());
    }
}
