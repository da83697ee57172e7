//! Per-fiber runtime flags and flag patches.
//!
//! [`RuntimeFlags`] is a small bitset carried by every fiber. Flags are
//! changed for a region of a program through a [`RuntimeFlagsPatch`]
//! (the `UpdateRuntimeFlags` instruction): the interpreter applies the
//! patch on region entry and restores the previous flags on region exit,
//! whether the region completes, fails, or unwinds.

use core::fmt;

/// The per-fiber configuration bitset.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeFlags(u32);

impl RuntimeFlags {
    /// Interruption may be observed at interruptible checkpoints.
    pub const INTERRUPTION: u32 = 1 << 0;
    /// The fiber yields back to the scheduler when its operation budget
    /// is exhausted.
    pub const COOPERATIVE_YIELDING: u32 = 1 << 1;
    /// The fiber is winding down: pending interrupts are deferred so
    /// cleanup can finish.
    pub const WIND_DOWN: u32 = 1 << 2;
    /// The interpreter emits a trace event per executed slice.
    pub const OP_TRACING: u32 = 1 << 3;

    /// No flags set.
    #[must_use]
    pub const fn none() -> Self {
        Self(0)
    }

    /// The default flag set for new fibers: interruptible, with
    /// cooperative yielding enabled.
    #[must_use]
    pub const fn default_flags() -> Self {
        Self(Self::INTERRUPTION | Self::COOPERATIVE_YIELDING)
    }

    /// Returns true if the given flag bit is set.
    #[must_use]
    pub const fn is_enabled(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    /// Returns a copy with the given flag bit set.
    #[must_use]
    pub const fn enable(self, flag: u32) -> Self {
        Self(self.0 | flag)
    }

    /// Returns a copy with the given flag bit cleared.
    #[must_use]
    pub const fn disable(self, flag: u32) -> Self {
        Self(self.0 & !flag)
    }

    /// Returns true if the interruption flag is set.
    #[must_use]
    pub const fn interruption(self) -> bool {
        self.is_enabled(Self::INTERRUPTION)
    }

    /// Returns true if cooperative yielding is enabled.
    #[must_use]
    pub const fn cooperative_yielding(self) -> bool {
        self.is_enabled(Self::COOPERATIVE_YIELDING)
    }

    /// Returns true if the fiber is winding down.
    #[must_use]
    pub const fn wind_down(self) -> bool {
        self.is_enabled(Self::WIND_DOWN)
    }

    /// Returns true if per-slice trace events are enabled.
    #[must_use]
    pub const fn op_tracing(self) -> bool {
        self.is_enabled(Self::OP_TRACING)
    }

    /// Returns true if a pending interrupt may be observed right now:
    /// interruption is enabled and the fiber is not winding down.
    #[must_use]
    pub const fn interruptible(self) -> bool {
        self.interruption() && !self.wind_down()
    }
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        Self::default_flags()
    }
}

impl fmt::Debug for RuntimeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        if self.interruption() {
            set.entry(&"INTERRUPTION");
        }
        if self.cooperative_yielding() {
            set.entry(&"COOPERATIVE_YIELDING");
        }
        if self.wind_down() {
            set.entry(&"WIND_DOWN");
        }
        if self.op_tracing() {
            set.entry(&"OP_TRACING");
        }
        set.finish()
    }
}

/// A change to a [`RuntimeFlags`] value.
///
/// The patch records which bits it touches (`active`) and the value each
/// touched bit takes (`enabled`). Bits outside `active` pass through
/// unchanged, so independent patches compose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeFlagsPatch {
    active: u32,
    enabled: u32,
}

impl RuntimeFlagsPatch {
    /// A patch that changes nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            active: 0,
            enabled: 0,
        }
    }

    /// A patch that sets the given flag bit.
    #[must_use]
    pub const fn enable(flag: u32) -> Self {
        Self {
            active: flag,
            enabled: flag,
        }
    }

    /// A patch that clears the given flag bit.
    #[must_use]
    pub const fn disable(flag: u32) -> Self {
        Self {
            active: flag,
            enabled: 0,
        }
    }

    /// The patch that rewrites `old` into `new`: it touches exactly the
    /// bits on which the two differ.
    #[must_use]
    pub const fn diff(old: RuntimeFlags, new: RuntimeFlags) -> Self {
        Self {
            active: old.0 ^ new.0,
            enabled: new.0,
        }
    }

    /// Returns true if this patch changes nothing.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.active == 0
    }

    /// Applies this patch to a flag set.
    #[must_use]
    pub const fn apply(self, flags: RuntimeFlags) -> RuntimeFlags {
        RuntimeFlags((flags.0 & !self.active) | (self.enabled & self.active))
    }
}
