//! Named gating signals consulted during sequencing.
//!
//! Conditions model external state — typically a hardware trigger — that can hold back
//! compilation of a subtree until the outside world is ready. They are queried alongside
//! parameters by [`PulseTemplate::requires_stop`](crate::template::PulseTemplate::requires_stop).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A named external gating signal.
pub trait Condition: fmt::Debug + Send + Sync {
    /// Whether sequencing of any subtree referencing this condition must stop for now.
    fn requires_stop(&self) -> bool;
}

/// The condition bindings supplied for one sequencing pass, keyed by name.
pub type ConditionMap = HashMap<String, Arc<dyn Condition>>;

/// A condition backed by a hardware trigger.
///
/// Until the trigger is armed, any subtree gated on this condition requires a stop; the caller
/// arms the trigger once the instrument is ready and then retries the deferred pass.
#[derive(Debug, Default)]
pub struct HardwareCondition {
    trigger_armed: AtomicBool,
}

impl HardwareCondition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm_trigger(&self) {
        self.trigger_armed.store(true, Ordering::Relaxed);
    }

    pub fn disarm_trigger(&self) {
        self.trigger_armed.store(false, Ordering::Relaxed);
    }

    pub fn is_armed(&self) -> bool {
        self.trigger_armed.load(Ordering::Relaxed)
    }
}

impl Condition for HardwareCondition {
    fn requires_stop(&self) -> bool {
        !self.is_armed()
    }
}

/// A condition evaluated host-side.
///
/// Its outcome is always available to the compiler, so it never holds back sequencing.
#[derive(Debug, Default)]
pub struct SoftwareCondition;

impl SoftwareCondition {
    pub fn new() -> Self {
        Self
    }
}

impl Condition for SoftwareCondition {
    fn requires_stop(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_conditions_never_stall() {
        assert!(!SoftwareCondition::new().requires_stop());
    }

    #[test]
    fn requires_stop_until_the_trigger_is_armed() {
        let condition = HardwareCondition::new();
        assert!(condition.requires_stop());

        condition.arm_trigger();
        assert!(!condition.requires_stop());

        condition.disarm_trigger();
        assert!(condition.requires_stop());
    }
}
