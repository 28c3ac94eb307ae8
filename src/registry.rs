//! Component-Clock Registry
//!
//! Process-level bookkeeping for the clocks owned by each component
//! instance, plus the backtest force-stop flag. Clocks are `Rc`-shared on
//! the single logical executor, so the registry lives in thread-local
//! storage; the force-stop flag is a plain atomic readable from anywhere.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::clock::Clock;
use crate::ident::UUID4;

thread_local! {
    static COMPONENT_CLOCKS: RefCell<HashMap<UUID4, Vec<Rc<RefCell<dyn Clock>>>>> =
        RefCell::new(HashMap::new());
}

/// Global abort signal for backtest runs.
static FORCE_STOP: AtomicBool = AtomicBool::new(false);

/// Associate a clock with a component instance. Re-registering the same
/// clock is a no-op.
pub fn register_component_clock(instance_id: UUID4, clock: Rc<RefCell<dyn Clock>>) {
    COMPONENT_CLOCKS.with(|registry| {
        let mut registry = registry.borrow_mut();
        let clocks = registry.entry(instance_id).or_default();
        if !clocks.iter().any(|c| Rc::ptr_eq(c, &clock)) {
            clocks.push(clock);
        }
    });
}

/// Remove a single clock from a component instance's set.
pub fn deregister_component_clock(instance_id: UUID4, clock: &Rc<RefCell<dyn Clock>>) {
    COMPONENT_CLOCKS.with(|registry| {
        let mut registry = registry.borrow_mut();
        if let Some(clocks) = registry.get_mut(&instance_id) {
            clocks.retain(|c| !Rc::ptr_eq(c, clock));
            if clocks.is_empty() {
                registry.remove(&instance_id);
            }
        }
    });
}

/// Remove every clock registered for a component instance.
pub fn remove_instance_component_clocks(instance_id: UUID4) {
    COMPONENT_CLOCKS.with(|registry| {
        registry.borrow_mut().remove(&instance_id);
    });
}

/// Clocks registered for a component instance.
///
/// Returns a copy so callers can iterate while registrations continue.
pub fn get_component_clocks(instance_id: UUID4) -> Vec<Rc<RefCell<dyn Clock>>> {
    COMPONENT_CLOCKS.with(|registry| {
        registry
            .borrow()
            .get(&instance_id)
            .cloned()
            .unwrap_or_default()
    })
}

/// Reset the registry. Test support.
pub fn clear_component_clocks() {
    COMPONENT_CLOCKS.with(|registry| registry.borrow_mut().clear());
}

/// Raise or clear the backtest abort signal.
pub fn set_backtest_force_stop(value: bool) {
    FORCE_STOP.store(value, Ordering::SeqCst);
}

/// Whether the backtest abort signal is raised.
pub fn is_backtest_force_stop() -> bool {
    FORCE_STOP.load(Ordering::SeqCst)
}
