//! Component registry and resolver.
//!
//! # Responsibilities
//! - Register components by name before the server starts
//! - Initialize each component at most once, on demand or eagerly
//! - Detect dependency cycles during initialization
//! - Tear down initialized components in reverse order
//!
//! # Design Decisions
//! - One re-entrant resolution lock serializes initialization across threads;
//!   the thread holding it may re-enter to resolve dependencies
//! - Seeing `Initializing` while holding that lock can only mean the current
//!   thread's own chain came back around, which is a cycle
//! - Settled components (initialized or failed) resolve without the lock

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::component::Component;
use crate::environment::Environment;
use crate::error::{BoxError, ComponentError};

/// When a component is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    /// At server start, in registration order.
    Eager,
    /// On first resolve.
    #[default]
    Lazy,
}

/// Observable lifecycle state of a component name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentStatus {
    Unregistered,
    Registered,
    Initializing,
    Initialized,
    Failed,
}

#[derive(Debug, Clone)]
enum SlotState {
    Registered,
    Initializing,
    Initialized,
    Failed(ComponentError),
}

struct Slot {
    name: String,
    component: Arc<dyn Component>,
    activation: Activation,
    state: Mutex<SlotState>,
}

impl Slot {
    /// Outcome if the slot already settled.
    fn settled(&self) -> Option<Result<Arc<dyn Component>, ComponentError>> {
        match &*self.state.lock() {
            SlotState::Initialized => Some(Ok(Arc::clone(&self.component))),
            SlotState::Failed(err) => Some(Err(err.clone())),
            SlotState::Registered | SlotState::Initializing => None,
        }
    }
}

#[derive(Debug, Error)]
#[error("init panicked: {0}")]
struct InitPanic(String);

/// Registry of named components.
#[derive(Default)]
pub struct ComponentManager {
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
    anonymous: usize,
    resolution: ReentrantMutex<()>,
    init_order: Mutex<Vec<usize>>,
}

impl ComponentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `component` under `name`.
    ///
    /// Registering a name twice replaces the earlier component.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        component: Arc<dyn Component>,
        activation: Activation,
    ) {
        let name = name.into();
        let slot = Slot {
            name: name.clone(),
            component,
            activation,
            state: Mutex::new(SlotState::Registered),
        };
        match self.index.get(&name) {
            Some(&index) => {
                warn!(component = %name, "Component registered twice, replacing");
                self.slots[index] = slot;
            }
            None => {
                self.index.insert(name, self.slots.len());
                self.slots.push(slot);
            }
        }
    }

    /// Register a component that cannot be resolved by name.
    ///
    /// Anonymous components are always eager, so they still get `init`
    /// and `destroy` calls.
    pub fn register_anonymous(&mut self, component: Arc<dyn Component>) {
        self.anonymous += 1;
        self.slots.push(Slot {
            name: format!("anonymous#{}", self.anonymous),
            component,
            activation: Activation::Eager,
            state: Mutex::new(SlotState::Registered),
        });
    }

    /// Resolve `name`, initializing it on first access.
    pub fn resolve(
        &self,
        env: &dyn Environment,
        name: &str,
    ) -> Result<Arc<dyn Component>, ComponentError> {
        let index = *self
            .index
            .get(name)
            .ok_or_else(|| ComponentError::NotFound(name.to_string()))?;
        self.resolve_slot(env, index)
    }

    /// Initialize every eager component in registration order.
    ///
    /// `before_init` is called with each name first. Stops at the first failure.
    pub fn init_eager(
        &self,
        env: &dyn Environment,
        mut before_init: impl FnMut(&str),
    ) -> Result<(), ComponentError> {
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.activation == Activation::Eager {
                before_init(&slot.name);
                self.resolve_slot(env, index)?;
            }
        }
        Ok(())
    }

    /// Destroy initialized components, most recently initialized first.
    ///
    /// Components that never finished `init` are skipped. Calling this twice
    /// destroys nothing the second time.
    pub fn destroy(&self) {
        let order = std::mem::take(&mut *self.init_order.lock());
        for index in order.into_iter().rev() {
            let slot = &self.slots[index];
            debug!(component = %slot.name, "Destroying component");
            if catch_unwind(AssertUnwindSafe(|| slot.component.destroy())).is_err() {
                warn!(component = %slot.name, "Component destroy panicked");
            }
        }
    }

    pub fn status(&self, name: &str) -> ComponentStatus {
        let Some(&index) = self.index.get(name) else {
            return ComponentStatus::Unregistered;
        };
        match &*self.slots[index].state.lock() {
            SlotState::Registered => ComponentStatus::Registered,
            SlotState::Initializing => ComponentStatus::Initializing,
            SlotState::Initialized => ComponentStatus::Initialized,
            SlotState::Failed(_) => ComponentStatus::Failed,
        }
    }

    /// Names in completed-initialization order.
    pub fn init_order(&self) -> Vec<String> {
        self.init_order
            .lock()
            .iter()
            .map(|&index| self.slots[index].name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn resolve_slot(
        &self,
        env: &dyn Environment,
        index: usize,
    ) -> Result<Arc<dyn Component>, ComponentError> {
        let slot = &self.slots[index];
        if let Some(outcome) = slot.settled() {
            return outcome;
        }

        let _resolving = self.resolution.lock();
        {
            let mut state = slot.state.lock();
            match &*state {
                SlotState::Initialized => return Ok(Arc::clone(&slot.component)),
                SlotState::Failed(err) => return Err(err.clone()),
                SlotState::Initializing => {
                    warn!(component = %slot.name, "Cyclic component dependency");
                    return Err(ComponentError::CyclicDependency(slot.name.clone()));
                }
                SlotState::Registered => {}
            }
            *state = SlotState::Initializing;
        }

        debug!(component = %slot.name, "Initializing component");
        let result = catch_unwind(AssertUnwindSafe(|| slot.component.init(env)))
            .unwrap_or_else(|panic| Err(InitPanic(panic_message(&*panic)).into()));

        let mut state = slot.state.lock();
        match result {
            Ok(()) => {
                *state = SlotState::Initialized;
                self.init_order.lock().push(index);
                info!(component = %slot.name, "Component initialized");
                Ok(Arc::clone(&slot.component))
            }
            Err(source) => {
                let err = classify(&slot.name, source);
                warn!(component = %slot.name, error = %err, "Component failed to initialize");
                *state = SlotState::Failed(err.clone());
                Err(err)
            }
        }
    }
}

/// Cycle reports pass through dependents unchanged; anything else is
/// attributed to the component whose init failed.
fn classify(name: &str, source: BoxError) -> ComponentError {
    match source.downcast::<ComponentError>() {
        Ok(err) if matches!(*err, ComponentError::CyclicDependency(_)) => *err,
        Ok(err) => ComponentError::InitializationFailure {
            name: name.to_string(),
            source: Arc::new(*err),
        },
        Err(source) => ComponentError::InitializationFailure {
            name: name.to_string(),
            source: Arc::from(source),
        },
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
