//! Components and their binding to a manager

use crate::error::ComponentError;
use crate::event::{Event, Handler, Payload};
use crate::manager::ComponentManager;
use crate::Result;
use async_trait::async_trait;
use compact_str::CompactString;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

/// Identifier of a component inside a manager
pub type ComponentName = CompactString;

/// Non-owning back-reference from a component to its manager
///
/// The binding never keeps the manager alive. Once the manager is dropped the
/// binding reads as unbound.
pub struct Binding<T: Payload> {
    manager: RwLock<Option<Weak<ComponentManager<T>>>>,
}

impl<T: Payload> Binding<T> {
    pub fn new() -> Self {
        Self {
            manager: RwLock::new(None),
        }
    }

    /// The bound manager, if it is still alive
    pub fn get(&self) -> Option<Arc<ComponentManager<T>>> {
        self.manager.read().as_ref().and_then(Weak::upgrade)
    }

    pub fn is_live(&self) -> bool {
        self.get().is_some()
    }

    /// Record `manager` unless a live manager is already bound.
    ///
    /// The check and the store happen under one write guard. On conflict the
    /// current manager is returned and the binding is left untouched.
    pub(crate) fn try_set(
        &self,
        manager: Weak<ComponentManager<T>>,
    ) -> std::result::Result<(), Arc<ComponentManager<T>>> {
        let mut slot = self.manager.write();
        if let Some(current) = slot.as_ref().and_then(Weak::upgrade) {
            return Err(current);
        }
        *slot = Some(manager);
        Ok(())
    }

    /// Sever the back-reference. Only managers call this, when they drop a component.
    pub(crate) fn unbind(&self) {
        *self.manager.write() = None;
    }
}

impl<T: Payload> Default for Binding<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Payload> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(manager) => write!(f, "Binding({:?})", manager.name().as_str()),
            None => f.write_str("Binding(None)"),
        }
    }
}

/// A named node that can be bound to one [`ComponentManager`]
///
/// Implementors only provide [`name`](Component::name) and
/// [`binding`](Component::binding); everything else forwards to the bound
/// manager and fails with [`ComponentError::NotBound`] while unbound.
/// Override [`bind_handlers`](Component::bind_handlers) to register handlers
/// right after the component is added to a manager.
#[async_trait]
pub trait Component<T: Payload>: Send + Sync + 'static {
    fn name(&self) -> &ComponentName;

    fn binding(&self) -> &Binding<T>;

    /// Called once, right after the component is bound
    fn bind_handlers(&self) -> Result<()> {
        Ok(())
    }

    /// Manager capability. Leaves return `None`.
    fn as_manager(self: Arc<Self>) -> Option<Arc<ComponentManager<T>>> {
        None
    }

    /// Bind to `manager` and run [`bind_handlers`](Component::bind_handlers).
    ///
    /// Fails with [`ComponentError::AlreadyBound`] if a live manager is
    /// already bound; the existing binding is left untouched.
    fn bind(&self, manager: &ComponentManager<T>) -> Result<()> {
        if let Err(current) = self.binding().try_set(manager.downgrade()) {
            return Err(ComponentError::AlreadyBound {
                component: self.name().clone(),
                manager: current.name().clone(),
            });
        }
        self.bind_handlers()
    }

    /// The bound manager
    fn manager(&self) -> Result<Arc<ComponentManager<T>>> {
        self.binding()
            .get()
            .ok_or_else(|| ComponentError::NotBound(self.name().clone()))
    }

    fn manager_exists(&self) -> bool {
        self.binding().is_live()
    }

    /// Register a handler for `event_name` owned by this component
    fn register_handler(&self, event_name: &str, handler: Handler<T>) -> Result<()> {
        self.manager()?
            .register_component_handler(event_name, handler, self.name())
    }

    /// Register several handlers owned by this component
    fn register_handlers(&self, handlers: &[(&str, Handler<T>)]) -> Result<()> {
        for (event_name, handler) in handlers {
            self.register_handler(event_name, handler.clone())?;
        }
        Ok(())
    }

    fn has_handler(&self, event_name: &str) -> Result<bool> {
        Ok(self.manager()?.has_handler(event_name))
    }

    fn unregister_handler(&self, event_name: &str, handler: &Handler<T>) -> Result<()> {
        self.manager()?
            .unregister_component_handler(event_name, handler, self.name())
    }

    /// Drop every handler for `event_name`, whoever owns it
    fn unregister_handler_type(&self, event_name: &str) -> Result<()> {
        self.manager()?.unregister_handler_type(event_name);
        Ok(())
    }

    /// Raise an event through the bound manager.
    ///
    /// Failures come back with the event attached as context.
    async fn raise_event(&self, event: Arc<Event<T>>) -> Result<()> {
        let manager = self.manager().map_err(|err| err.with_event(&event))?;
        manager
            .raise_event(Arc::clone(&event))
            .await
            .map_err(|err| err.with_event(&event))
    }

    fn component_exists(&self, component_name: &str) -> Result<bool> {
        Ok(self.manager()?.component_exists(component_name))
    }

    fn components_exist(&self, component_names: &[&str]) -> Result<bool> {
        Ok(self
            .manager()?
            .components_exist(component_names.iter().copied()))
    }

    fn get_component(&self, component_name: &str) -> Result<Arc<dyn Component<T>>> {
        self.manager()?.get_component(component_name)
    }

    fn get_components(&self, component_names: &[&str]) -> Result<Vec<Arc<dyn Component<T>>>> {
        self.manager()?
            .get_components(component_names.iter().copied())
    }
}

impl<T: Payload> fmt::Debug for dyn Component<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({:?})", self.name().as_str())
    }
}

/// Plain leaf component with no behavior of its own
pub struct BasicComponent<T: Payload> {
    name: ComponentName,
    binding: Binding<T>,
}

impl<T: Payload> BasicComponent<T> {
    pub fn new(name: impl Into<ComponentName>) -> Self {
        Self {
            name: name.into(),
            binding: Binding::new(),
        }
    }

    /// Create the component already wrapped for registration
    pub fn shared(name: impl Into<ComponentName>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }
}

impl<T: Payload> Component<T> for BasicComponent<T> {
    fn name(&self) -> &ComponentName {
        &self.name
    }

    fn binding(&self) -> &Binding<T> {
        &self.binding
    }
}

impl<T: Payload> fmt::Debug for BasicComponent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({:?})", self.name.as_str())
    }
}
