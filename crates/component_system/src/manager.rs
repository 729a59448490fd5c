//! Component manager: the registry of children, the handler table and
//! event dispatch

use crate::component::{Binding, Component, ComponentName};
use crate::config::ManagerConfig;
use crate::error::ComponentError;
use crate::event::{Event, Handler, Payload, Registration};
use crate::scope::{panic_message, Scope};
use crate::Result;
use compact_str::CompactString;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// Where a manager schedules the tasks of a top-level `raise_event`
pub(crate) enum RaiseMode {
    /// Open a fresh scope per call and wait for it
    Internal,
    /// Dispatch into a caller-owned scope without waiting
    External(Scope),
}

/// Registry entry
enum Slot<T: Payload> {
    Member {
        component: Arc<dyn Component<T>>,
        /// Resolved once at insertion from [`Component::as_manager`]
        manager: Option<Arc<ComponentManager<T>>>,
    },
    /// The manager itself, registered under its alias
    SelfAlias,
}

/// Name-indexed children in insertion order
struct Registry<T: Payload> {
    order: Vec<ComponentName>,
    slots: HashMap<ComponentName, Slot<T>>,
}

impl<T: Payload> Default for Registry<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            slots: HashMap::new(),
        }
    }
}

impl<T: Payload> Registry<T> {
    fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    fn insert(&mut self, name: ComponentName, slot: Slot<T>) {
        self.order.push(name.clone());
        self.slots.insert(name, slot);
    }

    fn remove(&mut self, name: &str) -> Option<Slot<T>> {
        let slot = self.slots.remove(name)?;
        self.order.retain(|entry| entry.as_str() != name);
        Some(slot)
    }

    fn iter(&self) -> impl Iterator<Item = (&ComponentName, &Slot<T>)> {
        self.order
            .iter()
            .filter_map(|name| self.slots.get(name).map(|slot| (name, slot)))
    }

    fn into_ordered(mut self) -> Vec<(ComponentName, Slot<T>)> {
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|name| self.slots.remove(&name).map(|slot| (name, slot)))
            .collect()
    }
}

/// A component that owns other components and dispatches events among them
///
/// Managers are always handled through `Arc`: children keep a weak
/// reference back to their manager, and a manager can itself be added to
/// another manager to build a tree. Dropping a manager tears down its whole
/// subtree with [`unbind_components`](ComponentManager::unbind_components).
///
/// # Dispatch
///
/// [`raise_event`](ComponentManager::raise_event) first climbs: while the
/// manager has a parent and the event level is above zero, the level drops by
/// one and the event is re-raised by the parent instead. The manager where the
/// climb stops broadcasts: every matching handler, then every nested manager
/// below it, is scheduled as a task in one [`Scope`].
pub struct ComponentManager<T: Payload> {
    name: ComponentName,
    binding: Binding<T>,
    this: Weak<ComponentManager<T>>,
    registry: RwLock<Registry<T>>,
    handlers: DashMap<CompactString, HashSet<Registration<T>>>,
    mode: RaiseMode,
    config: ManagerConfig,
}

impl<T: Payload> ComponentManager<T> {
    /// Create an empty manager
    pub fn new(name: impl Into<ComponentName>) -> Arc<Self> {
        Self::with_config(name, ManagerConfig::default())
    }

    /// Create a manager that lists itself as a component named `own_name`
    pub fn with_alias(
        name: impl Into<ComponentName>,
        own_name: impl Into<ComponentName>,
    ) -> Arc<Self> {
        Self::with_config(name, ManagerConfig::default().with_own_name(own_name))
    }

    pub fn with_config(name: impl Into<ComponentName>, config: ManagerConfig) -> Arc<Self> {
        Self::build(name.into(), config, RaiseMode::Internal)
    }

    pub(crate) fn build(name: ComponentName, config: ManagerConfig, mode: RaiseMode) -> Arc<Self> {
        let mut registry = Registry::default();
        if let Some(alias) = config.own_name.as_deref() {
            registry.insert(alias.into(), Slot::SelfAlias);
        }

        Arc::new_cyclic(|this| Self {
            name,
            binding: Binding::new(),
            this: this.clone(),
            registry: RwLock::new(registry),
            handlers: DashMap::new(),
            mode,
            config,
        })
    }

    pub fn name(&self) -> &ComponentName {
        &self.name
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub(crate) fn downgrade(&self) -> Weak<Self> {
        self.this.clone()
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Add a component and bind it to this manager.
    ///
    /// Fails with [`ComponentError::DuplicateComponent`] if the name is taken.
    /// If binding fails (the component belongs to another manager, or its
    /// `bind_handlers` errors) the registry is restored and the error returned.
    pub fn add_component(&self, component: Arc<dyn Component<T>>) -> Result<()> {
        let name = component.name().clone();
        let manager = Arc::clone(&component).as_manager();
        {
            let mut registry = self.registry.write();
            if registry.contains(&name) {
                return Err(ComponentError::DuplicateComponent(name));
            }
            registry.insert(
                name.clone(),
                Slot::Member {
                    component: Arc::clone(&component),
                    manager,
                },
            );
        }

        if let Err(err) = component.bind(self) {
            match err {
                // still bound elsewhere, only undo the insertion
                ComponentError::AlreadyBound { .. } => {
                    self.registry.write().remove(&name);
                }
                _ => {
                    self.detach(&name);
                }
            }
            return Err(err);
        }

        trace!("➕ {} added component {}", self.name, name);
        Ok(())
    }

    /// Add components in order. Stops at the first failure, keeping earlier additions.
    pub fn add_components<I>(&self, components: I) -> Result<()>
    where
        I: IntoIterator<Item = Arc<dyn Component<T>>>,
    {
        for component in components {
            self.add_component(component)?;
        }
        Ok(())
    }

    /// Remove a component, unbind it and drop every handler it owns.
    ///
    /// Removing the self alias unbinds this manager from its parent.
    pub fn remove_component(&self, component_name: &str) -> Result<()> {
        match self.detach(component_name) {
            Some(_) => {
                trace!("➖ {} removed component {}", self.name, component_name);
                Ok(())
            }
            None => Err(ComponentError::UnknownComponent(component_name.into())),
        }
    }

    fn detach(&self, component_name: &str) -> Option<Slot<T>> {
        let slot = self.registry.write().remove(component_name)?;
        match &slot {
            Slot::Member { component, .. } => component.binding().unbind(),
            // the alias is this manager, so it leaves its own parent
            Slot::SelfAlias => self.binding.unbind(),
        }
        self.handlers.retain(|_, registrations| {
            registrations.retain(|registration| registration.owner.as_str() != component_name);
            !registrations.is_empty()
        });
        Some(slot)
    }

    pub fn component_exists(&self, component_name: &str) -> bool {
        self.registry.read().contains(component_name)
    }

    pub fn components_exist<I, S>(&self, component_names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let registry = self.registry.read();
        component_names
            .into_iter()
            .all(|name| registry.contains(name.as_ref()))
    }

    /// Look up a component by name. The alias slot resolves to this manager.
    pub fn get_component(&self, component_name: &str) -> Result<Arc<dyn Component<T>>> {
        let registry = self.registry.read();
        match registry.slots.get(component_name) {
            Some(slot) => self
                .resolve(slot)
                .ok_or_else(|| ComponentError::UnknownComponent(component_name.into())),
            None => Err(ComponentError::UnknownComponent(component_name.into())),
        }
    }

    pub fn get_components<I, S>(&self, component_names: I) -> Result<Vec<Arc<dyn Component<T>>>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        component_names
            .into_iter()
            .map(|name| self.get_component(name.as_ref()))
            .collect()
    }

    /// Names of all registered components in insertion order
    pub fn list_components(&self) -> Vec<ComponentName> {
        self.registry.read().order.clone()
    }

    /// All registered components in insertion order
    pub fn get_all_components(&self) -> Vec<Arc<dyn Component<T>>> {
        let registry = self.registry.read();
        registry
            .iter()
            .filter_map(|(_, slot)| self.resolve(slot))
            .collect()
    }

    fn resolve(&self, slot: &Slot<T>) -> Option<Arc<dyn Component<T>>> {
        match slot {
            Slot::Member { component, .. } => Some(Arc::clone(component)),
            Slot::SelfAlias => self.this.upgrade().map(|this| this as Arc<dyn Component<T>>),
        }
    }

    /// Nested managers in insertion order, excluding this manager's alias
    fn child_managers(&self) -> Vec<Arc<ComponentManager<T>>> {
        self.registry
            .read()
            .iter()
            .filter_map(|(_, slot)| match slot {
                Slot::Member {
                    manager: Some(manager),
                    ..
                } => Some(Arc::clone(manager)),
                _ => None,
            })
            .collect()
    }

    /// Add `component` for as long as the returned guard lives.
    ///
    /// The guard removes the component when dropped, unless it was already
    /// removed by hand.
    pub fn temporary_component<C>(&self, component: Arc<C>) -> Result<TemporaryComponent<'_, T, C>>
    where
        C: Component<T>,
    {
        self.add_component(Arc::clone(&component) as Arc<dyn Component<T>>)?;
        Ok(TemporaryComponent {
            manager: self,
            component,
        })
    }

    /// Tear down the whole subtree: nested managers first, then every handler
    /// and binding of this manager. A registered self alias also detaches
    /// this manager from its own parent. Safe to call repeatedly.
    pub fn unbind_components(&self) {
        let registry = std::mem::take(&mut *self.registry.write());
        self.handlers.clear();

        for (_, slot) in registry.into_ordered() {
            match slot {
                Slot::Member { component, manager } => {
                    if let Some(child) = manager {
                        child.unbind_components();
                    }
                    component.binding().unbind();
                }
                Slot::SelfAlias => self.binding.unbind(),
            }
        }
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    /// Register a handler owned by this manager
    pub fn register_handler(&self, event_name: &str, handler: Handler<T>) {
        self.insert_registration(event_name, handler, self.name.clone());
    }

    /// Register a handler owned by `component_name`.
    ///
    /// The owner must be this manager or one of its registered components.
    pub fn register_component_handler(
        &self,
        event_name: &str,
        handler: Handler<T>,
        component_name: &str,
    ) -> Result<()> {
        self.ensure_owner(component_name)?;
        self.insert_registration(event_name, handler, component_name.into());
        Ok(())
    }

    fn insert_registration(&self, event_name: &str, handler: Handler<T>, owner: ComponentName) {
        trace!(
            "📝 {} registered {} for {} (owner {})",
            self.name,
            handler.label(),
            event_name,
            owner
        );
        self.handlers
            .entry(event_name.into())
            .or_default()
            .insert(Registration { handler, owner });
    }

    /// Unregister a handler owned by this manager
    pub fn unregister_handler(&self, event_name: &str, handler: &Handler<T>) {
        self.remove_registration(event_name, handler, &self.name);
    }

    /// Unregister a handler owned by `component_name`. Unknown pairs are ignored.
    pub fn unregister_component_handler(
        &self,
        event_name: &str,
        handler: &Handler<T>,
        component_name: &str,
    ) -> Result<()> {
        self.ensure_owner(component_name)?;
        self.remove_registration(event_name, handler, component_name);
        Ok(())
    }

    fn remove_registration(&self, event_name: &str, handler: &Handler<T>, owner: &str) {
        let registration = Registration {
            handler: handler.clone(),
            owner: owner.into(),
        };
        if let Some(mut registrations) = self.handlers.get_mut(event_name) {
            registrations.remove(&registration);
        }
        self.handlers
            .remove_if(event_name, |_, registrations| registrations.is_empty());
    }

    /// Drop every handler for `event_name`, whoever owns it
    pub fn unregister_handler_type(&self, event_name: &str) {
        self.handlers.remove(event_name);
    }

    pub fn has_handler(&self, event_name: &str) -> bool {
        self.handlers
            .get(event_name)
            .is_some_and(|registrations| !registrations.is_empty())
    }

    /// Number of distinct registrations for `event_name` on this manager
    pub fn handler_count(&self, event_name: &str) -> usize {
        self.handlers
            .get(event_name)
            .map_or(0, |registrations| registrations.len())
    }

    /// Event names with at least one handler on this manager
    pub fn registered_events(&self) -> Vec<String> {
        self.handlers.iter().map(|entry| entry.key().to_string()).collect()
    }

    fn ensure_owner(&self, component_name: &str) -> Result<()> {
        if component_name == self.name.as_str() || self.component_exists(component_name) {
            Ok(())
        } else {
            Err(ComponentError::UnknownComponent(component_name.into()))
        }
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Raise an event from this manager.
    ///
    /// A regular manager opens a fresh scope and returns once every task it
    /// scheduled, nested managers included, has finished. A manager built by
    /// [`ExternalRaiseManager`](crate::ExternalRaiseManager) schedules into
    /// its external scope and returns without waiting.
    pub async fn raise_event(&self, event: Arc<Event<T>>) -> Result<()> {
        match &self.mode {
            RaiseMode::Internal => self.raise_event_internal(event).await,
            RaiseMode::External(scope) => self.raise_event_in_scope(event, scope).await,
        }
    }

    /// Raise an event in a fresh scope and wait for all of its tasks
    pub async fn raise_event_internal(&self, event: Arc<Event<T>>) -> Result<()> {
        Scope::open(|scope| async move { self.raise_event_in_scope(event, &scope).await }).await
    }

    /// Run dispatch, scheduling every task in `scope`.
    ///
    /// Returns once scheduling is done; waiting is up to the owner of `scope`.
    pub fn raise_event_in_scope<'a>(
        &'a self,
        event: Arc<Event<T>>,
        scope: &'a Scope,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            scope.checkpoint().await?;

            // Leveled events climb one manager per level before broadcasting
            if let Some(parent) = self.binding.get() {
                if event.pop_level() {
                    trace!("⬆️ {} forwarding {:?} to {}", self.name, event, parent.name());
                    return parent
                        .raise_event(Arc::clone(&event))
                        .await
                        .map_err(|err| err.with_event(&event));
                }
            }

            self.broadcast(&event, scope);
            Ok(())
        }
        .boxed()
    }

    /// Schedule this manager's handlers, then the broadcast of every nested manager
    fn broadcast(&self, event: &Arc<Event<T>>, scope: &Scope) {
        let registrations: Vec<Registration<T>> = self
            .handlers
            .get(event.name())
            .map(|registrations| registrations.iter().cloned().collect())
            .unwrap_or_default();

        if !self.config.is_quiet(event.name()) {
            debug!(
                "📤 {} broadcasting {:?} to {} handler(s)",
                self.name,
                event,
                registrations.len()
            );
        }

        for registration in registrations {
            scope.spawn(run_handler(registration, Arc::clone(event)));
        }

        for child in self.child_managers() {
            scope.spawn(child.broadcast_in_scope(Arc::clone(event), scope.clone()));
        }
    }

    /// Broadcast without climbing. Used for the downward fan-out so each
    /// manager in the subtree handles the event exactly once.
    fn broadcast_in_scope(
        self: Arc<Self>,
        event: Arc<Event<T>>,
        scope: Scope,
    ) -> BoxFuture<'static, Result<()>> {
        async move {
            scope.checkpoint().await?;
            self.broadcast(&event, &scope);
            Ok(())
        }
        .boxed()
    }
}

async fn run_handler<T: Payload>(
    registration: Registration<T>,
    event: Arc<Event<T>>,
) -> Result<()> {
    let Registration { handler, owner } = registration;
    match AssertUnwindSafe(handler.call(Arc::clone(&event))).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => {
            warn!(
                "❌ Handler {} owned by {} failed on {:?}: {}",
                handler.label(),
                owner,
                event,
                source
            );
            Err(ComponentError::HandlerFailed {
                event: format!("{event:?}"),
                owner,
                source,
            })
        }
        Err(panic) => {
            let message = panic_message(panic);
            warn!(
                "💥 Handler {} owned by {} panicked on {:?}: {}",
                handler.label(),
                owner,
                event,
                message
            );
            Err(ComponentError::HandlerPanicked {
                event: format!("{event:?}"),
                owner,
                message,
            })
        }
    }
}

#[async_trait::async_trait]
impl<T: Payload> Component<T> for ComponentManager<T> {
    fn name(&self) -> &ComponentName {
        &self.name
    }

    fn binding(&self) -> &Binding<T> {
        &self.binding
    }

    fn as_manager(self: Arc<Self>) -> Option<Arc<ComponentManager<T>>> {
        Some(self)
    }

    // A manager's facade acts on the manager itself, not on its parent.

    fn register_handler(&self, event_name: &str, handler: Handler<T>) -> Result<()> {
        ComponentManager::register_handler(self, event_name, handler);
        Ok(())
    }

    fn has_handler(&self, event_name: &str) -> Result<bool> {
        Ok(ComponentManager::has_handler(self, event_name))
    }

    fn unregister_handler(&self, event_name: &str, handler: &Handler<T>) -> Result<()> {
        ComponentManager::unregister_handler(self, event_name, handler);
        Ok(())
    }

    fn unregister_handler_type(&self, event_name: &str) -> Result<()> {
        ComponentManager::unregister_handler_type(self, event_name);
        Ok(())
    }

    async fn raise_event(&self, event: Arc<Event<T>>) -> Result<()> {
        ComponentManager::raise_event(self, event).await
    }

    fn component_exists(&self, component_name: &str) -> Result<bool> {
        Ok(ComponentManager::component_exists(self, component_name))
    }

    fn components_exist(&self, component_names: &[&str]) -> Result<bool> {
        Ok(ComponentManager::components_exist(self, component_names.iter().copied()))
    }

    fn get_component(&self, component_name: &str) -> Result<Arc<dyn Component<T>>> {
        ComponentManager::get_component(self, component_name)
    }

    fn get_components(&self, component_names: &[&str]) -> Result<Vec<Arc<dyn Component<T>>>> {
        ComponentManager::get_components(self, component_names.iter().copied())
    }
}

impl<T: Payload> Drop for ComponentManager<T> {
    fn drop(&mut self) {
        self.unbind_components();
    }
}

impl<T: Payload> fmt::Debug for ComponentManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<ComponentManager {:?} Components: {:?}>",
            self.name.as_str(),
            self.list_components()
        )
    }
}

/// Guard returned by [`ComponentManager::temporary_component`]
pub struct TemporaryComponent<'a, T: Payload, C: Component<T>> {
    manager: &'a ComponentManager<T>,
    component: Arc<C>,
}

impl<T: Payload, C: Component<T>> TemporaryComponent<'_, T, C> {
    pub fn component(&self) -> &Arc<C> {
        &self.component
    }
}

impl<T: Payload, C: Component<T>> Deref for TemporaryComponent<'_, T, C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.component
    }
}

impl<T: Payload, C: Component<T>> Drop for TemporaryComponent<'_, T, C> {
    fn drop(&mut self) {
        let name = self.component.name();
        if self.manager.component_exists(name) {
            if let Err(err) = self.manager.remove_component(name) {
                warn!("Failed to remove temporary component {}: {}", name, err);
            }
        }
    }
}
