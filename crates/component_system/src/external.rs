//! Manager that raises events into a caller-owned scope

use crate::component::ComponentName;
use crate::config::ManagerConfig;
use crate::event::{Event, Payload};
use crate::manager::{ComponentManager, RaiseMode};
use crate::scope::Scope;
use crate::Result;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A [`ComponentManager`] embedded in a larger concurrent host loop
///
/// `raise_event` schedules handler tasks into the scope supplied at
/// construction and returns as soon as scheduling is done. The owner of that
/// scope decides when (and whether) to wait for them. Events bubbling up into
/// this manager from nested managers use the same external scope.
pub struct ExternalRaiseManager<T: Payload> {
    manager: Arc<ComponentManager<T>>,
    scope: Scope,
}

impl<T: Payload> ExternalRaiseManager<T> {
    pub fn new(name: impl Into<ComponentName>, scope: Scope) -> Self {
        Self::with_config(name, scope, ManagerConfig::default())
    }

    /// Create the manager and list it as a component named `own_name`
    pub fn with_alias(
        name: impl Into<ComponentName>,
        scope: Scope,
        own_name: impl Into<ComponentName>,
    ) -> Self {
        Self::with_config(name, scope, ManagerConfig::default().with_own_name(own_name))
    }

    pub fn with_config(
        name: impl Into<ComponentName>,
        scope: Scope,
        config: ManagerConfig,
    ) -> Self {
        let mode = RaiseMode::External(scope.clone());
        Self {
            manager: ComponentManager::build(name.into(), config, mode),
            scope,
        }
    }

    /// Shared handle to the underlying manager, e.g. to nest it in another manager
    pub fn manager_handle(&self) -> Arc<ComponentManager<T>> {
        Arc::clone(&self.manager)
    }

    /// The caller-owned scope events are raised into
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Schedule the event's handlers in the external scope without waiting for them
    pub async fn raise_event(&self, event: Arc<Event<T>>) -> Result<()> {
        self.manager.raise_event_in_scope(event, &self.scope).await
    }

    /// Raise the event in a private scope and wait for every handler
    pub async fn raise_event_internal(&self, event: Arc<Event<T>>) -> Result<()> {
        self.manager.raise_event_internal(event).await
    }
}

impl<T: Payload> Deref for ExternalRaiseManager<T> {
    type Target = ComponentManager<T>;

    fn deref(&self) -> &ComponentManager<T> {
        &self.manager
    }
}

impl<T: Payload> fmt::Debug for ExternalRaiseManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalRaiseManager")
            .field("manager", &self.manager)
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{BasicComponent, Component};
    use crate::event::Handler;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn gated_handler(gate: Arc<Notify>, called: Arc<AtomicBool>) -> Handler<()> {
        Handler::named("bean", move |event: Arc<Event<()>>| {
            let gate = Arc::clone(&gate);
            let called = Arc::clone(&called);
            async move {
                assert_eq!(event.name(), "bean_event");
                gate.notified().await;
                called.store(true, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn raise_event_schedules_into_external_scope() {
        let scope = Scope::new();
        let gate = Arc::new(Notify::new());
        let called = Arc::new(AtomicBool::new(false));

        let manager = ExternalRaiseManager::new("manager", scope.clone());
        manager.register_handler(
            "bean_event",
            gated_handler(Arc::clone(&gate), Arc::clone(&called)),
        );

        manager.raise_event(Event::shared("bean_event", (), 0)).await.unwrap();

        // returned while the handler is still parked in the external scope
        assert!(!called.load(Ordering::SeqCst));
        assert_eq!(scope.live_tasks(), 1);

        gate.notify_one();
        scope.join().await.unwrap();
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn raise_event_internal_waits_and_leaves_external_scope_alone() {
        let scope = Scope::new();
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);

        let manager = ExternalRaiseManager::with_alias("manager", scope.clone(), "self");
        manager.register_handler(
            "bean_event",
            Handler::new(move |_event: Arc<Event<()>>| {
                let flag = Arc::clone(&flag);
                async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        manager.raise_event_internal(Event::shared("bean_event", (), 0)).await.unwrap();
        assert!(called.load(Ordering::SeqCst));
        assert_eq!(scope.live_tasks(), 0);
        assert!(manager.component_exists("self"));
    }

    #[tokio::test]
    async fn bubbling_into_external_parent_uses_its_scope() {
        let scope = Scope::new();
        let gate = Arc::new(Notify::new());
        let called = Arc::new(AtomicBool::new(false));

        let root = ExternalRaiseManager::new("root", scope.clone());
        let child = ComponentManager::<()>::new("child");
        root.add_component(child.clone()).unwrap();
        root.register_handler("bean_event", gated_handler(Arc::clone(&gate), Arc::clone(&called)));

        // the child's own scope only sees the climb, so this returns early
        child.raise_event(Event::shared("bean_event", (), 1)).await.unwrap();
        assert!(!called.load(Ordering::SeqCst));

        gate.notify_one();
        scope.join().await.unwrap();
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn scope_accessor_shares_the_callers_scope() {
        let scope = Scope::new();
        let manager = ExternalRaiseManager::<()>::new("manager", scope.clone());
        scope.cancel();
        assert!(manager.scope().is_cancelled());
        assert!(format!("{manager:?}").contains("cancelled: true"));
    }

    #[tokio::test]
    async fn external_manager_nests_through_its_handle() {
        let scope = Scope::new();
        let outer = ComponentManager::<()>::new("outer");
        let inner = ExternalRaiseManager::new("inner", scope);
        outer.add_component(inner.manager_handle()).unwrap();

        let leaf = BasicComponent::<()>::shared("leaf");
        inner.add_component(leaf.clone()).unwrap();
        assert!(leaf.manager_exists());
        assert!(inner.manager_exists());
        assert_eq!(outer.list_components(), vec![ComponentName::from("inner")]);
    }
}
