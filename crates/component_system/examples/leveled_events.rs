//! Leveled events in a small game-like component tree
//!
//! Builds `game -> world -> cat` under an external scope, then shows how an
//! event's level decides which part of the tree hears it.

use component_system::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Cat that reports its moves and listens for the world ticking
struct Cat {
    name: ComponentName,
    binding: Binding<Value>,
}

impl Cat {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            name: "cat".into(),
            binding: Binding::new(),
        })
    }
}

impl Component<Value> for Cat {
    fn name(&self) -> &ComponentName {
        &self.name
    }

    fn binding(&self) -> &Binding<Value> {
        &self.binding
    }

    fn bind_handlers(&self) -> Result<()> {
        self.register_handler(
            "tick",
            Handler::named("cat_tick", |event: Arc<Event<Value>>| async move {
                info!("🐈 cat saw tick {}", event.data());
                Ok(())
            }),
        )
    }
}

fn announce(tag: &'static str) -> Handler<Value> {
    Handler::named(tag, move |event: Arc<Event<Value>>| async move {
        info!("📣 {} heard {:?}", tag, event);
        Ok(())
    })
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = ComponentSystemConfig::from_toml_str(
        r#"
        [logging]
        level = "debug"

        [manager]
        quiet_events = ["tick"]
        "#,
    )?;
    setup_logging(&config.logging, false)?;
    info!("🚀 component_system v{}", COMPONENT_SYSTEM_VERSION);

    let scope = Scope::new();
    let game =
        ExternalRaiseManager::<Value>::with_config("game", scope.clone(), config.manager.clone());
    let world = DefaultManager::with_config("world", config.manager.clone());
    let cat = Cat::new();

    game.add_component(world.clone())?;
    world.add_component(cat.clone())?;

    game.register_handler("cat_moved", announce("game"));
    world.register_handler("cat_moved", announce("world"));

    // level 0: only the world subtree hears it
    cat.raise_event(Event::shared("cat_moved", json!([3, 3]), 0)).await?;

    // level 1: climbs to the game, which schedules into the host scope
    cat.raise_event(Event::shared("cat_moved", json!([4, 3]), 1)).await?;
    info!("⏳ {} task(s) pending in the host scope", scope.live_tasks());

    for frame in 0..3 {
        game.raise_event(Event::shared("tick", json!(frame), 0)).await?;
    }

    scope.join().await?;
    info!("✅ All handlers finished, game tree: {:?}", *game);
    Ok(())
}
