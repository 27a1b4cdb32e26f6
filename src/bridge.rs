//! Sample embedding bridge
//!
//! A render loop owns an `EntityBridge`, registers it as the host type
//! `game.Bridge`, and lets scripts queue entity spawns and removals:
//!
//! ```lisp
//! (host-call "game.Bridge" "addEntityAt" "models/crate.g3db" 0 1.5 -2)
//! (host-call "game.Bridge" "removeEntity" "models/crate.g3db")
//! ```
//!
//! Once per frame the loop drains both queues, either directly with
//! [`EntityBridge::drain_spawns`] or by evaluating `(drain-spawns)` from
//! [`DEFINITIONS`] and reading the result with [`drained_spawns`]. Scripts
//! and the loop may run on different threads.
use crate::{
    core::Error,
    host::{number, text, HostBindings, HostType},
    value::{HostObject, Value},
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Script helpers over `game.Bridge`, meant to be evaluated once per session
pub const DEFINITIONS: &str = r#"
(def (add-at path x y z) (host-call "game.Bridge" "addEntityAt" path x y z))
(def (add path) (add-at path 0 0 0))
(def (rem path) (host-call "game.Bridge" "removeEntity" path))
(def (drain-spawns) (host-call "game.Bridge" "drainSpawns"))
(def (drain-removals) (host-call "game.Bridge" "drainRemovals"))
"#;

/// Host type of the value `drainSpawns` returns
pub const SPAWN_LIST: &str = "game.SpawnList";

/// Host type of the value `drainRemovals` returns
pub const REMOVAL_LIST: &str = "game.RemovalList";

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub path: String,
    pub position: [f32; 3],
}

#[derive(Debug, Default)]
pub struct EntityBridge {
    spawns: Mutex<Vec<SpawnRequest>>,
    removals: Mutex<Vec<String>>,
}

impl EntityBridge {
    pub fn new() -> Arc<Self> {
        Default::default()
    }

    pub fn add_entity_at(&self, path: &str, x: f64, y: f64, z: f64) {
        let position = [x as f32, y as f32, z as f32];
        self.spawns.lock().push(SpawnRequest { path: path.to_string(), position });
    }

    pub fn remove_entity(&self, path: &str) {
        self.removals.lock().push(path.to_string());
    }

    /// Take every pending spawn request
    pub fn drain_spawns(&self) -> Vec<SpawnRequest> {
        std::mem::take(&mut *self.spawns.lock())
    }

    /// Take every pending removal
    pub fn drain_removals(&self) -> Vec<String> {
        std::mem::take(&mut *self.removals.lock())
    }

    /// Expose the bridge to scripts as `game.Bridge`
    pub fn register(self: &Arc<Self>, host: &mut HostBindings) {
        let spawn = Arc::clone(self);
        let remove = Arc::clone(self);
        let spawns = Arc::clone(self);
        let removals = Arc::clone(self);

        host.register(
            "game.Bridge",
            HostType::new()
                .function("addEntityAt", 4, move |args| -> Result<(), Error> {
                    let path = text(args, 0, "addEntityAt")?;
                    let x = number(args, 1, "addEntityAt")?;
                    let y = number(args, 2, "addEntityAt")?;
                    let z = number(args, 3, "addEntityAt")?;
                    spawn.add_entity_at(&path, x, y, z);
                    Ok(())
                })
                .function("removeEntity", 1, move |args| -> Result<(), Error> {
                    remove.remove_entity(&text(args, 0, "removeEntity")?);
                    Ok(())
                })
                .function("drainSpawns", 0, move |_| {
                    Ok(HostObject::new(SPAWN_LIST, spawns.drain_spawns()))
                })
                .function("drainRemovals", 0, move |_| {
                    Ok(HostObject::new(REMOVAL_LIST, removals.drain_removals()))
                }),
        );
    }
}

/// Spawn requests in a value returned by `drainSpawns`
pub fn drained_spawns(value: &Value) -> Option<&[SpawnRequest]> {
    match value {
        Value::Host(h) if h.type_name() == SPAWN_LIST => {
            h.downcast_ref::<Vec<SpawnRequest>>().map(Vec::as_slice)
        }
        _ => None,
    }
}

/// Paths in a value returned by `drainRemovals`
pub fn drained_removals(value: &Value) -> Option<&[String]> {
    match value {
        Value::Host(h) if h.type_name() == REMOVAL_LIST => {
            h.downcast_ref::<Vec<String>>().map(Vec::as_slice)
        }
        _ => None,
    }
}
