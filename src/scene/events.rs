//! Scene diff submission from other threads
//!
//! Producers hold a cloned [`SceneDiffSender`] and push events whenever an
//! entity appears, changes or disappears. The scheduler drains everything
//! queued once per frame, so a change always lands one frame later.

use crossbeam_channel::{Receiver, Sender, TrySendError, unbounded};

use super::entity::SceneEntity;
use crate::core::EntityId;

#[derive(Clone, Debug)]
pub enum SceneEvent {
    Added(SceneEntity),
    Removed(EntityId),
}

/// Cloneable producer handle.
#[derive(Clone)]
pub struct SceneDiffSender {
    tx: Sender<SceneEvent>,
}

impl SceneDiffSender {
    pub fn add(&self, entity: SceneEntity) -> bool {
        self.send(SceneEvent::Added(entity))
    }

    pub fn remove(&self, id: EntityId) -> bool {
        self.send(SceneEvent::Removed(id))
    }

    /// Re-submits an entity whose properties changed.
    pub fn update(&self, entity: SceneEntity) -> bool {
        self.remove(entity.id) && self.add(entity)
    }

    fn send(&self, event: SceneEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Disconnected(_)) | Err(TrySendError::Full(_)) => {
                tracing::warn!("Scene diff queue closed, dropping event");
                false
            }
        }
    }
}

pub struct SceneDiffQueue {
    tx: Sender<SceneEvent>,
    rx: Receiver<SceneEvent>,
}

impl SceneDiffQueue {
    pub fn new() -> Self {
        // Unbounded: dropping a removal would leak its object slot.
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> SceneDiffSender {
        SceneDiffSender {
            tx: self.tx.clone(),
        }
    }

    /// Everything queued so far, in submission order.
    pub fn drain(&self) -> Vec<SceneEvent> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for SceneDiffQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Aabb;
    use glam::{Mat4, Vec3};
    use std::thread;

    #[test]
    fn test_drain_preserves_order_across_threads() {
        let queue = SceneDiffQueue::new();
        let sender = queue.sender();
        let handle = thread::spawn(move || {
            let entity = SceneEntity::new(
                EntityId(3),
                Vec::new(),
                Aabb::new(Vec3::ZERO, Vec3::ONE),
                Mat4::IDENTITY,
            );
            assert!(sender.add(entity));
            assert!(sender.remove(EntityId(3)));
        });
        handle.join().unwrap();

        let events = queue.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SceneEvent::Added(ref e) if e.id == EntityId(3)));
        assert!(matches!(events[1], SceneEvent::Removed(EntityId(3))));
        assert!(queue.is_empty());
    }
}
