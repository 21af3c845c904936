//! Physics seam

use std::collections::BTreeMap;

use crate::ws::protocol::BodyRecord;

use super::pieces::nominal_radius;

/// World-local body handle
pub type BodyHandle = u32;

/// The parts of a physics engine the replica drives.
///
/// Static bodies (walls, floor) are never touched through this trait.
pub trait PhysicsWorld {
    /// Add a held piece at the spawn point. It does not simulate until released.
    fn spawn_piece(&mut self, type_index: u8, x: f32, y: f32) -> BodyHandle;

    fn set_position(&mut self, body: BodyHandle, x: f32, y: f32);

    /// Let a held piece fall
    fn release(&mut self, body: BodyHandle);

    /// Rebuild a body from a snapshot record
    fn insert(&mut self, record: &BodyRecord) -> BodyHandle;

    fn remove(&mut self, body: BodyHandle);

    /// Remove every dynamic body except `keep`
    fn clear_dynamic(&mut self, keep: Option<BodyHandle>);

    /// Dynamic bodies except `exclude`, ids set to their handles
    fn dynamic_bodies(&self, exclude: Option<BodyHandle>) -> Vec<BodyRecord>;
}

/// Bookkeeping-only world, no simulation. Used by headless observers and tests.
#[derive(Debug, Clone, Default)]
pub struct InertWorld {
    bodies: BTreeMap<BodyHandle, BodyRecord>,
    next_handle: BodyHandle,
}

impl InertWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&BodyRecord> {
        self.bodies.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    fn allocate(&mut self) -> BodyHandle {
        self.next_handle = self.next_handle.wrapping_add(1);
        self.next_handle
    }
}

impl PhysicsWorld for InertWorld {
    fn spawn_piece(&mut self, type_index: u8, x: f32, y: f32) -> BodyHandle {
        let handle = self.allocate();
        self.bodies.insert(
            handle,
            BodyRecord {
                id: handle,
                x,
                y,
                angle: 0.0,
                velocity_x: 0.0,
                velocity_y: 0.0,
                angular_velocity: 0.0,
                type_index,
                radius: nominal_radius(type_index),
                is_sleeping: true,
            },
        );
        handle
    }

    fn set_position(&mut self, body: BodyHandle, x: f32, y: f32) {
        if let Some(record) = self.bodies.get_mut(&body) {
            record.x = x;
            record.y = y;
        }
    }

    fn release(&mut self, body: BodyHandle) {
        if let Some(record) = self.bodies.get_mut(&body) {
            record.is_sleeping = false;
        }
    }

    fn insert(&mut self, record: &BodyRecord) -> BodyHandle {
        let handle = self.allocate();
        self.bodies.insert(handle, BodyRecord { id: handle, ..*record });
        handle
    }

    fn remove(&mut self, body: BodyHandle) {
        self.bodies.remove(&body);
    }

    fn clear_dynamic(&mut self, keep: Option<BodyHandle>) {
        self.bodies.retain(|handle, _| Some(*handle) == keep);
    }

    fn dynamic_bodies(&self, exclude: Option<BodyHandle>) -> Vec<BodyRecord> {
        self.bodies
            .iter()
            .filter(|(handle, _)| Some(**handle) != exclude)
            .map(|(_, record)| *record)
            .collect()
    }
}
