//!
//! Ready Ring
//!
//! Bounded circular buffer of runnable tasks. Only the owning scheduler
//! thread touches it, so it needs no synchronization. The read and write
//! indices only ever grow; the slot is the index modulo the capacity.
//!

use super::task::TaskId;

pub struct ReadyRing {
    slots: Box<[Option<TaskId>]>,
    read_index: u64,
    write_index: u64,
}

impl ReadyRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)].into_boxed_slice(),
            read_index: 0,
            write_index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        (self.write_index - self.read_index) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.read_index == self.write_index
    }

    /// Append `task`, handing it back if the ring is full.
    pub fn push(&mut self, task: TaskId) -> Result<(), TaskId> {
        if self.len() == self.capacity() {
            return Err(task);
        }
        let slot = (self.write_index % self.slots.len() as u64) as usize;
        self.slots[slot] = Some(task);
        self.write_index += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<TaskId> {
        if self.is_empty() {
            return None;
        }
        let slot = (self.read_index % self.slots.len() as u64) as usize;
        self.read_index += 1;
        self.slots[slot].take()
    }
}
