//!
//! Thread-Local Storage Keys
//!
//! A `TlsKey` names one per-thread slot. Every thread sees its own value
//! under the same key; a thread that never set one reads `None`.
//!
//! Keys come from a bounded process-wide table of `TLS_MAX_KEYS` slots, so
//! `create` can run out. Deleting a key returns its slot for reuse. Each
//! slot carries a generation number, bumped on every `create`, and values
//! are tagged with the generation they were written under: a value stored
//! through a deleted key is never visible through the key that later
//! reuses its slot.
//!
//! Usage:
//! ```rust,ignore
//! let key = TlsKey::create()?;
//! key.set(42u64);
//! assert_eq!(key.get::<u64>(), Some(42));
//! key.delete();
//! ```
//!

use std::any::Any;
use std::cell::RefCell;
use std::mem;

use parking_lot::Mutex;
use tandem_core::{SyncError, SyncResult, fatal};

/// Number of keys that can be live at once.
pub const TLS_MAX_KEYS: usize = 1088;

struct SlotInfo {
    generation: u64,
    live: bool,
}

struct KeyTable {
    slots: Vec<SlotInfo>,
    free: Vec<usize>,
}

impl KeyTable {
    const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    fn allocate(&mut self) -> SyncResult<TlsKey> {
        let index = match self.free.pop() {
            Some(index) => index,
            None if self.slots.len() < TLS_MAX_KEYS => {
                self.slots.push(SlotInfo {
                    generation: 0,
                    live: false,
                });
                self.slots.len() - 1
            }
            None => return Err(SyncError::OutOfMemory),
        };

        let slot = &mut self.slots[index];
        slot.generation += 1;
        slot.live = true;

        Ok(TlsKey {
            index,
            generation: slot.generation,
        })
    }

    /// Returns `false` if `key` was not live.
    fn release(&mut self, key: TlsKey) -> bool {
        if !self.is_live(key) {
            return false;
        }
        self.slots[key.index].live = false;
        self.free.push(key.index);
        true
    }

    fn is_live(&self, key: TlsKey) -> bool {
        self.slots
            .get(key.index)
            .is_some_and(|slot| slot.live && slot.generation == key.generation)
    }
}

static TABLE: Mutex<KeyTable> = Mutex::new(KeyTable::new());

type Value = (u64, Box<dyn Any>);

thread_local! {
    static VALUES: RefCell<Vec<Option<Value>>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TlsKey {
    index: usize,
    generation: u64,
}

impl TlsKey {
    /// Allocate a key. Fails with `OutOfMemory` once every slot is live.
    pub fn create() -> SyncResult<TlsKey> {
        TABLE.lock().allocate()
    }

    /// Release the key's slot. Values other threads stored under it become
    /// unreachable and are dropped when those threads exit or the slot is
    /// overwritten.
    pub fn delete(self) {
        if !TABLE.lock().release(self) {
            fatal("tls key delete", "key is not live");
        }
    }

    pub fn is_live(&self) -> bool {
        TABLE.lock().is_live(*self)
    }

    /// This thread's value, if it stored one of type `T` under this key.
    pub fn get<T: Clone + 'static>(&self) -> Option<T> {
        if !self.is_live() {
            return None;
        }
        self.stored()
    }

    /// The value this thread wrote under this key's slot and generation.
    fn stored<T: Clone + 'static>(&self) -> Option<T> {
        VALUES
            .try_with(|values| {
                let values = values.borrow();
                match values.get(self.index) {
                    Some(Some((generation, value))) if *generation == self.generation => {
                        value.downcast_ref::<T>().cloned()
                    }
                    _ => None,
                }
            })
            .ok()
            .flatten()
    }

    /// Store this thread's value under the key.
    pub fn set<T: 'static>(&self, value: T) {
        self.replace(Some((self.generation, Box::new(value))));
    }

    /// Remove this thread's value, if any.
    pub fn clear(&self) {
        self.replace(None);
    }

    fn replace(&self, value: Option<Value>) {
        if !self.is_live() {
            fatal("tls key set", "key is not live");
        }
        let previous = VALUES.try_with(|values| {
            let mut values = values.borrow_mut();
            if values.len() <= self.index {
                values.resize_with(self.index + 1, || None);
            }
            mem::replace(&mut values[self.index], value)
        });

        match previous {
            // Dropped outside the borrow; a destructor may touch TLS itself.
            Ok(previous) => drop(previous),
            Err(_) => fatal("tls key set", "thread-local storage is being torn down"),
        }
    }
}
