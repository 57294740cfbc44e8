//! Registered contexts, addressed by generation-checked handles.

use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;
use rill_context::Context;
use rill_core::{Error, Result};

/// Handle to a registered context.
///
/// A handle stays valid until its context is unregistered; the slot may be
/// reused afterwards, but the generation check rejects the old handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextHandle {
    slot: usize,
    generation: u64,
}

#[derive(Debug)]
struct Entry {
    generation: u64,
    name: String,
    context: Option<Context>,
}

/// Slot storage for the contexts of one gnode.
#[derive(Debug, Default)]
pub struct ContextArena {
    entries: Vec<Entry>,
    free: Vec<usize>,
    names: HashMap<String, ContextHandle>,
}

impl ContextArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Stores `context` under a unique `name`.
    pub fn register(&mut self, name: &str, context: Context) -> Result<ContextHandle> {
        if self.names.contains_key(name) {
            return Err(Error::invalid_operation(alloc::format!(
                "context {} is already registered",
                name
            )));
        }
        let handle = match self.free.pop() {
            Some(slot) => {
                let entry = &mut self.entries[slot];
                entry.generation += 1;
                entry.name = String::from(name);
                entry.context = Some(context);
                ContextHandle {
                    slot,
                    generation: entry.generation,
                }
            }
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    name: String::from(name),
                    context: Some(context),
                });
                ContextHandle {
                    slot: self.entries.len() - 1,
                    generation: 0,
                }
            }
        };
        self.names.insert(String::from(name), handle);
        Ok(handle)
    }

    /// Removes a context, returning it.
    pub fn unregister(&mut self, handle: ContextHandle) -> Result<Context> {
        self.check(handle)?;
        let entry = &mut self.entries[handle.slot];
        let context = entry.context.take().ok_or(Error::StaleHandle)?;
        self.names.remove(entry.name.as_str());
        self.free.push(handle.slot);
        Ok(context)
    }

    fn check(&self, handle: ContextHandle) -> Result<()> {
        match self.entries.get(handle.slot) {
            Some(entry) if entry.generation == handle.generation && entry.context.is_some() => {
                Ok(())
            }
            _ => Err(Error::StaleHandle),
        }
    }

    pub fn get(&self, handle: ContextHandle) -> Result<&Context> {
        self.check(handle)?;
        self.entries[handle.slot]
            .context
            .as_ref()
            .ok_or(Error::StaleHandle)
    }

    pub fn get_mut(&mut self, handle: ContextHandle) -> Result<&mut Context> {
        self.check(handle)?;
        self.entries[handle.slot]
            .context
            .as_mut()
            .ok_or(Error::StaleHandle)
    }

    pub fn find(&self, name: &str) -> Option<ContextHandle> {
        self.names.get(name).copied()
    }

    pub fn name_of(&self, handle: ContextHandle) -> Result<&str> {
        self.check(handle)?;
        Ok(self.entries[handle.slot].name.as_str())
    }

    /// Live contexts in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Context> + '_ {
        self.entries.iter_mut().filter_map(|e| e.context.as_mut())
    }
}
