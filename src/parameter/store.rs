//! ParameterStore - ordered registry of parameter entries
//!
//! Entries are matched in registration order (first match wins). When no
//! entry matches, the default handlers may auto-create an entry for the
//! unknown address so the device never ignores an address the host invents.

use std::collections::HashMap;

use tracing::debug;

use super::entry::{Outbound, ParameterEntry, ParseContext};
use super::key::{KeyId, ParameterKey};
use super::value::ParameterValue;
use crate::error::ParameterError;
use crate::midi::{function, Message};

/// Stable index of an entry inside its store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle(usize);

/// Fallback that creates entries for unknown addresses, one per value shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultHandler {
    /// NRPN set/request frames for numeric values
    Numeric { request: u8, set: u8 },
    /// NRPN set/request frames for string values
    Text { request: u8, set: u8 },
    /// Control changes on any controller
    ControlChange,
}

impl DefaultHandler {
    /// Handlers for the device's standard function codes
    pub fn standard() -> Vec<DefaultHandler> {
        vec![
            DefaultHandler::Numeric {
                request: function::REQUEST_SINGLE_PARAMETER,
                set: function::SINGLE_PARAMETER,
            },
            DefaultHandler::Text {
                request: function::REQUEST_STRING_PARAMETER,
                set: function::STRING_PARAMETER,
            },
            DefaultHandler::ControlChange,
        ]
    }

    /// Build a fresh entry for `message` if it has this handler's shape
    pub fn create(&self, message: &Message) -> Option<ParameterEntry> {
        match (self, message) {
            (
                DefaultHandler::Numeric { request, set },
                Message::Sysex {
                    function,
                    address_hi,
                    address_lo,
                    ..
                },
            ) if function == request || function == set => Some(
                ParameterEntry::numeric(*address_hi, *address_lo)
                    .with_functions(*request, *set, *set),
            ),
            (
                DefaultHandler::Text { request, set },
                Message::Sysex {
                    function,
                    address_hi,
                    address_lo,
                    ..
                },
            ) if function == request || function == set => Some(
                ParameterEntry::text(*address_hi, *address_lo).with_functions(*request, *set, *set),
            ),
            (DefaultHandler::ControlChange, Message::ControlChange { controller, .. }) => {
                Some(ParameterEntry::cc(*controller))
            }
            _ => None,
        }
    }
}

/// Result of dispatching one message to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A registered entry consumed the message
    Matched(EntryHandle),
    /// A default handler created a new entry which consumed the message
    Created(EntryHandle),
    /// Nothing consumed the message
    Unmatched,
}

impl Dispatch {
    pub fn handle(&self) -> Option<EntryHandle> {
        match self {
            Dispatch::Matched(h) | Dispatch::Created(h) => Some(*h),
            Dispatch::Unmatched => None,
        }
    }
}

/// Registry of parameter entries by canonical key id
#[derive(Debug, Clone)]
pub struct ParameterStore {
    entries: Vec<ParameterEntry>,
    index: HashMap<KeyId, EntryHandle>,
    defaults: Vec<DefaultHandler>,
}

impl ParameterStore {
    /// Create an empty store with the standard default handlers
    pub fn new() -> Self {
        Self::with_defaults(DefaultHandler::standard())
    }

    pub fn with_defaults(defaults: Vec<DefaultHandler>) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            defaults,
        }
    }

    /// Register an entry
    ///
    /// Fails with `DuplicateKey` if any of its key ids is already taken.
    pub fn init(&mut self, entry: ParameterEntry) -> Result<EntryHandle, ParameterError> {
        let ids = entry.ids();
        if let Some(id) = ids.iter().find(|id| self.index.contains_key(id)) {
            return Err(ParameterError::DuplicateKey(*id));
        }

        let handle = EntryHandle(self.entries.len());
        for id in ids {
            self.index.insert(id, handle);
        }
        debug!("Registered parameter {} ({})", entry.display_name(), entry.id());
        self.entries.push(entry);
        Ok(handle)
    }

    /// Handle of the entry for `key`, auto-creating it with value 0
    pub fn get(&mut self, key: &ParameterKey) -> EntryHandle {
        if let Some(handle) = self.index.get(&key.id()) {
            return *handle;
        }
        let handle = EntryHandle(self.entries.len());
        self.index.insert(key.id(), handle);
        self.entries.push(ParameterEntry::for_key(*key));
        debug!("Auto-created parameter {}", key.display_name());
        handle
    }

    pub fn find(&self, id: KeyId) -> Option<EntryHandle> {
        self.index.get(&id).copied()
    }

    pub fn find_by_name(&self, name: &str) -> Option<EntryHandle> {
        self.entries
            .iter()
            .position(|e| e.name().is_some_and(|n| n.eq_ignore_ascii_case(name)))
            .map(EntryHandle)
    }

    pub fn entry(&self, handle: EntryHandle) -> &ParameterEntry {
        &self.entries[handle.0]
    }

    pub fn entry_mut(&mut self, handle: EntryHandle) -> &mut ParameterEntry {
        &mut self.entries[handle.0]
    }

    pub fn value(&self, handle: EntryHandle) -> &ParameterValue {
        self.entries[handle.0].value()
    }

    pub fn set_value(&mut self, handle: EntryHandle, value: impl Into<ParameterValue>) {
        self.entries[handle.0].set_value(value);
    }

    /// Entries in registration order
    pub fn iter(&self) -> impl Iterator<Item = (EntryHandle, &ParameterEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (EntryHandle(i), e))
    }

    /// Entries tagged with `set`, in registration order
    pub fn entries_in_set(&self, set: u8) -> impl Iterator<Item = &ParameterEntry> {
        self.entries.iter().filter(move |e| e.in_set(set))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry. Handles from before the call become invalid.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Dispatch an inbound message: entries first, then default handlers
    pub fn parse(
        &mut self,
        message: &Message,
        ctx: &ParseContext,
        out: &mut Outbound,
    ) -> Result<Dispatch, ParameterError> {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if entry.parse(message, ctx, out)? {
                return Ok(Dispatch::Matched(EntryHandle(i)));
            }
        }

        let defaults = self.defaults.clone();
        for handler in &defaults {
            let Some(entry) = handler.create(message) else {
                continue;
            };
            // Address already owned by an entry of another shape
            if entry.ids().iter().any(|id| self.index.contains_key(id)) {
                continue;
            }

            let mut entry = entry;
            if !entry.parse(message, ctx, out)? {
                continue;
            }
            debug!(
                "Default handler created {} = {}",
                entry.display_name(),
                entry.value()
            );
            let handle = self.init(entry)?;
            return Ok(Dispatch::Created(handle));
        }

        Ok(Dispatch::Unmatched)
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}
