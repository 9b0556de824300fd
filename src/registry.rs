//! Window registry
//!
//! Maps every window handle the server may deliver events for to the entity
//! that owns it. The registry is the sole routing authority: an entry must
//! be removed before the server can reuse the handle, or events get
//! misrouted. There is no implicit eviction.

use anyhow::{bail, Result};
use std::collections::HashMap;
use x11rb::protocol::xproto::Window;

use crate::constants::capacity::MAX_WINDOWS;
use crate::model::{TargetId, ViewId};

/// Which entity a registered window belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// The control window (and, while selecting, the root)
    Top,
    View { target: TargetId, view: ViewId },
    Target(TargetId),
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<Window, WindowKind>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duplicate handles and exceeding capacity are internal errors; the
    /// map is left untouched when either fault fires.
    pub fn register(&mut self, window: Window, kind: WindowKind) -> Result<()> {
        if self.entries.len() >= MAX_WINDOWS {
            bail!("window registry full ({MAX_WINDOWS} entries)");
        }
        if self.entries.contains_key(&window) {
            bail!("internal error: window {window:#x} registered twice");
        }
        self.entries.insert(window, kind);
        Ok(())
    }

    /// Removing a handle that was never registered is an internal error.
    pub fn unregister(&mut self, window: Window) -> Result<WindowKind> {
        match self.entries.remove(&window) {
            Some(kind) => Ok(kind),
            None => bail!("internal error: window {window:#x} not registered"),
        }
    }

    pub fn lookup(&self, window: Window) -> Option<WindowKind> {
        self.entries.get(&window).copied()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_lookup_unregister() {
        let mut reg = Registry::new();
        reg.register(0x42, WindowKind::Top).unwrap();
        assert_eq!(reg.lookup(0x42), Some(WindowKind::Top));
        assert_eq!(reg.lookup(0x43), None);
        assert_eq!(reg.unregister(0x42).unwrap(), WindowKind::Top);
        assert_eq!(reg.lookup(0x42), None);
    }

    #[test]
    fn test_duplicate_register_is_fault() {
        let mut reg = Registry::new();
        reg.register(7, WindowKind::Target(TargetId(1))).unwrap();
        assert!(reg.register(7, WindowKind::Top).is_err());
    }

    #[test]
    fn test_failed_duplicate_register_keeps_old_entry() {
        let mut reg = Registry::new();
        reg.register(7, WindowKind::Target(TargetId(1))).unwrap();
        assert!(reg.register(7, WindowKind::Top).is_err());
        assert_eq!(reg.lookup(7), Some(WindowKind::Target(TargetId(1))));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_unregister_absent_is_fault() {
        let mut reg = Registry::new();
        assert!(reg.unregister(9).is_err());
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut reg = Registry::new();
        for w in 0..MAX_WINDOWS as Window {
            reg.register(w, WindowKind::Top).unwrap();
        }
        assert!(reg.register(MAX_WINDOWS as Window, WindowKind::Top).is_err());
    }

    #[test]
    fn test_handle_maps_to_one_entity() {
        let mut reg = Registry::new();
        let kind = WindowKind::View {
            target: TargetId(3),
            view: ViewId(5),
        };
        reg.register(11, kind).unwrap();
        reg.register(12, WindowKind::Target(TargetId(3))).unwrap();
        assert_eq!(reg.lookup(11), Some(kind));
        assert_eq!(reg.len(), 2);
    }
}
