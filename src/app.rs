//! Mutable program state
//!
//! Everything lives here, owned by `main` and passed `&mut` into the event
//! handlers. Single-threaded; the registry and the target table are only
//! ever touched between two turns of the blocking event loop.

use anyhow::{bail, Result};
use std::collections::HashMap;
use x11rb::protocol::xproto::{Gcontext, Window};

use crate::model::{DisconnectedSet, Target, TargetId, ViewId};
use crate::persistence::StateFile;
use crate::registry::Registry;
use crate::selector::Selector;
use crate::x11_utils::AppContext;

/// The control window and its chrome-drawing context
pub struct TopWindow {
    pub window: Window,
    pub gc: Gcontext,
}

pub struct App<'a> {
    pub ctx: AppContext<'a>,
    pub top: TopWindow,
    pub registry: Registry,
    pub targets: HashMap<TargetId, Target>,
    pub disconnected: DisconnectedSet,
    pub selector: Selector,
    pub store: StateFile,
    next_target: u32,
    next_view: u32,
}

impl<'a> App<'a> {
    pub fn new(ctx: AppContext<'a>, top: TopWindow, store: StateFile) -> Self {
        Self {
            ctx,
            top,
            registry: Registry::new(),
            targets: HashMap::new(),
            disconnected: DisconnectedSet::new(),
            selector: Selector::new(),
            store,
            next_target: 0,
            next_view: 0,
        }
    }

    /// Ids are never reused within a process lifetime.
    pub fn alloc_target_id(&mut self) -> TargetId {
        self.next_target += 1;
        TargetId(self.next_target)
    }

    pub fn alloc_view_id(&mut self) -> ViewId {
        self.next_view += 1;
        ViewId(self.next_view)
    }

    /// A dangling id means the entity graph is corrupt.
    pub fn target(&self, id: TargetId) -> Result<&Target> {
        match self.targets.get(&id) {
            Some(t) => Ok(t),
            None => bail!("internal error: no target with id {id:?}"),
        }
    }

    pub fn target_mut(&mut self, id: TargetId) -> Result<&mut Target> {
        match self.targets.get_mut(&id) {
            Some(t) => Ok(t),
            None => bail!("internal error: no target with id {id:?}"),
        }
    }
}
