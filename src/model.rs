//! Target/view data model
//!
//! A `Target` is one capture source; its `views` vector is the authoritative
//! owner of every `View` mirroring it. Entities are addressed by stable ids
//! handed out by [`crate::app::App`]; the window registry stores ids, never
//! references, so the graph has a single owner.

use anyhow::{bail, Result};
use x11rb::protocol::damage::Damage;
use x11rb::protocol::xproto::{Gcontext, Window};

use crate::constants::capacity::MAX_DISCONNECTED;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(pub u32);

/// Region of a target's content mirrored by a view, relative to the
/// target's own origin. Width and height never drop below 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRect {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

impl CaptureRect {
    /// Axis-aligned overlap test against a reported damage rectangle.
    pub fn overlaps(&self, dx: i16, dy: i16, dw: u16, dh: u16) -> bool {
        let (dx, dy) = (i32::from(dx), i32::from(dy));
        let (dw, dh) = (i32::from(dw), i32::from(dh));
        let (cx, cy) = (i32::from(self.x), i32::from(self.y));
        let (cw, ch) = (i32::from(self.width), i32::from(self.height));
        !(dx + dw < cx || dx > cx + cw || dy + dh < cy || dy > cy + ch)
    }

    /// Move the lower-right corner by (dw, dh), flooring each dimension at 1.
    pub fn resize_lower_right(&mut self, dw: i16, dh: i16) {
        self.width = add_clamped(self.width, dw);
        self.height = add_clamped(self.height, dh);
    }

    /// Move the upper-left corner by (dx, dy). The origin shifts and the
    /// size compensates, so the lower-right corner stays put; each dimension
    /// floors at 1, limiting how far the corner may travel inward.
    pub fn resize_upper_left(&mut self, dx: i16, dy: i16) {
        let shift_x = i32::from(dx).min(i32::from(self.width) - 1);
        let shift_y = i32::from(dy).min(i32::from(self.height) - 1);
        self.x = (i32::from(self.x) + shift_x) as i16;
        self.y = (i32::from(self.y) + shift_y) as i16;
        self.width = (i32::from(self.width) - shift_x) as u16;
        self.height = (i32::from(self.height) - shift_y) as u16;
    }
}

fn add_clamped(dim: u16, delta: i16) -> u16 {
    (i32::from(dim) + i32::from(delta)).max(1) as u16
}

/// Transient button-3 drag bookkeeping
#[derive(Debug, Default, Clone, Copy)]
pub struct DragState {
    pub dragging: bool,
    /// Press point within the view window; kept as the anchor while moving
    pub offset: (i16, i16),
}

/// One mirror output window
#[derive(Debug)]
pub struct View {
    pub id: ViewId,
    pub target: TargetId,
    pub window: Window,
    /// Depth of `window`; a mirror's pixel format must match its copy source
    pub depth: u8,
    /// Copy context on the source drawable; absent while disconnected
    pub gc: Option<Gcontext>,
    pub cap: CaptureRect,
    /// Current screen placement of the mirror window
    pub pos: (i16, i16),
    pub drag: DragState,
}

/// One capture source
///
/// While connected, `source`, `wm_frame` and `damage` are all present and
/// `source` is registered; while disconnected, all three are absent and the
/// target sits in the disconnected set instead. Never both.
#[derive(Debug)]
pub struct Target {
    pub source: Option<Window>,
    pub wm_frame: Option<Window>,
    /// Stable identity key; survives disconnect/reconnect
    pub name: String,
    pub damage: Option<Damage>,
    pub disconnected: bool,
    pub views: Vec<View>,
}

impl Target {
    pub fn view(&self, id: ViewId) -> Option<&View> {
        self.views.iter().find(|v| v.id == id)
    }

    pub fn view_mut(&mut self, id: ViewId) -> Option<&mut View> {
        self.views.iter_mut().find(|v| v.id == id)
    }
}

/// Targets whose backing window no longer exists, searched by name when a
/// new top-level window appears.
#[derive(Debug, Default)]
pub struct DisconnectedSet {
    members: Vec<TargetId>,
}

impl DisconnectedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: TargetId) -> Result<()> {
        if self.members.len() >= MAX_DISCONNECTED {
            bail!("disconnected set full ({MAX_DISCONNECTED} targets)");
        }
        if self.members.contains(&id) {
            bail!("internal error: target {id:?} already disconnected");
        }
        self.members.push(id);
        Ok(())
    }

    pub fn remove(&mut self, id: TargetId) -> Result<()> {
        match self.members.iter().position(|&m| m == id) {
            Some(ix) => {
                self.members.swap_remove(ix);
                Ok(())
            }
            None => bail!("internal error: target {id:?} not in disconnected set"),
        }
    }

    #[cfg(test)]
    pub fn contains(&self, id: TargetId) -> bool {
        self.members.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.members.iter().copied()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> CaptureRect {
        CaptureRect {
            x: 10,
            y: 20,
            width: 100,
            height: 80,
        }
    }

    #[test]
    fn test_overlap_inside() {
        assert!(rect().overlaps(50, 50, 10, 10));
    }

    #[test]
    fn test_overlap_disjoint() {
        assert!(!rect().overlaps(200, 20, 10, 10));
        assert!(!rect().overlaps(10, 200, 10, 10));
        assert!(!rect().overlaps(-50, 20, 10, 10));
    }

    #[test]
    fn test_overlap_touching_edge_counts() {
        // damage ending exactly on the left edge still triggers a repaint
        assert!(rect().overlaps(0, 20, 10, 10));
        assert!(rect().overlaps(110, 20, 5, 5));
    }

    #[test]
    fn test_resize_lower_right_floors_at_one() {
        let mut r = rect();
        r.resize_lower_right(-500, -500);
        assert_eq!((r.width, r.height), (1, 1));
        assert_eq!((r.x, r.y), (10, 20));
        r.resize_lower_right(8, 8);
        assert_eq!((r.width, r.height), (9, 9));
    }

    #[test]
    fn test_resize_upper_left_keeps_lower_right_fixed() {
        let mut r = rect();
        r.resize_upper_left(8, 8);
        assert_eq!((r.x, r.y), (18, 28));
        assert_eq!((r.width, r.height), (92, 72));
        // lower-right corner unchanged
        assert_eq!(r.x + r.width as i16, 110);
        assert_eq!(r.y + r.height as i16, 100);
    }

    #[test]
    fn test_resize_upper_left_floors_at_one() {
        let mut r = rect();
        r.resize_upper_left(500, 500);
        assert_eq!((r.width, r.height), (1, 1));
        assert_eq!((r.x, r.y), (109, 99));
    }

    #[test]
    fn test_resize_upper_left_grows_outward() {
        let mut r = rect();
        r.resize_upper_left(-8, -8);
        assert_eq!((r.x, r.y), (2, 12));
        assert_eq!((r.width, r.height), (108, 88));
    }

    #[test]
    fn test_repeated_shrink_never_below_floor() {
        let mut r = rect();
        for _ in 0..100 {
            r.resize_lower_right(-8, -8);
            r.resize_upper_left(8, 8);
            assert!(r.width >= 1 && r.height >= 1);
        }
    }

    #[test]
    fn test_disconnected_set_membership() {
        let mut set = DisconnectedSet::new();
        set.add(TargetId(1)).unwrap();
        set.add(TargetId(2)).unwrap();
        assert!(set.contains(TargetId(1)));
        assert!(set.add(TargetId(1)).is_err());
        set.remove(TargetId(1)).unwrap();
        assert!(!set.contains(TargetId(1)));
        assert!(set.remove(TargetId(1)).is_err());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_disconnected_set_capacity() {
        let mut set = DisconnectedSet::new();
        for i in 0..MAX_DISCONNECTED as u32 {
            set.add(TargetId(i)).unwrap();
        }
        assert!(set.add(TargetId(MAX_DISCONNECTED as u32)).is_err());
    }
}
