//! Rectangle-selection state machine
//!
//! Drives the click-plus, pick-a-window, drag-a-rectangle workflow on the
//! control window. While `Selecting` the pointer is grabbed synchronously
//! against the root, so every processed event must end with an explicit
//! allow-events acknowledgment or pointer delivery stalls.

use anyhow::{bail, Result};
use tracing::{debug, info};
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;
use x11rb::CURRENT_TIME;

use crate::app::App;
use crate::constants::mouse;
use crate::lifecycle;
use crate::persistence;
use crate::x11_utils::{crosshair_cursor, find_wm_window, raise_window, window_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorMode {
    Idle,
    ArmedForPick,
    Selecting,
}

/// Window picked at the first corner press
#[derive(Debug)]
struct Pick {
    source: Window,
    frame: Window,
    name: String,
}

/// Screen-space selection rectangle, normalized so corner 1 <= corner 2
/// on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub x1: i16,
    pub y1: i16,
    pub x2: i16,
    pub y2: i16,
}

impl Selection {
    pub fn normalized(corner1: (i16, i16), corner2: (i16, i16)) -> Self {
        let (mut x1, mut y1) = corner1;
        let (mut x2, mut y2) = corner2;
        if x2 < x1 {
            std::mem::swap(&mut x1, &mut x2);
        }
        if y2 < y1 {
            std::mem::swap(&mut y1, &mut y2);
        }
        Self { x1, y1, x2, y2 }
    }
}

#[derive(Debug)]
pub struct Selector {
    mode: SelectorMode,
    pick: Option<Pick>,
    corner1: (i16, i16),
}

impl Selector {
    pub fn new() -> Self {
        Self {
            mode: SelectorMode::Idle,
            pick: None,
            corner1: (0, 0),
        }
    }
}

/// Events routed to the control window (and, while selecting, the root)
pub fn handle_top_event(app: &mut App, event: &Event) -> Result<()> {
    match event {
        Event::Expose(ev) if ev.window == app.top.window => {
            draw_chrome(app, ev.width, ev.height)?;
        }
        Event::ButtonPress(ev) => match app.selector.mode {
            SelectorMode::Idle => {
                if ev.detail == mouse::BUTTON_LEFT {
                    app.selector.mode = SelectorMode::ArmedForPick;
                }
            }
            SelectorMode::ArmedForPick => {}
            SelectorMode::Selecting => {
                if ev.detail == mouse::BUTTON_LEFT {
                    pick_corner1(app, ev)?;
                }
            }
        },
        Event::ButtonRelease(ev) => match app.selector.mode {
            SelectorMode::ArmedForPick => {
                if ev.detail == mouse::BUTTON_LEFT {
                    begin_selection(app)?;
                }
            }
            SelectorMode::Selecting => {
                if ev.detail == mouse::BUTTON_LEFT {
                    finish_selection(app, ev)?;
                }
            }
            SelectorMode::Idle => {}
        },
        Event::MotionNotify(ev) => {
            debug!("selection motion at {},{}", ev.root_x, ev.root_y);
        }
        _ => {}
    }

    // Sync pointer grab: let the next frozen pointer event through.
    if app.selector.mode == SelectorMode::Selecting {
        app.ctx
            .conn
            .allow_events(Allow::SYNC_POINTER, CURRENT_TIME)?;
    }
    Ok(())
}

/// Static chrome: a plus sign inside a circle, sized to the exposed area
fn draw_chrome(app: &App, width: u16, height: u16) -> Result<()> {
    let ctx = &app.ctx;
    let dim = (width.min(height) / 4) as i16;
    let horizontal = [
        Point { x: dim, y: 2 * dim },
        Point {
            x: 3 * dim,
            y: 2 * dim,
        },
    ];
    let vertical = [
        Point { x: 2 * dim, y: dim },
        Point {
            x: 2 * dim,
            y: 3 * dim,
        },
    ];
    ctx.conn
        .poly_line(CoordMode::ORIGIN, app.top.window, app.top.gc, &horizontal)?;
    ctx.conn
        .poly_line(CoordMode::ORIGIN, app.top.window, app.top.gc, &vertical)?;
    let circle = Arc {
        x: dim - dim / 6,
        y: dim - dim / 6,
        width: (2 * dim + dim / 3) as u16,
        height: (2 * dim + dim / 3) as u16,
        angle1: 0,
        angle2: 360 * 64,
    };
    ctx.conn.poly_arc(app.top.window, app.top.gc, &[circle])?;
    Ok(())
}

/// Grab the pointer against the root with a crosshair; selection spans the
/// whole screen. A failed grab is fatal.
fn grab_selection_pointer(app: &App, confine_to: Window) -> Result<()> {
    let ctx = &app.ctx;
    let cursor = crosshair_cursor(ctx)?;
    let reply = ctx
        .conn
        .grab_pointer(
            false,
            ctx.screen.root,
            EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::BUTTON_MOTION,
            GrabMode::SYNC,
            GrabMode::ASYNC,
            confine_to,
            cursor,
            CURRENT_TIME,
        )?
        .reply()?;
    ctx.conn.free_cursor(cursor)?;
    if reply.status != GrabStatus::SUCCESS {
        bail!("grabbing pointer failed: {:?}", reply.status);
    }
    Ok(())
}

fn begin_selection(app: &mut App) -> Result<()> {
    info!("starting window selection");
    grab_selection_pointer(app, app.ctx.screen.root)?;
    app.selector.mode = SelectorMode::Selecting;
    Ok(())
}

/// Release the grab and return to idle without creating a view
fn abort_selection(app: &mut App, why: &str) -> Result<()> {
    debug!("selection aborted: {why}");
    app.ctx.conn.ungrab_pointer(CURRENT_TIME)?;
    app.selector.pick = None;
    app.selector.mode = SelectorMode::Idle;
    Ok(())
}

/// First corner press: record the point, resolve the picked window
fn pick_corner1(app: &mut App, ev: &ButtonPressEvent) -> Result<()> {
    app.selector.corner1 = (ev.root_x, ev.root_y);
    debug!(
        "pick press: child {:#x} at {},{}",
        ev.child, ev.root_x, ev.root_y
    );

    let source = ev.child;
    if source == x11rb::NONE || source == app.ctx.screen.root {
        return abort_selection(app, "picked the root or nothing");
    }
    let frame = match find_wm_window(&app.ctx, source) {
        Some(frame) => frame,
        None => return abort_selection(app, "no client window below the pick"),
    };
    raise_window(&app.ctx, frame)?;
    let name = match window_name(&app.ctx, frame) {
        Some(name) => name,
        None => return abort_selection(app, "picked window has no name"),
    };
    info!("selected window {source:#x} name {name:?}");

    // Regrab, now confining the pointer to the picked window.
    app.ctx.conn.ungrab_pointer(CURRENT_TIME)?;
    grab_selection_pointer(app, source)?;
    app.selector.pick = Some(Pick {
        source,
        frame,
        name,
    });
    Ok(())
}

/// Second corner release: normalize, create the view, checkpoint
fn finish_selection(app: &mut App, ev: &ButtonReleaseEvent) -> Result<()> {
    let corner2 = (ev.root_x, ev.root_y);
    app.ctx.conn.ungrab_pointer(CURRENT_TIME)?;
    app.selector.mode = SelectorMode::Idle;

    let pick = match app.selector.pick.take() {
        Some(pick) => pick,
        None => {
            debug!("selection released without a pick");
            return Ok(());
        }
    };
    let sel = Selection::normalized(app.selector.corner1, corner2);
    match lifecycle::create_view(app, pick.source, pick.frame, pick.name, sel)? {
        Some(_) => persistence::checkpoint(app),
        None => debug!("view creation aborted"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_already_ordered() {
        let sel = Selection::normalized((100, 100), (300, 250));
        assert_eq!(
            sel,
            Selection {
                x1: 100,
                y1: 100,
                x2: 300,
                y2: 250
            }
        );
    }

    #[test]
    fn test_normalized_swaps_reversed_x() {
        let sel = Selection::normalized((300, 100), (100, 250));
        assert_eq!((sel.x1, sel.x2), (100, 300));
        assert_eq!((sel.y1, sel.y2), (100, 250));
    }

    #[test]
    fn test_normalized_swaps_reversed_both() {
        let sel = Selection::normalized((300, 250), (100, 100));
        assert_eq!(
            sel,
            Selection {
                x1: 100,
                y1: 100,
                x2: 300,
                y2: 250
            }
        );
    }
}
