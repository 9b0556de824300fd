//! Event routing and the view/target handlers
//!
//! One inbound event at a time: structural notifications that drive the
//! disconnect/reconnect protocol are handled first, everything else is
//! resolved through the window registry and dispatched to the owning
//! entity's handler.

use anyhow::{bail, Result};
use tracing::debug;
use x11rb::protocol::damage::{ConnectionExt as DamageExt, NotifyEvent as DamageNotifyEvent};
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;

use crate::app::App;
use crate::constants::geometry::RESIZE_STEP;
use crate::constants::{keys, mouse};
use crate::lifecycle::{apply_view_size, blank_view, destroy_view, redraw_view, reposition_view};
use crate::model::{TargetId, ViewId};
use crate::persistence;
use crate::reconnect;
use crate::registry::WindowKind;
use crate::selector;
use crate::x11_utils::raise_window;

pub fn handle_event(app: &mut App, event: &Event) -> Result<()> {
    match event {
        Event::DamageNotify(ev) => handle_damage(app, ev),
        Event::DestroyNotify(ev) => {
            if let Some(WindowKind::Target(id)) = app.registry.lookup(ev.window) {
                reconnect::disconnect_target(app, id)?;
            }
            Ok(())
        }
        Event::MapNotify(ev) => {
            // A previously unseen top-level window is a reconnect candidate.
            if ev.event == app.ctx.screen.root && app.registry.lookup(ev.window).is_none() {
                reconnect::try_reconnect(app, ev.window)?;
            }
            Ok(())
        }
        Event::UnmapNotify(ev) => {
            // Only the source window itself, not a descendant.
            if let Some(WindowKind::Target(id)) = app.registry.lookup(ev.window) {
                handle_source_unmapped(app, id)?;
            } else {
                debug!("ignoring unmap of window {:#x}", ev.window);
            }
            Ok(())
        }
        Event::Expose(ev) => route(app, ev.window, event),
        Event::GraphicsExposure(ev) => route(app, ev.drawable, event),
        Event::ButtonPress(ev) => route(app, ev.event, event),
        Event::ButtonRelease(ev) => route(app, ev.event, event),
        Event::MotionNotify(ev) => route(app, ev.event, event),
        Event::KeyPress(ev) => route(app, ev.event, event),
        Event::CreateNotify(_) | Event::ConfigureNotify(_) | Event::ReparentNotify(_) => Ok(()),
        other => {
            debug!("unhandled event {other:?}");
            Ok(())
        }
    }
}

fn route(app: &mut App, window: Window, event: &Event) -> Result<()> {
    match app.registry.lookup(window) {
        Some(WindowKind::Top) => selector::handle_top_event(app, event),
        Some(WindowKind::View { target, view }) => handle_view_event(app, target, view, event),
        Some(WindowKind::Target(_)) => {
            debug!("discarding event for target window {window:#x}");
            Ok(())
        }
        None => {
            debug!("event for unknown window {window:#x}");
            Ok(())
        }
    }
}

/// Repaint the views whose capture rectangle the damaged region touches
fn handle_damage(app: &mut App, ev: &DamageNotifyEvent) -> Result<()> {
    let id = match app.registry.lookup(ev.drawable) {
        Some(WindowKind::Target(id)) => id,
        _ => {
            debug!("damage for unknown drawable {:#x}", ev.drawable);
            return Ok(());
        }
    };
    let target = app.target(id)?;
    if target.disconnected {
        return Ok(());
    }
    let (source, damage) = match (target.source, target.damage) {
        (Some(source), Some(damage)) => (source, damage),
        _ => bail!("internal error: connected target {id:?} missing resources"),
    };
    // Acknowledge, or the server stops reporting.
    app.ctx.conn.damage_subtract(damage, 0u32, 0u32)?;

    let target = app.target(id)?;
    for view in &target.views {
        if !view
            .cap
            .overlaps(ev.area.x, ev.area.y, ev.area.width, ev.area.height)
        {
            debug!("damage outside capture area of view {:?}", view.id);
            continue;
        }
        redraw_view(&app.ctx, source, view)?;
    }
    Ok(())
}

/// Source unmapped: blank every view, geometry untouched
fn handle_source_unmapped(app: &mut App, id: TargetId) -> Result<()> {
    debug!("source of target {id:?} unmapped, blanking views");
    let target = app.target(id)?;
    for view in &target.views {
        blank_view(&app.ctx, view)?;
    }
    Ok(())
}

fn handle_view_event(app: &mut App, target_id: TargetId, view_id: ViewId, event: &Event) -> Result<()> {
    match event {
        Event::Expose(_) | Event::GraphicsExposure(_) => {
            let target = app.target(target_id)?;
            if let (Some(source), Some(view)) = (target.source, target.view(view_id)) {
                redraw_view(&app.ctx, source, view)?;
            }
        }
        Event::ButtonPress(ev) => {
            if ev.detail == mouse::BUTTON_LEFT {
                // Raise the mirrored application, not the snip.
                if let Some(frame) = app.target(target_id)?.wm_frame {
                    raise_window(&app.ctx, frame)?;
                }
            }
            if ev.detail == mouse::BUTTON_RIGHT {
                let target = match app.targets.get_mut(&target_id) {
                    Some(t) => t,
                    None => bail!("internal error: no target with id {target_id:?}"),
                };
                if let Some(view) = target.view_mut(view_id) {
                    view.drag.dragging = true;
                    view.drag.offset = (ev.event_x, ev.event_y);
                }
            }
        }
        Event::MotionNotify(ev) => {
            let target = match app.targets.get_mut(&target_id) {
                Some(t) => t,
                None => bail!("internal error: no target with id {target_id:?}"),
            };
            if let Some(view) = target.view_mut(view_id) {
                if view.drag.dragging {
                    let x = ev.root_x - view.drag.offset.0;
                    let y = ev.root_y - view.drag.offset.1;
                    reposition_view(&app.ctx, view, x, y)?;
                }
            }
        }
        Event::ButtonRelease(ev) => {
            if ev.detail == mouse::BUTTON_RIGHT {
                let target = match app.targets.get_mut(&target_id) {
                    Some(t) => t,
                    None => bail!("internal error: no target with id {target_id:?}"),
                };
                let was_dragging = match target.view_mut(view_id) {
                    Some(view) if view.drag.dragging => {
                        view.drag.dragging = false;
                        true
                    }
                    _ => false,
                };
                if was_dragging {
                    persistence::checkpoint(app);
                }
            }
        }
        Event::KeyPress(ev) => handle_view_key(app, target_id, view_id, ev)?,
        other => {
            debug!("view {view_id:?}: discarding event {other:?}");
        }
    }
    Ok(())
}

fn handle_view_key(
    app: &mut App,
    target_id: TargetId,
    view_id: ViewId,
    ev: &KeyPressEvent,
) -> Result<()> {
    match ev.detail {
        keys::ESCAPE | keys::BACKSPACE | keys::DELETE => {
            debug!("closing view {view_id:?}");
            destroy_view(app, target_id, view_id)?;
            persistence::checkpoint(app);
        }
        keys::LEFT | keys::RIGHT | keys::UP | keys::DOWN => {
            resize_view(app, target_id, view_id, ev)?;
            persistence::checkpoint(app);
        }
        other => debug!("view {view_id:?}: ignoring key {other}"),
    }
    Ok(())
}

/// Arrow keys move the lower-right corner of the capture rectangle; with
/// Shift they move the upper-left corner instead. The mirror window is
/// resized to match before the next redraw.
fn resize_view(app: &mut App, target_id: TargetId, view_id: ViewId, ev: &KeyPressEvent) -> Result<()> {
    let (dx, dy) = match ev.detail {
        keys::LEFT => (-RESIZE_STEP, 0),
        keys::RIGHT => (RESIZE_STEP, 0),
        keys::UP => (0, -RESIZE_STEP),
        keys::DOWN => (0, RESIZE_STEP),
        _ => return Ok(()),
    };
    let upper_left = ev.state.contains(KeyButMask::SHIFT);

    let target = match app.targets.get_mut(&target_id) {
        Some(t) => t,
        None => bail!("internal error: no target with id {target_id:?}"),
    };
    let source = target.source;
    let view = match target.view_mut(view_id) {
        Some(view) => view,
        None => bail!("internal error: view {view_id:?} not in target {target_id:?}"),
    };
    if upper_left {
        view.cap.resize_upper_left(dx, dy);
    } else {
        view.cap.resize_lower_right(dx, dy);
    }
    apply_view_size(&app.ctx, view)?;
    if let Some(source) = source {
        redraw_view(&app.ctx, source, view)?;
    }
    Ok(())
}
