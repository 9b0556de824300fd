//! Disconnect/reconnect protocol and startup restore
//!
//! A target whose source window is destroyed is not torn down: its views
//! freeze as grey placeholders and the target waits in the disconnected set
//! until a newly mapped top-level window with the same title shows up. If
//! two unrelated windows share a title the first enumerated one wins; that
//! is documented behavior, not a bug.

use anyhow::{bail, Result};
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::damage::{ConnectionExt as DamageExt, ReportLevel as DamageReportLevel};
use x11rb::protocol::xproto::*;

use crate::app::App;
use crate::lifecycle::{
    create_copy_gc, create_mirror_window, create_view, redraw_view, reposition_view, MirrorSpec,
};
use crate::model::{DragState, Target, TargetId, View};
use crate::persistence::Record;
use crate::registry::WindowKind;
use crate::selector::Selection;
use crate::x11_utils::{find_wm_window, window_name};

/// Freeze a target whose source window was destroyed.
///
/// Views keep their windows and capture geometry but lose their copy
/// contexts; the target's damage handle and registry entry are released and
/// it moves to the disconnected set. Idempotent.
pub fn disconnect_target(app: &mut App, target_id: TargetId) -> Result<()> {
    let target = match app.targets.get_mut(&target_id) {
        Some(t) => t,
        None => bail!("internal error: no target with id {target_id:?}"),
    };
    if target.disconnected {
        debug!("target {:?} already disconnected", target.name);
        return Ok(());
    }
    info!("source of {:?} destroyed, freezing views", target.name);

    for view in &mut target.views {
        crate::lifecycle::blank_view(&app.ctx, view)?;
        if let Some(gc) = view.gc.take() {
            app.ctx.conn.free_gc(gc)?;
        }
    }
    if let Some(damage) = target.damage.take() {
        app.ctx.conn.damage_destroy(damage)?;
    }
    let source = match target.source.take() {
        Some(source) => source,
        None => bail!("internal error: connected target {target_id:?} has no source"),
    };
    target.wm_frame = None;
    target.disconnected = true;

    app.registry.unregister(source)?;
    app.disconnected.add(target_id)?;
    Ok(())
}

/// A new top-level window was mapped under the root; rebind the first
/// disconnected target whose stored name matches its title.
pub fn try_reconnect(app: &mut App, window: Window) -> Result<()> {
    if app.disconnected.is_empty() {
        return Ok(());
    }
    let frame = match find_wm_window(&app.ctx, window) {
        Some(frame) => frame,
        None => return Ok(()),
    };
    let name = match window_name(&app.ctx, frame) {
        Some(name) => name,
        None => return Ok(()),
    };
    let target_id = match app
        .disconnected
        .iter()
        .find(|id| app.targets.get(id).map(|t| t.name == name).unwrap_or(false))
    {
        Some(id) => id,
        None => return Ok(()),
    };
    info!("window {window:#x} matches disconnected target {name:?}, reconnecting");

    let attrs = match app.ctx.conn.get_window_attributes(window)?.reply() {
        Ok(attrs) => attrs,
        Err(err) => {
            debug!("cannot query replacement window {window:#x}: {err}");
            return Ok(());
        }
    };
    let geom = match app.ctx.conn.get_geometry(window)?.reply() {
        Ok(geom) => geom,
        Err(err) => {
            debug!("cannot query replacement window {window:#x}: {err}");
            return Ok(());
        }
    };
    let spec = MirrorSpec {
        depth: geom.depth,
        visual: attrs.visual,
        colormap: attrs.colormap,
    };

    app.ctx.conn.change_window_attributes(
        window,
        &ChangeWindowAttributesAux::new()
            .event_mask(EventMask::STRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_NOTIFY),
    )?;
    let damage = app.ctx.conn.generate_id()?;
    app.ctx
        .conn
        .damage_create(damage, window, DamageReportLevel::RAW_RECTANGLES)?;
    app.registry.register(window, WindowKind::Target(target_id))?;

    {
        let target = match app.targets.get_mut(&target_id) {
            Some(t) => t,
            None => bail!("internal error: no target with id {target_id:?}"),
        };
        target.source = Some(window);
        target.wm_frame = Some(frame);
        target.damage = Some(damage);
        target.disconnected = false;
    }

    let view_count = app.target(target_id)?.views.len();
    for ix in 0..view_count {
        let (view_id, old_window, old_depth, pos, cap) = {
            let view = &app.target(target_id)?.views[ix];
            (view.id, view.window, view.depth, view.pos, view.cap)
        };
        // A mirror's pixel format must match its copy source; recreate the
        // window when the depth changed, keeping the same logical view.
        if old_depth != spec.depth {
            debug!(
                "view {view_id:?}: depth {} -> {}, recreating window",
                old_depth, spec.depth
            );
            app.registry.unregister(old_window)?;
            app.ctx.conn.destroy_window(old_window)?;
            let new_window = create_mirror_window(&app.ctx, app.top.window, spec, pos, &cap)?;
            app.registry.register(
                new_window,
                WindowKind::View {
                    target: target_id,
                    view: view_id,
                },
            )?;
            let view = match app.targets.get_mut(&target_id).and_then(|t| t.views.get_mut(ix)) {
                Some(view) => view,
                None => bail!("internal error: view {view_id:?} vanished during reconnect"),
            };
            view.window = new_window;
            view.depth = spec.depth;
        }
        let gc = create_copy_gc(&app.ctx, window)?;
        let view = match app.targets.get_mut(&target_id).and_then(|t| t.views.get_mut(ix)) {
            Some(view) => view,
            None => bail!("internal error: view {view_id:?} vanished during reconnect"),
        };
        view.gc = Some(gc);
        redraw_view(&app.ctx, window, &app.target(target_id)?.views[ix])?;
    }

    app.disconnected.remove(target_id)?;
    Ok(())
}

/// Rebuild the snip set from persisted records, before the main loop.
///
/// Records whose named window is present go through the ordinary
/// view-creation path; the rest become disconnected placeholders eligible
/// for later reconnection.
pub fn restore(app: &mut App, records: Vec<Record>) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let tree = app.ctx.conn.query_tree(app.ctx.screen.root)?.reply()?;
    for record in records {
        match find_named_window(app, &tree.children, &record.name) {
            Some((source, frame)) => restore_live(app, &record, source, frame)?,
            None => {
                info!(
                    "no window named {:?}; restoring as disconnected placeholder",
                    record.name
                );
                restore_placeholder(app, record)?;
            }
        }
    }
    Ok(())
}

/// First root child whose resolved client window carries the wanted name.
/// The control window itself is skipped to avoid self-capture.
fn find_named_window(app: &App, children: &[Window], name: &str) -> Option<(Window, Window)> {
    for &child in children {
        if child == app.top.window {
            continue;
        }
        let frame = match find_wm_window(&app.ctx, child) {
            Some(frame) => frame,
            None => continue,
        };
        if frame == app.top.window {
            continue;
        }
        if window_name(&app.ctx, frame).as_deref() == Some(name) {
            return Some((child, frame));
        }
    }
    None
}

fn restore_live(app: &mut App, record: &Record, source: Window, frame: Window) -> Result<()> {
    let geom = match app.ctx.conn.get_geometry(source)?.reply() {
        Ok(geom) => geom,
        Err(err) => {
            warn!("cannot query window for {:?}: {err}", record.name);
            return Ok(());
        }
    };
    // Stored capture rectangles are source-relative; the creation path
    // expects absolute screen coordinates.
    let sel = Selection {
        x1: geom.x + record.cap.x,
        y1: geom.y + record.cap.y,
        x2: geom.x + record.cap.x + record.cap.width as i16,
        y2: geom.y + record.cap.y + record.cap.height as i16,
    };
    let view_id = match create_view(app, source, frame, record.name.clone(), sel)? {
        Some(view_id) => view_id,
        None => {
            warn!("could not restore snip for {:?}", record.name);
            return Ok(());
        }
    };
    // Put the view back where it was.
    let target_id = match app.registry.lookup(source) {
        Some(WindowKind::Target(id)) => id,
        kind => bail!("internal error: restored source registered as {kind:?}"),
    };
    let target = match app.targets.get_mut(&target_id) {
        Some(t) => t,
        None => bail!("internal error: no target with id {target_id:?}"),
    };
    let view = match target.view_mut(view_id) {
        Some(view) => view,
        None => bail!("internal error: restored view {view_id:?} missing"),
    };
    reposition_view(&app.ctx, view, record.pos.0, record.pos.1)?;
    Ok(())
}

/// Synthesize a frozen target/view pair with no backing window
fn restore_placeholder(app: &mut App, record: Record) -> Result<()> {
    let spec = MirrorSpec::from_screen(app.ctx.screen);
    let window = create_mirror_window(&app.ctx, app.top.window, spec, record.pos, &record.cap)?;

    let target_id = app.alloc_target_id();
    let view_id = app.alloc_view_id();
    app.registry.register(
        window,
        WindowKind::View {
            target: target_id,
            view: view_id,
        },
    )?;
    app.targets.insert(
        target_id,
        Target {
            source: None,
            wm_frame: None,
            name: record.name,
            damage: None,
            disconnected: true,
            views: vec![View {
                id: view_id,
                target: target_id,
                window,
                depth: spec.depth,
                gc: None,
                cap: record.cap,
                pos: record.pos,
                drag: DragState::default(),
            }],
        },
    );
    app.disconnected.add(target_id)?;
    Ok(())
}
