//! Target/view lifecycle
//!
//! View creation and destruction, mirror window construction, and the
//! damage-driven redraw path. Targets are created on the first view over a
//! previously-unseen source window and freed with their last view, whether
//! connected or disconnected.

use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::properties::WmSizeHints;
use x11rb::protocol::damage::{ConnectionExt as DamageExt, ReportLevel as DamageReportLevel};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as WrapperExt;

use crate::app::App;
use crate::constants::colors::{BLACK, BORDER_GREY, PLACEHOLDER_GREY};
use crate::constants::geometry::{DEFAULT_VIEW_X, DEFAULT_VIEW_Y, VIEW_BORDER};
use crate::constants::x11::MOTIF_NO_DECORATIONS;
use crate::model::{CaptureRect, DragState, Target, TargetId, View, ViewId};
use crate::registry::WindowKind;
use crate::selector::Selection;
use crate::x11_utils::AppContext;

/// Pixel format of a mirror window; must match its copy source
#[derive(Debug, Clone, Copy)]
pub struct MirrorSpec {
    pub depth: u8,
    pub visual: Visualid,
    pub colormap: Colormap,
}

impl MirrorSpec {
    /// Format for placeholder windows with no live source
    pub fn from_screen(screen: &Screen) -> Self {
        Self {
            depth: screen.root_depth,
            visual: screen.root_visual,
            colormap: screen.default_colormap,
        }
    }
}

pub fn view_outer_size(cap: &CaptureRect) -> (u16, u16) {
    (cap.width + 2 * VIEW_BORDER, cap.height + 2 * VIEW_BORDER)
}

/// Create a decorationless, always-above mirror window attached to the
/// control window. The window is mapped before returning.
pub fn create_mirror_window(
    ctx: &AppContext,
    top_window: Window,
    spec: MirrorSpec,
    pos: (i16, i16),
    cap: &CaptureRect,
) -> Result<Window> {
    let (width, height) = view_outer_size(cap);
    let window = ctx
        .conn
        .generate_id()
        .context("Failed to generate mirror window id")?;
    ctx.conn
        .create_window(
            spec.depth,
            window,
            ctx.screen.root,
            pos.0,
            pos.1,
            width,
            height,
            0,
            WindowClass::INPUT_OUTPUT,
            spec.visual,
            &CreateWindowAux::new()
                .background_pixel(BORDER_GREY)
                .border_pixel(BLACK)
                .override_redirect(0)
                .colormap(spec.colormap)
                .event_mask(
                    EventMask::EXPOSURE
                        | EventMask::BUTTON_PRESS
                        | EventMask::BUTTON_RELEASE
                        | EventMask::KEY_PRESS
                        | EventMask::BUTTON3_MOTION,
                ),
        )
        .context("Failed to create mirror window")?;

    ctx.conn.change_property32(
        PropMode::REPLACE,
        window,
        AtomEnum::WM_TRANSIENT_FOR,
        AtomEnum::WINDOW,
        &[top_window],
    )?;
    ctx.conn.change_property32(
        PropMode::REPLACE,
        window,
        ctx.atoms.net_wm_state,
        AtomEnum::ATOM,
        &[ctx.atoms.net_wm_state_above],
    )?;
    ctx.conn.change_property32(
        PropMode::REPLACE,
        window,
        ctx.atoms.motif_wm_hints,
        ctx.atoms.motif_wm_hints,
        &MOTIF_NO_DECORATIONS,
    )?;
    set_fixed_size_hints(ctx.conn, window, width, height)?;

    ctx.conn
        .map_window(window)
        .context("Failed to map mirror window")?;
    Ok(window)
}

/// Pin WM_NORMAL_HINTS min == max so the window manager cannot resize us
fn set_fixed_size_hints(
    conn: &RustConnection,
    window: Window,
    width: u16,
    height: u16,
) -> Result<()> {
    let mut hints = WmSizeHints::new();
    hints.min_size = Some((i32::from(width), i32::from(height)));
    hints.max_size = Some((i32::from(width), i32::from(height)));
    hints
        .set(conn, window, AtomEnum::WM_NORMAL_HINTS)
        .context("Failed to set size hints on mirror window")?;
    Ok(())
}

/// Create a graphics-copy context on the source drawable
pub fn create_copy_gc(ctx: &AppContext, source: Window) -> Result<Gcontext> {
    let gc = ctx
        .conn
        .generate_id()
        .context("Failed to generate copy gc id")?;
    ctx.conn
        .create_gc(
            gc,
            source,
            &CreateGCAux::new()
                .foreground(PLACEHOLDER_GREY)
                .background(BLACK)
                .subwindow_mode(SubwindowMode::INCLUDE_INFERIORS),
        )
        .context("Failed to create copy gc")?;
    Ok(gc)
}

// Destroys the half-built mirror window if view creation bails out early.
struct WindowGuard<'a> {
    conn: &'a RustConnection,
    window: Window,
    armed: bool,
}

impl Drop for WindowGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.conn.destroy_window(self.window);
            let _ = self.conn.flush();
        }
    }
}

/// Create a view over `source` from a normalized screen-space selection.
///
/// `Ok(None)` means the source could not be queried; the caller logs and
/// moves on. Any error after the mirror window exists tears it down before
/// propagating, so a view is never partially registered.
pub fn create_view(
    app: &mut App,
    source: Window,
    wm_frame: Window,
    name: String,
    sel: Selection,
) -> Result<Option<ViewId>> {
    let ctx = &app.ctx;

    let attrs = match ctx.conn.get_window_attributes(source)?.reply() {
        Ok(attrs) => attrs,
        Err(err) => {
            debug!("failed to get attributes of source {source:#x}: {err}");
            return Ok(None);
        }
    };
    let geom = match ctx.conn.get_geometry(source)?.reply() {
        Ok(geom) => geom,
        Err(err) => {
            debug!("failed to get geometry of source {source:#x}: {err}");
            return Ok(None);
        }
    };
    debug!(
        "source geometry: x={} y={} {}x{} depth={}",
        geom.x, geom.y, geom.width, geom.height, geom.depth
    );

    let cap = CaptureRect {
        x: sel.x1 - geom.x,
        y: sel.y1 - geom.y,
        width: ((sel.x2 - sel.x1).max(1)) as u16,
        height: ((sel.y2 - sel.y1).max(1)) as u16,
    };
    let spec = MirrorSpec {
        depth: geom.depth,
        visual: attrs.visual,
        colormap: attrs.colormap,
    };
    let pos = (DEFAULT_VIEW_X, DEFAULT_VIEW_Y);
    let window = create_mirror_window(ctx, app.top.window, spec, pos, &cap)?;
    let mut guard = WindowGuard {
        conn: ctx.conn,
        window,
        armed: true,
    };

    let gc = create_copy_gc(ctx, source)?;

    // Find or create the target for this source.
    let target_id = match app.registry.lookup(source) {
        Some(WindowKind::Target(id)) => {
            let target = app.target(id)?;
            if target.wm_frame != Some(wm_frame) {
                bail!(
                    "internal error: source {source:#x} already bound to frame {:?}, got {wm_frame:#x}",
                    target.wm_frame
                );
            }
            // Target already owns a name; the fresh one is redundant.
            id
        }
        Some(kind) => bail!("internal error: source {source:#x} registered as {kind:?}"),
        None => {
            let ctx = &app.ctx;
            ctx.conn.change_window_attributes(
                source,
                &ChangeWindowAttributesAux::new()
                    .event_mask(EventMask::STRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_NOTIFY),
            )?;
            let damage = ctx
                .conn
                .generate_id()
                .context("Failed to generate damage id")?;
            ctx.conn
                .damage_create(damage, source, DamageReportLevel::RAW_RECTANGLES)
                .context("Failed to create damage handle")?;

            let id = app.alloc_target_id();
            app.registry.register(source, WindowKind::Target(id))?;
            app.targets.insert(
                id,
                Target {
                    source: Some(source),
                    wm_frame: Some(wm_frame),
                    name,
                    damage: Some(damage),
                    disconnected: false,
                    views: Vec::new(),
                },
            );
            id
        }
    };

    let view_id = app.alloc_view_id();
    app.registry.register(
        window,
        WindowKind::View {
            target: target_id,
            view: view_id,
        },
    )?;
    let view = View {
        id: view_id,
        target: target_id,
        window,
        depth: geom.depth,
        gc: Some(gc),
        cap,
        pos,
        drag: DragState::default(),
    };
    let target = app.target_mut(target_id)?;
    target.views.insert(0, view);
    guard.armed = false;

    info!(
        "created view {view_id:?} window {window:#x} over {:?} ({}x{})",
        target.name, cap.width, cap.height
    );
    Ok(Some(view_id))
}

/// Destroy one view; frees the owning target too if it was the last one.
pub fn destroy_view(app: &mut App, target_id: TargetId, view_id: ViewId) -> Result<()> {
    let target = match app.targets.get_mut(&target_id) {
        Some(t) => t,
        None => bail!("internal error: no target with id {target_id:?}"),
    };
    let ix = match target.views.iter().position(|v| v.id == view_id) {
        Some(ix) => ix,
        None => bail!("internal error: view {view_id:?} not in target {target_id:?}"),
    };
    let view = target.views.remove(ix);
    if view.target != target_id {
        bail!("internal error: view {view_id:?} back-reference mismatch");
    }

    if let Some(gc) = view.gc {
        app.ctx.conn.free_gc(gc)?;
    }
    app.registry.unregister(view.window)?;
    app.ctx.conn.destroy_window(view.window)?;

    let target = app.target(target_id)?;
    if target.views.is_empty() {
        info!("last view gone, freeing target {:?}", target.name);
        if target.disconnected {
            app.disconnected.remove(target_id)?;
        } else {
            let source = match target.source {
                Some(source) => source,
                None => bail!("internal error: connected target {target_id:?} has no source"),
            };
            app.ctx.conn.change_window_attributes(
                source,
                &ChangeWindowAttributesAux::new().event_mask(EventMask::NO_EVENT),
            )?;
            if let Some(damage) = target.damage {
                app.ctx.conn.damage_destroy(damage)?;
            }
            app.registry.unregister(source)?;
        }
        app.targets.remove(&target_id);
    }
    Ok(())
}

/// Copy the capture rectangle from the source into the view window.
///
/// A failed copy means our protocol state is inconsistent, so it is checked
/// synchronously and treated as fatal. No-op while disconnected.
pub fn redraw_view(ctx: &AppContext, source: Window, view: &View) -> Result<()> {
    let gc = match view.gc {
        Some(gc) => gc,
        None => return Ok(()),
    };
    debug!(
        "redraw view {:#x} from {source:#x} area {},{} {}x{}",
        view.window, view.cap.x, view.cap.y, view.cap.width, view.cap.height
    );
    ctx.conn
        .copy_area(
            source,
            view.window,
            gc,
            view.cap.x,
            view.cap.y,
            VIEW_BORDER as i16,
            VIEW_BORDER as i16,
            view.cap.width,
            view.cap.height,
        )?
        .check()
        .context("pixel copy from source to view failed")?;
    Ok(())
}

/// Fill the capture area with the placeholder color, geometry untouched.
/// Without a copy context the window's grey background already shows.
pub fn blank_view(ctx: &AppContext, view: &View) -> Result<()> {
    if let Some(gc) = view.gc {
        let rect = Rectangle {
            x: VIEW_BORDER as i16,
            y: VIEW_BORDER as i16,
            width: view.cap.width,
            height: view.cap.height,
        };
        ctx.conn.poly_fill_rectangle(view.window, gc, &[rect])?;
    }
    Ok(())
}

/// Resize the mirror window to match its capture rectangle
pub fn apply_view_size(ctx: &AppContext, view: &View) -> Result<()> {
    let (width, height) = view_outer_size(&view.cap);
    set_fixed_size_hints(ctx.conn, view.window, width, height)?;
    ctx.conn.configure_window(
        view.window,
        &ConfigureWindowAux::new()
            .width(u32::from(width))
            .height(u32::from(height)),
    )?;
    Ok(())
}

pub fn reposition_view(ctx: &AppContext, view: &mut View, x: i16, y: i16) -> Result<()> {
    ctx.conn.configure_window(
        view.window,
        &ConfigureWindowAux::new().x(i32::from(x)).y(i32::from(y)),
    )?;
    view.pos = (x, y);
    Ok(())
}
