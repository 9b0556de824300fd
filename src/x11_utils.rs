use anyhow::{Context, Result};
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::constants::x11::{CROSSHAIR_GLYPH, NAME_READ_LEN};

/// Immutable collaborator context threaded through every handler
pub struct AppContext<'a> {
    pub conn: &'a RustConnection,
    pub screen: &'a Screen,
    pub atoms: &'a CachedAtoms,
    /// Server "cursor" font, opened once at startup
    pub cursor_font: Font,
}

/// Pre-cached X11 atoms to avoid repeated roundtrips
pub struct CachedAtoms {
    pub wm_state: Atom,
    pub motif_wm_hints: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_above: Atom,
}

impl CachedAtoms {
    pub fn new(conn: &RustConnection) -> Result<Self> {
        // Do all intern_atom roundtrips once at startup
        Ok(Self {
            wm_state: intern(conn, b"WM_STATE")?,
            motif_wm_hints: intern(conn, b"_MOTIF_WM_HINTS")?,
            net_wm_state: intern(conn, b"_NET_WM_STATE")?,
            net_wm_state_above: intern(conn, b"_NET_WM_STATE_ABOVE")?,
        })
    }
}

fn intern(conn: &RustConnection, name: &[u8]) -> Result<Atom> {
    Ok(conn
        .intern_atom(false, name)
        .context(format!(
            "Failed to intern {} atom",
            String::from_utf8_lossy(name)
        ))?
        .reply()
        .context(format!(
            "Failed to get reply for {} atom",
            String::from_utf8_lossy(name)
        ))?
        .atom)
}

/// Find the client window below `win` carrying the WM_STATE marker.
///
/// Depth-first over the collaborator's child enumeration, first match wins.
/// Query failures resolve to `None`; the caller treats that as a failed
/// pick, not an error.
pub fn find_wm_window(ctx: &AppContext, win: Window) -> Option<Window> {
    let marker = ctx
        .conn
        .get_property(false, win, ctx.atoms.wm_state, GetPropertyType::ANY, 0, 0)
        .ok()?
        .reply();
    if let Ok(prop) = marker {
        if prop.type_ != x11rb::NONE {
            debug!("found WM_STATE on window {win:#x}");
            return Some(win);
        }
    }

    let tree = match ctx.conn.query_tree(win).ok()?.reply() {
        Ok(tree) => tree,
        Err(err) => {
            debug!("failed to query tree of {win:#x}: {err}");
            return None;
        }
    };
    debug!("window {win:#x} has {} children", tree.children.len());
    for child in tree.children {
        if let Some(found) = find_wm_window(ctx, child) {
            return Some(found);
        }
    }
    None
}

/// Fetch a window's WM_NAME with the fixed read length.
///
/// `None` means the property is missing or empty; both abort whatever
/// operation asked for the name.
pub fn window_name(ctx: &AppContext, win: Window) -> Option<String> {
    let prop = match ctx
        .conn
        .get_property(
            false,
            win,
            AtomEnum::WM_NAME,
            GetPropertyType::ANY,
            0,
            NAME_READ_LEN,
        )
        .ok()?
        .reply()
    {
        Ok(prop) => prop,
        Err(err) => {
            debug!("failed to get name of window {win:#x}: {err}");
            return None;
        }
    };
    if prop.value.is_empty() {
        debug!("window {win:#x} has no name");
        return None;
    }
    Some(String::from_utf8_lossy(&prop.value).into_owned())
}

/// Create a crosshair glyph cursor from the server cursor font
pub fn crosshair_cursor(ctx: &AppContext) -> Result<Cursor> {
    let cursor = ctx.conn.generate_id()?;
    ctx.conn
        .create_glyph_cursor(
            cursor,
            ctx.cursor_font,
            ctx.cursor_font,
            CROSSHAIR_GLYPH,
            CROSSHAIR_GLYPH + 1,
            0,
            0,
            0,
            0xffff,
            0xffff,
            0xffff,
        )
        .context("Failed to create crosshair cursor")?;
    Ok(cursor)
}

/// Raise a window to the top of the stacking order
pub fn raise_window(ctx: &AppContext, win: Window) -> Result<()> {
    ctx.conn
        .configure_window(win, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))
        .context(format!("Failed to raise window {win:#x}"))?;
    Ok(())
}
