#![forbid(unsafe_code)]

mod app;
mod constants;
mod event_handler;
mod lifecycle;
mod model;
mod persistence;
mod reconnect;
mod registry;
mod selector;
mod x11_utils;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;
use x11rb::connection::Connection;
use x11rb::protocol::damage::ConnectionExt as DamageExt;
use x11rb::protocol::xproto::*;

use app::{App, TopWindow};
use constants::geometry::TOP_SIZE;
use constants::identity::{PROGRAM_NAME, WM_CLASS};
use event_handler::handle_event;
use persistence::StateFile;
use registry::WindowKind;
use x11_utils::{AppContext, CachedAtoms};
use x11rb::wrapper::ConnectionExt as WrapperExt;

#[derive(Parser)]
#[command(name = "sniptotop", version, about = "Always-on-top live snips of other windows")]
struct Cli {
    /// Verbose timestamped tracing on standard output
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Do not restore persisted snips on startup
    #[arg(short = 'n', long = "no-restore")]
    no_restore: bool,
}

/// Create the always-visible control window with its chrome GC
fn create_top_window(ctx: &AppContext) -> Result<TopWindow> {
    let window = ctx.conn.generate_id()?;
    ctx.conn
        .create_window(
            x11rb::COPY_FROM_PARENT as u8,
            window,
            ctx.screen.root,
            0,
            0,
            TOP_SIZE,
            TOP_SIZE,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new()
                .background_pixel(ctx.screen.white_pixel)
                .event_mask(
                    EventMask::EXPOSURE | EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE,
                ),
        )
        .context("Failed to create control window")?;

    ctx.conn.change_property8(
        PropMode::REPLACE,
        window,
        AtomEnum::WM_NAME,
        AtomEnum::STRING,
        PROGRAM_NAME.as_bytes(),
    )?;
    ctx.conn.change_property8(
        PropMode::REPLACE,
        window,
        AtomEnum::WM_CLASS,
        AtomEnum::STRING,
        WM_CLASS,
    )?;

    let gc = ctx.conn.generate_id()?;
    ctx.conn
        .create_gc(
            gc,
            window,
            &CreateGCAux::new()
                .foreground(ctx.screen.black_pixel)
                .background(ctx.screen.white_pixel),
        )
        .context("Failed to create control window gc")?;

    ctx.conn
        .map_window(window)
        .context("Failed to map control window")?;
    Ok(TopWindow { window, gc })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        TraceLevel::DEBUG
    } else {
        TraceLevel::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    println!(
        "\nTo add snips, click the large \"plus\" in the main window.\n\
         Then select a window by clicking on it.\n\
         Then drag a rectangle with the left mouse button.\n\
         To move a snip, hold down the right mouse button and drag.\n\
         To resize a snip, focus it and use the arrow keys (Shift for the\n\
         upper-left corner).\n\
         To close a snip, focus it and press escape.\n"
    );

    let (conn, screen_num) = x11rb::connect(None).context("Could not open display")?;
    let screen = &conn.setup().roots[screen_num];
    info!(
        "connected to X11: screen={screen_num}, {}x{}",
        screen.width_in_pixels, screen.height_in_pixels
    );

    let damage_version = conn
        .damage_query_version(1, 1)
        .context("DAMAGE extension not supported by the X server")?
        .reply()
        .context("DAMAGE extension not supported by the X server")?;
    debug!(
        "DAMAGE extension version {}.{}",
        damage_version.major_version, damage_version.minor_version
    );

    let cursor_font = conn.generate_id()?;
    conn.open_font(cursor_font, b"cursor")
        .context("Failed to open cursor font")?;

    let atoms = CachedAtoms::new(&conn)?;
    let ctx = AppContext {
        conn: &conn,
        screen,
        atoms: &atoms,
        cursor_font,
    };

    // Reconnection candidates (new top-levels) and source destruction both
    // arrive as structural notifications on the root.
    conn.change_window_attributes(
        screen.root,
        &ChangeWindowAttributesAux::new().event_mask(EventMask::SUBSTRUCTURE_NOTIFY),
    )?;

    let top = create_top_window(&ctx)?;
    let store = StateFile::new();
    let records = if cli.no_restore {
        Vec::new()
    } else {
        store.load().unwrap_or_else(|err| {
            warn!("failed to read persisted snips: {err:#}");
            Vec::new()
        })
    };

    let top_window = top.window;
    let mut app = App::new(ctx, top, store);
    app.registry.register(top_window, WindowKind::Top)?;
    // The selector listens on the root while a selection is in progress.
    app.registry.register(screen.root, WindowKind::Top)?;

    reconnect::restore(&mut app, records)?;
    conn.flush()?;

    loop {
        let event = match conn.wait_for_event() {
            Ok(event) => event,
            Err(err) => {
                info!("event source closed: {err}");
                break;
            }
        };
        debug!("got event {event:?}");
        handle_event(&mut app, &event)?;
        conn.flush()?;
    }

    persistence::checkpoint(&app);
    Ok(())
}
