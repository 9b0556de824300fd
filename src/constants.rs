//! Application-wide constants
//!
//! Magic numbers and string literals used throughout the program, kept in
//! one place.

/// Identity strings advertised to the window manager
pub mod identity {
    pub const PROGRAM_NAME: &str = "sniptotop";

    /// WM_CLASS instance and class, NUL separated
    pub const WM_CLASS: &[u8] = b"sniptotop\0SnipToTop\0";
}

/// Capacity limits on the entity bookkeeping
///
/// These exist to catch runaway handle leaks early, not to model a real
/// server resource limit.
pub mod capacity {
    /// Maximum number of registered window handles
    pub const MAX_WINDOWS: usize = 1000;

    /// Maximum number of targets waiting for a replacement window
    pub const MAX_DISCONNECTED: usize = 100;
}

/// Window geometry constants
pub mod geometry {
    /// Border padding on each side of a view's capture area, in pixels
    pub const VIEW_BORDER: u16 = 2;

    /// Side length of the square control window
    pub const TOP_SIZE: u16 = 150;

    /// Default screen placement for a freshly created view
    pub const DEFAULT_VIEW_X: i16 = 500;
    pub const DEFAULT_VIEW_Y: i16 = 500;

    /// Capture rectangle growth/shrink step for the resize keys
    pub const RESIZE_STEP: i16 = 8;
}

/// Pixel values (ARGB)
pub mod colors {
    /// Fill used when a view's source is gone or unmapped
    pub const PLACEHOLDER_GREY: u32 = 0xff80_8080;

    /// Fill of the border padding around the captured pixels. Shares the
    /// placeholder value today; kept separate so a distinct disconnected
    /// tint is a one-line change.
    pub const BORDER_GREY: u32 = 0xff80_8080;

    pub const BLACK: u32 = 0xff00_0000;
}

/// Mouse button numbers
pub mod mouse {
    pub const BUTTON_LEFT: u8 = 1;
    pub const BUTTON_RIGHT: u8 = 3;
}

/// Raw keycodes consumed by view windows
pub mod keys {
    pub const ESCAPE: u8 = 9;
    pub const BACKSPACE: u8 = 22;
    pub const DELETE: u8 = 119;

    pub const UP: u8 = 111;
    pub const LEFT: u8 = 113;
    pub const RIGHT: u8 = 114;
    pub const DOWN: u8 = 116;
}

/// X11 protocol constants
pub mod x11 {
    /// Crosshair glyph index in the server "cursor" font
    pub const CROSSHAIR_GLYPH: u16 = 34;

    /// Fixed length (in 32-bit units) of the WM_NAME property read
    pub const NAME_READ_LEN: u32 = 100;

    /// _MOTIF_WM_HINTS payload disabling all decorations
    pub const MOTIF_NO_DECORATIONS: [u32; 5] = [2, 0, 0, 0, 0];
}
