use ab_glyph::FontVec;
use tracing::{debug, warn};

/// Candidate font files, most preferred first. Instruction text is
/// cosmetic, so any sans face the host has will do.
const FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
    "C:\\Windows\\Fonts\\verdana.ttf",
];

/// Load the first usable system font. Returns `None` when the host has
/// none of the known faces; callers then skip text rendering.
pub fn load_system_font() -> Option<FontVec> {
    for path in FONT_PATHS {
        if let Ok(bytes) = std::fs::read(path) {
            match FontVec::try_from_vec(bytes) {
                Ok(font) => {
                    debug!(path, "loaded instruction font");
                    return Some(font);
                }
                Err(e) => warn!(path, error = %e, "unreadable font file, trying next"),
            }
        }
    }
    warn!("no system font found; instruction text will not be drawn");
    None
}
