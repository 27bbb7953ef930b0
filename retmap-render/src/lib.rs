pub mod font;
pub mod render;

pub use font::load_system_font;
pub use render::{RenderConfig, SkiaRenderer};
