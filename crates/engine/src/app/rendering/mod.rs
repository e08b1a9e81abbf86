mod draw;
mod frame;
mod labels;
mod renderer;
mod text;
mod transform;

pub use draw::{FrameBuffer, Rgba};
pub use frame::{OperatorOverlay, ViewFrame};
pub use labels::{DamageLabelCache, LabelBitmap};
pub use renderer::{compose, Renderer, SQUAD_COLORS};
pub use text::{draw_text, line_height, text_width};
pub use transform::{
    cell_screen_rect, visible_cells, world_to_screen_px, CellRange, ScreenRect, Viewport,
};
