use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture};
use winit::window::Window;

use crate::app::editing::{
    wheel_sector_center, CalibrationSession, Measurement, ViewKind, WHEEL_INNER_RADIUS_PX,
    WHEEL_OUTER_RADIUS_PX,
};
use crate::scene::{
    CameraPose, Condition, ConditionSet, Drawing, GridPoint, Shape, Token, OPAQUE,
};

use super::draw::{FrameBuffer, Rgba};
use super::frame::{OperatorOverlay, ViewFrame};
use super::labels::DamageLabelCache;
use super::text::{draw_text, line_height, text_width};
use super::transform::{cell_screen_rect, visible_cells, world_to_screen_px, ScreenRect, Viewport};

const CLEAR_COLOR: Rgba = [20, 22, 28, 255];
const GRID_LINE_COLOR: Rgba = [235, 235, 235, 70];
const FOG_OPERATOR_COLOR: Rgba = [0, 0, 0, 150];
const FOG_PLAYER_COLOR: Rgba = [6, 6, 10, 255];
const SELECTION_COLOR: Rgba = [80, 220, 255, 255];
const BADGE_BG_COLOR: Rgba = [150, 20, 20, 230];
const BADGE_TEXT_COLOR: Rgba = [255, 255, 255, 255];
const TAG_BG_COLOR: Rgba = [10, 12, 16, 200];
const TAG_TEXT_COLOR: Rgba = [250, 220, 120, 255];
const CALIBRATION_COLOR: Rgba = [255, 210, 70, 255];
const CALIBRATION_DIVIDER_COLOR: Rgba = [255, 210, 70, 120];
const MEASURE_COLOR: Rgba = [255, 255, 255, 255];
const WHEEL_BG_COLOR: Rgba = [10, 12, 16, 170];
const WHEEL_RING_COLOR: Rgba = [176, 198, 220, 255];
const WHEEL_ACTIVE_COLOR: Rgba = [120, 255, 140, 255];
const WHEEL_IDLE_COLOR: Rgba = [176, 198, 220, 255];
const HUD_TEXT_COLOR: Rgba = [244, 248, 252, 255];
const HUD_PANEL_BG_COLOR: Rgba = [10, 12, 16, 210];
const HUD_PANEL_BORDER_COLOR: Rgba = [92, 106, 126, 255];

/// Squad and drawing palette, indexed by squad.
pub const SQUAD_COLORS: [Rgba; 8] = [
    [230, 60, 60, 255],
    [60, 130, 240, 255],
    [70, 200, 90, 255],
    [240, 200, 50, 255],
    [190, 90, 220, 255],
    [240, 140, 40, 255],
    [60, 210, 210, 255],
    [240, 240, 240, 255],
];

const SQUAD_BORDER_PX: i32 = 2;
const HUD_TEXT_SCALE: i32 = 2;
const HUD_PADDING_PX: i32 = 8;
const TAG_TEXT_SCALE: i32 = 1;
const WHEEL_TEXT_SCALE: i32 = 2;

/// One window's software surface.
pub struct Renderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    viewport: Viewport,
    labels: DamageLabelCache,
}

impl Renderer {
    pub fn new(window: Arc<Window>) -> Result<Self, Error> {
        let size = window.inner_size();
        let pixels = Self::build_pixels(Arc::clone(&window), size.width, size.height)?;
        Ok(Self {
            window,
            pixels,
            viewport: Viewport {
                width: size.width,
                height: size.height,
            },
            labels: DamageLabelCache::default(),
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels = Self::build_pixels(Arc::clone(&self.window), width, height)?;
        self.viewport = Viewport { width, height };
        Ok(())
    }

    fn build_pixels(
        window: Arc<Window>,
        width: u32,
        height: u32,
    ) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(width, height, window);
        Pixels::new(width, height, surface)
    }

    pub fn render(&mut self, frame: &ViewFrame<'_>) -> Result<(), Error> {
        if self.viewport.is_empty() {
            return Ok(());
        }
        let mut buf = FrameBuffer::new(
            self.pixels.frame_mut(),
            self.viewport.width,
            self.viewport.height,
        );
        compose(&mut buf, frame, &mut self.labels);
        self.pixels.render()
    }
}

/// Draws one complete view into `buf`. Reads the scene only.
pub fn compose(buf: &mut FrameBuffer<'_>, frame: &ViewFrame<'_>, labels: &mut DamageLabelCache) {
    buf.clear(CLEAR_COLOR);
    let operator = frame.view == ViewKind::Operator;

    draw_map(buf, frame);
    if operator && frame.show_grid {
        draw_grid_lines(buf, frame);
    }
    for drawing in &frame.scene.drawings {
        draw_drawing(buf, &frame.camera, drawing);
    }
    draw_fog(buf, frame);
    for token in &frame.scene.tokens {
        draw_token(buf, frame, token, labels);
    }
    labels.end_frame();

    let Some(overlay) = frame.overlay.filter(|_| operator) else {
        return;
    };
    if let Some(drawing) = &overlay.pending_drawing {
        draw_drawing(buf, &frame.camera, drawing);
    }
    if let Some(session) = &overlay.calibration {
        draw_calibration(buf, &frame.camera, session);
    }
    if let Some(measurement) = &overlay.measurement {
        draw_measurement(buf, frame, measurement);
    }
    if let Some(conditions) = overlay.wheel {
        draw_condition_wheel(buf, conditions);
    }
    draw_hud(buf, overlay);
}

fn viewport_of(buf: &FrameBuffer<'_>) -> Viewport {
    Viewport {
        width: buf.width(),
        height: buf.height(),
    }
}

fn draw_map(buf: &mut FrameBuffer<'_>, frame: &ViewFrame<'_>) {
    let Some(image) = frame
        .scene
        .map
        .and_then(|handle| frame.assets.maps.pixels(handle))
    else {
        return;
    };
    let top_left = world_to_screen_px(&frame.camera, 0.0, 0.0);
    let bottom_right =
        world_to_screen_px(&frame.camera, image.width() as f64, image.height() as f64);
    buf.blit_scaled(image, ScreenRect::from_corners(top_left, bottom_right), OPAQUE);
}

fn draw_grid_lines(buf: &mut FrameBuffer<'_>, frame: &ViewFrame<'_>) {
    let grid = &frame.scene.grid;
    let Some(range) = visible_cells(grid, &frame.camera, viewport_of(buf)) else {
        return;
    };
    let first = cell_screen_rect(grid, &frame.camera, range.min, 1);
    let last = cell_screen_rect(grid, &frame.camera, range.max, 1);
    for x in range.min.x..=range.max.x + 1 {
        let column = cell_screen_rect(grid, &frame.camera, GridPoint::new(x, range.min.y), 1);
        buf.vline(column.left, first.top, last.bottom, GRID_LINE_COLOR);
    }
    for y in range.min.y..=range.max.y + 1 {
        let row = cell_screen_rect(grid, &frame.camera, GridPoint::new(range.min.x, y), 1);
        buf.hline(row.top, first.left, last.right, GRID_LINE_COLOR);
    }
}

fn draw_drawing(buf: &mut FrameBuffer<'_>, camera: &CameraPose, drawing: &Drawing) {
    let color = SQUAD_COLORS[drawing.color() as usize % SQUAD_COLORS.len()];
    match drawing.shape {
        Shape::Rectangle => {
            let (min, max) = drawing.bounds();
            let a = world_to_screen_px(camera, min.x as f64, min.y as f64);
            let b = world_to_screen_px(camera, max.x as f64 + 1.0, max.y as f64 + 1.0);
            buf.outline_rect(ScreenRect::from_corners(a, b), 2, color);
        }
        Shape::Circle => {
            let ((cx, cy), radius) = drawing.circle();
            let center = camera.world_to_screen(cx, cy);
            let radius = radius as f32 * camera.effective_zoom();
            buf.circle(center, radius, color);
            buf.circle(center, radius - 1.0, color);
        }
    }
}

fn draw_fog(buf: &mut FrameBuffer<'_>, frame: &ViewFrame<'_>) {
    let color = match frame.view {
        ViewKind::Operator => FOG_OPERATOR_COLOR,
        ViewKind::Player => FOG_PLAYER_COLOR,
    };
    let grid = &frame.scene.grid;
    let Some(range) = visible_cells(grid, &frame.camera, viewport_of(buf)) else {
        return;
    };
    for cell in range.iter() {
        if !frame.scene.fog.get_point(cell) {
            buf.fill_rect(cell_screen_rect(grid, &frame.camera, cell, 1), color);
        }
    }
}

/// Whether a view shows `token` at all, and at what opacity.
fn token_opacity(view: ViewKind, token: &Token, anchor_visible: bool) -> Option<u8> {
    match view {
        ViewKind::Player if token.hidden || !anchor_visible => None,
        ViewKind::Player => Some(token.opacity),
        ViewKind::Operator if token.hidden => Some(token.opacity / 2),
        ViewKind::Operator => Some(token.opacity),
    }
}

fn draw_token(
    buf: &mut FrameBuffer<'_>,
    frame: &ViewFrame<'_>,
    token: &Token,
    labels: &mut DamageLabelCache,
) {
    let anchor_visible = frame.scene.fog.get_point(token.cell);
    let Some(opacity) = token_opacity(frame.view, token, anchor_visible) else {
        return;
    };
    let rect = cell_screen_rect(
        &frame.scene.grid,
        &frame.camera,
        token.cell,
        token.size() as u32,
    );
    if rect.right < 0
        || rect.bottom < 0
        || rect.left >= buf.width() as i32
        || rect.top >= buf.height() as i32
    {
        return;
    }

    let image = frame.assets.tokens.pixels_or_placeholder(token.image);
    buf.blit_scaled(image, rect, opacity);
    if let Some(squad) = token.squad {
        buf.outline_rect(rect, SQUAD_BORDER_PX, SQUAD_COLORS[squad.index() as usize]);
    }
    if token.selected && frame.view == ViewKind::Operator {
        buf.outline_rect(rect.inset(-SQUAD_BORDER_PX - 1), 2, SELECTION_COLOR);
    }
    if token.damage() > 0 {
        let label = labels.label(token.damage());
        let badge = ScreenRect {
            left: rect.right - label.width() - 4,
            top: rect.top,
            right: rect.right,
            bottom: rect.top + label.height() + 4,
        };
        buf.fill_rect(badge, BADGE_BG_COLOR);
        label.draw(buf, badge.left + 2, badge.top + 2, BADGE_TEXT_COLOR);
    }
    draw_condition_tags(buf, rect, token.conditions);
}

fn draw_condition_tags(buf: &mut FrameBuffer<'_>, rect: ScreenRect, conditions: ConditionSet) {
    let tag_height = line_height(TAG_TEXT_SCALE);
    let mut x = rect.left;
    let y = rect.bottom - tag_height;
    for condition in conditions.iter() {
        let text = condition.abbreviation();
        let width = text_width(text, TAG_TEXT_SCALE) + 2;
        buf.fill_rect(
            ScreenRect {
                left: x,
                top: y,
                right: x + width,
                bottom: rect.bottom,
            },
            TAG_BG_COLOR,
        );
        draw_text(buf, x + 1, y + 1, text, TAG_TEXT_SCALE, TAG_TEXT_COLOR);
        x += width + 1;
    }
}

fn draw_calibration(buf: &mut FrameBuffer<'_>, camera: &CameraPose, session: &CalibrationSession) {
    let a = world_to_screen_px(camera, session.start.x as f64, session.start.y as f64);
    let b = world_to_screen_px(camera, session.end.x as f64, session.end.y as f64);
    let rect = ScreenRect::from_corners(a, b);
    if !rect.is_empty() {
        for step in 1..session.cells_wide {
            let x = rect.left + rect.width() * step as i32 / session.cells_wide as i32;
            buf.vline(x, rect.top, rect.bottom, CALIBRATION_DIVIDER_COLOR);
        }
        for step in 1..session.cells_tall {
            let y = rect.top + rect.height() * step as i32 / session.cells_tall as i32;
            buf.hline(y, rect.left, rect.right, CALIBRATION_DIVIDER_COLOR);
        }
    }
    buf.outline_rect(rect, 2, CALIBRATION_COLOR);
    let label = format!("{}X{}", session.cells_wide, session.cells_tall);
    draw_text(buf, rect.left, rect.bottom + 4, &label, HUD_TEXT_SCALE, CALIBRATION_COLOR);
}

fn draw_measurement(buf: &mut FrameBuffer<'_>, frame: &ViewFrame<'_>, measurement: &Measurement) {
    let grid = &frame.scene.grid;
    let (fx, fy) = grid.cell_center_world(measurement.from);
    let (tx, ty) = grid.cell_center_world(measurement.to);
    let from = world_to_screen_px(&frame.camera, fx, fy);
    let to = world_to_screen_px(&frame.camera, tx, ty);
    buf.line(from, to, MEASURE_COLOR);
    let label = measurement.cells().to_string();
    draw_text(buf, to.0 + 8, to.1 - 8, &label, HUD_TEXT_SCALE, MEASURE_COLOR);
}

fn draw_condition_wheel(buf: &mut FrameBuffer<'_>, conditions: ConditionSet) {
    let (cx, cy) = viewport_of(buf).center();
    let outer = WHEEL_OUTER_RADIUS_PX;
    let inner = WHEEL_INNER_RADIUS_PX;
    let bounds = ScreenRect::from_corners(
        ((cx - outer) as i32, (cy - outer) as i32),
        ((cx + outer) as i32, (cy + outer) as i32),
    );
    buf.fill_rect(bounds, WHEEL_BG_COLOR);
    buf.circle((cx, cy), outer, WHEEL_RING_COLOR);
    buf.circle((cx, cy), inner, WHEEL_RING_COLOR);

    let span = std::f32::consts::TAU / Condition::ALL.len() as f32;
    for condition in Condition::ALL {
        let edge = condition.index() as f32 * span;
        buf.line(
            (
                (cx + inner * edge.cos()) as i32,
                (cy + inner * edge.sin()) as i32,
            ),
            (
                (cx + outer * edge.cos()) as i32,
                (cy + outer * edge.sin()) as i32,
            ),
            WHEEL_RING_COLOR,
        );

        let mid = wheel_sector_center(condition);
        let radius = (inner + outer) * 0.5;
        let text = condition.abbreviation();
        let color = if conditions.contains(condition) {
            WHEEL_ACTIVE_COLOR
        } else {
            WHEEL_IDLE_COLOR
        };
        let x = (cx + radius * mid.cos()) as i32 - text_width(text, WHEEL_TEXT_SCALE) / 2;
        let y = (cy + radius * mid.sin()) as i32 - line_height(WHEEL_TEXT_SCALE) / 2;
        draw_text(buf, x, y, text, WHEEL_TEXT_SCALE, color);
    }
}

fn draw_hud(buf: &mut FrameBuffer<'_>, overlay: &OperatorOverlay) {
    if overlay.hud.is_empty() {
        return;
    }
    let line = line_height(HUD_TEXT_SCALE);
    let width = overlay
        .hud
        .iter()
        .map(|text| text_width(text, HUD_TEXT_SCALE))
        .max()
        .unwrap_or(0);
    let panel = ScreenRect {
        left: HUD_PADDING_PX,
        top: HUD_PADDING_PX,
        right: HUD_PADDING_PX * 3 + width,
        bottom: HUD_PADDING_PX * 3 + line * overlay.hud.len() as i32,
    };
    buf.fill_rect(panel, HUD_PANEL_BG_COLOR);
    buf.outline_rect(panel, 1, HUD_PANEL_BORDER_COLOR);
    for (row, text) in overlay.hud.iter().enumerate() {
        draw_text(
            buf,
            panel.left + HUD_PADDING_PX,
            panel.top + HUD_PADDING_PX + row as i32 * line,
            text,
            HUD_TEXT_SCALE,
            HUD_TEXT_COLOR,
        );
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba as Pixel, RgbaImage};

    use super::*;
    use crate::assets::{encode_png, AssetLibraries};
    use crate::scene::{GridSpace, SceneState, WorldPoint};

    const WIDTH: u32 = 200;
    const HEIGHT: u32 = 200;

    struct Fixture {
        scene: SceneState,
        assets: AssetLibraries,
    }

    impl Fixture {
        fn new() -> Self {
            let mut assets = AssetLibraries::default();
            let red = RgbaImage::from_pixel(4, 4, Pixel([255, 0, 0, 255]));
            let bytes = encode_png(&red).expect("encode");
            let handle = assets.tokens.extract("red.png", &bytes).expect("extract");

            let mut scene = SceneState::default();
            scene.set_grid(GridSpace::new(50, 0, 0, 4, 4).expect("grid"));
            scene
                .tokens
                .push(Token::new(GridPoint::new(1, 1), handle))
                .expect("push");
            Self { scene, assets }
        }

        fn render(
            &self,
            view: ViewKind,
            overlay: Option<&OperatorOverlay>,
            labels: &mut DamageLabelCache,
        ) -> Vec<u8> {
            let mut pixels = vec![0; (WIDTH * HEIGHT * 4) as usize];
            let mut buf = FrameBuffer::new(&mut pixels, WIDTH, HEIGHT);
            let frame = ViewFrame {
                view,
                scene: &self.scene,
                assets: &self.assets,
                camera: CameraPose::default(),
                show_grid: true,
                overlay,
            };
            compose(&mut buf, &frame, labels);
            pixels
        }
    }

    fn pixel_at(pixels: &[u8], x: u32, y: u32) -> Rgba {
        let offset = ((y * WIDTH + x) * 4) as usize;
        let mut out = [0; 4];
        out.copy_from_slice(&pixels[offset..offset + 4]);
        out
    }

    #[test]
    fn visible_token_draws_in_both_views() {
        let fixture = Fixture::new();
        let mut labels = DamageLabelCache::default();
        for view in [ViewKind::Operator, ViewKind::Player] {
            let pixels = fixture.render(view, None, &mut labels);
            assert_eq!(pixel_at(&pixels, 75, 75), [255, 0, 0, 255]);
        }
    }

    #[test]
    fn hidden_token_is_dimmed_for_operator_and_absent_for_player() {
        let mut fixture = Fixture::new();
        if let Some(token) = fixture.scene.tokens.get_mut(0) {
            token.hidden = true;
        }
        let mut labels = DamageLabelCache::default();

        let operator = fixture.render(ViewKind::Operator, None, &mut labels);
        let dimmed = pixel_at(&operator, 75, 75);
        assert_ne!(dimmed, CLEAR_COLOR);
        assert!(dimmed[0] < 255);

        let player = fixture.render(ViewKind::Player, None, &mut labels);
        assert_eq!(pixel_at(&player, 75, 75), CLEAR_COLOR);
    }

    #[test]
    fn fogged_cells_are_opaque_for_player_only() {
        let mut fixture = Fixture::new();
        fixture.scene.fog.set(1, 1, false);
        fixture.scene.fog.set(3, 3, false);
        let mut labels = DamageLabelCache::default();

        let player = fixture.render(ViewKind::Player, None, &mut labels);
        assert_eq!(pixel_at(&player, 75, 75), FOG_PLAYER_COLOR);
        assert_eq!(pixel_at(&player, 175, 175), FOG_PLAYER_COLOR);

        let operator = fixture.render(ViewKind::Operator, None, &mut labels);
        assert_eq!(pixel_at(&operator, 75, 75), [255, 0, 0, 255]);
        assert_ne!(pixel_at(&operator, 175, 175), FOG_PLAYER_COLOR);
        assert_ne!(pixel_at(&operator, 175, 175), CLEAR_COLOR);
    }

    #[test]
    fn grid_lines_are_operator_only() {
        let fixture = Fixture::new();
        let mut labels = DamageLabelCache::default();
        let operator = fixture.render(ViewKind::Operator, None, &mut labels);
        let player = fixture.render(ViewKind::Player, None, &mut labels);
        assert_ne!(pixel_at(&operator, 150, 10), CLEAR_COLOR);
        assert_eq!(pixel_at(&player, 150, 10), CLEAR_COLOR);
    }

    #[test]
    fn damage_labels_follow_the_current_value() {
        let mut fixture = Fixture::new();
        if let Some(token) = fixture.scene.tokens.get_mut(0) {
            token.set_damage(7);
        }
        let mut labels = DamageLabelCache::default();
        fixture.render(ViewKind::Player, None, &mut labels);
        assert!(labels.contains(7));

        if let Some(token) = fixture.scene.tokens.get_mut(0) {
            token.apply_damage(5);
        }
        fixture.render(ViewKind::Player, None, &mut labels);
        assert!(labels.contains(12));
        assert!(!labels.contains(7));
        assert_eq!(labels.len(), 1);
    }

    #[test]
    fn overlay_is_ignored_in_player_view() {
        let fixture = Fixture::new();
        let overlay = OperatorOverlay {
            hud: vec!["SELECT".to_string()],
            pending_drawing: Some(Drawing::new(
                Shape::Rectangle,
                WorldPoint::new(0, 0),
                WorldPoint::new(20, 20),
                0,
            )),
            ..OperatorOverlay::default()
        };
        let mut labels = DamageLabelCache::default();
        let operator = fixture.render(ViewKind::Operator, Some(&overlay), &mut labels);
        let player = fixture.render(ViewKind::Player, Some(&overlay), &mut labels);
        let corner = HUD_PADDING_PX as u32;
        assert_eq!(pixel_at(&operator, corner, corner), HUD_PANEL_BORDER_COLOR);
        assert_eq!(pixel_at(&player, corner, corner), CLEAR_COLOR);
    }

    #[test]
    fn tokens_without_pixels_fall_back_to_placeholder() {
        let mut fixture = Fixture::new();
        if let Some(token) = fixture.scene.tokens.get_mut(0) {
            token.image = crate::assets::AssetHandle::PLACEHOLDER;
        }
        let mut labels = DamageLabelCache::default();
        let pixels = fixture.render(ViewKind::Player, None, &mut labels);
        assert_ne!(pixel_at(&pixels, 75, 75), CLEAR_COLOR);
    }
}
