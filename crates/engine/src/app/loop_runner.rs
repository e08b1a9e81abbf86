use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowBuilder};

use crate::assets::discover_images;
use crate::persist::{SaveFormat, SlotStore};
use crate::AppPaths;

use super::controller::SceneController;
use super::editing::ViewKind;
use super::input::{key_from_physical, pointer_button, Modifiers};
use super::metrics::{IntervalStats, MetricsHandle};
use super::rendering::{Renderer, ViewFrame};

pub const SAVE_FORMAT_ENV_VAR: &str = "VTT_SAVE_FORMAT";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl WindowConfig {
    fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            width: 1280,
            height: 800,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::titled("VTT")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopConfig {
    pub operator_window: WindowConfig,
    pub player_window: WindowConfig,
    pub save_format: SaveFormat,
    pub metrics_log_interval_ms: u64,
    pub max_render_fps: Option<u32>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            operator_window: WindowConfig::titled("Operator View"),
            player_window: WindowConfig::titled("Player View"),
            save_format: SaveFormat::default(),
            metrics_log_interval_ms: 1000,
            max_render_fps: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create {view} window: {source}")]
    CreateWindow {
        view: &'static str,
        #[source]
        source: OsError,
    },
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

pub fn run_app(config: LoopConfig, paths: &AppPaths) -> Result<(), AppError> {
    run_app_with_metrics(config, paths, MetricsHandle::default())
}

pub fn run_app_with_metrics(
    config: LoopConfig,
    paths: &AppPaths,
    metrics_handle: MetricsHandle,
) -> Result<(), AppError> {
    let save_format = resolve_save_format(config.save_format);
    let maps = discover_maps(&paths.maps_dir);
    info!(
        root = %paths.root.display(),
        maps_dir = %paths.maps_dir.display(),
        saves_dir = %paths.saves_dir.display(),
        map_count = maps.len(),
        save_format = %save_format,
        "startup"
    );
    let mut controller =
        SceneController::new(SlotStore::new(&paths.saves_dir, save_format), maps);
    if !controller.maps().is_empty() {
        controller.show_map(0);
    }

    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let operator_window = Arc::new(build_window(
        &event_loop,
        &config.operator_window,
        "operator",
    )?);
    let player_window = Arc::new(build_window(&event_loop, &config.player_window, "player")?);
    let mut operator_renderer =
        Renderer::new(Arc::clone(&operator_window)).map_err(AppError::CreateRenderer)?;
    let mut player_renderer =
        Renderer::new(Arc::clone(&player_window)).map_err(AppError::CreateRenderer)?;
    let viewport = operator_renderer.viewport();
    controller.set_operator_viewport(viewport.width, viewport.height);

    event_loop.set_control_flow(ControlFlow::Poll);

    let metrics_log_interval = normalize_non_zero_duration(
        Duration::from_millis(config.metrics_log_interval_ms),
        Duration::from_secs(1),
    );
    let effective_render_cap = normalize_render_fps_cap(config.max_render_fps);
    let render_frame_target = target_frame_duration(effective_render_cap);
    info!(
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        render_fps_cap = %format_render_cap(effective_render_cap),
        "loop_config"
    );

    let mut router = InputRouter::default();
    let mut last_frame_instant = Instant::now();
    let mut last_present_instant = Instant::now();
    let mut interval_stats = IntervalStats::new(metrics_log_interval);

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } => {
                let view = if window_id == operator_window.id() {
                    ViewKind::Operator
                } else if window_id == player_window.id() {
                    ViewKind::Player
                } else {
                    return;
                };
                let renderer = match view {
                    ViewKind::Operator => &mut operator_renderer,
                    ViewKind::Player => &mut player_renderer,
                };
                match event {
                    WindowEvent::CloseRequested => {
                        info!(view = ?view, reason = "window_close", "shutdown_requested");
                        window_target.exit();
                    }
                    WindowEvent::Resized(size) => {
                        resize_view(
                            renderer,
                            &mut controller,
                            view,
                            size.width,
                            size.height,
                            window_target,
                        );
                    }
                    WindowEvent::ScaleFactorChanged { .. } => {
                        let size = renderer.window().inner_size();
                        resize_view(
                            renderer,
                            &mut controller,
                            view,
                            size.width,
                            size.height,
                            window_target,
                        );
                    }
                    WindowEvent::RedrawRequested if view == ViewKind::Operator => {
                        let now = Instant::now();
                        let frame_dt = now.saturating_duration_since(last_frame_instant);
                        last_frame_instant = now;

                        // Single pacing point for both views.
                        let elapsed_since_present =
                            Instant::now().saturating_duration_since(last_present_instant);
                        let cap_sleep =
                            compute_cap_sleep(elapsed_since_present, render_frame_target);
                        if cap_sleep > Duration::ZERO {
                            thread::sleep(cap_sleep);
                        }

                        controller.update_cameras();
                        let overlay = controller.operator_overlay();
                        let frames = [
                            (ViewKind::Operator, Some(&overlay)),
                            (ViewKind::Player, None),
                        ];
                        for (kind, overlay) in frames {
                            let frame = ViewFrame {
                                view: kind,
                                scene: controller.scene(),
                                assets: controller.assets(),
                                camera: controller.camera(kind).current,
                                show_grid: controller.show_grid(),
                                overlay,
                            };
                            let target = match kind {
                                ViewKind::Operator => &mut operator_renderer,
                                ViewKind::Player => &mut player_renderer,
                            };
                            if let Err(error) = target.render(&frame) {
                                warn!(view = ?kind, error = %error, "renderer_draw_failed");
                                window_target.exit();
                            }
                        }
                        last_present_instant = Instant::now();
                        interval_stats.frame(frame_dt, controller.scene());

                        if let Some(metrics) = interval_stats.close_if_due(now) {
                            metrics_handle.store(metrics);
                            info!(
                                fps = metrics.fps,
                                frame_time_ms = metrics.frame_time_ms,
                                slowest_frame_ms = metrics.slowest_frame_ms,
                                tokens = metrics.tokens,
                                drawings = metrics.drawings,
                                fogged_cells = metrics.fogged_cells,
                                "loop_metrics"
                            );
                        }
                    }
                    other if view == ViewKind::Operator => router.route(&mut controller, other),
                    _ => {}
                }
            }
            Event::AboutToWait => {
                operator_window.request_redraw();
            }
            Event::LoopExiting => {
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

fn build_window(
    event_loop: &EventLoop<()>,
    config: &WindowConfig,
    view: &'static str,
) -> Result<Window, AppError> {
    WindowBuilder::new()
        .with_title(config.title.clone())
        .with_inner_size(LogicalSize::new(config.width as f64, config.height as f64))
        .build(event_loop)
        .map_err(|source| AppError::CreateWindow { view, source })
}

fn resize_view(
    renderer: &mut Renderer,
    controller: &mut SceneController,
    view: ViewKind,
    width: u32,
    height: u32,
    window_target: &EventLoopWindowTarget<()>,
) {
    if let Err(error) = renderer.resize(width, height) {
        warn!(view = ?view, error = %error, "renderer_resize_failed");
        window_target.exit();
        return;
    }
    if view == ViewKind::Operator && width > 0 && height > 0 {
        controller.set_operator_viewport(width, height);
    }
}

fn discover_maps(dir: &Path) -> Vec<PathBuf> {
    match discover_images(dir) {
        Ok(maps) => maps,
        Err(error) => {
            warn!(dir = %dir.display(), error = %error, "map_discovery_failed");
            Vec::new()
        }
    }
}

/// Translates operator-window events into controller calls. Only key presses
/// count; releases and auto-repeat are dropped.
#[derive(Debug, Default)]
struct InputRouter {
    modifiers: Modifiers,
    cursor: Option<(f32, f32)>,
}

impl InputRouter {
    fn route(&mut self, controller: &mut SceneController, event: WindowEvent) {
        match event {
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = Modifiers::from(modifiers.state());
            }
            WindowEvent::KeyboardInput { event, .. } => {
                self.route_key(controller, event.physical_key, event.state, event.repeat);
            }
            WindowEvent::CursorMoved { position, .. } => {
                let (x, y) = (position.x as f32, position.y as f32);
                self.cursor = Some((x, y));
                controller.pointer_moved(x, y);
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                controller.pointer_left();
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.route_button(controller, button, state);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = zoom_steps_from_scroll_delta(delta);
                if steps != 0 {
                    let (x, y) = self.cursor.unwrap_or((0.0, 0.0));
                    controller.scroll(x, y, steps);
                }
            }
            WindowEvent::DroppedFile(path) => {
                controller.file_dropped(&path);
            }
            _ => {}
        }
    }

    fn route_key(
        &mut self,
        controller: &mut SceneController,
        physical_key: PhysicalKey,
        state: ElementState,
        repeat: bool,
    ) {
        if state != ElementState::Pressed || repeat {
            return;
        }
        if let Some(key) = key_from_physical(physical_key) {
            controller.handle_key(key, self.modifiers);
        }
    }

    fn route_button(
        &mut self,
        controller: &mut SceneController,
        button: MouseButton,
        state: ElementState,
    ) {
        let Some(button) = pointer_button(button) else {
            return;
        };
        let Some((x, y)) = self.cursor else {
            return;
        };
        match state {
            ElementState::Pressed => controller.pointer_pressed(button, x, y, self.modifiers),
            ElementState::Released => controller.pointer_released(button, x, y),
        }
    }
}

fn resolve_save_format(config_format: SaveFormat) -> SaveFormat {
    match env::var(SAVE_FORMAT_ENV_VAR) {
        Ok(value) => save_format_override(&value, config_format),
        Err(env::VarError::NotPresent) => config_format,
        Err(err) => {
            warn!(
                env_var = SAVE_FORMAT_ENV_VAR,
                error = %err,
                "unable to read save-format env var; falling back to config"
            );
            config_format
        }
    }
}

fn save_format_override(value: &str, fallback: SaveFormat) -> SaveFormat {
    SaveFormat::parse(value).unwrap_or_else(|| {
        warn!(
            env_var = SAVE_FORMAT_ENV_VAR,
            value,
            "invalid save-format env var value; falling back to config"
        );
        fallback
    })
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn normalize_render_fps_cap(cap: Option<u32>) -> Option<u32> {
    cap.filter(|value| *value > 0)
}

fn target_frame_duration(max_render_fps: Option<u32>) -> Option<Duration> {
    max_render_fps.map(|fps| Duration::from_secs_f64(1.0 / fps as f64))
}

fn compute_cap_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    match target {
        Some(frame_target) if elapsed < frame_target => frame_target - elapsed,
        _ => Duration::ZERO,
    }
}

fn format_render_cap(cap: Option<u32>) -> String {
    match cap {
        Some(value) => value.to_string(),
        None => "off".to_string(),
    }
}

fn zoom_steps_from_scroll_delta(delta: MouseScrollDelta) -> i32 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => y.round() as i32,
        MouseScrollDelta::PixelDelta(position) => {
            if position.y > 0.0 {
                1
            } else if position.y < 0.0 {
                -1
            } else {
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use winit::dpi::PhysicalPosition;
    use winit::keyboard::KeyCode;

    use super::*;
    use crate::app::editing::Tool;

    fn controller(temp: &TempDir) -> SceneController {
        SceneController::new(
            SlotStore::new(temp.path().join("saves"), SaveFormat::Embedded),
            Vec::new(),
        )
    }

    #[test]
    fn key_presses_route_once_and_ignore_repeat_and_release() {
        let temp = TempDir::new().expect("temp");
        let mut controller = controller(&temp);
        let mut router = InputRouter::default();
        let grid_key = PhysicalKey::Code(KeyCode::KeyG);

        router.route_key(&mut controller, grid_key, ElementState::Pressed, false);
        assert!(!controller.show_grid());
        router.route_key(&mut controller, grid_key, ElementState::Pressed, true);
        router.route_key(&mut controller, grid_key, ElementState::Released, false);
        assert!(!controller.show_grid());

        router.route_key(
            &mut controller,
            PhysicalKey::Code(KeyCode::Digit4),
            ElementState::Pressed,
            false,
        );
        assert_eq!(controller.tool(), Tool::Draw);
    }

    #[test]
    fn buttons_need_a_known_cursor() {
        let temp = TempDir::new().expect("temp");
        let mut controller = controller(&temp);
        let mut router = InputRouter::default();

        router.route_button(&mut controller, MouseButton::Right, ElementState::Pressed);
        router.cursor = Some((100.0, 100.0));
        router.route_button(&mut controller, MouseButton::Right, ElementState::Pressed);
        controller.pointer_moved(90.0, 100.0);
        router.route_button(&mut controller, MouseButton::Right, ElementState::Released);
        assert_eq!(controller.camera(ViewKind::Operator).target.x, 10.0);
    }

    #[test]
    fn save_format_override_accepts_known_names_only() {
        assert_eq!(
            save_format_override("Legacy", SaveFormat::Embedded),
            SaveFormat::Legacy
        );
        assert_eq!(
            save_format_override("zip", SaveFormat::Embedded),
            SaveFormat::Embedded
        );
    }

    #[test]
    fn default_config_names_both_views() {
        let config = LoopConfig::default();
        assert_eq!(config.operator_window.title, "Operator View");
        assert_eq!(config.player_window.title, "Player View");
        assert_eq!(config.max_render_fps, None);
    }

    #[test]
    fn pixel_wheel_delta_maps_to_single_discrete_step_direction() {
        assert_eq!(
            zoom_steps_from_scroll_delta(MouseScrollDelta::PixelDelta(PhysicalPosition::new(
                0.0, 12.0
            ))),
            1
        );
        assert_eq!(
            zoom_steps_from_scroll_delta(MouseScrollDelta::PixelDelta(PhysicalPosition::new(
                0.0, -3.0
            ))),
            -1
        );
        assert_eq!(
            zoom_steps_from_scroll_delta(MouseScrollDelta::LineDelta(0.0, 2.0)),
            2
        );
    }

    #[test]
    fn render_cap_sleeps_only_under_budget() {
        let target = target_frame_duration(normalize_render_fps_cap(Some(50)));
        assert_eq!(target, Some(Duration::from_millis(20)));
        assert_eq!(
            compute_cap_sleep(Duration::from_millis(5), target),
            Duration::from_millis(15)
        );
        assert_eq!(
            compute_cap_sleep(Duration::from_millis(25), target),
            Duration::ZERO
        );
        assert_eq!(normalize_render_fps_cap(Some(0)), None);
        assert_eq!(format_render_cap(None), "off");
    }
}
