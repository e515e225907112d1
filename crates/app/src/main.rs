//! Demo scene for the Vulkan renderer.
//!
//! A lit PBR cube on a ground plane, seen from (0, 3, 5).
//!
//! Controls: WASD/QE move, right mouse drag looks around, F1 requests a
//! 2048² shadow map, F2 toggles the grid, F3 logs frame statistics,
//! Escape quits.

use std::path::Path;

use anyhow::{Context, Result};
use glam::Vec3;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use renderer_core::{EngineConfig, ResourcePaths, Timer};
use renderer_platform::{InputState, KeyCode, MouseButton, Window};
use renderer_renderer::{FrameOutcome, NoUi, Renderer};
use renderer_scene::{Camera, DirectionalLight, MaterialRef, MeshRef, Name, Registry, Transform};

const CONFIG_PATH: &str = "renderer.toml";
const MOVE_SPEED: f32 = 3.0;
const LOOK_SENSITIVITY: f32 = 0.1;
const DEFERRED_SHADOW_RESOLUTION: u32 = 2048;

struct App {
    config: EngineConfig,
    // Drops before the renderer so materials lose their last owners first,
    // and the renderer drops before the window that owns the surface.
    registry: Option<Registry>,
    renderer: Option<Renderer>,
    window: Option<Window>,
    input: InputState,
    timer: Timer,
    grid_enabled: bool,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: None,
            renderer: None,
            window: None,
            input: InputState::new(),
            timer: Timer::new(),
            grid_enabled: true,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window =
            Window::new(event_loop, &self.config.window).context("Failed to create window")?;
        let paths = ResourcePaths::discover(self.config.resource_root.as_deref());
        let mut renderer = Renderer::new(&window, &self.config, paths, Box::new(NoUi))
            .context("Failed to create renderer")?;
        let registry = build_scene(&mut renderer, window.aspect_ratio())?;

        info!("Initialization complete, entering main loop");
        self.registry = Some(registry);
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn update(&mut self, dt: f32) {
        let Some(registry) = &mut self.registry else {
            return;
        };
        let Some((_, camera)) = registry.camera_mut() else {
            return;
        };

        let step = MOVE_SPEED * dt;
        if self.input.is_key_pressed(KeyCode::KeyW) {
            camera.move_forward(step);
        }
        if self.input.is_key_pressed(KeyCode::KeyS) {
            camera.move_forward(-step);
        }
        if self.input.is_key_pressed(KeyCode::KeyD) {
            camera.move_right(step);
        }
        if self.input.is_key_pressed(KeyCode::KeyA) {
            camera.move_right(-step);
        }
        if self.input.is_key_pressed(KeyCode::KeyE) {
            camera.move_up(step);
        }
        if self.input.is_key_pressed(KeyCode::KeyQ) {
            camera.move_up(-step);
        }
        if self.input.is_mouse_pressed(MouseButton::Right) {
            let (dx, dy) = self.input.mouse_delta();
            camera.rotate(dx * LOOK_SENSITIVITY, -dy * LOOK_SENSITIVITY);
        }
        let scroll = self.input.scroll_delta();
        if scroll != 0.0 {
            camera.move_forward(scroll * 0.5);
        }
    }

    fn handle_keys(&mut self, event_loop: &ActiveEventLoop) {
        if self.input.is_key_just_pressed(KeyCode::Escape) {
            info!("Escape pressed, shutting down");
            event_loop.exit();
            return;
        }

        let Some(renderer) = &mut self.renderer else {
            return;
        };

        if self.input.is_key_just_pressed(KeyCode::F1) {
            let size = DEFERRED_SHADOW_RESOLUTION;
            match renderer.set_shadow_map_resolution(size, size, false) {
                Ok(()) => info!("Requested {}x{} shadow maps", size, size),
                Err(e) => error!("Shadow resolution change failed: {}", e),
            }
        }

        if self.input.is_key_just_pressed(KeyCode::F2) {
            self.grid_enabled = !self.grid_enabled;
            if let Err(e) = renderer.set_grid_enabled(self.grid_enabled) {
                error!("Failed to toggle grid: {}", e);
            }
        }

        if self.input.is_key_just_pressed(KeyCode::F3)
            && let Some(registry) = &self.registry
        {
            let stats = renderer.stats();
            let extent = renderer.shadows().settings().extent();
            let center = renderer.shadow_map_pixel_value(
                registry,
                (extent.width / 2) as i32,
                (extent.height / 2) as i32,
            );
            info!(
                "Frame {} ({:.1} fps): {:?}, shadow depth at center {:?}",
                renderer.frame_number(),
                self.timer.fps(),
                stats,
                center
            );
        }
    }
}

/// Camera at (0, 3, 5) looking at the origin, a downward directional light,
/// a unit PBR cube and a ground plane.
fn build_scene(renderer: &mut Renderer, aspect: f32) -> Result<Registry> {
    let mut registry = Registry::new();

    let mut camera = Camera::new(45.0, aspect, 0.1, 100.0);
    camera.set_position(Vec3::new(0.0, 3.0, 5.0));
    camera.set_target(Vec3::ZERO);
    let camera_entity = registry.spawn();
    registry.insert(camera_entity, camera);
    registry.insert(camera_entity, Name::new("MainCamera"));

    let sun = registry.spawn();
    registry.insert(sun, DirectionalLight::new(Vec3::new(0.0, -1.0, 0.0), Vec3::ONE));
    registry.insert(sun, Name::new("Sun"));

    let material = renderer
        .materials_mut()
        .create_pbr_material()
        .context("Failed to create PBR material")?;

    let cube_mesh = renderer
        .meshes_mut()
        .create_cube(1.0)
        .context("Failed to create cube mesh")?;
    let cube = registry.spawn();
    registry.insert(cube, Transform::new());
    registry.insert(cube, MeshRef::new(cube_mesh));
    registry.insert(cube, MaterialRef::new(material.clone()));
    registry.insert(cube, Name::new("Cube"));

    let plane_mesh = renderer
        .meshes_mut()
        .create_plane(10.0, 1)
        .context("Failed to create ground plane")?;
    let ground = registry.spawn();
    registry.insert(
        ground,
        Transform::new().with_position(Vec3::new(0.0, -0.5, 0.0)),
    );
    registry.insert(ground, MeshRef::new(plane_mesh));
    registry.insert(ground, MaterialRef::new(material));
    registry.insert(ground, Name::new("Ground"));

    info!("Scene built with {} entities", registry.len());
    Ok(registry)
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            error!("{:#}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = &mut self.window {
                    window.resize(size.width, size.height);
                    if let Some((_, camera)) =
                        self.registry.as_mut().and_then(Registry::camera_mut)
                    {
                        camera.set_aspect(window.aspect_ratio());
                    }
                }
                if let Some(renderer) = &mut self.renderer {
                    renderer.on_resize(size.width, size.height);
                }
            }
            WindowEvent::Occluded(occluded) => {
                if let Some(window) = &mut self.window {
                    window.set_suspended(occluded);
                }
            }
            WindowEvent::RedrawRequested => {
                let dt = self.timer.delta_secs();
                self.update(dt);
                self.handle_keys(event_loop);

                let (Some(window), Some(renderer), Some(registry)) =
                    (&self.window, &mut self.renderer, &self.registry)
                else {
                    return;
                };
                match renderer.render(registry, window.is_suspended()) {
                    Ok(FrameOutcome::Rendered) | Ok(FrameOutcome::Skipped) => {}
                    Err(e) => {
                        error!("Render error: {}", e);
                        event_loop.exit();
                    }
                }
                self.input.begin_frame();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => self.input.on_mouse_pressed(button.into()),
                ElementState::Released => self.input.on_mouse_released(button.into()),
            },
            WindowEvent::CursorMoved { position, .. } => {
                self.input
                    .on_mouse_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let dy = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 40.0,
                };
                self.input.on_scroll(dy);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = &self.renderer
            && let Err(e) = renderer.wait_idle()
        {
            error!("Failed to drain device on exit: {}", e);
        }
        self.registry = None;
        self.renderer = None;
        self.window = None;
    }
}

fn main() -> Result<()> {
    renderer_core::init_logging();
    info!("Starting Vulkan Renderer");

    let config = EngineConfig::load(Path::new(CONFIG_PATH)).context("Failed to load config")?;

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}
