use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use pixels::{Pixels, SurfaceTexture};
use tracing::{info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::EventLoopExtPumpEvents;
use winit::window::{Fullscreen, Window, WindowId};

use retmap_render::{load_system_font, RenderConfig, SkiaRenderer};
use retmap_session::{ControlInput, FrameView, Key, Presenter};

const WINDOWED_SIZE: (f64, f64) = (960.0, 600.0);

type KeyQueue = Rc<RefCell<VecDeque<Key>>>;

/// Window, GPU surface and rasterizer, created once the event loop
/// delivers its first `resumed`.
struct Surface {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    renderer: SkiaRenderer,
}

/// Winit-side state. Runs inside `pump_app_events`, so every callback
/// returns quickly; the blocking frame loop lives outside.
struct SurfaceApp {
    windowed: bool,
    render_config: RenderConfig,
    keys: KeyQueue,
    surface: Option<Surface>,
    refresh_rate_hz: Option<f64>,
    init_error: Option<anyhow::Error>,
    close_requested: bool,
}

impl SurfaceApp {
    fn create_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("no monitor available"))?;
        self.refresh_rate_hz = monitor
            .refresh_rate_millihertz()
            .map(|rate| f64::from(rate) / 1000.0);

        let mut attributes = Window::default_attributes()
            .with_title("retmap")
            .with_resizable(false);
        if self.windowed {
            attributes =
                attributes.with_inner_size(LogicalSize::new(WINDOWED_SIZE.0, WINDOWED_SIZE.1));
        } else {
            attributes =
                attributes.with_fullscreen(Some(Fullscreen::Borderless(Some(monitor.clone()))));
        }

        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("creating stimulus window")?,
        );
        let size = window.inner_size();
        info!(
            width = size.width,
            height = size.height,
            refresh_hz = self.refresh_rate_hz,
            "stimulus window created"
        );

        let surface_texture = SurfaceTexture::new(size.width, size.height, window.clone());
        let pixels = Pixels::new(size.width, size.height, surface_texture)
            .context("creating pixel surface")?;
        let renderer = SkiaRenderer::new(
            size.width,
            size.height,
            self.render_config.clone(),
            load_system_font(),
        )?;

        if !self.windowed {
            window.set_cursor_visible(false);
        }
        self.surface = Some(Surface {
            window,
            pixels,
            renderer,
        });
        Ok(())
    }

    fn handle_resize(&mut self, width: u32, height: u32) {
        let Some(surface) = &mut self.surface else {
            return;
        };
        if width == 0 || height == 0 {
            return;
        }
        if let Err(e) = surface.pixels.resize_surface(width, height) {
            warn!(error = %e, "surface resize failed");
            return;
        }
        if let Err(e) = surface.pixels.resize_buffer(width, height) {
            warn!(error = %e, "buffer resize failed");
            return;
        }
        if let Err(e) = surface.renderer.resize(width, height) {
            warn!(error = %e, "renderer resize failed");
        }
    }

    fn push_key(&mut self, physical: PhysicalKey) {
        let PhysicalKey::Code(code) = physical else {
            return;
        };
        let key = match code {
            KeyCode::Escape => Key::Escape,
            KeyCode::KeyQ => Key::Q,
            KeyCode::KeyF => Key::F,
            KeyCode::Digit5 | KeyCode::Numpad5 => Key::Num5,
            KeyCode::KeyT => Key::T,
            _ => Key::Other,
        };
        self.keys.borrow_mut().push_back(key);
    }
}

impl ApplicationHandler for SurfaceApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.surface.is_none() && self.init_error.is_none() {
            if let Err(e) = self.create_surface(event_loop) {
                self.init_error = Some(e);
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.close_requested = true,
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                self.push_key(event.physical_key);
            }
            WindowEvent::Resized(size) => self.handle_resize(size.width, size.height),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(size) = self.surface.as_ref().map(|s| s.window.inner_size()) {
                    self.handle_resize(size.width, size.height);
                }
            }
            _ => {}
        }
    }
}

/// Drains the keys the window collected; the frame loop's
/// [`ControlInput`] half of the display.
pub struct WindowInput {
    keys: KeyQueue,
}

impl ControlInput for WindowInput {
    fn poll(&mut self) -> Vec<Key> {
        self.keys.borrow_mut().drain(..).collect()
    }
}

/// [`Presenter`] over a winit window and a `pixels` surface. Each
/// `present` rasterizes the view, pushes it to the display (vsync paces
/// the loop there) and pumps the event loop once with a zero timeout.
pub struct WindowDisplay {
    event_loop: EventLoop<()>,
    app: SurfaceApp,
    frame_budget: Option<Duration>,
    dropped: u64,
}

impl WindowDisplay {
    pub fn new(render_config: RenderConfig, windowed: bool) -> Result<(Self, WindowInput)> {
        let event_loop = EventLoop::new().context("creating event loop")?;
        let keys: KeyQueue = Rc::new(RefCell::new(VecDeque::new()));
        let input = WindowInput { keys: keys.clone() };
        let app = SurfaceApp {
            windowed,
            render_config,
            keys,
            surface: None,
            refresh_rate_hz: None,
            init_error: None,
            close_requested: false,
        };
        Ok((
            Self {
                event_loop,
                app,
                frame_budget: None,
                dropped: 0,
            },
            input,
        ))
    }

    /// Pump until the window and surface exist. `resumed` fires on the
    /// first pump on all desktop platforms.
    fn ensure_surface(&mut self) -> Result<()> {
        while self.app.surface.is_none() {
            if let Some(e) = self.app.init_error.take() {
                return Err(e);
            }
            if self.app.close_requested {
                return Err(anyhow!("window closed before the surface was ready"));
            }
            self.event_loop
                .pump_app_events(Some(Duration::from_millis(10)), &mut self.app);
        }
        if self.frame_budget.is_none() {
            if let Some(hz) = self.app.refresh_rate_hz {
                self.frame_budget = Some(Duration::from_secs_f64(1.0 / hz));
            }
        }
        Ok(())
    }
}

impl Presenter for WindowDisplay {
    fn present(&mut self, view: &FrameView<'_>) -> Result<()> {
        self.ensure_surface()?;
        if self.app.close_requested {
            return Err(anyhow!("window closed"));
        }
        let started = Instant::now();

        let surface = self
            .app
            .surface
            .as_mut()
            .ok_or_else(|| anyhow!("surface lost"))?;
        surface.renderer.render(view);
        surface.renderer.copy_to(surface.pixels.frame_mut());
        surface.pixels.render().context("presenting frame")?;

        self.event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.app);

        // A frame that took over 1.5 refresh periods missed its slot.
        if let Some(budget) = self.frame_budget {
            if started.elapsed() > budget + budget / 2 {
                self.dropped += 1;
            }
        }
        Ok(())
    }

    fn dropped_frames(&self) -> u64 {
        self.dropped
    }
}
