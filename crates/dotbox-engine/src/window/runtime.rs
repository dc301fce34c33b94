use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::backend::{BindingContext, WgpuContext};
use crate::core::{App, AppControl, FrameCtx};
use crate::render::{FrameRenderer, RenderError, SurfaceConfig};
use crate::time::FrameClock;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "dotbox".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
        }
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens one window, renders into it until it closes or the app exits.
    ///
    /// Returns the error that stopped the loop, if any.
    pub fn run<A>(config: RuntimeConfig, surface: SurfaceConfig, app: A) -> Result<()>
    where
        A: 'static + App,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(config, surface, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[self_referencing]
struct WindowEntry {
    clock: FrameClock,

    window: Window,

    #[borrows(window)]
    #[covariant]
    renderer: FrameRenderer<WgpuContext<'this>>,
}

struct AppState<A>
where
    A: App + 'static,
{
    config: RuntimeConfig,
    surface: SurfaceConfig,
    app: A,

    window: Option<WindowEntry>,
    exit_requested: bool,
    failure: Option<anyhow::Error>,
}

impl<A> AppState<A>
where
    A: App + 'static,
{
    fn new(config: RuntimeConfig, surface: SurfaceConfig, app: A) -> Self {
        Self {
            config,
            surface,
            app,
            window: None,
            exit_requested: false,
            failure: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.failure = Some(err);
        self.exit_requested = true;
        event_loop.exit();
    }

    fn create_window_entry(&self, event_loop: &ActiveEventLoop) -> Result<WindowEntry> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let surface = self.surface.clone();
        let entry = WindowEntryTryBuilder {
            clock: FrameClock::default(),
            window,
            renderer_builder: |w| FrameRenderer::for_window(w, surface),
        }
        .try_build()
        .with_context(|| format!("failed to set up surface `{}`", self.surface.id))?;

        Ok(entry)
    }

    /// Drives one frame: tick, app callback, present.
    fn redraw(&mut self) -> Result<AppControl, RenderError> {
        let (app, window) = (&mut self.app, &mut self.window);
        let Some(entry) = window.as_mut() else {
            return Ok(AppControl::Continue);
        };

        entry.with_mut(|fields| {
            let time = fields.clock.tick();
            let result = {
                let mut ctx = FrameCtx {
                    renderer: &mut *fields.renderer,
                    time,
                };
                app.on_frame(&mut ctx)
            };

            settle_frame(fields.renderer, time.frame_index, result)
        })
    }
}

/// Ends a frame by the app's result.
///
/// A completed frame is presented. A frame interrupted by a recoverable
/// error is dropped unshown and the loop goes on; a fatal error drops the
/// frame and is passed up.
fn settle_frame<C: BindingContext>(
    renderer: &mut FrameRenderer<C>,
    frame_index: u64,
    result: Result<AppControl, RenderError>,
) -> Result<AppControl, RenderError> {
    match result {
        Ok(control) => {
            renderer.present();
            Ok(control)
        }
        Err(err) if err.is_recoverable() => {
            log::warn!("frame {frame_index} dropped: {err}");
            renderer.discard_frame();
            Ok(AppControl::Continue)
        }
        Err(err) => {
            renderer.discard_frame();
            Err(err)
        }
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: App + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        match self.create_window_entry(event_loop) {
            Ok(entry) => {
                entry.with_window(|w| w.request_redraw());
                self.window = Some(entry);
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous animation.
        if let Some(entry) = &self.window {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.window = None;
                self.exit_requested = true;
                event_loop.exit();
            }

            // The renderer re-reads the displayed size at the next frame start.
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(entry) = &self.window {
                    entry.with_window(|w| w.request_redraw());
                }
            }

            WindowEvent::RedrawRequested => match self.redraw() {
                Ok(AppControl::Continue) => {}
                Ok(AppControl::Exit) => {
                    self.exit_requested = true;
                    event_loop.exit();
                }
                Err(err) => {
                    let err = anyhow::Error::new(err).context("rendering stopped");
                    self.fail(event_loop, err);
                }
            },

            _ => {}
        }
    }
}
