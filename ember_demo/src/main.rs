//! Ember demo
//!
//! Opens one window and clears it to dark grey every frame through a single
//! render pass, with three frames in flight.

use std::sync::Arc;

use ember_engine::ember::config::{DeviceConfig, RenderTargetConfig, DEFAULT_FRAMES_IN_FLIGHT};
use ember_engine::ember::graphics_device::WinitWindow;
use ember_engine::ember::log::LogSink;
use ember_engine::ember::render::{
    ColorAttachmentInfo, FrameLoop, RenderContext, RenderInfo, RenderOrchestrator, RenderPass,
    RenderTarget, RenderView, SharedRenderTarget,
};
use ember_engine::ember::{Error, Result};
use ember_engine::{engine_error, engine_info, engine_warn};
use ember_engine_renderer_vulkan::VulkanGraphicsDevice;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

const SOURCE: &str = "ember::demo";
const CLEAR_COLOR: [f32; 4] = [0.2, 0.2, 0.2, 1.0];

/// Everything needed to draw one frame
///
/// Field order matters: render targets release their swapchains before
/// the device goes away.
struct Renderer {
    frame_loop: FrameLoop<VulkanGraphicsDevice>,
    orchestrator: RenderOrchestrator<VulkanGraphicsDevice>,
    context: RenderContext<VulkanGraphicsDevice>,
    _device: Arc<VulkanGraphicsDevice>,
}

impl Renderer {
    fn new(window: &Arc<WinitWindow>, log: &LogSink) -> Result<Self> {
        let device = Arc::new(VulkanGraphicsDevice::new(&**window, &DeviceConfig::default(), log.clone())?);

        let mut target = RenderTarget::new(Arc::clone(&device), window, RenderTargetConfig::default(), log.clone());
        target.init(DEFAULT_FRAMES_IN_FLIGHT)?;
        let target = target.into_shared();

        let mut orchestrator = RenderOrchestrator::new(log.clone());
        orchestrator.new_pass("clear", RenderPass::new(vec![target.clone()], clear_pass))?;

        let mut frame_loop = FrameLoop::new(DEFAULT_FRAMES_IN_FLIGHT, log.clone());
        frame_loop.add_target(target)?;

        Ok(Self {
            frame_loop,
            orchestrator,
            context: RenderContext::new(log.clone()),
            _device: device,
        })
    }

    fn render_frame(&mut self) -> Result<()> {
        self.frame_loop.render_frame(&mut self.orchestrator, &mut self.context)
    }
}

/// Clear the current color buffer of `target`
fn clear_pass(
    ctx: &mut RenderContext<VulkanGraphicsDevice>,
    target: &SharedRenderTarget<VulkanGraphicsDevice>,
) -> Result<()> {
    let (color, extent) = {
        let target = target.borrow();
        let color = target
            .color_buffer(ctx.frame_number())
            .ok_or_else(|| Error::InvalidState(format!("no color buffer for frame {}", ctx.frame_number())))?;
        (color, target.extent())
    };

    let info = RenderInfo {
        view: RenderView::from_extent(extent.x, extent.y),
        color: vec![ColorAttachmentInfo {
            clear: CLEAR_COLOR,
            ..ColorAttachmentInfo::new(color)
        }],
        depth: None,
    };

    ctx.begin_recording(&info)?;
    ctx.end_recording(&info)
}

struct App {
    log: LogSink,
    // Dropped after the renderer
    renderer: Option<Renderer>,
    window: Option<Arc<WinitWindow>>,
}

impl App {
    fn new(log: LogSink) -> Self {
        Self {
            log,
            renderer: None,
            window: None,
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title("Ember Demo")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(WinitWindow::new(Arc::new(window))),
            Err(e) => {
                engine_error!(self.log, SOURCE, "Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(&window, &self.log) {
            Ok(renderer) => {
                engine_info!(self.log, SOURCE, "Renderer ready, {} frames in flight", DEFAULT_FRAMES_IN_FLIGHT);
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => {
                engine_error!(self.log, SOURCE, "Failed to initialize renderer: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(window) = &self.window {
                    window.request_close();
                }
                engine_info!(self.log, SOURCE, "Close requested, shutting down");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };
                match renderer.render_frame() {
                    Ok(()) => {}
                    Err(e) if e.is_device_lost() => {
                        engine_error!(self.log, SOURCE, "{}; exiting", e);
                        self.shutdown(event_loop);
                    }
                    Err(e) => engine_warn!(self.log, SOURCE, "Frame failed: {}", e),
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.window().request_redraw();
        }
    }
}

fn main() {
    let log = LogSink::default();

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            engine_error!(log, SOURCE, "Failed to create event loop: {}", e);
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(log.clone());
    if let Err(e) = event_loop.run_app(&mut app) {
        engine_error!(log, SOURCE, "Event loop terminated with an error: {}", e);
        std::process::exit(1);
    }
}
