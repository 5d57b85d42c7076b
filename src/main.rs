// =============================================================================
// FRAMELOOP - Vulkan presentation engine demo
// =============================================================================
//
// FRAME FLOW:
// 1. Wait for the current frame slot's fence
// 2. Acquire a swapchain image
// 3. Submit the pre-recorded commands for that image
// 4. Present, rebuilding the swapchain on staleness or resize
//
// Staleness is absorbed by the engine; any error that reaches this
// layer is fatal and ends the loop.

use anyhow::Result;
use ash::vk;
use glam::Vec3;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

use frameloop::backend::buffer::GpuBuffer;
use frameloop::backend::{
    shader, DrawSpec, FrameEngine, FrameOutcome, GpuContext, SurfaceBinding, SwapchainManager,
    VulkanContext, VulkanDevice,
};
use frameloop::config::Config;

#[repr(C)]
#[derive(Clone, Copy)]
struct Vertex {
    position: Vec3,
    color: Vec3,
}

const TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: Vec3::new(0.0, -0.6, 0.0),
        color: Vec3::new(1.0, 0.2, 0.2),
    },
    Vertex {
        position: Vec3::new(0.6, 0.6, 0.0),
        color: Vec3::new(0.2, 1.0, 0.2),
    },
    Vertex {
        position: Vec3::new(-0.6, 0.6, 0.0),
        color: Vec3::new(0.2, 0.2, 1.0),
    },
];

fn main() -> Result<()> {
    let config = Config::load();

    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting frameloop");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen {
            "fullscreen"
        } else {
            "windowed"
        }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

// =============================================================================
// RENDERER - all Vulkan state, built once the window exists
// =============================================================================

struct Renderer {
    device: Arc<VulkanDevice>,
    ctx: VulkanContext,
    surface: SurfaceBinding,
    vert_shader: vk::ShaderModule,
    frag_shader: vk::ShaderModule,
    vertex_buffer: GpuBuffer,
    chain: SwapchainManager,
    engine: FrameEngine,
}

impl Renderer {
    fn new(config: &Config, window: &Window) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
        let device = VulkanDevice::new(&config.window.title, enable_validation)?;
        let surface = SurfaceBinding::new(&device, window)?;

        let surface_loader =
            ash::extensions::khr::Surface::new(&device.entry, &device.instance);
        let ctx = VulkanContext::new(device.clone(), surface_loader);

        let vert_shader = shader::load_shader_module(&device, "shaders/triangle.vert.spv")?;
        let frag_shader = shader::load_shader_module(&device, "shaders/triangle.frag.spv")?;

        let vertex_buffer =
            GpuBuffer::with_data(&device, vk::BufferUsageFlags::VERTEX_BUFFER, &TRIANGLE)?;

        let chain = SwapchainManager::create(
            &ctx,
            surface.surface,
            SurfaceBinding::window_extent(window),
            config.preferred_present_mode(),
            DrawSpec {
                vert_shader,
                frag_shader,
                clear_color: config.graphics.clear_color,
                vertex_buffer: Some(vertex_buffer.buffer),
                vertex_count: TRIANGLE.len() as u32,
            },
        )?;

        let engine = FrameEngine::new(&ctx, config.graphics.max_frames_in_flight)?;

        log::info!("Vulkan initialized");

        Ok(Self {
            device,
            ctx,
            surface,
            vert_shader,
            frag_shader,
            vertex_buffer,
            chain,
            engine,
        })
    }

    fn render_frame(&mut self, window: &Window) -> Result<FrameOutcome> {
        let outcome = self.engine.draw_frame(
            &self.ctx,
            &mut self.chain,
            SurfaceBinding::window_extent(window),
        )?;
        Ok(outcome)
    }

    fn destroy(&mut self) {
        // Reverse order of creation, after the GPU has drained
        let _ = self.ctx.device_wait_idle();
        self.engine.destroy(&self.ctx);
        self.chain.destroy(&self.ctx);
        self.vertex_buffer.destroy(&self.device);
        unsafe {
            self.device
                .device
                .destroy_shader_module(self.vert_shader, None);
            self.device
                .device
                .destroy_shader_module(self.frag_shader, None);
        }
        self.surface.destroy();
        // Device drops last via Arc
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        self.destroy();
        log::info!("Cleanup complete");
    }
}

// =============================================================================
// APPLICATION - window, events, frame pacing readout
// =============================================================================

struct App {
    config: Config,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    resize_signal: Option<Arc<AtomicBool>>,
    is_fullscreen: bool,
    is_minimized: bool,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let now = Instant::now();
        Self {
            config,
            window: None,
            renderer: None,
            resize_signal: None,
            is_fullscreen,
            is_minimized: false,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }

            if let Some(ref signal) = self.resize_signal {
                signal.store(true, Ordering::Relaxed);
            }
        }
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        if now.duration_since(self.last_fps_update).as_secs_f32() >= 1.0 {
            let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(&self.config, &window) {
            Ok(renderer) => {
                self.resize_signal = Some(renderer.engine.resize_signal());
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => {
                log::error!("Failed to initialize Vulkan: {:?}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                if size.width == 0 || size.height == 0 {
                    self.is_minimized = true;
                } else {
                    self.is_minimized = false;
                    if let Some(ref signal) = self.resize_signal {
                        signal.store(true, Ordering::Relaxed);
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                if self.is_minimized {
                    return;
                }

                let (Some(window), Some(renderer)) = (self.window.clone(), self.renderer.as_mut())
                else {
                    return;
                };

                match renderer.render_frame(&window) {
                    Ok(FrameOutcome::Presented) => self.update_fps(),
                    Ok(_) => {} // recreated or deferred, nothing presented
                    Err(e) => {
                        // Fatal: staleness never reaches this point
                        log::error!("Render error: {:?}", e);
                        event_loop.exit();
                    }
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                event_loop.exit();
                            }
                            KeyCode::F11 => {
                                self.toggle_fullscreen();
                            }
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
