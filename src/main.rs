use std::sync::Arc;
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use glaze::{
    BlendMode, ChainNode, ChainRenderer, Color, EffectParams, GpuContext, MaskFunction, Scene,
    Vec2,
};

struct App {
    window: Option<Arc<Window>>,
    gpu: Option<GpuContext>,
    renderer: Option<ChainRenderer>,
    scene: Scene,
    start_time: Instant,
    last_frame: Instant,
}

impl Default for App {
    fn default() -> Self {
        Self {
            window: None,
            gpu: None,
            renderer: None,
            scene: Scene::new(),
            start_time: Instant::now(),
            last_frame: Instant::now(),
        }
    }
}

impl App {
    fn build_chain(renderer: &mut ChainRenderer) {
        // Background fill, a bloomed world band, a comet layer with trails,
        // and the world again masked by a luminance stencil layer.
        let world = ChainNode::layer_range(Some(0), Some(4))
            .wrap_effect("bloom", EffectParams::new().with("radius", 14.0))
            .expect("bloom is a built-in effect");
        let comet = ChainNode::layers(vec![5])
            .wrap_effect(
                "trails",
                EffectParams::new().with("fade", 0.4).with("alpha", 1.0),
            )
            .expect("trails is a built-in effect");
        let vignette = ChainNode::mask(
            MaskFunction::Luminance,
            ChainNode::fill(Color::rgba(0.0, 0.0, 0.0, 0.35)),
            ChainNode::layers(vec![8]),
        );

        renderer.set_chain(vec![
            ChainNode::fill(Color::rgb(0.05, 0.06, 0.1)),
            world,
            comet,
            vignette,
        ]);
    }

    fn update_scene(&mut self, width: f32, height: f32) {
        let t = self.start_time.elapsed().as_secs_f32();

        // Layer 1: a ring of orbiting blocks.
        let orbit = self.scene.layer_mut(1);
        orbit.clear();
        for i in 0..8 {
            let phase = t * 0.8 + i as f32 * std::f32::consts::TAU / 8.0;
            let pos = Vec2::new(
                width * 0.5 + phase.cos() * width * 0.25,
                height * 0.5 + phase.sin() * height * 0.25,
            );
            orbit.add_rect(
                pos,
                Vec2::splat(28.0),
                Color::rgb(1.0, 0.55 + 0.45 * (phase * 2.0).sin().abs(), 0.15),
            );
        }

        // Layer 5: a fast comet that the trails effect smears.
        let comet = self.scene.layer_mut(5);
        comet.blend = BlendMode::Additive;
        comet.clear();
        let pos = Vec2::new(
            width * 0.5 + (t * 2.1).cos() * width * 0.38,
            height * 0.5 + (t * 1.3).sin() * height * 0.38,
        );
        comet.add_rect(pos, Vec2::splat(16.0), Color::rgb(0.4, 0.8, 1.0));

        // Layer 8: a static bright bar used as a luminance stencil.
        let stencil = self.scene.layer_mut(8);
        if stencil.is_empty() {
            stencil.add_rect(
                Vec2::new(0.0, height * 0.8),
                Vec2::new(width, height * 0.2),
                Color::WHITE,
            );
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let window = Arc::new(
            event_loop
                .create_window(Window::default_attributes().with_title("glaze demo"))
                .unwrap(),
        );

        let gpu = GpuContext::new(window.clone());
        let mut renderer = ChainRenderer::new(&gpu);
        Self::build_chain(&mut renderer);

        self.gpu = Some(gpu);
        self.renderer = Some(renderer);
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some((width, height)) = self
                    .gpu
                    .as_ref()
                    .map(|gpu| (gpu.width() as f32, gpu.height() as f32))
                {
                    let dt = self.last_frame.elapsed().as_secs_f32();
                    self.last_frame = Instant::now();

                    self.update_scene(width, height);

                    if let (Some(gpu), Some(renderer)) = (&self.gpu, &mut self.renderer) {
                        if let Err(err) = renderer.render_frame(gpu, &mut self.scene, dt) {
                            // A lost surface recovers on the next configure;
                            // anything else is fatal for the demo.
                            tracing::error!(error = %err, "frame failed");
                        }
                    }
                }

                self.window.as_ref().unwrap().request_redraw();
            }
            _ => (),
        }
    }
}

fn main() {
    tracing_subscriber::fmt().init();

    let event_loop = EventLoop::new().unwrap();
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::default();
    event_loop.run_app(&mut app).unwrap();
}
