use crate::render::{Scene, ViewState};
use anyhow::Result;
use pixels::{Pixels, SurfaceTexture};
use pvt_core::TrialState;
use pvt_engine::{Activation, GamepadPort, InputAggregator, TrialStateMachine};
use pvt_timing::{Clock, MonotonicClock};
use rand::rngs::ThreadRng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, TouchPhase, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

type Machine = TrialStateMachine<MonotonicClock, ThreadRng>;

/// Fullscreen winit shell around the trial engine. All engine state mutates
/// from this one event loop; the engine never sees the windowing layer.
pub struct App {
    machine: Machine,
    aggregator: InputAggregator,
    pad: Box<dyn GamepadPort>,
    clock: MonotonicClock,

    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    scene: Option<Scene>,
    summary_shown: bool,
    should_exit: bool,
}

impl App {
    pub fn new(machine: Machine, clock: MonotonicClock, pad: Box<dyn GamepadPort>) -> Self {
        Self {
            machine,
            aggregator: InputAggregator::new(),
            pad,
            clock,
            window: None,
            pixels: None,
            scene: None,
            summary_shown: false,
            should_exit: false,
        }
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        info!("press Space, click, or tap to begin; Esc exits");
        event_loop.run_app(&mut self)?;
        Ok(())
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow::anyhow!("no monitor available"))?;

        let window_attributes = Window::default_attributes()
            .with_title("PVT")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let physical_size = window.inner_size();

        let surface_texture =
            SurfaceTexture::new(physical_size.width, physical_size.height, window.clone());
        self.pixels = Some(Pixels::new(
            physical_size.width,
            physical_size.height,
            surface_texture,
        )?);
        self.scene = Scene::new(physical_size.width, physical_size.height);

        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn dispatch(&mut self, activation: Activation) {
        self.machine.handle_activation(activation, self.pad.as_mut());
    }

    /// One pad sample against the current response window. Called from the
    /// frame path and from the wait loop, so sampling cadence is not bound
    /// to the display refresh.
    fn poll_pad(&mut self) {
        self.aggregator
            .set_gamepad_polling(self.machine.expects_response());
        let now = self.clock.now_ms();
        if let Some(activation) = self.aggregator.poll_gamepad(self.pad.as_mut(), now) {
            self.dispatch(activation);
        }
    }

    /// One frame: engine tick, gamepad poll, render.
    fn frame(&mut self) -> Result<()> {
        self.machine.on_frame(self.pad.as_mut());
        self.poll_pad();

        if self.machine.state() == TrialState::Debrief && !self.summary_shown {
            self.summary_shown = true;
            match self.machine.mean_reaction_time_ms() {
                Some(mean) => info!("mean reaction time: {:.3} s", mean / 1e3),
                None => info!("no responses recorded"),
            }
        }

        let view = ViewState {
            ready: self.machine.state() == TrialState::Ready,
            show_target: self.machine.show_target(),
            stimulus_lit: self.machine.stimulus_lit(),
            too_late: self.machine.show_too_late(),
            release_prompt: self.machine.show_release_prompt(),
            debrief: self.machine.state() == TrialState::Debrief,
        };

        if let (Some(pixels), Some(scene)) = (self.pixels.as_mut(), self.scene.as_mut()) {
            scene.render(pixels.frame_mut(), &view);
            pixels.render()?;
        }
        Ok(())
    }

    fn handle_key(&mut self, key: PhysicalKey) {
        if let PhysicalKey::Code(code) = key {
            match code {
                KeyCode::Space => {
                    let now = self.clock.now_ms();
                    if let Some(activation) = self.aggregator.on_activation_key(now) {
                        self.dispatch(activation);
                    }
                }
                KeyCode::Escape => self.should_exit = true,
                _ => {}
            }
        }
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if let Some(pixels) = &mut self.pixels {
            if let Err(err) = pixels.resize_surface(new_size.width, new_size.height) {
                error!(%err, "resizing surface");
            }
            if let Err(err) = pixels.resize_buffer(new_size.width, new_size.height) {
                error!(%err, "resizing buffer");
            }
        }
        if let Some(scene) = &mut self.scene {
            scene.resize(new_size.width, new_size.height);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(err) = self.create_window_and_surface(event_loop) {
                error!(%err, "creating window");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.should_exit = true,
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.frame() {
                    error!(%err, "rendering frame");
                    self.should_exit = true;
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                self.handle_key(event.physical_key);
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                let state = modifiers.state();
                self.aggregator.set_modifiers(
                    state.control_key(),
                    state.alt_key(),
                    state.super_key(),
                );
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                let now = self.clock.now_ms();
                if let Some(activation) = self.aggregator.on_mouse_down(now) {
                    self.dispatch(activation);
                }
            }
            WindowEvent::Touch(touch) if touch.phase == TouchPhase::Started => {
                let now = self.clock.now_ms();
                if let Some(activation) = self.aggregator.on_touch_start(now) {
                    self.dispatch(activation);
                }
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            event_loop.exit();
            return;
        }

        // While a stimulus is visible the pad needs millisecond sampling;
        // the redraw path alone is bounded by vsync present, so sample here
        // too on a ~1 ms tick.
        if self.machine.expects_response() {
            self.poll_pad();
            event_loop.set_control_flow(ControlFlow::WaitUntil(
                Instant::now() + Duration::from_millis(1),
            ));
            if let Some(window) = &self.window {
                window.request_redraw();
            }
            return;
        }

        // While the scheduler sits in its coarse window, park on a timer
        // instead of redrawing every frame; the fine poll takes over on the
        // frames after the wake-up.
        if let Some(wake_ms) = self.machine.coarse_wake_hint() {
            let delta_ms = wake_ms - self.clock.now_ms();
            if delta_ms > 1.0 {
                event_loop.set_control_flow(ControlFlow::WaitUntil(
                    Instant::now() + Duration::from_secs_f64(delta_ms / 1e3),
                ));
                return;
            }
        }

        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}
