use tiny_skia::{Color, Paint, Pixmap, Rect, Transform};

/// What the current frame should show, derived from the state machine's
/// view methods once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewState {
    pub ready: bool,
    pub show_target: bool,
    pub stimulus_lit: bool,
    pub too_late: bool,
    pub release_prompt: bool,
    pub debrief: bool,
}

/// Minimal tiny-skia scene: a centered target cube plus banner prompts.
/// Page styling is out of scope; the shapes only carry state.
pub struct Scene {
    width: u32,
    height: u32,
    pixmap: Pixmap,
}

impl Scene {
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Some(Self {
            width,
            height,
            pixmap: Pixmap::new(width, height)?,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(pixmap) = Pixmap::new(width, height) {
            self.width = width;
            self.height = height;
            self.pixmap = pixmap;
        }
    }

    pub fn render(&mut self, frame: &mut [u8], view: &ViewState) {
        self.pixmap.fill(Color::from_rgba8(16, 16, 16, 255));

        if view.show_target {
            // Dim while waiting, bright red the instant the stimulus fires.
            let color = if view.stimulus_lit {
                Color::from_rgba8(220, 30, 30, 255)
            } else {
                Color::from_rgba8(70, 70, 70, 255)
            };
            let side = (self.width.min(self.height) as f32) * 0.2;
            let x = (self.width as f32 - side) / 2.0;
            let y = (self.height as f32 - side) / 2.0;
            self.fill_rect(x, y, side, side, color);
        }

        if view.ready {
            // Start marker strip along the bottom.
            self.banner(0.85, Color::from_rgba8(200, 200, 200, 255));
        }
        if view.too_late {
            self.banner(0.1, Color::from_rgba8(230, 160, 30, 255));
        }
        if view.release_prompt {
            self.banner(0.1, Color::from_rgba8(40, 110, 220, 255));
        }
        if view.debrief {
            self.banner(0.45, Color::from_rgba8(40, 180, 90, 255));
        }

        let data = self.pixmap.data();
        if frame.len() == data.len() {
            frame.copy_from_slice(data);
        }
    }

    fn banner(&mut self, rel_y: f32, color: Color) {
        let width = self.width as f32;
        let height = self.height as f32 * 0.08;
        let y = self.height as f32 * rel_y;
        self.fill_rect(width * 0.1, y, width * 0.8, height, color);
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        let mut paint = Paint::default();
        paint.set_color(color);
        if let Some(rect) = Rect::from_xywh(x, y, w, h) {
            self.pixmap
                .fill_rect(rect, &paint, Transform::identity(), None);
        }
    }
}
