//! When the refresh loop renders: every tick for video, once per change for
//! still images.
use crate::frames::MediaKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Render on every tick.
    Continuous,
    /// Render nothing until something changes.
    #[default]
    Suspended,
    /// Render on the next tick, then suspend.
    SingleShot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Schedule {
    mode: RefreshMode,
}

impl Schedule {
    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    pub fn media_loaded(&mut self, kind: MediaKind) {
        self.mode = match kind {
            MediaKind::Video => RefreshMode::Continuous,
            MediaKind::Image => RefreshMode::SingleShot,
        };
    }

    /// Fidelity or density changed. Videos pick it up on their next tick.
    pub fn params_changed(&mut self, kind: MediaKind) {
        if kind == MediaKind::Image {
            self.mode = RefreshMode::SingleShot;
        }
    }

    pub fn should_render(&self) -> bool {
        self.mode != RefreshMode::Suspended
    }

    pub fn rendered(&mut self) {
        if self.mode == RefreshMode::SingleShot {
            self.mode = RefreshMode::Suspended;
        }
    }
}
