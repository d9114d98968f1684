use std::time::{Duration, Instant};

use crate::{
    error::Error,
    frames::DEFAULT_FPS,
    render::SurfaceFactory,
    session::{Session, TickReport},
};

/// Passed to the refresh loop callback on every iteration.
pub struct LoopState<'a, F: SurfaceFactory> {
    /// The tick that ran on this iteration, if one was due.
    pub tick: Option<Result<TickReport, Error>>,
    pub session: &'a mut Session<F>,
}

/// Drives [`Session::tick`] at a fixed rate.
#[derive(Debug, Clone, Copy)]
pub struct RefreshLoop {
    fps: f64,
}

impl RefreshLoop {
    pub fn new(fps: f64) -> Self {
        Self {
            fps: if fps.is_finite() && fps > 0.0 { fps } else { DEFAULT_FPS },
        }
    }

    /// Uses `forced` if given, else the session's media rate.
    pub fn for_session<F: SurfaceFactory>(session: &Session<F>, forced: Option<f64>) -> Self {
        Self::new(forced.or_else(|| session.fps()).unwrap_or(DEFAULT_FPS))
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Runs until `callback` returns `false`. The callback is also called
    /// between ticks so it can poll input.
    pub fn run<F: SurfaceFactory>(
        &self,
        session: &mut Session<F>,
        mut callback: impl FnMut(LoopState<'_, F>) -> bool,
    ) {
        let mut time_count = Instant::now();
        let mut should_continue = true;

        while should_continue {
            let tick = if self.time_to_tick(&mut time_count) {
                Some(session.tick())
            } else {
                None
            };
            let ticked = tick.is_some();

            should_continue = callback(LoopState {
                tick,
                session: &mut *session,
            });

            if !ticked {
                let wait = self
                    .target_frame_duration()
                    .saturating_sub(time_count.elapsed());
                std::thread::sleep(wait.min(Duration::from_millis(5)));
            }
        }
    }

    fn time_to_tick(&self, time_count: &mut Instant) -> bool {
        let elapsed_time = time_count.elapsed();
        let target_frame_duration = self.target_frame_duration();

        if elapsed_time < target_frame_duration {
            return false;
        }
        if elapsed_time >= target_frame_duration * 2 {
            // fell behind, don't try to catch up with a burst of ticks
            *time_count = Instant::now();
        } else {
            *time_count += target_frame_duration;
        }
        true
    }

    fn target_frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }
}
