use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{debug, info};

use crate::audio::AudioSink;
use crate::config::Settings;
use crate::display::Renderer;
use crate::input::InputSource;
use crate::state::Chip8State;

/// Reads a ROM image from disk. Size is not checked here; loading truncates.
pub fn read_rom(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read ROM {}", path.display()))
}

/// Drives the interpreter at a fixed frame rate: poll input, run the
/// instruction budget, tick timers, signal audio, render, sleep.
///
/// While the CPU is blocked on FX0A the loop keeps polling and rendering but
/// executes nothing and leaves the timers frozen. Whatever was left of the
/// budget when the wait began is spent in the frame that resolves it.
pub struct Emulator<R: Renderer, I: InputSource, A: AudioSink> {
    state: Chip8State,
    renderer: R,
    input: I,
    audio: A,
    frame_duration: Duration,
    instructions_per_frame: u32,
    steps_remaining: u32,
    stop: Arc<AtomicBool>,
}

impl<R: Renderer, I: InputSource, A: AudioSink> Emulator<R, I, A> {
    pub fn new(settings: &Settings, renderer: R, input: I, audio: A) -> Self {
        Emulator {
            state: Chip8State::new(settings),
            renderer,
            input,
            audio,
            frame_duration: Duration::from_secs_f64(1.0 / f64::from(settings.frame_rate.max(1))),
            instructions_per_frame: settings.instructions_per_frame,
            steps_remaining: 0,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares an externally owned stop flag instead of the emulator's own.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    #[cfg(test)]
    fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn load_rom(&mut self, rom: &[u8]) -> usize {
        self.state.load_rom(rom)
    }

    #[cfg(test)]
    fn state(&self) -> &Chip8State {
        &self.state
    }

    #[cfg(test)]
    fn renderer(&self) -> &R {
        &self.renderer
    }

    #[cfg(test)]
    fn audio(&self) -> &A {
        &self.audio
    }

    /// Runs one frame. A fatal CPU error is returned as-is and leaves the
    /// state as it was at the failing instruction.
    pub fn run_frame(&mut self) -> anyhow::Result<()> {
        let keypad = self.input.poll()?;
        self.state.keypad = keypad;

        // A frame that resumes from FX0A only spends what was left of the
        // interrupted budget, which may be nothing.
        let resuming = self.state.is_awaiting_key();
        if resuming {
            self.state.resolve_key_wait(keypad);
        }

        if !self.state.is_awaiting_key() {
            if !resuming {
                self.steps_remaining = self.instructions_per_frame;
            }
            while self.steps_remaining > 0 {
                self.steps_remaining -= 1;
                self.state.step()?;
                if self.state.is_awaiting_key() {
                    break;
                }
            }
        }

        let awaiting = self.state.is_awaiting_key();
        if !awaiting {
            self.state.decay_timers();
        }
        self.audio.set_tone(!awaiting && self.state.is_sound_on());
        self.renderer.render(&self.state.display)?;
        Ok(())
    }

    /// Loops until the stop flag is raised or a frame fails. Late frames
    /// are not made up.
    pub fn run(&mut self) -> anyhow::Result<()> {
        info!(
            "Running at {:.1} Hz, {} instructions per frame",
            1.0 / self.frame_duration.as_secs_f64(),
            self.instructions_per_frame
        );

        while !self.stop.load(Ordering::Relaxed) {
            let frame_start = Instant::now();

            if let Err(e) = self.run_frame() {
                self.audio.set_tone(false);
                return Err(e);
            }

            let elapsed = frame_start.elapsed();
            match self.frame_duration.checked_sub(elapsed) {
                Some(remaining) => std::thread::sleep(remaining),
                None => debug!("Frame overran by {:?}", elapsed - self.frame_duration),
            }
        }

        self.audio.set_tone(false);
        info!("Stopped");
        Ok(())
    }
}
