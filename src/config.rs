use std::path::PathBuf;

use clap::Parser;

use crate::input::Keymap;

pub const DEFAULT_FRAME_RATE: u32 = 60;
pub const DEFAULT_INSTRUCTIONS_PER_FRAME: u32 = 10;
pub const DEFAULT_TONE_FREQUENCY: f32 = 440.0;

/// Command line interface.
#[derive(Parser, Debug)]
#[command(version, about = "A CHIP-8 interpreter")]
pub struct Args {
    /// Path to the CHIP-8 ROM to run
    pub rom: PathBuf,

    /// Frames per second; timers tick once per frame
    #[arg(long, default_value_t = DEFAULT_FRAME_RATE, value_parser = clap::value_parser!(u32).range(1..))]
    pub frame_rate: u32,

    /// Instructions executed per frame
    #[arg(long, default_value_t = DEFAULT_INSTRUCTIONS_PER_FRAME, value_parser = clap::value_parser!(u32).range(1..))]
    pub instructions_per_frame: u32,

    /// Maximum call depth (COSMAC VIP hardware allows 16); unbounded if unset
    #[arg(long)]
    pub stack_limit: Option<usize>,

    /// Seed for the random number generator used by CXKK
    #[arg(long)]
    pub seed: Option<u64>,

    /// Physical keys for logical keys 0 through F, in that order
    #[arg(long, default_value = Keymap::CONVENTIONAL)]
    pub keymap: String,

    /// Beep frequency in Hz
    #[arg(long, default_value_t = DEFAULT_TONE_FREQUENCY)]
    pub tone: f32,

    /// Disable audio output
    #[arg(long)]
    pub mute: bool,
}

pub struct Settings {
    pub frame_rate: u32,
    pub instructions_per_frame: u32,
    pub stack_limit: Option<usize>,
    pub seed: Option<u64>,
    pub keymap: Keymap,
    pub tone: f32,
    pub mute: bool,
    pub rom: PathBuf,
}

impl Settings {
    pub fn from_args(args: Args) -> anyhow::Result<Self> {
        Ok(Settings {
            frame_rate: args.frame_rate,
            instructions_per_frame: args.instructions_per_frame,
            stack_limit: args.stack_limit,
            seed: args.seed,
            keymap: Keymap::parse(&args.keymap)?,
            tone: args.tone,
            mute: args.mute,
            rom: args.rom,
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            frame_rate: DEFAULT_FRAME_RATE,
            instructions_per_frame: DEFAULT_INSTRUCTIONS_PER_FRAME,
            stack_limit: None,
            seed: None,
            keymap: Keymap::default(),
            tone: DEFAULT_TONE_FREQUENCY,
            mute: false,
            rom: PathBuf::new(),
        }
    }
}
