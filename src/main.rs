use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;

use chip8::audio::{AudioSink, Beep, Mute};
use chip8::config::{Args, Settings};
use chip8::display::TerminalRenderer;
use chip8::emulator::{Emulator, read_rom};
use chip8::input::Keyboard;

fn run(settings: Settings) -> anyhow::Result<()> {
    let rom = read_rom(&settings.rom)?;
    let rom_stem = settings
        .rom
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Unknown ROM".to_string());

    let audio: Box<dyn AudioSink> = if settings.mute {
        Box::new(Mute)
    } else {
        Box::new(Beep::new(settings.tone)?)
    };
    let stop = Arc::new(AtomicBool::new(false));
    let keyboard = Keyboard::spawn(settings.keymap, Arc::clone(&stop));
    let renderer = TerminalRenderer::new(rom_stem, settings.keymap.legend())?;

    let mut emulator = Emulator::new(&settings, renderer, keyboard, audio).with_stop_flag(stop);
    emulator.load_rom(&rom);
    emulator.run()
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let settings = Settings::from_args(Args::parse())?;

    run(settings)
}
