use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{anyhow, bail};
use log::{error, info};
use rdev::{EventType, Key};

use crate::state::Keypad;

/// Produces the set of logical keys held down right now.
pub trait InputSource {
    fn poll(&mut self) -> anyhow::Result<Keypad>;
}

/// Physical key assigned to each logical key 0x0..=0xF.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Keymap {
    keys: [(char, Key); 16],
}

impl Keymap {
    /// Left-hand block of a QWERTY keyboard, in logical key order.
    pub const CONVENTIONAL: &'static str = "x123qweasdzc4rfv";

    /// Logical keys as they sit on the COSMAC VIP hex keypad.
    const KEYPAD_ROWS: [[u8; 4]; 4] = [
        [0x1, 0x2, 0x3, 0xC],
        [0x4, 0x5, 0x6, 0xD],
        [0x7, 0x8, 0x9, 0xE],
        [0xA, 0x0, 0xB, 0xF],
    ];

    /// Parses 16 characters, the physical key for logical 0 first. Each
    /// physical key may be bound only once.
    pub fn parse(layout: &str) -> anyhow::Result<Self> {
        let chars: Vec<char> = layout.chars().map(|c| c.to_ascii_lowercase()).collect();
        if chars.len() != 16 {
            bail!("Keymap needs 16 keys, got {}", chars.len());
        }

        let mut keys = [(' ', Key::Space); 16];
        for (code, &c) in chars.iter().enumerate() {
            if chars[..code].contains(&c) {
                bail!("Key '{}' is bound more than once in keymap {:?}", c, layout);
            }
            let key = physical_key(c).ok_or_else(|| anyhow!("Unsupported key '{}' in keymap", c))?;
            keys[code] = (c, key);
        }
        Ok(Keymap { keys })
    }

    pub fn code_for(&self, key: Key) -> Option<u8> {
        self.keys
            .iter()
            .position(|&(_, bound)| bound == key)
            .map(|code| code as u8)
    }

    /// Text panel showing which physical key drives each keypad button.
    pub fn legend(&self) -> String {
        let mut legend = String::from("Key Mapping:");
        for row in Self::KEYPAD_ROWS {
            let physical: Vec<String> = row
                .iter()
                .map(|&code| self.keys[usize::from(code)].0.to_ascii_uppercase().to_string())
                .collect();
            let logical: Vec<String> = row.iter().map(|code| format!("{:X}", code)).collect();
            legend.push_str(&format!("\n{}    →    {}", physical.join(" "), logical.join(" ")));
        }
        legend
    }
}

impl Default for Keymap {
    fn default() -> Self {
        let mut keys = [(' ', Key::Space); 16];
        for (slot, c) in keys.iter_mut().zip(Self::CONVENTIONAL.chars()) {
            if let Some(key) = physical_key(c) {
                *slot = (c, key);
            }
        }
        Keymap { keys }
    }
}

fn physical_key(c: char) -> Option<Key> {
    let key = match c {
        '0' => Key::Num0,
        '1' => Key::Num1,
        '2' => Key::Num2,
        '3' => Key::Num3,
        '4' => Key::Num4,
        '5' => Key::Num5,
        '6' => Key::Num6,
        '7' => Key::Num7,
        '8' => Key::Num8,
        '9' => Key::Num9,
        'a' => Key::KeyA,
        'b' => Key::KeyB,
        'c' => Key::KeyC,
        'd' => Key::KeyD,
        'e' => Key::KeyE,
        'f' => Key::KeyF,
        'g' => Key::KeyG,
        'h' => Key::KeyH,
        'i' => Key::KeyI,
        'j' => Key::KeyJ,
        'k' => Key::KeyK,
        'l' => Key::KeyL,
        'm' => Key::KeyM,
        'n' => Key::KeyN,
        'o' => Key::KeyO,
        'p' => Key::KeyP,
        'q' => Key::KeyQ,
        'r' => Key::KeyR,
        's' => Key::KeyS,
        't' => Key::KeyT,
        'u' => Key::KeyU,
        'v' => Key::KeyV,
        'w' => Key::KeyW,
        'x' => Key::KeyX,
        'y' => Key::KeyY,
        'z' => Key::KeyZ,
        _ => return None,
    };
    Some(key)
}

/// Tracks held keys from a global rdev listener running on its own thread.
/// Escape raises the stop flag.
pub struct Keyboard {
    held: Arc<Mutex<Keypad>>,
}

impl Keyboard {
    pub fn spawn(keymap: Keymap, stop: Arc<AtomicBool>) -> Self {
        let held = Arc::new(Mutex::new(Keypad::new()));
        let shared = Arc::clone(&held);

        thread::spawn(move || {
            let result = rdev::listen(move |event| {
                let Ok(mut keypad) = shared.lock() else {
                    return;
                };
                match event.event_type {
                    EventType::KeyPress(Key::Escape) => {
                        info!("Escape pressed, stopping");
                        stop.store(true, Ordering::Relaxed);
                    }
                    EventType::KeyPress(key) => {
                        if let Some(code) = keymap.code_for(key) {
                            keypad.press(code);
                        }
                    }
                    EventType::KeyRelease(key) => {
                        if let Some(code) = keymap.code_for(key) {
                            keypad.release(code);
                        }
                    }
                    _ => {}
                }
            });
            if let Err(e) = result {
                error!("Keyboard listener failed: {:?}", e);
            }
        });

        Keyboard { held }
    }
}

impl InputSource for Keyboard {
    fn poll(&mut self) -> anyhow::Result<Keypad> {
        self.held
            .lock()
            .map(|keypad| *keypad)
            .map_err(|_| anyhow!("Keyboard state lock poisoned"))
    }
}
