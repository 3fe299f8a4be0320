use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Settings;
use crate::display::Framebuffer;
use crate::error::Chip8Error;
use crate::instruction::decode;

pub type Timer = u8;
pub type Address = u16;
pub type CallStack = Vec<Address>;

pub const MEM_SIZE: usize = 4096;
pub const FONT_ADDR: usize = 0x000;
pub const FONT_HEIGHT: usize = 5;
pub const PC_START_ADDR: Address = 0x200;
pub const MAX_ROM_SIZE: usize = MEM_SIZE - PC_START_ADDR as usize;
pub const NUM_REGISTERS: usize = 16;
pub const NUM_KEYS: u8 = 16;

const FONT_DATA: [u8; 16 * FONT_HEIGHT] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

pub struct Memory {
    data: [u8; MEM_SIZE],
}
impl Memory {
    pub fn new() -> Self {
        let mut data = [0; MEM_SIZE];
        data[FONT_ADDR..FONT_ADDR + FONT_DATA.len()].copy_from_slice(&FONT_DATA);
        Memory { data }
    }

    pub fn read(&self, addr: usize) -> Result<u8, Chip8Error> {
        self.data
            .get(addr)
            .copied()
            .ok_or(Chip8Error::MemoryOutOfBounds { address: addr })
    }

    pub fn write(&mut self, addr: usize, value: u8) -> Result<(), Chip8Error> {
        let cell = self
            .data
            .get_mut(addr)
            .ok_or(Chip8Error::MemoryOutOfBounds { address: addr })?;
        *cell = value;
        Ok(())
    }

    pub fn slice(&self, addr: usize, len: usize) -> Result<&[u8], Chip8Error> {
        let range = addr..addr + len;
        if range.end > MEM_SIZE {
            return Err(Chip8Error::MemoryOutOfBounds {
                address: range.end - 1,
            });
        }
        Ok(&self.data[range])
    }

    /// Copies the program to 0x200. Anything past the end of memory is
    /// dropped; returns the number of bytes actually loaded.
    pub fn load_rom(&mut self, rom: &[u8]) -> usize {
        let len = rom.len().min(MAX_ROM_SIZE);
        if len < rom.len() {
            warn!(
                "ROM is {} bytes, only the first {} fit in memory",
                rom.len(),
                len
            );
        }
        let start = PC_START_ADDR as usize;
        self.data[start..start + len].copy_from_slice(&rom[..len]);
        len
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Register {
    V0,
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    V8,
    V9,
    VA,
    VB,
    VC,
    VD,
    VE,
    VF,
}
impl Register {
    const ALL: [Register; NUM_REGISTERS] = [
        Register::V0,
        Register::V1,
        Register::V2,
        Register::V3,
        Register::V4,
        Register::V5,
        Register::V6,
        Register::V7,
        Register::V8,
        Register::V9,
        Register::VA,
        Register::VB,
        Register::VC,
        Register::VD,
        Register::VE,
        Register::VF,
    ];

    /// Register named by the low nibble of `nibble`.
    pub fn from_nibble(nibble: u8) -> Self {
        Self::ALL[usize::from(nibble & 0x0F)]
    }

    /// V0 through `self`, inclusive.
    pub fn up_to(self) -> impl Iterator<Item = Register> {
        Self::ALL.into_iter().take(self as usize + 1)
    }
}

#[derive(Default)]
pub struct RegisterBank {
    registers: [u8; NUM_REGISTERS],
}
impl RegisterBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, reg: Register) -> u8 {
        self.registers[reg as usize]
    }

    pub fn write(&mut self, reg: Register, value: u8) {
        self.registers[reg as usize] = value;
    }

    pub fn set_flag(&mut self, value: u8) {
        self.write(Register::VF, value);
    }
}

/// Snapshot of the logical keys held down, one bit per key 0x0..=0xF.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Keypad {
    pressed: u16,
}
impl Keypad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys(keys: &[u8]) -> Self {
        let mut keypad = Self::new();
        for &key in keys {
            keypad.press(key);
        }
        keypad
    }

    /// Codes above 0xF are ignored.
    pub fn press(&mut self, key: u8) {
        if key < NUM_KEYS {
            self.pressed |= 1 << key;
        }
    }

    pub fn release(&mut self, key: u8) {
        if key < NUM_KEYS {
            self.pressed &= !(1 << key);
        }
    }

    /// Codes above 0xF are never pressed.
    pub fn is_pressed(&self, key: u8) -> bool {
        key < NUM_KEYS && self.pressed & (1 << key) != 0
    }

    /// Lowest key code whose state differs between the two snapshots.
    pub fn first_change(&self, other: &Keypad) -> Option<u8> {
        let changed = self.pressed ^ other.pressed;
        (changed != 0).then(|| changed.trailing_zeros() as u8)
    }
}

/// Whether the CPU is executing or suspended on FX0A.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Running,
    AwaitingKey { register: Register, last_seen: Keypad },
}

pub struct Chip8State {
    pub memory: Memory,
    pub registers: RegisterBank,
    pub pc: Address,
    pub index: Address,
    pub stack: CallStack,
    pub stack_limit: Option<usize>,
    pub delay_timer: Timer,
    pub sound_timer: Timer,
    pub display: Framebuffer,
    pub keypad: Keypad,
    pub run_state: RunState,
    rng: StdRng,
}
impl Chip8State {
    pub fn new(settings: &Settings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Chip8State {
            memory: Memory::new(),
            registers: RegisterBank::new(),
            pc: PC_START_ADDR,
            index: 0,
            stack: Vec::new(),
            stack_limit: settings.stack_limit,
            delay_timer: 0,
            sound_timer: 0,
            display: Framebuffer::new(),
            keypad: Keypad::new(),
            run_state: RunState::Running,
            rng,
        }
    }

    pub fn load_rom(&mut self, rom: &[u8]) -> usize {
        let loaded = self.memory.load_rom(rom);
        info!("Loaded {} byte ROM at {:#05X}", loaded, PC_START_ADDR);
        loaded
    }

    fn fetch(&mut self) -> Result<u16, Chip8Error> {
        let pc = usize::from(self.pc);
        let high_byte = u16::from(self.memory.read(pc)?);
        let low_byte = u16::from(self.memory.read(pc + 1)?);

        self.pc = self.pc.wrapping_add(2);

        Ok((high_byte << 8) | low_byte)
    }

    /// Fetches, decodes and executes one instruction. A no-op while waiting
    /// for a key.
    pub fn step(&mut self) -> Result<(), Chip8Error> {
        if self.is_awaiting_key() {
            return Ok(());
        }

        let pc = self.pc;
        let opcode = self.fetch()?;
        trace!("{:#05X}: {:#06X}", pc, opcode);

        let instruction = decode(opcode).ok_or(Chip8Error::UnknownOpcode { opcode, pc })?;
        instruction.execute(self)
    }

    pub fn decay_timers(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }

    pub fn is_awaiting_key(&self) -> bool {
        matches!(self.run_state, RunState::AwaitingKey { .. })
    }

    pub fn is_sound_on(&self) -> bool {
        self.sound_timer > 0
    }

    pub fn random_byte(&mut self) -> u8 {
        self.rng.random()
    }

    pub fn push_return(&mut self, pc: Address) -> Result<(), Chip8Error> {
        if let Some(limit) = self.stack_limit {
            if self.stack.len() >= limit {
                return Err(Chip8Error::StackOverflow {
                    pc: pc.wrapping_sub(2),
                    limit,
                });
            }
        }
        self.stack.push(pc);
        Ok(())
    }

    pub fn begin_key_wait(&mut self, register: Register) {
        debug!("Waiting for a key change into {:?}", register);
        self.run_state = RunState::AwaitingKey {
            register,
            last_seen: self.keypad,
        };
    }

    /// Compares a fresh snapshot against the one seen when the wait began.
    /// Returns `true` once the wait has been satisfied.
    pub fn resolve_key_wait(&mut self, keypad: Keypad) -> bool {
        let RunState::AwaitingKey {
            register,
            last_seen,
        } = self.run_state
        else {
            return true;
        };

        match keypad.first_change(&last_seen) {
            Some(key) => {
                debug!("Key {:X} changed, resuming", key);
                self.registers.write(register, key);
                self.run_state = RunState::Running;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> Chip8State {
        Chip8State::new(&Settings::default())
    }

    #[test]
    fn test_font_glyph_addresses() {
        let memory = Memory::new();
        assert_eq!(memory.slice(0, 5).unwrap(), &[0xF0, 0x90, 0x90, 0x90, 0xF0]);
        assert_eq!(
            memory.slice(0xF * FONT_HEIGHT, 5).unwrap(),
            &[0xF0, 0x80, 0xF0, 0x80, 0x80]
        );
    }

    #[test]
    fn test_memory_bounds() {
        let mut memory = Memory::new();
        assert!(memory.write(0xFFF, 1).is_ok());
        assert_eq!(memory.read(0xFFF), Ok(1));
        assert_eq!(
            memory.read(MEM_SIZE),
            Err(Chip8Error::MemoryOutOfBounds { address: MEM_SIZE })
        );
        assert!(memory.write(MEM_SIZE, 1).is_err());
        assert!(memory.slice(0xFFE, 3).is_err());
    }

    #[test]
    fn test_load_rom_at_program_start() {
        let mut memory = Memory::new();
        assert_eq!(memory.load_rom(&[0x12, 0x34]), 2);
        assert_eq!(memory.read(0x200), Ok(0x12));
        assert_eq!(memory.read(0x201), Ok(0x34));
    }

    #[test]
    fn test_oversized_rom_is_truncated() {
        let mut memory = Memory::new();
        let rom = vec![0xAB; MAX_ROM_SIZE + 10];
        assert_eq!(memory.load_rom(&rom), MAX_ROM_SIZE);
        assert_eq!(memory.read(MEM_SIZE - 1), Ok(0xAB));
    }

    #[test]
    fn test_register_up_to() {
        let regs: Vec<_> = Register::V3.up_to().collect();
        assert_eq!(
            regs,
            vec![Register::V0, Register::V1, Register::V2, Register::V3]
        );
        assert_eq!(Register::VF.up_to().count(), NUM_REGISTERS);
    }

    #[test]
    fn test_keypad_ignores_out_of_range_codes() {
        let mut keypad = Keypad::new();
        keypad.press(0x10);
        assert_eq!(keypad, Keypad::new());
        assert!(!keypad.is_pressed(0x10));
    }

    #[test]
    fn test_keypad_first_change() {
        let before = Keypad::from_keys(&[0x1, 0x5]);
        assert_eq!(before.first_change(&before), None);
        assert_eq!(Keypad::from_keys(&[0x1, 0x5, 0xA]).first_change(&before), Some(0xA));
        assert_eq!(Keypad::from_keys(&[0x5]).first_change(&before), Some(0x1));
    }

    #[test]
    fn test_timers_floor_at_zero() {
        let mut state = state();
        state.delay_timer = 2;
        state.sound_timer = 1;
        state.decay_timers();
        assert_eq!((state.delay_timer, state.sound_timer), (1, 0));
        assert!(!state.is_sound_on());
        state.decay_timers();
        state.decay_timers();
        assert_eq!((state.delay_timer, state.sound_timer), (0, 0));
    }

    #[test]
    fn test_fetch_out_of_bounds() {
        let mut state = state();
        state.pc = 0xFFF;
        assert_eq!(
            state.step(),
            Err(Chip8Error::MemoryOutOfBounds { address: MEM_SIZE })
        );
    }

    #[test]
    fn test_stack_limit() {
        let mut state = Chip8State::new(&Settings {
            stack_limit: Some(1),
            ..Settings::default()
        });
        assert!(state.push_return(0x202).is_ok());
        assert_eq!(
            state.push_return(0x302),
            Err(Chip8Error::StackOverflow {
                pc: 0x300,
                limit: 1
            })
        );
    }

    #[test]
    fn test_key_wait_resolves_on_press() {
        let mut state = state();
        state.keypad = Keypad::from_keys(&[0x2]);
        state.begin_key_wait(Register::V4);
        assert!(!state.resolve_key_wait(Keypad::from_keys(&[0x2])));
        assert!(state.is_awaiting_key());
        assert!(state.resolve_key_wait(Keypad::from_keys(&[0x2, 0x7])));
        assert_eq!(state.registers.read(Register::V4), 0x7);
        assert_eq!(state.run_state, RunState::Running);
    }

    #[test]
    fn test_key_wait_resolves_on_release() {
        let mut state = state();
        state.keypad = Keypad::from_keys(&[0xC]);
        state.begin_key_wait(Register::V0);
        assert!(state.resolve_key_wait(Keypad::new()));
        assert_eq!(state.registers.read(Register::V0), 0xC);
    }

    #[test]
    fn test_step_is_noop_while_waiting() {
        let mut state = state();
        state.load_rom(&[0x60, 0x42]);
        state.begin_key_wait(Register::V1);
        state.step().unwrap();
        assert_eq!(state.pc, PC_START_ADDR);
        assert_eq!(state.registers.read(Register::V0), 0);
    }

    #[test]
    fn test_independent_instances() {
        let mut a = state();
        let b = state();
        a.registers.write(Register::V0, 9);
        a.display.flip(0, 0);
        assert_eq!(b.registers.read(Register::V0), 0);
        assert!(b.display.is_blank());
    }
}
