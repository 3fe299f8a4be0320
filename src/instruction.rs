use crate::error::Chip8Error;
use crate::state::{Address, Chip8State, FONT_ADDR, FONT_HEIGHT, Register};

/// A decoded CHIP-8 instruction. Operand names follow the usual opcode
/// notation: `x`/`y` registers, `kk` byte immediate, `nnn` address, `n` nibble.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// 00E0
    ClearScreen,
    /// 00EE
    Return,
    /// 1nnn
    Jump(Address),
    /// 2nnn
    Call(Address),
    /// 3xkk
    SkipEqImmediate(Register, u8),
    /// 4xkk
    SkipNeqImmediate(Register, u8),
    /// 5xy0
    SkipEqRegister(Register, Register),
    /// 9xy0
    SkipNeqRegister(Register, Register),
    /// 6xkk
    SetImmediate(Register, u8),
    /// 7xkk
    AddImmediate(Register, u8),
    /// 8xy0
    Assign(Register, Register),
    /// 8xy1
    Or(Register, Register),
    /// 8xy2
    And(Register, Register),
    /// 8xy3
    Xor(Register, Register),
    /// 8xy4
    AddWithCarry(Register, Register),
    /// 8xy5
    SubWithBorrow(Register, Register),
    /// 8xy6
    ShiftRight(Register),
    /// 8xy7
    ReverseSub(Register, Register),
    /// 8xyE
    ShiftLeft(Register),
    /// Annn
    SetIndex(Address),
    /// Bnnn
    JumpWithOffset(Address),
    /// Cxkk
    Random(Register, u8),
    /// Dxyn
    Draw(Register, Register, u8),
    /// Ex9E
    SkipIfKeyPressed(Register),
    /// ExA1
    SkipIfKeyNotPressed(Register),
    /// Fx07
    ReadDelayTimer(Register),
    /// Fx0A
    WaitForKey(Register),
    /// Fx15
    SetDelayTimer(Register),
    /// Fx18
    SetSoundTimer(Register),
    /// Fx1E
    AddToIndex(Register),
    /// Fx29
    FontChar(Register),
    /// Fx33
    BinaryCodedDecimal(Register),
    /// Fx55
    Store(Register),
    /// Fx65
    Load(Register),
}

struct DecodedInstruction {
    /// First nibble. Selects the instruction group.
    opcode: u8,
    /// Second nibble. Used to look up one of the 16 registers.
    x: Register,
    /// Third nibble. Used to look up one of the 16 registers.
    y: Register,
    /// Fourth nibble. A 4-bit number.
    n: u8,
    /// The second byte (third and fourth nibbles). An 8-bit immediate number.
    kk: u8,
    /// The second, third, and fourth nibbles. A 12-bit immediate address.
    nnn: Address,
}
impl DecodedInstruction {
    fn new(raw: u16) -> Self {
        DecodedInstruction {
            opcode: (raw >> 12) as u8,
            x: Register::from_nibble((raw >> 8) as u8),
            y: Register::from_nibble((raw >> 4) as u8),
            n: (raw & 0x0F) as u8,
            kk: (raw & 0x00FF) as u8,
            nnn: raw & 0x0FFF,
        }
    }
}

/// Maps a raw opcode to an instruction, or `None` if it is not part of the
/// CHIP-8 instruction set.
pub fn decode(raw: u16) -> Option<Instruction> {
    use Instruction::*;

    let DecodedInstruction {
        opcode,
        x,
        y,
        n,
        kk,
        nnn,
    } = DecodedInstruction::new(raw);

    let instruction = match opcode {
        0x0 => match nnn {
            0x0E0 => ClearScreen,
            0x0EE => Return,
            _ => return None,
        },
        0x1 => Jump(nnn),
        0x2 => Call(nnn),
        0x3 => SkipEqImmediate(x, kk),
        0x4 => SkipNeqImmediate(x, kk),
        0x5 if n == 0 => SkipEqRegister(x, y),
        0x6 => SetImmediate(x, kk),
        0x7 => AddImmediate(x, kk),
        0x8 => match n {
            0x0 => Assign(x, y),
            0x1 => Or(x, y),
            0x2 => And(x, y),
            0x3 => Xor(x, y),
            0x4 => AddWithCarry(x, y),
            0x5 => SubWithBorrow(x, y),
            0x6 => ShiftRight(x),
            0x7 => ReverseSub(x, y),
            0xE => ShiftLeft(x),
            _ => return None,
        },
        0x9 if n == 0 => SkipNeqRegister(x, y),
        0xA => SetIndex(nnn),
        0xB => JumpWithOffset(nnn),
        0xC => Random(x, kk),
        0xD => Draw(x, y, n),
        0xE => match kk {
            0x9E => SkipIfKeyPressed(x),
            0xA1 => SkipIfKeyNotPressed(x),
            _ => return None,
        },
        0xF => match kk {
            0x07 => ReadDelayTimer(x),
            0x0A => WaitForKey(x),
            0x15 => SetDelayTimer(x),
            0x18 => SetSoundTimer(x),
            0x1E => AddToIndex(x),
            0x29 => FontChar(x),
            0x33 => BinaryCodedDecimal(x),
            0x55 => Store(x),
            0x65 => Load(x),
            _ => return None,
        },
        _ => return None,
    };
    Some(instruction)
}

impl Instruction {
    /// Applies the instruction. The program counter has already been moved
    /// past it, so skips add 2 more and calls push the next address.
    pub fn execute(self, state: &mut Chip8State) -> Result<(), Chip8Error> {
        use Instruction::*;

        let regs = &mut state.registers;
        match self {
            ClearScreen => state.display.clear(),
            Return => {
                state.pc = state.stack.pop().ok_or(Chip8Error::StackUnderflow {
                    pc: state.pc.wrapping_sub(2),
                })?;
            }
            Jump(nnn) => state.pc = nnn,
            Call(nnn) => {
                state.push_return(state.pc)?;
                state.pc = nnn;
            }
            SkipEqImmediate(x, kk) => {
                let equal = regs.read(x) == kk;
                state.skip_if(equal);
            }
            SkipNeqImmediate(x, kk) => {
                let equal = regs.read(x) == kk;
                state.skip_if(!equal);
            }
            SkipEqRegister(x, y) => {
                let equal = regs.read(x) == regs.read(y);
                state.skip_if(equal);
            }
            SkipNeqRegister(x, y) => {
                let equal = regs.read(x) == regs.read(y);
                state.skip_if(!equal);
            }
            SetImmediate(x, kk) => regs.write(x, kk),
            AddImmediate(x, kk) => regs.write(x, regs.read(x).wrapping_add(kk)),
            Assign(x, y) => regs.write(x, regs.read(y)),
            Or(x, y) => regs.write(x, regs.read(x) | regs.read(y)),
            And(x, y) => regs.write(x, regs.read(x) & regs.read(y)),
            Xor(x, y) => regs.write(x, regs.read(x) ^ regs.read(y)),
            // Flag first, then the result: with x = VF the result wins.
            AddWithCarry(x, y) => {
                let (sum, carry) = regs.read(x).overflowing_add(regs.read(y));
                regs.set_flag(u8::from(carry));
                regs.write(x, sum);
            }
            SubWithBorrow(x, y) => {
                let (value_x, value_y) = (regs.read(x), regs.read(y));
                regs.set_flag(u8::from(value_x > value_y));
                regs.write(x, value_x.wrapping_sub(value_y));
            }
            ShiftRight(x) => {
                let value_x = regs.read(x);
                regs.set_flag(value_x & 0x01);
                regs.write(x, value_x >> 1);
            }
            ReverseSub(x, y) => {
                let (value_x, value_y) = (regs.read(x), regs.read(y));
                regs.set_flag(u8::from(value_y > value_x));
                regs.write(x, value_y.wrapping_sub(value_x));
            }
            ShiftLeft(x) => {
                let value_x = regs.read(x);
                // Raw high bit (0x00 or 0x80), not normalized to 0/1.
                regs.set_flag(value_x & 0x80);
                regs.write(x, value_x << 1);
            }
            SetIndex(nnn) => state.index = nnn,
            JumpWithOffset(nnn) => state.pc = nnn + u16::from(regs.read(Register::V0)),
            Random(x, kk) => {
                let value = state.random_byte() & kk;
                state.registers.write(x, value);
            }
            Draw(x, y, n) => {
                let origin_x = usize::from(regs.read(x));
                let origin_y = usize::from(regs.read(y));
                regs.set_flag(0);

                let sprite = state
                    .memory
                    .slice(usize::from(state.index), usize::from(n))?;
                if state.display.draw_sprite(origin_x, origin_y, sprite) {
                    state.registers.set_flag(1);
                }
            }
            SkipIfKeyPressed(x) => {
                let pressed = state.keypad.is_pressed(regs.read(x));
                state.skip_if(pressed);
            }
            SkipIfKeyNotPressed(x) => {
                let pressed = state.keypad.is_pressed(regs.read(x));
                state.skip_if(!pressed);
            }
            ReadDelayTimer(x) => regs.write(x, state.delay_timer),
            WaitForKey(x) => state.begin_key_wait(x),
            SetDelayTimer(x) => state.delay_timer = regs.read(x),
            SetSoundTimer(x) => state.sound_timer = regs.read(x),
            AddToIndex(x) => state.index = state.index.wrapping_add(u16::from(regs.read(x))),
            FontChar(x) => {
                state.index = (usize::from(regs.read(x)) * FONT_HEIGHT + FONT_ADDR) as Address;
            }
            BinaryCodedDecimal(x) => {
                let value_x = regs.read(x);
                let bcd = [value_x / 100, (value_x / 10) % 10, value_x % 10];
                let base = usize::from(state.index);
                for (offset, digit) in bcd.into_iter().enumerate() {
                    state.memory.write(base + offset, digit)?;
                }
            }
            Store(x) => {
                let base = usize::from(state.index);
                for (offset, reg) in x.up_to().enumerate() {
                    state.memory.write(base + offset, regs.read(reg))?;
                }
            }
            Load(x) => {
                let base = usize::from(state.index);
                for (offset, reg) in x.up_to().enumerate() {
                    regs.write(reg, state.memory.read(base + offset)?);
                }
            }
        }
        Ok(())
    }
}

impl Chip8State {
    fn skip_if(&mut self, condition: bool) {
        if condition {
            self.pc = self.pc.wrapping_add(2);
        }
    }
}
