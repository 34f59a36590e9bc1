use std::cmp::Ordering;
use std::io::{self, Write};

use colored::Colorize;
use fxhash::FxHashMap;

use crate::air::ObjImage;
use crate::ops::{self, Fields, Opcode};
use crate::term;

pub const MEM_SIZE: usize = 0x10000;

/// Execution begins here regardless of where the image is loaded.
const PC_START: u16 = 0x3000;

/// Keyboard status register; bit 15 set when a key is waiting.
const KBSR: u16 = 0xFE00;
/// Keyboard data register; reading it services the device.
const KBDR: u16 = 0xFE02;

// Condition codes, n z p from high to low. Matches the masks carried by
// branch instructions so the taken test is a single AND.
const FL_N: u16 = 0b100;
const FL_Z: u16 = 0b010;
const FL_P: u16 = 0b001;

/// The interpreter: memory, registers, and the fetch-decode-execute loop.
pub struct RunState {
    mem: Box<[u16; MEM_SIZE]>,
    reg: [u16; 8],
    pc: u16,
    /// One-hot condition code mask.
    flag: u16,
    running: bool,
    /// Decode results for words already executed. Hot loops decode each
    /// instruction once.
    decoded: FxHashMap<u16, (Opcode, Fields)>,
}

/// Instruction dispatch, indexed by opcode.
const OP_TABLE: [fn(&mut RunState, Fields); 16] = [
    RunState::br,
    RunState::add,
    RunState::ld,
    RunState::st,
    RunState::jsr,
    RunState::and,
    RunState::ldr,
    RunState::str,
    RunState::nop,
    RunState::not,
    RunState::ldi,
    RunState::sti,
    RunState::jmp,
    RunState::nop,
    RunState::lea,
    RunState::trap,
];

impl RunState {
    pub fn new() -> Self {
        RunState {
            mem: Box::new([0; MEM_SIZE]),
            reg: [0; 8],
            pc: PC_START,
            flag: FL_Z,
            running: false,
            decoded: FxHashMap::default(),
        }
    }

    pub fn from_image(image: &ObjImage) -> Self {
        let mut state = RunState::new();
        state.load(image.orig(), image.words());
        state
    }

    /// Build from the persisted word stream: origin first, then the program.
    pub fn from_raw(words: &[u16]) -> Self {
        let mut state = RunState::new();
        if let Some((&orig, program)) = words.split_first() {
            state.load(orig, program);
        }
        state
    }

    /// Addresses wrap modulo the memory size, like every other access.
    fn load(&mut self, orig: u16, words: &[u16]) {
        for (i, &word) in words.iter().enumerate() {
            let addr = orig.wrapping_add(i as u16);
            self.mem[addr as usize] = word;
        }
    }

    pub fn run(&mut self) {
        self.running = true;
        while self.running {
            self.step();
        }
    }

    /// One fetch-decode-execute cycle.
    pub fn step(&mut self) {
        let word = self.mem_read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        let (op, fields) = self.decode(word);
        OP_TABLE[op as usize](self, fields);
    }

    fn decode(&mut self, word: u16) -> (Opcode, Fields) {
        *self.decoded.entry(word).or_insert_with(|| ops::decode(word))
    }

    /// Reading the keyboard data register services the device: poll, and on
    /// a hit latch the status bit and the incoming byte.
    fn mem_read(&mut self, addr: u16) -> u16 {
        if addr == KBDR {
            if term::poll_available() {
                self.mem[KBSR as usize] = 1 << 15;
                self.mem[KBDR as usize] = term::read_byte() as u16;
            } else {
                self.mem[KBSR as usize] = 0;
            }
        }
        self.mem[addr as usize]
    }

    fn mem_write(&mut self, addr: u16, val: u16) {
        self.mem[addr as usize] = val;
    }

    /// Write a register and update the condition codes from the value.
    fn set(&mut self, r: u16, val: u16) {
        self.reg[r as usize] = val;
        self.flag = match (val as i16).cmp(&0) {
            Ordering::Less => FL_N,
            Ordering::Equal => FL_Z,
            Ordering::Greater => FL_P,
        };
    }

    fn br(&mut self, f: Fields) {
        if f[0] & self.flag != 0 {
            self.pc = self.pc.wrapping_add(s_ext(f[1], 9));
        }
    }

    fn add(&mut self, f: Fields) {
        let rhs = if f[4] == 1 {
            s_ext(f[3], 5)
        } else {
            self.reg[f[2] as usize]
        };
        let val = self.reg[f[1] as usize].wrapping_add(rhs);
        self.set(f[0], val);
    }

    fn and(&mut self, f: Fields) {
        let rhs = if f[4] == 1 {
            s_ext(f[3], 5)
        } else {
            self.reg[f[2] as usize]
        };
        let val = self.reg[f[1] as usize] & rhs;
        self.set(f[0], val);
    }

    fn not(&mut self, f: Fields) {
        let val = !self.reg[f[1] as usize];
        self.set(f[0], val);
    }

    fn ld(&mut self, f: Fields) {
        let addr = self.pc.wrapping_add(s_ext(f[1], 9));
        let val = self.mem_read(addr);
        self.set(f[0], val);
    }

    fn ldi(&mut self, f: Fields) {
        let addr = self.pc.wrapping_add(s_ext(f[1], 9));
        let addr = self.mem_read(addr);
        let val = self.mem_read(addr);
        self.set(f[0], val);
    }

    fn ldr(&mut self, f: Fields) {
        let addr = self.reg[f[1] as usize].wrapping_add(s_ext(f[2], 6));
        let val = self.mem_read(addr);
        self.set(f[0], val);
    }

    fn lea(&mut self, f: Fields) {
        let val = self.pc.wrapping_add(s_ext(f[1], 9));
        self.set(f[0], val);
    }

    fn st(&mut self, f: Fields) {
        let addr = self.pc.wrapping_add(s_ext(f[1], 9));
        self.mem_write(addr, self.reg[f[0] as usize]);
    }

    fn sti(&mut self, f: Fields) {
        let addr = self.pc.wrapping_add(s_ext(f[1], 9));
        let addr = self.mem_read(addr);
        self.mem_write(addr, self.reg[f[0] as usize]);
    }

    fn str(&mut self, f: Fields) {
        let addr = self.reg[f[1] as usize].wrapping_add(s_ext(f[2], 6));
        self.mem_write(addr, self.reg[f[0] as usize]);
    }

    fn jmp(&mut self, f: Fields) {
        self.pc = self.reg[f[0] as usize];
    }

    fn jsr(&mut self, f: Fields) {
        self.reg[7] = self.pc;
        if f[0] == 1 {
            self.pc = self.pc.wrapping_add(s_ext(f[1], 11));
        } else {
            self.pc = self.reg[f[2] as usize];
        }
    }

    // RTI and the reserved opcode
    fn nop(&mut self, _: Fields) {}

    fn trap(&mut self, f: Fields) {
        match f[0] {
            0x20 | 0x23 => self.reg[0] = term::read_byte() as u16,
            0x21 => {
                print!("{}", word_char(self.reg[0]));
                let _ = io::stdout().flush();
            }
            0x22 => self.puts(),
            0x24 => self.putsp(),
            0x25 => self.halt(),
            // Unhandled vectors are ignored
            _ => {}
        }
    }

    fn puts(&mut self) {
        let mut addr = self.reg[0];
        loop {
            let word = self.mem[addr as usize];
            if word == 0 {
                break;
            }
            print!("{}", word_char(word));
            addr = addr.wrapping_add(1);
        }
        let _ = io::stdout().flush();
    }

    fn putsp(&mut self) {
        print!("{}", self.packed_str());
        let _ = io::stdout().flush();
    }

    /// Packed variant of a string walk: two characters per word, low byte
    /// first. A zero in either byte ends the string.
    fn packed_str(&self) -> String {
        let mut out = String::new();
        let mut addr = self.reg[0];
        loop {
            let word = self.mem[addr as usize];
            let low = (word & 0xFF) as u8;
            if low == 0 {
                break;
            }
            out.push(low as char);
            let high = (word >> 8) as u8;
            if high == 0 {
                break;
            }
            out.push(high as char);
            addr = addr.wrapping_add(1);
        }
        out
    }

    fn halt(&mut self) {
        self.running = false;
        println!("\n{}", "Halted".cyan());
    }
}

impl Default for RunState {
    fn default() -> Self {
        RunState::new()
    }
}

fn s_ext(val: u16, bits: u32) -> u16 {
    if val >> (bits - 1) & 1 == 1 {
        val | (0xFFFF << bits)
    } else {
        val
    }
}

fn word_char(word: u16) -> char {
    char::from_u32(word as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
}
