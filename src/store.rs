//! Byte-addressable program memory with a cursor.
//!
//! Three backings share one cursor-and-suspend implementation: a read-only
//! constant, a writable RAM buffer, and persistent non-volatile memory.
//! The persistent layout starts with the magic bytes `CA FE`; logical
//! address 0 is the first byte after the magic.

use crate::opcode::Opcode;

/// Magic prefix identifying bytecode in non-volatile memory.
pub const BYTECODE_MAGIC: [u8; 2] = [0xCA, 0xFE];

/// Byte-addressed non-volatile memory.
///
/// Addresses are physical offsets from the start of the device.
pub trait Eeprom {
    /// Size of the device in bytes
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_byte(&self, address: usize) -> u8;

    fn write_byte(&mut self, address: usize, value: u8);
}

enum Backing<'a> {
    Const(&'a [u8]),
    Ram(&'a mut [u8]),
    Persistent(&'a mut dyn Eeprom),
}

/// Program memory for the executor.
///
/// While suspended, [`next`](Self::next) yields a stream of `NOP` bytes and
/// the cursor stays put, so execution resumes exactly where it stopped.
/// Reads past the end of the backing yield `END` without advancing.
pub struct BytecodeStore<'a> {
    backing: Backing<'a>,
    cursor: usize,
    suspend_count: u16,
    /// Whether a program has ever been installed
    loaded: bool,
    /// Whether the persistent magic prefix checked out (always true for
    /// the in-memory backings)
    magic_ok: bool,
}

impl<'a> BytecodeStore<'a> {
    /// A read-only store over a program baked into the firmware image.
    pub fn from_const(program: &'a [u8]) -> Self {
        Self {
            loaded: !program.is_empty(),
            backing: Backing::Const(program),
            cursor: 0,
            suspend_count: 0,
            magic_ok: true,
        }
    }

    /// A writable store over a RAM buffer. Starts empty until the first
    /// upload installs a program.
    pub fn writable(buffer: &'a mut [u8]) -> Self {
        Self {
            backing: Backing::Ram(buffer),
            cursor: 0,
            suspend_count: 0,
            loaded: false,
            magic_ok: true,
        }
    }

    /// A store over persistent memory, validating the magic prefix.
    pub fn persistent(memory: &'a mut dyn Eeprom) -> Self {
        let magic_ok = memory.len() >= 2
            && memory.read_byte(0) == BYTECODE_MAGIC[0]
            && memory.read_byte(1) == BYTECODE_MAGIC[1];
        Self {
            backing: Backing::Persistent(memory),
            cursor: 0,
            suspend_count: 0,
            loaded: magic_ok,
            magic_ok,
        }
    }

    /// Length of the writable backing; zero for read-only stores.
    pub fn capacity(&self) -> usize {
        match &self.backing {
            Backing::Const(_) => 0,
            Backing::Ram(buffer) => buffer.len(),
            Backing::Persistent(memory) => memory.len().saturating_sub(BYTECODE_MAGIC.len()),
        }
    }

    /// Addressable range of the program, used to validate jump targets.
    ///
    /// Unlike [`capacity`](Self::capacity) this is nonzero for read-only
    /// stores.
    pub fn program_len(&self) -> usize {
        match &self.backing {
            Backing::Const(program) => program.len(),
            Backing::Ram(buffer) => buffer.len(),
            Backing::Persistent(memory) => memory.len().saturating_sub(BYTECODE_MAGIC.len()),
        }
    }

    /// Whether no program has ever been installed.
    pub fn empty(&self) -> bool {
        !self.loaded
    }

    /// Whether a persistent backing failed its magic check.
    pub fn missing_program(&self) -> bool {
        !self.magic_ok
    }

    /// Read the byte at the cursor and advance.
    pub fn next(&mut self) -> u8 {
        if self.suspended() {
            return Opcode::Nop as u8;
        }
        let byte = match &self.backing {
            Backing::Const(program) => program.get(self.cursor).copied(),
            Backing::Ram(buffer) => buffer.get(self.cursor).copied(),
            Backing::Persistent(memory) => {
                if !self.magic_ok {
                    return Opcode::Nop as u8;
                }
                let address = self.cursor + BYTECODE_MAGIC.len();
                (address < memory.len()).then(|| memory.read_byte(address))
            }
        };
        match byte {
            Some(byte) => {
                self.cursor += 1;
                byte
            }
            None => Opcode::End as u8,
        }
    }

    /// Move the cursor back to the start of the program.
    ///
    /// On persistent backings this re-checks the magic prefix, so a store
    /// that gained a program since boot starts serving it.
    pub fn rewind(&mut self) {
        self.cursor = 0;
        if let Backing::Persistent(memory) = &self.backing {
            self.magic_ok = memory.len() >= 2
                && memory.read_byte(0) == BYTECODE_MAGIC[0]
                && memory.read_byte(1) == BYTECODE_MAGIC[1];
            if self.magic_ok {
                self.loaded = true;
            }
        }
    }

    /// Move the cursor to `location` (clamped to the addressable range).
    pub fn seek(&mut self, location: usize) {
        self.cursor = location.min(self.program_len());
    }

    /// Current cursor position, or `None` when the backing cannot seek
    /// (a persistent store without a valid program).
    pub fn tell(&self) -> Option<usize> {
        if self.magic_ok {
            Some(self.cursor)
        } else {
            None
        }
    }

    /// Write a byte at the cursor and advance. Returns `false` on
    /// read-only or exhausted backings.
    ///
    /// Writing is not gated by suspension; uploads run while the store is
    /// suspended. The first write into a persistent backing without a
    /// valid program emits the magic prefix automatically.
    pub fn write(&mut self, value: u8) -> bool {
        match &mut self.backing {
            Backing::Const(_) => false,
            Backing::Ram(buffer) => {
                if let Some(slot) = buffer.get_mut(self.cursor) {
                    *slot = value;
                    self.cursor += 1;
                    self.loaded = true;
                    true
                } else {
                    false
                }
            }
            Backing::Persistent(memory) => {
                if !self.magic_ok {
                    if memory.len() < BYTECODE_MAGIC.len() {
                        return false;
                    }
                    memory.write_byte(0, BYTECODE_MAGIC[0]);
                    memory.write_byte(1, BYTECODE_MAGIC[1]);
                    self.magic_ok = true;
                    self.cursor = 0;
                }
                let address = self.cursor + BYTECODE_MAGIC.len();
                if address < memory.len() {
                    memory.write_byte(address, value);
                    self.cursor += 1;
                    self.loaded = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Suspend the store; balanced by [`resume`](Self::resume).
    pub fn suspend(&mut self) {
        self.suspend_count += 1;
    }

    /// Undo one [`suspend`](Self::suspend).
    pub fn resume(&mut self) {
        self.suspend_count = self.suspend_count.saturating_sub(1);
    }

    pub fn suspended(&self) -> bool {
        self.suspend_count > 0
    }
}
