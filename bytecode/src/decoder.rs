use core::fmt;

use crate::instruction::Instruction;
use crate::op::Op;

/// Failure to decode a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The byte at `offset` is not an opcode.
    InvalidOpcode { offset: usize, byte: u8 },
    /// The instruction at `offset` runs past the end of the stream.
    Truncated { offset: usize, op: Op },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOpcode { offset, byte } => {
                write!(f, "invalid opcode 0x{byte:02x} at offset {offset}")
            }
            Self::Truncated { offset, op } => {
                write!(f, "truncated {op} instruction at offset {offset}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode the instruction starting at `offset`.
///
/// Returns the instruction and the offset of the one after it.
///
/// # Panics
///
/// If `offset` is not inside `bytes`.
pub fn decode_at(
    bytes: &[u8],
    offset: usize,
) -> Result<(Instruction, usize), DecodeError> {
    let byte = bytes[offset];
    let op = Op::try_from(byte)
        .map_err(|byte| DecodeError::InvalidOpcode { offset, byte })?;
    let next = offset + op.encoded_len();
    if next > bytes.len() {
        return Err(DecodeError::Truncated { offset, op });
    }

    let u8_at = |i: usize| bytes[offset + 1 + i];
    let u16_at =
        |i: usize| u16::from_be_bytes([bytes[offset + 1 + i], bytes[offset + 2 + i]]);

    let instruction = match op {
        Op::Constant => Instruction::Constant { idx: u16_at(0) },
        Op::Pop => Instruction::Pop,
        Op::Add => Instruction::Add,
        Op::Sub => Instruction::Sub,
        Op::Mul => Instruction::Mul,
        Op::Div => Instruction::Div,
        Op::True => Instruction::True,
        Op::False => Instruction::False,
        Op::Null => Instruction::Null,
        Op::Equal => Instruction::Equal,
        Op::NotEqual => Instruction::NotEqual,
        Op::GreaterThan => Instruction::GreaterThan,
        Op::Minus => Instruction::Minus,
        Op::Bang => Instruction::Bang,
        Op::JumpNotTruthy => Instruction::JumpNotTruthy { target: u16_at(0) },
        Op::Jump => Instruction::Jump { target: u16_at(0) },
        Op::GetGlobal => Instruction::GetGlobal { idx: u16_at(0) },
        Op::SetGlobal => Instruction::SetGlobal { idx: u16_at(0) },
        Op::GetLocal => Instruction::GetLocal { idx: u8_at(0) },
        Op::SetLocal => Instruction::SetLocal { idx: u8_at(0) },
        Op::GetBuiltin => Instruction::GetBuiltin { idx: u8_at(0) },
        Op::GetFree => Instruction::GetFree { idx: u8_at(0) },
        Op::CurrentClosure => Instruction::CurrentClosure,
        Op::Array => Instruction::Array { len: u16_at(0) },
        Op::Hash => Instruction::Hash { len: u16_at(0) },
        Op::Index => Instruction::Index,
        Op::Call => Instruction::Call { argc: u8_at(0) },
        Op::ReturnValue => Instruction::ReturnValue,
        Op::Return => Instruction::Return,
        Op::Closure => Instruction::Closure {
            const_idx: u16_at(0),
            free: u8_at(2),
        },
    };

    Ok((instruction, next))
}

/// Decodes a bytecode byte slice into [`Instruction`]s.
///
/// Iteration stops after the first [`DecodeError`].
pub struct BytecodeDecoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> BytecodeDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            failed: false,
        }
    }

    /// Current byte offset in the stream.
    #[inline(always)]
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Whether the decoder has reached the end of the bytecode.
    #[inline(always)]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Decode the next instruction together with its offset.
    pub fn decode_next(
        &mut self,
    ) -> Option<Result<(usize, Instruction), DecodeError>> {
        if self.failed || self.is_at_end() {
            return None;
        }
        let offset = self.pos;
        match decode_at(self.bytes, offset) {
            Ok((instruction, next)) => {
                self.pos = next;
                Some(Ok((offset, instruction)))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

impl Iterator for BytecodeDecoder<'_> {
    type Item = Instruction;

    /// Yields instructions until the end of the stream or the first
    /// malformed instruction. Use [`decode_next`](Self::decode_next) to
    /// observe decode errors.
    fn next(&mut self) -> Option<Instruction> {
        match self.decode_next()? {
            Ok((_, instruction)) => Some(instruction),
            Err(_) => None,
        }
    }
}

/// Render `bytes` one instruction per line as `OFFSET Instruction`.
pub fn disassemble(bytes: &[u8]) -> String {
    let mut out = String::new();
    let mut decoder = BytecodeDecoder::new(bytes);
    while let Some(result) = decoder.decode_next() {
        match result {
            Ok((offset, instruction)) => {
                out.push_str(&format!("{offset:04} {instruction}\n"));
            }
            Err(err) => {
                out.push_str(&format!("ERROR: {err}\n"));
            }
        }
    }
    out
}
