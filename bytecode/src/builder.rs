use crate::instruction::Instruction;
use crate::op::Op;

/// A forward jump whose target has not yet been resolved.
///
/// Created by [`BytecodeBuilder::jump`] and
/// [`BytecodeBuilder::jump_not_truthy`]. Resolve it with
/// [`BytecodeBuilder::bind`].
#[derive(Debug)]
#[must_use = "an unbound label leaves a dangling jump"]
pub struct Label {
    /// Position of the u16 target bytes in the buffer.
    operand_pos: usize,
}

/// Error returned when an absolute jump target does not fit the operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetOutOfRange(pub usize);

/// Builds a bytecode byte sequence.
///
/// Operands are written big-endian. Jump operands hold absolute byte
/// offsets and are written as placeholders first, then patched in place.
#[derive(Debug, Default, Clone)]
pub struct BytecodeBuilder {
    buf: Vec<u8>,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Current byte offset in the bytecode stream.
    pub fn current_offset(&self) -> usize {
        self.buf.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    // ── emit helpers ───────────────────────────────────────────────

    fn emit_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn emit_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn emit_op(&mut self, op: Op) {
        self.buf.push(op as u8);
    }

    /// Encode `instruction` and return the offset it starts at.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let pos = self.buf.len();
        self.emit_op(instruction.op());
        match instruction {
            Instruction::Constant { idx }
            | Instruction::GetGlobal { idx }
            | Instruction::SetGlobal { idx } => self.emit_u16(idx),
            Instruction::JumpNotTruthy { target }
            | Instruction::Jump { target } => self.emit_u16(target),
            Instruction::Array { len } | Instruction::Hash { len } => {
                self.emit_u16(len)
            }
            Instruction::GetLocal { idx }
            | Instruction::SetLocal { idx }
            | Instruction::GetBuiltin { idx }
            | Instruction::GetFree { idx } => self.emit_u8(idx),
            Instruction::Call { argc } => self.emit_u8(argc),
            Instruction::Closure { const_idx, free } => {
                self.emit_u16(const_idx);
                self.emit_u8(free);
            }
            Instruction::Pop
            | Instruction::Add
            | Instruction::Sub
            | Instruction::Mul
            | Instruction::Div
            | Instruction::True
            | Instruction::False
            | Instruction::Null
            | Instruction::Equal
            | Instruction::NotEqual
            | Instruction::GreaterThan
            | Instruction::Minus
            | Instruction::Bang
            | Instruction::CurrentClosure
            | Instruction::Index
            | Instruction::ReturnValue
            | Instruction::Return => {}
        }
        debug_assert_eq!(self.buf.len() - pos, instruction.len());
        pos
    }

    // ── jumps ──────────────────────────────────────────────────────

    fn emit_forward(&mut self, op: Op) -> (usize, Label) {
        let pos = self.buf.len();
        self.emit_op(op);
        let operand_pos = self.buf.len();
        self.emit_u16(u16::MAX);
        (pos, Label { operand_pos })
    }

    /// `Jump <target:u16>` with a placeholder target.
    pub fn jump(&mut self) -> (usize, Label) {
        self.emit_forward(Op::Jump)
    }

    /// `JumpNotTruthy <target:u16>` with a placeholder target.
    pub fn jump_not_truthy(&mut self) -> (usize, Label) {
        self.emit_forward(Op::JumpNotTruthy)
    }

    /// Patch `label` so the jump lands at the current offset.
    pub fn bind(&mut self, label: Label) -> Result<(), TargetOutOfRange> {
        let target = self.current_offset();
        let target = u16::try_from(target).map_err(|_| TargetOutOfRange(target))?;
        debug_assert!(label.operand_pos + 2 <= self.buf.len());
        self.buf[label.operand_pos..label.operand_pos + 2]
            .copy_from_slice(&target.to_be_bytes());
        Ok(())
    }

    // ── rewriting ──────────────────────────────────────────────────

    /// Drop every byte from `offset` on. Used to retract the most recently
    /// emitted instruction.
    pub fn truncate(&mut self, offset: usize) {
        self.buf.truncate(offset);
    }

    /// Overwrite the opcode byte at `offset` with an opcode of the same
    /// encoded length.
    pub fn replace_op(&mut self, offset: usize, op: Op) {
        debug_assert!(
            Op::try_from(self.buf[offset])
                .is_ok_and(|old| old.encoded_len() == op.encoded_len()),
            "replacement must keep the instruction width"
        );
        self.buf[offset] = op as u8;
    }
}
