/// Bytecode opcodes.
///
/// Every opcode is a single byte followed by a fixed number of big-endian
/// operands. Operand widths are declared once in
/// [`operand_widths`](Op::operand_widths) and never vary per occurrence.
/// Jump targets are absolute byte offsets into the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    /// Push a constant pool entry.
    /// Operands: `idx:u16`
    Constant = 0x00,

    /// Pop the top of the stack, recording it as the last popped value.
    Pop,

    /// Pop two values, push their sum (or the concatenation of two strings).
    Add,
    /// Pop two values, push their difference.
    Sub,
    /// Pop two values, push their product.
    Mul,
    /// Pop two values, push their quotient.
    Div,

    /// Push `true`.
    True,
    /// Push `false`.
    False,
    /// Push `null`.
    Null,

    /// Pop two values, push whether they are equal.
    Equal,
    /// Pop two values, push whether they differ.
    NotEqual,
    /// Pop two numbers, push whether the first is greater than the second.
    /// `a < b` is compiled as `b > a`.
    GreaterThan,

    /// Negate a number.
    Minus,
    /// Logical not under the truthiness rule.
    Bang,

    /// Pop the condition and jump if it is falsy.
    /// Operands: `target:u16`
    JumpNotTruthy,
    /// Unconditional jump.
    /// Operands: `target:u16`
    Jump,

    /// Push a value from the globals store.
    /// Operands: `idx:u16`
    GetGlobal,
    /// Pop a value into the globals store.
    /// Operands: `idx:u16`
    SetGlobal,

    /// Push a local from the current frame's window.
    /// Operands: `idx:u8`
    GetLocal,
    /// Pop a value into the current frame's window.
    /// Operands: `idx:u8`
    SetLocal,

    /// Push a built-in function.
    /// Operands: `idx:u8`
    GetBuiltin,

    /// Push a value captured by the executing closure.
    /// Operands: `idx:u8`
    GetFree,

    /// Push the executing closure itself.
    CurrentClosure,

    /// Build an array from the top `len` values.
    /// Operands: `len:u16`
    Array,

    /// Build a map from the top `len` values (`len / 2` key/value pairs).
    /// Operands: `len:u16`
    Hash,

    /// Pop an index and a container, push the element.
    Index,

    /// Call the value below the top `argc` arguments.
    /// Operands: `argc:u8`
    Call,

    /// Return the top of the stack from the current frame.
    ReturnValue,

    /// Return `null` from the current frame.
    Return,

    /// Wrap a compiled function constant and `free` captured values.
    /// Operands: `const_idx:u16`, `free:u8`
    Closure,
}

impl Op {
    pub const COUNT: usize = Op::Closure as usize + 1;

    /// Byte widths of each operand, in encoding order.
    pub const fn operand_widths(self) -> &'static [usize] {
        match self {
            Op::Constant
            | Op::JumpNotTruthy
            | Op::Jump
            | Op::GetGlobal
            | Op::SetGlobal
            | Op::Array
            | Op::Hash => &[2],
            Op::GetLocal
            | Op::SetLocal
            | Op::GetBuiltin
            | Op::GetFree
            | Op::Call => &[1],
            Op::Closure => &[2, 1],
            Op::Pop
            | Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::True
            | Op::False
            | Op::Null
            | Op::Equal
            | Op::NotEqual
            | Op::GreaterThan
            | Op::Minus
            | Op::Bang
            | Op::CurrentClosure
            | Op::Index
            | Op::ReturnValue
            | Op::Return => &[],
        }
    }

    /// Total encoded size of the instruction, opcode byte included.
    pub const fn encoded_len(self) -> usize {
        let widths = self.operand_widths();
        let mut len = 1;
        let mut i = 0;
        while i < widths.len() {
            len += widths[i];
            i += 1;
        }
        len
    }

    pub const fn name(self) -> &'static str {
        match self {
            Op::Constant => "Constant",
            Op::Pop => "Pop",
            Op::Add => "Add",
            Op::Sub => "Sub",
            Op::Mul => "Mul",
            Op::Div => "Div",
            Op::True => "True",
            Op::False => "False",
            Op::Null => "Null",
            Op::Equal => "Equal",
            Op::NotEqual => "NotEqual",
            Op::GreaterThan => "GreaterThan",
            Op::Minus => "Minus",
            Op::Bang => "Bang",
            Op::JumpNotTruthy => "JumpNotTruthy",
            Op::Jump => "Jump",
            Op::GetGlobal => "GetGlobal",
            Op::SetGlobal => "SetGlobal",
            Op::GetLocal => "GetLocal",
            Op::SetLocal => "SetLocal",
            Op::GetBuiltin => "GetBuiltin",
            Op::GetFree => "GetFree",
            Op::CurrentClosure => "CurrentClosure",
            Op::Array => "Array",
            Op::Hash => "Hash",
            Op::Index => "Index",
            Op::Call => "Call",
            Op::ReturnValue => "ReturnValue",
            Op::Return => "Return",
            Op::Closure => "Closure",
        }
    }
}

impl TryFrom<u8> for Op {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        if (byte as usize) < Self::COUNT {
            // SAFETY: Op is repr(u8) with contiguous variants starting at 0.
            Ok(unsafe { core::mem::transmute::<u8, Op>(byte) })
        } else {
            Err(byte)
        }
    }
}

impl core::fmt::Display for Op {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
