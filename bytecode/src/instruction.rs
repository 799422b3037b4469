use core::fmt;

use crate::op::Op;

/// A decoded instruction with its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Constant { idx: u16 },
    Pop,
    Add,
    Sub,
    Mul,
    Div,
    True,
    False,
    Null,
    Equal,
    NotEqual,
    GreaterThan,
    Minus,
    Bang,
    JumpNotTruthy { target: u16 },
    Jump { target: u16 },
    GetGlobal { idx: u16 },
    SetGlobal { idx: u16 },
    GetLocal { idx: u8 },
    SetLocal { idx: u8 },
    GetBuiltin { idx: u8 },
    GetFree { idx: u8 },
    CurrentClosure,
    Array { len: u16 },
    Hash { len: u16 },
    Index,
    Call { argc: u8 },
    ReturnValue,
    Return,
    Closure { const_idx: u16, free: u8 },
}

impl Instruction {
    pub const fn op(&self) -> Op {
        match self {
            Self::Constant { .. } => Op::Constant,
            Self::Pop => Op::Pop,
            Self::Add => Op::Add,
            Self::Sub => Op::Sub,
            Self::Mul => Op::Mul,
            Self::Div => Op::Div,
            Self::True => Op::True,
            Self::False => Op::False,
            Self::Null => Op::Null,
            Self::Equal => Op::Equal,
            Self::NotEqual => Op::NotEqual,
            Self::GreaterThan => Op::GreaterThan,
            Self::Minus => Op::Minus,
            Self::Bang => Op::Bang,
            Self::JumpNotTruthy { .. } => Op::JumpNotTruthy,
            Self::Jump { .. } => Op::Jump,
            Self::GetGlobal { .. } => Op::GetGlobal,
            Self::SetGlobal { .. } => Op::SetGlobal,
            Self::GetLocal { .. } => Op::GetLocal,
            Self::SetLocal { .. } => Op::SetLocal,
            Self::GetBuiltin { .. } => Op::GetBuiltin,
            Self::GetFree { .. } => Op::GetFree,
            Self::CurrentClosure => Op::CurrentClosure,
            Self::Array { .. } => Op::Array,
            Self::Hash { .. } => Op::Hash,
            Self::Index => Op::Index,
            Self::Call { .. } => Op::Call,
            Self::ReturnValue => Op::ReturnValue,
            Self::Return => Op::Return,
            Self::Closure { .. } => Op::Closure,
        }
    }

    /// Encoded size in bytes.
    pub const fn len(&self) -> usize {
        self.op().encoded_len()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant { idx } => write!(f, "Constant #{idx}"),
            Self::JumpNotTruthy { target } => {
                write!(f, "JumpNotTruthy @{target}")
            }
            Self::Jump { target } => write!(f, "Jump @{target}"),
            Self::GetGlobal { idx } => write!(f, "GetGlobal g{idx}"),
            Self::SetGlobal { idx } => write!(f, "SetGlobal g{idx}"),
            Self::GetLocal { idx } => write!(f, "GetLocal l{idx}"),
            Self::SetLocal { idx } => write!(f, "SetLocal l{idx}"),
            Self::GetBuiltin { idx } => write!(f, "GetBuiltin {idx}"),
            Self::GetFree { idx } => write!(f, "GetFree f{idx}"),
            Self::Array { len } => write!(f, "Array {len}"),
            Self::Hash { len } => write!(f, "Hash {len}"),
            Self::Call { argc } => write!(f, "Call {argc}"),
            Self::Closure { const_idx, free } => {
                write!(f, "Closure #{const_idx} {free}")
            }
            other => f.write_str(other.op().name()),
        }
    }
}
