mod builder;
mod decoder;
mod instruction;
mod op;

pub use builder::{BytecodeBuilder, Label, TargetOutOfRange};
pub use decoder::{BytecodeDecoder, DecodeError, decode_at, disassemble};
pub use instruction::Instruction;
pub use op::Op;
