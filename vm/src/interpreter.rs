use std::fmt;
use std::rc::Rc;

use bytecode::{DecodeError, Instruction, Op, decode_at};

use crate::builtins::Builtin;
use crate::compiler::Bytecode;
use crate::globals::Globals;
use crate::value::{Closure, CompiledFunction, HashKey, MapObject, Value};

/// Operand stack depth.
pub const STACK_SIZE: usize = 2048;
/// Call depth.
pub const MAX_FRAMES: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// Arithmetic on anything but two numbers (or two strings for `+`),
    /// or ordering across types.
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    /// Ordering on two same-typed operands that are not numbers.
    UnknownOperator { op: &'static str, operand: &'static str },
    /// Unary operator applied to an operand it does not support.
    UnsupportedOperand { op: &'static str, operand: &'static str },
    NotAFunction(&'static str),
    WrongArity { expected: usize, got: usize },
    StackOverflow,
    StackUnderflow,
    UnresolvedBuiltin(u8),
    IndexNotSupported {
        container: &'static str,
        index: &'static str,
    },
    UnusableAsHashKey(&'static str),
    Builtin { name: &'static str, message: String },
    InvalidOpcode(DecodeError),
    /// An operand that points outside the constant pool, at a constant of
    /// the wrong kind, or past a frame's locals or captures.
    InvalidOperand { op: Op, operand: usize },
    BudgetExhausted,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::TypeMismatch { op, left, right } => {
                write!(f, "type mismatch: {left} {op} {right}")
            }
            RuntimeError::UnknownOperator { op, operand } => {
                write!(f, "unknown operator: {operand} {op} {operand}")
            }
            RuntimeError::UnsupportedOperand { op, operand } => {
                write!(f, "unsupported operand for {op}: {operand}")
            }
            RuntimeError::NotAFunction(ty) => write!(f, "calling non-function: {ty}"),
            RuntimeError::WrongArity { expected, got } => write!(
                f,
                "wrong number of arguments: want={expected}, got={got}"
            ),
            RuntimeError::StackOverflow => f.write_str("stack overflow"),
            RuntimeError::StackUnderflow => f.write_str("stack underflow"),
            RuntimeError::UnresolvedBuiltin(idx) => {
                write!(f, "unresolved builtin #{idx}")
            }
            RuntimeError::IndexNotSupported { container, index } => {
                write!(f, "index operator not supported: {container}[{index}]")
            }
            RuntimeError::UnusableAsHashKey(ty) => {
                write!(f, "unusable as hash key: {ty}")
            }
            RuntimeError::Builtin { name, message } => write!(f, "{name}: {message}"),
            RuntimeError::InvalidOpcode(err) => write!(f, "{err}"),
            RuntimeError::InvalidOperand { op, operand } => {
                write!(f, "invalid operand {operand} for {op}")
            }
            RuntimeError::BudgetExhausted => f.write_str("instruction budget exhausted"),
        }
    }
}

impl std::error::Error for RuntimeError {}

#[derive(Debug)]
struct Frame {
    closure: Rc<Closure>,
    ip: usize,
    /// Stack slot of local 0. The callee itself sits just below it.
    base_pointer: usize,
}

impl Frame {
    fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: 0,
            base_pointer,
        }
    }

    fn instructions(&self) -> &[u8] {
        &self.closure.function.instructions
    }
}

/// Stack machine executing one [`Bytecode`] against a borrowed
/// [`Globals`] store.
///
/// Locals live on the operand stack: a call leaves the callee in place,
/// and its arguments become the first `num_parameters` slots of the new
/// frame's window. Returning discards the window and the callee and
/// pushes the result where the callee was.
pub struct VM<'g> {
    constants: Vec<Value>,
    stack: Vec<Value>,
    /// Next free stack slot.
    sp: usize,
    globals: &'g mut Globals,
    frames: Vec<Frame>,
    last_popped: Value,
    budget: Option<u64>,
}

impl<'g> VM<'g> {
    pub fn new(bytecode: Bytecode, globals: &'g mut Globals) -> Self {
        let main = CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        };
        let main = Rc::new(Closure::new(Rc::new(main), Vec::new()));
        let mut frames = Vec::with_capacity(64);
        frames.push(Frame::new(main, 0));
        Self {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
            last_popped: Value::Null,
            budget: None,
        }
    }

    /// Abort with [`RuntimeError::BudgetExhausted`] once `n` instructions
    /// have been dispatched.
    pub fn with_instruction_budget(mut self, n: u64) -> Self {
        self.budget = Some(n);
        self
    }

    /// The value most recently removed by `Pop`: the result of the last
    /// expression statement.
    pub fn last_popped(&self) -> &Value {
        &self.last_popped
    }

    pub fn stack_top(&self) -> Option<&Value> {
        self.sp.checked_sub(1).map(|top| &self.stack[top])
    }

    /// Execute until the top-level code runs off its end.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            let Some(frame) = self.frames.last() else {
                return Ok(());
            };
            let ip = frame.ip;
            let code = frame.instructions();
            if ip >= code.len() {
                if self.frames.len() == 1 {
                    return Ok(());
                }
                // Compiled bodies always end in a return; treat a missing
                // one as `Return`.
                self.return_with(Value::Null)?;
                continue;
            }
            let (instruction, next) =
                decode_at(code, ip).map_err(RuntimeError::InvalidOpcode)?;

            if let Some(budget) = self.budget.as_mut() {
                if *budget == 0 {
                    return Err(RuntimeError::BudgetExhausted);
                }
                *budget -= 1;
            }
            log::trace!("{:>3} {ip:04} {instruction}", self.frames.len());

            self.frame_mut().ip = next;
            self.execute(instruction)?;
        }
    }

    fn execute(&mut self, instruction: Instruction) -> Result<(), RuntimeError> {
        match instruction {
            Instruction::Constant { idx } => {
                let value = self.constant(Op::Constant, idx)?.clone();
                self.push(value)
            }
            Instruction::Pop => {
                self.last_popped = self.pop()?;
                Ok(())
            }
            Instruction::Add => self.arithmetic(Op::Add),
            Instruction::Sub => self.arithmetic(Op::Sub),
            Instruction::Mul => self.arithmetic(Op::Mul),
            Instruction::Div => self.arithmetic(Op::Div),
            Instruction::True => self.push(Value::Boolean(true)),
            Instruction::False => self.push(Value::Boolean(false)),
            Instruction::Null => self.push(Value::Null),
            Instruction::Equal | Instruction::NotEqual => {
                let right = self.pop()?;
                let left = self.pop()?;
                let equal = left == right;
                self.push(Value::Boolean(
                    equal == matches!(instruction, Instruction::Equal),
                ))
            }
            Instruction::GreaterThan => {
                let right = self.pop()?;
                let left = self.pop()?;
                let result = match (&left, &right) {
                    (Value::Number(l), Value::Number(r)) => l > r,
                    _ => return Err(ordering_error(">", &left, &right)),
                };
                self.push(Value::Boolean(result))
            }
            Instruction::Minus => match self.pop()? {
                Value::Number(n) => self.push(Value::Number(-n)),
                other => Err(RuntimeError::UnsupportedOperand {
                    op: "-",
                    operand: other.type_name(),
                }),
            },
            Instruction::Bang => {
                let operand = self.pop()?;
                self.push(Value::Boolean(!operand.is_truthy()))
            }
            Instruction::JumpNotTruthy { target } => {
                if !self.pop()?.is_truthy() {
                    self.frame_mut().ip = target as usize;
                }
                Ok(())
            }
            Instruction::Jump { target } => {
                self.frame_mut().ip = target as usize;
                Ok(())
            }
            Instruction::GetGlobal { idx } => {
                let value = self.globals.get(idx as usize);
                self.push(value)
            }
            Instruction::SetGlobal { idx } => {
                let value = self.pop()?;
                self.globals.set(idx as usize, value);
                Ok(())
            }
            Instruction::GetLocal { idx } => {
                let slot = self.local_slot(Op::GetLocal, idx)?;
                let value = self.stack[slot].clone();
                self.push(value)
            }
            Instruction::SetLocal { idx } => {
                let slot = self.local_slot(Op::SetLocal, idx)?;
                let value = self.pop()?;
                self.stack[slot] = value;
                Ok(())
            }
            Instruction::GetBuiltin { idx } => {
                let builtin =
                    Builtin::from_index(idx).ok_or(RuntimeError::UnresolvedBuiltin(idx))?;
                self.push(Value::Builtin(builtin))
            }
            Instruction::GetFree { idx } => {
                let value = self
                    .frame()
                    .closure
                    .free
                    .get(idx as usize)
                    .cloned()
                    .ok_or(RuntimeError::InvalidOperand {
                        op: Op::GetFree,
                        operand: idx as usize,
                    })?;
                self.push(value)
            }
            Instruction::CurrentClosure => {
                let closure = self.frame().closure.clone();
                self.push(Value::Closure(closure))
            }
            Instruction::Array { len } => {
                let items = self.pop_n(len as usize)?;
                self.push(Value::array(items))
            }
            Instruction::Hash { len } => {
                let items = self.pop_n(len as usize)?;
                let mut map = MapObject::with_capacity(items.len() / 2);
                let mut items = items.into_iter();
                while let (Some(key), Some(value)) = (items.next(), items.next()) {
                    let ty = key.type_name();
                    if !map.insert(key, value) {
                        return Err(RuntimeError::UnusableAsHashKey(ty));
                    }
                }
                self.push(Value::Map(Rc::new(map)))
            }
            Instruction::Index => {
                let index = self.pop()?;
                let left = self.pop()?;
                let value = index_value(&left, &index)?;
                self.push(value)
            }
            Instruction::Call { argc } => self.call(argc as usize),
            Instruction::ReturnValue => {
                let value = self.pop()?;
                self.return_with(value)
            }
            Instruction::Return => self.return_with(Value::Null),
            Instruction::Closure { const_idx, free } => {
                let function = match self.constant(Op::Closure, const_idx)? {
                    Value::CompiledFunction(function) => function.clone(),
                    _ => {
                        return Err(RuntimeError::InvalidOperand {
                            op: Op::Closure,
                            operand: const_idx as usize,
                        });
                    }
                };
                let captured = self.pop_n(free as usize)?;
                self.push(Value::Closure(Rc::new(Closure::new(function, captured))))
            }
        }
    }

    // ── calls ──────────────────────────────────────────────────────

    fn call(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let callee_slot = self
            .sp
            .checked_sub(argc + 1)
            .ok_or(RuntimeError::StackUnderflow)?;
        match self.stack[callee_slot].clone() {
            Value::Closure(closure) => {
                let expected = closure.function.num_parameters;
                if argc != expected {
                    return Err(RuntimeError::WrongArity {
                        expected,
                        got: argc,
                    });
                }
                if self.frames.len() >= MAX_FRAMES {
                    return Err(RuntimeError::StackOverflow);
                }
                let base_pointer = callee_slot + 1;
                let top = base_pointer + closure.function.num_locals;
                if top > STACK_SIZE {
                    return Err(RuntimeError::StackOverflow);
                }
                self.sp = top;
                self.frames.push(Frame::new(closure, base_pointer));
                Ok(())
            }
            Value::Builtin(builtin) => {
                let result = builtin.call(&self.stack[callee_slot + 1..self.sp])?;
                self.discard_from(callee_slot);
                self.push(result)
            }
            other => Err(RuntimeError::NotAFunction(other.type_name())),
        }
    }

    fn return_with(&mut self, value: Value) -> Result<(), RuntimeError> {
        let Some(frame) = self.frames.pop() else {
            return Err(RuntimeError::StackUnderflow);
        };
        if self.frames.is_empty() {
            self.last_popped = value;
            return Ok(());
        }
        self.discard_from(frame.base_pointer - 1);
        self.push(value)
    }

    // ── stack ──────────────────────────────────────────────────────

    fn frame(&self) -> &Frame {
        // The main frame is only popped by a return at top level, which
        // ends the run before the next dispatch.
        &self.frames[self.frames.len() - 1]
    }

    fn frame_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn constant(&self, op: Op, idx: u16) -> Result<&Value, RuntimeError> {
        self.constants
            .get(idx as usize)
            .ok_or(RuntimeError::InvalidOperand {
                op,
                operand: idx as usize,
            })
    }

    fn local_slot(&self, op: Op, idx: u8) -> Result<usize, RuntimeError> {
        let frame = self.frame();
        let slot = frame.base_pointer + idx as usize;
        if idx as usize >= frame.closure.function.num_locals || slot >= self.sp {
            return Err(RuntimeError::InvalidOperand {
                op,
                operand: idx as usize,
            });
        }
        Ok(slot)
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        if self.sp == 0 {
            return Err(RuntimeError::StackUnderflow);
        }
        self.sp -= 1;
        Ok(std::mem::replace(&mut self.stack[self.sp], Value::Null))
    }

    /// Remove the top `n` values, bottom-most first.
    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        let start = self.sp.checked_sub(n).ok_or(RuntimeError::StackUnderflow)?;
        let values = self.stack[start..self.sp]
            .iter_mut()
            .map(|slot| std::mem::replace(slot, Value::Null))
            .collect();
        self.sp = start;
        Ok(values)
    }

    /// Drop every value at or above `slot`.
    fn discard_from(&mut self, slot: usize) {
        for value in &mut self.stack[slot..self.sp] {
            *value = Value::Null;
        }
        self.sp = slot;
    }

    fn arithmetic(&mut self, op: Op) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;
        let symbol = match op {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            _ => "/",
        };
        let result = match (&left, &right) {
            (Value::Number(l), Value::Number(r)) => Value::Number(match op {
                Op::Add => l + r,
                Op::Sub => l - r,
                Op::Mul => l * r,
                _ => l / r,
            }),
            (Value::String(l), Value::String(r)) if op == Op::Add => {
                let mut joined = String::with_capacity(l.len() + r.len());
                joined.push_str(l);
                joined.push_str(r);
                Value::from(joined)
            }
            _ => {
                return Err(RuntimeError::TypeMismatch {
                    op: symbol,
                    left: left.type_name(),
                    right: right.type_name(),
                });
            }
        };
        self.push(result)
    }
}

/// Ordering on two non-numbers of the same type is an unknown operator;
/// mixed types are a mismatch.
fn ordering_error(op: &'static str, left: &Value, right: &Value) -> RuntimeError {
    let (left, right) = (left.type_name(), right.type_name());
    if left == right {
        RuntimeError::UnknownOperator { op, operand: left }
    } else {
        RuntimeError::TypeMismatch { op, left, right }
    }
}

fn index_value(left: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match (left, index) {
        (Value::Array(items), Value::Number(n)) => {
            let in_range = *n >= 0.0 && n.fract() == 0.0 && *n < items.len() as f64;
            Ok(if in_range {
                items[*n as usize].clone()
            } else {
                Value::Null
            })
        }
        (Value::Map(map), key) => {
            let key = HashKey::from_value(key)
                .ok_or(RuntimeError::UnusableAsHashKey(key.type_name()))?;
            Ok(map.get(&key).cloned().unwrap_or(Value::Null))
        }
        _ => Err(RuntimeError::IndexNotSupported {
            container: left.type_name(),
            index: index.type_name(),
        }),
    }
}
