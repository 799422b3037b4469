//! # VM
//!
//! Bytecode compiler and stack machine for the scripting language.
//!
//! ```text
//!  Program ──▶ Compiler ──(Bytecode)──▶ VM ──▶ last popped Value
//!                 │                      │
//!           SymbolTable +            Globals
//!           constant pool
//! ```
//!
//! A [`Session`] carries the symbol table, constant pool and globals from
//! one statement to the next:
//!
//! ```rust
//! let mut session = vm::Session::default();
//! session.eval_source("let x = 5;").unwrap();
//! assert_eq!(session.eval_source("x + 1").unwrap(), vm::Value::Number(6.0));
//! ```

pub mod builtins;
pub mod compiler;
pub mod globals;
pub mod interpreter;
pub mod session;
pub mod symbol_table;
pub mod value;

pub use builtins::Builtin;
pub use compiler::{Bytecode, CompileError, Compiler};
pub use globals::{GLOBALS_SIZE, Globals};
pub use interpreter::{MAX_FRAMES, RuntimeError, STACK_SIZE, VM};
pub use session::{Session, SessionConfig, SessionError};
pub use symbol_table::{Symbol, SymbolScope, SymbolTable};
pub use value::{Closure, CompiledFunction, HashKey, MapObject, Value};
