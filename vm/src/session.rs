use std::fmt;

use parser::ParseError;
use parser::ast::{Program, Stmt, StmtKind};

use crate::compiler::{Bytecode, CompileError, Compiler};
use crate::globals::Globals;
use crate::interpreter::{RuntimeError, VM};
use crate::symbol_table::SymbolTable;
use crate::value::Value;

/// How a [`Session`] treats state between statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Carry symbols, constants and globals from one `eval` to the next.
    /// When off, every `eval` starts from a blank session.
    pub persistent: bool,
    /// Snapshot the globals before each run and restore them if the run
    /// fails.
    pub atomic: bool,
    pub instruction_budget: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            persistent: true,
            atomic: false,
            instruction_budget: None,
        }
    }
}

#[derive(Debug)]
pub enum SessionError {
    Parse(Vec<ParseError>),
    Compile(CompileError),
    Runtime(RuntimeError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Parse(errors) => {
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "parse error: {err}")?;
                }
                Ok(())
            }
            SessionError::Compile(err) => write!(f, "compile error: {err}"),
            SessionError::Runtime(err) => write!(f, "runtime error: {err}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Parse(errors) => errors
                .first()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            SessionError::Compile(err) => Some(err),
            SessionError::Runtime(err) => Some(err),
        }
    }
}

impl From<Vec<ParseError>> for SessionError {
    fn from(errors: Vec<ParseError>) -> Self {
        SessionError::Parse(errors)
    }
}

impl From<CompileError> for SessionError {
    fn from(err: CompileError) -> Self {
        SessionError::Compile(err)
    }
}

impl From<RuntimeError> for SessionError {
    fn from(err: RuntimeError) -> Self {
        SessionError::Runtime(err)
    }
}

/// State carried between statements of an interactive session: the
/// symbol table, the constant pool and the globals store.
///
/// Each [`eval`](Self::eval) compiles against the carried symbols and
/// constants, then runs against the carried globals.
pub struct Session {
    config: SessionConfig,
    symbol_table: SymbolTable,
    constants: Vec<Value>,
    globals: Globals,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            symbol_table: Compiler::global_symbol_table(),
            constants: Vec::new(),
            globals: Globals::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    /// Forget every binding, constant and global.
    pub fn reset(&mut self) {
        self.symbol_table = Compiler::global_symbol_table();
        self.constants.clear();
        self.globals.clear();
    }

    /// Compile `program` against the carried state without running it.
    ///
    /// On failure the symbol table and constant pool are left as they were
    /// before the call.
    pub fn compile(&mut self, program: &Program) -> Result<Bytecode, CompileError> {
        if !self.config.persistent {
            self.reset();
        }

        let pool_len = self.constants.len();
        let mut compiler = Compiler::with_state(
            self.symbol_table.clone(),
            std::mem::take(&mut self.constants),
        );
        if let Err(err) = compiler.compile(program) {
            let (_, mut constants) = compiler.into_state();
            constants.truncate(pool_len);
            self.constants = constants;
            return Err(err);
        }

        let bytecode = compiler.bytecode();
        let (symbol_table, constants) = compiler.into_state();
        self.symbol_table = symbol_table;
        self.constants = constants;
        Ok(bytecode)
    }

    pub fn compile_source(&mut self, source: &str) -> Result<Bytecode, SessionError> {
        let program = parser::parse(source)?;
        Ok(self.compile(&program)?)
    }

    /// Compile and run `program`, returning the last popped value.
    pub fn eval(&mut self, program: &Program) -> Result<Value, SessionError> {
        let bytecode = self.compile(program)?;
        let snapshot = self.config.atomic.then(|| self.globals.clone());

        let outcome = {
            let mut vm = VM::new(bytecode, &mut self.globals);
            if let Some(budget) = self.config.instruction_budget {
                vm = vm.with_instruction_budget(budget);
            }
            vm.run().map(|()| vm.last_popped().clone())
        };

        match outcome {
            Ok(value) => {
                log::debug!(
                    "eval ok: {} globals, {} constants",
                    self.globals.len(),
                    self.constants.len()
                );
                Ok(value)
            }
            Err(err) => {
                if let Some(snapshot) = snapshot {
                    log::warn!("rolling back globals after runtime error: {err}");
                    self.globals = snapshot;
                }
                Err(err.into())
            }
        }
    }

    pub fn eval_source(&mut self, source: &str) -> Result<Value, SessionError> {
        let program = parser::parse(source)?;
        self.eval(&program)
    }

    /// Evaluate one line of interactive input. Yields `None` when the line
    /// ends in a `let`, which leaves nothing worth echoing.
    pub fn eval_line(&mut self, source: &str) -> Result<Option<Value>, SessionError> {
        let program = parser::parse(source)?;
        let binds = matches!(
            program.statements.last(),
            Some(Stmt {
                kind: StmtKind::Let { .. },
                ..
            })
        );
        let value = self.eval(&program)?;
        Ok((!binds).then_some(value))
    }
}
