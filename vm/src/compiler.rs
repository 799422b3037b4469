use std::rc::Rc;

use bytecode::{BytecodeBuilder, Instruction, Label, Op, disassemble};
use parser::ast::{Block, Expr, ExprKind, InfixOp, PrefixOp, Program, Stmt, StmtKind};
use parser::span::Span;

use crate::builtins::Builtin;
use crate::symbol_table::{Symbol, SymbolScope, SymbolTable};
use crate::value::{CompiledFunction, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub message: String,
    pub span: Option<Span>,
}

impl CompileError {
    fn new(msg: impl Into<String>, span: Span) -> Self {
        Self {
            message: msg.into(),
            span: Some(span),
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(span) = &self.span {
            write!(
                f,
                "{}:{}: {}",
                span.start.line, span.start.column, self.message
            )
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for CompileError {}

type CResult<T = ()> = Result<T, CompileError>;

/// Finished instructions plus the constant pool they index into.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Vec<u8>,
    pub constants: Vec<Value>,
}

/// Constant pool listing followed by a disassembly of the top level.
/// Function constants are disassembled in place.
impl std::fmt::Display for Bytecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "constants:")?;
        for (idx, constant) in self.constants.iter().enumerate() {
            match constant {
                Value::CompiledFunction(function) => {
                    writeln!(
                        f,
                        "  #{idx} fn/{} locals={}",
                        function.num_parameters, function.num_locals
                    )?;
                    for line in disassemble(&function.instructions).lines() {
                        writeln!(f, "      {line}")?;
                    }
                }
                Value::String(s) => writeln!(f, "  #{idx} {s:?}")?,
                other => writeln!(f, "  #{idx} {other}")?,
            }
        }
        writeln!(f, "instructions:")?;
        for line in disassemble(&self.instructions).lines() {
            writeln!(f, "  {line}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    op: Op,
    position: usize,
}

/// One function body (or the top level) being compiled.
#[derive(Debug, Default)]
struct CompilationScope {
    builder: BytecodeBuilder,
    last: Option<EmittedInstruction>,
    previous: Option<EmittedInstruction>,
}

/// Single-pass compiler from syntax tree to [`Bytecode`].
///
/// A compiler can be seeded with the symbol table and constant pool of a
/// previous one ([`with_state`](Self::with_state)) so that statements
/// compiled one at a time share globals and constants.
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_state(Self::global_symbol_table(), Vec::new())
    }

    pub fn with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Self {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// A top-level symbol table with every builtin defined.
    pub fn global_symbol_table() -> SymbolTable {
        let mut table = SymbolTable::new();
        for (idx, builtin) in Builtin::ALL.iter().enumerate() {
            table.define_builtin(idx, builtin.name());
        }
        table
    }

    pub fn compile(&mut self, program: &Program) -> CResult {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        log::debug!(
            "compiled {} statements: {} bytes, {} constants",
            program.statements.len(),
            self.scope().builder.current_offset(),
            self.constants.len()
        );
        Ok(())
    }

    /// The top-level instructions and the constant pool so far.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scope().builder.as_bytes().to_vec(),
            constants: self.constants.clone(),
        }
    }

    /// Hand back the symbol table and constant pool for the next compiler.
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbol_table, self.constants)
    }

    // ── scopes ─────────────────────────────────────────────────────

    fn scope(&self) -> &CompilationScope {
        // The top-level scope is never popped.
        &self.scopes[self.scopes.len() - 1]
    }

    fn scope_mut(&mut self) -> &mut CompilationScope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::enclosed(outer);
    }

    /// Pop the innermost scope, returning its instructions, captured
    /// symbols and local slot count.
    fn leave_scope(&mut self) -> (Vec<u8>, Vec<Symbol>, usize) {
        let scope = self.scopes.pop().unwrap_or_default();
        let inner = std::mem::take(&mut self.symbol_table);
        let free_symbols = inner.free_symbols().to_vec();
        let num_locals = inner.num_definitions();
        let Some(outer) = inner.into_outer() else {
            unreachable!("leave_scope without a matching enter_scope");
        };
        self.symbol_table = outer;
        (scope.builder.into_bytes(), free_symbols, num_locals)
    }

    // ── emission ───────────────────────────────────────────────────

    fn record(&mut self, op: Op, position: usize) {
        let scope = self.scope_mut();
        scope.previous = scope.last;
        scope.last = Some(EmittedInstruction { op, position });
    }

    fn emit(&mut self, instruction: Instruction) -> usize {
        let position = self.scope_mut().builder.emit(instruction);
        self.record(instruction.op(), position);
        position
    }

    fn emit_jump(&mut self, op: Op) -> Label {
        let (position, label) = match op {
            Op::JumpNotTruthy => self.scope_mut().builder.jump_not_truthy(),
            _ => self.scope_mut().builder.jump(),
        };
        self.record(op, position);
        label
    }

    fn bind(&mut self, label: Label, span: Span) -> CResult {
        self.scope_mut().builder.bind(label).map_err(|err| {
            CompileError::new(format!("jump target {} out of range", err.0), span)
        })
    }

    fn last_is(&self, op: Op) -> bool {
        self.scope().last.is_some_and(|last| last.op == op)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.scope_mut();
        if let Some(last) = scope.last {
            scope.builder.truncate(last.position);
            scope.last = scope.previous;
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        let scope = self.scope_mut();
        if let Some(last) = scope.last.as_mut() {
            scope.builder.replace_op(last.position, Op::ReturnValue);
            last.op = Op::ReturnValue;
        }
    }

    fn add_constant(&mut self, value: Value, span: Span) -> CResult<u16> {
        let existing = match &value {
            Value::Number(n) => self.constants.iter().position(
                |c| matches!(c, Value::Number(m) if m.to_bits() == n.to_bits()),
            ),
            Value::String(s) => self
                .constants
                .iter()
                .position(|c| matches!(c, Value::String(t) if t == s)),
            _ => None,
        };
        let idx = match existing {
            Some(idx) => idx,
            None => {
                self.constants.push(value);
                self.constants.len() - 1
            }
        };
        u16::try_from(idx)
            .map_err(|_| CompileError::new("too many constants", span))
    }

    // ── statements ─────────────────────────────────────────────────

    fn compile_statement(&mut self, stmt: &Stmt) -> CResult {
        match &stmt.kind {
            StmtKind::Expr { expr } => {
                self.compile_expression(expr)?;
                self.emit(Instruction::Pop);
            }
            StmtKind::Let { name, value } => {
                self.compile_expression(value)?;
                let symbol = self.symbol_table.define(&name.name);
                let instruction = match symbol.scope {
                    SymbolScope::Global => Instruction::SetGlobal {
                        idx: u16::try_from(symbol.index).map_err(|_| {
                            CompileError::new("too many global bindings", name.span)
                        })?,
                    },
                    _ => Instruction::SetLocal {
                        idx: u8::try_from(symbol.index).map_err(|_| {
                            CompileError::new("too many local bindings", name.span)
                        })?,
                    },
                };
                self.emit(instruction);
            }
            StmtKind::Return { value } => {
                if self.scopes.len() == 1 {
                    return Err(CompileError::new(
                        "return outside of a function",
                        stmt.span,
                    ));
                }
                self.compile_expression(value)?;
                self.emit(Instruction::ReturnValue);
            }
        }
        Ok(())
    }

    /// Compile a branch of an `if` so that it leaves exactly one value.
    fn compile_branch(&mut self, block: &Block) -> CResult {
        for stmt in &block.statements {
            self.compile_statement(stmt)?;
        }
        let yields_value = matches!(
            block.statements.last(),
            Some(Stmt {
                kind: StmtKind::Expr { .. },
                ..
            })
        );
        if yields_value && self.last_is(Op::Pop) {
            self.remove_last_pop();
        } else {
            self.emit(Instruction::Null);
        }
        Ok(())
    }

    // ── expressions ────────────────────────────────────────────────

    fn compile_expression(&mut self, expr: &Expr) -> CResult {
        match &expr.kind {
            ExprKind::Number(n) => {
                if !n.is_finite() {
                    return Err(CompileError::new(
                        format!("malformed number literal {n}"),
                        expr.span,
                    ));
                }
                let idx = self.add_constant(Value::Number(*n), expr.span)?;
                self.emit(Instruction::Constant { idx });
            }
            ExprKind::String(s) => {
                let idx = self.add_constant(Value::from(s.as_str()), expr.span)?;
                self.emit(Instruction::Constant { idx });
            }
            ExprKind::Boolean(true) => {
                self.emit(Instruction::True);
            }
            ExprKind::Boolean(false) => {
                self.emit(Instruction::False);
            }
            ExprKind::Prefix { op, right } => {
                self.compile_expression(right)?;
                self.emit(match op {
                    PrefixOp::Not => Instruction::Bang,
                    PrefixOp::Neg => Instruction::Minus,
                });
            }
            ExprKind::Infix { op, left, right } => {
                if *op == InfixOp::Lt {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(Instruction::GreaterThan);
                    return Ok(());
                }
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                self.emit(match op {
                    InfixOp::Add => Instruction::Add,
                    InfixOp::Sub => Instruction::Sub,
                    InfixOp::Mul => Instruction::Mul,
                    InfixOp::Div => Instruction::Div,
                    InfixOp::Gt | InfixOp::Lt => Instruction::GreaterThan,
                    InfixOp::Eq => Instruction::Equal,
                    InfixOp::NotEq => Instruction::NotEqual,
                });
            }
            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;
                let not_truthy = self.emit_jump(Op::JumpNotTruthy);
                self.compile_branch(consequence)?;
                let done = self.emit_jump(Op::Jump);
                self.bind(not_truthy, expr.span)?;
                match alternative {
                    Some(alternative) => self.compile_branch(alternative)?,
                    None => {
                        self.emit(Instruction::Null);
                    }
                }
                self.bind(done, expr.span)?;
            }
            ExprKind::Identifier(name) => {
                let symbol = self.symbol_table.resolve(name).ok_or_else(|| {
                    CompileError::new(format!("undefined variable {name}"), expr.span)
                })?;
                self.load_symbol(&symbol, expr.span)?;
            }
            ExprKind::Function {
                name,
                parameters,
                body,
            } => {
                if parameters.len() > u8::MAX as usize {
                    return Err(CompileError::new("too many parameters", expr.span));
                }

                self.enter_scope();
                if let Some(name) = name {
                    self.symbol_table.define_function_name(name);
                }
                for param in parameters {
                    self.symbol_table.define(&param.name);
                }
                for stmt in &body.statements {
                    self.compile_statement(stmt)?;
                }
                if self.last_is(Op::Pop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_is(Op::ReturnValue) {
                    self.emit(Instruction::Return);
                }

                let (instructions, free_symbols, num_locals) = self.leave_scope();
                let free = u8::try_from(free_symbols.len()).map_err(|_| {
                    CompileError::new("too many captured variables", expr.span)
                })?;
                for symbol in &free_symbols {
                    self.load_symbol(symbol, expr.span)?;
                }

                let function = CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters: parameters.len(),
                };
                // Functions are never deduplicated.
                self.constants.push(Value::CompiledFunction(Rc::new(function)));
                let const_idx = u16::try_from(self.constants.len() - 1)
                    .map_err(|_| CompileError::new("too many constants", expr.span))?;
                self.emit(Instruction::Closure { const_idx, free });
            }
            ExprKind::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for arg in arguments {
                    self.compile_expression(arg)?;
                }
                let argc = u8::try_from(arguments.len())
                    .map_err(|_| CompileError::new("too many arguments", expr.span))?;
                self.emit(Instruction::Call { argc });
            }
            ExprKind::Array(items) => {
                for item in items {
                    self.compile_expression(item)?;
                }
                let len = u16::try_from(items.len())
                    .map_err(|_| CompileError::new("array literal too long", expr.span))?;
                self.emit(Instruction::Array { len });
            }
            ExprKind::Map(pairs) => {
                for (key, value) in pairs {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                let len = u16::try_from(pairs.len() * 2)
                    .map_err(|_| CompileError::new("map literal too long", expr.span))?;
                self.emit(Instruction::Hash { len });
            }
            ExprKind::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Instruction::Index);
            }
        }
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol, span: Span) -> CResult {
        let narrow = |idx: usize| {
            u8::try_from(idx).map_err(|_| {
                CompileError::new(format!("slot of {} out of range", symbol.name), span)
            })
        };
        let instruction = match symbol.scope {
            SymbolScope::Global => Instruction::GetGlobal {
                idx: u16::try_from(symbol.index)
                    .map_err(|_| CompileError::new("too many global bindings", span))?,
            },
            SymbolScope::Local => Instruction::GetLocal {
                idx: narrow(symbol.index)?,
            },
            SymbolScope::Builtin => Instruction::GetBuiltin {
                idx: narrow(symbol.index)?,
            },
            SymbolScope::Free => Instruction::GetFree {
                idx: narrow(symbol.index)?,
            },
            SymbolScope::Function => Instruction::CurrentClosure,
        };
        self.emit(instruction);
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
