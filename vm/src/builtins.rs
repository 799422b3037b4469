use std::io::Write;
use std::rc::Rc;

use crate::interpreter::RuntimeError;
use crate::value::Value;

/// Native functions, addressed by their position in [`Builtin::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Len,
    Puts,
    First,
    Last,
    Rest,
    Push,
}

impl Builtin {
    /// Table order defines the `GetBuiltin` operand.
    pub const ALL: [Builtin; 6] = [
        Builtin::Len,
        Builtin::Puts,
        Builtin::First,
        Builtin::Last,
        Builtin::Rest,
        Builtin::Push,
    ];

    pub fn from_index(idx: u8) -> Option<Self> {
        Self::ALL.get(idx as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Len => "len",
            Builtin::Puts => "puts",
            Builtin::First => "first",
            Builtin::Last => "last",
            Builtin::Rest => "rest",
            Builtin::Push => "push",
        }
    }

    fn error(self, message: impl Into<String>) -> RuntimeError {
        RuntimeError::Builtin {
            name: self.name(),
            message: message.into(),
        }
    }

    fn expect_args(self, args: &[Value], expected: usize) -> Result<(), RuntimeError> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(RuntimeError::WrongArity {
                expected,
                got: args.len(),
            })
        }
    }

    fn expect_array(self, value: &Value) -> Result<&Rc<Vec<Value>>, RuntimeError> {
        match value {
            Value::Array(items) => Ok(items),
            other => Err(self.error(format!(
                "argument must be array, got {}",
                other.type_name()
            ))),
        }
    }

    /// Run the builtin on `args`. Always yields exactly one value.
    pub fn call(self, args: &[Value]) -> Result<Value, RuntimeError> {
        match self {
            Builtin::Len => {
                self.expect_args(args, 1)?;
                let len = match &args[0] {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Map(map) => map.len(),
                    other => {
                        return Err(self.error(format!(
                            "argument not supported, got {}",
                            other.type_name()
                        )));
                    }
                };
                Ok(Value::Number(len as f64))
            }
            Builtin::Puts => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                for arg in args {
                    writeln!(out, "{arg}")
                        .map_err(|err| self.error(err.to_string()))?;
                }
                Ok(Value::Null)
            }
            Builtin::First => {
                self.expect_args(args, 1)?;
                let items = self.expect_array(&args[0])?;
                Ok(items.first().cloned().unwrap_or(Value::Null))
            }
            Builtin::Last => {
                self.expect_args(args, 1)?;
                let items = self.expect_array(&args[0])?;
                Ok(items.last().cloned().unwrap_or(Value::Null))
            }
            Builtin::Rest => {
                self.expect_args(args, 1)?;
                let items = self.expect_array(&args[0])?;
                if items.is_empty() {
                    Ok(Value::Null)
                } else {
                    Ok(Value::array(items[1..].to_vec()))
                }
            }
            Builtin::Push => {
                self.expect_args(args, 2)?;
                let items = self.expect_array(&args[0])?;
                let mut pushed = Vec::with_capacity(items.len() + 1);
                pushed.extend(items.iter().cloned());
                pushed.push(args[1].clone());
                Ok(Value::array(pushed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(ns: &[f64]) -> Value {
        Value::array(ns.iter().map(|&n| Value::Number(n)).collect())
    }

    #[test]
    fn table_order_is_stable() {
        let names: Vec<_> = Builtin::ALL.iter().map(|b| b.name()).collect();
        assert_eq!(names, ["len", "puts", "first", "last", "rest", "push"]);
        assert_eq!(Builtin::from_index(5), Some(Builtin::Push));
        assert_eq!(Builtin::from_index(6), None);
    }

    #[test]
    fn len_counts_chars() {
        assert_eq!(Builtin::Len.call(&[Value::from("héllo")]), Ok(Value::Number(5.0)));
        assert_eq!(Builtin::Len.call(&[numbers(&[1.0, 2.0])]), Ok(Value::Number(2.0)));
    }

    #[test]
    fn len_rejects_numbers() {
        assert_eq!(
            Builtin::Len.call(&[Value::Number(1.0)]),
            Err(RuntimeError::Builtin {
                name: "len",
                message: "argument not supported, got number".into(),
            })
        );
    }

    #[test]
    fn arity_is_checked() {
        assert_eq!(
            Builtin::Len.call(&[]),
            Err(RuntimeError::WrongArity {
                expected: 1,
                got: 0
            })
        );
        assert_eq!(
            Builtin::Push.call(&[numbers(&[])]),
            Err(RuntimeError::WrongArity {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn array_helpers() {
        let arr = numbers(&[1.0, 2.0, 3.0]);
        assert_eq!(Builtin::First.call(&[arr.clone()]), Ok(Value::Number(1.0)));
        assert_eq!(Builtin::Last.call(&[arr.clone()]), Ok(Value::Number(3.0)));
        assert_eq!(Builtin::Rest.call(&[arr.clone()]), Ok(numbers(&[2.0, 3.0])));
        assert_eq!(
            Builtin::Push.call(&[arr.clone(), Value::Number(4.0)]),
            Ok(numbers(&[1.0, 2.0, 3.0, 4.0]))
        );
        assert_eq!(Builtin::First.call(&[numbers(&[])]), Ok(Value::Null));
        assert_eq!(Builtin::Rest.call(&[numbers(&[])]), Ok(Value::Null));
    }

    #[test]
    fn push_leaves_original_untouched() {
        let arr = numbers(&[1.0]);
        let _ = Builtin::Push.call(&[arr.clone(), Value::Null]);
        assert_eq!(arr, numbers(&[1.0]));
    }

    #[test]
    fn puts_returns_null() {
        assert_eq!(Builtin::Puts.call(&[]), Ok(Value::Null));
    }
}
