use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::builtins::Builtin;

/// A runtime value.
///
/// Values are immutable once constructed; compound variants share their
/// payload through [`Rc`] so copying a value onto the stack is cheap.
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    Boolean(bool),
    String(Rc<str>),
    Null,
    Array(Rc<Vec<Value>>),
    Map(Rc<MapObject>),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(Builtin),
}

/// A function body as produced by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFunction {
    pub instructions: Vec<u8>,
    /// Parameters plus `let` bindings made in the body.
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A compiled function paired with the values it captured when created.
#[derive(Debug, Clone)]
pub struct Closure {
    pub function: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

impl Closure {
    pub fn new(function: Rc<CompiledFunction>, free: Vec<Value>) -> Self {
        Self { function, free }
    }
}

/// The hashable subset of values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    /// Bit pattern of the number, with `-0.0` folded into `0.0`.
    Number(u64),
    Boolean(bool),
    String(Rc<str>),
}

impl HashKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                let n = if *n == 0.0 { 0.0 } else { *n };
                Some(Self::Number(n.to_bits()))
            }
            Value::Boolean(b) => Some(Self::Boolean(*b)),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

/// Map value. Iteration and display follow insertion order; overwriting
/// a key keeps its original position.
#[derive(Debug, Clone, Default)]
pub struct MapObject {
    entries: IndexMap<HashKey, (Value, Value)>,
}

impl MapObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(n),
        }
    }

    /// Insert or overwrite. Returns `false` if `key` is not hashable.
    pub fn insert(&mut self, key: Value, value: Value) -> bool {
        let Some(hash) = HashKey::from_value(&key) else {
            return false;
        };
        self.entries.insert(hash, (key, value));
        true
    }

    pub fn get(&self, key: &HashKey) -> Option<&Value> {
        self.entries.get(key).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.values().map(|(key, value)| (key, value))
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Null => "null",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::CompiledFunction(_) => "function",
            Value::Closure(_) => "closure",
            Value::Builtin(_) => "builtin",
        }
    }

    /// `false` and `null` are falsy; everything else, `0` included, is
    /// truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false) | Value::Null)
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

/// Structural equality for data, identity for functions.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(key, value)| {
                        HashKey::from_value(key)
                            .and_then(|hash| b.get(&hash))
                            .is_some_and(|other| other == value)
                    })
            }
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => {
                Rc::ptr_eq(a, b)
            }
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::String(s) => f.write_str(s),
            Value::Null => f.write_str("null"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Value::CompiledFunction(func) => {
                write!(f, "fn/{}", func.num_parameters)
            }
            Value::Closure(closure) => {
                write!(f, "closure/{}", closure.function.num_parameters)
            }
            Value::Builtin(builtin) => write!(f, "builtin {}", builtin.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::from("").is_truthy());
        assert!(Value::array(vec![]).is_truthy());
        assert!(Value::Boolean(true).is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn structural_equality() {
        assert_eq!(Value::from("ab"), Value::from("ab"));
        assert_eq!(
            Value::array(vec![Value::Number(1.0), Value::Null]),
            Value::array(vec![Value::Number(1.0), Value::Null])
        );
        assert_ne!(Value::Number(1.0), Value::Boolean(true));
        assert_ne!(Value::Null, Value::Boolean(false));
    }

    #[test]
    fn closures_compare_by_identity() {
        let function = Rc::new(CompiledFunction {
            instructions: vec![],
            num_locals: 0,
            num_parameters: 0,
        });
        let a = Rc::new(Closure::new(function.clone(), vec![]));
        let b = Rc::new(Closure::new(function, vec![]));
        assert_eq!(Value::Closure(a.clone()), Value::Closure(a.clone()));
        assert_ne!(Value::Closure(a), Value::Closure(b));
    }

    #[test]
    fn hash_keys() {
        assert_eq!(
            HashKey::from_value(&Value::Number(0.0)),
            HashKey::from_value(&Value::Number(-0.0))
        );
        assert_eq!(
            HashKey::from_value(&Value::from("k")),
            HashKey::from_value(&Value::from("k"))
        );
        assert!(HashKey::from_value(&Value::Null).is_none());
        assert!(HashKey::from_value(&Value::array(vec![])).is_none());
    }

    #[test]
    fn map_overwrites_and_keeps_order() {
        let mut map = MapObject::new();
        assert!(map.insert(Value::from("b"), Value::Number(1.0)));
        assert!(map.insert(Value::from("a"), Value::Number(2.0)));
        assert!(map.insert(Value::from("b"), Value::Number(3.0)));
        assert!(!map.insert(Value::Null, Value::Null));
        assert_eq!(map.len(), 2);
        assert_eq!(Value::Map(Rc::new(map)).to_string(), "{b: 3, a: 2}");
    }

    #[test]
    fn map_lookup_by_hash_key() {
        let mut map = MapObject::with_capacity(2);
        map.insert(Value::Number(0.0), Value::from("zero"));
        map.insert(Value::Number(-0.0), Value::from("again"));
        let zero = HashKey::from_value(&Value::Number(0.0)).unwrap();
        assert_eq!(map.get(&zero), Some(&Value::from("again")));
        assert_eq!(map.get(&HashKey::Boolean(true)), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn display() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(-1.5).to_string(), "-1.5");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(
            Value::array(vec![Value::Number(1.0), Value::from("x")]).to_string(),
            "[1, x]"
        );
        assert_eq!(Value::Builtin(Builtin::Len).to_string(), "builtin len");
    }
}
