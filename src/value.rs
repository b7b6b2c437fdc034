use std::{cmp::Ordering, collections::BTreeMap, fmt::Display, sync::Arc};

use crate::{command::Command, types::Type};

/// A runtime value. Every value belongs to exactly one [`Type`] for its
/// whole life; containers remember their element types even when empty.
#[derive(Debug, Clone)]
pub enum Value {
    Void,
    Bool(bool),
    Char(char),
    Integer(i64),
    Double(f64),
    List {
        elem: Type,
        items: Vec<Value>,
    },
    Map {
        key: Type,
        elem: Type,
        entries: BTreeMap<Value, Value>,
    },
    Function(Arc<Command>),
}

impl Value {
    pub fn string(s: &str) -> Value {
        Value::List {
            elem: Type::Char,
            items: s.chars().map(Value::Char).collect(),
        }
    }

    pub fn list(elem: Type, items: Vec<Value>) -> Value {
        Value::List { elem, items }
    }

    pub fn string_list<'a>(words: impl IntoIterator<Item = &'a str>) -> Value {
        Value::list(Type::string(), words.into_iter().map(Value::string).collect())
    }

    pub fn empty_map(key: Type, elem: Type) -> Value {
        Value::Map {
            key,
            elem,
            entries: BTreeMap::new(),
        }
    }

    /// The zero value a freshly declared global of type `ty` starts with.
    /// Function types have none.
    pub fn default_of(ty: &Type) -> Option<Value> {
        Some(match ty {
            Type::Void => Value::Void,
            Type::Integer => Value::Integer(0),
            Type::Double => Value::Double(0.0),
            Type::Bool => Value::Bool(false),
            Type::Char => Value::Char('\0'),
            Type::List(elem) => Value::list((**elem).clone(), Vec::new()),
            Type::Map(key, elem) => Value::empty_map((**key).clone(), (**elem).clone()),
            Type::Function { .. } => return None,
        })
    }

    pub fn ty(&self) -> Type {
        match self {
            Value::Void => Type::Void,
            Value::Bool(_) => Type::Bool,
            Value::Char(_) => Type::Char,
            Value::Integer(_) => Type::Integer,
            Value::Double(_) => Type::Double,
            Value::List { elem, .. } => Type::list(elem.clone()),
            Value::Map { key, elem, .. } => Type::map(key.clone(), elem.clone()),
            Value::Function(command) => command.signature().clone(),
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::List { elem: Type::Char, .. })
    }

    pub fn as_str(&self) -> Option<String> {
        match self {
            Value::List {
                elem: Type::Char,
                items,
            } => Some(
                items
                    .iter()
                    .filter_map(|c| match c {
                        Value::Char(c) => Some(*c),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List { items, .. } => Some(items),
            _ => None,
        }
    }

    /// Like `Display`, but strings and chars come out without quotes.
    pub fn raw_str(&self) -> String {
        match self {
            Value::Char(c) => c.to_string(),
            value => value.as_str().unwrap_or_else(|| value.to_string()),
        }
    }
}

/// Renders a value as the text of a chat message: list elements are
/// joined by spaces, maps become `key:value` pairs.
pub fn render_message(value: &Value) -> String {
    match value {
        Value::List { items, .. } if !value.is_string() => items
            .iter()
            .map(Value::raw_str)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Map { entries, .. } => entries
            .iter()
            .map(|(k, v)| format!("{}:{}", k.raw_str(), v.raw_str()))
            .collect::<Vec<_>>()
            .join(", "),
        value => value.raw_str(),
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Void => write!(f, "()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Char(c) => write!(f, "'{c}'"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d:.3}"),
            value @ Value::List { items, .. } => match value.as_str() {
                Some(s) => write!(f, "\"{s}\""),
                None => {
                    write!(f, "[")?;
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{item}")?;
                    }
                    write!(f, "]")
                }
            },
            Value::Map { entries, .. } => {
                write!(f, "[")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "]")
            }
            Value::Function(command) => write!(f, "{}: {}", command.name(), command.signature()),
        }
    }
}

// Values of different types order by type; within a type by payload.
// Doubles use the IEEE total order so that they can key a map.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Void, Value::Void) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Char(a), Value::Char(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (
                Value::List {
                    elem: ea,
                    items: a,
                },
                Value::List {
                    elem: eb,
                    items: b,
                },
            ) => ea.cmp(eb).then_with(|| a.cmp(b)),
            (
                Value::Map {
                    key: ka,
                    elem: ea,
                    entries: a,
                },
                Value::Map {
                    key: kb,
                    elem: eb,
                    entries: b,
                },
            ) => ka.cmp(kb).then_with(|| ea.cmp(eb)).then_with(|| a.cmp(b)),
            (Value::Function(a), Value::Function(b)) => a.name().cmp(b.name()),
            (a, b) => a.ty().cmp(&b.ty()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(items: &[i64]) -> Value {
        Value::list(Type::Integer, items.iter().copied().map(Value::Integer).collect())
    }

    #[test]
    fn strings_are_char_lists() {
        let s = Value::string("hi");
        assert!(s.is_string());
        assert_eq!(s.ty(), Type::string());
        assert_eq!(s.as_str().as_deref(), Some("hi"));
        assert_eq!(s.to_string(), "\"hi\"");
        assert_eq!(s.raw_str(), "hi");
    }

    #[test]
    fn empty_containers_keep_their_type() {
        let empty = Value::list(Type::Integer, Vec::new());
        assert_eq!(empty.ty(), Type::list(Type::Integer));
        assert_ne!(empty, Value::list(Type::string(), Vec::new()));
    }

    #[test]
    fn scalars_render_naturally() {
        assert_eq!(Value::Void.to_string(), "()");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Char('x').to_string(), "'x'");
        assert_eq!(Value::Char('x').raw_str(), "x");
        assert_eq!(Value::Double(1.5).to_string(), "1.500");
        assert_eq!(Value::Integer(-7).to_string(), "-7");
    }

    #[test]
    fn containers_render_deterministically() {
        assert_eq!(ints(&[1, 2, 3]).to_string(), "[1, 2, 3]");

        let mut entries = BTreeMap::new();
        entries.insert(Value::string("b"), Value::Integer(2));
        entries.insert(Value::string("a"), Value::Integer(1));
        let map = Value::Map {
            key: Type::string(),
            elem: Type::Integer,
            entries,
        };
        assert_eq!(map.to_string(), "[\"a\": 1, \"b\": 2]");
        assert_eq!(render_message(&map), "a:1, b:2");
    }

    #[test]
    fn message_rendering_joins_lists_with_spaces() {
        let words = Value::string_list(["hello", "there"]);
        assert_eq!(render_message(&words), "hello there");
        assert_eq!(render_message(&ints(&[4, 5])), "4 5");
        assert_eq!(render_message(&Value::string("plain")), "plain");
    }

    #[test]
    fn values_of_different_types_never_compare_equal() {
        assert_ne!(Value::Integer(1), Value::Double(1.0));
        assert_ne!(Value::Char('a'), Value::string("a"));
        assert!(Value::Double(f64::NAN) == Value::Double(f64::NAN));
    }

    #[test]
    fn defaults_follow_the_type() {
        assert_eq!(Value::default_of(&Type::Integer), Some(Value::Integer(0)));
        assert_eq!(
            Value::default_of(&Type::map(Type::string(), Type::Integer))
                .map(|v| v.ty()),
            Some(Type::map(Type::string(), Type::Integer))
        );
        assert_eq!(Value::default_of(&Type::macro_function()), None);
    }
}
