use std::fmt::Display;

/// The static type of a [`Value`](crate::value::Value).
///
/// Equality is structural. Scalars carry no data, so there is nothing to
/// share or intern: `Type::Integer == Type::Integer` is all it takes.
/// A string is a `List(Char)`.
///
/// `Void` inside a list or map type doubles as the "accept anything"
/// placeholder used by generic builtin signatures such as `fn([void]) -> int`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    Void,
    Integer,
    Double,
    Bool,
    Char,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Function { args: Vec<Type>, ret: Box<Type> },
}

impl Type {
    pub fn string() -> Type {
        Type::List(Box::new(Type::Char))
    }

    pub fn list(elem: Type) -> Type {
        Type::List(Box::new(elem))
    }

    pub fn map(key: Type, elem: Type) -> Type {
        Type::Map(Box::new(key), Box::new(elem))
    }

    pub fn function(ret: Type, args: Vec<Type>) -> Type {
        Type::Function {
            args,
            ret: Box::new(ret),
        }
    }

    /// Macros take a list of strings and return a list of strings.
    pub fn macro_function() -> Type {
        Type::function(Type::list(Type::string()), vec![Type::list(Type::string())])
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Type::List(elem) if **elem == Type::Char)
    }

    pub fn elem_type(&self) -> Option<&Type> {
        match self {
            Type::List(elem) | Type::Map(_, elem) => Some(elem),
            _ => None,
        }
    }

    pub fn key_type(&self) -> Option<&Type> {
        match self {
            Type::Map(key, _) => Some(key),
            _ => None,
        }
    }

    pub fn arg_types(&self) -> &[Type] {
        match self {
            Type::Function { args, .. } => args,
            _ => &[],
        }
    }

    /// Cost of implicitly passing a value of type `self` where `to` is
    /// expected, or `None` when no conversion exists.
    ///
    /// | from → to                              | cost |
    /// |----------------------------------------|------|
    /// | identical                              | 0    |
    /// | `int` → `dbl`                          | 1    |
    /// | `[T]` → `[void]`                       | 2    |
    /// | `[K: V]` → `[K: void]` / `[void: V]`   | 2    |
    /// | `[K: V]` → `[void: void]`              | 3    |
    ///
    /// The placeholder only ever erases on the `to` side: a `[void]` can
    /// never be handed to a slot that wants `[int]`.
    pub fn cast_dist(&self, to: &Type) -> Option<u32> {
        if self == to {
            return Some(0);
        }

        match (self, to) {
            (Type::Integer, Type::Double) => Some(1),
            (Type::List(_), Type::List(to_elem)) if to_elem.is_void() => Some(2),
            (Type::Map(key, elem), Type::Map(to_key, to_elem)) => {
                match (to_key.is_void(), to_elem.is_void()) {
                    (true, true) => Some(3),
                    (false, true) if key == to_key => Some(2),
                    (true, false) if elem == to_elem => Some(2),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Parses the type literal syntax used when declaring globals:
    /// `int`, `dbl`, `bool`, `char`, `str`, `void`, `[T]` and `[K: V]`,
    /// nested arbitrarily.
    pub fn parse_literal(input: &str) -> Option<Type> {
        let mut rest = input;
        let ty = read_type(&mut rest)?;
        rest.trim().is_empty().then_some(ty)
    }
}

fn read_type(rest: &mut &str) -> Option<Type> {
    *rest = rest.trim_start();

    if let Some(after) = rest.strip_prefix('[') {
        *rest = after;
        let first = read_type(rest)?;

        *rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix(']') {
            *rest = after;
            return Some(Type::list(first));
        }

        *rest = rest.strip_prefix(':')?;
        let second = read_type(rest)?;

        *rest = rest.trim_start().strip_prefix(']')?;
        return Some(Type::map(first, second));
    }

    let end = rest
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(rest.len());

    let ty = match &rest[..end] {
        "int" => Type::Integer,
        "dbl" => Type::Double,
        "bool" => Type::Bool,
        "char" => Type::Char,
        "str" => Type::string(),
        "void" => Type::Void,
        _ => return None,
    };

    *rest = &rest[end..];
    Some(ty)
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Integer => write!(f, "int"),
            Type::Double => write!(f, "dbl"),
            Type::Bool => write!(f, "bool"),
            Type::Char => write!(f, "char"),
            ty if ty.is_string() => write!(f, "str"),
            Type::List(elem) => write!(f, "[{elem}]"),
            Type::Map(key, elem) => write!(f, "[{key}: {elem}]"),
            Type::Function { args, ret } => {
                write!(f, "fn(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ") -> {ret}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_types_cost_nothing() {
        assert_eq!(Type::Integer.cast_dist(&Type::Integer), Some(0));
        assert_eq!(Type::string().cast_dist(&Type::string()), Some(0));
        assert_eq!(
            Type::map(Type::Integer, Type::Void).cast_dist(&Type::map(Type::Integer, Type::Void)),
            Some(0)
        );
    }

    #[test]
    fn integer_widens_to_double_only() {
        assert_eq!(Type::Integer.cast_dist(&Type::Double), Some(1));
        assert_eq!(Type::Double.cast_dist(&Type::Integer), None);
        assert_eq!(Type::Char.cast_dist(&Type::Integer), None);
    }

    #[test]
    fn lists_erase_to_void() {
        let ints = Type::list(Type::Integer);
        let any = Type::list(Type::Void);
        assert_eq!(ints.cast_dist(&any), Some(2));
        assert_eq!(any.cast_dist(&ints), None);
        assert_eq!(ints.cast_dist(&Type::list(Type::Double)), None);
    }

    #[test]
    fn maps_erase_one_or_both_dimensions() {
        let concrete = Type::map(Type::Integer, Type::string());
        assert_eq!(
            concrete.cast_dist(&Type::map(Type::Integer, Type::Void)),
            Some(2)
        );
        assert_eq!(
            concrete.cast_dist(&Type::map(Type::Void, Type::string())),
            Some(2)
        );
        assert_eq!(concrete.cast_dist(&Type::map(Type::Void, Type::Void)), Some(3));
        assert_eq!(concrete.cast_dist(&Type::map(Type::Char, Type::Void)), None);
        assert_eq!(
            Type::map(Type::Integer, Type::Void).cast_dist(&concrete),
            None
        );
    }

    #[test]
    fn function_types_compare_structurally() {
        let a = Type::function(Type::Integer, vec![Type::string()]);
        let b = Type::function(Type::Integer, vec![Type::string()]);
        let c = Type::function(Type::Integer, vec![Type::string(), Type::Bool]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.cast_dist(&c), None);
    }

    #[test]
    fn parses_type_literals() {
        assert_eq!(Type::parse_literal("int"), Some(Type::Integer));
        assert_eq!(Type::parse_literal(" str "), Some(Type::string()));
        assert_eq!(
            Type::parse_literal("[int]"),
            Some(Type::list(Type::Integer))
        );
        assert_eq!(
            Type::parse_literal("[str: [dbl]]"),
            Some(Type::map(Type::string(), Type::list(Type::Double)))
        );
        assert_eq!(
            Type::parse_literal("[[int]:bool]"),
            Some(Type::map(Type::list(Type::Integer), Type::Bool))
        );
        assert_eq!(Type::parse_literal("[int"), None);
        assert_eq!(Type::parse_literal("float"), None);
        assert_eq!(Type::parse_literal("int int"), None);
        assert_eq!(Type::parse_literal(""), None);
    }

    #[test]
    fn displays_like_the_literal_syntax() {
        assert_eq!(Type::map(Type::string(), Type::Void).to_string(), "[str: void]");
        assert_eq!(Type::list(Type::string()).to_string(), "[str]");
        assert_eq!(Type::macro_function().to_string(), "fn([str]) -> [str]");
    }
}
