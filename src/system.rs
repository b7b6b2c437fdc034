//! Native builtin functions. Each one re-checks its own argument, since
//! overload resolution only guarantees that a conversion exists.

use crate::{
    command::{CmdContext, Command, NativeAction},
    interp::InterpState,
    types::Type,
    value::Value,
};

pub fn int_from_int(_: &mut InterpState, ctx: &CmdContext) -> Option<Value> {
    match ctx.macro_args.first() {
        Some(value @ Value::Integer(_)) => Some(value.clone()),
        _ => None,
    }
}

pub fn int_from_str(_: &mut InterpState, ctx: &CmdContext) -> Option<Value> {
    let text = ctx.macro_args.first()?.as_str()?;
    match text.trim_start().parse() {
        Ok(n) => Some(Value::Integer(n)),
        Err(e) => {
            tracing::debug!(target: "interp", "int(\"{text}\"): {e}");
            None
        }
    }
}

pub fn int_from_dbl(_: &mut InterpState, ctx: &CmdContext) -> Option<Value> {
    match ctx.macro_args.first() {
        Some(Value::Double(d)) => Some(Value::Integer(*d as i64)),
        _ => None,
    }
}

pub fn int_from_bool(_: &mut InterpState, ctx: &CmdContext) -> Option<Value> {
    match ctx.macro_args.first() {
        Some(Value::Bool(b)) => Some(Value::Integer(i64::from(*b))),
        _ => None,
    }
}

pub fn int_from_char(_: &mut InterpState, ctx: &CmdContext) -> Option<Value> {
    match ctx.macro_args.first() {
        Some(Value::Char(c)) => Some(Value::Integer(i64::from(u32::from(*c)))),
        _ => None,
    }
}

pub fn str_from_str(_: &mut InterpState, ctx: &CmdContext) -> Option<Value> {
    ctx.macro_args.first().filter(|v| v.is_string()).cloned()
}

/// Scalars render the way they display; a char becomes a one-character
/// string rather than a quoted one.
pub fn str_from_scalar(_: &mut InterpState, ctx: &CmdContext) -> Option<Value> {
    match ctx.macro_args.first()? {
        Value::Char(c) => Some(Value::string(&c.to_string())),
        value @ (Value::Integer(_) | Value::Double(_) | Value::Bool(_)) => {
            Some(Value::string(&value.to_string()))
        }
        _ => None,
    }
}

pub fn str_from_container(_: &mut InterpState, ctx: &CmdContext) -> Option<Value> {
    match ctx.macro_args.first()? {
        value @ (Value::List { .. } | Value::Map { .. }) => Some(Value::string(&value.to_string())),
        _ => None,
    }
}

pub fn dbl_from_dbl(_: &mut InterpState, ctx: &CmdContext) -> Option<Value> {
    match ctx.macro_args.first() {
        Some(value @ Value::Double(_)) => Some(value.clone()),
        _ => None,
    }
}

pub fn dbl_from_int(_: &mut InterpState, ctx: &CmdContext) -> Option<Value> {
    match ctx.macro_args.first() {
        Some(Value::Integer(i)) => Some(Value::Double(*i as f64)),
        _ => None,
    }
}

pub fn dbl_from_str(_: &mut InterpState, ctx: &CmdContext) -> Option<Value> {
    let text = ctx.macro_args.first()?.as_str()?;
    text.trim().parse().ok().map(Value::Double)
}

pub fn len(_: &mut InterpState, ctx: &CmdContext) -> Option<Value> {
    let count = match ctx.macro_args.first()? {
        Value::List { items, .. } => items.len(),
        Value::Map { entries, .. } => entries.len(),
        _ => return None,
    };
    i64::try_from(count).ok().map(Value::Integer)
}

/// The builtin overload sets, in lookup order. Within a set, candidates
/// are listed in the order ties are broken.
pub fn builtin_functions() -> Vec<Command> {
    let fun = |name: &str, ret: Type, arg: Type, action: NativeAction| {
        Command::builtin(name, Type::function(ret, vec![arg]), action)
    };
    let any_list = || Type::list(Type::Void);
    let any_map = || Type::map(Type::Void, Type::Void);

    vec![
        Command::overload_set(
            "int",
            vec![
                fun("int", Type::Integer, Type::Integer, int_from_int),
                fun("int", Type::Integer, Type::string(), int_from_str),
                fun("int", Type::Integer, Type::Double, int_from_dbl),
                fun("int", Type::Integer, Type::Bool, int_from_bool),
                fun("int", Type::Integer, Type::Char, int_from_char),
            ],
        ),
        Command::overload_set(
            "str",
            vec![
                fun("str", Type::string(), Type::string(), str_from_str),
                fun("str", Type::string(), Type::Integer, str_from_scalar),
                fun("str", Type::string(), Type::Double, str_from_scalar),
                fun("str", Type::string(), Type::Bool, str_from_scalar),
                fun("str", Type::string(), Type::Char, str_from_scalar),
                fun("str", Type::string(), any_list(), str_from_container),
                fun("str", Type::string(), any_map(), str_from_container),
            ],
        ),
        Command::overload_set(
            "dbl",
            vec![
                fun("dbl", Type::Double, Type::Double, dbl_from_dbl),
                fun("dbl", Type::Double, Type::Integer, dbl_from_int),
                fun("dbl", Type::Double, Type::string(), dbl_from_str),
            ],
        ),
        Command::overload_set(
            "len",
            vec![
                fun("len", Type::Integer, any_list(), len),
                fun("len", Type::Integer, any_map(), len),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arg: Value) -> Option<Value> {
        let mut state = InterpState::new();
        let ctx = CmdContext::new("tester", "#test", "bot").nested(vec![arg]);
        let command = builtin_functions()
            .into_iter()
            .find(|c| c.name() == name)?;
        command.run(&mut state, &ctx)
    }

    #[test]
    fn int_conversions() {
        assert_eq!(call("int", Value::Integer(5)), Some(Value::Integer(5)));
        assert_eq!(call("int", Value::string(" 42")), Some(Value::Integer(42)));
        assert_eq!(call("int", Value::string("4x")), None);
        assert_eq!(call("int", Value::Double(-2.9)), Some(Value::Integer(-2)));
        assert_eq!(call("int", Value::Bool(true)), Some(Value::Integer(1)));
        assert_eq!(call("int", Value::Char('A')), Some(Value::Integer(65)));
        assert_eq!(call("int", Value::list(Type::Integer, vec![Value::Integer(1)])), None);
    }

    #[test]
    fn str_conversions() {
        assert_eq!(call("str", Value::Integer(7)), Some(Value::string("7")));
        assert_eq!(call("str", Value::Double(0.5)), Some(Value::string("0.500")));
        assert_eq!(call("str", Value::Char('c')), Some(Value::string("c")));
        assert_eq!(
            call("str", Value::list(Type::Integer, vec![Value::Integer(1), Value::Integer(2)])),
            Some(Value::string("[1, 2]"))
        );
        assert_eq!(
            call("str", Value::empty_map(Type::Integer, Type::Bool)),
            Some(Value::string("[]"))
        );
    }

    #[test]
    fn dbl_and_len() {
        assert_eq!(call("dbl", Value::Integer(2)), Some(Value::Double(2.0)));
        assert_eq!(call("dbl", Value::string("2.25")), Some(Value::Double(2.25)));
        assert_eq!(call("len", Value::string("four")), Some(Value::Integer(4)));
        assert_eq!(call("len", Value::Integer(4)), None);
    }
}
