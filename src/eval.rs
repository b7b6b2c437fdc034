use std::cmp::Ordering;

use thiserror::Error;

use crate::{
    command::{CmdContext, CommandKind, EXECUTION_TIME_LIMIT, MAX_CALL_DEPTH},
    interp::InterpState,
    parse::{AssignOp, BinaryOp, CompareOp, Expr, UnaryOp, VarRef},
    types::Type,
    value::Value,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("variable '{0}' not found")]
    UnresolvedVariable(String),
    #[error("invalid unary '{op}' on type '{ty}'")]
    InvalidUnary { op: &'static str, ty: Type },
    #[error("invalid binary '{op}' between types '{lhs}' and '{rhs}'")]
    InvalidBinary {
        op: &'static str,
        lhs: Type,
        rhs: Type,
    },
    #[error("cannot compare '{lhs}' and '{rhs}' with '{op}'")]
    InvalidComparison {
        op: &'static str,
        lhs: Type,
        rhs: Type,
    },
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("key {0} not found")]
    MissingKey(String),
    #[error("cannot index '{base}' with '{index}'")]
    InvalidIndexType { base: Type, index: Type },
    #[error("type '{0}' cannot be indexed")]
    NotIndexable(Type),
    #[error("type '{0}' cannot be sliced")]
    NotSliceable(Type),
    #[error("slice bounds must be integers, found '{0}'")]
    SliceIndexNotInteger(Type),
    #[error("type '{0}' is not callable")]
    NotCallable(Type),
    #[error("no matching function for call to '{name}' with arguments ({args})")]
    NoMatchingOverload { name: String, args: String },
    #[error("call to '{0}' produced no value")]
    CallFailed(String),
    #[error("cannot assign to an rvalue")]
    AssignToRvalue,
    #[error("cannot assign a value of type '{value}' to a slot of type '{place}'")]
    AssignTypeMismatch { place: Type, value: Type },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in '{0}'")]
    Overflow(&'static str),
    #[error("condition must be a bool, found '{0}'")]
    InvalidCondition(Type),
    #[error("list elements have conflicting types '{0}' and '{1}'")]
    ConflictingListTypes(Type, Type),
    #[error("type '{ty}' has no method '{name}'")]
    NoSuchMethod { ty: Type, name: String },
    #[error("method '{name}' expects {expected} argument(s), found {found}")]
    MethodArity {
        name: String,
        expected: &'static str,
        found: usize,
    },
    #[error("cannot append a value of type '{value}' to '{list}'")]
    AppendTypeMismatch { list: Type, value: Type },
    #[error("call depth limit of {0} exceeded")]
    RecursionLimit(usize),
    #[error("execution time limit of {0} ms exceeded")]
    TimeLimit(u128),
    #[error("member '{0}' can only be called")]
    MemberAccess(String),
    #[error("macro argument ${index} out of range (have {count})")]
    ArgumentOutOfRange { index: usize, count: usize },
}

type EResult<T> = Result<T, EvalError>;

/// A global variable, possibly followed by a chain of subscripts.
#[derive(Debug)]
struct Place {
    name: String,
    path: Vec<Value>,
}

pub struct Interpreter<'a> {
    state: &'a mut InterpState,
    ctx: &'a CmdContext,
}

impl<'a> Interpreter<'a> {
    pub fn new(state: &'a mut InterpState, ctx: &'a CmdContext) -> Self {
        Interpreter { state, ctx }
    }

    pub fn eval(&mut self, expr: &Expr<'_>) -> EResult<Value> {
        match expr {
            Expr::Integer(i) => Ok(Value::Integer(*i)),
            Expr::Double(d) => Ok(Value::Double(*d)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Char(c) => Ok(Value::Char(*c)),
            Expr::Str(s) => Ok(Value::string(s)),
            Expr::List(items) => self.list_literal(items),
            Expr::Var(var) => self.state.resolve_variable(*var, self.ctx),
            Expr::Unary { op, expr } => {
                let value = self.eval(expr)?;
                unary(*op, value)
            }
            Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs),
            Expr::Assign { op, place, value } => self.assign(*op, place, value),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => match self.eval(cond)? {
                Value::Bool(true) => self.eval(then),
                Value::Bool(false) => self.eval(otherwise),
                other => Err(EvalError::InvalidCondition(other.ty())),
            },
            Expr::Comparison { operands, ops } => self.comparison(operands, ops),
            Expr::Call { callee, args } => match callee.as_ref() {
                Expr::Member { base, name } => self.method(base, name, args),
                callee => {
                    let callee = self.eval(callee)?;
                    let args = self.eval_all(args)?;
                    self.call(callee, args)
                }
            },
            Expr::Subscript { base, index } => {
                let base = self.eval(base)?;
                let index = self.eval(index)?;
                subscript(&base, &index).cloned()
            }
            Expr::Slice { base, start, end } => {
                let base = self.eval(base)?;
                let start = start.as_deref().map(|e| self.eval(e)).transpose()?;
                let end = end.as_deref().map(|e| self.eval(e)).transpose()?;
                slice(base, start, end)
            }
            Expr::Member { name, .. } => Err(EvalError::MemberAccess(name.to_string())),
        }
    }

    fn eval_all(&mut self, exprs: &[Expr<'_>]) -> EResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn list_literal(&mut self, items: &[Expr<'_>]) -> EResult<Value> {
        let items = self.eval_all(items)?;
        let mut elem = Type::Void;
        for item in &items {
            let ty = item.ty();
            elem = match unify(&elem, &ty) {
                Some(elem) => elem,
                None => return Err(EvalError::ConflictingListTypes(elem, ty)),
            };
        }
        Ok(Value::list(elem, items))
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Expr<'_>, rhs: &Expr<'_>) -> EResult<Value> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let short = op == BinaryOp::Or;
                match self.eval(lhs)? {
                    Value::Bool(b) if b == short => Ok(Value::Bool(b)),
                    Value::Bool(_) => match self.eval(rhs)? {
                        value @ Value::Bool(_) => Ok(value),
                        other => Err(invalid_binary(op, &Type::Bool, &other.ty())),
                    },
                    other => Err(invalid_binary(op, &other.ty(), &Type::Bool)),
                }
            }
            BinaryOp::Pipeline => {
                let value = self.eval(lhs)?;
                match rhs {
                    Expr::Call { callee, args } if !matches!(callee.as_ref(), Expr::Member { .. }) => {
                        let callee = self.eval(callee)?;
                        let mut all = vec![value];
                        all.extend(self.eval_all(args)?);
                        self.call(callee, all)
                    }
                    rhs => {
                        let callee = self.eval(rhs)?;
                        self.call(callee, vec![value])
                    }
                }
            }
            op => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary_values(op, lhs, rhs)
            }
        }
    }

    fn comparison(&mut self, operands: &[Expr<'_>], ops: &[CompareOp]) -> EResult<Value> {
        let Some((first, rest)) = operands.split_first() else {
            return Ok(Value::Bool(true));
        };

        let mut lhs = self.eval(first)?;
        for (op, operand) in ops.iter().zip(rest) {
            let rhs = self.eval(operand)?;
            if !compare(*op, &lhs, &rhs)? {
                return Ok(Value::Bool(false));
            }
            lhs = rhs;
        }
        Ok(Value::Bool(true))
    }

    fn call(&mut self, callee: Value, args: Vec<Value>) -> EResult<Value> {
        let Value::Function(command) = callee else {
            return Err(EvalError::NotCallable(callee.ty()));
        };

        if self.ctx.out_of_time() {
            return Err(EvalError::TimeLimit(EXECUTION_TIME_LIMIT.as_millis()));
        }
        if self.ctx.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::RecursionLimit(MAX_CALL_DEPTH));
        }

        let args = match command.kind() {
            // macros only ever see strings
            CommandKind::Macro(_) => args.iter().map(|a| Value::string(&a.raw_str())).collect(),
            CommandKind::Overloads(set) if set.resolve(&args).is_none() => {
                let types: Vec<String> = args.iter().map(|a| a.ty().to_string()).collect();
                return Err(EvalError::NoMatchingOverload {
                    name: command.name().to_string(),
                    args: types.join(", "),
                });
            }
            _ => args,
        };

        tracing::debug!(target: "interp", depth = self.ctx.depth, "calling '{}'", command.name());
        let nested = self.ctx.nested(args);
        command
            .run(self.state, &nested)
            .ok_or_else(|| EvalError::CallFailed(command.name().to_string()))
    }

    fn method(&mut self, base: &Expr<'_>, name: &str, args: &[Expr<'_>]) -> EResult<Value> {
        match name {
            "len" => {
                if !args.is_empty() {
                    return Err(EvalError::MethodArity {
                        name: name.to_string(),
                        expected: "0",
                        found: args.len(),
                    });
                }
                let len = match self.eval(base)? {
                    Value::List { items, .. } => items.len(),
                    Value::Map { entries, .. } => entries.len(),
                    other => {
                        return Err(EvalError::NoSuchMethod {
                            ty: other.ty(),
                            name: name.to_string(),
                        });
                    }
                };
                i64::try_from(len)
                    .map(Value::Integer)
                    .map_err(|_| EvalError::Overflow("len"))
            }
            "append" => {
                if args.is_empty() {
                    return Err(EvalError::MethodArity {
                        name: name.to_string(),
                        expected: "at least 1",
                        found: 0,
                    });
                }
                let place = self.place(base)?;
                let values = self.eval_all(args)?;
                let slot = self.slot(&place, None)?;
                let Value::List { elem, items } = slot else {
                    return Err(EvalError::NoSuchMethod {
                        ty: slot.ty(),
                        name: name.to_string(),
                    });
                };

                let mut new_elem = elem.clone();
                for value in &values {
                    new_elem = unify(&new_elem, &value.ty()).ok_or_else(|| EvalError::AppendTypeMismatch {
                        list: Type::list(elem.clone()),
                        value: value.ty(),
                    })?;
                }
                *elem = new_elem;
                items.extend(values);
                Ok(slot.clone())
            }
            _ => {
                let ty = self.eval(base)?.ty();
                Err(EvalError::NoSuchMethod {
                    ty,
                    name: name.to_string(),
                })
            }
        }
    }

    fn assign(&mut self, op: AssignOp, place: &Expr<'_>, value: &Expr<'_>) -> EResult<Value> {
        let place = self.place(place)?;
        let value = self.eval(value)?;

        let value = match op {
            AssignOp::Assign => value,
            AssignOp::Compound(op) => {
                let current = self.slot(&place, None)?.clone();
                binary_values(op, current, value)?
            }
        };

        let slot = self.slot(&place, Some(&value))?;
        if slot.ty() != value.ty() {
            return Err(EvalError::AssignTypeMismatch {
                place: slot.ty(),
                value: value.ty(),
            });
        }
        *slot = value.clone();
        Ok(value)
    }

    fn place(&mut self, expr: &Expr<'_>) -> EResult<Place> {
        match expr {
            Expr::Var(VarRef::Global(name)) => {
                if self.state.global(name).is_some() {
                    Ok(Place {
                        name: name.to_string(),
                        path: Vec::new(),
                    })
                } else {
                    // it might still be a builtin or a command, which are rvalues
                    self.state
                        .resolve_variable(VarRef::Global(name), self.ctx)
                        .and(Err(EvalError::AssignToRvalue))
                }
            }
            Expr::Subscript { base, index } => {
                let mut place = self.place(base)?;
                place.path.push(self.eval(index)?);
                Ok(place)
            }
            _ => Err(EvalError::AssignToRvalue),
        }
    }

    /// Walks `place` down to its slot. With `fill`, a missing final map key
    /// is created holding `fill`.
    fn slot(&mut self, place: &Place, fill: Option<&Value>) -> EResult<&mut Value> {
        let mut slot = self
            .state
            .global_mut(&place.name)
            .ok_or_else(|| EvalError::UnresolvedVariable(place.name.clone()))?;

        for (depth, index) in place.path.iter().enumerate() {
            let last = depth + 1 == place.path.len();
            slot = match slot {
                Value::List { elem, items } => {
                    let Value::Integer(i) = index else {
                        return Err(EvalError::InvalidIndexType {
                            base: Type::list(elem.clone()),
                            index: index.ty(),
                        });
                    };
                    let len = items.len();
                    let pos = normalise(*i, len).ok_or(EvalError::IndexOutOfRange { index: *i, len })?;
                    &mut items[pos]
                }
                Value::Map { key, elem, entries } => {
                    if index.ty() != *key {
                        return Err(EvalError::InvalidIndexType {
                            base: Type::map(key.clone(), elem.clone()),
                            index: index.ty(),
                        });
                    }
                    match fill {
                        Some(fill) if last && !entries.contains_key(index) => {
                            if fill.ty() != *elem {
                                return Err(EvalError::AssignTypeMismatch {
                                    place: elem.clone(),
                                    value: fill.ty(),
                                });
                            }
                            entries.entry(index.clone()).or_insert_with(|| fill.clone())
                        }
                        _ => entries
                            .get_mut(index)
                            .ok_or_else(|| EvalError::MissingKey(index.to_string()))?,
                    }
                }
                other => return Err(EvalError::NotIndexable(other.ty())),
            };
        }

        Ok(slot)
    }
}

fn invalid_binary(op: BinaryOp, lhs: &Type, rhs: &Type) -> EvalError {
    EvalError::InvalidBinary {
        op: op.symbol(),
        lhs: lhs.clone(),
        rhs: rhs.clone(),
    }
}

/// The common type of two list elements, where an erased `void` gives way
/// to anything (including `[void]` to `[T]`).
fn unify(a: &Type, b: &Type) -> Option<Type> {
    match (a, b) {
        _ if a == b => Some(a.clone()),
        (Type::Void, other) | (other, Type::Void) => Some(other.clone()),
        (Type::List(x), Type::List(y)) => unify(x, y).map(Type::list),
        _ => None,
    }
}

fn unary(op: UnaryOp, value: Value) -> EResult<Value> {
    match (op, value) {
        (UnaryOp::Neg, Value::Integer(i)) => i.checked_neg().map(Value::Integer).ok_or(EvalError::Overflow("-")),
        (UnaryOp::Neg, Value::Double(d)) => Ok(Value::Double(-d)),
        (UnaryOp::Plus, value @ (Value::Integer(_) | Value::Double(_))) => Ok(value),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::BitNot, Value::Integer(i)) => Ok(Value::Integer(!i)),
        (op, value) => Err(EvalError::InvalidUnary {
            op: op.symbol(),
            ty: value.ty(),
        }),
    }
}

fn binary_values(op: BinaryOp, lhs: Value, rhs: Value) -> EResult<Value> {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => integer_op(op, a, b),
        (Value::Double(a), Value::Double(b)) => double_op(op, a, b),
        (Value::Integer(a), Value::Double(b)) => double_op(op, a as f64, b),
        (Value::Double(a), Value::Integer(b)) => double_op(op, a, b as f64),
        (Value::Char(c), Value::Integer(i)) if matches!(op, BinaryOp::Add | BinaryOp::Sub) => {
            let delta = if op == BinaryOp::Add { Some(i) } else { i.checked_neg() };
            delta
                .and_then(|d| i64::from(u32::from(c)).checked_add(d))
                .and_then(|n| u32::try_from(n).ok())
                .and_then(char::from_u32)
                .map(Value::Char)
                .ok_or(EvalError::Overflow(op.symbol()))
        }
        (Value::Integer(i), Value::Char(c)) if op == BinaryOp::Add => binary_values(op, Value::Char(c), Value::Integer(i)),
        (
            Value::List {
                elem: a,
                items: mut xs,
            },
            Value::List { elem: b, items: ys },
        ) if op == BinaryOp::Add => {
            let elem = unify(&a, &b).ok_or_else(|| invalid_binary(op, &Type::list(a.clone()), &Type::list(b.clone())))?;
            xs.extend(ys);
            Ok(Value::list(elem, xs))
        }
        (lhs, rhs) => Err(invalid_binary(op, &lhs.ty(), &rhs.ty())),
    }
}

fn integer_op(op: BinaryOp, a: i64, b: i64) -> EResult<Value> {
    let overflow = || EvalError::Overflow(op.symbol());
    let result = match op {
        BinaryOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinaryOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinaryOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(EvalError::DivisionByZero),
        BinaryOp::Div => a.checked_div(b).ok_or_else(overflow)?,
        BinaryOp::Rem => a.checked_rem(b).ok_or_else(overflow)?,
        BinaryOp::Pow if b < 0 => return Ok(Value::Double((a as f64).powf(b as f64))),
        BinaryOp::Pow => u32::try_from(b)
            .ok()
            .and_then(|b| a.checked_pow(b))
            .ok_or_else(overflow)?,
        BinaryOp::Shl => u32::try_from(b)
            .ok()
            .and_then(|b| a.checked_shl(b))
            .ok_or_else(overflow)?,
        BinaryOp::Shr => u32::try_from(b)
            .ok()
            .and_then(|b| a.checked_shr(b))
            .ok_or_else(overflow)?,
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::And | BinaryOp::Or | BinaryOp::Pipeline => {
            return Err(invalid_binary(op, &Type::Integer, &Type::Integer));
        }
    };
    Ok(Value::Integer(result))
}

fn double_op(op: BinaryOp, a: f64, b: f64) -> EResult<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        BinaryOp::Pow => a.powf(b),
        _ => return Err(invalid_binary(op, &Type::Double, &Type::Double)),
    };
    Ok(Value::Double(result))
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> EResult<bool> {
    let incomparable = || EvalError::InvalidComparison {
        op: op.symbol(),
        lhs: lhs.ty(),
        rhs: rhs.ty(),
    };

    // doubles compare by IEEE rules here, so NaN is unequal to itself
    let ordering = match (lhs, rhs) {
        (Value::Integer(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
        (Value::Double(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
        (Value::Char(a), Value::Integer(b)) => Some(i64::from(u32::from(*a)).cmp(b)),
        (Value::Integer(a), Value::Char(b)) => Some(a.cmp(&i64::from(u32::from(*b)))),
        (Value::Function(_), _) | (_, Value::Function(_)) => return Err(incomparable()),
        _ if unify(&lhs.ty(), &rhs.ty()).is_some() => Some(lhs.cmp(rhs)),
        _ => return Err(incomparable()),
    };

    Ok(match op {
        CompareOp::Eq => ordering == Some(Ordering::Equal),
        CompareOp::Ne => ordering != Some(Ordering::Equal),
        CompareOp::Lt => ordering == Some(Ordering::Less),
        CompareOp::Gt => ordering == Some(Ordering::Greater),
        CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    })
}

/// Maps a possibly negative index onto `0..len`.
fn normalise(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index.checked_add(len)? } else { index };
    if index < len { usize::try_from(index).ok() } else { None }
}

fn subscript<'v>(base: &'v Value, index: &Value) -> EResult<&'v Value> {
    match base {
        Value::List { elem, items } => {
            let Value::Integer(i) = index else {
                return Err(EvalError::InvalidIndexType {
                    base: Type::list(elem.clone()),
                    index: index.ty(),
                });
            };
            normalise(*i, items.len())
                .map(|pos| &items[pos])
                .ok_or(EvalError::IndexOutOfRange {
                    index: *i,
                    len: items.len(),
                })
        }
        Value::Map { key, elem, entries } => {
            if index.ty() != *key {
                return Err(EvalError::InvalidIndexType {
                    base: Type::map(key.clone(), elem.clone()),
                    index: index.ty(),
                });
            }
            entries
                .get(index)
                .ok_or_else(|| EvalError::MissingKey(index.to_string()))
        }
        other => Err(EvalError::NotIndexable(other.ty())),
    }
}

fn slice(base: Value, start: Option<Value>, end: Option<Value>) -> EResult<Value> {
    let Value::List { elem, items } = base else {
        return Err(EvalError::NotSliceable(base.ty()));
    };

    let len = items.len();
    let bound = |value: Option<Value>, default: usize| match value {
        None => Ok(default),
        Some(Value::Integer(i)) => Ok(clamp(i, len)),
        Some(other) => Err(EvalError::SliceIndexNotInteger(other.ty())),
    };
    let start = bound(start, 0)?;
    let end = bound(end, len)?;

    let items = if start < end {
        items[start..end].to_vec()
    } else {
        Vec::new()
    };
    Ok(Value::list(elem, items))
}

/// Slice bounds never fail: they count from the end when negative and are
/// clamped into `0..=len`.
fn clamp(bound: i64, len: usize) -> usize {
    let signed_len = i64::try_from(len).unwrap_or(i64::MAX);
    let bound = if bound < 0 { bound.saturating_add(signed_len) } else { bound };
    usize::try_from(bound.clamp(0, signed_len)).unwrap_or(len)
}
