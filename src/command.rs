use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use crate::{
    interp::InterpState,
    types::Type,
    value::{Value, render_message},
};

/// Nested calls deeper than this fail instead of overflowing the stack.
pub const MAX_CALL_DEPTH: usize = 64;

/// Wall clock budget of one invocation, nested calls included. Depth alone
/// does not bound a macro that calls itself more than once.
pub const EXECUTION_TIME_LIMIT: Duration = Duration::from_millis(750);

pub type NativeAction = fn(&mut InterpState, &CmdContext) -> Option<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum)]
pub enum PermissionLevel {
    All,
    Trusted,
    Moderator,
    Broadcaster,
}

impl PermissionLevel {
    pub fn mask(self) -> u64 {
        match self {
            PermissionLevel::All => 0x1,
            PermissionLevel::Trusted => 0x2,
            PermissionLevel::Moderator => 0x4,
            PermissionLevel::Broadcaster => 0x8,
        }
    }

    /// The level a permission mask demands: its highest set bit. An empty
    /// mask lets everyone through.
    pub fn from_mask(mask: u64) -> PermissionLevel {
        if mask & 0x8 != 0 {
            PermissionLevel::Broadcaster
        } else if mask & 0x4 != 0 {
            PermissionLevel::Moderator
        } else if mask & 0x2 != 0 {
            PermissionLevel::Trusted
        } else {
            PermissionLevel::All
        }
    }

    pub fn permits(self, required: u64) -> bool {
        self >= PermissionLevel::from_mask(required)
    }
}

/// Everything a running command can see about the invocation.
#[derive(Debug, Clone)]
pub struct CmdContext {
    pub caller: String,
    pub channel: String,
    pub self_name: String,
    pub macro_args: Vec<Value>,
    pub depth: usize,
    /// When the invocation began; nested calls share it.
    pub started: Instant,
}

impl CmdContext {
    pub fn new(caller: &str, channel: &str, self_name: &str) -> Self {
        CmdContext {
            caller: caller.to_string(),
            channel: channel.to_string(),
            self_name: self_name.to_string(),
            macro_args: Vec::new(),
            depth: 0,
            started: Instant::now(),
        }
    }

    /// Context for a nested call: same caller and channel, new arguments.
    pub fn nested(&self, macro_args: Vec<Value>) -> Self {
        CmdContext {
            caller: self.caller.clone(),
            channel: self.channel.clone(),
            self_name: self.self_name.clone(),
            macro_args,
            depth: self.depth + 1,
            started: self.started,
        }
    }

    /// The same context with a fresh time budget, for a new invocation.
    pub fn restarted(&self) -> Self {
        CmdContext {
            started: Instant::now(),
            ..self.clone()
        }
    }

    pub fn out_of_time(&self) -> bool {
        self.started.elapsed() > EXECUTION_TIME_LIMIT
    }
}

#[derive(Debug)]
pub struct Command {
    name: String,
    signature: Type,
    permissions: AtomicU64,
    kind: CommandKind,
}

#[derive(Debug)]
pub enum CommandKind {
    Macro(Macro),
    Builtin(BuiltinFunction),
    Overloads(FunctionOverloadSet),
}

impl Command {
    pub fn new_macro(name: &str, body: Macro) -> Command {
        Command {
            name: name.to_string(),
            signature: Type::macro_function(),
            permissions: AtomicU64::new(0),
            kind: CommandKind::Macro(body),
        }
    }

    pub fn builtin(name: &str, signature: Type, action: NativeAction) -> Command {
        Command {
            name: name.to_string(),
            signature,
            permissions: AtomicU64::new(0),
            kind: CommandKind::Builtin(BuiltinFunction { action }),
        }
    }

    /// Candidates are tried in the order given here.
    pub fn overload_set(name: &str, candidates: Vec<Command>) -> Command {
        let signature = candidates
            .first()
            .map(|c| c.signature.clone())
            .unwrap_or_else(|| Type::function(Type::Void, Vec::new()));

        Command {
            name: name.to_string(),
            signature,
            permissions: AtomicU64::new(0),
            kind: CommandKind::Overloads(FunctionOverloadSet {
                candidates: candidates.into_iter().map(Arc::new).collect(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Type {
        &self.signature
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn as_macro(&self) -> Option<&Macro> {
        match &self.kind {
            CommandKind::Macro(m) => Some(m),
            _ => None,
        }
    }

    pub fn permissions(&self) -> u64 {
        self.permissions.load(Ordering::Relaxed)
    }

    /// Only needs a shared reference: the registry hands out `Arc`s.
    pub fn set_permissions(&self, mask: u64) {
        self.permissions.store(mask, Ordering::Relaxed);
    }

    pub fn run(&self, state: &mut InterpState, ctx: &CmdContext) -> Option<Value> {
        match &self.kind {
            CommandKind::Macro(body) => Some(body.run(state, ctx)),
            CommandKind::Builtin(builtin) => (builtin.action)(state, ctx),
            CommandKind::Overloads(set) => {
                let Some(best) = set.resolve(&ctx.macro_args) else {
                    let types: Vec<String> = ctx.macro_args.iter().map(|a| a.ty().to_string()).collect();
                    tracing::error!(
                        target: "interp",
                        "no matching function for call to '{}' with arguments ({})",
                        self.name,
                        types.join(", ")
                    );
                    return None;
                };
                best.run(state, ctx)
            }
        }
    }
}

#[derive(Debug)]
pub struct BuiltinFunction {
    action: NativeAction,
}

#[derive(Debug)]
pub struct FunctionOverloadSet {
    candidates: Vec<Arc<Command>>,
}

impl FunctionOverloadSet {
    pub fn candidates(&self) -> &[Arc<Command>] {
        &self.candidates
    }

    /// Picks the candidate whose parameters are cheapest to reach from
    /// `args`. Ties go to the candidate declared first.
    pub fn resolve(&self, args: &[Value]) -> Option<&Arc<Command>> {
        let arg_types: Vec<Type> = args.iter().map(Value::ty).collect();
        let mut best: Option<(u32, &Arc<Command>)> = None;

        for candidate in &self.candidates {
            let params = candidate.signature().arg_types();
            if params.len() != arg_types.len() {
                continue;
            }

            let Some(cost) = arg_types
                .iter()
                .zip(params)
                .map(|(arg, param)| arg.cast_dist(param))
                .sum::<Option<u32>>()
            else {
                continue;
            };

            if best.is_none_or(|(score, _)| cost < score) {
                best = Some((cost, candidate));
            }
        }

        best.map(|(_, candidate)| candidate)
    }
}

/// A user defined command: a list of words echoed back on each run, where
/// words starting with `\` are evaluated as expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    words: Vec<String>,
}

impl Macro {
    pub fn new(expansion: &str) -> Macro {
        Macro {
            words: perform_expansion(expansion),
        }
    }

    pub fn from_words(words: Vec<String>) -> Macro {
        Macro { words }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn run(&self, state: &mut InterpState, ctx: &CmdContext) -> Value {
        let mut out = Vec::with_capacity(self.words.len());

        for word in &self.words {
            if word.starts_with("\\\\") {
                out.push(Value::string(&word[1..]));
            } else if let Some(expr) = word.strip_prefix('\\') {
                if let Some(value) = state.evaluate_expr(expr, ctx) {
                    out.push(Value::string(&render_message(&value)));
                }
            } else {
                out.push(Value::string(word));
            }
        }

        Value::list(Type::string(), out)
    }
}

/// Splits a macro body into words. An inline expression (`\expr`) runs
/// until the first space outside brackets and string literals, so
/// `\f(1, 2)` stays one word. `\\` escapes a literal backslash.
pub fn perform_expansion(code: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut rest = code.trim_start_matches([' ', '\t']);

    while !rest.is_empty() {
        let end = if rest.starts_with('\\') && !rest.starts_with("\\\\") {
            inline_expr_len(rest)
        } else {
            rest.find([' ', '\t']).unwrap_or(rest.len())
        };

        words.push(rest[..end].to_string());
        rest = rest[end..].trim_start_matches([' ', '\t']);
    }

    words
}

fn inline_expr_len(word: &str) -> usize {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in word.char_indices().skip(1) {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => depth -= 1,
            ' ' | '\t' if depth <= 0 => return i,
            _ => {}
        }
    }

    if depth > 0 || in_string {
        tracing::error!(target: "interp", "unterminated inline expr '{word}'");
    }
    word.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut InterpState, _: &CmdContext) -> Option<Value> {
        None
    }

    #[test]
    fn nested_calls_share_the_time_budget() {
        let ctx = CmdContext::new("alice", "#lounge", "bot");
        let inner = ctx.nested(vec![Value::string("x")]).nested(Vec::new());
        assert_eq!(inner.depth, 2);
        assert_eq!(inner.started, ctx.started);
        assert!(ctx.restarted().started >= ctx.started);
        assert!(!inner.out_of_time());
    }

    fn candidate(params: Vec<Type>) -> Command {
        Command::builtin("f", Type::function(Type::Integer, params), noop)
    }

    fn resolved_params(set: &Command, args: &[Value]) -> Option<Vec<Type>> {
        let CommandKind::Overloads(set) = set.kind() else {
            panic!("not an overload set");
        };
        set.resolve(args)
            .map(|c| c.signature().arg_types().to_vec())
    }

    #[test]
    fn permission_levels_are_ordered() {
        assert!(PermissionLevel::All < PermissionLevel::Trusted);
        assert!(PermissionLevel::Moderator < PermissionLevel::Broadcaster);

        assert!(PermissionLevel::All.permits(0));
        assert!(PermissionLevel::All.permits(PermissionLevel::All.mask()));
        assert!(!PermissionLevel::Trusted.permits(PermissionLevel::Moderator.mask()));
        assert!(PermissionLevel::Broadcaster.permits(PermissionLevel::Moderator.mask()));
        // the highest bit decides
        assert_eq!(PermissionLevel::from_mask(0x1 | 0x4), PermissionLevel::Moderator);
    }

    #[test]
    fn overloads_prefer_the_cheapest_candidate() {
        let set = Command::overload_set(
            "f",
            vec![
                candidate(vec![Type::string()]),
                candidate(vec![Type::Double]),
                candidate(vec![Type::Integer]),
            ],
        );

        assert_eq!(resolved_params(&set, &[Value::Integer(1)]), Some(vec![Type::Integer]));
        assert_eq!(resolved_params(&set, &[Value::Double(1.0)]), Some(vec![Type::Double]));
        assert_eq!(resolved_params(&set, &[Value::Bool(true)]), None);
        assert_eq!(resolved_params(&set, &[]), None);
    }

    #[test]
    fn ties_go_to_the_first_declared_candidate() {
        let set = Command::overload_set(
            "g",
            vec![
                candidate(vec![Type::map(Type::Void, Type::Integer)]),
                candidate(vec![Type::map(Type::string(), Type::Void)]),
            ],
        );
        let arg = Value::empty_map(Type::string(), Type::Integer);
        assert_eq!(
            resolved_params(&set, &[arg]),
            Some(vec![Type::map(Type::Void, Type::Integer)])
        );
    }

    #[test]
    fn generic_slots_accept_concrete_lists() {
        let set = Command::overload_set("len", vec![candidate(vec![Type::list(Type::Void)])]);
        assert!(resolved_params(&set, &[Value::string("abc")]).is_some());
        assert!(resolved_params(&set, &[Value::Integer(3)]).is_none());
    }

    #[test]
    fn expansion_splits_words() {
        assert_eq!(perform_expansion("  hello   there\tfriend "), vec!["hello", "there", "friend"]);
    }

    #[test]
    fn inline_expressions_keep_brackets_together() {
        assert_eq!(
            perform_expansion(r"hi \str(1 + 2) and \xs[1 : 2] done"),
            vec!["hi", r"\str(1 + 2)", "and", r"\xs[1 : 2]", "done"]
        );
        assert_eq!(
            perform_expansion(r#"\"a b" c"#),
            vec![r#"\"a b""#, "c"]
        );
        assert_eq!(perform_expansion(r"\\not code"), vec![r"\\not", "code"]);
    }

    #[test]
    fn macros_round_trip_through_words() {
        let original = Macro::new(r"say \$user hi");
        let restored = Macro::from_words(original.words().to_vec());
        assert_eq!(original, restored);

        let command = Command::new_macro("greet", restored);
        assert_eq!(command.signature(), &Type::macro_function());
        assert_eq!(command.as_macro().map(|m| m.words().len()), Some(3));
    }

    #[test]
    fn permissions_change_through_shared_handles() {
        let command = Arc::new(Command::new_macro("m", Macro::new("x")));
        let other = Arc::clone(&command);
        other.set_permissions(PermissionLevel::Moderator.mask());
        assert_eq!(command.permissions(), 0x4);
    }
}
