use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use miette::Diagnostic;
use thiserror::Error;

use crate::{
    builtin,
    command::{CmdContext, Command, Macro},
    eval::{EvalError, Interpreter},
    parse::{ParseError, VarRef, parse},
    system,
    types::Type,
    value::Value,
};

/// Names that always resolve to the invocation context and so can never
/// be declared as globals.
const CONTEXT_VARIABLES: [&str; 4] = ["user", "self", "channel", "args"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("'{0}' is already defined")]
    AlreadyDefined(String),
    #[error("'{0}' does not exist")]
    NotFound(String),
    #[error("'{0}' is a builtin global")]
    ReservedGlobal(String),
    #[error("redefinition of global '{0}'")]
    GlobalRedefinition(String),
    #[error("circular aliases: {0} -> {1}")]
    CircularAlias(String, String),
    #[error("'{0}' expansion cannot be empty")]
    EmptyExpansion(&'static str),
}

/// Anything that can go wrong between source text and a value.
#[derive(Error, Debug, Diagnostic)]
pub enum EvalFailure {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// The command registry and global variables shared by every invocation.
#[derive(Debug)]
pub struct InterpState {
    commands: HashMap<String, Arc<Command>>,
    aliases: HashMap<String, String>,
    builtins: HashMap<String, Arc<Command>>,
    builtin_command_permissions: HashMap<String, u64>,
    globals: HashMap<String, Value>,
}

impl Default for InterpState {
    fn default() -> Self {
        Self::new()
    }
}

impl InterpState {
    pub fn new() -> Self {
        let builtins = system::builtin_functions()
            .into_iter()
            .map(|f| (f.name().to_string(), Arc::new(f)))
            .collect();

        InterpState {
            commands: HashMap::new(),
            aliases: HashMap::new(),
            builtins,
            builtin_command_permissions: builtin::default_permissions(),
            globals: HashMap::new(),
        }
    }

    /// Follows alias chains down to a command.
    pub fn resolve_command(&self, name: &str) -> Result<Arc<Command>, RegistryError> {
        let mut seen = HashSet::new();
        let mut current = name;

        loop {
            if let Some(command) = self.commands.get(current) {
                return Ok(Arc::clone(command));
            }

            let next = self
                .aliases
                .get(current)
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

            if !seen.insert(next.as_str()) {
                return Err(RegistryError::CircularAlias(current.to_string(), next.clone()));
            }
            current = next.as_str();
        }
    }

    pub fn find_command(&self, name: &str) -> Option<Arc<Command>> {
        match self.resolve_command(name) {
            Ok(command) => Some(command),
            Err(e @ RegistryError::CircularAlias(..)) => {
                tracing::error!(target: "cmd", "{e}");
                None
            }
            Err(_) => None,
        }
    }

    pub fn builtin_function(&self, name: &str) -> Option<Arc<Command>> {
        self.builtins.get(name).cloned()
    }

    pub fn commands(&self) -> impl Iterator<Item = &Arc<Command>> {
        self.commands.values()
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Defines (or with `redefine`, replaces) the macro `name`.
    pub fn define_macro(&mut self, name: &str, expansion: &str, redefine: bool) -> Result<(), RegistryError> {
        if expansion.trim().is_empty() {
            return Err(RegistryError::EmptyExpansion(if redefine { "redef" } else { "def" }));
        }
        if builtin::is_builtin_command(name) {
            return Err(RegistryError::AlreadyDefined(name.to_string()));
        }

        match (self.find_command(name).is_some(), redefine) {
            (true, false) => return Err(RegistryError::AlreadyDefined(name.to_string())),
            (false, true) => return Err(RegistryError::NotFound(name.to_string())),
            (true, true) => {
                self.remove_command_or_alias(name);
            }
            (false, false) => {}
        }

        self.insert_command(Command::new_macro(name, Macro::new(expansion)));
        tracing::info!(target: "cmd", "{}defined '{name}'", if redefine { "re" } else { "" });
        Ok(())
    }

    /// Registers a command as is, replacing any command of the same name.
    /// Used when restoring persisted macros.
    pub fn insert_command(&mut self, command: Command) -> Option<Arc<Command>> {
        self.commands
            .insert(command.name().to_string(), Arc::new(command))
    }

    pub fn add_alias(&mut self, name: &str, target: &str) -> Result<(), RegistryError> {
        if builtin::is_builtin_command(name) || self.commands.contains_key(name) || self.aliases.contains_key(name) {
            return Err(RegistryError::AlreadyDefined(name.to_string()));
        }

        self.resolve_command(target)?;
        self.insert_alias(name, target);
        tracing::info!(target: "cmd", "aliased '{name}' to '{target}'");
        Ok(())
    }

    /// Registers an alias without checking its target; lookups through it
    /// still detect cycles.
    pub fn insert_alias(&mut self, name: &str, target: &str) {
        self.aliases.insert(name.to_string(), target.to_string());
    }

    /// Removes the command or alias called `name` (not what an alias
    /// points to).
    pub fn remove_command_or_alias(&mut self, name: &str) -> bool {
        self.commands.remove(name).is_some() || self.aliases.remove(name).is_some()
    }

    pub fn add_global(&mut self, name: &str, value: Value) -> Result<(), RegistryError> {
        let is_identifier = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !is_identifier || CONTEXT_VARIABLES.contains(&name) {
            return Err(RegistryError::ReservedGlobal(name.to_string()));
        }
        if self.globals.contains_key(name) {
            return Err(RegistryError::GlobalRedefinition(name.to_string()));
        }

        tracing::info!(target: "interp", "added global '{name}' with type '{}'", value.ty());
        self.globals.insert(name.to_string(), value);
        Ok(())
    }

    /// Declares a global holding the default value of `ty`.
    pub fn declare_global(&mut self, name: &str, ty: &Type) -> Result<(), RegistryError> {
        let value = Value::default_of(ty).ok_or_else(|| RegistryError::ReservedGlobal(name.to_string()))?;
        self.add_global(name, value)
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub(crate) fn global_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.globals.get_mut(name)
    }

    pub fn globals(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.globals.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn builtin_permission(&self, name: &str) -> u64 {
        self.builtin_command_permissions.get(name).copied().unwrap_or(0)
    }

    pub fn set_builtin_permission(&mut self, name: &str, mask: u64) {
        self.builtin_command_permissions.insert(name.to_string(), mask);
    }

    /// Looks a variable up: `$N` and `$name` come from the invocation,
    /// plain names are tried as globals, builtin functions and then
    /// commands.
    pub fn resolve_variable(&self, var: VarRef<'_>, ctx: &CmdContext) -> Result<Value, EvalError> {
        match var {
            VarRef::Arg(index) => ctx
                .macro_args
                .get(index)
                .cloned()
                .ok_or(EvalError::ArgumentOutOfRange {
                    index,
                    count: ctx.macro_args.len(),
                }),
            VarRef::Special("user") => Ok(Value::string(&ctx.caller)),
            VarRef::Special("self") => Ok(Value::string(&ctx.self_name)),
            VarRef::Special("channel") => Ok(Value::string(&ctx.channel)),
            VarRef::Special("args") => {
                let words: Vec<String> = ctx.macro_args.iter().map(Value::raw_str).collect();
                Ok(Value::string_list(words.iter().map(String::as_str)))
            }
            VarRef::Special(name) => Err(EvalError::UnresolvedVariable(format!("${name}"))),
            VarRef::Global(name) => {
                if let Some(value) = self.globals.get(name) {
                    return Ok(value.clone());
                }
                self.builtin_function(name)
                    .or_else(|| self.find_command(name))
                    .map(Value::Function)
                    .ok_or_else(|| EvalError::UnresolvedVariable(name.to_string()))
            }
        }
    }

    /// Parses and evaluates `src`. Calls made along the way share the time
    /// budget that `ctx` started with.
    pub fn try_evaluate(&mut self, src: &str, ctx: &CmdContext) -> Result<Value, EvalFailure> {
        let expr = parse(src)?;
        tracing::debug!(target: "interp", "evaluating {expr}");
        Ok(Interpreter::new(self, ctx).eval(&expr)?)
    }

    /// Like [`InterpState::try_evaluate`], but failures are logged and
    /// only show up as a missing value.
    pub fn evaluate_expr(&mut self, src: &str, ctx: &CmdContext) -> Option<Value> {
        match self.try_evaluate(src, ctx) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(target: "interp", "failed to evaluate '{src}': {e}");
                None
            }
        }
    }
}
