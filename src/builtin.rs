//! Registry commands (`def`, `chmod`, ...) and chat message dispatch.

use std::collections::HashMap;

use crate::{
    Synchronised,
    command::{CmdContext, PermissionLevel},
    interp::InterpState,
    types::Type,
    value::{Value, render_message},
};

pub const BUILTIN_COMMANDS: [&str; 8] = ["def", "redef", "undef", "alias", "show", "chmod", "global", "eval"];

pub fn is_builtin_command(name: &str) -> bool {
    BUILTIN_COMMANDS.contains(&name)
}

/// Masks the registry commands start out with. `chmod` can change them.
pub fn default_permissions() -> HashMap<String, u64> {
    BUILTIN_COMMANDS
        .iter()
        .map(|&name| {
            let level = match name {
                "eval" | "show" => PermissionLevel::All,
                "chmod" => PermissionLevel::Moderator,
                _ => PermissionLevel::Trusted,
            };
            (name.to_string(), level.mask())
        })
        .collect()
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(i) => (&input[..i], input[i..].trim_start()),
        None => (input, ""),
    }
}

/// Runs `name` if it is a registry command, returning the reply. `None`
/// means `name` is not one of ours.
pub fn run_builtin_command(
    interp: &Synchronised<InterpState>,
    ctx: &CmdContext,
    level: PermissionLevel,
    name: &str,
    args: &str,
) -> Option<String> {
    if !is_builtin_command(name) {
        return None;
    }

    let required = interp.rlock().builtin_permission(name);
    if !level.permits(required) {
        tracing::warn!(target: "cmd", "user '{}' tried to run '{name}' without permission", ctx.caller);
        return Some("insufficient permissions".to_string());
    }

    let reply = match name {
        "def" => command_def(interp, args, false),
        "redef" => command_def(interp, args, true),
        "undef" => command_undef(interp, args),
        "alias" => command_alias(interp, args),
        "show" => command_show(interp, args),
        "chmod" => command_chmod(interp, args),
        "global" => command_global(interp, args),
        _ => command_eval(interp, ctx, args),
    };
    Some(reply)
}

fn command_def(interp: &Synchronised<InterpState>, args: &str, redefine: bool) -> String {
    let which = if redefine { "redef" } else { "def" };
    let (name, expansion) = split_word(args);
    if name.is_empty() {
        return format!("not enough arguments to '{which}'");
    }

    match interp.wlock().define_macro(name, expansion, redefine) {
        Ok(()) => format!("{which}ined '{name}'"),
        Err(e) => e.to_string(),
    }
}

fn command_undef(interp: &Synchronised<InterpState>, args: &str) -> String {
    let words: Vec<&str> = args.split_whitespace().collect();
    let [name] = words.as_slice() else {
        return "'undef' takes exactly 1 argument".to_string();
    };

    if interp.wlock().remove_command_or_alias(name) {
        tracing::info!(target: "cmd", "removed '{name}'");
        format!("removed '{name}'")
    } else {
        format!("'{name}' does not exist")
    }
}

fn command_alias(interp: &Synchronised<InterpState>, args: &str) -> String {
    let words: Vec<&str> = args.split_whitespace().collect();
    let [name, target] = words.as_slice() else {
        return "'alias' takes exactly 2 arguments".to_string();
    };

    match interp.wlock().add_alias(name, target) {
        Ok(()) => format!("'{name}' is now an alias for '{target}'"),
        Err(e) => e.to_string(),
    }
}

fn command_show(interp: &Synchronised<InterpState>, args: &str) -> String {
    let words: Vec<&str> = args.split_whitespace().collect();
    let [name] = words.as_slice() else {
        return "'show' takes exactly 1 argument".to_string();
    };
    if is_builtin_command(name) {
        return format!("'{name}' is a builtin command");
    }

    let Some(command) = interp.rlock().find_command(name) else {
        return format!("'{name}' does not exist");
    };
    match command.as_macro() {
        Some(body) => format!("'{name}' is defined as: {}", body.words().join(" ")),
        None => format!("'{name}' cannot be shown"),
    }
}

/// `chmod <command> <mask>`, where the mask is hexadecimal.
fn command_chmod(interp: &Synchronised<InterpState>, args: &str) -> String {
    let words: Vec<&str> = args.split_whitespace().collect();
    let [name, perm] = words.as_slice() else {
        return "not enough arguments to chmod".to_string();
    };

    let digits = perm.trim_start_matches("0x");
    let Ok(mask) = u64::from_str_radix(digits, 16) else {
        return "invalid permission string".to_string();
    };

    if is_builtin_command(name) {
        interp.wlock().set_builtin_permission(name, mask);
    } else {
        match interp.rlock().find_command(name) {
            Some(command) => command.set_permissions(mask),
            None => return format!("'{name}' does not exist"),
        }
    }

    tracing::info!(target: "cmd", "permissions for '{name}' changed to {mask:x}");
    format!("permissions for '{name}' changed to {mask:x}")
}

/// `global <name> <type>`: declares a global holding the type's default.
fn command_global(interp: &Synchronised<InterpState>, args: &str) -> String {
    let (name, type_text) = split_word(args);
    if name.is_empty() || type_text.is_empty() {
        return "not enough arguments to global".to_string();
    }

    let Some(ty) = Type::parse_literal(type_text).filter(|t| Value::default_of(t).is_some()) else {
        return format!("invalid type '{type_text}'");
    };

    match interp.wlock().declare_global(name, &ty) {
        Ok(()) => format!("added global '{name}' with type '{ty}'"),
        Err(e) => e.to_string(),
    }
}

fn command_eval(interp: &Synchronised<InterpState>, ctx: &CmdContext, args: &str) -> String {
    match interp.wlock().try_evaluate(args, ctx) {
        Ok(value) => render_message(&value),
        Err(e) => {
            tracing::warn!(target: "interp", "eval failed: {e}");
            format!("error: {e}")
        }
    }
}

/// Handles one chat line. Lines without `prefix` are ignored; otherwise
/// the first word names a registry command or a user command and the
/// rest are its arguments.
pub fn process_message(
    interp: &Synchronised<InterpState>,
    ctx: &CmdContext,
    level: PermissionLevel,
    prefix: &str,
    message: &str,
) -> Option<String> {
    let body = message.trim().strip_prefix(prefix)?;
    let ctx = &ctx.restarted();
    let (name, args) = split_word(body);
    if name.is_empty() {
        return None;
    }

    if let Some(reply) = run_builtin_command(interp, ctx, level, name, args) {
        return Some(reply);
    }

    let Some(command) = interp.rlock().find_command(name) else {
        tracing::debug!(target: "cmd", "unknown command '{name}'");
        return None;
    };

    if !level.permits(command.permissions()) {
        tracing::warn!(target: "cmd", "user '{}' tried to run '{name}' without permission", ctx.caller);
        return Some("insufficient permissions".to_string());
    }

    let call = CmdContext {
        macro_args: args.split_whitespace().map(Value::string).collect(),
        ..ctx.clone()
    };
    let value = command.run(&mut interp.wlock(), &call)?;
    Some(render_message(&value))
}
