use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cmdlang::types::Type;
use cmdlang::{CmdContext, InterpState, PermissionLevel, Synchronised, Value, parse::parse, process_message};

fn ctx() -> CmdContext {
    CmdContext::new("alice", "#lounge", "bot")
}

fn evaluate(src: &str) -> Option<Value> {
    InterpState::new().evaluate_expr(src, &ctx())
}

fn assert_success(src: &str, expected: Value) {
    match InterpState::new().try_evaluate(src, &ctx()) {
        Ok(value) => assert_eq!(value, expected, "wrong value for {src:?}"),
        Err(e) => panic!("{src:?} failed: {e}"),
    }
}

fn assert_failure(src: &str) {
    if let Some(value) = evaluate(src) {
        panic!("{src:?} should have failed, got {value}");
    }
}

fn chat(interp: &Synchronised<InterpState>, level: PermissionLevel, line: &str) -> Option<String> {
    process_message(interp, &ctx(), level, "!", line)
}

#[test]
fn integer_literals_in_every_base() {
    for src in ["42", "0x2A", "0b101010"] {
        assert_success(src, Value::Integer(42));
    }
}

#[test]
fn precedence_and_associativity() {
    assert_success("1 + 2 * 3", Value::Integer(7));
    assert_success("2 ** 3 ** 2", Value::Integer(512));
    assert_success("(1 + 2) * 3", Value::Integer(9));
    assert_success("-2 ** 2", Value::Integer(4));
    assert_success("1 + 1 == 2 && 3 > 2", Value::Bool(true));
}

#[test]
fn chained_comparisons_check_every_pair() {
    assert_success("1 < 2 < 3", Value::Bool(true));
    assert_success("1 < 3 < 2", Value::Bool(false));
}

#[test]
fn slices_of_a_global_list() {
    let mut state = InterpState::new();
    let items = (1..=4).map(Value::Integer).collect();
    state.add_global("list", Value::list(Type::Integer, items)).unwrap();

    let ints = |xs: &[i64]| Value::list(Type::Integer, xs.iter().copied().map(Value::Integer).collect());
    let mut slice = |src: &str| state.evaluate_expr(src, &ctx());

    assert_eq!(slice("list[1:3]"), Some(ints(&[2, 3])));
    assert_eq!(slice("list[:2]"), Some(ints(&[1, 2])));
    assert_eq!(slice("list[2:]"), Some(ints(&[3, 4])));
    assert_eq!(slice("list[:]"), Some(ints(&[1, 2, 3, 4])));
}

#[test]
fn cast_distance_is_directional() {
    assert_eq!(Type::Integer.cast_dist(&Type::Double), Some(1));
    assert_eq!(Type::Double.cast_dist(&Type::Integer), None);
    assert_eq!(
        Type::list(Type::Integer).cast_dist(&Type::list(Type::Void)),
        Some(2)
    );
    assert_eq!(
        Type::map(Type::Integer, Type::Void).cast_dist(&Type::map(Type::Integer, Type::string())),
        None
    );
}

#[test]
fn builtin_overloads_pick_by_argument_type() {
    assert_success("int(42)", Value::Integer(42));
    assert_success("int(\"42\")", Value::Integer(42));
    assert_success("dbl(1) / 4", Value::Double(0.25));
    assert_success("len([1, 2, 3])", Value::Integer(3));
    assert_success("str(12) + \"!\"", Value::string("12!"));
    assert_success("[3, 1] |> len", Value::Integer(2));
    assert_failure("int([1])");
    assert_failure("len(1, 2)");
}

#[test]
fn sibling_errors_are_joined() {
    let error = parse(") + ]").unwrap_err();
    assert_eq!(error.message, "unexpected token ')'; unexpected token ']'");
}

#[test]
fn ternary_without_colon() {
    let error = parse("a ? b").unwrap_err();
    assert!(error.message.contains("expected ':' after '?'"), "{}", error.message);
}

#[test]
fn unresolved_variables_give_no_value() {
    assert_failure("nobody");
    assert_failure("$3");
    assert_failure("[1, 2][5]");
    assert_success("$user + \" in \" + $channel", Value::string("alice in #lounge"));
}

#[test]
fn macros_from_chat() {
    let interp = Synchronised::new(InterpState::new());
    let admin = PermissionLevel::Broadcaster;

    assert_eq!(
        chat(&interp, admin, r"!def greet hello \$user you said \$0"),
        Some("defined 'greet'".to_string())
    );
    assert_eq!(
        chat(&interp, PermissionLevel::All, "!greet world"),
        Some("hello alice you said world".to_string())
    );
    assert_eq!(
        chat(&interp, admin, "!show greet"),
        Some(r"'greet' is defined as: hello \$user you said \$0".to_string())
    );
    assert_eq!(
        chat(&interp, admin, "!show greet extra"),
        Some("'show' takes exactly 1 argument".to_string())
    );
    assert_eq!(
        chat(&interp, admin, "!def greet again"),
        Some("'greet' is already defined".to_string())
    );
    assert_eq!(
        chat(&interp, admin, "!def empty"),
        Some("'def' expansion cannot be empty".to_string())
    );
    assert_eq!(
        chat(&interp, admin, r"!redef greet hi \$0"),
        Some("redefined 'greet'".to_string())
    );
    assert_eq!(chat(&interp, admin, "!greet bob"), Some("hi bob".to_string()));
    assert_eq!(
        chat(&interp, admin, "!eval greet(\"x\") + [\"y\"]"),
        Some("hi x y".to_string())
    );
    assert_eq!(chat(&interp, admin, "!show eval"), Some("'eval' is a builtin command".to_string()));
    assert_eq!(chat(&interp, admin, "!show ghost"), Some("'ghost' does not exist".to_string()));
}

#[test]
fn aliases_from_chat() {
    let interp = Synchronised::new(InterpState::new());
    let admin = PermissionLevel::Broadcaster;

    chat(&interp, admin, "!def ping pong");
    assert_eq!(
        chat(&interp, admin, "!alias p ping"),
        Some("'p' is now an alias for 'ping'".to_string())
    );
    assert_eq!(chat(&interp, admin, "!p"), Some("pong".to_string()));
    assert_eq!(chat(&interp, admin, "!undef p"), Some("removed 'p'".to_string()));
    assert_eq!(chat(&interp, admin, "!p"), None);
    assert_eq!(chat(&interp, admin, "!ping"), Some("pong".to_string()));
    assert_eq!(
        chat(&interp, admin, "!undef"),
        Some("'undef' takes exactly 1 argument".to_string())
    );
    assert_eq!(chat(&interp, admin, "!undef p"), Some("'p' does not exist".to_string()));
}

#[test]
fn globals_from_chat() {
    let interp = Synchronised::new(InterpState::new());
    let admin = PermissionLevel::Broadcaster;

    assert_eq!(
        chat(&interp, admin, "!global scores [str: int]"),
        Some("added global 'scores' with type '[str: int]'".to_string())
    );
    chat(&interp, admin, "!eval scores[\"alice\"] = 3");
    assert_eq!(
        chat(&interp, admin, "!eval scores[$user] += 2"),
        Some("5".to_string())
    );
    assert_eq!(chat(&interp, admin, "!eval scores"), Some("alice:5".to_string()));
    assert_eq!(
        chat(&interp, admin, "!global scores int"),
        Some("redefinition of global 'scores'".to_string())
    );
    let reply = chat(&interp, admin, "!eval nobody + 1");
    assert!(reply.is_some_and(|r| r.starts_with("error:")));
}

#[test]
fn runaway_recursion_is_cut_off() {
    // unoptimised frames are large; give the nesting room
    let reply = thread::Builder::new()
        .stack_size(64 << 20)
        .spawn(|| {
            let interp = Synchronised::new(InterpState::new());
            chat(&interp, PermissionLevel::Broadcaster, r"!def forever \forever()");
            chat(&interp, PermissionLevel::All, "!forever")
        })
        .unwrap()
        .join()
        .unwrap();
    assert!(reply.is_some_and(|r| r.trim().is_empty()));
}

#[test]
fn branching_recursion_runs_out_of_time() {
    let started = Instant::now();
    let reply = thread::Builder::new()
        .stack_size(64 << 20)
        .spawn(|| {
            let interp = Synchronised::new(InterpState::new());
            chat(&interp, PermissionLevel::Broadcaster, r"!def m \m() \m()");
            chat(&interp, PermissionLevel::All, "!m")
        })
        .unwrap()
        .join()
        .unwrap();
    assert!(reply.is_some_and(|r| r.trim().is_empty()));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn concurrent_chat_shares_one_registry() {
    let interp = Arc::new(Synchronised::new(InterpState::new()));
    interp.map_write(|state| state.add_global("hits", Value::Integer(0))).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let interp = Arc::clone(&interp);
            thread::spawn(move || {
                for _ in 0..10 {
                    chat(&interp, PermissionLevel::All, "!eval hits += 1");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(interp.rlock().global("hits"), Some(&Value::Integer(80)));
}
