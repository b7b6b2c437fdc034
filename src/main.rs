use std::fs;
use std::io::{self, BufRead};
use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use cmdlang::lex::{LexDiagnostic, TokenKind};
use cmdlang::value::render_message;
use cmdlang::{CmdContext, InterpState, Lexer, PermissionLevel, Synchronised, process_message};
use miette::IntoDiagnostic;
use miette::WrapErr;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Permission level of the simulated caller.
    #[arg(long, value_enum, default_value_t = PermissionLevel::All, global = true)]
    level: PermissionLevel,

    #[arg(long, default_value = "!", global = true)]
    prefix: String,

    #[arg(long, default_value = "user", global = true)]
    user: String,

    #[arg(long, default_value = "#console", global = true)]
    channel: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Tokenize { filename: PathBuf },
    Parse { filename: PathBuf },
    /// Evaluates a single expression.
    Eval { expr: String },
    /// Treats each line of the file (or stdin) as a chat message.
    Console { file: Option<PathBuf> },
}

fn read_file(filename: &PathBuf) -> miette::Result<String> {
    fs::read_to_string(filename)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading `{}` failed", filename.display()))
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let ctx = CmdContext::new(&args.user, &args.channel, "cmdlang");

    match args.command {
        Commands::Tokenize { filename } => {
            let file_contents = read_file(&filename)?;

            for token in Lexer::new(&file_contents) {
                if let TokenKind::Invalid(kind) = token.kind {
                    let diagnostic = LexDiagnostic::build(filename.to_str(), &file_contents, &token, kind);
                    eprintln!("[line {}] Error: {kind}: {}", diagnostic.line(), diagnostic.token);
                    eprintln!("{:?}", miette::Report::new(diagnostic));
                    std::process::exit(65);
                }
                println!("{token}");
            }
        }
        Commands::Parse { filename } => {
            let file_contents = read_file(&filename)?;

            let expr = cmdlang::Parser::new(filename.to_str(), &file_contents).parse()?;
            println!("{expr}");
        }
        Commands::Eval { expr } => {
            let mut state = InterpState::new();
            let value = state.try_evaluate(&expr, &ctx)?;
            println!("{}", render_message(&value));
        }
        Commands::Console { file } => {
            let input: Box<dyn BufRead> = match &file {
                Some(path) => Box::new(io::Cursor::new(read_file(path)?)),
                None => Box::new(io::stdin().lock()),
            };

            let interp = Synchronised::new(InterpState::new());
            for line in input.lines() {
                let line = line.into_diagnostic().wrap_err("reading input failed")?;
                if let Some(reply) = process_message(&interp, &ctx, args.level, &args.prefix, &line) {
                    println!("{reply}");
                }
            }
        }
    }
    Ok(())
}
