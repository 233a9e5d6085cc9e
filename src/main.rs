//! Purpose: `ledgerbatch` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: `submit` prints one result envelope keyed by original item position.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal, Read};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{
    Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod ledger;
mod result_json;
mod serve;

use ledgerbatch::api::{Error, ErrorKind, ItemSpec, to_exit_code};

const DEFAULT_URL: &str = "http://127.0.0.1:1999";
const DEFAULT_BIND: &str = "127.0.0.1:1999";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_BATCH_ITEMS: usize = 1000;
const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Internal)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let message = clap_error_summary(&err);
                let hint = clap_error_hint(&err);
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint(hint),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    let result = command_dispatch::dispatch_command(cli.command, color_mode);

    result
        .map_err(add_transport_hint)
        .map_err(add_protocol_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "ledgerbatch",
    version,
    about = "Submit indexed batches to a ledger and report per-item outcomes",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"A batch is a JSON array of items. Each item succeeds or fails on its own.

Mental model:
  - `submit` sends one batch and prints successes and errors keyed by position
  - `serve` runs a local mock ledger for development and tests
"#,
    after_help = r#"EXAMPLES
  $ ledgerbatch serve                              # Terminal 1: mock ledger on 127.0.0.1:1999
  $ ledgerbatch submit assets.json                 # Terminal 2: submit a batch
  $ echo '[{"op":"create_key","alias":"k1"}]' | ledgerbatch submit -

LEARN MORE
  $ ledgerbatch <command> --help"#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Submit a batch of items to the ledger",
        long_about = r#"Submit a JSON array of items as one batch.

Each item is an object with an "op" member (create_asset, update_asset_tags,
create_key, or any op the ledger understands) plus that op's fields."#,
        after_help = r#"EXAMPLES
  $ ledgerbatch submit assets.json
  $ ledgerbatch submit - < assets.json
  $ ledgerbatch submit --fail-on-error --url http://127.0.0.1:1999 assets.json

NOTES
  - Output: {"total","succeeded","failed","successes":{idx:payload},"errors":{idx:{code,class,message}}}
  - Per-item failures do not change the exit code unless --fail-on-error is set"#
    )]
    Submit {
        #[arg(
            value_name = "FILE",
            default_value = "-",
            help = "Items file (JSON array); use - for stdin",
            value_hint = ValueHint::FilePath
        )]
        input: String,
        #[command(flatten)]
        remote: RemoteArgs,
        #[arg(long, help = "Exit non-zero when any item failed")]
        fail_on_error: bool,
    },
    #[command(
        about = "Run a local mock ledger",
        long_about = r#"Run an in-memory mock ledger over HTTP.

State lives only for the lifetime of the process."#,
        after_help = r#"EXAMPLES
  $ ledgerbatch serve
  $ ledgerbatch serve --bind 127.0.0.1:2000 --token-file ./ledger.token"#
    )]
    Serve(ServeRunArgs),
    #[command(about = "Print version info as JSON")]
    Version,
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ ledgerbatch completion bash > ~/.local/share/bash-completion/completions/ledgerbatch
  $ ledgerbatch completion zsh > ~/.zfunc/_ledgerbatch"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(Args)]
struct RemoteArgs {
    #[arg(
        long,
        env = "LEDGERBATCH_URL",
        default_value = DEFAULT_URL,
        help = "Ledger base URL",
        help_heading = "Connection"
    )]
    url: String,
    #[arg(
        long,
        env = "LEDGERBATCH_TOKEN",
        hide_env_values = true,
        help = "Bearer token (prefer --token-file)",
        help_heading = "Authentication"
    )]
    token: Option<String>,
    #[arg(long, value_name = "PATH", help = "Read bearer token from file", value_hint = ValueHint::FilePath, help_heading = "Authentication")]
    token_file: Option<PathBuf>,
    #[arg(
        long,
        default_value_t = DEFAULT_TIMEOUT_MS,
        help = "Whole-request timeout in milliseconds",
        help_heading = "Connection"
    )]
    timeout_ms: u64,
}

#[derive(Args)]
struct ServeRunArgs {
    #[arg(
        long,
        default_value = DEFAULT_BIND,
        help = "Bind address",
        help_heading = "Connection"
    )]
    bind: String,
    #[arg(
        long,
        help = "Bearer token for auth (dev-only; prefer --token-file)",
        help_heading = "Authentication"
    )]
    token: Option<String>,
    #[arg(long, value_name = "PATH", help = "Read bearer token from file", value_hint = ValueHint::FilePath, help_heading = "Authentication")]
    token_file: Option<PathBuf>,
    #[arg(
        long,
        help = "Allow non-loopback binds (requires a token)",
        help_heading = "Safety"
    )]
    allow_non_loopback: bool,
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_BATCH_ITEMS,
        help = "Max items accepted in one batch",
        help_heading = "Safety"
    )]
    max_batch_items: usize,
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_BODY_BYTES,
        help = "Max request body size in bytes",
        help_heading = "Safety"
    )]
    max_body_bytes: u64,
}

fn add_transport_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Transport => err.with_hint(
            "Could not reach the ledger. Check --url and that `ledgerbatch serve` (or the ledger) is running.",
        ),
        ErrorKind::Permission => {
            err.with_hint("The ledger rejected the credentials. Check --token or --token-file.")
        }
        _ => err,
    }
}

fn add_protocol_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Protocol || err.hint().is_some() {
        return err;
    }
    err.with_hint("The ledger response did not line up with the request. Check the ledger version.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_LOG=debug and share command/context if it persists.",
    )
}

fn read_token_file(path: &Path) -> Result<String, Error> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("failed to read token file {}", path.display()))
            .with_source(err)
    })?;
    let token = raw.trim().to_string();
    if token.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("token file {} is empty", path.display())));
    }
    Ok(token)
}

fn resolve_token_value(
    token: Option<String>,
    token_file: Option<PathBuf>,
) -> Result<Option<String>, Error> {
    if token.is_some() && token_file.is_some() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--token cannot be combined with --token-file")
            .with_hint("Use --token-file for safer handling, or pass --token for local/dev use."));
    }
    if let Some(path) = token_file {
        return read_token_file(&path).map(Some);
    }
    Ok(token)
}

fn serve_config_from_run_args(run: ServeRunArgs) -> Result<serve::ServeConfig, Error> {
    let bind: SocketAddr = run.bind.parse().map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid bind address")
            .with_hint("Use a host:port value like 127.0.0.1:1999.")
    })?;
    let token = resolve_token_value(run.token, run.token_file)?;
    Ok(serve::ServeConfig {
        bind,
        token,
        max_batch_items: run.max_batch_items,
        max_body_bytes: run.max_body_bytes,
        allow_non_loopback: run.allow_non_loopback,
    })
}

fn open_items_reader(path: &str) -> Result<Box<dyn Read>, Error> {
    if path == "-" {
        return Ok(Box::new(io::stdin()));
    }
    let reader = std::fs::File::open(path).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("failed to read items file {path}"))
            .with_source(err)
    })?;
    Ok(Box::new(reader))
}

fn read_items<R: Read>(reader: R) -> Result<Vec<ItemSpec>, Error> {
    let value: Value = serde_json::from_reader(reader).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("items input is not valid json")
            .with_hint("Provide a JSON array of item objects, e.g. '[{\"op\":\"create_key\"}]'.")
            .with_source(err)
    })?;
    let Value::Array(items) = value else {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("items input must be a JSON array")
            .with_hint("Wrap a single item in [ ... ]."));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| ItemSpec::from_value(item).map_err(|err| err.with_index(index)))
        .collect()
}

fn init_cli_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_version_output() {
    if io::stdout().is_terminal() {
        println!("ledgerbatch {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(json!({
            "name": "ledgerbatch",
            "version": env!("CARGO_PKG_VERSION"),
        }));
    }
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Encode => "item encoding failed".to_string(),
        ErrorKind::Protocol => "ledger protocol error".to_string(),
        ErrorKind::Transport => "transport failure".to_string(),
        ErrorKind::Rejected => "item rejected".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::OutOfRange => "index out of range".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(index) = err.index() {
        inner.insert("index".to_string(), json!(index));
    }
    if let Some(failure) = err.failure() {
        inner.insert("code".to_string(), json!(failure.code.as_str()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(index) = err.index() {
        lines.push(format!(
            "{} {index}",
            colorize_label("item:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);

    let Some(usage) = usage else {
        return "Try `ledgerbatch --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "ledgerbatch") else {
        return "Try `ledgerbatch --help`.".to_string();
    };

    let parts: Vec<&str> = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|token| {
            !(token.starts_with('-') || token.starts_with('<') || token.starts_with('['))
        })
        .copied()
        .collect();

    if parts.is_empty() {
        return "Try `ledgerbatch --help`.".to_string();
    }
    format!("Try `ledgerbatch {} --help`.", parts.join(" "))
}

fn timeout_from_ms(timeout_ms: u64) -> Result<Duration, Error> {
    if timeout_ms == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--timeout-ms must be greater than zero")
            .with_hint("Use a positive value like 30000."));
    }
    Ok(Duration::from_millis(timeout_ms))
}

#[cfg(test)]
mod tests {
    use super::{
        Cli, Error, ErrorKind, ServeRunArgs, error_json, error_text, read_items, read_token_file,
        resolve_token_value, serve_config_from_run_args, timeout_from_ms,
    };
    use clap::CommandFactory;
    use ledgerbatch::api::{FailureCode, ItemSpec, map_failure};
    use std::io::{Cursor, Write};
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn read_items_parses_known_and_unknown_ops() {
        let input = r#"[
            {"op": "create_key", "alias": "k1"},
            {"op": "create_asset", "alias": "gold", "root_xpubs": ["aa"], "quorum": 1},
            {"op": "update_asset_tags", "alias": "gold", "tags": {"x": 1}},
            {"op": "archive_asset", "alias": "gold"}
        ]"#;
        let items = read_items(Cursor::new(input)).expect("items");
        let ops: Vec<&str> = items.iter().map(ItemSpec::op).collect();
        assert_eq!(
            ops,
            ["create_key", "create_asset", "update_asset_tags", "archive_asset"]
        );
    }

    #[test]
    fn read_items_reports_index_of_bad_item() {
        let input = r#"[{"op": "create_key"}, {"alias": "missing-op"}]"#;
        let err = read_items(Cursor::new(input)).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.index(), Some(1));
    }

    #[test]
    fn read_items_requires_json_array() {
        let err = read_items(Cursor::new(r#"{"op": "create_key"}"#)).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let err = read_items(Cursor::new("not json")).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let items = read_items(Cursor::new("[]")).expect("items");
        assert!(items.is_empty());
    }

    #[test]
    fn read_token_file_trims_and_rejects_empty() {
        let mut file = NamedTempFile::new().expect("tempfile");
        writeln!(file, "  secret-token  ").expect("write");
        assert_eq!(read_token_file(file.path()).expect("token"), "secret-token");

        let empty = NamedTempFile::new().expect("tempfile");
        let err = read_token_file(empty.path()).expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn token_and_token_file_conflict() {
        let err = resolve_token_value(
            Some("dev".to_string()),
            Some(PathBuf::from("/tmp/ledger.token")),
        )
        .expect_err("conflict");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(
            resolve_token_value(Some("dev".to_string()), None).expect("token"),
            Some("dev".to_string())
        );
    }

    #[test]
    fn serve_args_reject_bad_bind() {
        let run = ServeRunArgs {
            bind: "localhost".to_string(),
            token: None,
            token_file: None,
            allow_non_loopback: false,
            max_batch_items: 10,
            max_body_bytes: 1024,
        };
        let err = serve_config_from_run_args(run).expect_err("bind");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn zero_timeout_is_usage_error() {
        let err = timeout_from_ms(0).expect_err("zero");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(timeout_from_ms(250).expect("timeout").as_millis(), 250);
    }

    #[test]
    fn error_json_carries_index_and_code() {
        let err = Error::new(ErrorKind::Rejected)
            .with_message("create_key rejected by ledger")
            .with_index(0)
            .with_failure(map_failure(Some("CH050"), Some("Alias already exists")));
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "Rejected");
        assert_eq!(value["error"]["index"], 0);
        assert_eq!(value["error"]["code"], FailureCode::DuplicateAlias.as_str());
    }

    #[test]
    fn error_text_respects_color_flag() {
        let err = Error::new(ErrorKind::Usage).with_message("bad input");
        let colored = error_text(&err, true);
        let plain = error_text(&err, false);
        assert!(colored.contains("\u{1b}[31merror:\u{1b}[0m"));
        assert!(plain.contains("error:"));
        assert!(!plain.contains("\u{1b}["));
    }
}
