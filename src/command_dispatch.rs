//! Purpose: Hold top-level CLI command dispatch for `ledgerbatch`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Per-item failures are reported in the result envelope, not as process errors.
//! Invariants: Helpers in `main.rs` remain the source of parsing and output logic.

use super::*;

use ledgerbatch::api::{BatchClient, HttpTransport};
use result_json::batch_result_json;
use tracing::debug;

pub(super) fn dispatch_command(command: Command, color_mode: ColorMode) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "ledgerbatch", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output();
            Ok(RunOutcome::ok())
        }
        Command::Submit {
            input,
            remote,
            fail_on_error,
        } => {
            init_cli_tracing();
            let items = read_items(open_items_reader(&input)?)?;
            let timeout = timeout_from_ms(remote.timeout_ms)?;
            let mut transport = HttpTransport::new(remote.url)?.with_timeout(timeout);
            if let Some(token) = resolve_token_value(remote.token, remote.token_file)? {
                transport = transport.with_token(token);
            }
            debug!(input = %input, items = items.len(), "read batch items");
            let result = BatchClient::new(transport).submit(&items)?;
            emit_json(batch_result_json(&result));
            if fail_on_error && !result.is_full_success() {
                return Ok(RunOutcome::with_code(to_exit_code(ErrorKind::Rejected)));
            }
            Ok(RunOutcome::ok())
        }
        Command::Serve(run) => {
            let config = serve_config_from_run_args(run)?;
            if io::stderr().is_terminal() {
                let label =
                    colorize_label("ledgerbatch:", color_mode.use_color(true), AnsiColor::Yellow);
                eprintln!(
                    "{label} mock ledger on http://{} (state is in-memory; Ctrl-C to stop)",
                    config.bind
                );
            }
            let runtime = tokio::runtime::Runtime::new().map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to start runtime")
                    .with_source(err)
            })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
    }
}
