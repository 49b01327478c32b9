use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::BackendError;

/// Quote one argument for a POSIX shell.
///
/// NUL bytes are dropped first: the argument ends up in a C string and would
/// otherwise be cut short at the first one.
pub fn shell_quote(arg: &str) -> String {
    let cleaned = arg.replace('\0', "");
    format!("'{}'", cleaned.replace('\'', r"'\''"))
}

/// Build `program arg1 arg2 ...` with every word quoted.
pub fn join_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
pub struct ShellOutput {
    /// Exit code, or -1 when the process was ended by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run `command` through `<shell> -l -i -c "exec <command>"`.
///
/// The login + interactive flags pull in the user's PATH (version managers,
/// npm globals). `exec` replaces the shell with the tool, so the child we
/// kill on timeout or cancellation is the tool itself.
pub async fn run_in_login_shell(
    shell: &Path,
    command: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ShellOutput, BackendError> {
    let mut cmd = Command::new(shell);
    cmd.arg("-l")
        .arg("-i")
        .arg("-c")
        .arg(format!("exec {command}"))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|err| {
        BackendError::Transport(format!("failed to spawn {}: {err}", shell.display()))
    })?;

    // Dropping the wait future drops the child, and kill_on_drop sends SIGKILL.
    let wait = child.wait_with_output();
    tokio::select! {
        output = wait => {
            let output = output
                .map_err(|err| BackendError::Transport(format!("failed to wait for process: {err}")))?;
            Ok(ShellOutput {
                status: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
        _ = tokio::time::sleep(timeout) => Err(BackendError::Timeout { after: timeout }),
        _ = cancel.cancelled() => Err(BackendError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Instant;

    fn sh() -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    #[test]
    fn quotes_single_quotes_and_drops_nul() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("a\0b"), "'ab'");
        assert_eq!(
            join_command("codex", &["exec".into(), "--".into(), "say \"hi\"".into()]),
            r#"'codex' 'exec' '--' 'say "hi"'"#
        );
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let cancel = CancellationToken::new();
        let out = run_in_login_shell(
            &sh(),
            &join_command("printf", &["%s".into(), "it's $HOME".into()]),
            Duration::from_secs(10),
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(out.status, 0);
        // Login profiles may print banners first; the tool's output comes last.
        assert!(out.stdout.ends_with("it's $HOME"));
    }

    #[tokio::test]
    async fn missing_tool_exits_127() {
        let cancel = CancellationToken::new();
        let out = run_in_login_shell(
            &sh(),
            "cardflow-definitely-missing-tool",
            Duration::from_secs(10),
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(out.status, 127);
    }

    #[tokio::test]
    async fn never_exiting_process_is_killed_at_timeout() {
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let err = run_in_login_shell(&sh(), "sleep 30", Duration::from_millis(300), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn cancellation_stops_the_process() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });
        let started = Instant::now();
        let err = run_in_login_shell(&sh(), "sleep 30", Duration::from_secs(60), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
