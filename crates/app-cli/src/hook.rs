use std::process::Command;

use tracing::{info, warn};

/// Invoke the optional finish hook with the number of newly downloaded mails
/// as its only argument. The hook's own failure is logged, never fatal.
pub fn run_finish_hook(hook: Option<&str>, downloaded: usize) {
    let Some(hook) = hook else { return };
    let mut command = command_for(hook);
    command.arg(downloaded.to_string());
    match command.status() {
        Ok(status) if status.success() => info!(hook, "finish hook completed"),
        Ok(status) => {
            warn!(hook, code = ?status.code(), "finish hook exited non-zero")
        }
        Err(e) => warn!(hook, error = %e, "finish hook could not be started"),
    }
}

/// Shell and Python hooks go through their interpreters; anything else is
/// expected to be directly executable.
fn command_for(hook: &str) -> Command {
    if hook.ends_with(".sh") {
        let mut command = Command::new("/bin/sh");
        command.arg(hook);
        command
    } else if hook.ends_with(".py") {
        let mut command = Command::new("python3");
        command.arg(hook);
        command
    } else {
        Command::new(hook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_by_extension() {
        assert_eq!(command_for("notify.sh").get_program(), "/bin/sh");
        assert_eq!(command_for("notify.py").get_program(), "python3");
        assert_eq!(command_for("/usr/local/bin/notify").get_program(), "/usr/local/bin/notify");
    }

    #[test]
    fn missing_hook_binary_is_not_fatal() {
        run_finish_hook(Some("/no/such/hook"), 3);
        run_finish_hook(None, 3);
    }
}
