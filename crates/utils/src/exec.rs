use tokio::process::Command;

/// Builds a [`Command`] for `program`, applying the `$PATH` override when one
/// is configured.
///
/// The override only affects the spawned child (and the lookup of `program`
/// itself), the environment of the current process is left untouched.
pub fn command(program: &str, path: Option<&str>) -> Command {
    let mut command = Command::new(program);
    if let Some(path) = path {
        command.env("PATH", path);
    }
    command
}
