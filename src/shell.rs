//! Shell-integration injection eligibility (§6), decided from the `getshell` probe's parsed
//! shell path and version string.

/// Returns the trailing path component of a shell path, e.g. `/bin/bash` → `bash`.
fn shell_name(shell_path: &str) -> &str {
    shell_path.rsplit('/').next().unwrap_or(shell_path)
}

/// Whether shell-integration injection should be attempted for this `(shell, version)` pair.
///
/// `zsh` and `fish` are always eligible. `bash` is eligible except for the exact macOS stock
/// build, which rejects `--posix` and therefore cannot run the injected integration script.
pub(crate) fn is_shell_integration_eligible(shell_path: &str, version: &str) -> bool {
    match shell_name(shell_path) {
        "zsh" | "fish" => true,
        "bash" => {
            !(version.contains("GNU bash, version 3.2.57") && version.contains("apple-darwin"))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zsh_and_fish_are_always_eligible() {
        assert!(is_shell_integration_eligible("/bin/zsh", ""));
        assert!(is_shell_integration_eligible("/usr/local/bin/fish", "anything"));
    }

    #[test]
    fn stock_macos_bash_is_excluded() {
        assert!(!is_shell_integration_eligible(
            "/bin/bash",
            "GNU bash, version 3.2.57(1)-release (x86_64-apple-darwin21)"
        ));
    }

    #[test]
    fn linux_bash_is_eligible() {
        assert!(is_shell_integration_eligible(
            "/bin/bash",
            "GNU bash, version 5.1.16(1)-release (x86_64-pc-linux-gnu)"
        ));
    }

    #[test]
    fn old_macos_version_string_alone_is_not_enough() {
        // Same version string but not on apple-darwin: still eligible.
        assert!(is_shell_integration_eligible(
            "/bin/bash",
            "GNU bash, version 3.2.57(1)-release (x86_64-pc-linux-gnu)"
        ));
    }

    #[test]
    fn unknown_shells_are_not_eligible() {
        assert!(!is_shell_integration_eligible("/bin/dash", ""));
    }
}
