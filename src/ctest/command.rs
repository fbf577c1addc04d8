//! Command lines for the container-side tools.
//!
//! Everything here ends up inside `bash -c`, so every externally supplied
//! value (test names, labels, paths) is single-quoted with [`shell_quote`].

use std::path::Path;
use std::time::Duration;

/// Quotes `value` for POSIX shells.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Regex that matches exactly one test name.
pub fn exact_name_regex(name: &str) -> String {
    format!("^{}$", regex::escape(name))
}

/// Maps `value` onto characters safe in container and file names.
///
/// Anything outside `[A-Za-z0-9_.-]` becomes `_`, and a leading character
/// that Docker rejects is prefixed with `t`.
pub fn sanitize_name(value: &str) -> String {
    let mut out: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !out.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        out.insert(0, 't');
    }
    out
}

/// `bash` invocation listing tests with `label` as JSON.
pub fn list_tests(build_dir: &str, label: &str) -> Vec<String> {
    vec![
        "bash".to_string(),
        "-e".to_string(),
        "-o".to_string(),
        "pipefail".to_string(),
        "-c".to_string(),
        format!(
            "cd {}; ctest -L {} --show-only=json-v1",
            shell_quote(build_dir),
            shell_quote(label)
        ),
    ]
}

/// `bash` invocation running exactly one test with a hard timeout.
pub fn run_test(build_dir: &str, name: &str, timeout: Duration) -> Vec<String> {
    vec![
        "bash".to_string(),
        "-c".to_string(),
        format!(
            "cd {}; ctest --output-on-failure -R {} --timeout {}",
            shell_quote(build_dir),
            shell_quote(&exact_name_regex(name)),
            timeout.as_secs().max(1)
        ),
    ]
}

/// Shell pipeline that unpacks `archive` into the current directory, picking
/// the decompressor from the file extension.
pub fn unpack_archive(archive: &str) -> Vec<String> {
    let quoted = shell_quote(archive);
    let script = if archive.ends_with(".tar.zst") || archive.ends_with(".tzst") {
        format!("zstdcat {quoted} | tar x")
    } else if archive.ends_with(".tar.gz") || archive.ends_with(".tgz") {
        format!("tar xzf {quoted}")
    } else if archive.ends_with(".tar.xz") || archive.ends_with(".txz") {
        format!("tar xJf {quoted}")
    } else {
        format!("tar xf {quoted}")
    };
    vec!["sh".to_string(), "-c".to_string(), script]
}

/// Readiness checks for the first discovered test; every check prints one
/// `ok:`/`FAIL:` line and the script always exits 0.
pub fn readiness_probe(
    build_dir: &str,
    working_directory: Option<&str>,
    executable: Option<&str>,
) -> Vec<String> {
    let mut checks = vec![
        format!(
            "if [ -d {dir} ]; then echo 'ok: build directory {b}'; else echo 'FAIL: build directory {b} missing'; fi",
            dir = shell_quote(build_dir),
            b = build_dir.replace('\'', "")
        ),
        "t=\"${TMPDIR:-/tmp}\"; if f=$(mktemp -p \"$t\" 2>/dev/null); then rm -f \"$f\"; echo \"ok: $t writable\"; else echo \"FAIL: $t not writable\"; fi".to_string(),
        "if command -v ctest >/dev/null 2>&1; then echo \"ok: ctest at $(command -v ctest)\"; else echo 'FAIL: ctest not on PATH'; fi".to_string(),
    ];
    if let Some(dir) = working_directory {
        checks.push(format!(
            "if [ -d {q} ]; then echo 'ok: working directory present'; else echo 'FAIL: working directory missing'; fi",
            q = shell_quote(dir)
        ));
    }
    if let Some(exe) = executable {
        let q = shell_quote(exe);
        let check = if Path::new(exe).is_absolute() {
            format!("[ -x {q} ]")
        } else {
            format!("command -v {q} >/dev/null 2>&1")
        };
        checks.push(format!(
            "if {check}; then echo 'ok: test executable found'; else echo 'FAIL: test executable not found'; fi"
        ));
    }
    checks.push("exit 0".to_string());
    vec!["bash".to_string(), "-c".to_string(), checks.join("; ")]
}
