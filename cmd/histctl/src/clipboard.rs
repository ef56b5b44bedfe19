//! Best-effort system clipboard write. Shells out to whatever clipboard
//! tool the platform conventionally provides; silently does nothing if
//! it's absent, since the confirmed selection has already been written to
//! stdout.

use std::io::Write;
use std::process::{Command, Stdio};

pub fn copy(text: &str) {
    let candidates: &[(&str, &[&str])] = if cfg!(target_os = "macos") {
        &[("pbcopy", &[])]
    } else if cfg!(target_os = "windows") {
        &[("clip", &[])]
    } else {
        &[("wl-copy", &[]), ("xclip", &["-selection", "clipboard"]), ("xsel", &["--clipboard", "--input"])]
    };

    for (program, extra_args) in candidates {
        if try_copy(program, extra_args, text) {
            return;
        }
    }
}

fn try_copy(program: &str, args: &[&str], text: &str) -> bool {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    let Ok(mut child) = child else {
        return false;
    };
    let Some(mut stdin) = child.stdin.take() else {
        return false;
    };
    if stdin.write_all(text.as_bytes()).is_err() {
        return false;
    }
    drop(stdin);
    child.wait().map(|status| status.success()).unwrap_or(false)
}
