//! Opening the dev server in the user's browser.

use std::process::Stdio;

use tokio::process::Command;

/// Launch the platform opener for `address`.
///
/// `BROWSER=none` disables it. Failures are logged and otherwise ignored.
pub fn open_in_browser(address: &str) {
    if std::env::var("BROWSER").is_ok_and(|browser| browser == "none") {
        crate::debug_event!("server", "browser disabled");
        return;
    }

    let (program, args): (&str, Vec<&str>) = if cfg!(target_os = "macos") {
        ("open", vec![address])
    } else if cfg!(windows) {
        ("cmd", vec!["/C", "start", "", address])
    } else {
        ("xdg-open", vec![address])
    };

    match Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(mut child) => {
            crate::debug_event!("server", "browser", "{program} {address}");
            // Reap the opener so it does not linger
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
        }
        Err(e) => {
            tracing::warn!("[server] could not open the browser ({program}): {e}");
            tracing::warn!("[server] open {address} manually");
        }
    }
}
