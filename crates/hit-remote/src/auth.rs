use std::process::Command;
use std::time::Instant;

use tracing::debug;

use crate::api::{login_poll_interval, login_timeout, web_url, ApiClient};
use crate::session::{self, Session};

pub enum LoginResult {
    LoggedIn(Session),
    Expired,
    Deleted,
    TimedOut,
}

/// Browser login handshake: create a pending session, send the user to the
/// web app, then poll until the session is activated there (or 5 minutes
/// pass at 3-second intervals).
pub fn login() -> anyhow::Result<LoginResult> {
    let api = ApiClient::new(None);
    let created = api.create_session()?;

    let url = format!("{}/terminal?token={}", web_url(), created.token);
    println!("Opening browser: {url}");
    open_browser(&url);

    let deadline = Instant::now() + login_timeout();
    while Instant::now() < deadline {
        std::thread::sleep(login_poll_interval());

        let check = match api.check_session(&created.session_id) {
            Ok(check) => check,
            Err(err) => {
                debug!(error = %err, "session poll failed; retrying");
                continue;
            }
        };

        match check.valid.as_str() {
            "active" => {
                if check.token.is_empty() {
                    continue;
                }
                let session = Session {
                    email: check.email,
                    token: check.token,
                };
                session::save(&session)?;
                return Ok(LoginResult::LoggedIn(session));
            }
            "expired" => return Ok(LoginResult::Expired),
            "deleted" => return Ok(LoginResult::Deleted),
            _ => {}
        }
    }
    Ok(LoginResult::TimedOut)
}

pub fn logout() -> anyhow::Result<()> {
    session::delete()
}

pub fn current_user() -> anyhow::Result<Option<Session>> {
    session::load()
}

fn open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    let launcher = "open";
    #[cfg(target_os = "windows")]
    let launcher = "explorer";
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let launcher = "xdg-open";

    // best effort; the URL was already printed for manual use
    let _ = Command::new(launcher).arg(url).spawn();
}
