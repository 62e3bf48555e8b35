//! Re-authentication: log in once with the profile's credentials when the
//! server answers 401, then re-issue every query refused in the meantime.

use std::sync::Arc;

use parking_lot::Mutex;
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::{debug, info, warn};

use deckathlon_config::Credentials;
use deckathlon_core::{Hooks, RetryHandle};

/// Login endpoint, relative to the API root.
const LOGIN_URL: &str = "login";

/// Where the single per-process login stands.
#[derive(Debug)]
enum LoginState {
    Idle,
    /// Queries refused while the login request is out.
    InFlight(Vec<RetryHandle>),
    Done,
}

pub struct LoginHooks {
    credentials: Credentials,
    state: Arc<Mutex<LoginState>>,
}

impl LoginHooks {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: Arc::new(Mutex::new(LoginState::Idle)),
        }
    }
}

impl Hooks for LoginHooks {
    fn on_unauthorized(&self, retry: RetryHandle) {
        if retry.options().url == LOGIN_URL {
            warn!("login refused");
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return;
        }

        {
            let mut state = self.state.lock();
            match &mut *state {
                LoginState::Idle => {}
                LoginState::InFlight(queued) => {
                    debug!(url = %retry.options().url, "queued until login completes");
                    queued.push(retry);
                    return;
                }
                LoginState::Done => {
                    warn!(url = %retry.options().url, "still unauthorized after login");
                    return;
                }
            }
            *state = LoginState::InFlight(Vec::new());
        }

        let state = Arc::clone(&self.state);
        let username = self.credentials.username.clone();
        let password = self.credentials.password.expose_secret().to_owned();
        tokio::spawn(async move {
            info!(username = %username, "logging in");
            let login = retry
                .registry()
                .query(LOGIN_URL)
                .data(json!({"username": username, "password": password}))
                .send()
                .await;

            let queued = match std::mem::replace(&mut *state.lock(), LoginState::Done) {
                LoginState::InFlight(queued) => queued,
                LoginState::Idle | LoginState::Done => Vec::new(),
            };
            match login {
                Ok(_) => {
                    debug!(count = queued.len() + 1, "retrying after login");
                    for handle in queued {
                        tokio::spawn(handle.retry());
                    }
                    retry.retry().await;
                }
                // Dropping the handles fails their queries as unauthorized.
                Err(err) => warn!(error = %err, "login failed"),
            }
        });
    }

    fn on_query_start(&self) {
        debug!("batch started");
    }

    fn on_query_complete(&self) {
        debug!("batch complete");
    }
}
