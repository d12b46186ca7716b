//! The user directory: who can be messaged.

use std::future::Future;

use tracing::{debug, warn};

use parley_shared::User;

use crate::config::ChatConfig;
use crate::error::ClientError;

/// Source of every addressable user.
pub trait Directory {
    fn list_users(&self) -> impl Future<Output = Result<Vec<User>, ClientError>> + Send;
}

/// Directory backed by the platform's `GET /users` endpoint.
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpDirectory {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
        }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(config.directory_url.clone(), config.session_token.clone())
    }

    fn users_url(&self) -> String {
        format!("{}/users", self.base_url.trim_end_matches('/'))
    }
}

impl Directory for HttpDirectory {
    fn list_users(&self) -> impl Future<Output = Result<Vec<User>, ClientError>> + Send {
        async move {
            let url = self.users_url();
            let mut request = self.client.get(&url);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ClientError::Directory(format!("GET {url} returned {status}")));
            }

            let rows: Vec<serde_json::Value> = response.json().await?;
            let users = usable_users(rows);
            debug!(count = users.len(), "directory fetched");
            Ok(users)
        }
    }
}

/// Decode directory rows one by one. A row that is not a valid user (for
/// instance an id containing a reserved character) is logged and skipped.
pub fn usable_users(rows: Vec<serde_json::Value>) -> Vec<User> {
    let total = rows.len();
    let users: Vec<User> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| match serde_json::from_value::<User>(row) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(index, error = %e, "skipping unusable directory entry");
                None
            }
        })
        .collect();
    if users.len() < total {
        warn!(skipped = total - users.len(), total, "directory had unusable entries");
    }
    users
}

/// A fixed list of users.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: Vec<User>,
}

impl StaticDirectory {
    pub fn new(users: Vec<User>) -> Self {
        Self { users }
    }
}

impl Directory for StaticDirectory {
    fn list_users(&self) -> impl Future<Output = Result<Vec<User>, ClientError>> + Send {
        let users = self.users.clone();
        async move { Ok(users) }
    }
}
