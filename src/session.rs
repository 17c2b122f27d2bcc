use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::auth::{Flow as AuthFlow, PendingLogin};
use crate::reddit;
use crate::storage::{self, Account};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("login is not configured: set reddit.client_id")]
    NotConfigured,
}

/// Tracks the logged-in account and keeps the reddit client's token
/// provider in step with it.
pub struct Manager {
    store: Arc<storage::Store>,
    flow: Option<Arc<AuthFlow>>,
    client: Arc<reddit::Client>,
    active: RwLock<Option<Account>>,
}

impl Manager {
    /// `flow` is `None` when no OAuth client id is configured; browsing
    /// then stays anonymous.
    pub fn new(
        store: Arc<storage::Store>,
        flow: Option<Arc<AuthFlow>>,
        client: Arc<reddit::Client>,
    ) -> Self {
        Self {
            store,
            flow,
            client,
            active: RwLock::new(None),
        }
    }

    pub fn can_login(&self) -> bool {
        self.flow.is_some()
    }

    /// Picks up the most recently used stored account, if any.
    pub fn resume(&self) -> Result<Option<Account>> {
        let Some(flow) = self.flow.as_ref() else {
            return Ok(None);
        };
        for account in self.store.list_accounts()? {
            let Some(token) = self.store.get_token(account.id)? else {
                continue;
            };
            match flow.resume(&account, token) {
                Ok(()) => {
                    info!(username = %account.username, "resumed session");
                    self.activate(flow, account.clone());
                    return Ok(Some(account));
                }
                Err(err) => warn!(username = %account.username, "cannot resume session: {err:#}"),
            }
        }
        Ok(None)
    }

    pub fn begin_login(&self) -> Result<PendingLogin> {
        match self.flow.as_ref() {
            Some(flow) => flow.begin(),
            None => bail!(SessionError::NotConfigured),
        }
    }

    /// Blocks until the browser hands back a code or the login times out.
    pub fn complete_login(&self, login: PendingLogin) -> Result<Account> {
        let Some(flow) = self.flow.as_ref() else {
            bail!(SessionError::NotConfigured);
        };
        let account = flow.complete(login)?;
        self.activate(flow, account.clone());
        Ok(account)
    }

    /// Forgets the active account, its stored token included.
    pub fn logout(&self) -> Result<()> {
        let account = self
            .active
            .write()
            .take()
            .ok_or(SessionError::NotLoggedIn)?;
        if let Some(flow) = self.flow.as_ref() {
            flow.close();
        }
        self.client.set_token_provider(None);
        self.store.delete_account(account.id)?;
        info!(username = %account.username, "logged out");
        Ok(())
    }

    pub fn is_logged_in(&self) -> bool {
        self.active.read().is_some()
    }

    pub fn username(&self) -> Option<String> {
        self.active
            .read()
            .as_ref()
            .map(|account| account.username.clone())
    }

    pub fn close(&self) {
        if let Some(flow) = self.flow.as_ref() {
            flow.close();
        }
    }

    fn activate(&self, flow: &AuthFlow, account: Account) {
        self.client
            .set_token_provider(Some(flow.token_provider(account.id)));
        *self.active.write() = Some(account);
    }
}
