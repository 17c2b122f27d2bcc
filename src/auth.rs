//! Reddit OAuth2 for installed apps (PKCE), one account at a time.
//!
//! A login starts a local callback server on the configured redirect
//! address and hands back the browser URL. Completing it waits for the
//! redirect, trades the code for tokens, looks up who logged in and stores
//! both. A single refresh thread then keeps the access token fresh until
//! logout or exit.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::RngCore;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tiny_http::{Header, Response, Server};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::RedditConfig;
use crate::reddit::{DataError, OAuthToken, TokenProvider};
use crate::storage::{self, Account, Token};

const AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";
const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const IDENTITY_URL: &str = "https://oauth.reddit.com/api/v1/me";
const CALLBACK_POLL: Duration = Duration::from_millis(200);
const REFRESH_RETRY: Duration = Duration::from_secs(5);
const DEFAULT_LIFETIME: i64 = 3600;

static SUCCESS_PAGE: Lazy<String> = Lazy::new(|| {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>rtv</title></head>\
         <body style=\"font-family: monospace\"><h1>Logged in</h1>\
         <p>rtv {} can now act on your behalf. Return to the terminal.</p></body></html>",
        crate::VERSION
    )
});

#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub user_agent: String,
    pub redirect_uri: String,
    /// How long to wait for the browser to come back with a code.
    pub login_timeout: Duration,
    /// Refresh this long before the access token expires.
    pub refresh_skew: Duration,
}

impl Config {
    pub fn from_reddit(reddit: &RedditConfig) -> Self {
        Self {
            client_id: reddit.client_id.clone(),
            client_secret: reddit.client_secret.clone(),
            scopes: reddit.scopes.clone(),
            user_agent: reddit.user_agent.clone(),
            redirect_uri: reddit.redirect_uri.clone(),
            login_timeout: reddit.login_timeout,
            refresh_skew: Duration::from_secs(30),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_reddit(&RedditConfig::default())
    }
}

/// A login waiting for the browser. Dropping it stops the callback server.
pub struct PendingLogin {
    pub browser_url: String,
    redirect_uri: String,
    verifier: String,
    code: Receiver<Result<String>>,
    _shutdown: Sender<()>,
}

impl std::fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLogin")
            .field("browser_url", &self.browser_url)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

/// Tokens from one grant, with an absolute expiry.
#[derive(Debug, Clone, PartialEq)]
struct Grant {
    access_token: String,
    refresh_token: String,
    token_type: String,
    scope: Vec<String>,
    expires_at: DateTime<Utc>,
}

impl Grant {
    fn from_stored(token: Token) -> Self {
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            token_type: token.token_type,
            scope: token.scope,
            expires_at: token.expires_at,
        }
    }

    fn to_stored(&self, account_id: i64) -> Token {
        Token {
            account_id,
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            token_type: self.token_type.clone(),
            scope: self.scope.clone(),
            expires_at: self.expires_at,
        }
    }

    /// Time until a refresh is due, `skew` ahead of expiry; at least a second.
    fn refresh_in(&self, skew: Duration) -> Duration {
        let skew = chrono::Duration::from_std(skew).unwrap_or_else(|_| chrono::Duration::zero());
        (self.expires_at - skew - Utc::now())
            .to_std()
            .unwrap_or_default()
            .max(Duration::from_secs(1))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    error: Option<Value>,
}

impl TokenResponse {
    /// Refresh responses may leave out the refresh token, scope and type;
    /// those carry over from `previous`.
    fn into_grant(self, previous: Option<&Grant>, scopes: &[String]) -> Result<Grant> {
        if let Some(error) = self.error {
            bail!("auth: token request refused: {error}");
        }
        if self.access_token.is_empty() {
            bail!("auth: token response without an access token");
        }
        let refresh_token = match previous {
            _ if !self.refresh_token.is_empty() => self.refresh_token,
            Some(previous) => previous.refresh_token.clone(),
            None => bail!("auth: token response without a refresh token"),
        };
        let mut scope: Vec<String> = self.scope.split_whitespace().map(String::from).collect();
        if scope.is_empty() {
            scope = previous
                .map(|previous| previous.scope.clone())
                .filter(|scope| !scope.is_empty())
                .unwrap_or_else(|| scopes.to_vec());
        }
        let lifetime = if self.expires_in > 0 {
            self.expires_in
        } else {
            DEFAULT_LIFETIME
        };
        Ok(Grant {
            access_token: self.access_token,
            refresh_token,
            token_type: self
                .token_type
                .or_else(|| previous.map(|previous| previous.token_type.clone()))
                .unwrap_or_else(|| "bearer".into()),
            scope,
            expires_at: Utc::now() + chrono::Duration::seconds(lifetime),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Identity {
    id: String,
    name: String,
}

/// The token endpoint, shared with the refresh thread.
#[derive(Clone)]
struct Endpoint {
    http: Client,
    cfg: Arc<Config>,
}

impl Endpoint {
    fn grant<'a>(&'a self, params: &[(&'a str, &'a str)], previous: Option<&Grant>) -> Result<Grant> {
        let mut form = params.to_vec();
        let mut req = self
            .http
            .post(TOKEN_URL)
            .header(USER_AGENT, self.cfg.user_agent.as_str());
        if self.cfg.client_secret.is_empty() {
            form.push(("client_id", self.cfg.client_id.as_str()));
        } else {
            req = req.basic_auth(&self.cfg.client_id, Some(&self.cfg.client_secret));
        }
        let resp = req.form(&form).send().context("auth: token request")?;
        let status = resp.status();
        let body = resp.text().context("auth: read token response")?;
        let payload: TokenResponse = serde_json::from_str(&body)
            .with_context(|| format!("auth: token request failed ({status}): {body}"))?;
        if !status.is_success() && payload.error.is_none() {
            bail!("auth: token request failed ({status})");
        }
        payload.into_grant(previous, &self.cfg.scopes)
    }

    fn identity(&self, grant: &Grant) -> Result<Identity> {
        let resp = self
            .http
            .get(IDENTITY_URL)
            .header(USER_AGENT, self.cfg.user_agent.as_str())
            .header(AUTHORIZATION, format!("Bearer {}", grant.access_token))
            .send()
            .context("auth: identity request")?;
        if !resp.status().is_success() {
            bail!("auth: identity request failed ({})", resp.status());
        }
        let identity: Identity = resp.json().context("auth: decode identity")?;
        if identity.name.is_empty() {
            bail!("auth: identity without a user name");
        }
        Ok(identity)
    }
}

/// Keeps one account's access token fresh until stopped.
struct Refresher {
    account_id: i64,
    stop: Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl Refresher {
    fn spawn(endpoint: Endpoint, store: Arc<storage::Store>, account_id: i64, grant: Grant) -> Self {
        let (stop, stopped) = bounded::<()>(1);
        let handle = thread::spawn(move || {
            let mut current = grant;
            let mut wait = current.refresh_in(endpoint.cfg.refresh_skew);
            while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(wait) {
                let params = [
                    ("grant_type", "refresh_token"),
                    ("refresh_token", current.refresh_token.as_str()),
                ];
                match endpoint.grant(&params, Some(&current)) {
                    Ok(fresh) => {
                        if let Err(err) = store.upsert_token(fresh.to_stored(account_id)) {
                            warn!(account_id, "cannot store refreshed token: {err:#}");
                        }
                        info!(account_id, "access token refreshed");
                        current = fresh;
                        wait = current.refresh_in(endpoint.cfg.refresh_skew);
                    }
                    Err(err) => {
                        warn!(account_id, "token refresh failed: {err:#}");
                        wait = REFRESH_RETRY;
                    }
                }
            }
            debug!(account_id, "refresh thread stopped");
        });
        Self {
            account_id,
            stop,
            handle,
        }
    }

    fn stop(self) {
        drop(self.stop);
        if self.handle.join().is_err() {
            warn!(account_id = self.account_id, "refresh thread panicked");
        }
    }
}

pub struct Flow {
    endpoint: Endpoint,
    store: Arc<storage::Store>,
    refresher: Mutex<Option<Refresher>>,
}

impl Flow {
    pub fn new(store: Arc<storage::Store>, cfg: Config) -> Result<Self> {
        if cfg.client_id.trim().is_empty() {
            bail!("auth: client id is required");
        }
        if cfg.user_agent.trim().is_empty() {
            bail!("auth: user agent is required");
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .context("auth: build http client")?;
        Ok(Self {
            endpoint: Endpoint {
                http,
                cfg: Arc::new(cfg),
            },
            store,
            refresher: Mutex::new(None),
        })
    }

    fn cfg(&self) -> &Config {
        &self.endpoint.cfg
    }

    /// Starts the callback server and returns the URL to open.
    pub fn begin(&self) -> Result<PendingLogin> {
        let verifier = random_token(64);
        let state = random_token(32);

        let redirect = Url::parse(&self.cfg().redirect_uri).context("auth: redirect uri")?;
        let host = redirect.host_str().unwrap_or("127.0.0.1");
        let port = redirect.port().unwrap_or(0);
        let server = Server::http(format!("{host}:{port}"))
            .map_err(|err| anyhow!("auth: listen on {host}:{port}: {err}"))?;
        // port 0 asks the OS for one; the redirect names the real one
        let redirect_uri = format!("http://{}{}", server.server_addr(), redirect.path());
        let browser_url = self.authorize_url(&redirect_uri, &state, &challenge(&verifier))?;

        let (code_tx, code) = bounded(1);
        let (shutdown, shutdown_rx) = bounded(1);
        thread::spawn(move || serve_callback(server, state, code_tx, shutdown_rx));
        debug!(%redirect_uri, "login callback server listening");

        Ok(PendingLogin {
            browser_url,
            redirect_uri,
            verifier,
            code,
            _shutdown: shutdown,
        })
    }

    fn authorize_url(&self, redirect_uri: &str, state: &str, challenge: &str) -> Result<String> {
        let mut url = Url::parse(AUTHORIZE_URL)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.cfg().client_id)
            .append_pair("response_type", "code")
            .append_pair("state", state)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("duration", "permanent")
            .append_pair("scope", &self.cfg().scopes.join(" "))
            .append_pair("code_challenge", challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url.into())
    }

    /// Waits for the browser, then stores the account and its tokens and
    /// starts refreshing them. Replaces any account logged in before.
    pub fn complete(&self, login: PendingLogin) -> Result<Account> {
        let timeout = self.cfg().login_timeout;
        let code = match login.code.recv_timeout(timeout) {
            Ok(code) => code?,
            Err(RecvTimeoutError::Timeout) => bail!(
                "auth: no authorization within {}",
                humantime::format_duration(timeout)
            ),
            Err(RecvTimeoutError::Disconnected) => bail!("auth: callback server stopped"),
        };
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", login.redirect_uri.as_str()),
            ("code_verifier", login.verifier.as_str()),
        ];
        let grant = self.endpoint.grant(&params, None)?;
        let identity = self.endpoint.identity(&grant)?;

        let now = Utc::now();
        let mut account = Account {
            id: 0,
            reddit_id: identity.id,
            display_name: identity.name.clone(),
            username: identity.name,
            created_at: now,
            updated_at: now,
        };
        account.id = self.store.upsert_account(account.clone())?;
        self.store.upsert_token(grant.to_stored(account.id))?;
        self.watch(account.id, grant);
        info!(username = %account.username, "logged in");
        Ok(account)
    }

    /// Picks a stored login back up.
    pub fn resume(&self, account: &Account, stored: Token) -> Result<()> {
        if stored.access_token.is_empty() || stored.refresh_token.is_empty() {
            bail!("auth: stored token incomplete");
        }
        self.watch(account.id, Grant::from_stored(stored));
        Ok(())
    }

    /// Stops refreshing; the stored token is left alone.
    pub fn close(&self) {
        if let Some(refresher) = self.refresher.lock().take() {
            refresher.stop();
        }
    }

    pub fn token_provider(&self, account_id: i64) -> Arc<dyn TokenProvider> {
        Arc::new(StoredToken {
            store: self.store.clone(),
            account_id,
        })
    }

    fn watch(&self, account_id: i64, grant: Grant) {
        let fresh = Refresher::spawn(self.endpoint.clone(), self.store.clone(), account_id, grant);
        if let Some(previous) = self.refresher.lock().replace(fresh) {
            previous.stop();
        }
    }
}

/// Reads the access token the refresh thread last stored.
struct StoredToken {
    store: Arc<storage::Store>,
    account_id: i64,
}

impl TokenProvider for StoredToken {
    fn token(&self) -> Result<OAuthToken> {
        let stored = self
            .store
            .get_token(self.account_id)?
            .ok_or(DataError::AuthRequired)?;
        Ok(OAuthToken {
            access_token: stored.access_token,
            token_type: stored.token_type,
            expires_at: Some(stored.expires_at.into()),
        })
    }
}

/// What one request to the callback server amounted to.
#[derive(Debug, PartialEq, Eq)]
enum Callback {
    /// Not a redirect at all, e.g. a favicon request.
    Ignored,
    Code(String),
    Refused(String),
}

fn read_callback(target: &str, state: &str) -> Callback {
    let Ok(url) = Url::parse("http://localhost").and_then(|base| base.join(target)) else {
        return Callback::Ignored;
    };
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    if params.is_empty() {
        return Callback::Ignored;
    }
    if params.get("state").map(String::as_str) != Some(state) {
        return Callback::Refused("state mismatch".into());
    }
    if let Some(error) = params.get("error") {
        return Callback::Refused(error.clone());
    }
    match params.get("code") {
        Some(code) if !code.is_empty() => Callback::Code(code.clone()),
        _ => Callback::Refused("no authorization code".into()),
    }
}

/// Answers requests until the redirect arrives or the login is dropped.
fn serve_callback(server: Server, state: String, done: Sender<Result<String>>, shutdown: Receiver<()>) {
    while let Err(TryRecvError::Empty) = shutdown.try_recv() {
        let request = match server.recv_timeout(CALLBACK_POLL) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(err) => {
                let _ = done.send(Err(anyhow!("auth: callback server: {err}")));
                return;
            }
        };
        let (reply, result) = match read_callback(request.url(), &state) {
            Callback::Ignored => {
                let _ = request.respond(Response::from_string("not found").with_status_code(404));
                continue;
            }
            Callback::Code(code) => (success_page(), Ok(code)),
            Callback::Refused(reason) => (
                Response::from_string(format!("rtv: login failed: {reason}")).with_status_code(400),
                Err(anyhow!("auth: authorization refused: {reason}")),
            ),
        };
        let _ = request.respond(reply);
        let _ = done.send(result);
        return;
    }
}

fn success_page() -> Response<Cursor<Vec<u8>>> {
    let page = Response::from_string(SUCCESS_PAGE.as_str());
    match Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
        Ok(header) => page.with_header(header),
        Err(()) => page,
    }
}

fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

fn challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
