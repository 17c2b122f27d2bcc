use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::{info, warn};

use crate::auth;
use crate::config;
use crate::data;
use crate::loader::Loader;
use crate::page::{self, Context, Exit};
use crate::reddit::{self, SortOption};
use crate::session;
use crate::storage;
use crate::submission::SubmissionPage;
use crate::subreddit::SubredditPage;
use crate::terminal::{Term, Ui};

/// Start-up choices from the command line. Anything set here wins over
/// the config file.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub subreddit: Option<String>,
    pub link: Option<String>,
    pub ascii: bool,
    pub non_persistent: bool,
    pub clear_auth: bool,
    pub config_file: Option<PathBuf>,
}

pub fn run(opts: Options) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: opts.config_file.clone(),
        ..config::LoadOptions::default()
    })
    .context("load config")?;

    let store = Arc::new(
        storage::Store::open(storage::Options {
            in_memory: opts.non_persistent || !cfg.history.persistent,
            ..storage::Options::default()
        })
        .context("open storage")?,
    );
    if opts.clear_auth {
        store.clear_auth().context("clear stored logins")?;
        info!("cleared stored logins");
    }

    let client = Arc::new(
        reddit::Client::new(
            None,
            reddit::ClientConfig {
                user_agent: cfg.reddit.user_agent.clone(),
                ..reddit::ClientConfig::default()
            },
        )
        .context("create reddit client")?,
    );

    let flow = if cfg.reddit.client_id.trim().is_empty() {
        info!("no reddit.client_id configured, browsing anonymously");
        None
    } else {
        Some(Arc::new(
            auth::Flow::new(store.clone(), auth::Config::from_reddit(&cfg.reddit))
                .context("set up login")?,
        ))
    };
    let session = session::Manager::new(store.clone(), flow, client.clone());
    if let Err(err) = session.resume() {
        warn!("cannot resume session: {err:#}");
    }

    let services = data::Services::reddit(client);
    let subreddit = opts
        .subreddit
        .clone()
        .unwrap_or_else(|| cfg.defaults.subreddit.clone());

    let mut term = Term::enter(opts.ascii || cfg.ui.ascii, cfg.ui.editor.clone())?;
    let result = {
        let mut ctx = Context {
            ui: &mut term as &mut dyn Ui,
            services: &services,
            session: &session,
            store: &store,
            loader: Loader::new(cfg.ui.loader_delay, cfg.ui.loader_interval),
            history_size: cfg.history.size,
        };
        browse(&mut ctx, &subreddit, opts.link.as_deref(), cfg.defaults.sort)
    };
    drop(term);
    session.close();
    result
}

/// Shows `link` first when given, then the subreddit until the user quits.
pub fn browse(
    ctx: &mut Context<'_>,
    subreddit: &str,
    link: Option<&str>,
    sort: SortOption,
) -> Result<()> {
    if let Some(link) = link {
        if let Some(mut thread) = SubmissionPage::open(link, SortOption::default(), ctx)? {
            if page::run(&mut thread, ctx)? == Exit::Quit {
                return Ok(());
            }
        }
    }
    let mut view = SubredditPage::new(subreddit, sort, ctx)?;
    page::run(&mut view, ctx)?;
    Ok(())
}
