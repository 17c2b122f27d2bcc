use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};

use crate::content::{Item, ItemKind, Post, UrlType};
use crate::data::{FeedRequest, PostListing};
use crate::keymap::{Action, Mode};
use crate::loader::DEFAULT_MESSAGE;
use crate::page::{self, Context, Exit, Page, Step, View};
use crate::reddit::{ListingSource, SortOption};
use crate::sequence::Sequence;
use crate::submission::SubmissionPage;
use crate::subscription::SubscriptionPage;

/// Resolves what the user typed at the subreddit prompt into a listing
/// source and the title to show for it.
pub fn parse_target(
    input: &str,
    username: Option<&str>,
) -> Result<(ListingSource, String), &'static str> {
    let name = input.trim().trim_start_matches('/');
    let name = name.strip_prefix("r/").unwrap_or(name);
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err("Invalid subreddit");
    }
    if name.eq_ignore_ascii_case("front") {
        return Ok((ListingSource::Front, "Front Page".to_string()));
    }
    if name.eq_ignore_ascii_case("me") {
        return match username {
            Some(user) => Ok((ListingSource::User(user.to_string()), format!("/u/{user}"))),
            None => Err("Not logged in"),
        };
    }
    if let Some(user) = name.strip_prefix("u/").or_else(|| name.strip_prefix("user/")) {
        if user.is_empty() {
            return Err("Invalid user");
        }
        return Ok((ListingSource::User(user.to_string()), format!("/u/{user}")));
    }
    Ok((ListingSource::Subreddit(name.to_string()), format!("/r/{name}")))
}

/// Where new submissions may go: a single, real subreddit.
fn postable(source: &ListingSource) -> Option<&str> {
    match source {
        ListingSource::Subreddit(name) if !name.eq_ignore_ascii_case("all") && !name.contains('+') => {
            Some(name)
        }
        _ => None,
    }
}

/// Splits an edited draft into title and text.
pub fn split_post(draft: &str) -> Option<(String, String)> {
    let draft = draft.trim_start();
    let (title, text) = draft.split_once('\n').unwrap_or((draft, ""));
    let title = title.trim();
    if title.is_empty() {
        return None;
    }
    Some((title.to_string(), text.trim().to_string()))
}

fn listing_items(listing: &PostListing) -> Vec<Item> {
    let now = Utc::now();
    listing
        .children
        .iter()
        .map(|thing| Item::listing(&thing.data, now))
        .collect()
}

/// A feed of submissions: the front page, a subreddit, a user, or search
/// results within one of those.
pub struct SubredditPage {
    page: Page,
    request: FeedRequest,
    after: Option<String>,
}

impl SubredditPage {
    /// Opens `name`, falling back to the front page when it cannot be
    /// resolved. A failed download leaves the page empty.
    pub fn new(name: &str, sort: SortOption, ctx: &mut Context<'_>) -> Result<Self> {
        let username = ctx.session.username();
        let (source, title) = match parse_target(name, username.as_deref()) {
            Ok(target) => target,
            Err(message) => {
                ctx.ui.notify(message)?;
                (ListingSource::Front, "Front Page".to_string())
            }
        };
        let mut page = Self {
            page: Page::new(Mode::Subreddit, title, sort, Sequence::default()),
            request: FeedRequest::new(source, sort),
            after: None,
        };
        page.reload(ctx)?;
        Ok(page)
    }

    fn fetch(
        &mut self,
        request: FeedRequest,
        title: String,
        ctx: &mut Context<'_>,
    ) -> Result<bool> {
        let Some(listing) = ctx.load(DEFAULT_MESSAGE, |services| services.feed.load(&request))?
        else {
            return Ok(false);
        };
        info!(title = %title, count = listing.children.len(), "listing loaded");
        self.page.replace(Sequence::listing(listing_items(&listing)));
        self.page.title = title;
        self.page.sort = request.sort;
        self.after = listing.after;
        self.request = request;
        Ok(true)
    }

    /// Switches to another subreddit; on failure the current one stays.
    pub fn switch(&mut self, name: &str, ctx: &mut Context<'_>) -> Result<()> {
        let username = ctx.session.username();
        match parse_target(name, username.as_deref()) {
            Ok((source, title)) => {
                self.fetch(FeedRequest::new(source, self.page.sort), title, ctx)?;
                Ok(())
            }
            Err(message) => {
                ctx.ui.notify(message)?;
                Ok(())
            }
        }
    }

    fn prompt_subreddit(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        if let Some(name) = ctx.ui.prompt("Enter Subreddit: /r/")? {
            self.switch(&name, ctx)?;
        }
        Ok(())
    }

    fn search(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        let Some(query) = ctx.ui.prompt("Search: ")? else {
            return Ok(());
        };
        let request = FeedRequest {
            query: Some(query.clone()),
            ..FeedRequest::new(self.request.source.clone(), self.page.sort)
        };
        let base = self.page.title.split(" - search: ").next().unwrap_or_default().to_string();
        self.fetch(request, format!("{base} - search: {query}"), ctx)?;
        Ok(())
    }

    fn open_thread(&mut self, url: &str, ctx: &mut Context<'_>) -> Result<Step> {
        let Some(mut thread) = SubmissionPage::open(url, SortOption::default(), ctx)? else {
            return Ok(Step::Continue);
        };
        match page::run(&mut thread, ctx)? {
            Exit::Quit => Ok(Step::Exit(Exit::Quit)),
            _ => Ok(Step::Continue),
        }
    }

    fn selected_post(&self) -> Option<Post> {
        match self.page.selected().map(|item| &item.kind) {
            Some(ItemKind::Listing(post)) => Some(post.clone()),
            _ => None,
        }
    }

    fn open_submission(&mut self, ctx: &mut Context<'_>) -> Result<Step> {
        let Some(post) = self.selected_post() else {
            ctx.ui.flash()?;
            return Ok(Step::Continue);
        };
        ctx.remember(&post.url);
        self.open_thread(&post.permalink, ctx)
    }

    fn open_link(&mut self, ctx: &mut Context<'_>) -> Result<Step> {
        let Some(post) = self.selected_post() else {
            ctx.ui.flash()?;
            return Ok(Step::Continue);
        };
        match post.url_type {
            UrlType::External => {
                ctx.visit(&post.url)?;
                Ok(Step::Continue)
            }
            UrlType::SelfPost => {
                ctx.remember(&post.url);
                self.open_thread(&post.permalink, ctx)
            }
            UrlType::XPost => {
                ctx.remember(&post.url);
                self.open_thread(&post.url, ctx)
            }
        }
    }

    fn post(&mut self, ctx: &mut Context<'_>) -> Result<Step> {
        if !ctx.require_login()? {
            return Ok(Step::Continue);
        }
        let Some(subreddit) = postable(&self.request.source).map(str::to_string) else {
            ctx.ui.notify(&format!("Can't post to {}", self.page.title))?;
            return Ok(Step::Continue);
        };
        let draft = format!(
            "# Posting to /r/{subreddit}\n# The first line is the title, the rest is the text.\n# Lines starting with # are ignored. Save an empty file to cancel.\n"
        );
        let Some((title, text)) = ctx.ui.edit(&draft)?.as_deref().and_then(split_post) else {
            ctx.ui.notify("Canceled")?;
            return Ok(Step::Continue);
        };
        let Some(url) = ctx.load("Posting", |services| {
            services.interactions.submit(&subreddit, &title, &text)
        })?
        else {
            return Ok(Step::Continue);
        };
        debug!(%url, "submitted");
        let step = self.open_thread(&url, ctx)?;
        if step == Step::Continue {
            self.reload(ctx)?;
        }
        Ok(step)
    }

    fn subscriptions(&mut self, ctx: &mut Context<'_>) -> Result<Step> {
        if !ctx.require_login()? {
            return Ok(Step::Continue);
        }
        let Some(mut subscriptions) = SubscriptionPage::open(ctx)? else {
            return Ok(Step::Continue);
        };
        match page::run(&mut subscriptions, ctx)? {
            Exit::Quit => return Ok(Step::Exit(Exit::Quit)),
            Exit::Selected(name) => self.switch(&name, ctx)?,
            Exit::Back => {}
        }
        Ok(Step::Continue)
    }
}

impl View for SubredditPage {
    fn page(&self) -> &Page {
        &self.page
    }

    fn page_mut(&mut self) -> &mut Page {
        &mut self.page
    }

    fn handle(&mut self, action: Action, ctx: &mut Context<'_>) -> Result<Step> {
        match action {
            Action::Refresh => self.reload(ctx)?,
            Action::Search => self.search(ctx)?,
            Action::PromptSubreddit => self.prompt_subreddit(ctx)?,
            Action::OpenSubmission => return self.open_submission(ctx),
            Action::OpenLink => return self.open_link(ctx),
            Action::Post => return self.post(ctx),
            Action::Subscriptions => return self.subscriptions(ctx),
            _ => {}
        }
        Ok(Step::Continue)
    }

    fn reload(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        let request = FeedRequest {
            sort: self.page.sort,
            after: None,
            ..self.request.clone()
        };
        let title = self.page.title.clone();
        self.fetch(request, title, ctx)?;
        Ok(())
    }

    fn load_more(&mut self, ctx: &mut Context<'_>) -> Result<bool> {
        let Some(after) = self.after.clone() else {
            return Ok(false);
        };
        let request = self.request.next_page(&after);
        let Some(listing) = ctx.load(DEFAULT_MESSAGE, |services| services.feed.load(&request))?
        else {
            return Ok(false);
        };
        debug!(%after, count = listing.children.len(), "next chunk");
        self.page.content.extend(listing_items(&listing));
        self.after = listing.after;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_targets() {
        assert_eq!(
            parse_target("/r/rust", None).unwrap(),
            (ListingSource::Subreddit("rust".into()), "/r/rust".into())
        );
        assert_eq!(parse_target("front", None).unwrap().0, ListingSource::Front);
        assert_eq!(
            parse_target("linux+rust", None).unwrap().0,
            ListingSource::Subreddit("linux+rust".into())
        );
        assert_eq!(
            parse_target("u/spez", None).unwrap(),
            (ListingSource::User("spez".into()), "/u/spez".into())
        );
        assert_eq!(
            parse_target("me", Some("alice")).unwrap().0,
            ListingSource::User("alice".into())
        );
        assert_eq!(parse_target("me", None), Err("Not logged in"));
        assert_eq!(parse_target("  ", None), Err("Invalid subreddit"));
    }

    #[test]
    fn posting_needs_a_single_subreddit() {
        assert_eq!(postable(&ListingSource::Subreddit("rust".into())), Some("rust"));
        assert_eq!(postable(&ListingSource::Subreddit("all".into())), None);
        assert_eq!(postable(&ListingSource::Subreddit("a+b".into())), None);
        assert_eq!(postable(&ListingSource::Front), None);
        assert_eq!(postable(&ListingSource::User("me".into())), None);
    }

    #[test]
    fn draft_first_line_is_title() {
        assert_eq!(
            split_post("My title\nline one\nline two\n"),
            Some(("My title".into(), "line one\nline two".into()))
        );
        assert_eq!(split_post("Only a title"), Some(("Only a title".into(), String::new())));
        assert_eq!(split_post("\n\n"), None);
    }
}
