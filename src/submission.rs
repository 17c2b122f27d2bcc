use anyhow::Result;
use chrono::Utc;
use tracing::debug;

use crate::content::{ItemKind, UrlType};
use crate::keymap::{Action, Mode};
use crate::loader::DEFAULT_MESSAGE;
use crate::navigator::Navigator;
use crate::page::{Context, Exit, Page, Step, View};
use crate::reddit::{self, SortOption};
use crate::sequence::{tree_from_flat, Sequence};

/// A submission with its comment tree.
pub struct SubmissionPage {
    page: Page,
    article: String,
    link: String,
}

impl SubmissionPage {
    /// Loads the thread behind `url`. `None` when the link is not a thread
    /// or the download failed; the user has been told either way.
    pub fn open(url: &str, sort: SortOption, ctx: &mut Context<'_>) -> Result<Option<Self>> {
        let Some(article) = reddit::article_id_from_url(url) else {
            ctx.ui.notify("Not a reddit thread")?;
            return Ok(None);
        };
        let Some(payload) = ctx.load(DEFAULT_MESSAGE, |services| {
            services.comments.load_thread(&article, sort)
        })?
        else {
            return Ok(None);
        };
        let link = payload.post.name.clone();
        let title = payload.post.title.clone();
        let content = Sequence::from_post_comments(&payload, Utc::now());
        Ok(Some(Self {
            page: Page::new(Mode::Submission, title, sort, content),
            article,
            link,
        }))
    }

    fn toggle(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        let index = self.page.nav.absolute_index();
        let children = match self.page.content.get(index).map(|item| &item.kind) {
            Ok(ItemKind::MoreComments { children, .. }) => Some(children.clone()),
            Ok(ItemKind::Comment(_) | ItemKind::HiddenComment { .. }) => None,
            _ => return ctx.ui.flash(),
        };
        match children {
            Some(children) => {
                let (link, sort) = (&self.link, self.page.sort);
                let Some(things) = ctx.load(DEFAULT_MESSAGE, |services| {
                    services.comments.load_more(link, &children, sort)
                })?
                else {
                    return Ok(());
                };
                debug!(count = things.len(), "expanding more comments");
                self.page
                    .content
                    .expand_more(index, tree_from_flat(things, Utc::now()))?;
            }
            None => self.page.content.toggle(index),
        }
        if self.page.nav.inverted {
            // the item may have shrunk under the cursor: draw from it again
            self.page.nav = Navigator {
                page_index: index,
                cursor_index: 0,
                inverted: false,
            };
        }
        Ok(())
    }

    fn open_link(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        let url = match self.page.selected().map(|item| &item.kind) {
            Some(ItemKind::Submission(post)) if post.url_type == UrlType::External => {
                post.url.clone()
            }
            Some(ItemKind::Submission(post)) => post.permalink.clone(),
            Some(ItemKind::Comment(comment)) => comment.permalink.clone(),
            _ => String::new(),
        };
        if url.is_empty() {
            return ctx.ui.flash();
        }
        ctx.visit(&url)
    }

    fn reply(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        if !ctx.require_login()? {
            return Ok(());
        }
        let Some(item) = self.page.selected() else {
            return ctx.ui.flash();
        };
        let (author, quoted) = match &item.kind {
            ItemKind::Submission(post) => (post.author.clone(), post.text.clone()),
            ItemKind::Comment(comment) => (comment.author.clone(), comment.body.clone()),
            _ => return ctx.ui.flash(),
        };
        let parent = item.id.clone();
        let mut draft = format!(
            "# Replying to {author}\n# Lines starting with # are ignored. Save an empty file to cancel.\n"
        );
        for line in quoted.lines() {
            draft.push_str("# | ");
            draft.push_str(line);
            draft.push('\n');
        }
        let Some(text) = ctx.ui.edit(&draft)? else {
            ctx.ui.notify("Canceled")?;
            return Ok(());
        };
        if ctx
            .load("Posting", |services| services.interactions.reply(&parent, &text))?
            .is_some()
        {
            self.reload(ctx)?;
        }
        Ok(())
    }
}

impl View for SubmissionPage {
    fn page(&self) -> &Page {
        &self.page
    }

    fn page_mut(&mut self) -> &mut Page {
        &mut self.page
    }

    fn handle(&mut self, action: Action, ctx: &mut Context<'_>) -> Result<Step> {
        match action {
            Action::ToggleComment => self.toggle(ctx)?,
            Action::Back => return Ok(Step::Exit(Exit::Back)),
            Action::Refresh => self.reload(ctx)?,
            Action::OpenLink => self.open_link(ctx)?,
            Action::Reply => self.reply(ctx)?,
            _ => {}
        }
        Ok(Step::Continue)
    }

    fn reload(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        let (article, sort) = (&self.article, self.page.sort);
        if let Some(payload) = ctx.load(DEFAULT_MESSAGE, |services| {
            services.comments.load_thread(article, sort)
        })? {
            self.page.title = payload.post.title.clone();
            self.page
                .replace(Sequence::from_post_comments(&payload, Utc::now()));
        }
        Ok(())
    }

    /// Comments only; the submission itself stays read-only here.
    fn can_modify(&self, index: i64) -> bool {
        index >= 0
    }
}
