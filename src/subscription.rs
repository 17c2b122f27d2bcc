use anyhow::Result;

use crate::content::{Item, ItemKind};
use crate::keymap::{Action, Mode};
use crate::loader::DEFAULT_MESSAGE;
use crate::page::{Context, Exit, Page, Step, View};
use crate::reddit::SortOption;
use crate::sequence::Sequence;

pub const TITLE: &str = "My Subscriptions";

/// The logged-in user's subreddits; selecting one hands its name back.
pub struct SubscriptionPage {
    page: Page,
}

impl SubscriptionPage {
    pub fn open(ctx: &mut Context<'_>) -> Result<Option<Self>> {
        let Some(content) = fetch(ctx)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            page: Page::new(Mode::Subscription, TITLE.to_string(), SortOption::default(), content),
        }))
    }
}

fn fetch(ctx: &mut Context<'_>) -> Result<Option<Sequence>> {
    let subreddits = ctx.load(DEFAULT_MESSAGE, |services| services.subreddits.subscriptions())?;
    Ok(subreddits.map(|subreddits| Sequence::listing(subreddits.iter().map(Item::subscription).collect())))
}

impl View for SubscriptionPage {
    fn page(&self) -> &Page {
        &self.page
    }

    fn page_mut(&mut self) -> &mut Page {
        &mut self.page
    }

    fn handle(&mut self, action: Action, ctx: &mut Context<'_>) -> Result<Step> {
        match action {
            Action::Refresh => self.reload(ctx)?,
            Action::Back => return Ok(Step::Exit(Exit::Back)),
            Action::Select => match self.page.selected().map(|item| &item.kind) {
                Some(ItemKind::Subscription(sub)) => {
                    return Ok(Step::Exit(Exit::Selected(sub.name.clone())));
                }
                _ => ctx.ui.flash()?,
            },
            _ => {}
        }
        Ok(Step::Continue)
    }

    fn reload(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        if let Some(content) = fetch(ctx)? {
            self.page.replace(content);
        }
        Ok(())
    }
}
