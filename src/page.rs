use anyhow::Result;
use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;
use tracing::{debug, info, warn};

use crate::content::{Item, ItemKind, Likes};
use crate::data::Services;
use crate::error;
use crate::keymap::{self, Action, Keymap, Mode};
use crate::layout;
use crate::loader::{LoadError, Loader};
use crate::navigator::{Direction, Navigator};
use crate::reddit::SortOption;
use crate::sequence::{DrawUnit, Sequence};
use crate::session;
use crate::storage::Store;
use crate::terminal::{is_interrupt, level_color, Glyphs, Ui};

/// Columns left of the content: the cursor marker and the comment bar.
pub const GUTTER: u16 = 2;

const NOT_LOGGED_IN: &str = "Not logged in";

/// Everything a page needs besides its own content.
pub struct Context<'a> {
    pub ui: &'a mut dyn Ui,
    pub services: &'a Services,
    pub session: &'a session::Manager,
    pub store: &'a Store,
    pub loader: Loader,
    pub history_size: usize,
}

impl Context<'_> {
    /// Runs `job` behind the loading overlay. Failures become a notification
    /// and `None`; so does an interrupt, silently.
    pub fn load<T>(
        &mut self,
        message: &str,
        job: impl FnOnce(&Services) -> Result<T>,
    ) -> Result<Option<T>> {
        let surface = self.ui.loading_surface();
        let services = self.services;
        match self.loader.run(surface, message, || job(services)) {
            Ok(value) => Ok(Some(value)),
            Err(LoadError::Interrupted) => {
                debug!(message, "load interrupted");
                Ok(None)
            }
            Err(LoadError::Failed(err)) => {
                warn!(message, "load failed: {err:#}");
                self.ui.notify(error::user_message(&err))?;
                Ok(None)
            }
        }
    }

    /// Notifies and returns false when nobody is logged in.
    pub fn require_login(&mut self) -> Result<bool> {
        if self.session.is_logged_in() {
            return Ok(true);
        }
        self.ui.notify(NOT_LOGGED_IN)?;
        Ok(false)
    }

    /// Opens `url` in the browser and marks it seen.
    pub fn visit(&mut self, url: &str) -> Result<()> {
        self.ui.open_browser(url)?;
        self.remember(url);
        Ok(())
    }

    pub fn remember(&self, url: &str) {
        if let Err(err) = self.store.add_history(url, self.history_size) {
            warn!("cannot record history: {err:#}");
        }
    }
}

/// How a page was left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    Back,
    Quit,
    Selected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    Exit(Exit),
}

/// State shared by every mode.
pub struct Page {
    pub mode: Mode,
    pub title: String,
    pub sort: SortOption,
    pub content: Sequence,
    pub nav: Navigator,
    keymap: Keymap<Action>,
    visible: usize,
}

impl Page {
    pub fn new(mode: Mode, title: String, sort: SortOption, content: Sequence) -> Self {
        let nav = Navigator::new(content.lower_bound());
        Self {
            mode,
            title,
            sort,
            content,
            nav,
            keymap: keymap::for_mode(mode),
            visible: 0,
        }
    }

    /// Swaps in freshly loaded content and puts the cursor back on top.
    pub fn replace(&mut self, content: Sequence) {
        self.nav = Navigator::new(content.lower_bound());
        self.content = content;
        self.visible = 0;
    }

    pub fn selected(&self) -> Option<&Item> {
        self.content.get(self.nav.absolute_index()).ok()
    }

    /// Items drawn by the last frame.
    pub fn visible(&self) -> usize {
        self.visible
    }
}

/// Mode specific behavior on top of [`Page`].
pub trait View {
    fn page(&self) -> &Page;
    fn page_mut(&mut self) -> &mut Page;

    /// Actions the shared loop does not handle itself.
    fn handle(&mut self, action: Action, ctx: &mut Context<'_>) -> Result<Step>;

    /// Fetches the content again with the page's current sort.
    fn reload(&mut self, ctx: &mut Context<'_>) -> Result<()>;

    /// Appends the next chunk when the cursor runs off the end. Returns true
    /// when something was added.
    fn load_more(&mut self, _ctx: &mut Context<'_>) -> Result<bool> {
        Ok(false)
    }

    /// Whether the item at `index` may be edited or deleted by its author.
    fn can_modify(&self, _index: i64) -> bool {
        true
    }
}

/// Draws and dispatches keys until the page is left.
pub fn run<V: View + ?Sized>(view: &mut V, ctx: &mut Context<'_>) -> Result<Exit> {
    info!(mode = ?view.page().mode, title = %view.page().title, "page opened");
    loop {
        draw(view.page_mut(), ctx)?;
        let Some(key) = ctx.ui.next_key()? else {
            continue;
        };
        if is_interrupt(&key) {
            return Ok(Exit::Quit);
        }
        let Some(action) = view.page().keymap.resolve(key.code) else {
            continue;
        };
        debug!(?action, "dispatch");
        let step = match dispatch(view, action, ctx) {
            Ok(step) => step,
            Err(err) => {
                warn!(?action, "action failed: {err:#}");
                ctx.ui.notify(error::user_message(&err))?;
                Step::Continue
            }
        };
        if let Step::Exit(exit) = step {
            info!(mode = ?view.page().mode, ?exit, "page closed");
            return Ok(exit);
        }
    }
}

fn dispatch<V: View + ?Sized>(view: &mut V, action: Action, ctx: &mut Context<'_>) -> Result<Step> {
    match action {
        Action::ExitPrompt => {
            if ctx.ui.confirm("Do you really want to quit? (y/n)")? {
                return Ok(Step::Exit(Exit::Quit));
            }
        }
        Action::ForceExit => return Ok(Step::Exit(Exit::Quit)),
        Action::Help => {
            ctx.ui.notify(&keymap::help_text(view.page().mode).join("\n"))?;
        }
        Action::Sort(sort) => {
            view.page_mut().sort = sort;
            view.reload(ctx)?;
        }
        Action::MoveUp => move_selection(view, Direction::Up, Stride::Item, ctx)?,
        Action::MoveDown => move_selection(view, Direction::Down, Stride::Item, ctx)?,
        Action::PageUp => move_selection(view, Direction::Up, Stride::Page, ctx)?,
        Action::PageDown => move_selection(view, Direction::Down, Stride::Page, ctx)?,
        Action::Upvote => vote(view, Likes::Up, ctx)?,
        Action::Downvote => vote(view, Likes::Down, ctx)?,
        Action::Login => login(view, ctx)?,
        Action::Delete => delete(view, ctx)?,
        Action::Edit => edit(view, ctx)?,
        Action::Inbox => inbox(ctx)?,
        other => return view.handle(other, ctx),
    }
    Ok(Step::Continue)
}

/// One key's worth of movement: a single item or a whole page.
#[derive(Debug, Clone, Copy)]
enum Stride {
    Item,
    Page,
}

fn try_move(page: &mut Page, dir: Direction, stride: Stride) -> Result<bool, error::Error> {
    let outcome = match stride {
        Stride::Item => page.nav.move_cursor(dir, page.visible, &page.content),
        Stride::Page => page.nav.move_page(dir, page.visible, &page.content),
    };
    outcome.into_result()
}

/// Moves the selection; past the end of a listing the next chunk is loaded
/// and the move retried once.
fn move_selection<V: View + ?Sized>(
    view: &mut V,
    dir: Direction,
    stride: Stride,
    ctx: &mut Context<'_>,
) -> Result<()> {
    let mut attempt = try_move(view.page_mut(), dir, stride);
    if attempt.is_err() && dir == Direction::Down && view.load_more(ctx)? {
        attempt = try_move(view.page_mut(), dir, stride);
    }
    match attempt {
        Ok(_) => Ok(()),
        Err(err) => {
            debug!(?dir, ?stride, "{err}");
            ctx.ui.flash()
        }
    }
}

fn vote<V: View + ?Sized>(view: &mut V, requested: Likes, ctx: &mut Context<'_>) -> Result<()> {
    if !ctx.require_login()? {
        return Ok(());
    }
    let index = view.page().nav.absolute_index();
    let (id, target) = match view.page().content.get(index) {
        Ok(item) if item.votable() => (item.id.clone(), item.likes.toggled(requested)),
        _ => return ctx.ui.flash(),
    };
    if ctx
        .load("Voting", |services| services.interactions.vote(&id, target.direction()))?
        .is_some()
    {
        if let Ok(item) = view.page_mut().content.get_mut(index) {
            item.apply_vote(target);
        }
    }
    Ok(())
}

fn login<V: View + ?Sized>(view: &mut V, ctx: &mut Context<'_>) -> Result<()> {
    if ctx.session.is_logged_in() {
        if ctx.ui.confirm("Log out? (y/n)")? {
            ctx.session.logout()?;
            ctx.ui.notify("Logged out")?;
            view.reload(ctx)?;
        }
        return Ok(());
    }
    if !ctx.session.can_login() {
        ctx.ui.notify("Login unavailable: set reddit.client_id")?;
        return Ok(());
    }
    let login = ctx.session.begin_login()?;
    ctx.ui.open_browser(&login.browser_url)?;
    let session = ctx.session;
    if let Some(account) = ctx.load("Waiting for authorization", |_| session.complete_login(login))? {
        ctx.ui.notify(&format!("Welcome {}", account.username))?;
        view.reload(ctx)?;
    }
    Ok(())
}

/// The selected item's fullname, when the logged-in user wrote it.
fn own_selection<V: View + ?Sized>(view: &V, ctx: &mut Context<'_>) -> Result<Option<(i64, String)>> {
    if !ctx.require_login()? {
        return Ok(None);
    }
    let username = ctx.session.username();
    let index = view.page().nav.absolute_index();
    let owned = view
        .page()
        .content
        .get(index)
        .ok()
        .filter(|item| item.author().is_some() && item.author() == username.as_deref())
        .filter(|_| view.can_modify(index))
        .map(|item| (index, item.id.clone()));
    if owned.is_none() {
        ctx.ui.flash()?;
    }
    Ok(owned)
}

fn delete<V: View + ?Sized>(view: &mut V, ctx: &mut Context<'_>) -> Result<()> {
    let Some((_, id)) = own_selection(view, ctx)? else {
        return Ok(());
    };
    if !ctx.ui.confirm("Are you sure you want to delete this? (y/n)")? {
        return Ok(());
    }
    if ctx
        .load("Deleting", |services| services.interactions.delete(&id))?
        .is_some()
    {
        ctx.ui.notify("Deleted")?;
        view.reload(ctx)?;
    }
    Ok(())
}

fn edit<V: View + ?Sized>(view: &mut V, ctx: &mut Context<'_>) -> Result<()> {
    let Some((index, id)) = own_selection(view, ctx)? else {
        return Ok(());
    };
    let Ok(item) = view.page().content.get(index) else {
        return Ok(());
    };
    let Some(current) = item.text().map(str::to_string) else {
        return ctx.ui.flash();
    };
    let kind = if item.is_comment() { "comment" } else { "submission" };
    let draft = format!(
        "# Editing your {kind}\n# Lines starting with # are ignored. Save an empty file to cancel.\n{current}"
    );
    let Some(text) = ctx.ui.edit(&draft)? else {
        ctx.ui.notify("Canceled")?;
        return Ok(());
    };
    if text == current {
        return Ok(());
    }
    if ctx
        .load("Editing", |services| services.interactions.edit(&id, &text))?
        .is_some()
    {
        if let Ok(item) = view.page_mut().content.get_mut(index) {
            item.set_text(&text);
        }
    }
    Ok(())
}

fn inbox(ctx: &mut Context<'_>) -> Result<()> {
    if !ctx.require_login()? {
        return Ok(());
    }
    if let Some(unread) = ctx.load("Checking inbox", |services| services.interactions.unread_count())? {
        let message = match unread {
            0 => "No new messages".to_string(),
            1 => "You have 1 new message".to_string(),
            n => format!("You have {n} new messages"),
        };
        ctx.ui.notify(&message)?;
    }
    Ok(())
}

/// One frame: header, then the planned items. Leaves the navigator settled
/// for the current viewport.
pub fn draw(page: &mut Page, ctx: &mut Context<'_>) -> Result<()> {
    let user = ctx
        .session
        .username()
        .unwrap_or_else(|| NOT_LOGGED_IN.to_string());
    let glyphs = ctx.ui.glyphs();
    let store = ctx.store;
    let seen = |url: &str| store.in_history(url).unwrap_or(false);
    ctx.ui
        .draw(&mut |frame: &mut Frame<'_>| render(frame, page, &user, glyphs, &seen))
}

fn render(
    frame: &mut Frame<'_>,
    page: &mut Page,
    user: &str,
    glyphs: &Glyphs,
    seen: &dyn Fn(&str) -> bool,
) {
    let area = frame.size();
    if area.height == 0 || area.width == 0 {
        page.visible = 0;
        return;
    }
    let header = Rect { height: 1, ..area };
    frame.render_widget(
        Paragraph::new(Span::styled(
            page.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        header,
    );
    frame.render_widget(
        Paragraph::new(Span::styled(user.to_string(), Style::default().fg(Color::Cyan)))
            .alignment(Alignment::Right),
        header,
    );

    let body = Rect {
        y: area.y + 1,
        height: area.height - 1,
        ..area
    };
    let width = body.width.saturating_sub(GUTTER) as usize;
    let plan = layout::settle(&page.content, &mut page.nav, body.height as usize, width);
    page.visible = plan.len();
    if plan.is_empty() {
        if page.content.is_empty() && body.height > 0 {
            frame.render_widget(
                Paragraph::new("(empty)").style(Style::default().fg(Color::DarkGray)),
                Rect { height: 1, ..body },
            );
        }
        return;
    }

    for (position, placement) in plan.placements.iter().enumerate() {
        let selected = position == page.nav.cursor_index;
        let unit = &placement.unit;
        let lines = item_lines(unit, glyphs, seen);
        let shown = if placement.from_bottom {
            &lines[lines.len().saturating_sub(placement.height)..]
        } else {
            &lines[..placement.height.min(lines.len())]
        };
        let top = body.y + placement.top as u16;
        let height = shown.len() as u16;
        let offset = unit.offset() as u16;
        let text_x = body.x + GUTTER + offset;
        if text_x < body.x + body.width {
            frame.render_widget(
                Paragraph::new(shown.to_vec()),
                Rect::new(text_x, top, body.x + body.width - text_x, height),
            );
        }
        if unit.item.is_comment() {
            let bar_x = body.x + GUTTER - 1 + offset;
            if bar_x < body.x + body.width {
                let bar: Vec<Line<'static>> = (0..height)
                    .map(|_| {
                        Line::from(Span::styled(
                            glyphs.bar,
                            Style::default().fg(level_color(unit.item.level)),
                        ))
                    })
                    .collect();
                frame.render_widget(Paragraph::new(bar), Rect::new(bar_x, top, 1, height));
            }
        }
        if selected {
            let marker: Vec<Line<'static>> = (0..height)
                .map(|_| Line::from(Span::styled(" ", Style::default().add_modifier(Modifier::REVERSED))))
                .collect();
            frame.render_widget(Paragraph::new(marker), Rect::new(body.x, top, 1, height));
        }
    }
}

fn vote_span(likes: Likes, glyphs: &Glyphs) -> Span<'static> {
    match likes {
        Likes::Up => Span::styled(glyphs.upvote, Style::default().fg(Color::Green)),
        Likes::Down => Span::styled(glyphs.downvote, Style::default().fg(Color::Red)),
        Likes::None => Span::raw(glyphs.neutral),
    }
}

fn flag(on: bool, text: &'static str, style: Style) -> Option<Span<'static>> {
    on.then(|| Span::styled(text, style))
}

/// Exactly `row_span` lines for one item.
fn item_lines(unit: &DrawUnit<'_>, glyphs: &Glyphs, seen: &dyn Fn(&str) -> bool) -> Vec<Line<'static>> {
    let item = unit.item;
    let wrapped = &unit.wrapped;
    let secondary = Style::default().fg(Color::DarkGray);
    let gold = Style::default().fg(Color::Yellow);
    let mut lines: Vec<Line<'static>> = Vec::with_capacity(wrapped.row_span);
    match &item.kind {
        ItemKind::Listing(post) => {
            let mut title = Style::default().add_modifier(Modifier::BOLD);
            if seen(&post.url) {
                title = title.fg(Color::Magenta);
            }
            lines.extend(wrapped.title.iter().map(|row| Line::from(Span::styled(row.clone(), title))));
            lines.push(Line::from(Span::styled(
                post.display_url(),
                Style::default().fg(Color::Blue).add_modifier(Modifier::UNDERLINED),
            )));
            let mut meta = vec![
                Span::styled(post.created.clone(), secondary),
                Span::raw(" "),
                Span::styled(post.author.clone(), Style::default().fg(Color::Cyan)),
                Span::raw(" "),
                Span::styled(format!("/r/{}", post.subreddit), Style::default().fg(Color::Yellow)),
            ];
            meta.extend(flag(post.gilded, " ", gold));
            meta.extend(flag(post.gilded, glyphs.gilded, gold));
            meta.extend(flag(post.nsfw, " NSFW", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)));
            lines.push(Line::from(meta));
            lines.push(Line::from(vec![
                vote_span(item.likes, glyphs),
                Span::raw(format!("{} {} comments", post.score, post.comments)),
            ]));
        }
        ItemKind::Submission(post) => {
            let title = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
            lines.extend(wrapped.title.iter().map(|row| Line::from(Span::styled(row.clone(), title))));
            lines.push(Line::from(Span::styled(
                post.display_url(),
                Style::default().fg(Color::Blue).add_modifier(Modifier::UNDERLINED),
            )));
            let mut meta = vec![
                Span::styled(post.author.clone(), Style::default().fg(Color::Green)),
                Span::raw(" "),
                Span::styled(post.created.clone(), secondary),
                Span::raw(" "),
                Span::styled(format!("/r/{}", post.subreddit), Style::default().fg(Color::Yellow)),
            ];
            meta.extend(flag(post.edited, " (edit)", secondary));
            meta.extend(flag(post.gilded, " ", gold));
            meta.extend(flag(post.gilded, glyphs.gilded, gold));
            lines.push(Line::from(meta));
            lines.push(Line::default());
            lines.extend(wrapped.body.iter().map(|row| Line::from(row.clone())));
            lines.push(Line::default());
            lines.push(Line::from(vec![
                vote_span(item.likes, glyphs),
                Span::raw(format!("{} {} comments", post.score, post.comments)),
            ]));
        }
        ItemKind::Comment(comment) => {
            let author = if comment.is_submitter {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Cyan)
            };
            let mut meta = vec![
                Span::styled(comment.author.clone(), author),
                Span::raw(" "),
                vote_span(item.likes, glyphs),
                Span::raw(format!("{} pts ", comment.score)),
                Span::styled(comment.created.clone(), secondary),
            ];
            meta.extend(flag(comment.edited, " (edit)", secondary));
            meta.extend(flag(comment.gilded, " ", gold));
            meta.extend(flag(comment.gilded, glyphs.gilded, gold));
            lines.push(Line::from(meta));
            lines.extend(wrapped.body.iter().map(|row| Line::from(row.clone())));
        }
        ItemKind::MoreComments { count, .. } => {
            lines.push(Line::from(Span::styled(
                format!("[+] more comments ({count})"),
                Style::default().add_modifier(Modifier::BOLD),
            )));
        }
        ItemKind::HiddenComment { count } => {
            lines.push(Line::from(Span::styled(
                format!("[+] comment folded ({count} hidden)"),
                Style::default().add_modifier(Modifier::BOLD),
            )));
        }
        ItemKind::Subscription(sub) => {
            lines.push(Line::from(Span::styled(
                format!("/r/{}", sub.name),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            lines.extend(wrapped.title.iter().map(|row| Line::from(row.clone())));
        }
    }
    lines.resize(wrapped.row_span, Line::default());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::fixtures;

    fn texts(lines: &[Line<'_>]) -> Vec<String> {
        lines
            .iter()
            .map(|line| line.spans.iter().map(|span| span.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn line_count_matches_row_span() {
        let seq = Sequence::thread(
            fixtures::submission("A title", "Some body text\n\nwith paragraphs"),
            vec![crate::sequence::TreeNode::leaf(fixtures::comment("c1", 0, "hello"))],
        );
        for unit in seq.iterate(-1, 1, 30) {
            let lines = item_lines(&unit, &Glyphs::UNICODE, &|_| false);
            assert_eq!(lines.len(), unit.row_span());
        }
    }

    #[test]
    fn listing_lines_show_votes_and_comments() {
        let seq = Sequence::listing(vec![fixtures::listing("p1", "Hello world")]);
        let unit = seq.iterate(0, 1, 40).next().unwrap();
        let lines = texts(&item_lines(&unit, &Glyphs::ASCII, &|_| false));
        assert_eq!(lines[0], "Hello world");
        assert!(lines[3].starts_with('o'));
        assert!(lines[3].ends_with("comments"));
    }

    #[test]
    fn seen_listing_title_is_magenta() {
        let seq = Sequence::listing(vec![fixtures::listing("p1", "Hello world")]);
        let unit = seq.iterate(0, 1, 40).next().unwrap();
        let lines = item_lines(&unit, &Glyphs::UNICODE, &|_| true);
        assert_eq!(lines[0].spans[0].style.fg, Some(Color::Magenta));
    }

    #[test]
    fn replace_resets_navigation() {
        let mut page = Page::new(
            Mode::Subreddit,
            "/r/rust".into(),
            SortOption::Hot,
            Sequence::listing(vec![fixtures::listing("p1", "one"), fixtures::listing("p2", "two")]),
        );
        page.nav = Navigator {
            page_index: 1,
            cursor_index: 0,
            inverted: true,
        };
        page.replace(Sequence::listing(vec![fixtures::listing("p3", "three")]));
        assert_eq!(page.nav.position(), (0, 0, false));
        assert_eq!(page.selected().map(|item| item.id.as_str()), Some("t3_p3"));
    }
}
