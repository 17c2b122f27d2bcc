use chrono::{DateTime, TimeZone, Utc};
use textwrap::{wrap, Options as WrapOptions};

use crate::reddit;

/// Deepest indentation applied to comments, in levels.
pub const MAX_INDENT_LEVEL: usize = 8;
pub const INDENT_WIDTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Likes {
    Up,
    Down,
    #[default]
    None,
}

impl Likes {
    pub fn from_api(likes: Option<bool>) -> Self {
        match likes {
            Some(true) => Likes::Up,
            Some(false) => Likes::Down,
            None => Likes::None,
        }
    }

    pub fn direction(self) -> i32 {
        match self {
            Likes::Up => 1,
            Likes::Down => -1,
            Likes::None => 0,
        }
    }

    /// Pressing the same arrow twice clears the vote.
    pub fn toggled(self, requested: Likes) -> Likes {
        if self == requested {
            Likes::None
        } else {
            requested
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlType {
    SelfPost,
    XPost,
    External,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub title: String,
    pub author: String,
    pub subreddit: String,
    pub score: i64,
    pub comments: i64,
    pub created: String,
    pub domain: String,
    pub url: String,
    pub url_type: UrlType,
    pub permalink: String,
    pub text: String,
    pub nsfw: bool,
    pub gilded: bool,
    pub edited: bool,
}

impl Post {
    /// Short link text shown under a title.
    pub fn display_url(&self) -> String {
        match self.url_type {
            UrlType::SelfPost => format!("self.{}", self.subreddit),
            UrlType::XPost => format!("x-post via {}", self.domain),
            UrlType::External => self.url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created: String,
    pub gilded: bool,
    pub edited: bool,
    pub permalink: String,
    pub is_submitter: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub name: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Listing(Post),
    Submission(Post),
    Comment(Comment),
    MoreComments { count: i64, children: Vec<String> },
    HiddenComment { count: usize },
    Subscription(Subscription),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Reddit fullname (`t3_...`, `t1_...`) or subreddit name.
    pub id: String,
    pub kind: ItemKind,
    pub level: usize,
    pub likes: Likes,
}

/// Text of an item wrapped for one draw pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wrapped {
    pub title: Vec<String>,
    pub body: Vec<String>,
    pub row_span: usize,
    pub offset: usize,
}

impl Item {
    pub fn listing(post: &reddit::Post, now: DateTime<Utc>) -> Self {
        Self {
            id: post.name.clone(),
            kind: ItemKind::Listing(post_fields(post, now)),
            level: 0,
            likes: Likes::from_api(post.likes),
        }
    }

    pub fn submission(post: &reddit::Post, now: DateTime<Utc>) -> Self {
        Self {
            id: post.name.clone(),
            kind: ItemKind::Submission(post_fields(post, now)),
            level: 0,
            likes: Likes::from_api(post.likes),
        }
    }

    pub fn comment(comment: &reddit::Comment, now: DateTime<Utc>) -> Self {
        Self {
            id: comment.name.clone(),
            kind: ItemKind::Comment(Comment {
                author: comment.author.clone(),
                body: comment.body.trim_end().to_string(),
                score: comment.score,
                created: humanize_timestamp(comment.created_utc, now),
                gilded: comment.gilded > 0,
                edited: comment.edited,
                permalink: comment.permalink.clone(),
                is_submitter: comment.is_submitter,
            }),
            level: comment.depth.max(0) as usize,
            likes: Likes::from_api(comment.likes),
        }
    }

    pub fn more(more: &reddit::MoreChildren) -> Self {
        Self {
            id: more.name.clone(),
            kind: ItemKind::MoreComments {
                count: more.count,
                children: more.children.clone(),
            },
            level: more.depth.max(0) as usize,
            likes: Likes::None,
        }
    }

    pub fn subscription(subreddit: &reddit::Subreddit) -> Self {
        Self {
            id: subreddit.display_name.clone(),
            kind: ItemKind::Subscription(Subscription {
                name: subreddit.display_name.clone(),
                title: subreddit.title.clone(),
            }),
            level: 0,
            likes: Likes::None,
        }
    }

    pub fn hidden(level: usize, count: usize) -> Self {
        Self {
            id: String::new(),
            kind: ItemKind::HiddenComment { count },
            level,
            likes: Likes::None,
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, ItemKind::Comment(_))
    }

    pub fn author(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Listing(post) | ItemKind::Submission(post) => Some(&post.author),
            ItemKind::Comment(comment) => Some(&comment.author),
            _ => None,
        }
    }

    /// Editable text of the item, if it has any.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Listing(post) | ItemKind::Submission(post) => Some(&post.text),
            ItemKind::Comment(comment) => Some(&comment.body),
            _ => None,
        }
    }

    pub fn set_text(&mut self, text: &str) {
        match &mut self.kind {
            ItemKind::Listing(post) | ItemKind::Submission(post) => {
                post.text = text.to_string();
                post.edited = true;
            }
            ItemKind::Comment(comment) => {
                comment.body = text.to_string();
                comment.edited = true;
            }
            _ => {}
        }
    }

    pub fn votable(&self) -> bool {
        matches!(
            self.kind,
            ItemKind::Listing(_) | ItemKind::Submission(_) | ItemKind::Comment(_)
        )
    }

    /// Applies a vote locally, keeping the displayed score in step.
    pub fn apply_vote(&mut self, likes: Likes) {
        let delta = i64::from(likes.direction() - self.likes.direction());
        match &mut self.kind {
            ItemKind::Listing(post) | ItemKind::Submission(post) => post.score += delta,
            ItemKind::Comment(comment) => comment.score += delta,
            _ => {}
        }
        self.likes = likes;
    }

    pub fn offset(&self) -> usize {
        match self.kind {
            ItemKind::Comment(_) | ItemKind::MoreComments { .. } | ItemKind::HiddenComment { .. } => {
                self.level.min(MAX_INDENT_LEVEL) * INDENT_WIDTH
            }
            _ => 0,
        }
    }

    /// Wraps the item's text for the given width. Never cached: the width
    /// may differ on every draw.
    pub fn wrap(&self, width: usize) -> Wrapped {
        let offset = self.offset();
        let (title, body, row_span) = match &self.kind {
            ItemKind::Submission(post) => {
                let title = wrap_text(&post.title, width);
                let body = if post.text.is_empty() {
                    Vec::new()
                } else {
                    wrap_text(&post.text, width)
                };
                let rows = title.len() + body.len() + 5;
                (title, body, rows)
            }
            ItemKind::Comment(comment) => {
                let body = wrap_text(&comment.body, width.saturating_sub(offset));
                let rows = body.len() + 1;
                (Vec::new(), body, rows)
            }
            ItemKind::MoreComments { .. } | ItemKind::HiddenComment { .. } => {
                (Vec::new(), Vec::new(), 1)
            }
            ItemKind::Listing(post) => {
                let title = wrap_text(&post.title, width);
                let rows = title.len() + 3;
                (title, Vec::new(), rows)
            }
            ItemKind::Subscription(sub) => {
                let title = if sub.title.is_empty() {
                    Vec::new()
                } else {
                    wrap_text(&sub.title, width)
                };
                let rows = title.len() + 1;
                (title, Vec::new(), rows)
            }
        };
        Wrapped {
            title,
            body,
            row_span,
            offset,
        }
    }
}

fn post_fields(post: &reddit::Post, now: DateTime<Utc>) -> Post {
    Post {
        title: post.title.clone(),
        author: post.author.clone(),
        subreddit: post.subreddit.clone(),
        score: post.score,
        comments: post.num_comments,
        created: humanize_timestamp(post.created_utc, now),
        domain: post.domain.clone(),
        url: post.url.clone(),
        url_type: url_type(post),
        permalink: full_permalink(&post.permalink),
        text: post.selftext.trim_end().to_string(),
        nsfw: post.over_18,
        gilded: post.gilded > 0,
        edited: post.edited,
    }
}

fn url_type(post: &reddit::Post) -> UrlType {
    if post.is_self || same_thread(&post.permalink, &post.url) {
        UrlType::SelfPost
    } else if is_reddit_thread(&post.url) {
        UrlType::XPost
    } else {
        UrlType::External
    }
}

fn same_thread(permalink: &str, url: &str) -> bool {
    match (permalink.split("/r/").last(), url.split("/r/").last()) {
        (Some(a), Some(b)) => !a.is_empty() && a == b,
        _ => false,
    }
}

fn is_reddit_thread(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    (lower.contains("reddit.com/r/") && lower.contains("/comments/")) || lower.contains("redd.it/")
}

pub fn full_permalink(permalink: &str) -> String {
    if permalink.starts_with("http") || permalink.is_empty() {
        permalink.to_string()
    } else {
        format!("https://www.reddit.com{}", permalink)
    }
}

/// Wraps each paragraph separately so blank lines survive.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let options = WrapOptions::new(width).break_words(true);
    let mut out = Vec::new();
    for paragraph in text.lines() {
        let lines = wrap(paragraph, options.clone());
        if lines.is_empty() {
            out.push(String::new());
        } else {
            out.extend(lines.into_iter().map(|line| line.into_owned()));
        }
    }
    if out.is_empty() {
        out.push(String::new());
    }
    out
}

/// Compact relative time: `0min`, `12min`, `3hr`, `2day`, `4month`, `1yr`.
pub fn humanize_timestamp(utc_timestamp: f64, now: DateTime<Utc>) -> String {
    let then = Utc
        .timestamp_opt(utc_timestamp.trunc() as i64, 0)
        .single()
        .unwrap_or(now);
    let seconds = (now - then).num_seconds().max(0);
    if seconds < 60 {
        return "0min".to_string();
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{}min", minutes);
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}hr", hours);
    }
    let days = hours / 24;
    if days < 30 {
        return format!("{}day", days);
    }
    let months = (days as f64 / 30.4).floor() as i64;
    if months < 12 {
        return format!("{}month", months);
    }
    format!("{}yr", months / 12)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn listing(id: &str, title: &str) -> Item {
        Item {
            id: format!("t3_{}", id),
            kind: ItemKind::Listing(post(title, "")),
            level: 0,
            likes: Likes::None,
        }
    }

    pub fn submission(title: &str, text: &str) -> Item {
        Item {
            id: "t3_root".into(),
            kind: ItemKind::Submission(post(title, text)),
            level: 0,
            likes: Likes::None,
        }
    }

    pub fn comment(id: &str, level: usize, body: &str) -> Item {
        Item {
            id: format!("t1_{}", id),
            kind: ItemKind::Comment(Comment {
                author: "someone".into(),
                body: body.into(),
                score: 1,
                created: "1hr".into(),
                gilded: false,
                edited: false,
                permalink: String::new(),
                is_submitter: false,
            }),
            level,
            likes: Likes::None,
        }
    }

    fn post(title: &str, text: &str) -> Post {
        Post {
            title: title.into(),
            author: "someone".into(),
            subreddit: "rust".into(),
            score: 10,
            comments: 2,
            created: "1hr".into(),
            domain: "self.rust".into(),
            url: String::new(),
            url_type: UrlType::SelfPost,
            permalink: String::new(),
            text: text.into(),
            nsfw: false,
            gilded: false,
            edited: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;

    #[test]
    fn humanize_uses_compact_units() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        let ts = |secs_ago: i64| (1_700_000_000 - secs_ago) as f64;
        assert_eq!(humanize_timestamp(ts(30), now), "0min");
        assert_eq!(humanize_timestamp(ts(5 * 60), now), "5min");
        assert_eq!(humanize_timestamp(ts(3 * 3600), now), "3hr");
        assert_eq!(humanize_timestamp(ts(2 * 86400), now), "2day");
        assert_eq!(humanize_timestamp(ts(86400 * 365), now), "1yr");
        assert_eq!(humanize_timestamp(ts(86400 * 92), now), "3month");
    }

    #[test]
    fn wrap_text_keeps_blank_paragraphs() {
        let lines = wrap_text("one two three\n\nfour", 7);
        assert_eq!(lines, vec!["one two", "three", "", "four"]);
    }

    #[test]
    fn row_spans_follow_item_kind() {
        let listing = fixtures::listing("a", "a short title");
        assert_eq!(listing.wrap(80).row_span, 4);

        let root = fixtures::submission("title", "line one\nline two");
        assert_eq!(root.wrap(80).row_span, 1 + 2 + 5);

        let comment = fixtures::comment("c", 3, "body");
        let wrapped = comment.wrap(80);
        assert_eq!(wrapped.row_span, 2);
        assert_eq!(wrapped.offset, 6);

        let deep = fixtures::comment("d", 20, "body");
        assert_eq!(deep.wrap(80).offset, MAX_INDENT_LEVEL * INDENT_WIDTH);

        assert_eq!(Item::hidden(1, 4).wrap(80).row_span, 1);
    }

    #[test]
    fn narrower_width_grows_row_span() {
        let comment = fixtures::comment("c", 0, "aaaa bbbb cccc dddd");
        assert_eq!(comment.wrap(40).row_span, 2);
        assert_eq!(comment.wrap(9).row_span, 3);
    }

    #[test]
    fn vote_toggles_and_tracks_score() {
        let mut item = fixtures::listing("a", "t");
        item.apply_vote(item.likes.toggled(Likes::Up));
        assert_eq!(item.likes, Likes::Up);
        item.apply_vote(item.likes.toggled(Likes::Down));
        assert_eq!(item.likes, Likes::Down);
        item.apply_vote(item.likes.toggled(Likes::Down));
        assert_eq!(item.likes, Likes::None);
        match item.kind {
            ItemKind::Listing(post) => assert_eq!(post.score, 10),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn url_types_are_detected() {
        let mut post = reddit::Post {
            id: "x".into(),
            name: "t3_x".into(),
            title: "t".into(),
            subreddit: "rust".into(),
            author: "a".into(),
            selftext: String::new(),
            url: "https://www.reddit.com/r/rust/comments/x/t/".into(),
            permalink: "/r/rust/comments/x/t/".into(),
            domain: "self.rust".into(),
            is_self: false,
            score: 0,
            likes: None,
            num_comments: 0,
            created_utc: 0.0,
            stickied: false,
            over_18: false,
            gilded: 0,
            edited: false,
        };
        assert_eq!(url_type(&post), UrlType::SelfPost);
        post.url = "https://www.reddit.com/r/other/comments/y/z/".into();
        assert_eq!(url_type(&post), UrlType::XPost);
        post.url = "https://example.com/article".into();
        assert_eq!(url_type(&post), UrlType::External);
    }
}
