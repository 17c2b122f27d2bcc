use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::reddit::{self, ListingOptions, ListingSource, SortOption};

pub type PostListing = reddit::Listing<reddit::Thing<reddit::Post>>;

/// One page of a submission listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    pub source: ListingSource,
    pub sort: SortOption,
    pub query: Option<String>,
    pub after: Option<String>,
}

impl FeedRequest {
    pub fn new(source: ListingSource, sort: SortOption) -> Self {
        Self {
            source,
            sort,
            query: None,
            after: None,
        }
    }

    /// The request for the chunk following `after`.
    pub fn next_page(&self, after: &str) -> Self {
        Self {
            after: Some(after.to_string()),
            ..self.clone()
        }
    }
}

pub trait FeedService: Send + Sync {
    fn load(&self, request: &FeedRequest) -> Result<PostListing>;
}

pub trait CommentService: Send + Sync {
    fn load_thread(&self, article: &str, sort: SortOption) -> Result<reddit::PostComments>;
    fn load_more(
        &self,
        link_fullname: &str,
        children: &[String],
        sort: SortOption,
    ) -> Result<Vec<reddit::CommentThing>>;
}

pub trait InteractionService: Send + Sync {
    fn vote(&self, fullname: &str, dir: i32) -> Result<()>;
    fn reply(&self, parent: &str, text: &str) -> Result<reddit::Comment>;
    fn edit(&self, fullname: &str, text: &str) -> Result<()>;
    fn delete(&self, fullname: &str) -> Result<()>;
    fn submit(&self, subreddit: &str, title: &str, text: &str) -> Result<String>;
    fn unread_count(&self) -> Result<usize>;
}

pub trait SubredditService: Send + Sync {
    fn subscriptions(&self) -> Result<Vec<reddit::Subreddit>>;
}

/// Everything the pages fetch from or send to reddit.
#[derive(Clone)]
pub struct Services {
    pub feed: Arc<dyn FeedService>,
    pub comments: Arc<dyn CommentService>,
    pub interactions: Arc<dyn InteractionService>,
    pub subreddits: Arc<dyn SubredditService>,
}

impl Services {
    pub fn reddit(client: Arc<reddit::Client>) -> Self {
        Self {
            feed: Arc::new(RedditFeedService::new(client.clone())),
            comments: Arc::new(RedditCommentService::new(client.clone())),
            interactions: Arc::new(RedditInteractionService::new(client.clone())),
            subreddits: Arc::new(RedditSubredditService::new(client)),
        }
    }

    pub fn mock() -> Self {
        Self {
            feed: Arc::new(MockFeedService::default()),
            comments: Arc::new(MockCommentService),
            interactions: Arc::new(MockInteractionService::default()),
            subreddits: Arc::new(MockSubredditService),
        }
    }
}

pub struct RedditFeedService {
    client: Arc<reddit::Client>,
}

impl RedditFeedService {
    pub fn new(client: Arc<reddit::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for RedditFeedService {
    fn load(&self, request: &FeedRequest) -> Result<PostListing> {
        let opts = ListingOptions {
            after: request.after.clone(),
            ..ListingOptions::default()
        };
        match &request.query {
            Some(query) => self
                .client
                .search(&request.source, query, request.sort, opts)
                .context("fetch search results"),
            None => self
                .client
                .submissions(&request.source, request.sort, opts)
                .context("fetch submission listing"),
        }
    }
}

pub struct RedditCommentService {
    client: Arc<reddit::Client>,
}

impl RedditCommentService {
    pub fn new(client: Arc<reddit::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for RedditCommentService {
    fn load_thread(&self, article: &str, sort: SortOption) -> Result<reddit::PostComments> {
        self.client
            .comments(article, sort.comment_sort())
            .context("fetch comments")
    }

    fn load_more(
        &self,
        link_fullname: &str,
        children: &[String],
        sort: SortOption,
    ) -> Result<Vec<reddit::CommentThing>> {
        self.client
            .more_children(link_fullname, children, sort.comment_sort())
            .context("fetch more comments")
    }
}

pub struct RedditInteractionService {
    client: Arc<reddit::Client>,
}

impl RedditInteractionService {
    pub fn new(client: Arc<reddit::Client>) -> Self {
        Self { client }
    }
}

impl InteractionService for RedditInteractionService {
    fn vote(&self, fullname: &str, dir: i32) -> Result<()> {
        self.client.vote(fullname, dir)
    }

    fn reply(&self, parent: &str, text: &str) -> Result<reddit::Comment> {
        self.client.reply(parent, text)
    }

    fn edit(&self, fullname: &str, text: &str) -> Result<()> {
        self.client.edit(fullname, text)
    }

    fn delete(&self, fullname: &str) -> Result<()> {
        self.client.delete(fullname)
    }

    fn submit(&self, subreddit: &str, title: &str, text: &str) -> Result<String> {
        self.client.submit(subreddit, title, text)
    }

    fn unread_count(&self) -> Result<usize> {
        self.client.unread_count()
    }
}

pub struct RedditSubredditService {
    client: Arc<reddit::Client>,
}

impl RedditSubredditService {
    pub fn new(client: Arc<reddit::Client>) -> Self {
        Self { client }
    }
}

impl SubredditService for RedditSubredditService {
    fn subscriptions(&self) -> Result<Vec<reddit::Subreddit>> {
        let mut subreddits = Vec::new();
        let mut opts = ListingOptions {
            limit: Some(100),
            ..ListingOptions::default()
        };
        loop {
            let listing = self
                .client
                .subreddits(reddit::SubredditSource::Subscriptions, opts.clone())
                .context("fetch subscriptions")?;
            subreddits.extend(listing.children.into_iter().map(|thing| thing.data));
            match listing.after {
                Some(after) => opts.after = Some(after),
                None => break,
            }
        }
        subreddits.sort_by_key(|sub| sub.display_name.to_ascii_lowercase());
        Ok(subreddits)
    }
}

/// Deterministic offline feed: `pages` chunks of `per_page` posts each.
pub struct MockFeedService {
    pub pages: usize,
    pub per_page: usize,
}

impl Default for MockFeedService {
    fn default() -> Self {
        Self {
            pages: 2,
            per_page: 10,
        }
    }
}

impl FeedService for MockFeedService {
    fn load(&self, request: &FeedRequest) -> Result<PostListing> {
        let page = request
            .after
            .as_deref()
            .and_then(|after| after.strip_prefix("t3_page"))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);
        let subreddit = match &request.source {
            ListingSource::Subreddit(name) => name.clone(),
            _ => "rtv".to_string(),
        };
        let start = page * self.per_page;
        let children = (start..start + self.per_page)
            .map(|n| {
                let title = match &request.query {
                    Some(query) => format!("Result {} for {}", n, query),
                    None => format!("Post {}", n),
                };
                reddit::Thing {
                    kind: "t3".into(),
                    data: mock_post(&format!("p{}", n), &title, &subreddit),
                }
            })
            .collect();
        let after = (page + 1 < self.pages).then(|| format!("t3_page{}", page + 1));
        Ok(reddit::Listing {
            after,
            before: None,
            children,
        })
    }
}

#[derive(Default)]
pub struct MockCommentService;

impl CommentService for MockCommentService {
    fn load_thread(&self, article: &str, _sort: SortOption) -> Result<reddit::PostComments> {
        let mut post = mock_post(article, "Welcome to rtv", "rtv");
        post.is_self = true;
        post.selftext = "Sample thread provided for offline browsing.".into();
        let link = post.name.clone();

        let mut first = mock_comment("c1", 0, &link, "First comment");
        let mut second = mock_comment("c2", 1, "t1_c1", "A reply");
        second.replies = vec![reddit::CommentThing::Comment(mock_comment(
            "c3",
            2,
            "t1_c2",
            "A nested reply",
        ))];
        first.replies = vec![reddit::CommentThing::Comment(second)];

        Ok(reddit::PostComments {
            post,
            comments: vec![
                reddit::CommentThing::Comment(first),
                reddit::CommentThing::Comment(mock_comment("c4", 0, &link, "Second comment")),
                reddit::CommentThing::More(reddit::MoreChildren {
                    id: "m1".into(),
                    name: "t1_m1".into(),
                    count: 2,
                    depth: 0,
                    parent_id: link,
                    children: vec!["c5".into(), "c6".into()],
                }),
            ],
        })
    }

    fn load_more(
        &self,
        link_fullname: &str,
        children: &[String],
        _sort: SortOption,
    ) -> Result<Vec<reddit::CommentThing>> {
        Ok(children
            .iter()
            .map(|id| {
                reddit::CommentThing::Comment(mock_comment(
                    id,
                    0,
                    link_fullname,
                    &format!("Loaded comment {}", id),
                ))
            })
            .collect())
    }
}

/// Records every call so tests can check what a page sent.
#[derive(Default)]
pub struct MockInteractionService {
    pub calls: Mutex<Vec<String>>,
}

impl MockInteractionService {
    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

impl InteractionService for MockInteractionService {
    fn vote(&self, fullname: &str, dir: i32) -> Result<()> {
        self.record(format!("vote {} {}", fullname, dir));
        Ok(())
    }

    fn reply(&self, parent: &str, text: &str) -> Result<reddit::Comment> {
        self.record(format!("reply {} {}", parent, text));
        let depth = if parent.starts_with("t1_") { 1 } else { 0 };
        Ok(mock_comment("reply", depth, parent, text))
    }

    fn edit(&self, fullname: &str, text: &str) -> Result<()> {
        self.record(format!("edit {} {}", fullname, text));
        Ok(())
    }

    fn delete(&self, fullname: &str) -> Result<()> {
        self.record(format!("delete {}", fullname));
        Ok(())
    }

    fn submit(&self, subreddit: &str, title: &str, _text: &str) -> Result<String> {
        self.record(format!("submit {} {}", subreddit, title));
        Ok(format!("https://www.reddit.com/r/{}/comments/new/", subreddit))
    }

    fn unread_count(&self) -> Result<usize> {
        self.record("unread".into());
        Ok(0)
    }
}

#[derive(Default)]
pub struct MockSubredditService;

impl SubredditService for MockSubredditService {
    fn subscriptions(&self) -> Result<Vec<reddit::Subreddit>> {
        Ok(["linux", "programming", "rust"]
            .iter()
            .map(|name| reddit::Subreddit {
                id: name.to_string(),
                display_name: name.to_string(),
                title: format!("The {} community", name),
                subscribers: 0,
                over_18: false,
            })
            .collect())
    }
}

fn mock_post(id: &str, title: &str, subreddit: &str) -> reddit::Post {
    reddit::Post {
        id: id.into(),
        name: format!("t3_{}", id),
        title: title.into(),
        subreddit: subreddit.into(),
        author: "rtv".into(),
        selftext: String::new(),
        url: format!("https://example.com/{}", id),
        permalink: format!("/r/{}/comments/{}/", subreddit, id),
        domain: "example.com".into(),
        is_self: false,
        score: 1,
        likes: None,
        num_comments: 0,
        created_utc: 0.0,
        stickied: false,
        over_18: false,
        gilded: 0,
        edited: false,
    }
}

fn mock_comment(id: &str, depth: i64, parent_id: &str, body: &str) -> reddit::Comment {
    reddit::Comment {
        id: id.into(),
        name: format!("t1_{}", id),
        body: body.into(),
        author: "rtv".into(),
        score: 1,
        likes: None,
        depth,
        created_utc: 0.0,
        gilded: 0,
        edited: false,
        is_submitter: false,
        permalink: String::new(),
        parent_id: parent_id.into(),
        replies: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_feed_paginates() {
        let feed = MockFeedService::default();
        let first = feed
            .load(&FeedRequest::new(ListingSource::Front, SortOption::Hot))
            .unwrap();
        assert_eq!(first.children.len(), 10);
        let after = first.after.clone().unwrap();
        let second = feed
            .load(&FeedRequest::new(ListingSource::Front, SortOption::Hot).next_page(&after))
            .unwrap();
        assert_eq!(second.children[0].data.title, "Post 10");
        assert!(second.after.is_none());
    }

    #[test]
    fn mock_thread_nests_replies() {
        let thread = MockCommentService.load_thread("abc", SortOption::Hot).unwrap();
        assert_eq!(thread.post.name, "t3_abc");
        assert_eq!(thread.comments.len(), 3);
        match &thread.comments[0] {
            reddit::CommentThing::Comment(comment) => assert_eq!(comment.replies.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn mock_interactions_are_recorded() {
        let service = MockInteractionService::default();
        service.vote("t3_x", 1).unwrap();
        service.delete("t1_y").unwrap();
        assert_eq!(
            *service.calls.lock(),
            vec!["vote t3_x 1".to_string(), "delete t1_y".to_string()]
        );
    }
}
