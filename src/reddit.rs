use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::RwLock;
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{self, Value};
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://oauth.reddit.com/";
pub const DEFAULT_PUBLIC_URL: &str = "https://www.reddit.com/";

/// Failures of the remote data source, recovered from `anyhow` chains by
/// `error::classify`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataError {
    #[error("login required")]
    AuthRequired,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("rate limited")]
    RateLimited,
    #[error("network error: {0}")]
    Network(String),
    #[error("api error {status}: {body}")]
    Api { status: u16, body: String },
}

pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Result<OAuthToken>;
}

#[derive(Debug, Clone)]
pub struct OAuthToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: Option<SystemTime>,
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub public_url: Option<String>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug, Clone, Default)]
pub struct ListingOptions {
    pub after: Option<String>,
    pub before: Option<String>,
    pub limit: Option<u32>,
    pub extra: Vec<(String, String)>,
}

impl ListingOptions {
    fn into_params(self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(after) = self.after {
            params.push(("after".into(), after));
        }
        if let Some(before) = self.before {
            params.push(("before".into(), before));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".into(), limit.to_string()));
        }
        params.extend(self.extra);
        params
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOption {
    #[default]
    Hot,
    Top,
    Rising,
    New,
    Controversial,
}

impl SortOption {
    pub const ALL: [SortOption; 5] = [
        SortOption::Hot,
        SortOption::Top,
        SortOption::Rising,
        SortOption::New,
        SortOption::Controversial,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|sort| sort.as_str().eq_ignore_ascii_case(value))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOption::Hot => "hot",
            SortOption::Top => "top",
            SortOption::Rising => "rising",
            SortOption::New => "new",
            SortOption::Controversial => "controversial",
        }
    }

    /// Comment threads have no rising order; hot maps to reddit's "best".
    pub fn comment_sort(&self) -> Option<&'static str> {
        match self {
            SortOption::Hot => Some("confidence"),
            SortOption::Top => Some("top"),
            SortOption::Rising => None,
            SortOption::New => Some("new"),
            SortOption::Controversial => Some("controversial"),
        }
    }
}

/// Where a submission listing comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingSource {
    Front,
    Subreddit(String),
    User(String),
}

impl ListingSource {
    fn path(&self, sort: SortOption) -> String {
        match self {
            ListingSource::Front => format!("/{}.json", sort.as_str()),
            ListingSource::Subreddit(name) => format!("/r/{}/{}.json", name, sort.as_str()),
            ListingSource::User(name) => format!("/user/{}/submitted.json", name),
        }
    }

    fn search_path(&self) -> String {
        match self {
            ListingSource::Front => "/search.json".to_string(),
            ListingSource::Subreddit(name) => format!("/r/{}/search.json", name),
            ListingSource::User(_) => "/search.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Required,
    Optional,
}

pub struct Client {
    token_provider: RwLock<Option<Arc<dyn TokenProvider>>>,
    http: HttpClient,
    user_agent: String,
    base_url: Url,
    public_url: Url,
}

impl Client {
    pub fn new(
        token_provider: Option<Arc<dyn TokenProvider>>,
        config: ClientConfig,
    ) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("reddit client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let public = config
            .public_url
            .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string());
        let base_url = Url::parse(&base)?;
        let public_url = Url::parse(&public)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(20))
                .build()?,
        };

        Ok(Client {
            token_provider: RwLock::new(token_provider),
            http,
            user_agent: config.user_agent,
            base_url,
            public_url,
        })
    }

    pub fn set_token_provider(&self, provider: Option<Arc<dyn TokenProvider>>) {
        *self.token_provider.write() = provider;
    }

    pub fn submissions(
        &self,
        source: &ListingSource,
        sort: SortOption,
        opts: ListingOptions,
    ) -> Result<Listing<Thing<Post>>> {
        let mut opts = opts;
        if matches!(source, ListingSource::User(_)) {
            opts.extra.push(("sort".into(), sort.as_str().into()));
        }
        self.fetch_listing(&source.path(sort), opts)
    }

    pub fn search(
        &self,
        source: &ListingSource,
        query: &str,
        sort: SortOption,
        opts: ListingOptions,
    ) -> Result<Listing<Thing<Post>>> {
        let mut opts = opts;
        opts.extra.push(("q".into(), query.to_string()));
        opts.extra.push(("sort".into(), sort.as_str().into()));
        if matches!(source, ListingSource::Subreddit(_)) {
            opts.extra.push(("restrict_sr".into(), "on".into()));
        }
        self.fetch_listing(&source.search_path(), opts)
    }

    pub fn comments(&self, article: &str, sort: Option<&str>) -> Result<PostComments> {
        let path = format!("/comments/{}.json", article);
        let mut params = Vec::new();
        if let Some(sort) = sort {
            params.push(("sort".to_string(), sort.to_string()));
        }
        let resp = self.request(Method::GET, &path, &params, None, Auth::Optional)?;
        let payload: Vec<Value> = resp.json().context("reddit: decode comments payload")?;
        if payload.len() < 2 {
            bail!("reddit: comments payload missing elements");
        }
        let post_listing: ListingEnvelope<Thing<Post>> =
            serde_json::from_value(payload[0].clone()).context("reddit: decode post listing")?;
        let comments_listing: ListingEnvelope<CommentThing> =
            serde_json::from_value(payload[1].clone()).context("reddit: decode comment listing")?;
        let post = post_listing
            .data
            .children
            .into_iter()
            .next()
            .map(|thing| thing.data)
            .ok_or(DataError::NotFound)?;
        Ok(PostComments {
            post,
            comments: comments_listing.data.children,
        })
    }

    pub fn more_children(
        &self,
        link_fullname: &str,
        children: &[String],
        sort: Option<&str>,
    ) -> Result<Vec<CommentThing>> {
        if children.is_empty() {
            return Ok(Vec::new());
        }
        let mut params = vec![
            ("api_type".to_string(), "json".to_string()),
            ("link_id".to_string(), link_fullname.to_string()),
            ("children".to_string(), children.join(",")),
        ];
        if let Some(sort) = sort {
            params.push(("sort".to_string(), sort.to_string()));
        }
        let resp = self.request(
            Method::GET,
            "/api/morechildren.json",
            &params,
            None,
            Auth::Optional,
        )?;
        let payload: ThingsResponse<CommentThing> =
            resp.json().context("reddit: decode morechildren")?;
        payload.into_things()
    }

    pub fn subreddits(
        &self,
        source: SubredditSource,
        opts: ListingOptions,
    ) -> Result<Listing<Thing<Subreddit>>> {
        let path = format!("{}.json", source.as_path());
        let auth = match source {
            SubredditSource::Subscriptions => Auth::Required,
            SubredditSource::Popular => Auth::Optional,
        };
        let params = opts.into_params();
        let resp = self.request(Method::GET, &path, &params, None, auth)?;
        let listing: ListingEnvelope<Thing<Subreddit>> = resp.json()?;
        Ok(listing.data)
    }

    pub fn vote(&self, fullname: &str, dir: i32) -> Result<()> {
        if !(-1..=1).contains(&dir) {
            bail!("reddit: vote direction must be -1, 0, or 1");
        }
        let form = vec![
            ("id".to_string(), fullname.to_string()),
            ("dir".to_string(), dir.to_string()),
        ];
        self.request(Method::POST, "/api/vote", &[], Some(form), Auth::Required)?;
        Ok(())
    }

    pub fn reply(&self, parent: &str, text: &str) -> Result<Comment> {
        if parent.trim().is_empty() {
            bail!("reddit: reply parent is required");
        }
        if text.trim().is_empty() {
            bail!("reddit: reply text is required");
        }
        let form = vec![
            ("parent".to_string(), parent.to_string()),
            ("text".to_string(), text.to_string()),
            ("api_type".to_string(), "json".to_string()),
        ];
        let resp = self.request(Method::POST, "/api/comment", &[], Some(form), Auth::Required)?;
        let payload: ThingsResponse<Thing<Comment>> = resp.json()?;
        payload
            .into_things()?
            .into_iter()
            .next()
            .map(|thing| thing.data)
            .ok_or_else(|| anyhow!("reddit: comment response empty"))
    }

    pub fn edit(&self, fullname: &str, text: &str) -> Result<()> {
        let form = vec![
            ("thing_id".to_string(), fullname.to_string()),
            ("text".to_string(), text.to_string()),
            ("api_type".to_string(), "json".to_string()),
        ];
        let resp = self.request(
            Method::POST,
            "/api/editusertext",
            &[],
            Some(form),
            Auth::Required,
        )?;
        let payload: ErrorsResponse = resp.json()?;
        payload.check("edit")
    }

    pub fn delete(&self, fullname: &str) -> Result<()> {
        let form = vec![("id".to_string(), fullname.to_string())];
        self.request(Method::POST, "/api/del", &[], Some(form), Auth::Required)?;
        Ok(())
    }

    /// Posts a self post and returns the new thread's url.
    pub fn submit(&self, subreddit: &str, title: &str, text: &str) -> Result<String> {
        if title.trim().is_empty() {
            bail!("reddit: submission title is required");
        }
        let form = vec![
            ("sr".to_string(), subreddit.to_string()),
            ("kind".to_string(), "self".to_string()),
            ("title".to_string(), title.to_string()),
            ("text".to_string(), text.to_string()),
            ("api_type".to_string(), "json".to_string()),
        ];
        let resp = self.request(Method::POST, "/api/submit", &[], Some(form), Auth::Required)?;
        let payload: SubmitResponse = resp.json().context("reddit: decode submit response")?;
        if let Some(err) = payload.json.errors.first() {
            bail!("reddit: submit error: {}", join_error(err));
        }
        payload
            .json
            .data
            .map(|data| data.url)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| anyhow!("reddit: submit response missing url"))
    }

    pub fn unread_count(&self) -> Result<usize> {
        let listing: Listing<Thing<Value>> =
            self.fetch_listing_with("/message/unread.json", ListingOptions::default(), Auth::Required)?;
        Ok(listing.children.len())
    }

    fn fetch_listing<T>(&self, path: &str, opts: ListingOptions) -> Result<Listing<Thing<T>>>
    where
        T: DeserializeOwned,
    {
        self.fetch_listing_with(path, opts, Auth::Optional)
    }

    fn fetch_listing_with<T>(&self, path: &str, opts: ListingOptions, auth: Auth) -> Result<Listing<T>>
    where
        T: DeserializeOwned,
    {
        let params = opts.into_params();
        let resp = self.request(Method::GET, path, &params, None, auth)?;
        let listing: ListingEnvelope<T> = resp.json().context("reddit: decode listing")?;
        Ok(listing.data)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        form: Option<Vec<(String, String)>>,
        auth: Auth,
    ) -> Result<Response> {
        let provider = self.token_provider.read().clone();
        let token = match (&provider, auth) {
            (Some(provider), _) => Some(provider.token()?),
            (None, Auth::Required) => bail!(DataError::AuthRequired),
            (None, Auth::Optional) => None,
        };
        let base = if token.is_some() {
            &self.base_url
        } else {
            &self.public_url
        };
        let mut url = base.join(path.trim_start_matches('/'))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("raw_json", "1");
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        debug!(%method, %url, "reddit request");

        let mut req = self.http.request(method, url);
        req = req.header(USER_AGENT, self.user_agent.clone());
        if let Some(token) = token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token.access_token));
        }
        if let Some(form_data) = form {
            req = req.header(CONTENT_TYPE, "application/x-www-form-urlencoded");
            req = req.form(&form_data);
        }

        let resp = req
            .send()
            .map_err(|err| DataError::Network(err.to_string()))?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().unwrap_or_default();
            Err(status_error(status, body).into())
        }
    }
}

fn status_error(status: u16, body: String) -> DataError {
    match status {
        401 => DataError::AuthRequired,
        403 => DataError::Forbidden,
        404 => DataError::NotFound,
        429 => DataError::RateLimited,
        _ => DataError::Api { status, body },
    }
}

fn join_error(err: &[Value]) -> String {
    err.iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Pulls the thread id out of a reddit url (`/r/x/comments/<id>/...` or
/// `redd.it/<id>`).
pub fn article_id_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw)
        .or_else(|_| Url::parse(&format!("https://www.reddit.com/{}", raw.trim_start_matches('/'))))
        .ok()?;
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    if url.host_str().map_or(false, |host| host.ends_with("redd.it")) {
        return segments.first().map(|id| id.to_string());
    }
    segments
        .iter()
        .position(|segment| *segment == "comments")
        .and_then(|pos| segments.get(pos + 1))
        .map(|id| id.to_string())
}

fn flag_or_timestamp<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(flag) => flag,
        Value::Number(_) => true,
        _ => false,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    pub after: Option<String>,
    pub before: Option<String>,
    pub children: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thing<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub name: String,
    pub title: String,
    pub subreddit: String,
    pub author: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub likes: Option<bool>,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub gilded: i64,
    #[serde(default, deserialize_with = "flag_or_timestamp")]
    pub edited: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub likes: Option<bool>,
    #[serde(default)]
    pub depth: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub gilded: i64,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub is_submitter: bool,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(skip)]
    pub replies: Vec<CommentThing>,
}

impl<'de> Deserialize<'de> for Comment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct CommentHelper {
            id: String,
            name: String,
            #[serde(default)]
            body: String,
            #[serde(default)]
            author: String,
            #[serde(default)]
            score: i64,
            #[serde(default)]
            likes: Option<bool>,
            #[serde(default)]
            depth: i64,
            #[serde(default)]
            created_utc: f64,
            #[serde(default)]
            gilded: i64,
            #[serde(default, deserialize_with = "flag_or_timestamp")]
            edited: bool,
            #[serde(default)]
            is_submitter: bool,
            #[serde(default)]
            permalink: String,
            #[serde(default)]
            parent_id: String,
            #[serde(default)]
            replies: serde_json::Value,
        }

        let helper = CommentHelper::deserialize(deserializer)?;
        // reddit sends "" instead of a listing when there are no replies
        let replies = if helper.replies.is_null() || helper.replies == "" {
            Vec::new()
        } else {
            serde_json::from_value::<ListingEnvelope<CommentThing>>(helper.replies)
                .map(|listing| listing.data.children)
                .unwrap_or_default()
        };
        Ok(Comment {
            id: helper.id,
            name: helper.name,
            body: helper.body,
            author: helper.author,
            score: helper.score,
            likes: helper.likes,
            depth: helper.depth,
            created_utc: helper.created_utc,
            gilded: helper.gilded,
            edited: helper.edited,
            is_submitter: helper.is_submitter,
            permalink: helper.permalink,
            parent_id: helper.parent_id,
            replies,
        })
    }
}

/// Placeholder for comment branches that were not sent with the thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoreChildren {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub depth: i64,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum CommentThing {
    #[serde(rename = "t1")]
    Comment(Comment),
    #[serde(rename = "more")]
    More(MoreChildren),
}

impl CommentThing {
    pub fn parent_id(&self) -> &str {
        match self {
            CommentThing::Comment(comment) => &comment.parent_id,
            CommentThing::More(more) => &more.parent_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostComments {
    pub post: Post,
    pub comments: Vec<CommentThing>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subreddit {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subscribers: i64,
    #[serde(default, rename = "over18")]
    pub over_18: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum SubredditSource {
    Subscriptions,
    Popular,
}

impl SubredditSource {
    fn as_path(&self) -> &'static str {
        match self {
            SubredditSource::Subscriptions => "/subreddits/mine/subscriber",
            SubredditSource::Popular => "/subreddits/popular",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ListingEnvelope<T> {
    #[allow(dead_code)]
    kind: String,
    data: Listing<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct ThingsResponse<T> {
    json: ThingsResponseBody<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct ThingsResponseBody<T> {
    #[serde(default)]
    errors: Vec<Vec<Value>>,
    data: Option<ThingsResponseData<T>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ThingsResponseData<T> {
    #[serde(default = "Vec::new")]
    things: Vec<T>,
}

impl<T> ThingsResponse<T> {
    fn into_things(self) -> Result<Vec<T>> {
        if let Some(err) = self.json.errors.first() {
            bail!("reddit: api error: {}", join_error(err));
        }
        Ok(self.json.data.map(|data| data.things).unwrap_or_default())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorsResponse {
    json: ErrorsBody,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorsBody {
    #[serde(default)]
    errors: Vec<Vec<Value>>,
}

impl ErrorsResponse {
    fn check(&self, action: &str) -> Result<()> {
        if let Some(err) = self.json.errors.first() {
            bail!("reddit: {} error: {}", action, join_error(err));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SubmitResponse {
    json: SubmitBody,
}

#[derive(Debug, Clone, Deserialize)]
struct SubmitBody {
    #[serde(default)]
    errors: Vec<Vec<Value>>,
    data: Option<SubmitData>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubmitData {
    #[serde(default)]
    url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_id_from_permalink_and_short_link() {
        assert_eq!(
            article_id_from_url("https://www.reddit.com/r/rust/comments/abc123/some_title/"),
            Some("abc123".to_string())
        );
        assert_eq!(
            article_id_from_url("https://redd.it/xyz9"),
            Some("xyz9".to_string())
        );
        assert_eq!(
            article_id_from_url("/r/rust/comments/q1w2e3/"),
            Some("q1w2e3".to_string())
        );
        assert_eq!(article_id_from_url("https://example.com/page"), None);
    }

    #[test]
    fn sort_names_parse_case_insensitively() {
        assert_eq!(SortOption::parse("Top"), Some(SortOption::Top));
        assert_eq!(SortOption::parse(" rising "), Some(SortOption::Rising));
        assert_eq!(SortOption::parse("best"), None);
        assert_eq!(SortOption::Hot.comment_sort(), Some("confidence"));
        assert_eq!(SortOption::Rising.comment_sort(), None);
    }

    #[test]
    fn status_codes_map_to_data_errors() {
        assert_eq!(status_error(401, String::new()), DataError::AuthRequired);
        assert_eq!(status_error(404, String::new()), DataError::NotFound);
        assert_eq!(status_error(429, String::new()), DataError::RateLimited);
        assert!(matches!(
            status_error(500, "oops".into()),
            DataError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn comment_tree_decodes_replies_and_more() {
        let raw = serde_json::json!({
            "kind": "Listing",
            "data": {
                "after": null,
                "before": null,
                "children": [
                    {
                        "kind": "t1",
                        "data": {
                            "id": "c1",
                            "name": "t1_c1",
                            "body": "top",
                            "depth": 0,
                            "edited": 1700000000.0,
                            "replies": {
                                "kind": "Listing",
                                "data": {
                                    "after": null,
                                    "before": null,
                                    "children": [
                                        {
                                            "kind": "more",
                                            "data": {
                                                "id": "m1",
                                                "name": "t1_m1",
                                                "count": 4,
                                                "depth": 1,
                                                "parent_id": "t1_c1",
                                                "children": ["a", "b"]
                                            }
                                        }
                                    ]
                                }
                            }
                        }
                    },
                    {
                        "kind": "t1",
                        "data": { "id": "c2", "name": "t1_c2", "body": "leaf", "replies": "" }
                    }
                ]
            }
        });
        let listing: ListingEnvelope<CommentThing> = serde_json::from_value(raw).unwrap();
        let children = listing.data.children;
        assert_eq!(children.len(), 2);
        match &children[0] {
            CommentThing::Comment(comment) => {
                assert!(comment.edited);
                assert_eq!(comment.replies.len(), 1);
                assert!(matches!(&comment.replies[0], CommentThing::More(more) if more.count == 4));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &children[1] {
            CommentThing::Comment(comment) => assert!(comment.replies.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn anonymous_client_rejects_authenticated_calls() {
        let client = Client::new(
            None,
            ClientConfig {
                user_agent: "rtv-test".into(),
                ..ClientConfig::default()
            },
        )
        .unwrap();
        let err = client.vote("t3_abc", 1).unwrap_err();
        assert_eq!(err.downcast_ref::<DataError>(), Some(&DataError::AuthRequired));
    }
}
