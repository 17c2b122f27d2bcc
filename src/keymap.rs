use std::collections::HashMap;

use crossterm::event::KeyCode;

use crate::reddit::SortOption;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Subreddit,
    Submission,
    Subscription,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ExitPrompt,
    ForceExit,
    Help,
    Sort(SortOption),
    MoveUp,
    MoveDown,
    PageUp,
    PageDown,
    Upvote,
    Downvote,
    Login,
    Delete,
    Edit,
    Inbox,
    Refresh,
    Search,
    PromptSubreddit,
    OpenSubmission,
    OpenLink,
    Post,
    Subscriptions,
    ToggleComment,
    Reply,
    Back,
    Select,
}

/// One set of bindings. `fallback` answers keys the layer does not bind.
#[derive(Debug, Clone)]
pub struct Layer<A> {
    pub name: &'static str,
    bindings: HashMap<KeyCode, A>,
    fallback: Option<A>,
}

impl<A: Copy> Layer<A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            bindings: HashMap::new(),
            fallback: None,
        }
    }

    pub fn bind(mut self, keys: &[KeyCode], action: A) -> Self {
        for key in keys {
            self.bindings.insert(*key, action);
        }
        self
    }

    pub fn with_fallback(mut self, action: A) -> Self {
        self.fallback = Some(action);
        self
    }
}

/// Ordered layers, most specific first.
#[derive(Debug, Clone)]
pub struct Keymap<A> {
    layers: Vec<Layer<A>>,
}

impl<A: Copy> Keymap<A> {
    pub fn new(layers: Vec<Layer<A>>) -> Self {
        Self { layers }
    }

    /// First explicit binding across the layers wins; failing that, the
    /// first layer's fallback that exists. `None` means the key does nothing.
    pub fn resolve(&self, key: KeyCode) -> Option<A> {
        self.layers
            .iter()
            .find_map(|layer| layer.bindings.get(&key).copied())
            .or_else(|| self.layers.iter().find_map(|layer| layer.fallback))
    }
}

fn base_layer() -> Layer<Action> {
    use KeyCode::*;
    Layer::new("base")
        .bind(&[Char('q')], Action::ExitPrompt)
        .bind(&[Char('Q')], Action::ForceExit)
        .bind(&[Char('?')], Action::Help)
        .bind(&[Char('1')], Action::Sort(SortOption::Hot))
        .bind(&[Char('2')], Action::Sort(SortOption::Top))
        .bind(&[Char('3')], Action::Sort(SortOption::Rising))
        .bind(&[Char('4')], Action::Sort(SortOption::New))
        .bind(&[Char('5')], Action::Sort(SortOption::Controversial))
        .bind(&[Up, Char('k')], Action::MoveUp)
        .bind(&[Down, Char('j')], Action::MoveDown)
        .bind(&[Char('m'), PageUp], Action::PageUp)
        .bind(&[Char('n'), PageDown], Action::PageDown)
        .bind(&[Char('a')], Action::Upvote)
        .bind(&[Char('z')], Action::Downvote)
        .bind(&[Char('u')], Action::Login)
        .bind(&[Char('d')], Action::Delete)
        .bind(&[Char('e')], Action::Edit)
        .bind(&[Char('i')], Action::Inbox)
}

fn mode_layer(mode: Mode) -> Layer<Action> {
    use KeyCode::*;
    match mode {
        Mode::Subreddit => Layer::new("subreddit")
            .bind(&[Char('r'), F(5)], Action::Refresh)
            .bind(&[Char('f')], Action::Search)
            .bind(&[Char('/')], Action::PromptSubreddit)
            .bind(&[Char('l'), Right], Action::OpenSubmission)
            .bind(&[Enter, Char('o')], Action::OpenLink)
            .bind(&[Char('c')], Action::Post)
            .bind(&[Char('s')], Action::Subscriptions),
        Mode::Submission => Layer::new("submission")
            .bind(&[Char('l'), Right, Char(' ')], Action::ToggleComment)
            .bind(&[Char('h'), Left], Action::Back)
            .bind(&[Char('r'), F(5)], Action::Refresh)
            .bind(&[Enter, Char('o')], Action::OpenLink)
            .bind(&[Char('c')], Action::Reply),
        Mode::Subscription => Layer::new("subscription")
            .bind(&[Char('r'), F(5)], Action::Refresh)
            .bind(&[Enter, Char('l'), Right], Action::Select)
            .bind(&[Char('h'), Left, Esc], Action::Back),
    }
}

/// Bindings for a page: the mode's own keys over the shared base set.
pub fn for_mode(mode: Mode) -> Keymap<Action> {
    Keymap::new(vec![mode_layer(mode), base_layer()])
}

pub fn help_text(mode: Mode) -> Vec<&'static str> {
    let mut lines = vec![
        "Basic Commands",
        "  j/k or Up/Down    Move the cursor",
        "  n/m or PgDn/PgUp  Jump a page",
        "  1-5               Sort: hot, top, rising, new, controversial",
        "  u                 Log in / log out",
        "  ?                 Show this help",
        "  q / Q             Quit / force quit",
        "",
        "Authenticated Commands",
        "  a/z               Upvote / downvote",
        "  e                 Edit an existing post or comment",
        "  d                 Delete an existing post or comment",
        "  i                 Check the inbox",
        "",
    ];
    match mode {
        Mode::Subreddit => lines.extend([
            "Subreddit Mode",
            "  l or Right        Open the comments",
            "  o or Enter        Open the link",
            "  /                 Go to a subreddit",
            "  f                 Search",
            "  c                 Post a submission",
            "  s                 My subscriptions",
            "  r or F5           Refresh",
        ]),
        Mode::Submission => lines.extend([
            "Submission Mode",
            "  h or Left         Back to the subreddit",
            "  l or Right/Space  Fold or unfold a comment",
            "  o or Enter        Open the link",
            "  c                 Comment or reply",
            "  r or F5           Refresh",
        ]),
        Mode::Subscription => lines.extend([
            "Subscription Mode",
            "  l or Enter        Open the subreddit",
            "  h, Left or Esc    Back",
            "  r or F5           Refresh",
        ]),
    }
    lines
}
