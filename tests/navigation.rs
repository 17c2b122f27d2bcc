use std::collections::{HashSet, VecDeque};

use rtv::content::{Comment, Item, ItemKind, Likes, Post, UrlType};
use rtv::layout;
use rtv::navigator::{Direction, Navigator};
use rtv::sequence::{Sequence, TreeNode};

fn post(title: &str) -> Post {
    Post {
        title: title.into(),
        author: "someone".into(),
        subreddit: "rust".into(),
        score: 1,
        comments: 0,
        created: "1hr".into(),
        domain: "example.com".into(),
        url: "https://example.com".into(),
        url_type: UrlType::External,
        permalink: String::new(),
        text: String::new(),
        nsfw: false,
        gilded: false,
        edited: false,
    }
}

fn listing(n: usize) -> Sequence {
    Sequence::listing(
        (0..n)
            .map(|i| Item {
                id: format!("t3_{i}"),
                kind: ItemKind::Listing(post(&format!("Post {i}"))),
                level: 0,
                likes: Likes::None,
            })
            .collect(),
    )
}

fn comment(id: &str, level: usize) -> Item {
    Item {
        id: format!("t1_{id}"),
        kind: ItemKind::Comment(Comment {
            author: "someone".into(),
            body: format!("comment {id}"),
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

/// Moves like the page loop does: one key, then one frame.
fn press(seq: &Sequence, nav: &mut Navigator, dir: Direction, rows: usize) -> bool {
    let visible = layout::settle(seq, nav, rows, 38).len();
    let valid = nav.move_cursor(dir, visible, seq).valid;
    layout::settle(seq, nav, rows, 38);
    valid
}

#[test]
fn walking_a_listing_visits_every_item_once() {
    let seq = listing(25);
    let mut nav = Navigator::new(seq.lower_bound());
    let mut seen = vec![nav.absolute_index()];
    while press(&seq, &mut nav, Direction::Down, 19) {
        seen.push(nav.absolute_index());
    }
    assert_eq!(seen, (0..25).collect::<Vec<i64>>());

    while press(&seq, &mut nav, Direction::Up, 19) {}
    assert_eq!(nav.absolute_index(), 0);
}

#[test]
fn selection_is_always_drawn() {
    let seq = listing(40);
    let mut nav = Navigator::new(0);
    for _ in 0..30 {
        press(&seq, &mut nav, Direction::Down, 19);
        let plan = layout::settle(&seq, &mut nav, 19, 38);
        let selected = plan.selected(&nav).expect("cursor on a drawn item");
        assert_eq!(selected.unit.index, nav.absolute_index());
    }
    assert_eq!(nav.absolute_index(), 30);
}

#[test]
fn paging_covers_a_listing() {
    let seq = listing(30);
    let mut nav = Navigator::new(0);
    let mut last = nav.absolute_index();
    loop {
        let visible = layout::settle(&seq, &mut nav, 19, 38).len();
        if !nav.move_page(Direction::Down, visible, &seq).valid {
            break;
        }
        assert!(nav.absolute_index() > last);
        last = nav.absolute_index();
    }
    assert!(last >= 25);

    let visible = layout::settle(&seq, &mut nav, 19, 38).len();
    assert!(nav.move_page(Direction::Up, visible, &seq).valid);
    assert!(nav.absolute_index() < last);
}

#[test]
fn thread_starts_on_the_root() {
    let root = Item {
        id: "t3_root".into(),
        kind: ItemKind::Submission(post("Root")),
        level: 0,
        likes: Likes::None,
    };
    let seq = Sequence::thread(
        root,
        vec![
            TreeNode {
                item: comment("a", 0),
                children: vec![TreeNode::leaf(comment("b", 1))],
            },
            TreeNode::leaf(comment("c", 0)),
        ],
    );
    let mut nav = Navigator::new(seq.lower_bound());
    assert_eq!(nav.absolute_index(), -1);
    assert!(!press(&seq, &mut nav, Direction::Up, 19));
    assert!(press(&seq, &mut nav, Direction::Down, 19));
    assert_eq!(nav.absolute_index(), 0);

    let mut folded = seq.clone();
    folded.toggle(0);
    assert_eq!(folded.len(), 2);
    assert_eq!(
        folded.get(0).unwrap().kind,
        ItemKind::HiddenComment { count: 1 }
    );
}

#[test]
fn resize_keeps_the_cursor_on_screen() {
    let seq = listing(10);
    let mut nav = Navigator::new(0);
    for _ in 0..3 {
        press(&seq, &mut nav, Direction::Down, 19);
    }
    let plan = layout::settle(&seq, &mut nav, 5, 38);
    assert!(nav.cursor_index < plan.len().max(1));
}

fn bounded(lo: i64, hi: i64) -> impl Fn(i64) -> bool {
    move |index| (lo..=hi).contains(&index)
}

#[test]
fn short_listing_flips_at_the_bottom_edge() {
    let oracle = bounded(0, 3);
    let mut nav = Navigator::new(0);

    let out = nav.move_cursor(Direction::Up, 2, &oracle);
    assert!(!out.valid && !out.redraw);
    assert_eq!(nav.position(), (0, 0, false));

    let out = nav.move_cursor(Direction::Down, 3, &oracle);
    assert!(out.valid && !out.redraw);
    assert_eq!(nav.position(), (0, 1, false));

    let out = nav.move_cursor(Direction::Down, 3, &oracle);
    assert!(out.valid && out.redraw);
    assert_eq!(nav.position(), (2, 0, true));
}

#[test]
fn thread_walk_retraces_to_the_root() {
    let oracle = bounded(-1, 4);
    let mut nav = Navigator::new(-1);

    let out = nav.move_cursor(Direction::Down, 2, &oracle);
    assert!(out.valid);
    assert_eq!(nav.position(), (0, 0, false));

    let mut forward = vec![nav.absolute_index()];
    while nav.move_cursor(Direction::Down, 2, &oracle).valid {
        forward.push(nav.absolute_index());
    }
    assert_eq!(forward, vec![0, 1, 2, 3, 4]);
    assert!(nav.inverted);

    let mut backward = Vec::new();
    while nav.move_cursor(Direction::Up, 2, &oracle).valid {
        backward.push(nav.absolute_index());
    }
    assert_eq!(backward, vec![3, 2, 1, 0, -1]);
    assert_eq!(nav.position(), (-1, 0, false));
}

/// Every navigator state reachable from the start of `oracle`'s range with
/// any mix of moves and viewport sizes.
fn reachable(lo: i64, hi: i64) -> Vec<Navigator> {
    let oracle = bounded(lo, hi);
    let start = Navigator::new(lo);
    let mut seen = HashSet::from([start.position()]);
    let mut queue = VecDeque::from([start]);
    let mut states = Vec::new();
    while let Some(nav) = queue.pop_front() {
        states.push(nav);
        assert!(states.len() < 100_000, "state space should be small");
        for visible in 1..=5 {
            for dir in [Direction::Up, Direction::Down] {
                for paged in [false, true] {
                    let mut next = nav;
                    let out = if paged {
                        next.move_page(dir, visible, &oracle)
                    } else {
                        next.move_cursor(dir, visible, &oracle)
                    };
                    if !out.valid {
                        assert_eq!(next, nav, "failed move changed {:?}", nav.position());
                        continue;
                    }
                    assert!(
                        oracle(next.absolute_index()),
                        "{:?} -> {:?} lands outside {lo}..={hi}",
                        nav.position(),
                        next.position()
                    );
                    if seen.insert(next.position()) {
                        queue.push_back(next);
                    }
                }
            }
        }
    }
    states
}

#[test]
fn every_reachable_selection_is_valid() {
    assert!(reachable(0, 9).len() > 10);
    assert!(reachable(-1, 6).len() > 10);
    assert!(!reachable(0, 0).is_empty());
}

#[test]
fn down_then_up_returns_without_a_flip() {
    for (lo, hi) in [(0, 9), (-1, 6)] {
        let oracle = bounded(lo, hi);
        for start in reachable(lo, hi) {
            for visible in 1..=5 {
                if start.cursor_index + 1 >= visible {
                    continue;
                }
                let mut nav = start;
                let out = nav.move_cursor(Direction::Down, visible, &oracle);
                if !out.valid || out.redraw {
                    continue;
                }
                assert!(nav.move_cursor(Direction::Up, visible, &oracle).valid);
                assert_eq!(nav, start);
            }
        }
    }
}
