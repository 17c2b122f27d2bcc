use chrono::{DateTime, Utc};

use crate::content::{Item, ItemKind, Wrapped};
use crate::error::Error;
use crate::navigator::IndexOracle;
use crate::reddit::{self, CommentThing};

type NodeId = usize;

/// An item with its children, used to seed a thread.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub item: Item,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn leaf(item: Item) -> Self {
        Self {
            item,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    item: Item,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    folded: Option<Item>,
}

/// Indexable view over a listing or a comment thread.
///
/// Items live in an arena with explicit parent/child links; `rows` is the
/// flat projection that navigation walks and is rebuilt after every fold,
/// unfold or splice. A thread's root sits at index `-1`.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    root: Option<Item>,
    nodes: Vec<Node>,
    top: Vec<NodeId>,
    rows: Vec<NodeId>,
}

impl Sequence {
    pub fn listing(items: Vec<Item>) -> Self {
        let mut seq = Self::default();
        seq.extend(items);
        seq
    }

    pub fn thread(root: Item, comments: Vec<TreeNode>) -> Self {
        let mut seq = Self {
            root: Some(root),
            ..Self::default()
        };
        for tree in comments {
            let id = seq.insert(tree, None);
            seq.top.push(id);
        }
        seq.rebuild();
        seq
    }

    pub fn from_post_comments(payload: &reddit::PostComments, now: DateTime<Utc>) -> Self {
        Self::thread(
            Item::submission(&payload.post, now),
            tree_from_things(&payload.comments, now),
        )
    }

    /// Appends top-level items, e.g. the next chunk of a listing.
    pub fn extend(&mut self, items: Vec<Item>) {
        for item in items {
            let id = self.insert(TreeNode::leaf(item), None);
            self.top.push(id);
        }
        self.rebuild();
    }

    pub fn is_thread(&self) -> bool {
        self.root.is_some()
    }

    pub fn lower_bound(&self) -> i64 {
        if self.root.is_some() {
            -1
        } else {
            0
        }
    }

    /// Number of indexable items at `0..len`, not counting a thread root.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: i64) -> Result<&Item, Error> {
        if index == -1 {
            return self.root.as_ref().ok_or(Error::OutOfRange(index));
        }
        let node = self.node_at(index).ok_or(Error::OutOfRange(index))?;
        Ok(node.folded.as_ref().unwrap_or(&node.item))
    }

    pub fn get_mut(&mut self, index: i64) -> Result<&mut Item, Error> {
        if index == -1 {
            return self.root.as_mut().ok_or(Error::OutOfRange(index));
        }
        let id = self.row(index).ok_or(Error::OutOfRange(index))?;
        let node = &mut self.nodes[id];
        Ok(match node.folded.as_mut() {
            Some(placeholder) => placeholder,
            None => &mut node.item,
        })
    }

    /// Folds a comment behind a placeholder, or unfolds a placeholder.
    /// Anything else, including out-of-range indices, is left alone.
    pub fn toggle(&mut self, index: i64) {
        let Some(id) = self.row(index) else {
            return;
        };
        if self.nodes[id].folded.is_some() {
            self.nodes[id].folded = None;
        } else if self.nodes[id].item.is_comment() {
            let count = self.visible_descendants(id);
            let level = self.nodes[id].item.level;
            self.nodes[id].folded = Some(Item::hidden(level, count));
        } else {
            return;
        }
        self.rebuild();
    }

    /// Replaces the "more comments" placeholder at `index` with fetched
    /// comments, in place.
    pub fn expand_more(&mut self, index: i64, comments: Vec<TreeNode>) -> Result<(), Error> {
        let id = self.row(index).ok_or(Error::OutOfRange(index))?;
        if !matches!(self.nodes[id].item.kind, ItemKind::MoreComments { .. }) {
            return Ok(());
        }
        let parent = self.nodes[id].parent;
        let mut replacement = Vec::with_capacity(comments.len());
        for tree in comments {
            replacement.push(self.insert(tree, parent));
        }
        let siblings = match parent {
            Some(parent) => &mut self.nodes[parent].children,
            None => &mut self.top,
        };
        if let Some(pos) = siblings.iter().position(|sibling| *sibling == id) {
            siblings.splice(pos..=pos, replacement);
        }
        self.rebuild();
        Ok(())
    }

    /// Lazily yields drawable units from `start`, one `step` at a time.
    /// Walking backwards stops before negative indices, so an inverted page
    /// never draws the thread root.
    pub fn iterate(&self, start: i64, step: i64, width: usize) -> Units<'_> {
        Units {
            seq: self,
            next: start,
            step,
            width,
        }
    }

    /// Ids of the indexable items in order, root excluded.
    pub fn ids(&self) -> Vec<&str> {
        (0..self.rows.len() as i64)
            .filter_map(|index| self.get(index).ok())
            .map(|item| item.id.as_str())
            .collect()
    }

    fn row(&self, index: i64) -> Option<NodeId> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.rows.get(index).copied())
    }

    fn node_at(&self, index: i64) -> Option<&Node> {
        self.row(index).map(|id| &self.nodes[id])
    }

    fn insert(&mut self, tree: TreeNode, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            item: tree.item,
            parent,
            children: Vec::new(),
            folded: None,
        });
        for child in tree.children {
            let child_id = self.insert(child, Some(id));
            self.nodes[id].children.push(child_id);
        }
        id
    }

    /// Rows currently drawn below `id`; a folded child counts as one row.
    fn visible_descendants(&self, id: NodeId) -> usize {
        self.nodes[id]
            .children
            .iter()
            .map(|child| match self.nodes[*child].folded {
                Some(_) => 1,
                None => 1 + self.visible_descendants(*child),
            })
            .sum()
    }

    fn rebuild(&mut self) {
        let mut rows = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.top.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            rows.push(id);
            let node = &self.nodes[id];
            if node.folded.is_none() {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        self.rows = rows;
    }
}

impl IndexOracle for Sequence {
    fn is_valid(&self, index: i64) -> bool {
        self.get(index).is_ok()
    }
}

/// An item paired with its row span and indentation for one draw pass.
#[derive(Debug, Clone)]
pub struct DrawUnit<'a> {
    pub index: i64,
    pub item: &'a Item,
    pub wrapped: Wrapped,
}

impl DrawUnit<'_> {
    pub fn row_span(&self) -> usize {
        self.wrapped.row_span
    }

    pub fn offset(&self) -> usize {
        self.wrapped.offset
    }
}

#[derive(Debug, Clone)]
pub struct Units<'a> {
    seq: &'a Sequence,
    next: i64,
    step: i64,
    width: usize,
}

impl<'a> Iterator for Units<'a> {
    type Item = DrawUnit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.step < 0 && self.next < 0 {
            return None;
        }
        let index = self.next;
        let item = self.seq.get(index).ok()?;
        self.next += self.step;
        Some(DrawUnit {
            index,
            item,
            wrapped: item.wrap(self.width),
        })
    }
}

/// Builds comment trees from the nested `replies` of a thread payload.
pub fn tree_from_things(things: &[CommentThing], now: DateTime<Utc>) -> Vec<TreeNode> {
    things
        .iter()
        .map(|thing| match thing {
            CommentThing::Comment(comment) => TreeNode {
                item: Item::comment(comment, now),
                children: tree_from_things(&comment.replies, now),
            },
            CommentThing::More(more) => TreeNode::leaf(Item::more(more)),
        })
        .collect()
}

/// Rebuilds trees from the flat, depth-first list `morechildren` returns,
/// linking each entry to an earlier entry named by its `parent_id`.
pub fn tree_from_flat(things: Vec<CommentThing>, now: DateTime<Utc>) -> Vec<TreeNode> {
    struct Pending {
        name: String,
        node: TreeNode,
        parent: Option<usize>,
    }

    let mut pending: Vec<Pending> = Vec::with_capacity(things.len());
    for thing in &things {
        let (name, item) = match thing {
            CommentThing::Comment(comment) => (comment.name.clone(), Item::comment(comment, now)),
            CommentThing::More(more) => (more.name.clone(), Item::more(more)),
        };
        let parent = pending
            .iter()
            .position(|candidate| candidate.name == thing.parent_id());
        pending.push(Pending {
            name,
            node: TreeNode::leaf(item),
            parent,
        });
    }

    // children always come after their parent, so fold from the back
    let mut roots = Vec::new();
    while let Some(entry) = pending.pop() {
        match entry.parent {
            Some(parent) => pending[parent].node.children.insert(0, entry.node),
            None => roots.push(entry.node),
        }
    }
    roots.reverse();
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::fixtures;

    // c0
    //   c1
    //     c2
    //   c3
    // c4
    fn sample_thread() -> Sequence {
        let tree = vec![
            TreeNode {
                item: fixtures::comment("c0", 0, "zero"),
                children: vec![
                    TreeNode {
                        item: fixtures::comment("c1", 1, "one"),
                        children: vec![TreeNode::leaf(fixtures::comment("c2", 2, "two"))],
                    },
                    TreeNode::leaf(fixtures::comment("c3", 1, "three")),
                ],
            },
            TreeNode::leaf(fixtures::comment("c4", 0, "four")),
        ];
        Sequence::thread(fixtures::submission("root", "text"), tree)
    }

    #[test]
    fn thread_indexes_root_at_minus_one() {
        let seq = sample_thread();
        assert_eq!(seq.lower_bound(), -1);
        assert_eq!(seq.get(-1).unwrap().id, "t3_root");
        assert_eq!(seq.ids(), vec!["t1_c0", "t1_c1", "t1_c2", "t1_c3", "t1_c4"]);
        assert!(matches!(seq.get(5), Err(Error::OutOfRange(5))));
        assert!(matches!(seq.get(-2), Err(Error::OutOfRange(-2))));
    }

    #[test]
    fn listing_has_no_root() {
        let seq = Sequence::listing(vec![fixtures::listing("a", "A"), fixtures::listing("b", "B")]);
        assert!(seq.get(-1).is_err());
        assert_eq!(seq.lower_bound(), 0);
        assert!(seq.is_valid(1));
        assert!(!seq.is_valid(2));
    }

    #[test]
    fn fold_replaces_subtree_with_placeholder() {
        let mut seq = sample_thread();
        seq.toggle(0);
        assert_eq!(seq.len(), 2);
        let placeholder = seq.get(0).unwrap();
        assert_eq!(placeholder.kind, ItemKind::HiddenComment { count: 3 });
        assert_eq!(placeholder.level, 0);
        assert_eq!(seq.get(1).unwrap().id, "t1_c4");
    }

    #[test]
    fn fold_then_unfold_restores_order() {
        let mut seq = sample_thread();
        let before: Vec<String> = seq.ids().into_iter().map(String::from).collect();
        seq.toggle(1);
        assert_eq!(seq.len(), 4);
        seq.toggle(1);
        assert_eq!(seq.ids(), before);
    }

    #[test]
    fn nested_folds_survive_outer_unfold() {
        let mut seq = sample_thread();
        seq.toggle(1);
        seq.toggle(0);
        assert_eq!(seq.len(), 2);
        seq.toggle(0);
        assert_eq!(seq.ids(), vec!["t1_c0", "", "t1_c3", "t1_c4"]);
        assert!(matches!(
            seq.get(1).unwrap().kind,
            ItemKind::HiddenComment { count: 1 }
        ));
    }

    #[test]
    fn outer_fold_counts_only_removed_rows() {
        let mut seq = sample_thread();
        seq.toggle(1);
        assert_eq!(seq.len(), 4);
        seq.toggle(0);
        assert_eq!(seq.len(), 2);
        // c1 (already folded) and c3 left the screen; c2 was hidden before
        assert_eq!(
            seq.get(0).unwrap().kind,
            ItemKind::HiddenComment { count: 2 }
        );
    }

    #[test]
    fn toggle_ignores_non_comments_and_bad_indices() {
        let more = reddit::MoreChildren {
            id: "m".into(),
            name: "t1_m".into(),
            count: 7,
            depth: 0,
            parent_id: "t3_root".into(),
            children: vec!["x".into()],
        };
        let mut seq = Sequence::thread(
            fixtures::submission("root", ""),
            vec![TreeNode::leaf(Item::more(&more))],
        );
        seq.toggle(0);
        seq.toggle(-1);
        seq.toggle(42);
        assert_eq!(seq.len(), 1);
        assert!(matches!(seq.get(0).unwrap().kind, ItemKind::MoreComments { count: 7, .. }));
    }

    #[test]
    fn expand_more_splices_in_place() {
        let more = reddit::MoreChildren {
            id: "m".into(),
            name: "t1_m".into(),
            count: 2,
            depth: 1,
            parent_id: "t1_c0".into(),
            children: vec!["c5".into(), "c6".into()],
        };
        let tree = vec![
            TreeNode {
                item: fixtures::comment("c0", 0, "zero"),
                children: vec![TreeNode::leaf(Item::more(&more))],
            },
            TreeNode::leaf(fixtures::comment("c4", 0, "four")),
        ];
        let mut seq = Sequence::thread(fixtures::submission("root", ""), tree);
        seq.expand_more(
            1,
            vec![
                TreeNode::leaf(fixtures::comment("c5", 1, "five")),
                TreeNode::leaf(fixtures::comment("c6", 1, "six")),
            ],
        )
        .unwrap();
        assert_eq!(seq.ids(), vec!["t1_c0", "t1_c5", "t1_c6", "t1_c4"]);

        seq.toggle(0);
        assert!(matches!(
            seq.get(0).unwrap().kind,
            ItemKind::HiddenComment { count: 2 }
        ));
    }

    #[test]
    fn iterate_walks_both_directions() {
        let seq = sample_thread();
        let forward: Vec<i64> = seq.iterate(-1, 1, 40).map(|unit| unit.index).collect();
        assert_eq!(forward, vec![-1, 0, 1, 2, 3, 4]);
        let backward: Vec<i64> = seq.iterate(3, -1, 40).map(|unit| unit.index).collect();
        assert_eq!(backward, vec![3, 2, 1, 0]);
    }

    #[test]
    fn iterate_rewraps_for_each_width() {
        let seq = Sequence::listing(vec![fixtures::listing("a", "aaaa bbbb cccc dddd")]);
        let wide = seq.iterate(0, 1, 80).next().unwrap();
        let narrow = seq.iterate(0, 1, 9).next().unwrap();
        assert_eq!(wide.row_span(), 4);
        assert_eq!(narrow.row_span(), 5);
    }

    #[test]
    fn flat_more_children_rebuild_tree() {
        let comment = |name: &str, parent: &str, depth: i64| {
            CommentThing::Comment(reddit::Comment {
                id: name.trim_start_matches("t1_").into(),
                name: name.into(),
                body: "b".into(),
                author: "a".into(),
                score: 1,
                likes: None,
                depth,
                created_utc: 0.0,
                gilded: 0,
                edited: false,
                is_submitter: false,
                permalink: String::new(),
                parent_id: parent.into(),
                replies: Vec::new(),
            })
        };
        let things = vec![
            comment("t1_a", "t1_p", 1),
            comment("t1_b", "t1_a", 2),
            comment("t1_c", "t1_b", 3),
            comment("t1_d", "t1_p", 1),
        ];
        let roots = tree_from_flat(things, Utc::now());
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].item.id, "t1_a");
        assert_eq!(roots[0].children[0].item.id, "t1_b");
        assert_eq!(roots[0].children[0].children[0].item.id, "t1_c");
        assert_eq!(roots[1].item.id, "t1_d");
    }
}
