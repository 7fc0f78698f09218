//! Reconstruction of reply trees from flat comment rows.
//!
//! Rows only know the id of their parent. [`build_forest`] links them into
//! owned [`Comment`] trees in two linear passes over an index arena and never
//! needs the rows in any particular order.

use crate::model::{
    Id,
    comment::{Comment, CommentMarker, FlatComment, ParentRef},
};
use std::collections::HashMap;

/// Deepest level of a thread served in one read, roots being level 1.
pub const MAX_THREAD_DEPTH: usize = 32;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct CommentForest {
    /// Comments without a parent, in input order.
    pub roots: Vec<Comment>,
    /// Comments whose parent was not part of the input. Their `reply_to` is a
    /// [`ParentRef::Stub`].
    pub detached: Vec<Comment>,
}

impl CommentForest {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.detached.is_empty()
    }
}

/// Links `rows` into a forest.
///
/// Replies keep the relative order they had in `rows`. A row pointing at itself,
/// or a set of rows pointing at each other, cannot be reached from a root; such a
/// cycle is cut at its first row in input order, which is then reported as
/// detached. Every row ends up in the forest exactly once.
#[must_use]
pub fn build_forest(rows: Vec<FlatComment>) -> CommentForest {
    let positions: HashMap<Id<CommentMarker>, usize> = rows
        .iter()
        .enumerate()
        .map(|(position, row)| (row.id, position))
        .collect();

    let mut children = vec![Vec::new(); rows.len()];
    let mut roots = Vec::new();
    let mut detached = Vec::new();
    let mut linked = vec![false; rows.len()];

    for (position, row) in rows.iter().enumerate() {
        match row.reply_to.and_then(|parent| positions.get(&parent)) {
            Some(&parent) => {
                children[parent].push(position);
                linked[position] = true;
            }
            None if row.reply_to.is_some() => detached.push(position),
            None => roots.push(position),
        }
    }

    let mut visited = vec![false; rows.len()];
    let mut tree_children = vec![Vec::new(); rows.len()];
    let mut order = Vec::with_capacity(rows.len());
    let mut stack = Vec::new();

    let mut walk = |start: usize, visited: &mut [bool]| {
        stack.push(start);
        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            order.push(node);

            for &child in &children[node] {
                if !visited[child] {
                    tree_children[node].push(child);
                    stack.push(child);
                }
            }
        }
    };

    for &start in roots.iter().chain(&detached) {
        walk(start, &mut visited);
    }
    for start in 0..rows.len() {
        if !visited[start] {
            linked[start] = false;
            detached.push(start);
            walk(start, &mut visited);
        }
    }

    let mut nodes: Vec<Option<Comment>> = rows
        .into_iter()
        .zip(&linked)
        .map(|(row, &linked)| {
            let mut comment = Comment::from(row);
            if linked {
                comment.reply_to = comment.reply_to.map(|parent| ParentRef::Loaded(parent.id()));
            }
            Some(comment)
        })
        .collect();

    // Preorder reversed: every child is complete before its parent takes it.
    for &node in order.iter().rev() {
        let replies: Vec<Comment> = tree_children[node]
            .iter()
            .filter_map(|&child| nodes[child].take())
            .collect();
        if let Some(comment) = &mut nodes[node] {
            comment.replies = replies;
        }
    }

    CommentForest {
        roots: roots
            .into_iter()
            .filter_map(|root| nodes[root].take())
            .collect(),
        detached: detached
            .into_iter()
            .filter_map(|node| nodes[node].take())
            .collect(),
    }
}

/// Drops the replies of every comment at `max_depth`, so no tree in `comments`
/// is deeper than that. Returns the number of comments whose replies were cut.
pub fn cut_at_depth(comments: &mut [Comment], max_depth: usize) -> usize {
    let mut cut = 0;
    let mut stack: Vec<(&mut Comment, usize)> =
        comments.iter_mut().map(|comment| (comment, 1)).collect();

    while let Some((comment, depth)) = stack.pop() {
        if depth >= max_depth {
            if !comment.replies.is_empty() {
                comment.replies.clear();
                cut += 1;
            }
            continue;
        }
        stack.extend(comment.replies.iter_mut().map(|reply| (reply, depth + 1)));
    }

    cut
}
