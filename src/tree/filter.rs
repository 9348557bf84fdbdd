use std::borrow::Cow;

use crate::{models::TreeNode, search_match::PreparedKeyword};

/// Prunes `tree` down to the branches whose labels contain `keyword`.
///
/// A node whose own label matches is kept with its whole subtree. A node that does not
/// match is rebuilt with an unset path and only those filtered children that still have
/// children of their own. Short keywords return the tree as is.
pub fn filter_tree<'a>(tree: &'a TreeNode, keyword: &str) -> Cow<'a, TreeNode> {
  match PreparedKeyword::new(keyword) {
    Some(prepared) => filter_node(tree, &prepared),
    None => Cow::Borrowed(tree),
  }
}

fn filter_node<'a>(node: &'a TreeNode, keyword: &PreparedKeyword) -> Cow<'a, TreeNode> {
  if keyword.matches(&node.id) {
    return Cow::Borrowed(node);
  }
  let children = node
    .children
    .iter()
    .map(|child| filter_node(child, keyword))
    .filter(|child| !child.children.is_empty() && !child.id.is_empty())
    .map(Cow::into_owned)
    .collect();
  Cow::Owned(TreeNode {
    id: node.id.clone(),
    field_index: node.field_index,
    children,
    path: String::new(),
  })
}
