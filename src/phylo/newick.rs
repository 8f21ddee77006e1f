//! Newick tree parsing.
//!
//! Trees are stored as an arena of nodes addressed by index. Nodes are
//! allocated in pre-order, so iterating node ids visits leaves in the
//! order they appear in the Newick text.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub type NodeId = usize;

#[derive(Error, Debug)]
pub enum NewickError {
    #[error("Failed to read tree file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Tree is empty")]
    Empty,

    #[error("Unexpected character '{found}' at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },

    #[error("Unexpected end of tree at offset {0} (unbalanced parentheses?)")]
    UnexpectedEnd(usize),

    #[error("Invalid branch length '{text}' at offset {offset}")]
    InvalidBranchLength { text: String, offset: usize },

    #[error("Unterminated {what} starting at offset {offset}")]
    Unterminated { what: &'static str, offset: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub label: Option<String>,
    /// Length of the edge to the parent.
    pub branch_length: Option<f64>,
}

impl Node {
    fn new(parent: Option<NodeId>) -> Self {
        Node {
            parent,
            children: Vec::new(),
            label: None,
            branch_length: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, NewickError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| NewickError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Leaf ids in order of appearance.
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).filter(move |&id| self.nodes[id].is_leaf())
    }

    /// Labels of the leaves; these are the taxa of the tree.
    pub fn taxa(&self) -> Vec<&str> {
        self.leaves()
            .filter_map(|id| self.nodes[id].label.as_deref())
            .collect()
    }

    pub fn find_leaf(&self, label: &str) -> Option<NodeId> {
        self.leaves()
            .find(|&id| self.nodes[id].label.as_deref() == Some(label))
    }

    /// Neighbouring nodes paired with the length of the connecting edge.
    pub fn neighbours(&self, id: NodeId) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        let node = &self.nodes[id];
        let up = node
            .parent
            .map(|parent| (parent, node.branch_length.unwrap_or(0.0)));
        let down = node
            .children
            .iter()
            .map(move |&child| (child, self.nodes[child].branch_length.unwrap_or(0.0)));
        up.into_iter().chain(down)
    }
}

impl FromStr for Tree {
    type Err = NewickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parser::new(s).parse()
    }
}

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    nodes: Vec<Node>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            nodes: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Tree, NewickError> {
        self.skip_filler()?;
        if matches!(self.peek(), None | Some(b';')) {
            return Err(NewickError::Empty);
        }
        self.parse_tree()?;
        self.skip_filler()?;
        if self.peek() == Some(b';') {
            self.pos += 1;
            self.skip_filler()?;
        }
        if self.peek().is_some() {
            return Err(self.unexpected());
        }
        Ok(Tree { nodes: self.nodes })
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn unexpected(&self) -> NewickError {
        match self.input[self.pos..].chars().next() {
            Some(found) => NewickError::UnexpectedChar {
                found,
                offset: self.pos,
            },
            None => NewickError::UnexpectedEnd(self.pos),
        }
    }

    /// Skips whitespace and `[...]` comments.
    fn skip_filler(&mut self) -> Result<(), NewickError> {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else if b == b'[' {
                let start = self.pos;
                match self.bytes[start..].iter().position(|&c| c == b']') {
                    Some(end) => self.pos = start + end + 1,
                    None => {
                        return Err(NewickError::Unterminated {
                            what: "comment",
                            offset: start,
                        })
                    }
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Reads one tree, keeping open groups on an explicit stack so nesting
    /// depth is bounded by memory rather than the call stack.
    fn parse_tree(&mut self) -> Result<(), NewickError> {
        let mut open: Vec<NodeId> = Vec::new();
        let mut parent: Option<NodeId> = None;
        loop {
            let id = self.nodes.len();
            self.nodes.push(Node::new(parent));
            if let Some(parent) = parent {
                self.nodes[parent].children.push(id);
            }

            self.skip_filler()?;
            if self.peek() == Some(b'(') {
                self.pos += 1;
                open.push(id);
                parent = Some(id);
                continue;
            }
            self.finish_node(id)?;

            // close groups until another sibling follows
            loop {
                let Some(&group) = open.last() else {
                    return Ok(());
                };
                self.skip_filler()?;
                match self.peek() {
                    Some(b',') => {
                        self.pos += 1;
                        parent = Some(group);
                        break;
                    }
                    Some(b')') => {
                        self.pos += 1;
                        open.pop();
                        self.finish_node(group)?;
                    }
                    _ => return Err(self.unexpected()),
                }
            }
        }
    }

    /// Label and branch length following a leaf or a closed group.
    fn finish_node(&mut self, id: NodeId) -> Result<(), NewickError> {
        self.skip_filler()?;
        self.nodes[id].label = self.parse_label()?;
        self.skip_filler()?;
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.skip_filler()?;
            self.nodes[id].branch_length = Some(self.parse_length()?);
        }
        Ok(())
    }

    fn parse_label(&mut self) -> Result<Option<String>, NewickError> {
        if self.peek() == Some(b'\'') {
            return self.parse_quoted_label().map(Some);
        }
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || b"()[]':;,".contains(&b) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Ok(None);
        }
        Ok(Some(self.input[start..self.pos].to_string()))
    }

    fn parse_quoted_label(&mut self) -> Result<String, NewickError> {
        let start = self.pos;
        self.pos += 1;
        let mut label = String::new();
        loop {
            let rest = &self.input[self.pos..];
            let Some(quote) = rest.find('\'') else {
                return Err(NewickError::Unterminated {
                    what: "quoted label",
                    offset: start,
                });
            };
            label.push_str(&rest[..quote]);
            self.pos += quote + 1;
            if self.peek() == Some(b'\'') {
                // '' is an escaped quote
                label.push('\'');
                self.pos += 1;
            } else {
                return Ok(label);
            }
        }
    }

    fn parse_length(&mut self) -> Result<f64, NewickError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        text.parse::<f64>()
            .map_err(|_| NewickError::InvalidBranchLength {
                text: text.to_string(),
                offset: start,
            })
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // (node, index of the next child to write)
        let mut stack: Vec<(NodeId, usize)> = vec![(self.root(), 0)];
        while let Some((id, next)) = stack.pop() {
            let node = self.node(id);
            if next < node.children.len() {
                f.write_str(if next == 0 { "(" } else { "," })?;
                stack.push((id, next + 1));
                stack.push((node.children[next], 0));
                continue;
            }
            if !node.is_leaf() {
                f.write_str(")")?;
            }
            if let Some(label) = &node.label {
                if label.bytes().any(|b| b.is_ascii_whitespace() || b"()[]':;,".contains(&b)) {
                    write!(f, "'{}'", label.replace('\'', "''"))?;
                } else {
                    f.write_str(label)?;
                }
            }
            if let Some(length) = node.branch_length {
                write!(f, ":{}", length)?;
            }
        }
        f.write_str(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_iqtree_style_tree() {
        let tree: Tree = "(A:0.1,B:0.2,(C:0.3,D:0.4)95:0.5);".parse().unwrap();
        assert_eq!(tree.len(), 6);
        assert_eq!(tree.taxa(), vec!["A", "B", "C", "D"]);

        let inner = tree.node(tree.root()).children[2];
        assert_eq!(tree.node(inner).label.as_deref(), Some("95"));
        assert_eq!(tree.node(inner).branch_length, Some(0.5));
        assert_eq!(tree.node(tree.find_leaf("D").unwrap()).branch_length, Some(0.4));
    }

    #[test]
    fn test_underscores_are_kept() {
        let tree: Tree = "(rat_HEV_1:1,rat_HEV_2:2);".parse().unwrap();
        assert!(tree.find_leaf("rat_HEV_1").is_some());
        assert!(tree.find_leaf("rat HEV 1").is_none());
    }

    #[test]
    fn test_quoted_labels_comments_and_whitespace() {
        let text = "(\n  'Isolate A':1e-3 [&support=1],\n  'it''s':2.5E0\n) root ;\n";
        let tree: Tree = text.parse().unwrap();
        assert_eq!(tree.taxa(), vec!["Isolate A", "it's"]);
        assert_eq!(tree.node(tree.find_leaf("Isolate A").unwrap()).branch_length, Some(0.001));
        assert_eq!(tree.node(tree.root()).label.as_deref(), Some("root"));
    }

    #[test]
    fn test_missing_semicolon_and_lengths() {
        let tree: Tree = "((A,B),C)".parse().unwrap();
        assert_eq!(tree.taxa(), vec!["A", "B", "C"]);
        assert!(tree.node(tree.find_leaf("A").unwrap()).branch_length.is_none());
    }

    #[test]
    fn test_display_writes_parseable_newick() {
        let text = "(A:0.1,'B C':0.2,(D:0.3,E:0.4)90:0.5);";
        let tree: Tree = text.parse().unwrap();
        assert_eq!(tree.to_string(), text);
    }

    #[test]
    fn test_errors() {
        assert!(matches!("".parse::<Tree>(), Err(NewickError::Empty)));
        assert!(matches!("  ;".parse::<Tree>(), Err(NewickError::Empty)));
        assert!(matches!(
            "(A,B);C".parse::<Tree>(),
            Err(NewickError::UnexpectedChar { found: 'C', offset: 6 })
        ));
        assert!(matches!(
            "(A:1,B:2".parse::<Tree>(),
            Err(NewickError::UnexpectedEnd(8))
        ));
        assert!(matches!(
            "(A:1,B:2));".parse::<Tree>(),
            Err(NewickError::UnexpectedChar { found: ')', offset: 9 })
        ));
        assert!(matches!(
            "(A:abc,B:2);".parse::<Tree>(),
            Err(NewickError::InvalidBranchLength { .. })
        ));
        assert!(matches!(
            "('A:1,B:2);".parse::<Tree>(),
            Err(NewickError::Unterminated { what: "quoted label", offset: 1 })
        ));
    }

    #[test]
    fn test_deeply_nested_tree() {
        let depth = 200_000;
        let text = format!("{}A:1{};", "(".repeat(depth), ",B:1)".repeat(depth));
        let tree: Tree = text.parse().unwrap();
        assert_eq!(tree.taxa().len(), depth + 1);
        assert_eq!(tree.taxa()[0], "A");
        assert_eq!(tree.to_string(), text);

        let unbalanced = format!("{}A", "(".repeat(depth));
        assert!(matches!(
            unbalanced.parse::<Tree>(),
            Err(NewickError::UnexpectedEnd(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Tree::from_file("no/such/tree.treefile"),
            Err(NewickError::Io { .. })
        ));
    }
}
