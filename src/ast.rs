use crate::{Location, SynTree, NO_LOCATION};
use ptree::TreeItem;
use std::fmt::{Debug, Formatter};

impl Debug for SynTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut debug_struct = f.debug_struct("SynTree");
        debug_struct.field("kind", &self.kind);
        if !self.lexeme.is_empty() {
            debug_struct.field("lexeme", &self.lexeme);
        }
        debug_struct.field("location", &self.location);
        if !self.children.is_empty() {
            debug_struct.field("children", &self.children);
        }
        debug_struct.finish()
    }
}

impl SynTree {
    /// Create a new tree node.
    pub fn new(kind: i64, lexeme: String, location: Location, children: Vec<SynTree>) -> Self {
        Self {
            kind,
            lexeme,
            location,
            children,
        }
    }

    /// Create a leaf node without children.
    pub fn leaf(kind: i64, lexeme: String, location: Location) -> Self {
        SynTree::new(kind, lexeme, location, Vec::with_capacity(0))
    }

    /// Create a null node, the tree of an empty derivation.
    pub fn null() -> Self {
        SynTree::leaf(crate::grammar::syntax::GramKind::Null as i64, String::new(), NO_LOCATION)
    }

    pub fn get_child(&self, index: usize) -> Option<&SynTree> {
        self.children.get(index)
    }

    /// Find the first node with a given kind, searching through all nested children.
    pub fn find_tree_with_kind(&self, kind: i64) -> Option<&SynTree> {
        if self.kind == kind {
            Some(self)
        } else {
            self.children
                .iter()
                .find_map(|child| child.find_tree_with_kind(kind))
        }
    }

    /// Search through all nested children and return the first node accepted by the predicate.
    pub fn find_tree<TF: Fn(&SynTree) -> bool>(&self, p: &TF) -> Option<&SynTree> {
        if p(self) {
            Some(self)
        } else {
            self.children.iter().find_map(|child| child.find_tree(p))
        }
    }

    /// Return all the nodes matching a kind value in depth-first order.
    pub fn list_tree_with_kind<'this>(&'this self, kind: i64) -> Vec<&'this SynTree> {
        let mut list_tree: Vec<&'this SynTree> = Vec::new();
        self.walk_tree(&mut list_tree, &|tree, list| {
            if tree.kind == kind {
                list.push(tree);
            }
        });
        list_tree
    }

    pub fn contains_kind(&self, kind: i64) -> bool {
        self.kind == kind || self.children.iter().any(|child| child.contains_kind(kind))
    }

    fn walk_tree<'this, TR, TF: Fn(&'this Self, &mut TR)>(&'this self, r: &mut TR, p: &TF) {
        p(self, r);
        self.children.iter().for_each(|child| child.walk_tree(r, p));
    }
}

impl TreeItem for SynTree {
    type Child = Self;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _: &ptree::Style) -> std::io::Result<()> {
        if self.lexeme.is_empty() {
            write!(f, "{} # {}", self.kind, self.location)
        } else {
            write!(f, "{} {:?} # {}", self.kind, self.lexeme, self.location)
        }
    }

    fn children(&self) -> std::borrow::Cow<[Self::Child]> {
        std::borrow::Cow::from(&self.children)
    }
}

impl SynTree {
    pub fn print(&self) -> Result<(), std::io::Error> {
        ptree::print_tree(self)
    }
}
