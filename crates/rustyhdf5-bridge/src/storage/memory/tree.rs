//! Object graph of one in-process file.

use std::collections::BTreeMap;

use super::dataspace::Dataspace;
use super::datatype::Datatype;
use crate::storage::ObjectKind;

/// Index of the root group in [`FileImage::nodes`].
pub(crate) const ROOT: usize = 0;

/// Raw element storage.
#[derive(Debug, Clone)]
pub(crate) enum Payload {
    Bytes(Vec<u8>),
    /// One entry per element of a variable-length string.
    Strings(Vec<Vec<u8>>),
}

impl Payload {
    pub(crate) fn zeroed(datatype: &Datatype, elements: usize) -> Self {
        if datatype.is_variable_string() {
            Payload::Strings(vec![Vec::new(); elements])
        } else {
            Payload::Bytes(vec![0; datatype.size() * elements])
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StoredAttribute {
    pub datatype: Datatype,
    pub space: Dataspace,
    pub data: Payload,
}

/// Attributes keyed by name; iteration order is name order.
pub(crate) type AttributeSet = BTreeMap<String, StoredAttribute>;

#[derive(Debug, Clone)]
pub(crate) enum Link {
    Hard(usize),
    Soft(String),
    External { file: String, path: String },
}

#[derive(Debug)]
pub(crate) enum Node {
    Group {
        links: BTreeMap<String, Link>,
        attrs: AttributeSet,
    },
    Dataset {
        datatype: Datatype,
        space: Dataspace,
        chunk: Option<Vec<u64>>,
        data: Payload,
        attrs: AttributeSet,
    },
    NamedType {
        datatype: Datatype,
        attrs: AttributeSet,
    },
}

impl Node {
    pub(crate) fn empty_group() -> Self {
        Node::Group {
            links: BTreeMap::new(),
            attrs: AttributeSet::new(),
        }
    }

    pub(crate) fn kind(&self) -> ObjectKind {
        match self {
            Node::Group { .. } => ObjectKind::Group,
            Node::Dataset { .. } => ObjectKind::Dataset,
            Node::NamedType { .. } => ObjectKind::NamedDatatype,
        }
    }

    pub(crate) fn attrs(&self) -> &AttributeSet {
        match self {
            Node::Group { attrs, .. } | Node::Dataset { attrs, .. } | Node::NamedType { attrs, .. } => {
                attrs
            }
        }
    }

    pub(crate) fn attrs_mut(&mut self) -> &mut AttributeSet {
        match self {
            Node::Group { attrs, .. } | Node::Dataset { attrs, .. } | Node::NamedType { attrs, .. } => {
                attrs
            }
        }
    }

    pub(crate) fn links(&self) -> Option<&BTreeMap<String, Link>> {
        match self {
            Node::Group { links, .. } => Some(links),
            _ => None,
        }
    }

    pub(crate) fn links_mut(&mut self) -> Option<&mut BTreeMap<String, Link>> {
        match self {
            Node::Group { links, .. } => Some(links),
            _ => None,
        }
    }
}

/// All objects of one file. Unlinked objects stay allocated so open
/// identifiers keep working.
#[derive(Debug)]
pub(crate) struct FileImage {
    pub nodes: Vec<Node>,
}

impl FileImage {
    pub(crate) fn new() -> Self {
        FileImage {
            nodes: vec![Node::empty_group()],
        }
    }

    /// Append a node and return its index.
    pub(crate) fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}

/// Split `path` into its parent path and final component.
pub(crate) fn split_parent(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    let (parent, leaf) = match trimmed.rsplit_once('/') {
        Some(("", leaf)) => ("/", leaf),
        Some((parent, leaf)) => (parent, leaf),
        None => (".", trimmed),
    };
    if leaf.is_empty() || leaf == "." {
        None
    } else {
        Some((parent, leaf))
    }
}
