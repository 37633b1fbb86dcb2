//! Decoded value tree.
//!
//! Messages decode into [`Directory`] nodes and scalar values into [`Leaf`] nodes holding the
//! rendered text of the value. The tree is built once by the decoder and never modified after.

use crate::context::Label;
use crate::decode::WireType;
use bytes::Bytes;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// Details of the field a node was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttributes
{
    /// Field number. Zero for the root and the synthetic per-buffer directories.
    pub field_number: u64,

    /// Declared wire type of the field.
    pub wire_type: WireType,

    /// Field label.
    pub label: Label,
}

impl NodeAttributes
{
    /// Attributes of directories that don't originate from a field.
    pub fn root() -> Self
    {
        NodeAttributes {
            field_number: 0,
            wire_type: WireType::LengthDelimited,
            label: Label::Optional,
        }
    }
}

/// A node in the value tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node
{
    /// A decoded message.
    Directory(Directory),

    /// A decoded scalar value.
    Leaf(Leaf),
}

/// A decoded message with its fields as children, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub struct Directory
{
    name: String,
    attributes: NodeAttributes,
    children: Vec<Node>,
    index: HashMap<String, usize>,
}

/// A decoded scalar value.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf
{
    name: String,
    attributes: NodeAttributes,
    contents: Bytes,
}

/// The result of decoding one or more buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTree
{
    root: Node,
}

impl Node
{
    /// Node name, unique within the parent directory.
    pub fn name(&self) -> &str
    {
        match self {
            Node::Directory(d) => &d.name,
            Node::Leaf(l) => &l.name,
        }
    }

    /// Attributes of the field the node was decoded from.
    pub fn attributes(&self) -> NodeAttributes
    {
        match self {
            Node::Directory(d) => d.attributes,
            Node::Leaf(l) => l.attributes,
        }
    }

    /// The directory, if this node is one.
    pub fn as_directory(&self) -> Option<&Directory>
    {
        match self {
            Node::Directory(d) => Some(d),
            Node::Leaf(_) => None,
        }
    }

    /// The leaf, if this node is one.
    pub fn as_leaf(&self) -> Option<&Leaf>
    {
        match self {
            Node::Leaf(l) => Some(l),
            Node::Directory(_) => None,
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter, depth: usize) -> fmt::Result
    {
        let indent = depth * 2;
        match self {
            Node::Directory(d) => {
                writeln!(f, "{:indent$}{}/", "", d.name, indent = indent)?;
                for child in &d.children {
                    child.fmt_indented(f, depth + 1)?;
                }
                Ok(())
            }
            Node::Leaf(l) => writeln!(f, "{:indent$}{} = {}", "", l.name, l.text(), indent = indent),
        }
    }
}

impl Directory
{
    /// Create an empty directory.
    pub fn new(name: String, attributes: NodeAttributes) -> Self
    {
        Directory {
            name,
            attributes,
            children: vec![],
            index: HashMap::new(),
        }
    }

    /// Directory name.
    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// Attributes of the field the directory was decoded from.
    pub fn attributes(&self) -> NodeAttributes
    {
        self.attributes
    }

    /// Lists the children by name in wire order.
    pub fn list_children(&self) -> impl Iterator<Item = (&str, &Node)>
    {
        self.children.iter().map(|c| (c.name(), c))
    }

    /// The children in wire order.
    pub fn children(&self) -> &[Node]
    {
        &self.children
    }

    /// Gets a child by name.
    pub fn get(&self, name: &str) -> Option<&Node>
    {
        self.index.get(name).map(|&idx| &self.children[idx])
    }

    /// Gets a child directory by name for merging another occurrence into it.
    pub(crate) fn get_directory_mut(&mut self, name: &str) -> Option<&mut Directory>
    {
        match self.index.get(name) {
            Some(&idx) => match &mut self.children[idx] {
                Node::Directory(d) => Some(d),
                Node::Leaf(_) => None,
            },
            None => None,
        }
    }

    /// Number of children.
    pub fn len(&self) -> usize
    {
        self.children.len()
    }

    /// True, if the directory has no children.
    pub fn is_empty(&self) -> bool
    {
        self.children.is_empty()
    }

    /// Adds a child.
    ///
    /// A child with the same name decoded from the same field is replaced in place. A child with
    /// the same name from a different field is left alone and the node is returned as the error.
    pub(crate) fn insert(&mut self, node: Node) -> Result<(), Node>
    {
        match self.index.get(node.name()) {
            Some(&idx) => {
                let existing = &mut self.children[idx];
                if existing.attributes().field_number != node.attributes().field_number {
                    return Err(node);
                }
                *existing = node;
            }
            None => {
                self.index.insert(node.name().to_string(), self.children.len());
                self.children.push(node);
            }
        }

        Ok(())
    }
}

impl Leaf
{
    /// Create a leaf.
    pub fn new(name: String, attributes: NodeAttributes, contents: Bytes) -> Self
    {
        Leaf {
            name,
            attributes,
            contents,
        }
    }

    /// Leaf name.
    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// Attributes of the field the leaf was decoded from.
    pub fn attributes(&self) -> NodeAttributes
    {
        self.attributes
    }

    /// The rendered value.
    ///
    /// `string` fields hold the bytes exactly as they were on the wire, which need not be UTF-8.
    pub fn contents(&self) -> &Bytes
    {
        &self.contents
    }

    /// Size of the contents in bytes.
    pub fn len(&self) -> usize
    {
        self.contents.len()
    }

    /// True, if the contents are empty.
    pub fn is_empty(&self) -> bool
    {
        self.contents.is_empty()
    }

    /// The contents as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> Cow<'_, str>
    {
        String::from_utf8_lossy(&self.contents)
    }

    /// Reads up to `size` bytes starting at `offset`.
    ///
    /// Reading past the end returns an empty slice.
    pub fn read_at(&self, offset: usize, size: usize) -> &[u8]
    {
        let start = offset.min(self.contents.len());
        let end = start.saturating_add(size).min(self.contents.len());
        &self.contents[start..end]
    }
}

impl ValueTree
{
    /// Create a tree from the root directory.
    pub fn new(root: Directory) -> Self
    {
        ValueTree {
            root: Node::Directory(root),
        }
    }

    /// The root node. Always a directory.
    pub fn root(&self) -> &Node
    {
        &self.root
    }

    /// The root directory.
    pub fn root_directory(&self) -> &Directory
    {
        match &self.root {
            Node::Directory(d) => d,
            Node::Leaf(_) => unreachable!("ValueTree root is always a directory"),
        }
    }

    /// Finds a node by a `/` separated path relative to the root.
    ///
    /// An empty path refers to the root itself.
    pub fn lookup(&self, path: &str) -> Option<&Node>
    {
        let mut current = &self.root;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = current.as_directory()?.get(part)?;
        }
        Some(current)
    }
}

impl fmt::Display for ValueTree
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        self.root.fmt_indented(f, 0)
    }
}
