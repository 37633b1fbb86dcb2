//! Read-only filesystem view of a value tree.
//!
//! The [`InodeTable`] numbers the nodes of a [`ValueTree`] and answers the directory listing,
//! attribute and read requests a filesystem needs. With the `fuse` feature the table can be
//! served as a FUSE mount with [`mount`].

use crate::tree::{Node, NodeAttributes, ValueTree};
use snafu::Snafu;
use std::collections::VecDeque;

/// Inode of the root directory.
pub const ROOT_INODE: u64 = 1;

/// Permissions of directories.
pub const DIRECTORY_PERMISSIONS: u16 = 0o555;

/// Permissions of files.
pub const FILE_PERMISSIONS: u16 = 0o444;

/// Error answering a filesystem request.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum FsError
{
    /// No such inode or directory entry.
    #[snafu(display("No entry for inode {}", inode))]
    NotFound
    {
        /// The inode that was looked up, or the parent directory for name lookups.
        inode: u64,
    },

    /// A directory operation on a file.
    #[snafu(display("Inode {} is not a directory", inode))]
    NotADirectory
    {
        /// The file inode.
        inode: u64,
    },

    /// A file operation on a directory.
    #[snafu(display("Inode {} is a directory", inode))]
    IsADirectory
    {
        /// The directory inode.
        inode: u64,
    },
}

impl FsError
{
    /// The errno reported to the kernel.
    #[cfg(feature = "fuse")]
    pub fn errno(&self) -> i32
    {
        match self {
            FsError::NotFound { .. } => libc::ENOENT,
            FsError::NotADirectory { .. } => libc::ENOTDIR,
            FsError::IsADirectory { .. } => libc::EISDIR,
        }
    }
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind
{
    /// A decoded message.
    Directory,

    /// A decoded scalar value.
    File,
}

/// Attributes of an inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryAttr
{
    /// Inode number.
    pub inode: u64,

    /// Entry kind.
    pub kind: EntryKind,

    /// Size of the contents for files, number of children for directories.
    pub size: u64,

    /// Permission bits.
    pub perm: u16,

    /// Attributes of the field the node was decoded from.
    pub attributes: NodeAttributes,
}

/// A single entry in a directory listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry<'t>
{
    /// Inode of the entry.
    pub inode: u64,

    /// Entry kind.
    pub kind: EntryKind,

    /// Entry name.
    pub name: &'t str,
}

#[derive(Debug)]
struct InodeEntry<'t>
{
    node: &'t Node,
    parent: u64,
    children: Vec<u64>,
}

/// Inode numbering of a value tree.
///
/// The root directory is [`ROOT_INODE`] and the rest of the nodes are numbered in breadth-first
/// order, so the children of a directory always have consecutive inodes.
#[derive(Debug)]
pub struct InodeTable<'t>
{
    entries: Vec<InodeEntry<'t>>,
}

impl<'t> InodeTable<'t>
{
    /// Number the nodes of the tree.
    pub fn new(tree: &'t ValueTree) -> Self
    {
        let mut entries = vec![InodeEntry {
            node: tree.root(),
            parent: ROOT_INODE,
            children: vec![],
        }];

        let mut queue = VecDeque::new();
        queue.push_back(0);
        while let Some(idx) = queue.pop_front() {
            let node: &'t Node = entries[idx].node;
            let dir = match node {
                Node::Directory(d) => d,
                Node::Leaf(_) => continue,
            };

            for child in dir.children() {
                let child_idx = entries.len();
                entries.push(InodeEntry {
                    node: child,
                    parent: to_inode(idx),
                    children: vec![],
                });
                entries[idx].children.push(to_inode(child_idx));
                queue.push_back(child_idx);
            }
        }

        log::debug!("Numbered {} inodes", entries.len());
        InodeTable { entries }
    }

    /// Number of inodes.
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// Always false; the root directory exists even for an empty tree.
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// The node behind the inode.
    pub fn node(&self, inode: u64) -> Option<&'t Node>
    {
        self.entry(inode).ok().map(|e| e.node)
    }

    /// Inode of the parent directory. The root is its own parent.
    pub fn parent(&self, inode: u64) -> Result<u64, FsError>
    {
        self.entry(inode).map(|e| e.parent)
    }

    /// Attributes of the inode.
    pub fn attr(&self, inode: u64) -> Result<EntryAttr, FsError>
    {
        let entry = self.entry(inode)?;
        let (kind, size, perm) = match entry.node {
            Node::Directory(d) => (EntryKind::Directory, d.len() as u64, DIRECTORY_PERMISSIONS),
            Node::Leaf(l) => (EntryKind::File, l.len() as u64, FILE_PERMISSIONS),
        };

        Ok(EntryAttr {
            inode,
            kind,
            size,
            perm,
            attributes: entry.node.attributes(),
        })
    }

    /// Finds a directory entry by name.
    pub fn lookup(&self, parent: u64, name: &str) -> Result<EntryAttr, FsError>
    {
        let inode = self
            .children(parent)?
            .into_iter()
            .find(|c| c.name == name)
            .map(|c| c.inode)
            .ok_or(FsError::NotFound { inode: parent })?;
        self.attr(inode)
    }

    /// Lists the directory in wire order.
    pub fn children(&self, inode: u64) -> Result<Vec<DirEntry<'t>>, FsError>
    {
        let entry = self.entry(inode)?;
        if let Node::Leaf(_) = entry.node {
            return Err(FsError::NotADirectory { inode });
        }

        Ok(entry
            .children
            .iter()
            .map(|&child| {
                let node = self.entries[to_index(child)].node;
                DirEntry {
                    inode: child,
                    kind: match node {
                        Node::Directory(_) => EntryKind::Directory,
                        Node::Leaf(_) => EntryKind::File,
                    },
                    name: node.name(),
                }
            })
            .collect())
    }

    /// Reads up to `size` bytes of a file starting at `offset`.
    pub fn read(&self, inode: u64, offset: u64, size: u32) -> Result<&'t [u8], FsError>
    {
        match self.entry(inode)?.node {
            Node::Leaf(l) => {
                let offset = usize::try_from(offset).unwrap_or(usize::MAX);
                Ok(l.read_at(offset, size as usize))
            }
            Node::Directory(_) => Err(FsError::IsADirectory { inode }),
        }
    }

    fn entry(&self, inode: u64) -> Result<&InodeEntry<'t>, FsError>
    {
        inode
            .checked_sub(ROOT_INODE)
            .and_then(|idx| usize::try_from(idx).ok())
            .and_then(|idx| self.entries.get(idx))
            .ok_or(FsError::NotFound { inode })
    }
}

fn to_inode(idx: usize) -> u64
{
    idx as u64 + ROOT_INODE
}

fn to_index(inode: u64) -> usize
{
    (inode - ROOT_INODE) as usize
}

#[cfg(feature = "fuse")]
pub use self::fuse::mount;

#[cfg(feature = "fuse")]
mod fuse
{
    use super::*;
    use std::ffi::OsStr;
    use std::path::Path;
    use std::time::{Duration, SystemTime};

    const TTL: Duration = Duration::from_secs(1);

    struct ProtoFs<'t>
    {
        inodes: InodeTable<'t>,
        mounted_at: SystemTime,
    }

    impl ProtoFs<'_>
    {
        fn file_attr(&self, attr: &EntryAttr) -> fuser::FileAttr
        {
            let (kind, nlink) = match attr.kind {
                EntryKind::Directory => (fuser::FileType::Directory, 2),
                EntryKind::File => (fuser::FileType::RegularFile, 1),
            };
            fuser::FileAttr {
                ino: attr.inode,
                size: attr.size,
                blocks: (attr.size + 511) / 512,
                atime: self.mounted_at,
                mtime: self.mounted_at,
                ctime: self.mounted_at,
                crtime: self.mounted_at,
                kind,
                perm: attr.perm,
                nlink,
                uid: 0,
                gid: 0,
                rdev: 0,
                flags: 0,
                blksize: 512,
            }
        }
    }

    impl fuser::Filesystem for ProtoFs<'_>
    {
        fn lookup(
            &mut self,
            _req: &fuser::Request<'_>,
            parent: u64,
            name: &OsStr,
            reply: fuser::ReplyEntry,
        )
        {
            match self.inodes.lookup(parent, &name.to_string_lossy()) {
                Ok(attr) => reply.entry(&TTL, &self.file_attr(&attr), 0),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn getattr(
            &mut self,
            _req: &fuser::Request<'_>,
            inode: u64,
            _fh: Option<u64>,
            reply: fuser::ReplyAttr,
        )
        {
            match self.inodes.attr(inode) {
                Ok(attr) => reply.attr(&TTL, &self.file_attr(&attr)),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn readdir(
            &mut self,
            _req: &fuser::Request<'_>,
            inode: u64,
            _fh: u64,
            offset: i64,
            mut reply: fuser::ReplyDirectory,
        )
        {
            let (children, parent) = match (self.inodes.children(inode), self.inodes.parent(inode))
            {
                (Ok(children), Ok(parent)) => (children, parent),
                (Err(e), _) | (_, Err(e)) => {
                    reply.error(e.errno());
                    return;
                }
            };

            let mut listing = Vec::with_capacity(children.len() + 2);
            listing.push((inode, fuser::FileType::Directory, "."));
            listing.push((parent, fuser::FileType::Directory, ".."));
            for child in children {
                let kind = match child.kind {
                    EntryKind::Directory => fuser::FileType::Directory,
                    EntryKind::File => fuser::FileType::RegularFile,
                };
                listing.push((child.inode, kind, child.name));
            }

            let start = offset.max(0) as usize;
            for (idx, (inode, kind, name)) in listing.into_iter().enumerate().skip(start) {
                if reply.add(inode, (idx + 1) as i64, kind, name) {
                    break;
                }
            }
            reply.ok();
        }

        fn open(
            &mut self,
            _req: &fuser::Request<'_>,
            inode: u64,
            flags: i32,
            reply: fuser::ReplyOpen,
        )
        {
            if flags & libc::O_ACCMODE != libc::O_RDONLY {
                reply.error(libc::EROFS);
                return;
            }
            match self.inodes.read(inode, 0, 0) {
                Ok(_) => reply.opened(0, 0),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn read(
            &mut self,
            _req: &fuser::Request<'_>,
            inode: u64,
            _fh: u64,
            offset: i64,
            size: u32,
            _flags: i32,
            _lock_owner: Option<u64>,
            reply: fuser::ReplyData,
        )
        {
            if offset < 0 {
                reply.error(libc::EINVAL);
                return;
            }
            match self.inodes.read(inode, offset as u64, size) {
                Ok(data) => reply.data(data),
                Err(e) => reply.error(e.errno()),
            }
        }
    }

    /// Serves the tree read-only at `mountpoint` until the filesystem is unmounted.
    ///
    /// The mount is torn down automatically when the process exits.
    pub fn mount(tree: &ValueTree, mountpoint: &Path) -> std::io::Result<()>
    {
        let filesystem = ProtoFs {
            inodes: InodeTable::new(tree),
            mounted_at: SystemTime::now(),
        };
        let options = [
            fuser::MountOption::FSName("protofs".to_owned()),
            fuser::MountOption::AutoUnmount,
            fuser::MountOption::RO,
        ];

        log::debug!("Mounting at {}", mountpoint.display());
        fuser::mount2(filesystem, mountpoint, &options)
    }
}

#[cfg(test)]
mod test
{
    use super::*;
    use crate::context::Label;
    use crate::decode::WireType;
    use crate::tree::{Directory, Leaf};
    use bytes::Bytes;

    fn attrs(number: u64, wire_type: WireType) -> NodeAttributes
    {
        NodeAttributes {
            field_number: number,
            wire_type,
            label: Label::Optional,
        }
    }

    // Message/
    //   a = "hello"
    //   sub/
    //     x = "1"
    //   b = "world!"
    fn sample() -> ValueTree
    {
        let mut sub = Directory::new("sub".to_string(), attrs(2, WireType::LengthDelimited));
        sub.insert(Node::Leaf(Leaf::new(
            "x".to_string(),
            attrs(1, WireType::Varint),
            Bytes::from_static(b"1"),
        )))
        .unwrap();

        let mut root = Directory::new("Message".to_string(), NodeAttributes::root());
        root.insert(Node::Leaf(Leaf::new(
            "a".to_string(),
            attrs(1, WireType::LengthDelimited),
            Bytes::from_static(b"hello"),
        )))
        .unwrap();
        root.insert(Node::Directory(sub)).unwrap();
        root.insert(Node::Leaf(Leaf::new(
            "b".to_string(),
            attrs(3, WireType::LengthDelimited),
            Bytes::from_static(b"world!"),
        )))
        .unwrap();
        ValueTree::new(root)
    }

    #[test]
    fn breadth_first_numbering()
    {
        let tree = sample();
        let table = InodeTable::new(&tree);
        assert_eq!(table.len(), 5);

        let names: Vec<_> = (1..=5)
            .map(|i| table.node(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["Message", "a", "sub", "b", "x"]);
        assert!(table.node(0).is_none());
        assert!(table.node(6).is_none());

        assert_eq!(table.parent(ROOT_INODE), Ok(ROOT_INODE));
        assert_eq!(table.parent(5), Ok(3));
    }

    #[test]
    fn attributes()
    {
        let tree = sample();
        let table = InodeTable::new(&tree);

        let root = table.attr(ROOT_INODE).unwrap();
        assert_eq!(root.kind, EntryKind::Directory);
        assert_eq!(root.perm, 0o555);
        assert_eq!(root.size, 3);

        let b = table.lookup(ROOT_INODE, "b").unwrap();
        assert_eq!(b.inode, 4);
        assert_eq!(b.kind, EntryKind::File);
        assert_eq!(b.perm, 0o444);
        assert_eq!(b.size, 6);
        assert_eq!(b.attributes.field_number, 3);
    }

    #[test]
    fn listing_and_reads()
    {
        let tree = sample();
        let table = InodeTable::new(&tree);

        let children = table.children(ROOT_INODE).unwrap();
        assert_eq!(
            children,
            vec![
                DirEntry {
                    inode: 2,
                    kind: EntryKind::File,
                    name: "a"
                },
                DirEntry {
                    inode: 3,
                    kind: EntryKind::Directory,
                    name: "sub"
                },
                DirEntry {
                    inode: 4,
                    kind: EntryKind::File,
                    name: "b"
                },
            ]
        );

        let x = table.lookup(3, "x").unwrap();
        assert_eq!(table.read(x.inode, 0, 100).unwrap(), b"1");
        assert_eq!(table.read(2, 1, 3).unwrap(), b"ell");
        assert_eq!(table.read(2, 10, 3).unwrap(), b"");
    }

    #[test]
    fn errors()
    {
        let tree = sample();
        let table = InodeTable::new(&tree);

        assert_eq!(
            table.lookup(ROOT_INODE, "missing"),
            Err(FsError::NotFound { inode: ROOT_INODE })
        );
        assert_eq!(table.lookup(2, "x"), Err(FsError::NotADirectory { inode: 2 }));
        assert_eq!(table.children(4), Err(FsError::NotADirectory { inode: 4 }));
        assert_eq!(table.read(3, 0, 1), Err(FsError::IsADirectory { inode: 3 }));
        assert_eq!(table.attr(42), Err(FsError::NotFound { inode: 42 }));
    }
}
