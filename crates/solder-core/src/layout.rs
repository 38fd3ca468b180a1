//! Native type layout model
//!
//! Layouts describe native data shapes as an immutable tree: scalars,
//! sequences (arrays), groups (structs and unions), and explicit padding.
//! A layout carries size and alignment information only; all marshaling
//! behavior lives in the engine crate.
//!
//! Layouts may be annotated with a name for correlation with native source
//! symbols. Names are ignored by equality and hashing so that named and
//! unnamed descriptions of the same shape are interchangeable as cache keys.

use std::hash::{Hash, Hasher};

/// Alignment used for zero-length (incomplete/VLA) arrays and for large
/// arrays used as standalone variables.
pub const VECTOR_ALIGN: usize = 16;

/// Errors detected while constructing a layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// Scalar byte size is not one of the supported widths.
    #[error("invalid scalar size: {0} (expected 1, 2, 4 or 8)")]
    InvalidScalarSize(usize),

    /// A group member sits at an offset its own alignment does not divide.
    #[error("member {index} at offset {offset} violates alignment {align}")]
    MisalignedMember {
        /// Position of the offending member.
        index: usize,
        /// Declared byte offset of the member.
        offset: usize,
        /// Required alignment of the member's layout.
        align: usize,
    },

    /// A group's declared size does not cover all of its members.
    #[error("group size {size} does not cover member ending at {end}")]
    GroupTooSmall {
        /// Declared group byte size.
        size: usize,
        /// End offset of the furthest-reaching member.
        end: usize,
    },

    /// A group's declared size is not a multiple of its alignment.
    #[error("group size {size} is not a multiple of alignment {align}")]
    UnpaddedGroup {
        /// Declared group byte size.
        size: usize,
        /// Group alignment (max of member alignments).
        align: usize,
    },
}

/// Scalar storage classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Integer of 1, 2, 4 or 8 bytes.
    Int,
    /// IEEE float of 4 or 8 bytes.
    Float,
    /// Machine pointer (8 bytes).
    Pointer,
}

/// Whether a group lays its members out sequentially or overlapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    /// Sequential members (C struct).
    Struct,
    /// Overlapping members (C union).
    Union,
}

/// A member of a group layout: a layout placed at a fixed byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Member {
    /// Byte offset of the member within the group.
    pub offset: usize,
    /// The member's own layout.
    pub layout: Layout,
}

/// The structural variants of a layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LayoutNode {
    /// A scalar value: integer, float or pointer.
    Scalar {
        /// Byte size (also the scalar's natural alignment).
        size: usize,
        /// Storage classification of the scalar.
        kind: ScalarKind,
    },
    /// A homogeneous array of `count` elements.
    Sequence {
        /// Element layout.
        element: Box<Layout>,
        /// Element count; zero marks an incomplete/VLA array.
        count: usize,
    },
    /// An aggregate of members at fixed offsets.
    Group {
        /// Struct or union semantics.
        kind: GroupKind,
        /// Ordered members.
        members: Vec<Member>,
        /// Total byte size including trailing padding.
        size: usize,
    },
    /// Explicit padding bytes.
    Padding {
        /// Number of padding bytes.
        bytes: usize,
    },
}

/// An immutable native type layout, optionally named.
#[derive(Debug, Clone, Eq)]
pub struct Layout {
    node: LayoutNode,
    name: Option<String>,
}

// Names are annotations only; two layouts describing the same shape must
// compare and hash identically regardless of naming.
impl PartialEq for Layout {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl Hash for Layout {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.hash(state);
    }
}

impl Layout {
    /// An integer scalar of the given byte size.
    pub fn int(size: usize) -> Result<Layout, LayoutError> {
        Layout::scalar(size, ScalarKind::Int)
    }

    /// A float scalar of the given byte size (4 or 8).
    pub fn float(size: usize) -> Result<Layout, LayoutError> {
        if size != 4 && size != 8 {
            return Err(LayoutError::InvalidScalarSize(size));
        }
        Layout::scalar(size, ScalarKind::Float)
    }

    /// A machine pointer scalar.
    pub fn pointer() -> Layout {
        Layout {
            node: LayoutNode::Scalar {
                size: 8,
                kind: ScalarKind::Pointer,
            },
            name: None,
        }
    }

    fn scalar(size: usize, kind: ScalarKind) -> Result<Layout, LayoutError> {
        if !matches!(size, 1 | 2 | 4 | 8) {
            return Err(LayoutError::InvalidScalarSize(size));
        }
        Ok(Layout {
            node: LayoutNode::Scalar { size, kind },
            name: None,
        })
    }

    /// An array of `count` elements. A zero count marks an incomplete array.
    pub fn sequence(element: Layout, count: usize) -> Layout {
        Layout {
            node: LayoutNode::Sequence {
                element: Box::new(element),
                count,
            },
            name: None,
        }
    }

    /// Explicit padding of the given byte count.
    pub fn padding(bytes: usize) -> Layout {
        Layout {
            node: LayoutNode::Padding { bytes },
            name: None,
        }
    }

    /// A struct laid out sequentially with natural padding between members.
    ///
    /// Member offsets are computed by aligning a running cursor to each
    /// member's alignment; the total size is padded to the struct alignment.
    pub fn struct_of(members: Vec<Layout>) -> Result<Layout, LayoutError> {
        let mut placed = Vec::with_capacity(members.len());
        let mut cursor = 0usize;
        let mut max_align = 1usize;
        for layout in members {
            let align = layout.alignment(false);
            max_align = max_align.max(align);
            cursor = align_up(cursor, align);
            let size = layout.byte_size();
            placed.push(Member {
                offset: cursor,
                layout,
            });
            cursor += size;
        }
        let size = align_up(cursor, max_align);
        Layout::group(GroupKind::Struct, placed, size)
    }

    /// A union: all members at offset zero, sized to the largest member
    /// padded to the union alignment.
    pub fn union_of(members: Vec<Layout>) -> Result<Layout, LayoutError> {
        let mut placed = Vec::with_capacity(members.len());
        let mut max_align = 1usize;
        let mut max_size = 0usize;
        for layout in members {
            max_align = max_align.max(layout.alignment(false));
            max_size = max_size.max(layout.byte_size());
            placed.push(Member { offset: 0, layout });
        }
        let size = align_up(max_size, max_align);
        Layout::group(GroupKind::Union, placed, size)
    }

    /// A group from explicit member offsets and total size.
    ///
    /// Structural validation happens here: every member offset must be a
    /// multiple of that member's alignment, the declared size must cover
    /// every member, and the size must be a multiple of the group alignment.
    pub fn group(
        kind: GroupKind,
        members: Vec<Member>,
        size: usize,
    ) -> Result<Layout, LayoutError> {
        let mut max_align = 1usize;
        let mut end = 0usize;
        for (index, member) in members.iter().enumerate() {
            let align = member.layout.alignment(false);
            max_align = max_align.max(align);
            if member.offset % align != 0 {
                return Err(LayoutError::MisalignedMember {
                    index,
                    offset: member.offset,
                    align,
                });
            }
            end = end.max(member.offset + member.layout.byte_size());
        }
        if size < end {
            return Err(LayoutError::GroupTooSmall { size, end });
        }
        if size % max_align != 0 {
            return Err(LayoutError::UnpaddedGroup {
                size,
                align: max_align,
            });
        }
        Ok(Layout {
            node: LayoutNode::Group {
                kind,
                members,
                size,
            },
            name: None,
        })
    }

    /// Annotate the layout with a source-level name.
    pub fn with_name(mut self, name: impl Into<String>) -> Layout {
        self.name = Some(name.into());
        self
    }

    /// The annotated name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The structural node of this layout.
    pub fn node(&self) -> &LayoutNode {
        &self.node
    }

    /// Total byte size of the layout.
    pub fn byte_size(&self) -> usize {
        match &self.node {
            LayoutNode::Scalar { size, .. } => *size,
            LayoutNode::Sequence { element, count } => element.byte_size() * count,
            LayoutNode::Group { size, .. } => *size,
            LayoutNode::Padding { bytes } => *bytes,
        }
    }

    /// Alignment requirement of the layout.
    ///
    /// `is_var` indicates the layout is used as a standalone variable, which
    /// raises the alignment of large arrays to the vector alignment.
    pub fn alignment(&self, is_var: bool) -> usize {
        match &self.node {
            // A scalar aligns to its own size.
            LayoutNode::Scalar { size, .. } => *size,
            LayoutNode::Sequence { element, count } => {
                if *count == 0 {
                    // VLA or incomplete
                    VECTOR_ALIGN
                } else if self.byte_size() >= VECTOR_ALIGN && is_var {
                    VECTOR_ALIGN
                } else {
                    element.alignment(false)
                }
            }
            LayoutNode::Group { members, .. } => members
                .iter()
                .map(|m| m.layout.alignment(false))
                .max()
                .unwrap_or(1),
            LayoutNode::Padding { .. } => 1,
        }
    }

    /// Round `addr` up to this layout's required alignment.
    pub fn align(&self, is_var: bool, addr: usize) -> usize {
        align_up(addr, self.alignment(is_var))
    }

    /// True for group layouts.
    pub fn is_group(&self) -> bool {
        matches!(self.node, LayoutNode::Group { .. })
    }
}

/// Round `addr` up to a multiple of `align` (a power of two).
pub fn align_up(addr: usize, align: usize) -> usize {
    (addr.wrapping_sub(1) | (align - 1)).wrapping_add(1)
}
