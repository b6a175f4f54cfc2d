//! Packet type descriptors with shared, narrowable slots.
//!
//! A [`PacketType`] is a handle onto a slot that holds either a concrete
//! [`TypeSpec`] or a link to another handle. Clones of a handle share the
//! slot, and links form chains that end in a root slot. Narrowing a wildcard
//! or union writes a link into the root, so every handle that reaches that
//! root observes the narrowed type without revisiting the graph.
//!
//! ```rust
//! use flowgraph_core::{PacketType, TypeSpec};
//!
//! let produced = PacketType::exact("ImageFrame");
//! let consumed = PacketType::any();
//! let downstream = PacketType::new();
//! downstream.set_same_as(&consumed);
//!
//! assert!(consumed.narrow_to(&produced));
//! assert_eq!(downstream.spec(), TypeSpec::Exact("ImageFrame".into()));
//! ```

use core::fmt;
use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;

/// Resolved description of a packet type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeSpec {
    /// No type was declared.
    Unset,
    /// Wildcard: takes whatever type it is connected to.
    Any,
    /// A single named type.
    Exact(String),
    /// Any one of the named types.
    OneOf(BTreeSet<String>),
}

impl TypeSpec {
    /// Type names accepted by this spec, or `None` for a wildcard.
    fn accepted(&self) -> Option<Vec<&str>> {
        match self {
            TypeSpec::Unset => Some(Vec::new()),
            TypeSpec::Any => None,
            TypeSpec::Exact(name) => Some(vec![name.as_str()]),
            TypeSpec::OneOf(names) => Some(names.iter().map(String::as_str).collect()),
        }
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Unset => write!(f, "<unset>"),
            TypeSpec::Any => write!(f, "Any"),
            TypeSpec::Exact(name) => write!(f, "{name}"),
            TypeSpec::OneOf(names) => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                write!(f, "OneOf<{}>", names.join(", "))
            }
        }
    }
}

#[derive(Debug)]
enum Link {
    Spec(TypeSpec),
    SameAs(PacketType),
}

#[derive(Debug)]
struct Slot {
    link: Link,
    optional: bool,
}

/// Shared handle onto a packet type slot.
#[derive(Clone)]
pub struct PacketType {
    slot: Arc<RwLock<Slot>>,
}

impl Default for PacketType {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketType {
    fn with_spec(spec: TypeSpec) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Slot {
                link: Link::Spec(spec),
                optional: false,
            })),
        }
    }

    /// Creates an unset type.
    pub fn new() -> Self {
        Self::with_spec(TypeSpec::Unset)
    }

    /// Creates a wildcard type.
    pub fn any() -> Self {
        Self::with_spec(TypeSpec::Any)
    }

    /// Creates a concrete type.
    pub fn exact(name: impl Into<String>) -> Self {
        Self::with_spec(TypeSpec::Exact(name.into()))
    }

    /// Creates a union type.
    pub fn one_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_spec(TypeSpec::OneOf(names.into_iter().map(Into::into).collect()))
    }

    fn set_link(&self, link: Link) -> &Self {
        self.slot.write().link = link;
        self
    }

    /// Makes this handle a wildcard.
    pub fn set_any(&self) -> &Self {
        self.set_link(Link::Spec(TypeSpec::Any))
    }

    /// Makes this handle a concrete type.
    pub fn set_exact(&self, name: impl Into<String>) -> &Self {
        self.set_link(Link::Spec(TypeSpec::Exact(name.into())))
    }

    /// Makes this handle a union of the given types.
    ///
    /// A single-element union is stored as an exact type.
    pub fn set_one_of<I, S>(&self, names: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        let spec = if names.len() == 1 {
            TypeSpec::Exact(names.pop_first().unwrap_or_default())
        } else {
            TypeSpec::OneOf(names)
        };
        self.set_link(Link::Spec(spec))
    }

    /// Links this handle to `other`.
    ///
    /// Does nothing when both already resolve to the same root, which also
    /// rules out link cycles.
    pub fn set_same_as(&self, other: &PacketType) -> &Self {
        if !self.root().shares_slot(&other.root()) {
            self.set_link(Link::SameAs(other.clone()));
        }
        self
    }

    /// Marks the port as optional.
    pub fn set_optional(&self) -> &Self {
        self.slot.write().optional = true;
        self
    }

    /// Returns true if the port was marked optional.
    pub fn is_optional(&self) -> bool {
        self.slot.read().optional
    }

    /// Returns true if both handles share one slot.
    pub fn shares_slot(&self, other: &PacketType) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Follows links to the handle that holds the resolved spec.
    pub fn root(&self) -> PacketType {
        let mut current = self.clone();
        loop {
            let next = match &current.slot.read().link {
                Link::Spec(_) => None,
                Link::SameAs(next) => Some(next.clone()),
            };
            match next {
                Some(next) => current = next,
                None => return current,
            }
        }
    }

    /// Returns true if this handle links to another one.
    pub fn is_linked(&self) -> bool {
        matches!(self.slot.read().link, Link::SameAs(_))
    }

    /// The resolved spec.
    pub fn spec(&self) -> TypeSpec {
        match &self.root().slot.read().link {
            Link::Spec(spec) => spec.clone(),
            Link::SameAs(_) => TypeSpec::Unset,
        }
    }

    /// Returns true if a type was declared (directly or through a link).
    pub fn is_set(&self) -> bool {
        self.spec() != TypeSpec::Unset
    }

    /// Returns true if the resolved spec is a wildcard.
    pub fn is_any(&self) -> bool {
        self.spec() == TypeSpec::Any
    }

    /// Returns true if the resolved spec is a union.
    pub fn is_one_of(&self) -> bool {
        matches!(self.spec(), TypeSpec::OneOf(_))
    }

    /// Returns true if the resolved spec is a single concrete type.
    pub fn is_exact(&self) -> bool {
        matches!(self.spec(), TypeSpec::Exact(_))
    }

    /// Narrows this handle's root to `other`.
    ///
    /// Returns false when nothing changed because both already share a root.
    pub fn narrow_to(&self, other: &PacketType) -> bool {
        let root = self.root();
        if root.shares_slot(&other.root()) {
            return false;
        }
        root.set_link(Link::SameAs(other.clone()));
        true
    }

    /// Returns true if a packet of one type can flow into the other.
    ///
    /// Wildcards are consistent with everything; otherwise the accepted type
    /// sets must intersect. Unset types are never consistent.
    pub fn is_consistent_with(&self, other: &PacketType) -> bool {
        let (a, b) = (self.spec(), other.spec());
        if a == TypeSpec::Unset || b == TypeSpec::Unset {
            return false;
        }
        match (a.accepted(), b.accepted()) {
            (None, _) | (_, None) => true,
            (Some(left), Some(right)) => left.iter().any(|name| right.contains(name)),
        }
    }
}

impl fmt::Debug for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketType")
            .field("spec", &self.spec())
            .field("linked", &self.is_linked())
            .field("optional", &self.is_optional())
            .finish()
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spec())
    }
}
