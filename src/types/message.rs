//! # Runtime message types.
//!
//! Every value published on the bus implements [`Message`]. A message declares
//! its direct ancestors as [`MessageType`]s; the bus uses these to route a
//! subtype to handlers declared for any of its ancestors.
//!
//! ```text
//!            any
//!             ▲
//!         Envelope          (trait-like marker, no embedded value)
//!             ▲
//!  Notice ◄── Alert         (Alert embeds a Notice and exposes it via upcast)
//! ```
//!
//! ## Rules
//! - A [`MessageType`] is keyed by `(TypeId of the element type, array rank)`
//! - [`MessageType::any`] is the root of every hierarchy, scalar or array
//! - [`MessageArray`] is published as the array type of its element type
//! - [`DeadMessage`] is only ever delivered to handlers declared for exactly it
//!
//! ## Viewing a subtype as an ancestor
//! A handler declared for `Notice` receives `&Notice` even when an `Alert` was
//! published, provided `Alert::upcast` returns its embedded notice:
//!
//! ```rust
//! use std::any::{Any, TypeId};
//! use messagebus::{AnyMessage, Message, MessageType};
//!
//! struct Notice { text: String }
//! impl Message for Notice {}
//!
//! struct Alert { notice: Notice, level: u8 }
//! impl Message for Alert {
//!     fn supertypes() -> Vec<MessageType> {
//!         vec![MessageType::of::<Notice>()]
//!     }
//!     fn upcast(&self, target: TypeId) -> Option<&dyn Any> {
//!         self.notice.view_raw(target)
//!     }
//! }
//!
//! let alert = Alert { notice: Notice { text: "disk".into() }, level: 3 };
//! let erased: &dyn AnyMessage = &alert;
//! assert_eq!(erased.view::<Notice>().map(|n| n.text.as_str()), Some("disk"));
//! assert!(erased.is::<Alert>());
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A value that can be published on the bus.
pub trait Message: Any + Send + Sync + 'static {
    /// Direct ancestors of this type (superclass and interfaces equivalent).
    ///
    /// Only the direct ones: the resolver walks the rest transitively.
    fn supertypes() -> Vec<MessageType>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// Exposes an embedded ancestor value with the given `TypeId`.
    ///
    /// Delegate to the embedded value's [`AnyMessage::view_raw`] to make the
    /// lookup transitive.
    fn upcast(&self, target: TypeId) -> Option<&dyn Any> {
        let _ = target;
        None
    }
}

/// Object-safe erased view of a published message.
pub trait AnyMessage: Any + Send + Sync {
    /// Runtime type used for routing.
    fn message_type(&self) -> MessageType;

    /// The concrete value.
    fn as_any(&self) -> &dyn Any;

    /// Views the message as the type with `target` id: itself or an ancestor.
    fn view_raw(&self, target: TypeId) -> Option<&dyn Any>;

    /// Name of the concrete type, for diagnostics.
    fn type_name(&self) -> &'static str;
}

impl<M: Message> AnyMessage for M {
    fn message_type(&self) -> MessageType {
        MessageType::of::<M>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn view_raw(&self, target: TypeId) -> Option<&dyn Any> {
        if target == TypeId::of::<M>() {
            Some(self)
        } else {
            self.upcast(target)
        }
    }

    fn type_name(&self) -> &'static str {
        type_name::<M>()
    }
}

impl dyn AnyMessage {
    /// Views the message as `T` (its own type or an upcastable ancestor).
    pub fn view<T: Any>(&self) -> Option<&T> {
        self.view_raw(TypeId::of::<T>())?.downcast_ref::<T>()
    }

    /// Returns true if the concrete type is exactly `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

impl fmt::Debug for dyn AnyMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnyMessage({})", self.message_type())
    }
}

/// Runtime type key of a message.
///
/// Equality and hashing use only the element `TypeId` and the array rank.
#[derive(Clone, Copy)]
pub struct MessageType {
    id: TypeId,
    name: &'static str,
    rank: u8,
    supertypes: fn() -> Vec<MessageType>,
}

fn no_supertypes() -> Vec<MessageType> {
    Vec::new()
}

impl MessageType {
    /// Type key of `M`.
    #[must_use]
    pub fn of<M: Message>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            name: type_name::<M>(),
            rank: 0,
            supertypes: M::supertypes,
        }
    }

    /// Universal root type: every type has it as its last ancestor.
    #[must_use]
    pub fn any() -> Self {
        Self {
            id: TypeId::of::<dyn AnyMessage>(),
            name: "any",
            rank: 0,
            supertypes: no_supertypes,
        }
    }

    /// Array type whose elements have this type.
    ///
    /// Prefer [`TypeHierarchyResolver::array_type_of`](crate::TypeHierarchyResolver::array_type_of)
    /// on hot paths.
    #[must_use]
    pub fn array(self) -> Self {
        Self {
            rank: self.rank.saturating_add(1),
            ..self
        }
    }

    /// Element type of an array type, `None` for scalar types.
    #[must_use]
    pub fn element(self) -> Option<Self> {
        match self.rank {
            0 => None,
            r => Some(Self { rank: r - 1, ..self }),
        }
    }

    /// True for array types.
    #[inline]
    pub fn is_array(&self) -> bool {
        self.rank > 0
    }

    /// True for [`MessageType::any`].
    #[inline]
    pub fn is_any(&self) -> bool {
        self.rank == 0 && self.id == TypeId::of::<dyn AnyMessage>()
    }

    /// Number of array dimensions (0 for scalars).
    #[inline]
    pub fn rank(&self) -> u8 {
        self.rank
    }

    /// `TypeId` of the (innermost) element type.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Name of the (innermost) element type.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared direct ancestors. Arrays declare none; the resolver lifts them.
    pub fn direct_supertypes(&self) -> Vec<MessageType> {
        if self.is_array() {
            Vec::new()
        } else {
            (self.supertypes)()
        }
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.rank == other.rank
    }
}

impl Eq for MessageType {}

impl Hash for MessageType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.rank.hash(state);
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.rank {
            f.write_str("[")?;
        }
        f.write_str(self.name)?;
        for _ in 0..self.rank {
            f.write_str("]")?;
        }
        Ok(())
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// An array-of-messages publication.
///
/// Routed as the array type of `element`; items may be subtypes of it.
pub struct MessageArray {
    element: MessageType,
    items: Vec<Arc<dyn AnyMessage>>,
}

impl MessageArray {
    /// Builds an array of `M` values.
    pub fn new<M: Message>(items: Vec<M>) -> Self {
        Self {
            element: MessageType::of::<M>(),
            items: items
                .into_iter()
                .map(|m| Arc::new(m) as Arc<dyn AnyMessage>)
                .collect(),
        }
    }

    /// Builds an array from already shared items declared as `element`.
    pub fn from_shared(element: MessageType, items: Vec<Arc<dyn AnyMessage>>) -> Self {
        Self { element, items }
    }

    /// Declared element type.
    pub fn element_type(&self) -> MessageType {
        self.element
    }

    /// Items in publication order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn AnyMessage> {
        self.items.iter().map(|m| m.as_ref())
    }

    /// Views every item as `T`; items that cannot be viewed are skipped.
    pub fn views<T: Any>(&self) -> impl Iterator<Item = &T> {
        self.iter().filter_map(|m| m.view::<T>())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl AnyMessage for MessageArray {
    fn message_type(&self) -> MessageType {
        self.element.array()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn view_raw(&self, target: TypeId) -> Option<&dyn Any> {
        (target == TypeId::of::<MessageArray>()).then_some(self as &dyn Any)
    }

    fn type_name(&self) -> &'static str {
        type_name::<MessageArray>()
    }
}

/// Wraps the messages of a publication that reached no handler.
pub struct DeadMessage {
    messages: Vec<Arc<dyn AnyMessage>>,
}

impl DeadMessage {
    pub(crate) fn new(messages: Vec<Arc<dyn AnyMessage>>) -> Self {
        Self { messages }
    }

    /// The undelivered messages, in publication order.
    pub fn messages(&self) -> &[Arc<dyn AnyMessage>] {
        &self.messages
    }
}

impl Message for DeadMessage {}

#[cfg(test)]
mod tests {
    use super::*;

    struct Base(u32);
    impl Message for Base {}

    struct Derived {
        base: Base,
    }
    impl Message for Derived {
        fn supertypes() -> Vec<MessageType> {
            vec![MessageType::of::<Base>()]
        }
        fn upcast(&self, target: TypeId) -> Option<&dyn Any> {
            self.base.view_raw(target)
        }
    }

    struct Leaf {
        derived: Derived,
    }
    impl Message for Leaf {
        fn supertypes() -> Vec<MessageType> {
            vec![MessageType::of::<Derived>()]
        }
        fn upcast(&self, target: TypeId) -> Option<&dyn Any> {
            self.derived.view_raw(target)
        }
    }

    #[test]
    fn test_view_walks_embedded_ancestors() {
        let leaf = Leaf {
            derived: Derived { base: Base(7) },
        };
        let erased: &dyn AnyMessage = &leaf;

        assert!(erased.is::<Leaf>());
        assert!(!erased.is::<Base>());
        assert_eq!(erased.view::<Base>().map(|b| b.0), Some(7));
        assert!(erased.view::<Derived>().is_some());
        assert!(erased.view::<String>().is_none());
    }

    #[test]
    fn test_array_types_keep_element_identity() {
        let base = MessageType::of::<Base>();
        let arr = base.array();

        assert_ne!(base, arr);
        assert!(arr.is_array());
        assert_eq!(arr.element(), Some(base));
        assert_eq!(base.element(), None);
        assert_eq!(arr.to_string(), format!("[{}]", base.name()));
        assert!(arr.direct_supertypes().is_empty());
    }

    #[test]
    fn test_message_array_routes_as_array_type() {
        let array = MessageArray::new(vec![Base(1), Base(2)]);
        let erased: &dyn AnyMessage = &array;

        assert_eq!(erased.message_type(), MessageType::of::<Base>().array());
        assert_eq!(array.views::<Base>().map(|b| b.0).collect::<Vec<_>>(), vec![1, 2]);
        assert!(erased.view::<MessageArray>().is_some());
    }

    #[test]
    fn test_any_is_distinct_root() {
        let any = MessageType::any();
        assert!(any.is_any());
        assert!(!MessageType::of::<Base>().is_any());
        assert!(!any.array().is_any());
    }
}
