//! # Type hierarchy resolution.
//!
//! [`TypeHierarchyResolver`] computes, for a runtime [`MessageType`], the
//! ordered set of its ancestors and memoizes it.
//!
//! ## Ordering
//! ```text
//! scalar T : breadth-first over declared supertypes (first occurrence wins), then any
//! array [T]: [A] for every ancestor A of T (in T's order), then any
//! ```
//!
//! ## Rules
//! - The type itself is never part of its ancestors
//! - Reads never lock: the cache is an immutable snapshot behind [`ArcSwap`]
//! - A miss computes outside any lock and republishes with `rcu`; two threads
//!   missing the same key both compute the same value, and either write is kept

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::message::MessageType;

/// Memoizing resolver of type ancestors and array types.
pub struct TypeHierarchyResolver {
    ancestors: ArcSwap<HashMap<MessageType, Arc<[MessageType]>>>,
    arrays: ArcSwap<HashMap<MessageType, MessageType>>,
}

impl TypeHierarchyResolver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ancestors: ArcSwap::from_pointee(HashMap::new()),
            arrays: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Returns the ordered ancestors of `ty`, excluding `ty` itself.
    ///
    /// Never empty except for [`MessageType::any`].
    pub fn ancestors_of(&self, ty: MessageType) -> Arc<[MessageType]> {
        if let Some(hit) = self.ancestors.load().get(&ty) {
            return Arc::clone(hit);
        }

        let computed = self.compute(ty);
        self.ancestors.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.entry(ty).or_insert_with(|| Arc::clone(&computed));
            next
        });
        computed
    }

    /// Returns the array type whose elements are `element`.
    pub fn array_type_of(&self, element: MessageType) -> MessageType {
        if let Some(hit) = self.arrays.load().get(&element) {
            return *hit;
        }

        let array = element.array();
        self.arrays.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(element, array);
            next
        });
        array
    }

    fn compute(&self, ty: MessageType) -> Arc<[MessageType]> {
        if ty.is_any() {
            return Arc::from(Vec::new());
        }

        let mut out = Vec::new();
        if let Some(element) = ty.element() {
            for ancestor in self.ancestors_of(element).iter() {
                out.push(self.array_type_of(*ancestor));
            }
        } else {
            let mut seen = HashSet::new();
            seen.insert(ty);
            let mut queue: VecDeque<MessageType> = ty.direct_supertypes().into();

            while let Some(next) = queue.pop_front() {
                if next.is_any() || !seen.insert(next) {
                    continue;
                }
                out.push(next);
                queue.extend(next.direct_supertypes());
            }
        }
        out.push(MessageType::any());
        Arc::from(out)
    }
}

impl Default for TypeHierarchyResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    struct Root;
    impl Message for Root {}

    struct Left;
    impl Message for Left {
        fn supertypes() -> Vec<MessageType> {
            vec![MessageType::of::<Root>()]
        }
    }

    struct Right;
    impl Message for Right {
        fn supertypes() -> Vec<MessageType> {
            vec![MessageType::of::<Root>()]
        }
    }

    struct Diamond;
    impl Message for Diamond {
        fn supertypes() -> Vec<MessageType> {
            vec![MessageType::of::<Left>(), MessageType::of::<Right>()]
        }
    }

    #[test]
    fn test_breadth_first_with_diamond_dedupe() {
        let resolver = TypeHierarchyResolver::new();
        let got = resolver.ancestors_of(MessageType::of::<Diamond>());

        assert_eq!(
            got.as_ref(),
            &[
                MessageType::of::<Left>(),
                MessageType::of::<Right>(),
                MessageType::of::<Root>(),
                MessageType::any(),
            ]
        );
    }

    #[test]
    fn test_root_and_any() {
        let resolver = TypeHierarchyResolver::new();
        assert_eq!(
            resolver.ancestors_of(MessageType::of::<Root>()).as_ref(),
            &[MessageType::any()]
        );
        assert!(resolver.ancestors_of(MessageType::any()).is_empty());
    }

    #[test]
    fn test_array_ancestors_are_lifted() {
        let resolver = TypeHierarchyResolver::new();
        let arr = resolver.array_type_of(MessageType::of::<Left>());
        let got = resolver.ancestors_of(arr);

        assert_eq!(
            got.as_ref(),
            &[
                MessageType::of::<Root>().array(),
                MessageType::any().array(),
                MessageType::any(),
            ]
        );
    }

    #[test]
    fn test_results_are_memoized() {
        let resolver = TypeHierarchyResolver::new();
        let first = resolver.ancestors_of(MessageType::of::<Diamond>());
        let second = resolver.ancestors_of(MessageType::of::<Diamond>());
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_concurrent_misses_agree() {
        let resolver = Arc::new(TypeHierarchyResolver::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let r = Arc::clone(&resolver);
                std::thread::spawn(move || r.ancestors_of(MessageType::of::<Diamond>()).to_vec())
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(results[0].len(), 4);
    }
}
