//! Access policy applied to everything the store hands back.
//!
//! The memory components already push the visibility rule into their index
//! queries. The store checks every returned item again with the same rule
//! and counts what it drops, so a leak in a push-down filter shows up as a
//! non-zero `denied` count rather than as a visible record.

use concord_types::{Scoped, Viewer, can_access};

/// Visibility checks for a resolved caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessPolicy;

impl AccessPolicy {
    pub fn can_access(&self, viewer: &Viewer, item: &impl Scoped) -> bool {
        can_access(viewer, item)
    }

    /// Keep the items `viewer` may see. Returns them with the number dropped.
    pub fn retain_visible<T: Scoped>(&self, viewer: &Viewer, items: Vec<T>) -> (Vec<T>, usize) {
        self.retain_visible_by(viewer, items, |item| item)
    }

    /// [`retain_visible`](Self::retain_visible) for wrappers around a scoped item.
    pub fn retain_visible_by<T, S: Scoped>(
        &self,
        viewer: &Viewer,
        items: Vec<T>,
        scoped: impl Fn(&T) -> &S,
    ) -> (Vec<T>, usize) {
        let before = items.len();
        let visible: Vec<T> = items
            .into_iter()
            .filter(|item| can_access(viewer, scoped(item)))
            .collect();
        let denied = before - visible.len();
        (visible, denied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_types::{MemoryDomain, MemoryRecord, MemoryScope};

    #[test]
    fn test_retain_visible_counts_denials() {
        let records = vec![
            MemoryRecord::episodic("mine", "a", MemoryDomain::Pet).with_scope(MemoryScope::Private),
            MemoryRecord::episodic("theirs", "b", MemoryDomain::Pet).with_scope(MemoryScope::Private),
            MemoryRecord::episodic("shared", "b", MemoryDomain::Pet).with_scope(MemoryScope::Domain),
            MemoryRecord::episodic("other domain", "b", MemoryDomain::Home)
                .with_scope(MemoryScope::Domain),
        ];
        let viewer = Viewer::new("a", Some(MemoryDomain::Pet));
        let (visible, denied) = AccessPolicy.retain_visible(&viewer, records);
        let contents: Vec<_> = visible.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["mine", "shared"]);
        assert_eq!(denied, 2);
    }

    #[test]
    fn test_retain_by_projection() {
        let wrapped = vec![(
            1,
            MemoryRecord::episodic("x", "b", MemoryDomain::Email).with_scope(MemoryScope::Global),
        )];
        let (kept, denied) =
            AccessPolicy.retain_visible_by(&Viewer::new("z", None), wrapped, |(_, r)| r);
        assert_eq!(kept.len(), 1);
        assert_eq!(denied, 0);
    }
}
