//! The visibility rule shared by every component.

use crate::agent::Viewer;
use crate::tags::{MemoryDomain, MemoryScope};

/// Anything that carries an owner, a scope and a domain.
pub trait Scoped {
    fn owner(&self) -> &str;
    fn scope(&self) -> MemoryScope;
    fn domain(&self) -> MemoryDomain;
}

/// Decide whether `viewer` may see `item`.
///
/// - the owner always sees its own items
/// - `Global` is visible to everyone
/// - `Domain` is visible when the viewer's domain equals the item's domain,
///   or the viewer is a General-domain agent
/// - `Private` is visible to the owner only
pub fn can_access(viewer: &Viewer, item: &impl Scoped) -> bool {
    if viewer.agent_id == item.owner() {
        return true;
    }
    match item.scope() {
        MemoryScope::Global => true,
        MemoryScope::Domain => match viewer.domain {
            Some(domain) => domain.is_general() || domain == item.domain(),
            None => false,
        },
        MemoryScope::Private => false,
    }
}
