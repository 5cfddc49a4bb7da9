use crate::foundation::core::PageIndex;
use crate::foundation::ids::InstanceId;
use crate::model::store::DocumentStore;

/// A resolved deep link: open this instance at its last-viewed page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeepLinkTarget {
    /// The instance to open.
    pub instance: InstanceId,
    /// The page to resume on.
    pub page: PageIndex,
}

/// Resolve an opaque instance identifier from a host navigation layer.
///
/// Invalid or unknown identifiers resolve to `None` (logged, never a crash).
pub fn resolve_deep_link(store: &dyn DocumentStore, raw: &str) -> Option<DeepLinkTarget> {
    let Some(id) = InstanceId::parse(raw.trim()) else {
        tracing::debug!(raw, "deep link is not a valid instance id");
        return None;
    };
    match store.instance(id) {
        Ok(Some(instance)) => Some(DeepLinkTarget {
            instance: instance.id,
            page: instance.last_viewed_page,
        }),
        Ok(None) => {
            tracing::debug!(%id, "deep link references an unknown instance");
            None
        }
        Err(e) => {
            tracing::warn!(%id, error = %e, "deep link lookup failed");
            None
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/model/deeplink.rs"]
mod tests;
