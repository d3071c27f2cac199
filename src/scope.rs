//! Access-control scope: the set of vendor partitions a caller may see and
//! mutate.
//!
//! A scope is an ephemeral value resolved at the request boundary and passed
//! explicitly into every core call; nothing here reaches back into a session
//! or a content tree. Resolving to an empty vendor set is an authorization
//! failure, not an empty result — "nothing matched" and "not allowed to
//! look" must stay distinguishable.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{CoreError, CoreResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    vendor_ids: BTreeSet<Uuid>,
}

impl Scope {
    /// Builds a scope from a caller's resolved vendor set.
    pub fn for_vendors<I>(vendor_ids: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = Uuid>,
    {
        let vendor_ids: BTreeSet<Uuid> = vendor_ids.into_iter().collect();
        if vendor_ids.is_empty() {
            return Err(CoreError::Unauthorized(
                "caller is not a vendor for anything".to_string(),
            ));
        }
        Ok(Self { vendor_ids })
    }

    pub fn covers(&self, vendor_id: Uuid) -> bool {
        self.vendor_ids.contains(&vendor_id)
    }

    pub fn vendor_ids(&self) -> &BTreeSet<Uuid> {
        &self.vendor_ids
    }

    /// Narrows to a single vendor, e.g. for a per-vendor listing filter.
    /// Fails when the requested vendor is outside the caller's scope.
    pub fn restrict_to(&self, vendor_id: Uuid) -> CoreResult<Scope> {
        if !self.covers(vendor_id) {
            return Err(CoreError::Unauthorized(format!(
                "vendor {vendor_id} is outside the caller's scope"
            )));
        }
        Ok(Scope {
            vendor_ids: [vendor_id].into_iter().collect(),
        })
    }
}
