//! Delegation reconciliation: the registrar only ever gets a whole new
//! name server set.

use std::collections::BTreeSet;

use crate::common::Result;
use crate::models::{Correction, Nameserver};

fn joined(set: &BTreeSet<&Nameserver>) -> String {
    set.iter().map(|ns| ns.name()).collect::<Vec<_>>().join(",")
}

/// Plans the registrar update for `domain`. Order, case and trailing dots
/// don't matter; if the sets differ a single correction calls `set` with
/// the desired servers. An empty desired set is never pushed.
pub fn nameserver_corrections<'a>(
    domain: &str,
    current: &[Nameserver],
    desired: &[Nameserver],
    set: impl FnOnce(Vec<Nameserver>) -> Result<()> + Send + 'a,
) -> Vec<Correction<'a>> {
    let have: BTreeSet<&Nameserver> = current.iter().collect();
    let want: BTreeSet<&Nameserver> = desired.iter().collect();

    if want.is_empty() {
        tracing::warn!(domain = domain, "No name servers declared, leaving the delegation alone");
        return Vec::new();
    }
    if have == want {
        tracing::debug!(domain = domain, "Delegation is up to date");
        return Vec::new();
    }

    let msg = format!("Update nameservers {} -> {}", joined(&have), joined(&want));
    let nameservers: Vec<Nameserver> = want.into_iter().cloned().collect();
    vec![Correction::new(msg, move || set(nameservers))]
}
