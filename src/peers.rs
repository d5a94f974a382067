use std::collections::BTreeSet;

use crate::error::LedgerError;

/// Peer ledgers known to this node, kept as `host:port`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet {
    nodes: BTreeSet<String>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_addresses<I, S>(addresses: I) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addresses: Vec<S> = addresses.into_iter().collect();
        let mut set = NodeSet::new();
        set.register_all(&addresses)?;
        Ok(set)
    }

    /// Adds `address` (a URL or a bare `host:port`) and returns the stored form.
    pub fn register(&mut self, address: &str) -> Result<String, LedgerError> {
        let node = normalize_address(address)?;
        self.nodes.insert(node.clone());
        Ok(node)
    }

    /// Adds every address or none: the whole list is normalized first.
    pub fn register_all<S: AsRef<str>>(&mut self, addresses: &[S]) -> Result<Vec<String>, LedgerError> {
        let nodes = addresses
            .iter()
            .map(|address| normalize_address(address.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.nodes.extend(nodes.iter().cloned());
        Ok(nodes)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.nodes.iter().cloned().collect()
    }
}

/// `http://host:port/path` → `host:port`; a bare `host:port` is kept.
pub fn normalize_address(address: &str) -> Result<String, LedgerError> {
    let trimmed = address.trim();
    let without_scheme = match trimmed.split_once("://") {
        Some((_, rest)) => rest,
        None => trimmed,
    };
    let host = without_scheme.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err(LedgerError::InvalidAddress(address.to_string()));
    }
    Ok(host.to_string())
}
