//! Loads the cluster configuration: the fixed, ordered mapping from member-id to (host, port)
//! that every node in the cluster is booted with. This is deliberately the thinnest component in
//! the crate -- a trivial mapping loader, not part of the consensus core.

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::net::ToSocketAddrs;

use log::warn;

use crate::error::PaxosError;

/// The fixed, immutable cluster membership loaded once at boot.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    order: Vec<String>,
    addrs: HashMap<String, SocketAddr>,
}

impl ClusterConfig {
    /// Reads `path`: each non-empty, non-`#`-prefixed line must be `id,host,port`. Malformed
    /// lines are logged and skipped. At least one well-formed entry is required. Duplicate ids:
    /// last one wins.
    pub fn load(path: &str) -> Result<Self, PaxosError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| PaxosError::Configuration(format!("cannot read '{}': {}", path, e)))?;

        let mut order = Vec::new();
        let mut addrs = HashMap::new();

        for (line_no, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_line(line) {
                Some((id, addr)) => {
                    if !addrs.contains_key(&id) {
                        order.push(id.clone());
                    }
                    addrs.insert(id, addr);
                }
                None => warn!("skipping malformed configuration line {}: {}", line_no + 1, line),
            }
        }

        if addrs.is_empty() {
            return Err(PaxosError::Configuration(format!(
                "'{}' contains no well-formed entries",
                path
            )));
        }

        Ok(ClusterConfig { order, addrs })
    }

    pub fn size(&self) -> usize {
        self.order.len()
    }

    /// The smallest majority of the cluster: `floor(N / 2) + 1`.
    pub fn quorum(&self) -> usize {
        self.size() / 2 + 1
    }

    pub fn contains(&self, id: &str) -> bool {
        self.addrs.contains_key(id)
    }

    pub fn addr_of(&self, id: &str) -> Option<SocketAddr> {
        self.addrs.get(id).copied()
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn addrs(&self) -> HashMap<String, SocketAddr> {
        self.addrs.clone()
    }
}

fn parse_line(line: &str) -> Option<(String, SocketAddr)> {
    let mut parts = line.splitn(3, ',');
    let id = parts.next()?.trim();
    let host = parts.next()?.trim();
    let port = parts.next()?.trim();

    if id.is_empty() || host.is_empty() {
        return None;
    }

    let port: u16 = port.parse().ok().filter(|&p| p >= 1)?;

    let addr = (host, port).to_socket_addrs().ok()?.next()?;

    Some((id.to_string(), addr))
}
