// Prefix index with longest prefix matching over a binary trie

use crate::error::{SimError, SimResult};
use ipnet::IpNet;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    V4,
    V6,
}

/// Address bits left-aligned in a u128, so both families walk from bit 0
fn address_key(addr: IpAddr) -> (Family, u128) {
    match addr {
        IpAddr::V4(v4) => (Family::V4, (u32::from(v4) as u128) << 96),
        IpAddr::V6(v6) => (Family::V6, u128::from(v6)),
    }
}

fn bit_at(key: u128, depth: u8) -> usize {
    ((key >> (127 - depth as u32)) & 1) as usize
}

#[derive(Debug, Clone)]
struct Node<T> {
    children: [Option<usize>; 2],
    entry: Option<(IpNet, T)>,
}

impl<T> Node<T> {
    fn empty() -> Self {
        Node {
            children: [None, None],
            entry: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Trie<T> {
    nodes: Vec<Node<T>>,
}

impl<T> Trie<T> {
    fn new() -> Self {
        Trie {
            nodes: vec![Node::empty()],
        }
    }

    fn find_or_create(&mut self, key: u128, prefix_len: u8) -> usize {
        let mut current = 0;
        for depth in 0..prefix_len {
            let bit = bit_at(key, depth);
            current = match self.nodes[current].children[bit] {
                Some(next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(Node::empty());
                    self.nodes[current].children[bit] = Some(next);
                    next
                }
            };
        }
        current
    }

    fn find(&self, key: u128, prefix_len: u8) -> Option<usize> {
        let mut current = 0;
        for depth in 0..prefix_len {
            current = self.nodes[current].children[bit_at(key, depth)]?;
        }
        Some(current)
    }

    /// Deepest entry on the path of `key`, walking at most `max_depth` bits
    fn longest_match(&self, key: u128, max_depth: u8) -> Option<&(IpNet, T)> {
        let mut current = 0;
        let mut best = self.nodes[0].entry.as_ref();

        for depth in 0..max_depth {
            match self.nodes[current].children[bit_at(key, depth)] {
                Some(next) => {
                    current = next;
                    if let Some(entry) = self.nodes[current].entry.as_ref() {
                        best = Some(entry);
                    }
                }
                None => break,
            }
        }

        best
    }

    /// Pre-order walk: lower addresses first, shorter prefixes before longer ones
    fn collect<'a>(&'a self, out: &mut Vec<(&'a IpNet, &'a T)>) {
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if let Some((cidr, payload)) = node.entry.as_ref() {
                out.push((cidr, payload));
            }
            if let Some(right) = node.children[1] {
                stack.push(right);
            }
            if let Some(left) = node.children[0] {
                stack.push(left);
            }
        }
    }
}

/// CIDR-keyed index answering longest-prefix-match queries.
///
/// Build it fully with [`PrefixIndex::insert`], then query it. Exact
/// duplicate CIDRs are rejected, so a lookup never has to break a tie.
#[derive(Debug, Clone)]
pub struct PrefixIndex<T> {
    v4: Trie<T>,
    v6: Trie<T>,
    len: usize,
}

impl<T> Default for PrefixIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PrefixIndex<T> {
    pub fn new() -> Self {
        PrefixIndex {
            v4: Trie::new(),
            v6: Trie::new(),
            len: 0,
        }
    }

    fn trie(&self, family: Family) -> &Trie<T> {
        match family {
            Family::V4 => &self.v4,
            Family::V6 => &self.v6,
        }
    }

    /// Register `cidr -> payload`. Host bits of `cidr` are ignored.
    pub fn insert(&mut self, cidr: IpNet, payload: T) -> SimResult<()> {
        let cidr = cidr.trunc();
        let (family, key) = address_key(cidr.network());
        let trie = match family {
            Family::V4 => &mut self.v4,
            Family::V6 => &mut self.v6,
        };

        let index = trie.find_or_create(key, cidr.prefix_len());
        let node = &mut trie.nodes[index];
        if node.entry.is_some() {
            return Err(SimError::DuplicateCidr {
                cidr: cidr.to_string(),
            });
        }
        node.entry = Some((cidr, payload));
        self.len += 1;
        Ok(())
    }

    /// Exact-match lookup of a registered CIDR
    pub fn get(&self, cidr: &IpNet) -> Option<&T> {
        let cidr = cidr.trunc();
        let (family, key) = address_key(cidr.network());
        let trie = self.trie(family);
        let index = trie.find(key, cidr.prefix_len())?;
        trie.nodes[index].entry.as_ref().map(|(_, payload)| payload)
    }

    /// Payload of the most specific registered CIDR covering `ip`
    pub fn lookup(&self, ip: IpAddr) -> Option<&T> {
        self.lookup_entry(ip).map(|(_, payload)| payload)
    }

    pub fn lookup_entry(&self, ip: IpAddr) -> Option<(&IpNet, &T)> {
        let (family, key) = address_key(ip);
        let max_depth = match family {
            Family::V4 => 32,
            Family::V6 => 128,
        };
        self.trie(family)
            .longest_match(key, max_depth)
            .map(|(cidr, payload)| (cidr, payload))
    }

    /// Most specific registered CIDR that covers every address of `net`.
    ///
    /// Registered prefixes longer than `net` only cover part of it and are
    /// not considered.
    pub fn lookup_covering(&self, net: &IpNet) -> Option<(&IpNet, &T)> {
        let (family, key) = address_key(net.network());
        self.trie(family)
            .longest_match(key, net.prefix_len())
            .map(|(cidr, payload)| (cidr, payload))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// All entries, IPv4 before IPv6, in address order
    pub fn entries(&self) -> Vec<(&IpNet, &T)> {
        let mut out = Vec::with_capacity(self.len);
        self.v4.collect(&mut out);
        self.v6.collect(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut index = PrefixIndex::new();
        index.insert(net("10.0.0.0/16"), "vpc-x").unwrap();
        index.insert(net("10.2.0.0/24"), "vpc-b").unwrap();
        index.insert(net("10.0.0.0/8"), "onprem").unwrap();

        assert_eq!(index.lookup(ip("10.0.5.1")), Some(&"vpc-x"));
        assert_eq!(index.lookup(ip("10.2.0.5")), Some(&"vpc-b"));
        assert_eq!(index.lookup(ip("10.9.9.9")), Some(&"onprem"));
        assert_eq!(index.lookup(ip("172.16.5.5")), None);
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let mut forward = PrefixIndex::new();
        forward.insert(net("10.2.0.0/16"), 1).unwrap();
        forward.insert(net("10.2.3.0/24"), 2).unwrap();

        let mut reverse = PrefixIndex::new();
        reverse.insert(net("10.2.3.0/24"), 2).unwrap();
        reverse.insert(net("10.2.0.0/16"), 1).unwrap();

        for probe in ["10.2.3.7", "10.2.4.7"] {
            assert_eq!(forward.lookup(ip(probe)), reverse.lookup(ip(probe)));
        }
    }

    #[test]
    fn test_duplicate_cidr_rejected() {
        let mut index = PrefixIndex::new();
        index.insert(net("10.1.0.0/24"), "a").unwrap();
        let err = index.insert(net("10.1.0.0/24"), "b").unwrap_err();
        assert!(matches!(err, SimError::DuplicateCidr { ref cidr } if cidr == "10.1.0.0/24"));
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&net("10.1.0.0/24")), Some(&"a"));
    }

    #[test]
    fn test_host_bits_are_truncated() {
        let mut index = PrefixIndex::new();
        index.insert(net("10.1.0.77/24"), "a").unwrap();
        assert_eq!(index.get(&net("10.1.0.0/24")), Some(&"a"));
        assert!(index.insert(net("10.1.0.0/24"), "b").is_err());
    }

    #[test]
    fn test_default_route_matches_everything_in_family() {
        let mut index = PrefixIndex::new();
        index.insert(net("0.0.0.0/0"), "default").unwrap();
        assert_eq!(index.lookup(ip("203.0.113.9")), Some(&"default"));
        assert_eq!(index.lookup(ip("2001:db8::1")), None);
    }

    #[test]
    fn test_ipv6_lookup() {
        let mut index = PrefixIndex::new();
        index.insert(net("2001:db8::/32"), "wide").unwrap();
        index.insert(net("2001:db8:1::/48"), "narrow").unwrap();
        assert_eq!(index.lookup(ip("2001:db8:1::5")), Some(&"narrow"));
        assert_eq!(index.lookup(ip("2001:db8:2::5")), Some(&"wide"));
    }

    #[test]
    fn test_lookup_covering_bucket() {
        let mut index = PrefixIndex::new();
        index.insert(net("10.1.0.0/23"), "vpc-a").unwrap();
        index.insert(net("10.3.0.0/25"), "vpc-c").unwrap();

        let (cidr, payload) = index.lookup_covering(&net("10.1.1.0/24")).unwrap();
        assert_eq!(*cidr, net("10.1.0.0/23"));
        assert_eq!(*payload, "vpc-a");

        // A /25 only covers half of the /24 bucket
        assert!(index.lookup_covering(&net("10.3.0.0/24")).is_none());
        assert_eq!(index.lookup(ip("10.3.0.9")), Some(&"vpc-c"));
    }

    #[test]
    fn test_entries_sorted() {
        let mut index = PrefixIndex::new();
        index.insert(net("10.2.0.0/24"), 3).unwrap();
        index.insert(net("10.0.0.0/16"), 1).unwrap();
        index.insert(net("10.0.1.0/24"), 2).unwrap();
        index.insert(net("2001:db8::/32"), 4).unwrap();

        let order: Vec<i32> = index.entries().into_iter().map(|(_, p)| *p).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
    }
}
