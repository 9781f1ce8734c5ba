//! Subnet assignment for cluster zones
//!
//! Each zone gets one of eight equally sized subnets carved out of the
//! cluster network. The subnet index comes from the last character of the
//! zone name when those characters are unique across the cluster (so on
//! AWS/GCE naming `...a` maps to index 1 and the lowest range stays free),
//! and from the zone's position otherwise.
//!
//! More than eight zones, or positional fallback across different zone
//! sets, can map two zones onto the same subnet. That is a known limitation
//! of this scheme and is left as is.

use crate::error::{ClusterError, Result};
use crate::model::ZoneSpec;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

/// Maximum number of subnets per network
const MAX_SUBNETS: u32 = 8;

/// Bits reserved for the subnet index
const SUBNET_BITS: u8 = 3;

/// Fills in the CIDR of every zone that does not have one yet.
///
/// Zones that already carry a CIDR are never touched. Nothing is modified
/// when the network or a zone name is invalid.
pub fn assign_all(network_cidr: &str, zones: &mut [ZoneSpec]) -> Result<()> {
    parse_network(network_cidr)?;
    if zones.iter().any(|z| z.name.is_empty()) {
        return Err(ClusterError::config("zone with empty name"));
    }

    for i in 0..zones.len() {
        if !zones[i].cidr.is_empty() {
            continue;
        }

        let name = zones[i].name.clone();
        let cidr = zone_cidr(network_cidr, zones, &name)?;
        tracing::info!("Assigned CIDR {} to zone {}", cidr, name);
        zones[i].cidr = cidr;
    }

    Ok(())
}

/// Computes the subnet for `zone_name` within `network_cidr`.
pub fn zone_cidr(network_cidr: &str, zones: &[ZoneSpec], zone_name: &str) -> Result<String> {
    let index = zone_index(zones, zone_name)? % MAX_SUBNETS;
    let (base, prefix) = parse_network(network_cidr)?;

    let subnet_prefix = prefix + SUBNET_BITS;
    let subnet = base + (index << (32 - subnet_prefix));
    let cidr = format!("{}/{}", Ipv4Addr::from(subnet), subnet_prefix);

    tracing::debug!("Computed CIDR for subnet in zone {:?} as {:?}", zone_name, cidr);
    Ok(cidr)
}

/// Raw (unreduced) index of a zone
fn zone_index(zones: &[ZoneSpec], zone_name: &str) -> Result<u32> {
    let last_chars: HashSet<u8> = zones
        .iter()
        .filter_map(|z| z.name.as_bytes().last().copied())
        .collect();

    if last_chars.len() == zones.len() {
        if let Some(&last) = zone_name.as_bytes().last() {
            return Ok(u32::from(last));
        }
        return Err(ClusterError::config("zone with empty name"));
    }

    tracing::warn!("Last char of zone names not unique");

    zones
        .iter()
        .position(|z| z.name == zone_name)
        .map(|i| i as u32)
        .ok_or_else(|| ClusterError::config(format!("zone not configured: {:?}", zone_name)))
}

/// Parses an IPv4 CIDR into its masked base address and prefix length
fn parse_network(network_cidr: &str) -> Result<(u32, u8)> {
    let invalid = || ClusterError::config(format!("invalid network CIDR: {:?}", network_cidr));

    let (addr, prefix) = network_cidr.split_once('/').ok_or_else(invalid)?;
    let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;

    let addr = match addr {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(_) => {
            return Err(ClusterError::UnsupportedAddressFamily(
                network_cidr.to_string(),
            ));
        }
    };

    if prefix > 32 {
        return Err(invalid());
    }
    if prefix + SUBNET_BITS > 32 {
        return Err(ClusterError::config(format!(
            "network CIDR {:?} is too small to hold {} subnets",
            network_cidr, MAX_SUBNETS
        )));
    }

    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    };

    Ok((u32::from(addr) & mask, prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones(names: &[&str]) -> Vec<ZoneSpec> {
        names.iter().map(|n| ZoneSpec::new(*n)).collect()
    }

    fn cidrs(zones: &[ZoneSpec]) -> Vec<&str> {
        zones.iter().map(|z| z.cidr.as_str()).collect()
    }

    #[test]
    fn test_unique_suffixes_use_character_code() {
        let mut zs = zones(&["us-east-1a", "us-east-1b", "us-east-1c"]);
        assign_all("172.20.0.0/16", &mut zs).unwrap();

        assert_eq!(
            cidrs(&zs),
            vec!["172.20.32.0/19", "172.20.64.0/19", "172.20.96.0/19"]
        );
    }

    #[test]
    fn test_colliding_suffixes_fall_back_to_position() {
        let mut zs = zones(&["zone-1a", "zone-2a", "zone-3b"]);
        assign_all("10.0.0.0/16", &mut zs).unwrap();

        assert_eq!(
            cidrs(&zs),
            vec!["10.0.0.0/19", "10.0.32.0/19", "10.0.64.0/19"]
        );
    }

    #[test]
    fn test_existing_cidr_is_not_recomputed() {
        let mut zs = vec![
            ZoneSpec::new("us-east-1a").with_cidr("172.20.250.0/24"),
            ZoneSpec::new("us-east-1b"),
        ];
        assign_all("172.20.0.0/16", &mut zs).unwrap();

        assert_eq!(cidrs(&zs), vec!["172.20.250.0/24", "172.20.64.0/19"]);
    }

    #[test]
    fn test_distinct_subnets_for_up_to_eight_zones() {
        let suffixes = ['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h'];

        for network in ["10.0.0.0/8", "172.20.0.0/16", "192.168.0.0/20", "192.168.10.0/24"] {
            let (base, prefix) = parse_network(network).unwrap();

            for count in 1..=suffixes.len() {
                let names: Vec<String> = suffixes[..count]
                    .iter()
                    .map(|c| format!("region-1{}", c))
                    .collect();
                let mut zs: Vec<ZoneSpec> = names.iter().map(ZoneSpec::new).collect();
                assign_all(network, &mut zs).unwrap();

                let parsed: HashSet<(u32, u8)> = zs
                    .iter()
                    .map(|z| parse_network(&z.cidr).unwrap())
                    .collect();
                assert_eq!(parsed.len(), count, "duplicate subnet in {:?}", zs);

                for (subnet, subnet_prefix) in parsed {
                    assert_eq!(subnet_prefix, prefix + 3);
                    // Same-length subnets with distinct bases never overlap;
                    // each must also sit inside the parent network.
                    assert_eq!(subnet & (u32::MAX << (32 - prefix)), base);
                }
            }
        }
    }

    #[test]
    fn test_index_wraps_modulo_eight() {
        // 'i' = 105, 105 % 8 = 1, same slot as 'a'
        let zs = zones(&["x-i"]);
        assert_eq!(zone_cidr("10.0.0.0/16", &zs, "x-i").unwrap(), "10.0.32.0/19");
    }

    #[test]
    fn test_host_bits_are_masked() {
        let zs = zones(&["us-east-1a"]);
        assert_eq!(
            zone_cidr("172.20.13.7/16", &zs, "us-east-1a").unwrap(),
            "172.20.32.0/19"
        );
    }

    #[test]
    fn test_unknown_zone_with_positional_fallback() {
        let zs = zones(&["one-a", "two-a"]);
        let err = zone_cidr("10.0.0.0/16", &zs, "three-b").unwrap_err();
        assert!(matches!(err, ClusterError::Config(_)));
    }

    #[test]
    fn test_ipv6_network_is_rejected() {
        let mut zs = zones(&["us-east-1a"]);
        let err = assign_all("2001:db8::/32", &mut zs).unwrap_err();
        assert!(matches!(err, ClusterError::UnsupportedAddressFamily(_)));
        assert!(zs[0].cidr.is_empty());
    }

    #[test]
    fn test_invalid_network_is_rejected() {
        for network in ["", "172.20.0.0", "172.20.0.0/33", "not-an-ip/16", "10.0.0.0/30"] {
            let mut zs = zones(&["us-east-1a"]);
            let err = assign_all(network, &mut zs).unwrap_err();
            assert!(matches!(err, ClusterError::Config(_)), "{}", network);
            assert!(zs[0].cidr.is_empty());
        }
    }

    #[test]
    fn test_empty_zone_name_is_rejected() {
        let mut zs = zones(&["us-east-1a", ""]);
        assert!(assign_all("10.0.0.0/16", &mut zs).is_err());
        assert!(zs[0].cidr.is_empty());
    }
}
