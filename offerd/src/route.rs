//! Routing onion messages across the overlay graph.
//!
//! This is a reachability search, not a liquidity search: a channel
//! half-edge is usable iff both directions are enabled and the receiving
//! endpoint advertises the onion-message capability. Dijkstra scores
//! shorter-is-better (fewest hops).

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BinaryHeap},
};

use secp256k1::{PublicKey, XOnlyPublicKey};
use thiserror::Error;

use crate::gossmap::{GossChannel, Gossmap, ShortChannelId, XOnlyResolution};

/// One hop of a route: the channel taken and the node it arrives at.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteHop {
    pub scid: ShortChannelId,
    pub direction: usize,
    pub node_id: PublicKey,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum RouteError {
    /// The recipient is absent from the graph, or both parity
    /// interpretations of its x-only key match distinct nodes.
    #[error("unknown destination")]
    UnknownDestination,

    /// We are absent from the graph ourselves.
    #[error("we don't have any channels")]
    NoChannels,

    #[error("can't find route")]
    NoRoute,
}

/// Whether an onion message may traverse `channel` in direction `dir`. The
/// `_amount` argument exists for parity with payment routing predicates and
/// is unused.
pub fn can_carry_onionmsg(
    map: &Gossmap,
    channel: &GossChannel,
    dir: usize,
    _amount: u64,
) -> bool {
    // Don't use it if either side says it's disabled.
    if !channel.enabled[dir] || !channel.enabled[1 - dir] {
        return false;
    }

    // Check features of the recipient.
    match map.node(channel.destination(dir)) {
        Some(node) => node.features.supports_onion_messages(),
        None => false,
    }
}

/// Finds the fewest-hops route from `src` to the node carrying the offer's
/// x-only `dst` key, over channels admissible for onion messages.
pub fn find_onionmsg_route(
    map: &Gossmap,
    src: &PublicKey,
    dst: &XOnlyPublicKey,
) -> Result<Vec<RouteHop>, RouteError> {
    let dst = match map.node_for_xonly(dst) {
        XOnlyResolution::Unique(node_id) => node_id,
        XOnlyResolution::Absent | XOnlyResolution::Ambiguous =>
            return Err(RouteError::UnknownDestination),
    };

    // If we don't exist in gossip, routing can't happen.
    if map.node(src).is_none() {
        return Err(RouteError::NoChannels);
    }

    let mut dist = BTreeMap::<PublicKey, u64>::new();
    let mut prev = BTreeMap::<PublicKey, (usize, usize)>::new();
    let mut heap = BinaryHeap::new();

    dist.insert(*src, 0);
    heap.push(Reverse((0u64, *src)));

    while let Some(Reverse((cost, node_id))) = heap.pop() {
        if dist.get(&node_id) != Some(&cost) {
            continue; // stale heap entry
        }
        if node_id == dst {
            break;
        }
        for (idx, channel, dir) in map.channels_from(&node_id) {
            if !can_carry_onionmsg(map, channel, dir, 0) {
                continue;
            }
            let next = *channel.destination(dir);
            let next_cost = cost + 1;
            if dist
                .get(&next)
                .map(|best| next_cost < *best)
                .unwrap_or(true)
            {
                dist.insert(next, next_cost);
                prev.insert(next, (idx, dir));
                heap.push(Reverse((next_cost, next)));
            }
        }
    }

    if !dist.contains_key(&dst) {
        return Err(RouteError::NoRoute);
    }

    // Walk back from the destination.
    let mut hops = Vec::new();
    let mut node_id = dst;
    while node_id != *src {
        let (idx, dir) = prev[&node_id];
        let channel = map.channel(idx);
        hops.push(RouteHop {
            scid: channel.scid,
            direction: dir,
            node_id,
        });
        node_id = *channel.source(dir);
    }
    hops.reverse();
    Ok(hops)
}
