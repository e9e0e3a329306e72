//! A read-only view of the overlay gossip graph: announced nodes, their
//! feature bitmaps, and channels between them.
//!
//! The graph loader lives outside this crate; it pushes refreshed snapshots
//! into a [`GossipSource`]. The graph is never mutated during a fetch.

use std::{collections::BTreeMap, fmt, sync::Arc};

use arc_swap::ArcSwap;
use secp256k1::{Parity, PublicKey, XOnlyPublicKey};

use crate::features::Features;

/// A BOLT7 short channel id (block x txindex x output).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ShortChannelId(pub u64);

impl fmt::Display for ShortChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let block = self.0 >> 40;
        let tx = (self.0 >> 16) & 0xff_ffff;
        let output = self.0 & 0xffff;
        write!(f, "{block}x{tx}x{output}")
    }
}

/// An announced node.
#[derive(Clone, Debug)]
pub struct GossNode {
    pub features: Features,
    /// Indices into [`Gossmap::channels`].
    channels: Vec<usize>,
}

/// An announced channel. `nodes[0] < nodes[1]`; direction `d` runs from
/// `nodes[d]` to `nodes[1 - d]`.
#[derive(Clone, Debug)]
pub struct GossChannel {
    pub scid: ShortChannelId,
    pub nodes: [PublicKey; 2],
    pub enabled: [bool; 2],
}

impl GossChannel {
    /// The endpoint a hop in direction `dir` starts from.
    pub fn source(&self, dir: usize) -> &PublicKey {
        &self.nodes[dir]
    }

    /// The endpoint a hop in direction `dir` arrives at.
    pub fn destination(&self, dir: usize) -> &PublicKey {
        &self.nodes[1 - dir]
    }
}

/// The result of resolving an x-only key against the graph. X-only keys
/// drop the parity bit, so two distinct graph nodes could both match.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum XOnlyResolution {
    Unique(PublicKey),
    Absent,
    /// Both parity interpretations exist as distinct nodes; never guess.
    Ambiguous,
}

/// An immutable gossip graph snapshot.
#[derive(Clone, Debug, Default)]
pub struct Gossmap {
    nodes: BTreeMap<PublicKey, GossNode>,
    channels: Vec<GossChannel>,
}

impl Gossmap {
    pub fn builder() -> GossmapBuilder {
        GossmapBuilder::default()
    }

    pub fn node(&self, id: &PublicKey) -> Option<&GossNode> {
        self.nodes.get(id)
    }

    pub fn channel(&self, idx: usize) -> &GossChannel {
        &self.channels[idx]
    }

    /// The channels adjacent to `id`, with the direction leading away from
    /// it.
    pub fn channels_from<'a>(
        &'a self,
        id: &'a PublicKey,
    ) -> impl Iterator<Item = (usize, &'a GossChannel, usize)> + 'a {
        self.nodes
            .get(id)
            .into_iter()
            .flat_map(|node| node.channels.iter())
            .map(move |idx| {
                let channel = &self.channels[*idx];
                let dir = usize::from(channel.nodes[0] != *id);
                (*idx, channel, dir)
            })
    }

    /// Resolves an x-only key to the graph node carrying it, trying both
    /// parity interpretations.
    pub fn node_for_xonly(&self, xonly: &XOnlyPublicKey) -> XOnlyResolution {
        let even =
            PublicKey::from_x_only_public_key(*xonly, Parity::Even);
        let odd = PublicKey::from_x_only_public_key(*xonly, Parity::Odd);
        match (
            self.nodes.contains_key(&even),
            self.nodes.contains_key(&odd),
        ) {
            (true, false) => XOnlyResolution::Unique(even),
            (false, true) => XOnlyResolution::Unique(odd),
            (false, false) => XOnlyResolution::Absent,
            (true, true) => XOnlyResolution::Ambiguous,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// Assembles a [`Gossmap`] snapshot; used by the loader and by tests.
#[derive(Default)]
pub struct GossmapBuilder {
    map: Gossmap,
}

impl GossmapBuilder {
    /// Adds (or replaces) a node announcement.
    pub fn node(mut self, id: PublicKey, features: Features) -> Self {
        self.map
            .nodes
            .entry(id)
            .and_modify(|node| node.features = features.clone())
            .or_insert(GossNode {
                features,
                channels: Vec::new(),
            });
        self
    }

    /// Adds a channel between `a` and `b`, implicitly announcing either
    /// endpoint that hasn't been seen yet (with empty features).
    pub fn channel(
        mut self,
        scid: ShortChannelId,
        a: PublicKey,
        b: PublicKey,
        enabled: [bool; 2],
    ) -> Self {
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let idx = self.map.channels.len();
        self.map.channels.push(GossChannel {
            scid,
            nodes: [first, second],
            enabled,
        });
        for id in [first, second] {
            self.map
                .nodes
                .entry(id)
                .or_insert_with(|| GossNode {
                    features: Features::empty(),
                    channels: Vec::new(),
                })
                .channels
                .push(idx);
        }
        self
    }

    pub fn build(self) -> Gossmap {
        self.map
    }
}

/// Where fetches get their graph. Implementations refresh lazily: every
/// call returns the freshest available snapshot.
pub trait GossipSource: Send + Sync {
    fn get_gossmap(&self) -> anyhow::Result<Arc<Gossmap>>;
}

/// A [`GossipSource`] fed by an external loader pushing snapshots.
pub struct SwappableGossmap {
    map: ArcSwap<Gossmap>,
}

impl SwappableGossmap {
    pub fn new(map: Gossmap) -> Self {
        Self {
            map: ArcSwap::from_pointee(map),
        }
    }

    /// Replaces the snapshot; in-flight readers keep the old one.
    pub fn update(&self, map: Gossmap) {
        self.map.store(Arc::new(map));
    }
}

impl GossipSource for SwappableGossmap {
    fn get_gossmap(&self) -> anyhow::Result<Arc<Gossmap>> {
        Ok(self.map.load_full())
    }
}
