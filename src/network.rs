use crate::render::Viewport;
use rand::{rngs::StdRng, Rng};

/// Canvases at most this many dots wide get the compact layout.
pub(crate) const COMPACT_WIDTH: f32 = 160.0;

/// Node activation, clamped to [0, 1] by every constructor and update.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub(crate) struct Activation(f32);

impl Activation {
    pub(crate) const ZERO: Activation = Activation(0.0);

    pub(crate) fn new(v: f32) -> Self {
        if v.is_nan() {
            return Self::ZERO;
        }
        Self(v.clamp(0.0, 1.0))
    }

    pub(crate) fn get(self) -> f32 {
        self.0
    }

    pub(crate) fn excite(self, amount: f32) -> Self {
        Self::new(self.0 + amount)
    }

    pub(crate) fn scaled(self, factor: f32) -> Self {
        Self::new(self.0 * factor)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NodeId {
    pub(crate) layer: usize,
    pub(crate) index: usize,
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) layer: usize,
    pub(crate) activation: Activation,
    pub(crate) radius: f32,
}

#[derive(Clone, Debug)]
pub(crate) struct Edge {
    pub(crate) from: NodeId,
    pub(crate) to: NodeId,
    pub(crate) weight: f32,
}

/// Fully connected layered network. Nodes and edges only ever come into
/// existence together, through [`Topology::build`].
#[derive(Clone, Debug)]
pub(crate) struct Topology {
    layers: Vec<Vec<Node>>,
    edges: Vec<Edge>,
    /// Index of the first edge leaving each layer.
    offsets: Vec<usize>,
    /// Per source node, its outgoing edges by descending |weight|.
    ranked: Vec<Vec<Vec<usize>>>,
    compact: bool,
}

impl Topology {
    pub(crate) fn build(sizes: &[usize], dots: Viewport, rng: &mut StdRng) -> Self {
        let compact = dots.width <= COMPACT_WIDTH;
        let layers = layout(sizes, dots, compact);

        let mut edges = Vec::new();
        let mut offsets = Vec::with_capacity(layers.len());
        let mut ranked = Vec::with_capacity(layers.len());
        for l in 0..layers.len() {
            offsets.push(edges.len());
            let Some(next) = layers.get(l + 1) else {
                ranked.push(vec![Vec::new(); layers[l].len()]);
                continue;
            };
            let mut per_node = Vec::with_capacity(layers[l].len());
            for i in 0..layers[l].len() {
                let first = edges.len();
                for j in 0..next.len() {
                    edges.push(Edge {
                        from: NodeId { layer: l, index: i },
                        to: NodeId {
                            layer: l + 1,
                            index: j,
                        },
                        weight: rng.gen::<f32>() - 0.5,
                    });
                }
                let mut order: Vec<usize> = (first..edges.len()).collect();
                order.sort_by(|&a, &b| edges[b].weight.abs().total_cmp(&edges[a].weight.abs()));
                per_node.push(order);
            }
            ranked.push(per_node);
        }

        Self {
            layers,
            edges,
            offsets,
            ranked,
            compact,
        }
    }

    pub(crate) fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub(crate) fn layer(&self, l: usize) -> &[Node] {
        self.layers.get(l).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn layer_mut(&mut self, l: usize) -> &mut [Node] {
        self.layers.get_mut(l).map(Vec::as_mut_slice).unwrap_or(&mut [])
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.layers.get(id.layer)?.get(id.index)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.layers.get_mut(id.layer)?.get_mut(id.index)
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.layers.iter().flatten()
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.layers.iter_mut().flatten()
    }

    pub(crate) fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub(crate) fn is_compact(&self) -> bool {
        self.compact
    }

    /// Edge from `from` into `to`; only adjacent layers are connected.
    pub(crate) fn edge_between(&self, from: NodeId, to: NodeId) -> Option<&Edge> {
        if to.layer != from.layer + 1 {
            return None;
        }
        let width = self.layers.get(to.layer)?.len();
        if from.index >= self.layers.get(from.layer)?.len() || to.index >= width {
            return None;
        }
        self.edges
            .get(self.offsets[from.layer] + from.index * width + to.index)
    }

    /// The `n` outgoing edges of `from` with the largest |weight|.
    pub(crate) fn strongest(&self, from: NodeId, n: usize) -> impl Iterator<Item = &Edge> {
        self.ranked
            .get(from.layer)
            .and_then(|l| l.get(from.index))
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .take(n)
            .map(|&e| &self.edges[e])
    }
}

fn layout(sizes: &[usize], dots: Viewport, compact: bool) -> Vec<Vec<Node>> {
    let (w, h) = (dots.width, dots.height);
    let net_w = if compact { w * 0.85 } else { w * 0.75 };
    let net_h = if compact { h * 0.5 } else { h * 0.6 };
    let layer_spacing = net_w / (sizes.len().saturating_sub(1).max(1)) as f32;
    let start_x = (w - net_w) / 2.0;
    let lift = -h * 0.05;
    let radius = if compact { 2.0 } else { 2.5 };

    sizes
        .iter()
        .enumerate()
        .map(|(l, &count)| {
            // the two widest layers get a little more room
            let spread = if l < 2 { 1.2 } else { 1.0 };
            let layer_h = net_h * spread;
            let node_spacing = layer_h / (count + 1) as f32;
            let start_y = (h - layer_h) / 2.0 + lift;
            (0..count)
                .map(|i| Node {
                    x: start_x + l as f32 * layer_spacing,
                    y: start_y + (i + 1) as f32 * node_spacing,
                    layer: l,
                    activation: Activation::ZERO,
                    radius,
                })
                .collect()
        })
        .collect()
}
