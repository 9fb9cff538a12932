use crate::network::{Activation, NodeId, Topology};
use crate::render::Viewport;
use crate::schedule::{ms_to_frames, Timeline};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::BTreeSet;
use tracing::debug;

/// Nodes above this activation send pulses.
pub(crate) const FIRE_THRESHOLD: f32 = 0.2;
pub(crate) const DECAY: f32 = 0.94;

const INPUT_FANOUT: usize = 2;
const HIDDEN_SENDERS: usize = 10;
const OUTPUT_PICKS: usize = 2;
const PULSE_SPEED: (f32, f32) = (0.08, 0.10);
const OUTPUT_PULSE_SPEED: f32 = 0.08;
const ARRIVAL_GAIN: f32 = 0.8;
const INPUT_ACTIVATION: (f32, f32) = (0.3, 0.7);
const CASCADE_DELAY_MS: u64 = 30;
const CYCLE_DELAY_MS: u64 = 1000;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Pulse {
    pub(crate) from: NodeId,
    pub(crate) to: NodeId,
    pub(crate) progress: f32,
    pub(crate) speed: f32,
    pub(crate) intensity: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Stage {
    Idle,
    /// The frame a cycle starts on: inputs set, first pulses just sent.
    InputActivated,
    Propagating,
    OutputReached,
    AllLettersDone,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Input,
    Hidden,
    /// Feeds the last layer.
    OutputAdjacent,
}

#[derive(Clone, Debug)]
pub(crate) struct SimConfig {
    pub(crate) layers: Vec<usize>,
    pub(crate) cycle_delay: u64,
    pub(crate) cascade_delay: u64,
}

impl SimConfig {
    pub(crate) fn new(layers: Vec<usize>, fps: u32) -> Self {
        Self {
            layers,
            cycle_delay: ms_to_frames(CYCLE_DELAY_MS, fps),
            cascade_delay: ms_to_frames(CASCADE_DELAY_MS, fps),
        }
    }
}

pub(crate) struct NeuralSim {
    config: SimConfig,
    topology: Topology,
    pulses: Vec<Pulse>,
    /// Layers waiting to propagate.
    pending: Timeline<usize>,
    target: Vec<char>,
    revealed: String,
    current: usize,
    processing: bool,
    output_activated: bool,
    last_cycle: Option<u64>,
    cycles: u32,
    rng: StdRng,
}

impl NeuralSim {
    pub(crate) fn new(config: SimConfig, name: &str, dots: Viewport, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let topology = Topology::build(&config.layers, dots, &mut rng);
        Self {
            config,
            topology,
            pulses: Vec::new(),
            pending: Timeline::default(),
            target: name.to_uppercase().chars().collect(),
            revealed: String::new(),
            current: 0,
            processing: false,
            output_activated: false,
            last_cycle: None,
            cycles: 0,
            rng,
        }
    }

    pub(crate) fn topology(&self) -> &Topology {
        &self.topology
    }

    pub(crate) fn pulses(&self) -> &[Pulse] {
        &self.pulses
    }

    pub(crate) fn revealed(&self) -> &str {
        &self.revealed
    }

    pub(crate) fn letters_left(&self) -> bool {
        self.current < self.target.len()
    }

    pub(crate) fn is_processing(&self) -> bool {
        self.processing
    }

    pub(crate) fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Every letter shown and nothing left in flight.
    pub(crate) fn is_complete(&self) -> bool {
        !self.letters_left() && self.pulses.is_empty() && !self.processing
    }

    pub(crate) fn stage(&self) -> Stage {
        if !self.is_processing() {
            if self.letters_left() {
                Stage::Idle
            } else {
                Stage::AllLettersDone
            }
        } else if self.output_activated {
            Stage::OutputReached
        } else if self.last_cycle == Some(self.pending.now()) {
            Stage::InputActivated
        } else {
            Stage::Propagating
        }
    }

    /// New layout for a new canvas. Only the reveal progress survives; an
    /// interrupted cycle starts over for the same letter.
    pub(crate) fn rebuild(&mut self, dots: Viewport) {
        self.topology = Topology::build(&self.config.layers, dots, &mut self.rng);
        self.pulses.clear();
        self.pending.clear();
        self.processing = false;
        self.output_activated = false;
        debug!(
            width = dots.width,
            height = dots.height,
            revealed = %self.revealed,
            "network rebuilt"
        );
    }

    /// One frame: due propagations, maybe a new cycle, pulse travel.
    pub(crate) fn step(&mut self) {
        self.pending.advance();
        for layer in self.pending.take_due() {
            self.propagate(layer);
        }

        let now = self.pending.now();
        let due = self
            .last_cycle
            .map_or(true, |t| now - t > self.config.cycle_delay);
        if !self.processing && self.letters_left() && due {
            self.start_cycle();
            self.last_cycle = Some(now);
        }

        self.update_pulses();
    }

    /// Exponential fade of every node, applied after drawing.
    pub(crate) fn decay(&mut self) {
        for n in self.topology.nodes_mut() {
            n.activation = n.activation.scaled(DECAY);
        }
    }

    fn start_cycle(&mut self) {
        if !self.letters_left() {
            return;
        }
        self.processing = true;
        self.output_activated = false;
        self.cycles += 1;

        for l in 1..self.topology.layer_count() {
            for n in self.topology.layer_mut(l) {
                n.activation = Activation::ZERO;
            }
        }
        let (lo, hi) = INPUT_ACTIVATION;
        for n in self.topology.layer_mut(0) {
            n.activation = Activation::new(self.rng.gen_range(lo..hi));
        }
        debug!(cycle = self.cycles, letter = self.current, "cycle started");

        self.propagate(0);
    }

    fn role(&self, layer: usize) -> Role {
        if layer + 2 == self.topology.layer_count() {
            Role::OutputAdjacent
        } else if layer == 0 {
            Role::Input
        } else {
            Role::Hidden
        }
    }

    fn propagate(&mut self, layer: usize) {
        if layer + 1 >= self.topology.layer_count() {
            return;
        }
        let role = self.role(layer);
        let active: Vec<(NodeId, f32)> = self
            .topology
            .layer(layer)
            .iter()
            .enumerate()
            .filter(|(_, n)| n.activation.get() > FIRE_THRESHOLD)
            .map(|(index, n)| (NodeId { layer, index }, n.activation.get()))
            .collect();

        let topo = &self.topology;
        let rng = &mut self.rng;
        let pulses = &mut self.pulses;
        let mut emit = |from: NodeId, to: NodeId, speed: f32, intensity: f32| {
            pulses.push(Pulse {
                from,
                to,
                progress: 0.0,
                speed,
                intensity,
            });
        };

        match role {
            Role::OutputAdjacent => {
                // "recognise" an arbitrary output, picks may coincide
                let width = topo.layer(layer + 1).len();
                if width == 0 {
                    return;
                }
                let picks: [usize; OUTPUT_PICKS] = std::array::from_fn(|_| rng.gen_range(0..width));
                for &(from, intensity) in &active {
                    for &index in &picks {
                        let to = NodeId {
                            layer: layer + 1,
                            index,
                        };
                        if let Some(e) = topo.edge_between(from, to) {
                            emit(e.from, e.to, OUTPUT_PULSE_SPEED, intensity);
                        }
                    }
                }
            }
            Role::Input => {
                for &(from, intensity) in &active {
                    for e in topo.strongest(from, INPUT_FANOUT) {
                        emit(e.from, e.to, rng.gen_range(PULSE_SPEED.0..PULSE_SPEED.1), intensity);
                    }
                }
            }
            Role::Hidden => {
                for &(from, intensity) in active.iter().take(HIDDEN_SENDERS) {
                    for e in topo.strongest(from, 1) {
                        emit(e.from, e.to, rng.gen_range(PULSE_SPEED.0..PULSE_SPEED.1), intensity);
                    }
                }
            }
        }
    }

    fn update_pulses(&mut self) {
        let last = self.topology.layer_count().saturating_sub(1);

        let mut arrived = Vec::new();
        self.pulses.retain_mut(|p| {
            p.progress += p.speed;
            if p.progress >= 1.0 {
                arrived.push(*p);
                false
            } else {
                true
            }
        });

        let mut completed = BTreeSet::new();
        for p in arrived {
            if let Some(n) = self.topology.node_mut(p.to) {
                n.activation = n.activation.excite(ARRIVAL_GAIN * p.intensity);
            }
            completed.insert(p.to.layer);
            if p.to.layer == last && !self.output_activated {
                self.output_activated = true;
                self.reveal_next();
            }
        }

        for layer in completed {
            if layer >= last {
                continue;
            }
            // may queue the same layer again while an earlier job still waits
            let in_flight = self.pulses.iter().any(|p| p.from.layer == layer);
            if !in_flight {
                self.pending.schedule_in(self.config.cascade_delay, layer);
            }
        }

        if self.processing && self.pulses.is_empty() {
            if self.output_activated {
                self.processing = false;
            } else if self.pending.is_empty() {
                // everything fell below threshold before reaching the output
                self.processing = false;
                debug!(cycle = self.cycles, letter = self.current, "cycle fizzled, retrying");
            }
        }
    }

    fn reveal_next(&mut self) {
        if let Some(&ch) = self.target.get(self.current) {
            self.revealed.push(ch);
            self.current += 1;
            debug!(revealed = %self.revealed, "letter revealed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vp(w: f32, h: f32) -> Viewport {
        Viewport { width: w, height: h }
    }

    fn sim(layers: &[usize], name: &str, seed: u64) -> NeuralSim {
        NeuralSim::new(SimConfig::new(layers.to_vec(), 60), name, vp(300.0, 160.0), seed)
    }

    /// Steps (with decay) until the name is shown or `max` frames pass.
    fn run(s: &mut NeuralSim, max: usize) -> usize {
        for i in 0..max {
            s.step();
            s.decay();
            if s.is_complete() {
                return i;
            }
        }
        max
    }

    fn set_layer(s: &mut NeuralSim, layer: usize, v: f32) {
        for n in s.topology.layer_mut(layer) {
            n.activation = Activation::new(v);
        }
    }

    #[test]
    fn starting_a_two_layer_cycle_fires_pulses() {
        let mut s = sim(&[2, 2], "AB", 1);
        s.start_cycle();
        for n in s.topology().layer(0) {
            let a = n.activation.get();
            assert!((0.3..0.7).contains(&a), "input activation {a}");
        }
        assert!(!s.pulses().is_empty());
        assert!(s.pulses().iter().all(|p| p.from.layer == 0 && p.to.layer == 1));
        assert!(s.pulses().iter().all(|p| p.speed == OUTPUT_PULSE_SPEED));
        assert_eq!(s.stage(), Stage::Propagating);
    }

    #[test]
    fn name_is_revealed_in_order_one_letter_per_cycle() {
        let mut s = sim(&[18, 15, 10, 5], "shibi", 2);
        let mut shown = String::new();
        let mut cycle_of_last_letter = 0;
        for _ in 0..20_000 {
            s.step();
            if s.revealed() != shown {
                assert_eq!(s.revealed().chars().count(), shown.chars().count() + 1);
                assert!(s.revealed().starts_with(&shown));
                // a fresh cycle for every letter
                assert!(s.cycles() > cycle_of_last_letter);
                cycle_of_last_letter = s.cycles();
                shown = s.revealed().to_string();
            }
            s.decay();
            if s.is_complete() {
                break;
            }
        }
        assert_eq!(s.revealed(), "SHIBI");
        assert!(s.is_complete());
        assert_eq!(s.stage(), Stage::AllLettersDone);
    }

    #[test]
    fn activations_stay_clamped_through_a_run() {
        let mut s = sim(&[18, 15, 10, 5], "ab", 3);
        for _ in 0..600 {
            s.step();
            for n in s.topology().nodes() {
                assert!((0.0..=1.0).contains(&n.activation.get()));
            }
            s.decay();
        }
    }

    #[test]
    fn output_is_marked_once_per_letter() {
        let mut s = sim(&[4, 4], "XYZ", 4);
        s.start_cycle();
        // every emitted pulse lands on the output layer
        let emitted = s.pulses().len();
        assert!(emitted >= 2);
        for _ in 0..20 {
            s.update_pulses();
        }
        assert_eq!(s.revealed(), "X");
        assert!(!s.is_processing());
    }

    #[test]
    fn cycles_wait_for_the_delay() {
        let mut s = sim(&[18, 15, 10, 5], "abcd", 5);
        let mut starts = Vec::new();
        let mut seen = 0;
        for frame in 0..5_000u64 {
            s.step();
            if s.cycles() != seen {
                seen = s.cycles();
                starts.push(frame);
            }
            s.decay();
        }
        assert!(starts.len() >= 4);
        assert_eq!(starts[0], 0);
        for w in starts.windows(2) {
            assert!(w[1] - w[0] > s.config.cycle_delay);
        }
    }

    #[test]
    fn input_layer_sends_two_strongest_per_active_node() {
        let mut s = sim(&[6, 5, 4, 3], "A", 6);
        set_layer(&mut s, 0, 0.5);
        s.topology.layer_mut(0)[0].activation = Activation::new(0.1);
        s.propagate(0);
        assert_eq!(s.pulses().len(), 5 * INPUT_FANOUT);
        for p in s.pulses() {
            assert_ne!(p.from.index, 0);
            assert_eq!(p.intensity, 0.5);
            assert!((0.08..0.10).contains(&p.speed));
            let best: Vec<NodeId> = s.topology().strongest(p.from, 2).map(|e| e.to).collect();
            assert!(best.contains(&p.to));
        }
    }

    #[test]
    fn hidden_layer_caps_senders() {
        let mut s = sim(&[2, 14, 6, 3], "A", 7);
        set_layer(&mut s, 1, 0.9);
        s.propagate(1);
        assert_eq!(s.pulses().len(), HIDDEN_SENDERS);
        for p in s.pulses() {
            let best = s.topology().strongest(p.from, 1).next().unwrap().to;
            assert_eq!(p.to, best);
        }
    }

    #[test]
    fn output_adjacent_layer_aims_at_two_picks() {
        let mut s = sim(&[3, 7, 5], "A", 8);
        set_layer(&mut s, 1, 0.6);
        s.propagate(1);
        assert_eq!(s.pulses().len(), 7 * OUTPUT_PICKS);
        let targets: BTreeSet<NodeId> = s.pulses().iter().map(|p| p.to).collect();
        assert!(!targets.is_empty() && targets.len() <= OUTPUT_PICKS);
    }

    #[test]
    fn arrival_adds_scaled_intensity_and_clamps() {
        let mut s = sim(&[1, 1], "A", 9);
        let from = NodeId { layer: 0, index: 0 };
        let to = NodeId { layer: 1, index: 0 };
        s.topology.node_mut(to).unwrap().activation = Activation::new(0.5);
        s.pulses.push(Pulse {
            from,
            to,
            progress: 0.95,
            speed: 0.1,
            intensity: 0.25,
        });
        s.update_pulses();
        let a = s.topology().node(to).unwrap().activation.get();
        assert!((a - 0.7).abs() < 1e-6);

        s.pulses.push(Pulse {
            from,
            to,
            progress: 0.99,
            speed: 0.1,
            intensity: 1.0,
        });
        s.update_pulses();
        assert_eq!(s.topology().node(to).unwrap().activation.get(), 1.0);
    }

    #[test]
    fn completed_hidden_layer_cascades_after_a_delay() {
        let mut s = sim(&[2, 3, 3, 2], "A", 10);
        set_layer(&mut s, 1, 0.0);
        s.pulses.push(Pulse {
            from: NodeId { layer: 0, index: 0 },
            to: NodeId { layer: 1, index: 1 },
            progress: 0.99,
            speed: 0.1,
            intensity: 1.0,
        });
        s.update_pulses();
        assert!(s.pulses().is_empty());
        assert!(s.pending.any(|&l| l == 1));
        // released only once the delay has passed
        for _ in 0..s.config.cascade_delay {
            assert!(s.pulses().is_empty());
            s.pending.advance();
            for layer in s.pending.take_due() {
                s.propagate(layer);
            }
        }
        assert_eq!(s.pulses().len(), 1);
        assert_eq!(s.pulses()[0].from, NodeId { layer: 1, index: 1 });
    }

    #[test]
    fn resize_keeps_progress_and_replaces_layout() {
        let mut s = sim(&[18, 15, 10, 5], "abc", 11);
        for _ in 0..20_000 {
            s.step();
            s.decay();
            if s.revealed().len() == 1 && s.is_processing() {
                break;
            }
        }
        assert_eq!(s.revealed(), "A");

        let small = vp(80.0, 48.0);
        s.rebuild(small);
        assert_eq!(s.revealed(), "A");
        assert!(s.pulses().is_empty());
        assert!(!s.is_processing());
        assert_eq!(s.topology().edges().len(), 18 * 15 + 15 * 10 + 10 * 5);
        assert!(s.topology().nodes().all(|n| small.contains(n.x, n.y)));

        run(&mut s, 20_000);
        assert_eq!(s.revealed(), "ABC");
    }

    #[test]
    fn empty_name_is_complete_from_the_start() {
        let mut s = sim(&[3, 2], "", 12);
        assert!(s.is_complete());
        s.step();
        assert_eq!(s.cycles(), 0);
        assert_eq!(s.stage(), Stage::AllLettersDone);
    }

    #[test]
    fn fizzled_cycle_is_retried() {
        let mut s = sim(&[2, 2, 2], "A", 13);
        s.processing = true;
        s.update_pulses();
        assert!(!s.is_processing());
        assert_eq!(s.revealed(), "");
        assert_eq!(s.stage(), Stage::Idle);
    }

    #[test]
    fn a_started_cycle_shows_input_activated_for_one_frame() {
        let mut s = sim(&[18, 15, 10, 5], "A", 14);
        assert_eq!(s.stage(), Stage::Idle);
        s.step();
        assert_eq!(s.stage(), Stage::InputActivated);
        s.decay();
        s.step();
        assert_eq!(s.stage(), Stage::Propagating);
    }

    #[test]
    fn consecutive_arrivals_queue_a_layer_twice() {
        let mut s = sim(&[2, 3, 3, 2], "A", 15);
        set_layer(&mut s, 1, 0.0);
        for index in [1, 2] {
            s.pulses.push(Pulse {
                from: NodeId { layer: 0, index: 0 },
                to: NodeId { layer: 1, index },
                progress: 0.99,
                speed: 0.1,
                intensity: 1.0,
            });
            s.update_pulses();
            s.pending.advance();
        }
        let mut due = Vec::new();
        for _ in 0..s.config.cascade_delay {
            s.pending.advance();
            due.extend(s.pending.take_due());
        }
        assert_eq!(due, vec![1, 1]);
        for layer in due {
            s.propagate(layer);
        }
        // both queued jobs fire from the two excited nodes
        assert_eq!(s.pulses().len(), 4);
    }
}
