use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::Sender;

use crate::audio_api::{AudioGraph, GraphCommand, NodeSpec, Param};
use crate::scheduler::Clock;

use super::automation::AudioParam;
use super::convolver::Convolver;
use super::effect::{Biquad, DelayLine};
use super::frame::StereoFrame;
use super::node_id::NodeId;
use super::voice::Voice;

enum Processor {
    Destination,
    Gain { gain: AudioParam },
    Delay { line: DelayLine, delay_time: AudioParam },
    Lowpass { filter: Biquad, frequency: AudioParam },
    Convolver(Box<Convolver>),
    Source(Voice),
}

impl Processor {
    fn build(spec: NodeSpec, sample_rate: f64) -> Self {
        match spec {
            NodeSpec::Gain | NodeSpec::FeedbackGain => Processor::Gain { gain: AudioParam::new(1.0) },
            NodeSpec::Delay { max_delay } => Processor::Delay {
                line: DelayLine::new(max_delay.max(0.0), sample_rate),
                delay_time: AudioParam::new(0.0),
            },
            NodeSpec::BiquadLowpass { cutoff_hz } => Processor::Lowpass {
                filter: Biquad::lowpass(cutoff_hz, sample_rate),
                frequency: AudioParam::new(cutoff_hz),
            },
            NodeSpec::Convolver { buffer } => Processor::Convolver(Box::new(Convolver::new(&buffer))),
            NodeSpec::BufferSource { buffer } => Processor::Source(Voice::new(buffer)),
        }
    }

    fn param_mut(&mut self, param: Param) -> Option<&mut AudioParam> {
        match (self, param) {
            (Processor::Gain { gain }, Param::Gain) => Some(gain),
            (Processor::Delay { delay_time, .. }, Param::DelayTime) => Some(delay_time),
            (Processor::Lowpass { frequency, .. }, Param::Frequency) => Some(frequency),
            (Processor::Source(voice), Param::PlaybackRate) => Some(&mut voice.rate),
            _ => None,
        }
    }
}

struct Node {
    id: NodeId,
    processor: Processor,
    inputs: Vec<NodeId>,
    // resolved positions of `inputs`, refreshed on every rebuild
    input_slots: Vec<usize>,
    output: StereoFrame,
    release_when_idle: bool,
    muted: bool,
    // has ever had an input; an unfed node is not idle yet
    fed: bool,
}

impl Node {
    fn new(id: NodeId, processor: Processor) -> Self {
        Self {
            id,
            processor,
            inputs: Vec::new(),
            input_slots: Vec::new(),
            output: StereoFrame::zero(),
            release_when_idle: false,
            muted: false,
            fed: false,
        }
    }

    fn is_finished(&self) -> bool {
        match &self.processor {
            Processor::Source(voice) => voice.has_ended(),
            Processor::Destination => false,
            _ => self.release_when_idle && self.fed && self.inputs.is_empty(),
        }
    }
}

/// Audio clock backed by the renderer's frame counter.
#[derive(Clone)]
pub struct AudioClock {
    frames: Arc<AtomicU64>,
    sample_rate: f64,
}

impl Clock for AudioClock {
    fn now(&self) -> f64 {
        self.frames.load(Ordering::Relaxed) as f64 / self.sample_rate
    }
}

/// Sample-accurate renderer for the node graph.
///
/// Nodes are evaluated once per frame in topological order. Edges into delay
/// nodes don't count for the ordering: a delay outputs what it stored earlier
/// and takes its input after everything else ran, so loops through a delay
/// are fine. A loop without one is muted.
pub struct Engine {
    sample_rate: f64,
    nodes: Vec<Node>,
    index: HashMap<NodeId, usize>,
    order: Vec<usize>,
    dirty: bool,
    frame: u64,
    frames: Arc<AtomicU64>,
    ended_tx: Option<Sender<NodeId>>,
}

impl Engine {
    pub fn new(sample_rate: u32) -> Self {
        let mut engine = Self {
            sample_rate: sample_rate as f64,
            nodes: vec![Node::new(NodeId::DESTINATION, Processor::Destination)],
            index: HashMap::new(),
            order: Vec::new(),
            dirty: true,
            frame: 0,
            frames: Arc::new(AtomicU64::new(0)),
            ended_tx: None,
        };
        engine.reindex();
        engine
    }

    pub fn set_ended_tx(&mut self, tx: Sender<NodeId>) {
        self.ended_tx = Some(tx);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate as u32
    }

    pub fn clock(&self) -> AudioClock {
        AudioClock {
            frames: Arc::clone(&self.frames),
            sample_rate: self.sample_rate,
        }
    }

    pub fn current_time(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn handle_cmd(&mut self, cmd: GraphCommand) {
        match cmd {
            GraphCommand::Create { id, spec } => {
                if id == NodeId::DESTINATION {
                    tracing::warn!("refusing to replace the destination node");
                    return;
                }
                let node = Node::new(id, Processor::build(spec, self.sample_rate));
                match self.index.get(&id) {
                    Some(&slot) => self.nodes[slot] = node,
                    None => {
                        self.index.insert(id, self.nodes.len());
                        self.nodes.push(node);
                    }
                }
                self.dirty = true;
            }
            GraphCommand::Connect { from, to } => {
                if !self.index.contains_key(&from) {
                    tracing::debug!("connect from unknown {from}");
                    return;
                }
                if let Some(node) = self.node_mut(to) {
                    if !node.inputs.contains(&from) {
                        node.inputs.push(from);
                    }
                    node.fed = true;
                    self.dirty = true;
                }
            }
            GraphCommand::Disconnect { from, to } => {
                for node in &mut self.nodes {
                    if to.is_none_or(|to| to == node.id) {
                        node.inputs.retain(|&i| i != from);
                    }
                }
                self.dirty = true;
            }
            GraphCommand::SetValue { node, param, value } => {
                if let Some(p) = self.param_mut(node, param) {
                    p.set(value);
                }
            }
            GraphCommand::Automate { node, param, event } => {
                if let Some(p) = self.param_mut(node, param) {
                    p.schedule(event);
                }
            }
            GraphCommand::Start { node, time, offset } => match self.node_mut(node) {
                Some(Node { processor: Processor::Source(voice), .. }) => voice.start(time, offset),
                Some(_) => tracing::warn!("start on {node}, which is not a buffer source"),
                None => {}
            },
            GraphCommand::Stop { node, time } => match self.node_mut(node) {
                Some(Node { processor: Processor::Source(voice), .. }) => voice.stop(time),
                Some(_) => tracing::warn!("stop on {node}, which is not a buffer source"),
                None => {}
            },
            GraphCommand::SetBuffer { node, buffer } => match self.node_mut(node) {
                Some(Node { processor: Processor::Convolver(conv), .. }) => conv.set_impulse(&buffer),
                Some(_) => tracing::warn!("set_buffer on {node}, which is not a convolver"),
                None => {}
            },
            GraphCommand::ReleaseWhenIdle { node } => {
                if let Some(n) = self.node_mut(node) {
                    n.release_when_idle = true;
                }
            }
        }
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        match self.index.get(&id) {
            Some(&slot) => Some(&mut self.nodes[slot]),
            None => {
                // transient nodes can legitimately be gone already
                tracing::debug!("command for unknown {id}");
                None
            }
        }
    }

    fn param_mut(&mut self, id: NodeId, param: Param) -> Option<&mut AudioParam> {
        let node = self.node_mut(id)?;
        let p = node.processor.param_mut(param);
        if p.is_none() {
            tracing::warn!("{id} has no {param:?} parameter");
        }
        p
    }

    pub fn render_block(&mut self, out: &mut [StereoFrame]) {
        if self.dirty {
            self.rebuild();
        }
        for frame in out.iter_mut() {
            let t = self.frame as f64 / self.sample_rate;
            *frame = self.render_frame(t);
            self.frame += 1;
        }
        self.frames.store(self.frame, Ordering::Relaxed);
        self.reap();
    }

    fn render_frame(&mut self, t: f64) -> StereoFrame {
        let sr = self.sample_rate;

        // delays only depend on the past
        for node in &mut self.nodes {
            if let Processor::Delay { line, delay_time } = &mut node.processor {
                node.output = line.read(delay_time.value_at(t) as f64, sr);
            }
        }

        for i in 0..self.order.len() {
            let slot = self.order[i];
            if self.nodes[slot].muted || matches!(self.nodes[slot].processor, Processor::Delay { .. }) {
                continue;
            }
            let input = self.sum_inputs(slot);
            let node = &mut self.nodes[slot];
            node.output = match &mut node.processor {
                Processor::Destination => input,
                Processor::Gain { gain } => input * gain.value_at(t),
                Processor::Lowpass { filter, frequency } => {
                    filter.set_cutoff(frequency.value_at(t), sr);
                    filter.process(input)
                }
                Processor::Convolver(conv) => conv.process(input),
                Processor::Source(voice) => voice.next_frame(t, sr),
                Processor::Delay { .. } => continue,
            };
        }

        for slot in 0..self.nodes.len() {
            if matches!(self.nodes[slot].processor, Processor::Delay { .. }) {
                let input = self.sum_inputs(slot);
                if let Processor::Delay { line, .. } = &mut self.nodes[slot].processor {
                    line.write(input);
                }
            }
        }

        self.nodes[0].output
    }

    fn sum_inputs(&self, slot: usize) -> StereoFrame {
        let mut acc = StereoFrame::zero();
        for &i in &self.nodes[slot].input_slots {
            acc += self.nodes[i].output;
        }
        acc
    }

    fn reindex(&mut self) {
        self.index = self.nodes.iter().enumerate().map(|(slot, n)| (n.id, slot)).collect();
    }

    // Kahn's algorithm with delay nodes as roots. Nodes stuck on a loop
    // without a delay become silent roots so whatever they feed still runs.
    fn rebuild(&mut self) {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut outs: Vec<Vec<usize>> = vec![Vec::new(); n];

        for slot in 0..n {
            let slots: Vec<usize> = self.nodes[slot]
                .inputs
                .iter()
                .filter_map(|id| self.index.get(id).copied())
                .collect();
            if !matches!(self.nodes[slot].processor, Processor::Delay { .. }) {
                in_degree[slot] = slots.len();
                for &src in &slots {
                    outs[src].push(slot);
                }
            }
            self.nodes[slot].input_slots = slots;
        }

        let mut muted = vec![false; n];
        let mut order = kahn(in_degree.clone(), &outs, &muted);
        if order.len() < n {
            let mut scheduled = vec![false; n];
            for &slot in &order {
                scheduled[slot] = true;
            }
            for slot in (0..n).filter(|&s| !scheduled[s]) {
                muted[slot] = on_cycle(slot, &outs, &scheduled);
            }
            tracing::warn!(
                "{} node(s) sit in a loop without a delay and are muted",
                muted.iter().filter(|&&m| m).count()
            );
            for slot in 0..n {
                if muted[slot] {
                    in_degree[slot] = 0;
                }
            }
            order = kahn(in_degree, &outs, &muted);
        }

        for (node, &m) in self.nodes.iter_mut().zip(&muted) {
            node.muted = m;
            if m {
                node.output = StereoFrame::zero();
            }
        }
        self.order = order;
        self.dirty = false;
    }

    fn reap(&mut self) {
        loop {
            let dead: Vec<NodeId> = self.nodes.iter().filter(|n| n.is_finished()).map(|n| n.id).collect();
            if dead.is_empty() {
                return;
            }
            for node in self.nodes.iter().filter(|n| dead.contains(&n.id)) {
                if let (Processor::Source(_), Some(tx)) = (&node.processor, &self.ended_tx) {
                    let _ = tx.try_send(node.id);
                }
            }
            self.nodes.retain(|n| !dead.contains(&n.id));
            for node in &mut self.nodes {
                node.inputs.retain(|i| !dead.contains(i));
            }
            self.reindex();
            self.dirty = true;
        }
    }
}

fn kahn(mut in_degree: Vec<usize>, outs: &[Vec<usize>], muted: &[bool]) -> Vec<usize> {
    let mut order = Vec::with_capacity(in_degree.len());
    let mut ready: Vec<usize> = (0..in_degree.len()).filter(|&s| in_degree[s] == 0).collect();
    while let Some(slot) = ready.pop() {
        order.push(slot);
        for &next in &outs[slot] {
            if muted[next] {
                continue;
            }
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(next);
            }
        }
    }
    order
}

// can `start` reach itself without passing through an already ordered node
fn on_cycle(start: usize, outs: &[Vec<usize>], scheduled: &[bool]) -> bool {
    let mut seen = vec![false; outs.len()];
    let mut stack = outs[start].clone();
    while let Some(slot) = stack.pop() {
        if slot == start {
            return true;
        }
        if scheduled[slot] || seen[slot] {
            continue;
        }
        seen[slot] = true;
        stack.extend(&outs[slot]);
    }
    false
}

impl AudioGraph for Engine {
    fn submit(&mut self, cmd: GraphCommand) {
        self.handle_cmd(cmd);
    }
}
