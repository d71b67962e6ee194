// The audio graph port: everything the producers are allowed to ask of the
// audio backend. Calls are fire-and-forget; each one becomes a `GraphCommand`
// that the renderer applies in order at the start of its next block.
use std::sync::Arc;

pub use crate::audio::{next_node_id, AudioBuffer, NodeId};

/// Automatable parameters across all node kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Param {
    Gain,
    DelayTime,
    Frequency,
    PlaybackRate,
}

#[derive(Clone, Debug)]
pub enum NodeSpec {
    Gain,
    // same processing as `Gain`, kept separate so loops are recognisable in traces
    FeedbackGain,
    Delay { max_delay: f64 },
    BiquadLowpass { cutoff_hz: f32 },
    Convolver { buffer: Arc<AudioBuffer> },
    BufferSource { buffer: Arc<AudioBuffer> },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Automation {
    SetValueAtTime { value: f32, time: f64 },
    LinearRampToValueAtTime { value: f32, time: f64 },
    SetTargetAtTime { target: f32, time: f64, time_constant: f64 },
}

impl Automation {
    pub fn time(&self) -> f64 {
        match *self {
            Automation::SetValueAtTime { time, .. }
            | Automation::LinearRampToValueAtTime { time, .. }
            | Automation::SetTargetAtTime { time, .. } => time,
        }
    }
}

#[derive(Clone, Debug)]
pub enum GraphCommand {
    Create { id: NodeId, spec: NodeSpec },
    Connect { from: NodeId, to: NodeId },
    // `to: None` drops every outgoing connection of `from`
    Disconnect { from: NodeId, to: Option<NodeId> },
    SetValue { node: NodeId, param: Param, value: f32 },
    Automate { node: NodeId, param: Param, event: Automation },
    Start { node: NodeId, time: f64, offset: f64 },
    Stop { node: NodeId, time: f64 },
    SetBuffer { node: NodeId, buffer: Arc<AudioBuffer> },
    // drop the node once nothing feeds it anymore (transient envelopes)
    ReleaseWhenIdle { node: NodeId },
}

/// Node creation, wiring and parameter automation.
///
/// Implementors only provide `submit`; every other call is expressed as a
/// command. Node ids are handed out on the calling side so creation never
/// has to wait for the audio thread.
pub trait AudioGraph {
    fn submit(&mut self, cmd: GraphCommand);

    fn destination(&self) -> NodeId {
        NodeId::DESTINATION
    }

    fn create(&mut self, spec: NodeSpec) -> NodeId {
        let id = next_node_id();
        self.submit(GraphCommand::Create { id, spec });
        id
    }

    fn create_gain(&mut self) -> NodeId {
        self.create(NodeSpec::Gain)
    }

    fn create_feedback_gain(&mut self) -> NodeId {
        self.create(NodeSpec::FeedbackGain)
    }

    fn create_delay(&mut self, max_delay: f64) -> NodeId {
        self.create(NodeSpec::Delay { max_delay })
    }

    fn create_biquad_lowpass(&mut self, cutoff_hz: f32) -> NodeId {
        self.create(NodeSpec::BiquadLowpass { cutoff_hz })
    }

    fn create_convolver(&mut self, buffer: Arc<AudioBuffer>) -> NodeId {
        self.create(NodeSpec::Convolver { buffer })
    }

    fn create_buffer_source(&mut self, buffer: Arc<AudioBuffer>) -> NodeId {
        self.create(NodeSpec::BufferSource { buffer })
    }

    fn connect(&mut self, from: NodeId, to: NodeId) {
        self.submit(GraphCommand::Connect { from, to });
    }

    fn disconnect(&mut self, from: NodeId, to: Option<NodeId>) {
        self.submit(GraphCommand::Disconnect { from, to });
    }

    /// Immediate write; cancels anything scheduled on the parameter.
    fn set_value(&mut self, node: NodeId, param: Param, value: f32) {
        self.submit(GraphCommand::SetValue { node, param, value });
    }

    fn set_value_at_time(&mut self, node: NodeId, param: Param, value: f32, time: f64) {
        let event = Automation::SetValueAtTime { value, time };
        self.submit(GraphCommand::Automate { node, param, event });
    }

    fn linear_ramp_to_value_at_time(&mut self, node: NodeId, param: Param, value: f32, time: f64) {
        let event = Automation::LinearRampToValueAtTime { value, time };
        self.submit(GraphCommand::Automate { node, param, event });
    }

    fn set_target_at_time(
        &mut self,
        node: NodeId,
        param: Param,
        target: f32,
        time: f64,
        time_constant: f64,
    ) {
        let event = Automation::SetTargetAtTime { target, time, time_constant };
        self.submit(GraphCommand::Automate { node, param, event });
    }

    fn start(&mut self, node: NodeId, time: f64, offset: f64) {
        self.submit(GraphCommand::Start { node, time, offset });
    }

    fn stop(&mut self, node: NodeId, time: f64) {
        self.submit(GraphCommand::Stop { node, time });
    }

    fn set_buffer(&mut self, node: NodeId, buffer: Arc<AudioBuffer>) {
        self.submit(GraphCommand::SetBuffer { node, buffer });
    }

    fn release_when_idle(&mut self, node: NodeId) {
        self.submit(GraphCommand::ReleaseWhenIdle { node });
    }
}

/// Records every command instead of rendering; lets tests inspect exactly
/// which nodes a producer built and how it automated them.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingGraph {
    pub commands: Vec<GraphCommand>,
}

#[cfg(test)]
impl RecordingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> Vec<(NodeId, &NodeSpec)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                GraphCommand::Create { id, spec } => Some((*id, spec)),
                _ => None,
            })
            .collect()
    }

    pub fn sources(&self) -> Vec<NodeId> {
        self.created()
            .into_iter()
            .filter(|(_, spec)| matches!(spec, NodeSpec::BufferSource { .. }))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn is_connected(&self, from: NodeId, to: NodeId) -> bool {
        self.commands
            .iter()
            .any(|c| matches!(c, GraphCommand::Connect { from: f, to: t } if *f == from && *t == to))
    }

    pub fn automation(&self, node: NodeId, param: Param) -> Vec<Automation> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                GraphCommand::Automate { node: n, param: p, event } if *n == node && *p == param => {
                    Some(*event)
                }
                _ => None,
            })
            .collect()
    }

    pub fn start_of(&self, node: NodeId) -> Option<(f64, f64)> {
        self.commands.iter().find_map(|c| match c {
            GraphCommand::Start { node: n, time, offset } if *n == node => Some((*time, *offset)),
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

#[cfg(test)]
impl AudioGraph for RecordingGraph {
    fn submit(&mut self, cmd: GraphCommand) {
        self.commands.push(cmd);
    }
}
