use serde::{Deserialize, Serialize};

use crate::audio_api::{AudioGraph, NodeId, Param};
use crate::params::{clamp_logged, DELAY_TIME_RANGE};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelaySettings {
    pub pre_gain: f64,
    pub delay_time: f64,
    pub feedback: f64,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            pre_gain: 1.0,
            delay_time: 1.0,
            feedback: 1.0,
        }
    }
}

/// Dry path plus a delay line that feeds back into itself.
///
/// ```text
/// input ──────────────────────────► output
///   └─► pre_gain ─► delay ─┬──────► output
///                    ▲     │
///                    └─ feedback ◄┘
/// ```
///
/// Feedback is not limited: at 1.0 echoes never decay, above it they grow
/// without bound.
pub struct FeedbackDelayNetwork {
    input: NodeId,
    pre_gain: NodeId,
    delay: NodeId,
    feedback: NodeId,
    output: NodeId,
    settings: DelaySettings,
}

impl FeedbackDelayNetwork {
    pub fn new(graph: &mut dyn AudioGraph) -> Self {
        Self::with_settings(graph, DelaySettings::default())
    }

    pub fn with_settings(graph: &mut dyn AudioGraph, settings: DelaySettings) -> Self {
        let input = graph.create_gain();
        let pre_gain = graph.create_gain();
        let delay = graph.create_delay(*DELAY_TIME_RANGE.end());
        let feedback = graph.create_feedback_gain();
        let output = graph.create_gain();

        graph.connect(input, output);
        graph.connect(input, pre_gain);
        graph.connect(pre_gain, delay);
        graph.connect(delay, output);
        graph.connect(delay, feedback);
        graph.connect(feedback, delay);

        let mut fdn = Self {
            input,
            pre_gain,
            delay,
            feedback,
            output,
            settings: DelaySettings::default(),
        };
        fdn.set_pre_gain(graph, settings.pre_gain);
        fdn.set_delay_time(graph, settings.delay_time);
        fdn.set_feedback(graph, settings.feedback);
        fdn
    }

    /// Where sounds go in.
    pub fn input(&self) -> NodeId {
        self.input
    }

    pub fn output(&self) -> NodeId {
        self.output
    }

    /// Adds another tap on the output; earlier connections stay.
    pub fn connect(&self, graph: &mut dyn AudioGraph, sink: NodeId) {
        graph.connect(self.output, sink);
    }

    pub fn settings(&self) -> DelaySettings {
        self.settings
    }

    pub fn pre_gain(&self) -> f64 {
        self.settings.pre_gain
    }

    pub fn set_pre_gain(&mut self, graph: &mut dyn AudioGraph, value: f64) {
        if !value.is_finite() {
            tracing::warn!(value, "ignoring non-finite delay pre-gain");
            return;
        }
        self.settings.pre_gain = value;
        graph.set_value(self.pre_gain, Param::Gain, value as f32);
    }

    pub fn delay_time(&self) -> f64 {
        self.settings.delay_time
    }

    pub fn set_delay_time(&mut self, graph: &mut dyn AudioGraph, seconds: f64) {
        if let Some(t) = clamp_logged("delay time", seconds, DELAY_TIME_RANGE) {
            self.settings.delay_time = t;
            graph.set_value(self.delay, Param::DelayTime, t as f32);
        }
    }

    pub fn feedback(&self) -> f64 {
        self.settings.feedback
    }

    pub fn set_feedback(&mut self, graph: &mut dyn AudioGraph, value: f64) {
        if !value.is_finite() {
            tracing::warn!(value, "ignoring non-finite delay feedback");
            return;
        }
        if value.abs() >= 1.0 {
            tracing::warn!(value, "delay feedback at or above unity, echoes will not decay");
        }
        self.settings.feedback = value;
        graph.set_value(self.feedback, Param::Gain, value as f32);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audio::{Engine, StereoFrame};
    use crate::audio_api::{AudioBuffer, GraphCommand, RecordingGraph};

    fn impulse_response(settings: DelaySettings, frames: usize) -> Vec<f32> {
        let mut engine = Engine::new(1000);
        let fdn = FeedbackDelayNetwork::with_settings(&mut engine, settings);
        fdn.connect(&mut engine, NodeId::DESTINATION);

        let click = engine.create_buffer_source(Arc::new(AudioBuffer::from_mono(1000, vec![1.0]).unwrap()));
        engine.connect(click, fdn.input());
        engine.start(click, 0.0, 0.0);

        let mut out = vec![StereoFrame::zero(); frames];
        engine.render_block(&mut out);
        out.iter().map(|f| f.left).collect()
    }

    #[test]
    fn wiring() {
        let mut graph = RecordingGraph::new();
        let fdn = FeedbackDelayNetwork::new(&mut graph);
        let edges = [
            (fdn.input, fdn.output),
            (fdn.input, fdn.pre_gain),
            (fdn.pre_gain, fdn.delay),
            (fdn.delay, fdn.output),
            (fdn.delay, fdn.feedback),
            (fdn.feedback, fdn.delay),
        ];
        for (from, to) in edges {
            assert!(graph.is_connected(from, to), "{from} -> {to}");
        }
        let connects = graph.commands.iter().filter(|c| matches!(c, GraphCommand::Connect { .. })).count();
        assert_eq!(connects, edges.len());
        assert_eq!(fdn.settings(), DelaySettings::default());
    }

    #[test]
    fn no_feedback_means_exactly_one_echo() {
        let settings = DelaySettings { pre_gain: 1.0, delay_time: 0.1, feedback: 0.0 };
        let out = impulse_response(settings, 400);
        for (i, s) in out.iter().enumerate() {
            let expected = if i == 0 || i == 100 { 1.0 } else { 0.0 };
            assert!((s - expected).abs() < 1e-6, "frame {i}: {s}");
        }
    }

    #[test]
    fn echoes_decay_by_the_feedback_gain() {
        let settings = DelaySettings { pre_gain: 0.5, delay_time: 0.05, feedback: 0.5 };
        let out = impulse_response(settings, 200);
        assert!((out[0] - 1.0).abs() < 1e-6);
        assert!((out[50] - 0.5).abs() < 1e-6);
        assert!((out[100] - 0.25).abs() < 1e-6);
        assert!((out[150] - 0.125).abs() < 1e-6);
    }

    #[test]
    fn setters_clamp_delay_but_not_gains() {
        let mut graph = RecordingGraph::new();
        let mut fdn = FeedbackDelayNetwork::new(&mut graph);
        fdn.set_delay_time(&mut graph, 5.0);
        assert_eq!(fdn.delay_time(), 1.0);
        fdn.set_delay_time(&mut graph, 0.0);
        assert_eq!(fdn.delay_time(), 0.001);

        fdn.set_feedback(&mut graph, 1.5);
        assert_eq!(fdn.feedback(), 1.5);
        fdn.set_pre_gain(&mut graph, 3.0);
        assert_eq!(fdn.pre_gain(), 3.0);

        fdn.set_feedback(&mut graph, f64::NAN);
        assert_eq!(fdn.feedback(), 1.5);
        assert!(matches!(
            graph.commands.last(),
            Some(GraphCommand::SetValue { param: Param::Gain, value, .. }) if *value == 3.0
        ));
    }

    #[test]
    fn extra_taps_are_parallel() {
        let mut graph = RecordingGraph::new();
        let fdn = FeedbackDelayNetwork::new(&mut graph);
        fdn.connect(&mut graph, NodeId(77));
        fdn.connect(&mut graph, NodeId(78));
        assert!(graph.is_connected(fdn.output(), NodeId(77)));
        assert!(graph.is_connected(fdn.output(), NodeId(78)));
        assert!(!graph.commands.iter().any(|c| matches!(c, GraphCommand::Disconnect { .. })));
    }
}
