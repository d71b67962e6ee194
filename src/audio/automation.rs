use std::collections::VecDeque;

use crate::audio_api::Automation;

/// A parameter value plus its pending automation events.
///
/// Reads must move forward in time: events are consumed as soon as the
/// read time passes them.
#[derive(Clone, Debug)]
pub struct AudioParam {
    value: f32,
    anchor_time: f64,
    // (target, time constant) of an exponential approach that has started
    target: Option<(f32, f64)>,
    events: VecDeque<Automation>,
}

impl AudioParam {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            anchor_time: 0.0,
            target: None,
            events: VecDeque::new(),
        }
    }

    /// Immediate write, drops whatever was scheduled.
    pub fn set(&mut self, value: f32) {
        self.value = value;
        self.target = None;
        self.events.clear();
    }

    pub fn schedule(&mut self, event: Automation) {
        // events at the same time keep their call order
        let at = self
            .events
            .iter()
            .position(|e| e.time() > event.time())
            .unwrap_or(self.events.len());
        self.events.insert(at, event);
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Last settled value, without consuming anything.
    pub fn current(&self) -> f32 {
        self.value
    }

    pub fn value_at(&mut self, t: f64) -> f32 {
        while let Some(&event) = self.events.front() {
            if event.time() > t {
                if let Automation::LinearRampToValueAtTime { value, time } = event {
                    // ramp in progress, starts from wherever the previous event left us
                    let v0 = self.settled(self.anchor_time);
                    let span = time - self.anchor_time;
                    if span <= 0.0 {
                        return value;
                    }
                    let frac = ((t - self.anchor_time) / span) as f32;
                    return v0 + (value - v0) * frac;
                }
                break;
            }

            match event {
                Automation::SetValueAtTime { value, time }
                | Automation::LinearRampToValueAtTime { value, time } => {
                    self.value = value;
                    self.anchor_time = time;
                    self.target = None;
                }
                Automation::SetTargetAtTime { target, time, time_constant } => {
                    self.value = self.settled(time);
                    self.anchor_time = time;
                    self.target = Some((target, time_constant));
                }
            }
            self.events.pop_front();
        }
        self.settled(t)
    }

    fn settled(&self, t: f64) -> f32 {
        match self.target {
            Some((target, tau)) if tau > 0.0 => {
                let elapsed = (t - self.anchor_time).max(0.0);
                target + (self.value - target) * (-elapsed / tau).exp() as f32
            }
            Some((target, _)) => target,
            None => self.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn triangle_window_hits_zero_one_zero() {
        let mut p = AudioParam::new(1.0);
        p.set(0.0);
        p.schedule(Automation::SetValueAtTime { value: 0.0, time: 1.0 });
        p.schedule(Automation::LinearRampToValueAtTime { value: 1.0, time: 1.05 });
        p.schedule(Automation::LinearRampToValueAtTime { value: 0.0, time: 1.1 });

        assert!(close(p.value_at(0.5), 0.0));
        assert!(close(p.value_at(1.0), 0.0));
        assert!(close(p.value_at(1.025), 0.5));
        assert!(close(p.value_at(1.05), 1.0));
        assert!(close(p.value_at(1.075), 0.5));
        assert!(close(p.value_at(1.1), 0.0));
        assert!(close(p.value_at(2.0), 0.0));
    }

    #[test]
    fn ramps_are_monotonic() {
        let mut p = AudioParam::new(0.0);
        p.schedule(Automation::SetValueAtTime { value: 0.0, time: 0.0 });
        p.schedule(Automation::LinearRampToValueAtTime { value: 1.0, time: 1.0 });
        p.schedule(Automation::LinearRampToValueAtTime { value: 0.0, time: 2.0 });

        let mut last = p.value_at(0.0);
        for i in 1..=100 {
            let v = p.value_at(i as f64 / 100.0);
            assert!(v >= last);
            last = v;
        }
        for i in 101..=200 {
            let v = p.value_at(i as f64 / 100.0);
            assert!(v <= last);
            last = v;
        }
    }

    #[test]
    fn set_target_approaches_exponentially() {
        let mut p = AudioParam::new(1.0);
        p.schedule(Automation::SetTargetAtTime { target: 0.0, time: 0.0, time_constant: 0.01 });
        assert!(close(p.value_at(0.0), 1.0));
        assert!((p.value_at(0.01) - (-1.0f32).exp()).abs() < 1e-4);
        assert!(p.value_at(0.1) < 1e-4);
    }

    #[test]
    fn immediate_set_cancels_schedule() {
        let mut p = AudioParam::new(0.0);
        p.schedule(Automation::SetValueAtTime { value: 5.0, time: 1.0 });
        p.set(0.25);
        assert!(!p.has_events());
        assert!(close(p.value_at(2.0), 0.25));
    }

    #[test]
    fn same_time_events_keep_call_order() {
        let mut p = AudioParam::new(0.0);
        p.schedule(Automation::SetValueAtTime { value: 1.0, time: 1.0 });
        p.schedule(Automation::SetValueAtTime { value: 2.0, time: 1.0 });
        assert!(close(p.value_at(1.0), 2.0));
    }
}
