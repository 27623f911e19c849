//! Stateful hyperparameter schedules.
//!
//! A schedule produces the next value of an exploration rate or learning rate
//! each time [`Schedule::value`] is called. The first call always returns
//! [`Schedule::initial`]; subsequent calls follow the schedule's rule.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A hyperparameter that evolves over calls.
pub trait Schedule: Send + fmt::Debug {
    /// Value returned by the first call to [`Schedule::value`].
    fn initial(&self) -> f32;

    /// Return the current value and advance the schedule by one step.
    fn value(&mut self) -> f32;
}

/// Always returns the same value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstantSchedule {
    value: f32,
}

impl ConstantSchedule {
    pub fn new(value: f32) -> Self {
        ConstantSchedule { value }
    }
}

impl Schedule for ConstantSchedule {
    fn initial(&self) -> f32 {
        self.value
    }

    fn value(&mut self) -> f32 {
        self.value
    }
}

/// Linear interpolation from `initial` to `final_value` over `steps` calls,
/// constant at `final_value` afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearSchedule {
    initial: f32,
    final_value: f32,
    steps: usize,
    step: usize,
}

impl LinearSchedule {
    pub fn new(initial: f32, final_value: f32, steps: usize) -> Self {
        LinearSchedule { initial, final_value, steps, step: 0 }
    }

    fn fraction(&self) -> f32 {
        if self.steps == 0 {
            return 1.0;
        }
        (self.step as f32 / self.steps as f32).min(1.0)
    }
}

impl Schedule for LinearSchedule {
    fn initial(&self) -> f32 {
        self.initial
    }

    fn value(&mut self) -> f32 {
        let v = self.initial + self.fraction() * (self.final_value - self.initial);
        self.step = self.step.saturating_add(1);
        v
    }
}

/// Multiplicative decay towards a floor: `current = max(min, current * rate)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecaySchedule {
    initial: f32,
    min: f32,
    rate: f32,
    current: f32,
}

impl DecaySchedule {
    pub fn new(initial: f32, min: f32, rate: f32) -> Self {
        DecaySchedule { initial, min, rate, current: initial }
    }

    /// Value the next call will return, without advancing.
    pub fn current(&self) -> f32 {
        self.current
    }
}

impl Schedule for DecaySchedule {
    fn initial(&self) -> f32 {
        self.initial
    }

    fn value(&mut self) -> f32 {
        let v = self.current;
        self.current = (self.current * self.rate).max(self.min);
        v
    }
}
