// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub const REDIRECT_SECONDS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    Running(u32),
    Expired,
    Idle,
}

/// Seconds until the redirect screen signs the user back in. `tick` reports
/// `Expired` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    total: u32,
    remaining: u32,
    fired: bool,
}

impl Countdown {
    pub fn new(total: u32) -> Self {
        Self {
            total: total.max(1),
            remaining: total.max(1),
            fired: false,
        }
    }

    pub fn redirect() -> Self {
        Self::new(REDIRECT_SECONDS)
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_finished(&self) -> bool {
        self.fired
    }

    pub fn tick(&mut self) -> CountdownStep {
        if self.fired {
            return CountdownStep::Idle;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.fired = true;
            CountdownStep::Expired
        } else {
            CountdownStep::Running(self.remaining)
        }
    }

    /// Stops the countdown without expiring it. Returns whether it was still
    /// running.
    pub fn cancel(&mut self) -> bool {
        let was_running = !self.fired;
        self.fired = true;
        was_running
    }

    /// Fraction of the wait already elapsed, for the progress gauge.
    pub fn progress(&self) -> f64 {
        f64::from(self.total - self.remaining) / f64::from(self.total)
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::redirect()
    }
}
