#![allow(dead_code)]

use std::collections::VecDeque;

use pullpush_tb::prelude::*;

/// Test design that pops every offered word, and once `wait_for` words have
/// arrived releases `arrange(first words)` followed by every later word, one per
/// cycle, no earlier than cycle `release_cycle`.
pub struct Scripted {
    wait_for: usize,
    arrange: fn(Vec<u32>) -> Vec<u32>,
    release_cycle: u64,
    noisy_reset: bool,
    cycle: u64,
    held: Vec<u32>,
    released: bool,
    out: VecDeque<u32>,
    pub received: Shared<Vec<u32>>,
}

impl Scripted {
    pub fn new(wait_for: usize, arrange: fn(Vec<u32>) -> Vec<u32>) -> Self {
        Self {
            wait_for,
            arrange,
            release_cycle: 0,
            noisy_reset: false,
            cycle: 0,
            held: Vec::new(),
            released: false,
            out: VecDeque::new(),
            received: Shared::new(Vec::new()),
        }
    }

    pub fn release_at(mut self, cycle: u64) -> Self {
        self.release_cycle = cycle;
        self
    }

    /// Pushes garbage while reset is asserted.
    pub fn noisy_reset(mut self) -> Self {
        self.noisy_reset = true;
        self
    }
}

impl Dut for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn on_rising_edge(&mut self, ports: &DutPorts) {
        self.cycle += 1;
        if !ports.rst_n.get() {
            ports.idle();
            if self.noisy_reset {
                ports.push_push.set(true);
                ports.push_dat.set(0xbad0_bad0);
            }
            return;
        }
        if ports.push_transfer() {
            self.out.pop_front();
        }
        if ports.pull_transfer() {
            let word = ports.pull_dat.get();
            self.received.with_mut(|r| r.push(word));
            match self.released {
                true => self.out.push_back(word),
                false => self.held.push(word),
            }
        }
        if !self.released && self.held.len() >= self.wait_for {
            self.out.extend((self.arrange)(std::mem::take(&mut self.held)));
            self.released = true;
        }
        ports.pull_pop.set(true);
        match self.out.front() {
            Some(&word) if self.cycle >= self.release_cycle => {
                ports.push_dat.set(word);
                ports.push_push.set(true);
            }
            _ => {
                ports.push_dat.set(0);
                ports.push_push.set(false);
            }
        }
    }
}

pub fn quiet_config() -> RunConfig {
    let mut config = RunConfig::default();
    config.trace.enabled = false;
    config
}

/// Wraps a design and checks both handshakes at every rising edge out of reset:
/// while `pull_rdy` is high `pull_dat` must hold the next unsent item, and while
/// `push_push` is high `push_dat` must hold the next undelivered item.
pub struct HandshakeMonitor<D> {
    inner: D,
    items: Vec<u32>,
    pulled: usize,
    pushed: usize,
    pub transfers: Shared<(usize, usize)>,
    pub violations: Shared<Vec<String>>,
}

impl<D: Dut> HandshakeMonitor<D> {
    pub fn new(inner: D, items: Vec<u32>) -> Self {
        Self {
            inner,
            items,
            pulled: 0,
            pushed: 0,
            transfers: Shared::new((0, 0)),
            violations: Shared::new(Vec::new()),
        }
    }

    fn check(&self, side: &str, position: usize, value: u32) {
        let armed = self.items.get(position).copied();
        if armed != Some(value) {
            self.violations.with_mut(|v| {
                v.push(format!("{} word {}: {:#010x}, armed {:x?}", side, position, value, armed))
            });
        }
    }
}

impl<D: Dut> Dut for HandshakeMonitor<D> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn on_rising_edge(&mut self, ports: &DutPorts) {
        if ports.rst_n.get() {
            if ports.pull_rdy.get() {
                self.check("pull", self.pulled, ports.pull_dat.get());
            }
            if ports.push_push.get() {
                self.check("push", self.pushed, ports.push_dat.get());
            }
            if ports.pull_transfer() {
                self.pulled += 1;
            }
            if ports.push_transfer() {
                self.pushed += 1;
            }
            *self.transfers.get() = (self.pulled, self.pushed);
        }
        self.inner.on_rising_edge(ports);
    }
}

/// Forwards to `inner` and panics on rising edge number `at`.
pub struct PanicsAt<D> {
    inner: D,
    at: u64,
    edges: u64,
}

impl<D: Dut> PanicsAt<D> {
    pub fn new(inner: D, at: u64) -> Self {
        Self { inner, at, edges: 0 }
    }
}

impl<D: Dut> Dut for PanicsAt<D> {
    fn on_rising_edge(&mut self, ports: &DutPorts) {
        self.edges += 1;
        if self.edges == self.at {
            panic!("design model crashed at edge {}", self.at);
        }
        self.inner.on_rising_edge(ports);
    }
}
