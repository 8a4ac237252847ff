//! Device boundary.
//!
//! A design is modelled as registered logic: [`Dut::on_rising_edge`] runs once
//! per rising clock edge, reads the harness-side signals as they were sampled at
//! that edge and drives its outputs, which become visible in the next delta
//! round. The harness never looks inside the design.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

use crate::error::{TbError, TbResult};
use crate::signal::{Signal, SignalRef};

pub struct DutPorts {
    pub rst_n: SignalRef<bool>,
    pub pull_rdy: SignalRef<bool>,
    pub pull_dat: SignalRef<u32>,
    pub pull_pop: Signal<bool>,
    pub push_rdy: SignalRef<bool>,
    pub push_push: Signal<bool>,
    pub push_dat: Signal<u32>,
}

impl DutPorts {
    /// True if the pull handshake completes at this edge.
    pub fn pull_transfer(&self) -> bool {
        self.pull_rdy.get() && self.pull_pop.get()
    }

    /// True if the push handshake completes at this edge.
    pub fn push_transfer(&self) -> bool {
        self.push_rdy.get() && self.push_push.get()
    }

    /// Drives every output to zero.
    pub fn idle(&self) {
        self.pull_pop.set(false);
        self.push_push.set(false);
        self.push_dat.set(0);
    }
}

pub trait Dut: Send + 'static {
    fn name(&self) -> &str {
        "dut"
    }
    fn on_rising_edge(&mut self, ports: &DutPorts);
}

pub async fn run_dut(mut dut: Box<dyn Dut>, clk: SignalRef<bool>, ports: DutPorts) -> TbResult {
    debug!("[{}] {}: attached", clk.sim().time_display(), dut.name());
    loop {
        clk.rising_edge().await;
        dut.on_rising_edge(&ports);
    }
}

/// Reference design: a FIFO of `depth` words that forwards each popped word
/// `latency` cycles after it was taken, in order. Optionally stalls either
/// interface at random, from a seeded generator.
pub struct PassThrough {
    latency: u64,
    depth: usize,
    cycle: u64,
    // (word, first cycle it may be offered)
    fifo: VecDeque<(u32, u64)>,
    stall: Option<(StdRng, f64)>,
}

impl PassThrough {
    pub fn new(latency: u64, depth: usize) -> TbResult<Self> {
        if depth == 0 {
            return Err(TbError::InvalidConfiguration(
                "pass-through depth must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            latency,
            depth,
            cycle: 0,
            fifo: VecDeque::with_capacity(depth),
            stall: None,
        })
    }

    pub fn with_random_stall(mut self, probability: f64, seed: u64) -> TbResult<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(TbError::InvalidConfiguration(format!(
                "stall probability {} not in [0, 1]",
                probability
            )));
        }
        self.stall = match probability > 0.0 {
            true => Some((StdRng::seed_from_u64(seed), probability)),
            false => None,
        };
        Ok(self)
    }

    fn stalled(&mut self) -> bool {
        match &mut self.stall {
            Some((rng, p)) => rng.gen_bool(*p),
            None => false,
        }
    }
}

impl Dut for PassThrough {
    fn name(&self) -> &str {
        "pass_through"
    }

    fn on_rising_edge(&mut self, ports: &DutPorts) {
        self.cycle += 1;
        if !ports.rst_n.get() {
            self.fifo.clear();
            ports.idle();
            return;
        }

        let taken = ports.push_transfer();
        if taken {
            self.fifo.pop_front();
        }
        if ports.pull_transfer() {
            self.fifo
                .push_back((ports.pull_dat.get(), self.cycle + self.latency));
        }

        let stall_in = self.stalled();
        let stall_out = self.stalled();
        ports
            .pull_pop
            .set(self.fifo.len() < self.depth && !stall_in);

        // an offered word stays on the bus until it is taken
        let holding = ports.push_push.get() && !taken;
        match self.fifo.front() {
            Some(&(word, ready)) if holding || (ready <= self.cycle && !stall_out) => {
                ports.push_dat.set(word);
                ports.push_push.set(true);
            }
            _ => {
                ports.push_push.set(false);
                ports.push_dat.set(0);
            }
        }
    }
}
