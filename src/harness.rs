//! Run wiring.
//!
//! A [`Harness`] owns one configuration and one design. [`Harness::run`] builds
//! a fresh kernel, declares the interface signals, starts the clock, tracer,
//! design, driver and checker in that order, runs for the configured duration
//! and tears everything down. Every entity lives for exactly one run.

use log::info;
use std::time::Instant;

use crate::checker::{Checker, CheckerPorts};
use crate::clock::Clock;
use crate::config::RunConfig;
use crate::driver::{Driver, DriverPorts};
use crate::dut::{run_dut, Dut, DutPorts};
use crate::error::TbResult;
use crate::kernel::Sim;
use crate::report::RunReport;
use crate::shared::Shared;
use crate::tracer::{TraceSink, Tracer, VcdSink};

pub struct Harness {
    config: RunConfig,
    dut: Box<dyn Dut>,
    sink: Option<Box<dyn TraceSink>>,
}

impl Harness {
    /// Validates `config`. With tracing enabled the waveform goes to a VCD file
    /// at the configured path.
    pub fn new(config: RunConfig, dut: impl Dut) -> TbResult<Self> {
        config.validate()?;
        let sink: Option<Box<dyn TraceSink>> = match config.trace.enabled {
            true => Some(Box::new(VcdSink::new())),
            false => None,
        };
        Ok(Self {
            config,
            dut: Box::new(dut),
            sink,
        })
    }

    /// Replaces the trace sink, enabling tracing.
    pub fn with_trace_sink(mut self, sink: impl TraceSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn without_trace(mut self) -> Self {
        self.sink = None;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs the simulation to the configured end time. Checker findings end up
    /// in the report; only harness failures are errors.
    pub fn run(self) -> TbResult<RunReport> {
        let started = Instant::now();
        let Harness { config, dut, sink } = self;

        let sim = Sim::new(config.precision_exp()?)?;
        sim.set_display_unit(&config.time_unit)?;
        sim.set_max_deltas(config.max_deltas);

        let clk = sim.signal("clk", !config.clock.posedge_first)?;
        let rst_n = sim.signal("rst_n", false)?;
        let pull_rdy = sim.signal("pull_rdy", false)?;
        let pull_pop = sim.signal("pull_pop", false)?;
        let pull_dat = sim.signal("pull_dat", 0u32)?;
        let push_rdy = sim.signal("push_rdy", false)?;
        let push_push = sim.signal("push_push", false)?;
        let push_dat = sim.signal("push_dat", 0u32)?;

        let expected = config.expected();
        let report = Shared::new(RunReport::new(
            &expected,
            sim.precision(),
            &config.time_unit,
        ));
        let sent = Shared::new(Vec::new());

        let tracer = Tracer::new(sink);
        let teardown = Teardown {
            sim: &sim,
            tracer: &tracer,
        };

        let clk_view = clk.reader();
        let clock = Clock::new(&config.clock, &config.time_unit, &sim)?;
        sim.spawn("clock", clock.run(clk));

        tracer.open(&config.trace.path, &sim);
        tracer.subscribe(&clk_view, config.trace.edge.into());

        let dut_ports = DutPorts {
            rst_n: rst_n.reader(),
            pull_rdy: pull_rdy.reader(),
            pull_dat: pull_dat.reader(),
            push_rdy: push_rdy.reader(),
            pull_pop,
            push_push,
            push_dat,
        };
        let checker_ports = CheckerPorts {
            clk: clk_view.clone(),
            rst_n: rst_n.reader(),
            push_rdy,
            push_push: dut_ports.push_push.reader(),
            push_dat: dut_ports.push_dat.reader(),
        };
        let driver_ports = DriverPorts {
            clk: clk_view.clone(),
            rst_n,
            pull_rdy,
            pull_dat,
            pull_pop: dut_ports.pull_pop.reader(),
        };
        sim.spawn("dut", run_dut(dut, clk_view, dut_ports));

        let driver = Driver::new(config.items.clone(), config.reset_cycles, sent.clone());
        sim.spawn("driver", driver.run(driver_ports));
        let checker = Checker::new(expected, config.timeout_cycles, report.clone());
        sim.spawn("checker", checker.run(checker_ports));

        info!(
            "running {} items for {} {}",
            config.items.len(),
            config.duration,
            config.time_unit
        );
        let result = sim.run_for(config.duration_steps()?);
        drop(teardown);
        let stats = result?;

        let mut out = report.get().clone();
        out.final_time = stats.final_time;
        out.total_deltas = stats.total_deltas;
        out.sent = sent.get().clone();
        out.trace = tracer.status();
        out.wall_secs = started.elapsed().as_secs_f64();
        info!("[{}] {}", sim.time_display(), out.result_str());
        Ok(out)
    }
}

/// Stops every process and releases the trace sink when a run ends, also when
/// the run unwinds out of a panicking process. Processes hold `Sim` clones, so
/// without the shutdown the kernel and the tracer state would never be freed.
struct Teardown<'a> {
    sim: &'a Sim,
    tracer: &'a Tracer,
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        self.sim.shutdown();
        self.tracer.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dut::PassThrough;
    use crate::error::TbError;
    use crate::report::ItemVerdict;
    use crate::tracer::TraceStatus;

    fn quiet_config() -> RunConfig {
        let mut config = RunConfig::default();
        config.trace.enabled = false;
        config
    }

    #[test]
    fn reference_run_passes() {
        let report = Harness::new(quiet_config(), PassThrough::new(2, 4).unwrap())
            .unwrap()
            .run()
            .unwrap();
        assert!(report.passed(), "{}", report.result_str());
        assert!(report.complete());
        // 1 ns = 1000 steps at ps precision
        assert_eq!(
            report.verdicts(),
            vec![
                ItemVerdict::Matched(73_000),
                ItemVerdict::Matched(93_000),
                ItemVerdict::Matched(103_000),
            ]
        );
        assert_eq!(report.sent.len(), 3);
        assert_eq!(report.final_time, 300_000);
        assert_eq!(report.trace, TraceStatus::Disabled);
    }

    #[test]
    fn invalid_config_fails_before_running() {
        let mut config = quiet_config();
        config.clock.duty_cycle = 0.0;
        assert!(matches!(
            Harness::new(config, PassThrough::new(0, 1).unwrap()),
            Err(TbError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn unknown_precision_is_rejected() {
        let mut config = quiet_config();
        config.precision = "fortnight".to_string();
        assert!(matches!(
            Harness::new(config, PassThrough::new(0, 1).unwrap()),
            Err(TbError::UnknownTimeUnit(_))
        ));
    }
}
