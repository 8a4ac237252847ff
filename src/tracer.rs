//! Waveform capture.
//!
//! The tracer is a passive process: it waits for a subscribed edge, moves to the
//! read-only phase of that time step and hands a snapshot of every signal to a
//! [`TraceSink`]. It never writes a signal, so a run with tracing enabled is
//! cycle for cycle identical to one without.
//!
//! A sink that fails is switched off after one warning. The sink is closed
//! exactly once, either explicitly or when the last handle to the tracer state
//! is dropped.

use log::{debug, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{TbError, TbResult};
use crate::executor::JoinHandle;
use crate::kernel::{SignalInfo, Sim};
use crate::shared::Shared;
use crate::signal::SignalRef;
use crate::time::{self, SimTime};
use crate::trigger::{EdgeKind, Trigger};

/// Recording backend for the tracer.
pub trait TraceSink: Send {
    /// Prepares the sink for `signals`. `precision` is the kernel step as a power
    /// of ten seconds.
    fn open(&mut self, path: &Path, signals: &[SignalInfo], precision: i8) -> TbResult;
    /// `values` is indexed by signal id, in the order given to `open`.
    fn record_sample(&mut self, time: SimTime, values: &[u64]) -> TbResult;
    fn close(&mut self) -> TbResult;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceStatus {
    Disabled,
    Recorded { samples: u64 },
    Failed { reason: String, samples: u64 },
}

impl TraceStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, TraceStatus::Failed { .. })
    }
}

struct TraceState {
    sink: Option<Box<dyn TraceSink>>,
    samples: u64,
    last_time: Option<SimTime>,
    closed: bool,
    status: TraceStatus,
}

impl TraceState {
    fn fail(&mut self, err: TbError) {
        let err = match err {
            TbError::SinkUnavailable(_) => err,
            other => TbError::SinkUnavailable(other.to_string()),
        };
        warn!("{}, tracing disabled", err);
        if let Some(mut sink) = self.sink.take() {
            // best effort, the sink is already broken
            let _ = sink.close();
        }
        self.status = TraceStatus::Failed {
            reason: err.to_string(),
            samples: self.samples,
        };
    }

    fn sample(&mut self, time: SimTime, values: &[u64]) {
        if self.closed || self.last_time == Some(time) {
            return;
        }
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        match sink.record_sample(time, values) {
            Ok(()) => {
                self.samples += 1;
                self.last_time = Some(time);
                self.status = TraceStatus::Recorded {
                    samples: self.samples,
                };
            }
            Err(e) => self.fail(e),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(mut sink) = self.sink.take() {
            match sink.close() {
                Ok(()) => debug!("trace closed after {} samples", self.samples),
                Err(e) => self.fail(e),
            }
        }
    }
}

impl Drop for TraceState {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct Tracer {
    state: Shared<TraceState>,
}

impl Tracer {
    /// A tracer without sink records nothing.
    pub fn new(sink: Option<Box<dyn TraceSink>>) -> Self {
        let status = match sink {
            Some(_) => TraceStatus::Recorded { samples: 0 },
            None => TraceStatus::Disabled,
        };
        Self {
            state: Shared::new(TraceState {
                sink,
                samples: 0,
                last_time: None,
                closed: false,
                status,
            }),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Opens the sink for every signal declared on `sim` so far. A failure
    /// disables tracing, it is not an error of the run.
    pub fn open(&self, path: &Path, sim: &Sim) {
        let signals = sim.signals();
        self.state.with_mut(|s| {
            let Some(sink) = s.sink.as_mut() else {
                return;
            };
            match sink.open(path, &signals, sim.precision()) {
                Ok(()) => debug!("tracing {} signals to {}", signals.len(), path.display()),
                Err(e) => s.fail(e),
            }
        });
    }

    /// Spawns the sampling process. It samples once at time zero, then after
    /// every `edge` of `signal`, always in the read-only phase.
    pub fn subscribe(&self, signal: &SignalRef<bool>, edge: EdgeKind) -> JoinHandle {
        let state = self.state.clone();
        let signal = signal.clone();
        let sim = signal.sim().clone();
        sim.clone().spawn("tracer", async move {
            Trigger::read_only(&sim).await;
            record(&state, &sim);
            while active(&state) {
                match edge {
                    EdgeKind::Any => signal.edge().await,
                    EdgeKind::Rising => signal.rising_edge().await,
                    EdgeKind::Falling => signal.falling_edge().await,
                }
                Trigger::read_only(&sim).await;
                record(&state, &sim);
            }
            Ok(())
        })
    }

    /// Records the current state of `sim`.
    pub fn on_edge(&self, sim: &Sim) {
        record(&self.state, sim);
    }

    /// Flushes and releases the sink. Calling it again does nothing.
    pub fn close(&self) {
        self.state.with_mut(TraceState::close);
    }

    pub fn status(&self) -> TraceStatus {
        self.state.get().status.clone()
    }

    pub fn samples(&self) -> u64 {
        self.state.get().samples
    }
}

fn active(state: &Shared<TraceState>) -> bool {
    state.get().sink.is_some()
}

fn record(state: &Shared<TraceState>, sim: &Sim) {
    let snapshot = sim.snapshot();
    state.with_mut(|s| s.sample(snapshot.time, &snapshot.values));
}

/// Value change dump writer.
pub struct VcdSink {
    writer: Option<Box<dyn Write + Send>>,
    ids: Vec<String>,
    widths: Vec<u32>,
    last: Vec<Option<u64>>,
}

impl VcdSink {
    /// Writes to the file given to [`TraceSink::open`].
    pub fn new() -> Self {
        Self {
            writer: None,
            ids: Vec::new(),
            widths: Vec::new(),
            last: Vec::new(),
        }
    }

    /// Writes to `writer`, the path given to `open` is ignored.
    pub fn to_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Some(Box::new(writer)),
            ..Self::new()
        }
    }

    fn out(&mut self) -> TbResult<&mut Box<dyn Write + Send>> {
        self.writer
            .as_mut()
            .ok_or_else(|| TbError::SinkUnavailable("vcd sink is not open".to_string()))
    }

    fn write_header(&mut self, signals: &[SignalInfo], unit: &str) -> std::io::Result<()> {
        let ids = self.ids.clone();
        let Some(w) = self.writer.as_mut() else {
            return Ok(());
        };
        writeln!(w, "$version {} {} $end", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))?;
        writeln!(w, "$timescale 1{} $end", unit)?;
        writeln!(w, "$scope module top $end")?;
        for (info, id) in signals.iter().zip(&ids) {
            writeln!(w, "$var wire {} {} {} $end", info.width, id, info.name)?;
        }
        writeln!(w, "$upscope $end")?;
        writeln!(w, "$enddefinitions $end")
    }
}

impl Default for VcdSink {
    fn default() -> Self {
        Self::new()
    }
}

fn sink_err(e: std::io::Error) -> TbError {
    TbError::SinkUnavailable(e.to_string())
}

/// Short identifier codes from the printable range `!`..=`~`.
fn vcd_id(mut n: usize) -> String {
    let mut id = String::new();
    loop {
        id.push((b'!' + (n % 94) as u8) as char);
        n /= 94;
        if n == 0 {
            return id;
        }
        n -= 1;
    }
}

fn format_value(width: u32, value: u64, id: &str) -> String {
    match width {
        1 => format!("{}{}", value & 1, id),
        _ => format!("b{:b} {}", value, id),
    }
}

impl TraceSink for VcdSink {
    fn open(&mut self, path: &Path, signals: &[SignalInfo], precision: i8) -> TbResult {
        let unit = time::scale_time(precision).ok_or_else(|| {
            TbError::SinkUnavailable(format!("no vcd timescale for precision 1e{}", precision))
        })?;
        if self.writer.is_none() {
            let file = File::create(path)
                .map_err(|e| TbError::SinkUnavailable(format!("{}: {}", path.display(), e)))?;
            self.writer = Some(Box::new(BufWriter::new(file)));
        }
        self.ids = (0..signals.len()).map(vcd_id).collect();
        self.widths = signals.iter().map(|s| s.width).collect();
        self.last = vec![None; signals.len()];
        self.write_header(signals, unit).map_err(sink_err)
    }

    fn record_sample(&mut self, time: SimTime, values: &[u64]) -> TbResult {
        let first = self.last.iter().all(Option::is_none);
        let mut changes = Vec::new();
        for (i, value) in values.iter().enumerate().take(self.ids.len()) {
            if self.last[i] != Some(*value) {
                changes.push(format_value(self.widths[i], *value, &self.ids[i]));
                self.last[i] = Some(*value);
            }
        }
        if changes.is_empty() {
            return Ok(());
        }
        let w = self.out()?;
        writeln!(w, "#{}", time).map_err(sink_err)?;
        if first {
            writeln!(w, "$dumpvars").map_err(sink_err)?;
        }
        for change in changes {
            writeln!(w, "{}", change).map_err(sink_err)?;
        }
        if first {
            writeln!(w, "$end").map_err(sink_err)?;
        }
        Ok(())
    }

    fn close(&mut self) -> TbResult {
        match self.writer.take() {
            Some(mut w) => w.flush().map_err(sink_err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buf(Arc<Mutex<Vec<u8>>>);

    impl Write for Buf {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    /// Fails every write after the first `budget` calls.
    struct Flaky {
        budget: usize,
        closes: Arc<Mutex<u32>>,
    }

    impl TraceSink for Flaky {
        fn open(&mut self, _: &Path, _: &[SignalInfo], _: i8) -> TbResult {
            Ok(())
        }
        fn record_sample(&mut self, _: SimTime, _: &[u64]) -> TbResult {
            match self.budget {
                0 => Err(TbError::SinkUnavailable("disk full".to_string())),
                _ => {
                    self.budget -= 1;
                    Ok(())
                }
            }
        }
        fn close(&mut self) -> TbResult {
            *self.closes.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[test]
    fn ids_are_printable_and_unique() {
        assert_eq!(vcd_id(0), "!");
        assert_eq!(vcd_id(93), "~");
        assert_eq!(vcd_id(94), "!!");
        let ids: std::collections::HashSet<_> = (0..10_000).map(vcd_id).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn vcd_dumps_changes_only() {
        let buf = Buf::default();
        let mut sink = VcdSink::to_writer(buf.clone());
        let signals = vec![
            SignalInfo { id: 0, name: "clk".to_string(), width: 1 },
            SignalInfo { id: 1, name: "dat".to_string(), width: 32 },
        ];
        sink.open(Path::new("unused.vcd"), &signals, -12).unwrap();
        sink.record_sample(0, &[0, 5]).unwrap();
        sink.record_sample(3000, &[1, 5]).unwrap();
        sink.record_sample(4000, &[1, 5]).unwrap();
        sink.close().unwrap();

        let text = buf.text();
        assert!(text.contains("$timescale 1ps $end"));
        assert!(text.contains("$var wire 32 \" dat $end"));
        assert!(text.contains("#0\n$dumpvars\n0!\nb101 \"\n$end\n"));
        assert!(text.contains("#3000\n1!\n"));
        assert!(!text.contains("#4000"));
    }

    #[test]
    fn tracer_samples_on_every_clock_edge() {
        let sim = Sim::new(-9).unwrap();
        let clk = sim.signal("clk", false).unwrap();
        let buf = Buf::default();
        let tracer = Tracer::new(Some(Box::new(VcdSink::to_writer(buf.clone()))));
        tracer.open(Path::new("unused.vcd"), &sim);
        tracer.subscribe(&clk.reader(), EdgeKind::Any);
        let s = sim.clone();
        sim.spawn("clk", async move {
            for _ in 0..2 {
                Trigger::timer_steps(&s, 5).await;
                clk.set(true);
                Trigger::timer_steps(&s, 5).await;
                clk.set(false);
            }
            Ok(())
        });
        sim.run_for(100).unwrap();
        tracer.close();
        // initial dump plus four edges
        assert_eq!(tracer.samples(), 5);
        assert_eq!(tracer.status(), TraceStatus::Recorded { samples: 5 });
        let text = buf.text();
        for t in ["#0", "#5", "#10", "#15", "#20"] {
            assert!(text.contains(&format!("{}\n", t)), "missing {}", t);
        }
    }

    #[test]
    fn failing_sink_is_closed_once_and_disabled() {
        let sim = Sim::new(-9).unwrap();
        let clk = sim.signal("clk", false).unwrap();
        let closes = Arc::new(Mutex::new(0));
        let tracer = Tracer::new(Some(Box::new(Flaky {
            budget: 2,
            closes: closes.clone(),
        })));
        tracer.open(Path::new("unused.vcd"), &sim);
        tracer.subscribe(&clk.reader(), EdgeKind::Rising);
        let s = sim.clone();
        sim.spawn("clk", async move {
            for _ in 0..5 {
                Trigger::timer_steps(&s, 5).await;
                clk.set(true);
                Trigger::timer_steps(&s, 5).await;
                clk.set(false);
            }
            Ok(())
        });
        sim.run_for(100).unwrap();
        assert!(tracer.status().is_failed());
        assert_eq!(tracer.samples(), 2);
        tracer.close();
        drop(tracer);
        assert_eq!(*closes.lock().unwrap(), 1);
    }

    #[test]
    fn drop_closes_an_unused_sink() {
        let closes = Arc::new(Mutex::new(0));
        let tracer = Tracer::new(Some(Box::new(Flaky {
            budget: 0,
            closes: closes.clone(),
        })));
        drop(tracer);
        assert_eq!(*closes.lock().unwrap(), 1);
    }

    #[test]
    fn unwritable_path_disables_tracing() {
        let sim = Sim::new(-12).unwrap();
        let tracer = Tracer::new(Some(Box::new(VcdSink::new())));
        tracer.open(Path::new("/nonexistent-dir/for/sure/dump.vcd"), &sim);
        assert!(tracer.status().is_failed());
        tracer.on_edge(&sim);
        assert_eq!(tracer.samples(), 0);
    }

    #[test]
    fn disabled_tracer_records_nothing() {
        let sim = Sim::new(-12).unwrap();
        let clk = sim.signal("clk", false).unwrap();
        let tracer = Tracer::disabled();
        tracer.open(Path::new("never-created.vcd"), &sim);
        tracer.subscribe(&clk.reader(), EdgeKind::Any);
        clk.set(true);
        sim.run_for(10).unwrap();
        tracer.on_edge(&sim);
        tracer.close();
        sim.shutdown();
        assert_eq!(tracer.status(), TraceStatus::Disabled);
        assert_eq!(tracer.samples(), 0);
        assert!(!Path::new("never-created.vcd").exists());
    }
}
