use crate::signal::SignalRef;

pub async fn clock_cycles(clk: &SignalRef<bool>, n_cycles: u32) {
    for _ in 0..n_cycles {
        clk.rising_edge().await;
    }
}

/// Waits for rising edges of `clk` until `predicate` holds. The predicate is
/// only evaluated at edges, never between them.
pub async fn wait_until(clk: &SignalRef<bool>, mut predicate: impl FnMut() -> bool) -> u64 {
    let mut cycles = 0;
    loop {
        clk.rising_edge().await;
        cycles += 1;
        if predicate() {
            return cycles;
        }
    }
}
