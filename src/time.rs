use crate::error::{TbError, TbResult};

/// Absolute simulation time in kernel steps.
pub type SimTime = u64;

pub(crate) fn time_scale(unit: &str) -> TbResult<i8> {
    match unit {
        "fs" => Ok(-15),
        "ps" => Ok(-12),
        "ns" => Ok(-9),
        "us" => Ok(-6),
        "ms" => Ok(-3),
        "sec" | "s" => Ok(0),
        _ => Err(TbError::UnknownTimeUnit(unit.to_string())),
    }
}

pub(crate) fn scale_time(exp: i8) -> Option<&'static str> {
    match exp {
        -15 => Some("fs"),
        -12 => Some("ps"),
        -9 => Some("ns"),
        -6 => Some("us"),
        -3 => Some("ms"),
        0 => Some("s"),
        _ => None,
    }
}

/// Converts `value unit` to kernel steps of `10^precision` seconds.
///
/// The conversion must be exact: 1500 fs at ps precision is rejected rather than
/// rounded, since a rounded clock period no longer sums its phases correctly.
pub fn to_steps(value: u64, unit: &str, precision: i8) -> TbResult<SimTime> {
    let not_representable = || TbError::TimeNotRepresentable {
        value,
        unit: unit.to_string(),
        precision,
    };
    let exp = time_scale(unit)?
        .checked_sub(precision)
        .ok_or_else(not_representable)?;
    let pow = 10_u64.checked_pow(u32::from(exp.unsigned_abs()));
    if exp >= 0 {
        pow.and_then(|mul| value.checked_mul(mul))
            .ok_or_else(not_representable)
    } else {
        match pow {
            Some(div) if value % div == 0 => Ok(value / div),
            // divisor exceeds u64, only zero divides exactly
            None if value == 0 => Ok(0),
            _ => Err(not_representable()),
        }
    }
}

/// Converts kernel steps to a floating point time in `unit`. Lossy, only use for display.
pub fn from_steps(steps: SimTime, unit: &str, precision: i8) -> TbResult<f64> {
    let exp = precision
        .checked_sub(time_scale(unit)?)
        .ok_or_else(|| TbError::TimeNotRepresentable {
            value: steps,
            unit: unit.to_string(),
            precision,
        })?;
    Ok(ldexp10(steps as f64, exp))
}

fn ldexp10(frac: f64, exp: i8) -> f64 {
    // like math.ldexp, but base 10
    if exp >= 0 {
        frac * 10f64.powi(i32::from(exp))
    } else {
        frac / 10f64.powi(-i32::from(exp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ns_to_ps_steps() {
        assert_eq!(to_steps(10, "ns", -12).unwrap(), 10_000);
        assert_eq!(to_steps(3, "ns", -9).unwrap(), 3);
    }

    #[test]
    fn coarser_precision_requires_exact_division() {
        assert_eq!(to_steps(2000, "ps", -9).unwrap(), 2);
        assert!(matches!(
            to_steps(1500, "ps", -9),
            Err(TbError::TimeNotRepresentable { .. })
        ));
    }

    #[test]
    fn unknown_unit() {
        assert!(matches!(to_steps(1, "min", -12), Err(TbError::UnknownTimeUnit(_))));
    }

    #[test]
    fn extreme_precision_is_not_representable() {
        for (unit, precision) in [("s", i8::MIN), ("ns", i8::MIN), ("s", i8::MAX), ("fs", i8::MAX)] {
            assert!(matches!(
                to_steps(1, unit, precision),
                Err(TbError::TimeNotRepresentable { .. })
            ));
        }
        assert!(matches!(
            from_steps(1, "fs", i8::MAX),
            Err(TbError::TimeNotRepresentable { .. })
        ));
        assert_eq!(to_steps(0, "s", 100).unwrap(), 0);
    }

    #[test]
    fn steps_back_to_ns() {
        assert_eq!(from_steps(300_000, "ns", -12).unwrap(), 300.0);
        assert_eq!(scale_time(-12), Some("ps"));
    }
}
