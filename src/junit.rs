use junit_report::{Duration, ReportBuilder, TestCaseBuilder, TestSuiteBuilder};
use std::fs::File;
use std::path::Path;

use crate::error::{TbError, TbResult};
use crate::report::{Fault, ItemVerdict, RunReport};

/// Writes `report` as a JUnit suite: one test case per expected item and one
/// for data pushed after the sequence was exhausted.
pub fn create_junit_xml(report: &RunReport, suite: &str, path: &Path) -> TbResult {
    let mut test_cases = Vec::new();
    let duration = Duration::seconds_f64(0.0);

    for (index, (value, verdict)) in report.expected.iter().zip(report.verdicts()).enumerate() {
        let name = format!("item_{}_{:#010x}", index, value);
        let fault = report
            .faults
            .iter()
            .find(|f| f.index() == Some(index))
            .map(|f| f.to_string())
            .unwrap_or_default();
        let tc = match verdict {
            ItemVerdict::Matched(_) => TestCaseBuilder::success(&name, duration),
            ItemVerdict::Mismatch(_) => TestCaseBuilder::failure(&name, duration, "mismatch", &fault),
            ItemVerdict::TimedOut(_) => TestCaseBuilder::failure(&name, duration, "timeout", &fault),
            ItemVerdict::Pending => TestCaseBuilder::skipped(&name),
        }
        .build();
        test_cases.push(tc);
    }

    let extras: Vec<String> = report
        .faults
        .iter()
        .filter(|f| matches!(f, Fault::UnexpectedExtraData { .. }))
        .map(|f| format!("{} at {}", f, report.format_time(f.time())))
        .collect();
    let tc = match extras.is_empty() {
        true => TestCaseBuilder::success("no_extra_data", duration),
        false => TestCaseBuilder::failure("no_extra_data", duration, "extra", &extras.join("; ")),
    }
    .build();
    test_cases.push(tc);

    let test_suite = TestSuiteBuilder::new(suite).add_testcases(test_cases).build();
    let junit = ReportBuilder::new().add_testsuite(test_suite).build();
    let file = File::create(path)?;
    junit
        .write_xml(file)
        .map_err(|e| TbError::Junit(format!("{:?}", e)))
}
