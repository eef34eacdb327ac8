use super::types::RunRecord;
use crate::results::{sorted_step_results, StepResult};
use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

/// Generate JUnit XML for a run: one testcase per step result
pub fn generate_junit_xml(record: &RunRecord) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let steps = sorted_step_results(&record.run.step_results);
    let total_tests = steps.len().to_string();
    let failures = steps.iter().filter(|s| !s.is_passed()).count().to_string();
    let time = (steps.iter().filter_map(|s| s.response_time).sum::<f64>() / 1000.0).to_string();
    let suite_name = record.suite_id.as_deref().unwrap_or(&record.run.id);

    // <testsuites>
    let mut suites_start = BytesStart::new("testsuites");
    suites_start.push_attribute(("name", "nexus-tester-run"));
    suites_start.push_attribute(("tests", total_tests.as_str()));
    suites_start.push_attribute(("failures", failures.as_str()));
    suites_start.push_attribute(("time", time.as_str()));
    writer.write_event(Event::Start(suites_start))?;

    let timestamp = record.run.start_time.to_rfc3339();
    let mut suite_start = BytesStart::new("testsuite");
    suite_start.push_attribute(("name", suite_name));
    suite_start.push_attribute(("id", record.run.id.as_str()));
    suite_start.push_attribute(("tests", total_tests.as_str()));
    suite_start.push_attribute(("failures", failures.as_str()));
    suite_start.push_attribute(("time", time.as_str()));
    suite_start.push_attribute(("timestamp", timestamp.as_str()));
    writer.write_event(Event::Start(suite_start))?;

    for step in &steps {
        write_test_case(&mut writer, record, step)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let xml = String::from_utf8(writer.into_inner().into_inner())?;
    Ok(xml)
}

fn write_test_case<W: std::io::Write>(
    writer: &mut Writer<W>,
    record: &RunRecord,
    step: &StepResult,
) -> Result<()> {
    let case = step
        .case_id
        .as_deref()
        .and_then(|id| record.test_cases.iter().find(|c| c.id == id));
    let name = match case {
        Some(case) => format!("{} #{}", case.name, step.sequence),
        None => format!("step #{}", step.sequence),
    };
    let classname = step.case_id.as_deref().unwrap_or(&record.run.id);
    let time = (step.response_time.unwrap_or(0.0) / 1000.0).to_string();

    let mut case_start = BytesStart::new("testcase");
    case_start.push_attribute(("name", name.as_str()));
    case_start.push_attribute(("classname", classname));
    case_start.push_attribute(("time", time.as_str()));
    writer.write_event(Event::Start(case_start))?;

    if !step.is_passed() {
        let message = match (&step.error_message, step.status_code) {
            (Some(err), _) => err.clone(),
            (None, Some(code)) => format!("Unexpected status {}", code),
            (None, None) => "No response".to_string(),
        };
        let mut fail_start = BytesStart::new("failure");
        fail_start.push_attribute(("message", message.as_str()));
        fail_start.push_attribute(("type", "AssertionError"));
        writer.write_event(Event::Start(fail_start))?;
        writer.write_event(Event::Text(BytesText::new(&message)))?;
        writer.write_event(Event::End(BytesEnd::new("failure")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

/// Write `junit.xml` into `output_dir`
pub fn write_report(record: &RunRecord, output_dir: &Path) -> Result<()> {
    let xml = generate_junit_xml(record)?;
    let path = output_dir.join("junit.xml");
    std::fs::write(&path, xml)?;
    println!("    Generated JUnit report: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{ChainRun, GeneratedTestCase, RunStatus};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_generate_junit_xml() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let mut run = ChainRun::started("run-7", start);
        run.step_results = vec![
            StepResult {
                status_code: Some(500),
                passed: false,
                response_time: Some(1500.0),
                case_id: Some("c1".into()),
                ..StepResult::new(2)
            },
            StepResult {
                status_code: Some(201),
                passed: true,
                response_time: Some(500.0),
                case_id: Some("c1".into()),
                ..StepResult::new(1)
            },
            StepResult {
                error_message: Some("connection reset".into()),
                ..StepResult::new(3)
            },
        ];
        run.finish(RunStatus::Failed, start);

        let record = RunRecord {
            suite_id: Some("orders-smoke".into()),
            run,
            test_cases: vec![GeneratedTestCase {
                id: "c1".into(),
                name: "create order".into(),
                description: None,
                chain_id: None,
            }],
        };

        let xml = generate_junit_xml(&record).expect("Failed to generate XML");

        assert!(xml.contains(r#"<testsuites name="nexus-tester-run""#));
        assert!(xml.contains(r#"tests="3""#));
        assert!(xml.contains(r#"failures="2""#));
        assert!(xml.contains(r#"<testsuite name="orders-smoke""#));
        assert!(xml.contains(r#"<testcase name="create order #1""#));
        assert!(xml.contains(r#"message="Unexpected status 500""#));
        assert!(xml.contains(r#"<testcase name="step #3""#));
        assert!(xml.contains(r#"message="connection reset""#));
        // Sorted by sequence
        let first = xml.find("#1").unwrap();
        let second = xml.find("#2").unwrap();
        assert!(first < second);
    }
}
