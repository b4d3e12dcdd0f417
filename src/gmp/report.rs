//! Severity histogram over a GMP report.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::models::ScanSummary;

/// Count `.//host` elements as hosts scanned; classify every `.//result`'s
/// `.//severity` into high/medium/low/log buckets. Malformed XML yields a
/// zeroed summary rather than an error — a report that doesn't parse still
/// means the scan reached `Done`.
pub fn parse_summary(report_xml: &str) -> ScanSummary {
    let mut summary = ScanSummary::default();

    let mut reader = Reader::from_str(report_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut in_result = false;
    let mut result_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.name().as_ref().to_vec();
                if name == b"host" {
                    summary.hosts_scanned += 1;
                } else if name == b"result" && !in_result {
                    in_result = true;
                    result_depth = stack.len();
                }
                stack.push(name);
            }
            Ok(Event::Empty(ref e)) => {
                if e.name().as_ref() == b"host" {
                    summary.hosts_scanned += 1;
                }
            }
            Ok(Event::Text(ref t)) => {
                if in_result && stack.last().map(|v| v.as_slice()) == Some(b"severity".as_slice()) {
                    if let Ok(text) = t.unescape() {
                        if let Ok(severity) = text.trim().parse::<f64>() {
                            classify(&mut summary, severity);
                        }
                    }
                }
            }
            Ok(Event::End(_)) => {
                if let Some(name) = stack.pop() {
                    if in_result && name == b"result" && stack.len() == result_depth {
                        in_result = false;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    summary
}

fn classify(summary: &mut ScanSummary, severity: f64) {
    if severity >= 7.0 {
        summary.vulns_high += 1;
    } else if severity >= 4.0 {
        summary.vulns_medium += 1;
    } else if severity > 0.0 {
        summary.vulns_low += 1;
    } else {
        summary.vulns_log += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_yields_zeroed_summary() {
        let summary = parse_summary("<report></report>");
        assert_eq!(summary.hosts_scanned, 0);
        assert_eq!(summary.vulns_high, 0);
    }

    #[test]
    fn classifies_results_by_severity_threshold() {
        let xml = r#"
            <report>
                <host>10.0.0.1</host>
                <results>
                    <result><severity>9.0</severity></result>
                    <result><severity>5.5</severity></result>
                    <result><severity>2.0</severity></result>
                    <result><severity>0.0</severity></result>
                </results>
            </report>
        "#;
        let summary = parse_summary(xml);
        assert_eq!(summary.hosts_scanned, 1);
        assert_eq!(summary.vulns_high, 1);
        assert_eq!(summary.vulns_medium, 1);
        assert_eq!(summary.vulns_low, 1);
        assert_eq!(summary.vulns_log, 1);
    }

    #[test]
    fn malformed_xml_yields_zeroed_summary_not_error() {
        let summary = parse_summary("<report><unclosed>");
        assert_eq!(summary, ScanSummary::default());
    }
}
