//! GMP Adapter: typed, blocking operations over a TLS session scoped to
//! one scan's execution, built directly over a raw TLS socket since there
//! is no GMP crate in the Rust ecosystem.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use native_tls::{TlsConnector, TlsStream};

use crate::error::HubError;
use crate::models::GvmConfig;

use super::wire::{check_ok, find_text, root_attr, Request};

/// Per-probe factory for `GmpSession`s. Cheap to clone; holds only config.
#[derive(Clone)]
pub struct GmpClient {
    config: GvmConfig,
}

impl GmpClient {
    pub fn new(config: GvmConfig) -> Self {
        Self { config }
    }

    /// Connect with bounded retry: only the connect+authenticate handshake
    /// is retried, never in-session operations.
    pub fn connect(&self) -> Result<GmpSession, HubError> {
        let attempts = self.config.retry_attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            match self.try_connect() {
                Ok(session) => return Ok(session),
                Err(e) => {
                    tracing::warn!(attempt, probe_host = %self.config.host, error = %e, "gvm_connect_failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        std::thread::sleep(Duration::from_secs(self.config.retry_delay_secs));
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| HubError::GvmConnection("connect failed".to_string())))
    }

    fn try_connect(&self) -> Result<GmpSession, HubError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let timeout = Duration::from_secs(self.config.timeout_secs);

        let tcp = TcpStream::connect(&addr).map_err(|e| HubError::GvmConnection(e.to_string()))?;
        tcp.set_read_timeout(Some(timeout))
            .map_err(|e| HubError::GvmConnection(e.to_string()))?;
        tcp.set_write_timeout(Some(timeout))
            .map_err(|e| HubError::GvmConnection(e.to_string()))?;

        // GVM deployments typically terminate TLS with a self-signed cert
        // generated at install time (gvm-manage-certs); there's no shared CA
        // to validate against.
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| HubError::GvmConnection(e.to_string()))?;

        let tls = connector
            .connect(&self.config.host, tcp)
            .map_err(|e| HubError::GvmConnection(e.to_string()))?;

        let mut session = GmpSession { stream: tls };
        session.authenticate(&self.config.username, &self.config.password)?;
        Ok(session)
    }
}

/// One scan's blocking GMP session. Every method sends a request XML
/// document and validates the response's status code before extracting
/// data.
pub struct GmpSession {
    stream: TlsStream<TcpStream>,
}

impl GmpSession {
    fn send(&mut self, request_xml: &str) -> Result<String, HubError> {
        self.stream
            .write_all(request_xml.as_bytes())
            .map_err(|e| HubError::GvmConnection(e.to_string()))?;
        self.stream
            .flush()
            .map_err(|e| HubError::GvmConnection(e.to_string()))?;
        read_response(&mut self.stream)
    }

    fn authenticate(&mut self, username: &str, password: &str) -> Result<(), HubError> {
        let mut req = Request::new();
        req.start("authenticate", &[])
            .start("credentials", &[])
            .text_element("username", username)
            .text_element("password", password)
            .end("credentials")
            .end("authenticate");
        let response = self.send(&req.finish())?;
        check_ok(&response)
    }

    pub fn get_scanners(&mut self) -> Result<Vec<(String, String)>, HubError> {
        let xml = self.send(&Request::empty_tag("get_scanners", &[]))?;
        check_ok(&xml)?;
        Ok(list_id_name(&xml, b"scanner"))
    }

    pub fn get_scan_configs(&mut self) -> Result<Vec<(String, String)>, HubError> {
        let xml = self.send(&Request::empty_tag("get_configs", &[]))?;
        check_ok(&xml)?;
        Ok(list_id_name(&xml, b"config"))
    }

    pub fn get_port_lists(&mut self) -> Result<Vec<(String, String)>, HubError> {
        let xml = self.send(&Request::empty_tag("get_port_lists", &[]))?;
        check_ok(&xml)?;
        Ok(list_id_name(&xml, b"port_list"))
    }

    pub fn create_port_list(&mut self, name: &str, tcp_port_list: &[u16]) -> Result<String, HubError> {
        let port_range = tcp_port_list
            .iter()
            .map(|p| format!("T:{p}"))
            .collect::<Vec<_>>()
            .join(",");

        let mut req = Request::new();
        req.start("create_port_list", &[])
            .text_element("name", name)
            .text_element("port_range", &port_range)
            .end("create_port_list");
        let response = self.send(&req.finish())?;
        check_ok(&response)?;
        root_attr(&response, b"id").ok_or_else(|| {
            HubError::GvmOperation("create_port_list response missing id".to_string())
        })
    }

    pub fn delete_port_list(&mut self, id: &str) -> Result<(), HubError> {
        let xml = self.send(&Request::empty_tag(
            "delete_port_list",
            &[("port_list_id", id)],
        ))?;
        check_ok(&xml)
    }

    pub fn create_target(
        &mut self,
        name: &str,
        hosts: &str,
        port_list_id: Option<&str>,
        default_port_list_name: Option<&str>,
        alive_test: Option<&str>,
    ) -> Result<String, HubError> {
        let mut req = Request::new();
        req.start("create_target", &[])
            .text_element("name", name)
            .text_element("hosts", hosts);

        if let Some(id) = port_list_id {
            req.empty_child("port_list", &[("id", id)]);
        } else if let Some(name) = default_port_list_name {
            req.text_element("port_list", name);
        }
        if let Some(at) = alive_test {
            req.text_element("alive_tests", at);
        }
        req.end("create_target");

        let response = self.send(&req.finish())?;
        check_ok(&response)?;
        root_attr(&response, b"id")
            .ok_or_else(|| HubError::GvmOperation("create_target response missing id".to_string()))
    }

    pub fn delete_target(&mut self, id: &str) -> Result<(), HubError> {
        let xml = self.send(&Request::empty_tag("delete_target", &[("target_id", id)]))?;
        check_ok(&xml)
    }

    pub fn create_task(
        &mut self,
        name: &str,
        target_id: &str,
        config_id: Option<&str>,
        scanner_id: Option<&str>,
        config_name: Option<&str>,
        scanner_name: Option<&str>,
    ) -> Result<String, HubError> {
        let config_id = match config_id {
            Some(id) => id.to_string(),
            None => self.find_id_by_name(
                &self.get_scan_configs()?,
                config_name.unwrap_or("Full and fast"),
                "scan config",
            )?,
        };
        let scanner_id = match scanner_id {
            Some(id) => id.to_string(),
            None => self.find_id_by_name(
                &self.get_scanners()?,
                scanner_name.unwrap_or("OpenVAS Default"),
                "scanner",
            )?,
        };

        let mut req = Request::new();
        req.start("create_task", &[])
            .text_element("name", name)
            .empty_child("target", &[("id", target_id)])
            .empty_child("config", &[("id", &config_id)])
            .empty_child("scanner", &[("id", &scanner_id)])
            .end("create_task");

        let response = self.send(&req.finish())?;
        check_ok(&response)?;
        root_attr(&response, b"id")
            .ok_or_else(|| HubError::GvmOperation("create_task response missing id".to_string()))
    }

    fn find_id_by_name(
        &self,
        entries: &[(String, String)],
        name: &str,
        kind: &str,
    ) -> Result<String, HubError> {
        entries
            .iter()
            .find(|(_, n)| n == name)
            .map(|(id, _)| id.clone())
            .ok_or_else(|| HubError::GvmOperation(format!("{kind} '{name}' not found")))
    }

    pub fn start_task(&mut self, task_id: &str) -> Result<String, HubError> {
        let xml = self.send(&Request::empty_tag("start_task", &[("task_id", task_id)]))?;
        check_ok(&xml)?;
        find_text(&xml, b"report_id")
            .ok_or_else(|| HubError::GvmOperation("start_task response missing report_id".to_string()))
    }

    pub fn stop_task(&mut self, task_id: &str) -> Result<(), HubError> {
        let xml = self.send(&Request::empty_tag("stop_task", &[("task_id", task_id)]))?;
        check_ok(&xml)
    }

    pub fn delete_task(&mut self, task_id: &str) -> Result<(), HubError> {
        let xml = self.send(&Request::empty_tag(
            "delete_task",
            &[("task_id", task_id), ("ultimate", "1")],
        ))?;
        check_ok(&xml)
    }

    /// Status text and progress (clamped to ≥ 0) for a task, read from
    /// `.//status` / `.//progress`.
    pub fn get_task_status(&mut self, task_id: &str) -> Result<(String, i32), HubError> {
        let xml = self.send(&Request::empty_tag("get_tasks", &[("task_id", task_id)]))?;
        check_ok(&xml)?;

        let status = find_text(&xml, b"status")
            .ok_or_else(|| HubError::GvmOperation("get_tasks response missing status".to_string()))?;
        let progress = find_text(&xml, b"progress")
            .and_then(|p| p.parse::<i32>().ok())
            .unwrap_or(0)
            .max(0);

        Ok((status, progress))
    }

    pub fn get_report_xml(&mut self, report_id: &str) -> Result<String, HubError> {
        let xml = self.send(&Request::empty_tag(
            "get_reports",
            &[("report_id", report_id), ("details", "1")],
        ))?;
        check_ok(&xml)?;
        Ok(super::wire::extract_element(&xml, b"report").unwrap_or_default())
    }
}

fn list_id_name(xml: &str, element: &[u8]) -> Vec<(String, String)> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut out = Vec::new();
    let mut current_id: Option<String> = None;
    let mut depth_of_current: i32 = -1;
    let mut depth: i32 = 0;
    let mut capture_name = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == element {
                    current_id = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"id")
                        .map(|a| String::from_utf8_lossy(&a.value).into_owned());
                    depth_of_current = depth;
                } else if e.name().as_ref() == b"name" && depth_of_current == depth - 1 {
                    capture_name = true;
                }
                depth += 1;
            }
            Ok(Event::Text(ref t)) => {
                if capture_name {
                    if let (Some(id), Ok(text)) = (current_id.take(), t.unescape()) {
                        out.push((id, text.into_owned()));
                    }
                    capture_name = false;
                }
            }
            Ok(Event::End(ref e)) => {
                depth -= 1;
                if e.name().as_ref() == element {
                    depth_of_current = -1;
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    out
}

/// Read a blocking GMP response: there's no framing, so read until the root
/// element's closing tag has been seen.
fn read_response(stream: &mut TlsStream<TcpStream>) -> Result<String, HubError> {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut root_tag: Option<String> = None;

    loop {
        let n = stream
            .read(&mut chunk)
            .map_err(|e| HubError::GvmConnection(e.to_string()))?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..n]);

        if root_tag.is_none() {
            root_tag = detect_root_tag(&raw);
        }
        if let Some(tag) = &root_tag {
            if is_complete(&raw, tag) {
                break;
            }
        }
    }

    String::from_utf8(raw).map_err(|e| HubError::GvmOperation(format!("non-utf8 GMP response: {e}")))
}

fn detect_root_tag(buf: &[u8]) -> Option<String> {
    let s = std::str::from_utf8(buf).ok()?;
    let start = s.find('<')? + 1;
    let rest = &s[start..];
    let end = rest.find(|c: char| c.is_whitespace() || c == '>' || c == '/')?;
    Some(rest[..end].to_string())
}

fn is_complete(buf: &[u8], root_tag: &str) -> bool {
    let s = String::from_utf8_lossy(buf);
    s.trim_end().ends_with(&format!("</{root_tag}>")) || s.trim_end().ends_with("/>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_id_name_parses_entries() {
        let xml = r#"
            <get_scanners_response status="200">
                <scanner id="s1"><name>OpenVAS Default</name></scanner>
                <scanner id="s2"><name>CVE</name></scanner>
            </get_scanners_response>
        "#;
        let entries = list_id_name(xml, b"scanner");
        assert_eq!(
            entries,
            vec![
                ("s1".to_string(), "OpenVAS Default".to_string()),
                ("s2".to_string(), "CVE".to_string()),
            ]
        );
    }

    #[test]
    fn detect_root_tag_finds_first_element_name() {
        assert_eq!(
            detect_root_tag(b"<get_tasks_response status=\"200\">"),
            Some("get_tasks_response".to_string())
        );
    }

    #[test]
    fn is_complete_detects_closing_tag() {
        assert!(is_complete(b"<foo>bar</foo>", "foo"));
        assert!(!is_complete(b"<foo>bar", "foo"));
        assert!(is_complete(b"<foo/>", "foo"));
    }
}
