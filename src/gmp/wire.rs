//! GMP XML request/response helpers. GMP is XML-over-TLS with no framing:
//! a request is one XML document, a response is one XML document whose
//! root element carries `status`/`status_text` attributes.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

use crate::error::HubError;

/// A tiny builder over `quick_xml::Writer` for the handful of request shapes
/// the adapter needs: an element with only child elements/attributes, no
/// mixed content.
pub struct Request {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl Request {
    pub fn new() -> Self {
        Self {
            writer: Writer::new(Cursor::new(Vec::new())),
        }
    }

    pub fn empty_tag(root: &str, attrs: &[(&str, &str)]) -> String {
        let mut req = Self::new();
        let mut start = BytesStart::new(root);
        for (k, v) in attrs {
            start.push_attribute((*k, *v));
        }
        req.writer.write_event(Event::Empty(start)).ok();
        req.finish()
    }

    pub fn start(&mut self, tag: &str, attrs: &[(&str, &str)]) -> &mut Self {
        let mut start = BytesStart::new(tag);
        for (k, v) in attrs {
            start.push_attribute((*k, *v));
        }
        self.writer.write_event(Event::Start(start)).ok();
        self
    }

    pub fn text_element(&mut self, tag: &str, text: &str) -> &mut Self {
        self.writer
            .write_event(Event::Start(BytesStart::new(tag)))
            .ok();
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .ok();
        self.writer
            .write_event(Event::End(BytesEnd::new(tag)))
            .ok();
        self
    }

    pub fn empty_child(&mut self, tag: &str, attrs: &[(&str, &str)]) -> &mut Self {
        let mut start = BytesStart::new(tag);
        for (k, v) in attrs {
            start.push_attribute((*k, *v));
        }
        self.writer.write_event(Event::Empty(start)).ok();
        self
    }

    pub fn end(&mut self, tag: &str) -> &mut Self {
        self.writer.write_event(Event::End(BytesEnd::new(tag))).ok();
        self
    }

    pub fn finish(self) -> String {
        let bytes = self.writer.into_inner().into_inner();
        String::from_utf8(bytes).unwrap_or_default()
    }
}

/// Root element's `status`/`status_text` attributes.
pub fn root_status(xml: &str) -> Result<(String, String), HubError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let mut status = String::new();
                let mut status_text = String::new();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"status" => status = String::from_utf8_lossy(&attr.value).into_owned(),
                        b"status_text" => {
                            status_text = String::from_utf8_lossy(&attr.value).into_owned()
                        }
                        _ => {}
                    }
                }
                return Ok((status, status_text));
            }
            Ok(Event::Eof) => {
                return Err(HubError::GvmOperation("empty GMP response".to_string()))
            }
            Err(e) => {
                return Err(HubError::GvmOperation(format!(
                    "malformed GMP response: {e}"
                )))
            }
            _ => {}
        }
        buf.clear();
    }
}

/// Fails unless the response's status code is in the 2xx range.
pub fn check_ok(xml: &str) -> Result<(), HubError> {
    let (status, status_text) = root_status(xml)?;
    if status.starts_with('2') {
        Ok(())
    } else {
        Err(HubError::GvmOperation(format!(
            "GMP status {status}: {status_text}"
        )))
    }
}

/// Root element's attribute value (e.g. the `id` of a freshly created
/// resource).
pub fn root_attr(xml: &str, name: &[u8]) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let result = loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                break e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == name)
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned());
            }
            Ok(Event::Eof) | Err(_) => break None,
            _ => {}
        }
    };
    result
}

/// First occurrence of `<tag>text</tag>` anywhere in the document (matches
/// the adapter contract's `.//status`, `.//progress`, `.//report_id` lookups
/// — local-name match, not a path).
pub fn find_text(xml: &str, tag: &[u8]) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => stack.push(e.name().as_ref().to_vec()),
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Text(ref t)) => {
                if stack.last().map(|v| v.as_slice()) == Some(tag) {
                    if let Ok(text) = t.unescape() {
                        return Some(text.into_owned());
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

/// Byte range of the first element named `tag`, including nested content
/// (used to pull the inner `<report>…</report>` out of a `get_reports`
/// response).
pub fn extract_element(xml: &str, tag: &[u8]) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut start_pos: Option<usize> = None;
    let mut target_depth: i32 = 0;
    let mut depth: i32 = 0;

    loop {
        let pos_before = reader.buffer_position() as usize;
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == tag && start_pos.is_none() {
                    start_pos = Some(find_tag_open(xml, pos_before));
                    target_depth = depth;
                }
                depth += 1;
            }
            Ok(Event::Empty(ref e)) => {
                if e.name().as_ref() == tag && start_pos.is_none() {
                    let open = find_tag_open(xml, pos_before);
                    let end_pos = reader.buffer_position() as usize;
                    return Some(xml[open..end_pos].to_string());
                }
            }
            Ok(Event::End(ref e)) => {
                depth -= 1;
                if start_pos.is_some() && e.name().as_ref() == tag && depth == target_depth {
                    let end_pos = reader.buffer_position() as usize;
                    return start_pos.map(|s| xml[s..end_pos].to_string());
                }
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

/// `quick_xml`'s `buffer_position()` points just past the tag name; walk
/// back to the preceding `<` so the slice includes the opening bracket.
fn find_tag_open(xml: &str, approx_pos: usize) -> usize {
    xml[..approx_pos.min(xml.len())]
        .rfind('<')
        .unwrap_or(approx_pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_ok_accepts_2xx() {
        assert!(check_ok(r#"<foo_response status="200" status_text="OK"/>"#).is_ok());
    }

    #[test]
    fn check_ok_rejects_non_2xx() {
        let err = check_ok(r#"<foo_response status="400" status_text="Bad Request"/>"#)
            .unwrap_err();
        assert!(matches!(err, HubError::GvmOperation(_)));
    }

    #[test]
    fn root_attr_reads_id() {
        let id = root_attr(r#"<create_target_response status="201" id="abc-1"/>"#, b"id");
        assert_eq!(id.as_deref(), Some("abc-1"));
    }

    #[test]
    fn find_text_locates_nested_element() {
        let xml = r#"<get_tasks_response><task><status>Running</status><progress>42</progress></task></get_tasks_response>"#;
        assert_eq!(find_text(xml, b"status").as_deref(), Some("Running"));
        assert_eq!(find_text(xml, b"progress").as_deref(), Some("42"));
    }

    #[test]
    fn extract_element_returns_full_subtree() {
        let xml = r#"<get_reports_response><report id="r1"><host>1.2.3.4</host></report></get_reports_response>"#;
        let extracted = extract_element(xml, b"report").unwrap();
        assert!(extracted.starts_with("<report"));
        assert!(extracted.contains("<host>1.2.3.4</host>"));
        assert!(extracted.ends_with("</report>"));
    }
}
