//! Parses PROPFIND multistatus bodies into flat entries.

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::time::SystemTime;
use tenftp::storage::{Error, ErrorKind};

/// One `<D:response>` worth of facts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DavEntry {
    /// The decoded path component of the response's href.
    pub href_path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl DavEntry {
    /// The last path segment.
    pub fn name(&self) -> String {
        self.href_path.trim_end_matches('/').rsplit('/').next().unwrap_or_default().to_string()
    }
}

// getlastmodified is RFC 1123; some servers hand out RFC 3339 instead.
fn parse_dav_datetime(input: &str) -> Option<SystemTime> {
    let normalized = input.trim().replace("UTC", "+0000").replace("GMT", "+0000");
    if let Ok(dt) = DateTime::parse_from_rfc2822(&normalized) {
        return Some(SystemTime::from(dt.with_timezone(&Utc)));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input.trim()) {
        return Some(SystemTime::from(dt));
    }
    None
}

#[derive(PartialEq)]
enum Context {
    Response,
    Href,
    Propstat,
    Prop,
    Resourcetype,
    Collection,
    Getcontentlength,
    Getlastmodified,
}

fn malformed<E: std::fmt::Display>(err: E) -> Error {
    Error::new(ErrorKind::LocalError, format!("malformed multistatus response: {}", err))
}

pub(crate) fn parse_multistatus(xml: &str) -> Result<Vec<DavEntry>, Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    reader.config_mut().expand_empty_elements = true;

    let mut entries: Vec<DavEntry> = Vec::new();
    let mut context: Vec<Context> = Vec::new();
    let mut xml_buf = Vec::new();

    let mut href_buf = String::new();
    let mut is_dir = false;
    let mut size: u64 = 0;
    let mut modified: Option<SystemTime> = None;

    loop {
        let event = reader.read_event_into(&mut xml_buf).map_err(malformed)?;
        match event {
            Event::Start(ref element) => {
                let name = element.name();
                let local_name = name.local_name();
                match local_name.as_ref() {
                    b"response" if context.is_empty() => {
                        href_buf.clear();
                        is_dir = false;
                        size = 0;
                        modified = None;
                        context.push(Context::Response);
                    }
                    b"href" if context.last() == Some(&Context::Response) => context.push(Context::Href),
                    b"propstat" if context.last() == Some(&Context::Response) => context.push(Context::Propstat),
                    b"prop" if context.last() == Some(&Context::Propstat) => context.push(Context::Prop),
                    b"resourcetype" if context.last() == Some(&Context::Prop) => context.push(Context::Resourcetype),
                    b"collection" if context.last() == Some(&Context::Resourcetype) => {
                        is_dir = true;
                        context.push(Context::Collection);
                    }
                    b"getcontentlength" if context.last() == Some(&Context::Prop) => context.push(Context::Getcontentlength),
                    b"getlastmodified" if context.last() == Some(&Context::Prop) => context.push(Context::Getlastmodified),
                    _ => {}
                }
            }
            Event::End(ref element) => {
                let name = element.name();
                let local_name = name.local_name();
                match local_name.as_ref() {
                    b"response" if context.last() == Some(&Context::Response) => {
                        let decoded = percent_decode_str(&href_buf).decode_utf8_lossy().to_string();
                        // Strip a scheme://host prefix when the server sends
                        // absolute URLs in href.
                        let path = match decoded.find("://") {
                            Some(idx) => decoded[idx + 3..].find('/').map(|slash| decoded[idx + 3 + slash..].to_string()).unwrap_or_default(),
                            None => decoded,
                        };
                        entries.push(DavEntry {
                            href_path: path,
                            is_dir,
                            size,
                            modified,
                        });
                        context.pop();
                    }
                    b"href" | b"propstat" | b"prop" | b"resourcetype" | b"collection" | b"getcontentlength" | b"getlastmodified"
                        if !context.is_empty() =>
                    {
                        context.pop();
                    }
                    _ => {}
                }
            }
            Event::Text(value) => {
                let text = value.xml_content().map_err(malformed)?;
                match context.last() {
                    Some(&Context::Href) => href_buf.push_str(&text),
                    Some(&Context::Getcontentlength) => {
                        size = text.parse::<u64>().map_err(malformed)?;
                    }
                    Some(&Context::Getlastmodified) => {
                        modified = parse_dav_datetime(&text);
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        xml_buf.clear();
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MULTISTATUS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
        <D:multistatus xmlns:D="DAV:">
            <D:response>
                <D:href>/dav/bob/</D:href>
                <D:propstat>
                    <D:prop>
                        <D:resourcetype><D:collection/></D:resourcetype>
                        <D:getlastmodified>Thu, 30 Jul 2026 12:00:00 GMT</D:getlastmodified>
                        <D:displayname>bob</D:displayname>
                    </D:prop>
                    <D:status>HTTP/1.1 200 OK</D:status>
                </D:propstat>
            </D:response>
            <D:response>
                <D:href>/dav/bob/notes%20v2.txt</D:href>
                <D:propstat>
                    <D:prop>
                        <D:resourcetype/>
                        <D:getcontentlength>42</D:getcontentlength>
                        <D:getlastmodified>Thu, 30 Jul 2026 12:34:56 GMT</D:getlastmodified>
                    </D:prop>
                    <D:status>HTTP/1.1 200 OK</D:status>
                </D:propstat>
            </D:response>
        </D:multistatus>"#;

    #[test]
    fn parses_collection_and_file_rows() {
        let entries = parse_multistatus(MULTISTATUS).unwrap();
        assert_eq!(entries.len(), 2);

        assert!(entries[0].is_dir);
        assert_eq!(entries[0].href_path, "/dav/bob/");
        assert_eq!(entries[0].name(), "bob");
        assert!(entries[0].modified.is_some());

        assert!(!entries[1].is_dir);
        assert_eq!(entries[1].size, 42);
        assert_eq!(entries[1].name(), "notes v2.txt");
    }

    #[test]
    fn absolute_hrefs_reduce_to_paths() {
        let xml = r#"<D:multistatus xmlns:D="DAV:">
            <D:response>
                <D:href>https://dav.example.net/share/file.bin</D:href>
                <D:propstat><D:prop>
                    <D:resourcetype/>
                    <D:getcontentlength>7</D:getcontentlength>
                </D:prop></D:propstat>
            </D:response>
        </D:multistatus>"#;
        let entries = parse_multistatus(xml).unwrap();
        assert_eq!(entries[0].href_path, "/share/file.bin");
    }

    #[test]
    fn rfc3339_dates_are_tolerated() {
        assert!(parse_dav_datetime("2026-07-30T12:00:00Z").is_some());
        assert!(parse_dav_datetime("Thu, 30 Jul 2026 12:00:00 UTC").is_some());
        assert!(parse_dav_datetime("not a date").is_none());
    }

    #[test]
    fn empty_multistatus_yields_no_entries() {
        let entries = parse_multistatus(r#"<D:multistatus xmlns:D="DAV:"></D:multistatus>"#).unwrap();
        assert!(entries.is_empty());
    }
}
