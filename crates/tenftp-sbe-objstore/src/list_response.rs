//! Parses ListObjectsV2 XML responses.

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use tenftp::storage::{Error, ErrorKind};

/// One object row of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// The parts of a ListObjectsV2 response the back-end consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ListBucketResult {
    pub contents: Vec<ObjectEntry>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

#[derive(PartialEq)]
enum Context {
    Contents,
    Key,
    Size,
    LastModified,
    CommonPrefixes,
    Prefix,
    IsTruncated,
    NextContinuationToken,
}

fn malformed<E: std::fmt::Display>(err: E) -> Error {
    Error::new(ErrorKind::LocalError, format!("malformed list response: {}", err))
}

pub(crate) fn parse_list_response(xml: &str) -> Result<ListBucketResult, Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    reader.config_mut().expand_empty_elements = true;

    let mut result = ListBucketResult::default();
    let mut context: Vec<Context> = Vec::new();
    let mut entry_key = String::new();
    let mut entry_size: u64 = 0;
    let mut entry_modified: Option<DateTime<Utc>> = None;
    let mut xml_buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut xml_buf).map_err(malformed)?;
        match event {
            Event::Start(ref element) => {
                let name = element.name();
                let local_name = name.local_name();
                match local_name.as_ref() {
                    b"Contents" if context.is_empty() => {
                        entry_key.clear();
                        entry_size = 0;
                        entry_modified = None;
                        context.push(Context::Contents);
                    }
                    b"Key" if context.last() == Some(&Context::Contents) => context.push(Context::Key),
                    b"Size" if context.last() == Some(&Context::Contents) => context.push(Context::Size),
                    b"LastModified" if context.last() == Some(&Context::Contents) => context.push(Context::LastModified),
                    b"CommonPrefixes" if context.is_empty() => context.push(Context::CommonPrefixes),
                    b"Prefix" if context.last() == Some(&Context::CommonPrefixes) => context.push(Context::Prefix),
                    b"IsTruncated" if context.is_empty() => context.push(Context::IsTruncated),
                    b"NextContinuationToken" if context.is_empty() => context.push(Context::NextContinuationToken),
                    _ => {}
                }
            }
            Event::End(ref element) => {
                let name = element.name();
                let local_name = name.local_name();
                match local_name.as_ref() {
                    b"Contents" if context.last() == Some(&Context::Contents) => {
                        if !entry_key.is_empty() {
                            result.contents.push(ObjectEntry {
                                key: std::mem::take(&mut entry_key),
                                size: entry_size,
                                last_modified: entry_modified,
                            });
                        }
                        context.pop();
                    }
                    b"Key" | b"Size" | b"LastModified" | b"Prefix" | b"IsTruncated" | b"NextContinuationToken" | b"CommonPrefixes"
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
                    Some(&Context::Key) => entry_key.push_str(&text),
                    Some(&Context::Size) => {
                        entry_size = text.parse::<u64>().map_err(malformed)?;
                    }
                    Some(&Context::LastModified) => {
                        entry_modified = DateTime::parse_from_rfc3339(&text).ok().map(|dt| dt.with_timezone(&Utc));
                    }
                    Some(&Context::Prefix) => result.common_prefixes.push(text.to_string()),
                    Some(&Context::IsTruncated) => result.is_truncated = text.as_ref() == "true",
                    Some(&Context::NextContinuationToken) => result.next_continuation_token = Some(text.to_string()),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        xml_buf.clear();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_contents_and_prefixes() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
                <Name>b</Name>
                <Prefix>tenants/alice/</Prefix>
                <KeyCount>3</KeyCount>
                <IsTruncated>false</IsTruncated>
                <Contents>
                    <Key>tenants/alice/hello.txt</Key>
                    <LastModified>2026-07-30T12:00:00.000Z</LastModified>
                    <Size>2</Size>
                </Contents>
                <Contents>
                    <Key>tenants/alice/</Key>
                    <LastModified>2026-07-29T08:30:00.000Z</LastModified>
                    <Size>0</Size>
                </Contents>
                <CommonPrefixes>
                    <Prefix>tenants/alice/docs/</Prefix>
                </CommonPrefixes>
            </ListBucketResult>"#;

        let result = parse_list_response(xml).unwrap();
        assert_eq!(result.contents.len(), 2);
        assert_eq!(result.contents[0].key, "tenants/alice/hello.txt");
        assert_eq!(result.contents[0].size, 2);
        assert!(result.contents[0].last_modified.is_some());
        assert_eq!(result.common_prefixes, vec!["tenants/alice/docs/".to_string()]);
        assert!(!result.is_truncated);
        assert_eq!(result.next_continuation_token, None);
    }

    #[test]
    fn parses_truncation_marker() {
        let xml = r#"<ListBucketResult>
            <IsTruncated>true</IsTruncated>
            <NextContinuationToken>token-123</NextContinuationToken>
        </ListBucketResult>"#;
        let result = parse_list_response(xml).unwrap();
        assert!(result.is_truncated);
        assert_eq!(result.next_continuation_token.as_deref(), Some("token-123"));
    }

    #[test]
    fn empty_listing_is_valid() {
        let xml = r#"<ListBucketResult><IsTruncated>false</IsTruncated><KeyCount>0</KeyCount></ListBucketResult>"#;
        let result = parse_list_response(xml).unwrap();
        assert_eq!(result, ListBucketResult::default());
    }

    #[test]
    fn garbage_is_rejected_gracefully() {
        let xml = r#"<ListBucketResult><Contents><Key>k</Key><Size>not-a-number</Size></Contents></ListBucketResult>"#;
        assert!(parse_list_response(xml).is_err());
    }
}
