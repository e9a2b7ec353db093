//! OAI-PMH wire model: verbs, error codes, and response parsing.
//!
//! Parsing is namespace-agnostic (local tag names only) and tolerant of
//! anything the protocol allows providers to vary. Metadata payloads are
//! sliced out of the raw response text byte-for-byte rather than
//! re-serialized, so harvested files carry exactly what the provider
//! sent.

use std::fmt;

use roxmltree::{Document, Node};

use crate::datestamp::Granularity;
use crate::error::{HarvesterError, Result};
use crate::types::HarvestedRecord;
use crate::xml::{find_child, find_children, first_element_child, get_attribute, get_text};

/// The six OAI-PMH request verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Identify,
    GetRecord,
    ListMetadataFormats,
    ListIdentifiers,
    ListRecords,
    ListSets,
}

impl Verb {
    /// Verb name as it appears in the `verb` request argument and as the
    /// response container element.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identify => "Identify",
            Self::GetRecord => "GetRecord",
            Self::ListMetadataFormats => "ListMetadataFormats",
            Self::ListIdentifiers => "ListIdentifiers",
            Self::ListRecords => "ListRecords",
            Self::ListSets => "ListSets",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error codes a provider may return in `<error code="…">`.
///
/// Codes outside the protocol's fixed set are preserved verbatim in
/// `Other` rather than rejected, since a broken provider is still worth a
/// readable error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OaiErrorCode {
    BadArgument,
    BadResumptionToken,
    BadVerb,
    CannotDisseminateFormat,
    IdDoesNotExist,
    NoRecordsMatch,
    NoMetadataFormats,
    NoSetHierarchy,
    Other(String),
}

impl OaiErrorCode {
    /// Parse a code attribute value.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "badArgument" => Self::BadArgument,
            "badResumptionToken" => Self::BadResumptionToken,
            "badVerb" => Self::BadVerb,
            "cannotDisseminateFormat" => Self::CannotDisseminateFormat,
            "idDoesNotExist" => Self::IdDoesNotExist,
            "noRecordsMatch" => Self::NoRecordsMatch,
            "noMetadataFormats" => Self::NoMetadataFormats,
            "noSetHierarchy" => Self::NoSetHierarchy,
            other => Self::Other(other.to_string()),
        }
    }

    /// Code string as the protocol spells it.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::BadArgument => "badArgument",
            Self::BadResumptionToken => "badResumptionToken",
            Self::BadVerb => "badVerb",
            Self::CannotDisseminateFormat => "cannotDisseminateFormat",
            Self::IdDoesNotExist => "idDoesNotExist",
            Self::NoRecordsMatch => "noRecordsMatch",
            Self::NoMetadataFormats => "noMetadataFormats",
            Self::NoSetHierarchy => "noSetHierarchy",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for OaiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deletion support a provider declares in its Identify response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletedRecordSupport {
    /// Deletions are never exposed.
    No,
    /// Deletions are exposed but may be garbage-collected.
    Transient,
    /// Deletions are exposed indefinitely.
    Persistent,
}

impl DeletedRecordSupport {
    /// Parse the `<deletedRecord>` token, case-insensitive.
    #[must_use]
    pub fn from_identify(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("no") {
            Some(Self::No)
        } else if token.eq_ignore_ascii_case("transient") {
            Some(Self::Transient)
        } else if token.eq_ignore_ascii_case("persistent") {
            Some(Self::Persistent)
        } else {
            None
        }
    }

    /// Token as the protocol spells it.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Transient => "transient",
            Self::Persistent => "persistent",
        }
    }
}

/// What the client needs to learn from Identify before harvesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifyInfo {
    /// Datestamp granularity for `from`/`until` arguments.
    pub granularity: Granularity,
    /// Declared deletion support.
    pub deleted_record: DeletedRecordSupport,
}

/// Strategy for deciding whether a provider tracks deletions.
///
/// Incremental harvests only see deletions if the provider exposes them;
/// the client consults the probe to decide whether an incremental run is
/// safe or must escalate to a full harvest.
pub trait DeletionProbe: Send + Sync {
    /// True if incremental harvests from this provider will observe
    /// deletions.
    fn supports_deletions(&self, identify: &IdentifyInfo) -> bool;
}

/// Default probe: trust the `deletedRecord` declaration.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentifyDeletionProbe;

impl DeletionProbe for IdentifyDeletionProbe {
    fn supports_deletions(&self, identify: &IdentifyInfo) -> bool {
        identify.deleted_record != DeletedRecordSupport::No
    }
}

/// One page of a list response.
#[derive(Debug, Clone)]
pub struct Page {
    /// Records on this page, in response order.
    pub records: Vec<HarvestedRecord>,
    /// Token for the next page. `None` (absent or empty element) means
    /// the chain is complete.
    pub resumption_token: Option<String>,
}

fn invalid(verb: Verb, reason: impl Into<String>) -> HarvesterError {
    HarvesterError::InvalidResponse {
        verb: verb.as_str(),
        reason: reason.into(),
    }
}

/// Fail if the response carries an `<error>` element.
fn check_oai_error(root: Node<'_, '_>) -> Result<()> {
    if let Some(error) = find_child(root, "error") {
        let code = get_attribute(error, "code").unwrap_or("");
        return Err(HarvesterError::Oai {
            code: OaiErrorCode::from_code(code),
            message: get_text(error),
        });
    }
    Ok(())
}

/// Parse an Identify response.
///
/// Missing `<granularity>` on a response that still carries
/// `<protocolVersion>` is treated as day granularity (pre-2.0 providers
/// never advertise one). A missing `<deletedRecord>` reads as `no`: with
/// no evidence the provider tracks deletions, the client must not assume
/// it does.
pub fn parse_identify(xml: &str) -> Result<IdentifyInfo> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    check_oai_error(root)?;

    let identify = find_child(root, "Identify")
        .ok_or_else(|| invalid(Verb::Identify, "missing <Identify> element"))?;

    let granularity = match find_child(identify, "granularity") {
        Some(node) => {
            let token = get_text(node);
            Granularity::from_identify(&token)
                .ok_or_else(|| invalid(Verb::Identify, format!("unknown granularity '{token}'")))?
        }
        None if find_child(identify, "protocolVersion").is_some() => Granularity::Day,
        None => return Err(invalid(Verb::Identify, "missing <granularity> element")),
    };

    let deleted_record = match find_child(identify, "deletedRecord") {
        Some(node) => {
            let token = get_text(node);
            DeletedRecordSupport::from_identify(&token).ok_or_else(|| {
                invalid(Verb::Identify, format!("unknown deletedRecord '{token}'"))
            })?
        }
        None => DeletedRecordSupport::No,
    };

    Ok(IdentifyInfo {
        granularity,
        deleted_record,
    })
}

/// Parse a ListMetadataFormats response into the advertised prefixes.
pub fn parse_list_metadata_formats(xml: &str) -> Result<Vec<String>> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    check_oai_error(root)?;

    let list = find_child(root, "ListMetadataFormats")
        .ok_or_else(|| invalid(Verb::ListMetadataFormats, "missing <ListMetadataFormats> element"))?;

    let prefixes: Vec<String> = find_children(list, "metadataFormat")
        .filter_map(|format| find_child(format, "metadataPrefix"))
        .map(get_text)
        .filter(|prefix| !prefix.is_empty())
        .collect();

    if prefixes.is_empty() {
        return Err(invalid(
            Verb::ListMetadataFormats,
            "no metadataPrefix advertised",
        ));
    }
    Ok(prefixes)
}

/// Parse one page of a ListRecords or ListIdentifiers response.
///
/// Metadata payloads are byte slices of `xml` covering the first element
/// child of each `<metadata>`, verbatim. Deletion markers and
/// ListIdentifiers headers have an empty payload.
///
/// # Arguments
/// * `xml` - Raw response body
/// * `verb` - `Verb::ListRecords` or `Verb::ListIdentifiers`
pub fn parse_page(xml: &str, verb: Verb) -> Result<Page> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    check_oai_error(root)?;

    let list = find_child(root, verb.as_str())
        .ok_or_else(|| invalid(verb, format!("missing <{verb}> element")))?;

    let mut records = Vec::new();
    match verb {
        Verb::ListRecords => {
            for record in find_children(list, "record") {
                let header = find_child(record, "header")
                    .ok_or_else(|| invalid(verb, "record without <header>"))?;
                let mut parsed = parse_header(header, verb)?;
                if !parsed.deleted {
                    parsed.payload = find_child(record, "metadata")
                        .and_then(first_element_child)
                        .map(|payload| xml[payload.range()].to_string())
                        .unwrap_or_default();
                }
                records.push(parsed);
            }
        }
        Verb::ListIdentifiers => {
            for header in find_children(list, "header") {
                records.push(parse_header(header, verb)?);
            }
        }
        other => {
            return Err(invalid(other, "verb does not return record pages"));
        }
    }

    let resumption_token = find_child(list, "resumptionToken")
        .map(get_text)
        .filter(|token| !token.is_empty());

    Ok(Page {
        records,
        resumption_token,
    })
}

/// Parse one `<header>` into a record without payload.
fn parse_header(header: Node<'_, '_>, verb: Verb) -> Result<HarvestedRecord> {
    let identifier = find_child(header, "identifier")
        .map(get_text)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| invalid(verb, "header without <identifier>"))?;

    let datestamp = find_child(header, "datestamp")
        .map(get_text)
        .filter(|stamp| !stamp.is_empty());

    let sets: Vec<String> = find_children(header, "setSpec")
        .map(get_text)
        .filter(|spec| !spec.is_empty())
        .collect();

    let deleted = get_attribute(header, "status")
        .is_some_and(|status| status.eq_ignore_ascii_case("deleted"));

    Ok(HarvestedRecord {
        identifier,
        datestamp,
        sets,
        payload: String::new(),
        deleted,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const IDENTIFY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
  <responseDate>2004-06-01T12:00:00Z</responseDate>
  <request verb="Identify">http://repo.example.org/oai</request>
  <Identify>
    <repositoryName>Example Repository</repositoryName>
    <baseURL>http://repo.example.org/oai</baseURL>
    <protocolVersion>2.0</protocolVersion>
    <deletedRecord>transient</deletedRecord>
    <granularity>YYYY-MM-DDThh:mm:ssZ</granularity>
  </Identify>
</OAI-PMH>"#;

    const LIST_RECORDS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
  <responseDate>2004-06-01T12:00:00Z</responseDate>
  <request verb="ListRecords">http://repo.example.org/oai</request>
  <ListRecords>
    <record>
      <header>
        <identifier>oai:example.org:rec-1</identifier>
        <datestamp>2004-05-20T08:15:00Z</datestamp>
        <setSpec>physics</setSpec>
        <setSpec>math</setSpec>
      </header>
      <metadata>
        <oai_dc:dc xmlns:oai_dc="http://www.openarchives.org/OAI/2.0/oai_dc/">
          <dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">First</dc:title>
        </oai_dc:dc>
      </metadata>
    </record>
    <record>
      <header status="deleted">
        <identifier>oai:example.org:rec-2</identifier>
        <datestamp>2004-05-21T09:00:00Z</datestamp>
      </header>
    </record>
    <resumptionToken>page-2-token</resumptionToken>
  </ListRecords>
</OAI-PMH>"#;

    #[test]
    fn test_verb_display() {
        assert_eq!(Verb::ListRecords.to_string(), "ListRecords");
        assert_eq!(Verb::Identify.as_str(), "Identify");
    }

    #[test]
    fn test_error_code_round_trip() {
        for code in [
            "badArgument",
            "badResumptionToken",
            "badVerb",
            "cannotDisseminateFormat",
            "idDoesNotExist",
            "noRecordsMatch",
            "noMetadataFormats",
            "noSetHierarchy",
        ] {
            assert_eq!(OaiErrorCode::from_code(code).as_str(), code);
        }
        assert_eq!(
            OaiErrorCode::from_code("serviceUnavailable"),
            OaiErrorCode::Other("serviceUnavailable".to_string())
        );
    }

    #[test]
    fn test_parse_identify() {
        let info = parse_identify(IDENTIFY).unwrap();
        assert_eq!(info.granularity, Granularity::Second);
        assert_eq!(info.deleted_record, DeletedRecordSupport::Transient);
    }

    #[test]
    fn test_parse_identify_missing_deleted_record_reads_no() {
        let xml = r#"<OAI-PMH><Identify>
            <protocolVersion>2.0</protocolVersion>
            <granularity>YYYY-MM-DD</granularity>
        </Identify></OAI-PMH>"#;
        let info = parse_identify(xml).unwrap();
        assert_eq!(info.granularity, Granularity::Day);
        assert_eq!(info.deleted_record, DeletedRecordSupport::No);
    }

    #[test]
    fn test_parse_identify_v1_defaults_to_day() {
        let xml = r#"<OAI-PMH><Identify>
            <protocolVersion>1.1</protocolVersion>
        </Identify></OAI-PMH>"#;
        let info = parse_identify(xml).unwrap();
        assert_eq!(info.granularity, Granularity::Day);
    }

    #[test]
    fn test_parse_identify_rejects_bad_granularity() {
        let xml = r#"<OAI-PMH><Identify>
            <granularity>YYYY</granularity>
            <deletedRecord>no</deletedRecord>
        </Identify></OAI-PMH>"#;
        let err = parse_identify(xml).unwrap_err();
        assert!(err.to_string().contains("granularity"));
    }

    #[test]
    fn test_parse_identify_rejects_missing_element() {
        let xml = r#"<OAI-PMH><responseDate>2004-06-01T12:00:00Z</responseDate></OAI-PMH>"#;
        assert!(parse_identify(xml).is_err());
    }

    #[test]
    fn test_parse_page_records() {
        let page = parse_page(LIST_RECORDS, Verb::ListRecords).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.resumption_token.as_deref(), Some("page-2-token"));

        let first = &page.records[0];
        assert_eq!(first.identifier, "oai:example.org:rec-1");
        assert_eq!(first.datestamp.as_deref(), Some("2004-05-20T08:15:00Z"));
        assert_eq!(first.sets, vec!["physics", "math"]);
        assert!(!first.deleted);
        // Payload is the verbatim slice, prefixes and all
        assert!(first.payload.starts_with("<oai_dc:dc"));
        assert!(first.payload.ends_with("</oai_dc:dc>"));
        assert!(first.payload.contains("First"));

        let second = &page.records[1];
        assert!(second.deleted);
        assert!(second.payload.is_empty());
    }

    #[test]
    fn test_parse_page_empty_token_ends_chain() {
        let xml = r#"<OAI-PMH><ListRecords>
            <record><header><identifier>oai:x:1</identifier></header>
            <metadata><dc/></metadata></record>
            <resumptionToken/>
        </ListRecords></OAI-PMH>"#;
        let page = parse_page(xml, Verb::ListRecords).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.resumption_token, None);
    }

    #[test]
    fn test_parse_page_no_token_element() {
        let xml = r#"<OAI-PMH><ListRecords>
            <record><header><identifier>oai:x:1</identifier></header>
            <metadata><dc/></metadata></record>
        </ListRecords></OAI-PMH>"#;
        let page = parse_page(xml, Verb::ListRecords).unwrap();
        assert_eq!(page.resumption_token, None);
    }

    #[test]
    fn test_parse_page_list_identifiers() {
        let xml = r#"<OAI-PMH><ListIdentifiers>
            <header><identifier>oai:x:1</identifier>
                <datestamp>2004-01-01</datestamp><setSpec>a</setSpec></header>
            <header status="deleted"><identifier>oai:x:2</identifier></header>
            <resumptionToken>next</resumptionToken>
        </ListIdentifiers></OAI-PMH>"#;
        let page = parse_page(xml, Verb::ListIdentifiers).unwrap();
        assert_eq!(page.records.len(), 2);
        assert!(page.records[0].payload.is_empty());
        assert!(page.records[1].deleted);
        assert_eq!(page.resumption_token.as_deref(), Some("next"));
    }

    #[test]
    fn test_parse_page_oai_error() {
        let xml = r#"<OAI-PMH>
            <error code="badResumptionToken">token expired</error>
        </OAI-PMH>"#;
        let err = parse_page(xml, Verb::ListRecords).unwrap_err();
        match err {
            HarvesterError::Oai { code, message } => {
                assert_eq!(code, OaiErrorCode::BadResumptionToken);
                assert_eq!(message, "token expired");
            }
            other => panic!("expected Oai error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_page_no_records_match_is_empty_result() {
        let xml = r#"<OAI-PMH><error code="noRecordsMatch"/></OAI-PMH>"#;
        let err = parse_page(xml, Verb::ListRecords).unwrap_err();
        assert!(err.is_empty_result());
    }

    #[test]
    fn test_parse_page_missing_container() {
        let xml = r#"<OAI-PMH><responseDate>2004-06-01T12:00:00Z</responseDate></OAI-PMH>"#;
        let err = parse_page(xml, Verb::ListRecords).unwrap_err();
        assert!(err.to_string().contains("ListRecords"));
    }

    #[test]
    fn test_parse_page_header_without_identifier() {
        let xml = r#"<OAI-PMH><ListIdentifiers>
            <header><datestamp>2004-01-01</datestamp></header>
        </ListIdentifiers></OAI-PMH>"#;
        assert!(parse_page(xml, Verb::ListIdentifiers).is_err());
    }

    #[test]
    fn test_parse_list_metadata_formats() {
        let xml = r#"<OAI-PMH><ListMetadataFormats>
            <metadataFormat><metadataPrefix>oai_dc</metadataPrefix></metadataFormat>
            <metadataFormat><metadataPrefix>adn</metadataPrefix></metadataFormat>
        </ListMetadataFormats></OAI-PMH>"#;
        let prefixes = parse_list_metadata_formats(xml).unwrap();
        assert_eq!(prefixes, vec!["oai_dc", "adn"]);
    }

    #[test]
    fn test_parse_list_metadata_formats_empty_is_error() {
        let xml = r#"<OAI-PMH><ListMetadataFormats/></OAI-PMH>"#;
        assert!(parse_list_metadata_formats(xml).is_err());
    }

    #[test]
    fn test_deletion_probe_default() {
        let probe = IdentifyDeletionProbe;
        let mut info = IdentifyInfo {
            granularity: Granularity::Second,
            deleted_record: DeletedRecordSupport::No,
        };
        assert!(!probe.supports_deletions(&info));
        info.deleted_record = DeletedRecordSupport::Transient;
        assert!(probe.supports_deletions(&info));
        info.deleted_record = DeletedRecordSupport::Persistent;
        assert!(probe.supports_deletions(&info));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(parse_identify("not xml at all").is_err());
        assert!(parse_page("<unclosed", Verb::ListRecords).is_err());
    }
}
