//! Parser for X12 837 healthcare claim envelopes
//!
//! This module converts raw 837 interchanges (professional `005010X222A1`
//! and institutional `005010X223A2`) into the flat stream of
//! [`ServiceRecord`]s consumed by the scoring pipeline. One record is
//! emitted per service line (`SV1`/`SV2`/`SV3`); claims that carry no
//! service lines emit a single claim-level record.
//!
//! # Features
//!
//! - Delimiter discovery from the fixed-width ISA header (element,
//!   repetition, sub-element and segment separators are all data-driven)
//! - Streaming segment scan over string slices; segment text is only
//!   allocated when it is emitted in a record
//! - Multiple ISA envelopes per input, parsed in order
//! - Unknown transaction qualifiers degrade to records with an empty
//!   `claim_type` rather than aborting the parse
//!
//! # Examples
//!
//! ```no_run
//! use raf_rs::parser::ClaimParser;
//!
//! let records = ClaimParser::parse_file("claims/batch_837p.txt")?;
//! for record in &records {
//!     println!("{} {:?}", record.claim_type, record.procedure_code);
//! }
//! # Ok::<(), raf_rs::parser::ParseError>(())
//! ```

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::types::{normalize_diagnosis, ServiceRecord};

/// Diagnosis qualifiers accepted from `HI` segments. Everything else on an
/// `HI` (occurrence codes, value codes, condition codes) is skipped.
const DIAGNOSIS_QUALIFIERS: [&str; 8] = ["ABK", "ABF", "BK", "BF", "ABJ", "BJ", "APR", "PR"];

/// Error type for 837 parsing operations.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// IO error occurred while reading the input
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The specified file was not found
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The ISA header is unparseable or the separators cannot be discovered
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// An ISA interchange was never closed by an IEA trailer
    #[error("unterminated envelope: missing IEA for interchange {0}")]
    UnterminatedEnvelope(String),
}

/// Result type alias for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// The four separators governing an interchange, discovered from the ISA
/// header rather than assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    pub element: char,
    pub repetition: char,
    pub sub_element: char,
    pub segment: char,
}

impl Delimiters {
    /// Discover the separators from the first 106 bytes of an ISA header.
    ///
    /// Positions are fixed by X12: element separator at offset 3,
    /// repetition separator at offset 82, sub-element separator at offset
    /// 104, segment terminator at offset 105 (or the next non-whitespace
    /// byte after it, for envelopes that break lines inside the header).
    pub fn detect(input: &str) -> ParseResult<Self> {
        let bytes = input.as_bytes();
        if !input.starts_with("ISA") {
            return Err(ParseError::MalformedEnvelope(
                "input does not begin with an ISA header".into(),
            ));
        }
        if bytes.len() < 106 {
            return Err(ParseError::MalformedEnvelope(format!(
                "interchange is {} bytes, shorter than the 106-byte ISA header",
                bytes.len()
            )));
        }

        let element = bytes[3] as char;
        let repetition = bytes[82] as char;
        let sub_element = bytes[104] as char;

        let mut i = 105;
        let segment = loop {
            match bytes.get(i) {
                None => {
                    return Err(ParseError::MalformedEnvelope(
                        "segment terminator undetectable after ISA header".into(),
                    ))
                }
                Some(b) if (*b as char).is_whitespace() => i += 1,
                Some(b) => break *b as char,
            }
        };

        if segment == element || segment == sub_element || segment == repetition {
            return Err(ParseError::MalformedEnvelope(format!(
                "segment terminator `{segment}` collides with another separator"
            )));
        }

        Ok(Self {
            element,
            repetition,
            sub_element,
            segment,
        })
    }
}

/// Parser for 837 claim envelopes.
///
/// All methods are associated functions; the parser itself holds no state
/// between calls. Input may contain any number of ISA..IEA envelopes, which
/// must share one set of separators.
pub struct ClaimParser;

impl ClaimParser {
    /// Parse 837 content from a file path.
    ///
    /// # Errors
    ///
    /// - [`ParseError::FileNotFound`] if the file doesn't exist
    /// - [`ParseError::Io`] if the file cannot be read
    /// - [`ParseError::MalformedEnvelope`] / [`ParseError::UnterminatedEnvelope`]
    ///   for structural problems in the interchange
    pub fn parse_file<P: AsRef<Path>>(path: P) -> ParseResult<Vec<ServiceRecord>> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ParseError::FileNotFound(path.to_string_lossy().to_string()));
        }

        let file = File::open(path)?;
        Self::parse_reader(BufReader::new(file))
    }

    /// Parse 837 content from any reader.
    ///
    /// The whole input is buffered once; segment scanning then borrows from
    /// that buffer without further copies.
    pub fn parse_reader<R: Read>(mut reader: R) -> ParseResult<Vec<ServiceRecord>> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        Self::parse_str(&content)
    }

    /// Parse 837 content already held as a string.
    pub fn parse_str(input: &str) -> ParseResult<Vec<ServiceRecord>> {
        let input = input.trim_start();
        let delimiters = Delimiters::detect(input)?;
        debug!(?delimiters, "parsing 837 interchange");

        let mut extractor = Extractor::new(delimiters);
        for raw in input.split(delimiters.segment) {
            let segment = raw.trim();
            if segment.is_empty() {
                continue;
            }
            extractor.segment(segment);
        }
        extractor.finish()
    }
}

/// Transaction kind from the implementation qualifier (`GS08`/`ST03`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionKind {
    Professional,
    Institutional,
    Unknown,
}

impl TransactionKind {
    fn from_qualifier(qualifier: &str) -> Self {
        if qualifier.starts_with("005010X222") {
            TransactionKind::Professional
        } else if qualifier.starts_with("005010X223") {
            TransactionKind::Institutional
        } else {
            TransactionKind::Unknown
        }
    }
}

/// Mutable claim scope opened at each `CLM` and flushed at the next claim
/// boundary (`CLM`, `SE`, `IEA`, or end of input).
#[derive(Debug, Default)]
struct ClaimScope {
    claim_type: String,
    bill_type: String,
    place_of_service: String,
    diagnosis_codes: Vec<String>,
    service_date: Option<NaiveDate>,
    through_date: Option<NaiveDate>,
    provider_specialty: String,
    rendering_npi: String,
    lines_emitted: usize,
}

struct Extractor {
    delimiters: Delimiters,
    records: Vec<ServiceRecord>,
    txn: TransactionKind,
    claim: Option<ClaimScope>,
    line_open: bool,
    billing_npi: String,
    open_interchanges: i32,
    interchange_control: String,
}

impl Extractor {
    fn new(delimiters: Delimiters) -> Self {
        Self {
            delimiters,
            records: Vec::new(),
            txn: TransactionKind::Unknown,
            claim: None,
            line_open: false,
            billing_npi: String::new(),
            open_interchanges: 0,
            interchange_control: String::new(),
        }
    }

    fn segment(&mut self, segment: &str) {
        let e: Vec<&str> = segment.split(self.delimiters.element).collect();
        match e[0] {
            "ISA" => {
                self.flush_claim();
                self.open_interchanges += 1;
                self.interchange_control = e.get(13).unwrap_or(&"").trim().to_string();
            }
            "IEA" => {
                self.flush_claim();
                self.open_interchanges -= 1;
            }
            "GS" => {
                if let Some(qualifier) = e.get(8) {
                    self.txn = TransactionKind::from_qualifier(qualifier);
                }
            }
            "ST" => {
                self.flush_claim();
                // ST03 refines the functional group qualifier when present
                if let Some(qualifier) = e.get(3).filter(|q| !q.is_empty()) {
                    self.txn = TransactionKind::from_qualifier(qualifier);
                }
            }
            "SE" => self.flush_claim(),
            "NM1" => self.nm1(&e),
            "PRV" => self.prv(&e),
            "CLM" => self.clm(&e),
            "HI" => self.hi(&e),
            "DTP" => self.dtp(&e),
            "LX" => self.line_open = false,
            "SV1" => self.sv1(&e),
            "SV2" => self.sv2(&e),
            "SV3" => self.sv3(&e),
            _ => {}
        }
    }

    fn finish(mut self) -> ParseResult<Vec<ServiceRecord>> {
        self.flush_claim();
        if self.open_interchanges != 0 {
            return Err(ParseError::UnterminatedEnvelope(
                if self.interchange_control.is_empty() {
                    "<unknown>".to_string()
                } else {
                    self.interchange_control
                },
            ));
        }
        debug!(records = self.records.len(), "837 extraction complete");
        Ok(self.records)
    }

    /// Close the open claim, emitting a claim-level record when no service
    /// line was seen.
    fn flush_claim(&mut self) {
        self.line_open = false;
        let Some(claim) = self.claim.take() else {
            return;
        };
        if claim.lines_emitted > 0 {
            return;
        }
        self.records.push(ServiceRecord {
            claim_type: claim.claim_type,
            bill_type: claim.bill_type,
            service_date: claim.service_date,
            through_date: claim.through_date,
            place_of_service: claim.place_of_service,
            procedure_code: None,
            procedure_modifiers: Vec::new(),
            diagnosis_codes: claim.diagnosis_codes,
            linked_diagnosis_pointers: Vec::new(),
            provider_specialty: claim.provider_specialty,
            performing_provider_npi: if claim.rendering_npi.is_empty() {
                self.billing_npi.clone()
            } else {
                claim.rendering_npi
            },
        });
    }

    fn nm1(&mut self, e: &[&str]) {
        let entity = e.get(1).copied().unwrap_or("");
        let id_qualifier = e.get(8).copied().unwrap_or("");
        let id = e.get(9).copied().unwrap_or("");
        if id_qualifier != "XX" || id.is_empty() {
            return;
        }
        match (entity, self.claim.as_mut()) {
            // rendering provider inside a claim
            ("82", Some(claim)) => claim.rendering_npi = id.to_string(),
            // billing provider at loop 2000A, the fallback NPI
            ("85", None) => self.billing_npi = id.to_string(),
            _ => {}
        }
    }

    fn prv(&mut self, e: &[&str]) {
        if e.get(1).copied() != Some("PE") {
            return;
        }
        let taxonomy = e.get(3).copied().unwrap_or("");
        if taxonomy.is_empty() {
            return;
        }
        if let Some(claim) = self.claim.as_mut() {
            claim.provider_specialty = taxonomy.to_string();
        }
    }

    fn clm(&mut self, e: &[&str]) {
        self.flush_claim();

        let mut scope = ClaimScope::default();
        let facility: Vec<&str> = e
            .get(5)
            .copied()
            .unwrap_or("")
            .split(self.delimiters.sub_element)
            .collect();
        let facility_code = facility.first().copied().unwrap_or("");
        let frequency = facility.get(2).copied().unwrap_or("");

        match self.txn {
            TransactionKind::Professional => {
                scope.claim_type = "71".to_string();
                scope.place_of_service = facility_code.to_string();
            }
            TransactionKind::Institutional => {
                scope.bill_type = format!("{facility_code}{frequency}");
                scope.claim_type =
                    if scope.bill_type.starts_with("11") || scope.bill_type.starts_with("12") {
                        "73".to_string()
                    } else {
                        "72".to_string()
                    };
            }
            TransactionKind::Unknown => {
                warn!(
                    claim = e.get(1).copied().unwrap_or(""),
                    "unknown transaction qualifier"
                );
            }
        }

        self.claim = Some(scope);
    }

    fn hi(&mut self, e: &[&str]) {
        let Some(claim) = self.claim.as_mut() else {
            return;
        };
        for composite in &e[1..] {
            let mut parts = composite.split(self.delimiters.sub_element);
            let qualifier = parts.next().unwrap_or("");
            if !DIAGNOSIS_QUALIFIERS.contains(&qualifier) {
                continue;
            }
            let Some(code) = parts.next().filter(|c| !c.is_empty()) else {
                continue;
            };
            let code = normalize_diagnosis(code);
            if !claim.diagnosis_codes.contains(&code) {
                claim.diagnosis_codes.push(code);
            }
        }
    }

    fn dtp(&mut self, e: &[&str]) {
        let qualifier = e.get(1).copied().unwrap_or("");
        let format = e.get(2).copied().unwrap_or("");
        let value = e.get(3).copied().unwrap_or("");
        let (from, through) = parse_dtp_value(format, value);
        if from.is_none() {
            return;
        }

        if self.line_open {
            // service-line date overrides the claim default
            if qualifier == "472" {
                if let Some(record) = self.records.last_mut() {
                    record.service_date = from;
                    record.through_date = through.or(from);
                }
            }
            return;
        }

        let Some(claim) = self.claim.as_mut() else {
            return;
        };
        // claim statement dates (434/435) and claim-level 472 both act as
        // the default service date for lines without a DTP of their own
        if matches!(qualifier, "434" | "435" | "472") {
            claim.service_date = from;
            claim.through_date = through.or(from);
        }
    }

    fn sv1(&mut self, e: &[&str]) {
        if self.claim.is_none() {
            return;
        }
        let (procedure, modifiers) = self.split_procedure(e.get(1).copied().unwrap_or(""));
        let pos_override = e.get(5).copied().unwrap_or("");
        let pointers: Vec<usize> = e
            .get(7)
            .copied()
            .unwrap_or("")
            .split(self.delimiters.sub_element)
            .filter_map(|p| p.trim().parse::<usize>().ok())
            .collect();
        self.emit_line(procedure, modifiers, pos_override, pointers);
    }

    fn sv2(&mut self, e: &[&str]) {
        let Some(claim) = self.claim.as_ref() else {
            return;
        };
        // institutional lines carry no pointers; all claim diagnoses are
        // linked in HI declaration order
        let pointers: Vec<usize> = (1..=claim.diagnosis_codes.len()).collect();
        let (procedure, modifiers) = self.split_procedure(e.get(2).copied().unwrap_or(""));
        self.emit_line(procedure, modifiers, "", pointers);
    }

    fn sv3(&mut self, e: &[&str]) {
        if self.claim.is_none() {
            return;
        }
        let (procedure, modifiers) = self.split_procedure(e.get(1).copied().unwrap_or(""));
        self.emit_line(procedure, modifiers, "", Vec::new());
    }

    /// Split an `HC:code:mod1..mod4` composite into procedure code and up
    /// to four modifiers.
    fn split_procedure(&self, composite: &str) -> (Option<String>, Vec<String>) {
        let mut parts = composite.split(self.delimiters.sub_element);
        let _qualifier = parts.next();
        let procedure = parts
            .next()
            .filter(|p| !p.is_empty())
            .map(|p| p.to_ascii_uppercase());
        let modifiers = parts
            .take(4)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        (procedure, modifiers)
    }

    fn emit_line(
        &mut self,
        procedure: Option<String>,
        modifiers: Vec<String>,
        pos_override: &str,
        pointers: Vec<usize>,
    ) {
        let billing_npi = self.billing_npi.clone();
        let Some(claim) = self.claim.as_mut() else {
            return;
        };
        self.records.push(ServiceRecord {
            claim_type: claim.claim_type.clone(),
            bill_type: claim.bill_type.clone(),
            service_date: claim.service_date,
            through_date: claim.through_date,
            place_of_service: if pos_override.is_empty() {
                claim.place_of_service.clone()
            } else {
                pos_override.to_string()
            },
            procedure_code: procedure,
            procedure_modifiers: modifiers,
            diagnosis_codes: claim.diagnosis_codes.clone(),
            linked_diagnosis_pointers: pointers,
            provider_specialty: claim.provider_specialty.clone(),
            performing_provider_npi: if claim.rendering_npi.is_empty() {
                billing_npi
            } else {
                claim.rendering_npi.clone()
            },
        });
        claim.lines_emitted += 1;
        self.line_open = true;
    }
}

/// Parse a `DTP` date value: `D8` single dates, `RD8` from-through ranges.
/// Unparseable values are dropped with a warning rather than failing the
/// envelope.
fn parse_dtp_value(format: &str, value: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let parse = |s: &str| NaiveDate::parse_from_str(s, "%Y%m%d").ok();
    match format {
        "D8" => (parse(value), None),
        "RD8" => match value.split_once('-') {
            Some((from, through)) => (parse(from), parse(through)),
            None => (None, None),
        },
        _ => {
            warn!(format, value, "unsupported DTP date format");
            (None, None)
        }
    }
}
