#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

use crate::util::find_files;

/// A node in a parsed report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A nested element
    Element(Element),
    /// Character data, with entities already decoded
    Text(String),
}

/// An XML element with its attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Tag name
    name:       String,
    /// Attributes in document order
    attributes: Vec<(String, String)>,
    /// Child nodes; comments and processing instructions are dropped
    children:   Vec<Node>,
}

impl Element {
    /// Builds an element.
    fn new(name: &str, attributes: Vec<(String, String)>, children: Vec<Node>) -> Self {
        Self {
            name: name.to_string(),
            attributes,
            children,
        }
    }

    /// Tag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of attribute `key`.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Child elements named `name`.
    pub fn elements_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |e| e.name == name)
    }

    /// First child element named `name`.
    pub fn first(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }
}

/// Decodes the predefined XML entities and numeric character references.
/// Unknown entities are kept verbatim.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };

        let entity = &tail[1..semi];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

peg::parser! {
    /// A grammar for the subset of XML that JUnit reporters emit.
    grammar xml() for str {
        /// optional whitespace
        rule _() = quiet!{[' ' | '\n' | '\t' | '\r']*}

        /// element and attribute names
        rule name() -> &'input str
            = $(['a'..='z' | 'A'..='Z' | '_' | ':']
                ['a'..='z' | 'A'..='Z' | '0'..='9' | '_' | ':' | '-' | '.']*)

        /// a single or double quoted attribute value
        rule quoted() -> String
            = "\"" v:$([^ '"']*) "\"" { unescape(v) }
            / "'" v:$([^ '\'']*) "'" { unescape(v) }

        /// `key="value"`
        rule attribute() -> (String, String)
            = k:name() _ "=" _ v:quoted() { (k.to_string(), v) }

        /// whitespace separated attributes
        rule attributes() -> Vec<(String, String)>
            = attrs:(_ a:attribute() { a })* { attrs }

        /// `<?xml ... ?>` and friends
        rule processing_instruction()
            = "<?" (!"?>" [_])* "?>"

        /// `<!-- ... -->`
        rule comment()
            = "<!--" (!"-->" [_])* "-->"

        /// `<!DOCTYPE ...>`
        rule doctype()
            = "<!DOCTYPE" (!">" [_])* ">"

        /// `<![CDATA[ ... ]]>`, kept verbatim
        rule cdata() -> String
            = "<![CDATA[" c:$((!"]]>" [_])*) "]]>" { c.to_string() }

        /// character data up to the next tag
        rule chars() -> String
            = t:$([^ '<']+) { unescape(t) }

        /// anything that may appear inside an element
        rule node() -> Option<Node>
            = e:element() { Some(Node::Element(e)) }
            / c:cdata() { Some(Node::Text(c)) }
            / comment() { None }
            / processing_instruction() { None }
            / t:chars() { Some(Node::Text(t)) }

        /// an element, self-closing or with content
        rule element() -> Element
            = "<" n:name() attrs:attributes() _ "/>" { Element::new(n, attrs, Vec::new()) }
            / "<" n:name() attrs:attributes() _ ">" children:node()* "</" close:name() _ ">" {?
                if close == n {
                    Ok(Element::new(n, attrs, children.into_iter().flatten().collect()))
                } else {
                    Err("matching closing tag")
                }
            }

        /// prolog and trailing noise around the root element
        rule misc()
            = comment() / processing_instruction() / doctype() / [' ' | '\n' | '\t' | '\r']

        /// parses a whole document and returns its root element
        pub rule document() -> Element
            = "\u{feff}"? misc()* root:element() misc()* ![_] { root }
    }
}

/// Parses a JUnit XML report into its root element.
pub fn parse_report(text: &str) -> Result<Element> {
    xml::document(text).map_err(|e| anyhow!("malformed XML at {}: expected {}", e.location, e.expected))
}

/// One failing or erroring test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    /// Test method name
    pub name:       String,
    /// Test class name
    pub classname:  String,
    /// Failure message attribute
    pub message:    String,
    /// Stack trace body, if any
    pub stacktrace: Option<String>,
}

impl std::fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}: {}", self.classname, self.name, self.message)
    }
}

/// Totals across every suite of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    /// Tests found
    pub total:    u32,
    /// Tests that passed
    pub passed:   u32,
    /// Failures plus errors
    pub failed:   u32,
    /// Skipped tests
    pub skipped:  u32,
    /// Details of every failing test case
    pub failures: Vec<FailureDetail>,
    /// Problems locating or reading reports
    pub errors:   Vec<String>,
}

impl ExecutionSummary {
    /// Adds one suite's counters. Errors count as failures. Counters
    /// saturate rather than wrap on absurd attribute values.
    pub fn add_suite(&mut self, total: u32, failures: u32, skipped: u32, errors: u32) {
        let failed = failures.saturating_add(errors);
        self.total = self.total.saturating_add(total);
        self.failed = self.failed.saturating_add(failed);
        self.skipped = self.skipped.saturating_add(skipped);
        self.passed = self
            .passed
            .saturating_add(total.saturating_sub(failed).saturating_sub(skipped));
    }

    /// Folds a parsed report (`<testsuites>` or a bare `<testsuite>`) into the
    /// summary. Nothing is added when any suite in the report is invalid.
    pub fn add_report(&mut self, root: &Element) -> Result<()> {
        let suites: Vec<&Element> = if root.name() == "testsuites" {
            root.elements_named("testsuite").collect()
        } else {
            vec![root]
        };

        let mut report = ExecutionSummary::default();
        for suite in suites {
            report.add_suite(
                count_attr(suite, "tests")?,
                count_attr(suite, "failures")?,
                count_attr(suite, "skipped")?,
                count_attr(suite, "errors")?,
            );

            for case in suite.elements_named("testcase") {
                let fault = case.first("failure").or_else(|| case.first("error"));
                if let Some(fault) = fault {
                    let trace = fault.text();
                    report.failures.push(FailureDetail {
                        name:       case.attr("name").unwrap_or("unknown").to_string(),
                        classname:  case.attr("classname").unwrap_or("unknown").to_string(),
                        message:    fault.attr("message").unwrap_or_default().to_string(),
                        stacktrace: (!trace.trim().is_empty()).then_some(trace),
                    });
                }
            }
        }

        self.merge(report);
        Ok(())
    }

    /// Adds another summary's counters, failures and errors to this one.
    pub fn merge(&mut self, other: ExecutionSummary) {
        self.total = self.total.saturating_add(other.total);
        self.passed = self.passed.saturating_add(other.passed);
        self.failed = self.failed.saturating_add(other.failed);
        self.skipped = self.skipped.saturating_add(other.skipped);
        self.failures.extend(other.failures);
        self.errors.extend(other.errors);
    }
}

/// Reads a non-negative counter attribute; absent means zero.
fn count_attr(suite: &Element, key: &str) -> Result<u32> {
    match suite.attr(key) {
        None => Ok(0),
        Some(value) => value
            .trim()
            .parse::<u32>()
            .with_context(|| format!("invalid `{key}` attribute `{value}`")),
    }
}

/// Collects the JUnit reports Gradle writes under `build/test-results/test`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestResultParser;

impl TestResultParser {
    /// Parses every report of `project`. Missing or broken reports are
    /// recorded in [`ExecutionSummary::errors`] rather than failing.
    pub fn parse_results(&self, project: &Path) -> ExecutionSummary {
        let report_dir = project.join("build").join("test-results").join("test");
        let mut summary = ExecutionSummary::default();

        if !report_dir.exists() {
            summary
                .errors
                .push(format!("Test report directory not found: {}", report_dir.display()));
            return summary;
        }

        let files = match find_files("xml", &report_dir) {
            Ok(files) => files,
            Err(e) => {
                summary.errors.push(format!("{e:#}"));
                return summary;
            }
        };

        if files.is_empty() {
            summary.errors.push("No test report XML files found".to_string());
            return summary;
        }

        for file in files {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| file.display().to_string());
            let parsed = std::fs::read_to_string(&file)
                .context("unreadable")
                .and_then(|text| parse_report(&text))
                .and_then(|root| summary.add_report(&root));
            if let Err(e) = parsed {
                tracing::debug!("Skipping report {}: {e:#}", file.display());
                summary.errors.push(format!("Error parsing {name}: {e:#}"));
            }
        }

        summary
    }
}
