//! Plain-text extraction from uploaded bytes.
//!
//! Text-family files pass through after UTF-8 validation. HTML is parsed and
//! reduced to its visible text, PDFs go through `pdf-extract`, and DOCX
//! files are unzipped and their `word/document.xml` walked paragraph by
//! paragraph.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quire_core::{Error, Result};
use scraper::{ElementRef, Html};
use zip::ZipArchive;

/// File types whose bytes are already text.
pub const TEXT_TYPES: &[&str] = &[
  "txt", "md", "markdown", "csv", "tsv", "json", "log", "rst", "yaml", "yml", "xml",
];

const HTML_TYPES: &[&str] = &["html", "htm"];

/// Elements whose content is never visible text.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements that start a new line of text.
const BLOCK_ELEMENTS: &[&str] = &[
  "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt",
  "figcaption", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
  "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "td", "th",
  "title", "tr", "ul",
];

const DOCX_BODY: &str = "word/document.xml";

pub fn is_supported(file_type: &str) -> bool {
  let file_type = file_type.to_ascii_lowercase();
  TEXT_TYPES.contains(&file_type.as_str())
    || HTML_TYPES.contains(&file_type.as_str())
    || matches!(file_type.as_str(), "pdf" | "docx")
}

/// Extract the text content of `bytes` interpreted as `file_type`.
///
/// Fails with [`Error::Unsupported`] for types we cannot read and
/// [`Error::BadRequest`] for bytes that do not parse as the claimed type.
/// Parsing is CPU-bound; async callers should run this on a blocking thread.
pub fn extract_text(bytes: &[u8], file_type: &str) -> Result<String> {
  let file_type = file_type.to_ascii_lowercase();
  match file_type.as_str() {
    t if TEXT_TYPES.contains(&t) => utf8(bytes).map(str::to_owned),
    t if HTML_TYPES.contains(&t) => Ok(html_text(utf8(bytes)?)),
    "pdf" => pdf_text(bytes),
    "docx" => docx_text(bytes),
    _ => Err(Error::Unsupported(file_type)),
  }
}

fn utf8(bytes: &[u8]) -> Result<&str> {
  let text = std::str::from_utf8(bytes)
    .map_err(|e| Error::bad_request(format!("file is not valid UTF-8: {e}")))?;
  // A leading byte-order mark would end up in the first chunk.
  Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

// ─── HTML ────────────────────────────────────────────────────────────────────

fn html_text(source: &str) -> String {
  let document = Html::parse_document(source);
  let mut out = String::new();
  visible_text(document.root_element(), &mut out);
  normalize_lines(&out)
}

fn visible_text(element: ElementRef<'_>, out: &mut String) {
  for child in element.children() {
    if let Some(el) = ElementRef::wrap(child) {
      let name = el.value().name();
      if HIDDEN_ELEMENTS.contains(&name) {
        continue;
      }
      let block = BLOCK_ELEMENTS.contains(&name);
      if block {
        out.push('\n');
      }
      visible_text(el, out);
      if block {
        out.push('\n');
      }
    } else if let Some(text) = child.value().as_text() {
      out.push_str(text);
    }
  }
}

/// Collapse runs of whitespace within lines and drop blank lines.
fn normalize_lines(text: &str) -> String {
  text
    .lines()
    .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
    .filter(|line| !line.is_empty())
    .collect::<Vec<_>>()
    .join("\n")
}

// ─── PDF ─────────────────────────────────────────────────────────────────────

fn pdf_text(bytes: &[u8]) -> Result<String> {
  let text = pdf_extract::extract_text_from_mem(bytes)
    .map_err(|e| Error::bad_request(format!("error reading PDF file: {e}")))?;
  Ok(text.trim().to_owned())
}

// ─── DOCX ────────────────────────────────────────────────────────────────────

fn docx_text(bytes: &[u8]) -> Result<String> {
  let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(invalid_docx)?;
  let mut xml = String::new();
  archive
    .by_name(DOCX_BODY)
    .map_err(invalid_docx)?
    .read_to_string(&mut xml)
    .map_err(invalid_docx)?;

  let mut reader = quick_xml::Reader::from_str(&xml);
  let mut paragraphs: Vec<String> = Vec::new();
  let mut current = String::new();
  let mut in_text = false;

  loop {
    match reader.read_event().map_err(invalid_docx)? {
      Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
      Event::End(e) => match e.local_name().as_ref() {
        b"t" => in_text = false,
        b"p" => paragraphs.push(std::mem::take(&mut current)),
        _ => {}
      },
      Event::Empty(e) => match e.local_name().as_ref() {
        b"tab" => current.push('\t'),
        b"br" | b"cr" => current.push('\n'),
        _ => {}
      },
      Event::Text(t) if in_text => current.push_str(&t.unescape().map_err(invalid_docx)?),
      Event::Eof => break,
      _ => {}
    }
  }
  if !current.is_empty() {
    paragraphs.push(current);
  }

  Ok(paragraphs.join("\n").trim().to_owned())
}

fn invalid_docx(e: impl std::fmt::Display) -> Error {
  Error::bad_request(format!("error reading DOCX file: {e}"))
}
