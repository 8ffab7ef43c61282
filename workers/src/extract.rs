//! Text extraction for binary document formats.
//!
//! PDF goes through `pdf-extract`. DOCX and PPTX are OOXML zip archives; the
//! text runs (`w:t` in `word/document.xml`, `a:t` in `ppt/slides/slideN.xml`)
//! are pulled out with `quick-xml`. Archive entries are read with a size cap
//! so a crafted file cannot balloon memory.

use std::io::{Cursor, Read};
use std::panic::{self, AssertUnwindSafe};

use quick_xml::events::Event;
use quick_xml::Reader;

use parley_core::{ParleyError, Result};

/// Largest XML entry read out of an OOXML archive (50 MiB)
pub const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCX_BODY: &str = "word/document.xml";
const PPTX_SLIDE_PREFIX: &str = "ppt/slides/slide";

/// Extracts text from an in-memory document of the given (normalized) type.
pub fn extract_text(file_type: &str, bytes: &[u8]) -> Result<String> {
    match file_type {
        "pdf" => extract_pdf(bytes),
        "docx" => extract_docx(bytes),
        "pptx" => extract_pptx(bytes),
        other => Err(ParleyError::Validation(format!(
            "No extractor for file type '{other}'"
        ))),
    }
}

// pdf-extract panics on some malformed inputs; those become validation errors too
fn extract_pdf(bytes: &[u8]) -> Result<String> {
    match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes))) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ParleyError::Validation(format!("Could not read PDF: {e}"))),
        Err(_) => Err(ParleyError::Validation(
            "Could not read PDF: extractor panicked".to_string(),
        )),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry_bounded(&mut archive, DOCX_BODY, MAX_XML_ENTRY_BYTES)?;
    text_runs(&xml)
}

fn extract_pptx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
        .collect();
    slides.sort();

    let mut out = String::new();
    for (_, name) in slides {
        let xml = read_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let text = text_runs(&xml)?;
        if !out.is_empty() && !text.is_empty() {
            out.push('\n');
        }
        out.push_str(&text);
    }
    Ok(out)
}

// "ppt/slides/slide12.xml" -> 12; anything else (rels, layouts) -> None
fn slide_number(name: &str) -> Option<u32> {
    name.strip_prefix(PPTX_SLIDE_PREFIX)?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

fn open_archive(bytes: &[u8]) -> Result<zip::ZipArchive<Cursor<&[u8]>>> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ParleyError::Validation(format!("Could not open document archive: {e}")))
}

fn read_entry_bounded(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ParleyError::Validation(format!("Archive entry {name}: {e}")))?;
    let mut out = Vec::new();
    entry.take(max_bytes).read_to_end(&mut out)?;
    if out.len() as u64 >= max_bytes {
        return Err(ParleyError::Validation(format!(
            "Archive entry {name} exceeds size limit ({max_bytes} bytes)"
        )));
    }
    Ok(out)
}

/// Collects the contents of every `<*:t>` element; paragraphs become lines.
fn text_runs(xml: &[u8]) -> Result<String> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut out = String::new();
    let mut in_text = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if !out.is_empty() && !out.ends_with('\n') => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ParleyError::Validation(format!("Malformed document XML: {e}")))?;
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push(' ');
                }
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParleyError::Validation(format!(
                    "Malformed document XML: {e}"
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}
