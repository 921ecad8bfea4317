//! DOCX text from the paragraphs of `word/document.xml`.

use std::io::{Cursor, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::ZipArchive;

use covenant_utils::{CovenantError, CovenantResult};

const DOCUMENT_PART: &str = "word/document.xml";

pub(super) fn read_text(data: &[u8]) -> CovenantResult<String> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| CovenantError::extraction(format!("not a DOCX package: {}", e)))?;

    let xml = {
        let mut part = archive
            .by_name(DOCUMENT_PART)
            .map_err(|e| CovenantError::extraction(format!("DOCX has no {}: {}", DOCUMENT_PART, e)))?;
        let mut xml = String::new();
        part.read_to_string(&mut xml)
            .map_err(|e| CovenantError::extraction(format!("failed to read {}: {}", DOCUMENT_PART, e)))?;
        xml
    };

    body_text(&xml)
}

fn is_page_break(element: &BytesStart) -> bool {
    element
        .attributes()
        .flatten()
        .any(|attr| attr.key.as_ref() == b"w:type" && attr.value.as_ref() == b"page")
}

/// Paragraphs end in newlines, table cells in tabs, explicit page breaks
/// become form feeds.
fn body_text(xml: &str) -> CovenantResult<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut text = String::new();
    let mut in_text = false;
    let mut cell_depth = 0usize;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:t" => in_text = true,
                b"w:tc" => cell_depth += 1,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" if is_page_break(&e) => text.push('\u{c}'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let chunk = e
                    .unescape()
                    .map_err(|err| CovenantError::extraction(format!("malformed DOCX text: {}", err)))?;
                text.push_str(&chunk);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" if cell_depth > 0 => text.push(' '),
                b"w:p" => text.push('\n'),
                b"w:tc" => {
                    cell_depth = cell_depth.saturating_sub(1);
                    text.push('\t');
                }
                b"w:tr" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(CovenantError::extraction(format!(
                    "malformed {} at byte {}: {}",
                    DOCUMENT_PART,
                    reader.buffer_position(),
                    e
                )))
            }
        }
        buf.clear();
    }

    Ok(text)
}
