//! Word 97-2003 text from the `WordDocument` stream.
//!
//! The piece table is not decoded. Printable runs are recovered from the
//! stream both as UTF-16LE (unicode pieces) and as 8-bit text (compressed
//! pieces), which is enough for the field extraction downstream.

use std::io::{Cursor, Read};

use covenant_utils::{CovenantError, CovenantResult};

const WORD_STREAM: &str = "WordDocument";
const MIN_RUN_CHARS: usize = 4;

pub(super) fn read_text(data: &[u8]) -> CovenantResult<String> {
    let mut compound = cfb::CompoundFile::open(Cursor::new(data))
        .map_err(|e| CovenantError::extraction(format!("not a Word 97-2003 document: {}", e)))?;

    let mut stream = compound
        .open_stream(WORD_STREAM)
        .map_err(|e| CovenantError::extraction(format!("document has no {} stream: {}", WORD_STREAM, e)))?;
    let mut bytes = Vec::new();
    stream
        .read_to_end(&mut bytes)
        .map_err(|e| CovenantError::extraction(format!("failed to read {} stream: {}", WORD_STREAM, e)))?;

    let wide = utf16_runs(&bytes);
    let narrow = ascii_runs(&bytes);
    Ok(if wide.trim().len() >= narrow.trim().len() { wide } else { narrow })
}

fn is_text_char(c: char) -> bool {
    !c.is_control() && ((c as u32) < 0x250 || (0x2000..=0x20CF).contains(&(c as u32)))
}

/// Word marks paragraph ends with `\r`, cell ends with 0x07 and page breaks
/// with 0x0C.
fn push_run(out: &mut String, run: &mut String) {
    if run.trim().chars().count() >= MIN_RUN_CHARS && run.chars().any(char::is_alphanumeric) {
        out.push_str(run.trim_end_matches(' '));
    }
    run.clear();
}

fn collect<I: Iterator<Item = char>>(chars: I) -> String {
    let mut out = String::new();
    let mut run = String::new();
    for c in chars {
        match c {
            '\r' | '\n' | '\u{7}' => {
                push_run(&mut out, &mut run);
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            '\u{c}' => {
                push_run(&mut out, &mut run);
                if !out.is_empty() {
                    out.push('\u{c}');
                }
            }
            '\t' => run.push('\t'),
            c if is_text_char(c) => run.push(c),
            _ => push_run(&mut out, &mut run),
        }
    }
    push_run(&mut out, &mut run);
    out
}

fn utf16_runs(bytes: &[u8]) -> String {
    let units = bytes.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
    collect(char::decode_utf16(units).map(|c| c.unwrap_or('\u{0}')))
}

fn ascii_runs(bytes: &[u8]) -> String {
    collect(bytes.iter().map(|&b| if b.is_ascii() { b as char } else { '\u{0}' }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn compound(stream: &[u8]) -> Vec<u8> {
        let mut comp = cfb::CompoundFile::create(Cursor::new(Vec::new())).unwrap();
        {
            let mut s = comp.create_stream(WORD_STREAM).unwrap();
            s.write_all(stream).unwrap();
        }
        comp.flush().unwrap();
        comp.into_inner().into_inner()
    }

    fn fib_then(text: &[u8]) -> Vec<u8> {
        // File information block header bytes precede the text.
        let mut stream = vec![0xEC, 0xA5, 0xC1, 0x00, 0x41, 0x00, 0x00, 0x00];
        stream.extend_from_slice(&[0u8; 24]);
        stream.extend_from_slice(text);
        stream
    }

    #[test]
    fn test_unicode_pieces() {
        let text: Vec<u8> = "MASTER SERVICES AGREEMENT\rContract Number: MSA-2024-001\r"
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect();
        let extracted = read_text(&compound(&fib_then(&text))).unwrap();

        let lines: Vec<&str> = extracted.lines().collect();
        assert_eq!(lines, vec!["MASTER SERVICES AGREEMENT", "Contract Number: MSA-2024-001"]);
    }

    #[test]
    fn test_compressed_pieces() {
        let extracted = read_text(&compound(&fib_then(b"INVOICE INV-7\x0cRemit to: Acme Billing\r"))).unwrap();
        assert!(extracted.starts_with("INVOICE INV-7"));
        assert!(extracted.contains("\u{c}Remit to: Acme Billing"));
    }

    #[test]
    fn test_short_noise_is_dropped() {
        assert_eq!(collect("ab\u{1}xy\u{1}Total 115.00\r".chars()), "Total 115.00\n");
    }

    #[test]
    fn test_not_a_compound_file() {
        let err = read_text(b"plain bytes, no container").unwrap_err();
        assert_eq!(err.error_code(), "EXTRACTION_ERROR");
    }
}
