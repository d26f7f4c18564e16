use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};

use super::DOCX_MAIN_PART;

/// Elements whose paragraphs are not body text: tables and text boxes.
const SKIPPED_CONTAINERS: &[&[u8]] = &[b"tbl", b"txbxContent"];

/// Body paragraphs of an OOXML word-processing package, joined with `\n`.
/// Table cells, text boxes, images and headers are not part of the result.
pub(super) fn extract_paragraphs(bytes: &[u8]) -> Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| format!("invalid OOXML package: {e}"))?;

    let mut xml = String::new();
    archive
        .by_name(DOCX_MAIN_PART)
        .map_err(|e| format!("missing {DOCX_MAIN_PART}: {e}"))?
        .read_to_string(&mut xml)
        .map_err(|e| format!("unreadable {DOCX_MAIN_PART}: {e}"))?;

    Ok(paragraphs_from_xml(&xml)?.join("\n"))
}

fn paragraphs_from_xml(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    let mut skip_depth = 0usize;
    let mut paragraph_depth = 0usize;
    let mut run_depth = 0usize;
    let mut in_text = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            format!(
                "malformed {DOCX_MAIN_PART} near byte {}: {e}",
                reader.buffer_position()
            )
        })?;

        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                name if SKIPPED_CONTAINERS.contains(&name) => skip_depth += 1,
                _ if skip_depth > 0 => {}
                b"p" => {
                    if paragraph_depth == 0 {
                        current.clear();
                    }
                    paragraph_depth += 1;
                }
                b"r" if paragraph_depth > 0 => run_depth += 1,
                b"t" if run_depth > 0 => in_text = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                name if SKIPPED_CONTAINERS.contains(&name) => {
                    skip_depth = skip_depth.saturating_sub(1)
                }
                _ if skip_depth > 0 => {}
                b"p" if paragraph_depth > 0 => {
                    paragraph_depth -= 1;
                    if paragraph_depth == 0 {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                }
                b"r" => run_depth = run_depth.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                _ if skip_depth > 0 => {}
                b"p" if paragraph_depth == 0 => paragraphs.push(String::new()),
                b"tab" if run_depth > 0 => current.push('\t'),
                b"br" | b"cr" if run_depth > 0 => current.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| format!("bad text in {DOCX_MAIN_PART}: {e}"))?;
                current.push_str(&text);
            }
            Event::CData(t) if in_text => {
                current.push_str(&String::from_utf8_lossy(&t));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}
