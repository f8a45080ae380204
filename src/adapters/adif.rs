//! Minimal ADI reader: `<NAME:LEN[:TYPE]>value` items, `<EOH>` and `<EOR>` markers.
//!
//! Field lengths are counted in characters so UTF-8 values survive. Tags without a length
//! other than EOH/EOR (for example LoTW's `<APP_LoTW_EOF>`) are skipped.

use crate::domain::model::{AdifFile, AdifHeader, AdifRecord};
use crate::utils::error::{QslError, Result};

pub fn parse_adi(text: &str) -> Result<AdifFile> {
    let chars: Vec<char> = text.chars().collect();
    let mut file = AdifFile::default();
    let mut pending = AdifRecord::new();
    let mut preamble: Option<String> = None;
    let mut seen_header = false;
    let mut pos = 0;

    while pos < chars.len() {
        if chars[pos] != '<' {
            pos += 1;
            continue;
        }
        if preamble.is_none() {
            preamble = Some(chars[..pos].iter().collect());
        }

        let close = chars[pos..]
            .iter()
            .position(|&c| c == '>')
            .map(|offset| pos + offset)
            .ok_or_else(|| QslError::parse(format!("unclosed tag at offset {pos}")))?;
        let tag: String = chars[pos + 1..close].iter().collect();
        pos = close + 1;

        let mut parts = tag.splitn(3, ':');
        let name = parts.next().unwrap_or_default().trim();
        let Some(len) = parts.next() else {
            if name.eq_ignore_ascii_case("eoh") {
                if seen_header || !file.records.is_empty() {
                    return Err(QslError::parse("unexpected <EOH> after log entries"));
                }
                seen_header = true;
                file.header = AdifHeader {
                    preamble: preamble.clone().unwrap_or_default(),
                    fields: std::mem::take(&mut pending),
                };
            } else if name.eq_ignore_ascii_case("eor") && !pending.is_empty() {
                file.records.push(std::mem::take(&mut pending));
            }
            continue;
        };

        let len: usize = len
            .trim()
            .parse()
            .map_err(|_| QslError::parse(format!("bad length in tag <{tag}>")))?;
        let end = pos
            .checked_add(len)
            .filter(|end| *end <= chars.len())
            .ok_or_else(|| QslError::parse(format!("value of {name} runs past end of input")))?;
        let value: String = chars[pos..end].iter().collect();
        pos = end;

        let data_type = parts
            .next()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        pending.push(name, value, data_type);
    }

    if !pending.is_empty() {
        return Err(QslError::parse(format!(
            "{} field(s) after the last <EOR>",
            pending.len()
        )));
    }

    Ok(file)
}
