//! Primary Account Number detection.
//!
//! Streams a rolling digit buffer over the item, Luhn-checking every
//! candidate window and classifying hits against the card-brand table.
//! The Luhn mod-N routines follow Ben Hodgson's formulation.

use super::{Fields, Probe, Recorder};
use crate::config::Config;
use crate::errors::ScanError;
use crate::meta::Item;
use regex::Regex;
use std::io::BufRead;

pub const FORMAT: &str = "{filename}[{line}]: {company} {card_number_masked}";

/// Shortest and longest candidate windows considered.
const MIN_LEN: usize = 12;
const MAX_LEN: usize = 20;

/// Characters treated as in-number padding. Two in a row reset the buffer.
const DEFAULT_IGNORE: &[u8] = &[0x00, b'-', b':', b'\r', b'\n'];

/// Luhn sum of `digits` mod 10: digits indexed from the right, every
/// second one doubled and digit-summed.
fn luhn_sum(digits: &[u8]) -> u32 {
    digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            let d = u32::from(d);
            if i % 2 == 0 {
                d
            } else {
                let doubled = 2 * d;
                doubled / 10 + doubled % 10
            }
        })
        .sum::<u32>()
        % 10
}

/// True when `digits` ends in a valid Luhn check digit.
pub fn verify(digits: &[u8]) -> bool {
    luhn_sum(digits) == 0
}

/// Check digit which makes `digits` Luhn-valid when appended.
#[allow(dead_code)]
pub fn generate(digits: &[u8]) -> u8 {
    let mut padded = digits.to_vec();
    padded.push(0);
    let d = luhn_sum(&padded);
    if d == 0 {
        0
    } else {
        (10 - d) as u8
    }
}

/// Masks a card number for printing: last `keep` characters shown, the
/// rest replaced by `*`.
pub fn mask(card_number: &str, keep: usize) -> String {
    let total = card_number.chars().count();
    let hidden = total.saturating_sub(keep);
    let mut out = String::with_capacity(total);
    for (i, c) in card_number.chars().enumerate() {
        out.push(if i < hidden { '*' } else { c });
    }
    out
}

struct Brand {
    company: &'static str,
    lengths: &'static [usize],
    prefix: Regex,
}

fn brand(company: &'static str, lengths: &'static [usize], prefix: &str) -> Brand {
    Brand {
        company,
        lengths,
        prefix: Regex::new(prefix).expect("invalid brand prefix"),
    }
}

lazy_static! {
    static ref BRANDS: Vec<Brand> = {
        vec![
            brand("American Express", &[15], r"^3[47]"),
            brand("Diners Club EnRoute", &[15], r"^(?:2014|2149)"),
            brand("Diners Club Carte Blanche", &[14], r"^30[1-5]"),
            brand("Diners Club International", &[14], r"^36"),
            brand("Diners Club America", &[14], r"^5[45]"),
            brand("Discover", &[16], r"^6011"),
            brand("InstaPayment", &[16], r"^63[7-9]"),
            brand(
                "JCB",
                &[16],
                r"^(?:3088|3096|3112|3158|3337|352[89]|35[3-7][0-9]|358[0-9])",
            ),
            brand(
                "Laser",
                &[12, 13, 14, 15, 16, 17, 18, 19],
                r"^(?:6304|6706|6771|6709)",
            ),
            brand(
                "Maestro",
                &[12, 13, 14, 15, 16, 17, 18, 19],
                r"^(?:5018|5020|5038|5893|6304|6759|676[1-3]|0604)",
            ),
            brand("MasterCard", &[16], r"^5[1-5]"),
            brand("VISA", &[13, 16], r"^4"),
        ]
    };
}

/// First brand matching the candidate's length and prefix, in table order.
pub fn classify(card_number: &str) -> Option<&'static str> {
    let length = card_number.len();
    BRANDS
        .iter()
        .find(|b| b.lengths.contains(&length) && b.prefix.is_match(card_number))
        .map(|b| b.company)
}

pub struct Pan {
    ignore: Vec<u8>,
    /// Stop scanning an item after this many hits; 0 = unlimited.
    limit: usize,
}

impl Pan {
    pub fn new(config: &Config) -> Result<Self, ScanError> {
        let ignore = match config.get("probe:pan", "ignore") {
            None => DEFAULT_IGNORE.to_vec(),
            Some(_) => {
                let mut bytes = vec![];
                for code in config.getlist("probe:pan", "ignore") {
                    let byte = u8::from_str_radix(code.trim(), 16).map_err(|_| {
                        ScanError::BadOption(
                            "probe:pan".to_string(),
                            "ignore".to_string(),
                            code.clone(),
                        )
                    })?;
                    bytes.push(byte);
                }
                bytes
            }
        };
        let limit = match config.getint("probe:pan", "limit")? {
            Some(n) if n > 0 => n as usize,
            _ => 0,
        };
        Ok(Pan { ignore, limit })
    }

    fn scan_candidates(
        &self,
        digits: &mut Vec<u8>,
        text: &str,
        line: usize,
        item: &Item,
        rec: &mut Recorder,
        hits: &mut usize,
    ) -> Result<bool, ScanError> {
        for k in MIN_LEN..=digits.len().min(MAX_LEN) {
            let candidate = &digits[..k];
            if !verify(candidate) {
                continue;
            }
            let card_number: String = candidate.iter().map(|d| (d + b'0') as char).collect();
            let company = match classify(&card_number) {
                Some(company) => company,
                None => continue,
            };
            let mut fields = Fields::new();
            fields.insert("raw".to_string(), text.to_string());
            fields.insert("line".to_string(), line.to_string());
            fields.insert("card_number".to_string(), card_number.clone());
            fields.insert(
                "card_number_masked".to_string(),
                mask(&card_number, 4),
            );
            fields.insert("company".to_string(), company.to_string());
            rec.record(item, fields)?;
            // rotate: keep the tail so overlapping numbers still match
            digits.drain(..k);
            *hits += 1;
            if self.limit > 0 && *hits >= self.limit {
                debug!("pan probe hit limit of {} in {}", self.limit, item);
                return Ok(true);
            }
            break;
        }
        Ok(false)
    }
}

impl Probe for Pan {
    fn probe(&mut self, item: &Item, rec: &mut Recorder) -> Result<(), ScanError> {
        let mut reader = item.open()?;
        let mut digits: Vec<u8> = Vec::with_capacity(MAX_LEN + 1);
        let mut prev: u8 = 0x00;
        let mut line = 0usize;
        let mut hits = 0usize;
        let mut raw = Vec::new();
        loop {
            raw.clear();
            if reader.read_until(b'\n', &mut raw)? == 0 {
                return Ok(());
            }
            line += 1;
            let text = String::from_utf8_lossy(&raw).into_owned();
            for i in 0..raw.len() {
                let c = raw[i];
                if c.is_ascii_digit() {
                    digits.push(c - b'0');
                    if digits.len() > MAX_LEN {
                        digits.remove(0);
                    }
                    if digits.len() >= MIN_LEN
                        && self.scan_candidates(&mut digits, &text, line, item, rec, &mut hits)?
                    {
                        return Ok(());
                    }
                } else if self.ignore.contains(&c) {
                    // two successive separators bound a field
                    if self.ignore.contains(&prev) {
                        digits.clear();
                    }
                } else {
                    digits.clear();
                }
                prev = c;
            }
        }
    }
}
