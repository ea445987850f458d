/// Response parser: unstructured generation text in, validated set out.
///
/// Models wrap the structured block in prose, code fences, or both, so the
/// parser first locates a balanced JSON array (or lone object) inside the
/// text and only then deserializes. Validation is per entry: a malformed
/// entry is dropped with a recorded reason, never fatal to the rest.
/// Out-of-range ratings and non-positive price/year are dropped rather than
/// clamped, since clamping would silently change what the model said.
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::PipelineConfig;
use crate::error::ParseError;
use crate::model::{DropReason, RawGeneration, Recommendation, RecommendationSet, Warning};

pub struct ResponseParser {
    max_entries: usize,
    description_cap: usize,
}

impl ResponseParser {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            max_entries: config.max_recommendations,
            description_cap: config.description_cap,
        }
    }

    /// Parse a generation into a `RecommendationSet` plus warnings.
    ///
    /// Empty input short-circuits to an empty set with `NoContent`. A
    /// `ParseError` is returned only when non-empty input yields zero valid
    /// entries.
    pub fn parse(
        &self,
        raw: &RawGeneration,
    ) -> Result<(RecommendationSet, Vec<Warning>), ParseError> {
        let text = raw.text.trim();
        if text.is_empty() {
            return Ok((RecommendationSet::default(), vec![Warning::NoContent]));
        }

        let payload = extract_json_block(text).ok_or(ParseError { entries_seen: 0 })?;
        let value: Value =
            serde_json::from_str(payload).map_err(|_| ParseError { entries_seen: 0 })?;

        let entries = match value {
            Value::Array(entries) => entries,
            obj @ Value::Object(_) => vec![obj],
            _ => return Err(ParseError { entries_seen: 0 }),
        };
        let entries_seen = entries.len();

        let mut warnings = Vec::new();
        let mut items = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            match convert_entry(entry) {
                Ok(mut item) => {
                    if item.description.chars().count() > self.description_cap {
                        item.description =
                            item.description.chars().take(self.description_cap).collect();
                        warnings.push(Warning::DescriptionTruncated { index });
                    }
                    items.push(item);
                }
                Err(reason) => {
                    warn!(index, ?reason, "dropping recommendation entry");
                    warnings.push(Warning::EntryDropped { index, reason });
                }
            }
        }

        if items.is_empty() {
            return Err(ParseError { entries_seen });
        }

        if items.len() > self.max_entries {
            let dropped = items.len() - self.max_entries;
            items.truncate(self.max_entries);
            warnings.push(Warning::SetTruncated {
                kept: self.max_entries,
                dropped,
            });
        }

        Ok((RecommendationSet::new(items), warnings))
    }
}

/// Locate the structured block inside text that may carry surrounding prose.
/// Prefers a fenced ```json block; otherwise scans for the first balanced
/// array or object.
fn extract_json_block(text: &str) -> Option<&str> {
    let fence_re = Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("valid regex");
    if let Some(caps) = fence_re.captures(text) {
        let inner = caps.get(1)?.as_str().trim();
        if inner.starts_with('[') || inner.starts_with('{') {
            return scan_balanced(inner);
        }
    }
    scan_balanced(text)
}

/// Return the slice from the first `[` or `{` to its matching closer,
/// tracking string and escape state so brackets inside strings don't count.
fn scan_balanced(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn convert_entry(entry: &Value) -> Result<Recommendation, DropReason> {
    let obj = entry.as_object().ok_or_else(|| DropReason::Malformed {
        detail: "entry is not an object".to_string(),
    })?;

    let brand = required_string(obj, &["brand", "make"], "brand")?;
    let model = required_string(obj, &["model"], "model")?;

    let year_raw = required_integer(obj, &["year"], "year")?;
    if year_raw <= 0 {
        return Err(DropReason::NonPositive {
            field: "year".to_string(),
        });
    }
    let year = u16::try_from(year_raw).map_err(|_| DropReason::Malformed {
        detail: format!("year {year_raw} out of range"),
    })?;

    let price = required_number(obj, &["price"], "price")?;
    if !(price > 0.0) {
        return Err(DropReason::NonPositive {
            field: "price".to_string(),
        });
    }

    let maintenance_rating =
        required_rating(obj, &["maintenance_rating", "maintenance"], "maintenance_rating")?;
    let interior_rating = required_rating(obj, &["interior_rating", "interior"], "interior_rating")?;
    let general_rating =
        required_rating(obj, &["general_rating", "general", "overall_rating"], "general_rating")?;

    let interior_size = lookup(obj, &["interior_size"]).and_then(scalar_to_string);
    // Description is optional and defaults to empty; it is never invented.
    let description = lookup(obj, &["description"])
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    Ok(Recommendation {
        brand,
        model,
        year,
        price,
        interior_size,
        description,
        maintenance_rating,
        interior_rating,
        general_rating,
    })
}

fn lookup<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| obj.get(*name))
}

fn required_string(
    obj: &Map<String, Value>,
    names: &[&str],
    canonical: &str,
) -> Result<String, DropReason> {
    let value = lookup(obj, names).ok_or_else(|| DropReason::MissingField {
        field: canonical.to_string(),
    })?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| DropReason::Malformed {
            detail: format!("{canonical} is not a string"),
        })
}

fn required_integer(
    obj: &Map<String, Value>,
    names: &[&str],
    canonical: &str,
) -> Result<i64, DropReason> {
    let value = lookup(obj, names).ok_or_else(|| DropReason::MissingField {
        field: canonical.to_string(),
    })?;
    if let Some(n) = value.as_i64() {
        return Ok(n);
    }
    // Tolerate integer-valued floats like 8.0.
    if let Some(f) = value.as_f64() {
        if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
            return Ok(f as i64);
        }
    }
    Err(DropReason::Malformed {
        detail: format!("{canonical} is not an integer"),
    })
}

fn required_number(
    obj: &Map<String, Value>,
    names: &[&str],
    canonical: &str,
) -> Result<f64, DropReason> {
    let value = lookup(obj, names).ok_or_else(|| DropReason::MissingField {
        field: canonical.to_string(),
    })?;
    if let Some(f) = value.as_f64() {
        return Ok(f);
    }
    // Models occasionally quote numbers.
    if let Some(s) = value.as_str() {
        if let Ok(f) = s.trim().parse::<f64>() {
            return Ok(f);
        }
    }
    Err(DropReason::Malformed {
        detail: format!("{canonical} is not a number"),
    })
}

fn required_rating(
    obj: &Map<String, Value>,
    names: &[&str],
    canonical: &str,
) -> Result<u8, DropReason> {
    let value = required_integer(obj, names, canonical)?;
    if !(0..=10).contains(&value) {
        return Err(DropReason::RatingOutOfRange {
            field: canonical.to_string(),
            value,
        });
    }
    Ok(value as u8)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
