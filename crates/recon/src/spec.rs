//! Pole specification strings: `"<height>[-<class>] [<species>]"`.
//!
//! Free text such as `"40 ft class 4 southern pine"` or `"45-3 SP"` is parsed
//! into components and rebuilt in canonical form. `normalize_spec` is
//! idempotent.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::config::{SpecTolerance, UnitHeuristic};
use crate::extract::scalar_text;
use crate::normalize::to_feet;

/// Plausible pole heights in feet. A bare leading number, or a number with
/// a height marker, is read as a height only inside this range.
const HEIGHT_FT: std::ops::RangeInclusive<u32> = 10..=200;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecComponents {
    pub height_ft: Option<u32>,
    pub pole_class: Option<String>,
    pub species: Option<String>,
}

impl SpecComponents {
    pub fn is_empty(&self) -> bool {
        self.height_ft.is_none() && self.pole_class.is_none() && self.species.is_none()
    }

    pub fn build(&self) -> Option<String> {
        build_spec_string(self.height_ft, self.pole_class.as_deref(), self.species.as_deref())
    }
}

fn height_class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,3})-([A-Z0-9]+)\b").expect("height-class pattern"))
}

fn height_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,3})\s*(?:FEET\b|FT\b|')").expect("height pattern"))
}

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:CLASS|CL)\s*([A-Z]?\d+[A-Z]?)\b").expect("class pattern")
    })
}

fn leading_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\b").expect("leading number pattern"))
}

/// A height marker with no number in front of it.
fn leading_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:FEET\b|FT\b|')").expect("leading marker pattern"))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn in_height_range(digits: &str) -> Option<u32> {
    digits.parse::<u32>().ok().filter(|h| HEIGHT_FT.contains(h))
}

/// First explicit height marker whose number is a plausible height.
fn find_height(work: &str) -> Option<(u32, std::ops::Range<usize>)> {
    height_re().captures_iter(work).find_map(|caps| {
        let height = in_height_range(caps.get(1)?.as_str())?;
        Some((height, caps.get(0)?.range()))
    })
}

/// Blank out `range` and re-collapse whitespace.
fn cut(work: &str, range: std::ops::Range<usize>) -> String {
    let mut out = work.to_string();
    out.replace_range(range, " ");
    collapse_whitespace(&out)
}

/// Remove everything that would parse as a height or class, plus stray
/// height markers at the front. Each removal shortens the text, so this
/// settles.
fn scrub_species(mut work: String) -> String {
    loop {
        let hit = height_class_re()
            .find(&work)
            .map(|m| m.range())
            .or_else(|| find_height(&work).map(|(_, range)| range))
            .or_else(|| class_re().find(&work).map(|m| m.range()))
            .or_else(|| leading_marker_re().find(&work).map(|m| m.range()));
        match hit {
            Some(range) => work = cut(&work, range),
            None => return work,
        }
    }
}

/// Split free text into height, class and species.
///
/// The leftover species never contains a height, a class or a leading height
/// marker, so rebuilding and re-parsing yields the same components.
pub fn parse_spec_components(text: &str) -> SpecComponents {
    let mut work = collapse_whitespace(&text.to_uppercase());
    let mut height_ft = None;
    let mut pole_class = None;

    let height_class = height_class_re().captures(&work).and_then(|caps| {
        Some((caps.get(1)?.as_str().to_string(), caps.get(2)?.as_str().to_string(), caps.get(0)?.range()))
    });
    if let Some((height, class, range)) = height_class {
        height_ft = height.parse::<u32>().ok();
        pole_class = Some(class);
        work = cut(&work, range);
    } else {
        if let Some((height, range)) = find_height(&work) {
            height_ft = Some(height);
            work = cut(&work, range);
        }
        let class = class_re()
            .captures(&work)
            .and_then(|caps| Some((caps.get(1)?.as_str().to_string(), caps.get(0)?.range())));
        if let Some((class, range)) = class {
            pole_class = Some(class);
            work = cut(&work, range);
        }
    }

    work = scrub_species(work);
    if height_ft.is_none() {
        let leading = leading_number_re()
            .captures(&work)
            .and_then(|caps| Some((in_height_range(caps.get(1)?.as_str())?, caps.get(0)?.range())));
        if let Some((height, range)) = leading {
            height_ft = Some(height);
            work = scrub_species(cut(&work, range));
        }
    }

    SpecComponents {
        height_ft,
        pole_class,
        species: (!work.is_empty()).then_some(work),
    }
}

/// Rebuild a canonical spec string. `None` when every component is missing.
pub fn build_spec_string(
    height_ft: Option<u32>,
    pole_class: Option<&str>,
    species: Option<&str>,
) -> Option<String> {
    let pole_class = pole_class.map(str::trim).filter(|c| !c.is_empty());
    let species = species.map(str::trim).filter(|s| !s.is_empty());

    let head = match (height_ft, pole_class) {
        (Some(h), Some(c)) => Some(format!("{h}-{c}")),
        (Some(h), None) => Some(h.to_string()),
        // Without a height the class needs its marker to survive a re-parse.
        (None, Some(c)) => Some(format!("CLASS {c}")),
        (None, None) => None,
    };

    match (head, species) {
        (Some(head), Some(s)) => Some(format!("{head} {s}")),
        (Some(head), None) => Some(head),
        (None, Some(s)) => Some(s.to_string()),
        (None, None) => None,
    }
}

/// Canonical spec string for free text; `None` for blank input.
pub fn normalize_spec(text: &str) -> Option<String> {
    let upper = text.trim().to_uppercase();
    if upper.is_empty() {
        return None;
    }
    parse_spec_components(&upper).build()
}

/// Compose a canonical spec from separate raw height / class / species values.
pub fn compose_spec(
    height: Option<&Value>,
    pole_class: Option<&Value>,
    species: Option<&Value>,
    units: &UnitHeuristic,
) -> Option<String> {
    let height_ft = height
        .and_then(|h| to_feet(h, units))
        .filter(|ft| *ft >= 0.0 && *ft <= u32::MAX as f64)
        .map(|ft| ft as u32);
    let pole_class = pole_class.and_then(scalar_text).and_then(|c| clean_class(&c));
    let species = species
        .and_then(scalar_text)
        .map(|s| s.trim().trim_end_matches('*').trim().to_uppercase());

    let built = build_spec_string(height_ft, pole_class.as_deref(), species.as_deref())?;
    normalize_spec(&built)
}

fn clean_class(raw: &str) -> Option<String> {
    let upper = raw.trim().to_uppercase();
    let stripped = upper
        .strip_prefix("CLASS")
        .or_else(|| upper.strip_prefix("CL"))
        .unwrap_or(&upper);
    let token: String = stripped.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    (!token.is_empty()).then_some(token)
}

/// Tolerant spec equality on height and class. Species is not compared.
pub fn specs_match(a: Option<&str>, b: Option<&str>, tolerance: &SpecTolerance) -> bool {
    let (a, b) = match (a, b) {
        (None, None) => return true,
        (Some(a), Some(b)) => (a, b),
        _ => return false,
    };

    let parse = |s: &str| {
        normalize_spec(s)
            .map(|n| parse_spec_components(&n))
            .unwrap_or_default()
    };
    let (pa, pb) = (parse(a), parse(b));

    let height_ok = match (pa.height_ft, pb.height_ft) {
        (Some(ha), Some(hb)) => (f64::from(ha) - f64::from(hb)).abs() <= tolerance.height_tolerance_ft,
        (None, None) => true,
        _ => false,
    };
    let class_ok = match (&pa.pole_class, &pb.pole_class) {
        (Some(ca), Some(cb)) => ca == cb,
        (None, None) => true,
        _ => false,
    };

    height_ok && class_ok
}
