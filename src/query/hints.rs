//! Lightweight phrase parsers over the raw question text.
//!
//! Each parser is a pure function returning `None` when the phrase is absent.
//! The planner layers these beneath structured hints; they never invent
//! filters.

use std::sync::OnceLock;

use regex::Regex;

/// `sort by <column> [asc|desc]` hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortHint {
    /// Column phrase, mapped through sort synonyms.
    pub column: String,
    /// Direction when the phrase states one.
    pub ascending: Option<bool>,
}

/// `top N` / `first N` / `last N` / `limit N` hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopKHint {
    /// Row count.
    pub k: usize,
    /// Direction implied by the wording; `None` for `limit`.
    pub ascending: Option<bool>,
}

const STOP_WORDS: &[&str] = &[
    "for", "in", "where", "with", "and", "then", "limit", "top", "first", "last", "at", "from",
    "per", "showing", "only", "please", "but", "by", "sorted", "sort", "order", "ordered",
];

const SORT_SYNONYMS: &[(&str, &str)] = &[
    ("available", "available_qty"),
    ("available qty", "available_qty"),
    ("available quantity", "available_qty"),
    ("availability", "available_qty"),
    ("onhand", "onhand_qty"),
    ("on hand", "onhand_qty"),
    ("on-hand", "onhand_qty"),
    ("onhand qty", "onhand_qty"),
    ("on hand qty", "onhand_qty"),
    ("onhand quantity", "onhand_qty"),
    ("on hand quantity", "onhand_qty"),
    ("reserved", "reserved_qty"),
    ("reserved qty", "reserved_qty"),
    ("reserved quantity", "reserved_qty"),
    ("site", "organization_id"),
    ("org", "organization_id"),
    ("organization", "organization_id"),
];

fn regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Maps a casual sort phrase to its canonical column spelling.
pub fn sort_synonym(phrase: &str) -> String {
    let lower = phrase.trim().to_lowercase();
    let folded = lower.split_whitespace().collect::<Vec<_>>().join(" ");
    SORT_SYNONYMS
        .iter()
        .find(|(alias, _)| *alias == folded || alias.replace(' ', "_") == folded)
        .map_or_else(|| folded.replace(' ', "_"), |(_, canonical)| canonical.to_string())
}

/// Reads an order word (`asc`, `ascending`, `desc`, `descending`).
pub fn order_direction(word: &str) -> Option<bool> {
    match word.trim().to_ascii_lowercase().as_str() {
        "asc" | "ascending" => Some(true),
        "desc" | "descending" => Some(false),
        _ => None,
    }
}

/// Splits a trailing order qualifier (`"qty desc"`, `"qty ascending order"`)
/// off a column phrase.
pub fn split_order_suffix(text: &str) -> (String, Option<bool>) {
    let mut words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > 1 && words.last().is_some_and(|w| w.eq_ignore_ascii_case("order")) {
        words.pop();
    }
    let direction = match words.last() {
        Some(last) if words.len() > 1 => order_direction(last),
        _ => None,
    };
    if direction.is_some() {
        words.pop();
    }
    (words.join(" "), direction)
}

/// Parses "sorted by X [asc|desc]" and "by X asc|desc".
///
/// "purchase order by X" names a document, not an ordering.
pub fn parse_sort(question: &str) -> Option<SortHint> {
    static EXPLICIT: OnceLock<Option<Regex>> = OnceLock::new();
    static TRAILING: OnceLock<Option<Regex>> = OnceLock::new();
    let text = question.to_lowercase();
    let explicit = regex(&EXPLICIT, r"\b(sorted|sort|ordered|order)\s+by\s+")
        .and_then(|re| {
            re.captures_iter(&text).find(|caps| {
                caps.get(1).is_some_and(|verb| {
                    verb.as_str() != "order" || !follows_purchase(&text, verb.start())
                })
            })
        })
        .and_then(|caps| caps.get(0))
        .map(|head| {
            let rest = &text[head.end()..];
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-')))
                .unwrap_or(rest.len());
            rest[..end].to_string()
        });
    let phrase = match explicit {
        Some(phrase) => phrase,
        None => regex(
            &TRAILING,
            r"\bby\s+([a-z0-9 _\-]+?\s+(?:ascending|descending|asc|desc))\b",
        )
        .and_then(|re| re.captures(&text))?
        .get(1)?
        .as_str()
        .to_string(),
    };

    let mut column_words: Vec<&str> = Vec::new();
    let mut ascending = None;
    for word in phrase.split_whitespace() {
        if let Some(direction) = order_direction(word) {
            ascending = Some(direction);
            break;
        }
        if STOP_WORDS.contains(&word) {
            break;
        }
        column_words.push(word);
    }
    if column_words.is_empty() {
        return None;
    }
    Some(SortHint {
        column: sort_synonym(&column_words.join(" ")),
        ascending,
    })
}

/// Parses "top 5", "top-5", "top5", "first 10", "last 3", "limit 20".
pub fn parse_topk(question: &str) -> Option<TopKHint> {
    static TOP: OnceLock<Option<Regex>> = OnceLock::new();
    static FIRST: OnceLock<Option<Regex>> = OnceLock::new();
    static LAST: OnceLock<Option<Regex>> = OnceLock::new();
    static LIMIT: OnceLock<Option<Regex>> = OnceLock::new();
    let text = question.to_lowercase();
    let patterns: [(&'static OnceLock<Option<Regex>>, &str, Option<bool>); 4] = [
        (&TOP, r"\btop[-\s]?(\d+)\b", Some(false)),
        (&FIRST, r"\bfirst\s+(\d+)\b", Some(true)),
        (&LAST, r"\blast\s+(\d+)\b", Some(false)),
        (&LIMIT, r"\blimit\s+(\d+)\b", None),
    ];
    patterns.into_iter().find_map(|(cell, pattern, ascending)| {
        let caps = regex(cell, pattern)?.captures(&text)?;
        let k = caps.get(1)?.as_str().parse::<usize>().ok()?;
        (k > 0).then_some(TopKHint { k, ascending })
    })
}

/// Extracts the phrase after a grouping "by" ("count POs by buyer"),
/// ignoring "sorted by" / "order by".
pub fn parse_group_by(question: &str) -> Option<String> {
    static BY: OnceLock<Option<Regex>> = OnceLock::new();
    let text = question.to_lowercase();
    let re = regex(&BY, r"(?:\b([a-z]+)\s+)?\bby\s+([a-z0-9_\- ]+)")?;
    re.captures_iter(&text).find_map(|caps| {
        let prefix = caps.get(1);
        let is_sort = prefix.is_some_and(|word| match word.as_str() {
            "sort" | "sorted" | "ordered" => true,
            "order" => !follows_purchase(&text, word.start()),
            _ => false,
        });
        if is_sort {
            return None;
        }
        let mut words: Vec<&str> = Vec::new();
        for word in caps.get(2)?.as_str().split_whitespace() {
            // "by X desc" is a sort phrase
            if order_direction(word).is_some() {
                return None;
            }
            if STOP_WORDS.contains(&word) || words.len() == 3 {
                break;
            }
            if !matches!(word, "quantity" | "the" | "each") {
                words.push(word);
            }
        }
        (!words.is_empty()).then(|| words.join(" "))
    })
}

fn follows_purchase(text: &str, at: usize) -> bool {
    text[..at].trim_end().ends_with("purchase")
}

/// True when the question asks for totals or a per-site breakdown.
pub fn wants_aggregate(question: &str) -> bool {
    let text = question.to_lowercase();
    ["by site", "by org", "by organization", "group", "sum", "total"]
        .iter()
        .any(|needle| text.contains(needle))
}

/// True for "distinct" / "unique" / "list" phrasing.
pub fn wants_distinct(question: &str) -> bool {
    let text = question.to_lowercase();
    text.split(|c: char| !c.is_alphanumeric())
        .any(|word| matches!(word, "distinct" | "unique" | "list"))
}

/// True for serial-count phrasing.
pub fn wants_serial_count(question: &str) -> bool {
    let text = question.to_lowercase();
    ["serial count", "count of serials", "serials count", "number of serials"]
        .iter()
        .any(|needle| text.contains(needle))
}

/// True for "below / under / less than safety stock".
pub fn mentions_below_safety_stock(question: &str) -> bool {
    let text = question.to_lowercase();
    text.contains("safety stock")
        && ["below", "under", "less than", "lower than"]
            .iter()
            .any(|needle| text.contains(needle))
}

/// True for "inventory vs open PO ... by item".
pub fn mentions_inventory_vs_open_po(question: &str) -> bool {
    let text = question.to_lowercase();
    ["inventory vs open po", "inventory versus open po", "inventory vs po"]
        .iter()
        .any(|needle| text.contains(needle))
        && text.contains("by item")
}

/// Guesses a source for exception questions without one.
pub fn infer_exception_source(question: &str) -> &'static str {
    static PO: OnceLock<Option<Regex>> = OnceLock::new();
    static SO: OnceLock<Option<Regex>> = OnceLock::new();
    let text = question.trim().to_lowercase();
    let mentions = |cell: &'static OnceLock<Option<Regex>>, pattern: &str| {
        regex(cell, pattern).is_some_and(|re| re.is_match(&text))
    };
    if mentions(&PO, r"\b(?:purchase|pos?)\b") {
        "PO"
    } else if mentions(&SO, r"\b(?:sales|sos?|delivery|deliveries|shipments?)\b") {
        "SO"
    } else {
        "ONHAND"
    }
}
