//! Column-name canonicalization.
//!
//! Callers hand us casual spellings ("onhand", "site", "Buyer") and the
//! actual header set of a relation. Each [`Source`] owns an ordered list of
//! [`AliasRule`]s; [`Canonicalizer::find`] tries, in order:
//!
//! 1. a case-insensitive match against the headers,
//! 2. the source's exact aliases, re-checked against the headers,
//! 3. semantic candidate lists for the aliased concept,
//! 4. fuzzy token sets for the aliased concept.
//!
//! [`Canonicalizer::resolve`] falls back to the requested name so callers can
//! report the missing column themselves.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::storage::Source;

/// One resolution rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasRule {
    /// Lower-cased alternate spelling mapped to a canonical column.
    ExactAlias {
        /// Alternate spelling.
        alias: &'static str,
        /// Canonical column name.
        canonical: &'static str,
    },
    /// Plausible header spellings for a concept, tried in order.
    SemanticCandidates {
        /// Names that denote the concept.
        concept: &'static [&'static str],
        /// Header spellings to look for.
        candidates: &'static [&'static str],
    },
    /// A header matches if it contains every token.
    FuzzyTokens {
        /// Names that denote the concept.
        concept: &'static [&'static str],
        /// Required substrings.
        tokens: &'static [&'static str],
    },
}

/// Ordered rules for one source.
#[derive(Debug, Clone, Default)]
pub struct SourceRules {
    rules: Vec<AliasRule>,
}

impl SourceRules {
    /// Empty rule list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends exact aliases.
    pub fn aliases(mut self, pairs: &[(&'static str, &'static str)]) -> Self {
        self.rules
            .extend(pairs.iter().map(|&(alias, canonical)| AliasRule::ExactAlias { alias, canonical }));
        self
    }

    /// Appends a semantic candidate list.
    pub fn semantic(
        mut self,
        concept: &'static [&'static str],
        candidates: &'static [&'static str],
    ) -> Self {
        self.rules.push(AliasRule::SemanticCandidates {
            concept,
            candidates,
        });
        self
    }

    /// Appends a fuzzy token set.
    pub fn fuzzy(mut self, concept: &'static [&'static str], tokens: &'static [&'static str]) -> Self {
        self.rules.push(AliasRule::FuzzyTokens { concept, tokens });
        self
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[AliasRule] {
        &self.rules
    }

    /// Canonical name for an alias, matching lower-case and separator-free forms.
    pub fn alias(&self, name: &str) -> Option<&'static str> {
        let lower = name.trim().to_lowercase();
        let compact = compact(&lower);
        let lookup = |key: &str| {
            self.rules.iter().find_map(|rule| match rule {
                AliasRule::ExactAlias { alias, canonical } if *alias == key => Some(*canonical),
                _ => None,
            })
        };
        lookup(&lower).or_else(|| lookup(&compact))
    }

    fn semantic_match(&self, concept: &str, columns: &[String]) -> Option<String> {
        self.rules.iter().find_map(|rule| match rule {
            AliasRule::SemanticCandidates {
                concept: names,
                candidates,
            } if names.contains(&concept) => candidates
                .iter()
                .find_map(|candidate| match_ignore_case(columns, candidate)),
            _ => None,
        })
    }

    fn fuzzy_match(&self, concept: &str, columns: &[String]) -> Option<String> {
        self.rules.iter().find_map(|rule| match rule {
            AliasRule::FuzzyTokens {
                concept: names,
                tokens,
            } if names.contains(&concept) => columns
                .iter()
                .find(|column| {
                    let lower = column.to_lowercase();
                    tokens.iter().all(|token| lower.contains(token))
                })
                .cloned(),
            _ => None,
        })
    }
}

/// Registry of per-source rules.
#[derive(Debug, Clone, Default)]
pub struct Canonicalizer {
    sources: HashMap<Source, SourceRules>,
}

/// Process-wide canonicalizer with the built-in dataset rules.
pub fn canonicalizer() -> &'static Canonicalizer {
    static STANDARD: OnceLock<Canonicalizer> = OnceLock::new();
    STANDARD.get_or_init(Canonicalizer::standard)
}

impl Canonicalizer {
    /// Builds a canonicalizer from explicit rules.
    pub fn with_rules(sources: HashMap<Source, SourceRules>) -> Self {
        Self { sources }
    }

    /// Rules for a source, if any.
    pub fn rules(&self, source: Source) -> Option<&SourceRules> {
        self.sources.get(&source)
    }

    /// Applies only the alias table; unknown names pass through unchanged.
    pub fn alias(&self, source: Option<Source>, name: &str) -> String {
        source
            .and_then(|s| self.sources.get(&s))
            .and_then(|rules| rules.alias(name))
            .map_or_else(|| name.to_string(), str::to_string)
    }

    /// Resolves `desired` to a header present in `columns`.
    pub fn find(&self, source: Option<Source>, columns: &[String], desired: &str) -> Option<String> {
        let desired = desired.trim();
        if desired.is_empty() {
            return None;
        }
        if let Some(hit) = match_ignore_case(columns, desired) {
            return Some(hit);
        }
        let rules = source.and_then(|s| self.sources.get(&s))?;
        let aliased = rules
            .alias(desired)
            .map_or_else(|| desired.to_lowercase(), str::to_string);
        if let Some(hit) = match_ignore_case(columns, &aliased) {
            return Some(hit);
        }
        let concept = aliased.to_lowercase();
        rules
            .semantic_match(&concept, columns)
            .or_else(|| rules.fuzzy_match(&concept, columns))
    }

    /// Like [`Canonicalizer::find`] but returns `desired` unchanged on a miss.
    pub fn resolve(&self, source: Option<Source>, columns: &[String], desired: &str) -> String {
        self.find(source, columns, desired)
            .unwrap_or_else(|| desired.to_string())
    }

    /// Resolves every name, collecting the ones that stayed unresolved.
    pub fn resolve_all(
        &self,
        source: Option<Source>,
        columns: &[String],
        desired: &[String],
    ) -> (Vec<String>, Vec<String>) {
        let mut resolved = Vec::with_capacity(desired.len());
        let mut missing = Vec::new();
        for name in desired {
            match self.find(source, columns, name) {
                Some(hit) => resolved.push(hit),
                None => {
                    missing.push(name.clone());
                    resolved.push(name.clone());
                }
            }
        }
        (resolved, missing)
    }

    /// Header renames bringing inventory quantity columns onto
    /// `onhand_qty` / `available_qty`. Empty for other sources.
    pub fn quantity_renames(&self, source: Option<Source>, columns: &[String]) -> Vec<(String, String)> {
        if source != Some(Source::Onhand) {
            return Vec::new();
        }
        let Some(rules) = self.sources.get(&Source::Onhand) else {
            return Vec::new();
        };
        let mut renames: Vec<(String, String)> = Vec::new();
        for canonical in [ONHAND_QTY, AVAILABLE_QTY] {
            let hit = rules
                .semantic_match(canonical, columns)
                .or_else(|| rules.fuzzy_match(canonical, columns));
            let Some(hit) = hit else {
                continue;
            };
            if hit == canonical || renames.iter().any(|(from, _)| *from == hit) {
                continue;
            }
            if columns.iter().any(|c| c == canonical) {
                continue;
            }
            renames.push((hit, canonical.to_string()));
        }
        renames
    }

    fn standard() -> Self {
        let org: &[(&str, &str)] = &[
            ("site", "organization_id"),
            ("site_code", "organization_id"),
            ("site_id", "organization_id"),
            ("org", "organization_id"),
            ("org_id", "organization_id"),
            ("organization", "organization_id"),
        ];
        let item: &[(&str, &str)] = &[("item_id", "item"), ("sku", "item")];
        let lpn: &[(&str, &str)] = &[
            ("lpnid", "lpn_number"),
            ("lpn_no", "lpn_number"),
            ("lpn", "lpn_number"),
        ];
        let serials: &[(&str, &str)] = &[
            ("serial", "serial_number"),
            ("sn", "serial_number"),
            ("delivery_detail", "delivery_detail_id"),
            ("delivery", "delivery_number"),
        ];

        let mut sources = HashMap::new();
        sources.insert(
            Source::Onhand,
            SourceRules::new()
                .aliases(item)
                .aliases(org)
                .aliases(&[
                    ("onhand", "onhand_qty"),
                    ("on_hand", "onhand_qty"),
                    ("on hand", "onhand_qty"),
                    ("onhand quantity", "onhand_qty"),
                    ("available", "available_qty"),
                    ("availableqty", "available_qty"),
                    ("available quantity", "available_qty"),
                    ("reserved", "reserved_qty"),
                    ("reservedqty", "reserved_qty"),
                    ("reserved qty", "reserved_qty"),
                    ("reserved quantity", "reserved_qty"),
                    ("subinv", "subinventory_code"),
                    ("subinventory", "subinventory_code"),
                    ("locator", "locator_code"),
                    ("serial", "serial_number"),
                    ("last_update", "last_update_date"),
                    ("last_updated", "last_update_date"),
                ])
                .semantic(
                    &["onhand_qty", "onhand"],
                    &[
                        "onhand_qty",
                        "on_hand_qty",
                        "on_hand",
                        "onhand",
                        "qty_on_hand",
                        "onhandquantity",
                        "on_hand_quantity",
                        "total_onhand_qty",
                        "total_on_hand",
                        "total_on_hand_qty",
                    ],
                )
                .semantic(
                    &["available_qty", "available"],
                    &[
                        "available_qty",
                        "available_quantity",
                        "available",
                        "qty_available",
                        "availableqty",
                        "total_available_qty",
                        "total_available",
                    ],
                )
                .semantic(
                    &["organization_id", "site", "org", "org_id"],
                    &["organization_id", "org_id", "site", "site_code", "org", "site_id"],
                )
                .semantic(
                    &["item", "sku", "item_id"],
                    &["item", "sku", "item_id", "item number", "item_number"],
                )
                .semantic(
                    &["reserved_qty", "reserved"],
                    &["reserved_qty", "reservedquantity", "reserved qty", "reserved", "reserved-qty"],
                )
                .fuzzy(&["onhand_qty", "onhand"], &["on", "hand"])
                .fuzzy(&["onhand_qty", "onhand"], &["onhand"])
                .fuzzy(&["available_qty", "available"], &["avail"])
                .fuzzy(&["available_qty", "available"], &["available"]),
        );
        sources.insert(
            Source::Po,
            SourceRules::new().aliases(item).aliases(org).aliases(&[
                ("po", "po_number"),
                ("po_no", "po_number"),
                ("poid", "po_number"),
                ("vendor", "vendor_name"),
                ("supplier", "vendor_name"),
                ("supplier_name", "vendor_name"),
                ("eta", "promised_date"),
                ("eta_date", "promised_date"),
                ("needby", "need_by_date"),
                ("need_by", "need_by_date"),
                ("status", "po_status"),
                ("buyer", "buyer_user_id"),
            ]),
        );
        sources.insert(
            Source::Ir,
            SourceRules::new().aliases(item).aliases(org).aliases(&[
                ("po", "po_number"),
                ("po_no", "po_number"),
                ("so", "so_number"),
                ("so_no", "so_number"),
                ("status", "req_status"),
                ("needby", "need_by_date"),
                ("need_by", "need_by_date"),
            ]),
        );
        sources.insert(
            Source::So,
            SourceRules::new().aliases(item).aliases(org).aliases(&[
                ("so", "so_number"),
                ("so_no", "so_number"),
                ("customer", "customer_or_site_name"),
                ("customer_name", "customer_or_site_name"),
                ("status", "delivery_status"),
                ("tracking", "tracking_number"),
                ("carrier", "carrier_name"),
                ("requested_qty", "requested_quantity"),
                ("shipped_qty", "shipped_quantity"),
                ("from_site", "ship_from_location_id"),
                ("to_site", "ship_to_location_id"),
            ]),
        );
        sources.insert(
            Source::Lpn,
            SourceRules::new().aliases(item).aliases(org).aliases(lpn).aliases(&[
                ("status", "delivery_status"),
                ("customer", "customer_or_site_name"),
                ("from_site", "ship_from_location_id"),
                ("to_site", "ship_to_location_id"),
                ("delivery_detail", "delivery_detail_id"),
            ]),
        );
        sources.insert(
            Source::LpnSerials,
            SourceRules::new().aliases(lpn).aliases(serials),
        );
        sources.insert(
            Source::LpnSerialsAgg,
            SourceRules::new().aliases(lpn).aliases(serials).aliases(&[
                ("serials", "serials_csv"),
                ("serial_count_total", "serial_count"),
                ("asset_tag", "asset_tags"),
            ]),
        );
        Self { sources }
    }
}

/// Canonical on-hand quantity column.
pub const ONHAND_QTY: &str = "onhand_qty";
/// Canonical available quantity column.
pub const AVAILABLE_QTY: &str = "available_qty";

fn match_ignore_case(columns: &[String], wanted: &str) -> Option<String> {
    let wanted = wanted.to_lowercase();
    columns
        .iter()
        .find(|column| column.to_lowercase() == wanted)
        .cloned()
}

fn compact(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .collect()
}
