//! Schema rules: decoding, token references and index/constraint pairing.
//!
//! Rules are decoded before the scan so the index set can be opened. Their
//! findings are held back and reported by the schema pass.

use hashbrown::HashMap;
use tracing::info;

use super::property::{check_owner_chain, resolve_values};
use super::CheckContext;
use crate::report::{Kind, RecordType};
use crate::schema::{ConstraintType, EntityType, IndexType, SchemaRule};
use crate::store::{Stores, TokenKind};
use crate::tokens::Tokens;

/// Decoded rules plus what was wrong with them.
#[derive(Debug, Clone, Default)]
pub struct SchemaAnalysis {
    /// Every decoded rule except later duplicates, ordered by id.
    pub rules: Vec<SchemaRule>,
    /// Findings on schema records, ordered by record id.
    pub findings: Vec<(u64, Kind)>,
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum RuleKey<'a> {
    Index {
        entity: EntityType,
        tokens: &'a [u32],
        properties: &'a [u32],
        index_type: IndexType,
        provider: &'a str,
    },
    Constraint {
        entity: EntityType,
        tokens: &'a [u32],
        properties: &'a [u32],
        constraint_type: ConstraintType,
    },
}

impl<'a> RuleKey<'a> {
    fn of(rule: &'a SchemaRule) -> Self {
        match rule {
            SchemaRule::Index(index) => Self::Index {
                entity: index.entity,
                tokens: &index.tokens,
                properties: &index.properties,
                index_type: index.index_type,
                provider: &index.provider,
            },
            SchemaRule::Constraint(constraint) => Self::Constraint {
                entity: constraint.entity,
                tokens: &constraint.tokens,
                properties: &constraint.properties,
                constraint_type: constraint.constraint_type,
            },
        }
    }
}

/// Decodes every schema record and cross-checks the rules. Reports nothing.
#[must_use]
pub fn analyze_schema(stores: &Stores, tokens: &Tokens) -> SchemaAnalysis {
    let keys = &tokens.property_keys;
    let mut findings = Vec::new();
    let mut parsed = Vec::new();
    for record in stores.schema.scan() {
        if !record.in_use {
            continue;
        }
        let values = resolve_values(stores, keys, record.next_prop);
        match SchemaRule::parse(record.id, &values, keys) {
            Ok(rule) => parsed.push(rule),
            Err(malformed) => findings.push((
                record.id,
                Kind::SchemaMalformed {
                    reason: malformed.0,
                },
            )),
        }
    }

    for rule in &parsed {
        check_rule_tokens(rule, tokens, &mut findings);
    }

    let duplicates = duplicate_rules(&parsed, &mut findings);
    check_pairing(&parsed, &mut findings);

    findings.sort_by_key(|(id, _)| *id);
    let rules: Vec<SchemaRule> = parsed
        .into_iter()
        .filter(|rule| !duplicates.contains(&rule.id()))
        .collect();
    info!(rules = rules.len(), findings = findings.len(), "analyzed schema");
    SchemaAnalysis { rules, findings }
}

/// Ids of rules that repeat an earlier rule's key.
fn duplicate_rules(rules: &[SchemaRule], findings: &mut Vec<(u64, Kind)>) -> Vec<u64> {
    let mut first_with_key = HashMap::new();
    let mut duplicates = Vec::new();
    for rule in rules {
        if let Some(&other) = first_with_key.get(&RuleKey::of(rule)) {
            findings.push((rule.id(), Kind::SchemaDuplicate { other }));
            duplicates.push(rule.id());
        } else {
            first_with_key.insert(RuleKey::of(rule), rule.id());
        }
    }
    duplicates
}

fn check_rule_tokens(rule: &SchemaRule, tokens: &Tokens, findings: &mut Vec<(u64, Kind)>) {
    let (entity, schema_tokens, properties) = match rule {
        SchemaRule::Index(index) => (index.entity, &index.tokens, &index.properties),
        SchemaRule::Constraint(c) => (c.entity, &c.tokens, &c.properties),
    };
    let kind = match entity {
        EntityType::Node => TokenKind::Label,
        EntityType::Relationship => TokenKind::RelationshipType,
    };
    let checks = schema_tokens
        .iter()
        .map(|&token| (kind, token))
        .chain(properties.iter().map(|&key| (TokenKind::PropertyKey, key)));
    for (kind, token) in checks {
        if !tokens.table(kind).in_use(token) {
            findings.push((rule.id(), Kind::SchemaTokenNotInUse { kind, token }));
        }
    }
}

/// Constraint-backing indexes and their constraints must reference each
/// other, and no two constraints may claim the same index.
fn check_pairing(rules: &[SchemaRule], findings: &mut Vec<(u64, Kind)>) {
    let by_id: HashMap<u64, &SchemaRule> = rules.iter().map(|rule| (rule.id(), rule)).collect();
    let mut claimed: HashMap<u64, u64> = HashMap::new();
    for rule in rules {
        match rule {
            SchemaRule::Index(index) => {
                let Some(constraint) = index.owning_constraint else {
                    continue;
                };
                match by_id.get(&constraint) {
                    Some(SchemaRule::Constraint(owner)) if owner.owned_index == Some(index.id) => {}
                    Some(SchemaRule::Constraint(_)) => {
                        let kind = Kind::IndexOwnerDoesNotReferenceBack { constraint };
                        findings.push((index.id, kind));
                    }
                    _ => findings.push((index.id, Kind::IndexOwnerMissing { constraint })),
                }
            }
            SchemaRule::Constraint(constraint) => {
                let Some(owned) = constraint.owned_index else {
                    if constraint.constraint_type == ConstraintType::Unique {
                        findings.push((constraint.id, Kind::ConstraintMissingObligation));
                    }
                    continue;
                };
                let Some(SchemaRule::Index(index)) = by_id.get(&owned) else {
                    findings.push((constraint.id, Kind::ConstraintIndexMissing { index: owned }));
                    continue;
                };
                if index.owning_constraint != Some(constraint.id) {
                    findings.push((
                        constraint.id,
                        Kind::ConstraintIndexDoesNotReferenceBack { index: owned },
                    ));
                }
                if index.index_type != IndexType::Range {
                    findings.push((constraint.id, Kind::ConstraintIndexNotRange { index: owned }));
                }
                if let Some(&other) = claimed.get(&owned) {
                    findings.push((constraint.id, Kind::ConstraintDuplicateObligation { other }));
                } else {
                    claimed.insert(owned, constraint.id);
                }
            }
        }
    }
}

/// Reports the schema findings and walks the property chain of every rule.
pub fn schema_pass(ctx: &CheckContext<'_>, analysis: &SchemaAnalysis) {
    for (id, kind) in &analysis.findings {
        ctx.graph(RecordType::Schema, *id, kind.clone());
    }
    for record in ctx.stores.schema.scan() {
        if ctx.reporter.should_stop() {
            return;
        }
        if record.in_use {
            check_owner_chain(ctx, RecordType::Schema, record.id, record.next_prop);
        }
    }
}
