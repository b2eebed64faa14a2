//! Fuzzy key lookup: index maintenance and the three-tier cascade.
//!
//! Every entity contributes one "key string" (its schema's key field
//! value, falling back to `name`) to a per-`(tenant, type)` inverted
//! index. [`lookup`] resolves a query through three tiers, cheapest
//! first; tier N runs only if tier N−1 found nothing:
//!
//! 1. **Exact**: point match on the case-folded key string.
//! 2. **Prefix**: the query is a prefix of a stored key; first 10.
//! 3. **Fuzzy**: BM25 over tokenized keys, with edit-distance term
//!    expansion so typos still land.
//!
//! Tie-break within a tier is `(score desc, created_at asc, id asc)`.
//! Tiers never blend.

use std::collections::{BTreeMap, HashMap};

use crate::config::Bm25Config;
use crate::error::Result;
use crate::storage::{keys, BatchOp, KvStore, Namespace};
use crate::types::EntityId;

use super::{Entity, EntityStore};

/// Which cascade tier produced a hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupTier {
    /// Case-folded equality.
    Exact,
    /// Stored key starts with the query.
    Prefix,
    /// BM25-scored token match.
    Fuzzy,
}

/// One lookup result.
#[derive(Clone, Debug)]
pub struct LookupHit {
    /// The matched entity.
    pub entity: Entity,
    /// BM25 score for the fuzzy tier; 1.0 for exact and prefix hits.
    pub score: f32,
    /// Tier that produced the hit.
    pub tier: LookupTier,
}

/// Tokenizes a key string: lowercase alphanumeric runs of at least two
/// characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.len() >= 2)
        .map(String::from)
        .collect()
}

// ============================================================================
// Index maintenance
// ============================================================================

/// Emits the batch operations that move an entity's key-index rows from
/// `old` to `new`.
///
/// Document frequencies and corpus stats are read once and adjusted by
/// the net delta, so calling this with both sides set (an update) cannot
/// double-count. Must run under the tenant write lock, like every other
/// read-modify-write on the index.
pub(crate) fn key_rows_diff(
    kv: &dyn KvStore,
    tenant: &str,
    entity_type: &str,
    old: Option<&str>,
    new: Option<&str>,
    id: EntityId,
) -> Result<Vec<BatchOp>> {
    let old_folded = old.map(keys::fold);
    let new_folded = new.map(keys::fold);
    if old_folded == new_folded {
        return Ok(Vec::new());
    }

    let mut ops = Vec::new();

    // Value rows (exact/prefix tiers).
    if let Some(folded) = &old_folded {
        ops.push(BatchOp::delete(
            Namespace::Indexes,
            keys::keyidx_value(tenant, entity_type, folded, id),
        ));
    }
    if let Some(folded) = &new_folded {
        ops.push(BatchOp::put(
            Namespace::Indexes,
            keys::keyidx_value(tenant, entity_type, folded, id),
            Vec::new(),
        ));
    }

    // Token-level rows (fuzzy tier). Net df delta per token.
    let old_tokens = old_folded.as_deref().map(tokenize).unwrap_or_default();
    let new_tokens = new_folded.as_deref().map(tokenize).unwrap_or_default();

    let mut df_delta: BTreeMap<&str, i64> = BTreeMap::new();
    let mut old_tf: HashMap<&str, u32> = HashMap::new();
    for token in &old_tokens {
        *old_tf.entry(token).or_insert(0) += 1;
    }
    let mut new_tf: HashMap<&str, u32> = HashMap::new();
    for token in &new_tokens {
        *new_tf.entry(token).or_insert(0) += 1;
    }

    for token in old_tf.keys() {
        *df_delta.entry(token).or_insert(0) -= 1;
        ops.push(BatchOp::delete(
            Namespace::Indexes,
            keys::keyidx_term(tenant, entity_type, token, id),
        ));
    }
    let new_doc_len = new_tokens.len() as u32;
    for (token, tf) in &new_tf {
        *df_delta.entry(token).or_insert(0) += 1;
        let mut value = Vec::with_capacity(8);
        value.extend_from_slice(&tf.to_be_bytes());
        value.extend_from_slice(&new_doc_len.to_be_bytes());
        ops.push(BatchOp::put(
            Namespace::Indexes,
            keys::keyidx_term(tenant, entity_type, token, id),
            value,
        ));
    }

    for (token, delta) in df_delta {
        if delta == 0 {
            continue;
        }
        let df_key = keys::keyidx_df(tenant, entity_type, token);
        let current = read_u64(kv, &df_key)?;
        let next = (current as i64 + delta).max(0) as u64;
        if next == 0 {
            ops.push(BatchOp::delete(Namespace::Indexes, df_key));
        } else {
            ops.push(BatchOp::put(
                Namespace::Indexes,
                df_key,
                next.to_be_bytes().to_vec(),
            ));
        }
    }

    // Corpus stats for BM25 (N and avgdl).
    let count_delta = (new_folded.is_some() as i64) - (old_folded.is_some() as i64);
    let len_delta = new_tokens.len() as i64 - old_tokens.len() as i64;
    if count_delta != 0 {
        let key = keys::keyidx_meta_count(tenant, entity_type);
        let next = (read_u64(kv, &key)? as i64 + count_delta).max(0) as u64;
        ops.push(BatchOp::put(
            Namespace::Indexes,
            key,
            next.to_be_bytes().to_vec(),
        ));
    }
    if len_delta != 0 {
        let key = keys::keyidx_meta_len(tenant, entity_type);
        let next = (read_u64(kv, &key)? as i64 + len_delta).max(0) as u64;
        ops.push(BatchOp::put(
            Namespace::Indexes,
            key,
            next.to_be_bytes().to_vec(),
        ));
    }

    Ok(ops)
}

/// Index rows for a freshly keyed entity.
pub(crate) fn key_rows_put(
    kv: &dyn KvStore,
    tenant: &str,
    entity_type: &str,
    key_string: &str,
    id: EntityId,
) -> Result<Vec<BatchOp>> {
    key_rows_diff(kv, tenant, entity_type, None, Some(key_string), id)
}

/// Row removals for an entity leaving the index.
pub(crate) fn key_rows_delete(
    kv: &dyn KvStore,
    tenant: &str,
    entity_type: &str,
    key_string: &str,
    id: EntityId,
) -> Result<Vec<BatchOp>> {
    key_rows_diff(kv, tenant, entity_type, Some(key_string), None, id)
}

fn read_u64(kv: &dyn KvStore, key: &[u8]) -> Result<u64> {
    Ok(match kv.get(Namespace::Indexes, key)? {
        Some(bytes) => {
            let arr: [u8; 8] = bytes.as_slice().try_into().unwrap_or_default();
            u64::from_be_bytes(arr)
        }
        None => 0,
    })
}

// ============================================================================
// Cascade
// ============================================================================

/// Number of hits the prefix tier returns.
const PREFIX_TIER_LIMIT: usize = 10;

/// Runs the three-tier cascade across the given types.
///
/// Types come from the schema registry; the cascade is global within a
/// tenant (no type argument in the query surface).
pub fn lookup(
    store: &EntityStore,
    types: &[String],
    query: &str,
    bm25: &Bm25Config,
) -> Result<Vec<LookupHit>> {
    let folded = keys::fold(query.trim());
    if folded.is_empty() {
        return Ok(Vec::new());
    }

    let exact = exact_tier(store, types, &folded)?;
    if !exact.is_empty() {
        return Ok(exact);
    }

    let prefix = prefix_tier(store, types, &folded)?;
    if !prefix.is_empty() {
        return Ok(prefix);
    }

    fuzzy_tier(store, types, &folded, bm25)
}

fn exact_tier(store: &EntityStore, types: &[String], folded: &str) -> Result<Vec<LookupHit>> {
    let mut hits = Vec::new();
    for entity_type in types {
        let prefix = keys::keyidx_value_exact_prefix(store.tenant(), entity_type, folded);
        for (key, _) in store.kv().prefix_iter(Namespace::Indexes, &prefix)? {
            if let Some(id) = keys::entity_id_from_key(&key, prefix.len()) {
                if let Some(entity) = store.get_any(id)? {
                    if !entity.is_deleted() {
                        hits.push(LookupHit {
                            entity,
                            score: 1.0,
                            tier: LookupTier::Exact,
                        });
                    }
                }
            }
        }
    }
    sort_tier(&mut hits);
    Ok(hits)
}

fn prefix_tier(store: &EntityStore, types: &[String], folded: &str) -> Result<Vec<LookupHit>> {
    let mut hits = Vec::new();
    for entity_type in types {
        let prefix = keys::keyidx_value_prefix(store.tenant(), entity_type, folded);
        for (key, _) in store.kv().prefix_iter(Namespace::Indexes, &prefix)? {
            // The uuid is the fixed 16-byte tail; everything between the
            // prefix and the NUL is the rest of the stored value.
            if key.len() < prefix.len() + 17 {
                continue;
            }
            let tail: [u8; 16] = key[key.len() - 16..].try_into().unwrap_or_default();
            let id = EntityId::from_bytes(tail);
            if let Some(entity) = store.get_any(id)? {
                if !entity.is_deleted() {
                    hits.push(LookupHit {
                        entity,
                        score: 1.0,
                        tier: LookupTier::Prefix,
                    });
                }
            }
        }
    }
    sort_tier(&mut hits);
    hits.truncate(PREFIX_TIER_LIMIT);
    Ok(hits)
}

fn fuzzy_tier(
    store: &EntityStore,
    types: &[String],
    folded: &str,
    bm25: &Bm25Config,
) -> Result<Vec<LookupHit>> {
    let query_tokens = tokenize(folded);
    if query_tokens.is_empty() {
        return Ok(Vec::new());
    }

    let mut hits = Vec::new();
    for entity_type in types {
        let total_docs = read_u64(
            store.kv().as_ref(),
            &keys::keyidx_meta_count(store.tenant(), entity_type),
        )?;
        if total_docs == 0 {
            continue;
        }
        let total_len = read_u64(
            store.kv().as_ref(),
            &keys::keyidx_meta_len(store.tenant(), entity_type),
        )?;
        let avg_doc_len = (total_len as f32 / total_docs as f32).max(1.0);

        // score per candidate id, accumulated over matched terms
        let mut scores: HashMap<EntityId, f32> = HashMap::new();

        for qtoken in &query_tokens {
            for term in expand_term(store, entity_type, qtoken)? {
                let df = read_u64(
                    store.kv().as_ref(),
                    &keys::keyidx_df(store.tenant(), entity_type, &term),
                )?;
                if df == 0 {
                    continue;
                }
                // IDF with the usual +1 smoothing so common terms never
                // go negative.
                let idf = (((total_docs as f32 - df as f32 + 0.5) / (df as f32 + 0.5)) + 1.0).ln();

                let prefix = keys::keyidx_term_prefix(store.tenant(), entity_type, &term);
                for (key, value) in store.kv().prefix_iter(Namespace::Indexes, &prefix)? {
                    let Some(id) = keys::entity_id_from_key(&key, prefix.len()) else {
                        continue;
                    };
                    if value.len() != 8 {
                        continue;
                    }
                    let tf = u32::from_be_bytes(value[..4].try_into().unwrap_or_default()) as f32;
                    let doc_len =
                        u32::from_be_bytes(value[4..].try_into().unwrap_or_default()) as f32;
                    let norm = tf * (bm25.k1 + 1.0)
                        / (tf + bm25.k1 * (1.0 - bm25.b + bm25.b * doc_len / avg_doc_len));
                    *scores.entry(id).or_insert(0.0) += idf * norm;
                }
            }
        }

        for (id, score) in scores {
            if score <= 0.0 {
                continue;
            }
            if let Some(entity) = store.get_any(id)? {
                if !entity.is_deleted() {
                    hits.push(LookupHit {
                        entity,
                        score,
                        tier: LookupTier::Fuzzy,
                    });
                }
            }
        }
    }

    sort_tier(&mut hits);
    hits.truncate(bm25.max_results);
    Ok(hits)
}

/// Expands a query token to index terms within a small edit distance.
///
/// Candidate terms share the token's first character (keeps the df scan
/// narrow); the allowed distance grows with token length: 1 edit up to 4
/// characters, 2 beyond.
fn expand_term(
    store: &EntityStore,
    entity_type: &str,
    qtoken: &str,
) -> Result<Vec<String>> {
    let max_edits = if qtoken.chars().count() <= 4 { 1 } else { 2 };

    let first_char_len = qtoken
        .char_indices()
        .nth(1)
        .map(|(i, _)| i)
        .unwrap_or(qtoken.len());
    let mut scan_prefix = keys::keyidx_df_prefix(store.tenant(), entity_type);
    let base_len = scan_prefix.len();
    scan_prefix.extend_from_slice(qtoken[..first_char_len].as_bytes());

    let mut terms = Vec::new();
    for (key, _) in store.kv().prefix_iter(Namespace::Indexes, &scan_prefix)? {
        let Ok(term) = String::from_utf8(key[base_len..].to_vec()) else {
            continue;
        };
        if term == qtoken || levenshtein(&term, qtoken) <= max_edits {
            terms.push(term);
        }
    }
    // The exact token may be absent from the corpus; expansion already
    // covered every stored variant.
    Ok(terms)
}

/// Classic two-row Levenshtein distance.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Orders hits by `(score desc, created_at asc, id asc)`.
fn sort_tier(hits: &mut [LookupHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.entity.created_at.cmp(&b.entity.created_at))
            .then_with(|| a.entity.id.cmp(&b.entity.id))
    });
}
