//! Tag-overlap recommendations for the "More Like This" block.
//!
//! Two tags match when either contains the other, so `teen` matches
//! `teenager`. Exact and partial matches score the same.

use crate::record::VideoRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation<'a> {
    pub record: &'a VideoRecord,
    /// Number of (target tag, candidate tag) pairs that matched. Zero for
    /// fallback entries.
    pub score: usize,
    /// Distinct candidate tags that took part in a match, in first-seen order.
    pub matched_tags: Vec<String>,
}

fn tags_overlap(target: &str, candidate: &str) -> bool {
    candidate.contains(target) || target.contains(candidate)
}

/// Ranks `candidates` against normalized `target_tags` and keeps at most `limit`.
///
/// Highest score first, ties by title. When nothing matches, the first
/// `limit` candidates are returned in their given order (the working set is
/// newest first, so this is a recency fallback).
pub fn recommend<'a, I>(target_tags: &[String], candidates: I, limit: usize) -> Vec<Recommendation<'a>>
where
    I: IntoIterator<Item = &'a VideoRecord>,
{
    let candidates: Vec<&'a VideoRecord> = candidates.into_iter().collect();

    let mut matches: Vec<Recommendation<'a>> = candidates
        .iter()
        .filter_map(|&record| {
            let mut score = 0;
            let mut matched_tags: Vec<String> = Vec::new();
            let candidate_tags = record.tag_list();
            for target in target_tags {
                for candidate in &candidate_tags {
                    if tags_overlap(target, candidate) {
                        score += 1;
                        if !matched_tags.contains(candidate) {
                            matched_tags.push(candidate.clone());
                        }
                    }
                }
            }
            (score > 0).then_some(Recommendation {
                record,
                score,
                matched_tags,
            })
        })
        .collect();

    if matches.is_empty() {
        return candidates
            .into_iter()
            .take(limit)
            .map(|record| Recommendation {
                record,
                score: 0,
                matched_tags: Vec::new(),
            })
            .collect();
    }

    matches.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.record.title.cmp(&b.record.title))
    });
    matches.truncate(limit);
    matches
}

/// Recommendations for `target` drawn from the rest of `working_set`.
pub fn related_for<'a>(
    target: &VideoRecord,
    working_set: &'a [VideoRecord],
    limit: usize,
) -> Vec<Recommendation<'a>> {
    recommend(
        &target.tag_list(),
        working_set.iter().filter(|record| record.id != target.id),
        limit,
    )
}
