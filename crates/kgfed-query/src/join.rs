//! Answer join across responses.
//!
//! Every response covers a contiguous range of the full concept order. Its
//! partial answers are indexed by that range, then chained left to right:
//! a chain ending at concept `end` is extended by every compatible answer
//! whose range starts at or before `end` and reaches past it. A chain no
//! range reaches past is complete.

use std::collections::{BTreeMap, BTreeSet};

use kgfed_core::{Answer, Response};
use tracing::debug;

use crate::merge::MergedGraph;

/// `(first, last)` concept indexes of a response, inclusive.
type Range = (usize, usize);

/// Join the partial answers of `responses` into full-path answers.
///
/// Falls back to concatenating canonicalized answers when `root_order` is
/// missing or any response lacks a usable `question_order`.
#[must_use]
pub fn join_answers(
    responses: &[Response],
    root_order: Option<&[String]>,
    graph: &MergedGraph,
) -> Vec<Answer> {
    let Some(index) = root_order.and_then(|order| index_by_range(responses, order, graph)) else {
        debug!("no usable concept order, concatenating answers");
        return concatenate(responses, graph);
    };
    let Some(first) = index.keys().map(|(start, _)| *start).min() else {
        return Vec::new();
    };

    let mut complete = Vec::new();
    for ((_, end), answers) in index.range((first, 0)..=(first, usize::MAX)) {
        for answer in answers {
            extend(answer.clone(), *end, &index, &mut complete);
        }
    }
    debug!(ranges = index.len(), answers = complete.len(), "answers joined");
    complete
}

fn concatenate(responses: &[Response], graph: &MergedGraph) -> Vec<Answer> {
    responses
        .iter()
        .enumerate()
        .flat_map(|(r, response)| {
            response
                .knowledge_map
                .iter()
                .map(move |answer| graph.canonicalize(r, answer))
        })
        .collect()
}

/// Canonicalized answers grouped by covered range. A range stays registered
/// even when its response had no answers, so it still prunes chains.
fn index_by_range(
    responses: &[Response],
    order: &[String],
    graph: &MergedGraph,
) -> Option<BTreeMap<Range, Vec<Answer>>> {
    let mut index: BTreeMap<Range, Vec<Answer>> = BTreeMap::new();
    for (r, response) in responses.iter().enumerate() {
        let covered = response.question_order.as_ref()?;
        let positions = covered
            .iter()
            .map(|name| order.iter().position(|o| o == name))
            .collect::<Option<Vec<usize>>>()?;
        let start = *positions.iter().min()?;
        let end = *positions.iter().max()?;
        index
            .entry((start, end))
            .or_default()
            .extend(response.knowledge_map.iter().map(|a| graph.canonicalize(r, a)));
    }
    Some(index)
}

fn extend(
    chain: Answer,
    end: usize,
    index: &BTreeMap<Range, Vec<Answer>>,
    complete: &mut Vec<Answer>,
) {
    let frontier: Vec<(usize, &Vec<Answer>)> = index
        .iter()
        .filter(|((start, last), _)| *start <= end && end < *last)
        .map(|((_, last), answers)| (*last, answers))
        .collect();
    if frontier.is_empty() {
        complete.push(chain);
        return;
    }
    for (last, answers) in frontier {
        for answer in answers.iter().filter(|a| compatible(&chain, a)) {
            extend(union(&chain, answer), last, index, complete);
        }
    }
}

/// Shared concepts must be bound to the same identifiers.
fn compatible(chain: &Answer, answer: &Answer) -> bool {
    answer.node_bindings.iter().all(|(name, ids)| {
        chain.node_bindings.get(name).map_or(true, |bound| {
            let ours: BTreeSet<&str> = bound.ids().into_iter().collect();
            let theirs: BTreeSet<&str> = ids.ids().into_iter().collect();
            ours == theirs
        })
    })
}

fn union(chain: &Answer, answer: &Answer) -> Answer {
    let mut joined = chain.clone();
    for (name, ids) in &answer.node_bindings {
        joined
            .node_bindings
            .entry(name.clone())
            .or_insert_with(|| ids.clone());
    }
    for (label, ids) in &answer.edge_bindings {
        joined
            .edge_bindings
            .entry(label.clone())
            .or_insert_with(|| ids.clone());
    }
    joined
}
