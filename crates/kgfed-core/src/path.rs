//! The concept-path model: typed concepts joined by directed transitions.
//!
//! A [`Query`] always alternates concept, transition, concept, ... and both
//! begins and ends with a concept, so a path with `k` transitions has
//! `2k + 1` elements. Concept names are unique within a query.

use serde::{Deserialize, Serialize};

use crate::error::{KgfedError, Result};

/// A typed concept in a query path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptNode {
    /// Alias, unique within a query. Equals `type_name` when no alias was written.
    pub name: String,
    /// Concept type used for schema lookups.
    pub type_name: String,
    /// Identifiers this concept is pre-bound to. Empty means a free variable.
    #[serde(default)]
    pub bound_ids: Vec<String>,
}

impl ConceptNode {
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            bound_ids: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        !self.bound_ids.is_empty()
    }
}

/// Orientation of a transition as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// `a -> b`: `a` is the edge source.
    Forward,
    /// `a <- b`: `b` is the edge source.
    Backward,
}

/// A directed, optionally labeled edge between two adjacent concepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

impl Transition {
    #[must_use]
    pub fn forward(predicate: Option<String>) -> Self {
        Self {
            direction: Direction::Forward,
            predicate,
        }
    }

    #[must_use]
    pub fn backward(predicate: Option<String>) -> Self {
        Self {
            direction: Direction::Backward,
            predicate,
        }
    }

    /// Orient `(left, right)` as written into `(source, target)` as a backend sees it.
    #[must_use]
    pub fn orient<'a, T: ?Sized>(&self, left: &'a T, right: &'a T) -> (&'a T, &'a T) {
        match self.direction {
            Direction::Forward => (left, right),
            Direction::Backward => (right, left),
        }
    }
}

/// One element of the alternating path sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathElement<'a> {
    Concept(&'a ConceptNode),
    Transition(&'a Transition),
}

/// An ordered path of concepts and transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QueryRepr")]
pub struct Query {
    concepts: Vec<ConceptNode>,
    transitions: Vec<Transition>,
}

/// Unchecked wire form of [`Query`].
#[derive(Deserialize)]
struct QueryRepr {
    concepts: Vec<ConceptNode>,
    #[serde(default)]
    transitions: Vec<Transition>,
}

impl TryFrom<QueryRepr> for Query {
    type Error = KgfedError;

    fn try_from(repr: QueryRepr) -> Result<Self> {
        let malformed = |message: String| KgfedError::Syntax {
            line: 0,
            column: 0,
            message,
        };
        let mut concepts = repr.concepts.into_iter();
        let first = concepts
            .next()
            .ok_or_else(|| malformed("path has no concepts".to_string()))?;
        if repr.transitions.len() != concepts.len() {
            return Err(malformed(format!(
                "path with {} concepts needs {} transitions, got {}",
                concepts.len() + 1,
                concepts.len(),
                repr.transitions.len()
            )));
        }
        let mut query = Self::new(first);
        for (transition, concept) in repr.transitions.into_iter().zip(concepts) {
            query.push(transition, concept)?;
        }
        Ok(query)
    }
}

impl Query {
    /// Start a path at its first concept.
    #[must_use]
    pub fn new(first: ConceptNode) -> Self {
        Self {
            concepts: vec![first],
            transitions: Vec::new(),
        }
    }

    /// Append a transition and the concept it leads to.
    ///
    /// # Errors
    ///
    /// Returns [`KgfedError::Syntax`] if the concept name is already used in
    /// this path. The error carries no position; parsers re-attach one.
    pub fn push(&mut self, transition: Transition, concept: ConceptNode) -> Result<()> {
        if self.concept(&concept.name).is_some() {
            return Err(KgfedError::Syntax {
                line: 0,
                column: 0,
                message: format!("duplicate concept name '{}' in path", concept.name),
            });
        }
        self.transitions.push(transition);
        self.concepts.push(concept);
        Ok(())
    }

    #[must_use]
    pub fn concepts(&self) -> &[ConceptNode] {
        &self.concepts
    }

    pub fn concepts_mut(&mut self) -> impl Iterator<Item = &mut ConceptNode> {
        self.concepts.iter_mut()
    }

    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Concept names in path order.
    #[must_use]
    pub fn order(&self) -> Vec<String> {
        self.concepts.iter().map(|c| c.name.clone()).collect()
    }

    #[must_use]
    pub fn concept(&self, name: &str) -> Option<&ConceptNode> {
        self.concepts.iter().find(|c| c.name == name)
    }

    pub fn concept_mut(&mut self, name: &str) -> Option<&mut ConceptNode> {
        self.concepts.iter_mut().find(|c| c.name == name)
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.concepts.iter().position(|c| c.name == name)
    }

    /// Number of elements in the alternating sequence (`2k + 1`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.concepts.len() + self.transitions.len()
    }

    /// A query always holds at least one concept.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The alternating concept/transition sequence.
    pub fn elements(&self) -> impl Iterator<Item = PathElement<'_>> {
        self.concepts.iter().enumerate().flat_map(move |(i, c)| {
            std::iter::once(PathElement::Concept(c)).chain(
                self.transitions
                    .get(i)
                    .map(PathElement::Transition)
                    .into_iter(),
            )
        })
    }

    /// The transition between concept `index` and concept `index + 1`, with both ends.
    #[must_use]
    pub fn hop(&self, index: usize) -> Option<(&ConceptNode, &Transition, &ConceptNode)> {
        let transition = self.transitions.get(index)?;
        Some((&self.concepts[index], transition, &self.concepts[index + 1]))
    }

    /// The contiguous sub-path spanning concepts `start..=end`.
    ///
    /// Directions, predicates and bound identifiers are preserved.
    #[must_use]
    pub fn segment(&self, start: usize, end: usize) -> Option<Query> {
        if start > end || end >= self.concepts.len() {
            return None;
        }
        Some(Query {
            concepts: self.concepts[start..=end].to_vec(),
            transitions: self.transitions[start..end].to_vec(),
        })
    }
}
