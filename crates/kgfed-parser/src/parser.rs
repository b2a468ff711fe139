use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use kgfed_core::{ConceptNode, KgfedError, Query, Result, Transition};

use crate::ast::{
    CompOp, Constraint, Program, SelectStatement, SetClause, SetStatement, Statement, Value,
};

// ── Pest parser derive ─────────────────────────────────────

#[derive(Parser)]
#[grammar = "kgql.pest"]
pub struct KgqlParser;

// ── Public entry point ────────────────────────────────────

/// Parse KGQL program text into a [`Program`].
///
/// # Errors
///
/// Returns [`KgfedError::Syntax`] with the offending line, column and token.
/// No partial program is ever returned.
pub fn parse(input: &str) -> Result<Program> {
    let mut pairs = KgqlParser::parse(Rule::program, input).map_err(|e| syntax_error(input, &e))?;
    let program = pairs
        .next()
        .ok_or_else(|| positioned(input, (1, 1), "empty input".to_string()))?;

    let mut statements = Vec::new();
    for pair in program.into_inner() {
        match pair.as_rule() {
            Rule::select_statement => statements.push(Statement::Select(build_select(input, pair)?)),
            Rule::set_statement => statements.push(Statement::Set(build_set(pair)?)),
            Rule::EOI => {}
            r => return Err(unexpected(input, &pair, r)),
        }
    }
    Ok(Program { statements })
}

fn syntax_error(input: &str, e: &pest::error::Error<Rule>) -> KgfedError {
    let (line, column) = match e.line_col {
        pest::error::LineColLocation::Pos(pos) => pos,
        pest::error::LineColLocation::Span(start, _) => start,
    };
    positioned(input, (line, column), e.variant.message().into_owned())
}

/// Attach the token found at `(line, column)` to `message`.
fn positioned(input: &str, (line, column): (usize, usize), message: String) -> KgfedError {
    let token: String = input
        .lines()
        .nth(line.saturating_sub(1))
        .map(|l| {
            l.chars()
                .skip(column.saturating_sub(1))
                .take_while(|c| !c.is_whitespace())
                .collect()
        })
        .unwrap_or_default();
    let message = if token.is_empty() {
        format!("{message} at end of input")
    } else {
        format!("{message} near '{token}'")
    };
    KgfedError::Syntax {
        line,
        column,
        message,
    }
}

fn unexpected(input: &str, pair: &Pair<Rule>, rule: Rule) -> KgfedError {
    positioned(input, pair.line_col(), format!("unexpected {rule:?}"))
}

// ── SELECT ────────────────────────────────────────────────

fn build_select(input: &str, pair: Pair<Rule>) -> Result<SelectStatement> {
    let mut query = None;
    let mut source = None;
    let mut where_clause = Vec::new();
    let mut set_clause = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::kw_select => {}
            Rule::path => query = Some(build_path(input, inner)?),
            Rule::from_clause => {
                source = inner
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::string)
                    .map(string_literal);
            }
            Rule::where_clause => {
                for constraint in inner.into_inner() {
                    if constraint.as_rule() == Rule::constraint {
                        where_clause.push(build_constraint(input, constraint)?);
                    }
                }
            }
            Rule::set_clause => set_clause = Some(build_set_clause(input, inner)?),
            r => return Err(unexpected(input, &inner, r)),
        }
    }

    Ok(SelectStatement {
        query: query.ok_or_else(|| positioned(input, (1, 1), "missing SELECT path".into()))?,
        source: source.ok_or_else(|| positioned(input, (1, 1), "missing FROM source".into()))?,
        where_clause,
        set_clause,
    })
}

fn build_path(input: &str, pair: Pair<Rule>) -> Result<Query> {
    let mut query: Option<Query> = None;
    let mut pending: Option<Transition> = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::concept => {
                let position = inner.line_col();
                let concept = build_concept(inner);
                match query.as_mut() {
                    None => query = Some(Query::new(concept)),
                    Some(q) => {
                        let transition = pending
                            .take()
                            .ok_or_else(|| positioned(input, position, "expected arrow".into()))?;
                        q.push(transition, concept).map_err(|e| match e {
                            KgfedError::Syntax { message, .. } => positioned(input, position, message),
                            other => other,
                        })?;
                    }
                }
            }
            Rule::forward => pending = Some(Transition::forward(None)),
            Rule::backward => pending = Some(Transition::backward(None)),
            Rule::forward_predicate => pending = Some(Transition::forward(predicate_of(inner))),
            Rule::backward_predicate => pending = Some(Transition::backward(predicate_of(inner))),
            r => return Err(unexpected(input, &inner, r)),
        }
    }

    query.ok_or_else(|| positioned(input, (1, 1), "empty path".into()))
}

/// `type` or `type:alias`.
fn build_concept(pair: Pair<Rule>) -> ConceptNode {
    let mut parts = pair.into_inner().map(|p| p.as_str().to_string());
    let type_name = parts.next().unwrap_or_default();
    let name = parts.next().unwrap_or_else(|| type_name.clone());
    ConceptNode::new(name, type_name)
}

fn predicate_of(pair: Pair<Rule>) -> Option<String> {
    pair.into_inner()
        .find(|p| p.as_rule() == Rule::predicate)
        .map(|p| p.as_str().to_string())
}

// ── WHERE ─────────────────────────────────────────────────

fn build_constraint(input: &str, pair: Pair<Rule>) -> Result<Constraint> {
    let position = pair.line_col();
    let mut inner = pair.into_inner();
    let field = inner.next().map(|p| p.as_str().to_string());
    let op = inner.next().and_then(|p| CompOp::from_token(p.as_str()));
    let value = inner.next().map(build_value).transpose()?;
    match (field, op, value) {
        (Some(field), Some(op), Some(value)) => Ok(Constraint { field, op, value }),
        _ => Err(positioned(input, position, "malformed constraint".into())),
    }
}

fn build_value(pair: Pair<Rule>) -> Result<Value> {
    match pair.as_rule() {
        Rule::string => Ok(Value::String(string_literal(pair))),
        Rule::variable => Ok(Value::Variable(pair.as_str()[1..].to_string())),
        Rule::number => {
            let text = pair.as_str();
            let parsed = if text.contains('.') {
                text.parse::<f64>().map(Value::Float).map_err(|e| e.to_string())
            } else {
                text.parse::<i64>().map(Value::Integer).map_err(|e| e.to_string())
            };
            parsed.map_err(|e| at(&pair, format!("bad number '{text}': {e}")))
        }
        r => Err(at(&pair, format!("unexpected {r:?} in value position"))),
    }
}

fn at(pair: &Pair<Rule>, message: String) -> KgfedError {
    let (line, column) = pair.line_col();
    KgfedError::Syntax {
        line,
        column,
        message,
    }
}

fn string_literal(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default()
}

// ── SET ───────────────────────────────────────────────────

fn build_set_clause(input: &str, pair: Pair<Rule>) -> Result<SetClause> {
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::kw_set => {}
            Rule::whole_target => {
                if let Some(name) = inner.into_inner().find(|p| p.as_rule() == Rule::identifier) {
                    return Ok(SetClause::Whole {
                        name: name.as_str().to_string(),
                    });
                }
            }
            Rule::path_query_target => {
                let mut query = None;
                let mut name = None;
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::string => query = Some(string_literal(part)),
                        Rule::identifier => name = Some(part.as_str().to_string()),
                        _ => {}
                    }
                }
                if let (Some(query), Some(name)) = (query, name) {
                    return Ok(SetClause::PathQuery { query, name });
                }
            }
            r => return Err(unexpected(input, &inner, r)),
        }
    }
    Err(positioned(input, (1, 1), "malformed SET clause".into()))
}

fn build_set(pair: Pair<Rule>) -> Result<SetStatement> {
    let mut variable = None;
    let mut value = None;
    for inner in pair.clone().into_inner() {
        match inner.as_rule() {
            Rule::dotted => variable = Some(inner.as_str().to_string()),
            Rule::string | Rule::number | Rule::variable => value = Some(build_value(inner)?),
            _ => {}
        }
    }
    match (variable, value) {
        (Some(variable), Some(value)) => Ok(SetStatement { variable, value }),
        _ => Err(at(&pair, "malformed SET statement".into())),
    }
}
