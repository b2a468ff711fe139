//! Program interpreter: runs statements in order against a shared schema.

use std::sync::Arc;

use kgfed_core::{KgfedError, MergedResult, Query, Result, SchemaGraph};
use kgfed_parser::{
    parse, CompOp, Constraint, Program, SelectStatement, SetClause, SetStatement, Statement,
    Value,
};
use serde_json::Value as Json;
use tracing::{debug, info};

use crate::backend::{BackendRegistry, NameResolver};
use crate::compiler::{compile, question_graph};
use crate::context::{json_path, VariableContext};
use crate::executor::{self, ExecutionOptions};
use crate::merge::merge_responses;
use crate::planner::{plan_source, Plan};

/// Federated query engine.
///
/// Holds the schema graph, the backends and the execution options; the
/// variable context is supplied per call.
#[derive(Clone)]
pub struct Engine {
    schema: Arc<SchemaGraph>,
    registry: BackendRegistry,
    resolver: Option<Arc<dyn NameResolver>>,
    options: ExecutionOptions,
}

impl Engine {
    #[must_use]
    pub fn new(schema: Arc<SchemaGraph>, registry: BackendRegistry) -> Self {
        Self {
            schema,
            registry,
            resolver: None,
            options: ExecutionOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolver used for literal WHERE values when name resolution is enabled.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl NameResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    #[must_use]
    pub fn schema(&self) -> &SchemaGraph {
        &self.schema
    }

    #[must_use]
    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Plan every SELECT of `text` without executing anything.
    ///
    /// # Errors
    ///
    /// Returns syntax errors as is; planning errors are wrapped in
    /// [`KgfedError::Statement`].
    pub fn plan(&self, text: &str) -> Result<Vec<Plan>> {
        let program = parse(text)?;
        program
            .statements
            .iter()
            .enumerate()
            .filter_map(|(index, statement)| match statement {
                Statement::Select(select) => Some(
                    plan_source(&select.query, &select.source, &self.schema)
                        .map_err(|e| e.in_statement(index)),
                ),
                Statement::Set(_) => None,
            })
            .collect()
    }

    /// Parse and run a program. Returns the result of its last SELECT, or an
    /// empty result when it has none.
    ///
    /// # Errors
    ///
    /// Syntax errors are returned as is. Execution stops at the first failed
    /// statement, whose error is wrapped in [`KgfedError::Statement`].
    pub async fn execute(&self, text: &str, ctx: &mut VariableContext) -> Result<MergedResult> {
        let program = parse(text)?;
        self.execute_program(&program, ctx).await
    }

    /// Run an already parsed program.
    ///
    /// # Errors
    ///
    /// See [`Engine::execute`].
    pub async fn execute_program(
        &self,
        program: &Program,
        ctx: &mut VariableContext,
    ) -> Result<MergedResult> {
        let mut last = None;
        for (index, statement) in program.statements.iter().enumerate() {
            info!(index, kind = ?statement.kind(), "executing statement");
            match statement {
                Statement::Set(set) => {
                    self.execute_set(set, ctx)
                        .map_err(|e| e.in_statement(index))?;
                }
                Statement::Select(select) => {
                    let result = self
                        .execute_select(select, ctx)
                        .await
                        .map_err(|e| e.in_statement(index))?;
                    last = Some(result);
                }
            }
        }
        Ok(last.unwrap_or_default())
    }

    /// `SET name = value`.
    ///
    /// # Errors
    ///
    /// Returns [`KgfedError::UnresolvedVariable`] when the value references
    /// an undefined variable.
    pub fn execute_set(&self, set: &SetStatement, ctx: &mut VariableContext) -> Result<()> {
        let value = match &set.value {
            Value::Variable(reference) => ctx.resolve(reference)?,
            literal => literal.to_json(),
        };
        debug!(variable = %set.variable, "variable set");
        ctx.set(set.variable.clone(), value);
        Ok(())
    }

    /// Run one SELECT: bind, plan, execute, merge, then apply its SET clause.
    ///
    /// # Errors
    ///
    /// Any planning, resolution, execution or path-query error.
    pub async fn execute_select(
        &self,
        select: &SelectStatement,
        ctx: &mut VariableContext,
    ) -> Result<MergedResult> {
        let constraints = resolve_constraints(&select.where_clause, ctx)?;
        let mut query = select.query.clone();
        self.bind_concepts(&mut query, &constraints).await?;

        let plan = plan_source(&query, &select.source, &self.schema)?;
        let statements = compile(&plan, &constraints, &self.schema);
        let report = executor::execute(&statements, &self.registry, &self.options).await?;

        let order = query.order();
        let mut merged = merge_responses(&report.responses, Some(&order), question_graph(&query));
        merged.failures = report.failures;
        info!(
            segments = statements.len(),
            nodes = merged.knowledge_graph.nodes.len(),
            answers = merged.knowledge_map.len(),
            failures = merged.failures.len(),
            "select complete"
        );

        if let Some(clause) = &select.set_clause {
            let result = serde_json::to_value(&merged)?;
            let value = match clause {
                SetClause::Whole { .. } => result,
                SetClause::PathQuery { query, .. } => Json::Array(json_path(&result, query)?),
            };
            ctx.set(clause.name(), value);
        }
        Ok(merged)
    }

    /// Bind concepts named by `concept = value` constraints.
    async fn bind_concepts(&self, query: &mut Query, constraints: &[Constraint]) -> Result<()> {
        for constraint in constraints.iter().filter(|c| c.op == CompOp::Eq) {
            let Some(concept) = query.concept(&constraint.field) else {
                continue;
            };
            let ids = match &constraint.value {
                Value::String(text) if !text.contains(':') && self.options.resolve_names => {
                    self.resolve_name(text, &concept.type_name).await?
                }
                Value::String(text) => vec![text.clone()],
                Value::Integer(i) => vec![i.to_string()],
                Value::Float(f) => vec![f.to_string()],
                Value::Variable(reference) => {
                    return Err(KgfedError::UnresolvedVariable(format!("${reference}")))
                }
            };
            if let Some(concept) = query.concept_mut(&constraint.field) {
                for id in ids {
                    if !concept.bound_ids.contains(&id) {
                        concept.bound_ids.push(id);
                    }
                }
            }
        }
        Ok(())
    }

    async fn resolve_name(&self, text: &str, type_name: &str) -> Result<Vec<String>> {
        let Some(resolver) = &self.resolver else {
            return Ok(vec![text.to_string()]);
        };
        let ids = resolver.resolve_name(text, type_name).await?;
        debug!(name = text, candidates = ids.len(), "name resolved");
        if ids.is_empty() {
            Ok(vec![text.to_string()])
        } else {
            Ok(ids)
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("resolver", &self.resolver.is_some())
            .finish_non_exhaustive()
    }
}

/// Replace `$variable` values with what they resolve to.
///
/// A variable holding a list (of ids, or of objects with an `id`) expands
/// into one constraint per identifier.
fn resolve_constraints(
    constraints: &[Constraint],
    ctx: &VariableContext,
) -> Result<Vec<Constraint>> {
    let mut resolved = Vec::with_capacity(constraints.len());
    for constraint in constraints {
        let Value::Variable(reference) = &constraint.value else {
            resolved.push(constraint.clone());
            continue;
        };
        let value = ctx.resolve(reference)?;
        let values = match &value {
            Json::Array(items) => items.iter().map(literal).collect::<Option<Vec<_>>>(),
            scalar => literal(scalar).map(|v| vec![v]),
        }
        .ok_or_else(|| {
            KgfedError::UnresolvedVariable(format!("${reference} does not hold identifiers"))
        })?;
        resolved.extend(
            values
                .into_iter()
                .map(|v| Constraint::new(constraint.field.clone(), constraint.op, v)),
        );
    }
    Ok(resolved)
}

fn literal(value: &Json) -> Option<Value> {
    match value {
        Json::String(s) => Some(Value::String(s.clone())),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float)),
        Json::Object(map) => map
            .get("id")
            .and_then(Json::as_str)
            .map(|id| Value::String(id.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, BackendRequest, InMemoryBackend, StaticNameResolver};
    use crate::executor::FailurePolicy;
    use kgfed_core::{Answer, Curies, Edge, KnowledgeGraph, Node, Response};
    use serde_json::json;

    const SCHEMA: &str = r"
backends:
  robokop:
    url: /graph/gamma/quick
    transitions:
      chemical_substance:
        disease: [treats]
      disease:
        gene: []
  rtx:
    url: /graph/rtx
    transitions:
      chemical_substance:
        disease: [treats]
implicit_conversions:
  drug_exposure: [chemical_substance]
";

    fn chem_disease(reasoner_disease: &str) -> Response {
        Response {
            knowledge_graph: KnowledgeGraph {
                nodes: vec![
                    Node::new("CHEBI:5855").with("name", json!("ibuprofen")),
                    Node::new(reasoner_disease).with("type", json!("disease")),
                ],
                edges: vec![Edge::new("CHEBI:5855", reasoner_disease)
                    .with_id(format!("treats-{reasoner_disease}"))
                    .with("type", json!("treats"))],
            },
            knowledge_map: vec![Answer::from_nodes([
                ("chemical_substance", "CHEBI:5855"),
                ("disease", reasoner_disease),
            ])
            .with_edge("e0", &format!("treats-{reasoner_disease}"))],
            question_order: None,
        }
    }

    fn disease_gene() -> Response {
        Response {
            knowledge_graph: KnowledgeGraph {
                nodes: vec![Node::new("HGNC:1")],
                edges: vec![Edge::new("MONDO:1", "HGNC:1").with_id("assoc-1")],
            },
            knowledge_map: vec![
                Answer::from_nodes([("disease", "MONDO:1"), ("gene", "HGNC:1")])
                    .with_edge("e0", "assoc-1"),
                Answer::from_nodes([("disease", "MONDO:9"), ("gene", "HGNC:9")]),
            ],
            question_order: None,
        }
    }

    fn engine() -> Engine {
        let mut registry = BackendRegistry::new();
        registry
            .register(
                InMemoryBackend::new("robokop")
                    .with_response(&["chemical_substance", "disease"], chem_disease("MONDO:1"))
                    .with_response(&["disease", "gene"], disease_gene()),
            )
            .register(
                InMemoryBackend::new("rtx")
                    .with_response(&["chemical_substance", "disease"], chem_disease("MONDO:2")),
            );
        Engine::new(Arc::new(SchemaGraph::from_yaml(SCHEMA).unwrap()), registry)
    }

    #[test]
    fn plan_splits_across_backends() {
        let plans = engine()
            .plan(r#"SELECT chemical_substance->disease->gene FROM "/schema""#)
            .unwrap();
        let segments: Vec<(&str, Vec<String>)> = plans[0]
            .segments
            .iter()
            .map(|s| (s.backend.as_str(), s.query.order()))
            .collect();
        assert_eq!(
            segments,
            vec![
                ("robokop", vec!["chemical_substance".to_string(), "disease".to_string()]),
                ("rtx", vec!["chemical_substance".to_string(), "disease".to_string()]),
                ("robokop", vec!["disease".to_string(), "gene".to_string()]),
            ]
        );
    }

    #[tokio::test]
    async fn select_merges_and_joins_across_backends() {
        let engine = engine();
        let mut ctx = VariableContext::new();
        let result = engine
            .execute(
                r#"
                SELECT chemical_substance->disease->gene
                  FROM "/schema"
                 WHERE chemical_substance = "CHEBI:5855"
                "#,
                &mut ctx,
            )
            .await
            .unwrap();

        assert_eq!(result.knowledge_map.len(), 1);
        let answer = &result.knowledge_map[0];
        assert_eq!(answer.node_bindings["gene"], Curies::One("HGNC:1".to_string()));
        assert_eq!(answer.edge_bindings["e0"], Curies::One("treats-MONDO:1".to_string()));
        assert_eq!(answer.edge_bindings["e1"], Curies::One("assoc-1".to_string()));

        let chebi = result
            .knowledge_graph
            .nodes
            .iter()
            .find(|n| n.id == "CHEBI:5855")
            .unwrap();
        assert_eq!(chebi.attributes["reasoner"], json!(["robokop", "rtx"]));
        assert_eq!(result.question_graph.order(), vec!["chemical_substance", "disease", "gene"]);
    }

    /// Binds every question node to `X:{node}` and every question edge to
    /// `{backend}-{source}-{target}`, under the labels the request carries.
    struct EchoBackend(&'static str);

    #[async_trait::async_trait]
    impl Backend for EchoBackend {
        fn id(&self) -> &str {
            self.0
        }

        async fn query(&self, request: &BackendRequest) -> Result<Response> {
            let qg = &request.question_graph;
            let mut answer = Answer::default();
            for node in &qg.nodes {
                answer
                    .node_bindings
                    .insert(node.id.clone(), Curies::One(format!("X:{}", node.id)));
            }
            for edge in &qg.edges {
                answer.edge_bindings.insert(
                    edge.id.clone(),
                    Curies::One(format!("{}-{}-{}", self.0, edge.source_id, edge.target_id)),
                );
            }
            Ok(Response {
                knowledge_map: vec![answer],
                question_order: Some(qg.order()),
                ..Response::default()
            })
        }
    }

    #[tokio::test]
    async fn joined_answers_keep_every_path_edge() {
        let schema = SchemaGraph::from_yaml(
            "backends:\n  a:\n    url: /a\n    transitions:\n      chemical_substance:\n        disease: []\n  b:\n    url: /b\n    transitions:\n      disease:\n        gene: []\n",
        )
        .unwrap();
        let mut registry = BackendRegistry::new();
        registry.register(EchoBackend("a")).register(EchoBackend("b"));
        let engine = Engine::new(Arc::new(schema), registry);

        let result = engine
            .execute(
                r#"SELECT chemical_substance->disease->gene FROM "/schema""#,
                &mut VariableContext::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.knowledge_map.len(), 1);
        let answer = &result.knowledge_map[0];
        let bound: Vec<&str> = answer.edge_bindings.keys().map(String::as_str).collect();
        let asked: Vec<&str> = result
            .question_graph
            .edges
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(bound, asked);
        assert_eq!(bound, vec!["e0", "e1"]);
        assert_eq!(
            answer.edge_bindings["e0"],
            Curies::One("a-chemical_substance-disease".to_string())
        );
        assert_eq!(answer.edge_bindings["e1"], Curies::One("b-disease-gene".to_string()));
    }

    #[tokio::test]
    async fn set_clause_stores_path_query_matches() {
        let engine = engine();
        let mut ctx = VariableContext::new();
        engine
            .execute(
                r#"
                SELECT chemical_substance-[treats]->disease
                  FROM "/graph/gamma/quick"
                 WHERE chemical_substance = 'CHEBI:5855'
                   SET '$.knowledge_graph.nodes.[*].id' AS hits
                SELECT chemical_substance->disease
                  FROM "rtx"
                   SET whole
                "#,
                &mut ctx,
            )
            .await
            .unwrap();
        assert_eq!(ctx.resolve("$hits").unwrap(), json!(["CHEBI:5855", "MONDO:1"]));
        assert_eq!(
            ctx.resolve("$whole.knowledge_graph.nodes.1.id").unwrap(),
            json!("MONDO:2")
        );
    }

    #[tokio::test]
    async fn variables_flow_between_statements() {
        let engine = engine();
        let mut ctx = VariableContext::new();
        ctx.set("chemicals", json!([{"id": "CHEBI:5855"}, {"id": "CHEBI:1"}]));
        let result = engine
            .execute(
                r#"
                SET threshold = 0.5
                SELECT chemical_substance->disease
                  FROM "/graph/gamma/quick"
                 WHERE chemical_substance = $chemicals
                   AND robokop.max_p_value = $threshold
                "#,
                &mut ctx,
            )
            .await
            .unwrap();
        assert_eq!(ctx.get("threshold"), Some(&json!(0.5)));
        assert_eq!(result.knowledge_map.len(), 1);
        let qg = &result.question_graph;
        assert_eq!(
            qg.nodes[0].curie,
            Some(Curies::Many(vec!["CHEBI:5855".to_string(), "CHEBI:1".to_string()]))
        );
    }

    #[tokio::test]
    async fn undefined_variable_fails_with_statement_index() {
        let engine = engine();
        let mut ctx = VariableContext::new();
        let err = engine
            .execute(
                r#"
                SET disease = 'asthma'
                SELECT chemical_substance->disease FROM "/schema"
                 WHERE chemical_substance = $chemical_exposures
                "#,
                &mut ctx,
            )
            .await
            .unwrap_err();
        match err {
            KgfedError::Statement { index, source } => {
                assert_eq!(index, 1);
                assert!(matches!(*source, KgfedError::UnresolvedVariable(_)));
            }
            other => panic!("expected statement error, got {other:?}"),
        }
        assert_eq!(ctx.resolve("$disease").unwrap(), json!("asthma"));
    }

    #[tokio::test]
    async fn failing_backend_is_fatal_by_default_and_reported_in_best_effort() {
        let mut registry = BackendRegistry::new();
        registry
            .register(
                InMemoryBackend::new("robokop")
                    .with_response(&["chemical_substance", "disease"], chem_disease("MONDO:1")),
            )
            .register(InMemoryBackend::new("rtx").failing("connection reset"));
        let schema = Arc::new(SchemaGraph::from_yaml(SCHEMA).unwrap());
        let text = r#"SELECT chemical_substance->disease FROM "/schema""#;

        let strict = Engine::new(Arc::clone(&schema), registry.clone());
        let err = strict
            .execute(text, &mut VariableContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.backend(), Some("rtx"));

        let lenient = Engine::new(schema, registry).with_options(ExecutionOptions {
            policy: FailurePolicy::BestEffort,
            ..ExecutionOptions::default()
        });
        let result = lenient
            .execute(text, &mut VariableContext::new())
            .await
            .unwrap();
        assert_eq!(result.knowledge_map.len(), 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].backend, "rtx");
    }

    #[tokio::test]
    async fn implicit_conversion_binds_through() {
        let engine = engine();
        let result = engine
            .execute(
                r#"
                SELECT drug_exposure->chemical_substance FROM "/schema"
                 WHERE drug_exposure = 'CHEBI:5855'
                "#,
                &mut VariableContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.knowledge_map.len(), 1);
        assert_eq!(
            result.knowledge_map[0].node_bindings["chemical_substance"].ids(),
            vec!["CHEBI:5855"]
        );
    }

    #[tokio::test]
    async fn names_resolve_when_enabled() {
        let engine = engine()
            .with_resolver(StaticNameResolver::new().with("ibuprofen", &["CHEBI:5855"]))
            .with_options(ExecutionOptions {
                resolve_names: true,
                ..ExecutionOptions::default()
            });
        let result = engine
            .execute(
                r#"SELECT chemical_substance->disease FROM "robokop"
                   WHERE chemical_substance = 'ibuprofen'"#,
                &mut VariableContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            result.question_graph.nodes[0].curie,
            Some(Curies::One("CHEBI:5855".to_string()))
        );
        assert_eq!(result.knowledge_map.len(), 1);
    }

    #[tokio::test]
    async fn program_without_select_returns_empty_result() {
        let result = engine()
            .execute("SET x = 1", &mut VariableContext::new())
            .await
            .unwrap();
        assert_eq!(result, MergedResult::default());
    }

    #[tokio::test]
    async fn syntax_error_is_not_wrapped() {
        let err = engine()
            .execute("SELECT FROM", &mut VariableContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KgfedError::Syntax { .. }));
    }
}
