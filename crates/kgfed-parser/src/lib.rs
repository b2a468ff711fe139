//! # kgfed-parser
//!
//! KGQL (Knowledge Graph Query Language) parser using pest PEG grammar.
//!
//! Parses program text into an AST of SELECT and SET statements. Schema
//! checks are deferred to planning so parsing stays schema-agnostic.

pub mod ast;
mod parser;

pub use ast::{
    CompOp, Constraint, Program, SelectStatement, SetClause, SetStatement, Statement,
    StatementKind, Value,
};
pub use parser::parse;

#[cfg(test)]
mod tests {
    use super::*;
    use kgfed_core::{Direction, KgfedError};
    use proptest::prelude::*;

    fn select(program: &Program, index: usize) -> &SelectStatement {
        match &program.statements[index] {
            Statement::Select(s) => s,
            other => panic!("expected SELECT, got {other:?}"),
        }
    }

    #[test]
    fn parse_predicate_path() {
        let program = parse(
            r#"
            SELECT chemical_substance-[treats]->disease
              FROM "/graph/gamma/quick"
             WHERE chemical_substance='PUBCHEM:2083'
            "#,
        )
        .unwrap();
        let s = select(&program, 0);
        assert_eq!(s.query.order(), vec!["chemical_substance", "disease"]);
        assert_eq!(s.query.transitions()[0].predicate.as_deref(), Some("treats"));
        assert_eq!(s.source, "/graph/gamma/quick");
        assert_eq!(
            s.where_clause,
            vec![Constraint::new(
                "chemical_substance",
                CompOp::Eq,
                Value::String("PUBCHEM:2083".to_string())
            )]
        );
    }

    #[test]
    fn parse_set_statements() {
        let program = parse(
            "
            SET disease = 'asthma'
            SET max_p_value = '0.5'
            SET population_density = 2
            SET icees.population_density_cluster = 'http://localhost/ICEESQuery'
            ",
        )
        .unwrap();
        assert_eq!(program.statements.len(), 4);
        assert_eq!(
            program.statements[2],
            Statement::Set(SetStatement {
                variable: "population_density".to_string(),
                value: Value::Integer(2),
            })
        );
        match &program.statements[3] {
            Statement::Set(s) => assert_eq!(s.variable, "icees.population_density_cluster"),
            other => panic!("expected SET, got {other:?}"),
        }
    }

    #[test]
    fn parse_skips_comments() {
        let program = parse(
            "
            -- This is a comment
            SET disease = 'asthma' -- trailing
            ",
        )
        .unwrap();
        assert_eq!(program.statements.len(), 1);
        assert_eq!(program.statements[0].kind(), StatementKind::Set);
    }

    #[test]
    fn parse_select_with_variable_and_whole_set() {
        let program = parse(
            r#"
            SELECT chemical_substance->gene->biological_process->phenotypic_feature
              FROM "/graph/gamma/quick"
             WHERE chemical_substance = $chemical_exposures
               SET knowledge_graph
            "#,
        )
        .unwrap();
        let s = select(&program, 0);
        assert_eq!(s.query.concepts().len(), 4);
        assert_eq!(
            s.where_clause[0].value,
            Value::Variable("chemical_exposures".to_string())
        );
        assert_eq!(
            s.set_clause,
            Some(SetClause::Whole {
                name: "knowledge_graph".to_string()
            })
        );
    }

    #[test]
    fn parse_select_with_conjunction_and_path_query() {
        let program = parse(
            r#"
            SELECT disease->chemical_substance
              FROM "/flow/5/mod_1_4/icees/by_residential_density"
             WHERE disease = "asthma"
               AND EstResidentialDensity < "2"
               AND cohort = "COHORT:22"
               AND max_p_value <= 0.5
               SET '$.nodes.[*].id' AS chemical_exposures
            "#,
        )
        .unwrap();
        let s = select(&program, 0);
        assert_eq!(s.where_clause.len(), 4);
        assert_eq!(s.where_clause[1].op, CompOp::Lt);
        assert_eq!(s.where_clause[3].value, Value::Float(0.5));
        assert_eq!(
            s.set_clause,
            Some(SetClause::PathQuery {
                query: "$.nodes.[*].id".to_string(),
                name: "chemical_exposures".to_string(),
            })
        );
    }

    #[test]
    fn parse_aliased_concepts() {
        let program = parse(
            "
            SELECT disease:cohort_diagnosis->disease:diagnoses
              FROM '/clinical/cohort/disease_to_chemical_exposure'
             WHERE cohort_diagnosis = 'MONDO:0004979' --asthma
               AND Sex = '0'
            ",
        )
        .unwrap();
        let s = select(&program, 0);
        let concepts = s.query.concepts();
        assert_eq!(concepts[0].name, "cohort_diagnosis");
        assert_eq!(concepts[0].type_name, "disease");
        assert_eq!(concepts[1].name, "diagnoses");
        assert_eq!(concepts[1].type_name, "disease");
    }

    #[test]
    fn parse_backward_arrows() {
        let program = parse(
            r#"
            SELECT gene->biological_process<-microRNA<-[regulates]-protein
              FROM "/schema"
            "#,
        )
        .unwrap();
        let s = select(&program, 0);
        let directions: Vec<Direction> =
            s.query.transitions().iter().map(|t| t.direction).collect();
        assert_eq!(
            directions,
            vec![Direction::Forward, Direction::Backward, Direction::Backward]
        );
        assert_eq!(s.query.transitions()[2].predicate.as_deref(), Some("regulates"));
    }

    #[test]
    fn select_followed_by_set_statement_is_two_statements() {
        let program = parse(
            r#"
            SELECT a->b FROM "/schema"
            SET threshold = 3
            "#,
        )
        .unwrap();
        assert_eq!(program.statements.len(), 2);
        assert!(select(&program, 0).set_clause.is_none());
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let program = parse("select a->b from '/schema' where a = 'X:1' and b != 2").unwrap();
        assert_eq!(select(&program, 0).where_clause.len(), 2);
    }

    #[test]
    fn syntax_error_names_line_and_token() {
        let err = parse("SELECT chemical_substance->\n  FROM '/schema'").unwrap_err();
        match err {
            KgfedError::Syntax { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("near"), "message was: {message}");
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn missing_from_is_a_syntax_error() {
        assert!(matches!(
            parse("SELECT a->b WHERE a = 'x'"),
            Err(KgfedError::Syntax { .. })
        ));
    }

    #[test]
    fn duplicate_concept_name_is_a_syntax_error() {
        let err = parse("SELECT gene->disease->gene FROM '/schema'").unwrap_err();
        match err {
            KgfedError::Syntax { message, column, .. } => {
                assert!(message.contains("duplicate concept name 'gene'"));
                assert!(column > 1);
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    fn concept_type() -> impl Strategy<Value = String> {
        prop::sample::select(vec![
            "gene",
            "disease",
            "chemical_substance",
            "protein",
            "metabolite",
            "phenotypic_feature",
        ])
        .prop_map(str::to_string)
    }

    proptest! {
        #[test]
        fn parsing_is_idempotent(
            types in prop::collection::vec(concept_type(), 1..6),
            arrows in prop::collection::vec(0usize..4, 5),
            value in "[A-Z]{2,6}:[0-9]{1,5}",
        ) {
            let mut text = String::from("SELECT ");
            for (i, t) in types.iter().enumerate() {
                if i > 0 {
                    text.push_str(["->", "<-", "-[related_to]->", "<-[related_to]-"][arrows[i - 1]]);
                }
                text.push_str(&format!("{t}:c{i}"));
            }
            text.push_str(&format!(" FROM '/schema' WHERE c0 = '{value}' SET result"));

            let first = parse(&text).unwrap();
            let second = parse(&text).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
