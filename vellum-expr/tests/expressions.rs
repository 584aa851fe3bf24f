//! End-to-end expression and criterion scenarios against real document
//! bodies.

use indexmap::IndexMap;
use vellum_core::cst;
use vellum_expr::{
    evaluate, evaluate_criterion, parse, parse_embedded, Criterion, CriterionEngine,
    CriterionType, EvalContext, EvalError, ExprKind, Value,
};

fn context_with_bodies() -> EvalContext {
    let request = cst::parse("data:\n  - id: 100\n    tag: new\n").unwrap();
    let response = cst::parse(indoc::indoc! {"
        pets:
          - name: scout
            status: available
          - name: ranger
            status: sold
        total: 2
    "})
    .unwrap();
    EvalContext {
        url: Some("https://petstore.swagger.io/v2/pets".to_owned()),
        method: Some("post".to_owned()),
        status_code: Some(201),
        request_body: Some(request.unwrap_document()),
        response_body: Some(response.unwrap_document()),
        request_headers: IndexMap::from([(
            "Content-Type".to_owned(),
            "application/json".to_owned(),
        )]),
        ..Default::default()
    }
}

#[test]
fn request_body_pointer_reads_native_values() {
    let ctx = context_with_bodies();
    let expr = parse("$request.body#/data/0/id").unwrap();
    assert_eq!(
        expr.kind,
        ExprKind::RequestBody {
            pointer: Some("/data/0/id".to_owned()),
        },
    );
    assert_eq!(evaluate(&expr, Some(&ctx)).unwrap(), Value::Int(100));
}

#[test]
fn response_body_collections_come_back_as_nodes() {
    let ctx = context_with_bodies();
    let expr = parse("$response.body#/pets/1").unwrap();
    let Value::Node(node) = evaluate(&expr, Some(&ctx)).unwrap() else {
        panic!("expected a node");
    };
    assert_eq!(node.get("name").unwrap().value(), "ranger");
}

#[test]
fn every_grammar_production_round_trips() {
    for raw in [
        "$url",
        "$method",
        "$statusCode",
        "$request.header.Content-Type",
        "$request.query.limit",
        "$request.path.petId",
        "$request.body",
        "$request.body#/data/0/id",
        "$response.header.Location",
        "$response.body#/pets",
        "$inputs.username",
        "$outputs.token",
        "$steps.createPet.outputs.petId",
        "$workflows.onboarding.inputs.userId",
        "$sourceDescriptions.petstore.url",
        "$components.parameters.page",
        "$components.inputs.pagination.limit",
    ] {
        let expr = parse(raw).unwrap();
        assert_eq!(expr.raw, raw);
        assert_eq!(parse(&expr.raw).unwrap(), expr, "round trip for {raw}");
    }
}

#[test]
fn embedded_interpolation_builds_urls() {
    let ctx = context_with_bodies();
    let tokens =
        parse_embedded("{$url}?first={$response.body#/pets/0/name}&count={$response.body#/total}")
            .unwrap();
    let rendered = vellum_expr::evaluate_embedded(&tokens, Some(&ctx)).unwrap();
    assert_eq!(
        rendered,
        "https://petstore.swagger.io/v2/pets?first=scout&count=2",
    );
}

#[test]
fn criteria_drive_step_success_checks() {
    let ctx = context_with_bodies();
    let engine = CriterionEngine::new();

    let created = Criterion {
        condition: "$statusCode == 201".to_owned(),
        context: None,
        criterion_type: CriterionType::Simple,
    };
    assert!(engine.evaluate(&created, Some(&ctx)).unwrap());

    let json_content = Criterion {
        condition: "^application/json$".to_owned(),
        context: Some("$request.header.content-type".to_owned()),
        criterion_type: CriterionType::Regex,
    };
    assert!(engine.evaluate(&json_content, Some(&ctx)).unwrap());

    let has_available = Criterion {
        condition: "$.pets[?(@.status == 'available')]".to_owned(),
        context: Some("$response.body".to_owned()),
        criterion_type: CriterionType::JsonPath,
    };
    assert!(engine.evaluate(&has_available, Some(&ctx)).unwrap());

    let none_pending = Criterion {
        condition: "$.pets[?(@.status == 'pending')]".to_owned(),
        context: Some("$response.body".to_owned()),
        criterion_type: CriterionType::JsonPath,
    };
    assert!(!engine.evaluate(&none_pending, Some(&ctx)).unwrap());
}

#[test]
fn standalone_evaluation_matches_engine_evaluation() {
    let ctx = context_with_bodies();
    let criterion = Criterion {
        condition: "$response.body#/total >= 2".to_owned(),
        context: None,
        criterion_type: CriterionType::Simple,
    };
    let engine = CriterionEngine::new();
    assert_eq!(
        engine.evaluate(&criterion, Some(&ctx)).unwrap(),
        evaluate_criterion(&criterion, Some(&ctx)).unwrap(),
    );
}

#[test]
fn missing_pieces_report_typed_errors() {
    let ctx = context_with_bodies();
    assert!(matches!(
        evaluate(&parse("$inputs.missing").unwrap(), Some(&ctx)),
        Err(EvalError::MissingProperty { .. }),
    ));
    assert!(matches!(
        evaluate(&parse("$response.header.Location").unwrap(), Some(&ctx)),
        Err(EvalError::MissingProperty { .. }),
    ));
    assert!(matches!(
        evaluate(&parse("$response.query.limit").unwrap(), Some(&ctx)),
        Err(EvalError::UnsupportedExpression { .. }),
    ));
    assert!(matches!(
        evaluate(&parse("$url").unwrap(), None),
        Err(EvalError::NilContext),
    ));
}
