use apollo_compiler::ast::{
    Definition, Document as AstDocument, FragmentDefinition, OperationDefinition, OperationType,
    Selection, Type, Value as AstValue,
};
use apollo_compiler::Node;
use indexmap::IndexMap;
use serde_json_bytes::Value;

use crate::error::PlanError;

use super::args::{ArgBuilder, ArgSpec, ArgValue};
use super::network::render_network_document;
use super::{compute_fingerprint, ConnectionMeta, Mode, OperationKind, Plan, PlanField, SelectionPlan};

/// Compiles a document (a single operation, or a single bare fragment used by
/// `readFragment`/`writeFragment`) into a [`Plan`].
///
/// `operation_name` selects among multiple operations in the document; when the
/// document has exactly one operation it may be omitted.
pub fn build_plan(source: &str, operation_name: Option<&str>) -> Result<Plan, PlanError> {
    let ast = parse_document(source)?;

    let mut fragments: IndexMap<String, Node<FragmentDefinition>> = IndexMap::new();
    let mut operations: Vec<Node<OperationDefinition>> = Vec::new();

    for definition in &ast.definitions {
        match definition {
            Definition::FragmentDefinition(frag) => {
                fragments.insert(frag.name.to_string(), frag.clone());
            }
            Definition::OperationDefinition(op) => operations.push(op.clone()),
            _ => {}
        }
    }

    if operations.is_empty() {
        if fragments.len() != 1 {
            return Err(PlanError::AmbiguousFragment(fragments.len()));
        }
        let (_, fragment) = fragments.iter().next().unwrap();
        return build_fragment_plan(fragment, &fragments);
    }

    let operation = select_operation(&operations, operation_name)?;
    build_operation_plan(operation, &fragments)
}

fn parse_document(source: &str) -> Result<AstDocument, PlanError> {
    let ast = AstDocument::parse(source, "cachebay_document.graphql");
    ast.check_parse_errors()
        .map_err(|errors| PlanError::Syntax(errors.to_string()))?;
    Ok(ast)
}

fn select_operation<'a>(
    operations: &'a [Node<OperationDefinition>],
    operation_name: Option<&str>,
) -> Result<&'a Node<OperationDefinition>, PlanError> {
    if let Some(name) = operation_name {
        return operations
            .iter()
            .find(|op| op.name.as_deref().map(|n| n.as_str()) == Some(name))
            .ok_or_else(|| PlanError::UndefinedOperation(name.to_string()));
    }
    match operations.len() {
        1 => Ok(&operations[0]),
        0 => Err(PlanError::NoOperation),
        n => Err(PlanError::AmbiguousOperation(n)),
    }
}

fn build_operation_plan(
    operation: &Node<OperationDefinition>,
    fragments: &IndexMap<String, Node<FragmentDefinition>>,
) -> Result<Plan, PlanError> {
    let operation_kind = match operation.operation_type {
        OperationType::Query => OperationKind::Query,
        OperationType::Mutation => OperationKind::Mutation,
        OperationType::Subscription => OperationKind::Subscription,
    };
    let root_typename = match operation.operation_type {
        OperationType::Query => "Query",
        OperationType::Mutation => "Mutation",
        OperationType::Subscription => "Subscription",
    }
    .to_string();

    let mut root_selection = SelectionPlan::default();
    flatten_into(&operation.selection_set, fragments, &mut root_selection)?;

    let variable_definitions: Vec<(String, String)> = operation
        .variables
        .iter()
        .map(|v| (v.name.to_string(), render_type(&v.ty)))
        .collect();

    let fingerprint = compute_fingerprint(operation_kind, &root_typename, &root_selection);
    let network_document = render_network_document(
        operation_kind,
        operation.name.as_deref().map(|n| n.as_str()),
        &root_typename,
        &variable_definitions,
        &root_selection,
    );

    Ok(Plan {
        operation_kind,
        root_typename,
        root_selection,
        network_document,
        fingerprint,
    })
}

fn build_fragment_plan(
    fragment: &Node<FragmentDefinition>,
    fragments: &IndexMap<String, Node<FragmentDefinition>>,
) -> Result<Plan, PlanError> {
    let operation_kind = OperationKind::Fragment;
    let root_typename = fragment.type_condition.to_string();

    let mut root_selection = SelectionPlan::default();
    flatten_into(&fragment.selection_set, fragments, &mut root_selection)?;

    let fingerprint = compute_fingerprint(operation_kind, &root_typename, &root_selection);
    let network_document = render_network_document(
        operation_kind,
        Some(fragment.name.as_str()),
        &root_typename,
        &[],
        &root_selection,
    );

    Ok(Plan {
        operation_kind,
        root_typename,
        root_selection,
        network_document,
        fingerprint,
    })
}

fn render_type(ty: &Type) -> String {
    ty.to_string()
}

/// Flattens inline and named fragment spreads into `out`, merging duplicate
/// selections by response key. Incompatible type conditions are not tracked
/// separately: all fields reachable under any type condition are included, and
/// `__typename` (injected into the network document) disambiguates at read time.
fn flatten_into(
    selections: &[Selection],
    fragments: &IndexMap<String, Node<FragmentDefinition>>,
    out: &mut SelectionPlan,
) -> Result<(), PlanError> {
    for selection in selections {
        match selection {
            Selection::Field(field) => {
                let response_key = field
                    .alias
                    .as_ref()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| field.name.to_string());

                let args = build_arg_builder(&field.arguments);
                let connection = find_connection_meta(field.directives.iter(), &field.name);
                let is_connection = connection.is_some();

                let mut nested = if field.selection_set.is_empty() {
                    None
                } else {
                    let mut plan = SelectionPlan::default();
                    flatten_into(&field.selection_set, fragments, &mut plan)?;
                    Some(plan)
                };

                if let Some(existing_idx) = out.index_by_response_key.get(&response_key).copied() {
                    let existing = &mut out.fields[existing_idx];
                    match (&mut existing.selection, nested.take()) {
                        (Some(existing_nested), Some(new_nested)) => {
                            merge_selection_plans(existing_nested, new_nested);
                        }
                        (existing_nested @ None, Some(new_nested)) => {
                            *existing_nested = Some(new_nested);
                        }
                        _ => {}
                    }
                } else {
                    out.push(PlanField {
                        response_key,
                        field_name: field.name.to_string(),
                        args,
                        is_connection,
                        connection,
                        selection: nested,
                    });
                }
            }
            Selection::FragmentSpread(spread) => {
                let fragment = fragments
                    .get(spread.fragment_name.as_str())
                    .ok_or_else(|| PlanError::UndefinedFragment(spread.fragment_name.to_string()))?;
                flatten_into(&fragment.selection_set, fragments, out)?;
            }
            Selection::InlineFragment(inline) => {
                flatten_into(&inline.selection_set, fragments, out)?;
            }
        }
    }
    Ok(())
}

/// Merges `src`'s fields into `dst`, recursing into shared response keys.
fn merge_selection_plans(dst: &mut SelectionPlan, src: SelectionPlan) {
    for field in src.fields {
        if let Some(existing_idx) = dst.index_by_response_key.get(&field.response_key).copied() {
            let existing = &mut dst.fields[existing_idx];
            match (&mut existing.selection, field.selection) {
                (Some(existing_nested), Some(new_nested)) => {
                    merge_selection_plans(existing_nested, new_nested);
                }
                (existing_nested @ None, Some(new_nested)) => {
                    *existing_nested = Some(new_nested);
                }
                _ => {}
            }
        } else {
            dst.push(field);
        }
    }
}

fn build_arg_builder(arguments: &[Node<apollo_compiler::ast::Argument>]) -> ArgBuilder {
    let specs = arguments
        .iter()
        .map(|arg| compile_arg(arg.name.as_str(), &arg.value))
        .collect();
    ArgBuilder { specs }
}

fn compile_arg(arg_name: &str, value: &AstValue) -> ArgSpec {
    match value {
        AstValue::Variable(name) => ArgSpec::Variable {
            arg_name: arg_name.to_string(),
            var_name: name.to_string(),
        },
        other => match compile_arg_value(other) {
            ArgValue::Literal(v) => ArgSpec::Literal {
                arg_name: arg_name.to_string(),
                value: v,
            },
            resolved => ArgSpec::Nested {
                arg_name: arg_name.to_string(),
                value: resolved,
            },
        },
    }
}

fn compile_arg_value(value: &AstValue) -> ArgValue {
    match value {
        AstValue::Variable(name) => ArgValue::Variable(name.to_string()),
        AstValue::Null => ArgValue::Literal(Value::Null),
        AstValue::Boolean(b) => ArgValue::Literal(Value::from(*b)),
        AstValue::Int(i) => ArgValue::Literal(
            i.try_to_i32()
                .map(Value::from)
                .unwrap_or_else(|_| Value::from(i.as_str().parse::<f64>().unwrap_or_default())),
        ),
        AstValue::Float(f) => ArgValue::Literal(Value::from(f.try_to_f64().unwrap_or_default())),
        AstValue::String(s) => ArgValue::Literal(Value::from(s.as_str())),
        AstValue::Enum(name) => ArgValue::Literal(Value::from(name.as_str())),
        AstValue::List(items) => {
            ArgValue::List(items.iter().map(|v| compile_arg_value(v)).collect())
        }
        AstValue::Object(fields) => ArgValue::Object(
            fields
                .iter()
                .map(|(name, v)| (name.to_string(), compile_arg_value(v)))
                .collect(),
        ),
    }
}

/// Reads `@connection(key: String, filters: [String!], mode: String)` off a field's
/// directive list. Defaults: `key = fieldName`, `filters = []`, `mode = "infinite"`.
fn find_connection_meta<'a>(
    directives: impl Iterator<Item = &'a Node<apollo_compiler::ast::Directive>>,
    field_name: &apollo_compiler::ast::Name,
) -> Option<ConnectionMeta> {
    let directive = directives.into_iter().find(|d| d.name == "connection")?;

    let mut key = field_name.to_string();
    let mut filters = Vec::new();
    let mut mode = None;

    for arg in &directive.arguments {
        match arg.name.as_str() {
            "key" => {
                if let AstValue::String(s) = &*arg.value {
                    key = s.to_string();
                }
            }
            "filters" => {
                if let AstValue::List(items) = &*arg.value {
                    filters = items
                        .iter()
                        .filter_map(|item| match &**item {
                            AstValue::String(s) => Some(s.to_string()),
                            _ => None,
                        })
                        .collect();
                }
            }
            "mode" => {
                if let AstValue::String(s) = &*arg.value {
                    mode = Some(s.to_string());
                }
            }
            _ => {}
        }
    }

    Some(ConnectionMeta {
        key,
        filters,
        mode: Mode::from_str_or_default(mode.as_deref()),
    })
}
