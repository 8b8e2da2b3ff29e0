//! Renders the network-shape document: `__typename` guaranteed on every selection
//! set, `@connection` stripped, fragments already flattened away by the planner.
//!
//! Rendered directly from the already-flattened [`SelectionPlan`] tree rather than
//! by mutating the parsed AST back into text — the plan has already thrown away
//! everything the network document doesn't need (fragment spreads, client-only
//! directives), so re-deriving it from the plan keeps there being exactly one
//! source of truth for "what does this document select."

use super::args::{ArgBuilder, ArgSpec, ArgValue};
use super::{OperationKind, SelectionPlan};

pub fn render_network_document(
    kind: OperationKind,
    name: Option<&str>,
    root_typename: &str,
    variable_definitions: &[(String, String)],
    root_selection: &SelectionPlan,
) -> String {
    let mut out = String::new();

    match kind {
        OperationKind::Query => out.push_str("query"),
        OperationKind::Mutation => out.push_str("mutation"),
        OperationKind::Subscription => out.push_str("subscription"),
        OperationKind::Fragment => {
            out.push_str("fragment ");
            out.push_str(name.unwrap_or("Anonymous"));
            out.push_str(" on ");
            out.push_str(root_typename);
            render_selection(root_selection, 0, &mut out);
            return out;
        }
    }

    if let Some(name) = name {
        out.push(' ');
        out.push_str(name);
    }

    if !variable_definitions.is_empty() {
        out.push('(');
        for (i, (var, ty)) in variable_definitions.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push('$');
            out.push_str(var);
            out.push_str(": ");
            out.push_str(ty);
        }
        out.push(')');
    }

    render_selection(root_selection, 0, &mut out);
    out
}

fn render_selection(selection: &SelectionPlan, depth: usize, out: &mut String) {
    out.push_str(" {\n");
    let indent = "  ".repeat(depth + 1);

    let has_typename = selection
        .fields
        .iter()
        .any(|f| f.field_name == "__typename");
    if !has_typename {
        out.push_str(&indent);
        out.push_str("__typename\n");
    }

    for field in &selection.fields {
        out.push_str(&indent);
        if field.response_key != field.field_name {
            out.push_str(&field.response_key);
            out.push_str(": ");
        }
        out.push_str(&field.field_name);
        render_args(&field.args, out);
        if let Some(nested) = &field.selection {
            render_selection(nested, depth + 1, out);
        } else {
            out.push('\n');
        }
    }

    out.push_str(&"  ".repeat(depth));
    out.push_str("}\n");
}

fn render_args(args: &ArgBuilder, out: &mut String) {
    if args.specs.is_empty() {
        return;
    }
    out.push('(');
    for (i, spec) in args.specs.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match spec {
            ArgSpec::Variable { arg_name, var_name } => {
                out.push_str(arg_name);
                out.push_str(": $");
                out.push_str(var_name);
            }
            ArgSpec::Literal { arg_name, value } => {
                out.push_str(arg_name);
                out.push_str(": ");
                render_json_literal(value, out);
            }
            ArgSpec::Nested { arg_name, value } => {
                out.push_str(arg_name);
                out.push_str(": ");
                render_arg_value(value, out);
            }
        }
    }
    out.push(')');
}

fn render_arg_value(value: &ArgValue, out: &mut String) {
    match value {
        ArgValue::Variable(name) => {
            out.push('$');
            out.push_str(name);
        }
        ArgValue::Literal(v) => render_json_literal(v, out),
        ArgValue::Object(fields) => {
            out.push('{');
            for (i, (k, v)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(k);
                out.push_str(": ");
                render_arg_value(v, out);
            }
            out.push('}');
        }
        ArgValue::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_arg_value(item, out);
            }
            out.push(']');
        }
    }
}

fn render_json_literal(value: &serde_json_bytes::Value, out: &mut String) {
    use serde_json_bytes::Value;
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            out.push('"');
            out.push_str(s.as_str());
            out.push('"');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_json_literal(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(k.as_str());
                out.push_str(": ");
                render_json_literal(v, out);
            }
            out.push('}');
        }
    }
}
