//! Filter Compiler (C8): turns a MongoDB-style filter expression tree into
//! parameterized SQL over a JSONB column. Every filter *value* is bound as a
//! parameter, unlike the upstream `to_lance_predicate()` path this design
//! deliberately does not follow. Field names have no bind-parameter form
//! (they're part of the `->> 'field'` accessor syntax, not a comparable
//! value) and are instead validated against a strict whitelist before
//! they're interpolated — see `validate_field_name`.

use crate::error::RagError;
use serde_json::Value as JsonValue;

/// A MongoDB-style filter expression tree over document metadata keys.
#[derive(Debug, Clone)]
pub enum FilterExpr {
    Eq(String, JsonValue),
    Ne(String, JsonValue),
    Gt(String, JsonValue),
    Gte(String, JsonValue),
    Lt(String, JsonValue),
    Lte(String, JsonValue),
    In(String, Vec<JsonValue>),
    Nin(String, Vec<JsonValue>),
    All(String, Vec<JsonValue>),
    Exists(String, bool),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    /// Parse a filter from its JSON wire representation, e.g.
    /// `{"$and": [{"department": {"$eq": "eng"}}, {"tags": {"$in": ["a"]}}]}`.
    pub fn parse(value: &JsonValue) -> Result<Self, RagError> {
        let obj = value
            .as_object()
            .ok_or_else(|| RagError::FilterParseError("filter must be a JSON object".to_string()))?;

        if let Some(clauses) = obj.get("$and") {
            return Ok(FilterExpr::And(parse_array(clauses)?));
        }
        if let Some(clauses) = obj.get("$or") {
            return Ok(FilterExpr::Or(parse_array(clauses)?));
        }
        if let Some(inner) = obj.get("$not") {
            return Ok(FilterExpr::Not(Box::new(FilterExpr::parse(inner)?)));
        }

        if obj.len() != 1 {
            return Err(RagError::FilterParseError(
                "field-level filter must have exactly one key".to_string(),
            ));
        }
        let (field, condition) = obj.iter().next().unwrap();
        Self::parse_condition(field, condition)
    }

    fn parse_condition(field: &str, condition: &JsonValue) -> Result<Self, RagError> {
        validate_field_name(field)?;

        let obj = condition.as_object().ok_or_else(|| {
            RagError::FilterParseError(format!("condition for '{field}' must be an object"))
        })?;

        if obj.len() != 1 {
            return Err(RagError::FilterParseError(format!(
                "condition for '{field}' must have exactly one operator"
            )));
        }
        let (op, value) = obj.iter().next().unwrap();

        match op.as_str() {
            "$eq" => Ok(FilterExpr::Eq(field.to_string(), value.clone())),
            "$ne" => Ok(FilterExpr::Ne(field.to_string(), value.clone())),
            "$gt" => Ok(FilterExpr::Gt(field.to_string(), value.clone())),
            "$gte" => Ok(FilterExpr::Gte(field.to_string(), value.clone())),
            "$lt" => Ok(FilterExpr::Lt(field.to_string(), value.clone())),
            "$lte" => Ok(FilterExpr::Lte(field.to_string(), value.clone())),
            "$in" => Ok(FilterExpr::In(field.to_string(), as_array(value, op)?)),
            "$nin" => Ok(FilterExpr::Nin(field.to_string(), as_array(value, op)?)),
            "$all" => Ok(FilterExpr::All(field.to_string(), as_array(value, op)?)),
            "$exists" => Ok(FilterExpr::Exists(
                field.to_string(),
                value.as_bool().ok_or_else(|| {
                    RagError::FilterParseError("$exists requires a boolean".to_string())
                })?,
            )),
            other => Err(RagError::FilterParseError(format!("unknown operator '{other}'"))),
        }
    }

    /// Compile this expression into parameterized SQL over `column`, a JSONB
    /// column holding the document's user metadata.
    pub fn compile(&self, column: &str) -> CompiledFilter {
        let mut bind_values = Vec::new();
        let sql = self.render(column, &mut bind_values);
        CompiledFilter { sql, bind_values }
    }

    fn render(&self, column: &str, binds: &mut Vec<JsonValue>) -> String {
        match self {
            FilterExpr::Eq(field, v) => {
                binds.push(v.clone());
                format!("({column} ->> '{field}') = ?::text")
            }
            FilterExpr::Ne(field, v) => {
                binds.push(v.clone());
                format!("({column} ->> '{field}') IS DISTINCT FROM ?::text")
            }
            FilterExpr::Gt(field, v) => ordinal(column, field, ">", v, binds),
            FilterExpr::Gte(field, v) => ordinal(column, field, ">=", v, binds),
            FilterExpr::Lt(field, v) => ordinal(column, field, "<", v, binds),
            FilterExpr::Lte(field, v) => ordinal(column, field, "<=", v, binds),
            FilterExpr::In(field, values) => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| {
                        binds.push(v.clone());
                        "?".to_string()
                    })
                    .collect();
                format!("({column} ->> '{field}') IN ({})", placeholders.join(", "))
            }
            FilterExpr::Nin(field, values) => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| {
                        binds.push(v.clone());
                        "?".to_string()
                    })
                    .collect();
                format!(
                    "({column} ->> '{field}') NOT IN ({})",
                    placeholders.join(", ")
                )
            }
            FilterExpr::All(field, values) => {
                binds.push(JsonValue::Array(values.clone()));
                format!("({column} -> '{field}') @> ?::jsonb")
            }
            FilterExpr::Exists(field, should_exist) => {
                if *should_exist {
                    format!("({column} ? '{field}')")
                } else {
                    format!("NOT ({column} ? '{field}')")
                }
            }
            FilterExpr::And(clauses) => join_clauses(column, clauses, "AND", binds),
            FilterExpr::Or(clauses) => join_clauses(column, clauses, "OR", binds),
            FilterExpr::Not(inner) => format!("NOT ({})", inner.render(column, binds)),
        }
    }
}

fn ordinal(column: &str, field: &str, op: &str, v: &JsonValue, binds: &mut Vec<JsonValue>) -> String {
    binds.push(v.clone());
    if v.is_number() {
        format!("({column} ->> '{field}')::numeric {op} ?::numeric")
    } else {
        format!("({column} ->> '{field}') {op} ?::text")
    }
}

fn join_clauses(column: &str, clauses: &[FilterExpr], joiner: &str, binds: &mut Vec<JsonValue>) -> String {
    let rendered: Vec<String> = clauses.iter().map(|c| c.render(column, binds)).collect();
    format!("({})", rendered.join(&format!(" {joiner} ")))
}

fn parse_array(value: &JsonValue) -> Result<Vec<FilterExpr>, RagError> {
    value
        .as_array()
        .ok_or_else(|| RagError::FilterParseError("expected an array of sub-filters".to_string()))?
        .iter()
        .map(FilterExpr::parse)
        .collect()
}

/// Field names are spliced directly into the JSONB accessor SQL (`->>
/// 'field'`), so only a conservative character set is allowed through —
/// this is the only thing standing between a filter key and a SQL
/// injection into `search_similar`'s WHERE clause. Values never take this
/// path; they're always bound as `?` parameters.
fn validate_field_name(field: &str) -> Result<(), RagError> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(RagError::FilterParseError(format!(
            "invalid field name '{field}': only alphanumerics, '_', '.', and '-' are allowed"
        )))
    }
}

fn as_array(value: &JsonValue, op: &str) -> Result<Vec<JsonValue>, RagError> {
    value
        .as_array()
        .cloned()
        .ok_or_else(|| RagError::FilterParseError(format!("{op} requires an array")))
}

/// A filter rendered into SQL with `?` placeholders, plus the values to bind
/// in order. `render_with_offset` rewrites the placeholders into Postgres
/// `$N` form starting from a caller-supplied counter, since a filter clause
/// is always composed into a larger query that already owns `$1`.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    sql: String,
    bind_values: Vec<JsonValue>,
}

impl CompiledFilter {
    pub fn bind_values(&self) -> &[JsonValue] {
        &self.bind_values
    }

    /// Rewrite this filter's `?` placeholders into `$N` form, starting at
    /// `*next_index`, and advance it past the placeholders consumed. The
    /// column reference is already baked into the SQL by `compile`, so this
    /// step only needs to renumber parameters for the enclosing query.
    pub fn render_with_offset(&self, next_index: &mut usize) -> String {
        let mut out = String::with_capacity(self.sql.len() + self.bind_values.len() * 2);
        for ch in self.sql.chars() {
            if ch == '?' {
                out.push('$');
                out.push_str(&next_index.to_string());
                *next_index += 1;
            } else {
                out.push(ch);
            }
        }
        out
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_compiles_to_bound_comparison() {
        let expr = FilterExpr::parse(&json!({"department": {"$eq": "eng"}})).unwrap();
        let compiled = expr.compile("user_metadata");
        assert!(compiled.sql().contains("user_metadata ->> 'department'"));
        assert_eq!(compiled.bind_values(), &[json!("eng")]);
    }

    #[test]
    fn and_or_not_compose() {
        let expr = FilterExpr::parse(&json!({
            "$and": [
                {"department": {"$eq": "eng"}},
                {"$not": {"archived": {"$eq": true}}}
            ]
        }))
        .unwrap();
        let compiled = expr.compile("user_metadata");
        assert!(compiled.sql().contains("AND"));
        assert!(compiled.sql().contains("NOT"));
        assert_eq!(compiled.bind_values().len(), 2);
    }

    #[test]
    fn in_produces_one_placeholder_per_value() {
        let expr = FilterExpr::parse(&json!({"tags": {"$in": ["a", "b", "c"]}})).unwrap();
        let compiled = expr.compile("user_metadata");
        assert_eq!(compiled.bind_values().len(), 3);
        assert!(compiled.sql().contains("IN ("));
    }

    #[test]
    fn field_name_with_quote_is_rejected() {
        let expr = FilterExpr::parse(&json!({"x') OR (1=1) OR ('": {"$eq": "eng"}}));
        assert!(expr.is_err());
    }

    #[test]
    fn exists_false_negates_key_presence() {
        let expr = FilterExpr::parse(&json!({"archived": {"$exists": false}})).unwrap();
        let compiled = expr.compile("user_metadata");
        assert!(compiled.sql().starts_with("NOT"));
        assert!(compiled.bind_values().is_empty());
    }

    #[test]
    fn malformed_filter_is_rejected() {
        assert!(FilterExpr::parse(&json!({"a": "b", "c": "d"})).is_err());
        assert!(FilterExpr::parse(&json!({"field": {"$eq": "x", "$ne": "y"}})).is_err());
        assert!(FilterExpr::parse(&json!({"field": {"$bogus": "x"}})).is_err());
    }

    #[test]
    fn placeholders_rewrite_into_dollar_numbered_params_from_offset() {
        let expr = FilterExpr::parse(&json!({"tags": {"$in": ["a", "b"]}})).unwrap();
        let compiled = expr.compile("user_metadata");
        let mut next = 2usize;
        let sql = compiled.render_with_offset(&mut next);
        assert!(sql.contains("$2"));
        assert!(sql.contains("$3"));
        assert_eq!(next, 4);
    }
}
