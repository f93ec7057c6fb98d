//! 工具参数 Schema 过滤
//!
//! 推理引擎只接受标量 / 可选标量参数：注册时丢弃数组、对象等复杂字段，
//! 而不是等到调用时才失败。缺省 type 的字段按 string 处理。

use serde_json::{json, Map, Value};

const SCALAR_TYPES: [&str; 4] = ["string", "integer", "number", "boolean"];

/// 过滤结果：只含标量字段的 schema 与被丢弃的字段名
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredSchema {
    pub schema: Value,
    pub dropped: Vec<String>,
}

/// 从原始 JSON Schema 生成只含标量字段的对象 schema
pub fn scalar_input_schema(raw: &Value) -> FilteredSchema {
    let empty = Map::new();
    let properties = raw
        .get("properties")
        .and_then(|p| p.as_object())
        .unwrap_or(&empty);
    let required: Vec<&str> = raw
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let mut kept = Map::new();
    let mut dropped = Vec::new();
    for (name, prop) in properties {
        match scalar_type(prop) {
            Some(ty) => {
                let mut field = Map::new();
                field.insert("type".into(), Value::String(ty.to_string()));
                if let Some(desc) = prop.get("description").and_then(|d| d.as_str()) {
                    field.insert("description".into(), Value::String(desc.to_string()));
                }
                kept.insert(name.clone(), Value::Object(field));
            }
            None => dropped.push(name.clone()),
        }
    }

    let required: Vec<Value> = required
        .into_iter()
        .filter(|r| kept.contains_key(*r))
        .map(|r| Value::String(r.to_string()))
        .collect();

    FilteredSchema {
        schema: json!({
            "type": "object",
            "properties": Value::Object(kept),
            "required": required,
        }),
        dropped,
    }
}

/// 字段的标量类型；可选标量（`["string", "null"]` 或 `anyOf: [{string}, {null}]`）取其非 null 类型
fn scalar_type(prop: &Value) -> Option<&str> {
    if let Some(ty) = prop.get("type") {
        return match ty {
            Value::String(s) => SCALAR_TYPES.iter().copied().find(|t| t == s),
            Value::Array(items) => single_scalar(items.iter().filter_map(|v| v.as_str())),
            _ => None,
        };
    }
    let variants = prop
        .get("anyOf")
        .or_else(|| prop.get("oneOf"))
        .and_then(|v| v.as_array());
    match variants {
        Some(vs) => {
            let mut names = Vec::with_capacity(vs.len());
            for v in vs {
                names.push(v.get("type").and_then(|t| t.as_str())?);
            }
            single_scalar(names.into_iter())
        }
        None => Some("string"),
    }
}

fn single_scalar<'a>(types: impl Iterator<Item = &'a str>) -> Option<&'static str> {
    let mut found = None;
    for t in types {
        if t == "null" {
            continue;
        }
        let scalar = SCALAR_TYPES.iter().copied().find(|s| *s == t)?;
        if found.is_some_and(|f| f != scalar) {
            return None;
        }
        found = Some(scalar);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_complex_fields() {
        let raw = json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Learner name"},
                "grade": {"type": "integer"},
                "subjects": {"type": "array", "items": {"type": "string"}},
                "address": {"type": "object", "properties": {}}
            },
            "required": ["name", "subjects"]
        });
        let out = scalar_input_schema(&raw);
        let props = out.schema["properties"].as_object().unwrap();
        assert_eq!(props.len(), 2);
        assert_eq!(props["name"]["description"], "Learner name");
        assert_eq!(out.schema["required"], json!(["name"]));
        let mut dropped = out.dropped.clone();
        dropped.sort();
        assert_eq!(dropped, vec!["address".to_string(), "subjects".to_string()]);
    }

    #[test]
    fn test_keeps_optional_scalars() {
        let raw = json!({
            "properties": {
                "school_id": {"anyOf": [{"type": "integer"}, {"type": "null"}]},
                "academic_year": {"type": ["string", "null"]},
                "tags": {"anyOf": [{"type": "array"}, {"type": "null"}]},
                "untyped": {"description": "no type given"}
            }
        });
        let out = scalar_input_schema(&raw);
        let props = &out.schema["properties"];
        assert_eq!(props["school_id"]["type"], "integer");
        assert_eq!(props["academic_year"]["type"], "string");
        assert_eq!(props["untyped"]["type"], "string");
        assert!(props.get("tags").is_none());
        assert_eq!(out.dropped, vec!["tags".to_string()]);
    }

    #[test]
    fn test_empty_schema() {
        let out = scalar_input_schema(&json!({}));
        assert_eq!(out.schema["properties"], json!({}));
        assert!(out.dropped.is_empty());
    }
}
