//! 结果条目脱敏：只处理 `_raw` 与 `response` 字段，其余字段原样保留。

use serde_json::{Map, Value};

use crate::masking::Masker;

pub const RAW_FIELD: &str = "_raw";
pub const RESPONSE_FIELD: &str = "response";
pub const FIELD_MAP_KEY: &str = "map";

/// 后端返回的一条 message 或 record，按形状分类。
#[derive(Debug, Clone, PartialEq)]
pub enum ResultItem {
    /// `{ "map": {..}, ... }`。`rest` 为除 `map` 以外的顶层字段。
    FieldMap {
        map: Map<String, Value>,
        rest: Map<String, Value>,
    },
    /// 顶层带非空字符串 `_raw`。
    RawText(Map<String, Value>),
    /// 顶层带非空字符串 `response`。
    ResponseText(Map<String, Value>),
    PlainString(String),
    Opaque(Map<String, Value>),
    Other(Value),
}

impl ResultItem {
    /// 判定顺序：field-map 优先于 `_raw`，`_raw` 优先于 `response`。
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Object(mut obj) => {
                if matches!(obj.get(FIELD_MAP_KEY), Some(Value::Object(_))) {
                    let map = match obj.remove(FIELD_MAP_KEY) {
                        Some(Value::Object(map)) => map,
                        _ => Map::new(),
                    };
                    ResultItem::FieldMap { map, rest: obj }
                } else if non_empty_str(&obj, RAW_FIELD) {
                    ResultItem::RawText(obj)
                } else if non_empty_str(&obj, RESPONSE_FIELD) {
                    ResultItem::ResponseText(obj)
                } else {
                    ResultItem::Opaque(obj)
                }
            }
            Value::String(s) => ResultItem::PlainString(s),
            other => ResultItem::Other(other),
        }
    }

    pub fn sanitize<M: Masker + ?Sized>(self, masker: &M) -> Value {
        match self {
            ResultItem::FieldMap { map, rest } => sanitize_field_map(map, rest, masker),
            ResultItem::RawText(mut obj) => {
                mask_field(&mut obj, RAW_FIELD, masker);
                Value::Object(obj)
            }
            ResultItem::ResponseText(mut obj) => {
                mask_field(&mut obj, RESPONSE_FIELD, masker);
                Value::Object(obj)
            }
            // 纯字符串不做脱敏
            ResultItem::PlainString(s) => Value::String(s),
            ResultItem::Opaque(mut obj) => {
                mask_field(&mut obj, RAW_FIELD, masker);
                mask_field(&mut obj, RESPONSE_FIELD, masker);
                Value::Object(obj)
            }
            ResultItem::Other(v) => v,
        }
    }
}

/// 逐条独立脱敏，保持顺序。
pub fn sanitize_items<M: Masker + ?Sized>(items: Vec<Value>, masker: &M) -> Vec<Value> {
    items
        .into_iter()
        .map(|item| ResultItem::classify(item).sanitize(masker))
        .collect()
}

fn sanitize_field_map<M: Masker + ?Sized>(
    map: Map<String, Value>,
    mut rest: Map<String, Value>,
    masker: &M,
) -> Value {
    let plain: Map<String, Value> = map
        .into_iter()
        .map(|(key, value)| {
            let text = stringify(&value);
            let text = if is_sensitive_key(&key) {
                masker.mask(&text)
            } else {
                text
            };
            (key, Value::String(text))
        })
        .collect();

    let top_raw = rest.remove(RAW_FIELD).filter(has_content);
    rest.insert(FIELD_MAP_KEY.to_string(), Value::Object(plain));
    if let Some(raw) = top_raw {
        rest.insert(
            RAW_FIELD.to_string(),
            Value::String(masker.mask(&stringify(&raw))),
        );
    }
    Value::Object(rest)
}

/// 顶层 `_raw` 只有带内容时才输出：null、空串、false、0 都丢弃。
fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn is_sensitive_key(key: &str) -> bool {
    key == RAW_FIELD || key == RESPONSE_FIELD
}

fn non_empty_str(obj: &Map<String, Value>, key: &str) -> bool {
    matches!(obj.get(key), Some(Value::String(s)) if !s.is_empty())
}

fn mask_field<M: Masker + ?Sized>(obj: &mut Map<String, Value>, key: &str, masker: &M) {
    if let Some(Value::String(s)) = obj.get_mut(key) {
        if !s.is_empty() {
            *s = masker.mask(s);
        }
    }
}

/// 字段值转字符串：null 为空串，字符串原样，其余取 JSON 文本。
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
