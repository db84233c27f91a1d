//! 属性値
//!
//! 属性値はリテラルか、他リソースの出力への参照です。参照は依存先が適用されるまで
//! 値が確定しないため、[`AttributeValue::resolve`] で二段階に解決します。

use crate::model::Reference;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 宣言された属性値
///
/// `List` / `Map` はリスト・マップの内側に参照が含まれる場合にだけ使われます。
/// 参照を含まない値は必ず `Literal` に畳み込まれます。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Literal(serde_json::Value),
    Reference(Reference),
    List(Vec<AttributeValue>),
    Map(BTreeMap<String, AttributeValue>),
}

/// 参照解決の結果
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// すべての参照が解決済み
    Resolved(serde_json::Value),
    /// 未確定の参照が残っている（最初に見つかったもの）
    Pending(Reference),
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

impl AttributeValue {
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        AttributeValue::Literal(value.into())
    }

    pub fn reference(reference: Reference) -> Self {
        AttributeValue::Reference(reference)
    }

    /// 要素からリストを作成（参照を含まなければ Literal に畳み込む）
    pub fn list(items: Vec<AttributeValue>) -> Self {
        if items.iter().all(AttributeValue::is_literal) {
            let values = items
                .into_iter()
                .filter_map(|item| match item {
                    AttributeValue::Literal(v) => Some(v),
                    _ => None,
                })
                .collect();
            AttributeValue::Literal(serde_json::Value::Array(values))
        } else {
            AttributeValue::List(items)
        }
    }

    /// エントリからマップを作成（参照を含まなければ Literal に畳み込む）
    pub fn map(entries: BTreeMap<String, AttributeValue>) -> Self {
        if entries.values().all(AttributeValue::is_literal) {
            let object = entries
                .into_iter()
                .filter_map(|(k, v)| match v {
                    AttributeValue::Literal(v) => Some((k, v)),
                    _ => None,
                })
                .collect();
            AttributeValue::Literal(serde_json::Value::Object(object))
        } else {
            AttributeValue::Map(entries)
        }
    }

    /// 参照を一切含まないか
    pub fn is_literal(&self) -> bool {
        match self {
            AttributeValue::Literal(_) => true,
            AttributeValue::Reference(_) => false,
            AttributeValue::List(items) => items.iter().all(AttributeValue::is_literal),
            AttributeValue::Map(entries) => entries.values().all(AttributeValue::is_literal),
        }
    }

    pub fn as_literal(&self) -> Option<&serde_json::Value> {
        match self {
            AttributeValue::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// 含まれるすべての参照（出現順）
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            AttributeValue::Literal(_) => {}
            AttributeValue::Reference(r) => out.push(r),
            AttributeValue::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            AttributeValue::Map(entries) => {
                for value in entries.values() {
                    value.collect_references(out);
                }
            }
        }
    }

    /// `lookup` で参照を解決する
    ///
    /// `lookup` が `None` を返した参照があれば `Resolution::Pending` になります。
    pub fn resolve<F>(&self, lookup: &F) -> Resolution
    where
        F: Fn(&Reference) -> Option<serde_json::Value>,
    {
        match self.try_resolve(lookup) {
            Ok(value) => Resolution::Resolved(value),
            Err(reference) => Resolution::Pending(reference.clone()),
        }
    }

    fn try_resolve<'a, F>(&'a self, lookup: &F) -> std::result::Result<serde_json::Value, &'a Reference>
    where
        F: Fn(&Reference) -> Option<serde_json::Value>,
    {
        match self {
            AttributeValue::Literal(v) => Ok(v.clone()),
            AttributeValue::Reference(r) => lookup(r).ok_or(r),
            AttributeValue::List(items) => items
                .iter()
                .map(|item| item.try_resolve(lookup))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            AttributeValue::Map(entries) => entries
                .iter()
                .map(|(k, v)| v.try_resolve(lookup).map(|v| (k.clone(), v)))
                .collect::<std::result::Result<serde_json::Map<_, _>, _>>()
                .map(serde_json::Value::Object),
        }
    }
}

impl From<serde_json::Value> for AttributeValue {
    fn from(value: serde_json::Value) -> Self {
        AttributeValue::Literal(value)
    }
}

impl From<Reference> for AttributeValue {
    fn from(reference: Reference) -> Self {
        AttributeValue::Reference(reference)
    }
}
