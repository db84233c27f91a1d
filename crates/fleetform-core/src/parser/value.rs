//! 属性値ノードのパース
//!
//! ノードの形から値を決めます:
//! - 引数1つ → スカラー
//! - 引数が複数 → リスト
//! - プロパティ / 子ブロック → マップ（入れ子可）
//!
//! `(ref)"kind.name.attr"` は参照になります。

use crate::error::{DeclarationError, Result};
use crate::model::{AttributeValue, Reference};
use kdl::{KdlEntry, KdlNode, KdlValue};
use std::collections::BTreeMap;

const REFERENCE_TYPE: &str = "ref";

/// 属性ノードを値に変換
pub(crate) fn parse_attribute(node: &KdlNode) -> Result<AttributeValue> {
    let attribute = node.name().value();
    let args: Vec<&KdlEntry> = node.entries().iter().filter(|e| e.name().is_none()).collect();
    let props: Vec<&KdlEntry> = node.entries().iter().filter(|e| e.name().is_some()).collect();

    if props.is_empty() && node.children().is_none() {
        return match args.as_slice() {
            [] => Err(invalid(attribute, "値が指定されていません")),
            [single] => parse_entry(attribute, single),
            many => {
                let items = many
                    .iter()
                    .map(|e| parse_entry(attribute, e))
                    .collect::<Result<Vec<_>>>()?;
                Ok(AttributeValue::list(items))
            }
        };
    }

    if !args.is_empty() {
        return Err(invalid(
            attribute,
            "引数とプロパティ/子ブロックは同時に指定できません",
        ));
    }

    let mut entries = BTreeMap::new();
    for prop in props {
        let key = prop.name().map(|n| n.value()).unwrap_or_default().to_string();
        let value = parse_entry(attribute, prop)?;
        if entries.insert(key.clone(), value).is_some() {
            return Err(invalid(attribute, &format!("キー '{}' が重複しています", key)));
        }
    }
    if let Some(children) = node.children() {
        for child in children.nodes() {
            let key = child.name().value().to_string();
            let value = parse_attribute(child)?;
            if entries.insert(key.clone(), value).is_some() {
                return Err(invalid(attribute, &format!("キー '{}' が重複しています", key)));
            }
        }
    }
    Ok(AttributeValue::map(entries))
}

/// エントリ1つを値に変換（`(ref)` 注釈付きなら参照）
pub(crate) fn parse_entry(attribute: &str, entry: &KdlEntry) -> Result<AttributeValue> {
    if entry.ty().map(|t| t.value()) == Some(REFERENCE_TYPE) {
        let reference = parse_reference(attribute, entry)?;
        return Ok(AttributeValue::reference(reference));
    }
    Ok(AttributeValue::Literal(kdl_to_json(attribute, entry.value())?))
}

pub(crate) fn parse_reference(attribute: &str, entry: &KdlEntry) -> Result<Reference> {
    let text = entry
        .value()
        .as_string()
        .ok_or_else(|| invalid(attribute, "(ref) には文字列を指定してください"))?;
    text.parse()
}

fn kdl_to_json(attribute: &str, value: &KdlValue) -> Result<serde_json::Value> {
    if let Some(s) = value.as_string() {
        return Ok(serde_json::Value::String(s.to_string()));
    }
    if let Some(i) = value.as_integer() {
        let i = i64::try_from(i).map_err(|_| invalid(attribute, "整数が範囲外です"))?;
        return Ok(serde_json::Value::from(i));
    }
    if let Some(f) = value.as_float() {
        return serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| invalid(attribute, "有限な数値ではありません"));
    }
    if let Some(b) = value.as_bool() {
        return Ok(serde_json::Value::Bool(b));
    }
    Ok(serde_json::Value::Null)
}

fn invalid(attribute: &str, message: &str) -> DeclarationError {
    DeclarationError::InvalidAttribute {
        attribute: attribute.to_string(),
        message: message.to_string(),
    }
}
