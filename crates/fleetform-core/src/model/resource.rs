//! リソース宣言

use crate::error::Result;
use crate::model::{AttributeValue, Reference, ResourceAddress};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 1つのリソースの望ましい状態
///
/// 1回の実行の中では不変として扱われます（エンジンは `Arc` で共有します）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDeclaration {
    /// リソース種別（aws_vpc, aws_instance など）
    pub kind: String,

    /// 種別内で一意な論理名
    pub name: String,

    /// 属性名 -> 属性値
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,

    /// 参照以外の明示的な依存先（depends-on）
    #[serde(default)]
    pub depends_on: BTreeSet<ResourceAddress>,
}

impl ResourceDeclaration {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            attributes: BTreeMap::new(),
            depends_on: BTreeSet::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_literal(self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.with_attribute(key, AttributeValue::literal(value))
    }

    pub fn with_reference(self, key: impl Into<String>, reference: Reference) -> Self {
        self.with_attribute(key, AttributeValue::reference(reference))
    }

    pub fn with_dependency(mut self, address: ResourceAddress) -> Self {
        self.depends_on.insert(address);
        self
    }

    pub fn address(&self) -> ResourceAddress {
        ResourceAddress::new(&self.kind, &self.name)
    }

    /// 依存先の集合（参照先 + depends-on）
    pub fn dependencies(&self) -> BTreeSet<ResourceAddress> {
        self.attributes
            .values()
            .flat_map(|v| v.references())
            .map(Reference::target)
            .chain(self.depends_on.iter().cloned())
            .collect()
    }

    /// 参照を含まない属性のみ
    pub fn literal_attributes(&self) -> BTreeMap<&str, &serde_json::Value> {
        self.attributes
            .iter()
            .filter_map(|(k, v)| v.as_literal().map(|v| (k.as_str(), v)))
            .collect()
    }

    /// 参照を含む属性名
    pub fn reference_attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .filter(|(_, v)| !v.is_literal())
            .map(|(k, _)| k.as_str())
    }

    pub fn validate(&self) -> Result<()> {
        self.address().validate()?;
        for dependency in &self.depends_on {
            dependency.validate()?;
        }
        Ok(())
    }
}
