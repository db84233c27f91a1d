//! リソースアドレスと属性参照
//!
//! アドレスは `kind.name`、参照は `kind.name.attribute` の形式で文字列化されます。

use crate::error::{DeclarationError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// リソースの識別子 `(kind, name)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceAddress {
    pub kind: String,
    pub name: String,
}

impl ResourceAddress {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// kind と name が有効な識別子かを検証
    pub fn validate(&self) -> Result<()> {
        validate_segment(&self.kind, "kind").map_err(DeclarationError::InvalidAddress)?;
        validate_segment(&self.name, "name").map_err(DeclarationError::InvalidAddress)?;
        Ok(())
    }

    /// このリソースの属性への参照を作成
    pub fn attribute(&self, attribute: impl Into<String>) -> Reference {
        Reference {
            kind: self.kind.clone(),
            name: self.name.clone(),
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

impl FromStr for ResourceAddress {
    type Err = DeclarationError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 2 {
            return Err(DeclarationError::InvalidAddress(format!(
                "'{}' は kind.name の形式ではありません",
                s
            )));
        }
        let address = Self::new(parts[0], parts[1]);
        address.validate()?;
        Ok(address)
    }
}

impl TryFrom<String> for ResourceAddress {
    type Error = DeclarationError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ResourceAddress> for String {
    fn from(address: ResourceAddress) -> Self {
        address.to_string()
    }
}

/// 他リソースの出力属性への参照 `(kind, name, attribute)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reference {
    pub kind: String,
    pub name: String,
    pub attribute: String,
}

impl Reference {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            attribute: attribute.into(),
        }
    }

    /// 参照先のリソースアドレス
    pub fn target(&self) -> ResourceAddress {
        ResourceAddress::new(&self.kind, &self.name)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.kind, self.name, self.attribute)
    }
}

impl FromStr for Reference {
    type Err = DeclarationError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(DeclarationError::InvalidReference(format!(
                "'{}' は kind.name.attribute の形式ではありません",
                s
            )));
        }
        for (segment, what) in parts.iter().zip(["kind", "name", "attribute"]) {
            validate_segment(segment, what).map_err(DeclarationError::InvalidReference)?;
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl TryFrom<String> for Reference {
    type Error = DeclarationError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Reference> for String {
    fn from(reference: Reference) -> Self {
        reference.to_string()
    }
}

fn validate_segment(segment: &str, what: &str) -> std::result::Result<(), String> {
    if segment.is_empty() {
        return Err(format!("{} が空です", what));
    }
    if segment.contains('.') || segment.chars().any(char::is_whitespace) {
        return Err(format!(
            "{} '{}' に '.' や空白は使用できません",
            what, segment
        ));
    }
    Ok(())
}
