//! マニフェスト（宣言全体）

use crate::error::{DeclarationError, Result};
use crate::model::{Reference, ResourceAddress, ResourceDeclaration};
use serde::{Deserialize, Serialize};

/// 実行結果として公開する名前付き出力（例: ロードバランサーのDNS名）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDeclaration {
    pub name: String,
    pub value: Reference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// 宣言の集合
///
/// リソースは宣言順を保持します。`(kind, name)` の重複は受け付けません。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub resources: Vec<ResourceDeclaration>,
    #[serde(default)]
    pub outputs: Vec<OutputDeclaration>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource(&mut self, resource: ResourceDeclaration) -> Result<()> {
        resource.validate()?;
        let address = resource.address();
        if self.get(&address).is_some() {
            return Err(DeclarationError::DuplicateResource(address.to_string()));
        }
        self.resources.push(resource);
        Ok(())
    }

    pub fn with_resource(mut self, resource: ResourceDeclaration) -> Result<Self> {
        self.add_resource(resource)?;
        Ok(self)
    }

    pub fn add_output(&mut self, output: OutputDeclaration) -> Result<()> {
        if self.outputs.iter().any(|o| o.name == output.name) {
            return Err(DeclarationError::DuplicateOutput(output.name));
        }
        self.outputs.push(output);
        Ok(())
    }

    pub fn get(&self, address: &ResourceAddress) -> Option<&ResourceDeclaration> {
        self.resources
            .iter()
            .find(|r| r.kind == address.kind && r.name == address.name)
    }

    /// リソースを指定種別で絞り込む
    pub fn by_kind(&self, kind: &str) -> Vec<&ResourceDeclaration> {
        self.resources.iter().filter(|r| r.kind == kind).collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
