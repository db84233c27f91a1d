//! KDLパーサー
//!
//! FleetFormのマニフェスト（KDL）をパースして [`Manifest`] を生成します。
//! ノード種別ごとのパース処理はモジュールに分離されています。

mod resource;
mod value;

use resource::{parse_output, parse_resource};

use crate::error::{DeclarationError, Result};
use crate::model::Manifest;
use kdl::KdlDocument;
use std::fs;
use std::path::Path;

/// KDLファイルをパースしてManifestを生成
pub fn parse_manifest_file<P: AsRef<Path>>(path: P) -> Result<Manifest> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| DeclarationError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tracing::debug!("Parsing manifest: {}", path.display());
    parse_manifest_str(&content)
}

/// KDL文字列をパース
pub fn parse_manifest_str(content: &str) -> Result<Manifest> {
    let doc: KdlDocument = content.parse()?;
    let mut manifest = Manifest::new();

    for node in doc.nodes() {
        match node.name().value() {
            "resource" => {
                let resource = parse_resource(node)?;
                manifest.add_resource(resource)?;
            }
            "output" => {
                let output = parse_output(node)?;
                manifest.add_output(output)?;
            }
            other => {
                // 不明なノードはスキップ
                tracing::warn!("Unknown top-level node '{}' ignored", other);
            }
        }
    }

    Ok(manifest)
}
