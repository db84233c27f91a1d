//! FleetForm Core
//!
//! 宣言されたクラウドリソースのデータモデルと、KDLマニフェストのパーサー。
//!
//! エンジン本体（グラフ構築・プラン・実行）は `fleetform-cloud` にあり、
//! このクレートは「何を作りたいか」の表現だけを扱います。

pub mod error;
pub mod model;
pub mod parser;

pub use error::{DeclarationError, Result};
pub use model::{
    AttributeValue, Manifest, OutputDeclaration, Reference, Resolution, ResourceAddress,
    ResourceDeclaration,
};
pub use parser::{parse_manifest_file, parse_manifest_str};
