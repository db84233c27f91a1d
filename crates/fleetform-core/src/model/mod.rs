//! モデル定義
//!
//! 宣言されたリソース、属性値、参照、マニフェストを定義します。

mod address;
mod manifest;
mod resource;
mod value;

// Re-exports
pub use address::*;
pub use manifest::*;
pub use resource::*;
pub use value::*;
