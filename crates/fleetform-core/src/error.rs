use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeclarationError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("無効なリソースアドレス: {0}")]
    InvalidAddress(String),

    #[error("無効な参照: {0}")]
    InvalidReference(String),

    #[error("無効な属性値: {attribute}\n理由: {message}")]
    InvalidAttribute { attribute: String, message: String },

    #[error("リソースが重複しています: {0}")]
    DuplicateResource(String),

    #[error("出力が重複しています: {0}")]
    DuplicateOutput(String),
}

pub type Result<T> = std::result::Result<T, DeclarationError>;
